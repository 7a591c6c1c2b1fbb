//! Daemon - drives a session from a recorded event stream
//!
//! Input is JSON lines: an [`Event`], a `{"wait_ms": n}` pause, or a control
//! publication `{"topic": ..., "payload": ...}` addressed to the mute switch.
//! Downstream events are written back as JSON lines. With an MQTT broker
//! configured, state is also published there and the live mute switch
//! controls the session.

use std::time::Duration;

use serde::Deserialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::events::{self, Event};
use crate::session::SessionContext;
use crate::state::{
    DeviceIdentity, EventSink, HomeAssistantSink, MqttSink, StatePublisher, StateSink, parse_mute_command,
};
use crate::voice::EnergyScorer;
use crate::{Config, Error, Result};

/// One line of a replay script
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ReplayLine {
    Wait { wait_ms: u64 },
    Control { topic: String, payload: String },
    Event(Event),
}

/// Outcome of a replay run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplaySummary {
    /// Session that handled the replay
    pub session_id: Uuid,
    /// Events delivered to the session
    pub events_in: usize,
    /// Events written downstream
    pub events_out: usize,
    /// Input lines that could not be used
    pub skipped_lines: usize,
    /// Conversation turns recorded
    pub turns: usize,
}

/// The wakegate daemon
pub struct Daemon {
    config: Config,
    sinks: Vec<Box<dyn StateSink>>,
    shutdown: CancellationToken,
}

impl Daemon {
    /// Create a daemon, adding the Home Assistant sink when configured
    ///
    /// # Errors
    ///
    /// Returns error if the Home Assistant client cannot be built
    pub fn new(config: Config) -> Result<Self> {
        let mut sinks: Vec<Box<dyn StateSink>> = Vec::new();
        if let Some(ha) = &config.home_assistant {
            let identity = DeviceIdentity::new(&config.state.room);
            tracing::info!(url = %ha.url, entity_id = %identity.entity_id(), "Home Assistant state sink enabled");
            sinks.push(Box::new(HomeAssistantSink::new(ha, &identity)?));
        }

        Ok(Self {
            config,
            sinks,
            shutdown: CancellationToken::new(),
        })
    }

    /// Add a state sink
    #[must_use]
    pub fn with_sink(mut self, sink: Box<dyn StateSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Token that stops feeding input when cancelled
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Device naming for the configured room
    #[must_use]
    pub fn identity(&self) -> DeviceIdentity {
        DeviceIdentity::new(&self.config.state.room)
    }

    /// Run one session over a replay script
    ///
    /// The session ends at a `session_end` event, at end of input, or when
    /// the shutdown token is cancelled.
    ///
    /// # Errors
    ///
    /// Returns error if the session cannot be built, reading input fails, or
    /// writing output fails
    pub async fn replay<R, W>(self, input: R, mut output: W) -> Result<ReplaySummary>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let identity = self.identity();
        let (downstream_tx, mut downstream_rx) = events::channel();

        let mut sinks = self.sinks;
        let mut mute_commands = None;
        if let Some(mqtt) = &self.config.mqtt {
            let (commands_tx, commands_rx) = events::channel();
            sinks.push(Box::new(MqttSink::connect(mqtt, identity.clone(), commands_tx)));
            mute_commands = Some(commands_rx);
        }
        sinks.push(Box::new(EventSink::new(downstream_tx.clone())));
        let publisher = StatePublisher::spawn(sinks, self.config.state.publish_timeout);

        let scorer = Box::new(EnergyScorer::new(self.config.wake.keywords.clone()));
        let mut session = SessionContext::new(&self.config, scorer, publisher, downstream_tx)?;
        let session_id = session.id();

        // Mute switch toggles from the broker join the session's event path
        if let Some(mut commands) = mute_commands {
            let control = session.control();
            tokio::spawn(async move {
                while let Some(event) = commands.recv().await {
                    if control.send(event).is_err() {
                        break;
                    }
                }
            });
        }

        let (input_tx, input_rx) = events::channel();
        let session_task = tokio::spawn(async move {
            session.run(input_rx).await;
            session.conversation().len()
        });

        let shutdown = self.shutdown;
        let feed = async move {
            let mut lines = input.lines();
            let mut events_in = 0;
            let mut skipped = 0;

            loop {
                let line = tokio::select! {
                    biased;
                    () = shutdown.cancelled() => {
                        tracing::info!("replay interrupted");
                        break;
                    }
                    line = lines.next_line() => line?,
                };
                let Some(line) = line else { break };

                let Some(event) = resolve_line(&line, &identity, &mut skipped).await else {
                    continue;
                };
                let ends = matches!(event, Event::SessionEnd);
                if input_tx.send(event).is_err() {
                    tracing::warn!("session closed early, stopping replay");
                    break;
                }
                events_in += 1;
                if ends {
                    break;
                }
            }

            drop(input_tx);
            Ok::<_, Error>((events_in, skipped))
        };

        let write = async {
            let mut events_out = 0;
            while let Some(event) = downstream_rx.recv().await {
                write_event(&mut output, &event).await?;
                events_out += 1;
            }
            output.flush().await?;
            Ok::<_, Error>(events_out)
        };

        let (fed, written) = tokio::join!(feed, write);
        let (events_in, skipped_lines) = fed?;
        let events_out = written?;

        let turns = session_task
            .await
            .map_err(|e| Error::Channel(format!("session task failed: {e}")))?;

        let summary = ReplaySummary {
            session_id,
            events_in,
            events_out,
            skipped_lines,
            turns,
        };
        tracing::info!(
            session_id = %summary.session_id,
            events_in,
            events_out,
            skipped_lines,
            turns,
            "replay finished"
        );
        Ok(summary)
    }
}

/// Turn one input line into an event, sleeping through pauses
async fn resolve_line(line: &str, identity: &DeviceIdentity, skipped: &mut usize) -> Option<Event> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    match serde_json::from_str::<ReplayLine>(line) {
        Ok(ReplayLine::Event(event)) => Some(event),
        Ok(ReplayLine::Wait { wait_ms }) => {
            tokio::time::sleep(Duration::from_millis(wait_ms)).await;
            None
        }
        Ok(ReplayLine::Control { topic, payload }) => {
            if topic != identity.mute_command_topic() {
                tracing::debug!(topic, "ignoring publication for unknown topic");
                *skipped += 1;
                return None;
            }
            let Some(muted) = parse_mute_command(&payload) else {
                tracing::warn!(payload, "ignoring invalid mute command");
                *skipped += 1;
                return None;
            };
            Some(Event::Mute { muted })
        }
        Err(e) => {
            tracing::warn!(error = %e, "skipping unreadable replay line");
            *skipped += 1;
            None
        }
    }
}

async fn write_event<W: AsyncWrite + Unpin>(output: &mut W, event: &Event) -> Result<()> {
    let mut line = serde_json::to_vec(event)?;
    line.push(b'\n');
    output.write_all(&line).await?;
    Ok(())
}
