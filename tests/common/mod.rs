//! Shared test utilities

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use wakegate::config::{Config, WakeConfig};
use wakegate::events::{self, AudioFrame, Event, EventReceiver};
use wakegate::state::{SessionState, StateChange, StatePublisher, StateSink};
use wakegate::voice::{KeywordScore, WakeScorer, samples_to_pcm16};
use wakegate::SessionContext;

/// Samples per scoring chunk in test configs
pub const CHUNK: usize = 4;

/// Scores a chunk by its first sample: 490 => 0.49
pub struct LevelScorer;

impl WakeScorer for LevelScorer {
    fn predict(&mut self, chunk: &[i16]) -> wakegate::Result<Vec<KeywordScore>> {
        let level = chunk.first().copied().unwrap_or_default();
        Ok(vec![KeywordScore::new("alexa", f32::from(level) / 1000.0)])
    }
}

/// One chunk of audio that [`LevelScorer`] scores at `level / 1000`
#[must_use]
pub fn frame(level: i16) -> Event {
    Event::RawAudio(AudioFrame::mono_16k(samples_to_pcm16(&[level; CHUNK])))
}

/// Config with a tiny chunk size and default timings
#[must_use]
pub fn test_config() -> Config {
    Config {
        wake: WakeConfig {
            chunk_samples: CHUNK,
            ..WakeConfig::default()
        },
        ..Config::default()
    }
}

/// What a [`RecordingSink`] saw
#[derive(Debug, Clone, PartialEq)]
pub enum Published {
    Announced,
    Change(StateChange),
    Muted(bool),
}

/// Sink recording every delivery
#[derive(Clone, Default)]
pub struct RecordingSink {
    seen: Arc<Mutex<Vec<Published>>>,
}

impl RecordingSink {
    pub fn published(&self) -> Vec<Published> {
        self.seen.lock().unwrap().clone()
    }

    /// States in publication order
    pub fn states(&self) -> Vec<SessionState> {
        self.published()
            .into_iter()
            .filter_map(|p| match p {
                Published::Change(change) => Some(change.state),
                _ => None,
            })
            .collect()
    }

    pub fn changes(&self) -> Vec<StateChange> {
        self.published()
            .into_iter()
            .filter_map(|p| match p {
                Published::Change(change) => Some(change),
                _ => None,
            })
            .collect()
    }

    pub fn mutes(&self) -> Vec<bool> {
        self.published()
            .into_iter()
            .filter_map(|p| match p {
                Published::Muted(muted) => Some(muted),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl StateSink for RecordingSink {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn announce(&self) -> wakegate::Result<()> {
        self.seen.lock().unwrap().push(Published::Announced);
        Ok(())
    }

    async fn publish(&self, change: &StateChange) -> wakegate::Result<()> {
        self.seen.lock().unwrap().push(Published::Change(change.clone()));
        Ok(())
    }

    async fn publish_muted(&self, muted: bool) -> wakegate::Result<()> {
        self.seen.lock().unwrap().push(Published::Muted(muted));
        Ok(())
    }
}

/// A session wired to a recording sink and an inspectable downstream
pub struct Harness {
    pub session: SessionContext,
    pub downstream: EventReceiver,
    pub sink: RecordingSink,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(&test_config())
    }

    pub fn with_config(config: &Config) -> Self {
        let sink = RecordingSink::default();
        let publisher = StatePublisher::spawn(vec![Box::new(sink.clone())], Duration::from_secs(2));
        let (tx, downstream) = events::channel();
        let session = SessionContext::new(config, Box::new(LevelScorer), publisher, tx).unwrap();
        Self {
            session,
            downstream,
            sink,
        }
    }

    /// Everything forwarded downstream so far
    pub fn drain(&mut self) -> Vec<Event> {
        let mut events = Vec::new();
        while let Ok(event) = self.downstream.try_recv() {
            events.push(event);
        }
        events
    }

    /// Kinds of everything forwarded downstream so far
    pub fn drain_kinds(&mut self) -> Vec<&'static str> {
        self.drain().iter().map(Event::kind).collect()
    }
}

/// Advance paused time and let spawned tasks run
pub async fn advance(duration: Duration) {
    tokio::time::advance(duration).await;
    settle().await;
}

/// Yield a few times so woken tasks get polled
pub async fn settle() {
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}
