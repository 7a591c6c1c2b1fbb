//! Wake word activation gate
//!
//! Buffers raw audio into fixed-size chunks, scores each chunk for the
//! configured wake words and decides which user-input events are forwarded
//! downstream. A keepalive keeps the gate open for a while after each
//! detection.

use std::time::Duration;

use tokio::sync::mpsc;

use super::activation::{ActivationHandle, ActivationState};
use super::scorer::WakeScorer;
use super::{SAMPLE_RATE, pcm16_to_samples};
use crate::config::WakeConfig;
use crate::events::{AudioFrame, Event};
use crate::schedule::ScheduledTask;
use crate::{Error, Result};

/// Activation change reported by the gate
#[derive(Debug, Clone, PartialEq)]
pub enum ActivationChange {
    /// A wake word crossed the threshold while asleep
    Woke {
        /// Detected keyword
        keyword: String,
        /// Detection confidence
        score: f32,
    },
    /// The keepalive ran out
    Expired,
    /// An interrupt phrase forced the gate asleep
    Interrupted,
}

/// Gates user input behind wake word detection
pub struct WakeGate {
    keywords: Vec<String>,
    threshold: f32,
    keepalive_timeout: Duration,
    chunk_bytes: usize,
    scorer: Box<dyn WakeScorer>,
    activation: ActivationHandle,
    buffer: Vec<u8>,
    keepalive: Option<ScheduledTask>,
    changes: mpsc::UnboundedSender<ActivationChange>,
}

impl WakeGate {
    /// Create a gate and the receiver for its activation changes
    ///
    /// # Errors
    ///
    /// Returns error if the threshold is outside 0.0-1.0, the chunk size is
    /// zero, or no keywords are configured
    pub fn new(
        config: &WakeConfig,
        scorer: Box<dyn WakeScorer>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<ActivationChange>)> {
        if !(0.0..=1.0).contains(&config.threshold) {
            return Err(Error::Config(format!(
                "wake threshold must be within 0.0-1.0, got {}",
                config.threshold
            )));
        }
        if config.chunk_samples == 0 {
            return Err(Error::Config("chunk size must be at least one sample".to_string()));
        }
        let chunk_bytes = config
            .chunk_samples
            .checked_mul(2)
            .ok_or_else(|| Error::Config(format!("chunk size too large: {} samples", config.chunk_samples)))?;

        let keywords: Vec<String> = config
            .keywords
            .iter()
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        if keywords.is_empty() {
            return Err(Error::Config("at least one wake word is required".to_string()));
        }

        tracing::info!(
            keywords = ?keywords,
            threshold = config.threshold,
            keepalive_secs = config.keepalive.as_secs_f64(),
            chunk_samples = config.chunk_samples,
            "wake gate initialized"
        );

        let (changes, rx) = mpsc::unbounded_channel();
        let gate = Self {
            keywords,
            threshold: config.threshold,
            keepalive_timeout: config.keepalive,
            chunk_bytes,
            scorer,
            activation: ActivationHandle::new(),
            buffer: Vec::new(),
            keepalive: None,
            changes,
        };
        Ok((gate, rx))
    }

    /// Decide whether an event may pass downstream
    ///
    /// Raw audio is scored on the way through. Control and output events are
    /// never gated.
    pub fn admit(&mut self, event: &Event) -> bool {
        match event {
            Event::RawAudio(frame) => self.feed(frame),
            Event::Transcription { .. } | Event::SpeechStarted | Event::SpeechStopped => {
                self.activation.is_awake()
            }
            Event::SynthesisStarted
            | Event::SynthesisStopped
            | Event::AssistantText { .. }
            | Event::AssistantAudio(_)
            | Event::ToolConfig { .. }
            | Event::ToolCall { .. }
            | Event::ToolResult { .. }
            | Event::SessionStart
            | Event::SessionEnd
            | Event::Mute { .. }
            | Event::CancelOutput
            | Event::Greeting { .. }
            | Event::TimerAnnouncement { .. }
            | Event::StateChanged(_) => true,
        }
    }

    /// Score a raw audio frame and return whether it passes
    ///
    /// Muted audio is dropped before buffering. Otherwise the frame passes
    /// only if the gate is awake after scoring, so the frame carrying the
    /// wake word itself goes through.
    pub fn feed(&mut self, frame: &AudioFrame) -> bool {
        if self.activation.is_muted() {
            return false;
        }
        self.detect(frame);
        self.activation.is_awake()
    }

    fn detect(&mut self, frame: &AudioFrame) {
        if frame.sample_rate != SAMPLE_RATE || frame.channels != 1 {
            tracing::warn!(
                sample_rate = frame.sample_rate,
                channels = frame.channels,
                expected_rate = SAMPLE_RATE,
                "wake word detection needs 16 kHz mono audio, skipping frame"
            );
            return;
        }

        self.buffer.extend_from_slice(&frame.data);
        while self.buffer.len() >= self.chunk_bytes {
            let chunk: Vec<u8> = self.buffer.drain(..self.chunk_bytes).collect();
            let samples = pcm16_to_samples(&chunk);

            let scores = match self.scorer.predict(&samples) {
                Ok(scores) => scores,
                Err(e) => {
                    tracing::error!(error = %e, "wake word inference failed, dropping chunk");
                    continue;
                }
            };

            // Any model the scorer reports counts, whatever its name
            if let Some(hit) = scores.into_iter().find(|s| s.score >= self.threshold) {
                self.wake(hit.keyword, hit.score);
            }
        }
    }

    fn wake(&mut self, keyword: String, score: f32) {
        let Some((previous, epoch)) = self
            .activation
            .update(|s| (s != ActivationState::Muted).then_some(ActivationState::Awake))
        else {
            return;
        };

        if previous == ActivationState::Awake {
            tracing::debug!(keyword, score, "wake word re-detected, keepalive refreshed");
        } else {
            tracing::info!(keyword, score, "wake word detected");
            let _ = self.changes.send(ActivationChange::Woke { keyword, score });
        }

        self.arm_keepalive(epoch);
    }

    fn arm_keepalive(&mut self, epoch: u64) {
        self.cancel_keepalive();

        let activation = self.activation.clone();
        let changes = self.changes.clone();
        let timeout = self.keepalive_timeout;
        self.keepalive = Some(ScheduledTask::spawn(timeout, move |_| async move {
            if activation.expire(epoch) {
                tracing::info!(
                    timeout_secs = timeout.as_secs_f64(),
                    "keepalive expired, going back to sleep"
                );
                let _ = changes.send(ActivationChange::Expired);
            }
        }));
    }

    fn cancel_keepalive(&mut self) {
        if let Some(previous) = self.keepalive.take() {
            previous.cancel();
        }
    }

    /// Mute or unmute detection
    ///
    /// Muting from any state drops the keepalive and any buffered audio.
    /// Unmuting returns to `Asleep`. Returns whether the state changed.
    pub fn set_muted(&mut self, muted: bool) -> bool {
        let changed = if muted {
            self.activation
                .update(|s| (s != ActivationState::Muted).then_some(ActivationState::Muted))
        } else {
            self.activation
                .update(|s| (s == ActivationState::Muted).then_some(ActivationState::Asleep))
        };

        if muted {
            self.cancel_keepalive();
            self.buffer.clear();
        }

        match changed {
            Some((previous, _)) => {
                tracing::info!(%previous, muted, "wake gate mute changed");
                true
            }
            None => false,
        }
    }

    /// Force the gate asleep after an interrupt
    ///
    /// Returns whether the gate was awake.
    pub fn interrupt(&mut self) -> bool {
        let interrupted = self
            .activation
            .update(|s| (s == ActivationState::Awake).then_some(ActivationState::Asleep))
            .is_some();

        if interrupted {
            self.cancel_keepalive();
            tracing::info!("wake gate interrupted");
            let _ = self.changes.send(ActivationChange::Interrupted);
        }
        interrupted
    }

    /// Whether user input currently passes
    #[must_use]
    pub fn is_awake(&self) -> bool {
        self.activation.is_awake()
    }

    /// Current activation state
    #[must_use]
    pub fn state(&self) -> ActivationState {
        self.activation.get()
    }

    /// Read handle for other components
    #[must_use]
    pub fn activation(&self) -> ActivationHandle {
        self.activation.clone()
    }

    /// Whether a keepalive countdown is pending
    #[must_use]
    pub fn keepalive_armed(&self) -> bool {
        self.keepalive
            .as_ref()
            .is_some_and(|k| !k.is_cancelled() && !k.is_finished())
    }

    /// Configured keywords (lower-cased)
    #[must_use]
    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    /// Cancel the keepalive and drop buffered audio
    pub fn shutdown(&mut self) {
        self.cancel_keepalive();
        self.buffer.clear();
        tracing::debug!("wake gate shut down");
    }
}

impl std::fmt::Debug for WakeGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WakeGate")
            .field("keywords", &self.keywords)
            .field("threshold", &self.threshold)
            .field("state", &self.activation.get())
            .field("buffered_bytes", &self.buffer.len())
            .finish_non_exhaustive()
    }
}
