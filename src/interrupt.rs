//! Interrupt phrase detection
//!
//! Transcripts like "stop" or "be quiet" cancel in-flight assistant output
//! and put the wake gate back to sleep. Phrases match on word boundaries, so
//! "quietly" does not trigger "quiet".

use regex::Regex;

use crate::events::{Event, EventSender};
use crate::voice::WakeGate;
use crate::{Error, Result};

/// Phrases that interrupt the assistant when none are configured
pub const DEFAULT_INTERRUPT_PHRASES: &[&str] = &[
    "shut up",
    "stop talking",
    "be quiet",
    "quiet",
    "stop",
    "cancel",
    "never mind",
    "nevermind",
];

/// Detects interrupt phrases in transcribed speech
#[derive(Debug, Clone)]
pub struct InterruptDetector {
    phrases: Vec<String>,
    pattern: Option<Regex>,
}

impl InterruptDetector {
    /// Compile a detector for `phrases`
    ///
    /// Blank phrases are skipped. An empty list yields a detector that never
    /// matches.
    ///
    /// # Errors
    ///
    /// Returns error if the combined pattern fails to compile
    pub fn new<S: AsRef<str>>(phrases: &[S]) -> Result<Self> {
        let phrases: Vec<String> = phrases
            .iter()
            .map(|p| p.as_ref().trim().to_lowercase())
            .filter(|p| !p.is_empty())
            .collect();

        // Longest first so "stop talking" wins over "stop"
        let mut alternatives: Vec<&str> = phrases.iter().map(String::as_str).collect();
        alternatives.sort_by_key(|p| std::cmp::Reverse(p.len()));

        let pattern = if alternatives.is_empty() {
            None
        } else {
            let body = alternatives
                .iter()
                .map(|p| regex::escape(p))
                .collect::<Vec<_>>()
                .join("|");
            let regex = Regex::new(&format!(r"\b(?:{body})\b"))
                .map_err(|e| Error::Config(format!("invalid interrupt phrases: {e}")))?;
            Some(regex)
        };

        Ok(Self { phrases, pattern })
    }

    /// Whether `text` contains an interrupt phrase
    #[must_use]
    pub fn scan(&self, text: &str) -> bool {
        self.matched_phrase(text).is_some()
    }

    /// The configured phrase found in `text`, if any
    #[must_use]
    pub fn matched_phrase(&self, text: &str) -> Option<&str> {
        let pattern = self.pattern.as_ref()?;
        let normalized = text.trim().to_lowercase();
        let found = pattern.find(&normalized)?;
        self.phrases
            .iter()
            .find(|p| p.as_str() == found.as_str())
            .map(String::as_str)
    }

    /// Handle a transcript, interrupting on match
    ///
    /// On a match, emits [`Event::CancelOutput`] downstream and forces the
    /// gate asleep. Returns `true` when the transcript must be suppressed.
    pub fn intercept(&self, text: &str, gate: &mut WakeGate, downstream: &EventSender) -> bool {
        let Some(phrase) = self.matched_phrase(text) else {
            return false;
        };

        tracing::info!(phrase, "interrupt phrase detected");
        if downstream.send(Event::CancelOutput).is_err() {
            tracing::warn!("downstream closed, cancel not delivered");
        }
        gate.interrupt();
        true
    }

    /// Configured phrases (lower-cased)
    #[must_use]
    pub fn phrases(&self) -> &[String] {
        &self.phrases
    }
}

impl Default for InterruptDetector {
    fn default() -> Self {
        Self::new(DEFAULT_INTERRUPT_PHRASES).unwrap_or_else(|_| Self {
            phrases: Vec::new(),
            pattern: None,
        })
    }
}
