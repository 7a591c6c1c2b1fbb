//! Conversation history capture
//!
//! Streaming assistant text is accumulated between synthesis boundaries and
//! stored as one turn when speech stops. User transcripts are stored as they
//! arrive while the gate is awake.

use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::events::Event;
use crate::voice::ActivationHandle;

/// Speaker of a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The person talking to the assistant
    User,
    /// The assistant
    Assistant,
}

impl Role {
    /// Role name used in model context
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// One complete utterance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    /// Speaker
    pub role: Role,
    /// Utterance text
    pub text: String,
}

/// Append-only conversation log shared with context builders
#[derive(Debug, Clone, Default)]
pub struct ConversationLog {
    turns: Arc<Mutex<Vec<ConversationTurn>>>,
}

impl ConversationLog {
    /// Create an empty log
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<ConversationTurn>> {
        self.turns.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn push(&self, role: Role, text: String) {
        self.lock().push(ConversationTurn { role, text });
    }

    /// Snapshot of all turns in arrival order
    #[must_use]
    pub fn turns(&self) -> Vec<ConversationTurn> {
        self.lock().clone()
    }

    /// Number of turns
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the log is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Turns as `[{role, content}]` chat messages
    #[must_use]
    pub fn messages(&self) -> Vec<Value> {
        self.lock()
            .iter()
            .map(|turn| json!({ "role": turn.role.as_str(), "content": turn.text }))
            .collect()
    }
}

/// Builds conversation turns from the event stream
#[derive(Debug)]
pub struct ConversationRecorder {
    activation: ActivationHandle,
    pending: String,
    log: ConversationLog,
}

impl ConversationRecorder {
    /// Create a recorder appending to `log`
    #[must_use]
    pub fn new(activation: ActivationHandle, log: ConversationLog) -> Self {
        Self {
            activation,
            pending: String::new(),
            log,
        }
    }

    /// Feed an event that passed the gate
    pub fn observe(&mut self, event: &Event) {
        match event {
            Event::AssistantText { text } => self.on_partial_text(text),
            Event::SynthesisStarted => self.on_synthesis_start(),
            Event::SynthesisStopped => self.on_synthesis_stop(),
            Event::Transcription { text } => self.on_transcript(text),
            _ => {}
        }
    }

    /// Append streaming assistant text
    pub fn on_partial_text(&mut self, text: &str) {
        self.pending.push_str(text);
    }

    /// Start a new assistant utterance
    pub fn on_synthesis_start(&mut self) {
        self.pending.clear();
    }

    /// Close the assistant utterance, storing it if non-empty
    pub fn on_synthesis_stop(&mut self) {
        let text = self.pending.trim();
        if text.is_empty() {
            tracing::debug!("no assistant text to record");
        } else {
            tracing::debug!(chars = text.len(), "recorded assistant turn");
            self.log.push(Role::Assistant, text.to_string());
        }
        self.pending.clear();
    }

    /// Store a user transcript if the gate is awake
    pub fn on_transcript(&mut self, text: &str) {
        if !self.activation.is_awake() || text.is_empty() {
            return;
        }
        tracing::debug!(chars = text.len(), "recorded user turn");
        self.log.push(Role::User, text.to_string());
    }

    /// Text accumulated since the last synthesis start
    #[must_use]
    pub fn pending(&self) -> &str {
        &self.pending
    }

    /// The log this recorder appends to
    #[must_use]
    pub const fn log(&self) -> &ConversationLog {
        &self.log
    }
}
