//! Session event vocabulary
//!
//! Every event that flows through a session is one variant of [`Event`].
//! Upstream events come from the transport (audio, transcripts, speech
//! boundaries); downstream events are what the gate lets through plus what
//! the core produces itself (cancellations, timer announcements, state changes).
//!
//! Events travel over [`EventSender`]/[`EventReceiver`], an ordered
//! single-consumer channel per direction.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::state::StateChange;

/// Sending half of an event channel
pub type EventSender = mpsc::UnboundedSender<Event>;

/// Receiving half of an event channel
pub type EventReceiver = mpsc::UnboundedReceiver<Event>;

/// Create a new event channel
#[must_use]
pub fn channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// A block of PCM16 little-endian audio
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFrame {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Interleaved channel count
    pub channels: u16,
    /// Raw sample bytes (base64 on the wire)
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

impl AudioFrame {
    /// Create a 16 kHz mono frame from raw PCM16 bytes
    #[must_use]
    pub const fn mono_16k(data: Vec<u8>) -> Self {
        Self {
            sample_rate: crate::voice::SAMPLE_RATE,
            channels: 1,
            data,
        }
    }
}

/// A single event on the session channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Microphone audio from the client
    RawAudio(AudioFrame),
    /// Transcribed user speech
    Transcription {
        /// Transcript text
        text: String,
    },
    /// User started speaking
    SpeechStarted,
    /// User stopped speaking
    SpeechStopped,
    /// Synthesized speech started playing
    SynthesisStarted,
    /// Synthesized speech stopped playing
    SynthesisStopped,
    /// Streaming fragment of the assistant's response text
    AssistantText {
        /// Text fragment
        text: String,
    },
    /// Synthesized assistant audio
    AssistantAudio(AudioFrame),
    /// Tool schema handed to the language model
    ToolConfig {
        /// Function definitions
        tools: serde_json::Value,
    },
    /// Function call requested by the language model
    ToolCall {
        /// Function name
        name: String,
        /// Function arguments
        #[serde(default)]
        arguments: serde_json::Value,
    },
    /// Result of a function call
    ToolResult {
        /// Function name
        name: String,
        /// Human-readable result
        result: String,
    },
    /// Session opened
    SessionStart,
    /// Session closed
    SessionEnd,
    /// Mute or unmute the assistant
    Mute {
        /// Desired mute state
        muted: bool,
    },
    /// Interrupt any in-flight assistant output
    CancelOutput,
    /// Spoken welcome when a session starts
    Greeting {
        /// Text to speak
        text: String,
    },
    /// A named timer expired
    TimerAnnouncement {
        /// Text to speak
        text: String,
    },
    /// The published session state changed
    StateChanged(StateChange),
}

impl Event {
    /// Stable name for logging
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::RawAudio(_) => "raw_audio",
            Self::Transcription { .. } => "transcription",
            Self::SpeechStarted => "speech_started",
            Self::SpeechStopped => "speech_stopped",
            Self::SynthesisStarted => "synthesis_started",
            Self::SynthesisStopped => "synthesis_stopped",
            Self::AssistantText { .. } => "assistant_text",
            Self::AssistantAudio(_) => "assistant_audio",
            Self::ToolConfig { .. } => "tool_config",
            Self::ToolCall { .. } => "tool_call",
            Self::ToolResult { .. } => "tool_result",
            Self::SessionStart => "session_start",
            Self::SessionEnd => "session_end",
            Self::Mute { .. } => "mute",
            Self::CancelOutput => "cancel_output",
            Self::Greeting { .. } => "greeting",
            Self::TimerAnnouncement { .. } => "timer_announcement",
            Self::StateChanged(_) => "state_changed",
        }
    }

    /// Whether this event originates from the user and is subject to gating
    #[must_use]
    pub const fn is_user_input(&self) -> bool {
        matches!(
            self,
            Self::RawAudio(_) | Self::Transcription { .. } | Self::SpeechStarted | Self::SpeechStopped
        )
    }
}

mod base64_bytes {
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}
