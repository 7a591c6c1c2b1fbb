//! Wakegate - wake word gating and session state for voice assistants
//!
//! This library sits between a voice transport and the speech/LLM pipeline:
//! - Wake word gating of audio and user input, with a keepalive window
//! - Interrupt phrases that cancel assistant output
//! - Named countdown timers that announce themselves on expiry
//! - Session state derived from the event stream, published to Home Assistant
//! - Conversation history capture
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                 Voice transport                      │
//! │   raw audio  │  transcripts  │  speech boundaries    │
//! └────────────────────┬────────────────────────────────┘
//!                      │ events (FIFO)
//! ┌────────────────────▼────────────────────────────────┐
//! │                  SessionContext                      │
//! │   WakeGate → Interrupt → Recorder → State machine    │
//! │   TimerService  │  ToolDispatcher  │  StatePublisher │
//! └────────────────────┬────────────────────────────────┘
//!                      │ gated events, announcements
//! ┌────────────────────▼────────────────────────────────┐
//! │        STT / LLM / TTS pipeline, Home Assistant      │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod daemon;
pub mod error;
pub mod events;
pub mod interrupt;
pub mod recorder;
pub mod schedule;
pub mod session;
pub mod state;
pub mod timers;
pub mod tools;
pub mod voice;

pub use config::Config;
pub use daemon::{Daemon, ReplaySummary};
pub use error::{Error, Result};
pub use events::{AudioFrame, Event, EventReceiver, EventSender};
pub use interrupt::InterruptDetector;
pub use recorder::{ConversationLog, ConversationRecorder, ConversationTurn, Role};
pub use session::SessionContext;
pub use state::{MqttSink, SessionState, SessionStateMachine, StateChange, StatePublisher, StateSink};
pub use timers::{TimerError, TimerService};
pub use tools::ToolDispatcher;
pub use voice::{ActivationState, WakeGate, WakeScorer};
