//! Session state tracking
//!
//! Derives one externally visible state from the event stream and the wake
//! gate's activation, and publishes changes with a debounce so rapidly
//! alternating events don't flicker in the home automation UI.
//!
//! ```text
//!  SessionStart ──► standby ──(wake)──► listening ──(speech stop)──► processing
//!                     ▲                                                  │
//!                     └──(keepalive/interrupt)── idle ◄── speaking ◄─────┘
//! ```

mod identity;
mod mqtt;
mod publisher;
mod sink;

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::watch;
use tokio::time::Instant;

pub use identity::{DeviceIdentity, Publication, parse_mute_command};
pub use mqtt::MqttSink;
pub use publisher::StatePublisher;
pub use sink::{EventSink, HomeAssistantSink, PublicationSink, StateSink};

use crate::config::StateConfig;
use crate::events::Event;
use crate::voice::{ActivationChange, ActivationHandle};
use crate::{Error, Result};

/// Externally visible assistant state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Waiting for the wake word
    Standby,
    /// User speaking after the wake word
    Listening,
    /// Language model working on the request
    Processing,
    /// Assistant speech playing
    Speaking,
    /// Awake, between turns
    Idle,
    /// Microphone muted
    Muted,
    /// No session connected
    Offline,
}

impl SessionState {
    /// All states, in display order
    pub const ALL: [Self; 7] = [
        Self::Standby,
        Self::Listening,
        Self::Processing,
        Self::Speaking,
        Self::Idle,
        Self::Muted,
        Self::Offline,
    ];

    /// State name as published
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Standby => "standby",
            Self::Listening => "listening",
            Self::Processing => "processing",
            Self::Speaking => "speaking",
            Self::Idle => "idle",
            Self::Muted => "muted",
            Self::Offline => "offline",
        }
    }

    /// Material Design icon shown for the state
    #[must_use]
    pub const fn icon(self) -> &'static str {
        match self {
            Self::Standby => "mdi:sleep",
            Self::Listening => "mdi:microphone",
            Self::Processing => "mdi:brain",
            Self::Speaking => "mdi:speaker",
            Self::Idle => "mdi:account-voice",
            Self::Muted => "mdi:microphone-off",
            Self::Offline => "mdi:close-circle",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| Error::Config(format!("unknown session state: {s}")))
    }
}

/// A published state change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateChange {
    /// New state
    pub state: SessionState,
    /// Icon for the new state
    pub icon: String,
    /// Room the assistant lives in
    pub room: String,
    /// RFC 3339 timestamp of the change
    pub last_updated: String,
    /// Additional attributes
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

impl StateChange {
    /// Build a change stamped with the current time
    #[must_use]
    pub fn new(state: SessionState, room: impl Into<String>, extra: Map<String, Value>) -> Self {
        Self {
            state,
            icon: state.icon().to_string(),
            room: room.into(),
            last_updated: chrono::Utc::now().to_rfc3339(),
            extra,
        }
    }

    /// Attributes payload: `{icon, last_updated, room, ...extra}`
    #[must_use]
    pub fn attributes(&self) -> Value {
        let mut attributes = Map::new();
        attributes.insert("icon".to_string(), Value::from(self.icon.clone()));
        attributes.insert("last_updated".to_string(), Value::from(self.last_updated.clone()));
        attributes.insert("room".to_string(), Value::from(self.room.clone()));
        for (key, value) in &self.extra {
            attributes.insert(key.clone(), value.clone());
        }
        Value::Object(attributes)
    }
}

/// Result of a requested transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// Already in the target state
    Unchanged,
    /// Too soon after the previous change, dropped
    Debounced,
    /// State updated and published
    Applied,
}

/// Derives and publishes the session state
#[derive(Debug)]
pub struct SessionStateMachine {
    identity: DeviceIdentity,
    debounce: Duration,
    activation: ActivationHandle,
    current: watch::Sender<SessionState>,
    last_changed: Option<Instant>,
    publisher: StatePublisher,
}

impl SessionStateMachine {
    /// Create a machine in the `Offline` state
    #[must_use]
    pub fn new(config: &StateConfig, activation: ActivationHandle, publisher: StatePublisher) -> Self {
        let (current, _) = watch::channel(SessionState::Offline);
        Self {
            identity: DeviceIdentity::new(&config.room),
            debounce: config.debounce,
            activation,
            current,
            last_changed: None,
            publisher,
        }
    }

    /// Update the state from an event that passed the gate
    ///
    /// Returns `None` for events that don't drive the state.
    pub fn observe(&mut self, event: &Event) -> Option<TransitionOutcome> {
        let awake = self.activation.is_awake();
        let target = match event {
            Event::SessionStart => SessionState::Standby,
            Event::SpeechStarted if awake => SessionState::Listening,
            Event::SpeechStopped if awake => SessionState::Processing,
            Event::SynthesisStarted => SessionState::Speaking,
            Event::SynthesisStopped if awake => SessionState::Idle,
            Event::SessionEnd => SessionState::Offline,
            _ => return None,
        };
        Some(self.transition(target, Map::new()))
    }

    /// Follow a wake gate activation change
    pub fn on_activation(&mut self, change: &ActivationChange) -> TransitionOutcome {
        match change {
            ActivationChange::Woke { keyword, score } => {
                let mut extra = Map::new();
                extra.insert("wake_word".to_string(), Value::from(keyword.clone()));
                extra.insert("confidence".to_string(), Value::from(f64::from(*score)));
                self.transition(SessionState::Listening, extra)
            }
            ActivationChange::Expired | ActivationChange::Interrupted => {
                self.transition(SessionState::Standby, Map::new())
            }
        }
    }

    /// Follow a mute command
    pub fn on_mute(&mut self, muted: bool) -> TransitionOutcome {
        self.publisher.publish_muted(muted);
        let target = if muted {
            SessionState::Muted
        } else {
            SessionState::Standby
        };
        self.transition(target, Map::new())
    }

    /// Move to `target` unless unchanged or debounced
    ///
    /// `Offline` is never debounced.
    pub fn transition(&mut self, target: SessionState, extra: Map<String, Value>) -> TransitionOutcome {
        let current = *self.current.borrow();
        if target == current {
            return TransitionOutcome::Unchanged;
        }

        let now = Instant::now();
        let since_last = self.last_changed.map(|last| now.duration_since(last));
        if target != SessionState::Offline && since_last.is_some_and(|elapsed| elapsed < self.debounce) {
            tracing::debug!(
                from = %current,
                to = %target,
                since_last = ?since_last,
                "state change debounced"
            );
            return TransitionOutcome::Debounced;
        }

        self.current.send_replace(target);
        self.last_changed = Some(now);
        tracing::info!(from = %current, to = %target, "session state changed");

        self.publisher
            .publish(StateChange::new(target, self.identity.room(), extra));
        TransitionOutcome::Applied
    }

    /// Force `Offline`, bypassing the debounce
    pub fn end_session(&mut self) -> TransitionOutcome {
        self.transition(SessionState::Offline, Map::new())
    }

    /// Current state
    #[must_use]
    pub fn current(&self) -> SessionState {
        *self.current.borrow()
    }

    /// Watch state changes
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.current.subscribe()
    }

    /// Device naming for this room
    #[must_use]
    pub const fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    /// Flush pending publications and stop the publisher
    pub async fn shutdown(&mut self) {
        self.publisher.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voice::ActivationState;

    fn machine(debounce_ms: u64) -> (SessionStateMachine, ActivationHandle) {
        let config = StateConfig {
            room: "Living Room".to_string(),
            debounce: Duration::from_millis(debounce_ms),
            publish_timeout: Duration::from_secs(1),
        };
        let activation = ActivationHandle::new();
        let machine = SessionStateMachine::new(&config, activation.clone(), StatePublisher::disabled());
        (machine, activation)
    }

    #[test]
    fn state_names_round_trip() {
        for state in SessionState::ALL {
            assert_eq!(state.as_str().parse::<SessionState>().unwrap(), state);
        }
        assert!("asleep".parse::<SessionState>().is_err());
        assert_eq!(SessionState::Muted.icon(), "mdi:microphone-off");
    }

    #[test]
    fn attributes_merge_extra() {
        let mut extra = Map::new();
        extra.insert("wake_word".to_string(), Value::from("alexa"));
        let change = StateChange::new(SessionState::Listening, "bedroom", extra);

        let attributes = change.attributes();
        assert_eq!(attributes["icon"], "mdi:microphone");
        assert_eq!(attributes["room"], "bedroom");
        assert_eq!(attributes["wake_word"], "alexa");
        assert!(chrono::DateTime::parse_from_rfc3339(attributes["last_updated"].as_str().unwrap()).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn starts_offline_and_first_change_applies() {
        let (mut machine, _) = machine(300);
        assert_eq!(machine.current(), SessionState::Offline);
        assert_eq!(machine.observe(&Event::SessionStart), Some(TransitionOutcome::Applied));
        assert_eq!(machine.current(), SessionState::Standby);
        assert_eq!(machine.identity().room(), "living_room");
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_state_is_noop() {
        let (mut machine, _) = machine(0);
        machine.transition(SessionState::Speaking, Map::new());
        assert_eq!(
            machine.transition(SessionState::Speaking, Map::new()),
            TransitionOutcome::Unchanged
        );
    }

    #[tokio::test(start_paused = true)]
    async fn rapid_reversal_debounced() {
        let (mut machine, _) = machine(300);
        machine.transition(SessionState::Listening, Map::new());
        tokio::time::advance(Duration::from_millis(400)).await;

        assert_eq!(
            machine.transition(SessionState::Processing, Map::new()),
            TransitionOutcome::Applied
        );
        tokio::time::advance(Duration::from_millis(50)).await;
        assert_eq!(
            machine.transition(SessionState::Listening, Map::new()),
            TransitionOutcome::Debounced
        );
        assert_eq!(machine.current(), SessionState::Processing);

        tokio::time::advance(Duration::from_millis(300)).await;
        assert_eq!(
            machine.transition(SessionState::Listening, Map::new()),
            TransitionOutcome::Applied
        );
    }

    #[tokio::test(start_paused = true)]
    async fn offline_bypasses_debounce_but_muted_does_not() {
        let (mut machine, _) = machine(300);
        machine.transition(SessionState::Standby, Map::new());

        assert_eq!(machine.on_mute(true), TransitionOutcome::Debounced);
        assert_eq!(machine.end_session(), TransitionOutcome::Applied);
        assert_eq!(machine.current(), SessionState::Offline);
    }

    #[tokio::test(start_paused = true)]
    async fn speech_events_need_activation() {
        let (mut machine, activation) = machine(0);
        machine.observe(&Event::SessionStart);

        assert_eq!(machine.observe(&Event::SpeechStarted), None);
        assert_eq!(machine.current(), SessionState::Standby);

        activation.update(|_| Some(ActivationState::Awake));
        machine.observe(&Event::SpeechStarted);
        assert_eq!(machine.current(), SessionState::Listening);
        machine.observe(&Event::SpeechStopped);
        assert_eq!(machine.current(), SessionState::Processing);
        machine.observe(&Event::SynthesisStarted);
        assert_eq!(machine.current(), SessionState::Speaking);
        machine.observe(&Event::SynthesisStopped);
        assert_eq!(machine.current(), SessionState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn activation_changes_drive_state() {
        let (mut machine, _) = machine(0);
        machine.observe(&Event::SessionStart);

        let woke = ActivationChange::Woke {
            keyword: "alexa".to_string(),
            score: 0.9,
        };
        assert_eq!(machine.on_activation(&woke), TransitionOutcome::Applied);
        assert_eq!(machine.current(), SessionState::Listening);

        machine.on_activation(&ActivationChange::Expired);
        assert_eq!(machine.current(), SessionState::Standby);
    }

    #[tokio::test(start_paused = true)]
    async fn subscribers_see_changes() {
        let (mut machine, _) = machine(0);
        let mut rx = machine.subscribe();

        machine.observe(&Event::SessionStart);
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), SessionState::Standby);
    }
}
