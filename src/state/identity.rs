//! Home Assistant device naming and retained publications

use serde::{Deserialize, Serialize};
use serde_json::json;

use super::StateChange;

/// A retained message for a topic-based observer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Publication {
    /// Destination topic
    pub topic: String,
    /// Message body
    pub payload: String,
    /// Whether late subscribers receive it
    #[serde(default)]
    pub retain: bool,
}

impl Publication {
    /// Create a retained publication
    #[must_use]
    pub fn retained(topic: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            retain: true,
        }
    }
}

/// Entity and topic names derived from the room
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    room: String,
    device_id: String,
}

impl DeviceIdentity {
    /// Derive names from a room like "Living Room"
    #[must_use]
    pub fn new(room: &str) -> Self {
        let room = room.trim().to_lowercase().replace(' ', "_");
        let device_id = format!("voice_assistant_{room}");
        Self { room, device_id }
    }

    /// Normalized room name (`living_room`)
    #[must_use]
    pub fn room(&self) -> &str {
        &self.room
    }

    /// Device ID (`voice_assistant_living_room`)
    #[must_use]
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Sensor entity ID (`sensor.voice_assistant_living_room`)
    #[must_use]
    pub fn entity_id(&self) -> String {
        format!("sensor.{}", self.device_id)
    }

    /// Human-readable device name (`Voice Assistant (Living Room)`)
    #[must_use]
    pub fn display_name(&self) -> String {
        let title: Vec<String> = self
            .room
            .split('_')
            .filter(|w| !w.is_empty())
            .map(|word| {
                let mut chars = word.chars();
                chars
                    .next()
                    .map(|first| first.to_uppercase().chain(chars).collect())
                    .unwrap_or_default()
            })
            .collect();
        format!("Voice Assistant ({})", title.join(" "))
    }

    fn sensor_topic(&self, leaf: &str) -> String {
        format!("homeassistant/sensor/{}/{leaf}", self.device_id)
    }

    fn mute_topic(&self, leaf: &str) -> String {
        format!("homeassistant/switch/{}_mute/{leaf}", self.device_id)
    }

    /// Sensor discovery topic
    #[must_use]
    pub fn config_topic(&self) -> String {
        self.sensor_topic("config")
    }

    /// Sensor state topic
    #[must_use]
    pub fn state_topic(&self) -> String {
        self.sensor_topic("state")
    }

    /// Sensor attributes topic
    #[must_use]
    pub fn attributes_topic(&self) -> String {
        self.sensor_topic("attributes")
    }

    /// Mute switch discovery topic
    #[must_use]
    pub fn mute_config_topic(&self) -> String {
        self.mute_topic("config")
    }

    /// Mute switch state topic
    #[must_use]
    pub fn mute_state_topic(&self) -> String {
        self.mute_topic("state")
    }

    /// Mute switch command topic
    #[must_use]
    pub fn mute_command_topic(&self) -> String {
        self.mute_topic("set")
    }

    /// Retained discovery configs for the sensor and the mute switch
    #[must_use]
    pub fn discovery(&self) -> Vec<Publication> {
        let device = json!({
            "identifiers": [self.device_id],
            "name": self.display_name(),
            "manufacturer": "wakegate",
            "model": "Voice Assistant",
        });

        let sensor = json!({
            "name": "Voice Assistant",
            "unique_id": self.device_id,
            "state_topic": self.state_topic(),
            "json_attributes_topic": self.attributes_topic(),
            "icon": "mdi:account-voice",
            "device": device,
        });

        let switch = json!({
            "name": "Mute",
            "unique_id": format!("{}_mute", self.device_id),
            "command_topic": self.mute_command_topic(),
            "state_topic": self.mute_state_topic(),
            "payload_on": "ON",
            "payload_off": "OFF",
            "icon": "mdi:microphone-off",
            "device": device,
        });

        vec![
            Publication::retained(self.config_topic(), sensor.to_string()),
            Publication::retained(self.mute_config_topic(), switch.to_string()),
        ]
    }

    /// Retained state and attributes for a change
    #[must_use]
    pub fn state_publications(&self, change: &StateChange) -> Vec<Publication> {
        vec![
            Publication::retained(self.state_topic(), change.state.as_str()),
            Publication::retained(self.attributes_topic(), change.attributes().to_string()),
        ]
    }

    /// Retained mute switch state
    #[must_use]
    pub fn mute_publication(&self, muted: bool) -> Publication {
        Publication::retained(self.mute_state_topic(), if muted { "ON" } else { "OFF" })
    }
}

/// Parse a mute switch command payload
///
/// Only the exact strings `ON` and `OFF` are accepted.
#[must_use]
pub fn parse_mute_command(payload: &str) -> Option<bool> {
    match payload {
        "ON" => Some(true),
        "OFF" => Some(false),
        _ => None,
    }
}
