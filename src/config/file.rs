//! TOML configuration file loading
//!
//! Supports `~/.config/wakegate/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::Result;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct ConfigFile {
    /// Wake word detection
    #[serde(default)]
    pub wake: WakeFileConfig,

    /// Interrupt phrase detection
    #[serde(default)]
    pub interrupt: InterruptFileConfig,

    /// Session state publishing
    #[serde(default)]
    pub state: StateFileConfig,

    /// Home Assistant connection
    #[serde(default)]
    pub home_assistant: HomeAssistantFileConfig,

    /// MQTT broker connection
    #[serde(default)]
    pub mqtt: MqttFileConfig,

    /// Spoken when a session starts; empty disables it
    pub greeting: Option<String>,
}

/// Wake word configuration
#[derive(Debug, Default, Deserialize)]
pub struct WakeFileConfig {
    /// Wake word model names (e.g. `["alexa", "hey_jarvis"]`)
    pub keywords: Option<Vec<String>>,

    /// Detection threshold (0.0-1.0)
    pub threshold: Option<f32>,

    /// Seconds to stay awake after a detection
    pub keepalive_secs: Option<f64>,

    /// Samples per inference chunk
    pub chunk_samples: Option<usize>,
}

/// Interrupt configuration
#[derive(Debug, Default, Deserialize)]
pub struct InterruptFileConfig {
    /// Phrases that cancel assistant output
    pub phrases: Option<Vec<String>>,
}

/// State publishing configuration
#[derive(Debug, Default, Deserialize)]
pub struct StateFileConfig {
    /// Room the assistant lives in
    pub room: Option<String>,

    /// Minimum milliseconds between published state changes
    pub debounce_ms: Option<u64>,

    /// Milliseconds to wait on a single publish before giving up
    pub publish_timeout_ms: Option<u64>,
}

/// Home Assistant configuration
#[derive(Debug, Default, Deserialize)]
pub struct HomeAssistantFileConfig {
    /// Base URL (e.g. `http://homeassistant.local:8123`)
    pub url: Option<String>,

    /// Long-lived access token
    pub token: Option<String>,
}

/// MQTT broker configuration
#[derive(Debug, Default, Deserialize)]
pub struct MqttFileConfig {
    /// Broker hostname; MQTT stays off without one
    pub host: Option<String>,

    /// Broker port
    pub port: Option<u16>,

    /// Broker username
    pub username: Option<String>,

    /// Broker password
    pub password: Option<String>,
}

/// Load the TOML config file from the standard path
///
/// Returns `ConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> ConfigFile {
    let Some(path) = config_file_path() else {
        return ConfigFile::default();
    };

    if !path.exists() {
        return ConfigFile::default();
    }

    match read_config_file(&path) {
        Ok(config) => {
            tracing::info!(path = %path.display(), "loaded config file");
            config
        }
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to load config file, using defaults"
            );
            ConfigFile::default()
        }
    }
}

/// Read and parse a config file at an explicit path
///
/// # Errors
///
/// Returns error if the file cannot be read or is not valid TOML
pub fn read_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Return the config file path: `~/.config/wakegate/config.toml`
#[must_use]
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("wakegate").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn parses_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[wake]
keywords = ["hey_jarvis"]
threshold = 0.6

[state]
room = "Living Room"
"#
        )
        .unwrap();

        let config = read_config_file(file.path()).unwrap();
        assert_eq!(config.wake.keywords, Some(vec!["hey_jarvis".to_string()]));
        assert_eq!(config.wake.threshold, Some(0.6));
        assert_eq!(config.wake.keepalive_secs, None);
        assert_eq!(config.state.room.as_deref(), Some("Living Room"));
        assert!(config.home_assistant.url.is_none());
    }

    #[test]
    fn parses_mqtt_and_greeting() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
greeting = "Hi there"

[mqtt]
host = "broker.local"
port = 1884
"#
        )
        .unwrap();

        let config = read_config_file(file.path()).unwrap();
        assert_eq!(config.greeting.as_deref(), Some("Hi there"));
        assert_eq!(config.mqtt.host.as_deref(), Some("broker.local"));
        assert_eq!(config.mqtt.port, Some(1884));
        assert!(config.mqtt.username.is_none());
    }

    #[test]
    fn rejects_invalid_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[wake\nthreshold = ").unwrap();
        assert!(read_config_file(file.path()).is_err());
    }

    #[test]
    fn config_path_is_namespaced() {
        if let Some(path) = config_file_path() {
            assert!(path.ends_with("wakegate/config.toml"));
        }
    }
}
