//! Configuration management for the wake gate
//!
//! Values resolve env > TOML file > defaults.

pub mod file;

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::interrupt::DEFAULT_INTERRUPT_PHRASES;
use crate::{Error, Result};

pub use file::ConfigFile;

/// Gate configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Wake word detection
    pub wake: WakeConfig,

    /// Phrases that interrupt assistant output
    pub interrupt_phrases: Vec<String>,

    /// Session state publishing
    pub state: StateConfig,

    /// Home Assistant connection, when configured
    pub home_assistant: Option<HomeAssistantConfig>,

    /// MQTT broker, when configured
    pub mqtt: Option<MqttConfig>,

    /// Spoken when a session starts (`None` stays silent)
    pub greeting: Option<String>,
}

/// Wake word detection configuration
#[derive(Debug, Clone)]
pub struct WakeConfig {
    /// Wake word model names
    pub keywords: Vec<String>,

    /// Detection threshold (0.0-1.0)
    pub threshold: f32,

    /// How long the gate stays open after a detection
    pub keepalive: Duration,

    /// Samples per inference chunk (1280 = 80ms at 16kHz)
    pub chunk_samples: usize,
}

impl Default for WakeConfig {
    fn default() -> Self {
        Self {
            keywords: vec!["alexa".to_string()],
            threshold: 0.5,
            keepalive: Duration::from_secs(5),
            chunk_samples: 1280,
        }
    }
}

/// Session state publishing configuration
#[derive(Debug, Clone)]
pub struct StateConfig {
    /// Room name used for entity IDs
    pub room: String,

    /// Minimum spacing between published state changes
    pub debounce: Duration,

    /// Upper bound on a single publish call
    pub publish_timeout: Duration,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            room: "bedroom".to_string(),
            debounce: Duration::from_millis(300),
            publish_timeout: Duration::from_secs(2),
        }
    }
}

/// Home Assistant REST connection
#[derive(Clone)]
pub struct HomeAssistantConfig {
    /// Base URL
    pub url: String,

    /// Long-lived access token
    pub token: String,
}

impl std::fmt::Debug for HomeAssistantConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HomeAssistantConfig")
            .field("url", &self.url)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// MQTT broker connection
#[derive(Clone)]
pub struct MqttConfig {
    /// Broker hostname
    pub host: String,

    /// Broker port
    pub port: u16,

    /// Username, if the broker requires one
    pub username: Option<String>,

    /// Password for `username`
    pub password: Option<String>,
}

impl std::fmt::Debug for MqttConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Default MQTT broker port
pub const DEFAULT_MQTT_PORT: u16 = 1883;

/// Greeting naming the first wake word: `hey_jarvis` => "Hey jarvis"
#[must_use]
pub fn default_greeting(keyword: &str) -> String {
    let spoken = keyword.trim().replace('_', " ");
    let mut chars = spoken.chars();
    let spoken: String = match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    };
    format!("Hello! Say '{spoken}' to wake me up.")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            wake: WakeConfig::default(),
            interrupt_phrases: DEFAULT_INTERRUPT_PHRASES
                .iter()
                .map(ToString::to_string)
                .collect(),
            state: StateConfig::default(),
            home_assistant: None,
            mqtt: None,
            greeting: Some(default_greeting("alexa")),
        }
    }
}

impl Config {
    /// Load configuration from the environment and the default config file
    ///
    /// # Errors
    ///
    /// Returns error if the resolved configuration is invalid
    pub fn load() -> Result<Self> {
        Self::resolve(file::load_config_file(), |key| std::env::var(key).ok())
    }

    /// Load configuration from the environment and an explicit config file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or the configuration is invalid
    pub fn load_from(path: &Path) -> Result<Self> {
        let fc = file::read_config_file(path)?;
        tracing::info!(path = %path.display(), "loaded config file");
        Self::resolve(fc, |key| std::env::var(key).ok())
    }

    /// Resolve a configuration from a file overlay and an env lookup
    ///
    /// # Errors
    ///
    /// Returns error if the resolved configuration is invalid
    pub fn resolve(fc: ConfigFile, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let wake = WakeConfig {
            keywords: env("WAKEGATE_WAKE_WORDS")
                .map(|s| split_list(&s))
                .or(fc.wake.keywords)
                .unwrap_or(defaults.wake.keywords),
            threshold: env_parse(&env, "WAKEGATE_THRESHOLD")
                .or(fc.wake.threshold)
                .unwrap_or(defaults.wake.threshold),
            keepalive: env_parse::<f64>(&env, "WAKEGATE_KEEPALIVE_SECS")
                .or(fc.wake.keepalive_secs)
                .map_or(Ok(defaults.wake.keepalive), |secs| {
                    positive_secs("keepalive", secs)
                })?,
            chunk_samples: env_parse(&env, "WAKEGATE_CHUNK_SAMPLES")
                .or(fc.wake.chunk_samples)
                .unwrap_or(defaults.wake.chunk_samples),
        };

        let interrupt_phrases = env("WAKEGATE_INTERRUPT_PHRASES")
            .map(|s| split_list(&s))
            .or(fc.interrupt.phrases)
            .unwrap_or(defaults.interrupt_phrases);

        let state = StateConfig {
            room: env("ROOM_NAME")
                .or(fc.state.room)
                .unwrap_or(defaults.state.room),
            debounce: env_parse(&env, "WAKEGATE_DEBOUNCE_MS")
                .or(fc.state.debounce_ms)
                .map_or(defaults.state.debounce, Duration::from_millis),
            publish_timeout: env_parse(&env, "WAKEGATE_PUBLISH_TIMEOUT_MS")
                .or(fc.state.publish_timeout_ms)
                .map_or(defaults.state.publish_timeout, Duration::from_millis),
        };

        let url = env("HOME_ASSISTANT_URL").or(fc.home_assistant.url);
        let token = env("HOME_ASSISTANT_TOKEN").or(fc.home_assistant.token);
        let home_assistant = match (url, token) {
            (Some(url), Some(token)) => Some(HomeAssistantConfig {
                url: url.trim_end_matches('/').to_string(),
                token,
            }),
            (Some(_), None) | (None, Some(_)) => {
                tracing::warn!("Home Assistant needs both URL and token, state sink disabled");
                None
            }
            (None, None) => None,
        };

        let mqtt = env("MQTT_HOST").or(fc.mqtt.host).map(|host| MqttConfig {
            host,
            port: env_parse(&env, "MQTT_PORT")
                .or(fc.mqtt.port)
                .unwrap_or(DEFAULT_MQTT_PORT),
            username: env("MQTT_USERNAME").or(fc.mqtt.username),
            password: env("MQTT_PASSWORD").or(fc.mqtt.password),
        });

        // An empty greeting turns it off
        let greeting = match env("WAKEGATE_GREETING").or(fc.greeting) {
            Some(text) if text.trim().is_empty() => None,
            Some(text) => Some(text),
            None => wake.keywords.first().map(String::as_str).map(default_greeting),
        };

        let config = Self {
            wake,
            interrupt_phrases,
            state,
            home_assistant,
            mqtt,
            greeting,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` describing the first invalid value
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.wake.threshold) {
            return Err(Error::Config(format!(
                "wake threshold must be within 0.0-1.0, got {}",
                self.wake.threshold
            )));
        }
        if self.wake.keywords.is_empty() {
            return Err(Error::Config("at least one wake word is required".to_string()));
        }
        if self.wake.chunk_samples == 0 {
            return Err(Error::Config("chunk size must be at least one sample".to_string()));
        }
        if self.wake.keepalive.is_zero() {
            return Err(Error::Config("keepalive must be positive".to_string()));
        }
        if self.state.room.trim().is_empty() {
            return Err(Error::Config("room name must not be empty".to_string()));
        }
        if let Some(mqtt) = &self.mqtt
            && mqtt.host.trim().is_empty()
        {
            return Err(Error::Config("MQTT host must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Parse an env var, warning and ignoring it when malformed
fn env_parse<T: FromStr>(env: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = env(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring malformed environment value");
            None
        }
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

fn positive_secs(what: &str, secs: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(secs)
        .ok()
        .filter(|d| !d.is_zero())
        .ok_or_else(|| Error::Config(format!("{what} must be a positive number of seconds, got {secs}")))
}
