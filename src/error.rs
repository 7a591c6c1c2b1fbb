//! Error types for the wake gate

use thiserror::Error;

/// Result type alias for gate operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while gating a session
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Wake word inference error
    #[error("wake word error: {0}")]
    WakeWord(String),

    /// State publication error
    #[error("publish error: {0}")]
    Publish(String),

    /// Event channel error
    #[error("channel error: {0}")]
    Channel(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// MQTT client error
    #[error("mqtt error: {0}")]
    Mqtt(#[from] rumqttc::ClientError),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}
