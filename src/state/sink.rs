//! State publication sinks
//!
//! Each sink implements [`StateSink`] to deliver state changes to one
//! external observer.

use async_trait::async_trait;
use serde_json::json;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

use super::{DeviceIdentity, Publication, StateChange};
use crate::config::HomeAssistantConfig;
use crate::events::{Event, EventSender};
use crate::{Error, Result};

/// Destination for session state changes
#[async_trait]
pub trait StateSink: Send + Sync {
    /// Sink name for logs
    fn name(&self) -> &'static str;

    /// Register the entity with the observer
    ///
    /// # Errors
    ///
    /// Returns error if the observer is unreachable
    async fn announce(&self) -> Result<()> {
        Ok(())
    }

    /// Deliver one state change
    ///
    /// # Errors
    ///
    /// Returns error if delivery fails
    async fn publish(&self, change: &StateChange) -> Result<()>;

    /// Report the mute switch position
    ///
    /// # Errors
    ///
    /// Returns error if delivery fails
    async fn publish_muted(&self, _muted: bool) -> Result<()> {
        Ok(())
    }

    /// Flush and release the connection after the last publication
    ///
    /// # Errors
    ///
    /// Returns error if the connection cannot be closed cleanly
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Home Assistant REST API sink
///
/// States set through `/api/states` live in Home Assistant's state machine
/// only and are lost when it restarts. Use [`super::MqttSink`] for retained
/// state.
pub struct HomeAssistantSink {
    client: reqwest::Client,
    base_url: String,
    token: String,
    entity_id: String,
}

impl HomeAssistantSink {
    /// Create a sink for the given connection and device
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(config: &HomeAssistantConfig, identity: &DeviceIdentity) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            entity_id: identity.entity_id(),
        })
    }
}

#[async_trait]
impl StateSink for HomeAssistantSink {
    fn name(&self) -> &'static str {
        "home_assistant"
    }

    async fn announce(&self) -> Result<()> {
        let response = self
            .client
            .get(format!("{}/api/", self.base_url))
            .bearer_auth(&self.token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::Publish(format!(
                "Home Assistant API check failed: {}",
                response.status()
            )));
        }

        tracing::info!(entity_id = %self.entity_id, "Home Assistant reachable");
        Ok(())
    }

    async fn publish(&self, change: &StateChange) -> Result<()> {
        let body = json!({
            "state": change.state.as_str(),
            "attributes": change.attributes(),
        });

        let response = self
            .client
            .post(format!("{}/api/states/{}", self.base_url, self.entity_id))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(Error::Publish(format!(
                "Home Assistant rejected state update ({status}): {text}"
            )));
        }

        tracing::debug!(entity_id = %self.entity_id, state = %change.state, "state sent to Home Assistant");
        Ok(())
    }
}

/// Writes retained publications as JSON lines
///
/// Suitable for piping into an MQTT bridge or capturing in tests.
pub struct PublicationSink<W> {
    identity: DeviceIdentity,
    writer: Mutex<W>,
}

impl<W: AsyncWrite + Unpin + Send> PublicationSink<W> {
    /// Create a sink writing to `writer`
    pub fn new(identity: DeviceIdentity, writer: W) -> Self {
        Self {
            identity,
            writer: Mutex::new(writer),
        }
    }

    async fn write(&self, publications: &[Publication]) -> Result<()> {
        let mut writer = self.writer.lock().await;
        for publication in publications {
            let mut line = serde_json::to_vec(publication)?;
            line.push(b'\n');
            writer.write_all(&line).await?;
        }
        writer.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> StateSink for PublicationSink<W> {
    fn name(&self) -> &'static str {
        "publications"
    }

    async fn announce(&self) -> Result<()> {
        self.write(&self.identity.discovery()).await
    }

    async fn publish(&self, change: &StateChange) -> Result<()> {
        self.write(&self.identity.state_publications(change)).await
    }

    async fn publish_muted(&self, muted: bool) -> Result<()> {
        self.write(&[self.identity.mute_publication(muted)]).await
    }
}

/// Forwards state changes into an event channel
pub struct EventSink {
    tx: EventSender,
}

impl EventSink {
    /// Create a sink sending on `tx`
    #[must_use]
    pub const fn new(tx: EventSender) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl StateSink for EventSink {
    fn name(&self) -> &'static str {
        "events"
    }

    async fn publish(&self, change: &StateChange) -> Result<()> {
        self.tx
            .send(Event::StateChanged(change.clone()))
            .map_err(|_| Error::Channel("event channel closed".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Map;

    use super::*;
    use crate::events;
    use crate::state::SessionState;

    #[tokio::test]
    async fn publication_sink_writes_json_lines() {
        let identity = DeviceIdentity::new("bedroom");
        let sink = PublicationSink::new(identity.clone(), Vec::new());

        sink.announce().await.unwrap();
        sink.publish(&StateChange::new(SessionState::Idle, "bedroom", Map::new()))
            .await
            .unwrap();
        sink.publish_muted(true).await.unwrap();

        let written = sink.writer.into_inner();
        let lines: Vec<Publication> = String::from_utf8(written)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();

        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0].topic, identity.config_topic());
        assert_eq!(lines[2].topic, identity.state_topic());
        assert_eq!(lines[2].payload, "idle");
        assert_eq!(lines[4], Publication::retained(identity.mute_state_topic(), "ON"));
    }

    #[tokio::test]
    async fn event_sink_forwards_changes() {
        let (tx, mut rx) = events::channel();
        let sink = EventSink::new(tx);
        let change = StateChange::new(SessionState::Standby, "bedroom", Map::new());

        sink.publish(&change).await.unwrap();
        assert_eq!(rx.recv().await, Some(Event::StateChanged(change)));
    }

    #[tokio::test]
    async fn event_sink_reports_closed_channel() {
        let (tx, rx) = events::channel();
        drop(rx);
        let sink = EventSink::new(tx);
        let change = StateChange::new(SessionState::Standby, "bedroom", Map::new());

        assert!(matches!(sink.publish(&change).await, Err(Error::Channel(_))));
    }
}
