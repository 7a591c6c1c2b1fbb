//! MQTT link to Home Assistant
//!
//! Publishes discovery, state and mute switch messages as retained MQTT
//! messages and listens on the mute switch command topic. Commands arrive as
//! [`Event::Mute`] on the sender handed to [`MqttSink::connect`].

use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, EventLoop, LastWill, MqttOptions, Outgoing, Packet, QoS};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{DeviceIdentity, Publication, SessionState, StateChange, StateSink, parse_mute_command};
use crate::Result;
use crate::config::MqttConfig;
use crate::events::{Event, EventSender};

const KEEP_ALIVE: Duration = Duration::from_secs(30);
const RECONNECT_DELAY: Duration = Duration::from_secs(2);
const REQUEST_CAPACITY: usize = 32;

/// What the connection task does with one event loop notification
#[derive(Debug, Clone, PartialEq, Eq)]
enum Action {
    Subscribe,
    Mute(bool),
    Stop,
}

/// Retained MQTT publications plus the mute switch command subscription
pub struct MqttSink {
    client: AsyncClient,
    identity: DeviceIdentity,
    connection: Mutex<Option<JoinHandle<()>>>,
    shutdown: CancellationToken,
}

impl MqttSink {
    /// Start the connection task
    ///
    /// Connects in the background and reconnects after failures. Mute
    /// commands go to `commands`. Must be called from within a tokio runtime.
    #[must_use]
    pub fn connect(config: &MqttConfig, identity: DeviceIdentity, commands: EventSender) -> Self {
        let (client, eventloop) = AsyncClient::new(mqtt_options(config, &identity), REQUEST_CAPACITY);
        let shutdown = CancellationToken::new();

        tracing::info!(
            host = %config.host,
            port = config.port,
            device_id = identity.device_id(),
            "connecting to MQTT broker"
        );

        let connection = tokio::spawn(drive(
            eventloop,
            client.clone(),
            identity.mute_command_topic(),
            commands,
            shutdown.clone(),
        ));

        Self {
            client,
            identity,
            connection: Mutex::new(Some(connection)),
            shutdown,
        }
    }

    async fn send(&self, publications: Vec<Publication>) -> Result<()> {
        for publication in publications {
            self.client
                .publish(
                    publication.topic,
                    QoS::AtLeastOnce,
                    publication.retain,
                    publication.payload,
                )
                .await?;
        }
        Ok(())
    }
}

impl Drop for MqttSink {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[async_trait]
impl StateSink for MqttSink {
    fn name(&self) -> &'static str {
        "mqtt"
    }

    async fn announce(&self) -> Result<()> {
        self.send(self.identity.discovery()).await
    }

    async fn publish(&self, change: &StateChange) -> Result<()> {
        self.send(self.identity.state_publications(change)).await
    }

    async fn publish_muted(&self, muted: bool) -> Result<()> {
        self.send(vec![self.identity.mute_publication(muted)]).await
    }

    async fn close(&self) -> Result<()> {
        self.client.disconnect().await?;
        let connection = self.connection.lock().await.take();
        if let Some(connection) = connection
            && let Err(e) = connection.await
        {
            tracing::error!(error = %e, "MQTT connection task failed");
        }
        tracing::info!("MQTT disconnected");
        Ok(())
    }
}

/// Broker options for this device
///
/// The will marks the device offline if the connection drops.
fn mqtt_options(config: &MqttConfig, identity: &DeviceIdentity) -> MqttOptions {
    let mut options = MqttOptions::new(format!("wakegate_{}", identity.device_id()), &config.host, config.port);
    options.set_keep_alive(KEEP_ALIVE);
    options.set_last_will(LastWill::new(
        identity.state_topic(),
        SessionState::Offline.as_str(),
        QoS::AtLeastOnce,
        true,
    ));
    if let Some(username) = &config.username {
        options.set_credentials(username, config.password.as_deref().unwrap_or_default());
    }
    options
}

async fn drive(
    mut eventloop: EventLoop,
    client: AsyncClient,
    command_topic: String,
    commands: EventSender,
    shutdown: CancellationToken,
) {
    loop {
        let notification = tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            notification = eventloop.poll() => notification,
        };

        let event = match notification {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(error = %e, "MQTT connection error, retrying");
                tokio::select! {
                    () = shutdown.cancelled() => break,
                    () = tokio::time::sleep(RECONNECT_DELAY) => continue,
                }
            }
        };

        match classify(&event, &command_topic) {
            Some(Action::Subscribe) => {
                tracing::info!(topic = %command_topic, "MQTT connected, subscribing to mute commands");
                // The event loop is this task, so queue without waiting
                if let Err(e) = client.try_subscribe(command_topic.as_str(), QoS::AtLeastOnce) {
                    tracing::warn!(error = %e, "failed to subscribe to mute commands");
                }
            }
            Some(Action::Mute(muted)) => {
                tracing::info!(muted, "mute command received");
                if commands.send(Event::Mute { muted }).is_err() {
                    tracing::debug!("session gone, dropping mute command");
                }
            }
            Some(Action::Stop) => break,
            None => {}
        }
    }
    tracing::debug!("MQTT connection task stopped");
}

fn classify(event: &rumqttc::Event, command_topic: &str) -> Option<Action> {
    match event {
        rumqttc::Event::Incoming(Packet::ConnAck(_)) => Some(Action::Subscribe),
        rumqttc::Event::Incoming(Packet::Publish(publish)) if publish.topic == command_topic => {
            let payload = String::from_utf8_lossy(&publish.payload);
            let muted = parse_mute_command(payload.trim());
            if muted.is_none() {
                tracing::warn!(payload = %payload, "ignoring invalid mute command");
            }
            muted.map(Action::Mute)
        }
        rumqttc::Event::Outgoing(Outgoing::Disconnect) => Some(Action::Stop),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use rumqttc::{ConnAck, ConnectReturnCode, Publish};

    use super::*;

    fn incoming_publish(topic: &str, payload: &str) -> rumqttc::Event {
        rumqttc::Event::Incoming(Packet::Publish(Publish::new(topic, QoS::AtLeastOnce, payload)))
    }

    #[test]
    fn connack_triggers_subscribe() {
        let event = rumqttc::Event::Incoming(Packet::ConnAck(ConnAck::new(ConnectReturnCode::Success, false)));
        assert_eq!(classify(&event, "t/set"), Some(Action::Subscribe));
    }

    #[test]
    fn command_payloads_become_mute_actions() {
        let identity = DeviceIdentity::new("bedroom");
        let topic = identity.mute_command_topic();

        assert_eq!(classify(&incoming_publish(&topic, "ON"), &topic), Some(Action::Mute(true)));
        assert_eq!(classify(&incoming_publish(&topic, "OFF"), &topic), Some(Action::Mute(false)));
        assert_eq!(classify(&incoming_publish(&topic, "on"), &topic), None);
        assert_eq!(classify(&incoming_publish("other/topic", "ON"), &topic), None);
    }

    #[test]
    fn disconnect_stops_the_loop() {
        let event = rumqttc::Event::Outgoing(Outgoing::Disconnect);
        assert_eq!(classify(&event, "t/set"), Some(Action::Stop));
        assert_eq!(classify(&rumqttc::Event::Incoming(Packet::PingResp), "t/set"), None);
    }

    #[test]
    fn options_use_device_identity() {
        let config = MqttConfig {
            host: "broker.local".to_string(),
            port: 1884,
            username: Some("ha".to_string()),
            password: Some("secret".to_string()),
        };
        let options = mqtt_options(&config, &DeviceIdentity::new("Living Room"));

        assert_eq!(options.broker_address(), ("broker.local".to_string(), 1884));
        assert_eq!(options.client_id(), "wakegate_voice_assistant_living_room");
        assert_eq!(options.keep_alive(), KEEP_ALIVE);
    }
}
