//! MQTT event bus

use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use crate::message::EventMessage;
use crate::CloudError;

/// Wait between reconnection attempts
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Time allowed for the DISCONNECT packet to go out on shutdown
const DISCONNECT_GRACE: Duration = Duration::from_secs(1);

/// Outgoing request queue depth
const REQUEST_CAPACITY: usize = 10;

/// Delivered-event queue depth
const DELIVERY_CAPACITY: usize = 64;

/// Event bus configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Whether the node talks to the broker at all
    pub enabled: bool,
    /// MQTT broker host
    pub broker_url: String,
    /// MQTT port
    pub broker_port: u16,
    /// Keep-alive interval (seconds)
    pub keep_alive_secs: u64,
    /// Fixed client id; generated from the node role when unset
    pub client_id: Option<String>,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            broker_url: "localhost".to_string(),
            broker_port: 1883,
            keep_alive_secs: 60,
            client_id: None,
        }
    }
}

impl BusConfig {
    /// Client id for a node with the given role
    pub fn client_id_for(&self, role: &str) -> String {
        match &self.client_id {
            Some(id) => id.clone(),
            None => {
                let suffix: String = Uuid::new_v4().simple().to_string().chars().take(8).collect();
                format!("{}-{}", role, suffix)
            }
        }
    }

    fn options(&self, client_id: &str) -> MqttOptions {
        let mut options = MqttOptions::new(client_id, &self.broker_url, self.broker_port);
        options.set_keep_alive(Duration::from_secs(self.keep_alive_secs.max(5)));
        options
    }
}

/// Raw message received on a subscribed topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Connection to the MQTT broker.
///
/// The connection is driven by a background task that reconnects on error.
pub struct EventBus {
    client: AsyncClient,
    client_id: String,
    driver: JoinHandle<()>,
}

impl EventBus {
    /// Publish-only connection
    pub fn connect(config: &BusConfig, role: &str) -> Self {
        let client_id = config.client_id_for(role);
        let (client, eventloop) = AsyncClient::new(config.options(&client_id), REQUEST_CAPACITY);
        let driver = tokio::spawn(drive(eventloop, client.clone(), None));

        info!(
            "MQTT client {} connecting to {}:{}",
            client_id, config.broker_url, config.broker_port
        );
        Self {
            client,
            client_id,
            driver,
        }
    }

    /// Connection subscribed to `topic`.
    ///
    /// Deliveries are queued on the returned receiver in arrival order. The
    /// subscription is renewed after every reconnect.
    pub fn subscribe(
        config: &BusConfig,
        role: &str,
        topic: &str,
    ) -> (Self, mpsc::Receiver<Delivery>) {
        let client_id = config.client_id_for(role);
        let (client, eventloop) = AsyncClient::new(config.options(&client_id), REQUEST_CAPACITY);
        let (tx, rx) = mpsc::channel(DELIVERY_CAPACITY);
        let subscription = Subscription {
            topic: topic.to_string(),
            deliveries: tx,
        };
        let driver = tokio::spawn(drive(eventloop, client.clone(), Some(subscription)));

        info!(
            "MQTT client {} subscribing to {} on {}:{}",
            client_id, topic, config.broker_url, config.broker_port
        );
        (
            Self {
                client,
                client_id,
                driver,
            },
            rx,
        )
    }

    /// Queue an event for publishing (QoS 1).
    ///
    /// Never waits: while the broker is unreachable the request queue fills
    /// up and further publishes are rejected instead of blocking the caller.
    pub fn publish(&self, topic: &str, message: &EventMessage) -> Result<(), CloudError> {
        let payload = message.to_payload()?;
        self.client
            .try_publish(topic, QoS::AtLeastOnce, false, payload)
            .map_err(|e| CloudError::Publish(e.to_string()))?;
        debug!("Published {} on {}", message.event, topic);
        Ok(())
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Send DISCONNECT and stop the connection task.
    ///
    /// Bounded by a short grace period even when the broker is gone.
    pub async fn disconnect(mut self) {
        if let Err(e) = self.client.try_disconnect() {
            warn!("MQTT disconnect request failed: {}", e);
        }
        if tokio::time::timeout(DISCONNECT_GRACE, &mut self.driver).await.is_err() {
            debug!("MQTT driver did not stop in time, aborting");
        }
        self.driver.abort();
        info!("MQTT client {} disconnected", self.client_id);
    }
}

impl Drop for EventBus {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

struct Subscription {
    topic: String,
    deliveries: mpsc::Sender<Delivery>,
}

/// Poll the MQTT event loop until a disconnect is sent or the delivery queue closes
async fn drive(mut eventloop: EventLoop, client: AsyncClient, subscription: Option<Subscription>) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                info!("Connected to MQTT broker");
                if let Some(subscription) = &subscription {
                    if let Err(e) = client.try_subscribe(subscription.topic.as_str(), QoS::AtLeastOnce) {
                        error!("Failed to subscribe to {}: {}", subscription.topic, e);
                    }
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let Some(subscription) = &subscription else {
                    continue;
                };
                let delivery = Delivery {
                    topic: publish.topic,
                    payload: publish.payload.to_vec(),
                };
                if subscription.deliveries.send(delivery).await.is_err() {
                    debug!("Delivery queue closed, stopping MQTT driver");
                    break;
                }
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                debug!("MQTT disconnect sent");
                break;
            }
            Ok(event) => trace!("MQTT event: {:?}", event),
            Err(e) => {
                error!("MQTT error: {}", e);
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    }
}
