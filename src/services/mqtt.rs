//! Desktop MQTT client built on `rumqttc`.
//!
//! [`RumqttClient`] adapts rumqttc's async event loop to the synchronous
//! [`MqttClient`] trait so the same [`MqttServiceRunner`](super::MqttServiceRunner)
//! drives both desktop and ESP32 builds:
//!
//! - A tokio task polls the event loop and forwards incoming publishes over
//!   a channel that `try_recv()` drains
//! - `publish`/`subscribe` enqueue requests without blocking
//! - The broker holds a retained `offline` last will on
//!   `<prefix>/availability`; `online` is re-published on every connect
//! - Subscriptions are replayed after a reconnect
//!
//! ```ignore
//! let config = MqttRuntimeConfig::from_config(&runtime.mqtt);
//! let client = RumqttClient::spawn(&config)?;
//! let mut runner = MqttServiceRunner::new(rotor, client, lnb, store, runtime);
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, LastWill, MqttOptions, Packet, QoS};
use tokio::task::JoinHandle;

use crate::config::MqttConfig;
use crate::traits::{MqttClient, MqttMessage};

// ============================================================================
// Configuration
// ============================================================================

/// Runtime MQTT client configuration for `rumqttc`.
///
/// This struct uses `String` for runtime compatibility with the `rumqttc` library.
/// For embedded/no-alloc contexts, use [`crate::config::MqttConfig`] which uses
/// fixed-size `ShortString` types and convert with [`MqttRuntimeConfig::from_config`].
#[derive(Debug, Clone)]
pub struct MqttRuntimeConfig {
    /// MQTT broker hostname
    pub host: String,
    /// MQTT broker port
    pub port: u16,
    /// Client ID
    pub client_id: String,
    /// Topic prefix (default: "diseqc")
    pub topic_prefix: String,
    /// Username, empty for anonymous
    pub username: String,
    /// Password
    pub password: String,
    /// Keep-alive interval in seconds
    pub keep_alive_secs: u16,
    /// Delay before retrying after a connection error
    pub retry_delay: Duration,
}

impl Default for MqttRuntimeConfig {
    fn default() -> Self {
        Self::from_config(&MqttConfig::default())
    }
}

impl MqttRuntimeConfig {
    /// Create a new config with the given broker address
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    /// Create from shared MqttConfig
    pub fn from_config(config: &MqttConfig) -> Self {
        Self {
            host: config.broker.as_str().to_string(),
            port: config.port,
            client_id: config.client_id.as_str().to_string(),
            topic_prefix: config.topic_prefix.as_str().to_string(),
            username: config.username.as_str().to_string(),
            password: config.password.as_str().to_string(),
            keep_alive_secs: 30,
            retry_delay: Duration::from_secs(5),
        }
    }

    /// Set the client ID
    pub fn client_id(mut self, id: impl Into<String>) -> Self {
        self.client_id = id.into();
        self
    }

    /// Set the topic prefix
    pub fn topic_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.topic_prefix = prefix.into();
        self
    }

    /// Set the reconnect delay
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// `<prefix>/availability`
    pub fn availability_topic(&self) -> String {
        format!("{}/availability", self.topic_prefix)
    }

    /// Broker options including keep-alive, credentials and the last will.
    pub fn options(&self) -> MqttOptions {
        let mut options = MqttOptions::new(&self.client_id, &self.host, self.port);
        options.set_keep_alive(Duration::from_secs(u64::from(self.keep_alive_secs)));
        options.set_last_will(LastWill::new(
            self.availability_topic(),
            "offline",
            QoS::AtLeastOnce,
            true,
        ));
        if !self.username.is_empty() {
            options.set_credentials(&self.username, &self.password);
        }
        options
    }
}

/// MQTT-related errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MqttError {
    /// Client could not be started
    #[error("MQTT connect failed: {0}")]
    Connect(String),
    /// Failed to subscribe to topic
    #[error("MQTT subscribe failed: {0}")]
    Subscribe(String),
    /// Failed to publish message
    #[error("MQTT publish failed: {0}")]
    Publish(String),
}

// ============================================================================
// Client
// ============================================================================

/// [`MqttClient`] backed by a background rumqttc event loop.
pub struct RumqttClient {
    client: AsyncClient,
    incoming: Receiver<MqttMessage>,
    connected: Arc<AtomicBool>,
    subscriptions: Arc<Mutex<Vec<String>>>,
    task: JoinHandle<()>,
}

impl RumqttClient {
    /// Starts the event loop task. Must be called from within a tokio runtime.
    pub fn spawn(config: &MqttRuntimeConfig) -> Result<Self, MqttError> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| MqttError::Connect(e.to_string()))?;

        let (client, eventloop) = AsyncClient::new(config.options(), 32);
        let (tx, incoming) = mpsc::channel();
        let connected = Arc::new(AtomicBool::new(false));
        let subscriptions = Arc::new(Mutex::new(Vec::new()));

        let driver = EventLoopDriver {
            client: client.clone(),
            tx,
            connected: Arc::clone(&connected),
            subscriptions: Arc::clone(&subscriptions),
            availability: config.availability_topic(),
            retry_delay: config.retry_delay,
        };
        let task = handle.spawn(driver.run(eventloop));

        log::info!("MQTT client for {}:{} started", config.host, config.port);
        Ok(Self {
            client,
            incoming,
            connected,
            subscriptions,
            task,
        })
    }

    /// Topics subscribed so far.
    pub fn subscriptions(&self) -> Vec<String> {
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Drop for RumqttClient {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl MqttClient for RumqttClient {
    type Error = MqttError;

    fn publish(&mut self, topic: &str, payload: &[u8], retain: bool) -> Result<(), MqttError> {
        self.client
            .try_publish(topic, QoS::AtMostOnce, retain, payload.to_vec())
            .map_err(|e| MqttError::Publish(e.to_string()))
    }

    fn subscribe(&mut self, topic: &str) -> Result<(), MqttError> {
        self.client
            .try_subscribe(topic, QoS::AtLeastOnce)
            .map_err(|e| MqttError::Subscribe(e.to_string()))?;
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(topic.to_string());
        Ok(())
    }

    fn try_recv(&mut self) -> Option<MqttMessage> {
        match self.incoming.try_recv() {
            Ok(msg) => Some(msg),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.connected.store(false, Ordering::Relaxed);
                None
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }
}

// ============================================================================
// Event Loop
// ============================================================================

struct EventLoopDriver {
    client: AsyncClient,
    tx: Sender<MqttMessage>,
    connected: Arc<AtomicBool>,
    subscriptions: Arc<Mutex<Vec<String>>>,
    availability: String,
    retry_delay: Duration,
}

impl EventLoopDriver {
    async fn run(self, mut eventloop: EventLoop) {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    self.connected.store(true, Ordering::Relaxed);
                    log::info!("MQTT connected");
                    self.on_connect();
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    let msg = MqttMessage::new(publish.topic, publish.payload.to_vec());
                    if self.tx.send(msg).is_err() {
                        break;
                    }
                }
                Ok(Event::Incoming(Packet::Disconnect)) => {
                    self.connected.store(false, Ordering::Relaxed);
                }
                Ok(_) => {}
                Err(e) => {
                    self.connected.store(false, Ordering::Relaxed);
                    log::warn!("MQTT connection error: {}", e);
                    tokio::time::sleep(self.retry_delay).await;
                }
            }
        }
    }

    fn on_connect(&self) {
        if let Err(e) = self
            .client
            .try_publish(&self.availability, QoS::AtLeastOnce, true, "online")
        {
            log::warn!("availability publish failed: {}", e);
        }
        let topics = self
            .subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for topic in topics {
            if let Err(e) = self.client.try_subscribe(&topic, QoS::AtLeastOnce) {
                log::warn!("resubscribe to {} failed: {}", topic, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ========================================================================
    // MqttRuntimeConfig tests
    // ========================================================================

    #[test]
    fn test_mqtt_config_default() {
        let config = MqttRuntimeConfig::default();
        assert_eq!(config.host, "192.168.1.50");
        assert_eq!(config.port, 1883);
        assert_eq!(config.client_id, "diseqc_controller");
        assert_eq!(config.topic_prefix, "diseqc");
        assert_eq!(config.keep_alive_secs, 30);
    }

    #[test]
    fn test_mqtt_config_builder_chaining() {
        let config = MqttRuntimeConfig::new("broker.local", 8883)
            .client_id("roof")
            .topic_prefix("dish")
            .retry_delay(Duration::from_millis(100));

        assert_eq!(config.host, "broker.local");
        assert_eq!(config.port, 8883);
        assert_eq!(config.client_id, "roof");
        assert_eq!(config.availability_topic(), "dish/availability");
        assert_eq!(config.retry_delay, Duration::from_millis(100));
    }

    #[test]
    fn test_mqtt_config_from_config() {
        let shared = MqttConfig::default()
            .with_broker("mqtt.test.com")
            .with_port(1884)
            .with_auth("dish", "secret");

        let config = MqttRuntimeConfig::from_config(&shared);
        assert_eq!(config.host, "mqtt.test.com");
        assert_eq!(config.port, 1884);
        assert_eq!(config.username, "dish");
        assert_eq!(config.password, "secret");
    }

    #[test]
    fn test_options_carry_broker_and_last_will() {
        let options = MqttRuntimeConfig::new("10.0.0.2", 1883).options();
        assert_eq!(options.broker_address(), ("10.0.0.2".to_string(), 1883));
        assert_eq!(options.client_id(), "diseqc_controller");
        assert_eq!(options.keep_alive(), Duration::from_secs(30));
        assert!(options.last_will().is_some());
        assert!(options.credentials().is_none());
    }

    #[test]
    fn test_options_with_credentials() {
        let shared = MqttConfig::default().with_auth("user", "pw");
        let options = MqttRuntimeConfig::from_config(&shared).options();
        assert!(options.credentials().is_some());
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            MqttError::Publish("queue full".into()).to_string(),
            "MQTT publish failed: queue full"
        );
    }

    // ========================================================================
    // RumqttClient tests
    // ========================================================================

    #[test]
    fn test_spawn_requires_runtime() {
        let result = RumqttClient::spawn(&MqttRuntimeConfig::default());
        assert!(matches!(result, Err(MqttError::Connect(_))));
    }

    #[tokio::test]
    async fn test_unreachable_broker_stays_disconnected() {
        let config = MqttRuntimeConfig::new("127.0.0.1", 1).retry_delay(Duration::from_millis(10));
        let mut client = RumqttClient::spawn(&config).unwrap();

        client.subscribe("diseqc/command/halt").unwrap();
        client.publish("diseqc/status/state", b"idle", true).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(!client.is_connected());
        assert!(client.try_recv().is_none());
        assert_eq!(client.subscriptions(), vec!["diseqc/command/halt".to_string()]);
    }
}
