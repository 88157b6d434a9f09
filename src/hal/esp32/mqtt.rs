//! MQTT over `esp-idf-svc`.
//!
//! The broker keeps a retained `offline` last will on `<prefix>/availability`.
//! Inbound publishes are forwarded from the connection thread through a
//! channel. After a reconnect the next [`MqttClient::try_recv`] call restores
//! every subscription and republishes `online`, so the router never has to
//! know the link dropped.
//!
//! ```ignore
//! use diseqc_rotor::config::MqttConfig;
//! use diseqc_rotor::hal::esp32::Esp32Mqtt;
//! use diseqc_rotor::traits::MqttClient;
//!
//! let mut mqtt = Esp32Mqtt::new(&MqttConfig::default().with_broker("192.168.1.50"))?;
//! mqtt.subscribe("diseqc/command/halt")?;
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use esp_idf_svc::mqtt::client::{
    EspMqttClient, EspMqttConnection, EventPayload, LwtConfiguration, MqttClientConfiguration, QoS,
};

use crate::config::MqttConfig;
use crate::traits::{MqttClient, MqttMessage};

const KEEP_ALIVE: Duration = Duration::from_secs(30);
const EVENT_STACK: usize = 6 * 1024;

/// ESP32 MQTT client errors.
#[derive(Debug, thiserror::Error)]
pub enum Esp32MqttError {
    /// Publish rejected by the client.
    #[error("MQTT publish to {topic} failed: {reason}")]
    Publish {
        /// Target topic.
        topic: String,
        /// Driver error text.
        reason: String,
    },
    /// Subscribe rejected by the client.
    #[error("MQTT subscribe to {topic} failed: {reason}")]
    Subscribe {
        /// Requested filter.
        topic: String,
        /// Driver error text.
        reason: String,
    },
}

/// Link flags shared with the connection thread.
#[derive(Default)]
struct LinkState {
    connected: AtomicBool,
    /// Set on every `Connected` event, cleared once the session is restored.
    needs_restore: AtomicBool,
}

/// [`MqttClient`] backed by `EspMqttClient`.
pub struct Esp32Mqtt {
    client: EspMqttClient<'static>,
    inbound: Receiver<MqttMessage>,
    link: Arc<LinkState>,
    availability: String,
    subscriptions: Vec<String>,
}

impl Esp32Mqtt {
    /// Starts the client and its connection thread.
    pub fn new(config: &MqttConfig) -> anyhow::Result<Self> {
        let url = format!("mqtt://{}:{}", config.broker.as_str(), config.port);
        let availability = config.topic("availability");
        let auth = config.has_auth();

        let settings = MqttClientConfiguration {
            client_id: Some(config.client_id.as_str()),
            keep_alive_interval: Some(KEEP_ALIVE),
            username: auth.then(|| config.username.as_str()),
            password: auth.then(|| config.password.as_str()),
            lwt: Some(LwtConfiguration {
                topic: availability.as_str(),
                payload: b"offline",
                qos: QoS::AtLeastOnce,
                retain: true,
            }),
            ..Default::default()
        };
        let (client, connection) = EspMqttClient::new(&url, &settings)?;

        let (forward, inbound) = mpsc::channel();
        let link = Arc::new(LinkState::default());
        let thread_link = Arc::clone(&link);
        thread::Builder::new()
            .name("mqtt-events".into())
            .stack_size(EVENT_STACK)
            .spawn(move || pump_events(connection, forward, thread_link))?;

        log::info!("MQTT client for {} started", url);
        Ok(Self {
            client,
            inbound,
            link,
            availability: availability.as_str().to_string(),
            subscriptions: Vec::new(),
        })
    }

    /// Republishes availability and re-adds every subscription.
    fn restore_session(&mut self) {
        if let Err(e) = self
            .client
            .publish(&self.availability, QoS::AtLeastOnce, true, b"online")
        {
            log::warn!("availability publish failed: {:?}", e);
        }
        for topic in &self.subscriptions {
            if let Err(e) = self.client.subscribe(topic, QoS::AtLeastOnce) {
                log::warn!("resubscribe to {} failed: {:?}", topic, e);
            }
        }
        log::info!("MQTT session restored ({} topics)", self.subscriptions.len());
    }
}

impl MqttClient for Esp32Mqtt {
    type Error = Esp32MqttError;

    fn publish(&mut self, topic: &str, payload: &[u8], retain: bool) -> Result<(), Self::Error> {
        self.client
            .publish(topic, QoS::AtMostOnce, retain, payload)
            .map(|_| ())
            .map_err(|e| Esp32MqttError::Publish {
                topic: topic.to_string(),
                reason: format!("{:?}", e),
            })
    }

    fn subscribe(&mut self, topic: &str) -> Result<(), Self::Error> {
        self.client
            .subscribe(topic, QoS::AtLeastOnce)
            .map_err(|e| Esp32MqttError::Subscribe {
                topic: topic.to_string(),
                reason: format!("{:?}", e),
            })?;
        if !self.subscriptions.iter().any(|t| t == topic) {
            self.subscriptions.push(topic.to_string());
        }
        Ok(())
    }

    fn try_recv(&mut self) -> Option<MqttMessage> {
        if self.link.needs_restore.swap(false, Ordering::AcqRel) {
            self.restore_session();
        }
        match self.inbound.try_recv() {
            Ok(msg) => Some(msg),
            Err(mpsc::TryRecvError::Empty) => None,
            Err(mpsc::TryRecvError::Disconnected) => {
                self.link.connected.store(false, Ordering::Release);
                None
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.link.connected.load(Ordering::Acquire)
    }
}

fn pump_events(mut connection: EspMqttConnection, forward: Sender<MqttMessage>, link: Arc<LinkState>) {
    let mut sessions: u32 = 0;
    loop {
        let event = match connection.next() {
            Ok(event) => event,
            Err(e) => {
                log::warn!("MQTT connection error: {:?}", e);
                thread::sleep(Duration::from_secs(1));
                continue;
            }
        };
        match event.payload() {
            EventPayload::Connected(_) => {
                link.connected.store(true, Ordering::Release);
                // The first session is set up by the caller after `new`.
                if sessions > 0 {
                    link.needs_restore.store(true, Ordering::Release);
                }
                sessions = sessions.saturating_add(1);
                log::info!("MQTT connected (session {})", sessions);
            }
            EventPayload::Disconnected => {
                link.connected.store(false, Ordering::Release);
                log::warn!("MQTT disconnected");
            }
            EventPayload::Received {
                topic: Some(topic),
                data,
                ..
            } => {
                if forward.send(MqttMessage::new(topic, data)).is_err() {
                    log::debug!("MQTT receiver dropped, stopping event thread");
                    return;
                }
            }
            _ => {}
        }
    }
}
