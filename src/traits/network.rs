//! Network abstraction traits for MQTT.
//!
//! The rotor controller is driven from home-automation systems over MQTT.
//! Commands arrive on `<prefix>/command/...` topics and status values are
//! published, retained, on `<prefix>/status/...`:
//!
//! ```text
//! diseqc/command/goto/angle      - Move to angle: "19.2"
//! diseqc/command/halt            - Immediate stop
//! diseqc/status/state            - idle / moving / stepping_east / ...
//! diseqc/status/position/angle   - Last commanded angle: "19.2"
//! ```

extern crate alloc;
use alloc::string::String;
use alloc::vec::Vec;

// ============================================================================
// Client
// ============================================================================

/// Blocking pub/sub transport used by the command router.
///
/// The router polls from its main loop, so nothing here is async: ESP32
/// clients block on the socket, and the desktop client hands work to a
/// background tokio task. Reconnecting is the client's job; the router only
/// sees failed publishes while the link is down.
///
/// # Example
///
/// ```rust,ignore
/// use diseqc_rotor::traits::MqttClient;
///
/// fn report_angle<M: MqttClient>(client: &mut M, angle: f32) -> Result<(), M::Error> {
///     let text = format!("{:.1}", angle);
///     client.publish("diseqc/status/position/angle", text.as_bytes(), true)
/// }
/// ```
pub trait MqttClient {
    /// Transport failure.
    type Error;

    /// Sends `payload` to `topic`; `retain` asks the broker to keep it for
    /// late subscribers.
    fn publish(&mut self, topic: &str, payload: &[u8], retain: bool) -> Result<(), Self::Error>;

    /// Adds a subscription. Wildcards are passed through untouched.
    fn subscribe(&mut self, topic: &str) -> Result<(), Self::Error>;

    /// Next inbound message, or `None` without waiting.
    fn try_recv(&mut self) -> Option<MqttMessage>;

    /// Link state as last reported by the client.
    fn is_connected(&self) -> bool;
}

/// Inbound publish.
#[derive(Clone, Debug)]
pub struct MqttMessage {
    /// Full topic name.
    pub topic: String,
    /// Raw payload.
    pub payload: Vec<u8>,
}

impl MqttMessage {
    /// Builds a message from anything string- and byte-like.
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }

    /// Payload as text; `None` when it is not UTF-8.
    pub fn payload_str(&self) -> Option<&str> {
        core::str::from_utf8(&self.payload).ok()
    }

    /// The part of the topic after `<prefix>/command/`, if it has that form.
    ///
    /// ```
    /// use diseqc_rotor::traits::MqttMessage;
    ///
    /// let msg = MqttMessage::new("diseqc/command/goto/angle", "19.2");
    /// assert_eq!(msg.command("diseqc"), Some("goto/angle"));
    /// assert_eq!(msg.command("roof"), None);
    /// ```
    pub fn command(&self, prefix: &str) -> Option<&str> {
        self.topic
            .strip_prefix(prefix)?
            .strip_prefix('/')?
            .strip_prefix("command/")
    }
}
