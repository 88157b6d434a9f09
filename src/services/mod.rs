//! Network services for MQTT integration.
//!
//! - [`MqttServiceRunner`]: platform-agnostic command router over any
//!   [`MqttClient`](crate::traits::MqttClient) (`mqtt` or `esp32-mqtt`)
//! - `mqtt`: desktop `rumqttc` client (`mqtt` feature)
//!
//! The runner owns the rotor backend, LNB service, and config store, so a
//! single main loop drives everything:
//!
//! ```ignore
//! let mut runner = MqttServiceRunner::new(rotor, client, lnb, store, config);
//! runner.announce()?;
//! runner.subscribe_control_topics()?;
//! loop {
//!     runner.poll()?;
//!     runner.publish_if_changed()?;
//! }
//! ```

#[cfg(feature = "mqtt")]
pub mod mqtt;

// MQTT service runner (platform-agnostic)
pub mod mqtt_runner;

#[cfg(feature = "mqtt")]
pub use mqtt::*;

pub use mqtt_runner::*;
