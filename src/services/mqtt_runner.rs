//! MQTT command router for unified polling across platforms.
//!
//! Provides a platform-agnostic MQTT handler that works with any
//! implementation of the `MqttClient` trait and any `RotorBackend`.
//!
//! # Example
//!
//! ```ignore
//! use diseqc_rotor::services::MqttServiceRunner;
//!
//! let mut runner = MqttServiceRunner::new(rotor, mqtt_client, lnb, store, config);
//! runner.announce()?;
//! runner.subscribe_control_topics()?;
//!
//! // In main loop:
//! runner.poll()?;                    // Process incoming commands
//! runner.publish_if_changed()?;      // Publish state changes
//! ```

use crate::config::{split_assignment, ConfigError, ConfigKey, RuntimeConfig, ShortString};
use crate::error::RotorError;
use crate::lnb::{parse_tone, tone_str, Band, LnbService, Polarization};
use crate::messages::{parse_goto_payload, status_json, StatusMessage};
use crate::storage::ConfigStore;
use crate::traits::{LnbController, LnbVoltage, MqttClient, MqttMessage, RotorBackend, RotorStatus};

/// Command topics, relative to `<prefix>/command/`.
pub const COMMAND_TOPICS: [&str; 19] = [
    "goto/angle",
    "track/stop",
    "halt",
    "manual/step_east",
    "manual/step_west",
    "manual/drive_east",
    "manual/drive_west",
    "lnb/voltage",
    "lnb/polarization",
    "lnb/tone",
    "lnb/band",
    "config/get",
    "config/set",
    "config/save",
    "config/reset",
    "config/reload",
    "config/fram_clear",
    "config/fram_dump",
    "status/request",
];

/// Payload required by `config/fram_clear`.
pub const FRAM_CLEAR_TOKEN: &str = "ERASE";

/// Bytes logged by `config/fram_dump` when no count is given.
pub const DEFAULT_DUMP_LEN: usize = 64;

/// Upper bound for `config/fram_dump`.
pub const MAX_DUMP_LEN: usize = 256;

const BUSY_MESSAGE: &str = "Rotor is busy";

// ============================================================================
// MQTT Service Runner
// ============================================================================

/// Unified MQTT command router for both desktop and ESP32.
///
/// Owns the rotor backend, LNB service, and config store, and provides:
/// - Message polling with command dispatch
/// - State change publishing
/// - Periodic full status publishing
pub struct MqttServiceRunner<R, C, L, S>
where
    R: RotorBackend,
    C: MqttClient,
    L: LnbController,
    S: ConfigStore,
{
    rotor: R,
    client: C,
    lnb: LnbService<L>,
    store: S,
    config: RuntimeConfig,
    saved: RuntimeConfig,
    prefix: ShortString,
    last_published: Option<RotorStatus>,
}

impl<R, C, L, S> MqttServiceRunner<R, C, L, S>
where
    R: RotorBackend,
    C: MqttClient,
    L: LnbController,
    S: ConfigStore,
{
    /// Create a new runner.
    ///
    /// `config` becomes both the running and the saved copy. The topic
    /// prefix is fixed here; a later `config/set mqtt.topic_prefix` takes
    /// effect on the next start.
    pub fn new(rotor: R, client: C, lnb: LnbService<L>, store: S, config: RuntimeConfig) -> Self {
        let prefix = config.mqtt.topic_prefix.clone();
        Self {
            rotor,
            client,
            lnb,
            store,
            saved: config.clone(),
            config,
            prefix,
            last_published: None,
        }
    }

    /// Get a reference to the rotor backend.
    pub fn rotor(&self) -> &R {
        &self.rotor
    }

    /// Get a mutable reference to the rotor backend.
    pub fn rotor_mut(&mut self) -> &mut R {
        &mut self.rotor
    }

    /// Get a reference to the MQTT client.
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Get a mutable reference to the MQTT client.
    pub fn client_mut(&mut self) -> &mut C {
        &mut self.client
    }

    /// Get a reference to the LNB service.
    pub fn lnb(&self) -> &LnbService<L> {
        &self.lnb
    }

    /// Get a mutable reference to the config store.
    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// The running configuration.
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// The last saved (or loaded) configuration.
    pub fn saved_config(&self) -> &RuntimeConfig {
        &self.saved
    }

    /// Build a full topic path.
    pub fn topic(&self, suffix: &str) -> String {
        format!("{}/{}", self.prefix, suffix)
    }

    /// Publishes availability, then the full status and effective config.
    pub fn announce(&mut self) -> Result<(), C::Error> {
        let topic = self.topic("availability");
        self.client.publish(&topic, b"online", true)?;
        self.publish_periodic_status()?;
        self.publish_effective_config()
    }

    /// Subscribe to every command topic.
    pub fn subscribe_control_topics(&mut self) -> Result<(), C::Error> {
        for suffix in COMMAND_TOPICS {
            let topic = self.topic(&format!("command/{}", suffix));
            self.client.subscribe(&topic)?;
        }
        Ok(())
    }

    /// Process every pending message, then advance the rotor.
    ///
    /// This should be called regularly in the main loop.
    pub fn poll(&mut self) -> Result<(), C::Error> {
        while let Some(msg) = self.client.try_recv() {
            self.handle_message(&msg)?;
        }
        self.rotor.poll();
        Ok(())
    }

    /// Publish rotor state if it has changed since last publish.
    ///
    /// Returns `true` if state was published, `false` if unchanged.
    pub fn publish_if_changed(&mut self) -> Result<bool, C::Error> {
        let status = self.rotor.status();
        if self.last_published == Some(status) {
            return Ok(false);
        }
        self.publish_rotor_status(&status)?;
        Ok(true)
    }

    /// Force publish everything (heartbeat).
    pub fn publish_periodic_status(&mut self) -> Result<(), C::Error> {
        let status = self.rotor.status();
        self.publish_rotor_status(&status)?;
        self.publish_lnb_voltage()?;
        self.publish_lnb_tone()?;

        let lnb = self.lnb.status();
        let snapshot = StatusMessage::new(self.config.system.device_name.as_str(), &status, &lnb);
        match status_json(&snapshot) {
            Some(json) => self.publish_status("json", json.as_str()),
            None => {
                log::warn!("status snapshot does not fit the JSON buffer");
                Ok(())
            }
        }
    }

    /// Publishes every non-secret key under `status/config/effective/...`.
    pub fn publish_effective_config(&mut self) -> Result<(), C::Error> {
        let entries: Vec<(ConfigKey, ShortString)> = self.config.public_entries().collect();
        for (key, value) in entries {
            let suffix = format!("config/effective/{}", key.topic_path());
            self.publish_status(&suffix, value.as_str())?;
        }
        Ok(())
    }

    // ========================================================================
    // Dispatch
    // ========================================================================

    /// Route one message. Messages outside `<prefix>/command/` are ignored.
    pub fn handle_message(&mut self, msg: &MqttMessage) -> Result<(), C::Error> {
        let Some(command) = msg.command(self.prefix.as_str()) else {
            return Ok(());
        };
        let command = command.to_string();
        let payload = msg.payload_str().unwrap_or("").trim().to_string();
        log::debug!("command {} payload {:?}", command, payload);

        match command.as_str() {
            "goto/angle" => self.on_goto(msg),
            "track/stop" => self.on_stop_tracking(),
            "halt" => self.on_halt(),
            "manual/step_east" => self.on_step(&payload, true),
            "manual/step_west" => self.on_step(&payload, false),
            "manual/drive_east" => self.on_motion(|r| r.drive_east()),
            "manual/drive_west" => self.on_motion(|r| r.drive_west()),
            "lnb/voltage" => self.on_voltage(&payload),
            "lnb/polarization" => self.on_polarization(&payload),
            "lnb/tone" => self.on_tone(&payload),
            "lnb/band" => self.on_band(&payload),
            "config/get" => self.publish_effective_config(),
            "config/set" => self.on_config_set(&payload),
            "config/save" => self.on_config_save(),
            "config/reset" => self.on_config_reset(),
            "config/reload" => self.on_config_reload(),
            "config/fram_clear" => self.on_fram_clear(&payload),
            "config/fram_dump" => self.on_fram_dump(&payload),
            "status/request" => self.publish_periodic_status(),
            other => {
                log::debug!("ignoring unknown command {}", other);
                Ok(())
            }
        }
    }

    // ========================================================================
    // Rotor commands
    // ========================================================================

    fn on_goto(&mut self, msg: &MqttMessage) -> Result<(), C::Error> {
        let Some(req) = parse_goto_payload(&msg.payload) else {
            return self.publish_error("Invalid angle format");
        };
        if req.track {
            self.on_motion(|r| r.track_and_goto_angle(req.angle))
        } else {
            self.on_motion(|r| r.goto_angle(req.angle))
        }
    }

    fn on_step(&mut self, payload: &str, east: bool) -> Result<(), C::Error> {
        let steps = if payload.is_empty() {
            Some(1)
        } else {
            payload.parse::<u8>().ok().filter(|s| (1..=128).contains(s))
        };
        let Some(steps) = steps else {
            return self.publish_error("Invalid step count");
        };
        if east {
            self.on_motion(|r| r.step_east(steps))
        } else {
            self.on_motion(|r| r.step_west(steps))
        }
    }

    /// Busy-checked motion command.
    fn on_motion<F>(&mut self, start: F) -> Result<(), C::Error>
    where
        F: FnOnce(&mut R) -> Result<(), RotorError>,
    {
        if self.rotor.is_busy() {
            return self.publish_error(BUSY_MESSAGE);
        }
        if let Err(e) = start(&mut self.rotor) {
            log::warn!("rotor command failed: {}", e);
            return self.publish_rotor_error(&e);
        }
        let status = self.rotor.status();
        self.publish_rotor_status(&status)
    }

    fn on_stop_tracking(&mut self) -> Result<(), C::Error> {
        if let Err(e) = self.rotor.stop_tracking() {
            self.publish_rotor_error(&e)?;
        }
        let status = self.rotor.status();
        self.publish_rotor_status(&status)
    }

    fn on_halt(&mut self) -> Result<(), C::Error> {
        if let Err(e) = self.rotor.halt() {
            log::error!("halt failed: {}", e);
            self.publish_rotor_error(&e)?;
        }
        let status = self.rotor.status();
        self.publish_rotor_status(&status)
    }

    // ========================================================================
    // LNB commands
    // ========================================================================

    fn on_voltage(&mut self, payload: &str) -> Result<(), C::Error> {
        let Some(voltage) = LnbVoltage::from_text(payload) else {
            return self.publish_error(&format!("Invalid voltage: {}. Use 13 or 18", payload));
        };
        if let Err(e) = self.lnb.set_voltage(voltage) {
            return self.publish_error(&format!("Failed to set voltage: {}", e));
        }
        self.publish_lnb_voltage()
    }

    fn on_polarization(&mut self, payload: &str) -> Result<(), C::Error> {
        let Some(polarization) = Polarization::from_text(payload) else {
            return self.publish_error(&format!(
                "Invalid polarization: {}. Use vertical or horizontal",
                payload
            ));
        };
        if let Err(e) = self.lnb.set_polarization(polarization) {
            return self.publish_error(&format!("Failed to set polarization: {}", e));
        }
        self.publish_lnb_voltage()
    }

    fn on_tone(&mut self, payload: &str) -> Result<(), C::Error> {
        let Some(tone) = parse_tone(payload) else {
            return self.publish_error(&format!("Invalid tone value: {}. Use on or off", payload));
        };
        if let Err(e) = self.lnb.set_tone(tone) {
            return self.publish_error(&format!("Failed to set tone: {}", e));
        }
        self.publish_lnb_tone()
    }

    fn on_band(&mut self, payload: &str) -> Result<(), C::Error> {
        let Some(band) = Band::from_text(payload) else {
            return self.publish_error(&format!("Invalid band: {}. Use low or high", payload));
        };
        if let Err(e) = self.lnb.set_band(band) {
            return self.publish_error(&format!("Failed to set band: {}", e));
        }
        self.publish_lnb_tone()
    }

    /// Voltage and the polarization it implies.
    fn publish_lnb_voltage(&mut self) -> Result<(), C::Error> {
        let status = self.lnb.status();
        self.publish_status("lnb/voltage", status.voltage.as_str())?;
        self.publish_status("lnb/polarization", status.polarization().as_str())
    }

    /// Tone and the band it implies.
    fn publish_lnb_tone(&mut self) -> Result<(), C::Error> {
        let status = self.lnb.status();
        self.publish_status("lnb/tone", tone_str(status.tone))?;
        self.publish_status("lnb/band", status.band().as_str())
    }

    // ========================================================================
    // Config commands
    // ========================================================================

    fn on_config_set(&mut self, payload: &str) -> Result<(), C::Error> {
        let applied = split_assignment(payload).and_then(|(key, value)| {
            if value.is_empty() {
                return Err(ConfigError::MalformedAssignment);
            }
            self.config.set(key, value)?;
            Ok(ConfigKey::parse(key))
        });
        match applied {
            Ok(Some(key)) => {
                log::info!("config {} updated", key);
                self.publish_status("config/updated", key.as_str())?;
                self.publish_effective_config()
            }
            Ok(None) => Ok(()),
            Err(e) => self.publish_error(&e.to_string()),
        }
    }

    fn on_config_save(&mut self) -> Result<(), C::Error> {
        self.saved = self.config.clone();
        let persisted = match self.store.save(&self.config) {
            Ok(()) => true,
            Err(e) => {
                log::error!("config save failed: {}", e);
                false
            }
        };
        self.publish_status("config/saved", "true")?;
        self.publish_status("config/save_result", if persisted { "ok" } else { "ram_only" })?;
        self.publish_status("config/persisted", bool_str(persisted))
    }

    fn on_config_reset(&mut self) -> Result<(), C::Error> {
        self.config = RuntimeConfig::default();
        log::info!("config reset to defaults");
        self.publish_status("config/reset", "true")?;
        self.publish_effective_config()
    }

    fn on_config_reload(&mut self) -> Result<(), C::Error> {
        let source = match self.store.load() {
            Ok(config) => {
                self.saved = config.clone();
                self.config = config;
                "fram"
            }
            Err(e) => {
                log::warn!("config reload from storage failed: {}", e);
                self.config = self.saved.clone();
                "ram"
            }
        };
        self.publish_status("config/reloaded", "true")?;
        self.publish_status("config/reload_source", source)?;
        self.publish_effective_config()
    }

    fn on_fram_clear(&mut self, payload: &str) -> Result<(), C::Error> {
        if payload != FRAM_CLEAR_TOKEN {
            log::warn!("fram_clear ignored: payload must be {}", FRAM_CLEAR_TOKEN);
            return Ok(());
        }
        if let Err(e) = self.store.clear() {
            return self.publish_error(&format!("FRAM clear failed: {}", e));
        }
        self.config = RuntimeConfig::default();
        self.saved = RuntimeConfig::default();
        self.publish_status("config/fram_cleared", "true")?;
        self.publish_effective_config()
    }

    fn on_fram_dump(&mut self, payload: &str) -> Result<(), C::Error> {
        let len = if payload.is_empty() {
            Some(DEFAULT_DUMP_LEN)
        } else {
            payload.parse::<usize>().ok().filter(|n| *n > 0)
        };
        let Some(len) = len else {
            log::warn!("fram_dump expects an optional byte count > 0, got {:?}", payload);
            return Ok(());
        };
        if let Err(e) = self.store.dump(len.min(MAX_DUMP_LEN)) {
            log::error!("FRAM dump failed: {}", e);
        }
        Ok(())
    }

    // ========================================================================
    // Publishing
    // ========================================================================

    fn publish_status(&mut self, suffix: &str, payload: &str) -> Result<(), C::Error> {
        let topic = self.topic(&format!("status/{}", suffix));
        self.client.publish(&topic, payload.as_bytes(), true)
    }

    fn publish_error(&mut self, message: &str) -> Result<(), C::Error> {
        log::warn!("{}", message);
        self.publish_status("error", message)
    }

    fn publish_rotor_error(&mut self, err: &RotorError) -> Result<(), C::Error> {
        match err {
            RotorError::Busy => self.publish_error(BUSY_MESSAGE),
            other => self.publish_error(&other.to_string()),
        }
    }

    /// State, busy and tracking; the angle only once the rotor is idle.
    fn publish_rotor_status(&mut self, status: &RotorStatus) -> Result<(), C::Error> {
        self.publish_status("state", status.state.as_str())?;
        if !status.state.is_in_motion() {
            self.publish_status("position/angle", &format!("{:.1}", status.angle))?;
        }
        self.publish_status("busy", bool_str(status.busy))?;
        self.publish_status("tracking", bool_str(status.tracking))?;
        self.last_published = Some(*status);
        Ok(())
    }
}

fn bool_str(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}
