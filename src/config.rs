//! Runtime and rotor configuration shared by desktop and ESP32 builds.
//!
//! Uses `heapless::String` for `no_std` compatibility while remaining
//! ergonomic to use on desktop with `std`.
//!
//! [`RuntimeConfig`] is the user-editable part (network, MQTT, device
//! identity). It is edited key by key over MQTT and persisted as
//! `key=value` lines:
//!
//! ```text
//! network.use_dhcp=true
//! network.static_ip=192.168.1.100
//! mqtt.broker=192.168.1.50
//! mqtt.port=1883
//! ...
//! ```
//!
//! [`RotorConfig`] holds the motion tuning that is fixed at build time.
//!
//! # Example
//!
//! ```rust
//! use diseqc_rotor::config::{RuntimeConfig, MqttConfig};
//!
//! let mut config = RuntimeConfig::default()
//!     .with_mqtt(MqttConfig::default().with_broker("10.0.0.2"));
//!
//! config.set("mqtt.port", "8883").unwrap();
//! assert_eq!(config.get("mqtt.port").unwrap().as_str(), "8883");
//!
//! let text = config.to_string();
//! let restored = RuntimeConfig::from_lines(&text).unwrap();
//! assert_eq!(restored, config);
//! ```

extern crate alloc;
use alloc::string::{String, ToString};
use core::fmt::{self, Write as _};
use core::time::Duration;

use heapless::String as HString;

use crate::diseqc::ParityMode;
use crate::modulator::BitTiming;

/// Maximum length for short config strings (hostnames, client IDs)
pub const MAX_SHORT_STRING: usize = 64;

/// Maximum length for longer config strings (topics)
pub const MAX_LONG_STRING: usize = 128;

/// Type alias for short config strings
pub type ShortString = HString<MAX_SHORT_STRING>;

/// Type alias for longer config strings
pub type LongString = HString<MAX_LONG_STRING>;

// ============================================================================
// Helper for creating heapless strings
// ============================================================================

fn utf8_prefix(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Create a ShortString from a &str, truncating if too long
pub fn short_string(s: &str) -> ShortString {
    let mut hs = ShortString::new();
    let _ = hs.push_str(utf8_prefix(s, MAX_SHORT_STRING));
    hs
}

/// Create a LongString from a &str, truncating if too long
pub fn long_string(s: &str) -> LongString {
    let mut hs = LongString::new();
    let _ = hs.push_str(utf8_prefix(s, MAX_LONG_STRING));
    hs
}

// ============================================================================
// Errors
// ============================================================================

/// Errors from editing or parsing a [`RuntimeConfig`].
///
/// The display text is what gets published on `status/error`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Empty key.
    #[error("Config key is required")]
    MissingKey,
    /// Key is not one of [`ConfigKey::ALL`].
    #[error("Unknown config key: {0}")]
    UnknownKey(String),
    /// Value failed validation for its key.
    #[error("{0}")]
    InvalidValue(&'static str),
    /// Value does not fit the fixed-capacity field.
    #[error("{0} is too long")]
    TooLong(&'static str),
    /// A `config/set` payload without `=`.
    #[error("Config set payload must be key=value")]
    MalformedAssignment,
    /// Persisted text was empty.
    #[error("Persisted config payload is empty")]
    Empty,
    /// Persisted line without `key=value` shape.
    #[error("Invalid persisted config line: {0}")]
    InvalidLine(String),
}

// ============================================================================
// Keys
// ============================================================================

/// Every editable configuration key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigKey {
    /// `network.use_dhcp`
    UseDhcp,
    /// `network.static_ip`
    StaticIp,
    /// `network.static_subnet`
    StaticSubnet,
    /// `network.static_gateway`
    StaticGateway,
    /// `network.mac`
    Mac,
    /// `mqtt.broker`
    Broker,
    /// `mqtt.port`
    Port,
    /// `mqtt.client_id`
    ClientId,
    /// `mqtt.username`
    Username,
    /// `mqtt.password`
    Password,
    /// `mqtt.topic_prefix`
    TopicPrefix,
    /// `system.device_name`
    DeviceName,
    /// `system.location`
    Location,
}

impl ConfigKey {
    /// All keys in serialization order.
    pub const ALL: [ConfigKey; 13] = [
        ConfigKey::UseDhcp,
        ConfigKey::StaticIp,
        ConfigKey::StaticSubnet,
        ConfigKey::StaticGateway,
        ConfigKey::Mac,
        ConfigKey::Broker,
        ConfigKey::Port,
        ConfigKey::ClientId,
        ConfigKey::Username,
        ConfigKey::Password,
        ConfigKey::TopicPrefix,
        ConfigKey::DeviceName,
        ConfigKey::Location,
    ];

    /// Dotted key name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            ConfigKey::UseDhcp => "network.use_dhcp",
            ConfigKey::StaticIp => "network.static_ip",
            ConfigKey::StaticSubnet => "network.static_subnet",
            ConfigKey::StaticGateway => "network.static_gateway",
            ConfigKey::Mac => "network.mac",
            ConfigKey::Broker => "mqtt.broker",
            ConfigKey::Port => "mqtt.port",
            ConfigKey::ClientId => "mqtt.client_id",
            ConfigKey::Username => "mqtt.username",
            ConfigKey::Password => "mqtt.password",
            ConfigKey::TopicPrefix => "mqtt.topic_prefix",
            ConfigKey::DeviceName => "system.device_name",
            ConfigKey::Location => "system.location",
        }
    }

    /// Looks up a key, ignoring ASCII case and surrounding whitespace.
    pub fn parse(key: &str) -> Option<Self> {
        let key = key.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|k| k.as_str().eq_ignore_ascii_case(key))
    }

    /// Credentials are never echoed on status topics.
    pub const fn is_secret(&self) -> bool {
        matches!(self, ConfigKey::Username | ConfigKey::Password)
    }

    /// Topic path form: `network.static_ip` → `network/static_ip`.
    pub fn topic_path(&self) -> LongString {
        let mut path = LongString::new();
        for c in self.as_str().chars() {
            let _ = path.push(if c == '.' { '/' } else { c });
        }
        path
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Validation helpers
// ============================================================================

/// Parses `true/1/on` and `false/0/off`, case-insensitive.
pub fn parse_bool(value: &str) -> Option<bool> {
    let v = value.trim();
    if ["true", "1", "on"].iter().any(|t| v.eq_ignore_ascii_case(t)) {
        Some(true)
    } else if ["false", "0", "off"].iter().any(|t| v.eq_ignore_ascii_case(t)) {
        Some(false)
    } else {
        None
    }
}

/// Dotted-quad IPv4 check: four decimal parts, each 0..=255.
pub fn is_valid_ipv4(value: &str) -> bool {
    let mut parts = 0;
    for part in value.split('.') {
        parts += 1;
        if part.is_empty() || part.len() > 3 || !part.bytes().all(|b| b.is_ascii_digit()) {
            return false;
        }
        if part.parse::<u16>().map_or(true, |n| n > 255) {
            return false;
        }
    }
    parts == 4
}

/// `XX:XX:XX:XX:XX:XX` with hex digits of either case.
pub fn is_valid_mac(value: &str) -> bool {
    let mut groups = 0;
    for group in value.split(':') {
        groups += 1;
        if group.len() != 2 || !group.bytes().all(|b| b.is_ascii_hexdigit()) {
            return false;
        }
    }
    groups == 6
}

/// Splits a `key=value` assignment, trimming both halves.
///
/// # Examples
///
/// ```
/// use diseqc_rotor::config::split_assignment;
///
/// assert_eq!(split_assignment(" mqtt.port = 1884 ").unwrap(), ("mqtt.port", "1884"));
/// assert!(split_assignment("=1884").is_err());
/// assert!(split_assignment("mqtt.port").is_err());
/// ```
pub fn split_assignment(payload: &str) -> Result<(&str, &str), ConfigError> {
    match payload.find('=') {
        Some(idx) if !payload[..idx].trim().is_empty() => {
            Ok((payload[..idx].trim(), payload[idx + 1..].trim()))
        }
        _ => Err(ConfigError::MalformedAssignment),
    }
}

fn fill(dst: &mut ShortString, key: ConfigKey, value: &str) -> Result<(), ConfigError> {
    if value.len() > MAX_SHORT_STRING {
        return Err(ConfigError::TooLong(key.as_str()));
    }
    dst.clear();
    let _ = dst.push_str(value);
    Ok(())
}

fn fill_non_empty(
    dst: &mut ShortString,
    key: ConfigKey,
    value: &str,
    msg: &'static str,
) -> Result<(), ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::InvalidValue(msg));
    }
    fill(dst, key, value)
}

fn fill_ipv4(
    dst: &mut ShortString,
    key: ConfigKey,
    value: &str,
    msg: &'static str,
) -> Result<(), ConfigError> {
    if !is_valid_ipv4(value) {
        return Err(ConfigError::InvalidValue(msg));
    }
    fill(dst, key, value)
}

// ============================================================================
// Runtime Config
// ============================================================================

/// User-editable device configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RuntimeConfig {
    /// Ethernet addressing
    pub network: NetworkConfig,
    /// MQTT broker connection
    pub mqtt: MqttConfig,
    /// Device identification
    pub system: SystemConfig,
}

impl RuntimeConfig {
    /// Set network configuration
    pub fn with_network(mut self, network: NetworkConfig) -> Self {
        self.network = network;
        self
    }

    /// Set MQTT configuration
    pub fn with_mqtt(mut self, mqtt: MqttConfig) -> Self {
        self.mqtt = mqtt;
        self
    }

    /// Set system configuration
    pub fn with_system(mut self, system: SystemConfig) -> Self {
        self.system = system;
        self
    }

    /// Current value of `key` in its persisted text form.
    pub fn get(&self, key: &str) -> Result<ShortString, ConfigError> {
        let key = ConfigKey::parse(key).ok_or_else(|| ConfigError::UnknownKey(key.into()))?;
        Ok(self.value(key))
    }

    /// Value of a known key.
    pub fn value(&self, key: ConfigKey) -> ShortString {
        let mut out = ShortString::new();
        match key {
            ConfigKey::UseDhcp => {
                let _ = out.push_str(if self.network.use_dhcp { "true" } else { "false" });
            }
            ConfigKey::StaticIp => out = self.network.static_ip.clone(),
            ConfigKey::StaticSubnet => out = self.network.static_subnet.clone(),
            ConfigKey::StaticGateway => out = self.network.static_gateway.clone(),
            ConfigKey::Mac => out = self.network.mac.clone(),
            ConfigKey::Broker => out = self.mqtt.broker.clone(),
            ConfigKey::Port => {
                let _ = write!(out, "{}", self.mqtt.port);
            }
            ConfigKey::ClientId => out = self.mqtt.client_id.clone(),
            ConfigKey::Username => out = self.mqtt.username.clone(),
            ConfigKey::Password => out = self.mqtt.password.clone(),
            ConfigKey::TopicPrefix => out = self.mqtt.topic_prefix.clone(),
            ConfigKey::DeviceName => out = self.system.device_name.clone(),
            ConfigKey::Location => out = self.system.location.clone(),
        }
        out
    }

    /// Validates and applies one key. On error nothing changes.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        if key.trim().is_empty() {
            return Err(ConfigError::MissingKey);
        }
        let parsed = ConfigKey::parse(key).ok_or_else(|| ConfigError::UnknownKey(key.into()))?;
        self.set_key(parsed, value)
    }

    /// [`set`](Self::set) for an already-parsed key.
    pub fn set_key(&mut self, key: ConfigKey, value: &str) -> Result<(), ConfigError> {
        let value = value.trim();
        match key {
            ConfigKey::UseDhcp => {
                self.network.use_dhcp = parse_bool(value).ok_or(ConfigError::InvalidValue(
                    "network.use_dhcp must be true/false",
                ))?;
            }
            ConfigKey::StaticIp => fill_ipv4(
                &mut self.network.static_ip,
                key,
                value,
                "network.static_ip is not a valid IPv4 address",
            )?,
            ConfigKey::StaticSubnet => fill_ipv4(
                &mut self.network.static_subnet,
                key,
                value,
                "network.static_subnet is not a valid IPv4 address",
            )?,
            ConfigKey::StaticGateway => fill_ipv4(
                &mut self.network.static_gateway,
                key,
                value,
                "network.static_gateway is not a valid IPv4 address",
            )?,
            ConfigKey::Mac => {
                if !is_valid_mac(value) {
                    return Err(ConfigError::InvalidValue(
                        "network.mac is not a valid MAC address (format: XX:XX:XX:XX:XX:XX)",
                    ));
                }
                fill(&mut self.network.mac, key, value)?;
            }
            ConfigKey::Broker => fill_non_empty(
                &mut self.mqtt.broker,
                key,
                value,
                "mqtt.broker cannot be empty",
            )?,
            ConfigKey::Port => {
                self.mqtt.port = value
                    .parse::<u16>()
                    .ok()
                    .filter(|p| *p != 0)
                    .ok_or(ConfigError::InvalidValue("mqtt.port must be 1..65535"))?;
            }
            ConfigKey::ClientId => fill_non_empty(
                &mut self.mqtt.client_id,
                key,
                value,
                "mqtt.client_id cannot be empty",
            )?,
            ConfigKey::Username => fill(&mut self.mqtt.username, key, value)?,
            ConfigKey::Password => fill(&mut self.mqtt.password, key, value)?,
            ConfigKey::TopicPrefix => fill_non_empty(
                &mut self.mqtt.topic_prefix,
                key,
                value,
                "mqtt.topic_prefix cannot be empty",
            )?,
            ConfigKey::DeviceName => fill_non_empty(
                &mut self.system.device_name,
                key,
                value,
                "system.device_name cannot be empty",
            )?,
            ConfigKey::Location => fill(&mut self.system.location, key, value)?,
        }
        Ok(())
    }

    /// Parses persisted `key=value` lines on top of the defaults.
    ///
    /// Blank lines are skipped. Any malformed line or rejected value fails
    /// the whole parse.
    pub fn from_lines(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Err(ConfigError::Empty);
        }
        let mut config = Self::default();
        for line in content.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let (key, value) =
                split_assignment(line).map_err(|_| ConfigError::InvalidLine(line.to_string()))?;
            config.set(key, value)?;
        }
        Ok(config)
    }

    /// Iterates `(key, value)` for every key that may be published.
    pub fn public_entries(&self) -> impl Iterator<Item = (ConfigKey, ShortString)> + '_ {
        ConfigKey::ALL
            .iter()
            .filter(|k| !k.is_secret())
            .map(move |k| (*k, self.value(*k)))
    }
}

/// Writes the persisted form: one `key=value` per line, no trailing newline.
impl fmt::Display for RuntimeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, key) in ConfigKey::ALL.iter().enumerate() {
            if i > 0 {
                f.write_char('\n')?;
            }
            write!(f, "{}={}", key, self.value(*key))?;
        }
        Ok(())
    }
}

impl core::str::FromStr for RuntimeConfig {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_lines(s)
    }
}

// ============================================================================
// Network Config
// ============================================================================

/// Ethernet addressing.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NetworkConfig {
    /// Use DHCP instead of the static addresses
    pub use_dhcp: bool,
    /// Static IPv4 address
    pub static_ip: ShortString,
    /// Static subnet mask
    pub static_subnet: ShortString,
    /// Static default gateway
    pub static_gateway: ShortString,
    /// Interface MAC address
    pub mac: ShortString,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            use_dhcp: true,
            static_ip: short_string("192.168.1.100"),
            static_subnet: short_string("255.255.255.0"),
            static_gateway: short_string("192.168.1.1"),
            mac: short_string("02:08:DC:00:00:01"),
        }
    }
}

impl NetworkConfig {
    /// Switch to static addressing
    pub fn with_static(mut self, ip: &str, subnet: &str, gateway: &str) -> Self {
        self.use_dhcp = false;
        self.static_ip = short_string(ip);
        self.static_subnet = short_string(subnet);
        self.static_gateway = short_string(gateway);
        self
    }

    /// Set the MAC address
    pub fn with_mac(mut self, mac: &str) -> Self {
        self.mac = short_string(mac);
        self
    }
}

// ============================================================================
// MQTT Config
// ============================================================================

/// MQTT client configuration
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MqttConfig {
    /// Broker hostname or IP
    pub broker: ShortString,
    /// Broker port
    pub port: u16,
    /// Client ID (should be unique per device)
    pub client_id: ShortString,
    /// Username for authentication (empty = no auth)
    pub username: ShortString,
    /// Password for authentication
    pub password: ShortString,
    /// Topic prefix for all pub/sub (e.g., "diseqc" -> "diseqc/status/state")
    pub topic_prefix: ShortString,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            broker: short_string("192.168.1.50"),
            port: 1883,
            client_id: short_string("diseqc_controller"),
            username: ShortString::new(),
            password: ShortString::new(),
            topic_prefix: short_string("diseqc"),
        }
    }
}

impl MqttConfig {
    /// Set the broker host
    pub fn with_broker(mut self, broker: &str) -> Self {
        self.broker = short_string(broker);
        self
    }

    /// Set the broker port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the client ID
    pub fn with_client_id(mut self, id: &str) -> Self {
        self.client_id = short_string(id);
        self
    }

    /// Set the topic prefix
    pub fn with_topic_prefix(mut self, prefix: &str) -> Self {
        self.topic_prefix = short_string(prefix);
        self
    }

    /// Set authentication credentials
    pub fn with_auth(mut self, username: &str, password: &str) -> Self {
        self.username = short_string(username);
        self.password = short_string(password);
        self
    }

    /// Build a topic string with the configured prefix
    pub fn topic(&self, suffix: &str) -> LongString {
        let mut topic = LongString::new();
        let _ = topic.push_str(self.topic_prefix.as_str());
        let _ = topic.push('/');
        let _ = topic.push_str(suffix);
        topic
    }

    /// Check if authentication is configured
    pub fn has_auth(&self) -> bool {
        !self.username.is_empty()
    }
}

// ============================================================================
// System Config
// ============================================================================

/// Device identification
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SystemConfig {
    /// Human-readable device name
    pub device_name: ShortString,
    /// Free-form installation location
    pub location: ShortString,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            device_name: short_string("diseqc-ctrl"),
            location: short_string("default"),
        }
    }
}

impl SystemConfig {
    /// Set the device name
    pub fn with_device_name(mut self, name: &str) -> Self {
        self.device_name = short_string(name);
        self
    }

    /// Set the location
    pub fn with_location(mut self, location: &str) -> Self {
        self.location = short_string(location);
        self
    }
}

// ============================================================================
// Rotor Config
// ============================================================================

/// Motion tuning for [`RotorService`](crate::rotor::RotorService).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RotorConfig {
    /// Motor spin-up time before a frame may be sent
    pub startup_grace: Duration,
    /// Slew rate used to estimate travel time
    pub degrees_per_second: f32,
    /// Lower bound on the estimated travel time
    pub min_travel: Duration,
    /// Motor window for a manual step command
    pub step_window: Duration,
    /// Sleep between transmitter busy polls
    pub busy_poll_interval: Duration,
    /// Longest `halt` waits for an in-flight frame
    pub halt_wait: Duration,
    /// Parity convention on the wire
    pub parity: ParityMode,
    /// Bit pulse shapes
    pub timing: BitTiming,
}

impl Default for RotorConfig {
    fn default() -> Self {
        Self {
            startup_grace: Duration::from_secs(2),
            degrees_per_second: 1.5,
            min_travel: Duration::from_secs(1),
            step_window: Duration::from_secs(2),
            busy_poll_interval: Duration::from_millis(10),
            halt_wait: Duration::from_millis(200),
            parity: ParityMode::Odd,
            timing: BitTiming::default(),
        }
    }
}

impl RotorConfig {
    /// Set the startup grace
    pub fn with_startup_grace(mut self, grace: Duration) -> Self {
        self.startup_grace = grace;
        self
    }

    /// Set the slew rate (non-positive values are ignored)
    pub fn with_degrees_per_second(mut self, rate: f32) -> Self {
        if rate.is_finite() && rate > 0.0 {
            self.degrees_per_second = rate;
        }
        self
    }

    /// Set the minimum travel estimate
    pub fn with_min_travel(mut self, min: Duration) -> Self {
        self.min_travel = min;
        self
    }

    /// Set the manual step window
    pub fn with_step_window(mut self, window: Duration) -> Self {
        self.step_window = window;
        self
    }

    /// Set the halt wait bound
    pub fn with_halt_wait(mut self, wait: Duration) -> Self {
        self.halt_wait = wait;
        self
    }

    /// Set the parity convention
    pub fn with_parity(mut self, parity: ParityMode) -> Self {
        self.parity = parity;
        self
    }

    /// Set the bit timing
    pub fn with_timing(mut self, timing: BitTiming) -> Self {
        self.timing = timing;
        self
    }

    /// Motor-on time for a move of `degrees`, rounded up to whole seconds.
    ///
    /// # Examples
    ///
    /// ```
    /// use core::time::Duration;
    /// use diseqc_rotor::config::RotorConfig;
    ///
    /// let cfg = RotorConfig::default();
    /// assert_eq!(cfg.travel_time(30.0), Duration::from_secs(20));
    /// assert_eq!(cfg.travel_time(0.1), Duration::from_secs(1));
    /// ```
    pub fn travel_time(&self, degrees: f32) -> Duration {
        let secs = libm_ceil(degrees.abs() / self.degrees_per_second);
        let secs = if secs.is_finite() { secs as u64 } else { 0 };
        Duration::from_secs(secs).max(self.min_travel)
    }

    /// Motor window for continuous drive: a full 160° sweep.
    pub fn drive_window(&self) -> Duration {
        self.travel_time(2.0 * crate::diseqc::MAX_ANGLE)
    }
}

// `f32::ceil` is std-only.
fn libm_ceil(x: f32) -> f32 {
    let t = x as i64 as f32;
    if t < x {
        t + 1.0
    } else {
        t
    }
}

// ============================================================================
// Tests
// ============================================================================
