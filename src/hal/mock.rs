//! Mock implementations for testing without hardware.
//!
//! This module provides test doubles for all hardware, network, and rotor
//! traits, enabling development and testing on desktop without a dish.
//!
//! # Available Mocks
//!
//! | Mock | Trait | Purpose |
//! |------|-------|---------|
//! | [`MockEnableLine`] | [`EnableLine`] | Shared output that records every write |
//! | [`MockTransmitter`] | [`WaveformTransmitter`] | Captures pulse programs, optional hold |
//! | [`MockLnb`] | [`LnbController`] | Tracks voltage and tone |
//! | [`MockMemory`] | [`NvMemory`] | 2 KiB RAM-backed FRAM |
//! | [`MockMqtt`] | [`MqttClient`] | Captures pub/sub operations |
//! | [`MockNativeRotor`] | [`RotorBackend`] | Records rotor calls |
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use diseqc_rotor::rotor::{RotorConfig, RotorService};
//! use diseqc_rotor::hal::{MockEnableLine, MockTransmitter};
//! use diseqc_rotor::traits::{RotorBackend, RotorState};
//!
//! let line = MockEnableLine::new();
//! let config = RotorConfig::default().with_startup_grace(Duration::from_millis(1));
//! let mut rotor = RotorService::new(line.clone(), MockTransmitter::new(), config).unwrap();
//!
//! rotor.goto_angle(19.2).unwrap();
//! assert!(line.is_high());
//! assert_eq!(rotor.transmitter().frame_bytes(0), Some(vec![0xE0, 0x31, 0x6E, 0xD1, 0x33]));
//! assert_eq!(rotor.poll(), RotorState::Idle);
//! ```
//!
//! [`EnableLine`]: crate::traits::EnableLine
//! [`WaveformTransmitter`]: crate::traits::WaveformTransmitter
//! [`LnbController`]: crate::traits::LnbController
//! [`NvMemory`]: crate::traits::NvMemory
//! [`MqttClient`]: crate::traits::MqttClient
//! [`RotorBackend`]: crate::traits::RotorBackend

extern crate alloc;
use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;

use crate::diseqc::{BITS_PER_BYTE, MAX_STEPS};
use crate::error::RotorError;
use crate::traits::{
    LnbController, LnbVoltage, MqttClient, MqttMessage, NvMemory, PulsePair, RotorBackend,
    RotorState, WaveformTransmitter,
};

#[cfg(feature = "std")]
use crate::traits::EnableLine;
#[cfg(feature = "std")]
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

// ============================================================================
// Hardware Mocks
// ============================================================================

#[cfg(feature = "std")]
#[derive(Debug, Default)]
struct LineLog {
    level: bool,
    writes: Vec<bool>,
    fail_enable: bool,
    fail_disable: bool,
}

/// Mock motor-enable output.
///
/// Clones share the same underlying line, so a test can keep a handle while
/// the controller owns another.
///
/// # Example
///
/// ```rust
/// use diseqc_rotor::hal::MockEnableLine;
/// use diseqc_rotor::traits::EnableLine;
///
/// let watcher = MockEnableLine::new();
/// let mut owned = watcher.clone();
/// owned.enable().unwrap();
/// owned.disable().unwrap();
///
/// assert!(!watcher.is_high());
/// assert_eq!(watcher.writes(), vec![true, false]);
/// ```
#[cfg(feature = "std")]
#[derive(Clone, Debug, Default)]
pub struct MockEnableLine {
    log: Arc<Mutex<LineLog>>,
}

#[cfg(feature = "std")]
impl MockEnableLine {
    /// Creates a new line, initially low.
    pub fn new() -> Self {
        Self::default()
    }

    fn log(&self) -> MutexGuard<'_, LineLog> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current output level.
    pub fn is_high(&self) -> bool {
        self.log().level
    }

    /// Every level written through [`EnableLine`], oldest first.
    pub fn writes(&self) -> Vec<bool> {
        self.log().writes.clone()
    }

    /// Makes subsequent `enable` writes fail.
    pub fn fail_enable(&self, fail: bool) {
        self.log().fail_enable = fail;
    }

    /// Makes subsequent `disable` writes fail.
    pub fn fail_disable(&self, fail: bool) {
        self.log().fail_disable = fail;
    }

    /// Sets the level without recording a write (simulates power-on state).
    pub fn force_level(&self, level: bool) {
        self.log().level = level;
    }
}

#[cfg(feature = "std")]
impl EnableLine for MockEnableLine {
    type Error = &'static str;

    fn set_enabled(&mut self, enabled: bool) -> Result<(), &'static str> {
        let mut log = self.log();
        if enabled && log.fail_enable {
            return Err("enable write failed");
        }
        if !enabled && log.fail_disable {
            return Err("disable write failed");
        }
        log.level = enabled;
        log.writes.push(enabled);
        Ok(())
    }
}

/// Mock waveform transmitter.
///
/// Every program passed to `transmit` is stored in [`frames`](Self::frames).
/// By default transmissions complete instantly; [`holding`](Self::holding)
/// keeps the transmitter busy until [`complete`](Self::complete) is called.
///
/// # Example
///
/// ```rust
/// use diseqc_rotor::hal::MockTransmitter;
/// use diseqc_rotor::traits::{PulsePair, WaveformTransmitter};
///
/// let mut tx = MockTransmitter::new().holding();
/// tx.transmit(&[PulsePair::new(500, 1000)]).unwrap();
/// assert!(tx.is_busy());
/// assert!(tx.transmit(&[]).is_err());
///
/// tx.complete();
/// assert!(!tx.is_busy());
/// ```
#[derive(Debug, Default)]
pub struct MockTransmitter {
    /// Programs transmitted so far.
    pub frames: Vec<Vec<PulsePair>>,
    /// Whether a program is currently "on the wire".
    pub busy: bool,
    /// Stay busy after `transmit` until `complete()`.
    pub hold: bool,
    /// Fail the next `transmit` call.
    pub fail_next: bool,
    /// Line sampled at each transmit, if set.
    #[cfg(feature = "std")]
    pub line_monitor: Option<MockEnableLine>,
    /// Level of `line_monitor` at each successful transmit.
    #[cfg(feature = "std")]
    pub line_at_transmit: Vec<bool>,
}

impl MockTransmitter {
    /// Creates a transmitter that completes instantly.
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps the transmitter busy after each transmit until `complete()`.
    pub fn holding(mut self) -> Self {
        self.hold = true;
        self
    }

    /// Records the level of `line` at every transmit.
    #[cfg(feature = "std")]
    pub fn with_line_monitor(mut self, line: MockEnableLine) -> Self {
        self.line_monitor = Some(line);
        self
    }

    /// Finishes the in-flight program.
    pub fn complete(&mut self) {
        self.busy = false;
    }

    /// Decodes program `index` back into bytes (parity bits dropped).
    pub fn frame_bytes(&self, index: usize) -> Option<Vec<u8>> {
        let program = self.frames.get(index)?;
        let bytes = program
            .chunks(BITS_PER_BYTE)
            .map(|cell| {
                cell.iter()
                    .take(8)
                    .fold(0u8, |acc, p| (acc << 1) | u8::from(p.high_us < p.low_us))
            })
            .collect();
        Some(bytes)
    }

    /// Decoded bytes of the most recent program.
    pub fn last_frame_bytes(&self) -> Option<Vec<u8>> {
        self.frames
            .len()
            .checked_sub(1)
            .and_then(|i| self.frame_bytes(i))
    }
}

impl WaveformTransmitter for MockTransmitter {
    type Error = &'static str;

    fn transmit(&mut self, pulses: &[PulsePair]) -> Result<(), &'static str> {
        if self.busy {
            return Err("transmitter busy");
        }
        if self.fail_next {
            self.fail_next = false;
            return Err("transmit failed");
        }
        #[cfg(feature = "std")]
        if let Some(line) = &self.line_monitor {
            self.line_at_transmit.push(line.is_high());
        }
        self.frames.push(pulses.to_vec());
        self.busy = self.hold;
        Ok(())
    }

    fn is_busy(&self) -> bool {
        self.busy
    }
}

/// Mock LNB supply.
///
/// # Example
///
/// ```rust
/// use diseqc_rotor::hal::MockLnb;
/// use diseqc_rotor::traits::{LnbController, LnbVoltage};
///
/// let mut lnb = MockLnb::new();
/// lnb.set_voltage(LnbVoltage::V18).unwrap();
/// lnb.set_tone(true).unwrap();
/// assert_eq!(lnb.voltage, Some(LnbVoltage::V18));
/// assert_eq!(lnb.tone, Some(true));
/// ```
#[derive(Debug, Default)]
pub struct MockLnb {
    /// Last voltage written.
    pub voltage: Option<LnbVoltage>,
    /// Last tone state written.
    pub tone: Option<bool>,
    /// Number of register writes.
    pub writes: usize,
    /// Fail every write.
    pub fail: bool,
}

impl MockLnb {
    /// Creates a new mock with nothing written yet.
    pub fn new() -> Self {
        Self::default()
    }
}

impl LnbController for MockLnb {
    type Error = ();

    fn set_voltage(&mut self, voltage: LnbVoltage) -> Result<(), ()> {
        if self.fail {
            return Err(());
        }
        self.voltage = Some(voltage);
        self.writes += 1;
        Ok(())
    }

    fn set_tone(&mut self, enabled: bool) -> Result<(), ()> {
        if self.fail {
            return Err(());
        }
        self.tone = Some(enabled);
        self.writes += 1;
        Ok(())
    }
}

/// Mock non-volatile memory.
///
/// Defaults to the 2 KiB of an MB85RC16, zero-filled.
#[derive(Debug)]
pub struct MockMemory {
    /// Memory contents.
    pub data: Vec<u8>,
    /// Fail every read.
    pub fail_reads: bool,
    /// Fail every write.
    pub fail_writes: bool,
    /// Fail writes once `write_count` reaches this many.
    pub fail_after_writes: Option<usize>,
    /// Number of successful write calls.
    pub write_count: usize,
}

impl MockMemory {
    /// Creates a zero-filled 2048-byte memory.
    pub fn new() -> Self {
        Self::with_capacity(2048)
    }

    /// Creates a zero-filled memory of `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: vec![0; capacity],
            fail_reads: false,
            fail_writes: false,
            fail_after_writes: None,
            write_count: 0,
        }
    }
}

impl Default for MockMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl NvMemory for MockMemory {
    type Error = &'static str;

    fn capacity(&self) -> usize {
        self.data.len()
    }

    fn read(&mut self, address: usize, buf: &mut [u8]) -> Result<(), &'static str> {
        if self.fail_reads {
            return Err("read failed");
        }
        let src = address
            .checked_add(buf.len())
            .and_then(|end| self.data.get(address..end))
            .ok_or("read out of range")?;
        buf.copy_from_slice(src);
        Ok(())
    }

    fn write(&mut self, address: usize, data: &[u8]) -> Result<(), &'static str> {
        if self.fail_writes || self.fail_after_writes.is_some_and(|n| self.write_count >= n) {
            return Err("write failed");
        }
        let dst = address
            .checked_add(data.len())
            .and_then(|end| self.data.get_mut(address..end))
            .ok_or("write out of range")?;
        dst.copy_from_slice(data);
        self.write_count += 1;
        Ok(())
    }
}

// ============================================================================
// Network Mocks
// ============================================================================

/// Mock MQTT client for testing.
///
/// Records all publish/subscribe operations and allows injecting
/// incoming messages for testing message handling.
///
/// # Example
///
/// ```rust
/// use diseqc_rotor::hal::MockMqtt;
///
/// let mut mqtt = MockMqtt::new();
///
/// // Queue incoming message
/// mqtt.queue_message("diseqc/command/goto/angle", b"19.2".to_vec());
///
/// // Check subscriptions
/// mqtt.subscriptions.push("diseqc/command/#".into());
/// assert!(mqtt.is_subscribed("diseqc/command/#"));
///
/// // Check published messages
/// mqtt.published.push(("diseqc/status/state".into(), b"idle".to_vec(), true));
/// assert_eq!(mqtt.published_to("diseqc/status/state").len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct MockMqtt {
    /// Messages that have been published (topic, payload, retain).
    pub published: Vec<(String, Vec<u8>, bool)>,
    /// Topics that have been subscribed to.
    pub subscriptions: Vec<String>,
    /// Queue of incoming messages to be returned by `try_recv()`.
    pub incoming: Vec<MqttMessage>,
    /// Whether the client is connected.
    pub connected: bool,
}

impl MockMqtt {
    /// Creates a new mock MQTT client in connected state.
    pub fn new() -> Self {
        Self {
            connected: true,
            ..Default::default()
        }
    }

    /// Queue an incoming message
    pub fn queue_message(&mut self, topic: impl Into<String>, payload: impl Into<Vec<u8>>) {
        self.incoming.push(MqttMessage::new(topic, payload));
    }

    /// Check if a topic was subscribed to
    pub fn is_subscribed(&self, topic: &str) -> bool {
        self.subscriptions.iter().any(|t| t == topic)
    }

    /// Get published messages for a topic
    pub fn published_to(&self, topic: &str) -> Vec<&(String, Vec<u8>, bool)> {
        self.published
            .iter()
            .filter(|(t, _, _)| t == topic)
            .collect()
    }

    /// Payload of the most recent publish to `topic`, as text.
    pub fn last_payload(&self, topic: &str) -> Option<String> {
        self.published
            .iter()
            .rev()
            .find(|(t, _, _)| t == topic)
            .map(|(_, p, _)| String::from_utf8_lossy(p).into_owned())
    }

    /// Forgets everything published so far.
    pub fn clear_published(&mut self) {
        self.published.clear();
    }
}

impl MqttClient for MockMqtt {
    type Error = ();

    fn publish(&mut self, topic: &str, payload: &[u8], retain: bool) -> Result<(), ()> {
        if !self.connected {
            return Err(());
        }
        self.published.push((topic.into(), payload.to_vec(), retain));
        Ok(())
    }

    fn subscribe(&mut self, topic: &str) -> Result<(), ()> {
        self.subscriptions.push(topic.into());
        Ok(())
    }

    fn try_recv(&mut self) -> Option<MqttMessage> {
        if self.incoming.is_empty() {
            None
        } else {
            Some(self.incoming.remove(0))
        }
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

// ============================================================================
// Rotor Mock
// ============================================================================

/// A call made on [`MockNativeRotor`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RotorCall {
    /// `goto_angle`
    Goto(f32),
    /// `track_and_goto_angle`
    TrackGoto(f32),
    /// `stop_tracking`
    StopTracking,
    /// `halt`
    Halt,
    /// `step_east`
    StepEast(u8),
    /// `step_west`
    StepWest(u8),
    /// `drive_east`
    DriveEast,
    /// `drive_west`
    DriveWest,
}

/// Scripted rotor backend.
///
/// Validates arguments the same way the real service does, records every
/// accepted call, and finishes a move on the next `poll` unless `hold` is set.
#[derive(Debug, Default)]
pub struct MockNativeRotor {
    /// Accepted calls, oldest first.
    pub calls: Vec<RotorCall>,
    /// Current state.
    pub state: RotorState,
    /// Last commanded angle.
    pub angle: f32,
    /// Tracking mode flag.
    pub tracking: bool,
    /// Keep moving across polls.
    pub hold: bool,
    /// Error returned by the next motion command.
    pub fail_next: Option<RotorError>,
}

impl MockNativeRotor {
    /// Creates an idle rotor at 0°.
    pub fn new() -> Self {
        Self::default()
    }

    fn begin(&mut self, call: RotorCall, next: RotorState) -> Result<(), RotorError> {
        if let Some(err) = self.fail_next.take() {
            return Err(err);
        }
        if self.state.is_in_motion() {
            return Err(RotorError::Busy);
        }
        self.calls.push(call);
        self.state = next;
        Ok(())
    }

    fn check_steps(steps: u8) -> Result<(), RotorError> {
        if steps == 0 || steps > MAX_STEPS {
            return Err(RotorError::InvalidParameter("steps must be 1..=128"));
        }
        Ok(())
    }

    fn check_angle(angle: f32) -> Result<(), RotorError> {
        if !angle.is_finite() {
            return Err(RotorError::InvalidParameter("angle must be finite"));
        }
        Ok(())
    }
}

impl RotorBackend for MockNativeRotor {
    fn goto_angle(&mut self, angle: f32) -> Result<(), RotorError> {
        Self::check_angle(angle)?;
        self.begin(RotorCall::Goto(angle), RotorState::Moving)?;
        self.angle = angle;
        Ok(())
    }

    fn track_and_goto_angle(&mut self, angle: f32) -> Result<(), RotorError> {
        Self::check_angle(angle)?;
        self.begin(RotorCall::TrackGoto(angle), RotorState::Moving)?;
        self.angle = angle;
        self.tracking = true;
        Ok(())
    }

    fn stop_tracking(&mut self) -> Result<(), RotorError> {
        self.calls.push(RotorCall::StopTracking);
        self.tracking = false;
        Ok(())
    }

    fn halt(&mut self) -> Result<(), RotorError> {
        self.calls.push(RotorCall::Halt);
        self.state = RotorState::Idle;
        self.tracking = false;
        Ok(())
    }

    fn step_east(&mut self, steps: u8) -> Result<(), RotorError> {
        Self::check_steps(steps)?;
        self.begin(RotorCall::StepEast(steps), RotorState::SteppingEast)
    }

    fn step_west(&mut self, steps: u8) -> Result<(), RotorError> {
        Self::check_steps(steps)?;
        self.begin(RotorCall::StepWest(steps), RotorState::SteppingWest)
    }

    fn drive_east(&mut self) -> Result<(), RotorError> {
        self.begin(RotorCall::DriveEast, RotorState::DrivingEast)
    }

    fn drive_west(&mut self) -> Result<(), RotorError> {
        self.begin(RotorCall::DriveWest, RotorState::DrivingWest)
    }

    fn poll(&mut self) -> RotorState {
        if !self.hold {
            self.state = RotorState::Idle;
        }
        self.state
    }

    fn is_busy(&self) -> bool {
        self.state.is_in_motion()
    }

    fn current_angle(&self) -> f32 {
        self.angle
    }

    fn state(&self) -> RotorState {
        self.state
    }

    fn is_tracking(&self) -> bool {
        self.tracking
    }
}

// ============================================================================
// Tests
// ============================================================================
