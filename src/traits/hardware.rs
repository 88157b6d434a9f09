//! Hardware abstraction traits for the rotor front end.
//!
//! This module defines the peripheral interfaces that allow diseqc-rotor to
//! run against real hardware (ESP32 RMT, GPIO, I2C) or desktop mocks.
//!
//! # Key Traits
//!
//! | Trait | Purpose |
//! |-------|---------|
//! | [`WaveformTransmitter`] | Carrier-modulated pulse train output (DiSEqC bus) |
//! | [`EnableLine`] | Rotor motor power output |
//! | [`LnbController`] | LNB supply voltage and 22 kHz tone |
//! | [`NvMemory`] | Byte-addressable non-volatile memory (FRAM) |
//!
//! # Implementation
//!
//! For testing and desktop development, use the mock implementations
//! from [`crate::hal::mock`]. For ESP32 hardware, use the
//! implementations from `hal::esp32` (requires `esp32` feature).
//!
//! # Example
//!
//! ```rust
//! use diseqc_rotor::traits::{EnableLine, WaveformTransmitter, PulsePair};
//! use diseqc_rotor::hal::{MockEnableLine, MockTransmitter};
//!
//! let mut line = MockEnableLine::new();
//! line.enable().unwrap();
//! assert!(line.is_high());
//!
//! let mut tx = MockTransmitter::new();
//! tx.transmit(&[PulsePair::new(500, 1000)]).unwrap();
//! assert_eq!(tx.frames.len(), 1);
//! ```

use core::fmt::Debug;

/// One bit cell on the wire: carrier on for `high_us`, then silence for `low_us`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PulsePair {
    /// Carrier-on duration in microseconds.
    pub high_us: u16,
    /// Carrier-off duration in microseconds.
    pub low_us: u16,
}

impl PulsePair {
    /// Creates a pulse pair.
    #[inline]
    pub const fn new(high_us: u16, low_us: u16) -> Self {
        Self { high_us, low_us }
    }

    /// Total duration of the bit cell in microseconds.
    #[inline]
    pub const fn period_us(&self) -> u32 {
        self.high_us as u32 + self.low_us as u32
    }
}

/// Hardware waveform generator that emits a pulse program once.
///
/// The transmitter is single-slot: one program may be in flight at a time.
/// `transmit` starts the transmission and returns without waiting for it to
/// finish; completion is observed by polling [`is_busy`](Self::is_busy).
///
/// # Implementation Notes
///
/// - The carrier (22 kHz for DiSEqC) is applied during the high periods
/// - The line idles low between and after programs
/// - `transmit` while a program is still in flight must return an error,
///   never queue or drop pulses
pub trait WaveformTransmitter {
    /// Error type for transmitter operations.
    type Error: Debug;

    /// Starts transmitting the given pulse program.
    fn transmit(&mut self, pulses: &[PulsePair]) -> Result<(), Self::Error>;

    /// Returns `true` while a previously started program is still on the wire.
    fn is_busy(&self) -> bool;
}

/// Motor-enable output controlling power to the rotor's drive motor.
///
/// Only [`MotorSafetyController`](crate::motor::MotorSafetyController)
/// should hold one of these.
pub trait EnableLine {
    /// Error type for output writes.
    type Error: Debug;

    /// Drives the output: `true` powers the motor.
    fn set_enabled(&mut self, enabled: bool) -> Result<(), Self::Error>;

    /// Asserts the output.
    fn enable(&mut self) -> Result<(), Self::Error> {
        self.set_enabled(true)
    }

    /// De-asserts the output.
    fn disable(&mut self) -> Result<(), Self::Error> {
        self.set_enabled(false)
    }
}

/// LNB supply voltage.
///
/// 13 V selects vertical polarization, 18 V horizontal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LnbVoltage {
    /// 13 V (vertical polarization).
    #[default]
    V13,
    /// 18 V (horizontal polarization).
    V18,
}

impl LnbVoltage {
    /// Returns the voltage as published on status topics (`"13"` / `"18"`).
    #[inline]
    pub const fn as_str(&self) -> &'static str {
        match self {
            LnbVoltage::V13 => "13",
            LnbVoltage::V18 => "18",
        }
    }

    /// Parse a voltage from text (`"13"` or `"18"`, optional trailing `V`).
    ///
    /// # Examples
    ///
    /// ```
    /// use diseqc_rotor::traits::LnbVoltage;
    ///
    /// assert_eq!(LnbVoltage::from_text("13"), Some(LnbVoltage::V13));
    /// assert_eq!(LnbVoltage::from_text(" 18V "), Some(LnbVoltage::V18));
    /// assert_eq!(LnbVoltage::from_text("15"), None);
    /// ```
    pub fn from_text(s: &str) -> Option<Self> {
        let s = s.trim();
        let s = s
            .strip_suffix('V')
            .or_else(|| s.strip_suffix('v'))
            .unwrap_or(s);
        match s {
            "13" => Some(LnbVoltage::V13),
            "18" => Some(LnbVoltage::V18),
            _ => None,
        }
    }
}

/// LNB power supply and tone generator.
///
/// Register writes with no timing dependency on the positioning core.
pub trait LnbController {
    /// Error type for LNB operations.
    type Error: Debug;

    /// Selects the LNB supply voltage.
    fn set_voltage(&mut self, voltage: LnbVoltage) -> Result<(), Self::Error>;

    /// Enables or disables the continuous 22 kHz tone (high band).
    fn set_tone(&mut self, enabled: bool) -> Result<(), Self::Error>;
}

/// Byte-addressable non-volatile memory.
///
/// Addresses are linear from 0 to `capacity() - 1`; implementations handle
/// any device paging internally.
pub trait NvMemory {
    /// Error type for memory access.
    type Error: Debug;

    /// Total size in bytes.
    fn capacity(&self) -> usize;

    /// Reads `buf.len()` bytes starting at `address`.
    fn read(&mut self, address: usize, buf: &mut [u8]) -> Result<(), Self::Error>;

    /// Writes `data` starting at `address`.
    fn write(&mut self, address: usize, data: &[u8]) -> Result<(), Self::Error>;
}
