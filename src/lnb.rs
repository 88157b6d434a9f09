//! LNB supply control: voltage/polarization and tone/band.
//!
//! The LNB's polarization is selected by its supply voltage and its band by
//! the continuous 22 kHz tone:
//!
//! | Setting | Wire |
//! |---------|------|
//! | Vertical | 13 V |
//! | Horizontal | 18 V |
//! | Low band | tone off |
//! | High band | tone on |
//!
//! [`LnbService`] caches the last successfully written values so they can be
//! published without reading the hardware back.

use crate::error::RotorError;
use crate::traits::{LnbController, LnbVoltage};

/// Signal polarization, selected by supply voltage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Polarization {
    /// 13 V
    #[default]
    Vertical,
    /// 18 V
    Horizontal,
}

impl Polarization {
    /// Status text (`vertical` / `horizontal`).
    pub const fn as_str(&self) -> &'static str {
        match self {
            Polarization::Vertical => "vertical",
            Polarization::Horizontal => "horizontal",
        }
    }

    /// Parse `vertical`/`v` or `horizontal`/`h`, case-insensitive.
    pub fn from_text(s: &str) -> Option<Self> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("vertical") || s.eq_ignore_ascii_case("v") {
            Some(Polarization::Vertical)
        } else if s.eq_ignore_ascii_case("horizontal") || s.eq_ignore_ascii_case("h") {
            Some(Polarization::Horizontal)
        } else {
            None
        }
    }
}

impl From<Polarization> for LnbVoltage {
    fn from(p: Polarization) -> Self {
        match p {
            Polarization::Vertical => LnbVoltage::V13,
            Polarization::Horizontal => LnbVoltage::V18,
        }
    }
}

impl From<LnbVoltage> for Polarization {
    fn from(v: LnbVoltage) -> Self {
        match v {
            LnbVoltage::V13 => Polarization::Vertical,
            LnbVoltage::V18 => Polarization::Horizontal,
        }
    }
}

/// Frequency band, selected by the 22 kHz tone.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Band {
    /// Tone off
    #[default]
    Low,
    /// Tone on
    High,
}

impl Band {
    /// Status text (`low` / `high`).
    pub const fn as_str(&self) -> &'static str {
        match self {
            Band::Low => "low",
            Band::High => "high",
        }
    }

    /// Parse `low`/`l` or `high`/`h`, case-insensitive.
    pub fn from_text(s: &str) -> Option<Self> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("low") || s.eq_ignore_ascii_case("l") {
            Some(Band::Low)
        } else if s.eq_ignore_ascii_case("high") || s.eq_ignore_ascii_case("h") {
            Some(Band::High)
        } else {
            None
        }
    }

    /// Whether this band needs the tone.
    pub const fn tone(&self) -> bool {
        matches!(self, Band::High)
    }

    /// Band selected by a tone state.
    pub const fn from_tone(tone: bool) -> Self {
        if tone {
            Band::High
        } else {
            Band::Low
        }
    }
}

/// Parse a tone payload: `on/1/true` or `off/0/false`.
pub fn parse_tone(s: &str) -> Option<bool> {
    let s = s.trim();
    if ["on", "1", "true"].iter().any(|t| s.eq_ignore_ascii_case(t)) {
        Some(true)
    } else if ["off", "0", "false"].iter().any(|t| s.eq_ignore_ascii_case(t)) {
        Some(false)
    } else {
        None
    }
}

/// Tone as published on `status/lnb/tone`.
pub const fn tone_str(tone: bool) -> &'static str {
    if tone {
        "on"
    } else {
        "off"
    }
}

/// Last written LNB settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LnbStatus {
    /// Supply voltage
    pub voltage: LnbVoltage,
    /// 22 kHz tone
    pub tone: bool,
}

impl LnbStatus {
    /// Polarization implied by the voltage.
    pub fn polarization(&self) -> Polarization {
        self.voltage.into()
    }

    /// Band implied by the tone.
    pub fn band(&self) -> Band {
        Band::from_tone(self.tone)
    }
}

/// Owns the LNB controller and caches its state.
pub struct LnbService<L: LnbController> {
    lnb: L,
    status: LnbStatus,
}

impl<L: LnbController> LnbService<L> {
    /// Writes the defaults (13 V, tone off) to the hardware.
    pub fn new(mut lnb: L) -> Result<Self, RotorError> {
        let status = LnbStatus::default();
        lnb.set_voltage(status.voltage).map_err(RotorError::io)?;
        lnb.set_tone(status.tone).map_err(RotorError::io)?;
        Ok(Self { lnb, status })
    }

    /// Current cached settings.
    pub fn status(&self) -> LnbStatus {
        self.status
    }

    /// Sets the supply voltage.
    pub fn set_voltage(&mut self, voltage: LnbVoltage) -> Result<(), RotorError> {
        self.lnb.set_voltage(voltage).map_err(RotorError::io)?;
        self.status.voltage = voltage;
        log::info!("LNB voltage {}V", voltage.as_str());
        Ok(())
    }

    /// Sets the polarization (via voltage).
    pub fn set_polarization(&mut self, polarization: Polarization) -> Result<(), RotorError> {
        self.set_voltage(polarization.into())
    }

    /// Enables or disables the 22 kHz tone.
    pub fn set_tone(&mut self, tone: bool) -> Result<(), RotorError> {
        self.lnb.set_tone(tone).map_err(RotorError::io)?;
        self.status.tone = tone;
        log::info!("LNB tone {}", tone_str(tone));
        Ok(())
    }

    /// Sets the band (via tone).
    pub fn set_band(&mut self, band: Band) -> Result<(), RotorError> {
        self.set_tone(band.tone())
    }

    /// Borrow the controller.
    pub fn controller(&self) -> &L {
        &self.lnb
    }
}
