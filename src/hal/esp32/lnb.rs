//! LNBH26 LNB supply controller over I2C.
//!
//! The LNBH26 generates the LNB supply (13/18 V) and the 22 kHz tone. Only
//! the control register is written; the status register reports protection
//! faults.
//!
//! | Control bit | Meaning |
//! |-------------|---------|
//! | 0 `EN` | LNB power on |
//! | 1 `VSEL` | 0 = 13 V, 1 = 18 V |
//! | 2 `TONE` | 22 kHz tone on |
//! | 3 `DISEQC` | DiSEqC mode |
//! | 4 `ILIM` | 0 = 600 mA, 1 = 400 mA |

use embedded_hal::i2c::I2c;

use crate::traits::{LnbController, LnbVoltage};

/// 7-bit I2C address.
pub const LNBH26_ADDR: u8 = 0x08;

const REG_CONTROL: u8 = 0x00;
const REG_STATUS: u8 = 0x01;

const CTRL_EN: u8 = 1 << 0;
const CTRL_VSEL: u8 = 1 << 1;
const CTRL_TONE: u8 = 1 << 2;
const CTRL_DISEQC: u8 = 1 << 3;
const CTRL_ILIM_600MA: u8 = 0;

const STAT_OCP: u8 = 1 << 0;
const STAT_OTP: u8 = 1 << 1;
const STAT_VMON: u8 = 1 << 2;

/// Decoded status register.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct Lnbh26Status {
    /// Overcurrent protection tripped.
    pub overcurrent: bool,
    /// Over-temperature protection tripped.
    pub overtemperature: bool,
    /// Output voltage within range.
    pub voltage_ok: bool,
}

impl From<u8> for Lnbh26Status {
    fn from(raw: u8) -> Self {
        Self {
            overcurrent: raw & STAT_OCP != 0,
            overtemperature: raw & STAT_OTP != 0,
            voltage_ok: raw & STAT_VMON != 0,
        }
    }
}

/// LNBH26 driver generic over any `embedded-hal` I2C bus.
pub struct Lnbh26<I2C> {
    i2c: I2C,
    control: u8,
}

impl<I2C: I2c> Lnbh26<I2C> {
    /// Powers the LNB at 13 V, tone off, DiSEqC mode, 600 mA limit.
    pub fn new(i2c: I2C) -> Result<Self, I2C::Error> {
        let mut lnb = Self {
            i2c,
            control: CTRL_EN | CTRL_DISEQC | CTRL_ILIM_600MA,
        };
        lnb.write_control()?;
        log::info!("LNBH26 initialized (control=0x{:02X})", lnb.control);
        Ok(lnb)
    }

    /// Last value written to the control register.
    pub fn control(&self) -> u8 {
        self.control
    }

    /// Reads and decodes the status register.
    pub fn status(&mut self) -> Result<Lnbh26Status, I2C::Error> {
        let mut buf = [0u8];
        self.i2c.write_read(LNBH26_ADDR, &[REG_STATUS], &mut buf)?;
        let status = Lnbh26Status::from(buf[0]);
        if status.overcurrent || status.overtemperature {
            log::warn!("LNBH26 fault: {:?}", status);
        }
        Ok(status)
    }

    /// Releases the bus.
    pub fn release(self) -> I2C {
        self.i2c
    }

    fn update(&mut self, mask: u8, set: bool) -> Result<(), I2C::Error> {
        let previous = self.control;
        if set {
            self.control |= mask;
        } else {
            self.control &= !mask;
        }
        if let Err(e) = self.write_control() {
            self.control = previous;
            return Err(e);
        }
        Ok(())
    }

    fn write_control(&mut self) -> Result<(), I2C::Error> {
        self.i2c.write(LNBH26_ADDR, &[REG_CONTROL, self.control])
    }
}

impl<I2C: I2c> LnbController for Lnbh26<I2C> {
    type Error = I2C::Error;

    fn set_voltage(&mut self, voltage: LnbVoltage) -> Result<(), Self::Error> {
        self.update(CTRL_VSEL, voltage == LnbVoltage::V18)
    }

    fn set_tone(&mut self, enabled: bool) -> Result<(), Self::Error> {
        self.update(CTRL_TONE, enabled)
    }
}
