//! ESP32 hardware abstraction layer for the rotor controller.
//!
//! # Hardware Configuration
//!
//! - **MCU**: ESP32 (esp-idf)
//! - **DiSEqC output**: RMT channel with 22 kHz carrier into the LNB supply
//! - **Motor enable**: GPIO switching the rotor supply
//! - **LNB supply**: LNBH26 on I2C
//! - **Config storage**: MB85RC16 2 KiB FRAM on the second I2C controller
//!
//! # Pin Assignments
//!
//! See the [`pins`] module for GPIO assignments.

mod enable;
mod fram;
mod lnb;
mod rmt;

pub use enable::Esp32EnableLine;
pub use fram::{FramError, Mb85rc16, MB85RC16_BASE_ADDR};
pub use lnb::{Lnbh26, Lnbh26Status, LNBH26_ADDR};
pub use rmt::Esp32Transmitter;

#[cfg(feature = "wifi")]
mod wifi;
#[cfg(feature = "wifi")]
pub use wifi::Esp32Wifi;

#[cfg(feature = "esp32-mqtt")]
mod mqtt;
#[cfg(feature = "esp32-mqtt")]
pub use mqtt::{Esp32Mqtt, Esp32MqttError};

/// Pin assignments.
pub mod pins {
    // =========================================================================
    // DiSEqC / Motor
    // =========================================================================

    /// RMT output carrying the modulated DiSEqC signal
    pub const DISEQC_TX: i32 = 5;

    /// Motor supply enable (high = powered)
    pub const MOTOR_EN: i32 = 4;

    // =========================================================================
    // I2C0 (LNBH26)
    // =========================================================================

    /// LNB controller data line
    pub const LNB_SDA: i32 = 21;

    /// LNB controller clock line
    pub const LNB_SCL: i32 = 22;

    // =========================================================================
    // I2C1 (FRAM)
    // =========================================================================

    /// FRAM data line
    pub const FRAM_SDA: i32 = 18;

    /// FRAM clock line
    pub const FRAM_SCL: i32 = 19;
}
