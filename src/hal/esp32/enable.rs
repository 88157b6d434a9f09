//! Motor-enable output on a GPIO.

use esp_idf_hal::gpio::{AnyOutputPin, Output, PinDriver};
use esp_idf_hal::sys::EspError;

use crate::traits::EnableLine;

/// Push-pull GPIO driving the rotor supply switch (high = motor powered).
///
/// The pin is driven low during construction.
pub struct Esp32EnableLine {
    pin: PinDriver<'static, AnyOutputPin, Output>,
}

impl Esp32EnableLine {
    /// Configures `pin` as an output and drives it low.
    ///
    /// # Errors
    ///
    /// Returns an error if GPIO initialization fails.
    pub fn new(pin: AnyOutputPin) -> Result<Self, EspError> {
        let mut pin = PinDriver::output(pin)?;
        pin.set_low()?;
        Ok(Self { pin })
    }

    /// Current output level.
    pub fn is_set_high(&self) -> bool {
        self.pin.is_set_high()
    }
}

impl EnableLine for Esp32EnableLine {
    type Error = EspError;

    fn set_enabled(&mut self, enabled: bool) -> Result<(), EspError> {
        if enabled {
            self.pin.set_high()
        } else {
            self.pin.set_low()
        }
    }
}
