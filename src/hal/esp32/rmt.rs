//! DiSEqC bus output using the ESP32 RMT peripheral.
//!
//! The RMT channel runs at 1 µs per tick (80 MHz APB / 80) with a 22 kHz,
//! 50% duty carrier applied to the high level, so each [`PulsePair`] maps to
//! one high pulse (tone burst) followed by one low pulse (silence).

use esp_idf_hal::gpio::OutputPin;
use esp_idf_hal::peripheral::Peripheral;
use esp_idf_hal::prelude::*;
use esp_idf_hal::rmt::config::{CarrierConfig, DutyPercent, TransmitConfig};
use esp_idf_hal::rmt::{
    PinState, Pulse, PulseTicks, RmtChannel, Signal, TxRmtDriver, VariableLengthSignal,
};
use esp_idf_hal::sys::{
    esp, rmt_wait_tx_done, rmt_write_items, EspError, ESP_ERR_INVALID_STATE, ESP_ERR_TIMEOUT,
};

use crate::modulator::CARRIER_HZ;
use crate::traits::{PulsePair, WaveformTransmitter};

/// RMT-backed [`WaveformTransmitter`].
///
/// `transmit` starts the program and returns at once. The legacy RMT driver
/// keeps reading items from the buffer while the frame is clocked out, so
/// the current signal lives in the transmitter and is only replaced once the
/// channel reports done. `is_busy` polls that flag without waiting.
///
/// # Example
///
/// ```ignore
/// let tx = Esp32Transmitter::new(peripherals.rmt.channel0, peripherals.pins.gpio5)?;
/// let rotor = RotorService::new(enable, tx, RotorConfig::default())?;
/// ```
pub struct Esp32Transmitter<'d> {
    driver: TxRmtDriver<'d>,
    signal: VariableLengthSignal,
}

impl<'d> Esp32Transmitter<'d> {
    /// APB clock divider for 1 µs ticks.
    const CLOCK_DIVIDER: u8 = 80;

    /// Creates the transmitter on `channel`, driving `pin`.
    ///
    /// # Errors
    ///
    /// Returns an error if the RMT channel cannot be configured.
    pub fn new<C: RmtChannel>(
        channel: impl Peripheral<P = C> + 'd,
        pin: impl Peripheral<P = impl OutputPin> + 'd,
    ) -> Result<Self, EspError> {
        let carrier = CarrierConfig::new()
            .frequency(CARRIER_HZ.Hz())
            .duty_percent(DutyPercent::new(50)?);
        let config = TransmitConfig::new()
            .clock_divider(Self::CLOCK_DIVIDER)
            .carrier(Some(carrier))
            .idle(Some(PinState::Low));

        let driver = TxRmtDriver::new(channel, pin, &config)?;
        log::info!("RMT transmitter ready ({} Hz carrier)", CARRIER_HZ);
        Ok(Self {
            driver,
            signal: VariableLengthSignal::new(),
        })
    }

    fn build_signal(pulses: &[PulsePair]) -> Result<VariableLengthSignal, EspError> {
        let mut signal = VariableLengthSignal::with_capacity(pulses.len() * 2);
        for pair in pulses {
            let high = Pulse::new(PinState::High, PulseTicks::new(pair.high_us)?);
            let low = Pulse::new(PinState::Low, PulseTicks::new(pair.low_us)?);
            signal.push(&[high, low])?;
        }
        Ok(signal)
    }
}

impl WaveformTransmitter for Esp32Transmitter<'_> {
    type Error = EspError;

    fn transmit(&mut self, pulses: &[PulsePair]) -> Result<(), EspError> {
        if self.is_busy() {
            return Err(EspError::from_infallible::<{ ESP_ERR_INVALID_STATE as i32 }>());
        }
        self.signal = Self::build_signal(pulses)?;
        let items = self.signal.as_slice();
        // SAFETY: `items` borrows `self.signal`, which is not touched again
        // until `rmt_wait_tx_done` reports the channel idle.
        esp!(unsafe {
            rmt_write_items(
                self.driver.channel(),
                items.as_ptr(),
                items.len() as i32,
                false,
            )
        })
    }

    fn is_busy(&self) -> bool {
        // Zero ticks: report the flag, never wait.
        let done = unsafe { rmt_wait_tx_done(self.driver.channel(), 0) };
        done == ESP_ERR_TIMEOUT as i32
    }
}
