//! Bit-to-pulse modulation for the DiSEqC bus.
//!
//! Each protocol bit becomes one 1.5 ms cell of 22 kHz carrier:
//!
//! ```text
//! bit 0:  ████████████████▁▁▁▁▁▁▁▁      1000 µs tone, 500 µs silence
//! bit 1:  ████████▁▁▁▁▁▁▁▁▁▁▁▁▁▁▁▁      500 µs tone, 1000 µs silence
//! ```
//!
//! [`BitModulator`] owns the [`WaveformTransmitter`] and is the only writer
//! to it. A send builds the complete pulse program for the frame and hands
//! it to the hardware in one call; it does not wait for the frame to leave
//! the wire. Callers poll [`BitModulator::is_busy`] for completion.

use heapless::Vec;

use crate::diseqc::{DiseqcFrame, ParityMode, PositioningCommand, MAX_FRAME_BITS};
use crate::error::RotorError;
use crate::traits::{PulsePair, WaveformTransmitter};

/// DiSEqC carrier frequency in Hz.
pub const CARRIER_HZ: u32 = 22_000;

/// Pulse shapes for logical 0 and 1.
///
/// The defaults are the DiSEqC nominal values. Receivers tolerate roughly
/// ±20%, so hardware-specific calibration can adjust them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BitTiming {
    /// Tone/silence durations for a 0 bit in microseconds.
    pub zero: (u16, u16),
    /// Tone/silence durations for a 1 bit in microseconds.
    pub one: (u16, u16),
}

impl Default for BitTiming {
    fn default() -> Self {
        Self {
            zero: (1000, 500),
            one: (500, 1000),
        }
    }
}

impl BitTiming {
    /// Pulse pair for a single bit.
    #[inline]
    pub fn pulse(&self, bit: bool) -> PulsePair {
        let (high, low) = if bit { self.one } else { self.zero };
        PulsePair::new(high, low)
    }
}

/// Drives the waveform transmitter with DiSEqC frames.
pub struct BitModulator<T: WaveformTransmitter> {
    tx: T,
    timing: BitTiming,
    parity: ParityMode,
    program: Vec<PulsePair, MAX_FRAME_BITS>,
    frames_sent: u32,
}

impl<T: WaveformTransmitter> BitModulator<T> {
    /// Creates a modulator with nominal timing and odd (DiSEqC) parity.
    pub fn new(tx: T) -> Self {
        Self {
            tx,
            timing: BitTiming::default(),
            parity: ParityMode::default(),
            program: Vec::new(),
            frames_sent: 0,
        }
    }

    /// Overrides the bit pulse shapes.
    pub fn with_timing(mut self, timing: BitTiming) -> Self {
        self.timing = timing;
        self
    }

    /// Overrides the parity convention.
    pub fn with_parity(mut self, parity: ParityMode) -> Self {
        self.parity = parity;
        self
    }

    /// Transmits a GotoX command.
    pub fn send(&mut self, command: &PositioningCommand) -> Result<(), RotorError> {
        self.send_frame(&DiseqcFrame::from(*command))
    }

    /// Transmits any DiSEqC frame.
    ///
    /// Fails with [`RotorError::Busy`] if a previous frame is still on the
    /// wire; nothing is queued in that case.
    pub fn send_frame(&mut self, frame: &DiseqcFrame) -> Result<(), RotorError> {
        if self.tx.is_busy() {
            return Err(RotorError::Busy);
        }

        self.program.clear();
        for bit in frame.bit_frame(self.parity).iter() {
            // BitFrame never exceeds MAX_FRAME_BITS
            let _ = self.program.push(self.timing.pulse(bit));
        }

        self.tx.transmit(&self.program).map_err(RotorError::io)?;
        self.frames_sent = self.frames_sent.wrapping_add(1);
        log::debug!(
            "diseqc frame {:02X?} queued ({} pulses)",
            frame.bytes(),
            self.program.len()
        );
        Ok(())
    }

    /// Returns `true` while a frame is still being transmitted.
    #[inline]
    pub fn is_busy(&self) -> bool {
        self.tx.is_busy()
    }

    /// Blocks until the transmitter is idle, polling every `interval`.
    ///
    /// Fails with [`RotorError::Timeout`] if it is still busy after `timeout`.
    #[cfg(feature = "std")]
    pub fn wait_idle(
        &self,
        timeout: std::time::Duration,
        interval: std::time::Duration,
    ) -> Result<(), RotorError> {
        let start = std::time::Instant::now();
        while self.tx.is_busy() {
            if start.elapsed() >= timeout {
                return Err(RotorError::Timeout);
            }
            std::thread::sleep(interval);
        }
        Ok(())
    }

    /// The pulse program of the most recent send.
    #[inline]
    pub fn last_program(&self) -> &[PulsePair] {
        &self.program
    }

    /// Number of frames handed to the transmitter.
    #[inline]
    pub fn frames_sent(&self) -> u32 {
        self.frames_sent
    }

    /// Parity convention in use.
    #[inline]
    pub fn parity(&self) -> ParityMode {
        self.parity
    }

    /// Borrow the transmitter.
    #[inline]
    pub fn transmitter(&self) -> &T {
        &self.tx
    }

    /// Mutably borrow the transmitter.
    #[inline]
    pub fn transmitter_mut(&mut self) -> &mut T {
        &mut self.tx
    }
}

/// On-air duration of `bits` bits with the given timing, in microseconds (upper bound).
pub fn frame_duration_us(bits: usize, timing: &BitTiming) -> u32 {
    let cell = timing.pulse(false).period_us().max(timing.pulse(true).period_us());
    cell * bits as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diseqc::CommandEncoder;
    use crate::hal::MockTransmitter;

    const ZERO: PulsePair = PulsePair::new(1000, 500);
    const ONE: PulsePair = PulsePair::new(500, 1000);

    // =========================================================================
    // Timing Tests
    // =========================================================================

    #[test]
    fn default_timing() {
        let t = BitTiming::default();
        assert_eq!(t.pulse(false), ZERO);
        assert_eq!(t.pulse(true), ONE);
    }

    #[test]
    fn goto_frame_duration() {
        assert_eq!(frame_duration_us(45, &BitTiming::default()), 67_500);
    }

    // =========================================================================
    // Send Tests
    // =========================================================================

    #[test]
    fn send_goto_queues_45_pulses() {
        let mut m = BitModulator::new(MockTransmitter::new());
        m.send(&CommandEncoder::build(19.2)).unwrap();

        assert_eq!(m.transmitter().frames.len(), 1);
        assert_eq!(m.transmitter().frames[0].len(), 45);
        assert_eq!(m.frames_sent(), 1);
    }

    #[test]
    fn send_maps_bits_to_pulses() {
        let mut m = BitModulator::new(MockTransmitter::new());
        m.send_frame(&DiseqcFrame::halt()).unwrap();

        let program = &m.transmitter().frames[0];
        // 0xE0 → 1110_0000, odd parity bit 0
        assert_eq!(
            &program[..9],
            &[ONE, ONE, ONE, ZERO, ZERO, ZERO, ZERO, ZERO, ZERO]
        );
        // 0x60 → two ones, odd parity bit 1
        assert_eq!(program[26], ONE);
    }

    #[test]
    fn even_parity_mode_flips_check_bits() {
        let mut m = BitModulator::new(MockTransmitter::new()).with_parity(ParityMode::Even);
        m.send_frame(&DiseqcFrame::halt()).unwrap();

        let program = &m.transmitter().frames[0];
        assert_eq!(program[8], ONE);
        assert_eq!(program[26], ZERO);
    }

    #[test]
    fn custom_timing_is_used() {
        let timing = BitTiming {
            zero: (900, 600),
            one: (600, 900),
        };
        let mut m = BitModulator::new(MockTransmitter::new()).with_timing(timing);
        m.send_frame(&DiseqcFrame::halt()).unwrap();
        assert_eq!(m.last_program()[0], PulsePair::new(600, 900));
        assert_eq!(m.last_program()[3], PulsePair::new(900, 600));
    }

    #[test]
    fn send_fails_busy_without_queueing() {
        let mut m = BitModulator::new(MockTransmitter::new().holding());
        m.send(&CommandEncoder::build(10.0)).unwrap();
        assert!(m.is_busy());

        let err = m.send(&CommandEncoder::build(20.0)).unwrap_err();
        assert_eq!(err, RotorError::Busy);
        assert_eq!(m.transmitter().frames.len(), 1);

        m.transmitter_mut().complete();
        assert!(!m.is_busy());
        m.send(&CommandEncoder::build(20.0)).unwrap();
        assert_eq!(m.transmitter().frames.len(), 2);
    }

    #[test]
    fn send_clears_previous_program() {
        let mut m = BitModulator::new(MockTransmitter::new());
        m.send(&CommandEncoder::build(10.0)).unwrap();
        m.send_frame(&DiseqcFrame::halt()).unwrap();
        assert_eq!(m.last_program().len(), 27);
    }

    #[test]
    fn transmitter_failure_is_io() {
        let mut tx = MockTransmitter::new();
        tx.fail_next = true;
        let mut m = BitModulator::new(tx);
        let err = m.send_frame(&DiseqcFrame::halt()).unwrap_err();
        assert!(matches!(err, RotorError::Io(_)));
        assert_eq!(m.frames_sent(), 0);
    }

    // =========================================================================
    // Wait Tests
    // =========================================================================

    #[test]
    fn wait_idle_times_out_while_busy() {
        use std::time::Duration;

        let mut m = BitModulator::new(MockTransmitter::new().holding());
        m.send_frame(&DiseqcFrame::halt()).unwrap();
        let res = m.wait_idle(Duration::from_millis(20), Duration::from_millis(5));
        assert_eq!(res, Err(RotorError::Timeout));
    }

    #[test]
    fn wait_idle_returns_when_idle() {
        use std::time::Duration;

        let m = BitModulator::new(MockTransmitter::new());
        assert!(m
            .wait_idle(Duration::from_millis(20), Duration::from_millis(5))
            .is_ok());
    }
}
