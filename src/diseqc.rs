//! DiSEqC 1.2 positioner command encoding.
//!
//! Turns a target angle (or a manual step/drive/halt request) into the bytes
//! of a DiSEqC frame, and each byte into the nine bits that go on the wire:
//! eight data bits, most significant first, followed by a parity bit.
//!
//! # GotoX layout
//!
//! ```text
//! E0 31 6E d1 d2
//! │  │  │  │  └─ low byte of round(16 × |angle|)
//! │  │  │  └──── direction nibble (D = east, E = west) | high nibble of magnitude
//! │  │  └─────── command: GotoX
//! │  └────────── address: any positioner
//! └───────────── framing: master, no reply, first transmission
//! ```
//!
//! # Example
//!
//! ```
//! use diseqc_rotor::diseqc::{CommandEncoder, ParityMode};
//!
//! let cmd = CommandEncoder::build(19.2);
//! assert_eq!(cmd.bytes(), &[0xE0, 0x31, 0x6E, 0xD1, 0x33]);
//! assert_eq!(cmd.magnitude(), 307);
//!
//! let bits = cmd.bit_frame(ParityMode::Odd);
//! assert_eq!(bits.len(), 45);
//! ```

use heapless::Vec;

use crate::error::RotorError;

/// Framing byte: command from master, no reply required, first transmission.
pub const FRAMING_MASTER_NO_REPLY: u8 = 0xE0;
/// Address byte: any polar/azimuth positioner.
pub const ADDRESS_ANY_POSITIONER: u8 = 0x31;
/// Command byte: stop positioner movement.
pub const CMD_HALT: u8 = 0x60;
/// Command byte: drive motor east.
pub const CMD_DRIVE_EAST: u8 = 0x68;
/// Command byte: drive motor west.
pub const CMD_DRIVE_WEST: u8 = 0x69;
/// Command byte: rotate to angle (USALS GotoX).
pub const CMD_GOTO_X: u8 = 0x6E;

/// Direction nibble for angles east of south (angle >= 0).
pub const EAST_SENTINEL: u8 = 0xD0;
/// Direction nibble for angles west of south (angle < 0).
pub const WEST_SENTINEL: u8 = 0xE0;

/// Largest angle magnitude the encoder will emit, in degrees.
pub const MAX_ANGLE: f32 = 80.0;
/// Largest step count accepted by step commands.
pub const MAX_STEPS: u8 = 128;

/// Longest frame the transmitter accepts, in bytes.
pub const MAX_FRAME_BYTES: usize = 6;
/// Bits per byte on the wire (8 data + 1 parity).
pub const BITS_PER_BYTE: usize = 9;
/// Longest frame in bits.
pub const MAX_FRAME_BITS: usize = MAX_FRAME_BYTES * BITS_PER_BYTE;

// ============================================================================
// Parity
// ============================================================================

/// Parity of the number of set bits in a byte.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Parity {
    /// Even number of set bits.
    Even,
    /// Odd number of set bits.
    Odd,
}

impl Parity {
    /// The bit that, appended to the byte, makes the total count even.
    #[inline]
    pub const fn bit(&self) -> bool {
        matches!(self, Parity::Odd)
    }
}

/// Computes the parity of `byte` by XOR-reducing its bits.
///
/// `even_parity(b).bit()` equals `popcount(b) mod 2`.
///
/// # Examples
///
/// ```
/// use diseqc_rotor::diseqc::{even_parity, Parity};
///
/// assert_eq!(even_parity(0x00), Parity::Even);
/// assert_eq!(even_parity(0x01), Parity::Odd);
/// assert_eq!(even_parity(0xFF), Parity::Even);
/// assert_eq!(even_parity(0x7F), Parity::Odd);
/// ```
pub const fn even_parity(byte: u8) -> Parity {
    let mut x = byte;
    x ^= x >> 4;
    x ^= x >> 2;
    x ^= x >> 1;
    if x & 1 == 0 {
        Parity::Even
    } else {
        Parity::Odd
    }
}

/// Which parity convention the transmitted check bit follows.
///
/// DiSEqC receivers expect odd parity over the nine transmitted bits, so a
/// byte with an even number of ones is followed by a `1`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ParityMode {
    /// Data bits plus check bit contain an even number of ones.
    Even,
    /// Data bits plus check bit contain an odd number of ones.
    #[default]
    Odd,
}

impl ParityMode {
    /// The check bit to append after `byte`.
    #[inline]
    pub const fn check_bit(&self, byte: u8) -> bool {
        let even_bit = even_parity(byte).bit();
        match self {
            ParityMode::Even => even_bit,
            ParityMode::Odd => !even_bit,
        }
    }
}

// ============================================================================
// Positioning Command
// ============================================================================

/// Which way the dish turns from due south.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RotationDirection {
    /// Positive angles.
    East,
    /// Negative angles.
    West,
}

/// The 5-byte GotoX frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PositioningCommand {
    bytes: [u8; 5],
}

impl PositioningCommand {
    /// Raw frame bytes.
    #[inline]
    pub fn bytes(&self) -> &[u8; 5] {
        &self.bytes
    }

    /// Direction/magnitude-high byte.
    #[inline]
    pub fn d1(&self) -> u8 {
        self.bytes[3]
    }

    /// Magnitude-low byte.
    #[inline]
    pub fn d2(&self) -> u8 {
        self.bytes[4]
    }

    /// The 12-bit magnitude field, `round(16 × |angle|)`.
    pub fn magnitude(&self) -> u16 {
        (((self.d1() & 0x0F) as u16) << 8) | self.d2() as u16
    }

    /// Direction encoded in the high nibble of `d1`.
    pub fn direction(&self) -> RotationDirection {
        if self.d1() & 0xF0 == WEST_SENTINEL {
            RotationDirection::West
        } else {
            RotationDirection::East
        }
    }

    /// Angle the frame encodes, in degrees (1/16° resolution).
    pub fn decoded_angle(&self) -> f32 {
        let deg = self.magnitude() as f32 / 16.0;
        match self.direction() {
            RotationDirection::East => deg,
            RotationDirection::West => -deg,
        }
    }

    /// Bits on the wire for this command.
    pub fn bit_frame(&self, parity: ParityMode) -> BitFrame {
        BitFrame::from_bytes(&self.bytes, parity)
    }
}

/// Builds GotoX commands from angles.
pub struct CommandEncoder;

impl CommandEncoder {
    /// Encodes `angle` (degrees, east positive) as a GotoX command.
    ///
    /// Out-of-range angles are clamped to ±80°; a non-finite angle encodes
    /// as 0° east. This function never fails.
    pub fn build(angle: f32) -> PositioningCommand {
        let clamped = clamp_angle(angle);
        let sentinel = if clamped < 0.0 {
            WEST_SENTINEL
        } else {
            EAST_SENTINEL
        };
        // Round half up; the cast saturates and maps NaN to zero.
        let magnitude = (16.0 * clamped.abs() + 0.5) as u16;
        let d1 = sentinel | ((magnitude >> 8) & 0x0F) as u8;
        let d2 = (magnitude & 0xFF) as u8;

        PositioningCommand {
            bytes: [
                FRAMING_MASTER_NO_REPLY,
                ADDRESS_ANY_POSITIONER,
                CMD_GOTO_X,
                d1,
                d2,
            ],
        }
    }
}

/// Clamps an angle to the encodable range.
#[inline]
pub fn clamp_angle(angle: f32) -> f32 {
    angle.clamp(-MAX_ANGLE, MAX_ANGLE)
}

/// Returns `true` if `angle` lies outside the encodable range.
#[inline]
pub fn is_out_of_range(angle: f32) -> bool {
    angle.abs() > MAX_ANGLE
}

// ============================================================================
// Generic Frames
// ============================================================================

/// Any DiSEqC frame up to [`MAX_FRAME_BYTES`] long.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiseqcFrame {
    bytes: Vec<u8, MAX_FRAME_BYTES>,
}

impl DiseqcFrame {
    /// Wraps raw bytes, rejecting empty or over-long frames.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, RotorError> {
        if bytes.is_empty() {
            return Err(RotorError::InvalidParameter("frame is empty"));
        }
        let bytes = Vec::from_slice(bytes)
            .map_err(|_| RotorError::InvalidParameter("frame longer than 6 bytes"))?;
        Ok(Self { bytes })
    }

    /// `E0 31 60`: stop positioner movement.
    pub fn halt() -> Self {
        Self::positioner(&[CMD_HALT])
    }

    /// `E0 31 68 00`: drive east continuously.
    pub fn drive_east() -> Self {
        Self::positioner(&[CMD_DRIVE_EAST, 0x00])
    }

    /// `E0 31 69 00`: drive west continuously.
    pub fn drive_west() -> Self {
        Self::positioner(&[CMD_DRIVE_WEST, 0x00])
    }

    /// `E0 31 68 n`: step east by `steps`.
    pub fn step_east(steps: u8) -> Result<Self, RotorError> {
        check_steps(steps)?;
        Ok(Self::positioner(&[CMD_DRIVE_EAST, steps]))
    }

    /// `E0 31 69 n`: step west by `steps`.
    pub fn step_west(steps: u8) -> Result<Self, RotorError> {
        check_steps(steps)?;
        Ok(Self::positioner(&[CMD_DRIVE_WEST, steps]))
    }

    fn positioner(tail: &[u8]) -> Self {
        let mut bytes = Vec::new();
        // Fixed tails are at most 2 bytes, so these pushes cannot overflow.
        let _ = bytes.push(FRAMING_MASTER_NO_REPLY);
        let _ = bytes.push(ADDRESS_ANY_POSITIONER);
        let _ = bytes.extend_from_slice(tail);
        Self { bytes }
    }

    /// Raw frame bytes.
    #[inline]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Bits on the wire for this frame.
    pub fn bit_frame(&self, parity: ParityMode) -> BitFrame {
        BitFrame::from_bytes(&self.bytes, parity)
    }
}

impl From<PositioningCommand> for DiseqcFrame {
    fn from(cmd: PositioningCommand) -> Self {
        let mut bytes = Vec::new();
        let _ = bytes.extend_from_slice(cmd.bytes());
        Self { bytes }
    }
}

fn check_steps(steps: u8) -> Result<(), RotorError> {
    if steps == 0 || steps > MAX_STEPS {
        Err(RotorError::InvalidParameter("steps must be 1..=128"))
    } else {
        Ok(())
    }
}

// ============================================================================
// Bit Frame
// ============================================================================

/// Ordered wire bits: per byte, 8 data bits MSB first then the check bit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BitFrame {
    bits: Vec<bool, MAX_FRAME_BITS>,
}

impl BitFrame {
    fn from_bytes(bytes: &[u8], parity: ParityMode) -> Self {
        let mut bits = Vec::new();
        for &byte in bytes.iter().take(MAX_FRAME_BYTES) {
            for shift in (0..8).rev() {
                let _ = bits.push(byte & (1 << shift) != 0);
            }
            let _ = bits.push(parity.check_bit(byte));
        }
        Self { bits }
    }

    /// Number of bits in the frame.
    #[inline]
    pub fn len(&self) -> usize {
        self.bits.len()
    }

    /// Returns `true` if the frame holds no bits.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// Bits in transmission order.
    #[inline]
    pub fn as_slice(&self) -> &[bool] {
        &self.bits
    }

    /// Iterates bits in transmission order.
    pub fn iter(&self) -> impl Iterator<Item = bool> + '_ {
        self.bits.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // Parity Tests
    // =========================================================================

    #[test]
    fn parity_reference_values() {
        assert_eq!(even_parity(0), Parity::Even);
        assert_eq!(even_parity(1), Parity::Odd);
        assert_eq!(even_parity(0xFF), Parity::Even);
        assert_eq!(even_parity(0x7F), Parity::Odd);
    }

    #[test]
    fn parity_matches_popcount_for_all_bytes() {
        for b in 0..=255u8 {
            assert_eq!(
                even_parity(b).bit(),
                b.count_ones() % 2 == 1,
                "byte {:#04x}",
                b
            );
        }
    }

    #[test]
    fn parity_mode_check_bits() {
        // 0xE0 has three ones
        assert!(ParityMode::Even.check_bit(0xE0));
        assert!(!ParityMode::Odd.check_bit(0xE0));
        // 0x33 has four ones
        assert!(!ParityMode::Even.check_bit(0x33));
        assert!(ParityMode::Odd.check_bit(0x33));
    }

    #[test]
    fn parity_mode_totals() {
        for b in 0..=255u8 {
            let ones = b.count_ones() + ParityMode::Odd.check_bit(b) as u32;
            assert_eq!(ones % 2, 1);
            let ones = b.count_ones() + ParityMode::Even.check_bit(b) as u32;
            assert_eq!(ones % 2, 0);
        }
    }

    // =========================================================================
    // Encoder Tests
    // =========================================================================

    #[test]
    fn build_zero() {
        let cmd = CommandEncoder::build(0.0);
        assert_eq!(cmd.bytes(), &[0xE0, 0x31, 0x6E, 0xD0, 0x00]);
        assert_eq!(cmd.magnitude(), 0);
        assert_eq!(cmd.direction(), RotationDirection::East);
    }

    #[test]
    fn build_max_east() {
        let cmd = CommandEncoder::build(80.0);
        assert_eq!(cmd.magnitude(), 1280);
        assert_eq!(cmd.d1(), 0xD5);
        assert_eq!(cmd.d2(), 0x00);
    }

    #[test]
    fn build_astra_19_2() {
        let cmd = CommandEncoder::build(19.2);
        assert_eq!(cmd.magnitude(), 307);
        assert_eq!(cmd.d1(), 0xD0 | 1);
        assert_eq!(cmd.d2(), 51);
    }

    #[test]
    fn build_clamps_west() {
        let cmd = CommandEncoder::build(-90.0);
        assert_eq!(cmd, CommandEncoder::build(-80.0));
        assert_eq!(cmd.d1(), 0xE5);
        assert_eq!(cmd.d2(), 0x00);
        assert_eq!(cmd.direction(), RotationDirection::West);
    }

    #[test]
    fn build_rounds_half_up() {
        // 16 × 0.03125 = 0.5 → 1
        assert_eq!(CommandEncoder::build(0.03125).magnitude(), 1);
        // 16 × 0.03 = 0.48 → 0
        assert_eq!(CommandEncoder::build(0.03).magnitude(), 0);
    }

    #[test]
    fn build_small_negative_is_west() {
        let cmd = CommandEncoder::build(-0.01);
        assert_eq!(cmd.direction(), RotationDirection::West);
        assert_eq!(cmd.magnitude(), 0);
    }

    #[test]
    fn build_nan_does_not_panic() {
        let cmd = CommandEncoder::build(f32::NAN);
        assert_eq!(cmd.magnitude(), 0);
    }

    #[test]
    fn decoded_angle_is_within_rounding() {
        let cmd = CommandEncoder::build(-45.3);
        assert!((cmd.decoded_angle() - -45.3).abs() <= 1.0 / 32.0);
    }

    // =========================================================================
    // Frame Tests
    // =========================================================================

    #[test]
    fn manual_frames() {
        assert_eq!(DiseqcFrame::halt().bytes(), &[0xE0, 0x31, 0x60]);
        assert_eq!(DiseqcFrame::drive_east().bytes(), &[0xE0, 0x31, 0x68, 0x00]);
        assert_eq!(DiseqcFrame::drive_west().bytes(), &[0xE0, 0x31, 0x69, 0x00]);
        assert_eq!(
            DiseqcFrame::step_east(5).unwrap().bytes(),
            &[0xE0, 0x31, 0x68, 0x05]
        );
        assert_eq!(
            DiseqcFrame::step_west(128).unwrap().bytes(),
            &[0xE0, 0x31, 0x69, 0x80]
        );
    }

    #[test]
    fn step_range_is_enforced() {
        assert!(matches!(
            DiseqcFrame::step_east(0),
            Err(RotorError::InvalidParameter(_))
        ));
        assert!(matches!(
            DiseqcFrame::step_west(129),
            Err(RotorError::InvalidParameter(_))
        ));
    }

    #[test]
    fn from_bytes_limits() {
        assert!(DiseqcFrame::from_bytes(&[]).is_err());
        assert!(DiseqcFrame::from_bytes(&[0; 7]).is_err());
        assert_eq!(DiseqcFrame::from_bytes(&[1, 2, 3, 4, 5, 6]).unwrap().bytes().len(), 6);
    }

    #[test]
    fn goto_frame_is_45_bits() {
        let frame: DiseqcFrame = CommandEncoder::build(12.5).into();
        assert_eq!(frame.bit_frame(ParityMode::Odd).len(), 45);
        assert_eq!(frame.bit_frame(ParityMode::Even).len(), 45);
    }

    #[test]
    fn bit_frame_order_msb_first_then_parity() {
        let frame = DiseqcFrame::halt().bit_frame(ParityMode::Odd);
        // 0xE0 = 1110_0000, three ones → odd check bit 0
        assert_eq!(
            &frame.as_slice()[..9],
            &[true, true, true, false, false, false, false, false, false]
        );
        // 0x31 = 0011_0001, three ones → odd check bit 0
        assert_eq!(
            &frame.as_slice()[9..18],
            &[false, false, true, true, false, false, false, true, false]
        );
        // 0x60 = 0110_0000, two ones → odd check bit 1
        assert!(frame.as_slice()[26]);
    }
}
