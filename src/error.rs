//! Error types shared by the rotor, modulator, and motor-safety layers.

use alloc::format;
use alloc::string::String;
use core::fmt::Debug;

/// Errors reported by rotor operations.
///
/// The encoder and parity computation never fail; everything here comes
/// from parameter validation, the single-slot transmitter, or the hardware
/// layer underneath.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RotorError {
    /// A parameter was rejected (non-finite angle, step count out of range).
    #[error("invalid parameter: {0}")]
    InvalidParameter(&'static str),

    /// The transmitter or the rotor is already mid-operation.
    #[error("rotor is busy")]
    Busy,

    /// The backend or peripheral has not been initialized.
    #[error("backend not connected")]
    NotConnected,

    /// A hardware peripheral reported a failure.
    #[error("i/o error: {0}")]
    Io(String),

    /// A bounded wait expired.
    #[error("timed out waiting for rotor")]
    Timeout,
}

impl RotorError {
    /// Wraps a hardware-layer error.
    pub fn io<E: Debug>(err: E) -> Self {
        RotorError::Io(format!("{:?}", err))
    }

    /// Short text used for `status/error` publications.
    pub fn as_str(&self) -> &'static str {
        match self {
            RotorError::InvalidParameter(_) => "invalid_parameter",
            RotorError::Busy => "busy",
            RotorError::NotConnected => "not_connected",
            RotorError::Io(_) => "io_error",
            RotorError::Timeout => "timeout",
        }
    }
}
