//! Shared message types for MQTT payloads.
//!
//! These types are `no_std` compatible and can be (de)serialized using
//! either `serde_json` (desktop) or `serde-json-core` (embedded).
//!
//! # Example
//!
//! ```
//! use diseqc_rotor::messages::GotoAngleRequest;
//!
//! // Desktop: using serde_json
//! #[cfg(feature = "mqtt")]
//! {
//!     let json = r#"{"angle": 19.2, "track": true}"#;
//!     let req: GotoAngleRequest = serde_json::from_str(json).unwrap();
//!     assert!(req.track);
//! }
//! ```

use serde::{Deserialize, Serialize};

use crate::lnb::LnbStatus;
use crate::traits::{RotorState, RotorStatus};

// ============================================================================
// Request Types
// ============================================================================

/// Request to move the dish.
///
/// # JSON Examples
///
/// Timed move:
/// ```json
/// {"angle": 19.2}
/// ```
///
/// Move and keep the motor powered for tracking:
/// ```json
/// {"angle": -5.0, "track": true}
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GotoAngleRequest {
    /// Target angle in degrees (east positive)
    pub angle: f32,
    /// Hold the motor on after the move
    #[serde(default)]
    pub track: bool,
}

impl GotoAngleRequest {
    /// A timed move.
    pub fn timed(angle: f32) -> Self {
        Self {
            angle,
            track: false,
        }
    }

    /// A tracking move.
    pub fn tracking(angle: f32) -> Self {
        Self { angle, track: true }
    }
}

// ============================================================================
// Status Snapshot
// ============================================================================

/// Full status published on `status/json`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StatusMessage<'a> {
    /// Device name from the runtime config
    pub device: &'a str,
    /// Rotor state
    pub state: RotorState,
    /// Whether motion commands are currently rejected
    pub busy: bool,
    /// Tracking mode
    pub tracking: bool,
    /// Last commanded angle
    pub angle: f32,
    /// LNB voltage (`"13"` / `"18"`)
    pub voltage: &'static str,
    /// LNB polarization
    pub polarization: &'static str,
    /// 22 kHz tone
    pub tone: bool,
    /// LNB band
    pub band: &'static str,
}

impl<'a> StatusMessage<'a> {
    /// Builds a snapshot from rotor and LNB status.
    pub fn new(device: &'a str, rotor: &RotorStatus, lnb: &LnbStatus) -> Self {
        Self {
            device,
            state: rotor.state,
            busy: rotor.busy,
            tracking: rotor.tracking,
            angle: rotor.angle,
            voltage: lnb.voltage.as_str(),
            polarization: lnb.polarization().as_str(),
            tone: lnb.tone,
            band: lnb.band().as_str(),
        }
    }
}

// ============================================================================
// Parsing Functions (using serde-json-core for no_std compatibility)
// ============================================================================

/// Parse a `goto/angle` payload: a bare number or a JSON request.
///
/// # Example
///
/// ```
/// use diseqc_rotor::messages::parse_goto_payload;
///
/// assert_eq!(parse_goto_payload(b" 19.2 ").unwrap().angle, 19.2);
///
/// let req = parse_goto_payload(br#"{"angle": -5.5, "track": true}"#).unwrap();
/// assert_eq!(req.angle, -5.5);
/// assert!(req.track);
///
/// assert!(parse_goto_payload(b"north").is_none());
/// ```
#[cfg(feature = "serde-json-core")]
pub fn parse_goto_payload(payload: &[u8]) -> Option<GotoAngleRequest> {
    let text = core::str::from_utf8(payload).ok()?.trim();
    if text.starts_with('{') {
        return serde_json_core::from_str(text).ok().map(|(req, _)| req);
    }
    text.parse::<f32>().ok().map(GotoAngleRequest::timed)
}

/// Serialize a status snapshot to JSON.
///
/// Returns `None` if the snapshot does not fit in 256 bytes.
#[cfg(feature = "serde-json-core")]
pub fn status_json(status: &StatusMessage<'_>) -> Option<heapless::String<256>> {
    serde_json_core::to_string(status).ok()
}
