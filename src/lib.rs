//! # diseqc-rotor
//!
//! A DiSEqC 1.2 satellite dish rotor controller with motor-enable safety,
//! LNB supply control, persistent configuration, and MQTT integration.
//!
//! ## Features
//!
//! - **Positioning encoder**: Angles to GotoX frames (`E0 31 6E d1 d2`), plus
//!   halt, drive and step frames
//! - **Bit modulator**: Parity-extended bit frames turned into 22 kHz
//!   carrier pulse trains for any [`WaveformTransmitter`]
//! - **Motor safety**: The rotor supply is only powered for the estimated
//!   travel time, or indefinitely while tracking, and always cut on exit
//! - **Hardware abstraction**: Traits for the transmitter, enable line, LNB,
//!   and FRAM, with desktop mocks
//!
//! ## Architecture
//!
//! The crate is structured to allow testing on desktop without hardware:
//!
//! - `diseqc` - Frame encoding and parity
//! - `modulator` - Bit frames to pulse programs
//! - `motor` - Motor-enable safety controller (timed / tracking)
//! - `rotor` - [`RotorService`](rotor::RotorService), the [`RotorBackend`] façade
//! - `lnb` - Polarization and band control
//! - `config` / `storage` - Runtime configuration and its FRAM persistence
//! - `services` - MQTT command router
//! - `hal` - Concrete implementations (mock for testing, esp32 for hardware)
//!
//! ## Example
//!
//! ```rust
//! use diseqc_rotor::{
//!     hal::{MockEnableLine, MockTransmitter},
//!     rotor::{RotorConfig, RotorService},
//!     traits::{RotorBackend, RotorState},
//! };
//! use std::time::Duration;
//!
//! let config = RotorConfig::default().with_startup_grace(Duration::from_millis(1));
//! let mut rotor = RotorService::new(MockEnableLine::new(), MockTransmitter::new(), config).unwrap();
//!
//! rotor.goto_angle(19.2).unwrap();
//! assert_eq!(
//!     rotor.transmitter().frame_bytes(0).unwrap(),
//!     vec![0xE0, 0x31, 0x6E, 0xD1, 0x33]
//! );
//! assert_eq!(rotor.poll(), RotorState::Idle);
//! ```

#![cfg_attr(not(feature = "std"), no_std)]
#![warn(missing_docs)]

extern crate alloc;

/// Runtime and rotor configuration.
pub mod config;
/// DiSEqC frame encoding and parity.
pub mod diseqc;
/// Error types.
pub mod error;
/// Hardware abstraction layer with mock implementations for testing.
pub mod hal;
/// LNB voltage/polarization and tone/band control.
pub mod lnb;
/// Bit frames to carrier-modulated pulse programs.
pub mod modulator;
/// Configuration persistence.
pub mod storage;
/// Core traits for hardware, network, and rotor backends.
pub mod traits;

/// Motor-enable safety controller.
#[cfg(feature = "std")]
pub mod motor;
/// Rotor service façade.
#[cfg(feature = "std")]
pub mod rotor;

/// Shared message types for MQTT payloads (serde-based).
#[cfg(feature = "serde")]
pub mod messages;

/// MQTT command router and clients (feature-gated).
#[cfg(any(feature = "mqtt", feature = "esp32-mqtt"))]
pub mod services;

// Re-exports for convenience
pub use config::{MqttConfig, NetworkConfig, RotorConfig, RuntimeConfig, SystemConfig};
pub use diseqc::{CommandEncoder, DiseqcFrame, ParityMode, PositioningCommand};
pub use error::RotorError;
pub use lnb::{Band, LnbService, LnbStatus, Polarization};
pub use modulator::{BitModulator, BitTiming};
pub use storage::{ConfigStore, FramConfigStore, StorageError};
pub use traits::{
    // Hardware
    EnableLine,
    LnbController,
    LnbVoltage,
    // Network
    MqttClient,
    MqttMessage,
    NvMemory,
    PulsePair,
    // Backend
    RotorBackend,
    RotorState,
    RotorStatus,
    WaveformTransmitter,
};

#[cfg(feature = "std")]
pub use motor::{MotorEnableState, MotorSafetyController};
#[cfg(feature = "std")]
pub use rotor::RotorService;

// Message re-exports (for MQTT payloads)
#[cfg(feature = "serde")]
pub use messages::{GotoAngleRequest, StatusMessage};

// Parsing function re-exports (serde-json-core based)
#[cfg(feature = "serde-json-core")]
pub use messages::{parse_goto_payload, status_json};
