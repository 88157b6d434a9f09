//! Trait definitions for hardware abstraction, networking, and rotor backends.
//!
//! This module defines the core abstractions that allow diseqc-rotor to:
//! - Run on different hardware (ESP32, desktop mock)
//! - Use different network implementations
//! - Swap the in-crate encoder stack for an external positioning driver
//!
//! # Submodules
//!
//! - `hardware`: Waveform transmitter, motor-enable line, LNB, non-volatile memory
//! - `network`: MQTT client trait
//! - `backend`: Rotor capability interface
//!
//! # Hardware Abstraction
//!
//! The key hardware traits are:
//!
//! - [`WaveformTransmitter`]: Carrier-modulated pulse output for the DiSEqC bus
//! - [`EnableLine`]: Motor power output
//! - [`LnbController`]: LNB voltage and 22 kHz tone
//! - [`NvMemory`]: FRAM used for configuration storage

pub mod backend;
pub mod hardware;
pub mod network;

pub use backend::*;
pub use hardware::*;
pub use network::*;
