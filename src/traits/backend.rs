//! Rotor capability interface.
//!
//! [`RotorBackend`] is the seam between the command layer (MQTT runner,
//! firmware main loop) and whatever actually moves the dish. The in-crate
//! [`RotorService`](crate::rotor::RotorService) implements it on top of the
//! encoder, modulator, and motor-safety controller; a deployment that hands
//! the whole stack to an external firmware module implements it around
//! that module's calls instead.

use crate::error::RotorError;

/// What the rotor is currently doing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum RotorState {
    /// No command in progress.
    #[default]
    Idle,
    /// A GotoX command has been issued and not yet completed.
    Moving,
    /// Stepping east by a fixed number of steps.
    SteppingEast,
    /// Stepping west by a fixed number of steps.
    SteppingWest,
    /// Driving east until halted.
    DrivingEast,
    /// Driving west until halted.
    DrivingWest,
}

impl RotorState {
    /// Returns the state as published on `status/state`.
    ///
    /// # Examples
    ///
    /// ```
    /// use diseqc_rotor::traits::RotorState;
    ///
    /// assert_eq!(RotorState::Idle.as_str(), "idle");
    /// assert_eq!(RotorState::SteppingEast.as_str(), "stepping_east");
    /// ```
    #[inline]
    pub const fn as_str(&self) -> &'static str {
        match self {
            RotorState::Idle => "idle",
            RotorState::Moving => "moving",
            RotorState::SteppingEast => "stepping_east",
            RotorState::SteppingWest => "stepping_west",
            RotorState::DrivingEast => "driving_east",
            RotorState::DrivingWest => "driving_west",
        }
    }

    /// Returns `true` for every state other than [`Idle`](Self::Idle).
    #[inline]
    pub const fn is_in_motion(&self) -> bool {
        !matches!(self, RotorState::Idle)
    }
}

/// Point-in-time snapshot of the rotor, suitable for publishing.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RotorStatus {
    /// Current state machine value.
    pub state: RotorState,
    /// Whether a new motion command would be rejected.
    pub busy: bool,
    /// Last commanded angle in degrees (east positive).
    pub angle: f32,
    /// Whether the motor is held on indefinitely for tracking.
    pub tracking: bool,
}

/// Capability interface for anything that can position the dish.
///
/// All motion commands are non-blocking with respect to the rotor's travel:
/// they return once the command is on the wire. Completion is observed by
/// calling [`poll`](Self::poll) until [`is_busy`](Self::is_busy) is false.
pub trait RotorBackend {
    /// Moves to `angle` degrees with the motor powered for the estimated travel time.
    fn goto_angle(&mut self, angle: f32) -> Result<(), RotorError>;

    /// Moves to `angle` degrees and keeps the motor powered until
    /// [`stop_tracking`](Self::stop_tracking).
    fn track_and_goto_angle(&mut self, angle: f32) -> Result<(), RotorError>;

    /// Leaves tracking mode and removes motor power.
    fn stop_tracking(&mut self) -> Result<(), RotorError>;

    /// Sends the immediate-stop command and removes motor power.
    fn halt(&mut self) -> Result<(), RotorError>;

    /// Steps east by `steps` (1..=128).
    fn step_east(&mut self, steps: u8) -> Result<(), RotorError>;

    /// Steps west by `steps` (1..=128).
    fn step_west(&mut self, steps: u8) -> Result<(), RotorError>;

    /// Drives east until halted.
    fn drive_east(&mut self) -> Result<(), RotorError>;

    /// Drives west until halted.
    fn drive_west(&mut self) -> Result<(), RotorError>;

    /// Advances internal state (e.g. transmission complete → idle) and
    /// returns the resulting state.
    fn poll(&mut self) -> RotorState;

    /// Returns `true` if a motion command would currently be rejected.
    fn is_busy(&self) -> bool;

    /// Last commanded angle in degrees.
    fn current_angle(&self) -> f32;

    /// Current state machine value.
    fn state(&self) -> RotorState;

    /// Whether tracking mode is active.
    fn is_tracking(&self) -> bool {
        false
    }

    /// Snapshot for status publishing.
    fn status(&self) -> RotorStatus {
        RotorStatus {
            state: self.state(),
            busy: self.is_busy(),
            angle: self.current_angle(),
            tracking: self.is_tracking(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotor_state_default_is_idle() {
        assert_eq!(RotorState::default(), RotorState::Idle);
        assert!(!RotorState::Idle.is_in_motion());
    }

    #[test]
    fn rotor_state_strings() {
        assert_eq!(RotorState::Moving.as_str(), "moving");
        assert_eq!(RotorState::SteppingWest.as_str(), "stepping_west");
        assert_eq!(RotorState::DrivingEast.as_str(), "driving_east");
        assert_eq!(RotorState::DrivingWest.as_str(), "driving_west");
    }

    #[test]
    fn every_non_idle_state_is_in_motion() {
        for s in [
            RotorState::Moving,
            RotorState::SteppingEast,
            RotorState::SteppingWest,
            RotorState::DrivingEast,
            RotorState::DrivingWest,
        ] {
            assert!(s.is_in_motion(), "{:?}", s);
        }
    }

    struct FixedRotor;

    impl RotorBackend for FixedRotor {
        fn goto_angle(&mut self, _angle: f32) -> Result<(), RotorError> {
            Ok(())
        }
        fn track_and_goto_angle(&mut self, _angle: f32) -> Result<(), RotorError> {
            Ok(())
        }
        fn stop_tracking(&mut self) -> Result<(), RotorError> {
            Ok(())
        }
        fn halt(&mut self) -> Result<(), RotorError> {
            Ok(())
        }
        fn step_east(&mut self, _steps: u8) -> Result<(), RotorError> {
            Ok(())
        }
        fn step_west(&mut self, _steps: u8) -> Result<(), RotorError> {
            Ok(())
        }
        fn drive_east(&mut self) -> Result<(), RotorError> {
            Ok(())
        }
        fn drive_west(&mut self) -> Result<(), RotorError> {
            Ok(())
        }
        fn poll(&mut self) -> RotorState {
            RotorState::Moving
        }
        fn is_busy(&self) -> bool {
            true
        }
        fn current_angle(&self) -> f32 {
            13.0
        }
        fn state(&self) -> RotorState {
            RotorState::Moving
        }
    }

    #[test]
    fn status_default_impl_collects_queries() {
        let status = FixedRotor.status();
        assert_eq!(status.state, RotorState::Moving);
        assert!(status.busy);
        assert_eq!(status.angle, 13.0);
        assert!(!status.tracking);
    }
}
