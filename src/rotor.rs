//! Rotor façade: the positioning operations exposed to the command layer.
//!
//! [`RotorService`] ties together the encoder, the [`BitModulator`] and the
//! [`MotorSafetyController`]. Every motion command follows the same
//! sequence:
//!
//! 1. reject if a previous command is still in progress
//! 2. power the motor (timed window or tracking) and wait out the grace period
//! 3. send the frame
//! 4. enter the matching in-motion state
//!
//! If step 2 or 3 fails, the motor is forced off and the service returns to
//! [`RotorState::Idle`] before the error is reported.
//!
//! ```text
//!         goto / step                  poll: frame sent
//!   Idle ─────────────▶ Moving ──────────────────────────▶ Idle
//!    │                  Stepping*
//!    │ drive                          poll: motor window over
//!    └────────────────▶ Driving* ─────────────────────────▶ Idle
//!                           │  halt (any state)
//!                           └─────────────────────────────▶ Idle
//! ```

use core::time::Duration;

use crate::diseqc::{clamp_angle, is_out_of_range, CommandEncoder, DiseqcFrame};
use crate::error::RotorError;
use crate::modulator::BitModulator;
use crate::motor::{MotorEnableState, MotorSafetyController};
use crate::traits::{EnableLine, RotorBackend, RotorState, WaveformTransmitter};

pub use crate::config::RotorConfig;

enum Power {
    Timed(Duration),
    Tracking,
}

/// In-crate [`RotorBackend`] built on the encoder, modulator, and motor controller.
pub struct RotorService<L, T>
where
    L: EnableLine + Send + 'static,
    T: WaveformTransmitter,
{
    motor: MotorSafetyController<L>,
    modulator: BitModulator<T>,
    config: RotorConfig,
    state: RotorState,
    /// Last commanded angle, as reported to callers.
    angle: f32,
    /// Dish position the next travel window can be sized from. `None` at
    /// power-up and after any manual motion or halt.
    position: Option<f32>,
}

impl<L, T> RotorService<L, T>
where
    L: EnableLine + Send + 'static,
    T: WaveformTransmitter,
{
    /// Builds the service. The motor-enable line is driven low immediately.
    pub fn new(line: L, tx: T, config: RotorConfig) -> Result<Self, RotorError> {
        let motor = MotorSafetyController::with_grace(line, config.startup_grace)?;
        let modulator = BitModulator::new(tx)
            .with_timing(config.timing)
            .with_parity(config.parity);
        Ok(Self {
            motor,
            modulator,
            config,
            state: RotorState::Idle,
            angle: 0.0,
            position: None,
        })
    }

    /// Motion tuning in use.
    pub fn config(&self) -> &RotorConfig {
        &self.config
    }

    /// The motor-enable controller.
    pub fn motor(&self) -> &MotorSafetyController<L> {
        &self.motor
    }

    /// Borrow the transmitter.
    pub fn transmitter(&self) -> &T {
        self.modulator.transmitter()
    }

    /// Mutably borrow the transmitter.
    pub fn transmitter_mut(&mut self) -> &mut T {
        self.modulator.transmitter_mut()
    }

    fn ensure_ready(&mut self) -> Result<(), RotorError> {
        if self.poll().is_in_motion() || self.modulator.is_busy() {
            log::warn!("rejecting command: rotor is {}", self.state.as_str());
            return Err(RotorError::Busy);
        }
        Ok(())
    }

    fn start_motion(
        &mut self,
        next: RotorState,
        power: Power,
        frame: &DiseqcFrame,
    ) -> Result<(), RotorError> {
        let powered = match power {
            Power::Timed(travel) => self.motor.turn_on_motor(travel),
            Power::Tracking => self.motor.start_tracking(),
        };
        match powered.and_then(|()| self.modulator.send_frame(frame)) {
            Ok(()) => {
                self.state = next;
                Ok(())
            }
            Err(e) => {
                log::error!("{} failed: {}", next.as_str(), e);
                self.state = RotorState::Idle;
                if let Err(off) = self.motor.stop_tracking() {
                    log::error!("failed to force motor off: {}", off);
                }
                Err(e)
            }
        }
    }

    fn goto(&mut self, angle: f32, tracking: bool) -> Result<(), RotorError> {
        if !angle.is_finite() {
            return Err(RotorError::InvalidParameter("angle must be finite"));
        }
        self.ensure_ready()?;

        let target = clamp_angle(angle);
        if is_out_of_range(angle) {
            log::warn!("angle {:.1} outside ±80°, clamped to {:.1}", angle, target);
        }

        let power = if tracking {
            Power::Tracking
        } else {
            Power::Timed(self.travel_window(target))
        };
        let command = CommandEncoder::build(angle);
        log::info!("goto {:.1}° ({:02X?})", target, command.bytes());

        self.position = None;
        self.start_motion(RotorState::Moving, power, &DiseqcFrame::from(command))?;
        self.angle = target;
        self.position = Some(target);
        Ok(())
    }

    /// Window for a goto to `target`. From an unknown position this is a
    /// full east-to-west sweep.
    fn travel_window(&self, target: f32) -> Duration {
        match self.position {
            Some(from) => self.config.travel_time(target - from),
            None => self.config.drive_window(),
        }
    }

    fn step(&mut self, next: RotorState, frame: DiseqcFrame) -> Result<(), RotorError> {
        self.ensure_ready()?;
        log::info!("{} ({:02X?})", next.as_str(), frame.bytes());
        self.position = None;
        self.start_motion(next, Power::Timed(self.config.step_window), &frame)
    }

    fn drive(&mut self, next: RotorState, frame: DiseqcFrame) -> Result<(), RotorError> {
        self.ensure_ready()?;
        log::info!("{} until halted", next.as_str());
        self.position = None;
        self.start_motion(next, Power::Timed(self.config.drive_window()), &frame)
    }
}

impl<L, T> RotorBackend for RotorService<L, T>
where
    L: EnableLine + Send + 'static,
    T: WaveformTransmitter,
{
    fn goto_angle(&mut self, angle: f32) -> Result<(), RotorError> {
        self.goto(angle, false)
    }

    fn track_and_goto_angle(&mut self, angle: f32) -> Result<(), RotorError> {
        self.goto(angle, true)
    }

    fn stop_tracking(&mut self) -> Result<(), RotorError> {
        self.motor.stop_tracking()
    }

    fn halt(&mut self) -> Result<(), RotorError> {
        let sent = self
            .modulator
            .wait_idle(self.config.halt_wait, self.config.busy_poll_interval)
            .and_then(|()| self.modulator.send_frame(&DiseqcFrame::halt()));
        if let Err(e) = &sent {
            log::error!("halt frame not sent: {}", e);
        }
        let off = self.motor.stop_tracking();
        self.state = RotorState::Idle;
        self.position = None;
        log::info!("halted");
        sent.and(off)
    }

    fn step_east(&mut self, steps: u8) -> Result<(), RotorError> {
        let frame = DiseqcFrame::step_east(steps)?;
        self.step(RotorState::SteppingEast, frame)
    }

    fn step_west(&mut self, steps: u8) -> Result<(), RotorError> {
        let frame = DiseqcFrame::step_west(steps)?;
        self.step(RotorState::SteppingWest, frame)
    }

    fn drive_east(&mut self) -> Result<(), RotorError> {
        self.drive(RotorState::DrivingEast, DiseqcFrame::drive_east())
    }

    fn drive_west(&mut self) -> Result<(), RotorError> {
        self.drive(RotorState::DrivingWest, DiseqcFrame::drive_west())
    }

    fn poll(&mut self) -> RotorState {
        let done = match self.state {
            RotorState::Idle => false,
            RotorState::Moving | RotorState::SteppingEast | RotorState::SteppingWest => {
                !self.modulator.is_busy()
            }
            RotorState::DrivingEast | RotorState::DrivingWest => !self.motor.is_motor_on(),
        };
        if done {
            log::debug!("{} complete", self.state.as_str());
            self.state = RotorState::Idle;
        }
        self.state
    }

    fn is_busy(&self) -> bool {
        self.state.is_in_motion() || self.modulator.is_busy()
    }

    fn current_angle(&self) -> f32 {
        self.angle
    }

    fn state(&self) -> RotorState {
        self.state
    }

    fn is_tracking(&self) -> bool {
        self.motor.state() == MotorEnableState::TrackingForever
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::{MockEnableLine, MockTransmitter};
    use std::time::Instant;

    type Service = RotorService<MockEnableLine, MockTransmitter>;

    fn config() -> RotorConfig {
        RotorConfig::default()
            .with_startup_grace(Duration::from_millis(1))
            .with_halt_wait(Duration::from_millis(20))
    }

    fn service() -> (Service, MockEnableLine) {
        let line = MockEnableLine::new();
        let tx = MockTransmitter::new().with_line_monitor(line.clone());
        let svc = RotorService::new(line.clone(), tx, config()).unwrap();
        (svc, line)
    }

    fn holding_service() -> (Service, MockEnableLine) {
        let line = MockEnableLine::new();
        let svc = RotorService::new(line.clone(), MockTransmitter::new().holding(), config()).unwrap();
        (svc, line)
    }

    // =========================================================================
    // GotoAngle
    // =========================================================================

    #[test]
    fn goto_sends_positioning_frame_with_motor_on() {
        let (mut rotor, line) = service();
        rotor.goto_angle(19.2).unwrap();

        assert_eq!(
            rotor.transmitter().last_frame_bytes(),
            Some(vec![0xE0, 0x31, 0x6E, 0xD1, 0x33])
        );
        assert_eq!(rotor.transmitter().line_at_transmit, vec![true]);
        assert!(line.is_high());
        assert_eq!(rotor.state(), RotorState::Moving);
        assert!((rotor.current_angle() - 19.2).abs() < 1e-4);
    }

    #[test]
    fn goto_out_of_range_clamps() {
        let (mut rotor, _line) = service();
        rotor.goto_angle(-90.0).unwrap();
        assert_eq!(
            rotor.transmitter().last_frame_bytes(),
            Some(vec![0xE0, 0x31, 0x6E, 0xE5, 0x00])
        );
        assert_eq!(rotor.current_angle(), -80.0);
    }

    #[test]
    fn goto_rejects_non_finite() {
        let (mut rotor, line) = service();
        for bad in [f32::NAN, f32::INFINITY, f32::NEG_INFINITY] {
            assert!(matches!(
                rotor.goto_angle(bad),
                Err(RotorError::InvalidParameter(_))
            ));
        }
        assert!(rotor.transmitter().frames.is_empty());
        assert_eq!(line.writes(), vec![false]);
    }

    fn deadline(rotor: &Service) -> Instant {
        match rotor.motor().state() {
            MotorEnableState::TimedOn { deadline } => deadline,
            other => panic!("unexpected motor state {:?}", other),
        }
    }

    #[test]
    fn goto_window_matches_travel_estimate() {
        let (mut rotor, _line) = service();
        rotor.goto_angle(0.0).unwrap();
        rotor.poll();

        let before = Instant::now();
        rotor.goto_angle(30.0).unwrap();
        // 30° at 1.5°/s = 20 s, plus grace
        let deadline = deadline(&rotor);
        assert!(deadline >= before + Duration::from_secs(20));
        assert!(deadline < before + Duration::from_secs(21));
    }

    #[test]
    fn first_goto_gets_full_sweep_window() {
        let (mut rotor, _line) = service();
        let before = Instant::now();
        rotor.goto_angle(5.0).unwrap();
        assert!(deadline(&rotor) >= before + rotor.config().drive_window());
    }

    #[test]
    fn manual_motion_forgets_position() {
        let (mut rotor, _line) = service();
        rotor.goto_angle(10.0).unwrap();
        rotor.poll();
        rotor.step_east(4).unwrap();
        rotor.poll();

        let before = Instant::now();
        rotor.goto_angle(10.0).unwrap();
        assert!(deadline(&rotor) >= before + rotor.config().drive_window());
        assert_eq!(rotor.current_angle(), 10.0);
    }

    #[test]
    fn poll_returns_idle_after_transmit() {
        let (mut rotor, _line) = holding_service();
        rotor.goto_angle(5.0).unwrap();
        assert_eq!(rotor.poll(), RotorState::Moving);
        assert!(rotor.is_busy());

        rotor.transmitter_mut().complete();
        assert_eq!(rotor.poll(), RotorState::Idle);
        assert!(!rotor.is_busy());
    }

    #[test]
    fn second_command_while_busy_is_rejected() {
        let (mut rotor, _line) = holding_service();
        rotor.goto_angle(5.0).unwrap();
        assert_eq!(rotor.goto_angle(10.0), Err(RotorError::Busy));
        assert_eq!(rotor.step_east(1), Err(RotorError::Busy));
        assert_eq!(rotor.transmitter().frames.len(), 1);

        rotor.transmitter_mut().complete();
        rotor.goto_angle(10.0).unwrap();
        assert_eq!(rotor.transmitter().frames.len(), 2);
    }

    #[test]
    fn transmit_failure_forces_motor_off() {
        let (mut rotor, line) = service();
        rotor.transmitter_mut().fail_next = true;

        let err = rotor.goto_angle(12.0).unwrap_err();
        assert!(matches!(err, RotorError::Io(_)));
        assert!(!line.is_high());
        assert_eq!(rotor.state(), RotorState::Idle);
        assert_eq!(rotor.current_angle(), 0.0);
    }

    #[test]
    fn enable_failure_sends_nothing() {
        let (mut rotor, line) = service();
        line.fail_enable(true);
        assert!(matches!(rotor.goto_angle(12.0), Err(RotorError::Io(_))));
        assert!(rotor.transmitter().frames.is_empty());
        assert_eq!(rotor.state(), RotorState::Idle);
    }

    // =========================================================================
    // Tracking
    // =========================================================================

    #[test]
    fn track_and_goto_holds_motor() {
        let (mut rotor, line) = service();
        rotor.track_and_goto_angle(-12.5).unwrap();
        assert!(rotor.is_tracking());
        assert!(!rotor.motor().has_pending_timer());
        assert_eq!(rotor.poll(), RotorState::Idle);

        // A timed goto while tracking keeps the output asserted.
        rotor.goto_angle(-13.0).unwrap();
        assert!(rotor.is_tracking());
        assert!(line.is_high());

        rotor.stop_tracking().unwrap();
        assert!(!rotor.is_tracking());
        assert!(!line.is_high());
    }

    // =========================================================================
    // Manual Motion
    // =========================================================================

    #[test]
    fn step_frames() {
        let (mut rotor, _line) = service();
        rotor.step_west(5).unwrap();
        assert_eq!(rotor.state(), RotorState::SteppingWest);
        assert_eq!(
            rotor.transmitter().last_frame_bytes(),
            Some(vec![0xE0, 0x31, 0x69, 0x05])
        );

        rotor.poll();
        rotor.step_east(128).unwrap();
        assert_eq!(
            rotor.transmitter().last_frame_bytes(),
            Some(vec![0xE0, 0x31, 0x68, 0x80])
        );
    }

    #[test]
    fn step_count_validated_before_motor() {
        let (mut rotor, line) = service();
        assert!(matches!(
            rotor.step_east(0),
            Err(RotorError::InvalidParameter(_))
        ));
        assert!(matches!(
            rotor.step_west(129),
            Err(RotorError::InvalidParameter(_))
        ));
        assert_eq!(line.writes(), vec![false]);
    }

    #[test]
    fn drive_stays_busy_until_halt() {
        let (mut rotor, line) = service();
        rotor.drive_east().unwrap();
        assert_eq!(
            rotor.transmitter().last_frame_bytes(),
            Some(vec![0xE0, 0x31, 0x68, 0x00])
        );
        assert_eq!(rotor.poll(), RotorState::DrivingEast);
        assert!(rotor.is_busy());

        rotor.halt().unwrap();
        assert_eq!(
            rotor.transmitter().last_frame_bytes(),
            Some(vec![0xE0, 0x31, 0x60])
        );
        assert_eq!(rotor.state(), RotorState::Idle);
        assert!(!line.is_high());
    }

    #[test]
    fn drive_west_frame() {
        let (mut rotor, _line) = service();
        rotor.drive_west().unwrap();
        assert_eq!(rotor.state(), RotorState::DrivingWest);
        assert_eq!(
            rotor.transmitter().last_frame_bytes(),
            Some(vec![0xE0, 0x31, 0x69, 0x00])
        );
    }

    // =========================================================================
    // Halt
    // =========================================================================

    #[test]
    fn halt_from_tracking_turns_motor_off() {
        let (mut rotor, line) = service();
        rotor.track_and_goto_angle(3.0).unwrap();
        rotor.halt().unwrap();
        assert!(!rotor.is_tracking());
        assert!(!line.is_high());
    }

    #[test]
    fn halt_times_out_but_still_powers_down() {
        let (mut rotor, line) = holding_service();
        rotor.goto_angle(40.0).unwrap();

        assert_eq!(rotor.halt(), Err(RotorError::Timeout));
        assert!(!line.is_high());
        assert_eq!(rotor.state(), RotorState::Idle);
        assert_eq!(rotor.transmitter().frames.len(), 1);
    }

    #[test]
    fn dropping_service_turns_motor_off() {
        let (mut rotor, line) = service();
        rotor.goto_angle(10.0).unwrap();
        drop(rotor);
        assert!(!line.is_high());
    }
}
