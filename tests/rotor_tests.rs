//! End-to-end tests for the rotor service and its motor-enable window

use std::thread;
use std::time::{Duration, Instant};

use diseqc_rotor::{
    hal::{MockEnableLine, MockTransmitter},
    MotorEnableState, RotorBackend, RotorConfig, RotorError, RotorService, RotorState,
};

type Service = RotorService<MockEnableLine, MockTransmitter>;

fn fast_config() -> RotorConfig {
    RotorConfig::default()
        .with_startup_grace(Duration::from_millis(1))
        .with_min_travel(Duration::from_millis(50))
        .with_halt_wait(Duration::from_millis(20))
}

fn rotor() -> (Service, MockEnableLine) {
    let line = MockEnableLine::new();
    let tx = MockTransmitter::new().with_line_monitor(line.clone());
    let rotor = RotorService::new(line.clone(), tx, fast_config()).unwrap();
    (rotor, line)
}

// ============================================================================
// Startup
// ============================================================================

#[test]
fn construction_drives_enable_low() {
    let line = MockEnableLine::new();
    line.force_level(true);
    let _rotor = RotorService::new(line.clone(), MockTransmitter::new(), fast_config()).unwrap();
    assert!(!line.is_high());
    assert_eq!(line.writes(), vec![false]);
}

#[test]
fn fresh_service_is_idle_at_zero() {
    let (rotor, _line) = rotor();
    let status = rotor.status();
    assert_eq!(status.state, RotorState::Idle);
    assert!(!status.busy);
    assert!(!status.tracking);
    assert_eq!(status.angle, 0.0);
}

// ============================================================================
// Timed Motion
// ============================================================================

#[test]
fn goto_window_expires_and_releases_motor() {
    let (mut rotor, line) = rotor();
    rotor.goto_angle(0.0).unwrap();
    rotor.poll();
    // Position now known; zero travel falls back to the minimum window.
    rotor.goto_angle(0.0).unwrap();
    assert_eq!(rotor.transmitter().line_at_transmit, vec![true, true]);

    thread::sleep(Duration::from_millis(300));
    assert!(!line.is_high());
    assert_eq!(rotor.motor().state(), MotorEnableState::Off);
    assert_eq!(line.writes()[..2], [false, true]);
    assert_eq!(line.writes().last(), Some(&false));
}

#[test]
fn every_frame_goes_out_with_motor_powered() {
    let (mut rotor, _line) = rotor();
    rotor.goto_angle(10.0).unwrap();
    rotor.poll();
    rotor.step_east(3).unwrap();
    rotor.poll();
    rotor.goto_angle(-25.0).unwrap();

    assert_eq!(rotor.transmitter().frames.len(), 3);
    assert_eq!(rotor.transmitter().line_at_transmit, vec![true, true, true]);
}

#[test]
fn angle_tracks_last_accepted_goto() {
    let (mut rotor, _line) = rotor();
    rotor.goto_angle(19.2).unwrap();
    rotor.poll();
    rotor.goto_angle(-120.0).unwrap();
    rotor.poll();
    assert_eq!(rotor.current_angle(), -80.0);

    assert!(rotor.goto_angle(f32::NAN).is_err());
    assert_eq!(rotor.current_angle(), -80.0);
}

#[test]
fn goto_after_manual_drive_uses_full_sweep_window() {
    let (mut rotor, _line) = rotor();
    rotor.drive_east().unwrap();
    rotor.halt().unwrap();

    let before = Instant::now();
    rotor.goto_angle(0.0).unwrap();
    match rotor.motor().state() {
        MotorEnableState::TimedOn { deadline } => {
            assert!(deadline >= before + rotor.config().drive_window());
            assert!(deadline >= before + Duration::from_secs(50));
        }
        other => panic!("unexpected motor state {:?}", other),
    }
}

#[test]
fn goto_after_reset_uses_full_sweep_window() {
    let (mut rotor, _line) = rotor();
    let before = Instant::now();
    rotor.goto_angle(-60.0).unwrap();
    match rotor.motor().state() {
        MotorEnableState::TimedOn { deadline } => {
            assert!(deadline >= before + Duration::from_secs(50));
        }
        other => panic!("unexpected motor state {:?}", other),
    }
}

// ============================================================================
// Busy Handling
// ============================================================================

#[test]
fn busy_transmitter_rejects_motion() {
    let line = MockEnableLine::new();
    let mut rotor =
        RotorService::new(line, MockTransmitter::new().holding(), fast_config()).unwrap();

    rotor.goto_angle(5.0).unwrap();
    assert!(rotor.is_busy());
    assert_eq!(rotor.drive_west(), Err(RotorError::Busy));
    assert_eq!(rotor.track_and_goto_angle(6.0), Err(RotorError::Busy));

    rotor.transmitter_mut().complete();
    assert_eq!(rotor.poll(), RotorState::Idle);
    assert!(rotor.drive_west().is_ok());
}

// ============================================================================
// Continuous Drive and Halt
// ============================================================================

#[test]
fn drive_then_halt() {
    let (mut rotor, line) = rotor();
    rotor.drive_east().unwrap();
    assert_eq!(rotor.poll(), RotorState::DrivingEast);
    assert!(rotor.is_busy());
    assert_eq!(
        rotor.transmitter().last_frame_bytes(),
        Some(vec![0xE0, 0x31, 0x68, 0x00])
    );

    rotor.halt().unwrap();
    assert_eq!(rotor.state(), RotorState::Idle);
    assert!(!line.is_high());
    assert_eq!(
        rotor.transmitter().last_frame_bytes(),
        Some(vec![0xE0, 0x31, 0x60])
    );
}

#[test]
fn halt_cancels_tracking() {
    let (mut rotor, line) = rotor();
    rotor.track_and_goto_angle(30.0).unwrap();
    assert!(rotor.is_tracking());

    rotor.halt().unwrap();
    assert!(!rotor.is_tracking());
    assert!(!line.is_high());
}

#[test]
fn halt_powers_down_even_if_frame_fails() {
    let (mut rotor, line) = rotor();
    rotor.track_and_goto_angle(30.0).unwrap();
    rotor.transmitter_mut().fail_next = true;

    assert!(matches!(rotor.halt(), Err(RotorError::Io(_))));
    assert!(!line.is_high());
    assert_eq!(rotor.state(), RotorState::Idle);
}

#[test]
fn halt_when_idle_is_harmless() {
    let (mut rotor, line) = rotor();
    rotor.halt().unwrap();
    assert!(!line.is_high());
    assert_eq!(rotor.transmitter().frames.len(), 1);
}

// ============================================================================
// Tracking
// ============================================================================

#[test]
fn tracking_survives_window_expiry() {
    let (mut rotor, line) = rotor();
    rotor.track_and_goto_angle(12.0).unwrap();
    rotor.poll();
    rotor.goto_angle(0.0).unwrap();

    thread::sleep(Duration::from_millis(200));
    assert!(line.is_high());
    assert_eq!(rotor.motor().state(), MotorEnableState::TrackingForever);

    rotor.stop_tracking().unwrap();
    assert!(!line.is_high());
}

#[test]
fn dropping_service_releases_motor() {
    let (mut rotor, line) = rotor();
    rotor.track_and_goto_angle(12.0).unwrap();
    assert!(line.is_high());

    drop(rotor);
    assert!(!line.is_high());
}

// ============================================================================
// Manual Steps
// ============================================================================

#[test]
fn step_bounds() {
    let (mut rotor, _line) = rotor();
    assert!(matches!(
        rotor.step_east(0),
        Err(RotorError::InvalidParameter(_))
    ));
    assert!(matches!(
        rotor.step_west(200),
        Err(RotorError::InvalidParameter(_))
    ));
    assert!(rotor.transmitter().frames.is_empty());

    rotor.step_west(128).unwrap();
    assert_eq!(rotor.state(), RotorState::SteppingWest);
    assert_eq!(rotor.poll(), RotorState::Idle);
}
