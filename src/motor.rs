//! Motor-enable safety controller.
//!
//! The rotor's drive motor is powered through a single enable output. A
//! stuck-on output drives the dish into its end stops, so every path that
//! turns the motor on for a bounded time must also turn it off again, even
//! when the pending turn-off is cancelled or replaced.
//!
//! # States
//!
//! ```text
//!            turn_on_motor                 window elapsed / stop_tracking
//!   Off ─────────────────────▶ TimedOn ─────────────────────────────────▶ Off
//!    │                            │
//!    │ start_tracking             │ start_tracking
//!    ▼                            ▼
//!   TrackingForever ◀─────────────┘
//!    │
//!    └──── stop_tracking ─────────────────────────────────────────────▶ Off
//! ```
//!
//! # Timer model
//!
//! A timed turn-on arms one background thread that waits on a cancellation
//! channel for `travel + grace`. The thread's exit guard performs the
//! turn-off, so it runs on expiry, on cancellation, and on unwinding. Each
//! turn-on bumps a generation counter; a guard whose generation is stale
//! leaves the output alone so a replacement never glitches the line low.
//! The previous timer is cancelled and joined before the next one is armed.

use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::error::RotorError;
use crate::traits::EnableLine;

/// Time the motor needs after power-up before it accepts a positioning frame.
pub const STARTUP_GRACE: Duration = Duration::from_secs(2);

/// Logical state of the motor-enable output.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum MotorEnableState {
    /// Output de-asserted.
    #[default]
    Off,
    /// Output asserted until `deadline`.
    TimedOn {
        /// When the pending turn-off fires.
        deadline: Instant,
    },
    /// Output asserted until [`MotorSafetyController::stop_tracking`].
    TrackingForever,
}

impl MotorEnableState {
    /// Returns `true` if the output should be asserted.
    #[inline]
    pub fn is_on(&self) -> bool {
        !matches!(self, MotorEnableState::Off)
    }

    /// Short name for logs and status.
    pub fn as_str(&self) -> &'static str {
        match self {
            MotorEnableState::Off => "off",
            MotorEnableState::TimedOn { .. } => "timed_on",
            MotorEnableState::TrackingForever => "tracking",
        }
    }
}

struct Inner<L> {
    line: L,
    state: MotorEnableState,
    generation: u64,
}

impl<L: EnableLine> Inner<L> {
    fn force_off(&mut self) -> Result<(), L::Error> {
        self.state = MotorEnableState::Off;
        self.line.disable()
    }

    /// Turn-off on a failure path, where the original error is the one reported.
    fn release_after(&mut self, what: &str) {
        if let Err(e) = self.force_off() {
            log::error!("failed to release motor enable after {}: {:?}", what, e);
        }
    }
}

fn lock_inner<L>(inner: &Mutex<Inner<L>>) -> MutexGuard<'_, Inner<L>> {
    // A panic while holding the lock must not stop us from turning the motor off.
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

struct TimerHandle {
    cancel: Sender<()>,
    join: JoinHandle<()>,
}

impl TimerHandle {
    /// Cancels the timer and waits for its cleanup to finish.
    fn retire(self) {
        let _ = self.cancel.send(());
        if self.join.join().is_err() {
            log::error!("motor timer thread panicked");
        }
    }
}

/// Runs the turn-off when the timer thread exits for any reason.
struct DeassertOnExit<L: EnableLine> {
    inner: Arc<Mutex<Inner<L>>>,
    generation: u64,
}

impl<L: EnableLine> Drop for DeassertOnExit<L> {
    fn drop(&mut self) {
        let mut inner = lock_inner(&self.inner);
        match inner.state {
            MotorEnableState::TimedOn { .. } if inner.generation == self.generation => {
                match inner.force_off() {
                    Ok(()) => log::info!("motor window elapsed, enable released"),
                    Err(e) => log::error!("failed to release motor enable: {:?}", e),
                }
            }
            MotorEnableState::Off => {
                if let Err(e) = inner.line.disable() {
                    log::error!("failed to re-assert motor off: {:?}", e);
                }
            }
            // A newer turn-on or tracking mode owns the output.
            _ => {}
        }
    }
}

fn spawn_timer<L>(
    inner: Arc<Mutex<Inner<L>>>,
    generation: u64,
    window: Duration,
) -> std::io::Result<TimerHandle>
where
    L: EnableLine + Send + 'static,
{
    let (cancel, cancelled) = mpsc::channel::<()>();
    let join = thread::Builder::new()
        .name("motor-off-timer".into())
        .spawn(move || {
            let _guard = DeassertOnExit { inner, generation };
            match cancelled.recv_timeout(window) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                    log::debug!("motor timer {} cancelled", generation);
                }
            }
        })?;
    Ok(TimerHandle { cancel, join })
}

/// Sole owner of the motor-enable output.
///
/// All methods take `&self`; the controller can be shared behind an `Arc`.
/// Control operations are serialized internally.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use diseqc_rotor::motor::{MotorSafetyController, MotorEnableState};
/// use diseqc_rotor::hal::MockEnableLine;
///
/// let line = MockEnableLine::new();
/// let motor = MotorSafetyController::with_grace(line.clone(), Duration::from_millis(5)).unwrap();
///
/// motor.turn_on_motor(Duration::from_millis(10)).unwrap();
/// assert!(line.is_high());
///
/// motor.stop_tracking().unwrap();
/// assert!(!line.is_high());
/// assert_eq!(motor.state(), MotorEnableState::Off);
/// ```
pub struct MotorSafetyController<L: EnableLine + Send + 'static> {
    inner: Arc<Mutex<Inner<L>>>,
    timer: Mutex<Option<TimerHandle>>,
    grace: Duration,
}

impl<L: EnableLine + Send + 'static> MotorSafetyController<L> {
    /// Takes ownership of the output with the standard 2 s startup grace.
    ///
    /// The output is driven low immediately.
    pub fn new(line: L) -> Result<Self, RotorError> {
        Self::with_grace(line, STARTUP_GRACE)
    }

    /// Takes ownership of the output with a custom startup grace.
    pub fn with_grace(mut line: L, grace: Duration) -> Result<Self, RotorError> {
        line.disable().map_err(RotorError::io)?;
        Ok(Self {
            inner: Arc::new(Mutex::new(Inner {
                line,
                state: MotorEnableState::Off,
                generation: 0,
            })),
            timer: Mutex::new(None),
            grace,
        })
    }

    /// Powers the motor for `travel` plus the startup grace.
    ///
    /// Does nothing in tracking mode. Otherwise replaces any pending
    /// turn-off with a new one and blocks the caller for the grace period
    /// so the motor is running before any frame is sent.
    pub fn turn_on_motor(&self, travel: Duration) -> Result<(), RotorError> {
        let mut slot = self.timer.lock().unwrap_or_else(PoisonError::into_inner);
        let window = travel.saturating_add(self.grace);

        let generation = {
            let mut inner = lock_inner(&self.inner);
            if inner.state == MotorEnableState::TrackingForever {
                log::debug!("turn_on_motor ignored in tracking mode");
                return Ok(());
            }
            inner.generation = inner.generation.wrapping_add(1);
            inner.state = MotorEnableState::TimedOn {
                deadline: Instant::now() + window,
            };
            if let Err(e) = inner.line.enable() {
                inner.release_after("enable failure");
                drop(inner);
                if let Some(old) = slot.take() {
                    old.retire();
                }
                return Err(RotorError::io(e));
            }
            inner.generation
        };

        if let Some(old) = slot.take() {
            old.retire();
        }

        match spawn_timer(Arc::clone(&self.inner), generation, window) {
            Ok(handle) => *slot = Some(handle),
            Err(e) => {
                lock_inner(&self.inner).release_after("timer spawn failure");
                return Err(RotorError::Io(format!("motor timer: {}", e)));
            }
        }
        drop(slot);

        log::info!("motor on for {:?} (+{:?} grace)", travel, self.grace);
        thread::sleep(self.grace);
        Ok(())
    }

    /// Holds the motor on with no timeout.
    ///
    /// Idempotent. Coming from `Off`, blocks for the startup grace.
    pub fn start_tracking(&self) -> Result<(), RotorError> {
        let mut slot = self.timer.lock().unwrap_or_else(PoisonError::into_inner);

        let was_off = {
            let mut inner = lock_inner(&self.inner);
            let previous = inner.state;
            inner.generation = inner.generation.wrapping_add(1);
            inner.state = MotorEnableState::TrackingForever;
            if let Err(e) = inner.line.enable() {
                inner.release_after("enable failure");
                drop(inner);
                if let Some(old) = slot.take() {
                    old.retire();
                }
                return Err(RotorError::io(e));
            }
            if previous != MotorEnableState::TrackingForever {
                log::info!("motor tracking mode on");
            }
            previous == MotorEnableState::Off
        };

        if let Some(old) = slot.take() {
            old.retire();
        }
        drop(slot);

        if was_off {
            thread::sleep(self.grace);
        }
        Ok(())
    }

    /// Turns the motor off and cancels any pending turn-off.
    ///
    /// Valid in every state; the only way out of tracking mode.
    pub fn stop_tracking(&self) -> Result<(), RotorError> {
        let mut slot = self.timer.lock().unwrap_or_else(PoisonError::into_inner);

        let result = {
            let mut inner = lock_inner(&self.inner);
            inner.generation = inner.generation.wrapping_add(1);
            if inner.state.is_on() {
                log::info!("motor off");
            }
            inner.force_off().map_err(RotorError::io)
        };

        if let Some(old) = slot.take() {
            old.retire();
        }
        result
    }

    /// Current logical state.
    pub fn state(&self) -> MotorEnableState {
        lock_inner(&self.inner).state
    }

    /// Returns `true` if the output is currently meant to be asserted.
    pub fn is_motor_on(&self) -> bool {
        self.state().is_on()
    }

    /// Returns `true` while a turn-off timer is armed and has not fired.
    pub fn has_pending_timer(&self) -> bool {
        self.timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|t| !t.join.is_finished())
    }

    /// Startup grace period.
    #[inline]
    pub fn grace(&self) -> Duration {
        self.grace
    }
}

impl<L: EnableLine + Send + 'static> Drop for MotorSafetyController<L> {
    fn drop(&mut self) {
        if let Err(e) = self.stop_tracking() {
            log::error!("failed to release motor enable on shutdown: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::MockEnableLine;

    const GRACE: Duration = Duration::from_millis(10);

    fn controller() -> (MotorSafetyController<MockEnableLine>, MockEnableLine) {
        let line = MockEnableLine::new();
        let motor = MotorSafetyController::with_grace(line.clone(), GRACE).unwrap();
        (motor, line)
    }

    // =========================================================================
    // Construction
    // =========================================================================

    #[test]
    fn starts_off_and_drives_line_low() {
        let (motor, line) = controller();
        assert_eq!(motor.state(), MotorEnableState::Off);
        assert_eq!(line.writes(), vec![false]);
        assert!(!motor.has_pending_timer());
    }

    #[test]
    fn restart_never_inherits_stale_on() {
        let line = MockEnableLine::new();
        line.force_level(true);
        let _motor = MotorSafetyController::with_grace(line.clone(), GRACE).unwrap();
        assert!(!line.is_high());
    }

    // =========================================================================
    // Timed On
    // =========================================================================

    #[test]
    fn turn_on_blocks_for_grace() {
        let (motor, line) = controller();
        let start = Instant::now();
        motor.turn_on_motor(Duration::from_millis(200)).unwrap();
        assert!(start.elapsed() >= GRACE);
        assert!(line.is_high());
        assert!(matches!(motor.state(), MotorEnableState::TimedOn { .. }));
        assert!(motor.has_pending_timer());
    }

    #[test]
    fn window_expiry_turns_off() {
        let (motor, line) = controller();
        motor.turn_on_motor(Duration::from_millis(20)).unwrap();
        thread::sleep(Duration::from_millis(150));
        assert!(!line.is_high());
        assert_eq!(motor.state(), MotorEnableState::Off);
        assert!(!motor.has_pending_timer());
    }

    #[test]
    fn deadline_covers_travel_plus_grace() {
        let (motor, _line) = controller();
        let before = Instant::now();
        motor.turn_on_motor(Duration::from_millis(500)).unwrap();
        match motor.state() {
            MotorEnableState::TimedOn { deadline } => {
                assert!(deadline >= before + Duration::from_millis(510));
            }
            other => panic!("unexpected state {:?}", other),
        }
    }

    #[test]
    fn replacement_keeps_line_high_without_glitch() {
        let (motor, line) = controller();
        motor.turn_on_motor(Duration::from_millis(40)).unwrap();
        motor.turn_on_motor(Duration::from_millis(40)).unwrap();

        // The first window would have ended by now; the replacement keeps it on.
        thread::sleep(Duration::from_millis(35));
        assert!(line.is_high());

        thread::sleep(Duration::from_millis(150));
        assert!(!line.is_high());
        assert_eq!(line.writes(), vec![false, true, true, false]);
    }

    #[test]
    fn stop_cancels_pending_window() {
        let (motor, line) = controller();
        motor.turn_on_motor(Duration::from_secs(30)).unwrap();
        motor.stop_tracking().unwrap();
        assert!(!line.is_high());
        assert!(!motor.has_pending_timer());
        assert_eq!(motor.state(), MotorEnableState::Off);
    }

    #[test]
    fn enable_failure_reports_and_stays_off() {
        let (motor, line) = controller();
        line.fail_enable(true);
        let err = motor.turn_on_motor(Duration::from_millis(10)).unwrap_err();
        assert!(matches!(err, RotorError::Io(_)));
        assert_eq!(motor.state(), MotorEnableState::Off);
        assert!(!line.is_high());
        assert!(!motor.has_pending_timer());
    }

    #[test]
    fn failed_enable_releases_previous_window() {
        let (motor, line) = controller();
        motor.turn_on_motor(Duration::from_secs(30)).unwrap();
        assert!(motor.has_pending_timer());

        line.fail_enable(true);
        assert!(motor.turn_on_motor(Duration::from_secs(5)).is_err());
        assert_eq!(motor.state(), MotorEnableState::Off);
        assert!(!line.is_high());
        assert!(!motor.has_pending_timer());
        assert_eq!(line.writes().last(), Some(&false));
    }

    #[test]
    fn enable_error_wins_when_release_also_fails() {
        let (motor, line) = controller();
        line.fail_enable(true);
        line.fail_disable(true);
        let err = motor.turn_on_motor(Duration::from_millis(10)).unwrap_err();
        assert!(matches!(err, RotorError::Io(ref msg) if msg.contains("enable write failed")));
        assert_eq!(motor.state(), MotorEnableState::Off);
        assert!(!motor.has_pending_timer());
    }

    #[test]
    fn tracking_enable_failure_stays_off() {
        let (motor, line) = controller();
        line.fail_enable(true);
        assert!(matches!(motor.start_tracking(), Err(RotorError::Io(_))));
        assert_eq!(motor.state(), MotorEnableState::Off);
        assert!(!line.is_high());
    }

    // =========================================================================
    // Tracking
    // =========================================================================

    #[test]
    fn tracking_ignores_timed_requests() {
        let (motor, line) = controller();
        motor.start_tracking().unwrap();
        motor.turn_on_motor(Duration::from_millis(5)).unwrap();

        assert_eq!(motor.state(), MotorEnableState::TrackingForever);
        assert!(!motor.has_pending_timer());
        thread::sleep(Duration::from_millis(60));
        assert!(line.is_high());
        assert_eq!(line.writes(), vec![false, true]);
    }

    #[test]
    fn tracking_takes_over_timed_window() {
        let (motor, line) = controller();
        motor.turn_on_motor(Duration::from_millis(10)).unwrap();
        motor.start_tracking().unwrap();

        thread::sleep(Duration::from_millis(80));
        assert!(line.is_high());
        assert_eq!(motor.state(), MotorEnableState::TrackingForever);
    }

    #[test]
    fn start_tracking_is_idempotent() {
        let (motor, line) = controller();
        motor.start_tracking().unwrap();
        motor.start_tracking().unwrap();
        assert_eq!(motor.state(), MotorEnableState::TrackingForever);
        assert!(line.is_high());
    }

    #[test]
    fn only_stop_tracking_leaves_tracking() {
        let (motor, line) = controller();
        motor.start_tracking().unwrap();
        motor.stop_tracking().unwrap();
        motor.stop_tracking().unwrap();
        assert_eq!(motor.state(), MotorEnableState::Off);
        assert!(!line.is_high());
    }

    // =========================================================================
    // Shutdown
    // =========================================================================

    #[test]
    fn drop_turns_motor_off() {
        let (motor, line) = controller();
        motor.turn_on_motor(Duration::from_secs(30)).unwrap();
        drop(motor);
        assert!(!line.is_high());
    }

    #[test]
    fn drop_leaves_tracking_off() {
        let (motor, line) = controller();
        motor.start_tracking().unwrap();
        drop(motor);
        assert!(!line.is_high());
    }

    #[test]
    fn shared_across_threads() {
        let line = MockEnableLine::new();
        let motor = Arc::new(MotorSafetyController::with_grace(line.clone(), GRACE).unwrap());

        let worker = {
            let motor = Arc::clone(&motor);
            thread::spawn(move || motor.turn_on_motor(Duration::from_secs(30)))
        };
        worker.join().unwrap().unwrap();
        assert!(line.is_high());

        motor.stop_tracking().unwrap();
        assert!(!line.is_high());
    }

    #[test]
    fn state_names() {
        assert_eq!(MotorEnableState::Off.as_str(), "off");
        assert_eq!(MotorEnableState::TrackingForever.as_str(), "tracking");
        assert!(!MotorEnableState::Off.is_on());
        assert!(MotorEnableState::TrackingForever.is_on());
    }
}
