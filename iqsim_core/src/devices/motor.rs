//! Smart motor.
//!
//! A [`Motor`] is a cheap, cloneable handle over shared state. Each field is
//! an independent scalar guarded by one per-motor mutex; the lock is never
//! held while notifying subscribers or sleeping.

use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use iqsim_common::consts::{DEGREES_PER_SEC_PER_PERCENT, VELOCITY_LIMIT};

use super::units::{BrakeMode, Direction, Unit, spin_duration};
use crate::notify::{MotorSnapshot, Notifier};

#[derive(Debug)]
struct MotorState {
    port: u8,
    gear_ratio: f64,
    reversed: bool,
    target_velocity: f64,
    velocity: f64,
    direction: Direction,
    spinning: bool,
    brake_mode: BrakeMode,
    /// Position accumulated up to `last_fold`.
    position_base: f64,
    last_fold: Instant,
}

impl MotorState {
    fn actual_velocity(&self) -> f64 {
        let mounting = if self.reversed { -1.0 } else { 1.0 };
        self.velocity * mounting * self.direction.sign()
    }

    fn wheel_velocity(&self) -> f64 {
        self.velocity * self.direction.sign()
    }

    fn position_at(&self, now: Instant) -> f64 {
        let elapsed = now.saturating_duration_since(self.last_fold).as_secs_f64();
        self.position_base + self.actual_velocity() * DEGREES_PER_SEC_PER_PERCENT * elapsed
    }

    /// Integrate position up to `now`; call before any velocity change.
    fn fold(&mut self, now: Instant) {
        self.position_base = self.position_at(now);
        self.last_fold = now;
    }

    fn snapshot(&self, now: Instant) -> MotorSnapshot {
        MotorSnapshot {
            port: self.port,
            target_velocity: self.target_velocity,
            actual_velocity: self.actual_velocity(),
            wheel_velocity: self.wheel_velocity(),
            spinning: self.spinning,
            position: self.position_at(now),
        }
    }
}

/// Handle to a simulated smart motor.
#[derive(Clone)]
pub struct Motor {
    state: Arc<Mutex<MotorState>>,
    notifier: Arc<Notifier>,
}

impl Motor {
    /// Create a motor. Registration is the registry's job.
    pub fn new(port: u8, gear_ratio: f64, reversed: bool, notifier: Arc<Notifier>) -> Self {
        Self {
            state: Arc::new(Mutex::new(MotorState {
                port,
                gear_ratio,
                reversed,
                target_velocity: 0.0,
                velocity: 0.0,
                direction: Direction::Forward,
                spinning: false,
                brake_mode: BrakeMode::Coast,
                position_base: 0.0,
                last_fold: Instant::now(),
            })),
            notifier,
        }
    }

    /// Apply a mutation, then publish the resulting snapshot if asked to.
    fn update<R>(&self, notify: bool, f: impl FnOnce(&mut MotorState) -> R) -> R {
        let now = Instant::now();
        let (result, snapshot) = {
            let mut state = self.state.lock();
            state.fold(now);
            let result = f(&mut state);
            (result, state.snapshot(now))
        };
        if notify {
            self.notifier.publish_motor(&snapshot);
        }
        result
    }

    /// Smart port.
    pub fn port(&self) -> u8 {
        self.state.lock().port
    }

    /// External gear ratio.
    pub fn gear_ratio(&self) -> f64 {
        self.state.lock().gear_ratio
    }

    /// Mounting-reversed flag.
    pub fn is_reversed(&self) -> bool {
        self.state.lock().reversed
    }

    /// Set the target velocity; a spinning motor picks it up immediately.
    pub fn set_velocity(&self, velocity: f64) {
        let velocity = clamp_velocity(velocity);
        let spinning = self.state.lock().spinning;
        self.update(spinning, |s| {
            s.target_velocity = velocity;
            if s.spinning {
                s.velocity = velocity;
            }
        });
    }

    /// Start spinning at the target velocity.
    pub fn spin(&self, direction: Direction) {
        self.update(true, |s| {
            s.direction = direction;
            s.spinning = true;
            s.velocity = s.target_velocity;
        });
    }

    /// Spin for an amount. With `wait`, block for the computed duration and
    /// stop; without it, leave the motor spinning.
    ///
    /// A negative amount spins the other way.
    pub fn spin_for(&self, direction: Direction, amount: f64, unit: Unit, wait: bool) {
        let direction = if amount < 0.0 {
            direction.opposite()
        } else {
            direction
        };
        let duration = self.update(true, |s| {
            s.direction = direction;
            s.spinning = true;
            s.velocity = s.target_velocity;
            spin_duration(amount.abs(), unit, s.velocity)
        });

        if wait {
            thread::sleep(duration);
            self.stop(None);
        }
    }

    /// Stop, optionally updating the brake mode.
    pub fn stop(&self, brake_mode: Option<BrakeMode>) {
        self.update(true, |s| {
            s.spinning = false;
            s.velocity = 0.0;
            if let Some(mode) = brake_mode {
                s.brake_mode = mode;
            }
        });
    }

    /// Set the brake mode used on stop.
    pub fn set_stopping(&self, mode: BrakeMode) {
        self.state.lock().brake_mode = mode;
    }

    /// Current brake mode.
    pub fn brake_mode(&self) -> BrakeMode {
        self.state.lock().brake_mode
    }

    /// Current velocity (percent), unsigned by direction.
    pub fn velocity(&self) -> f64 {
        self.state.lock().velocity
    }

    /// Commanded target velocity.
    pub fn target_velocity(&self) -> f64 {
        self.state.lock().target_velocity
    }

    /// Current direction.
    pub fn direction(&self) -> Direction {
        self.state.lock().direction
    }

    /// Shaft velocity with mounting and direction signs applied.
    pub fn actual_velocity(&self) -> f64 {
        self.state.lock().actual_velocity()
    }

    /// World-facing wheel velocity with only the direction sign applied.
    pub fn wheel_velocity(&self) -> f64 {
        self.state.lock().wheel_velocity()
    }

    /// Shaft position in degrees or turns.
    pub fn position(&self, unit: Unit) -> f64 {
        let degrees = self.state.lock().position_at(Instant::now());
        match unit {
            Unit::Turns => degrees / 360.0,
            _ => degrees,
        }
    }

    /// Overwrite the shaft position.
    pub fn set_position(&self, value: f64, unit: Unit) {
        let degrees = match unit {
            Unit::Turns => value * 360.0,
            _ => value,
        };
        self.update(false, |s| s.position_base = degrees);
    }

    /// Zero the shaft position.
    pub fn reset_position(&self) {
        self.set_position(0.0, Unit::Degrees);
    }

    /// Spinning flag.
    pub fn is_spinning(&self) -> bool {
        self.state.lock().spinning
    }

    /// Point-in-time view.
    pub fn snapshot(&self) -> MotorSnapshot {
        self.state.lock().snapshot(Instant::now())
    }

    /// `true` if both handles point at the same motor.
    pub fn same_as(&self, other: &Motor) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}

impl std::fmt::Debug for Motor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Motor").field(&*self.state.lock()).finish()
    }
}

fn clamp_velocity(velocity: f64) -> f64 {
    if velocity.is_nan() {
        0.0
    } else {
        velocity.clamp(-VELOCITY_LIMIT, VELOCITY_LIMIT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn motor(reversed: bool) -> Motor {
        Motor::new(1, 1.0, reversed, Arc::new(Notifier::new()))
    }

    #[test]
    fn test_set_velocity_only_applies_when_spinning() {
        let m = motor(false);
        m.set_velocity(40.0);
        assert_eq!(m.velocity(), 0.0);
        assert_eq!(m.target_velocity(), 40.0);

        m.spin(Direction::Forward);
        assert_eq!(m.velocity(), 40.0);

        m.set_velocity(-70.0);
        assert_eq!(m.velocity(), -70.0);
    }

    #[test]
    fn test_velocity_is_clamped() {
        let m = motor(false);
        m.set_velocity(250.0);
        assert_eq!(m.target_velocity(), 100.0);
        m.set_velocity(f64::NAN);
        assert_eq!(m.target_velocity(), 0.0);
    }

    #[test]
    fn test_actual_and_wheel_velocity() {
        let plain = motor(false);
        plain.set_velocity(50.0);
        plain.spin(Direction::Forward);
        assert_eq!(plain.actual_velocity(), 50.0);
        assert_eq!(plain.wheel_velocity(), 50.0);

        let flipped = motor(true);
        flipped.set_velocity(50.0);
        flipped.spin(Direction::Forward);
        assert_eq!(flipped.actual_velocity(), -50.0);
        assert_eq!(flipped.wheel_velocity(), 50.0);

        flipped.spin(Direction::Reverse);
        assert_eq!(flipped.actual_velocity(), 50.0);
        assert_eq!(flipped.wheel_velocity(), -50.0);
    }

    #[test]
    fn test_stop_updates_brake_mode() {
        let m = motor(false);
        m.set_velocity(30.0);
        m.spin(Direction::Forward);
        m.stop(Some(BrakeMode::Hold));
        assert!(!m.is_spinning());
        assert_eq!(m.velocity(), 0.0);
        assert_eq!(m.brake_mode(), BrakeMode::Hold);

        m.stop(None);
        assert_eq!(m.brake_mode(), BrakeMode::Hold);
    }

    #[test]
    fn test_spin_for_without_wait_keeps_spinning() {
        let m = motor(false);
        m.set_velocity(20.0);
        m.spin_for(Direction::Forward, 90.0, Unit::Degrees, false);
        assert!(m.is_spinning());
        assert_eq!(m.velocity(), 20.0);
    }

    #[test]
    fn test_negative_spin_for_reverses() {
        let m = motor(false);
        m.set_velocity(20.0);
        m.spin_for(Direction::Forward, -90.0, Unit::Degrees, false);
        assert_eq!(m.direction(), Direction::Reverse);
        assert_eq!(m.actual_velocity(), -20.0);
    }

    #[test]
    fn test_spin_for_with_wait_advances_position() {
        let m = motor(false);
        m.set_velocity(100.0);
        m.spin_for(Direction::Forward, 20.0, Unit::Degrees, true);
        assert!(!m.is_spinning());
        let position = m.position(Unit::Degrees);
        assert!((19.0..=26.0).contains(&position), "position {position}");
    }

    #[test]
    fn test_set_and_reset_position() {
        let m = motor(false);
        m.set_position(2.0, Unit::Turns);
        assert_eq!(m.position(Unit::Degrees), 720.0);
        assert_eq!(m.position(Unit::Turns), 2.0);
        m.reset_position();
        assert_eq!(m.position(Unit::Degrees), 0.0);
    }

    #[test]
    fn test_notifications_fire_on_state_change() {
        let notifier = Arc::new(Notifier::new());
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        notifier.subscribe_motor(Arc::new(move |_: &MotorSnapshot| {
            c.fetch_add(1, Ordering::SeqCst);
        }));

        let m = Motor::new(2, 1.0, false, notifier);
        m.set_velocity(10.0); // not spinning: silent
        m.spin(Direction::Forward);
        m.set_velocity(20.0);
        m.stop(None);
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_clones_share_state() {
        let a = motor(false);
        let b = a.clone();
        b.set_velocity(33.0);
        assert_eq!(a.target_velocity(), 33.0);
        assert!(a.same_as(&b));
        assert!(!a.same_as(&motor(false)));
    }
}
