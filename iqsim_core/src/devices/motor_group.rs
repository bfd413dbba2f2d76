//! Motor group: several motors commanded as one.

use parking_lot::Mutex;
use std::sync::Arc;

use iqsim_common::consts::DEFAULT_DRIVE_VELOCITY;

use super::motor::Motor;
use super::units::{BrakeMode, Direction, Unit};

#[derive(Debug)]
struct GroupState {
    velocity: f64,
    direction: Direction,
    spinning: bool,
}

/// Handle to a motor group. Every operation fans out to all members.
#[derive(Debug, Clone)]
pub struct MotorGroup {
    motors: Arc<Vec<Motor>>,
    state: Arc<Mutex<GroupState>>,
}

impl MotorGroup {
    /// Group the given motors, in order.
    pub fn new(motors: Vec<Motor>) -> Self {
        Self {
            motors: Arc::new(motors),
            state: Arc::new(Mutex::new(GroupState {
                velocity: DEFAULT_DRIVE_VELOCITY,
                direction: Direction::Forward,
                spinning: false,
            })),
        }
    }

    /// Member motors.
    pub fn motors(&self) -> &[Motor] {
        &self.motors
    }

    /// Member ports, in order.
    pub fn ports(&self) -> Vec<u8> {
        self.motors.iter().map(Motor::port).collect()
    }

    /// Set velocity on the group and every member.
    pub fn set_velocity(&self, velocity: f64) {
        self.state.lock().velocity = velocity;
        for motor in self.motors.iter() {
            motor.set_velocity(velocity);
        }
    }

    /// Group velocity.
    pub fn velocity(&self) -> f64 {
        self.state.lock().velocity
    }

    /// Spin every member.
    pub fn spin(&self, direction: Direction) {
        self.mark(direction, true);
        for motor in self.motors.iter() {
            motor.spin(direction);
        }
    }

    /// Issue `spin_for` to every member; only the last one blocks.
    ///
    /// After a blocking call every member is stopped, so members with a
    /// different effective speed do not keep spinning.
    pub fn spin_for(&self, direction: Direction, amount: f64, unit: Unit, wait: bool) {
        self.mark(direction, true);
        let last = self.motors.len().saturating_sub(1);
        for (i, motor) in self.motors.iter().enumerate() {
            motor.spin_for(direction, amount, unit, wait && i == last);
        }
        if wait {
            for motor in self.motors.iter() {
                motor.stop(None);
            }
            self.state.lock().spinning = false;
        }
    }

    /// Stop every member.
    pub fn stop(&self, brake_mode: Option<BrakeMode>) {
        self.state.lock().spinning = false;
        for motor in self.motors.iter() {
            motor.stop(brake_mode);
        }
    }

    /// Set brake mode on every member.
    pub fn set_stopping(&self, mode: BrakeMode) {
        for motor in self.motors.iter() {
            motor.set_stopping(mode);
        }
    }

    /// Group spinning flag.
    pub fn is_spinning(&self) -> bool {
        self.state.lock().spinning
    }

    /// Last commanded direction.
    pub fn direction(&self) -> Direction {
        self.state.lock().direction
    }

    /// Position of the first member.
    pub fn position(&self, unit: Unit) -> f64 {
        self.motors.first().map(|m| m.position(unit)).unwrap_or(0.0)
    }

    fn mark(&self, direction: Direction, spinning: bool) {
        let mut state = self.state.lock();
        state.direction = direction;
        state.spinning = spinning;
    }
}
