//! Two-sided drivetrain, optionally with an inertial sensor (smart drive).
//!
//! Geometry is kept for reporting only; distance and angle commands become
//! fixed-rate durations (200 mm/s, 90 °/s) and per-side velocity signs.

use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;

use iqsim_common::consts::{
    DEFAULT_DRIVE_VELOCITY, DEFAULT_TRACK_WIDTH_MM, DEFAULT_WHEEL_TRAVEL_MM, DEFAULT_WHEELBASE_MM,
};

use super::inertial::{Inertial, shortest_turn};
use super::motor::Motor;
use super::units::{BrakeMode, Direction, Unit, drive_duration, turn_duration};
use crate::error::DeviceError;

/// Physical drivetrain dimensions, in millimetres.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriveGeometry {
    /// Wheel travel per revolution.
    pub wheel_travel: f64,
    /// Distance between left and right wheels.
    pub track_width: f64,
    /// Distance between front and rear axles.
    pub wheelbase: f64,
    /// External gear ratio.
    pub gear_ratio: f64,
}

impl Default for DriveGeometry {
    fn default() -> Self {
        Self {
            wheel_travel: DEFAULT_WHEEL_TRAVEL_MM,
            track_width: DEFAULT_TRACK_WIDTH_MM,
            wheelbase: DEFAULT_WHEELBASE_MM,
            gear_ratio: 1.0,
        }
    }
}

#[derive(Debug)]
struct DriveState {
    drive_velocity: f64,
    turn_velocity: f64,
}

/// Handle to the drivetrain singleton.
#[derive(Debug, Clone)]
pub struct DriveTrain {
    left: Arc<Vec<Motor>>,
    right: Arc<Vec<Motor>>,
    geometry: DriveGeometry,
    inertial: Option<Inertial>,
    state: Arc<Mutex<DriveState>>,
}

impl DriveTrain {
    /// Build a drivetrain from left and right motor sets.
    pub fn new(
        left: Vec<Motor>,
        right: Vec<Motor>,
        geometry: DriveGeometry,
        inertial: Option<Inertial>,
    ) -> Result<Self, DeviceError> {
        if left.is_empty() {
            return Err(DeviceError::EmptySide("left"));
        }
        if right.is_empty() {
            return Err(DeviceError::EmptySide("right"));
        }
        Ok(Self {
            left: Arc::new(left),
            right: Arc::new(right),
            geometry,
            inertial,
            state: Arc::new(Mutex::new(DriveState {
                drive_velocity: DEFAULT_DRIVE_VELOCITY,
                turn_velocity: DEFAULT_DRIVE_VELOCITY,
            })),
        })
    }

    /// Geometry.
    pub fn geometry(&self) -> DriveGeometry {
        self.geometry
    }

    /// Attached inertial sensor, if this is a smart drive.
    pub fn inertial(&self) -> Option<&Inertial> {
        self.inertial.as_ref()
    }

    /// Left side motors.
    pub fn left(&self) -> &[Motor] {
        &self.left
    }

    /// Right side motors.
    pub fn right(&self) -> &[Motor] {
        &self.right
    }

    /// Set drive velocity (percent).
    pub fn set_drive_velocity(&self, velocity: f64) {
        self.state.lock().drive_velocity = velocity;
    }

    /// Set turn velocity (percent).
    pub fn set_turn_velocity(&self, velocity: f64) {
        self.state.lock().turn_velocity = velocity;
    }

    /// Drive velocity.
    pub fn drive_velocity(&self) -> f64 {
        self.state.lock().drive_velocity
    }

    /// Turn velocity.
    pub fn turn_velocity(&self) -> f64 {
        self.state.lock().turn_velocity
    }

    /// Start driving. Anything other than `Forward` drives backwards.
    pub fn drive(&self, direction: Direction) {
        let velocity = self.drive_velocity();
        let velocity = if direction == Direction::Forward {
            velocity
        } else {
            -velocity
        };
        self.run_sides(velocity, velocity);
    }

    /// Drive a distance; with `wait`, block until done and stop.
    pub fn drive_for(&self, direction: Direction, distance: f64, unit: Unit, wait: bool) {
        self.drive(direction);
        if wait {
            thread::sleep(drive_duration(distance, unit));
            self.stop(None);
        }
    }

    /// Start turning in place. `Right` is clockwise.
    pub fn turn(&self, direction: Direction) {
        let velocity = self.turn_velocity();
        if direction == Direction::Right {
            self.run_sides(velocity, -velocity);
        } else {
            self.run_sides(-velocity, velocity);
        }
    }

    /// Turn by an angle; with `wait`, block until done and stop.
    ///
    /// A completed blocking turn advances the inertial sensor, if any.
    pub fn turn_for(&self, direction: Direction, angle: f64, unit: Unit, wait: bool) {
        self.turn(direction);
        if wait {
            thread::sleep(turn_duration(angle, unit));
            self.stop(None);
            if let Some(imu) = &self.inertial {
                let degrees = match unit {
                    Unit::Turns => angle * 360.0,
                    _ => angle,
                };
                let signed = if direction == Direction::Right {
                    degrees
                } else {
                    -degrees
                };
                imu.rotate_by(signed);
            }
        }
    }

    /// Turn the short way to an absolute heading.
    ///
    /// Returns the signed turn taken (positive is right).
    pub fn turn_to_heading(&self, target: f64, unit: Unit, wait: bool) -> Result<f64, DeviceError> {
        let imu = self.inertial.as_ref().ok_or(DeviceError::MissingInertial)?;
        let target = match unit {
            Unit::Turns => target * 360.0,
            _ => target,
        };
        let diff = shortest_turn(imu.heading(), target);
        let direction = if diff > 0.0 {
            Direction::Right
        } else {
            Direction::Left
        };
        self.turn_for(direction, diff.abs(), Unit::Degrees, wait);
        Ok(diff)
    }

    /// Current heading from the inertial sensor.
    pub fn heading(&self) -> Result<f64, DeviceError> {
        self.inertial
            .as_ref()
            .map(Inertial::heading)
            .ok_or(DeviceError::MissingInertial)
    }

    /// Stop both sides.
    pub fn stop(&self, brake_mode: Option<BrakeMode>) {
        for motor in self.left.iter().chain(self.right.iter()) {
            motor.stop(brake_mode);
        }
    }

    /// Set brake mode on both sides.
    pub fn set_stopping(&self, mode: BrakeMode) {
        for motor in self.left.iter().chain(self.right.iter()) {
            motor.set_stopping(mode);
        }
    }

    /// Any motor spinning.
    pub fn is_moving(&self) -> bool {
        self.left
            .iter()
            .chain(self.right.iter())
            .any(Motor::is_spinning)
    }

    fn run_sides(&self, left: f64, right: f64) {
        for motor in self.left.iter() {
            motor.set_velocity(left);
            motor.spin(Direction::Forward);
        }
        for motor in self.right.iter() {
            motor.set_velocity(right);
            motor.spin(Direction::Forward);
        }
    }

    /// `true` if both handles point at the same drivetrain.
    pub fn same_as(&self, other: &DriveTrain) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::Notifier;
    use std::time::{Duration, Instant};

    fn drivetrain(inertial: Option<Inertial>) -> DriveTrain {
        let notifier = Arc::new(Notifier::new());
        DriveTrain::new(
            vec![Motor::new(1, 1.0, false, notifier.clone())],
            vec![Motor::new(6, 1.0, true, notifier)],
            DriveGeometry::default(),
            inertial,
        )
        .unwrap()
    }

    #[test]
    fn test_empty_side_rejected() {
        let notifier = Arc::new(Notifier::new());
        let result = DriveTrain::new(
            vec![],
            vec![Motor::new(6, 1.0, false, notifier)],
            DriveGeometry::default(),
            None,
        );
        assert_eq!(result.err(), Some(DeviceError::EmptySide("left")));
    }

    #[test]
    fn test_drive_sets_both_sides() {
        let dt = drivetrain(None);
        dt.drive(Direction::Reverse);
        assert_eq!(dt.left()[0].wheel_velocity(), -50.0);
        assert_eq!(dt.right()[0].wheel_velocity(), -50.0);
        assert!(dt.is_moving());
        dt.stop(None);
        assert!(!dt.is_moving());
    }

    #[test]
    fn test_turn_right_splits_sides() {
        let dt = drivetrain(None);
        dt.set_turn_velocity(30.0);
        dt.turn(Direction::Right);
        assert_eq!(dt.left()[0].wheel_velocity(), 30.0);
        assert_eq!(dt.right()[0].wheel_velocity(), -30.0);

        dt.turn(Direction::Left);
        assert_eq!(dt.left()[0].wheel_velocity(), -30.0);
        assert_eq!(dt.right()[0].wheel_velocity(), 30.0);
    }

    #[test]
    fn test_drive_for_blocks() {
        let dt = drivetrain(None);
        let start = Instant::now();
        dt.drive_for(Direction::Forward, 40.0, Unit::Mm, true);
        assert!(start.elapsed() >= Duration::from_millis(195));
        assert!(!dt.is_moving());
    }

    #[test]
    fn test_turn_to_heading_requires_inertial() {
        let dt = drivetrain(None);
        assert_eq!(
            dt.turn_to_heading(90.0, Unit::Degrees, false),
            Err(DeviceError::MissingInertial)
        );
        assert!(dt.heading().is_err());
    }

    #[test]
    fn test_turn_to_heading_takes_short_way() {
        let imu = Inertial::new(0);
        imu.set_heading(350.0);
        let dt = drivetrain(Some(imu.clone()));

        let turn = dt.turn_to_heading(30.0, Unit::Degrees, false).unwrap();
        assert_eq!(turn, 40.0);
        assert_eq!(dt.left()[0].wheel_velocity(), 50.0);

        let turn = dt.turn_to_heading(90.0, Unit::Degrees, false).unwrap();
        assert_eq!(turn, 100.0);

        let turn = dt.turn_to_heading(270.0, Unit::Degrees, false).unwrap();
        assert_eq!(turn, -80.0);
        assert_eq!(dt.left()[0].wheel_velocity(), -50.0);
    }

    #[test]
    fn test_blocking_turn_updates_heading() {
        let imu = Inertial::new(0);
        imu.set_heading(350.0);
        let dt = drivetrain(Some(imu.clone()));

        dt.turn_to_heading(8.0, Unit::Degrees, true).unwrap();
        assert!((imu.heading() - 8.0).abs() < 1e-9);
        assert!((imu.rotation() - 18.0).abs() < 1e-9);
        assert!(!dt.is_moving());
    }
}
