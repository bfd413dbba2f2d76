//! Virtual device models.
//!
//! Every device type is a cloneable handle over shared, lock-protected state,
//! so the script thread and the host thread can hold the same device.
//! Blocking "for" commands sleep on the calling thread only.
//!
//! # Module Structure
//!
//! - [`units`] - Directions, units, brake modes and duration rules
//! - [`motor`] - Smart motor with position integration
//! - [`motor_group`] - Motors commanded as one
//! - [`pneumatic`] - Cylinder and pump flags
//! - [`controller`] - Analog axes and edge-triggered buttons
//! - [`drivetrain`] - Two-sided drive with optional inertial heading
//! - [`brain`] - Text screen and timer
//! - [`inertial`] - Heading, rotation and calibration

pub mod brain;
pub mod controller;
pub mod drivetrain;
pub mod inertial;
pub mod motor;
pub mod motor_group;
pub mod pneumatic;
pub mod units;

pub use brain::{Brain, BrainScreen, BrainTimer};
pub use controller::{Axis, Button, ButtonCallback, Controller, ControllerAxis, ControllerButton};
pub use drivetrain::{DriveGeometry, DriveTrain};
pub use inertial::Inertial;
pub use motor::Motor;
pub use motor_group::MotorGroup;
pub use pneumatic::Pneumatic;
pub use units::{BrakeMode, Direction, SensorAxis, Unit};
