//! Direction, unit and brake-mode vocabulary shared by every device.
//!
//! Also hosts the duration rules that turn "for N units" commands into a
//! timed suspension.

use std::fmt;
use std::time::Duration;

use iqsim_common::consts::{
    DEGREES_PER_SEC_PER_PERCENT, DRIVE_MM_PER_SEC, FALLBACK_SPEED_PERCENT, MM_PER_INCH,
    TURN_DEG_PER_SEC, UNKNOWN_UNIT_DURATION_SECS,
};

/// Spin or travel direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub enum Direction {
    /// Forward / positive.
    #[default]
    Forward,
    /// Reverse / negative.
    Reverse,
    /// Turn left (counter-clockwise seen from above).
    Left,
    /// Turn right (clockwise seen from above).
    Right,
}

impl Direction {
    /// +1 for everything except `Reverse`.
    pub fn sign(self) -> f64 {
        match self {
            Self::Reverse => -1.0,
            _ => 1.0,
        }
    }

    /// Opposite direction.
    pub fn opposite(self) -> Self {
        match self {
            Self::Forward => Self::Reverse,
            Self::Reverse => Self::Forward,
            Self::Left => Self::Right,
            Self::Right => Self::Left,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Forward => "forward",
            Self::Reverse => "reverse",
            Self::Left => "left",
            Self::Right => "right",
        };
        f.write_str(name)
    }
}

/// Measurement units accepted by device commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Unit {
    /// Percent of full speed.
    Percent,
    /// Millimetres.
    Mm,
    /// Inches.
    Inches,
    /// Degrees.
    Degrees,
    /// Full revolutions.
    Turns,
    /// Seconds.
    Seconds,
    /// Milliseconds.
    Msec,
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Percent => "percent",
            Self::Mm => "mm",
            Self::Inches => "inches",
            Self::Degrees => "degrees",
            Self::Turns => "turns",
            Self::Seconds => "seconds",
            Self::Msec => "msec",
        };
        f.write_str(name)
    }
}

/// Motor behaviour once stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub enum BrakeMode {
    /// Free-wheel.
    #[default]
    Coast,
    /// Short the windings.
    Brake,
    /// Actively hold position.
    Hold,
}

/// Sensor axis selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorAxis {
    /// X axis.
    X,
    /// Y axis.
    Y,
    /// Z axis.
    Z,
}

/// Convert seconds to a `Duration`, mapping negative or non-finite input to zero.
pub fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::ZERO)
}

/// Duration of a `spin_for` command.
///
/// Degree and turn amounts assume 2°/s per percent of speed; a stopped motor
/// falls back to 50 %.
pub fn spin_duration(amount: f64, unit: Unit, velocity: f64) -> Duration {
    let speed = if velocity != 0.0 {
        velocity.abs()
    } else {
        FALLBACK_SPEED_PERCENT
    };
    let deg_per_sec = speed * DEGREES_PER_SEC_PER_PERCENT;

    match unit {
        Unit::Seconds => secs(amount),
        Unit::Msec => secs(amount / 1000.0),
        Unit::Degrees => secs(amount / deg_per_sec),
        Unit::Turns => secs(amount * 360.0 / deg_per_sec),
        _ => secs(UNKNOWN_UNIT_DURATION_SECS),
    }
}

/// Duration of a `drive_for` command.
pub fn drive_duration(distance: f64, unit: Unit) -> Duration {
    match unit {
        Unit::Mm => secs(distance / DRIVE_MM_PER_SEC),
        Unit::Inches => secs(distance * MM_PER_INCH / DRIVE_MM_PER_SEC),
        Unit::Seconds => secs(distance),
        Unit::Msec => secs(distance / 1000.0),
        _ => secs(UNKNOWN_UNIT_DURATION_SECS),
    }
}

/// Duration of a `turn_for` command.
pub fn turn_duration(angle: f64, unit: Unit) -> Duration {
    match unit {
        Unit::Turns => secs(angle * 360.0 / TURN_DEG_PER_SEC),
        _ => secs(angle / TURN_DEG_PER_SEC),
    }
}

/// Duration of a `wait`/`sleep` call. Units other than seconds are milliseconds.
pub fn wait_duration(amount: f64, unit: Unit) -> Duration {
    match unit {
        Unit::Seconds => secs(amount),
        _ => secs(amount / 1000.0),
    }
}
