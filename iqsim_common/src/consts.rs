//! System-wide constants for the simulator workspace.
//!
//! Single source of truth for port ranges, input limits, the blocking timing
//! model and default paths. Imported by all crates.

/// Lowest smart port number.
pub const MIN_PORT: u8 = 1;

/// Highest smart port number.
pub const MAX_PORT: u8 = 12;

/// Port used by the brain's built-in inertial sensor.
pub const BUILTIN_INERTIAL_PORT: u8 = 0;

/// Controller axis lower bound (percent).
pub const AXIS_MIN: i32 = -100;

/// Controller axis upper bound (percent).
pub const AXIS_MAX: i32 = 100;

/// Velocity limit for motors (percent).
pub const VELOCITY_LIMIT: f64 = 100.0;

/// Shaft speed per percent of velocity, in degrees per second (200°/s at 100%).
pub const DEGREES_PER_SEC_PER_PERCENT: f64 = 2.0;

/// Velocity assumed for timing when a motor is commanded at zero velocity.
pub const FALLBACK_SPEED_PERCENT: f64 = 50.0;

/// Drivetrain linear speed used to time distance commands (mm per second).
pub const DRIVE_MM_PER_SEC: f64 = 200.0;

/// Drivetrain turn rate used to time angle commands (degrees per second).
pub const TURN_DEG_PER_SEC: f64 = 90.0;

/// Millimetres per inch.
pub const MM_PER_INCH: f64 = 25.4;

/// Duration used for commands with a unit that has no timing rule (seconds).
pub const UNKNOWN_UNIT_DURATION_SECS: f64 = 1.0;

/// Default drive and turn velocity for drivetrains and motor groups (percent).
pub const DEFAULT_DRIVE_VELOCITY: f64 = 50.0;

/// Default drivetrain wheel travel (mm).
pub const DEFAULT_WHEEL_TRAVEL_MM: f64 = 200.0;

/// Default drivetrain track width (mm).
pub const DEFAULT_TRACK_WIDTH_MM: f64 = 173.0;

/// Default drivetrain wheelbase (mm).
pub const DEFAULT_WHEELBASE_MM: f64 = 76.0;

/// Number of text rows on the brain screen.
pub const BRAIN_SCREEN_ROWS: usize = 10;

/// Inertial sensor calibration time in milliseconds.
pub const CALIBRATION_TIME_MS: u64 = 100;

/// Default IPC read-loop poll interval in milliseconds.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 10;

/// Default pause after starting the script thread before serving input.
pub const DEFAULT_STARTUP_DELAY_MS: u64 = 200;

/// Default in-process host frame rate.
pub const DEFAULT_FRAME_RATE_HZ: u32 = 60;

/// Default number of frames between headless telemetry log lines.
pub const DEFAULT_TELEMETRY_EVERY: u64 = 60;

/// Project file extension searched for when no path is given.
pub const PROJECT_EXTENSION: &str = "iqpython";

/// Project name used when the script carries no `Project:` line.
pub const DEFAULT_PROJECT_NAME: &str = "VEXcode Project";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constants_are_consistent() {
        assert!(MIN_PORT >= 1 && MIN_PORT <= MAX_PORT);
        assert!(BUILTIN_INERTIAL_PORT < MIN_PORT);
        assert_eq!(AXIS_MIN, -AXIS_MAX);
        assert!(FALLBACK_SPEED_PERCENT > 0.0);
        assert!(DEFAULT_POLL_INTERVAL_MS > 0);
        assert!(DEFAULT_FRAME_RATE_HZ > 0);
    }

    #[test]
    fn full_speed_is_two_hundred_degrees_per_second() {
        assert_eq!(DEGREES_PER_SEC_PER_PERCENT * VELOCITY_LIMIT, 200.0);
    }
}
