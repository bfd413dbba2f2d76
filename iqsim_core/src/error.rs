//! Error types for the simulation core.

use thiserror::Error;

use iqsim_common::project::ProjectError;
use iqsim_common::protocol::ProtocolError;

/// Device misuse.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DeviceError {
    /// Port outside the accepted range.
    #[error("invalid port {port}: expected {min}..={max}")]
    InvalidPort {
        /// Requested port.
        port: i64,
        /// Lowest valid port.
        min: u8,
        /// Highest valid port.
        max: u8,
    },

    /// Heading-based command on a drivetrain without an inertial sensor.
    #[error("drivetrain has no inertial sensor")]
    MissingInertial,

    /// Drivetrain side given no motors.
    #[error("drivetrain {0} side has no motors")]
    EmptySide(&'static str),
}

/// Script harness failures.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// The script did not compile.
    #[error("script compile error: {0}")]
    Compile(String),

    /// `start` called before a successful `load`.
    #[error("no script loaded")]
    NotLoaded,

    /// `start` called while a script is already running.
    #[error("script already running")]
    AlreadyRunning,

    /// The OS refused to spawn a thread.
    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        /// Thread name.
        name: &'static str,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

/// IPC bridge failures.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Project could not be read; fatal at startup.
    #[error(transparent)]
    Project(#[from] ProjectError),

    /// Harness failure other than a compile error.
    #[error(transparent)]
    Harness(#[from] HarnessError),

    /// Message could not be encoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Writing to the host failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
