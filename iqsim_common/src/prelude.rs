//! Prelude module for common re-exports.
//!
//! ```rust
//! use iqsim_common::prelude::*;
//! ```

// ─── Logging ────────────────────────────────────────────────────────
pub use crate::config::LogLevel;

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{BridgeConfig, ConfigError, ConfigLoader, HostConfig, SharedConfig, SimConfig};

// ─── System Constants ───────────────────────────────────────────────
pub use crate::consts::{AXIS_MAX, AXIS_MIN, MAX_PORT, MIN_PORT};

// ─── Project / Protocol ─────────────────────────────────────────────
pub use crate::project::{Project, ProjectError, RobotConfig, find_project_file};
pub use crate::protocol::{BridgeMessage, HostMessage, ProtocolError};
