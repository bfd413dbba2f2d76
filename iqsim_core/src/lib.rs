//! # IQ Simulator Core
//!
//! Virtual devices for educational robot programs, the harness that runs those
//! programs, and the IPC bridge that exposes the result to a host process.
//!
//! # Module Structure
//!
//! - [`devices`] - Motor, drivetrain, pneumatic, inertial, controller and brain behavior
//! - [`registry`] - Per-run device registry and robot snapshots
//! - [`notify`] - Motor and brain change notifications
//! - [`script`] - Rhai binding environment for robot programs
//! - [`harness`] - Script loading and threaded execution
//! - [`host`] - In-process, frame-paced host loop
//! - [`bridge`] - Line-delimited JSON bridge over standard streams
//! - [`client`] - Host-side driver for the bridge subprocess
//! - [`logging`] - Tracing subscriber setup
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  stdin/stdout  ┌──────────────────────────────────────┐
//! │  Host / UI   │◄──────────────►│  IpcBridge                           │
//! │ BridgeClient │   JSON lines   │   │            ▲                     │
//! └──────────────┘                │   ▼            │ snapshot            │
//!                                 │  Harness ──► DeviceRegistry          │
//! ┌──────────────┐  direct calls  │   │  script     ▲                    │
//! │  HostLoop    │───────────────►│   ▼  thread     │ constructors       │
//! └──────────────┘                │  Rhai engine ───┘                    │
//!                                 └──────────────────────────────────────┘
//! ```

pub mod bridge;
pub mod client;
pub mod devices;
pub mod error;
pub mod harness;
pub mod host;
pub mod logging;
pub mod notify;
pub mod registry;
pub mod script;

pub use crate::bridge::IpcBridge;
pub use crate::error::{BridgeError, DeviceError, HarnessError};
pub use crate::harness::{Harness, HarnessState, ScriptHost};
pub use crate::host::HostLoop;
pub use crate::registry::DeviceRegistry;
