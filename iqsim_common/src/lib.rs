//! IQ Simulator Common Library
//!
//! This crate provides shared constants, configuration loading, the project
//! file model and the IPC wire protocol for all simulator workspace crates.
//!
//! # Module Structure
//!
//! - [`consts`] - Port ranges, axis limits and timing constants
//! - [`config`] - Configuration loading traits and types
//! - [`project`] - `.iqpython` project file model and parser
//! - [`protocol`] - Line-delimited JSON messages exchanged with the host
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```rust
//! use iqsim_common::consts::MAX_PORT;
//! use iqsim_common::config::{ConfigLoader, SimConfig};
//! ```

pub mod config;
pub mod consts;
pub mod prelude;
pub mod project;
pub mod protocol;
