//! Script binding environment.
//!
//! Robot programs are Rhai scripts. This module builds the engine they run
//! in; the [`crate::harness`] decides which thread runs it.

pub mod bindings;

pub use bindings::{ScriptBindings, ScriptEvent, constants_scope};
