//! Tracing setup shared by the binaries.
//!
//! Logs always go to standard error. In the bridge, standard output carries
//! protocol lines only.

use tracing::Level;
use tracing_subscriber::EnvFilter;

use iqsim_common::config::LogLevel;

/// Install the global subscriber.
///
/// `verbose` forces DEBUG; otherwise the configured level applies. `RUST_LOG`
/// directives are honored on top of it.
pub fn setup_tracing(verbose: bool, json: bool, configured: LogLevel) {
    let level = if verbose {
        Level::DEBUG
    } else {
        level_for(configured)
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

fn level_for(level: LogLevel) -> Level {
    match level {
        LogLevel::Trace => Level::TRACE,
        LogLevel::Debug => Level::DEBUG,
        LogLevel::Info => Level::INFO,
        LogLevel::Warn => Level::WARN,
        LogLevel::Error => Level::ERROR,
    }
}
