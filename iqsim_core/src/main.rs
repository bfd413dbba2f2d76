//! # IQ Simulator Bridge Binary
//!
//! Runs one robot project and talks to the host over standard streams:
//! JSON lines in on stdin, JSON lines out on stdout. Logs go to stderr.
//!
//! # Usage
//!
//! ```bash
//! # Run a project file
//! iqsim_bridge path/to/robot.iqpython
//!
//! # Pick the first *.iqpython in the current directory, verbose logs
//! iqsim_bridge -v
//!
//! # Custom timing
//! iqsim_bridge robot.iqpython --config iqsim.toml --json
//! ```

use clap::Parser;
use iqsim_common::prelude::*;
use iqsim_core::IpcBridge;
use iqsim_core::logging::setup_tracing;
use std::io::BufReader;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use tracing::{error, info};

/// IQ Simulator Bridge - runs a robot project behind a JSON-lines pipe
#[derive(Parser, Debug)]
#[command(name = "iqsim_bridge")]
#[command(version)]
#[command(about = "Runs a robot project behind a line-delimited JSON pipe")]
#[command(long_about = None)]
struct Args {
    /// Project file (.iqpython). Defaults to the first one in the current directory.
    #[arg(value_name = "PROJECT")]
    project: Option<PathBuf>,

    /// Path to simulator configuration (TOML)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long)]
    json: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Err(e) = run() {
        error!("Bridge startup failed: {}", e);
        std::process::exit(1);
    }
    Ok(())
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match SimConfig::load_or_default(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            setup_tracing(args.verbose, args.json, Default::default());
            return Err(e.into());
        }
    };
    setup_tracing(args.verbose, args.json, config.shared.log_level);

    info!(
        "IQ simulator bridge v{} starting ({})",
        env!("CARGO_PKG_VERSION"),
        config.shared.service_name
    );

    let path = match args.project {
        Some(path) => path,
        None => {
            let cwd = std::env::current_dir()?;
            find_project_file(&cwd).ok_or_else(|| {
                format!("no .iqpython project found in {}", cwd.display())
            })?
        }
    };
    let project = Project::load(&path)?;

    let mut bridge = IpcBridge::new(config.bridge, std::io::stdout());

    let running = bridge.running_flag();
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        running.store(false, Ordering::SeqCst);
    })?;

    bridge.startup(&project)?;
    if let Err(e) = bridge.run(BufReader::new(std::io::stdin())) {
        error!("Bridge loop error: {}", e);
    }

    info!("IQ simulator bridge shutdown complete");
    Ok(())
}
