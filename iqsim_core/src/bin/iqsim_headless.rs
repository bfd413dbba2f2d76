//! # IQ Simulator Headless Runner
//!
//! Runs a robot project in-process and polls the device registry once per
//! frame, logging telemetry instead of rendering it.
//!
//! ```bash
//! iqsim_headless robot.iqpython --duration-secs 10 -v
//! ```

use clap::Parser;
use iqsim_common::prelude::*;
use iqsim_core::devices::Controller;
use iqsim_core::harness::{Harness, ScriptHost};
use iqsim_core::host::{HostLoop, LogSink, NoInput};
use iqsim_core::logging::setup_tracing;
use iqsim_core::registry::DeviceRegistry;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{error, info, warn};

/// IQ Simulator Headless - runs a robot project without a host UI
#[derive(Parser, Debug)]
#[command(name = "iqsim_headless")]
#[command(version)]
#[command(about = "Runs a robot project in-process and logs its telemetry")]
#[command(long_about = None)]
struct Args {
    /// Project file (.iqpython). Defaults to the first one in the current directory.
    #[arg(value_name = "PROJECT")]
    project: Option<PathBuf>,

    /// Path to simulator configuration (TOML)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Stop after this many seconds (default: run until the script ends or Ctrl-C)
    #[arg(long, value_name = "SECS")]
    duration_secs: Option<f64>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long)]
    json: bool,
}

/// Logs harness events and stops the frame loop when the script ends.
struct ConsoleHost {
    finished: Arc<AtomicBool>,
}

impl ScriptHost for ConsoleHost {
    fn attach_controller(&self, _controller: Controller) {
        info!("Controller attached (no input source)");
    }

    fn on_status(&self, message: &str) {
        info!("{}", message);
        if message == iqsim_core::harness::STATUS_FINISHED {
            self.finished.store(true, Ordering::SeqCst);
        }
    }

    fn on_script_error(&self, message: &str) {
        error!("Robot code error: {}", message);
        self.finished.store(true, Ordering::SeqCst);
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Err(e) = run() {
        error!("Headless startup failed: {}", e);
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
    info!("{}", project.describe());

    let registry = Arc::new(DeviceRegistry::new());
    let mut harness = Harness::new(registry.clone());
    harness.load(&project)?;

    let mut host_loop = HostLoop::new(registry, &config.host);
    let running = host_loop.running_flag();
    let finished = Arc::new(AtomicBool::new(false));

    {
        let running = running.clone();
        ctrlc::set_handler(move || {
            info!("Received shutdown signal");
            running.store(false, Ordering::SeqCst);
        })?;
    }

    harness.start(Arc::new(ConsoleHost {
        finished: finished.clone(),
    }))?;

    // Keep polling a little after the script ends so the final state is logged.
    {
        let running = running.clone();
        let finished = finished.clone();
        std::thread::Builder::new()
            .name("iqsim-headless-watch".to_string())
            .spawn(move || {
                while !finished.load(Ordering::SeqCst) {
                    std::thread::sleep(Duration::from_millis(50));
                }
                std::thread::sleep(Duration::from_millis(100));
                running.store(false, Ordering::SeqCst);
            })?;
    }

    let limit = match args.duration_secs {
        Some(secs) => match Duration::try_from_secs_f64(secs) {
            Ok(limit) => Some(limit),
            Err(e) => {
                warn!("Ignoring --duration-secs {}: {}", secs, e);
                None
            }
        },
        None => None,
    };

    let mut sink = LogSink::new(config.host.telemetry_every);
    let stats = host_loop.run(&mut NoInput, &mut sink, limit);
    harness.stop_events();

    info!(
        "Headless run complete: {} frames, {} overruns",
        stats.frames, stats.overruns
    );
    Ok(())
}
