//! IPC bridge: the harness and registry behind a line-delimited JSON pipe.
//!
//! The bridge reads host messages from an input stream (standard input in
//! the `iqsim_bridge` binary) and writes bridge messages to an output stream
//! (standard output). Nothing else may write to the output stream; all
//! diagnostics go through `tracing`, which is configured for standard error.
//!
//! # Lifecycle
//!
//! 1. [`IpcBridge::startup`] loads the script, announces `ready` and starts the
//!    script thread. A compile error is reported as an `error` message and the
//!    bridge keeps serving ticks.
//! 2. [`IpcBridge::run`] polls the input with a short timeout so a `shutdown`
//!    message or external stop request is noticed within one poll interval.
//! 3. On `shutdown`, end of input, or a stop request, a final `shutdown`
//!    message is written.

use parking_lot::Mutex;
use std::io::{BufRead, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use tracing::{debug, error, info, warn};

use iqsim_common::config::BridgeConfig;
use iqsim_common::project::Project;
use iqsim_common::protocol::{
    BridgeMessage, HostMessage, MotorTelemetry, PneumaticTelemetry, ReadyMessage, StateMessage,
    parse_host_line, to_line,
};

use crate::devices::Controller;
use crate::error::{BridgeError, HarnessError};
use crate::harness::{Harness, ScriptHost};
use crate::registry::{DeviceRegistry, RobotSnapshot};

const READER_THREAD: &str = "iqsim-stdin";

/// Serialises bridge messages onto one output stream, one line each.
pub struct MessageWriter {
    out: Mutex<Box<dyn Write + Send>>,
}

impl MessageWriter {
    /// Wrap an output stream.
    pub fn new(out: impl Write + Send + 'static) -> Self {
        Self {
            out: Mutex::new(Box::new(out)),
        }
    }

    /// Write one message and flush.
    pub fn send(&self, message: &BridgeMessage) -> Result<(), BridgeError> {
        let line = to_line(message)?;
        let mut out = self.out.lock();
        writeln!(out, "{line}")?;
        out.flush()?;
        Ok(())
    }
}

/// [`ScriptHost`] that forwards lifecycle events to the pipe.
pub struct BridgeHost {
    writer: Arc<MessageWriter>,
    controller: Mutex<Option<Controller>>,
}

impl BridgeHost {
    fn new(writer: Arc<MessageWriter>) -> Self {
        Self {
            writer,
            controller: Mutex::new(None),
        }
    }

    /// Controller handed over by the harness, if any.
    pub fn controller(&self) -> Option<Controller> {
        self.controller.lock().clone()
    }

    fn send(&self, message: BridgeMessage) {
        if let Err(e) = self.writer.send(&message) {
            warn!("Failed to send message to host: {}", e);
        }
    }
}

impl ScriptHost for BridgeHost {
    fn attach_controller(&self, controller: Controller) {
        *self.controller.lock() = Some(controller);
    }

    fn on_status(&self, message: &str) {
        self.send(BridgeMessage::status(message));
    }

    fn on_script_error(&self, message: &str) {
        self.send(BridgeMessage::error(message));
    }
}

/// Message counters for the shutdown log line.
#[derive(Debug, Default, Clone, Copy)]
pub struct BridgeStats {
    /// Lines received.
    pub lines: u64,
    /// Tick messages answered.
    pub ticks: u64,
    /// Gamepad messages applied.
    pub gamepads: u64,
    /// Lines dropped as protocol faults.
    pub protocol_errors: u64,
}

/// The IPC bridge.
pub struct IpcBridge {
    config: BridgeConfig,
    harness: Harness,
    registry: Arc<DeviceRegistry>,
    writer: Arc<MessageWriter>,
    host: Arc<BridgeHost>,
    running: Arc<AtomicBool>,
    stats: BridgeStats,
}

impl IpcBridge {
    /// Create a bridge writing protocol messages to `out`.
    pub fn new(config: BridgeConfig, out: impl Write + Send + 'static) -> Self {
        let registry = Arc::new(DeviceRegistry::new());
        let writer = Arc::new(MessageWriter::new(out));
        Self {
            config,
            harness: Harness::new(registry.clone()),
            host: Arc::new(BridgeHost::new(writer.clone())),
            registry,
            writer,
            running: Arc::new(AtomicBool::new(false)),
            stats: BridgeStats::default(),
        }
    }

    /// Flag that keeps the read loop alive; clear it to stop.
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    /// Device registry behind the bridge.
    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    /// Counters so far.
    pub fn stats(&self) -> BridgeStats {
        self.stats
    }

    /// Load the project, announce `ready` and start the script.
    ///
    /// # Errors
    /// Only output failures and thread-spawn failures are errors; a script
    /// that does not compile is reported to the host instead.
    pub fn startup(&mut self, project: &Project) -> Result<ReadyMessage, BridgeError> {
        info!("Project: {}", project.name);
        for line in project.describe().lines() {
            debug!("{}", line);
        }

        let loaded = match self.harness.load(project) {
            Ok(()) => true,
            Err(HarnessError::Compile(message)) => {
                error!("Robot code error: {}", message);
                false
            }
            Err(e) => return Err(e.into()),
        };

        let ready = ReadyMessage::from_project(project);
        self.writer.send(&BridgeMessage::Ready(ready.clone()))?;

        if loaded {
            self.harness.start(self.host.clone())?;
        } else {
            self.writer.send(&BridgeMessage::error(format!(
                "Robot code failed to compile in '{}'",
                project.name
            )))?;
        }

        self.running.store(true, Ordering::SeqCst);
        Ok(ready)
    }

    /// Read and dispatch host lines until shutdown, end of input or a stop
    /// request, then send the final `shutdown` message.
    pub fn run<R: BufRead + Send + 'static>(&mut self, reader: R) -> Result<(), BridgeError> {
        let (tx, rx) = mpsc::channel::<std::io::Result<String>>();
        thread::Builder::new()
            .name(READER_THREAD.to_string())
            .spawn(move || {
                for line in reader.lines() {
                    let failed = line.is_err();
                    if tx.send(line).is_err() || failed {
                        break;
                    }
                }
            })
            .map_err(BridgeError::Io)?;

        thread::sleep(self.config.startup_delay());
        let poll = self.config.poll_interval();

        while self.running.load(Ordering::SeqCst) {
            match rx.recv_timeout(poll) {
                Ok(Ok(line)) => self.dispatch(&line),
                Ok(Err(e)) => {
                    error!("Input read error: {}", e);
                    break;
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    info!("Input closed");
                    break;
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        self.harness.stop_events();
        let result = self.writer.send(&BridgeMessage::Shutdown);
        info!(
            "Bridge shutdown ({} lines, {} ticks, {} gamepad, {} dropped)",
            self.stats.lines, self.stats.ticks, self.stats.gamepads, self.stats.protocol_errors
        );
        result
    }

    fn dispatch(&mut self, line: &str) {
        match self.handle_line(line) {
            Ok(()) => {}
            Err(BridgeError::Protocol(e)) => {
                self.stats.protocol_errors += 1;
                error!("Dropped host message: {}", e);
            }
            Err(e) => {
                error!("Lost connection to host: {}", e);
                self.running.store(false, Ordering::SeqCst);
            }
        }
    }

    /// Handle one host line. Blank lines are ignored.
    ///
    /// # Errors
    /// `BridgeError::Protocol` for lines that should be logged and dropped;
    /// `BridgeError::Io` when the reply cannot be written.
    pub fn handle_line(&mut self, line: &str) -> Result<(), BridgeError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(());
        }
        self.stats.lines += 1;

        match parse_host_line(line)? {
            HostMessage::Gamepad(input) => {
                self.stats.gamepads += 1;
                match self.host.controller() {
                    Some(controller) => controller.apply(&input),
                    None => debug!("Gamepad input before controller exists; ignored"),
                }
            }
            HostMessage::Tick { dt } => {
                self.stats.ticks += 1;
                let state = state_message(&self.registry.snapshot());
                if self.stats.ticks % 600 == 0 {
                    debug!("Tick #{} (dt={:.3}s)", self.stats.ticks, dt);
                }
                self.writer.send(&BridgeMessage::State(state))?;
            }
            HostMessage::Shutdown => {
                info!("Shutdown requested by host");
                self.running.store(false, Ordering::SeqCst);
            }
        }
        Ok(())
    }
}

/// Build the `state` payload; `speed` is the actual (shaft) velocity.
pub fn state_message(snapshot: &RobotSnapshot) -> StateMessage {
    StateMessage {
        motors: snapshot
            .motors
            .iter()
            .map(|m| {
                (
                    m.port,
                    MotorTelemetry {
                        speed: m.actual_velocity,
                        spinning: m.spinning,
                        position: m.position,
                    },
                )
            })
            .collect(),
        pneumatics: snapshot
            .pneumatics
            .iter()
            .map(|p| {
                (
                    p.port,
                    PneumaticTelemetry {
                        extended: p.extended,
                        pump: p.pump_on,
                    },
                )
            })
            .collect(),
    }
}
