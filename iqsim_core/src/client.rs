//! Host-side client for the `iqsim_bridge` subprocess.
//!
//! Spawns the bridge with piped standard streams. Bridge messages are read on
//! a background thread and handed over through a channel; lines that do not
//! parse are logged and skipped.

use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use iqsim_common::protocol::{BridgeMessage, GamepadInput, HostMessage, parse_bridge_line, to_line};

use crate::error::BridgeError;

/// A running bridge subprocess.
pub struct BridgeClient {
    child: Child,
    stdin: Option<ChildStdin>,
    messages: Receiver<BridgeMessage>,
}

impl BridgeClient {
    /// Spawn `program` with `args`. Standard error is inherited.
    pub fn spawn<I, S>(program: &Path, args: I) -> Result<Self, BridgeError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()?;

        let stdin = child.stdin.take();
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| std::io::Error::other("bridge stdout not captured"))?;

        let (tx, rx) = mpsc::channel();
        thread::Builder::new()
            .name("iqsim-client-reader".to_string())
            .spawn(move || {
                for line in BufReader::new(stdout).lines() {
                    let Ok(line) = line else { break };
                    match parse_bridge_line(&line) {
                        Ok(message) => {
                            if tx.send(message).is_err() {
                                break;
                            }
                        }
                        Err(e) => warn!("Unreadable bridge line: {}", e),
                    }
                }
                debug!("Bridge output closed");
            })?;

        Ok(Self {
            child,
            stdin,
            messages: rx,
        })
    }

    fn send(&mut self, message: &HostMessage) -> Result<(), BridgeError> {
        let line = to_line(message)?;
        self.send_raw(&line)
    }

    /// Send a raw line, bypassing message encoding.
    pub fn send_raw(&mut self, line: &str) -> Result<(), BridgeError> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| std::io::Error::from(std::io::ErrorKind::BrokenPipe))?;
        writeln!(stdin, "{line}")?;
        stdin.flush()?;
        Ok(())
    }

    /// Overwrite the controller's axes and buttons.
    pub fn send_gamepad(&mut self, input: GamepadInput) -> Result<(), BridgeError> {
        self.send(&HostMessage::Gamepad(input))
    }

    /// Request one `state` reply.
    pub fn send_tick(&mut self, dt: f64) -> Result<(), BridgeError> {
        self.send(&HostMessage::Tick { dt })
    }

    /// Ask the bridge to stop; it answers with `shutdown` and exits.
    pub fn send_shutdown(&mut self) -> Result<(), BridgeError> {
        self.send(&HostMessage::Shutdown)
    }

    /// Close the bridge's standard input; the bridge treats it as shutdown.
    pub fn close_input(&mut self) {
        self.stdin = None;
    }

    /// Next message, or `None` after `timeout` or once the bridge is gone.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<BridgeMessage> {
        match self.messages.recv_timeout(timeout) {
            Ok(message) => Some(message),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Skip messages until one matches `predicate` or `timeout` elapses.
    pub fn wait_for<F>(&self, mut predicate: F, timeout: Duration) -> Option<BridgeMessage>
    where
        F: FnMut(&BridgeMessage) -> bool,
    {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.checked_duration_since(Instant::now())?;
            let message = self.recv_timeout(remaining)?;
            if predicate(&message) {
                return Some(message);
            }
            debug!("Skipping {:?}", message);
        }
    }

    /// Wait for the process to exit, killing it after `timeout`.
    pub fn finish(mut self, timeout: Duration) -> Result<Option<i32>, BridgeError> {
        self.stdin = None;
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(status) = self.child.try_wait()? {
                return Ok(status.code());
            }
            if Instant::now() >= deadline {
                warn!("Bridge did not exit in time; killing it");
                self.child.kill()?;
                self.child.wait()?;
                return Ok(None);
            }
            thread::sleep(Duration::from_millis(10));
        }
    }
}

impl Drop for BridgeClient {
    fn drop(&mut self) {
        if let Ok(None) = self.child.try_wait() {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}
