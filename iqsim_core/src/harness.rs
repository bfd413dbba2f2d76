//! Execution harness.
//!
//! Loads a project's script, runs it on a dedicated thread and reports its
//! outcome to a [`ScriptHost`].
//!
//! # State machine
//!
//! ```text
//! Idle --load--> Loaded --start--> Running --(script returns or fails)--> Idle
//! ```
//!
//! `load` resets the device registry before compiling, so nothing leaks from a
//! previous run. `start` creates the controller and hands it to the host
//! before the script thread exists; a script whose first statement loops
//! forever still sees host input.
//!
//! The script thread is never joined or cancelled. A script that is still
//! running when a new one is loaded is abandoned; the devices it constructs
//! from then on are detached from the registry.
//!
//! Button callbacks registered by the script run on a second thread that
//! shares the compiled script, so the host thread that fires the button edge
//! never blocks on script code.

use parking_lot::Mutex;
use rhai::{AST, Dynamic, Engine};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

use iqsim_common::project::Project;

use crate::devices::Controller;
use crate::error::HarnessError;
use crate::registry::DeviceRegistry;
use crate::script::{ScriptBindings, ScriptEvent, constants_scope};

/// Status text sent when the script thread starts.
pub const STATUS_STARTING: &str = "Robot code starting";
/// Status text sent when the script returns normally.
pub const STATUS_FINISHED: &str = "Robot code finished";

const EVENT_POLL: Duration = Duration::from_millis(20);
const SCRIPT_THREAD: &str = "iqsim-script";
const EVENT_THREAD: &str = "iqsim-events";
const USER_THREAD: &str = "iqsim-user-thread";

/// Receiver of harness lifecycle events.
///
/// Methods may be called from the script or event threads.
pub trait ScriptHost: Send + Sync {
    /// The controller, delivered before the script thread starts.
    fn attach_controller(&self, controller: Controller);

    /// Lifecycle status text.
    fn on_status(&self, message: &str);

    /// A script fault; the script thread (or callback) has ended.
    fn on_script_error(&self, message: &str);
}

/// Harness lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarnessState {
    /// Nothing loaded, or the last script has ended.
    Idle,
    /// Script compiled and registry reset.
    Loaded,
    /// Script thread running.
    Running,
}

struct LoadedScript {
    name: String,
    engine: Arc<Engine>,
    ast: Arc<AST>,
    events: Receiver<ScriptEvent>,
}

/// Handle to a started script thread.
pub struct ScriptHandle {
    thread: JoinHandle<()>,
}

impl ScriptHandle {
    /// Script thread has exited.
    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Poll until the script thread exits or `timeout` passes.
    ///
    /// Returns `true` if the thread exited.
    pub fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while !self.is_finished() {
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(5));
        }
        true
    }
}

/// Loads and runs robot scripts against a device registry.
pub struct Harness {
    registry: Arc<DeviceRegistry>,
    state: Arc<Mutex<HarnessState>>,
    generation: Arc<AtomicU64>,
    loaded: Option<LoadedScript>,
    events_stop: Arc<AtomicBool>,
}

impl Harness {
    /// Create an idle harness over `registry`.
    pub fn new(registry: Arc<DeviceRegistry>) -> Self {
        Self {
            registry,
            state: Arc::new(Mutex::new(HarnessState::Idle)),
            generation: Arc::new(AtomicU64::new(0)),
            loaded: None,
            events_stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Shared device registry.
    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    /// Current lifecycle state.
    pub fn state(&self) -> HarnessState {
        *self.state.lock()
    }

    /// Reset the registry and compile the project's script.
    ///
    /// # Errors
    /// Returns `HarnessError::Compile` if the script does not parse; the
    /// harness is then `Idle` with an empty registry.
    pub fn load(&mut self, project: &Project) -> Result<(), HarnessError> {
        self.stop_events();
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.loaded = None;
        self.registry.reset();
        *self.state.lock() = HarnessState::Idle;

        let (tx, rx) = mpsc::channel();
        let bindings = ScriptBindings::new(self.registry.clone(), tx);
        let engine = bindings.build_engine();
        let ast = engine
            .compile(&project.source)
            .map_err(|e| HarnessError::Compile(e.to_string()))?;

        info!("Loaded script '{}' ({} bytes)", project.name, project.source.len());

        self.loaded = Some(LoadedScript {
            name: project.name.clone(),
            engine: Arc::new(engine),
            ast: Arc::new(ast),
            events: rx,
        });
        *self.state.lock() = HarnessState::Loaded;
        Ok(())
    }

    /// Start the loaded script.
    ///
    /// The controller is created and attached to `host` before any thread is
    /// spawned.
    ///
    /// # Errors
    /// `NotLoaded` without a successful `load`, `AlreadyRunning` if a script
    /// is running, `Spawn` if a thread cannot be created.
    pub fn start(&mut self, host: Arc<dyn ScriptHost>) -> Result<ScriptHandle, HarnessError> {
        if self.state() == HarnessState::Running {
            return Err(HarnessError::AlreadyRunning);
        }
        let loaded = self.loaded.take().ok_or(HarnessError::NotLoaded)?;

        host.attach_controller(self.registry.controller());

        let stop = self.events_stop.clone();
        {
            let engine = loaded.engine.clone();
            let ast = loaded.ast.clone();
            let host = host.clone();
            let events = loaded.events;
            thread::Builder::new()
                .name(EVENT_THREAD.to_string())
                .spawn(move || dispatch_events(&engine, &ast, &events, &stop, &host))
                .map_err(|source| HarnessError::Spawn {
                    name: EVENT_THREAD,
                    source,
                })?;
        }

        *self.state.lock() = HarnessState::Running;
        host.on_status(STATUS_STARTING);

        let state = self.state.clone();
        let generation = self.generation.clone();
        let my_generation = generation.load(Ordering::SeqCst);
        let name = loaded.name;
        let engine = loaded.engine;
        let ast = loaded.ast;

        let spawned = thread::Builder::new()
            .name(SCRIPT_THREAD.to_string())
            .spawn(move || {
                let mut scope = constants_scope();
                match engine.run_ast_with_scope(&mut scope, &ast) {
                    Ok(()) => {
                        info!("Script '{}' finished", name);
                        host.on_status(STATUS_FINISHED);
                    }
                    Err(e) => {
                        error!("Script '{}' failed: {}", name, e);
                        host.on_script_error(&e.to_string());
                    }
                }
                if generation.load(Ordering::SeqCst) == my_generation {
                    *state.lock() = HarnessState::Idle;
                }
            });

        match spawned {
            Ok(thread) => Ok(ScriptHandle { thread }),
            Err(source) => {
                *self.state.lock() = HarnessState::Idle;
                Err(HarnessError::Spawn {
                    name: SCRIPT_THREAD,
                    source,
                })
            }
        }
    }

    /// Stop dispatching script callbacks. The script thread is unaffected.
    pub fn stop_events(&mut self) {
        self.events_stop.store(true, Ordering::SeqCst);
        self.events_stop = Arc::new(AtomicBool::new(false));
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.events_stop.store(true, Ordering::SeqCst);
    }
}

fn dispatch_events(
    engine: &Arc<Engine>,
    ast: &Arc<AST>,
    events: &Receiver<ScriptEvent>,
    stop: &AtomicBool,
    host: &Arc<dyn ScriptHost>,
) {
    debug!("Event dispatcher started");
    while !stop.load(Ordering::SeqCst) {
        match events.recv_timeout(EVENT_POLL) {
            Ok(ScriptEvent::Callback(callback)) => {
                if let Err(e) = callback.call::<Dynamic>(engine, ast, ()) {
                    error!("Script callback '{}' failed: {}", callback.fn_name(), e);
                    host.on_script_error(&e.to_string());
                }
            }
            Ok(ScriptEvent::Spawn(entry)) => {
                let engine = engine.clone();
                let ast = ast.clone();
                let host = host.clone();
                let spawned = thread::Builder::new()
                    .name(USER_THREAD.to_string())
                    .spawn(move || {
                        if let Err(e) = entry.call::<Dynamic>(&engine, &ast, ()) {
                            error!("Script thread '{}' failed: {}", entry.fn_name(), e);
                            host.on_script_error(&e.to_string());
                        }
                    });
                if let Err(e) = spawned {
                    error!("Failed to spawn script thread: {}", e);
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    debug!("Event dispatcher stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingHost {
        events: Mutex<Vec<String>>,
    }

    impl ScriptHost for RecordingHost {
        fn attach_controller(&self, _controller: Controller) {
            self.events.lock().push("controller".to_string());
        }
        fn on_status(&self, message: &str) {
            self.events.lock().push(format!("status:{message}"));
        }
        fn on_script_error(&self, message: &str) {
            self.events.lock().push(format!("error:{message}"));
        }
    }

    #[test]
    fn test_start_without_load() {
        let mut harness = Harness::new(Arc::new(DeviceRegistry::new()));
        let host = Arc::new(RecordingHost::default());
        assert!(matches!(harness.start(host), Err(HarnessError::NotLoaded)));
    }

    #[test]
    fn test_compile_error() {
        let mut harness = Harness::new(Arc::new(DeviceRegistry::new()));
        let result = harness.load(&Project::from_source("let = ;"));
        assert!(matches!(result, Err(HarnessError::Compile(_))));
        assert_eq!(harness.state(), HarnessState::Idle);
    }

    #[test]
    fn test_lifecycle_and_ordering() {
        let mut harness = Harness::new(Arc::new(DeviceRegistry::new()));
        harness
            .load(&Project::from_source("let m = Motor(PORT1);"))
            .unwrap();
        assert_eq!(harness.state(), HarnessState::Loaded);

        let host = Arc::new(RecordingHost::default());
        let handle = harness.start(host.clone()).unwrap();
        assert!(handle.wait(Duration::from_secs(5)));

        // The state flips to Idle just after the host hears about it.
        let deadline = Instant::now() + Duration::from_secs(1);
        while harness.state() != HarnessState::Idle && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(harness.state(), HarnessState::Idle);
        assert_eq!(
            *host.events.lock(),
            vec![
                "controller".to_string(),
                format!("status:{STATUS_STARTING}"),
                format!("status:{STATUS_FINISHED}"),
            ]
        );
        assert!(harness.registry().motor(1).is_some());
    }

    #[test]
    fn test_script_fault_is_reported() {
        let mut harness = Harness::new(Arc::new(DeviceRegistry::new()));
        harness
            .load(&Project::from_source(r#"throw "boom";"#))
            .unwrap();
        let host = Arc::new(RecordingHost::default());
        let handle = harness.start(host.clone()).unwrap();
        assert!(handle.wait(Duration::from_secs(5)));

        let events = host.events.lock().clone();
        assert_eq!(events.len(), 3);
        assert!(events[2].starts_with("error:"), "{events:?}");
        assert!(events[2].contains("boom"));
    }

    #[test]
    fn test_reload_resets_registry() {
        let mut harness = Harness::new(Arc::new(DeviceRegistry::new()));
        harness
            .load(&Project::from_source("let m = Motor(PORT1);"))
            .unwrap();
        let handle = harness
            .start(Arc::new(RecordingHost::default()))
            .unwrap();
        assert!(handle.wait(Duration::from_secs(5)));
        assert_eq!(harness.registry().counts().motors, 1);

        harness.load(&Project::from_source("")).unwrap();
        assert!(harness.registry().counts().is_empty());
    }

    #[test]
    fn test_abandoned_script_cannot_register_into_next_run() {
        let mut harness = Harness::new(Arc::new(DeviceRegistry::new()));
        harness
            .load(&Project::from_source(
                "wait(100); let m = Motor(PORT5); m.spin(FORWARD);",
            ))
            .unwrap();
        let old = harness
            .start(Arc::new(RecordingHost::default()))
            .unwrap();

        harness
            .load(&Project::from_source("let m = Motor(PORT1);"))
            .unwrap();
        let new = harness
            .start(Arc::new(RecordingHost::default()))
            .unwrap();

        assert!(old.wait(Duration::from_secs(5)));
        assert!(new.wait(Duration::from_secs(5)));
        let ports: Vec<u8> = harness
            .registry()
            .snapshot()
            .motors
            .iter()
            .map(|m| m.port)
            .collect();
        assert_eq!(ports, vec![1]);
    }
}
