//! Device registry.
//!
//! Owns every live device for one script run: motors, pneumatics and inertial
//! sensors keyed by port, motor groups in creation order, and the controller,
//! brain and drivetrain singleton slots. It also owns the [`Notifier`] devices
//! publish through.
//!
//! Construction and registration are one step under the registry lock.
//! Constructing on a port that is already taken replaces the entry; singleton
//! construction returns the existing instance. [`DeviceRegistry::reset`] is the
//! only way state is destroyed.
//!
//! Lookups return `Option` and never fail: the registry is a best-effort table.
//!
//! Every reset starts a new run. A [`RunScope`] is bound to the run it was
//! taken in; once that run is reset away, the devices it constructs are
//! detached and never reach the registry.

use parking_lot::{Mutex, MutexGuard};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use crate::devices::{Brain, Controller, DriveTrain, Inertial, Motor, MotorGroup, Pneumatic};
use crate::error::DeviceError;
use crate::notify::{BrainSubscriber, MotorSnapshot, MotorSubscriber, Notifier};

/// Point-in-time view of one pneumatic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PneumaticSnapshot {
    /// Smart port.
    pub port: u8,
    /// Cylinder extended.
    pub extended: bool,
    /// Pump running.
    pub pump_on: bool,
}

/// Snapshot of every registered motor and pneumatic, ordered by port.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RobotSnapshot {
    /// Motors by ascending port.
    pub motors: Vec<MotorSnapshot>,
    /// Pneumatics by ascending port.
    pub pneumatics: Vec<PneumaticSnapshot>,
}

/// Number of registered devices of each kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceCounts {
    /// Motors.
    pub motors: usize,
    /// Pneumatics.
    pub pneumatics: usize,
    /// Inertial sensors.
    pub inertials: usize,
    /// Motor groups.
    pub motor_groups: usize,
    /// Controller slot filled.
    pub controller: bool,
    /// Brain slot filled.
    pub brain: bool,
    /// Drivetrain slot filled.
    pub drivetrain: bool,
}

impl DeviceCounts {
    /// No devices at all.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

struct RegistryState {
    run: u64,
    notifier: Arc<Notifier>,
    motors: BTreeMap<u8, Motor>,
    pneumatics: BTreeMap<u8, Pneumatic>,
    inertials: BTreeMap<u8, Inertial>,
    motor_groups: Vec<MotorGroup>,
    controller: Option<Controller>,
    brain: Option<Brain>,
    drivetrain: Option<DriveTrain>,
}

impl RegistryState {
    fn empty(run: u64) -> Self {
        Self {
            run,
            notifier: Arc::new(Notifier::new()),
            motors: BTreeMap::new(),
            pneumatics: BTreeMap::new(),
            inertials: BTreeMap::new(),
            motor_groups: Vec::new(),
            controller: None,
            brain: None,
            drivetrain: None,
        }
    }

    fn add_motor(&mut self, port: u8, gear_ratio: f64, reversed: bool) -> Motor {
        let motor = Motor::new(port, gear_ratio, reversed, self.notifier.clone());
        if self.motors.insert(port, motor.clone()).is_some() {
            debug!(port, "Replaced motor");
        }
        motor
    }

    fn add_pneumatic(&mut self, port: u8) -> Pneumatic {
        let pneumatic = Pneumatic::new(port);
        if self.pneumatics.insert(port, pneumatic.clone()).is_some() {
            debug!(port, "Replaced pneumatic");
        }
        pneumatic
    }

    fn add_inertial(&mut self, port: u8) -> Inertial {
        let inertial = Inertial::new(port);
        self.inertials.insert(port, inertial.clone());
        inertial
    }

    fn add_motor_group(&mut self, motors: Vec<Motor>) -> MotorGroup {
        let group = MotorGroup::new(motors);
        self.motor_groups.push(group.clone());
        group
    }

    fn controller(&mut self) -> Controller {
        self.controller.get_or_insert_with(Controller::new).clone()
    }

    fn brain(&mut self) -> Brain {
        let notifier = self.notifier.clone();
        self.brain.get_or_insert_with(|| Brain::new(notifier)).clone()
    }

    fn drivetrain_or_try_insert(
        &mut self,
        build: impl FnOnce() -> Result<DriveTrain, DeviceError>,
    ) -> Result<DriveTrain, DeviceError> {
        if let Some(existing) = &self.drivetrain {
            return Ok(existing.clone());
        }
        let drivetrain = build()?;
        self.drivetrain = Some(drivetrain.clone());
        Ok(drivetrain)
    }
}

/// Registry of live devices.
///
/// Shared as `Arc<DeviceRegistry>` between the script harness and the host.
pub struct DeviceRegistry {
    state: Mutex<RegistryState>,
}

impl DeviceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RegistryState::empty(0)),
        }
    }

    /// Current run number; every [`reset`](Self::reset) advances it.
    pub fn run(&self) -> u64 {
        self.state.lock().run
    }

    /// Constructor handle bound to the current run.
    pub fn run_scope(self: &Arc<Self>) -> RunScope {
        RunScope {
            registry: self.clone(),
            run: self.run(),
        }
    }

    /// Lock the state if it still belongs to `run`.
    fn lock_run(&self, run: u64) -> Option<MutexGuard<'_, RegistryState>> {
        let state = self.state.lock();
        (state.run == run).then_some(state)
    }

    /// Notifier for the current run.
    pub fn notifier(&self) -> Arc<Notifier> {
        self.state.lock().notifier.clone()
    }

    /// Subscribe to motor changes for the current run.
    pub fn subscribe_motor(&self, subscriber: MotorSubscriber) {
        self.notifier().subscribe_motor(subscriber);
    }

    /// Subscribe to brain display changes for the current run.
    pub fn subscribe_brain(&self, subscriber: BrainSubscriber) {
        self.notifier().subscribe_brain(subscriber);
    }

    // ─── Port-keyed devices ─────────────────────────────────────────

    /// Construct and register a motor; replaces any motor on `port`.
    pub fn create_motor(&self, port: u8, gear_ratio: f64, reversed: bool) -> Motor {
        self.state.lock().add_motor(port, gear_ratio, reversed)
    }

    /// Motor on `port`, if any.
    pub fn motor(&self, port: u8) -> Option<Motor> {
        self.state.lock().motors.get(&port).cloned()
    }

    /// All motors by ascending port.
    pub fn motors(&self) -> Vec<Motor> {
        self.state.lock().motors.values().cloned().collect()
    }

    /// Construct and register a pneumatic; replaces any pneumatic on `port`.
    pub fn create_pneumatic(&self, port: u8) -> Pneumatic {
        self.state.lock().add_pneumatic(port)
    }

    /// Pneumatic on `port`, if any.
    pub fn pneumatic(&self, port: u8) -> Option<Pneumatic> {
        self.state.lock().pneumatics.get(&port).cloned()
    }

    /// Construct and register an inertial sensor; replaces any on `port`.
    pub fn create_inertial(&self, port: u8) -> Inertial {
        self.state.lock().add_inertial(port)
    }

    /// Inertial sensor on `port` (0 = built-in), if any.
    pub fn inertial(&self, port: u8) -> Option<Inertial> {
        self.state.lock().inertials.get(&port).cloned()
    }

    /// Register a motor group.
    pub fn create_motor_group(&self, motors: Vec<Motor>) -> MotorGroup {
        self.state.lock().add_motor_group(motors)
    }

    /// All motor groups in creation order.
    pub fn motor_groups(&self) -> Vec<MotorGroup> {
        self.state.lock().motor_groups.clone()
    }

    // ─── Singletons ─────────────────────────────────────────────────

    /// The controller, created on first use.
    pub fn controller(&self) -> Controller {
        self.state.lock().controller()
    }

    /// The controller, if it exists.
    pub fn existing_controller(&self) -> Option<Controller> {
        self.state.lock().controller.clone()
    }

    /// The brain, created on first use.
    pub fn brain(&self) -> Brain {
        self.state.lock().brain()
    }

    /// The drivetrain if one exists, otherwise build and register one.
    ///
    /// `build` runs under the registry lock and must not touch the registry.
    pub fn drivetrain_or_try_insert(
        &self,
        build: impl FnOnce() -> Result<DriveTrain, DeviceError>,
    ) -> Result<DriveTrain, DeviceError> {
        self.state.lock().drivetrain_or_try_insert(build)
    }

    /// The drivetrain, if it exists.
    pub fn drivetrain(&self) -> Option<DriveTrain> {
        self.state.lock().drivetrain.clone()
    }

    // ─── Whole-registry operations ──────────────────────────────────

    /// Drop every device and singleton, detach every subscriber and start a
    /// new run.
    ///
    /// Devices still held elsewhere keep working but publish into the old,
    /// now empty, notifier.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.notifier.clear();
        let run = state.run + 1;
        *state = RegistryState::empty(run);
        debug!(run, "Device registry reset");
    }

    /// Registered device counts.
    pub fn counts(&self) -> DeviceCounts {
        let state = self.state.lock();
        DeviceCounts {
            motors: state.motors.len(),
            pneumatics: state.pneumatics.len(),
            inertials: state.inertials.len(),
            motor_groups: state.motor_groups.len(),
            controller: state.controller.is_some(),
            brain: state.brain.is_some(),
            drivetrain: state.drivetrain.is_some(),
        }
    }

    /// Snapshot every motor and pneumatic.
    pub fn snapshot(&self) -> RobotSnapshot {
        let (motors, pneumatics) = {
            let state = self.state.lock();
            (
                state.motors.values().cloned().collect::<Vec<_>>(),
                state.pneumatics.values().cloned().collect::<Vec<_>>(),
            )
        };
        RobotSnapshot {
            motors: motors.iter().map(Motor::snapshot).collect(),
            pneumatics: pneumatics
                .iter()
                .map(|p| PneumaticSnapshot {
                    port: p.port(),
                    extended: p.is_extended(),
                    pump_on: p.is_pump_on(),
                })
                .collect(),
        }
    }
}

/// Device constructors bound to one registry run.
///
/// While the run is current they register exactly like the
/// [`DeviceRegistry`] methods of the same name. After a reset they hand out
/// working devices that are not registered and publish nowhere.
#[derive(Clone)]
pub struct RunScope {
    registry: Arc<DeviceRegistry>,
    run: u64,
}

impl RunScope {
    /// Registry this scope constructs into.
    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    /// The run this scope belongs to.
    pub fn run(&self) -> u64 {
        self.run
    }

    /// The run has been reset away.
    pub fn is_stale(&self) -> bool {
        self.registry.run() != self.run
    }

    fn with_state<T>(
        &self,
        kind: &str,
        current: impl FnOnce(&mut RegistryState) -> T,
        detached: impl FnOnce() -> T,
    ) -> T {
        match self.registry.lock_run(self.run) {
            Some(mut state) => current(&mut *state),
            None => {
                debug!(run = self.run, kind, "Stale run; device not registered");
                detached()
            }
        }
    }

    /// See [`DeviceRegistry::create_motor`].
    pub fn create_motor(&self, port: u8, gear_ratio: f64, reversed: bool) -> Motor {
        self.with_state(
            "motor",
            |s| s.add_motor(port, gear_ratio, reversed),
            || Motor::new(port, gear_ratio, reversed, Arc::new(Notifier::new())),
        )
    }

    /// See [`DeviceRegistry::create_pneumatic`].
    pub fn create_pneumatic(&self, port: u8) -> Pneumatic {
        self.with_state("pneumatic", |s| s.add_pneumatic(port), || Pneumatic::new(port))
    }

    /// See [`DeviceRegistry::create_inertial`].
    pub fn create_inertial(&self, port: u8) -> Inertial {
        self.with_state("inertial", |s| s.add_inertial(port), || Inertial::new(port))
    }

    /// See [`DeviceRegistry::create_motor_group`].
    pub fn create_motor_group(&self, motors: Vec<Motor>) -> MotorGroup {
        match self.registry.lock_run(self.run) {
            Some(mut state) => state.add_motor_group(motors),
            None => {
                debug!(run = self.run, "Stale run; motor group not registered");
                MotorGroup::new(motors)
            }
        }
    }

    /// See [`DeviceRegistry::controller`].
    pub fn controller(&self) -> Controller {
        self.with_state("controller", RegistryState::controller, Controller::new)
    }

    /// See [`DeviceRegistry::brain`].
    pub fn brain(&self) -> Brain {
        self.with_state("brain", RegistryState::brain, || {
            Brain::new(Arc::new(Notifier::new()))
        })
    }

    /// See [`DeviceRegistry::drivetrain_or_try_insert`].
    pub fn drivetrain_or_try_insert(
        &self,
        build: impl FnOnce() -> Result<DriveTrain, DeviceError>,
    ) -> Result<DriveTrain, DeviceError> {
        match self.registry.lock_run(self.run) {
            Some(mut state) => state.drivetrain_or_try_insert(build),
            None => {
                debug!(run = self.run, "Stale run; drivetrain not registered");
                build()
            }
        }
    }
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DeviceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceRegistry")
            .field("counts", &self.counts())
            .finish()
    }
}
