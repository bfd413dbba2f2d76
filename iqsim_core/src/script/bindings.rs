//! Rhai binding environment for robot scripts.
//!
//! [`ScriptBindings`] is the capability object a script runs against: it
//! registers device types, constructors and methods on an [`Engine`], all
//! backed by one run of a [`DeviceRegistry`]. Constructors register their
//! device as a side effect, the same way a script on real hardware declares
//! its devices. A script that outlives its run constructs detached devices.
//!
//! Constants (`FORWARD`, `DEGREES`, `PORT1`, ...) are pushed into the top-level
//! scope by [`constants_scope`] and are also reachable as `vex::NAME` from
//! inside script functions, which cannot see the top-level scope.

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rhai::{Dynamic, Engine, EvalAltResult, FLOAT, FnPtr, INT, Map, Module, Scope};
use std::sync::Arc;
use std::sync::mpsc::Sender;
use std::thread;
use tracing::{debug, info};

use iqsim_common::consts::{BUILTIN_INERTIAL_PORT, MAX_PORT, MIN_PORT, MM_PER_INCH};

use crate::devices::units::wait_duration;
use crate::devices::{
    Axis, BrakeMode, Brain, BrainScreen, BrainTimer, Button, Controller, ControllerAxis,
    ControllerButton, Direction, DriveGeometry, DriveTrain, Inertial, Motor, MotorGroup, Pneumatic,
    SensorAxis, Unit,
};
use crate::error::DeviceError;
use crate::registry::{DeviceRegistry, RunScope};

type RhaiResult<T> = Result<T, Box<EvalAltResult>>;

/// Work a script hands to the harness's event thread.
#[derive(Debug, Clone)]
pub enum ScriptEvent {
    /// Run a button callback.
    Callback(FnPtr),
    /// Run a function on its own thread (`Thread(fn)`).
    Spawn(FnPtr),
}

/// Device API exposed to scripts.
#[derive(Clone)]
pub struct ScriptBindings {
    scope: RunScope,
    events: Sender<ScriptEvent>,
    rng: Arc<Mutex<StdRng>>,
}

impl ScriptBindings {
    /// Bind to the current run of `registry`; script callbacks are queued on
    /// `events`.
    pub fn new(registry: Arc<DeviceRegistry>, events: Sender<ScriptEvent>) -> Self {
        Self {
            scope: registry.run_scope(),
            events,
            rng: Arc::new(Mutex::new(StdRng::from_entropy())),
        }
    }

    /// Registry the bindings construct devices in.
    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        self.scope.registry()
    }

    /// Build an engine with the full device API registered.
    pub fn build_engine(&self) -> Engine {
        let mut engine = Engine::new();

        engine.on_print(|text| info!(target: "script", "{text}"));
        engine.on_debug(|text, source, pos| {
            debug!(target: "script", source = source.unwrap_or("main"), %pos, "{text}");
        });

        register_vocabulary(&mut engine);
        self.register_motor(&mut engine);
        self.register_motor_group(&mut engine);
        self.register_pneumatic(&mut engine);
        self.register_controller(&mut engine);
        self.register_brain(&mut engine);
        self.register_inertial(&mut engine);
        self.register_drivetrain(&mut engine);
        self.register_runtime(&mut engine);

        let mut vex = Module::new();
        for (name, value) in constants() {
            vex.set_var(name, value);
        }
        engine.register_static_module("vex", vex.into());

        engine
    }

    // ─── Motor ──────────────────────────────────────────────────────

    fn register_motor(&self, engine: &mut Engine) {
        engine.register_type_with_name::<Motor>("Motor");

        let reg = self.scope.clone();
        engine.register_fn("Motor", move |port: INT| -> RhaiResult<Motor> {
            Ok(reg.create_motor(check_port(port)?, 1.0, false))
        });
        let reg = self.scope.clone();
        engine.register_fn("Motor", move |port: INT, reversed: bool| -> RhaiResult<Motor> {
            Ok(reg.create_motor(check_port(port)?, 1.0, reversed))
        });
        let reg = self.scope.clone();
        engine.register_fn(
            "Motor",
            move |port: INT, gear_ratio: Dynamic, reversed: bool| -> RhaiResult<Motor> {
                Ok(reg.create_motor(check_port(port)?, number(&gear_ratio)?, reversed))
            },
        );

        engine
            .register_fn("set_velocity", |m: &mut Motor, v: Dynamic| -> RhaiResult<()> {
                m.set_velocity(number(&v)?);
                Ok(())
            })
            .register_fn(
                "set_velocity",
                |m: &mut Motor, v: Dynamic, _unit: Unit| -> RhaiResult<()> {
                    m.set_velocity(number(&v)?);
                    Ok(())
                },
            )
            .register_fn("spin", |m: &mut Motor, dir: Direction| m.spin(dir))
            .register_fn(
                "spin",
                |m: &mut Motor, dir: Direction, v: Dynamic, _unit: Unit| -> RhaiResult<()> {
                    m.set_velocity(number(&v)?);
                    m.spin(dir);
                    Ok(())
                },
            )
            .register_fn(
                "spin_for",
                |m: &mut Motor, dir: Direction, amount: Dynamic, unit: Unit| -> RhaiResult<()> {
                    m.spin_for(dir, number(&amount)?, unit, true);
                    Ok(())
                },
            )
            .register_fn(
                "spin_for",
                |m: &mut Motor,
                 dir: Direction,
                 amount: Dynamic,
                 unit: Unit,
                 wait: bool|
                 -> RhaiResult<()> {
                    m.spin_for(dir, number(&amount)?, unit, wait);
                    Ok(())
                },
            )
            .register_fn("stop", |m: &mut Motor| m.stop(None))
            .register_fn("stop", |m: &mut Motor, mode: BrakeMode| m.stop(Some(mode)))
            .register_fn("set_stopping", |m: &mut Motor, mode: BrakeMode| {
                m.set_stopping(mode)
            })
            .register_fn("velocity", |m: &mut Motor| m.velocity() as FLOAT)
            .register_fn("velocity", |m: &mut Motor, _unit: Unit| m.velocity() as FLOAT)
            .register_fn("position", |m: &mut Motor| m.position(Unit::Degrees) as FLOAT)
            .register_fn("position", |m: &mut Motor, unit: Unit| {
                m.position(unit) as FLOAT
            })
            .register_fn(
                "set_position",
                |m: &mut Motor, value: Dynamic, unit: Unit| -> RhaiResult<()> {
                    m.set_position(number(&value)?, unit);
                    Ok(())
                },
            )
            .register_fn("reset_position", |m: &mut Motor| m.reset_position())
            .register_fn("is_spinning", |m: &mut Motor| m.is_spinning())
            .register_fn("is_done", |m: &mut Motor| !m.is_spinning())
            .register_get("port", |m: &mut Motor| INT::from(m.port()));
    }

    // ─── MotorGroup ─────────────────────────────────────────────────

    fn register_motor_group(&self, engine: &mut Engine) {
        engine.register_type_with_name::<MotorGroup>("MotorGroup");

        let reg = self.scope.clone();
        engine.register_fn("MotorGroup", move |a: Motor| reg.create_motor_group(vec![a]));
        let reg = self.scope.clone();
        engine.register_fn("MotorGroup", move |a: Motor, b: Motor| {
            reg.create_motor_group(vec![a, b])
        });
        let reg = self.scope.clone();
        engine.register_fn("MotorGroup", move |a: Motor, b: Motor, c: Motor| {
            reg.create_motor_group(vec![a, b, c])
        });
        let reg = self.scope.clone();
        engine.register_fn(
            "MotorGroup",
            move |a: Motor, b: Motor, c: Motor, d: Motor| reg.create_motor_group(vec![a, b, c, d]),
        );
        let reg = self.scope.clone();
        engine.register_fn(
            "MotorGroup",
            move |motors: rhai::Array| -> RhaiResult<MotorGroup> {
                let motors = motors
                    .into_iter()
                    .map(|m| {
                        let type_name = m.type_name();
                        m.try_cast::<Motor>()
                            .ok_or_else(|| fault(format!("MotorGroup expects motors, got {type_name}")))
                    })
                    .collect::<RhaiResult<Vec<_>>>()?;
                Ok(reg.create_motor_group(motors))
            },
        );

        engine
            .register_fn("set_velocity", |g: &mut MotorGroup, v: Dynamic| -> RhaiResult<()> {
                g.set_velocity(number(&v)?);
                Ok(())
            })
            .register_fn(
                "set_velocity",
                |g: &mut MotorGroup, v: Dynamic, _unit: Unit| -> RhaiResult<()> {
                    g.set_velocity(number(&v)?);
                    Ok(())
                },
            )
            .register_fn("spin", |g: &mut MotorGroup, dir: Direction| g.spin(dir))
            .register_fn(
                "spin_for",
                |g: &mut MotorGroup, dir: Direction, amount: Dynamic, unit: Unit| -> RhaiResult<()> {
                    g.spin_for(dir, number(&amount)?, unit, true);
                    Ok(())
                },
            )
            .register_fn(
                "spin_for",
                |g: &mut MotorGroup,
                 dir: Direction,
                 amount: Dynamic,
                 unit: Unit,
                 wait: bool|
                 -> RhaiResult<()> {
                    g.spin_for(dir, number(&amount)?, unit, wait);
                    Ok(())
                },
            )
            .register_fn("stop", |g: &mut MotorGroup| g.stop(None))
            .register_fn("stop", |g: &mut MotorGroup, mode: BrakeMode| g.stop(Some(mode)))
            .register_fn("set_stopping", |g: &mut MotorGroup, mode: BrakeMode| {
                g.set_stopping(mode)
            })
            .register_fn("velocity", |g: &mut MotorGroup| g.velocity() as FLOAT)
            .register_fn("position", |g: &mut MotorGroup, unit: Unit| {
                g.position(unit) as FLOAT
            })
            .register_fn("is_spinning", |g: &mut MotorGroup| g.is_spinning())
            .register_fn("count", |g: &mut MotorGroup| g.motors().len() as INT);
    }

    // ─── Pneumatic ──────────────────────────────────────────────────

    fn register_pneumatic(&self, engine: &mut Engine) {
        engine.register_type_with_name::<Pneumatic>("Pneumatic");

        let reg = self.scope.clone();
        engine.register_fn("Pneumatic", move |port: INT| -> RhaiResult<Pneumatic> {
            Ok(reg.create_pneumatic(check_port(port)?))
        });

        // The cylinder selector is accepted and ignored: one cylinder per port.
        engine
            .register_fn("extend", |p: &mut Pneumatic| p.extend())
            .register_fn("extend", |p: &mut Pneumatic, _cylinder: Dynamic| p.extend())
            .register_fn("retract", |p: &mut Pneumatic| p.retract())
            .register_fn("retract", |p: &mut Pneumatic, _cylinder: Dynamic| p.retract())
            .register_fn("pump_on", |p: &mut Pneumatic| p.pump_on())
            .register_fn("pump_off", |p: &mut Pneumatic| p.pump_off())
            .register_fn("is_extended", |p: &mut Pneumatic| p.is_extended());
    }

    // ─── Controller ─────────────────────────────────────────────────

    fn register_controller(&self, engine: &mut Engine) {
        engine
            .register_type_with_name::<Controller>("Controller")
            .register_type_with_name::<ControllerAxis>("ControllerAxis")
            .register_type_with_name::<ControllerButton>("ControllerButton");

        let reg = self.scope.clone();
        engine.register_fn("Controller", move || reg.controller());

        for (name, axis) in [
            ("axisA", Axis::A),
            ("axisB", Axis::B),
            ("axisC", Axis::C),
            ("axisD", Axis::D),
        ] {
            engine.register_get(name, move |c: &mut Controller| c.axis(axis));
        }
        for button in Button::ALL {
            let name = format!("button{}", button.name().replace('-', ""));
            engine.register_get(name, move |c: &mut Controller| c.button(button));
        }

        engine
            .register_fn("position", |a: &mut ControllerAxis| INT::from(a.position()))
            .register_fn("pressing", |b: &mut ControllerButton| b.pressing());

        let events = self.events.clone();
        engine.register_fn(
            "pressed",
            move |b: &mut ControllerButton, callback: FnPtr| {
                let events = events.clone();
                b.on_pressed(Arc::new(move || {
                    queue(&events, ScriptEvent::Callback(callback.clone()));
                }));
            },
        );
        let events = self.events.clone();
        engine.register_fn(
            "released",
            move |b: &mut ControllerButton, callback: FnPtr| {
                let events = events.clone();
                b.on_released(Arc::new(move || {
                    queue(&events, ScriptEvent::Callback(callback.clone()));
                }));
            },
        );
    }

    // ─── Brain ──────────────────────────────────────────────────────

    fn register_brain(&self, engine: &mut Engine) {
        engine
            .register_type_with_name::<Brain>("Brain")
            .register_type_with_name::<BrainScreen>("BrainScreen")
            .register_type_with_name::<BrainTimer>("BrainTimer");

        let reg = self.scope.clone();
        engine.register_fn("Brain", move || reg.brain());

        engine
            .register_get("screen", |b: &mut Brain| b.screen())
            .register_get("timer", |b: &mut Brain| b.timer())
            .register_fn("print", |s: &mut BrainScreen, a: Dynamic| {
                screen_print(s, &[a])
            })
            .register_fn("print", |s: &mut BrainScreen, a: Dynamic, b: Dynamic| {
                screen_print(s, &[a, b])
            })
            .register_fn(
                "print",
                |s: &mut BrainScreen, a: Dynamic, b: Dynamic, c: Dynamic| {
                    screen_print(s, &[a, b, c])
                },
            )
            .register_fn("clear_screen", |s: &mut BrainScreen| s.clear_screen())
            .register_fn("set_cursor", |s: &mut BrainScreen, row: INT, col: INT| {
                s.set_cursor(to_index(row), to_index(col))
            })
            .register_fn("next_row", |s: &mut BrainScreen| s.next_row())
            .register_fn("system", |t: &mut BrainTimer| t.system() as FLOAT)
            .register_fn("time", |t: &mut BrainTimer| t.time(Unit::Msec) as FLOAT)
            .register_fn("time", |t: &mut BrainTimer, unit: Unit| t.time(unit) as FLOAT)
            .register_fn("clear", |t: &mut BrainTimer| t.clear());
    }

    // ─── Inertial ───────────────────────────────────────────────────

    fn register_inertial(&self, engine: &mut Engine) {
        engine.register_type_with_name::<Inertial>("Inertial");

        let reg = self.scope.clone();
        engine.register_fn("Inertial", move || reg.create_inertial(BUILTIN_INERTIAL_PORT));
        let reg = self.scope.clone();
        engine.register_fn("Inertial", move |port: INT| -> RhaiResult<Inertial> {
            let port = if port == INT::from(BUILTIN_INERTIAL_PORT) {
                BUILTIN_INERTIAL_PORT
            } else {
                check_port(port)?
            };
            Ok(reg.create_inertial(port))
        });

        engine
            .register_fn("calibrate", |i: &mut Inertial| i.calibrate())
            .register_fn("is_calibrating", |i: &mut Inertial| i.is_calibrating())
            .register_fn("heading", |i: &mut Inertial| i.heading() as FLOAT)
            .register_fn("heading", |i: &mut Inertial, _unit: Unit| i.heading() as FLOAT)
            .register_fn("rotation", |i: &mut Inertial| i.rotation() as FLOAT)
            .register_fn("rotation", |i: &mut Inertial, _unit: Unit| i.rotation() as FLOAT)
            .register_fn("acceleration", |i: &mut Inertial, axis: SensorAxis| {
                i.acceleration(axis) as FLOAT
            })
            .register_fn(
                "set_heading",
                |i: &mut Inertial, value: Dynamic, _unit: Unit| -> RhaiResult<()> {
                    i.set_heading(number(&value)?);
                    Ok(())
                },
            )
            .register_fn(
                "set_rotation",
                |i: &mut Inertial, value: Dynamic, _unit: Unit| -> RhaiResult<()> {
                    i.set_rotation(number(&value)?);
                    Ok(())
                },
            )
            .register_fn("reset_heading", |i: &mut Inertial| i.set_heading(0.0))
            .register_fn("reset_rotation", |i: &mut Inertial| i.set_rotation(0.0));
    }

    // ─── DriveTrain / SmartDrive ────────────────────────────────────

    fn register_drivetrain(&self, engine: &mut Engine) {
        engine.register_type_with_name::<DriveTrain>("DriveTrain");

        let reg = self.scope.clone();
        engine.register_fn(
            "DriveTrain",
            move |left: Dynamic, right: Dynamic| -> RhaiResult<DriveTrain> {
                build_drivetrain(&reg, left, right, DriveGeometry::default(), None)
            },
        );
        let reg = self.scope.clone();
        engine.register_fn(
            "DriveTrain",
            move |left: Dynamic,
                  right: Dynamic,
                  wheel_travel: Dynamic,
                  track_width: Dynamic,
                  wheelbase: Dynamic,
                  unit: Unit,
                  gear_ratio: Dynamic|
                  -> RhaiResult<DriveTrain> {
                let geometry =
                    geometry(&wheel_travel, &track_width, &wheelbase, unit, &gear_ratio)?;
                build_drivetrain(&reg, left, right, geometry, None)
            },
        );
        let reg = self.scope.clone();
        engine.register_fn(
            "SmartDrive",
            move |left: Dynamic, right: Dynamic, imu: Inertial| -> RhaiResult<DriveTrain> {
                build_drivetrain(&reg, left, right, DriveGeometry::default(), Some(imu))
            },
        );
        let reg = self.scope.clone();
        engine.register_fn(
            "SmartDrive",
            move |left: Dynamic,
                  right: Dynamic,
                  imu: Inertial,
                  wheel_travel: Dynamic,
                  track_width: Dynamic,
                  wheelbase: Dynamic,
                  unit: Unit,
                  gear_ratio: Dynamic|
                  -> RhaiResult<DriveTrain> {
                let geometry =
                    geometry(&wheel_travel, &track_width, &wheelbase, unit, &gear_ratio)?;
                build_drivetrain(&reg, left, right, geometry, Some(imu))
            },
        );

        engine
            .register_fn("drive", |d: &mut DriveTrain, dir: Direction| d.drive(dir))
            .register_fn(
                "drive_for",
                |d: &mut DriveTrain, dir: Direction, distance: Dynamic, unit: Unit| -> RhaiResult<()> {
                    d.drive_for(dir, number(&distance)?, unit, true);
                    Ok(())
                },
            )
            .register_fn(
                "drive_for",
                |d: &mut DriveTrain,
                 dir: Direction,
                 distance: Dynamic,
                 unit: Unit,
                 wait: bool|
                 -> RhaiResult<()> {
                    d.drive_for(dir, number(&distance)?, unit, wait);
                    Ok(())
                },
            )
            .register_fn("turn", |d: &mut DriveTrain, dir: Direction| d.turn(dir))
            .register_fn(
                "turn_for",
                |d: &mut DriveTrain, dir: Direction, angle: Dynamic, unit: Unit| -> RhaiResult<()> {
                    d.turn_for(dir, number(&angle)?, unit, true);
                    Ok(())
                },
            )
            .register_fn(
                "turn_for",
                |d: &mut DriveTrain,
                 dir: Direction,
                 angle: Dynamic,
                 unit: Unit,
                 wait: bool|
                 -> RhaiResult<()> {
                    d.turn_for(dir, number(&angle)?, unit, wait);
                    Ok(())
                },
            )
            .register_fn(
                "turn_to_heading",
                |d: &mut DriveTrain, heading: Dynamic, unit: Unit| -> RhaiResult<()> {
                    d.turn_to_heading(number(&heading)?, unit, true)
                        .map(|_| ())
                        .map_err(fault)
                },
            )
            .register_fn(
                "turn_to_heading",
                |d: &mut DriveTrain, heading: Dynamic, unit: Unit, wait: bool| -> RhaiResult<()> {
                    d.turn_to_heading(number(&heading)?, unit, wait)
                        .map(|_| ())
                        .map_err(fault)
                },
            )
            .register_fn("heading", |d: &mut DriveTrain| -> RhaiResult<FLOAT> {
                d.heading().map_err(fault)
            })
            .register_fn("stop", |d: &mut DriveTrain| d.stop(None))
            .register_fn("stop", |d: &mut DriveTrain, mode: BrakeMode| d.stop(Some(mode)))
            .register_fn("set_stopping", |d: &mut DriveTrain, mode: BrakeMode| {
                d.set_stopping(mode)
            })
            .register_fn("set_drive_velocity", |d: &mut DriveTrain, v: Dynamic| -> RhaiResult<()> {
                d.set_drive_velocity(number(&v)?);
                Ok(())
            })
            .register_fn(
                "set_drive_velocity",
                |d: &mut DriveTrain, v: Dynamic, _unit: Unit| -> RhaiResult<()> {
                    d.set_drive_velocity(number(&v)?);
                    Ok(())
                },
            )
            .register_fn("set_turn_velocity", |d: &mut DriveTrain, v: Dynamic| -> RhaiResult<()> {
                d.set_turn_velocity(number(&v)?);
                Ok(())
            })
            .register_fn(
                "set_turn_velocity",
                |d: &mut DriveTrain, v: Dynamic, _unit: Unit| -> RhaiResult<()> {
                    d.set_turn_velocity(number(&v)?);
                    Ok(())
                },
            )
            .register_fn("is_moving", |d: &mut DriveTrain| d.is_moving())
            .register_fn("is_done", |d: &mut DriveTrain| !d.is_moving());
    }

    // ─── Timing, randomness, threads ────────────────────────────────

    fn register_runtime(&self, engine: &mut Engine) {
        for name in ["wait", "sleep"] {
            engine
                .register_fn(name, |t: Dynamic| -> RhaiResult<()> {
                    thread::sleep(wait_duration(number(&t)?, Unit::Msec));
                    Ok(())
                })
                .register_fn(name, |t: Dynamic, unit: Unit| -> RhaiResult<()> {
                    thread::sleep(wait_duration(number(&t)?, unit));
                    Ok(())
                });
        }

        let rng = self.rng.clone();
        engine.register_fn("urandom_seed", move |seed: INT| {
            *rng.lock() = StdRng::seed_from_u64(seed as u64);
        });
        let rng = self.rng.clone();
        engine.register_fn("random", move || rng.lock().r#gen::<FLOAT>());
        let rng = self.rng.clone();
        engine.register_fn("randint", move |a: INT, b: INT| -> RhaiResult<INT> {
            if a > b {
                return Err(fault(format!("randint: empty range {a}..={b}")));
            }
            Ok(rng.lock().gen_range(a..=b))
        });

        let events = self.events.clone();
        engine.register_fn("Thread", move |callback: FnPtr| {
            queue(&events, ScriptEvent::Spawn(callback));
        });
    }
}

/// Hand work to the event thread. Once the harness has moved on to another
/// script the receiver is gone and the event is dropped.
fn queue(events: &Sender<ScriptEvent>, event: ScriptEvent) {
    if let Err(e) = events.send(event) {
        debug!("Script event dropped, dispatcher gone: {:?}", e.0);
    }
}

/// Scope seeded with every exported constant.
pub fn constants_scope() -> Scope<'static> {
    let mut scope = Scope::new();
    for (name, value) in constants() {
        scope.push_constant_dynamic(name, value);
    }
    scope
}

fn constants() -> Vec<(String, Dynamic)> {
    let mut out: Vec<(String, Dynamic)> = vec![
        ("FORWARD".into(), Dynamic::from(Direction::Forward)),
        ("REVERSE".into(), Dynamic::from(Direction::Reverse)),
        ("LEFT".into(), Dynamic::from(Direction::Left)),
        ("RIGHT".into(), Dynamic::from(Direction::Right)),
        ("PERCENT".into(), Dynamic::from(Unit::Percent)),
        ("MM".into(), Dynamic::from(Unit::Mm)),
        ("INCHES".into(), Dynamic::from(Unit::Inches)),
        ("DEGREES".into(), Dynamic::from(Unit::Degrees)),
        ("TURNS".into(), Dynamic::from(Unit::Turns)),
        ("SECONDS".into(), Dynamic::from(Unit::Seconds)),
        ("MSEC".into(), Dynamic::from(Unit::Msec)),
        ("COAST".into(), Dynamic::from(BrakeMode::Coast)),
        ("BRAKE".into(), Dynamic::from(BrakeMode::Brake)),
        ("HOLD".into(), Dynamic::from(BrakeMode::Hold)),
        ("XAXIS".into(), Dynamic::from(SensorAxis::X)),
        ("YAXIS".into(), Dynamic::from(SensorAxis::Y)),
        ("ZAXIS".into(), Dynamic::from(SensorAxis::Z)),
    ];

    let mut ports = Map::new();
    for port in MIN_PORT..=MAX_PORT {
        let name = format!("PORT{port}");
        ports.insert(name.clone().into(), Dynamic::from(INT::from(port)));
        out.push((name, Dynamic::from(INT::from(port))));
    }
    out.push(("Ports".into(), Dynamic::from_map(ports)));

    let mut gears = Map::new();
    for (name, ratio) in [
        ("RATIO_1_1", 1.0),
        ("RATIO_2_1", 2.0),
        ("RATIO_3_1", 3.0),
        ("RATIO_1_2", 0.5),
    ] {
        gears.insert(name.into(), Dynamic::from_float(ratio));
    }
    out.push(("GearSetting".into(), Dynamic::from_map(gears)));

    out
}

/// Enum types, their equality operators and display.
fn register_vocabulary(engine: &mut Engine) {
    macro_rules! vocabulary {
        ($($ty:ty => $name:literal),* $(,)?) => {
            $(
                engine
                    .register_type_with_name::<$ty>($name)
                    .register_fn("==", |a: &mut $ty, b: $ty| *a == b)
                    .register_fn("!=", |a: &mut $ty, b: $ty| *a != b)
                    .register_fn("to_string", |a: &mut $ty| format!("{a:?}"))
                    .register_fn("to_debug", |a: &mut $ty| format!("{a:?}"));
            )*
        };
    }
    vocabulary!(
        Direction => "Direction",
        Unit => "Unit",
        BrakeMode => "BrakeMode",
        SensorAxis => "SensorAxis",
    );
}

fn build_drivetrain(
    scope: &RunScope,
    left: Dynamic,
    right: Dynamic,
    geometry: DriveGeometry,
    inertial: Option<Inertial>,
) -> RhaiResult<DriveTrain> {
    let left = side(left, "left")?;
    let right = side(right, "right")?;
    scope
        .drivetrain_or_try_insert(|| DriveTrain::new(left, right, geometry, inertial))
        .map_err(fault)
}

/// Accept either a single motor or a motor group as one drivetrain side.
fn side(value: Dynamic, which: &str) -> RhaiResult<Vec<Motor>> {
    let type_name = value.type_name();
    if value.is::<Motor>() {
        if let Some(motor) = value.try_cast::<Motor>() {
            return Ok(vec![motor]);
        }
    } else if value.is::<MotorGroup>() {
        if let Some(group) = value.try_cast::<MotorGroup>() {
            return Ok(group.motors().to_vec());
        }
    }
    Err(fault(format!(
        "drivetrain {which} side must be a Motor or MotorGroup, got {type_name}"
    )))
}

fn geometry(
    wheel_travel: &Dynamic,
    track_width: &Dynamic,
    wheelbase: &Dynamic,
    unit: Unit,
    gear_ratio: &Dynamic,
) -> RhaiResult<DriveGeometry> {
    let scale = if unit == Unit::Inches { MM_PER_INCH } else { 1.0 };
    Ok(DriveGeometry {
        wheel_travel: number(wheel_travel)? * scale,
        track_width: number(track_width)? * scale,
        wheelbase: number(wheelbase)? * scale,
        gear_ratio: number(gear_ratio)?,
    })
}

fn check_port(port: INT) -> RhaiResult<u8> {
    if (INT::from(MIN_PORT)..=INT::from(MAX_PORT)).contains(&port) {
        Ok(port as u8)
    } else {
        Err(fault(DeviceError::InvalidPort {
            port,
            min: MIN_PORT,
            max: MAX_PORT,
        }))
    }
}

/// Accept integer or float script values as `f64`.
fn number(value: &Dynamic) -> RhaiResult<f64> {
    if let Ok(f) = value.as_float() {
        return Ok(f);
    }
    if let Ok(i) = value.as_int() {
        return Ok(i as f64);
    }
    Err(fault(format!("expected a number, got {}", value.type_name())))
}

fn to_index(value: INT) -> usize {
    usize::try_from(value).unwrap_or(0)
}

/// Rhai passes the result of every call named `print` to the print hook,
/// which only accepts text.
fn screen_print(screen: &BrainScreen, parts: &[Dynamic]) -> String {
    let text = join_text(parts);
    screen.print(&text);
    text
}

fn join_text(parts: &[Dynamic]) -> String {
    parts
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

fn fault(err: impl ToString) -> Box<EvalAltResult> {
    err.to_string().into()
}
