//! Inertial sensor: heading, rotation and a calibrating flag.

use parking_lot::Mutex;
use rand::Rng;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use iqsim_common::consts::CALIBRATION_TIME_MS;

use super::units::SensorAxis;

#[derive(Debug, Default)]
struct InertialState {
    heading: f64,
    rotation: f64,
}

/// Handle to an inertial sensor. Port 0 is the brain's built-in sensor.
#[derive(Debug, Clone)]
pub struct Inertial {
    port: u8,
    state: Arc<Mutex<InertialState>>,
    calibrating: Arc<AtomicBool>,
}

impl Inertial {
    /// Zeroed sensor.
    pub fn new(port: u8) -> Self {
        Self {
            port,
            state: Arc::new(Mutex::new(InertialState::default())),
            calibrating: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Port (0 for built-in).
    pub fn port(&self) -> u8 {
        self.port
    }

    /// Block while "calibrating". Other threads see the busy flag meanwhile.
    pub fn calibrate(&self) {
        self.calibrating.store(true, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(CALIBRATION_TIME_MS));
        self.calibrating.store(false, Ordering::SeqCst);
    }

    /// Busy flag.
    pub fn is_calibrating(&self) -> bool {
        self.calibrating.load(Ordering::SeqCst)
    }

    /// Heading in [0, 360).
    pub fn heading(&self) -> f64 {
        self.state.lock().heading
    }

    /// Unbounded rotation in degrees.
    pub fn rotation(&self) -> f64 {
        self.state.lock().rotation
    }

    /// Overwrite heading; wrapped into [0, 360).
    pub fn set_heading(&self, heading: f64) {
        self.state.lock().heading = wrap_heading(heading);
    }

    /// Overwrite rotation.
    pub fn set_rotation(&self, rotation: f64) {
        self.state.lock().rotation = rotation;
    }

    /// Advance heading and rotation by `degrees` (clockwise positive).
    pub fn rotate_by(&self, degrees: f64) {
        let mut state = self.state.lock();
        state.heading = wrap_heading(state.heading + degrees);
        state.rotation += degrees;
    }

    /// Small random reading in [-1, 1]; scripts use it as an entropy source.
    pub fn acceleration(&self, _axis: SensorAxis) -> f64 {
        rand::thread_rng().gen_range(-1.0..=1.0)
    }
}

/// Wrap any angle into [0, 360).
pub fn wrap_heading(degrees: f64) -> f64 {
    if !degrees.is_finite() {
        return 0.0;
    }
    let wrapped = degrees.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360 for tiny negative inputs.
    if wrapped >= 360.0 { 0.0 } else { wrapped }
}

/// Signed shortest turn from `current` to `target`, in (-180, 180].
pub fn shortest_turn(current: f64, target: f64) -> f64 {
    let mut diff = target - current;
    while diff > 180.0 {
        diff -= 360.0;
    }
    while diff <= -180.0 {
        diff += 360.0;
    }
    diff
}
