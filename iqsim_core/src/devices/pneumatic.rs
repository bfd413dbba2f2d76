//! Pneumatic cylinder with pump.

use parking_lot::Mutex;
use std::sync::Arc;
use tracing::info;

#[derive(Debug)]
struct PneumaticState {
    port: u8,
    extended: bool,
    pump_on: bool,
}

/// Handle to a pneumatic cylinder. All operations are instantaneous.
#[derive(Debug, Clone)]
pub struct Pneumatic {
    state: Arc<Mutex<PneumaticState>>,
}

impl Pneumatic {
    /// Retracted cylinder with the pump running.
    pub fn new(port: u8) -> Self {
        Self {
            state: Arc::new(Mutex::new(PneumaticState {
                port,
                extended: false,
                pump_on: true,
            })),
        }
    }

    /// Smart port.
    pub fn port(&self) -> u8 {
        self.state.lock().port
    }

    /// Extend the cylinder.
    pub fn extend(&self) {
        self.set_extended(true);
    }

    /// Retract the cylinder.
    pub fn retract(&self) {
        self.set_extended(false);
    }

    /// Start the pump.
    pub fn pump_on(&self) {
        self.set_pump(true);
    }

    /// Stop the pump.
    pub fn pump_off(&self) {
        self.set_pump(false);
    }

    /// Extended flag.
    pub fn is_extended(&self) -> bool {
        self.state.lock().extended
    }

    /// Pump flag.
    pub fn is_pump_on(&self) -> bool {
        self.state.lock().pump_on
    }

    fn set_extended(&self, extended: bool) {
        let port = {
            let mut state = self.state.lock();
            state.extended = extended;
            state.port
        };
        info!(port, "Pneumatic {}", if extended { "extended" } else { "retracted" });
    }

    fn set_pump(&self, on: bool) {
        let port = {
            let mut state = self.state.lock();
            state.pump_on = on;
            state.port
        };
        info!(port, "Pneumatic pump {}", if on { "on" } else { "off" });
    }
}
