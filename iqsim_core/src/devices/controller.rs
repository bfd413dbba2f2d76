//! Gamepad-style controller: four analog axes and eight edge-triggered buttons.
//!
//! The host writes axis and button state; the script reads it. Axis values
//! live in atomics. Button callbacks are collected under the button's lock and
//! invoked after it is released, on the thread that changed the button.

use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};

use iqsim_common::consts::{AXIS_MAX, AXIS_MIN};
use iqsim_common::protocol::GamepadInput;

/// Analog axis identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    /// Left stick vertical.
    A,
    /// Left stick horizontal.
    B,
    /// Right stick horizontal.
    C,
    /// Right stick vertical.
    D,
}

impl Axis {
    /// All axes in A..D order.
    pub const ALL: [Axis; 4] = [Axis::A, Axis::B, Axis::C, Axis::D];

    fn index(self) -> usize {
        self as usize
    }
}

/// Digital button identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Button {
    /// L-Up.
    LUp,
    /// L-Down.
    LDown,
    /// R-Up.
    RUp,
    /// R-Down.
    RDown,
    /// E-Up.
    EUp,
    /// E-Down.
    EDown,
    /// F-Up.
    FUp,
    /// F-Down.
    FDown,
}

impl Button {
    /// All buttons in wire order.
    pub const ALL: [Button; 8] = [
        Button::LUp,
        Button::LDown,
        Button::RUp,
        Button::RDown,
        Button::EUp,
        Button::EDown,
        Button::FUp,
        Button::FDown,
    ];

    /// Display name, e.g. `L-Up`.
    pub fn name(self) -> &'static str {
        match self {
            Self::LUp => "L-Up",
            Self::LDown => "L-Down",
            Self::RUp => "R-Up",
            Self::RDown => "R-Down",
            Self::EUp => "E-Up",
            Self::EDown => "E-Down",
            Self::FUp => "F-Up",
            Self::FDown => "F-Down",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Callback run on a button transition.
pub type ButtonCallback = Arc<dyn Fn() + Send + Sync>;

/// Handle to one analog axis.
#[derive(Debug, Clone)]
pub struct ControllerAxis {
    axis: Axis,
    value: Arc<AtomicI32>,
}

impl ControllerAxis {
    fn new(axis: Axis) -> Self {
        Self {
            axis,
            value: Arc::new(AtomicI32::new(0)),
        }
    }

    /// Which axis this is.
    pub fn axis(&self) -> Axis {
        self.axis
    }

    /// Position in [-100, 100].
    pub fn position(&self) -> i32 {
        self.value.load(Ordering::Relaxed)
    }

    /// Set position, clamped to [-100, 100].
    pub fn set_position(&self, value: i32) {
        self.value
            .store(value.clamp(AXIS_MIN, AXIS_MAX), Ordering::Relaxed);
    }
}

#[derive(Default)]
struct ButtonState {
    pressed: bool,
    on_press: Vec<ButtonCallback>,
    on_release: Vec<ButtonCallback>,
}

/// Handle to one digital button.
#[derive(Clone)]
pub struct ControllerButton {
    button: Button,
    state: Arc<Mutex<ButtonState>>,
}

impl ControllerButton {
    fn new(button: Button) -> Self {
        Self {
            button,
            state: Arc::new(Mutex::new(ButtonState::default())),
        }
    }

    /// Which button this is.
    pub fn button(&self) -> Button {
        self.button
    }

    /// Currently held.
    pub fn pressing(&self) -> bool {
        self.state.lock().pressed
    }

    /// Register a press-transition callback.
    pub fn on_pressed(&self, callback: ButtonCallback) {
        self.state.lock().on_press.push(callback);
    }

    /// Register a release-transition callback.
    pub fn on_released(&self, callback: ButtonCallback) {
        self.state.lock().on_release.push(callback);
    }

    /// Set the button state. Callbacks fire only on a transition.
    pub fn set_pressed(&self, pressed: bool) {
        let to_fire = {
            let mut state = self.state.lock();
            let was = state.pressed;
            state.pressed = pressed;
            match (was, pressed) {
                (false, true) => state.on_press.clone(),
                (true, false) => state.on_release.clone(),
                _ => Vec::new(),
            }
        };
        for callback in to_fire {
            callback();
        }
    }

    /// Registered (press, release) callback counts.
    pub fn callback_counts(&self) -> (usize, usize) {
        let state = self.state.lock();
        (state.on_press.len(), state.on_release.len())
    }
}

impl std::fmt::Debug for ControllerButton {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerButton")
            .field("button", &self.button)
            .field("pressed", &self.pressing())
            .finish()
    }
}

/// Handle to the controller singleton.
#[derive(Debug, Clone)]
pub struct Controller {
    axes: Arc<[ControllerAxis; 4]>,
    buttons: Arc<[ControllerButton; 8]>,
}

impl Default for Controller {
    fn default() -> Self {
        Self::new()
    }
}

impl Controller {
    /// Centred axes, released buttons.
    pub fn new() -> Self {
        Self {
            axes: Arc::new(Axis::ALL.map(ControllerAxis::new)),
            buttons: Arc::new(Button::ALL.map(ControllerButton::new)),
        }
    }

    /// Axis handle.
    pub fn axis(&self, axis: Axis) -> ControllerAxis {
        self.axes[axis.index()].clone()
    }

    /// Button handle.
    pub fn button(&self, button: Button) -> ControllerButton {
        self.buttons[button.index()].clone()
    }

    /// Overwrite all axes and buttons from a host input snapshot.
    ///
    /// Button edges still fire their callbacks.
    pub fn apply(&self, input: &GamepadInput) {
        for (axis, value) in self.axes.iter().zip(input.axes.clamped()) {
            axis.set_position(value);
        }
        for (button, pressed) in self.buttons.iter().zip(input.buttons.as_array()) {
            button.set_pressed(pressed);
        }
    }

    /// `true` if both handles point at the same controller.
    pub fn same_as(&self, other: &Controller) -> bool {
        Arc::ptr_eq(&self.axes, &other.axes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use iqsim_common::protocol::{Axes, Buttons};
    use std::sync::atomic::AtomicUsize;

    fn counter() -> (Arc<AtomicUsize>, ButtonCallback) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        (
            count,
            Arc::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
            }),
        )
    }

    #[test]
    fn test_axis_clamps() {
        let controller = Controller::new();
        let a = controller.axis(Axis::A);
        a.set_position(150);
        assert_eq!(a.position(), 100);
        a.set_position(-101);
        assert_eq!(a.position(), -100);
        assert_eq!(controller.axis(Axis::A).position(), -100);
    }

    #[test]
    fn test_press_is_edge_triggered() {
        let controller = Controller::new();
        let button = controller.button(Button::EUp);
        let (presses, on_press) = counter();
        let (releases, on_release) = counter();
        button.on_pressed(on_press);
        button.on_released(on_release);

        button.set_pressed(true);
        button.set_pressed(true);
        assert_eq!(presses.load(Ordering::SeqCst), 1);
        assert_eq!(releases.load(Ordering::SeqCst), 0);

        button.set_pressed(false);
        button.set_pressed(false);
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_callback_may_touch_its_button() {
        let controller = Controller::new();
        let button = controller.button(Button::LUp);
        let inner = button.clone();
        button.on_pressed(Arc::new(move || {
            let _ = inner.pressing();
        }));
        button.set_pressed(true);
        assert!(button.pressing());
    }

    #[test]
    fn test_apply_gamepad_input() {
        let controller = Controller::new();
        let (presses, on_press) = counter();
        controller.button(Button::FDown).on_pressed(on_press);

        let input = GamepadInput {
            axes: Axes {
                a: 100.0,
                b: -20.4,
                c: 0.0,
                d: 300.0,
            },
            buttons: Buttons {
                f_down: true,
                ..Buttons::default()
            },
        };
        controller.apply(&input);
        controller.apply(&input);

        assert_eq!(controller.axis(Axis::A).position(), 100);
        assert_eq!(controller.axis(Axis::B).position(), -20);
        assert_eq!(controller.axis(Axis::D).position(), 100);
        assert!(controller.button(Button::FDown).pressing());
        assert!(!controller.button(Button::LUp).pressing());
        assert_eq!(presses.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_clones_alias() {
        let a = Controller::new();
        let b = a.clone();
        b.axis(Axis::C).set_position(42);
        assert_eq!(a.axis(Axis::C).position(), 42);
        assert!(a.same_as(&b));
        assert!(!a.same_as(&Controller::new()));
    }
}
