//! State-change notification fabric.
//!
//! Devices publish through a [`Notifier`] owned by the device registry.
//! Subscribers run synchronously, in registration order, on whichever thread
//! mutated the device, so they must be quick and must not call back into the
//! registry. A typical subscriber just marks a dirty flag for the next frame.

use parking_lot::Mutex;
use std::sync::Arc;

/// Point-in-time view of one motor, handed to motor subscribers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotorSnapshot {
    /// Smart port.
    pub port: u8,
    /// Commanded target velocity (percent).
    pub target_velocity: f64,
    /// Shaft velocity: mounting-reversed and direction signs applied.
    pub actual_velocity: f64,
    /// World-facing wheel velocity: direction sign only.
    pub wheel_velocity: f64,
    /// Spinning flag.
    pub spinning: bool,
    /// Shaft position (degrees).
    pub position: f64,
}

/// Motor-change subscriber.
pub type MotorSubscriber = Arc<dyn Fn(&MotorSnapshot) + Send + Sync>;

/// Brain-display subscriber; receives the text just printed.
pub type BrainSubscriber = Arc<dyn Fn(&str) + Send + Sync>;

/// Subscriber lists for the two event classes.
#[derive(Default)]
pub struct Notifier {
    motor: Mutex<Vec<MotorSubscriber>>,
    brain: Mutex<Vec<BrainSubscriber>>,
}

impl Notifier {
    /// Create an empty notifier.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to motor state changes.
    pub fn subscribe_motor(&self, subscriber: MotorSubscriber) {
        self.motor.lock().push(subscriber);
    }

    /// Subscribe to brain display changes.
    pub fn subscribe_brain(&self, subscriber: BrainSubscriber) {
        self.brain.lock().push(subscriber);
    }

    /// Deliver a motor change to every subscriber.
    pub fn publish_motor(&self, snapshot: &MotorSnapshot) {
        // Clone the list so a subscriber can subscribe without deadlocking.
        let subscribers = self.motor.lock().clone();
        for subscriber in &subscribers {
            subscriber(snapshot);
        }
    }

    /// Deliver a brain display change to every subscriber.
    pub fn publish_brain(&self, text: &str) {
        let subscribers = self.brain.lock().clone();
        for subscriber in &subscribers {
            subscriber(text);
        }
    }

    /// Detach all subscribers.
    pub fn clear(&self) {
        self.motor.lock().clear();
        self.brain.lock().clear();
    }

    /// Number of (motor, brain) subscribers.
    pub fn subscriber_counts(&self) -> (usize, usize) {
        (self.motor.lock().len(), self.brain.lock().len())
    }
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (motor, brain) = self.subscriber_counts();
        f.debug_struct("Notifier")
            .field("motor_subscribers", &motor)
            .field("brain_subscribers", &brain)
            .finish()
    }
}
