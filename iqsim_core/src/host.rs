//! In-process host loop.
//!
//! The direct-call alternative to the IPC bridge: a front end living in the
//! same process polls the registry once per frame instead of exchanging
//! `tick`/`state` messages.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use iqsim_common::config::HostConfig;
use iqsim_common::protocol::GamepadInput;

use crate::registry::{DeviceRegistry, RobotSnapshot};

/// Source of host input, polled once per frame.
pub trait InputSource {
    /// Latest input, or `None` when nothing changed.
    fn poll(&mut self) -> Option<GamepadInput>;
}

/// No input at all.
pub struct NoInput;

impl InputSource for NoInput {
    fn poll(&mut self) -> Option<GamepadInput> {
        None
    }
}

/// Consumer of per-frame robot state.
pub trait FrameSink {
    /// Called once per frame. `changed` is true when a motor changed state
    /// since the previous frame.
    fn frame(&mut self, snapshot: &RobotSnapshot, changed: bool);
}

/// Sink that logs a telemetry line every `every` frames and on change.
pub struct LogSink {
    every: u64,
    frames: u64,
}

impl LogSink {
    /// Log a summary every `every` frames (at least 1).
    pub fn new(every: u64) -> Self {
        Self {
            every: every.max(1),
            frames: 0,
        }
    }
}

impl FrameSink for LogSink {
    fn frame(&mut self, snapshot: &RobotSnapshot, changed: bool) {
        self.frames += 1;
        if changed {
            for m in &snapshot.motors {
                debug!(
                    port = m.port,
                    velocity = m.actual_velocity,
                    spinning = m.spinning,
                    "motor changed"
                );
            }
        }
        if self.frames % self.every == 0 {
            let spinning = snapshot.motors.iter().filter(|m| m.spinning).count();
            let extended = snapshot.pneumatics.iter().filter(|p| p.extended).count();
            info!(
                "Frame {}: {} motors ({} spinning), {} pneumatics ({} extended)",
                self.frames,
                snapshot.motors.len(),
                spinning,
                snapshot.pneumatics.len(),
                extended
            );
        }
    }
}

/// Frame timing statistics.
#[derive(Debug, Default, Clone, Copy)]
pub struct FrameStats {
    /// Frames executed.
    pub frames: u64,
    /// Frames that took longer than the frame budget.
    pub overruns: u64,
    /// Longest frame observed.
    pub max_frame_time: Duration,
    total_frame_time: Duration,
}

impl FrameStats {
    /// Mean frame time.
    pub fn average(&self) -> Duration {
        match u32::try_from(self.frames) {
            Ok(n) if n > 0 => self.total_frame_time / n,
            _ => Duration::ZERO,
        }
    }

    fn record(&mut self, elapsed: Duration, budget: Duration) {
        self.frames += 1;
        self.total_frame_time += elapsed;
        self.max_frame_time = self.max_frame_time.max(elapsed);
        if elapsed > budget {
            self.overruns += 1;
            if self.overruns <= 10 || self.overruns % 1000 == 0 {
                warn!(
                    "Frame overrun #{}: {}us (budget {}us)",
                    self.overruns,
                    elapsed.as_micros(),
                    budget.as_micros()
                );
            }
        }
    }
}

/// Frame-rate-limited loop over a device registry.
pub struct HostLoop {
    registry: Arc<DeviceRegistry>,
    frame_time: Duration,
    running: Arc<AtomicBool>,
    dirty: Arc<AtomicBool>,
    stats: FrameStats,
}

impl HostLoop {
    /// Create a loop and subscribe to the registry's current run.
    ///
    /// Build the loop after the harness has loaded the script: loading
    /// resets the registry and its subscribers.
    pub fn new(registry: Arc<DeviceRegistry>, config: &HostConfig) -> Self {
        let dirty = Arc::new(AtomicBool::new(true));
        let flag = dirty.clone();
        registry.subscribe_motor(Arc::new(move |_| flag.store(true, Ordering::Release)));
        Self {
            registry,
            frame_time: config.frame_time(),
            running: Arc::new(AtomicBool::new(true)),
            dirty,
            stats: FrameStats::default(),
        }
    }

    /// Flag that keeps the loop alive; clear it to stop.
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    /// Timing statistics so far.
    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    /// Run one frame without pacing.
    pub fn step(&mut self, input: &mut dyn InputSource, sink: &mut dyn FrameSink) {
        if let Some(gamepad) = input.poll() {
            // Input only reaches a controller the script has already asked for.
            if let Some(controller) = self.registry.existing_controller() {
                controller.apply(&gamepad);
            }
        }
        let changed = self.dirty.swap(false, Ordering::AcqRel);
        let snapshot = self.registry.snapshot();
        sink.frame(&snapshot, changed);
    }

    /// Run until the running flag is cleared or `limit` elapses.
    pub fn run(
        &mut self,
        input: &mut dyn InputSource,
        sink: &mut dyn FrameSink,
        limit: Option<Duration>,
    ) -> FrameStats {
        info!(
            "Starting host loop (frame_time={}us)",
            self.frame_time.as_micros()
        );
        let started = Instant::now();

        while self.running.load(Ordering::Acquire) {
            if limit.is_some_and(|l| started.elapsed() >= l) {
                break;
            }
            let frame_start = Instant::now();
            self.step(input, sink);

            let elapsed = frame_start.elapsed();
            self.stats.record(elapsed, self.frame_time);
            if elapsed < self.frame_time {
                std::thread::sleep(self.frame_time - elapsed);
            }
        }

        info!(
            "Host loop stopped: {} frames, avg={}us, max={}us, overruns={}",
            self.stats.frames,
            self.stats.average().as_micros(),
            self.stats.max_frame_time.as_micros(),
            self.stats.overruns
        );
        self.stats
    }
}

/// Replays a fixed list of inputs, one per frame.
pub struct ScriptedInput {
    inputs: VecDeque<GamepadInput>,
}

impl ScriptedInput {
    /// Queue `inputs`; polling yields `None` once they run out.
    pub fn new(inputs: impl IntoIterator<Item = GamepadInput>) -> Self {
        Self {
            inputs: inputs.into_iter().collect(),
        }
    }
}

impl InputSource for ScriptedInput {
    fn poll(&mut self) -> Option<GamepadInput> {
        self.inputs.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use iqsim_common::protocol::Axes;

    #[derive(Default)]
    struct Recorder {
        frames: Vec<(usize, bool)>,
    }

    impl FrameSink for Recorder {
        fn frame(&mut self, snapshot: &RobotSnapshot, changed: bool) {
            self.frames.push((snapshot.motors.len(), changed));
        }
    }

    #[test]
    fn test_changed_flag_tracks_motor_updates() {
        let registry = Arc::new(DeviceRegistry::new());
        let motor = registry.create_motor(1, 1.0, false);
        let mut host = HostLoop::new(registry, &HostConfig::default());
        let mut sink = Recorder::default();

        host.step(&mut NoInput, &mut sink);
        host.step(&mut NoInput, &mut sink);
        motor.spin(crate::devices::Direction::Forward);
        host.step(&mut NoInput, &mut sink);

        assert_eq!(sink.frames, vec![(1, true), (1, false), (1, true)]);
    }

    #[test]
    fn test_input_applied_to_existing_controller() {
        let registry = Arc::new(DeviceRegistry::new());
        let controller = registry.controller();
        let mut host = HostLoop::new(registry, &HostConfig::default());
        let mut input = ScriptedInput::new([GamepadInput {
            axes: Axes {
                a: 42.0,
                ..Axes::default()
            },
            ..GamepadInput::default()
        }]);

        host.step(&mut input, &mut Recorder::default());
        assert_eq!(controller.axis(crate::devices::Axis::A).position(), 42);
    }

    #[test]
    fn test_run_respects_limit() {
        let registry = Arc::new(DeviceRegistry::new());
        let mut host = HostLoop::new(registry, &HostConfig::default());
        let stats = host.run(
            &mut NoInput,
            &mut Recorder::default(),
            Some(Duration::from_millis(100)),
        );
        assert!(stats.frames >= 1);
        assert!(stats.frames <= 10);
    }
}
