//! In-process bridge tests: protocol lines in, protocol lines out.

use iqsim_common::config::BridgeConfig;
use iqsim_common::project::Project;
use iqsim_common::protocol::{BridgeMessage, StateMessage, parse_bridge_line};
use iqsim_core::IpcBridge;
use iqsim_core::harness::{STATUS_FINISHED, STATUS_STARTING};
use parking_lot::Mutex;
use std::io::{Cursor, Write};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Output sink shared with the test.
#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }
    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl SharedBuf {
    fn messages(&self) -> Vec<BridgeMessage> {
        let bytes = self.0.lock().clone();
        String::from_utf8(bytes)
            .unwrap()
            .lines()
            .map(|line| parse_bridge_line(line).unwrap())
            .collect()
    }

    fn last_state(&self) -> Option<StateMessage> {
        self.messages().into_iter().rev().find_map(|m| match m {
            BridgeMessage::State(state) => Some(state),
            _ => None,
        })
    }
}

fn fast_config() -> BridgeConfig {
    BridgeConfig {
        poll_interval_ms: 5,
        startup_delay_ms: 0,
    }
}

const PROJECT: &str = r#"{
    "textContent": "// Project: Bridge Test\nlet m = Motor(PORT1);\nlet claw = Pneumatic(PORT3);\nlet c = Controller();\nwhile c.axisA.position() == 0 { wait(5); }\nm.set_velocity(c.axisA.position());\nm.spin(FORWARD);\nclaw.extend();\n",
    "targetBrainGen": "Second",
    "robotConfig": [
        {"deviceType": "Motor", "name": "arm", "port": [1], "setting": {"reversed": "false"}},
        {"deviceType": "Pneumatic", "name": "claw", "port": [3], "setting": {}}
    ]
}"#;

fn wait_for_state(
    bridge: &mut IpcBridge,
    out: &SharedBuf,
    mut f: impl FnMut(&StateMessage) -> bool,
) -> StateMessage {
    let deadline = Instant::now() + Duration::from_secs(3);
    loop {
        bridge.handle_line(r#"{"type":"tick","dt":0.016}"#).unwrap();
        let state = out.last_state().unwrap();
        if f(&state) || Instant::now() > deadline {
            return state;
        }
        thread::sleep(Duration::from_millis(10));
    }
}

#[test]
fn test_startup_announces_declared_devices() {
    let out = SharedBuf::default();
    let mut bridge = IpcBridge::new(fast_config(), out.clone());
    let ready = bridge.startup(&Project::parse(PROJECT).unwrap()).unwrap();

    assert_eq!(ready.project, "Bridge Test");
    assert_eq!(ready.motors.len(), 1);
    assert_eq!(ready.motors[0].name, "arm");
    assert_eq!(ready.pneumatics[0].port, 3);

    let messages = out.messages();
    assert!(matches!(messages[0], BridgeMessage::Ready(_)));
    assert_eq!(messages[1], BridgeMessage::status(STATUS_STARTING));
}

#[test]
fn test_gamepad_input_reaches_script() {
    let out = SharedBuf::default();
    let mut bridge = IpcBridge::new(fast_config(), out.clone());
    bridge.startup(&Project::parse(PROJECT).unwrap()).unwrap();

    let idle = wait_for_state(&mut bridge, &out, |s| s.motors.contains_key(&1));
    assert_eq!(idle.motors[&1].speed, 0.0);
    assert!(!idle.motors[&1].spinning);

    bridge
        .handle_line(r#"{"type":"gamepad","axes":{"A":75.4},"buttons":{}}"#)
        .unwrap();

    let moving = wait_for_state(&mut bridge, &out, |s| {
        s.motors.get(&1).is_some_and(|m| m.spinning)
            && s.pneumatics.get(&3).is_some_and(|p| p.extended)
    });
    assert_eq!(moving.motors[&1].speed, 75.0);
    assert!(moving.pneumatics[&3].pump);
}

#[test]
fn test_bad_lines_are_dropped() {
    let out = SharedBuf::default();
    let mut bridge = IpcBridge::new(fast_config(), out.clone());
    bridge
        .startup(&Project::from_source("let m = Motor(PORT2);"))
        .unwrap();

    assert!(bridge.handle_line("not json").is_err());
    assert!(bridge.handle_line(r#"{"dt":1}"#).is_err());
    assert!(bridge.handle_line(r#"{"type":"launch"}"#).is_err());
    assert!(bridge.handle_line("").is_ok());

    // Still serving afterwards.
    bridge.handle_line(r#"{"type":"tick"}"#).unwrap();
    assert!(out.last_state().is_some());
}

#[test]
fn test_compile_error_still_serves_ticks() {
    let out = SharedBuf::default();
    let mut bridge = IpcBridge::new(fast_config(), out.clone());
    bridge.startup(&Project::from_source("let = ;")).unwrap();

    bridge.handle_line(r#"{"type":"tick","dt":0.1}"#).unwrap();
    let messages = out.messages();
    assert!(matches!(messages[0], BridgeMessage::Ready(_)));
    assert!(matches!(messages[1], BridgeMessage::Error { .. }));
    match &messages[2] {
        BridgeMessage::State(state) => assert!(state.motors.is_empty()),
        other => panic!("expected state, got {other:?}"),
    }
}

#[test]
fn test_run_stops_on_shutdown_message() {
    let out = SharedBuf::default();
    let mut bridge = IpcBridge::new(fast_config(), out.clone());
    bridge
        .startup(&Project::from_source("let m = Motor(PORT4);"))
        .unwrap();

    // Give the script time to register its motor.
    thread::sleep(Duration::from_millis(100));
    let input = Cursor::new(
        "{\"type\":\"tick\"}\n{\"type\":\"shutdown\"}\n{\"type\":\"tick\"}\n".to_string(),
    );
    bridge.run(input).unwrap();

    let messages = out.messages();
    assert_eq!(messages.last(), Some(&BridgeMessage::Shutdown));
    let states = messages
        .iter()
        .filter(|m| matches!(m, BridgeMessage::State(_)))
        .count();
    assert_eq!(states, 1);
    assert!(messages.contains(&BridgeMessage::status(STATUS_FINISHED)));
    assert!(!bridge.running_flag().load(std::sync::atomic::Ordering::SeqCst));
}

#[test]
fn test_run_stops_at_end_of_input() {
    let out = SharedBuf::default();
    let mut bridge = IpcBridge::new(fast_config(), out.clone());
    bridge.startup(&Project::from_source("")).unwrap();
    bridge.run(Cursor::new(String::new())).unwrap();
    assert_eq!(out.messages().last(), Some(&BridgeMessage::Shutdown));
}
