//! Round trip against the real `iqsim_bridge` binary.

use iqsim_common::protocol::{Axes, BridgeMessage, GamepadInput, parse_bridge_line};
use iqsim_core::client::BridgeClient;
use std::fs;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

const TIMEOUT: Duration = Duration::from_secs(10);

fn bridge_exe() -> &'static Path {
    Path::new(env!("CARGO_BIN_EXE_iqsim_bridge"))
}

fn write_project(dir: &TempDir, script: &str) -> std::path::PathBuf {
    let project = serde_json::json!({
        "textContent": script,
        "targetBrainGen": "Second",
        "robotConfig": [
            {"deviceType": "Motor", "name": "left", "port": [1], "setting": {}}
        ]
    });
    let path = dir.path().join("robot.iqpython");
    fs::write(&path, project.to_string()).unwrap();
    path
}

#[test]
fn test_tick_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = write_project(
        &dir,
        "// Project: Round Trip\nlet m = Motor(PORT1);\nlet c = Controller();\nwhile c.axisB.position() == 0 { wait(5); }\nm.set_velocity(c.axisB.position());\nm.spin(REVERSE);\n",
    );

    let mut client = BridgeClient::spawn(bridge_exe(), [&path]).unwrap();

    match client.recv_timeout(TIMEOUT) {
        Some(BridgeMessage::Ready(ready)) => {
            assert_eq!(ready.project, "Round Trip");
            assert_eq!(ready.motors[0].port, 1);
        }
        other => panic!("expected ready, got {other:?}"),
    }

    // Poll until the script has constructed its motor.
    let mut idle = None;
    for _ in 0..200 {
        client.send_tick(0.016).unwrap();
        if let Some(BridgeMessage::State(state)) =
            client.wait_for(|m| matches!(m, BridgeMessage::State(_)), TIMEOUT)
        {
            if state.motors.contains_key(&1) {
                idle = Some(state);
                break;
            }
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    let idle = idle.expect("motor 1 never reported");
    assert_eq!(idle.motors[&1].speed, 0.0);

    client
        .send_gamepad(GamepadInput {
            axes: Axes {
                b: 40.0,
                ..Axes::default()
            },
            ..GamepadInput::default()
        })
        .unwrap();
    assert!(
        client
            .wait_for(
                |m| matches!(m, BridgeMessage::Status { message } if message == "Robot code finished"),
                TIMEOUT
            )
            .is_some()
    );

    client.send_tick(0.016).unwrap();
    match client.wait_for(|m| matches!(m, BridgeMessage::State(_)), TIMEOUT) {
        Some(BridgeMessage::State(state)) => {
            assert_eq!(state.motors[&1].speed, -40.0);
            assert!(state.motors[&1].spinning);
        }
        other => panic!("expected state, got {other:?}"),
    }

    client.send_shutdown().unwrap();
    assert_eq!(
        client.wait_for(|m| *m == BridgeMessage::Shutdown, TIMEOUT),
        Some(BridgeMessage::Shutdown)
    );
    assert_eq!(client.finish(TIMEOUT).unwrap(), Some(0));
}

#[test]
fn test_closed_input_shuts_down() {
    let dir = TempDir::new().unwrap();
    let path = write_project(&dir, "let m = Motor(PORT1);");

    let mut client = BridgeClient::spawn(bridge_exe(), [&path]).unwrap();
    assert!(matches!(
        client.recv_timeout(TIMEOUT),
        Some(BridgeMessage::Ready(_))
    ));
    client.close_input();
    assert!(
        client
            .wait_for(|m| *m == BridgeMessage::Shutdown, TIMEOUT)
            .is_some()
    );
    assert_eq!(client.finish(TIMEOUT).unwrap(), Some(0));
}

#[test]
fn test_missing_project_exits_with_error() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("nope.iqpython");
    let client = BridgeClient::spawn(bridge_exe(), [&missing]).unwrap();
    assert_eq!(client.recv_timeout(Duration::from_secs(5)), None);
    assert_eq!(client.finish(TIMEOUT).unwrap(), Some(1));
}

#[test]
fn test_stdout_carries_only_protocol_lines() {
    let dir = TempDir::new().unwrap();
    let path = write_project(
        &dir,
        "print(\"hello from script\");\ndebug(\"debug from script\");\nlet brain = Brain();\nbrain.screen.print(\"on screen\", 7);\nlet m = Motor(PORT1);\n",
    );

    let mut child = Command::new(bridge_exe())
        .arg(&path)
        .arg("--verbose")
        .env_remove("RUST_LOG")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();
    let mut stdin = child.stdin.take().unwrap();
    let stdout = child.stdout.take().unwrap();
    let mut stderr = child.stderr.take().unwrap();

    let (tx, rx) = mpsc::channel();
    let reader = thread::spawn(move || {
        for line in BufReader::new(stdout).lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    let stderr_reader = thread::spawn(move || {
        let mut text = String::new();
        stderr.read_to_string(&mut text).unwrap();
        text
    });

    let mut lines = Vec::new();
    let deadline = Instant::now() + TIMEOUT;
    while !lines.iter().any(|l: &String| l.contains("Robot code finished")) {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match rx.recv_timeout(remaining) {
            Ok(line) => lines.push(line),
            Err(e) => panic!("script never finished ({e}); got {lines:?}"),
        }
    }

    writeln!(stdin, r#"{{"type":"tick","dt":0.016}}"#).unwrap();
    writeln!(stdin, r#"{{"type":"shutdown"}}"#).unwrap();
    drop(stdin);
    lines.extend(rx.iter());
    reader.join().unwrap();
    assert!(child.wait().unwrap().success());
    let stderr = stderr_reader.join().unwrap();

    let messages: Vec<BridgeMessage> = lines
        .iter()
        .map(|line| {
            parse_bridge_line(line).unwrap_or_else(|e| panic!("stray stdout line {line:?}: {e}"))
        })
        .collect();
    assert!(matches!(messages.first(), Some(BridgeMessage::Ready(_))));
    assert!(
        messages
            .iter()
            .any(|m| matches!(m, BridgeMessage::State(s) if s.motors.contains_key(&1)))
    );
    assert_eq!(messages.last(), Some(&BridgeMessage::Shutdown));
    assert!(!messages.iter().any(|m| matches!(m, BridgeMessage::Error { .. })));

    assert!(stderr.contains("hello from script"), "{stderr}");
    assert!(stderr.contains("on screen 7"), "{stderr}");
}
