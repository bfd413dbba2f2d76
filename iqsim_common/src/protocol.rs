//! Line-delimited JSON protocol between a host process and the bridge.
//!
//! Every message is a single JSON object on its own line, discriminated by a
//! `type` field. Unknown fields inside a known message are ignored so either
//! side can add fields without breaking the other.
//!
//! # Host to bridge
//!
//! ```text
//! {"type":"gamepad","axes":{"A":0,"B":0,"C":0,"D":0},"buttons":{"LUp":false,...}}
//! {"type":"tick","dt":0.016}
//! {"type":"shutdown"}
//! ```
//!
//! # Bridge to host
//!
//! ```text
//! {"type":"ready","project":"...","motors":[...],"motor_groups":[...],"pneumatics":[...]}
//! {"type":"state","motors":{"1":{"speed":0.0,"spinning":false,"position":0.0}},"pneumatics":{}}
//! {"type":"status","message":"..."}
//! {"type":"error","message":"..."}
//! {"type":"shutdown"}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::consts::{AXIS_MAX, AXIS_MIN};
use crate::project::Project;

/// Protocol faults. None of them tear the connection down.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProtocolError {
    /// The line is not valid JSON.
    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    /// The object has no string `type` field.
    #[error("message has no type")]
    MissingType,

    /// The `type` is not one this side understands.
    #[error("unknown message type: {0}")]
    UnknownType(String),

    /// A known message type with a malformed body.
    #[error("invalid {kind} payload: {reason}")]
    InvalidPayload {
        /// Message type.
        kind: String,
        /// Decoder error text.
        reason: String,
    },

    /// Serialization of an outgoing message failed.
    #[error("failed to encode message: {0}")]
    Encode(String),
}

// ─── Host → Bridge ──────────────────────────────────────────────────

/// Raw analog axis values as sent by the host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Axes {
    /// Axis A.
    #[serde(rename = "A")]
    pub a: f64,
    /// Axis B.
    #[serde(rename = "B")]
    pub b: f64,
    /// Axis C.
    #[serde(rename = "C")]
    pub c: f64,
    /// Axis D.
    #[serde(rename = "D")]
    pub d: f64,
}

impl Axes {
    /// Axis values in A..D order, rounded and clamped to the axis range.
    pub fn clamped(&self) -> [i32; 4] {
        [self.a, self.b, self.c, self.d].map(clamp_axis)
    }
}

fn clamp_axis(value: f64) -> i32 {
    if value.is_nan() {
        return 0;
    }
    (value.round() as i64).clamp(i64::from(AXIS_MIN), i64::from(AXIS_MAX)) as i32
}

/// Digital button states as sent by the host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Buttons {
    /// L-Up.
    #[serde(rename = "LUp")]
    pub l_up: bool,
    /// L-Down.
    #[serde(rename = "LDown")]
    pub l_down: bool,
    /// R-Up.
    #[serde(rename = "RUp")]
    pub r_up: bool,
    /// R-Down.
    #[serde(rename = "RDown")]
    pub r_down: bool,
    /// E-Up.
    #[serde(rename = "EUp")]
    pub e_up: bool,
    /// E-Down.
    #[serde(rename = "EDown")]
    pub e_down: bool,
    /// F-Up.
    #[serde(rename = "FUp")]
    pub f_up: bool,
    /// F-Down.
    #[serde(rename = "FDown")]
    pub f_down: bool,
}

impl Buttons {
    /// Button states in LUp, LDown, RUp, RDown, EUp, EDown, FUp, FDown order.
    pub fn as_array(&self) -> [bool; 8] {
        [
            self.l_up,
            self.l_down,
            self.r_up,
            self.r_down,
            self.e_up,
            self.e_down,
            self.f_up,
            self.f_down,
        ]
    }
}

/// Full controller input snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GamepadInput {
    /// Analog axes.
    pub axes: Axes,
    /// Digital buttons.
    pub buttons: Buttons,
}

/// Messages a host sends to the bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostMessage {
    /// Overwrite controller state.
    Gamepad(GamepadInput),
    /// Request a state snapshot.
    Tick {
        /// Host frame time in seconds; informational only.
        #[serde(default)]
        dt: f64,
    },
    /// Stop the bridge.
    Shutdown,
}

const HOST_MESSAGE_TYPES: &[&str] = &["gamepad", "tick", "shutdown"];

/// Parse one host line, classifying failures.
pub fn parse_host_line(line: &str) -> Result<HostMessage, ProtocolError> {
    let value: Value =
        serde_json::from_str(line).map_err(|e| ProtocolError::InvalidJson(e.to_string()))?;

    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or(ProtocolError::MissingType)?
        .to_string();

    if !HOST_MESSAGE_TYPES.contains(&kind.as_str()) {
        return Err(ProtocolError::UnknownType(kind));
    }

    serde_json::from_value(value).map_err(|e| ProtocolError::InvalidPayload {
        kind,
        reason: e.to_string(),
    })
}

// ─── Bridge → Host ──────────────────────────────────────────────────

/// A declared single-port device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceEntry {
    /// Smart port.
    pub port: u8,
    /// Display name.
    pub name: String,
}

/// A declared motor group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MotorGroupEntry {
    /// Display name.
    pub name: String,
    /// Member ports.
    pub ports: Vec<u8>,
}

/// Startup announcement listing declared devices.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadyMessage {
    /// Project name.
    pub project: String,
    /// Declared standalone motors.
    #[serde(default)]
    pub motors: Vec<DeviceEntry>,
    /// Declared motor groups.
    #[serde(default)]
    pub motor_groups: Vec<MotorGroupEntry>,
    /// Declared pneumatics.
    #[serde(default)]
    pub pneumatics: Vec<DeviceEntry>,
}

impl ReadyMessage {
    /// Build the announcement from a project's declarations.
    pub fn from_project(project: &Project) -> Self {
        Self {
            project: project.name.clone(),
            motors: project
                .robot
                .motors
                .iter()
                .map(|m| DeviceEntry {
                    port: m.port,
                    name: m.name.clone(),
                })
                .collect(),
            motor_groups: project
                .robot
                .motor_groups
                .iter()
                .map(|g| MotorGroupEntry {
                    name: g.name.clone(),
                    ports: g.ports.clone(),
                })
                .collect(),
            pneumatics: project
                .robot
                .pneumatics
                .iter()
                .map(|p| DeviceEntry {
                    port: p.port,
                    name: p.name.clone(),
                })
                .collect(),
        }
    }

    /// Total declared device count.
    pub fn device_count(&self) -> usize {
        self.motors.len() + self.motor_groups.len() + self.pneumatics.len()
    }
}

/// Per-motor telemetry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MotorTelemetry {
    /// Actual (shaft) velocity in percent.
    pub speed: f64,
    /// Spinning flag.
    pub spinning: bool,
    /// Shaft position in degrees.
    pub position: f64,
}

/// Per-pneumatic telemetry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PneumaticTelemetry {
    /// Cylinder extended.
    pub extended: bool,
    /// Pump running.
    pub pump: bool,
}

/// Device state snapshot, keyed by port.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateMessage {
    /// Motors by port.
    #[serde(default, deserialize_with = "port_keys::deserialize")]
    pub motors: BTreeMap<u8, MotorTelemetry>,
    /// Pneumatics by port.
    #[serde(default, deserialize_with = "port_keys::deserialize")]
    pub pneumatics: BTreeMap<u8, PneumaticTelemetry>,
}

/// Port maps travel with string keys (`"1"`). Inside the tagged
/// `BridgeMessage` the keys must be read as text and parsed by hand.
mod port_keys {
    use serde::de::{Deserialize, Deserializer, Error};
    use std::collections::BTreeMap;

    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<BTreeMap<u8, T>, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de>,
    {
        BTreeMap::<String, T>::deserialize(deserializer)?
            .into_iter()
            .map(|(key, value)| {
                key.parse::<u8>()
                    .map(|port| (port, value))
                    .map_err(|_| D::Error::custom(format!("invalid port key {key:?}")))
            })
            .collect()
    }
}

/// Messages the bridge sends to the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeMessage {
    /// Startup announcement.
    Ready(ReadyMessage),
    /// Reply to a tick.
    State(StateMessage),
    /// Informational status text.
    Status {
        /// Status text.
        message: String,
    },
    /// Script fault text.
    Error {
        /// Error text.
        message: String,
    },
    /// Final message before exit.
    Shutdown,
}

impl BridgeMessage {
    /// Status message helper.
    pub fn status(message: impl Into<String>) -> Self {
        Self::Status {
            message: message.into(),
        }
    }

    /// Error message helper.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

/// Parse one bridge line.
pub fn parse_bridge_line(line: &str) -> Result<BridgeMessage, ProtocolError> {
    serde_json::from_str(line).map_err(|e| ProtocolError::InvalidJson(e.to_string()))
}

/// Encode any protocol message as a single line, without the newline.
pub fn to_line<T: Serialize>(message: &T) -> Result<String, ProtocolError> {
    serde_json::to_string(message).map_err(|e| ProtocolError::Encode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_gamepad_with_missing_fields() {
        let msg = parse_host_line(r#"{"type":"gamepad","axes":{"A":100},"buttons":{"EUp":true}}"#)
            .unwrap();
        let HostMessage::Gamepad(input) = msg else {
            panic!("expected gamepad, got {msg:?}");
        };
        assert_eq!(input.axes.clamped(), [100, 0, 0, 0]);
        assert!(input.buttons.e_up);
        assert!(!input.buttons.l_up);
    }

    #[test]
    fn test_axes_round_and_clamp() {
        let axes = Axes {
            a: 150.0,
            b: -250.0,
            c: 49.6,
            d: f64::NAN,
        };
        assert_eq!(axes.clamped(), [100, -100, 50, 0]);
    }

    #[test]
    fn test_parse_tick_and_shutdown() {
        assert_eq!(
            parse_host_line(r#"{"type":"tick","dt":0.016}"#).unwrap(),
            HostMessage::Tick { dt: 0.016 }
        );
        assert_eq!(
            parse_host_line(r#"{"type":"tick"}"#).unwrap(),
            HostMessage::Tick { dt: 0.0 }
        );
        assert_eq!(
            parse_host_line(r#"{"type":"shutdown","reason":"bye"}"#).unwrap(),
            HostMessage::Shutdown
        );
    }

    #[test]
    fn test_error_classification() {
        assert!(matches!(
            parse_host_line("not json"),
            Err(ProtocolError::InvalidJson(_))
        ));
        assert_eq!(
            parse_host_line(r#"{"dt":1}"#),
            Err(ProtocolError::MissingType)
        );
        assert_eq!(
            parse_host_line(r#"{"type":"launch"}"#),
            Err(ProtocolError::UnknownType("launch".to_string()))
        );
        assert!(matches!(
            parse_host_line(r#"{"type":"tick","dt":"soon"}"#),
            Err(ProtocolError::InvalidPayload { .. })
        ));
    }

    #[test]
    fn test_state_message_uses_string_port_keys() {
        let mut state = StateMessage::default();
        state.motors.insert(
            1,
            MotorTelemetry {
                speed: 0.0,
                spinning: false,
                position: 0.0,
            },
        );
        let line = to_line(&BridgeMessage::State(state)).unwrap();
        let value: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["type"], "state");
        assert_eq!(value["motors"]["1"]["speed"], 0.0);
        assert_eq!(value["motors"]["1"]["spinning"], false);
    }

    #[test]
    fn test_state_message_decodes_from_its_own_line() {
        let mut state = StateMessage::default();
        state.motors.insert(
            1,
            MotorTelemetry {
                speed: -40.0,
                spinning: true,
                position: 90.0,
            },
        );
        state.pneumatics.insert(
            12,
            PneumaticTelemetry {
                extended: true,
                pump: false,
            },
        );
        let message = BridgeMessage::State(state);

        let line = to_line(&message).unwrap();
        assert_eq!(parse_bridge_line(&line).unwrap(), message);
    }

    #[test]
    fn test_state_message_rejects_non_numeric_port() {
        let line = concat!(
            r#"{"type":"state","#,
            r#""motors":{"left":{"speed":0,"spinning":false,"position":0}}}"#
        );
        assert!(matches!(
            parse_bridge_line(line),
            Err(ProtocolError::InvalidJson(_))
        ));
    }

    #[test]
    fn test_ready_from_empty_project() {
        let project = Project::from_source("");
        let ready = ReadyMessage::from_project(&project);
        assert_eq!(ready.device_count(), 0);

        let line = to_line(&BridgeMessage::Ready(ready)).unwrap();
        assert!(line.starts_with(r#"{"type":"ready""#));
        assert!(!line.contains('\n'));
    }

    #[test]
    fn test_parse_bridge_status() {
        let msg = parse_bridge_line(r#"{"type":"status","message":"Robot code starting"}"#).unwrap();
        assert_eq!(msg, BridgeMessage::status("Robot code starting"));
    }
}
