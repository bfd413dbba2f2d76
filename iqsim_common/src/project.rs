//! Project file model and parser.
//!
//! A project file (`.iqpython`) is a JSON document carrying the raw script
//! source in `textContent` and a device-declaration list in `robotConfig`.
//! The simulator only needs the script text to run; the declarations are used
//! to pre-populate host-side indicators and for the startup summary.
//!
//! Files whose content is not a JSON object are treated as a bare script.

use serde::Deserialize;
use serde_json::{Map, Value};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use crate::consts::{
    DEFAULT_PROJECT_NAME, DEFAULT_TRACK_WIDTH_MM, DEFAULT_WHEEL_TRAVEL_MM, DEFAULT_WHEELBASE_MM,
    PROJECT_EXTENSION,
};

/// Errors raised while reading a project file.
#[derive(Debug, Error)]
pub enum ProjectError {
    /// The file could not be read.
    #[error("failed to read project file {path:?}: {source}")]
    Io {
        /// Path that was read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The file looked like JSON but did not parse.
    #[error("invalid project JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Controller drive mapping declared in the project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DriveMode {
    /// Left stick drives, right stick turns.
    #[default]
    Split,
    /// Arcade on the left stick.
    Left,
    /// Arcade on the right stick.
    Right,
    /// Each stick drives one side.
    Tank,
}

impl DriveMode {
    fn parse(value: &str) -> Self {
        match value {
            "left" => Self::Left,
            "right" => Self::Right,
            "tank" => Self::Tank,
            _ => Self::Split,
        }
    }

    /// Human-readable stick assignment.
    pub fn describe(&self) -> &'static [&'static str] {
        match self {
            Self::Split => &["Left stick (A): Forward/Back", "Right stick (C): Turn Left/Right"],
            Self::Left => &["Left stick: Arcade (A=turn, B=drive)"],
            Self::Right => &["Right stick: Arcade (C=turn, D=drive)"],
            Self::Tank => &["Left stick (B): Left motors", "Right stick (D): Right motors"],
        }
    }
}

/// Standalone motor declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct MotorDecl {
    /// Smart port.
    pub port: u8,
    /// Display name.
    pub name: String,
    /// Mounting-reversed flag.
    pub reversed: bool,
}

/// Drivetrain declaration with geometry recovered from settings.
#[derive(Debug, Clone, PartialEq)]
pub struct DrivetrainDecl {
    /// Display name.
    pub name: String,
    /// Left side ports.
    pub left_ports: Vec<u8>,
    /// Right side ports.
    pub right_ports: Vec<u8>,
    /// Wheel travel (mm).
    pub wheel_travel: f64,
    /// Track width (mm).
    pub track_width: f64,
    /// Wheelbase (mm).
    pub wheelbase: f64,
    /// External gear ratio.
    pub gear_ratio: f64,
    /// `true` for the 4-motor variant.
    pub four_motor: bool,
}

/// Controller declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerDecl {
    /// Display name.
    pub name: String,
    /// Drive mapping.
    pub drive_mode: DriveMode,
}

/// Motor group declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct MotorGroupDecl {
    /// Display name.
    pub name: String,
    /// Member ports in order.
    pub ports: Vec<u8>,
    /// Second member mounted reversed.
    pub motor_b_reversed: bool,
}

/// Pneumatic cylinder declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct PneumaticDecl {
    /// Smart port.
    pub port: u8,
    /// Display name.
    pub name: String,
}

/// All device declarations found in a project.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RobotConfig {
    /// Standalone motors.
    pub motors: Vec<MotorDecl>,
    /// Drivetrain, if declared.
    pub drivetrain: Option<DrivetrainDecl>,
    /// Controller, if declared.
    pub controller: Option<ControllerDecl>,
    /// Motor groups.
    pub motor_groups: Vec<MotorGroupDecl>,
    /// Pneumatic cylinders.
    pub pneumatics: Vec<PneumaticDecl>,
}

impl RobotConfig {
    /// `true` when the project declares no devices at all.
    pub fn is_empty(&self) -> bool {
        self.motors.is_empty()
            && self.drivetrain.is_none()
            && self.controller.is_none()
            && self.motor_groups.is_empty()
            && self.pneumatics.is_empty()
    }
}

/// A loaded project: script source plus declarations.
#[derive(Debug, Clone, PartialEq)]
pub struct Project {
    /// Project name (from the `Project:` script comment).
    pub name: String,
    /// Target brain generation.
    pub brain_gen: String,
    /// Raw script source.
    pub source: String,
    /// Device declarations.
    pub robot: RobotConfig,
    /// Where the project was loaded from, if anywhere.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct RawProject {
    #[serde(rename = "textContent", default)]
    text_content: String,
    #[serde(rename = "targetBrainGen", default = "default_brain_gen")]
    target_brain_gen: String,
    #[serde(rename = "robotConfig", default)]
    robot_config: Vec<RawDevice>,
}

#[derive(Debug, Deserialize)]
struct RawDevice {
    #[serde(rename = "deviceType", default)]
    device_type: String,
    #[serde(default = "default_device_name")]
    name: String,
    #[serde(default)]
    port: Vec<u8>,
    #[serde(default)]
    setting: Map<String, Value>,
}

fn default_brain_gen() -> String {
    "Second".to_string()
}

fn default_device_name() -> String {
    "unknown".to_string()
}

impl Project {
    /// Build a project directly from script source with no declarations.
    pub fn from_source(source: impl Into<String>) -> Self {
        let source = source.into();
        Self {
            name: project_name_from_source(&source),
            brain_gen: default_brain_gen(),
            source,
            robot: RobotConfig::default(),
            path: None,
        }
    }

    /// Parse project file content.
    pub fn parse(content: &str) -> Result<Self, ProjectError> {
        let trimmed = content.trim_start();
        if !trimmed.starts_with('{') {
            return Ok(Self::from_source(content));
        }

        let raw: RawProject = serde_json::from_str(trimmed)?;
        let robot = parse_devices(&raw.robot_config);

        Ok(Self {
            name: project_name_from_source(&raw.text_content),
            brain_gen: raw.target_brain_gen,
            source: raw.text_content,
            robot,
            path: None,
        })
    }

    /// Read and parse a project file.
    pub fn load(path: &Path) -> Result<Self, ProjectError> {
        let content = fs::read_to_string(path).map_err(|source| ProjectError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut project = Self::parse(&content)?;
        project.path = Some(path.to_path_buf());
        debug!(
            path = %path.display(),
            name = %project.name,
            script_bytes = project.source.len(),
            "Loaded project"
        );
        Ok(project)
    }

    /// Multi-line human-readable summary of the robot.
    pub fn describe(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Robot: {}", self.name);
        let _ = writeln!(out, "Brain Generation: {}", self.brain_gen);

        if let Some(dt) = &self.robot.drivetrain {
            let _ = writeln!(out, "Drivetrain:");
            let _ = writeln!(
                out,
                "  Type: {}",
                if dt.four_motor { "4-motor" } else { "2-motor" }
            );
            let _ = writeln!(out, "  Left motor(s): Port {}", join_ports(&dt.left_ports));
            let _ = writeln!(out, "  Right motor(s): Port {}", join_ports(&dt.right_ports));
            let _ = writeln!(out, "  Wheel size: {}mm", dt.wheel_travel);
            let _ = writeln!(out, "  Track width: {}mm", dt.track_width);
            let _ = writeln!(out, "  Gear ratio: {}:1", dt.gear_ratio);
        }

        if let Some(ctrl) = &self.robot.controller {
            let _ = writeln!(out, "Controller: {}", ctrl.name);
            for line in ctrl.drive_mode.describe() {
                let _ = writeln!(out, "  {line}");
            }
        }

        if !self.robot.motors.is_empty() {
            let _ = writeln!(out, "Additional Motors:");
            for motor in &self.robot.motors {
                let rev = if motor.reversed { " (reversed)" } else { "" };
                let _ = writeln!(out, "  {}: Port {}{}", motor.name, motor.port, rev);
            }
        }

        if !self.robot.motor_groups.is_empty() {
            let _ = writeln!(out, "Motor Groups:");
            for group in &self.robot.motor_groups {
                let ports: Vec<String> = group.ports.iter().map(|p| format!("P{p}")).collect();
                let rev = if group.motor_b_reversed { " (B reversed)" } else { "" };
                let _ = writeln!(out, "  {}: {}{}", group.name, ports.join(", "), rev);
            }
        }

        if !self.robot.pneumatics.is_empty() {
            let _ = writeln!(out, "Pneumatics:");
            for pn in &self.robot.pneumatics {
                let _ = writeln!(out, "  {}: Port {}", pn.name, pn.port);
            }
        }

        out
    }
}

/// Find the first project file in `dir`, by file name order.
pub fn find_project_file(dir: &Path) -> Option<PathBuf> {
    let mut found: Vec<PathBuf> = fs::read_dir(dir)
        .ok()?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file()
                && path.extension().and_then(|ext| ext.to_str()) == Some(PROJECT_EXTENSION)
        })
        .collect();
    found.sort();
    found.into_iter().next()
}

fn parse_devices(devices: &[RawDevice]) -> RobotConfig {
    let mut robot = RobotConfig::default();

    for device in devices {
        let ports = &device.port;
        let settings = &device.setting;

        match device.device_type.as_str() {
            "Motor" => {
                if let Some(&port) = ports.first() {
                    robot.motors.push(MotorDecl {
                        port,
                        name: device.name.clone(),
                        reversed: setting_flag(settings, "reversed"),
                    });
                }
            }
            "Drivetrain" => {
                robot.drivetrain = Some(parse_drivetrain(device));
            }
            "Controller" => {
                robot.controller = Some(ControllerDecl {
                    name: device.name.clone(),
                    drive_mode: DriveMode::parse(
                        setting_str(settings, "drive").as_deref().unwrap_or("split"),
                    ),
                });
            }
            "MotorGroup" => {
                robot.motor_groups.push(MotorGroupDecl {
                    name: device.name.clone(),
                    ports: ports.clone(),
                    motor_b_reversed: setting_flag(settings, "motor_b_reversed"),
                });
            }
            "Pneumatic" => {
                if let Some(&port) = ports.first() {
                    robot.pneumatics.push(PneumaticDecl {
                        port,
                        name: device.name.clone(),
                    });
                }
            }
            _ => {}
        }
    }

    robot
}

fn parse_drivetrain(device: &RawDevice) -> DrivetrainDecl {
    let ports = &device.port;
    let settings = &device.setting;
    let drive_type = setting_str(settings, "type").unwrap_or_else(|| "2-motor".to_string());
    let four_motor = drive_type == "4-motor";

    // Ports are [L, R, gyro] for 2-motor and [L1, L2, R1, R2, gyro] for 4-motor.
    let (left_ports, right_ports) = if four_motor && ports.len() >= 4 {
        (vec![ports[0], ports[1]], vec![ports[2], ports[3]])
    } else if !four_motor && ports.len() >= 2 {
        (vec![ports[0]], vec![ports[1]])
    } else {
        (
            vec![ports.first().copied().unwrap_or(1)],
            vec![ports.get(1).copied().unwrap_or(2)],
        )
    };

    DrivetrainDecl {
        name: device.name.clone(),
        left_ports,
        right_ports,
        wheel_travel: setting_str(settings, "wheelSize")
            .and_then(|s| parse_leading_number(&s))
            .unwrap_or(DEFAULT_WHEEL_TRAVEL_MM),
        track_width: setting_str(settings, "width")
            .and_then(|s| parse_leading_number(&s))
            .unwrap_or(DEFAULT_TRACK_WIDTH_MM),
        wheelbase: setting_str(settings, "wheelbase")
            .and_then(|s| parse_leading_number(&s))
            .unwrap_or(DEFAULT_WHEELBASE_MM),
        gear_ratio: setting_str(settings, "gearRatio")
            .map(|s| parse_gear_ratio(&s))
            .unwrap_or(1.0),
        four_motor,
    }
}

/// Read a setting as text; numbers and booleans are stringified.
fn setting_str(settings: &Map<String, Value>, key: &str) -> Option<String> {
    match settings.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn setting_flag(settings: &Map<String, Value>, key: &str) -> bool {
    setting_str(settings, key).as_deref() == Some("true")
}

/// Keep digits and dots, e.g. `"200mm"` -> 200.
fn parse_leading_number(value: &str) -> Option<f64> {
    let digits: String = value
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    digits.parse().ok()
}

/// `"2:1"` -> 2.0; anything unparsable is 1:1.
fn parse_gear_ratio(value: &str) -> f64 {
    let Some((num, den)) = value.split_once(':') else {
        return 1.0;
    };
    match (num.trim().parse::<f64>(), den.trim().parse::<f64>()) {
        (Ok(num), Ok(den)) if den != 0.0 => num / den,
        _ => 1.0,
    }
}

fn project_name_from_source(source: &str) -> String {
    source
        .lines()
        .find_map(|line| line.split("Project:").nth(1).map(|rest| rest.trim().to_string()))
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| DEFAULT_PROJECT_NAME.to_string())
}

fn join_ports(ports: &[u8]) -> String {
    ports
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{NamedTempFile, tempdir};

    const CLAWBOT: &str = r#"{
        "mode": "Text",
        "textContent": "// Project: Clawbot\nlet m = Motor(PORT1);\n",
        "targetBrainGen": "Second",
        "robotConfig": [
            {"deviceType": "Drivetrain", "name": "drivetrain", "port": [1, 6, 0],
             "setting": {"type": "2-motor", "wheelSize": "200mm", "gearRatio": "2:1",
                         "width": "295", "wheelbase": 40}},
            {"deviceType": "Motor", "name": "arm", "port": [4], "setting": {"reversed": "true"}},
            {"deviceType": "MotorGroup", "name": "lift", "port": [10, 11],
             "setting": {"motor_b_reversed": "true"}},
            {"deviceType": "Pneumatic", "name": "claw", "port": [9], "setting": {}},
            {"deviceType": "Controller", "name": "controller_1", "port": [],
             "setting": {"drive": "tank"}},
            {"deviceType": "BumperSwitch", "name": "bumper", "port": [7], "setting": {}}
        ]
    }"#;

    #[test]
    fn test_parse_full_project() {
        let project = Project::parse(CLAWBOT).unwrap();
        assert_eq!(project.name, "Clawbot");
        assert_eq!(project.brain_gen, "Second");
        assert!(project.source.contains("Motor(PORT1)"));

        let dt = project.robot.drivetrain.as_ref().unwrap();
        assert_eq!(dt.left_ports, vec![1]);
        assert_eq!(dt.right_ports, vec![6]);
        assert_eq!(dt.wheel_travel, 200.0);
        assert_eq!(dt.track_width, 295.0);
        assert_eq!(dt.wheelbase, 40.0);
        assert_eq!(dt.gear_ratio, 2.0);
        assert!(!dt.four_motor);

        assert_eq!(
            project.robot.motors,
            vec![MotorDecl {
                port: 4,
                name: "arm".to_string(),
                reversed: true
            }]
        );
        assert_eq!(project.robot.motor_groups[0].ports, vec![10, 11]);
        assert!(project.robot.motor_groups[0].motor_b_reversed);
        assert_eq!(project.robot.pneumatics[0].port, 9);
        assert_eq!(
            project.robot.controller.as_ref().unwrap().drive_mode,
            DriveMode::Tank
        );
    }

    #[test]
    fn test_four_motor_drivetrain_ports() {
        let content = r#"{"textContent": "", "robotConfig": [
            {"deviceType": "Drivetrain", "name": "dt", "port": [1, 2, 5, 6, 0],
             "setting": {"type": "4-motor"}}]}"#;
        let project = Project::parse(content).unwrap();
        let dt = project.robot.drivetrain.unwrap();
        assert!(dt.four_motor);
        assert_eq!(dt.left_ports, vec![1, 2]);
        assert_eq!(dt.right_ports, vec![5, 6]);
        assert_eq!(dt.track_width, DEFAULT_TRACK_WIDTH_MM);
        assert_eq!(dt.gear_ratio, 1.0);
    }

    #[test]
    fn test_bare_script_is_legacy_format() {
        let project = Project::parse("let x = 1;\n").unwrap();
        assert_eq!(project.source, "let x = 1;\n");
        assert_eq!(project.name, DEFAULT_PROJECT_NAME);
        assert!(project.robot.is_empty());
    }

    #[test]
    fn test_invalid_json_is_error() {
        assert!(matches!(
            Project::parse("{ not json"),
            Err(ProjectError::Json(_))
        ));
    }

    #[test]
    fn test_gear_ratio_parsing() {
        assert_eq!(parse_gear_ratio("3:1"), 3.0);
        assert_eq!(parse_gear_ratio("1:2"), 0.5);
        assert_eq!(parse_gear_ratio("1:0"), 1.0);
        assert_eq!(parse_gear_ratio("fast"), 1.0);
    }

    #[test]
    fn test_load_from_file_and_missing() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{CLAWBOT}").unwrap();
        file.flush().unwrap();

        let project = Project::load(file.path()).unwrap();
        assert_eq!(project.path.as_deref(), Some(file.path()));

        let missing = Project::load(Path::new("/nonexistent/robot.iqpython"));
        assert!(matches!(missing, Err(ProjectError::Io { .. })));
    }

    #[test]
    fn test_find_project_file() {
        let dir = tempdir().unwrap();
        assert!(find_project_file(dir.path()).is_none());

        fs::write(dir.path().join("notes.txt"), "x").unwrap();
        fs::write(dir.path().join("b.iqpython"), "{}").unwrap();
        fs::write(dir.path().join("a.iqpython"), "{}").unwrap();

        let found = find_project_file(dir.path()).unwrap();
        assert_eq!(found.file_name().unwrap(), "a.iqpython");
    }

    #[test]
    fn test_describe_mentions_devices() {
        let project = Project::parse(CLAWBOT).unwrap();
        let text = project.describe();
        assert!(text.contains("Robot: Clawbot"));
        assert!(text.contains("Left motor(s): Port 1"));
        assert!(text.contains("arm: Port 4 (reversed)"));
        assert!(text.contains("lift: P10, P11 (B reversed)"));
        assert!(text.contains("claw: Port 9"));
    }
}
