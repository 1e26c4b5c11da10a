//! `sweepline-types` – shared vocabulary of the SweepLine workspace.
//!
//! Every other crate depends on these definitions: the cardinal
//! [`Heading`] model, the [`SensorSnapshot`] decoded from the drive-board
//! telemetry, the line segments handed over by the vision collaborator, the
//! wire-level [`MotorCommand`] / [`ActuatorState`] records, terminal reports,
//! bus [`Event`]s and the workspace-wide [`SweepError`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub mod heading;

pub use heading::{Heading, Position};

// ────────────────────────────────────────────────────────────────────────────
// Sensors
// ────────────────────────────────────────────────────────────────────────────

/// Latest sensor state reported by the drive board.
///
/// Overwritten in place by the telemetry decoder; the newest reading always
/// wins.  Navigation reads this snapshot, never raw bytes.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SensorSnapshot {
    /// Front ultrasonic distance (cm).
    pub us_front: f32,
    /// Left ultrasonic distance (cm).
    pub us_left: f32,
    /// Right ultrasonic distance (cm).
    pub us_right: f32,
    /// Infrared stair-drop sensor.
    pub stair_drop: bool,
    /// Dust-bin level sensor (`false` while the bin is near full).
    pub bin_level: bool,
    /// Floor humidity sensor (`false` while moisture is detected).
    pub humidity: bool,
    /// Motor A (left) encoder position, hardware sign already corrected.
    pub encoder_a: i32,
    /// Motor B (right) encoder position, hardware sign already corrected.
    pub encoder_b: i32,
}

// ────────────────────────────────────────────────────────────────────────────
// Vision collaborator output
// ────────────────────────────────────────────────────────────────────────────

/// A line segment in processed-frame pixel coordinates (nominally 640×480).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "[i32; 4]", into = "[i32; 4]")]
pub struct LineSegment {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl LineSegment {
    pub const fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Mean of the two endpoint x-coordinates.
    pub fn mid_x(&self) -> f32 {
        (self.x1 + self.x2) as f32 / 2.0
    }

    /// Mean of the two endpoint y-coordinates.
    pub fn mid_y(&self) -> f32 {
        (self.y1 + self.y2) as f32 / 2.0
    }
}

impl From<[i32; 4]> for LineSegment {
    fn from(c: [i32; 4]) -> Self {
        Self::new(c[0], c[1], c[2], c[3])
    }
}

impl From<LineSegment> for [i32; 4] {
    fn from(s: LineSegment) -> Self {
        [s.x1, s.y1, s.x2, s.y2]
    }
}

/// The per-cycle result of line detection: at most one horizontal and one
/// vertical segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LineObservation {
    #[serde(default)]
    pub horizontal: Option<LineSegment>,
    #[serde(default)]
    pub vertical: Option<LineSegment>,
}

// ────────────────────────────────────────────────────────────────────────────
// Outbound hardware records
// ────────────────────────────────────────────────────────────────────────────

/// One differential-drive motor command.  Direction is a reverse flag per
/// wheel, never a signed magnitude.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MotorCommand {
    pub left_speed: u8,
    pub right_speed: u8,
    pub left_reverse: bool,
    pub right_reverse: bool,
}

impl MotorCommand {
    /// Build a command, clamping signed speeds to `[0, 255]`.
    pub fn clamped(left_speed: i32, right_speed: i32, left_reverse: bool, right_reverse: bool) -> Self {
        Self {
            left_speed: left_speed.clamp(0, 255) as u8,
            right_speed: right_speed.clamp(0, 255) as u8,
            left_reverse,
            right_reverse,
        }
    }

    /// Both wheels at zero speed, forward direction.
    pub const STOP: MotorCommand = MotorCommand {
        left_speed: 0,
        right_speed: 0,
        left_reverse: false,
        right_reverse: false,
    };

    /// `true` when neither wheel is commanded to move.
    pub fn is_stopped(&self) -> bool {
        self.left_speed == 0 && self.right_speed == 0
    }
}

/// Brush and suction actuator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ActuatorState {
    pub brush_on: bool,
    pub suction_on: bool,
}

// ────────────────────────────────────────────────────────────────────────────
// Reports and alerts
// ────────────────────────────────────────────────────────────────────────────

/// Severity of an outbound report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Likely sensing or hardware failure; needs attention.
    Alert,
    /// Informational end of task.
    Warning,
}

/// Emitted exactly once when the navigation state machine enters `End`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalReport {
    pub severity: Severity,
    pub reason: String,
}

impl TerminalReport {
    pub fn alert(reason: impl Into<String>) -> Self {
        Self {
            severity: Severity::Alert,
            reason: reason.into(),
        }
    }

    pub fn warning(reason: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            reason: reason.into(),
        }
    }
}

/// Raised by a sensor-condition monitor when a condition is held long enough.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorAlert {
    /// Monitor identifier, e.g. `"stair_blockage"`.
    pub monitor: String,
    pub severity: Severity,
    pub message: String,
}

// ────────────────────────────────────────────────────────────────────────────
// Bus events
// ────────────────────────────────────────────────────────────────────────────

/// Unified event wrapper for the in-process event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g., "sweepline-runtime::cycle"
    pub source: String,
    pub payload: EventPayload,
}

impl Event {
    /// Stamp a payload with a fresh id and the current wall-clock time.
    pub fn new(source: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

/// Variants of data that can be routed over the event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    Telemetry(SensorSnapshot),
    StateChange {
        from: String,
        to: String,
        heading: Heading,
        position: Position,
    },
    Terminal(TerminalReport),
    SensorAlert(SensorAlert),
}

// ────────────────────────────────────────────────────────────────────────────
// Errors
// ────────────────────────────────────────────────────────────────────────────

/// Workspace-wide error type spanning serial faults, safety interlocks, bus
/// delivery and configuration problems.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SweepError {
    #[error("Serial link fault on {port}: {details}")]
    Link { port: String, details: String },

    #[error("Interlock '{rule}' violated: {details}")]
    Interlock { rule: String, details: String },

    #[error("Event bus error: {0}")]
    Channel(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}
