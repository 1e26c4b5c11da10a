//! `sweepline-kernel` – Safety & sensor supervision.
//!
//! Runs alongside navigation every cycle.  It does not decide where to go; it
//! vetoes unsafe motion and raises alerts about the robot's own condition.
//!
//! # Modules
//!
//! - [`interlock`] – [`SafetyVerifier`][interlock::SafetyVerifier]: a rule
//!   engine that checks the latest sensor snapshot against the drive
//!   controller's last action.  The built-in
//!   [`StairDropRule`][interlock::StairDropRule] demands a stop whenever a drop
//!   is sensed and the robot is not backing away from it.
//! - [`monitor`] – [`SensorMonitors`][monitor::SensorMonitors]: rolling-window
//!   detectors for a blocked stair sensor, a full dust bin and a wet floor,
//!   each with its own alert cooldown.

pub mod interlock;
pub mod monitor;

pub use interlock::{DriveState, Rule, SafetyVerifier, StairDropRule};
pub use monitor::{MonitorConfig, MonitorReport, SensorMonitors, Signal, SustainedConditionMonitor};
