//! `sweepline-hal` – Hardware Abstraction Layer for the drive board.
//!
//! The drive board is a single serial peer.  Everything the navigation core
//! knows about the physical robot arrives as a 24-byte telemetry frame and
//! everything it asks of the robot leaves as a 6-byte motor or actuator frame.
//!
//! | Module | Responsibility |
//! |---|---|
//! | [`transport`] | [`SerialLink`] trait and the `serialport`-backed implementation |
//! | [`wire`] | Byte layout of telemetry, motor and actuator frames |
//! | [`telemetry`] | [`TelemetryDecoder`]: at most one frame per poll into a [`SensorSnapshot`][sweepline_types::SensorSnapshot] |
//! | [`drive`] | [`DriveController`]: encoder step goals and line-centering correction |
//! | [`sim`] | [`SimLink`] / [`SimDriveBase`] for headless tests |

pub mod drive;
pub mod sim;
pub mod telemetry;
pub mod transport;
pub mod wire;

pub use drive::{DriveAction, DriveConfig, DriveController, StepGoal};
pub use sim::{SimDriveBase, SimLink};
pub use telemetry::{PollOutcome, TelemetryDecoder};
pub use transport::{SerialLink, SerialPortLink};
