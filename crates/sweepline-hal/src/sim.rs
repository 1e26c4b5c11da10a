//! In-process simulation of the drive board for tests without hardware.
//!
//! [`SimLink`] is a [`SerialLink`] backed by shared in-memory buffers: tests
//! inject board → host bytes and inspect the host → board frames.  Clones
//! share the same buffers, so a test can keep a handle while the code under
//! test owns another.
//!
//! [`SimDriveBase`] sits on the board side of a [`SimLink`]: it turns the last
//! motor command into encoder motion on every [`tick`][SimDriveBase::tick] and
//! can publish its state as a real telemetry frame.
//!
//! # Example
//!
//! ```rust
//! use sweepline_hal::sim::SimDriveBase;
//! use sweepline_hal::{DriveController, SerialLink};
//!
//! let mut base = SimDriveBase::new().with_ranges(100.0, 30.0, 30.0);
//! let mut link = base.link();
//! let mut drive = DriveController::default();
//!
//! drive.forward(&base.snapshot(), 400);
//! while !drive.drive_toward_goal(&mut link, &base.snapshot()).unwrap() {
//!     base.tick();
//! }
//! assert!(base.snapshot().encoder_a >= 350);
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use sweepline_types::{ActuatorState, MotorCommand, SensorSnapshot, SweepError};

use crate::transport::SerialLink;
use crate::wire::{COMMAND_FRAME_LEN, CommandFrame, decode_command, encode_telemetry};

// ────────────────────────────────────────────────────────────────────────────
// SimLink
// ────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct SimLinkInner {
    read_buffer: VecDeque<u8>,
    written: Vec<u8>,
    fail_writes: bool,
}

/// Shared in-memory [`SerialLink`].
#[derive(Clone, Default)]
pub struct SimLink {
    inner: Arc<Mutex<SimLinkInner>>,
}

impl SimLink {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SimLinkInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue bytes as if the board had sent them.
    pub fn inject_read(&self, data: &[u8]) {
        self.lock().read_buffer.extend(data);
    }

    /// Bytes queued and not yet read or discarded.
    pub fn pending_read(&self) -> usize {
        self.lock().read_buffer.len()
    }

    /// Every byte the host has written so far.
    pub fn written(&self) -> Vec<u8> {
        self.lock().written.clone()
    }

    pub fn clear_written(&self) {
        self.lock().written.clear();
    }

    /// Make every subsequent write fail with [`SweepError::Link`].
    pub fn set_fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }

    /// Written bytes split into recognised command frames.
    pub fn written_frames(&self) -> Vec<CommandFrame> {
        self.lock()
            .written
            .chunks(COMMAND_FRAME_LEN)
            .filter_map(decode_command)
            .collect()
    }

    pub fn motor_commands(&self) -> Vec<MotorCommand> {
        self.written_frames()
            .into_iter()
            .filter_map(|f| match f {
                CommandFrame::Motor(cmd) => Some(cmd),
                CommandFrame::Actuators(_) => None,
            })
            .collect()
    }

    pub fn last_motor_command(&self) -> Option<MotorCommand> {
        self.motor_commands().pop()
    }

    pub fn last_actuator_state(&self) -> Option<ActuatorState> {
        self.written_frames().into_iter().rev().find_map(|f| match f {
            CommandFrame::Actuators(state) => Some(state),
            CommandFrame::Motor(_) => None,
        })
    }
}

impl SerialLink for SimLink {
    fn name(&self) -> &str {
        "sim"
    }

    fn available(&mut self) -> Result<usize, SweepError> {
        Ok(self.lock().read_buffer.len())
    }

    fn read(&mut self, buffer: &mut [u8]) -> Result<usize, SweepError> {
        let mut inner = self.lock();
        let n = inner.read_buffer.len().min(buffer.len());
        for (slot, byte) in buffer.iter_mut().zip(inner.read_buffer.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn write_all(&mut self, data: &[u8]) -> Result<(), SweepError> {
        let mut inner = self.lock();
        if inner.fail_writes {
            return Err(SweepError::Link {
                port: "sim".to_string(),
                details: "simulated write failure".to_string(),
            });
        }
        inner.written.extend_from_slice(data);
        Ok(())
    }

    fn discard_input(&mut self) -> Result<(), SweepError> {
        self.lock().read_buffer.clear();
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// SimDriveBase
// ────────────────────────────────────────────────────────────────────────────

/// Encoder steps advanced per tick per unit of commanded speed.
const STEPS_PER_SPEED_UNIT: i32 = 4;

/// Board-side model of a differential drive base.
///
/// Each [`tick`][Self::tick] moves every wheel by `speed / 4` encoder steps
/// in its commanded direction (30 steps per tick at the goal speed of 120).
pub struct SimDriveBase {
    link: SimLink,
    state: SensorSnapshot,
}

impl SimDriveBase {
    /// A stationary base with clear ranges, clean floor and an empty bin.
    pub fn new() -> Self {
        Self {
            link: SimLink::new(),
            state: SensorSnapshot {
                us_front: 200.0,
                us_left: 200.0,
                us_right: 200.0,
                stair_drop: false,
                bin_level: true,
                humidity: true,
                encoder_a: 0,
                encoder_b: 0,
            },
        }
    }

    pub fn with_encoders(mut self, encoder_a: i32, encoder_b: i32) -> Self {
        self.state.encoder_a = encoder_a;
        self.state.encoder_b = encoder_b;
        self
    }

    pub fn with_ranges(mut self, front: f32, left: f32, right: f32) -> Self {
        self.set_ranges(front, left, right);
        self
    }

    /// A handle to the host side of the link.
    pub fn link(&self) -> SimLink {
        self.link.clone()
    }

    /// Current state in host conventions.
    pub fn snapshot(&self) -> SensorSnapshot {
        self.state
    }

    pub fn set_ranges(&mut self, front: f32, left: f32, right: f32) {
        self.state.us_front = front;
        self.state.us_left = left;
        self.state.us_right = right;
    }

    pub fn set_stair_drop(&mut self, active: bool) {
        self.state.stair_drop = active;
    }

    /// Apply the last motor command for one time step.
    pub fn tick(&mut self) {
        let Some(cmd) = self.link.last_motor_command() else {
            return;
        };
        let (left, right) = (
            wheel_delta(cmd.left_speed, cmd.left_reverse),
            wheel_delta(cmd.right_speed, cmd.right_reverse),
        );
        self.state.encoder_a = self.state.encoder_a.wrapping_add(left);
        self.state.encoder_b = self.state.encoder_b.wrapping_add(right);
    }

    /// Queue the current state as a telemetry frame on the link.
    pub fn emit_telemetry(&self) {
        self.link.inject_read(&encode_telemetry(&self.state));
    }
}

impl Default for SimDriveBase {
    fn default() -> Self {
        Self::new()
    }
}

fn wheel_delta(speed: u8, reverse: bool) -> i32 {
    let steps = i32::from(speed) / STEPS_PER_SPEED_UNIT;
    if reverse { -steps } else { steps }
}
