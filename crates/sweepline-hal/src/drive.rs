//! Closed-loop drive controller.
//!
//! Maneuvers are expressed as absolute encoder targets ([`StepGoal`]) computed
//! from the encoder positions at issue time.  [`DriveController::drive_toward_goal`]
//! is then polled once per cycle: each wheel runs at a fixed speed toward its
//! target until it is inside the tolerance window, and the goal counts as
//! reached exactly when both wheels are commanded to zero.
//!
//! While line following, [`DriveController::forwards_with_correction`] steers
//! by speeding up the wheel opposite the line's drift.
//!
//! | Maneuver | goal_a | goal_b |
//! |---|---|---|
//! | `forward(n)` | a + n | b + trunc(0.9·n) |
//! | `backward(n)` | a − n | b − trunc(0.9·n) |
//! | `rotate_right(n)` | a + n | b − n |
//! | `rotate_left(n)` | a − n | b + n |

use serde::{Deserialize, Serialize};
use sweepline_types::{ActuatorState, LineSegment, MotorCommand, SensorSnapshot, SweepError};
use tracing::debug;

use crate::transport::SerialLink;
use crate::wire::{encode_actuators, encode_motor};

// ────────────────────────────────────────────────────────────────────────────
// Configuration
// ────────────────────────────────────────────────────────────────────────────

/// Tunables of the drive controller.  Defaults match the production robot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveConfig {
    /// Half-width of the per-wheel "at goal" window, in encoder steps.
    pub tolerance: i32,
    /// Wheel speed while seeking a step goal.
    pub goal_speed: u8,
    /// Base wheel speed while line following.
    pub cruise_speed: u8,
    /// Speed of the wheel that steers back toward the line.
    pub correction_speed: u8,
    /// Normalized horizontal drift tolerated before steering.
    pub dead_band: f64,
    /// Half the processed frame width in pixels.
    pub frame_half_width: f64,
    /// Wheel-B scale for straight maneuvers, compensating drivetrain asymmetry.
    pub b_wheel_scale: f64,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            tolerance: 50,
            goal_speed: 120,
            cruise_speed: 120,
            correction_speed: 255,
            dead_band: 0.015,
            frame_half_width: 320.0,
            b_wheel_scale: 0.9,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Goal and action records
// ────────────────────────────────────────────────────────────────────────────

/// Target absolute encoder positions of the current maneuver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StepGoal {
    pub goal_a: i64,
    pub goal_b: i64,
}

/// Most recent motion the controller put on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DriveAction {
    /// Nothing commanded yet.
    #[default]
    Idle,
    /// Both wheels stopped.
    Stop,
    /// Line following with forward wheels.
    Correcting,
    /// Seeking a step goal with at least one wheel forward or stopped.
    SeekingGoal,
    /// Both wheels running backwards.
    Reverse,
}

// ────────────────────────────────────────────────────────────────────────────
// DriveController
// ────────────────────────────────────────────────────────────────────────────

/// Owns the current [`StepGoal`] and the actuator state; writes motor and
/// actuator frames to the link it is handed.
#[derive(Debug, Default)]
pub struct DriveController {
    config: DriveConfig,
    goal: StepGoal,
    actuators: ActuatorState,
    last_action: DriveAction,
}

impl DriveController {
    pub fn new(config: DriveConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn goal(&self) -> StepGoal {
        self.goal
    }

    pub fn last_action(&self) -> DriveAction {
        self.last_action
    }

    pub fn actuators(&self) -> ActuatorState {
        self.actuators
    }

    // ── Goal setters ────────────────────────────────────────────────────────

    pub fn forward(&mut self, snapshot: &SensorSnapshot, steps: i32) -> StepGoal {
        let (a, b) = encoders(snapshot);
        let steps = i64::from(steps);
        self.set_goal(a + steps, b + self.scaled_b(steps))
    }

    pub fn backward(&mut self, snapshot: &SensorSnapshot, steps: i32) -> StepGoal {
        let (a, b) = encoders(snapshot);
        let steps = i64::from(steps);
        self.set_goal(a - steps, b - self.scaled_b(steps))
    }

    pub fn rotate_right(&mut self, snapshot: &SensorSnapshot, steps: i32) -> StepGoal {
        let (a, b) = encoders(snapshot);
        let steps = i64::from(steps);
        self.set_goal(a + steps, b - steps)
    }

    pub fn rotate_left(&mut self, snapshot: &SensorSnapshot, steps: i32) -> StepGoal {
        let (a, b) = encoders(snapshot);
        let steps = i64::from(steps);
        self.set_goal(a - steps, b + steps)
    }

    fn scaled_b(&self, steps: i64) -> i64 {
        // `as` truncates toward zero.
        (steps as f64 * self.config.b_wheel_scale) as i64
    }

    fn set_goal(&mut self, goal_a: i64, goal_b: i64) -> StepGoal {
        self.goal = StepGoal { goal_a, goal_b };
        debug!(goal_a, goal_b, "step goal set");
        self.goal
    }

    // ── Commands ────────────────────────────────────────────────────────────

    /// One proportional-free control step toward the current goal.
    ///
    /// Always writes a motor frame.  Returns `true` exactly when both wheels
    /// were commanded to zero speed.
    pub fn drive_toward_goal(
        &mut self,
        link: &mut dyn SerialLink,
        snapshot: &SensorSnapshot,
    ) -> Result<bool, SweepError> {
        let (a, b) = encoders(snapshot);
        let (left_speed, left_reverse) = self.wheel_toward(self.goal.goal_a - a);
        let (right_speed, right_reverse) = self.wheel_toward(self.goal.goal_b - b);
        let cmd = MotorCommand {
            left_speed,
            right_speed,
            left_reverse,
            right_reverse,
        };
        let action = if cmd.left_reverse && cmd.right_reverse {
            DriveAction::Reverse
        } else {
            DriveAction::SeekingGoal
        };
        self.send(link, cmd, action)?;
        Ok(cmd.is_stopped())
    }

    fn wheel_toward(&self, error: i64) -> (u8, bool) {
        let tolerance = i64::from(self.config.tolerance);
        if error > tolerance {
            (self.config.goal_speed, false)
        } else if error < -tolerance {
            (self.config.goal_speed, true)
        } else {
            (0, false)
        }
    }

    /// Drive forward, steering to keep `vline` centred in the frame.
    ///
    /// Without a line both wheels run at cruise speed in reverse.
    pub fn forwards_with_correction(
        &mut self,
        link: &mut dyn SerialLink,
        vline: Option<&LineSegment>,
    ) -> Result<(), SweepError> {
        let cruise = self.config.cruise_speed;
        let Some(line) = vline else {
            let cmd = MotorCommand {
                left_speed: cruise,
                right_speed: cruise,
                left_reverse: true,
                right_reverse: true,
            };
            return self.send(link, cmd, DriveAction::Reverse);
        };

        let drift = (f64::from(line.x1) + f64::from(line.x2)) / 2.0 / self.config.frame_half_width - 1.0;
        let (mut left, mut right) = (cruise, cruise);
        if drift < -self.config.dead_band {
            right = self.config.correction_speed;
        } else if drift > self.config.dead_band {
            left = self.config.correction_speed;
        }
        let cmd = MotorCommand {
            left_speed: left,
            right_speed: right,
            left_reverse: false,
            right_reverse: false,
        };
        self.send(link, cmd, DriveAction::Correcting)
    }

    pub fn stop(&mut self, link: &mut dyn SerialLink) -> Result<(), SweepError> {
        self.send(link, MotorCommand::STOP, DriveAction::Stop)
    }

    /// Switch brush and suction.
    pub fn set_cleaning(
        &mut self,
        link: &mut dyn SerialLink,
        brush_on: bool,
        suction_on: bool,
    ) -> Result<(), SweepError> {
        let state = ActuatorState {
            brush_on,
            suction_on,
        };
        link.write_all(&encode_actuators(state))?;
        self.actuators = state;
        debug!(brush_on, suction_on, "actuators set");
        Ok(())
    }

    fn send(
        &mut self,
        link: &mut dyn SerialLink,
        cmd: MotorCommand,
        action: DriveAction,
    ) -> Result<(), SweepError> {
        link.write_all(&encode_motor(cmd))?;
        self.last_action = action;
        Ok(())
    }
}

/// Encoder positions widened so goal and error arithmetic cannot overflow,
/// whatever the board reports.
fn encoders(snapshot: &SensorSnapshot) -> (i64, i64) {
    (i64::from(snapshot.encoder_a), i64::from(snapshot.encoder_b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{SimDriveBase, SimLink};

    fn at(a: i32, b: i32) -> SensorSnapshot {
        SensorSnapshot {
            encoder_a: a,
            encoder_b: b,
            ..SensorSnapshot::default()
        }
    }

    #[test]
    fn goal_arithmetic() {
        let mut drive = DriveController::default();
        let s = at(1000, -200);
        assert_eq!(drive.forward(&s, 400), StepGoal { goal_a: 1400, goal_b: 160 });
        assert_eq!(drive.forward(&s, 1350), StepGoal { goal_a: 2350, goal_b: 1015 });
        assert_eq!(drive.backward(&s, 400), StepGoal { goal_a: 600, goal_b: -560 });
        assert_eq!(drive.rotate_right(&s, 700), StepGoal { goal_a: 1700, goal_b: -900 });
        assert_eq!(drive.rotate_left(&s, 700), StepGoal { goal_a: 300, goal_b: 500 });
    }

    #[test]
    fn b_scale_truncates_toward_zero() {
        let mut drive = DriveController::default();
        let goal = drive.backward(&at(0, 0), 11);
        // 0.9 * 11 = 9.9 → 9
        assert_eq!(goal.goal_b, -9);
    }

    #[test]
    fn drive_toward_goal_speeds_and_directions() {
        let mut link = SimLink::new();
        let mut drive = DriveController::default();
        drive.rotate_left(&at(0, 0), 700);

        let reached = drive.drive_toward_goal(&mut link, &at(0, 0)).unwrap();
        assert!(!reached);
        let cmd = link.last_motor_command().unwrap();
        assert_eq!(cmd, MotorCommand::clamped(120, 120, true, false));
        assert_eq!(drive.last_action(), DriveAction::SeekingGoal);
    }

    #[test]
    fn tolerance_window_is_inclusive() {
        let mut link = SimLink::new();
        let mut drive = DriveController::default();
        drive.forward(&at(0, 0), 400);

        // error_a = 50, error_b = -50: both inside.
        assert!(drive.drive_toward_goal(&mut link, &at(350, 410)).unwrap());
        assert_eq!(link.last_motor_command(), Some(MotorCommand::STOP));

        // error_a = 51: left wheel still moving.
        assert!(!drive.drive_toward_goal(&mut link, &at(349, 360)).unwrap());
        let cmd = link.last_motor_command().unwrap();
        assert_eq!((cmd.left_speed, cmd.right_speed), (120, 0));
    }

    #[test]
    fn backing_up_is_reported_as_reverse() {
        let mut link = SimLink::new();
        let mut drive = DriveController::default();
        drive.backward(&at(0, 0), 400);
        drive.drive_toward_goal(&mut link, &at(0, 0)).unwrap();
        assert_eq!(drive.last_action(), DriveAction::Reverse);
    }

    #[test]
    fn converges_on_simulated_base_from_any_start() {
        type Maneuver = fn(&mut DriveController, &SensorSnapshot, i32) -> StepGoal;
        let maneuvers: [(&str, Maneuver, i32); 5] = [
            ("forward", DriveController::forward, 400),
            ("forward", DriveController::forward, 1350),
            ("backward", DriveController::backward, 400),
            ("rotate_left", DriveController::rotate_left, 700),
            ("rotate_right", DriveController::rotate_right, 700),
        ];
        for (name, maneuver, steps) in maneuvers {
            for (start_a, start_b) in [(0, 0), (-5000, 123), (77_777, -31)] {
                let mut base = SimDriveBase::new().with_encoders(start_a, start_b);
                let mut link = base.link();
                let mut drive = DriveController::default();

                let goal = maneuver(&mut drive, &base.snapshot(), steps);
                let within = |s: &SensorSnapshot| {
                    (goal.goal_a - i64::from(s.encoder_a)).abs() <= 50
                        && (goal.goal_b - i64::from(s.encoder_b)).abs() <= 50
                };
                let mut reached = false;
                for _ in 0..500 {
                    let snapshot = base.snapshot();
                    let done = drive.drive_toward_goal(&mut link, &snapshot).unwrap();
                    assert_eq!(done, within(&snapshot), "{name}: reached flag disagrees");
                    if done {
                        reached = true;
                        break;
                    }
                    base.tick();
                }
                assert!(reached, "{name} {steps} from ({start_a}, {start_b}) not reached");
            }
        }
    }

    #[test]
    fn encoders_at_the_wire_limits_do_not_overflow() {
        use crate::telemetry::TelemetryDecoder;
        use crate::wire::{TELEMETRY_HEADER, TELEMETRY_PAYLOAD_LEN};

        // Raw encoder words straight from the board, before negation.
        let mut frame = vec![TELEMETRY_HEADER];
        let mut payload = [0u8; TELEMETRY_PAYLOAD_LEN];
        payload[15..19].copy_from_slice(&2_147_483_000i32.to_le_bytes());
        payload[19..23].copy_from_slice(&(-2_147_483_000i32).to_le_bytes());
        frame.extend_from_slice(&payload);

        let mut link = SimLink::new();
        link.inject_read(&frame);
        let mut snapshot = SensorSnapshot::default();
        TelemetryDecoder::new().poll(&mut link, &mut snapshot).unwrap();
        assert_eq!(snapshot.encoder_a, -2_147_483_000);
        assert_eq!(snapshot.encoder_b, 2_147_483_000);

        let mut drive = DriveController::default();
        let goal = drive.backward(&snapshot, 1000);
        assert_eq!(goal.goal_a, -2_147_484_000);
        assert!(!drive.drive_toward_goal(&mut link, &snapshot).unwrap());
        assert_eq!(link.last_motor_command(), Some(MotorCommand::clamped(120, 120, true, true)));

        let goal = drive.forward(&snapshot, 1350);
        assert_eq!(goal.goal_b, 2_147_484_215);
        assert!(!drive.drive_toward_goal(&mut link, &snapshot).unwrap());
        assert_eq!(link.last_motor_command(), Some(MotorCommand::clamped(120, 120, false, false)));

        drive.rotate_left(&snapshot, 700);
        drive.rotate_right(&snapshot, 700);
        assert!(!drive.drive_toward_goal(&mut link, &snapshot).unwrap());
    }

    #[test]
    fn correction_steers_toward_line() {
        let mut link = SimLink::new();
        let mut drive = DriveController::default();

        // Line left of centre: speed up the right wheel.
        drive
            .forwards_with_correction(&mut link, Some(&LineSegment::new(200, 0, 220, 479)))
            .unwrap();
        assert_eq!(link.last_motor_command(), Some(MotorCommand::clamped(120, 255, false, false)));

        // Line right of centre: speed up the left wheel.
        drive
            .forwards_with_correction(&mut link, Some(&LineSegment::new(420, 0, 440, 479)))
            .unwrap();
        assert_eq!(link.last_motor_command(), Some(MotorCommand::clamped(255, 120, false, false)));

        // Within the dead-band: straight.
        drive
            .forwards_with_correction(&mut link, Some(&LineSegment::new(322, 0, 324, 479)))
            .unwrap();
        assert_eq!(link.last_motor_command(), Some(MotorCommand::clamped(120, 120, false, false)));
        assert_eq!(drive.last_action(), DriveAction::Correcting);
    }

    #[test]
    fn correction_without_line_reverses_both_wheels() {
        let mut link = SimLink::new();
        let mut drive = DriveController::default();
        drive.forwards_with_correction(&mut link, None).unwrap();
        assert_eq!(link.last_motor_command(), Some(MotorCommand::clamped(120, 120, true, true)));
        assert_eq!(drive.last_action(), DriveAction::Reverse);
    }

    #[test]
    fn stop_and_cleaning_frames() {
        let mut link = SimLink::new();
        let mut drive = DriveController::default();
        drive.set_cleaning(&mut link, true, true).unwrap();
        drive.stop(&mut link).unwrap();

        assert_eq!(
            link.written(),
            vec![0x7A, 0xF3, 1, 1, 0, 0, 0xF0, 0x0F, 0, 0, 0, 0]
        );
        assert!(drive.actuators().brush_on);
        assert_eq!(drive.last_action(), DriveAction::Stop);
    }

    #[test]
    fn config_defaults_fill_missing_fields() {
        let cfg: DriveConfig = toml::from_str("tolerance = 30").unwrap();
        assert_eq!(cfg.tolerance, 30);
        assert_eq!(cfg.goal_speed, 120);
        assert!((cfg.b_wheel_scale - 0.9).abs() < f64::EPSILON);
    }
}
