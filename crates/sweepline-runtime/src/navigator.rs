//! [`Navigator`] – the line-following exploration state machine.
//!
//! The robot follows a painted vertical guide line until a horizontal line
//! marks a junction.  At the junction it records what the ultrasonic sensors
//! see on the [`ExplorationGrid`], picks the next branch (backtrack first,
//! then forward > left > right among unvisited cells) and executes it as a
//! sequence of encoder step goals.  Turns are closed on the camera: the robot
//! rotates until it loses the old line, keeps rotating until it finds the new
//! one, nudges until the line is upright and backs up onto the junction.
//!
//! # States
//!
//! | State | Does | Leaves to |
//! |---|---|---|
//! | `MoveForward` | line-centred forward drive | `DecideRotation` on a junction line, `End` when the line is lost |
//! | `DecideRotation` | map obstacles, choose a branch | `GoForward`, `Go(side)`, `End` |
//! | `GoForward` | poll step goal | `MoveForward` |
//! | `Go(side)` | poll step goal, then rotate | `LoseVLine(side)` |
//! | `LoseVLine(side)` | rotate while the line is visible | `GetVLine(side)` |
//! | `GetVLine(side)` | rotate until a line appears, then align | `Finish(side)` |
//! | `Finish(side)` | poll step goal, commit heading | `MoveForward` |
//! | `End` | announce once, switch everything off | – |
//!
//! Every transition, including a re-entry into the same state, arms a dwell
//! deadline; [`Navigator::step`] does nothing until the caller's clock passes
//! it.
//!
//! All motion goes through the [`Motion`] trait so the state machine can be
//! exercised without hardware.

use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use sweepline_types::{
    Heading, LineObservation, LineSegment, Position, SensorSnapshot, SweepError, TerminalReport,
};
use tracing::{debug, error, info};

use crate::backtrack::BacktrackStack;
use crate::grid::{ExplorationGrid, ORIGIN};

// ────────────────────────────────────────────────────────────────────────────
// Motion seam
// ────────────────────────────────────────────────────────────────────────────

/// Drive-controller operations the state machine needs.
///
/// Goal setters are relative to the encoder positions of the snapshot the
/// current cycle was decided on.
pub trait Motion {
    fn forward(&mut self, steps: i32);
    fn backward(&mut self, steps: i32);
    fn rotate_left(&mut self, steps: i32);
    fn rotate_right(&mut self, steps: i32);

    /// One control step toward the current goal; `true` once reached.
    fn drive_toward_goal(&mut self) -> Result<bool, SweepError>;

    fn forwards_with_correction(&mut self, vline: Option<&LineSegment>) -> Result<(), SweepError>;

    fn stop(&mut self) -> Result<(), SweepError>;

    fn set_cleaning(&mut self, brush_on: bool, suction_on: bool) -> Result<(), SweepError>;
}

// ────────────────────────────────────────────────────────────────────────────
// Configuration
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavConfig {
    /// Front range below which the cell ahead is an obstacle (cm).
    pub front_threshold_cm: f32,
    /// Side range below which the side cell is an obstacle (cm).
    pub side_threshold_cm: f32,
    /// A horizontal line counts as a junction when its mean y lies strictly
    /// between these bounds (px).
    pub junction_min_y: f32,
    pub junction_max_y: f32,
    /// Straight move onto the next cell.
    pub short_forward_steps: i32,
    /// Straight move that carries the robot's pivot onto the junction before
    /// a turn.
    pub long_forward_steps: i32,
    pub rotate_steps: i32,
    pub search_steps: i32,
    pub align_steps: i32,
    pub settle_back_steps: i32,
    /// Half-width of the upright band around the line's bottom point (px).
    pub align_band_px: i32,
    pub dwell_ms: u64,
}

impl Default for NavConfig {
    fn default() -> Self {
        Self {
            front_threshold_cm: 45.0,
            side_threshold_cm: 25.0,
            junction_min_y: 20.0,
            junction_max_y: 220.0,
            short_forward_steps: 400,
            long_forward_steps: 1350,
            rotate_steps: 700,
            search_steps: 300,
            align_steps: 100,
            settle_back_steps: 400,
            align_band_px: 64,
            dwell_ms: 750,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// States
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    /// Heading after a quarter turn toward this side.
    pub fn turn(self, heading: Heading) -> Heading {
        match self {
            Side::Left => heading.turn_left(),
            Side::Right => heading.turn_right(),
        }
    }

    fn rotate(self, motion: &mut dyn Motion, steps: i32) {
        match self {
            Side::Left => motion.rotate_left(steps),
            Side::Right => motion.rotate_right(steps),
        }
    }

    fn counter_rotate(self, motion: &mut dyn Motion, steps: i32) {
        match self {
            Side::Left => motion.rotate_right(steps),
            Side::Right => motion.rotate_left(steps),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum NavState {
    #[default]
    MoveForward,
    DecideRotation,
    GoForward,
    Go(Side),
    LoseVLine(Side),
    GetVLine(Side),
    Finish(Side),
    End,
}

impl fmt::Display for NavState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let side = |s: &Side| match s {
            Side::Left => "Left",
            Side::Right => "Right",
        };
        match self {
            NavState::MoveForward => f.write_str("MoveForward"),
            NavState::DecideRotation => f.write_str("DecideRotation"),
            NavState::GoForward => f.write_str("GoForward"),
            NavState::Go(s) => write!(f, "Go{}", side(s)),
            NavState::LoseVLine(s) => write!(f, "{}LoseVLine", side(s)),
            NavState::GetVLine(s) => write!(f, "{}GetVLine", side(s)),
            NavState::Finish(s) => write!(f, "{}Finish", side(s)),
            NavState::End => f.write_str("End"),
        }
    }
}

/// What happened during one [`Navigator::step`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutcome {
    pub state_before: NavState,
    pub state_after: NavState,
    /// `false` while the dwell deadline has not passed.
    pub ran: bool,
    /// A transition was requested, possibly into the same state.
    pub transitioned: bool,
    /// Set on the single cycle the terminal report is announced.
    pub report: Option<TerminalReport>,
}

// ────────────────────────────────────────────────────────────────────────────
// Navigator
// ────────────────────────────────────────────────────────────────────────────

/// Navigation state: current state, pose, map and backtrack stack.
pub struct Navigator {
    config: NavConfig,
    state: NavState,
    heading: Heading,
    position: Position,
    grid: ExplorationGrid,
    backtrack: BacktrackStack,
    dwell_until: Option<Instant>,
    terminal: Option<TerminalReport>,
    announced: bool,
}

impl Navigator {
    /// Start one cell north of [`ORIGIN`] facing North, following the line.
    pub fn new(config: NavConfig) -> Self {
        Self {
            config,
            state: NavState::MoveForward,
            heading: Heading::North,
            position: ORIGIN.step(Heading::North),
            grid: ExplorationGrid::new(),
            backtrack: BacktrackStack::new(),
            dwell_until: None,
            terminal: None,
            announced: false,
        }
    }

    pub fn state(&self) -> NavState {
        self.state
    }

    pub fn heading(&self) -> Heading {
        self.heading
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn grid(&self) -> &ExplorationGrid {
        &self.grid
    }

    pub fn backtrack(&self) -> &BacktrackStack {
        &self.backtrack
    }

    /// The report set on entering `End`, if it has been entered.
    pub fn terminal_report(&self) -> Option<&TerminalReport> {
        self.terminal.as_ref()
    }

    pub fn is_finished(&self) -> bool {
        self.state == NavState::End
    }

    /// Run the current state's handler once, unless still dwelling.
    pub fn step(
        &mut self,
        now: Instant,
        snapshot: &SensorSnapshot,
        lines: &LineObservation,
        motion: &mut dyn Motion,
    ) -> StepOutcome {
        let before = self.state;
        let mut outcome = StepOutcome {
            state_before: before,
            state_after: before,
            ran: false,
            transitioned: false,
            report: None,
        };
        if let Some(deadline) = self.dwell_until
            && now < deadline
        {
            return outcome;
        }
        outcome.ran = true;

        let announcing = before == NavState::End && !self.announced;
        let result = match before {
            NavState::MoveForward => self.move_forward(lines, motion),
            NavState::DecideRotation => self.decide_rotation(snapshot, motion),
            NavState::GoForward => self.go_forward(motion),
            NavState::Go(side) => self.go(side, motion),
            NavState::LoseVLine(side) => self.lose_vline(side, lines, motion),
            NavState::GetVLine(side) => self.get_vline(side, lines, motion),
            NavState::Finish(side) => self.finish(side, motion),
            NavState::End => self.end(motion),
        };

        let next = match result {
            Ok(next) => next,
            Err(e) if before == NavState::End => {
                error!(error = %e, "failed to switch off after end of run");
                None
            }
            Err(e) => {
                error!(state = %before, error = %e, "hardware command failed in handler");
                Some(self.enter_end(TerminalReport::alert("internal error")))
            }
        };

        if let Some(next) = next {
            self.transition(next, now);
            outcome.transitioned = true;
        }
        if announcing {
            outcome.report = self.terminal.clone();
        }
        outcome.state_after = self.state;
        outcome
    }

    fn transition(&mut self, next: NavState, now: Instant) {
        info!(
            from = %self.state,
            to = %next,
            heading = %self.heading,
            position = %self.position,
            "state change"
        );
        self.state = next;
        self.dwell_until = Some(now + Duration::from_millis(self.config.dwell_ms));
    }

    fn enter_end(&mut self, report: TerminalReport) -> NavState {
        self.terminal = Some(report);
        NavState::End
    }

    // ── Handlers ────────────────────────────────────────────────────────────
    //
    // Each returns the requested next state, or `None` to stay without
    // re-arming the dwell deadline.

    fn move_forward(
        &mut self,
        lines: &LineObservation,
        motion: &mut dyn Motion,
    ) -> Result<Option<NavState>, SweepError> {
        let Some(vline) = lines.vertical else {
            return Ok(Some(self.enter_end(TerminalReport::alert("line lost"))));
        };

        if let Some(hline) = lines.horizontal {
            let y = hline.mid_y();
            if y > self.config.junction_min_y && y < self.config.junction_max_y {
                debug!(hline_y = y, "junction line in band");
                motion.stop()?;
                return Ok(Some(NavState::DecideRotation));
            }
        }

        motion.forwards_with_correction(Some(&vline))?;
        Ok(None)
    }

    fn decide_rotation(
        &mut self,
        snapshot: &SensorSnapshot,
        motion: &mut dyn Motion,
    ) -> Result<Option<NavState>, SweepError> {
        motion.stop()?;

        let here = self.position;
        let heading = self.heading;
        let front = here.step(heading);
        let front_blocked = snapshot.us_front < self.config.front_threshold_cm;

        if front_blocked {
            self.grid.mark_obstacle(front);
        }
        if snapshot.us_left < self.config.side_threshold_cm {
            self.grid.mark_obstacle(here.step(heading.turn_left()));
        }
        if snapshot.us_right < self.config.side_threshold_cm {
            self.grid.mark_obstacle(here.step(heading.turn_right()));
        }
        debug!(
            front = snapshot.us_front,
            left = snapshot.us_left,
            right = snapshot.us_right,
            position = %here,
            heading = %heading,
            stack_depth = self.backtrack.len(),
            "junction"
        );

        // Backtrack onto a recorded branch first.
        for side in [Side::Left, Side::Right] {
            let dir = side.turn(heading);
            if !self.grid.is_obstacle(here.step(dir)) && self.backtrack.pop_if(dir).is_some() {
                motion.forward(self.config.long_forward_steps);
                self.grid.mark_visited(here, dir);
                info!(side = ?side, heading = %dir, "backtracking");
                return Ok(Some(NavState::Go(side)));
            }
        }

        self.grid.mark_visited(here, heading);
        if front_blocked {
            self.backtrack.push(heading);
        }

        if self.grid.is_unvisited(front) {
            motion.forward(self.config.short_forward_steps);
            return Ok(Some(NavState::GoForward));
        }
        for side in [Side::Left, Side::Right] {
            let dir = side.turn(heading);
            if self.grid.is_unvisited(here.step(dir)) {
                motion.forward(self.config.long_forward_steps);
                self.grid.mark_visited(here, dir);
                return Ok(Some(NavState::Go(side)));
            }
        }

        Ok(Some(self.enter_end(TerminalReport::warning("route finished"))))
    }

    fn go_forward(&mut self, motion: &mut dyn Motion) -> Result<Option<NavState>, SweepError> {
        if !motion.drive_toward_goal()? {
            return Ok(None);
        }
        self.position = self.position.step(self.heading);
        Ok(Some(NavState::MoveForward))
    }

    fn go(&mut self, side: Side, motion: &mut dyn Motion) -> Result<Option<NavState>, SweepError> {
        if !motion.drive_toward_goal()? {
            return Ok(None);
        }
        side.rotate(motion, self.config.rotate_steps);
        Ok(Some(NavState::LoseVLine(side)))
    }

    fn lose_vline(
        &mut self,
        side: Side,
        lines: &LineObservation,
        motion: &mut dyn Motion,
    ) -> Result<Option<NavState>, SweepError> {
        if !motion.drive_toward_goal()? {
            return Ok(None);
        }
        side.rotate(motion, self.config.rotate_steps);
        if lines.vertical.is_some() {
            Ok(Some(NavState::LoseVLine(side)))
        } else {
            Ok(Some(NavState::GetVLine(side)))
        }
    }

    fn get_vline(
        &mut self,
        side: Side,
        lines: &LineObservation,
        motion: &mut dyn Motion,
    ) -> Result<Option<NavState>, SweepError> {
        if !motion.drive_toward_goal()? {
            return Ok(None);
        }
        let Some(vline) = lines.vertical else {
            side.rotate(motion, self.config.search_steps);
            return Ok(Some(NavState::GetVLine(side)));
        };

        // Larger y is nearer the bottom of the frame.
        let (top_x, bottom_x) = if vline.y1 > vline.y2 {
            (vline.x2, vline.x1)
        } else {
            (vline.x1, vline.x2)
        };
        let band = self.config.align_band_px;

        if top_x > bottom_x + band {
            side.rotate(motion, self.config.align_steps);
            Ok(Some(NavState::GetVLine(side)))
        } else if top_x < bottom_x - band {
            side.counter_rotate(motion, self.config.align_steps);
            Ok(Some(NavState::GetVLine(side)))
        } else {
            motion.backward(self.config.settle_back_steps);
            Ok(Some(NavState::Finish(side)))
        }
    }

    fn finish(&mut self, side: Side, motion: &mut dyn Motion) -> Result<Option<NavState>, SweepError> {
        if !motion.drive_toward_goal()? {
            return Ok(None);
        }
        self.heading = side.turn(self.heading);
        self.position = self.position.step(self.heading);
        Ok(Some(NavState::MoveForward))
    }

    fn end(&mut self, motion: &mut dyn Motion) -> Result<Option<NavState>, SweepError> {
        if self.announced {
            return Ok(None);
        }
        self.announced = true;
        if let Some(report) = &self.terminal {
            info!(severity = ?report.severity, reason = %report.reason, "run ended");
        }
        let stopped = motion.stop();
        let switched_off = motion.set_cleaning(false, false);
        stopped.and(switched_off)?;
        Ok(None)
    }
}

impl Default for Navigator {
    fn default() -> Self {
        Self::new(NavConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Cell;
    use std::collections::VecDeque;
    use sweepline_types::Severity;

    // ------------------------------------------------------------------ fake motion

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Forward(i32),
        Backward(i32),
        RotateLeft(i32),
        RotateRight(i32),
        DriveTowardGoal,
        Correct,
        Stop,
        Cleaning(bool, bool),
    }

    /// Records every call; `drive_toward_goal` pops scripted answers and
    /// defaults to "reached".
    #[derive(Default)]
    struct FakeMotion {
        calls: Vec<Call>,
        reached: VecDeque<bool>,
        fail: bool,
        fail_stop: bool,
    }

    impl FakeMotion {
        fn take(&mut self) -> Vec<Call> {
            std::mem::take(&mut self.calls)
        }

        fn check(&self) -> Result<(), SweepError> {
            if self.fail {
                Err(SweepError::Link {
                    port: "fake".into(),
                    details: "unplugged".into(),
                })
            } else {
                Ok(())
            }
        }
    }

    impl Motion for FakeMotion {
        fn forward(&mut self, steps: i32) {
            self.calls.push(Call::Forward(steps));
        }
        fn backward(&mut self, steps: i32) {
            self.calls.push(Call::Backward(steps));
        }
        fn rotate_left(&mut self, steps: i32) {
            self.calls.push(Call::RotateLeft(steps));
        }
        fn rotate_right(&mut self, steps: i32) {
            self.calls.push(Call::RotateRight(steps));
        }
        fn drive_toward_goal(&mut self) -> Result<bool, SweepError> {
            self.check()?;
            self.calls.push(Call::DriveTowardGoal);
            Ok(self.reached.pop_front().unwrap_or(true))
        }
        fn forwards_with_correction(&mut self, _vline: Option<&LineSegment>) -> Result<(), SweepError> {
            self.check()?;
            self.calls.push(Call::Correct);
            Ok(())
        }
        fn stop(&mut self) -> Result<(), SweepError> {
            self.check()?;
            if self.fail_stop {
                return Err(SweepError::Link {
                    port: "fake".into(),
                    details: "motor frame rejected".into(),
                });
            }
            self.calls.push(Call::Stop);
            Ok(())
        }
        fn set_cleaning(&mut self, brush_on: bool, suction_on: bool) -> Result<(), SweepError> {
            self.check()?;
            self.calls.push(Call::Cleaning(brush_on, suction_on));
            Ok(())
        }
    }

    // ------------------------------------------------------------------ helpers

    const DWELL: Duration = Duration::from_millis(750);

    fn ranges(front: f32, left: f32, right: f32) -> SensorSnapshot {
        SensorSnapshot {
            us_front: front,
            us_left: left,
            us_right: right,
            ..SensorSnapshot::default()
        }
    }

    fn open() -> SensorSnapshot {
        ranges(100.0, 100.0, 100.0)
    }

    fn vline() -> LineSegment {
        LineSegment::new(320, 479, 320, 0)
    }

    fn following() -> LineObservation {
        LineObservation {
            horizontal: None,
            vertical: Some(vline()),
        }
    }

    fn at_junction() -> LineObservation {
        LineObservation {
            horizontal: Some(LineSegment::new(0, 100, 639, 110)),
            vertical: Some(vline()),
        }
    }

    fn no_lines() -> LineObservation {
        LineObservation::default()
    }

    /// Drives the navigator with a clock that always clears the dwell.
    struct Harness {
        nav: Navigator,
        motion: FakeMotion,
        now: Instant,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                nav: Navigator::default(),
                motion: FakeMotion::default(),
                now: Instant::now(),
            }
        }

        fn step(&mut self, snapshot: SensorSnapshot, lines: LineObservation) -> StepOutcome {
            let outcome = self.nav.step(self.now, &snapshot, &lines, &mut self.motion);
            self.now += DWELL;
            outcome
        }

        /// MoveForward → DecideRotation → GoForward → MoveForward one cell north.
        fn advance_one_cell(&mut self) {
            self.step(open(), at_junction());
            self.step(open(), following());
            self.step(open(), following());
            assert_eq!(self.nav.state(), NavState::MoveForward);
            self.motion.take();
        }
    }

    // ------------------------------------------------------------------ line following

    #[test]
    fn follows_line_without_transition() {
        let mut h = Harness::new();
        let out = h.step(open(), following());
        assert!(out.ran);
        assert!(!out.transitioned);
        assert_eq!(h.motion.take(), vec![Call::Correct]);
        assert_eq!(h.nav.state(), NavState::MoveForward);
    }

    #[test]
    fn horizontal_line_outside_band_is_ignored() {
        let mut h = Harness::new();
        for y in [20, 220, 300] {
            let lines = LineObservation {
                horizontal: Some(LineSegment::new(0, y, 639, y)),
                vertical: Some(vline()),
            };
            h.step(open(), lines);
            assert_eq!(h.nav.state(), NavState::MoveForward);
        }
    }

    #[test]
    fn junction_line_stops_and_decides() {
        let mut h = Harness::new();
        let out = h.step(open(), at_junction());
        assert_eq!(out.state_after, NavState::DecideRotation);
        assert_eq!(h.motion.take(), vec![Call::Stop]);
    }

    #[test]
    fn losing_the_line_ends_with_alert() {
        let mut h = Harness::new();
        h.step(open(), no_lines());
        assert_eq!(h.nav.state(), NavState::End);
        let report = h.nav.terminal_report().unwrap();
        assert_eq!(report.severity, Severity::Alert);
        assert_eq!(report.reason, "line lost");
    }

    // ------------------------------------------------------------------ dwell

    #[test]
    fn handler_waits_for_dwell_deadline() {
        let mut nav = Navigator::default();
        let mut motion = FakeMotion::default();
        let t0 = Instant::now();

        nav.step(t0, &open(), &at_junction(), &mut motion);
        motion.take();

        let early = nav.step(t0 + Duration::from_millis(749), &open(), &following(), &mut motion);
        assert!(!early.ran);
        assert!(motion.calls.is_empty());
        assert_eq!(nav.state(), NavState::DecideRotation);

        let due = nav.step(t0 + DWELL, &open(), &following(), &mut motion);
        assert!(due.ran);
        assert_eq!(nav.state(), NavState::GoForward);
    }

    // ------------------------------------------------------------------ junction policy

    #[test]
    fn starts_one_cell_north_of_the_seeded_origin() {
        let nav = Navigator::default();
        assert_eq!(nav.position(), Position::new(15, 14));
        assert_eq!(nav.heading(), Heading::North);
        assert_eq!(nav.grid().get(ORIGIN), Cell::VisitedHeading(Heading::North));
        assert!(nav.grid().is_unvisited(nav.position()));
    }

    #[test]
    fn open_junction_goes_forward_then_advances_north() {
        let mut h = Harness::new();
        h.step(open(), at_junction());
        h.motion.take();

        let out = h.step(open(), following());
        assert_eq!(out.state_after, NavState::GoForward);
        assert_eq!(h.motion.take(), vec![Call::Stop, Call::Forward(400)]);
        assert_eq!(
            h.nav.grid().get(Position::new(15, 14)),
            Cell::VisitedHeading(Heading::North)
        );

        h.step(open(), following());
        assert_eq!(h.nav.state(), NavState::MoveForward);
        assert_eq!(h.nav.position(), Position::new(15, 13));
        assert_eq!(h.nav.heading(), Heading::North);
    }

    #[test]
    fn first_junction_can_turn_left() {
        let mut h = Harness::new();
        h.step(open(), at_junction());
        h.step(ranges(30.0, 100.0, 100.0), following());

        // (14,14) is unvisited; the seeded obstacle sits beside the origin.
        assert_eq!(h.nav.state(), NavState::Go(Side::Left));
        assert_eq!(
            h.nav.grid().get(Position::new(15, 14)),
            Cell::VisitedHeading(Heading::West)
        );
    }

    #[test]
    fn forward_beats_left_and_right() {
        let mut h = Harness::new();
        h.advance_one_cell();
        // At (15,13): front, left and right all unvisited.
        h.step(open(), at_junction());
        h.motion.take();
        h.step(open(), following());
        assert_eq!(h.nav.state(), NavState::GoForward);
        assert_eq!(h.motion.take(), vec![Call::Stop, Call::Forward(400)]);
    }

    #[test]
    fn blocked_front_pushes_heading_and_turns_left() {
        let mut h = Harness::new();
        h.advance_one_cell();
        let here = h.nav.position();

        h.step(open(), at_junction());
        h.motion.take();
        h.step(ranges(30.0, 100.0, 10.0), following());

        assert_eq!(h.nav.state(), NavState::Go(Side::Left));
        assert_eq!(h.motion.take(), vec![Call::Stop, Call::Forward(1350)]);
        assert!(h.nav.grid().is_obstacle(here.step(Heading::North)));
        assert!(h.nav.grid().is_obstacle(here.step(Heading::East)));
        assert_eq!(h.nav.grid().get(here), Cell::VisitedHeading(Heading::West));
        assert_eq!(h.nav.backtrack().peek(), Some(Heading::North));
    }

    #[test]
    fn right_is_last_resort() {
        let mut h = Harness::new();
        let here = h.nav.position();
        h.step(open(), at_junction());
        h.step(ranges(30.0, 10.0, 100.0), following());
        assert_eq!(h.nav.state(), NavState::Go(Side::Right));
        assert_eq!(h.nav.grid().get(here), Cell::VisitedHeading(Heading::East));
    }

    #[test]
    fn dead_end_with_empty_stack_finishes_route() {
        let mut h = Harness::new();
        h.step(open(), at_junction());
        h.step(ranges(30.0, 10.0, 10.0), following());

        assert_eq!(h.nav.state(), NavState::End);
        let report = h.nav.terminal_report().unwrap();
        assert_eq!(report.severity, Severity::Warning);
        assert_eq!(report.reason, "route finished");
    }

    #[test]
    fn backtrack_takes_recorded_branch() {
        let mut h = Harness::new();
        h.advance_one_cell();
        let here = h.nav.position();
        h.nav.backtrack.push(Heading::West);

        h.step(open(), at_junction());
        h.motion.take();
        h.step(open(), following());

        // Front is open, but the recorded western branch wins.
        assert_eq!(h.nav.state(), NavState::Go(Side::Left));
        assert!(h.nav.backtrack().is_empty());
        assert_eq!(h.motion.take(), vec![Call::Stop, Call::Forward(1350)]);
        assert_eq!(h.nav.grid().get(here), Cell::VisitedHeading(Heading::West));
    }

    #[test]
    fn backtrack_ignored_when_branch_blocked() {
        let mut h = Harness::new();
        h.advance_one_cell();
        h.nav.backtrack.push(Heading::West);

        h.step(open(), at_junction());
        h.step(ranges(100.0, 10.0, 100.0), following());

        assert_eq!(h.nav.state(), NavState::GoForward);
        assert_eq!(h.nav.backtrack().peek(), Some(Heading::West));
    }

    // ------------------------------------------------------------------ turning

    fn into_turn(h: &mut Harness) {
        h.advance_one_cell();
        h.step(open(), at_junction());
        h.step(ranges(30.0, 100.0, 10.0), following());
        assert_eq!(h.nav.state(), NavState::Go(Side::Left));
        h.motion.take();
    }

    #[test]
    fn polling_states_wait_for_goal() {
        let mut h = Harness::new();
        into_turn(&mut h);
        h.motion.reached.extend([false, false]);

        let out = h.step(open(), following());
        assert!(!out.transitioned);
        h.step(open(), following());
        assert_eq!(h.nav.state(), NavState::Go(Side::Left));
        assert_eq!(h.motion.take(), vec![Call::DriveTowardGoal, Call::DriveTowardGoal]);
    }

    #[test]
    fn full_left_turn_sequence() {
        let mut h = Harness::new();
        into_turn(&mut h);
        let start = h.nav.position();

        h.step(open(), following());
        assert_eq!(h.nav.state(), NavState::LoseVLine(Side::Left));
        assert_eq!(h.motion.take(), vec![Call::DriveTowardGoal, Call::RotateLeft(700)]);

        // Old line still visible: keep rotating, re-entering the same state.
        let out = h.step(open(), following());
        assert!(out.transitioned);
        assert_eq!(out.state_after, NavState::LoseVLine(Side::Left));
        assert_eq!(h.motion.take(), vec![Call::DriveTowardGoal, Call::RotateLeft(700)]);

        h.step(open(), no_lines());
        assert_eq!(h.nav.state(), NavState::GetVLine(Side::Left));
        assert_eq!(h.motion.take(), vec![Call::DriveTowardGoal, Call::RotateLeft(700)]);

        h.step(open(), no_lines());
        assert_eq!(h.nav.state(), NavState::GetVLine(Side::Left));
        assert_eq!(h.motion.take(), vec![Call::DriveTowardGoal, Call::RotateLeft(300)]);

        h.step(open(), following());
        assert_eq!(h.nav.state(), NavState::Finish(Side::Left));
        assert_eq!(h.motion.take(), vec![Call::DriveTowardGoal, Call::Backward(400)]);

        h.step(open(), following());
        assert_eq!(h.nav.state(), NavState::MoveForward);
        assert_eq!(h.nav.heading(), Heading::West);
        assert_eq!(h.nav.position(), start.step(Heading::West));
    }

    #[test]
    fn alignment_nudges_toward_upright() {
        let mut h = Harness::new();
        into_turn(&mut h);
        h.step(open(), following());
        h.step(open(), no_lines());
        assert_eq!(h.nav.state(), NavState::GetVLine(Side::Left));
        h.motion.take();

        // Bottom at x=300 (y=479); top leans right beyond the band.
        let leaning_right = LineObservation {
            horizontal: None,
            vertical: Some(LineSegment::new(300, 479, 400, 0)),
        };
        h.step(open(), leaning_right);
        assert_eq!(h.motion.take(), vec![Call::DriveTowardGoal, Call::RotateLeft(100)]);
        assert_eq!(h.nav.state(), NavState::GetVLine(Side::Left));

        // Endpoints given top-first; top leans left beyond the band.
        let leaning_left = LineObservation {
            horizontal: None,
            vertical: Some(LineSegment::new(200, 0, 300, 479)),
        };
        h.step(open(), leaning_left);
        assert_eq!(h.motion.take(), vec![Call::DriveTowardGoal, Call::RotateRight(100)]);

        // Exactly on the band edge counts as upright.
        let upright = LineObservation {
            horizontal: None,
            vertical: Some(LineSegment::new(364, 0, 300, 479)),
        };
        h.step(open(), upright);
        assert_eq!(h.nav.state(), NavState::Finish(Side::Left));
    }

    #[test]
    fn right_turn_rotates_right() {
        let mut h = Harness::new();
        h.step(open(), at_junction());
        h.step(ranges(30.0, 10.0, 100.0), following());
        assert_eq!(h.nav.state(), NavState::Go(Side::Right));
        h.motion.take();

        h.step(open(), following());
        assert_eq!(h.motion.take(), vec![Call::DriveTowardGoal, Call::RotateRight(700)]);
        h.step(open(), no_lines());
        h.step(open(), following());
        h.step(open(), following());
        assert_eq!(h.nav.heading(), Heading::East);
        assert_eq!(h.nav.position(), Position::new(16, 14));
    }

    // ------------------------------------------------------------------ end

    #[test]
    fn end_announces_exactly_once() {
        let mut h = Harness::new();
        h.step(open(), no_lines());
        h.motion.take();

        let first = h.step(open(), no_lines());
        assert_eq!(first.report, Some(TerminalReport::alert("line lost")));
        assert_eq!(h.motion.take(), vec![Call::Stop, Call::Cleaning(false, false)]);

        for _ in 0..5 {
            let again = h.step(open(), following());
            assert!(again.report.is_none());
            assert!(!again.transitioned);
        }
        assert!(h.motion.take().is_empty());
        assert!(h.nav.is_finished());
    }

    #[test]
    fn end_switches_cleaning_off_even_when_stop_fails() {
        let mut h = Harness::new();
        h.step(open(), no_lines());
        h.motion.take();
        h.motion.fail_stop = true;

        let out = h.step(open(), no_lines());
        assert_eq!(out.report, Some(TerminalReport::alert("line lost")));
        assert_eq!(h.motion.take(), vec![Call::Cleaning(false, false)]);
        assert!(h.nav.is_finished());
    }

    #[test]
    fn hardware_failure_forces_internal_error() {
        let mut h = Harness::new();
        h.motion.fail = true;
        h.step(open(), following());
        assert_eq!(h.nav.state(), NavState::End);
        assert_eq!(h.nav.terminal_report(), Some(&TerminalReport::alert("internal error")));

        // The announcement still happens even though switching off fails.
        let out = h.step(open(), following());
        assert_eq!(out.report, Some(TerminalReport::alert("internal error")));
        assert_eq!(h.nav.state(), NavState::End);
    }

    #[test]
    fn state_names() {
        assert_eq!(NavState::Go(Side::Left).to_string(), "GoLeft");
        assert_eq!(NavState::GetVLine(Side::Right).to_string(), "RightGetVLine");
        assert_eq!(NavState::End.to_string(), "End");
    }

    #[test]
    fn config_defaults_fill_missing_fields() {
        let cfg: NavConfig = toml::from_str("dwell_ms = 500").unwrap();
        assert_eq!(cfg.dwell_ms, 500);
        assert_eq!(cfg.long_forward_steps, 1350);
        assert!((cfg.front_threshold_cm - 45.0).abs() < f32::EPSILON);
    }
}
