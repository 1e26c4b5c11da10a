//! [`CleaningCycle`] – one control cycle per camera frame.
//!
//! Each call to [`CleaningCycle::run_cycle`]:
//!
//! 1. **Sense** – poll the [`TelemetryDecoder`] into the cycle's
//!    [`SensorSnapshot`].
//! 2. **Supervise** – sample the [`SensorMonitors`]; a fired monitor may
//!    switch cleaning off.
//! 3. **Navigate** – run the [`Navigator`] handler against the same snapshot
//!    and the caller's line observation.
//! 4. **Interlock** – check the [`SafetyVerifier`] and stop the wheels on a
//!    violation.
//! 5. **Report** – publish telemetry, state changes, terminal reports and
//!    alerts on the [`EventBus`].
//!
//! There is no internal scheduler: the caller supplies `now` and decides how
//! often to call.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use sweepline_hal::{
    DriveConfig, DriveController, PollOutcome, SerialLink, TelemetryDecoder,
};
use sweepline_kernel::{DriveState, MonitorConfig, SafetyVerifier, SensorMonitors};
use sweepline_middleware::{EventBus, Topic};
use sweepline_types::{
    Event, EventPayload, LineObservation, LineSegment, SensorAlert, SensorSnapshot, SweepError,
    TerminalReport,
};
use tracing::{debug, info, warn};

use crate::navigator::{Motion, NavConfig, NavState, Navigator};

const EVENT_SOURCE: &str = "sweepline-runtime::cycle";

// ────────────────────────────────────────────────────────────────────────────
// Configuration
// ────────────────────────────────────────────────────────────────────────────

/// Every tunable of the control cycle, one table per concern.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CycleConfig {
    pub navigation: NavConfig,
    pub drive: DriveConfig,
    pub monitors: MonitorConfig,
}

// ────────────────────────────────────────────────────────────────────────────
// Hardware context
// ────────────────────────────────────────────────────────────────────────────

/// The serial link plus everything derived from it: the decoder, the latest
/// snapshot and the drive controller.
///
/// Implements [`Motion`] so the navigator's maneuvers are computed from the
/// snapshot refreshed at the start of the cycle.
pub struct Hardware<L: SerialLink> {
    link: L,
    decoder: TelemetryDecoder,
    snapshot: SensorSnapshot,
    drive: DriveController,
}

impl<L: SerialLink> Hardware<L> {
    pub fn new(link: L, drive: DriveConfig) -> Self {
        Self {
            link,
            decoder: TelemetryDecoder::new(),
            snapshot: SensorSnapshot::default(),
            drive: DriveController::new(drive),
        }
    }

    pub fn poll_telemetry(&mut self) -> Result<PollOutcome, SweepError> {
        self.decoder.poll(&mut self.link, &mut self.snapshot)
    }

    pub fn snapshot(&self) -> SensorSnapshot {
        self.snapshot
    }

    pub fn drive(&self) -> &DriveController {
        &self.drive
    }

    pub fn decoder(&self) -> &TelemetryDecoder {
        &self.decoder
    }
}

impl<L: SerialLink> Motion for Hardware<L> {
    fn forward(&mut self, steps: i32) {
        self.drive.forward(&self.snapshot, steps);
    }

    fn backward(&mut self, steps: i32) {
        self.drive.backward(&self.snapshot, steps);
    }

    fn rotate_left(&mut self, steps: i32) {
        self.drive.rotate_left(&self.snapshot, steps);
    }

    fn rotate_right(&mut self, steps: i32) {
        self.drive.rotate_right(&self.snapshot, steps);
    }

    fn drive_toward_goal(&mut self) -> Result<bool, SweepError> {
        self.drive.drive_toward_goal(&mut self.link, &self.snapshot)
    }

    fn forwards_with_correction(&mut self, vline: Option<&LineSegment>) -> Result<(), SweepError> {
        self.drive.forwards_with_correction(&mut self.link, vline)
    }

    fn stop(&mut self) -> Result<(), SweepError> {
        self.drive.stop(&mut self.link)
    }

    fn set_cleaning(&mut self, brush_on: bool, suction_on: bool) -> Result<(), SweepError> {
        self.drive.set_cleaning(&mut self.link, brush_on, suction_on)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// CleaningCycle
// ────────────────────────────────────────────────────────────────────────────

/// What one [`CleaningCycle::run_cycle`] did.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleSummary {
    pub telemetry: PollOutcome,
    pub state_before: NavState,
    pub state_after: NavState,
    /// The navigation handler ran (the dwell deadline had passed).
    pub handler_ran: bool,
    pub report: Option<TerminalReport>,
    pub alerts: Vec<SensorAlert>,
    /// The interlock forced a stop this cycle.
    pub interlock_tripped: bool,
}

/// Single-threaded orchestrator of sensing, navigation and supervision.
pub struct CleaningCycle<L: SerialLink> {
    hardware: Hardware<L>,
    navigator: Navigator,
    verifier: SafetyVerifier,
    monitors: SensorMonitors,
    bus: EventBus,
    cycles: u64,
}

impl<L: SerialLink> CleaningCycle<L> {
    pub fn new(link: L, config: &CycleConfig, bus: EventBus) -> Self {
        Self {
            hardware: Hardware::new(link, config.drive.clone()),
            navigator: Navigator::new(config.navigation.clone()),
            verifier: SafetyVerifier::standard(),
            monitors: SensorMonitors::new(&config.monitors),
            bus,
            cycles: 0,
        }
    }

    /// Bring the robot to a known state before the first cycle: wheels stopped
    /// and brush/suction set as requested.
    pub fn start(&mut self, cleaning: bool) -> Result<(), SweepError> {
        info!(port = self.hardware.link.name(), cleaning, "starting cleaning run");
        self.hardware.stop()?;
        self.hardware.set_cleaning(cleaning, cleaning)
    }

    /// Run one full control cycle at `now` with this frame's line observation.
    ///
    /// # Errors
    ///
    /// Serial link faults while polling telemetry, applying a monitor's
    /// cleaning shutdown or enforcing the interlock.  Faults inside the
    /// navigation handler end the run with an "internal error" report instead.
    pub fn run_cycle(
        &mut self,
        now: Instant,
        lines: &LineObservation,
    ) -> Result<CycleSummary, SweepError> {
        self.cycles += 1;

        // ── 1. Sense ─────────────────────────────────────────────────────────
        let telemetry = self.hardware.poll_telemetry()?;
        let snapshot = self.hardware.snapshot();
        if telemetry == PollOutcome::Updated {
            self.publish(Topic::Telemetry, EventPayload::Telemetry(snapshot));
        }

        // ── 2. Supervise ─────────────────────────────────────────────────────
        let monitor_report = self.monitors.sample(now, &snapshot);
        for alert in &monitor_report.alerts {
            self.publish(Topic::Alerts, EventPayload::SensorAlert(alert.clone()));
        }
        if monitor_report.disable_cleaning {
            let actuators = self.hardware.drive().actuators();
            if actuators.brush_on || actuators.suction_on {
                info!("sensor alert switched cleaning off");
                self.hardware.set_cleaning(false, false)?;
            }
        }

        // ── 3. Navigate ──────────────────────────────────────────────────────
        let outcome = self
            .navigator
            .step(now, &snapshot, lines, &mut self.hardware);
        if outcome.transitioned {
            self.publish(
                Topic::Navigation,
                EventPayload::StateChange {
                    from: outcome.state_before.to_string(),
                    to: outcome.state_after.to_string(),
                    heading: self.navigator.heading(),
                    position: self.navigator.position(),
                },
            );
        }
        if let Some(report) = &outcome.report {
            self.publish(Topic::Alerts, EventPayload::Terminal(report.clone()));
        }

        // ── 4. Interlock ─────────────────────────────────────────────────────
        let state = DriveState {
            snapshot,
            last_action: self.hardware.drive().last_action(),
        };
        let interlock_tripped = match self.verifier.verify(&state) {
            Ok(()) => false,
            Err(e) => {
                warn!(error = %e, "interlock tripped, stopping");
                self.hardware.stop()?;
                true
            }
        };

        debug!(
            cycle = self.cycles,
            telemetry = ?telemetry,
            state = %outcome.state_after,
            ran = outcome.ran,
            "cycle complete"
        );

        Ok(CycleSummary {
            telemetry,
            state_before: outcome.state_before,
            state_after: outcome.state_after,
            handler_ran: outcome.ran,
            report: outcome.report,
            alerts: monitor_report.alerts,
            interlock_tripped,
        })
    }

    /// [`run_cycle`][Self::run_cycle] on raw candidate segments, reduced to
    /// one horizontal and one vertical line first.
    pub fn run_frame(
        &mut self,
        now: Instant,
        segments: &[LineSegment],
    ) -> Result<CycleSummary, SweepError> {
        let lines = sweepline_perception::reduce(segments);
        self.run_cycle(now, &lines)
    }

    /// Motors stopped, brush and suction off.  Safe to call at any time.
    pub fn neutralize(&mut self) -> Result<(), SweepError> {
        info!("neutralizing drive and actuators");
        self.hardware.stop()?;
        self.hardware.set_cleaning(false, false)
    }

    pub fn navigator(&self) -> &Navigator {
        &self.navigator
    }

    pub fn hardware(&self) -> &Hardware<L> {
        &self.hardware
    }

    pub fn bus(&self) -> EventBus {
        self.bus.clone()
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    fn publish(&self, topic: Topic, payload: EventPayload) {
        // Best-effort publish – no subscribers is not an error.
        let _ = self.bus.publish_to(topic, Event::new(EVENT_SOURCE, payload));
    }
}
