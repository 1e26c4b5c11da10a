//! Sensor-condition monitors.
//!
//! The bin-level, humidity and stair-drop sensors are noisy single bits.  A
//! [`SustainedConditionMonitor`] keeps a rolling window of the last *N*
//! samples of one bit and fires only when the whole window holds the trigger
//! value, then stays quiet for its cooldown.
//!
//! [`SensorMonitors`] bundles the three production monitors and rate-limits
//! sampling to one sample per [`MonitorConfig::sample_period_ms`], however
//! often the control cycle runs.
//!
//! | Monitor | Fires when | Cooldown | Disables cleaning |
//! |---|---|---|---|
//! | `stair_blockage` | stair-drop held `true` | 20 s | no |
//! | `bin_full` | bin-level held `false` | 180 s | yes |
//! | `floor_humidity` | humidity held `false` | 60 s | yes |

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use sweepline_types::{SensorAlert, SensorSnapshot, Severity};
use tracing::{debug, warn};

// ────────────────────────────────────────────────────────────────────────────
// Configuration
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub sample_period_ms: u64,
    pub window: usize,
    pub stair_cooldown_secs: u64,
    pub bin_cooldown_secs: u64,
    pub humidity_cooldown_secs: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            sample_period_ms: 50,
            window: 20,
            stair_cooldown_secs: 20,
            bin_cooldown_secs: 180,
            humidity_cooldown_secs: 60,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Signals
// ────────────────────────────────────────────────────────────────────────────

/// The single-bit sensors a monitor can watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    StairDrop,
    BinLevel,
    Humidity,
}

impl Signal {
    fn read(self, snapshot: &SensorSnapshot) -> bool {
        match self {
            Signal::StairDrop => snapshot.stair_drop,
            Signal::BinLevel => snapshot.bin_level,
            Signal::Humidity => snapshot.humidity,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// SustainedConditionMonitor
// ────────────────────────────────────────────────────────────────────────────

/// Fires when one bit has held its trigger value for a full window.
pub struct SustainedConditionMonitor {
    name: String,
    signal: Signal,
    trigger: bool,
    message: String,
    disables_cleaning: bool,
    window_len: usize,
    cooldown: Duration,
    history: VecDeque<bool>,
    last_fired: Option<Instant>,
}

impl SustainedConditionMonitor {
    pub fn new(
        name: impl Into<String>,
        signal: Signal,
        trigger: bool,
        window_len: usize,
        cooldown: Duration,
        message: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            signal,
            trigger,
            message: message.into(),
            disables_cleaning: false,
            window_len: window_len.max(1),
            cooldown,
            history: VecDeque::with_capacity(window_len.max(1)),
            last_fired: None,
        }
    }

    /// Mark this monitor as one that must switch brush and suction off.
    pub fn disabling_cleaning(mut self) -> Self {
        self.disables_cleaning = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn disables_cleaning(&self) -> bool {
        self.disables_cleaning
    }

    /// Record one sample.  Returns an alert when the window is full, every
    /// entry equals the trigger and the cooldown has elapsed.
    pub fn record(&mut self, now: Instant, snapshot: &SensorSnapshot) -> Option<SensorAlert> {
        self.history.push_back(self.signal.read(snapshot));
        while self.history.len() > self.window_len {
            self.history.pop_front();
        }
        if !self.is_sustained() {
            return None;
        }
        if let Some(last) = self.last_fired
            && now < last + self.cooldown
        {
            debug!(monitor = %self.name, "condition sustained, alert cooling down");
            return None;
        }
        self.last_fired = Some(now);
        warn!(monitor = %self.name, message = %self.message, "sensor alert");
        Some(SensorAlert {
            monitor: self.name.clone(),
            severity: Severity::Alert,
            message: self.message.clone(),
        })
    }

    /// `true` when the window is full and uniformly equal to the trigger.
    pub fn is_sustained(&self) -> bool {
        self.history.len() == self.window_len && self.history.iter().all(|&v| v == self.trigger)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// SensorMonitors
// ────────────────────────────────────────────────────────────────────────────

/// Outcome of one [`SensorMonitors::sample`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonitorReport {
    pub alerts: Vec<SensorAlert>,
    /// At least one fired monitor requires brush and suction off.
    pub disable_cleaning: bool,
}

/// The production set of monitors with a shared sampling clock.
pub struct SensorMonitors {
    monitors: Vec<SustainedConditionMonitor>,
    period: Duration,
    next_sample: Option<Instant>,
}

impl SensorMonitors {
    pub fn new(config: &MonitorConfig) -> Self {
        let window = config.window;
        let monitors = vec![
            SustainedConditionMonitor::new(
                "stair_blockage",
                Signal::StairDrop,
                true,
                window,
                Duration::from_secs(config.stair_cooldown_secs),
                "blockage detected",
            ),
            SustainedConditionMonitor::new(
                "bin_full",
                Signal::BinLevel,
                false,
                window,
                Duration::from_secs(config.bin_cooldown_secs),
                "dust bin nearly full",
            )
            .disabling_cleaning(),
            SustainedConditionMonitor::new(
                "floor_humidity",
                Signal::Humidity,
                false,
                window,
                Duration::from_secs(config.humidity_cooldown_secs),
                "high floor humidity detected",
            )
            .disabling_cleaning(),
        ];
        Self {
            monitors,
            period: Duration::from_millis(config.sample_period_ms),
            next_sample: None,
        }
    }

    /// Feed the snapshot to every monitor if a sample is due at `now`.
    /// Calls between sample instants return an empty report.
    pub fn sample(&mut self, now: Instant, snapshot: &SensorSnapshot) -> MonitorReport {
        if let Some(next) = self.next_sample
            && now < next
        {
            return MonitorReport::default();
        }
        self.next_sample = Some(now + self.period);

        let mut report = MonitorReport::default();
        for monitor in &mut self.monitors {
            if let Some(alert) = monitor.record(now, snapshot) {
                report.disable_cleaning |= monitor.disables_cleaning();
                report.alerts.push(alert);
            }
        }
        report
    }
}

impl Default for SensorMonitors {
    fn default() -> Self {
        Self::new(&MonitorConfig::default())
    }
}
