//! [`SafetyVerifier`] – motion interlock / rule engine.
//!
//! After the navigation handler has issued its commands for the cycle, the
//! orchestrator passes a [`DriveState`] through [`SafetyVerifier::verify`].
//! Every registered [`Rule`] is evaluated in order; the first violation
//! returns a [`SweepError::Interlock`] and the caller must stop the motors.

use sweepline_hal::DriveAction;
use sweepline_types::{SensorSnapshot, SweepError};

/// What the interlock looks at: the sensors and what the wheels were last
/// told to do.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriveState {
    pub snapshot: SensorSnapshot,
    pub last_action: DriveAction,
}

// ────────────────────────────────────────────────────────────────────────────
// Rule trait
// ────────────────────────────────────────────────────────────────────────────

/// A single physical invariant that must hold after every cycle.
///
/// Implement this trait to create custom safety rules and add them to a
/// [`SafetyVerifier`] via [`SafetyVerifier::add_rule`].
pub trait Rule: Send + Sync {
    /// Human-readable name used in fault messages.
    fn name(&self) -> &str;

    /// Return `Ok(())` when the invariant holds, or
    /// [`SweepError::Interlock`] when it is violated.
    fn check(&self, state: &DriveState) -> Result<(), SweepError>;
}

// ────────────────────────────────────────────────────────────────────────────
// SafetyVerifier
// ────────────────────────────────────────────────────────────────────────────

/// Rule engine evaluated once per control cycle.
///
/// # Example
///
/// ```
/// use sweepline_hal::DriveAction;
/// use sweepline_kernel::interlock::{DriveState, SafetyVerifier};
/// use sweepline_types::SensorSnapshot;
///
/// let verifier = SafetyVerifier::standard();
///
/// let mut snapshot = SensorSnapshot::default();
/// snapshot.stair_drop = true;
///
/// let backing_off = DriveState { snapshot, last_action: DriveAction::Reverse };
/// assert!(verifier.verify(&backing_off).is_ok());
///
/// let pushing_on = DriveState { snapshot, last_action: DriveAction::Correcting };
/// assert!(verifier.verify(&pushing_on).is_err());
/// ```
#[derive(Default)]
pub struct SafetyVerifier {
    rules: Vec<Box<dyn Rule>>,
}

impl SafetyVerifier {
    /// Create an empty verifier with no rules.
    pub fn new() -> Self {
        Self::default()
    }

    /// A verifier carrying the built-in [`StairDropRule`].
    pub fn standard() -> Self {
        let mut verifier = Self::new();
        verifier.add_rule(Box::new(StairDropRule));
        verifier
    }

    /// Register a new [`Rule`].  Rules are evaluated in insertion order.
    pub fn add_rule(&mut self, rule: Box<dyn Rule>) {
        self.rules.push(rule);
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Returns the first violation encountered, or `Ok(())` when all rules
    /// pass.
    pub fn verify(&self, state: &DriveState) -> Result<(), SweepError> {
        for rule in &self.rules {
            rule.check(state)?;
        }
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Built-in rules
// ────────────────────────────────────────────────────────────────────────────

/// Violated while the stair-drop sensor is active unless both wheels are
/// reversing.  An idle or already-stopped drive is also flagged so the stop
/// is re-asserted every cycle the drop persists.
///
/// The exemption covers any command that reverses both wheels, not only an
/// explicit reverse drive: a backward step goal (such as the settle after a
/// turn) and the lost-line fallback of line correction both pass.
pub struct StairDropRule;

impl Rule for StairDropRule {
    fn name(&self) -> &str {
        "stair_drop"
    }

    fn check(&self, state: &DriveState) -> Result<(), SweepError> {
        if state.snapshot.stair_drop && state.last_action != DriveAction::Reverse {
            return Err(SweepError::Interlock {
                rule: self.name().to_string(),
                details: format!("drop sensed while last action was {:?}", state.last_action),
            });
        }
        Ok(())
    }
}
