//! `sweepline-runtime` – the navigation core and its control cycle.
//!
//! | Module | Responsibility |
//! |---|---|
//! | [`grid`] | [`ExplorationGrid`]: 32×32 map of visited cells and obstacles |
//! | [`backtrack`] | [`BacktrackStack`]: headings of junctions left unexplored |
//! | [`navigator`] | [`Navigator`]: line-following exploration state machine |
//! | [`cycle`] | [`CleaningCycle`]: telemetry, monitors, navigation and interlock, once per frame |
//! | [`observability`] | `tracing` subscriber and optional OTLP export |

pub mod backtrack;
pub mod cycle;
pub mod grid;
pub mod navigator;
pub mod observability;

pub use backtrack::BacktrackStack;
pub use cycle::{CleaningCycle, CycleConfig, CycleSummary, Hardware};
pub use grid::{Cell, ExplorationGrid, GRID_SIZE, ORIGIN};
pub use navigator::{Motion, NavConfig, NavState, Navigator, Side, StepOutcome};
