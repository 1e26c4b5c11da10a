//! `sweepline-middleware` – outbound event fan-out.
//!
//! The navigation core runs on a single cooperative thread and never waits on
//! consumers.  Reports, alerts, state changes and telemetry snapshots are
//! handed to the [`EventBus`], and whoever cares (the CLI's report printer, an
//! alert-delivery collaborator, tests) subscribes to the relevant [`Topic`].

pub mod bus;

pub use bus::{EventBus, Topic, TopicReceiver};
