//! `sweepline-perception` – line-segment reduction for the guide-line follower.
//!
//! The camera pipeline (edge detection, probabilistic Hough transform) lives
//! outside this workspace and hands over raw candidate segments.  This crate
//! turns those candidates into the single horizontal and single vertical line
//! that navigation consumes.
//!
//! # Modules
//!
//! - [`lines`] – [`classify`][lines::classify] by slope ratio,
//!   [`average`][lines::average] per class and [`reduce`][lines::reduce] into
//!   a [`LineObservation`][sweepline_types::LineObservation].

pub mod lines;

pub use lines::{LineClass, average, classify, reduce};
