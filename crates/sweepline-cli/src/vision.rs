//! Vision input: one JSON object per line on stdin.
//!
//! The camera pipeline runs as a separate process and pipes its per-frame
//! result in either form:
//!
//! ```text
//! {"horizontal": [0, 100, 639, 110], "vertical": [320, 479, 320, 0]}
//! {"segments": [[0, 100, 639, 110], [318, 479, 322, 0]]}
//! ```
//!
//! The first is an already-reduced observation (either key may be `null` or
//! absent); the second carries raw candidate segments.

use serde::Deserialize;
use sweepline_types::{LineObservation, LineSegment, SweepError};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum VisionFrame {
    Segments { segments: Vec<LineSegment> },
    Reduced(LineObservation),
}

/// Parse one input line.  Blank lines yield `Ok(None)`.
pub fn parse_line(line: &str) -> Result<Option<VisionFrame>, SweepError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(line)
        .map(Some)
        .map_err(|e| SweepError::Serialization(format!("bad vision frame: {e}")))
}
