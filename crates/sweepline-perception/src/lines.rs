//! Slope-ratio classification and averaging of detected segments.
//!
//! A segment is horizontal when its vertical extent is at most
//! [`SLOPE_RATIO`] of its horizontal extent, vertical in the mirrored case,
//! and diagonal otherwise.  Diagonals are discarded; each remaining class is
//! collapsed to its coordinate-wise mean.
//!
//! # Example
//!
//! ```rust
//! use sweepline_perception::{LineClass, classify, reduce};
//! use sweepline_types::LineSegment;
//!
//! let floor_line = LineSegment::new(0, 200, 639, 210);
//! assert_eq!(classify(&floor_line), LineClass::Horizontal);
//!
//! let obs = reduce(&[floor_line, LineSegment::new(318, 479, 322, 0)]);
//! assert!(obs.horizontal.is_some());
//! assert!(obs.vertical.is_some());
//! ```

use sweepline_types::{LineObservation, LineSegment};
use tracing::trace;

/// Maximum minor/major extent ratio for a segment to count as axis-aligned.
pub const SLOPE_RATIO: f64 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineClass {
    Horizontal,
    Vertical,
    Diagonal,
}

pub fn classify(segment: &LineSegment) -> LineClass {
    let dx = (segment.x2 - segment.x1).abs() as f64;
    let dy = (segment.y2 - segment.y1).abs() as f64;
    if dy <= SLOPE_RATIO * dx {
        LineClass::Horizontal
    } else if dx <= SLOPE_RATIO * dy {
        LineClass::Vertical
    } else {
        LineClass::Diagonal
    }
}

/// Coordinate-wise mean, truncated toward zero.  `None` for an empty slice.
pub fn average(segments: &[LineSegment]) -> Option<LineSegment> {
    if segments.is_empty() {
        return None;
    }
    let n = segments.len() as i64;
    let sum = segments.iter().fold([0i64; 4], |mut acc, s| {
        acc[0] += i64::from(s.x1);
        acc[1] += i64::from(s.y1);
        acc[2] += i64::from(s.x2);
        acc[3] += i64::from(s.y2);
        acc
    });
    // Integer division truncates toward zero; each mean lies within the i32
    // range of its inputs.
    Some(LineSegment::new(
        (sum[0] / n) as i32,
        (sum[1] / n) as i32,
        (sum[2] / n) as i32,
        (sum[3] / n) as i32,
    ))
}

/// Classify every candidate, drop diagonals and average each class.
pub fn reduce(segments: &[LineSegment]) -> LineObservation {
    let (mut horizontal, mut vertical) = (Vec::new(), Vec::new());
    for segment in segments {
        match classify(segment) {
            LineClass::Horizontal => horizontal.push(*segment),
            LineClass::Vertical => vertical.push(*segment),
            LineClass::Diagonal => {}
        }
    }
    trace!(
        candidates = segments.len(),
        horizontal = horizontal.len(),
        vertical = vertical.len(),
        "segments classified"
    );
    LineObservation {
        horizontal: average(&horizontal),
        vertical: average(&vertical),
    }
}
