//! [`BacktrackStack`] – headings of junctions the robot left unexplored.
//!
//! When the robot reaches a junction whose front is blocked, it pushes its
//! current heading before turning away.  At a later junction, if the top of the
//! stack names the direction of a free side branch, the robot pops it and
//! takes that branch, unwinding back toward the blocked junction.
//!
//! ```rust
//! use sweepline_runtime::backtrack::BacktrackStack;
//! use sweepline_types::Heading;
//!
//! let mut stack = BacktrackStack::new();
//! stack.push(Heading::North);
//! stack.push(Heading::East);
//!
//! assert_eq!(stack.pop_if(Heading::North), None);
//! assert_eq!(stack.pop_if(Heading::East), Some(Heading::East));
//! assert_eq!(stack.peek(), Some(Heading::North));
//! ```

use sweepline_types::Heading;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BacktrackStack {
    headings: Vec<Heading>,
}

impl BacktrackStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, heading: Heading) {
        self.headings.push(heading);
    }

    pub fn peek(&self) -> Option<Heading> {
        self.headings.last().copied()
    }

    pub fn pop(&mut self) -> Option<Heading> {
        self.headings.pop()
    }

    /// Pop the top only when it equals `heading`.
    pub fn pop_if(&mut self, heading: Heading) -> Option<Heading> {
        if self.peek() == Some(heading) {
            self.headings.pop()
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.headings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headings.is_empty()
    }
}
