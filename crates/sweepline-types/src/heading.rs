//! Cardinal [`Heading`] and grid [`Position`] value types.
//!
//! Headings form a cyclic group of order four: turning left subtracts one
//! (mod 4), turning right adds one.  Offsets follow image/grid conventions
//! where `y` grows southwards, so North is `(0, -1)`.

use serde::{Deserialize, Serialize};

/// One of the four cardinal directions the robot can hold on the grid.
///
/// The discriminant is the grid index (`0..=3`); the exploration grid stores a
/// visited cell as `3 + index`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum Heading {
    #[default]
    North = 0,
    East = 1,
    South = 2,
    West = 3,
}

impl Heading {
    /// All headings in index order.
    pub const ALL: [Heading; 4] = [Heading::North, Heading::East, Heading::South, Heading::West];

    /// Build a heading from any integer, reduced mod 4.
    pub fn from_index(index: i32) -> Self {
        Self::ALL[index.rem_euclid(4) as usize]
    }

    /// Integer index in `0..=3`.
    pub fn index(self) -> u8 {
        self as u8
    }

    /// Heading after a quarter turn counter-clockwise.
    pub fn turn_left(self) -> Self {
        Self::from_index(self as i32 - 1)
    }

    /// Heading after a quarter turn clockwise.
    pub fn turn_right(self) -> Self {
        Self::from_index(self as i32 + 1)
    }

    /// Unit grid offset `(dx, dy)` for one step along this heading.
    pub fn offset(self) -> (i32, i32) {
        match self {
            Heading::North => (0, -1),
            Heading::East => (1, 0),
            Heading::South => (0, 1),
            Heading::West => (-1, 0),
        }
    }
}

impl std::fmt::Display for Heading {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Heading::North => "north",
            Heading::East => "east",
            Heading::South => "south",
            Heading::West => "west",
        };
        f.write_str(name)
    }
}

/// Integer grid coordinates of the robot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// The neighbouring position one step along `heading`.
    pub fn step(self, heading: Heading) -> Self {
        let (dx, dy) = heading.offset();
        Self::new(self.x + dx, self.y + dy)
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}
