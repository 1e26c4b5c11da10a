//! [`ExplorationGrid`] – bounded occupancy map used for maze-style coverage.
//!
//! A fixed 32×32 array of [`Cell`] classifications indexed `(x, y)` with `y`
//! growing southwards.  A fresh grid has [`ORIGIN`] marked as visited North
//! and its western neighbour marked as an obstacle; the robot itself begins
//! one cell north of the origin, facing North.
//!
//! Cells never revert to [`Cell::Unvisited`]: the API has no way to write it.
//! Out-of-range coordinates read as [`Cell::Obstacle`] and ignore writes, so
//! the edge of the map behaves like a wall.

use serde::{Deserialize, Serialize};
use sweepline_types::{Heading, Position};

pub const GRID_SIZE: usize = 32;

/// Seeded start cell; the first junction is decided one cell north of it.
pub const ORIGIN: Position = Position::new(15, 15);

/// Classification of one grid cell.
///
/// The raw encoding is `Unvisited=0`, `Detected=1`, `Obstacle=2`,
/// `VisitedHeading(h)=3+h`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Cell {
    #[default]
    Unvisited,
    /// Reserved: representable but never written by navigation.
    Detected,
    Obstacle,
    /// Visited, leaving along the given heading.
    VisitedHeading(Heading),
}

impl Cell {
    pub fn raw(self) -> u8 {
        match self {
            Cell::Unvisited => 0,
            Cell::Detected => 1,
            Cell::Obstacle => 2,
            Cell::VisitedHeading(h) => 3 + h.index(),
        }
    }

    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Cell::Unvisited),
            1 => Some(Cell::Detected),
            2 => Some(Cell::Obstacle),
            3..=6 => Some(Cell::VisitedHeading(Heading::from_index(i32::from(raw - 3)))),
            _ => None,
        }
    }
}

/// Fixed-size exploration map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExplorationGrid {
    cells: [[Cell; GRID_SIZE]; GRID_SIZE],
}

impl ExplorationGrid {
    /// A fresh map with the origin visited and its western neighbour blocked.
    pub fn new() -> Self {
        let mut grid = Self {
            cells: [[Cell::Unvisited; GRID_SIZE]; GRID_SIZE],
        };
        grid.mark_visited(ORIGIN, Heading::North);
        grid.mark_obstacle(ORIGIN.step(Heading::North.turn_left()));
        grid
    }

    fn index(pos: Position) -> Option<(usize, usize)> {
        let x = usize::try_from(pos.x).ok().filter(|&x| x < GRID_SIZE)?;
        let y = usize::try_from(pos.y).ok().filter(|&y| y < GRID_SIZE)?;
        Some((x, y))
    }

    pub fn in_bounds(pos: Position) -> bool {
        Self::index(pos).is_some()
    }

    /// Cell at `pos`; [`Cell::Obstacle`] outside the map.
    pub fn get(&self, pos: Position) -> Cell {
        match Self::index(pos) {
            Some((x, y)) => self.cells[y][x],
            None => Cell::Obstacle,
        }
    }

    pub fn is_unvisited(&self, pos: Position) -> bool {
        self.get(pos) == Cell::Unvisited
    }

    pub fn is_obstacle(&self, pos: Position) -> bool {
        self.get(pos) == Cell::Obstacle
    }

    pub fn mark_obstacle(&mut self, pos: Position) {
        self.set(pos, Cell::Obstacle);
    }

    pub fn mark_visited(&mut self, pos: Position, heading: Heading) {
        self.set(pos, Cell::VisitedHeading(heading));
    }

    pub fn mark_detected(&mut self, pos: Position) {
        self.set(pos, Cell::Detected);
    }

    fn set(&mut self, pos: Position, cell: Cell) {
        if let Some((x, y)) = Self::index(pos) {
            self.cells[y][x] = cell;
        }
    }

    /// Number of cells that are not [`Cell::Unvisited`].
    pub fn explored_count(&self) -> usize {
        self.cells
            .iter()
            .flatten()
            .filter(|c| **c != Cell::Unvisited)
            .count()
    }
}

impl Default for ExplorationGrid {
    fn default() -> Self {
        Self::new()
    }
}
