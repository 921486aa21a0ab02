use serde::{Deserialize, Serialize};
use std::fmt;

/// Integer lattice coordinate. `x` is the column, `y` the row; `y` grows "up".
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Cell {
    pub x: u32,
    pub y: u32,
}

impl Cell {
    /// Creates a new Cell.
    pub const fn new(x: u32, y: u32) -> Self {
        Cell { x, y }
    }

    /// Returns the cell shifted by `(dx, dy)`, or `None` if the result leaves a `width`x`height` lattice.
    pub fn offset(&self, dx: i32, dy: i32, width: u32, height: u32) -> Option<Cell> {
        let x = i64::from(self.x) + i64::from(dx);
        let y = i64::from(self.y) + i64::from(dy);
        if x < 0 || y < 0 || x >= i64::from(width) || y >= i64::from(height) {
            return None;
        }
        Some(Cell::new(x as u32, y as u32))
    }

    /// Manhattan (L1) distance.
    pub fn manhattan_distance(&self, other: Cell) -> u32 {
        self.x.abs_diff(other.x) + self.y.abs_diff(other.y)
    }

    /// Chebyshev (L-infinity) distance, i.e. the 8-connected hop count on an open lattice.
    pub fn chebyshev_distance(&self, other: Cell) -> u32 {
        self.x.abs_diff(other.x).max(self.y.abs_diff(other.y))
    }

    /// Euclidean distance between cell centres, in cells.
    pub fn euclidean_distance(&self, other: Cell) -> f64 {
        let dx = f64::from(self.x.abs_diff(other.x));
        let dy = f64::from(self.y.abs_diff(other.y));
        (dx * dx + dy * dy).sqrt()
    }
}

impl From<[u32; 2]> for Cell {
    fn from(value: [u32; 2]) -> Self {
        Cell::new(value[0], value[1])
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}
