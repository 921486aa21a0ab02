use evacuation_common::Cell;

/// Static obstacle covering one cell. Never scheduled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Building {
    pub id: usize,
    pub pos: Cell,
    /// Set once a hazard wave reaches the cell; the building stays in place.
    pub buried: bool,
}

impl Building {
    pub fn new(id: usize, pos: Cell) -> Self {
        Building { id, pos, buried: false }
    }
}
