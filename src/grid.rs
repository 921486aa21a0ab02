use evacuation_common::Cell;

use crate::error::GridError;
use crate::terrain::Mask;

/// Something that can hold a grid slot. Ids index the owning collections of the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Occupant {
    Building(usize),
    Evacuee(usize),
    /// Marker left by the hazard wave with this id.
    Hazard(usize),
}

/// Occupancy of the W×H lattice.
///
/// Every cell holds at most one occupant, except the safe zone which holds any
/// number. Prohibited cells are never reported empty for placement unless the
/// caller explicitly ignores the restriction.
#[derive(Debug, Clone)]
pub struct Grid {
    width: u32,
    height: u32,
    safe_zone: Cell,
    prohibited: Mask,
    slots: Vec<Option<Occupant>>,
    safe_zone_occupants: Vec<Occupant>,
}

impl Grid {
    pub fn new(width: u32, height: u32, safe_zone: Cell, prohibited: Mask) -> Result<Self, GridError> {
        if safe_zone.x >= width || safe_zone.y >= height {
            return Err(GridError::OutOfBounds { cell: safe_zone, width, height });
        }
        debug_assert_eq!(prohibited.dimensions(), (width, height));
        Ok(Grid {
            width,
            height,
            safe_zone,
            prohibited,
            slots: vec![None; width as usize * height as usize],
            safe_zone_occupants: Vec::new(),
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn safe_zone(&self) -> Cell {
        self.safe_zone
    }

    pub fn in_bounds(&self, cell: Cell) -> bool {
        cell.x < self.width && cell.y < self.height
    }

    #[inline(always)]
    fn slot_index(&self, cell: Cell) -> Result<usize, GridError> {
        if !self.in_bounds(cell) {
            return Err(GridError::OutOfBounds { cell, width: self.width, height: self.height });
        }
        Ok(cell.y as usize * self.width as usize + cell.x as usize)
    }

    /// True for the safe zone; false for prohibited cells (unless ignored); otherwise true iff unoccupied.
    pub fn is_empty(&self, cell: Cell, ignore_prohibited: bool) -> Result<bool, GridError> {
        let idx = self.slot_index(cell)?;
        if cell == self.safe_zone {
            return Ok(true);
        }
        if !ignore_prohibited && self.prohibited.is_set(cell) {
            return Ok(false);
        }
        Ok(self.slots[idx].is_none())
    }

    /// Current occupants of a cell.
    pub fn occupants(&self, cell: Cell) -> Result<&[Occupant], GridError> {
        let idx = self.slot_index(cell)?;
        if cell == self.safe_zone {
            return Ok(&self.safe_zone_occupants);
        }
        Ok(self.slots[idx].as_slice())
    }

    /// Places `occupant` into a free slot (the safe zone is always free).
    pub fn place(&mut self, occupant: Occupant, cell: Cell) -> Result<(), GridError> {
        let idx = self.slot_index(cell)?;
        if cell == self.safe_zone {
            self.safe_zone_occupants.push(occupant);
            return Ok(());
        }
        if let Some(existing) = self.slots[idx] {
            return Err(GridError::Occupied { cell, occupant: existing });
        }
        self.slots[idx] = Some(occupant);
        Ok(())
    }

    /// Writes `occupant` into the slot regardless of what is there.
    pub fn force_place(&mut self, occupant: Occupant, cell: Cell) -> Result<(), GridError> {
        let idx = self.slot_index(cell)?;
        if cell == self.safe_zone {
            self.safe_zone_occupants.push(occupant);
        } else {
            self.slots[idx] = Some(occupant);
        }
        Ok(())
    }

    /// Clears `occupant` from `cell`. Returns whether it was there.
    pub fn remove(&mut self, occupant: Occupant, cell: Cell) -> Result<bool, GridError> {
        let idx = self.slot_index(cell)?;
        if cell == self.safe_zone {
            let before = self.safe_zone_occupants.len();
            self.safe_zone_occupants.retain(|o| *o != occupant);
            return Ok(self.safe_zone_occupants.len() != before);
        }
        if self.slots[idx] == Some(occupant) {
            self.slots[idx] = None;
            return Ok(true);
        }
        Ok(false)
    }

    /// Moves `occupant` from `from` to `to`. On error nothing changes.
    pub fn move_occupant(&mut self, occupant: Occupant, from: Cell, to: Cell) -> Result<(), GridError> {
        self.slot_index(from)?;
        self.place(occupant, to)?;
        self.remove(occupant, from)?;
        Ok(())
    }

    /// In-bounds Moore neighbours within `radius`, excluding the cell itself.
    pub fn neighbors(&self, cell: Cell, radius: u32) -> Result<Vec<Cell>, GridError> {
        self.slot_index(cell)?;
        Ok(moore_neighbors(cell, radius, self.width, self.height).collect())
    }

    /// Every non-empty cell with its occupants, row-major; the safe zone is included when occupied.
    pub fn occupied_cells(&self) -> impl Iterator<Item = (Cell, &[Occupant])> + '_ {
        let width = self.width as usize;
        self.slots.iter().enumerate().filter_map(move |(idx, slot)| {
            let cell = Cell::new((idx % width) as u32, (idx / width) as u32);
            if cell == self.safe_zone {
                return (!self.safe_zone_occupants.is_empty())
                    .then_some((cell, self.safe_zone_occupants.as_slice()));
            }
            slot.as_ref().map(|o| (cell, std::slice::from_ref(o)))
        })
    }
}

/// Moore neighbourhood iterator shared with the pathfinder. Order: rows bottom to top, columns left to right.
pub fn moore_neighbors(cell: Cell, radius: u32, width: u32, height: u32) -> impl Iterator<Item = Cell> {
    let r = radius as i32;
    (-r..=r).flat_map(move |dy| {
        (-r..=r).filter_map(move |dx| {
            if dx == 0 && dy == 0 {
                return None;
            }
            cell.offset(dx, dy, width, height)
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid_5x5() -> Grid {
        let mut prohibited = Mask::empty(5, 5);
        prohibited.set(Cell::new(0, 4), true);
        Grid::new(5, 5, Cell::new(4, 4), prohibited).unwrap()
    }

    #[test]
    fn safe_zone_accepts_unlimited_occupants() {
        let mut grid = grid_5x5();
        let safe = grid.safe_zone();
        for id in 0..3 {
            grid.place(Occupant::Evacuee(id), safe).unwrap();
        }
        assert!(grid.is_empty(safe, false).unwrap());
        assert_eq!(grid.occupants(safe).unwrap().len(), 3);
        assert!(grid.remove(Occupant::Evacuee(1), safe).unwrap());
        assert_eq!(grid.occupants(safe).unwrap(), &[Occupant::Evacuee(0), Occupant::Evacuee(2)]);
    }

    #[test]
    fn prohibited_cells_are_not_empty_unless_ignored() {
        let grid = grid_5x5();
        let hill = Cell::new(0, 4);
        assert!(!grid.is_empty(hill, false).unwrap());
        assert!(grid.is_empty(hill, true).unwrap());
    }

    #[test]
    fn place_into_occupied_cell_fails() {
        let mut grid = grid_5x5();
        let cell = Cell::new(2, 2);
        grid.place(Occupant::Building(0), cell).unwrap();
        assert_eq!(
            grid.place(Occupant::Evacuee(0), cell),
            Err(GridError::Occupied { cell, occupant: Occupant::Building(0) })
        );
        assert!(!grid.is_empty(cell, true).unwrap());
    }

    #[test]
    fn force_place_overwrites() {
        let mut grid = grid_5x5();
        let cell = Cell::new(1, 1);
        grid.place(Occupant::Evacuee(3), cell).unwrap();
        grid.force_place(Occupant::Hazard(0), cell).unwrap();
        assert_eq!(grid.occupants(cell).unwrap(), &[Occupant::Hazard(0)]);
    }

    #[test]
    fn out_of_bounds_is_an_error() {
        let mut grid = grid_5x5();
        let outside = Cell::new(5, 0);
        assert!(matches!(grid.is_empty(outside, false), Err(GridError::OutOfBounds { .. })));
        assert!(matches!(grid.place(Occupant::Evacuee(0), outside), Err(GridError::OutOfBounds { .. })));
        assert!(matches!(grid.neighbors(outside, 1), Err(GridError::OutOfBounds { .. })));
    }

    #[test]
    fn move_keeps_single_occupancy() {
        let mut grid = grid_5x5();
        let (a, b) = (Cell::new(0, 0), Cell::new(1, 0));
        grid.place(Occupant::Evacuee(0), a).unwrap();
        grid.place(Occupant::Evacuee(1), b).unwrap();
        assert!(grid.move_occupant(Occupant::Evacuee(0), a, b).is_err());
        assert_eq!(grid.occupants(a).unwrap(), &[Occupant::Evacuee(0)]);

        grid.move_occupant(Occupant::Evacuee(0), a, Cell::new(1, 1)).unwrap();
        assert!(grid.is_empty(a, false).unwrap());
        assert_eq!(grid.occupied_cells().count(), 2);
    }

    #[test]
    fn neighbors_are_clipped_to_bounds() {
        let grid = grid_5x5();
        assert_eq!(grid.neighbors(Cell::new(0, 0), 1).unwrap().len(), 3);
        assert_eq!(grid.neighbors(Cell::new(2, 2), 1).unwrap().len(), 8);
        assert_eq!(grid.neighbors(Cell::new(2, 2), 2).unwrap().len(), 24);
        assert_eq!(grid.neighbors(Cell::new(4, 2), 1).unwrap().len(), 5);
    }
}
