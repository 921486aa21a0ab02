//! Landslide wave: a frontier automaton advancing at a fractional speed.

use evacuation_common::{Cell, SimEvent, WaveDirection};
use log::{debug, trace};

use crate::building::Building;
use crate::error::GridError;
use crate::evacuee::Evacuee;
use crate::grid::{Grid, Occupant};
use crate::terrain::{base_cells, Mask};

/// Candidate offsets for one frontier cell: front-diagonal, front, other
/// front-diagonal, then the two sides. Cells behind the wave are never candidates.
pub fn fan(direction: WaveDirection) -> [(i32, i32); 5] {
    match direction {
        WaveDirection::Up => [(-1, 1), (0, 1), (1, 1), (-1, 0), (1, 0)],
        WaveDirection::Down => [(1, -1), (0, -1), (-1, -1), (1, 0), (-1, 0)],
        WaveDirection::Left => [(-1, -1), (-1, 0), (-1, 1), (0, -1), (0, 1)],
        WaveDirection::Right => [(1, 1), (1, 0), (1, -1), (0, 1), (0, -1)],
    }
}

/// One landslide front spreading through a single connected hazard component.
#[derive(Debug, Clone)]
pub struct HazardWave {
    /// Creation index, also stamped on grid markers and impact events.
    pub id: usize,
    /// `"{area}#{component}"`.
    pub name: String,
    direction: WaveDirection,
    /// Cells the wave may ever claim.
    eligibility: Mask,
    speed_cells_per_tick: f64,
    /// Banked fractional progress, always below 1 between ticks.
    accumulator: f64,
    /// Cells claimed during the latest expanding tick.
    frontier: Vec<Cell>,
    /// Cells already considered; never considered again.
    visited: Mask,
    claimed_total: usize,
}

impl HazardWave {
    /// `eligibility` bounds every cell the wave may ever claim.
    pub fn new(
        id: usize,
        name: impl Into<String>,
        direction: WaveDirection,
        eligibility: Mask,
        speed_cells_per_tick: f64,
    ) -> Self {
        let (width, height) = eligibility.dimensions();
        HazardWave {
            id,
            name: name.into(),
            direction,
            eligibility,
            speed_cells_per_tick,
            accumulator: 0.0,
            frontier: Vec::new(),
            visited: Mask::empty(width, height),
            claimed_total: 0,
        }
    }

    pub fn direction(&self) -> WaveDirection {
        self.direction
    }

    pub fn frontier(&self) -> &[Cell] {
        &self.frontier
    }

    pub fn visited(&self) -> &Mask {
        &self.visited
    }

    pub fn eligibility(&self) -> &Mask {
        &self.eligibility
    }

    pub fn accumulator(&self) -> f64 {
        self.accumulator
    }

    /// Cells force-placed by this wave so far, seeding included.
    pub fn claimed_total(&self) -> usize {
        self.claimed_total
    }

    pub fn is_exhausted(&self) -> bool {
        self.frontier.is_empty()
    }

    fn occupant(&self) -> Occupant {
        Occupant::Hazard(self.id)
    }

    /// Places the wave on the trailing edge of its eligibility region.
    /// Base cells holding a building bury it instead of being claimed.
    pub fn seed(&mut self, grid: &mut Grid, buildings: &mut [Building]) -> Result<(), GridError> {
        let region: Vec<Cell> = self.eligibility.cells().collect();
        for cell in base_cells(&region, self.direction) {
            self.visited.set(cell, true);
            for occupant in grid.occupants(cell)?.to_vec() {
                if let Occupant::Building(id) = occupant {
                    if let Some(building) = buildings.get_mut(id) {
                        building.buried = true;
                    }
                }
            }
            if grid.is_empty(cell, true)? {
                grid.force_place(self.occupant(), cell)?;
                self.frontier.push(cell);
                self.claimed_total += 1;
            }
        }
        debug!("wave '{}' seeded with {} frontier cells", self.name, self.frontier.len());
        Ok(())
    }

    /// One tick of expansion. Returns the number of cells claimed.
    pub fn expand(
        &mut self,
        grid: &mut Grid,
        buildings: &mut [Building],
        evacuees: &mut [Evacuee],
        tick: u64,
        out: &mut Vec<SimEvent>,
    ) -> Result<usize, GridError> {
        self.accumulator += self.speed_cells_per_tick;
        let expansions = self.accumulator.floor();
        if expansions < 1.0 {
            return Ok(0);
        }
        self.accumulator -= expansions;

        let offsets = fan(self.direction);
        let (width, height) = (grid.width(), grid.height());
        let mut claimed_this_tick = Vec::new();
        let mut current = std::mem::take(&mut self.frontier);

        for _ in 0..expansions as u64 {
            let mut claimed = Vec::new();
            for &cell in &current {
                for (dx, dy) in offsets {
                    let Some(next) = cell.offset(dx, dy, width, height) else {
                        continue;
                    };
                    if !self.eligibility.is_set(next) || self.visited.is_set(next) {
                        continue;
                    }
                    self.visited.set(next, true);

                    for occupant in grid.occupants(next)?.to_vec() {
                        match occupant {
                            Occupant::Building(id) => {
                                if let Some(building) = buildings.get_mut(id) {
                                    building.buried = true;
                                }
                            }
                            Occupant::Evacuee(id) => {
                                if let Some(evacuee) = evacuees.get_mut(id) {
                                    if evacuee.kill(self.id, tick, out) {
                                        trace!("wave '{}' hit evacuee {} at {}", self.name, id, next);
                                        grid.remove(occupant, next)?;
                                    }
                                }
                            }
                            Occupant::Hazard(_) => {}
                        }
                    }

                    if grid.is_empty(next, true)? {
                        grid.force_place(self.occupant(), next)?;
                        claimed.push(next);
                    }
                }
            }
            if claimed.is_empty() {
                break;
            }
            claimed_this_tick.extend_from_slice(&claimed);
            current = claimed;
        }

        self.claimed_total += claimed_this_tick.len();
        self.frontier = claimed_this_tick;
        Ok(self.frontier.len())
    }
}
