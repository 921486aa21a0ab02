use anyhow::{anyhow, Result};
use evacuation_common::{
    Cell, MobilityClass, RunSummary, SimEvent, SimParams, SimulationConfig, TerminationReason,
};
use log::{debug, info, trace, warn};
use rand::prelude::*;
use rand::seq::IndexedRandom;

use crate::building::Building;
use crate::error::{GridError, SetupError};
use crate::evacuee::{EvacueeState, Evacuee, MovementContext};
use crate::grid::{Grid, Occupant};
use crate::hazard::HazardWave;
use crate::report::Reporter;
use crate::terrain::{Field, Mask, Terrain};

/// Manages the state and execution of one evacuation run.
///
/// A tick freezes the dynamic obstacles, lets every active evacuee act, then
/// expands every wave. All randomness comes from the instance's own seeded
/// generator, so a seed fully determines the run.
#[derive(Debug)]
pub struct Simulation {
    /// The simulation configuration this run was built from.
    config: SimulationConfig,
    /// Runtime parameters derived from `config`.
    params: SimParams,
    /// Seed of `rng`, reported in the summary.
    seed: u64,
    /// Static layers: elevation, building footprints, preferred paths.
    terrain: Terrain,
    /// Slot occupancy of every entity.
    grid: Grid,
    /// Indexed by building id.
    buildings: Vec<Building>,
    /// Indexed by agent id; iteration order is the activation order.
    evacuees: Vec<Evacuee>,
    /// Creation order is the expansion order.
    waves: Vec<HazardWave>,
    /// Single source of randomness for placement and movement.
    rng: StdRng,
    /// Ticks completed so far.
    tick: u64,
    /// Cleared once a termination condition is met.
    running: bool,
    /// Buildings plus wave frontiers, rebuilt at the start of every tick.
    obstacles: Mask,
    /// Number of report thresholds already fired.
    thresholds_fired: usize,
    /// Setup events not yet handed to a reporter.
    pending: Vec<SimEvent>,
    /// Final summary, set when the run stops.
    outcome: Option<RunSummary>,
}

impl Simulation {
    /// Creates a run with `population.num_agents` evacuees at random free cells.
    pub fn new(config: &SimulationConfig, terrain: &Terrain, seed: u64) -> Result<Self> {
        let mut sim = Self::assemble(config, terrain, seed)?;
        sim.spawn_random()?;
        sim.log_setup();
        Ok(sim)
    }

    /// Creates a run with evacuees at the given cells, ids following the slice order.
    /// Prohibited cells are rejected with [`SetupError::ProhibitedSpawn`].
    pub fn with_roster(
        config: &SimulationConfig,
        terrain: &Terrain,
        seed: u64,
        roster: &[(Cell, MobilityClass)],
    ) -> Result<Self> {
        let mut sim = Self::assemble(config, terrain, seed)?;
        for &(cell, mobility) in roster {
            if cell != sim.params.safe_zone && sim.terrain.prohibited.is_set(cell) {
                return Err(SetupError::ProhibitedSpawn(cell).into());
            }
            sim.add_evacuee(cell, mobility)?;
        }
        sim.log_setup();
        Ok(sim)
    }

    /// Grid, buildings and waves; no evacuees yet.
    fn assemble(config: &SimulationConfig, terrain: &Terrain, seed: u64) -> Result<Self> {
        config.validate()?;
        let params = config.get_sim_params();
        let (width, height) = (params.width, params.height);
        terrain.validate(width, height)?;
        if params.safe_zone.x >= width || params.safe_zone.y >= height {
            return Err(SetupError::SafeZoneOutOfBounds(params.safe_zone).into());
        }

        let rng = StdRng::seed_from_u64(seed);
        let mut grid = Grid::new(width, height, params.safe_zone, terrain.prohibited.clone())?;

        // Buildings come straight from the obstacle mask.
        let mut buildings = Vec::with_capacity(terrain.obstacles.count());
        for cell in terrain.obstacles.cells() {
            let id = buildings.len();
            grid.place(Occupant::Building(id), cell)?;
            buildings.push(Building::new(id, cell));
        }

        let mut waves = Vec::new();
        for area_idx in config.hazard.active_area_indices() {
            let area = config
                .hazard
                .areas
                .get(area_idx)
                .ok_or(SetupError::UnknownHazardArea(area_idx))?;
            let mask = terrain
                .hazard_masks
                .get(area_idx)
                .ok_or(SetupError::UnknownHazardArea(area_idx))?;
            let components = mask.components();
            let selected: Vec<usize> = match &area.components {
                Some(list) => list.clone(),
                None => (0..components.len()).collect(),
            };
            let speed = config.hazard_cells_per_tick(area);
            for component in selected {
                let cells = components.get(component).ok_or_else(|| SetupError::UnknownHazardComponent {
                    area: area.name.clone(),
                    component,
                    available: components.len(),
                })?;
                let mut wave = HazardWave::new(
                    waves.len(),
                    format!("{}#{}", area.name, component),
                    area.direction,
                    Mask::from_cells(width, height, cells),
                    speed,
                );
                wave.seed(&mut grid, &mut buildings)?;
                debug!(
                    "Wave {} '{}' heading {:?} at {:.3} cells/tick, {} eligible cells.",
                    wave.id,
                    wave.name,
                    wave.direction(),
                    speed,
                    cells.len()
                );
                waves.push(wave);
            }
        }

        Ok(Simulation {
            config: config.clone(),
            obstacles: terrain.obstacles.clone(),
            params,
            seed,
            terrain: terrain.clone(),
            grid,
            buildings,
            evacuees: Vec::new(),
            waves,
            rng,
            tick: 0,
            running: true,
            thresholds_fired: 0,
            pending: Vec::new(),
            outcome: None,
        })
    }

    fn add_evacuee(&mut self, cell: Cell, mobility: MobilityClass) -> Result<(), GridError> {
        let id = self.evacuees.len();
        self.grid.place(Occupant::Evacuee(id), cell)?;
        self.evacuees.push(Evacuee::new(id, mobility, cell));
        self.pending.push(SimEvent::Spawned { agent: id, mobility, cell });
        Ok(())
    }

    /// Random free, non-prohibited, non-safe-zone cells; occupied picks are retried.
    fn spawn_random(&mut self) -> Result<()> {
        let needed = self.params.num_agents as usize;
        let safe_zone = self.params.safe_zone;
        let mut available = 0;
        for y in 0..self.params.height {
            for x in 0..self.params.width {
                let cell = Cell::new(x, y);
                if cell != safe_zone && self.grid.is_empty(cell, false)? {
                    available += 1;
                }
            }
        }
        if available < needed {
            return Err(SetupError::InsufficientSpace { needed, available }.into());
        }

        for _ in 0..needed {
            let mobility = if self.rng.random::<f64>() < self.params.pwd_ratio {
                *MobilityClass::IMPAIRED
                    .choose(&mut self.rng)
                    .unwrap_or(&MobilityClass::Unimpaired)
            } else {
                MobilityClass::Unimpaired
            };

            loop {
                let cell = Cell::new(
                    self.rng.random_range(0..self.params.width),
                    self.rng.random_range(0..self.params.height),
                );
                if cell == safe_zone || self.terrain.prohibited.is_set(cell) {
                    continue;
                }
                match self.add_evacuee(cell, mobility) {
                    Ok(()) => break,
                    Err(GridError::Occupied { .. }) => continue,
                    Err(e) => return Err(e.into()),
                }
            }
        }
        Ok(())
    }

    fn log_setup(&self) {
        info!(
            "Simulation seed {} initialized: {}x{} grid, {} buildings, {} evacuees ({} impaired), {} hazard waves.",
            self.seed,
            self.params.width,
            self.params.height,
            self.buildings.len(),
            self.evacuees.len(),
            self.evacuees.iter().filter(|e| e.mobility.is_impaired()).count(),
            self.waves.len()
        );
        debug!(
            "Tick = {:.3} s, budget {} ticks ({:.0} s).",
            self.params.seconds_per_tick,
            self.params.max_ticks,
            self.params.max_ticks as f64 * self.params.seconds_per_tick
        );
    }

    /// Advances the simulation by one tick.
    pub fn step(&mut self, reporter: &mut dyn Reporter) -> Result<()> {
        if !self.running {
            return Ok(());
        }
        for event in self.pending.drain(..) {
            reporter.record(&event);
        }

        // --- 1. Freeze dynamic obstacles ---
        self.refresh_obstacles();

        let mut events = Vec::new();

        // --- 2. Evacuees act against the frozen snapshot ---
        {
            let mut ctx = MovementContext {
                grid: &mut self.grid,
                elevation: &self.terrain.elevation,
                buildings: &self.terrain.obstacles,
                paths: &self.terrain.paths,
                obstacles: &self.obstacles,
                params: &self.params.movement,
                tick: self.tick,
            };
            for evacuee in self.evacuees.iter_mut().filter(|e| e.is_active()) {
                evacuee.step(&mut ctx, &mut self.rng, &mut events)?;
            }
        }

        // --- 3. Hazard expansion ---
        if self.params.hazard_enabled {
            for wave in &mut self.waves {
                wave.expand(&mut self.grid, &mut self.buildings, &mut self.evacuees, self.tick, &mut events)?;
            }
        }

        // --- 4. Collision sweep ---
        self.sweep_frontiers(&mut events)?;

        for event in &events {
            trace!("tick {}: {:?}", self.tick, event);
            reporter.record(event);
        }

        self.tick += 1;
        let elapsed_s = self.elapsed_s();

        // --- 5. Intermediate reports ---
        while let Some(&threshold) = self.params.report_thresholds_s.get(self.thresholds_fired) {
            if elapsed_s < threshold {
                break;
            }
            debug!("Report threshold {:.0} s reached at tick {}.", threshold, self.tick);
            reporter.checkpoint(self.tick, threshold)?;
            self.thresholds_fired += 1;
        }

        // --- 6. Termination ---
        let active = self.evacuees.iter().filter(|e| e.is_active()).count();
        trace!(
            "Tick {} done: {} active evacuees, {} frontier cells.",
            self.tick,
            active,
            self.waves.iter().map(|w| w.frontier().len()).sum::<usize>()
        );
        if active == 0 {
            self.finish(TerminationReason::AllDone, reporter)?;
        } else if self.tick >= self.params.max_ticks {
            self.finish(TerminationReason::TimeLimit, reporter)?;
        }
        Ok(())
    }

    /// Runs ticks until a termination condition is met.
    pub fn run(&mut self, reporter: &mut dyn Reporter) -> Result<RunSummary> {
        while self.running {
            self.step(reporter)?;
        }
        self.outcome
            .clone()
            .ok_or_else(|| anyhow!("simulation seed {} stopped without a summary", self.seed))
    }

    fn refresh_obstacles(&mut self) {
        self.obstacles.copy_from(&self.terrain.obstacles);
        for wave in &self.waves {
            for &cell in wave.frontier() {
                self.obstacles.set(cell, true);
            }
        }
    }

    /// Kills evacuees left standing on a frontier cell after expansion.
    /// Waves only claim empty slots and kill what they visit, so with the current
    /// placement rules this finds nobody; a hit means an evacuee and a wave share a cell.
    fn sweep_frontiers(&mut self, events: &mut Vec<SimEvent>) -> Result<(), GridError> {
        let mut owner: Field<Option<usize>> = Field::filled(self.params.width, self.params.height, None);
        for wave in &self.waves {
            for &cell in wave.frontier() {
                owner.set(cell, Some(wave.id));
            }
        }
        for evacuee in &mut self.evacuees {
            if matches!(evacuee.state(), EvacueeState::Dead | EvacueeState::Evacuated) {
                continue;
            }
            let Some(&Some(wave)) = owner.get(evacuee.pos) else {
                continue;
            };
            if evacuee.kill(wave, self.tick, events) {
                warn!("Evacuee {} caught on frontier of wave {} at {}.", evacuee.id, wave, evacuee.pos);
                self.grid.remove(evacuee.occupant(), evacuee.pos)?;
            }
        }
        Ok(())
    }

    fn finish(&mut self, reason: TerminationReason, reporter: &mut dyn Reporter) -> Result<()> {
        let summary = self.summary(reason);
        reporter.finish(&summary)?;
        info!(
            "Simulation seed {} stopped after {} ticks ({:.0} s): {:?}.",
            self.seed, self.tick, summary.elapsed_s, reason
        );
        self.outcome = Some(summary);
        self.running = false;
        Ok(())
    }

    fn summary(&self, reason: TerminationReason) -> RunSummary {
        let count = |state: EvacueeState| self.evacuees.iter().filter(|e| e.state() == state).count();
        RunSummary {
            seed: self.seed,
            ticks: self.tick,
            seconds_per_tick: self.params.seconds_per_tick,
            elapsed_s: self.elapsed_s(),
            total_agents: self.evacuees.len(),
            evacuated: count(EvacueeState::Evacuated),
            dead: count(EvacueeState::Dead),
            stuck: count(EvacueeState::Stuck),
            remaining: self.evacuees.iter().filter(|e| e.is_active()).count(),
            waves: self.waves.len(),
            cells_claimed: self.waves.iter().map(HazardWave::claimed_total).sum(),
            buildings_buried: self.buildings.iter().filter(|b| b.buried).count(),
            reason,
        }
    }

    /// Verifies that grid slots and entity positions agree.
    pub fn check_invariants(&self) -> Result<()> {
        for (cell, occupants) in self.grid.occupied_cells() {
            if cell != self.grid.safe_zone() && occupants.len() > 1 {
                anyhow::bail!("cell {} holds {} occupants", cell, occupants.len());
            }
            for occupant in occupants {
                match *occupant {
                    Occupant::Evacuee(id) => {
                        let evacuee = self.evacuees.get(id).ok_or_else(|| anyhow!("unknown evacuee {}", id))?;
                        if evacuee.pos != cell || !evacuee.is_alive() {
                            anyhow::bail!("evacuee {} recorded at {} but found at {}", id, evacuee.pos, cell);
                        }
                    }
                    Occupant::Building(id) => {
                        let building = self.buildings.get(id).ok_or_else(|| anyhow!("unknown building {}", id))?;
                        if building.pos != cell {
                            anyhow::bail!("building {} recorded at {} but found at {}", id, building.pos, cell);
                        }
                    }
                    Occupant::Hazard(id) => {
                        let wave = self.waves.get(id).ok_or_else(|| anyhow!("unknown wave {}", id))?;
                        if !wave.visited().is_set(cell) {
                            anyhow::bail!("wave {} occupies unvisited cell {}", id, cell);
                        }
                    }
                }
            }
        }
        for evacuee in self.evacuees.iter().filter(|e| e.is_alive()) {
            if !self.grid.occupants(evacuee.pos)?.contains(&evacuee.occupant()) {
                anyhow::bail!("evacuee {} missing from its cell {}", evacuee.id, evacuee.pos);
            }
        }
        for wave in &self.waves {
            if wave.frontier().iter().any(|&c| !wave.visited().is_set(c)) {
                anyhow::bail!("wave {} frontier escapes its visited set", wave.id);
            }
            if wave.visited().cells().any(|c| !wave.eligibility().is_set(c)) {
                anyhow::bail!("wave {} visited a cell outside its eligibility mask", wave.id);
            }
        }
        Ok(())
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Simulated seconds elapsed.
    pub fn elapsed_s(&self) -> f64 {
        self.tick as f64 * self.params.seconds_per_tick
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn params(&self) -> &SimParams {
        &self.params
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn evacuees(&self) -> &[Evacuee] {
        &self.evacuees
    }

    pub fn buildings(&self) -> &[Building] {
        &self.buildings
    }

    pub fn waves(&self) -> &[HazardWave] {
        &self.waves
    }

    /// Combined obstacle mask used by the most recent tick.
    pub fn obstacles(&self) -> &Mask {
        &self.obstacles
    }

    pub fn outcome(&self) -> Option<&RunSummary> {
        self.outcome.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use evacuation_common::{HazardAreaConfig, WaveDirection};

    fn row_wave() -> (SimulationConfig, Terrain) {
        let mut config = SimulationConfig::default();
        config.grid.width = 6;
        config.grid.height = 3;
        config.grid.safe_zone = Some([5, 2]);
        config.output.save_report = false;
        config.hazard.areas = vec![HazardAreaConfig {
            name: "row".into(),
            mask: None,
            direction: WaveDirection::Left,
            speed_mps: 0.0,
            speed_cells_per_tick: Some(1.0),
            components: None,
        }];
        let mut terrain = Terrain::open(6, 3);
        let row: Vec<Cell> = (0..6).map(|x| Cell::new(x, 0)).collect();
        terrain.hazard_masks = vec![Mask::from_cells(6, 3, &row)];
        (config, terrain)
    }

    #[test]
    fn sweep_kills_an_evacuee_sharing_a_frontier_cell() {
        let (config, terrain) = row_wave();
        let mut sim =
            Simulation::with_roster(&config, &terrain, 1, &[(Cell::new(0, 2), MobilityClass::Unimpaired)]).unwrap();
        assert_eq!(sim.waves[0].frontier(), &[Cell::new(5, 0)]);

        // bypass the grid so the evacuee ends up on the wave's cell
        sim.evacuees[0].pos = Cell::new(5, 0);
        let mut events = Vec::new();
        sim.sweep_frontiers(&mut events).unwrap();

        assert_eq!(sim.evacuees[0].state(), EvacueeState::Dead);
        assert_eq!(
            events,
            vec![SimEvent::HazardImpact { agent: 0, cell: Cell::new(5, 0), tick: 0, wave: 0 }]
        );

        // a second sweep finds nobody left to kill
        events.clear();
        sim.sweep_frontiers(&mut events).unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn sweep_leaves_evacuees_off_the_frontier_alone() {
        let (config, terrain) = row_wave();
        let mut sim =
            Simulation::with_roster(&config, &terrain, 1, &[(Cell::new(4, 0), MobilityClass::Unimpaired)]).unwrap();
        let mut events = Vec::new();
        sim.sweep_frontiers(&mut events).unwrap();
        assert!(events.is_empty());
        assert!(sim.evacuees[0].is_active());
    }
}
