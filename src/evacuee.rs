//! Per-agent movement model.

use evacuation_common::{Cell, MobilityClass, MovementParams, SimEvent};
use log::trace;
use rand::Rng;

use crate::error::GridError;
use crate::grid::{Grid, Occupant};
use crate::pathfinding::find_path;
use crate::terrain::{Field, Mask};

/// Lifecycle of an evacuee. Everything except `Idle` and `Moving` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvacueeState {
    Idle,
    Moving,
    Evacuated,
    Dead,
    Stuck,
}

impl EvacueeState {
    pub fn is_terminal(self) -> bool {
        matches!(self, EvacueeState::Evacuated | EvacueeState::Dead | EvacueeState::Stuck)
    }
}

/// Read-only world state an evacuee decides against, plus the shared grid.
pub struct MovementContext<'a> {
    pub grid: &'a mut Grid,
    pub elevation: &'a Field<f64>,
    /// Static building footprints.
    pub buildings: &'a Mask,
    pub paths: &'a Mask,
    /// Buildings plus hazard frontiers, frozen at the start of the tick.
    pub obstacles: &'a Mask,
    pub params: &'a MovementParams,
    pub tick: u64,
}

/// One pedestrian agent.
#[derive(Debug, Clone)]
pub struct Evacuee {
    /// Unique id, also the activation order.
    pub id: usize,
    pub mobility: MobilityClass,
    /// Current cell; kept in sync with the grid slot while alive.
    pub pos: Cell,
    state: EvacueeState,
    /// Set once a wave reached this evacuee.
    impacted: bool,
    /// Consecutive ticks without a move.
    stuck_attempts: u32,
    /// Position at the start of the previous tick.
    previous_pos: Option<Cell>,
    /// Tick of the first movement decision.
    pub evacuation_start_tick: Option<u64>,
    /// Tick the safe zone was reached.
    pub evacuation_end_tick: Option<u64>,
}

/// Multiplicative walking penalty for a height difference `slope` between two cells.
pub fn slope_penalty(slope: f64, params: &MovementParams) -> f64 {
    if slope > 0.0 {
        1.0 + slope * params.uphill_factor
    } else if slope < 0.0 {
        1.0 + slope.abs() * params.downhill_factor
    } else {
        1.0
    }
}

/// `base_speed^exponent / slope_penalty`.
pub fn effective_speed(base_speed: f64, slope: f64, params: &MovementParams) -> f64 {
    base_speed.powi(params.speed_exponent) / slope_penalty(slope, params)
}

impl Evacuee {
    pub fn new(id: usize, mobility: MobilityClass, pos: Cell) -> Self {
        Evacuee {
            id,
            mobility,
            pos,
            state: EvacueeState::Idle,
            impacted: false,
            stuck_attempts: 0,
            previous_pos: None,
            evacuation_start_tick: None,
            evacuation_end_tick: None,
        }
    }

    pub fn state(&self) -> EvacueeState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        !self.state.is_terminal()
    }

    pub fn is_alive(&self) -> bool {
        self.state != EvacueeState::Dead
    }

    pub fn impacted(&self) -> bool {
        self.impacted
    }

    pub fn stuck_attempts(&self) -> u32 {
        self.stuck_attempts
    }

    pub fn occupant(&self) -> Occupant {
        Occupant::Evacuee(self.id)
    }

    /// Runs one tick of the movement model. No-op in a terminal state.
    pub fn step<R: Rng + ?Sized>(
        &mut self,
        ctx: &mut MovementContext<'_>,
        rng: &mut R,
        out: &mut Vec<SimEvent>,
    ) -> Result<(), GridError> {
        if self.state.is_terminal() {
            return Ok(());
        }

        let safe_zone = ctx.grid.safe_zone();
        if self.pos == safe_zone {
            self.finish_evacuation(ctx.tick, out);
            return Ok(());
        }

        if self.state == EvacueeState::Idle {
            self.state = EvacueeState::Moving;
            self.evacuation_start_tick = Some(ctx.tick);
            out.push(SimEvent::EvacuationStarted { agent: self.id, cell: self.pos, tick: ctx.tick });
        }

        if self.previous_pos != Some(self.pos) {
            self.stuck_attempts = 0;
        }
        self.previous_pos = Some(self.pos);

        let mut moved = false;
        let route = find_path(self.pos, safe_zone, ctx.paths, ctx.obstacles);
        if let Some(&next) = route.as_deref().and_then(|path| path.get(1)) {
            let slope = ctx.elevation[next] - ctx.elevation[self.pos];
            let speed = effective_speed(self.mobility.base_speed(), slope, ctx.params);
            let is_building = ctx.buildings.is_set(next);
            let passes_speed_check = rng.random::<f64>() < speed.max(ctx.params.min_move_probability);

            if !is_building && passes_speed_check && ctx.grid.is_empty(next, false)? {
                ctx.grid.move_occupant(self.occupant(), self.pos, next)?;
                out.push(SimEvent::Moved { agent: self.id, from: self.pos, to: next, tick: ctx.tick });
                self.pos = next;
                moved = true;
                if next == safe_zone {
                    self.finish_evacuation(ctx.tick, out);
                }
            }
        }

        if moved {
            self.stuck_attempts = 0;
        } else if self.previous_pos == Some(self.pos) {
            self.stuck_attempts += 1;
            if self.stuck_attempts >= ctx.params.stuck_threshold {
                self.state = EvacueeState::Stuck;
                trace!("evacuee {} stuck at {} after {} attempts", self.id, self.pos, self.stuck_attempts);
                out.push(SimEvent::Stuck {
                    agent: self.id,
                    cell: self.pos,
                    tick: ctx.tick,
                    attempts: self.stuck_attempts,
                });
            }
        }
        Ok(())
    }

    fn finish_evacuation(&mut self, tick: u64, out: &mut Vec<SimEvent>) {
        if self.state == EvacueeState::Evacuated {
            return;
        }
        self.state = EvacueeState::Evacuated;
        self.evacuation_end_tick = Some(tick);
        out.push(SimEvent::EvacuationEnded { agent: self.id, cell: self.pos, tick });
    }

    /// Hazard contact. Evacuated agents are out of reach and left untouched.
    /// Returns whether the evacuee was killed; the caller clears its grid slot.
    pub(crate) fn kill(&mut self, wave: usize, tick: u64, out: &mut Vec<SimEvent>) -> bool {
        if matches!(self.state, EvacueeState::Evacuated | EvacueeState::Dead) {
            return false;
        }
        self.state = EvacueeState::Dead;
        self.impacted = true;
        out.push(SimEvent::HazardImpact { agent: self.id, cell: self.pos, tick, wave });
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn params(stuck_threshold: u32) -> MovementParams {
        MovementParams {
            uphill_factor: 2.45,
            downhill_factor: 2.0,
            min_move_probability: 0.75,
            speed_exponent: 2,
            stuck_threshold,
        }
    }

    struct World {
        grid: Grid,
        elevation: Field<f64>,
        buildings: Mask,
        paths: Mask,
    }

    impl World {
        fn open(size: u32) -> Self {
            let safe = Cell::new(size - 1, size - 1);
            World {
                grid: Grid::new(size, size, safe, Mask::empty(size, size)).unwrap(),
                elevation: Field::filled(size, size, 0.0),
                buildings: Mask::empty(size, size),
                paths: Mask::empty(size, size),
            }
        }

        fn tick(&mut self, evacuee: &mut Evacuee, params: &MovementParams, tick: u64, rng: &mut StdRng) -> Vec<SimEvent> {
            let obstacles = self.buildings.clone();
            let mut ctx = MovementContext {
                grid: &mut self.grid,
                elevation: &self.elevation,
                buildings: &self.buildings,
                paths: &self.paths,
                obstacles: &obstacles,
                params,
                tick,
            };
            let mut out = Vec::new();
            evacuee.step(&mut ctx, rng, &mut out).unwrap();
            out
        }
    }

    #[test]
    fn slope_penalty_is_asymmetric() {
        let p = params(40);
        assert_eq!(slope_penalty(0.0, &p), 1.0);
        assert!((slope_penalty(0.5, &p) - 2.225).abs() < 1e-12);
        assert!((slope_penalty(-0.5, &p) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn effective_speed_squares_base_speed() {
        let p = params(40);
        assert!((effective_speed(0.4, 0.0, &p) - 0.16).abs() < 1e-12);
        assert!((effective_speed(1.0, 1.0, &p) - 1.0 / 3.45).abs() < 1e-12);
    }

    #[test]
    fn terminal_states() {
        assert!(!EvacueeState::Idle.is_terminal());
        assert!(!EvacueeState::Moving.is_terminal());
        assert!(EvacueeState::Evacuated.is_terminal());
        assert!(EvacueeState::Dead.is_terminal());
        assert!(EvacueeState::Stuck.is_terminal());
    }

    #[test]
    fn evacuee_on_safe_zone_is_evacuated_once() {
        let mut world = World::open(4);
        let p = params(40);
        let mut rng = StdRng::seed_from_u64(1);
        let safe = world.grid.safe_zone();
        let mut evacuee = Evacuee::new(0, MobilityClass::Unimpaired, safe);
        world.grid.place(evacuee.occupant(), safe).unwrap();

        let first = world.tick(&mut evacuee, &p, 0, &mut rng);
        assert_eq!(first, vec![SimEvent::EvacuationEnded { agent: 0, cell: safe, tick: 0 }]);
        assert_eq!(evacuee.state(), EvacueeState::Evacuated);

        let second = world.tick(&mut evacuee, &p, 1, &mut rng);
        assert!(second.is_empty());
        assert_eq!(evacuee.evacuation_end_tick, Some(0));
    }

    #[test]
    fn unimpaired_walker_moves_every_tick_on_flat_ground() {
        let mut world = World::open(4);
        let p = params(40);
        let mut rng = StdRng::seed_from_u64(7);
        let start = Cell::new(0, 0);
        let mut evacuee = Evacuee::new(0, MobilityClass::Unimpaired, start);
        world.grid.place(evacuee.occupant(), start).unwrap();

        let events = world.tick(&mut evacuee, &p, 0, &mut rng);
        assert_eq!(events[0], SimEvent::EvacuationStarted { agent: 0, cell: start, tick: 0 });
        assert_eq!(events[1], SimEvent::Moved { agent: 0, from: start, to: Cell::new(1, 1), tick: 0 });
        assert_eq!(world.grid.occupants(Cell::new(1, 1)).unwrap(), &[Occupant::Evacuee(0)]);
        assert!(world.grid.is_empty(start, false).unwrap());

        world.tick(&mut evacuee, &p, 1, &mut rng);
        let last = world.tick(&mut evacuee, &p, 2, &mut rng);
        assert_eq!(evacuee.pos, Cell::new(3, 3));
        assert_eq!(last.last(), Some(&SimEvent::EvacuationEnded { agent: 0, cell: Cell::new(3, 3), tick: 2 }));
    }

    #[test]
    fn blocked_evacuee_waits_without_moving() {
        let mut world = World::open(4);
        let p = params(40);
        let mut rng = StdRng::seed_from_u64(3);
        let start = Cell::new(0, 0);
        let mut evacuee = Evacuee::new(0, MobilityClass::Unimpaired, start);
        world.grid.place(evacuee.occupant(), start).unwrap();
        // another evacuee sits on the next route cell
        world.grid.place(Occupant::Evacuee(1), Cell::new(1, 1)).unwrap();

        let events = world.tick(&mut evacuee, &p, 0, &mut rng);
        assert_eq!(events.len(), 1);
        assert_eq!(evacuee.pos, start);
        assert_eq!(evacuee.stuck_attempts(), 1);
    }

    #[test]
    fn boxed_in_evacuee_gets_stuck_exactly_at_threshold() {
        let mut world = World::open(5);
        let p = params(6);
        let mut rng = StdRng::seed_from_u64(11);
        let start = Cell::new(1, 1);
        for (id, cell) in crate::grid::moore_neighbors(start, 1, 5, 5).enumerate() {
            world.buildings.set(cell, true);
            world.grid.place(Occupant::Building(id), cell).unwrap();
        }
        let mut evacuee = Evacuee::new(0, MobilityClass::MotorImpaired, start);
        world.grid.place(evacuee.occupant(), start).unwrap();

        for tick in 0..5 {
            let events = world.tick(&mut evacuee, &p, tick, &mut rng);
            assert!(!events.iter().any(|e| matches!(e, SimEvent::Stuck { .. })));
            assert_eq!(evacuee.stuck_attempts(), tick as u32 + 1);
            assert_eq!(evacuee.state(), EvacueeState::Moving);
        }
        let events = world.tick(&mut evacuee, &p, 5, &mut rng);
        assert_eq!(events, vec![SimEvent::Stuck { agent: 0, cell: start, tick: 5, attempts: 6 }]);
        assert_eq!(evacuee.state(), EvacueeState::Stuck);

        assert!(world.tick(&mut evacuee, &p, 6, &mut rng).is_empty());
        assert_eq!(evacuee.stuck_attempts(), 6);
    }

    #[test]
    fn kill_spares_evacuated_agents() {
        let mut out = Vec::new();
        let mut walker = Evacuee::new(0, MobilityClass::Unimpaired, Cell::new(0, 0));
        assert!(walker.kill(2, 4, &mut out));
        assert!(walker.impacted());
        assert!(!walker.is_alive());
        assert!(!walker.kill(2, 5, &mut out));
        assert_eq!(out.len(), 1);

        let mut safe = Evacuee::new(1, MobilityClass::Unimpaired, Cell::new(3, 3));
        safe.finish_evacuation(1, &mut out);
        assert!(!safe.kill(2, 4, &mut out));
        assert_eq!(safe.state(), EvacueeState::Evacuated);
    }
}
