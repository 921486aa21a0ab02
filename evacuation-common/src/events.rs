use serde::{Deserialize, Serialize};
use crate::cell::Cell;
use crate::mobility::MobilityClass;

/// Discrete outputs of a run. Ticks are the 0-based index of the tick that produced the event.
///
/// Externally tagged (`{"moved": {...}}`); bincode cannot decode internally tagged enums.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimEvent {
    /// Setup roster entry, emitted before the first tick.
    Spawned { agent: usize, mobility: MobilityClass, cell: Cell },
    EvacuationStarted { agent: usize, cell: Cell, tick: u64 },
    Moved { agent: usize, from: Cell, to: Cell, tick: u64 },
    EvacuationEnded { agent: usize, cell: Cell, tick: u64 },
    /// `wave` is the id of the wave that claimed the cell.
    HazardImpact { agent: usize, cell: Cell, tick: u64, wave: usize },
    Stuck { agent: usize, cell: Cell, tick: u64, attempts: u32 },
}

impl SimEvent {
    pub fn agent(&self) -> usize {
        match *self {
            SimEvent::Spawned { agent, .. }
            | SimEvent::EvacuationStarted { agent, .. }
            | SimEvent::Moved { agent, .. }
            | SimEvent::EvacuationEnded { agent, .. }
            | SimEvent::HazardImpact { agent, .. }
            | SimEvent::Stuck { agent, .. } => agent,
        }
    }
}
