use serde::{Deserialize, Serialize};
use crate::cell::Cell;

/// Calibration of the per-tick movement decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MovementParams {
    pub uphill_factor: f64,
    pub downhill_factor: f64,
    pub min_move_probability: f64,
    pub speed_exponent: i32,
    pub stuck_threshold: u32,
}

/// Simulation parameters derived from the configuration, used frequently during simulation steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimParams {
    // World & Grid
    pub width: u32,
    pub height: u32,
    pub cell_size_m: f64,
    pub safe_zone: Cell,

    // Time
    pub seconds_per_tick: f64,
    pub max_ticks: u64,
    pub report_thresholds_s: Vec<f64>, // sorted ascending

    // Population
    pub num_agents: u32,
    pub pwd_ratio: f64,

    pub hazard_enabled: bool,
    pub movement: MovementParams,
}
