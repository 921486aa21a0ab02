use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    /// Every evacuee reached a terminal state.
    AllDone,
    /// The tick budget ran out.
    TimeLimit,
}

/// Outcome of one simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub seed: u64,
    /// Number of ticks executed.
    pub ticks: u64,
    pub seconds_per_tick: f64,
    /// Simulated seconds elapsed (`ticks * seconds_per_tick`).
    pub elapsed_s: f64,
    pub total_agents: usize,
    pub evacuated: usize,
    pub dead: usize,
    pub stuck: usize,
    /// Agents still moving when the run stopped.
    pub remaining: usize,
    pub waves: usize,
    pub cells_claimed: usize,
    pub buildings_buried: usize,
    pub reason: TerminationReason,
}
