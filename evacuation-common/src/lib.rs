pub mod cell;
pub mod config;
pub mod events;
pub mod mobility;
pub mod sim_params;
pub mod summary;

// Re-export key types for easier use by dependent crates
pub use cell::Cell;
pub use config::{
    GridConfig, HazardAreaConfig, HazardConfig, MovementConfig, OutputConfig, PopulationConfig,
    SimulationConfig, TerrainConfig, TimingConfig, WaveDirection,
};
pub use events::SimEvent;
pub use mobility::MobilityClass;
pub use sim_params::{MovementParams, SimParams};
pub use summary::{RunSummary, TerminationReason};
