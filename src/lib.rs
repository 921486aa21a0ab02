pub mod batch;
pub mod building;
pub mod error;
pub mod evacuee;
pub mod grid;
pub mod hazard;
pub mod loader;
pub mod pathfinding;
pub mod report;
pub mod simulation;
pub mod terrain;

pub use error::{GridError, SetupError};
pub use report::{EventRecorder, ReportManager, Reporter};
pub use simulation::Simulation;
pub use terrain::{Field, Mask, Terrain};
