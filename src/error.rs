use evacuation_common::Cell;
use thiserror::Error;

use crate::grid::Occupant;

/// Failures of a single grid operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GridError {
    #[error("cell {cell} lies outside the {width}x{height} grid")]
    OutOfBounds { cell: Cell, width: u32, height: u32 },
    #[error("cell {cell} is already occupied by {occupant:?}")]
    Occupied { cell: Cell, occupant: Occupant },
}

/// Setup-time configuration errors. All of them abort construction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SetupError {
    #[error("{layer} is {found_width}x{found_height}, expected {width}x{height}")]
    MaskDimensionMismatch {
        layer: String,
        found_width: u32,
        found_height: u32,
        width: u32,
        height: u32,
    },
    #[error("safe zone {0} lies outside the grid")]
    SafeZoneOutOfBounds(Cell),
    #[error("evacuee cannot start on prohibited cell {0}")]
    ProhibitedSpawn(Cell),
    #[error("cannot place {needed} evacuees: only {available} free cells")]
    InsufficientSpace { needed: usize, available: usize },
    #[error("hazard area {0} has no eligibility mask loaded")]
    UnknownHazardArea(usize),
    #[error("hazard area '{area}' has {available} components, component {component} requested")]
    UnknownHazardComponent {
        area: String,
        component: usize,
        available: usize,
    },
}
