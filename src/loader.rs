//! Builds a [`Terrain`] from the `[terrain]`, `[grid]` and `[hazard]` config sections.
//!
//! Rasters are header-less CSV files, one line per row, the first line being `y = 0`.

use std::path::Path;

use anyhow::{bail, Context, Result};
use evacuation_common::SimulationConfig;
use log::{info, warn};
use rand::prelude::*;

use crate::terrain::{Field, Mask, Terrain};

pub fn load_terrain(config: &SimulationConfig) -> Result<Terrain> {
    let (width, height) = (config.grid.width, config.grid.height);

    let elevation = match &config.terrain.elevation {
        Some(path) => read_raster(path, |value| value.parse::<f64>().ok())?,
        None => synthetic_elevation(width, height, config.terrain.synthetic_seed),
    };
    let obstacles = read_mask_or_empty(config.terrain.obstacles.as_deref(), width, height)?;
    let paths = read_mask_or_empty(config.terrain.paths.as_deref(), width, height)?;
    let prohibited = match config.grid.prohibited_triangle {
        Some(corners) => Mask::triangle(width, height, corners),
        None => Mask::empty(width, height),
    };

    let mut hazard_masks = Vec::with_capacity(config.hazard.areas.len());
    for area in &config.hazard.areas {
        match &area.mask {
            Some(path) => hazard_masks.push(read_raster(path, parse_flag)?),
            None => {
                warn!("Hazard area '{}' has no mask file; it will never expand.", area.name);
                hazard_masks.push(Mask::empty(width, height));
            }
        }
    }

    let terrain = Terrain {
        elevation,
        obstacles,
        paths,
        prohibited,
        hazard_masks,
    };
    terrain.validate(width, height).context("Terrain does not match the configured grid")?;
    info!(
        "Terrain loaded: {} building cells, {} path cells, {} prohibited cells, {} hazard areas.",
        terrain.obstacles.count(),
        terrain.paths.count(),
        terrain.prohibited.count(),
        terrain.hazard_masks.len()
    );
    Ok(terrain)
}

/// Uniform `[0, 1)` surface, reproducible from `seed`.
pub fn synthetic_elevation(width: u32, height: u32, seed: u64) -> Field<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let rows = (0..height)
        .map(|_| (0..width).map(|_| rng.random::<f64>()).collect())
        .collect();
    Field::from_rows(rows).unwrap_or_else(|| Field::filled(width, height, 0.0))
}

fn read_mask_or_empty(path: Option<&Path>, width: u32, height: u32) -> Result<Mask> {
    match path {
        Some(path) => read_raster(path, parse_flag),
        None => Ok(Mask::empty(width, height)),
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value {
        "1" | "true" | "True" | "TRUE" => Some(true),
        "0" | "false" | "False" | "FALSE" => Some(false),
        other => other.parse::<f64>().ok().map(|v| v != 0.0),
    }
}

/// Reads a rectangular raster; ragged rows and unparsable values are errors.
pub fn read_raster<T>(path: &Path, parse: impl Fn(&str) -> Option<T>) -> Result<Field<T>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open raster {}", path.display()))?;

    let mut rows = Vec::new();
    for (y, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("Failed to read row {} of {}", y, path.display()))?;
        let mut row = Vec::with_capacity(record.len());
        for (x, value) in record.iter().enumerate() {
            match parse(value) {
                Some(parsed) => row.push(parsed),
                None => bail!("Invalid value '{}' at ({}, {}) in {}", value, x, y, path.display()),
            }
        }
        rows.push(row);
    }
    match Field::from_rows(rows) {
        Some(field) => Ok(field),
        None => bail!("Raster {} is empty or has rows of different lengths", path.display()),
    }
}
