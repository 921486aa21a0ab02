use serde::{Deserialize, Serialize};
use anyhow::Result;
use crate::cell::Cell;
use crate::mobility::MobilityClass;
use crate::sim_params::{MovementParams, SimParams};
use std::path::{Path, PathBuf};

// Configuration for the cell lattice
#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(default)]
pub struct GridConfig {
    pub width: u32,
    pub height: u32,
    pub cell_size_m: f64,
    /// Defaults to the top-right corner `(width - 1, height - 1)`.
    pub safe_zone: Option<[u32; 2]>,
    /// Cells whose centres fall inside this triangle never accept evacuees.
    pub prohibited_triangle: Option<[[f64; 2]; 3]>,
}

impl Default for GridConfig {
    fn default() -> Self {
        GridConfig {
            width: 110,
            height: 90,
            cell_size_m: 2.0,
            safe_zone: None,
            prohibited_triangle: None,
        }
    }
}

impl GridConfig {
    pub fn safe_zone_cell(&self) -> Cell {
        match self.safe_zone {
            Some(cell) => Cell::from(cell),
            None => Cell::new(self.width.saturating_sub(1), self.height.saturating_sub(1)),
        }
    }
}

// Configuration for timing
#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(default)]
pub struct TimingConfig {
    pub time_limit_s: f64,
    /// Simulated times at which an intermediate report is persisted.
    pub report_thresholds_s: Vec<f64>,
}

impl Default for TimingConfig {
    fn default() -> Self {
        TimingConfig {
            time_limit_s: 1800.0,
            report_thresholds_s: Vec::new(),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(default)]
pub struct PopulationConfig {
    pub num_agents: u32,
    /// Share of persons with disabilities (census figure for the study area).
    pub pwd_ratio: f64,
    pub seed: u64,
}

impl Default for PopulationConfig {
    fn default() -> Self {
        PopulationConfig {
            num_agents: 20,
            pwd_ratio: 0.089,
            seed: 42,
        }
    }
}

// Calibration constants of the movement model
#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(default)]
pub struct MovementConfig {
    /// Flat-ground walking speed of an unimpaired pedestrian.
    pub reference_speed_mps: f64,
    pub uphill_factor: f64,
    pub downhill_factor: f64,
    /// Floor of the per-tick move-attempt probability.
    pub min_move_probability: f64,
    /// Exponent applied to the class base speed.
    pub speed_exponent: i32,
    /// Consecutive ticks without movement before an evacuee is declared stuck.
    pub stuck_threshold: u32,
}

impl Default for MovementConfig {
    fn default() -> Self {
        MovementConfig {
            reference_speed_mps: 1.2,
            uphill_factor: 2.45,
            downhill_factor: 2.0,
            min_move_probability: 0.75,
            speed_exponent: 2,
            stuck_threshold: 40,
        }
    }
}

/// Direction a hazard wave advances towards. `Up` is increasing `y`.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WaveDirection {
    Up,
    Down,
    Left,
    Right,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct HazardAreaConfig {
    pub name: String,
    /// CSV raster of the eligibility mask. Without it the area is empty.
    #[serde(default)]
    pub mask: Option<PathBuf>,
    #[serde(default = "default_direction")]
    pub direction: WaveDirection,
    #[serde(default = "default_hazard_speed")]
    pub speed_mps: f64,
    /// Overrides the speed derived from `speed_mps`.
    #[serde(default)]
    pub speed_cells_per_tick: Option<f64>,
    /// Connected components to activate; all when absent.
    #[serde(default)]
    pub components: Option<Vec<usize>>,
}

fn default_direction() -> WaveDirection {
    WaveDirection::Up
}

fn default_hazard_speed() -> f64 {
    5.0
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(default)]
pub struct HazardConfig {
    pub enabled: bool,
    /// Indices into `areas`; all areas when absent.
    pub active_areas: Option<Vec<usize>>,
    pub areas: Vec<HazardAreaConfig>,
}

impl Default for HazardConfig {
    fn default() -> Self {
        HazardConfig {
            enabled: true,
            active_areas: None,
            areas: Vec::new(),
        }
    }
}

impl HazardConfig {
    /// Indices of the areas that will spawn waves.
    pub fn active_area_indices(&self) -> Vec<usize> {
        if !self.enabled {
            return Vec::new();
        }
        match &self.active_areas {
            Some(indices) => indices.clone(),
            None => (0..self.areas.len()).collect(),
        }
    }
}

// Raster inputs produced by the GIS preprocessing
#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(default)]
pub struct TerrainConfig {
    pub elevation: Option<PathBuf>,
    pub obstacles: Option<PathBuf>,
    pub paths: Option<PathBuf>,
    /// Seed of the uniform elevation surface used when no raster is given.
    pub synthetic_seed: u64,
}

impl Default for TerrainConfig {
    fn default() -> Self {
        TerrainConfig {
            elevation: None,
            obstacles: None,
            paths: None,
            synthetic_seed: 42,
        }
    }
}

// Configuration for output settings, loaded from config.toml
#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(default)]
pub struct OutputConfig {
    pub directory: PathBuf,
    pub base_filename: String,
    pub save_report: bool,
    pub save_events: bool,
    pub format: Option<String>, // Event log format: "json", "bincode", "messagepack"
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            directory: PathBuf::from("reports"),
            base_filename: String::from("evacuation_report"),
            save_report: true,
            save_events: false,
            format: None,
        }
    }
}

// Main simulation configuration structure, loaded from config.toml.
#[derive(Deserialize, Serialize, Debug, Clone, Default)]
#[serde(default)]
pub struct SimulationConfig {
    pub grid: GridConfig,
    pub timing: TimingConfig,
    pub population: PopulationConfig,
    pub movement: MovementConfig,
    pub hazard: HazardConfig,
    pub terrain: TerrainConfig,
    pub output: OutputConfig,
}

impl SimulationConfig {
    /// Loads the simulation configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();

        let config_str = std::fs::read_to_string(path_ref)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path_ref.display(), e))?;
        let config: SimulationConfig = toml::from_str(&config_str)
            .map_err(|e| anyhow::anyhow!("Failed to parse TOML from '{}': {}", path_ref.display(), e))?;

        config.validate()?;
        Ok(config)
    }

    /// Rejects values the simulation cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.grid.width == 0 || self.grid.height == 0 {
            anyhow::bail!("grid width and height must be positive.");
        }
        if !(self.grid.cell_size_m > 0.0) {
            anyhow::bail!("cell_size_m must be positive.");
        }
        let safe_zone = self.grid.safe_zone_cell();
        if safe_zone.x >= self.grid.width || safe_zone.y >= self.grid.height {
            anyhow::bail!(
                "safe_zone {} lies outside the {}x{} grid.",
                safe_zone, self.grid.width, self.grid.height
            );
        }
        if !(self.movement.reference_speed_mps > 0.0) {
            anyhow::bail!("reference_speed_mps must be positive.");
        }
        if !(0.0..=1.0).contains(&self.population.pwd_ratio) {
            anyhow::bail!("pwd_ratio must lie in [0, 1].");
        }
        if !(0.0..=1.0).contains(&self.movement.min_move_probability) {
            anyhow::bail!("min_move_probability must lie in [0, 1].");
        }
        if self.movement.uphill_factor < 0.0 || self.movement.downhill_factor < 0.0 {
            anyhow::bail!("slope factors must not be negative.");
        }
        if self.movement.stuck_threshold == 0 {
            anyhow::bail!("stuck_threshold must be greater than 0.");
        }
        if !(self.timing.time_limit_s > 0.0) {
            anyhow::bail!("time_limit_s must be positive.");
        }
        if let Some(active) = &self.hazard.active_areas {
            if let Some(bad) = active.iter().find(|&&idx| idx >= self.hazard.areas.len()) {
                anyhow::bail!(
                    "active hazard area {} does not exist ({} areas configured).",
                    bad, self.hazard.areas.len()
                );
            }
        }
        for area in &self.hazard.areas {
            if area.speed_mps < 0.0 || area.speed_cells_per_tick.is_some_and(|s| s < 0.0) {
                anyhow::bail!("hazard area '{}' has a negative speed.", area.name);
            }
        }
        Ok(())
    }

    /// Seconds represented by one tick: the time the slowest class needs for one cell.
    pub fn seconds_per_tick(&self) -> f64 {
        MobilityClass::ALL
            .iter()
            .map(|class| {
                self.grid.cell_size_m / (self.movement.reference_speed_mps * class.base_speed())
            })
            .fold(0.0, f64::max)
    }

    /// Expansion speed of a hazard area in cells per tick.
    pub fn hazard_cells_per_tick(&self, area: &HazardAreaConfig) -> f64 {
        match area.speed_cells_per_tick {
            Some(speed) => speed,
            None => area.speed_mps * self.seconds_per_tick() / self.grid.cell_size_m,
        }
    }

    /// Converts the configuration into simulation parameters used at runtime.
    pub fn get_sim_params(&self) -> SimParams {
        let seconds_per_tick = self.seconds_per_tick();
        let max_ticks = if seconds_per_tick > 0.0 {
            ((self.timing.time_limit_s / seconds_per_tick).ceil() as u64).max(1)
        } else {
            1
        };

        let mut report_thresholds_s: Vec<f64> = self
            .timing
            .report_thresholds_s
            .iter()
            .copied()
            .filter(|t| t.is_finite())
            .collect();
        report_thresholds_s.sort_by(|a, b| a.total_cmp(b));
        report_thresholds_s.dedup();

        SimParams {
            width: self.grid.width,
            height: self.grid.height,
            cell_size_m: self.grid.cell_size_m,
            safe_zone: self.grid.safe_zone_cell(),
            seconds_per_tick,
            max_ticks,
            report_thresholds_s,
            num_agents: self.population.num_agents,
            pwd_ratio: self.population.pwd_ratio,
            hazard_enabled: self.hazard.enabled,
            movement: MovementParams {
                uphill_factor: self.movement.uphill_factor,
                downhill_factor: self.movement.downhill_factor,
                min_move_probability: self.movement.min_move_probability,
                speed_exponent: self.movement.speed_exponent,
                stuck_threshold: self.movement.stuck_threshold,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let config: SimulationConfig = toml::from_str(
            r#"
            [grid]
            width = 10
            height = 8

            [[hazard.areas]]
            name = "slope_a"
            direction = "left"
            "#,
        )
        .unwrap();
        assert_eq!(config.grid.cell_size_m, 2.0);
        assert_eq!(config.grid.safe_zone_cell(), Cell::new(9, 7));
        assert_eq!(config.movement.stuck_threshold, 40);
        assert_eq!(config.hazard.areas[0].direction, WaveDirection::Left);
        assert_eq!(config.hazard.areas[0].speed_mps, 5.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn seconds_per_tick_follows_slowest_class() {
        let config = SimulationConfig::default();
        // visually impaired: 2.0 m / (1.2 m/s * 0.4)
        let expected = 2.0 / (1.2 * 0.4);
        assert!((config.seconds_per_tick() - expected).abs() < 1e-12);

        let params = config.get_sim_params();
        assert_eq!(params.max_ticks, (1800.0 / expected).ceil() as u64);
    }

    #[test]
    fn hazard_speed_is_converted_to_cells_per_tick() {
        let config = SimulationConfig::default();
        let area = HazardAreaConfig {
            name: "a".into(),
            mask: None,
            direction: WaveDirection::Up,
            speed_mps: 0.24,
            speed_cells_per_tick: None,
            components: None,
        };
        let expected = 0.24 * config.seconds_per_tick() / 2.0;
        assert!((config.hazard_cells_per_tick(&area) - expected).abs() < 1e-12);
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut config = SimulationConfig::default();
        config.grid.safe_zone = Some([200, 0]);
        assert!(config.validate().is_err());

        let mut config = SimulationConfig::default();
        config.population.pwd_ratio = 1.5;
        assert!(config.validate().is_err());

        let mut config = SimulationConfig::default();
        config.hazard.active_areas = Some(vec![0]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn disabled_hazard_activates_nothing() {
        let mut config = SimulationConfig::default();
        config.hazard.areas.push(HazardAreaConfig {
            name: "a".into(),
            mask: None,
            direction: WaveDirection::Up,
            speed_mps: 1.0,
            speed_cells_per_tick: None,
            components: None,
        });
        assert_eq!(config.hazard.active_area_indices(), vec![0]);
        config.hazard.enabled = false;
        assert!(config.hazard.active_area_indices().is_empty());
    }
}
