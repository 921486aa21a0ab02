//! Independent runs in parallel. Each task owns its simulation and reporter; the terrain is shared read-only.

use anyhow::{Context, Result};
use evacuation_common::{RunSummary, SimulationConfig};
use log::{error, info};
use rayon::prelude::*;

use crate::report::ReportManager;
use crate::simulation::Simulation;
use crate::terrain::Terrain;

/// Runs one seeded simulation through a [`ReportManager`] configured from `[output]`.
pub fn run_once(config: &SimulationConfig, terrain: &Terrain, seed: u64) -> Result<RunSummary> {
    let mut sim = Simulation::new(config, terrain, seed)?;
    let params = sim.params();
    let mut reporter = ReportManager::new(config.output.clone(), seed, params.cell_size_m, params.seconds_per_tick);
    sim.run(&mut reporter)
}

/// Runs `runs` simulations with seeds `base_seed..base_seed + runs`; summaries come back in run order.
pub fn run_batch(config: &SimulationConfig, terrain: &Terrain, runs: usize, base_seed: u64) -> Result<Vec<RunSummary>> {
    info!(
        "Starting batch of {} runs (seeds {}..{}) on {} Rayon threads.",
        runs,
        base_seed,
        base_seed.wrapping_add(runs as u64),
        rayon::current_num_threads()
    );

    let results: Vec<Result<RunSummary>> = (0..runs)
        .into_par_iter()
        .map(|run| {
            let seed = base_seed.wrapping_add(run as u64);
            run_once(config, terrain, seed).with_context(|| format!("Run {} (seed {}) failed", run, seed))
        })
        .collect();

    let mut summaries = Vec::with_capacity(runs);
    for result in results {
        match result {
            Ok(summary) => summaries.push(summary),
            Err(e) => {
                error!("{:#}", e);
                return Err(e);
            }
        }
    }
    info!(
        "Batch complete: {} evacuated, {} dead, {} stuck over {} runs.",
        summaries.iter().map(|s| s.evacuated).sum::<usize>(),
        summaries.iter().map(|s| s.dead).sum::<usize>(),
        summaries.iter().map(|s| s.stuck).sum::<usize>(),
        summaries.len()
    );
    Ok(summaries)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> SimulationConfig {
        let mut config = SimulationConfig::default();
        config.grid.width = 12;
        config.grid.height = 10;
        config.population.num_agents = 6;
        config.population.pwd_ratio = 0.5;
        config.timing.time_limit_s = 600.0;
        config.output.save_report = false;
        config
    }

    #[test]
    fn batch_matches_sequential_runs_in_order() {
        let config = small_config();
        let terrain = Terrain::open(12, 10);
        let batch = run_batch(&config, &terrain, 4, 100).unwrap();
        assert_eq!(batch.iter().map(|s| s.seed).collect::<Vec<_>>(), vec![100, 101, 102, 103]);
        for summary in &batch {
            let sequential = run_once(&config, &terrain, summary.seed).unwrap();
            assert_eq!(summary, &sequential);
        }
    }

    #[test]
    fn failing_setup_fails_the_batch() {
        let mut config = small_config();
        config.population.num_agents = 500;
        let terrain = Terrain::open(12, 10);
        assert!(run_batch(&config, &terrain, 2, 0).is_err());
    }
}
