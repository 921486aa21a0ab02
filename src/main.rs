use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, info, warn};

use evacuation_common::SimulationConfig;
use evacuation_engine::{batch, loader, report};

/// Command-line arguments for the evacuation batch driver
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the config.toml file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Number of independent runs
    #[arg(short, long, default_value_t = 1)]
    runs: usize,

    /// Base seed; run i uses seed + i (defaults to population.seed)
    #[arg(long)]
    seed: Option<u64>,

    /// Overrides population.num_agents
    #[arg(long)]
    num_agents: Option<u32>,

    /// Overrides population.pwd_ratio
    #[arg(long)]
    pwd_ratio: Option<f64>,

    /// Comma-separated hazard area indices to activate
    #[arg(long, value_delimiter = ',')]
    active_areas: Option<Vec<usize>>,

    /// Disable every hazard wave
    #[arg(long)]
    no_hazard: bool,

    /// Rayon worker threads (defaults to one per core)
    #[arg(long)]
    threads: Option<usize>,
}

fn main() -> Result<()> {
    // Initialize the logger
    env_logger::init();
    let args = Args::parse();

    info!("Starting Evacuation Engine...");

    // --- Load Configuration ---
    let mut config = SimulationConfig::load(&args.config)?;
    if let Some(num_agents) = args.num_agents {
        config.population.num_agents = num_agents;
    }
    if let Some(pwd_ratio) = args.pwd_ratio {
        config.population.pwd_ratio = pwd_ratio;
    }
    if let Some(active) = args.active_areas {
        config.hazard.active_areas = Some(active);
    }
    if args.no_hazard {
        config.hazard.enabled = false;
    }
    config.validate().context("Invalid configuration after command-line overrides")?;
    debug!("Simulation Parameters: {:#?}", config.get_sim_params());

    // --- Configure Rayon Thread Pool (Optional) ---
    if let Some(threads) = args.threads {
        if let Err(e) = rayon::ThreadPoolBuilder::new().num_threads(threads).build_global() {
            warn!("Could not configure {} Rayon threads: {}", threads, e);
        }
    }

    let terrain = loader::load_terrain(&config)?;

    if args.runs == 0 {
        warn!("Zero runs requested; nothing to do.");
        return Ok(());
    }
    let base_seed = args.seed.unwrap_or(config.population.seed);
    let start_time = Instant::now();
    let summaries = batch::run_batch(&config, &terrain, args.runs, base_seed)?;
    let total_duration = start_time.elapsed();
    info!("{} runs finished in {:.3} seconds.", summaries.len(), total_duration.as_secs_f64());

    // --- Save Batch Summary ---
    let summary_path = config
        .output
        .directory
        .join(format!("{}_batch_summary.csv", config.output.base_filename));
    report::write_batch_summary(&summary_path, &summaries)?;

    info!("Simulation Complete.");
    Ok(())
}
