//! Persistence side of a run. Reporters only receive events; they never drive the simulation.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use evacuation_common::{Cell, MobilityClass, OutputConfig, RunSummary, SimEvent};
use log::{info, warn};
use serde::Serialize;

/// Receives the outputs of a simulation run.
pub trait Reporter {
    fn record(&mut self, event: &SimEvent);

    /// Intermediate persistence, called once per crossed report threshold.
    fn checkpoint(&mut self, _tick: u64, _threshold_s: f64) -> Result<()> {
        Ok(())
    }

    /// Final persistence, called before the simulation stops running.
    fn finish(&mut self, summary: &RunSummary) -> Result<()>;
}

/// Keeps every event in memory.
#[derive(Debug, Default, Clone)]
pub struct EventRecorder {
    pub events: Vec<SimEvent>,
    pub checkpoints: Vec<(u64, f64)>,
    pub summary: Option<RunSummary>,
}

impl Reporter for EventRecorder {
    fn record(&mut self, event: &SimEvent) {
        self.events.push(event.clone());
    }

    fn checkpoint(&mut self, tick: u64, threshold_s: f64) -> Result<()> {
        self.checkpoints.push((tick, threshold_s));
        Ok(())
    }

    fn finish(&mut self, summary: &RunSummary) -> Result<()> {
        self.summary = Some(summary.clone());
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    Remaining,
    Evacuated,
    Dead,
    Stuck,
}

/// One row of the evacuation report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentRecord {
    pub agent_id: usize,
    pub mobility_type: &'static str,
    pub color: &'static str,
    pub start_pos: String,
    pub start_tick: Option<u64>,
    pub end_tick: Option<u64>,
    /// Successful grid steps.
    pub steps: u32,
    /// Length of the walked route in metres.
    pub distance_m: f64,
    /// Straight-line distance between start and final cell in metres.
    pub displacement_m: f64,
    pub evacuated: bool,
    pub disposition: Disposition,
    pub final_pos: String,
    pub time_spent_s: Option<f64>,
    #[serde(skip)]
    start_cell: Cell,
    #[serde(skip)]
    final_cell: Cell,
}

impl AgentRecord {
    fn new(agent_id: usize, mobility: MobilityClass, cell: Cell) -> Self {
        AgentRecord {
            agent_id,
            mobility_type: mobility.label(),
            color: mobility.color(),
            start_pos: cell.to_string(),
            start_tick: None,
            end_tick: None,
            steps: 0,
            distance_m: 0.0,
            displacement_m: 0.0,
            evacuated: false,
            disposition: Disposition::Remaining,
            final_pos: cell.to_string(),
            time_spent_s: None,
            start_cell: cell,
            final_cell: cell,
        }
    }
}

/// Aggregates events into per-agent records and writes them as CSV.
pub struct ReportManager {
    /// Target directory, file stem, and which files to write.
    output: OutputConfig,
    /// Run seed, part of every file name.
    seed: u64,
    /// Converts cell distances to metres.
    cell_size_m: f64,
    /// Converts tick spans to seconds.
    seconds_per_tick: f64,
    /// Keyed by agent id, so rows come out in id order.
    records: BTreeMap<usize, AgentRecord>,
    /// Raw event log, only filled when `save_events` is set.
    events: Vec<SimEvent>,
    /// Files written so far, in order.
    written: Vec<PathBuf>,
}

impl ReportManager {
    pub fn new(output: OutputConfig, seed: u64, cell_size_m: f64, seconds_per_tick: f64) -> Self {
        ReportManager {
            output,
            seed,
            cell_size_m,
            seconds_per_tick,
            records: BTreeMap::new(),
            events: Vec::new(),
            written: Vec::new(),
        }
    }

    pub fn records(&self) -> impl Iterator<Item = &AgentRecord> {
        self.records.values()
    }

    /// Files written so far, in order.
    pub fn written_files(&self) -> &[PathBuf] {
        &self.written
    }

    fn report_path(&self, suffix: &str) -> PathBuf {
        self.output
            .directory
            .join(format!("{}_seed{}{}.csv", self.output.base_filename, self.seed, suffix))
    }

    fn write_records(&mut self, path: PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create report directory '{}'", parent.display()))?;
        }
        let mut writer = csv::Writer::from_path(&path)
            .with_context(|| format!("Failed to create report file '{}'", path.display()))?;
        for record in self.records.values() {
            writer.serialize(record)?;
        }
        writer.flush()?;
        info!("Report with {} agents saved to {}", self.records.len(), path.display());
        self.written.push(path);
        Ok(())
    }

    fn write_event_log(&mut self) -> Result<()> {
        let format = self.output.format.as_deref().unwrap_or("json");
        let (extension, format) = match format {
            "json" => ("json", "json"),
            "bincode" => ("bin", "bincode"),
            "messagepack" => ("msgpack", "messagepack"),
            other => {
                warn!("Unknown output format: {}. Using JSON instead.", other);
                ("json", "json")
            }
        };
        let path = self
            .output
            .directory
            .join(format!("{}_seed{}_events.{}", self.output.base_filename, self.seed, extension));
        fs::create_dir_all(&self.output.directory)?;
        let file = File::create(&path)
            .with_context(|| format!("Failed to create event log '{}'", path.display()))?;
        let mut writer = BufWriter::new(file);
        match format {
            "bincode" => bincode::serialize_into(&mut writer, &self.events)?,
            "messagepack" => rmp_serde::encode::write(&mut writer, &self.events)?,
            _ => serde_json::to_writer(&mut writer, &self.events)?,
        }
        writer.flush()?;
        info!("{} events saved to {} ({} format)", self.events.len(), path.display(), format);
        self.written.push(path);
        Ok(())
    }
}

impl Reporter for ReportManager {
    fn record(&mut self, event: &SimEvent) {
        if self.output.save_events {
            self.events.push(event.clone());
        }
        if let SimEvent::Spawned { agent, mobility, cell } = *event {
            self.records.insert(agent, AgentRecord::new(agent, mobility, cell));
            return;
        }
        let Some(record) = self.records.get_mut(&event.agent()) else {
            warn!("Event for unknown agent {}: {:?}", event.agent(), event);
            return;
        };
        match *event {
            SimEvent::Spawned { .. } => {}
            SimEvent::EvacuationStarted { tick, .. } => {
                record.start_tick = Some(tick);
            }
            SimEvent::Moved { from, to, .. } => {
                record.steps += 1;
                record.distance_m += from.euclidean_distance(to) * self.cell_size_m;
                record.final_cell = to;
                record.final_pos = to.to_string();
                record.displacement_m = record.start_cell.euclidean_distance(to) * self.cell_size_m;
            }
            SimEvent::EvacuationEnded { cell, tick, .. } => {
                record.end_tick = Some(tick);
                record.evacuated = true;
                record.disposition = Disposition::Evacuated;
                record.final_pos = cell.to_string();
                // both ticks count as travel time
                let start = record.start_tick.unwrap_or(tick);
                record.time_spent_s = Some((tick - start + 1) as f64 * self.seconds_per_tick);
            }
            SimEvent::HazardImpact { tick, .. } => {
                record.end_tick = Some(tick);
                record.disposition = Disposition::Dead;
            }
            SimEvent::Stuck { tick, .. } => {
                record.end_tick = Some(tick);
                record.disposition = Disposition::Stuck;
            }
        }
    }

    fn checkpoint(&mut self, _tick: u64, threshold_s: f64) -> Result<()> {
        if !self.output.save_report {
            return Ok(());
        }
        let path = self.report_path(&format!("_t{}s", threshold_s.round() as u64));
        self.write_records(path)
    }

    fn finish(&mut self, summary: &RunSummary) -> Result<()> {
        if self.output.save_report {
            let path = self.report_path("");
            self.write_records(path)?;
        } else {
            info!("Skipping saving report as per config (save_report is false).");
        }
        if self.output.save_events {
            self.write_event_log()?;
        }
        info!(
            "Run seed {} finished ({:?}): {} evacuated, {} dead, {} stuck, {} remaining",
            summary.seed, summary.reason, summary.evacuated, summary.dead, summary.stuck, summary.remaining
        );
        Ok(())
    }
}

/// Writes one row per run.
pub fn write_batch_summary(path: &Path, summaries: &[RunSummary]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create summary file '{}'", path.display()))?;
    writer.write_record([
        "seed", "ticks", "elapsed_s", "total_agents", "evacuated", "dead", "stuck", "remaining",
        "waves", "cells_claimed", "buildings_buried", "reason",
    ])?;
    for s in summaries {
        writer.write_record([
            s.seed.to_string(),
            s.ticks.to_string(),
            format!("{:.1}", s.elapsed_s),
            s.total_agents.to_string(),
            s.evacuated.to_string(),
            s.dead.to_string(),
            s.stuck.to_string(),
            s.remaining.to_string(),
            s.waves.to_string(),
            s.cells_claimed.to_string(),
            s.buildings_buried.to_string(),
            format!("{:?}", s.reason),
        ])?;
    }
    writer.flush()?;
    info!("Batch summary for {} runs saved to {}", summaries.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use evacuation_common::TerminationReason;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("evacuation-report-{}-{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    fn summary() -> RunSummary {
        RunSummary {
            seed: 9,
            ticks: 3,
            seconds_per_tick: 2.0,
            elapsed_s: 6.0,
            total_agents: 2,
            evacuated: 1,
            dead: 1,
            stuck: 0,
            remaining: 0,
            waves: 1,
            cells_claimed: 4,
            buildings_buried: 0,
            reason: TerminationReason::AllDone,
        }
    }

    fn sample_events() -> Vec<SimEvent> {
        vec![
            SimEvent::Spawned { agent: 0, mobility: MobilityClass::Unimpaired, cell: Cell::new(0, 0) },
            SimEvent::Spawned { agent: 1, mobility: MobilityClass::VisuallyImpaired, cell: Cell::new(3, 0) },
            SimEvent::EvacuationStarted { agent: 0, cell: Cell::new(0, 0), tick: 0 },
            SimEvent::EvacuationStarted { agent: 1, cell: Cell::new(3, 0), tick: 0 },
            SimEvent::Moved { agent: 0, from: Cell::new(0, 0), to: Cell::new(1, 1), tick: 0 },
            SimEvent::Moved { agent: 0, from: Cell::new(1, 1), to: Cell::new(2, 1), tick: 1 },
            SimEvent::EvacuationEnded { agent: 0, cell: Cell::new(2, 1), tick: 1 },
            SimEvent::HazardImpact { agent: 1, cell: Cell::new(3, 0), tick: 2, wave: 0 },
        ]
    }

    fn feed(reporter: &mut ReportManager) {
        for event in &sample_events() {
            reporter.record(event);
        }
    }

    #[test]
    fn records_accumulate_distance_and_disposition() {
        let mut output = OutputConfig::default();
        output.directory = scratch_dir("records");
        let mut reporter = ReportManager::new(output, 9, 2.0, 2.0);
        feed(&mut reporter);

        let records: Vec<&AgentRecord> = reporter.records().collect();
        assert_eq!(records.len(), 2);
        let walker = records[0];
        assert_eq!(walker.steps, 2);
        assert!((walker.distance_m - (2f64.sqrt() + 1.0) * 2.0).abs() < 1e-9);
        assert!((walker.displacement_m - 5f64.sqrt() * 2.0).abs() < 1e-9);
        assert_eq!(walker.disposition, Disposition::Evacuated);
        assert_eq!(walker.time_spent_s, Some(4.0));
        assert_eq!(walker.final_pos, "(2, 1)");

        let victim = records[1];
        assert_eq!(victim.disposition, Disposition::Dead);
        assert_eq!(victim.mobility_type, "VISUAL");
        assert!(!victim.evacuated);
    }

    #[test]
    fn finish_writes_report_and_event_log() {
        let dir = scratch_dir("finish");
        let mut output = OutputConfig::default();
        output.directory = dir.clone();
        output.base_filename = "unit".into();
        output.save_events = true;
        let mut reporter = ReportManager::new(output, 9, 2.0, 2.0);
        feed(&mut reporter);

        reporter.checkpoint(2, 6.0).unwrap();
        reporter.finish(&summary()).unwrap();

        let written = reporter.written_files().to_vec();
        assert_eq!(written, vec![dir.join("unit_seed9_t6s.csv"), dir.join("unit_seed9.csv"), dir.join("unit_seed9_events.json")]);

        let csv_text = fs::read_to_string(dir.join("unit_seed9.csv")).unwrap();
        let mut lines = csv_text.lines();
        assert!(lines.next().unwrap().starts_with("agent_id,mobility_type,color,start_pos"));
        assert_eq!(lines.count(), 2);

        let events: Vec<SimEvent> =
            serde_json::from_str(&fs::read_to_string(dir.join("unit_seed9_events.json")).unwrap()).unwrap();
        assert_eq!(events.len(), 8);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn event_log_reads_back_in_every_format() {
        for (format, extension) in [("json", "json"), ("bincode", "bin"), ("messagepack", "msgpack")] {
            let dir = scratch_dir(format);
            let mut output = OutputConfig::default();
            output.directory = dir.clone();
            output.base_filename = "log".into();
            output.save_report = false;
            output.save_events = true;
            output.format = Some(format.to_string());
            let mut reporter = ReportManager::new(output, 4, 2.0, 2.0);
            feed(&mut reporter);
            reporter.finish(&summary()).unwrap();

            let path = dir.join(format!("log_seed4_events.{}", extension));
            assert_eq!(reporter.written_files(), &[path.clone()]);
            let file = File::open(&path).unwrap();
            let events: Vec<SimEvent> = match format {
                "bincode" => bincode::deserialize_from(file).unwrap(),
                "messagepack" => rmp_serde::from_read(file).unwrap(),
                _ => serde_json::from_reader(file).unwrap(),
            };
            assert_eq!(events, sample_events(), "{format}");
            let _ = fs::remove_dir_all(&dir);
        }
    }

    #[test]
    fn batch_summary_has_one_row_per_run() {
        let dir = scratch_dir("batch");
        let path = dir.join("summary.csv");
        write_batch_summary(&path, &[summary(), summary()]).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 3);
        assert!(text.lines().nth(1).unwrap().ends_with("AllDone"));
        let _ = fs::remove_dir_all(&dir);
    }
}
