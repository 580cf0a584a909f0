use std::fs::{self, File};
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use soilife_core::{Frame, FramePalette, Kernel, KernelCommand, SoilParams, TickSummary};
use tracing::info;

use crate::worker::KernelWorker;

/// Settings for a headless run.
#[derive(Debug, Clone)]
pub struct HeadlessOptions {
    pub width: u32,
    pub height: u32,
    pub ticks: u64,
    /// Initial live-cell density.
    pub density: f64,
    pub seed: u64,
    /// Record a frame sample every this many ticks; 0 records only the last.
    pub sample_interval: u64,
    pub params: SoilParams,
    pub palette: FramePalette,
}

impl Default for HeadlessOptions {
    fn default() -> Self {
        Self {
            width: 128,
            height: 128,
            ticks: 500,
            density: 0.25,
            seed: 0x5011_F11E,
            sample_interval: 50,
            params: SoilParams::default(),
            palette: FramePalette::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FrameStats {
    pub generation: u64,
    pub alive_count: usize,
    pub births: usize,
    pub deaths: usize,
    pub total_fertility: f32,
    pub mean_fertility: f32,
}

impl FrameStats {
    fn from_summary(summary: &TickSummary, cells: usize) -> Self {
        Self {
            generation: summary.generation.0,
            alive_count: summary.alive_count,
            births: summary.births,
            deaths: summary.deaths,
            total_fertility: summary.total_fertility,
            mean_fertility: summary.total_fertility / cells.max(1) as f32,
        }
    }

    fn initial(frame: &Frame) -> Self {
        let cells = (frame.width as usize) * (frame.height as usize);
        Self {
            generation: frame.generation.0,
            alive_count: frame.alive_count,
            births: 0,
            deaths: 0,
            total_fertility: frame.total_fertility,
            mean_fertility: frame.total_fertility / cells.max(1) as f32,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ReportSummary {
    pub frame_count: usize,
    pub ticks_simulated: u64,
    pub final_generation: u64,
    pub final_alive_count: usize,
    pub peak_alive_count: usize,
    pub total_births: usize,
    pub total_deaths: usize,
    /// First generation with no live cells, if the population died out.
    pub extinct_at: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HeadlessReport {
    pub width: u32,
    pub height: u32,
    pub seed: u64,
    pub params: SoilParams,
    pub initial: FrameStats,
    pub frames: Vec<FrameStats>,
    pub summary: ReportSummary,
}

impl HeadlessReport {
    pub fn write_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = File::create(path)?;
        serde_json::to_writer_pretty(file, self).context("failed to serialize headless report")?;
        Ok(())
    }
}

/// Seeds a random pattern and advances it `ticks` times on a kernel worker.
pub fn run(options: &HeadlessOptions) -> Result<HeadlessReport> {
    options
        .params
        .validate()
        .context("invalid simulation parameters")?;
    let kernel = Kernel::with_params(options.params).with_palette(options.palette);
    let worker = KernelWorker::spawn(kernel)?;

    worker
        .init(options.width, options.height)
        .with_context(|| format!("failed to init {}x{} grid", options.width, options.height))?;
    let Some(seeded) = worker.frame(KernelCommand::Randomize {
        density: options.density,
        seed: options.seed,
    })?
    else {
        bail!("kernel ignored randomize after init");
    };
    let cells = (options.width as usize) * (options.height as usize);
    let initial = FrameStats::initial(&seeded);
    info!(
        width = options.width,
        height = options.height,
        alive = seeded.alive_count,
        ticks = options.ticks,
        "starting headless run"
    );

    let mut frames = Vec::new();
    let mut summary = ReportSummary {
        peak_alive_count: seeded.alive_count,
        final_alive_count: seeded.alive_count,
        extinct_at: (seeded.alive_count == 0).then_some(0),
        ..ReportSummary::default()
    };

    for tick in 1..=options.ticks {
        let Some(report) = worker.step()? else {
            bail!("kernel ignored step after init");
        };
        let tick_summary = report.summary;
        summary.ticks_simulated += 1;
        summary.total_births += tick_summary.births;
        summary.total_deaths += tick_summary.deaths;
        summary.peak_alive_count = summary.peak_alive_count.max(tick_summary.alive_count);
        summary.final_alive_count = tick_summary.alive_count;
        summary.final_generation = tick_summary.generation.0;
        if tick_summary.alive_count == 0 && summary.extinct_at.is_none() {
            summary.extinct_at = Some(tick_summary.generation.0);
        }

        let sampled = options.sample_interval > 0 && tick.is_multiple_of(options.sample_interval);
        if sampled || tick == options.ticks {
            let stats = FrameStats::from_summary(&tick_summary, cells);
            info!(
                generation = stats.generation,
                alive = stats.alive_count,
                mean_fertility = stats.mean_fertility,
                "headless sample"
            );
            frames.push(stats);
        }
    }
    worker.shutdown()?;

    summary.frame_count = frames.len();
    Ok(HeadlessReport {
        width: options.width,
        height: options.height,
        seed: options.seed,
        params: options.params,
        initial,
        frames,
        summary,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn samples_on_interval_and_final_tick() {
        let options = HeadlessOptions {
            width: 24,
            height: 16,
            ticks: 25,
            sample_interval: 10,
            ..HeadlessOptions::default()
        };
        let report = run(&options).expect("run");
        let generations: Vec<u64> = report.frames.iter().map(|f| f.generation).collect();
        assert_eq!(generations, vec![10, 20, 25]);
        assert_eq!(report.summary.ticks_simulated, 25);
        assert_eq!(report.summary.final_generation, 25);
        assert_eq!(report.summary.frame_count, 3);
        assert_eq!(report.initial.generation, 0);
    }

    #[test]
    fn initial_fertility_is_summed_from_the_grid() {
        let options = HeadlessOptions {
            width: 37,
            height: 29,
            ticks: 1,
            ..HeadlessOptions::default()
        };
        let report = run(&options).expect("run");

        let mut kernel = Kernel::with_params(options.params);
        kernel.init(options.width, options.height).expect("init");
        let grid = kernel.grid().expect("ready");
        let summed = grid.fertility().iter().fold(0.0_f32, |acc, &soil| acc + soil);
        assert_eq!(report.initial.total_fertility.to_bits(), summed.to_bits());
        assert_eq!(
            report.initial.mean_fertility,
            summed / (options.width * options.height) as f32
        );
    }

    #[test]
    fn empty_grid_is_extinct_from_the_start() {
        let options = HeadlessOptions {
            width: 8,
            height: 8,
            ticks: 3,
            density: 0.0,
            ..HeadlessOptions::default()
        };
        let report = run(&options).expect("run");
        assert_eq!(report.summary.extinct_at, Some(0));
        assert_eq!(report.summary.total_births, 0);
        assert_eq!(report.summary.peak_alive_count, 0);
    }

    #[test]
    fn invalid_params_are_rejected_before_spawning() {
        let mut params = SoilParams::default();
        params.decay_rate = 2.0;
        let options = HeadlessOptions {
            params,
            ..HeadlessOptions::default()
        };
        assert!(run(&options).is_err());
    }
}
