use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use soilife_app::headless::{self, HeadlessOptions};
use soilife_core::SoilParams;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "soilife",
    version,
    about = "Run the soil-fertility Life kernel without a display"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Seed a random grid, advance it, and report population and soil stats.
    Run(RunArgs),
    /// Print the default parameter set as JSON.
    Params,
}

#[derive(Args, Debug)]
struct RunArgs {
    #[arg(long, env = "SOILIFE_WIDTH", default_value_t = 128)]
    width: u32,
    #[arg(long, env = "SOILIFE_HEIGHT", default_value_t = 128)]
    height: u32,
    /// Number of generations to simulate.
    #[arg(long, env = "SOILIFE_TICKS", default_value_t = 500)]
    ticks: u64,
    /// Initial live-cell density in [0, 1].
    #[arg(long, env = "SOILIFE_DENSITY", default_value_t = 0.25)]
    density: f64,
    #[arg(long, env = "SOILIFE_SEED", default_value_t = 0x5011_F11E)]
    seed: u64,
    /// Record a sample every N ticks (0 keeps only the final tick).
    #[arg(long, env = "SOILIFE_SAMPLE_INTERVAL", default_value_t = 50)]
    sample_interval: u64,
    /// JSON file with a full or partial parameter set.
    #[arg(long, env = "SOILIFE_PARAMS")]
    params: Option<PathBuf>,
    /// Where to write the JSON run report.
    #[arg(long, env = "SOILIFE_REPORT")]
    report: Option<PathBuf>,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => run_command(args),
        Command::Params => {
            let json = serde_json::to_string_pretty(&SoilParams::default())
                .context("failed to serialize default parameters")?;
            println!("{json}");
            Ok(())
        }
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn run_command(args: RunArgs) -> Result<()> {
    let params = match &args.params {
        Some(path) => load_params(path)?,
        None => SoilParams::default(),
    };
    let options = HeadlessOptions {
        width: args.width,
        height: args.height,
        ticks: args.ticks,
        density: args.density,
        seed: args.seed,
        sample_interval: args.sample_interval,
        params,
        ..HeadlessOptions::default()
    };

    let report = headless::run(&options)?;
    let summary = &report.summary;
    info!(
        generation = summary.final_generation,
        alive = summary.final_alive_count,
        peak = summary.peak_alive_count,
        births = summary.total_births,
        deaths = summary.total_deaths,
        "headless run completed"
    );
    if let Some(generation) = summary.extinct_at {
        warn!(generation, "population went extinct");
    }

    match &args.report {
        Some(path) => {
            report.write_json(path).with_context(|| {
                format!("failed to write headless report to {}", path.display())
            })?;
            info!(path = %path.display(), "wrote headless report");
        }
        None => {
            let json = serde_json::to_string_pretty(&report.summary)
                .context("failed to serialize run summary")?;
            println!("{json}");
        }
    }
    Ok(())
}

fn load_params(path: &Path) -> Result<SoilParams> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read params file {}", path.display()))?;
    let params: SoilParams = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse params file {}", path.display()))?;
    params
        .validate()
        .with_context(|| format!("invalid parameters in {}", path.display()))?;
    Ok(params)
}
