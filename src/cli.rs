//! CLI argument definitions using clap.

use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "prosumer-sim")]
#[command(author, version, about = "PV + battery prosumer neighbourhood simulator")]
#[command(
    long_about = "Simulates a low-voltage neighbourhood of prosumers with PV and batteries.\n\
    \nEvery timestep each household balances PV, battery and grid, the feeder is solved,\n\
    and a central supervisor switches battery modes and PV strategies on grid risk.\n\
    \nExamples:\n  \
    prosumer-sim                               # baseline preset\n  \
    prosumer-sim --preset high_pv --quiet      # KPI report only\n  \
    prosumer-sim --scenario my.toml --records-out records.csv"
)]
pub struct Args {
    /// Load scenario from TOML config file
    #[arg(long, conflicts_with = "preset")]
    pub scenario: Option<PathBuf>,

    /// Built-in preset (baseline, high_pv, buffer_grid, rc_battery)
    #[arg(long)]
    pub preset: Option<String>,

    /// Override the random seed
    #[arg(long)]
    pub seed: Option<u64>,

    /// Override the number of timesteps
    #[arg(long)]
    pub steps: Option<usize>,

    /// Export every prosumer record to CSV
    #[arg(long, value_name = "PATH")]
    pub records_out: Option<PathBuf>,

    /// Export step summaries to CSV
    #[arg(long, value_name = "PATH")]
    pub steps_out: Option<PathBuf>,

    /// Write the KPI report as JSON
    #[arg(long, value_name = "PATH")]
    pub report_json: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub log_json: bool,

    /// Suppress per-step lines
    #[arg(long, short)]
    pub quiet: bool,
}
