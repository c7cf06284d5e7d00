//! Prosumer simulator entry point: CLI wiring and config-driven engine construction.

use std::fs;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::info;

use prosumer_sim::cli::Args;
use prosumer_sim::config::ScenarioConfig;
use prosumer_sim::io::export::{export_records, export_steps};
use prosumer_sim::runner::run_scenario;
use prosumer_sim::telemetry::init_tracing;

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json);

    // --scenario takes priority, then --preset, then baseline default
    let mut scenario = if let Some(ref path) = args.scenario {
        ScenarioConfig::from_toml_file(path)?
    } else if let Some(ref name) = args.preset {
        ScenarioConfig::from_preset(name)?
    } else {
        ScenarioConfig::baseline()
    };

    if let Some(seed) = args.seed {
        scenario.simulation.seed = seed;
    }
    if let Some(steps) = args.steps {
        scenario.simulation.steps = steps;
    }

    let errors = scenario.validate();
    if !errors.is_empty() {
        for e in &errors {
            eprintln!("{e}");
        }
        bail!("scenario has {} invalid field(s)", errors.len());
    }

    let result = run_scenario(&scenario)?;

    if !args.quiet {
        for s in &result.summaries {
            println!("{s}");
        }
        println!();
    }
    println!("{}", result.kpis);

    if let Some(ref path) = args.records_out {
        export_records(result.engine.neighborhood(), path)
            .with_context(|| format!("failed to write records to {}", path.display()))?;
        info!(path = %path.display(), "prosumer records written");
    }
    if let Some(ref path) = args.steps_out {
        export_steps(&result.summaries, path)
            .with_context(|| format!("failed to write step summaries to {}", path.display()))?;
        info!(path = %path.display(), "step summaries written");
    }
    if let Some(ref path) = args.report_json {
        let json = serde_json::to_string_pretty(&result.kpis)?;
        fs::write(path, json)
            .with_context(|| format!("failed to write KPI report to {}", path.display()))?;
        info!(path = %path.display(), "KPI report written");
    }

    Ok(())
}
