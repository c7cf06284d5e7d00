//! Scenario wiring: builds profiles, neighbourhood and feeder from a
//! [`ScenarioConfig`] and runs them.

use tracing::info;

use crate::config::ScenarioConfig;
use crate::error::{ConfigurationError, SimError};
use crate::profiles::{IrradianceProfile, LoadProfile};
use crate::sim::engine::Engine;
use crate::sim::feeder::RadialFeeder;
use crate::sim::kpi::KpiReport;
use crate::sim::neighborhood::Neighborhood;
use crate::sim::supervisor::GridSupervisor;
use crate::sim::types::StepSummary;

/// Seed offset for the irradiance RNG to avoid correlation with the load profile.
const IRRADIANCE_SEED_OFFSET: u64 = 1;
/// Seed offset for the per-prosumer load variation.
const NEIGHBORHOOD_SEED_OFFSET: u64 = 57;

/// Output of [`run_scenario`].
pub struct SimulationResult {
    pub summaries: Vec<StepSummary>,
    pub kpis: KpiReport,
    /// Engine after the run, holding every prosumer history.
    pub engine: Engine<RadialFeeder>,
}

/// Validates a scenario and builds a ready-to-run engine.
///
/// # Errors
///
/// Returns [`SimError::Config`] with the first validation failure.
pub fn build_engine(cfg: &ScenarioConfig) -> Result<Engine<RadialFeeder>, SimError> {
    if let Some(first) = cfg.validate().into_iter().next() {
        return Err(first.into());
    }

    let sim_config = cfg.simulation.to_sim_config();
    let seed = sim_config.seed;
    let dt = sim_config.timestep_seconds;

    let feeder = cfg
        .grid
        .build_feeder()
        .map_err(|e| ConfigurationError::invalid("grid", e.to_string()))?;

    let p = &cfg.profile;
    let mut load = LoadProfile::new(
        p.load_base_kw,
        p.load_amp_kw,
        p.load_phase_rad,
        p.load_noise_std,
        sim_config.steps_per_day(),
        seed,
    );
    // Profile step 0 is midnight.
    let offset = (sim_config.start_hour() * 3600.0 / dt).round() as usize;
    let load_series: Vec<f64> = (0..sim_config.steps)
        .map(|t| load.demand_kw(offset + t))
        .collect();

    let mut irradiance = IrradianceProfile::new(
        p.peak_irradiance_w_m2,
        p.sunrise_hour,
        p.sunset_hour,
        p.cloud_alpha,
        p.cloud_noise_std,
        seed.wrapping_add(IRRADIANCE_SEED_OFFSET),
    );
    let irradiance_series = irradiance.series(sim_config.start_hour(), dt, sim_config.steps);

    let neighborhood = Neighborhood::generate(
        &feeder.prosumer_buses(),
        &cfg.prosumer,
        &cfg.neighborhood,
        p.peak_load_kw(),
        seed.wrapping_add(NEIGHBORHOOD_SEED_OFFSET),
    )?;
    info!(
        feeder = feeder.name(),
        prosumers = neighborhood.len(),
        battery_model = ?cfg.prosumer.battery_model,
        "scenario built"
    );

    Ok(Engine::new(
        sim_config,
        neighborhood,
        feeder,
        GridSupervisor::new(cfg.supervisor),
        irradiance_series,
        load_series,
    ))
}

/// Builds and runs a scenario, then computes its KPIs.
///
/// # Errors
///
/// Returns the first configuration or step error.
pub fn run_scenario(cfg: &ScenarioConfig) -> Result<SimulationResult, SimError> {
    let mut engine = build_engine(cfg)?;
    let summaries = engine.run()?;
    let kpis = KpiReport::from_summaries(&summaries, engine.config().dt_hours());
    Ok(SimulationResult {
        summaries,
        kpis,
        engine,
    })
}
