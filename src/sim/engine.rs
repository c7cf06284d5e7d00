//! Simulation engine: prosumer control, grid solve and supervision per timestep.

use tracing::{debug, info, warn};

use crate::devices::EnergyStore;
use crate::error::{SimError, SimulationInputError};
use crate::sim::clock::Clock;
use crate::sim::grid::{BusInjection, PowerFlowSolver};
use crate::sim::neighborhood::Neighborhood;
use crate::sim::power_balance::residual_kw;
use crate::sim::supervisor::GridSupervisor;
use crate::sim::types::{SimConfig, StepSummary};

/// Residual above which a prosumer record is reported as unbalanced (kW).
pub const BALANCE_TOLERANCE_KW: f64 = 1e-6;

/// Simulation engine owning the neighbourhood, solver and supervisor.
///
/// Generic over `S: PowerFlowSolver` for static dispatch. Irradiance
/// (Wh/m² per step) and base load (kW) are shared by every prosumer; each
/// prosumer scales the load by its own factor.
pub struct Engine<S: PowerFlowSolver> {
    config: SimConfig,
    neighborhood: Neighborhood,
    solver: S,
    supervisor: GridSupervisor,
    irradiance: Vec<f64>,
    load: Vec<f64>,
}

impl<S: PowerFlowSolver> Engine<S> {
    /// Creates a new simulation engine.
    ///
    /// # Arguments
    ///
    /// * `config` - Simulation configuration
    /// * `neighborhood` - Prosumers keyed by bus name
    /// * `solver` - Power-flow collaborator
    /// * `supervisor` - Grid supervisor
    /// * `irradiance` - Per-step irradiance energy (Wh/m²)
    /// * `load` - Per-step base load (kW)
    pub fn new(
        config: SimConfig,
        neighborhood: Neighborhood,
        solver: S,
        supervisor: GridSupervisor,
        irradiance: Vec<f64>,
        load: Vec<f64>,
    ) -> Self {
        Self {
            config,
            neighborhood,
            solver,
            supervisor,
            irradiance,
            load,
        }
    }

    /// Executes one simulation timestep.
    ///
    /// Shared inputs are checked before any prosumer is touched, so a bad
    /// sample fails the step without leaving recorders misaligned.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::Series`] for a missing or non-finite sample,
    /// [`SimError::Input`] when a prosumer rejects its input, and
    /// [`SimError::Solver`] when the power flow fails.
    pub fn step(&mut self, t: usize) -> Result<StepSummary, SimError> {
        let irradiance = sample(&self.irradiance, t)
            .and_then(|v| finite(v, SimulationInputError::Irradiance))
            .map_err(|source| SimError::Series { step: t, source })?;
        let base_load = sample(&self.load, t)
            .and_then(|v| finite(v, SimulationInputError::Load))
            .map_err(|source| SimError::Series { step: t, source })?;

        let timestamp = self.config.timestamp(t);
        let dt = self.config.timestep_seconds;

        let mut load_kw = 0.0;
        let mut pv_kw = 0.0;
        let mut battery_kw = 0.0;
        let mut import_kw = 0.0;
        let mut export_kw = 0.0;
        let mut curtailed_kw = 0.0;
        let mut soc_sum = 0.0;
        let mut injections = Vec::with_capacity(self.neighborhood.len());

        for (name, prosumer) in self.neighborhood.iter_mut() {
            let demand = base_load * prosumer.load_scale;
            let record = prosumer
                .run_pflow(irradiance, demand, dt, timestamp)
                .map_err(|source| SimError::Input {
                    step: t,
                    prosumer: name.clone(),
                    source,
                })?;

            let residual = residual_kw(&record);
            if residual.abs() > BALANCE_TOLERANCE_KW {
                warn!(step = t, prosumer = %name, residual, "energy balance residual");
            }

            load_kw += record.load_kw;
            pv_kw += record.pv_kw;
            battery_kw += record.battery_flow_kw;
            import_kw += (-record.grid_flow_kw).max(0.0);
            export_kw += record.grid_flow_kw.max(0.0);
            curtailed_kw += record.curtailed_kw;
            soc_sum += prosumer.battery.soc();
            injections.push(BusInjection {
                bus: name.clone(),
                p_kw: -record.grid_flow_kw,
            });
        }

        let state = self
            .solver
            .solve(&injections)
            .map_err(|source| SimError::Solver { step: t, source })?;
        let report = self
            .supervisor
            .control_prosumers(&state, &mut self.neighborhood);

        let mean_soc = if self.neighborhood.is_empty() {
            0.0
        } else {
            soc_sum / self.neighborhood.len() as f64
        };
        let summary = StepSummary {
            step: t,
            timestamp,
            load_kw,
            pv_kw,
            battery_kw,
            import_kw,
            export_kw,
            curtailed_kw,
            mean_soc,
            min_vm_pu: state.min_vm_pu().unwrap_or(f64::NAN),
            max_vm_pu: state.max_vm_pu().unwrap_or(f64::NAN),
            max_loading_percent: state.max_loading_percent().unwrap_or(0.0),
            slack_p_kw: state.slack_p_kw,
            flags: report.flags,
            switched: report.switched,
        };
        debug!("{summary}");
        Ok(summary)
    }

    /// Executes every timestep of the run.
    ///
    /// # Errors
    ///
    /// Returns the first step error; no later step is run.
    pub fn run(&mut self) -> Result<Vec<StepSummary>, SimError> {
        info!(
            steps = self.config.steps,
            prosumers = self.neighborhood.len(),
            timestep_s = self.config.timestep_seconds,
            "simulation started"
        );
        let mut clock = Clock::new(&self.config);
        let mut summaries = Vec::with_capacity(clock.remaining());
        clock.try_run(|tick| {
            summaries.push(self.step(tick.step)?);
            Ok::<(), SimError>(())
        })?;
        info!(steps = summaries.len(), "simulation finished");
        Ok(summaries)
    }

    pub fn neighborhood(&self) -> &Neighborhood {
        &self.neighborhood
    }

    pub fn neighborhood_mut(&mut self) -> &mut Neighborhood {
        &mut self.neighborhood
    }

    pub fn supervisor(&self) -> &GridSupervisor {
        &self.supervisor
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }
}

fn sample(series: &[f64], step: usize) -> Result<f64, SimulationInputError> {
    series
        .get(step)
        .copied()
        .ok_or(SimulationInputError::MissingSample {
            step,
            len: series.len(),
        })
}

fn finite(
    value: f64,
    err: impl FnOnce(f64) -> SimulationInputError,
) -> Result<f64, SimulationInputError> {
    if value.is_finite() { Ok(value) } else { Err(err(value)) }
}
