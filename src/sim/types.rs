//! Core simulation types: run configuration and per-step summaries.

use std::fmt;

use chrono::{NaiveDateTime, TimeDelta};
use serde::Serialize;

use crate::error::SimulationInputError;
use crate::sim::supervisor::RiskFlags;

/// Centralized simulation configuration.
///
/// The timestep is constant over a run and shared by every prosumer.
///
/// # Examples
///
/// ```
/// use chrono::NaiveDateTime;
/// use prosumer_sim::sim::types::SimConfig;
///
/// let start = NaiveDateTime::parse_from_str("2021-06-01 00:00", "%Y-%m-%d %H:%M").unwrap();
/// let cfg = SimConfig::new(start, 900.0, 96, 42);
/// assert_eq!(cfg.dt_hours(), 0.25);
/// assert_eq!(cfg.steps_per_day(), 96);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct SimConfig {
    /// Timestamp of step 0.
    pub start: NaiveDateTime,
    /// Duration of one timestep in seconds.
    pub timestep_seconds: f64,
    /// Number of timesteps to simulate.
    pub steps: usize,
    /// Master random seed for reproducibility.
    pub seed: u64,
}

impl SimConfig {
    /// Creates a new simulation configuration.
    ///
    /// # Panics
    ///
    /// Panics if `timestep_seconds` is not positive or `steps` is zero.
    pub fn new(start: NaiveDateTime, timestep_seconds: f64, steps: usize, seed: u64) -> Self {
        assert!(
            timestep_seconds.is_finite() && timestep_seconds > 0.0,
            "timestep_seconds must be > 0"
        );
        assert!(steps > 0, "steps must be > 0");
        Self {
            start,
            timestep_seconds,
            steps,
            seed,
        }
    }

    pub fn dt_hours(&self) -> f64 {
        self.timestep_seconds / 3600.0
    }

    /// Whole timesteps per day, at least one.
    pub fn steps_per_day(&self) -> usize {
        ((86_400.0 / self.timestep_seconds).round() as usize).max(1)
    }

    /// Timestamp label of step `t`.
    pub fn timestamp(&self, t: usize) -> NaiveDateTime {
        let millis = (self.timestep_seconds * 1000.0 * t as f64).round() as i64;
        self.start + TimeDelta::milliseconds(millis)
    }

    /// Hour of day at the start of the run, fractional.
    pub fn start_hour(&self) -> f64 {
        use chrono::Timelike;
        f64::from(self.start.num_seconds_from_midnight()) / 3600.0
    }
}

/// Derives the sampling interval of a timestamp index in seconds.
///
/// # Errors
///
/// Fails if fewer than two timestamps are given or the spacing is not
/// positive and uniform.
pub fn timestep_from_timestamps(index: &[NaiveDateTime]) -> Result<f64, SimulationInputError> {
    let [first, second, ..] = index else {
        return Err(SimulationInputError::ShortSeries);
    };
    let dt = (*second - *first).num_milliseconds() as f64 / 1000.0;
    if dt <= 0.0 {
        return Err(SimulationInputError::Timestep(dt));
    }
    for pair in index.windows(2) {
        let step = (pair[1] - pair[0]).num_milliseconds() as f64 / 1000.0;
        if step != dt {
            return Err(SimulationInputError::Timestep(step));
        }
    }
    Ok(dt)
}

/// Neighbourhood-level record of one simulation timestep.
#[derive(Debug, Clone, Serialize)]
pub struct StepSummary {
    pub step: usize,
    pub timestamp: NaiveDateTime,
    /// Total household demand (kW).
    pub load_kw: f64,
    /// Total PV production (kW).
    pub pv_kw: f64,
    /// Total accepted battery flow (kW, positive = discharge).
    pub battery_kw: f64,
    /// Sum of grid flows drawn by households (kW).
    pub import_kw: f64,
    /// Sum of grid flows fed in by households (kW).
    pub export_kw: f64,
    pub curtailed_kw: f64,
    /// Mean battery SOC across prosumers (%).
    pub mean_soc: f64,
    pub min_vm_pu: f64,
    pub max_vm_pu: f64,
    pub max_loading_percent: f64,
    /// Power drawn from the external grid (kW).
    pub slack_p_kw: f64,
    pub flags: RiskFlags,
    /// Prosumers whose mode or strategy changed after this step.
    pub switched: usize,
}

impl fmt::Display for StepSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "t={:>4} {} | load={:>6.2} pv={:>6.2} bat={:>6.2} kW (SoC={:>5.1}%) | \
             import={:>6.2} export={:>6.2} curt={:>5.2} kW | \
             vm=[{:.4}, {:.4}] pu load={:>5.1}% slack={:>7.2} kW | {} sw={}",
            self.step,
            self.timestamp.format("%Y-%m-%d %H:%M"),
            self.load_kw,
            self.pv_kw,
            self.battery_kw,
            self.mean_soc,
            self.import_kw,
            self.export_kw,
            self.curtailed_kw,
            self.min_vm_pu,
            self.max_vm_pu,
            self.max_loading_percent,
            self.slack_p_kw,
            self.flags,
            self.switched,
        )
    }
}
