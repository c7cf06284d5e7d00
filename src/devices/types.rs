//! Common types and traits for prosumer devices.

use std::fmt;

use rand::{Rng, rngs::StdRng};
use serde::{Deserialize, Serialize};

use crate::recorder::Recorder;

/// Battery operating mode, switched at runtime by the grid supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BatteryMode {
    /// Absorb or release the full requested flow up to 0 % / 100 % SOC.
    #[default]
    SelfConsumption,
    /// Taper the accepted flow outside the configured SOC band.
    BufferGrid,
}

impl BatteryMode {
    pub fn label(self) -> &'static str {
        match self {
            Self::SelfConsumption => "self-consumption",
            Self::BufferGrid => "buffer-grid",
        }
    }
}

impl fmt::Display for BatteryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// What happens to PV surplus the battery could not take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PvStrategy {
    /// Surplus is fed into the grid.
    #[default]
    SelfConsumption,
    /// Surplus is discarded at the inverter.
    Curtailment,
}

impl PvStrategy {
    pub fn label(self) -> &'static str {
        match self {
            Self::SelfConsumption => "self-consumption",
            Self::Curtailment => "curtailment",
        }
    }
}

impl fmt::Display for PvStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Battery state derived from SOC after each step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BatteryStatus {
    Operational,
    FullyCharged,
    Depleted,
    /// No current through the pack this step (RC model only).
    StandBy,
}

impl BatteryStatus {
    /// Status implied by a state of charge in percent.
    pub fn from_soc(soc_percent: f64) -> Self {
        if soc_percent >= 100.0 {
            Self::FullyCharged
        } else if soc_percent <= 0.0 {
            Self::Depleted
        } else {
            Self::Operational
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Operational => "Operational",
            Self::FullyCharged => "Fully-charged",
            Self::Depleted => "Depleted",
            Self::StandBy => "Stand-by",
        }
    }
}

impl fmt::Display for BatteryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// What the battery did during one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BatteryEvent {
    Charging,
    Discharging,
    FullyCharged,
    Depleted,
    Idle,
    Overload,
}

impl BatteryEvent {
    pub fn label(self) -> &'static str {
        match self {
            Self::Charging => "charging",
            Self::Discharging => "discharging",
            Self::FullyCharged => "charged, fully charged",
            Self::Depleted => "discharged, depleted",
            Self::Idle => "no power flow through battery",
            Self::Overload => "overload, flow rejected",
        }
    }

    /// Classifies a completed step from the request, the accepted flow and
    /// the SOC reached.
    pub(crate) fn classify(requested_kw: f64, accepted_kw: f64, soc_percent: f64) -> Self {
        if requested_kw < 0.0 && soc_percent >= 100.0 {
            Self::FullyCharged
        } else if requested_kw > 0.0 && soc_percent <= 0.0 {
            Self::Depleted
        } else if accepted_kw < 0.0 {
            Self::Charging
        } else if accepted_kw > 0.0 {
            Self::Discharging
        } else {
            Self::Idle
        }
    }
}

impl fmt::Display for BatteryEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Outcome of one [`EnergyStore::process`] call.
///
/// `accepted_kw - rejected_kw` always equals the requested flow.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatteryResponse {
    /// Flow the battery actually took (positive = discharge).
    pub accepted_kw: f64,
    /// Flow left for the grid (positive = surplus pushed out, negative = shortfall).
    pub rejected_kw: f64,
}

/// One battery observation per timestep.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BatteryRecord {
    pub accepted_kw: f64,
    pub rejected_kw: f64,
    pub soc_percent: f64,
    pub status: BatteryStatus,
    pub event: BatteryEvent,
    /// C-rate limit exceeded during this step.
    pub overload: bool,
}

/// Anything that turns irradiance into active power.
pub trait PowerSource {
    /// Returns produced power in kW for an irradiance accumulated over the
    /// timestep (Wh/m2), and records the observation.
    fn production(&mut self, irradiance_wh_m2: f64, timestep_seconds: f64) -> f64;

    /// Returns a human-readable type name for the device.
    fn device_type(&self) -> &'static str;
}

/// A storage unit that splits a requested flow into accepted and rejected
/// parts.
///
/// Sign convention: positive power discharges the battery (load relief),
/// negative power charges it. Implementations append exactly one
/// [`BatteryRecord`] per `process` call, including zero requests.
pub trait EnergyStore {
    /// Applies `power_kw` for `timestep_seconds` and returns the split.
    ///
    /// Callers must pass a positive, finite timestep. Capacity limits are
    /// never an error: whatever cannot be served is returned as rejected.
    fn process(&mut self, power_kw: f64, timestep_seconds: f64) -> BatteryResponse;

    /// State of charge in percent.
    fn soc(&self) -> f64;

    fn status(&self) -> BatteryStatus;

    fn mode(&self) -> BatteryMode;

    fn set_mode(&mut self, mode: BatteryMode);

    fn capacity_kwh(&self) -> f64;

    fn history(&self) -> &Recorder<BatteryRecord>;

    /// Returns a human-readable type name for the device.
    fn device_type(&self) -> &'static str;
}

/// Utility function to generate Gaussian noise using Box-Muller transform.
///
/// # Arguments
///
/// * `rng` - Random number generator
/// * `std_dev` - Standard deviation of the noise
///
/// # Returns
///
/// Random value from a Gaussian distribution with mean 0 and specified standard deviation
pub fn gaussian_noise(rng: &mut StdRng, std_dev: f64) -> f64 {
    if std_dev <= 0.0 {
        return 0.0;
    }

    let u1: f64 = rng.random::<f64>().clamp(1e-12, 1.0);
    let u2: f64 = rng.random::<f64>();
    let z0 = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
    z0 * std_dev
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn status_from_soc_bounds() {
        assert_eq!(BatteryStatus::from_soc(100.0), BatteryStatus::FullyCharged);
        assert_eq!(BatteryStatus::from_soc(0.0), BatteryStatus::Depleted);
        assert_eq!(BatteryStatus::from_soc(42.0), BatteryStatus::Operational);
    }

    #[test]
    fn modes_deserialize_from_kebab_case() {
        #[derive(Deserialize)]
        struct Wrap {
            mode: BatteryMode,
            strategy: PvStrategy,
        }
        let w: Wrap = toml::from_str("mode = \"buffer-grid\"\nstrategy = \"curtailment\"")
            .expect("valid enums");
        assert_eq!(w.mode, BatteryMode::BufferGrid);
        assert_eq!(w.strategy, PvStrategy::Curtailment);
    }

    #[test]
    fn typo_in_mode_is_rejected() {
        #[derive(Debug, Deserialize)]
        #[allow(dead_code)]
        struct Wrap {
            mode: BatteryMode,
        }
        assert!(toml::from_str::<Wrap>("mode = \"buffer_grid\"").is_err());
    }

    #[test]
    fn event_classification() {
        assert_eq!(BatteryEvent::classify(-1.0, -1.0, 50.0), BatteryEvent::Charging);
        assert_eq!(BatteryEvent::classify(1.0, 1.0, 50.0), BatteryEvent::Discharging);
        assert_eq!(BatteryEvent::classify(-1.0, 0.0, 100.0), BatteryEvent::FullyCharged);
        assert_eq!(BatteryEvent::classify(1.0, 0.3, 0.0), BatteryEvent::Depleted);
        assert_eq!(BatteryEvent::classify(0.0, 0.0, 50.0), BatteryEvent::Idle);
    }

    #[test]
    fn gaussian_noise_zero_std() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(gaussian_noise(&mut rng, 0.0), 0.0);
    }

    #[test]
    fn gaussian_noise_is_seeded() {
        let mut a = StdRng::seed_from_u64(7);
        let mut b = StdRng::seed_from_u64(7);
        for _ in 0..10 {
            assert_eq!(gaussian_noise(&mut a, 0.5), gaussian_noise(&mut b, 0.5));
        }
    }
}
