//! TOML-based scenario configuration and preset definitions.

use std::fs;
use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime};
use serde::Deserialize;

use crate::devices::{BatteryMode, CellParams, PvSizing, PvStrategy, SocBand};
use crate::error::ConfigurationError;
use crate::sim::feeder::{BusSpec, LineSpec, RadialFeeder, SweepSettings, default_topology};
use crate::sim::neighborhood::build_prosumer;
use crate::sim::supervisor::SupervisorLimits;
use crate::sim::types::SimConfig;

/// Top-level scenario configuration parsed from TOML.
///
/// All fields have defaults matching the baseline scenario. Load from
/// TOML with [`ScenarioConfig::from_toml_file`] or use
/// [`ScenarioConfig::baseline`] for the built-in default.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScenarioConfig {
    /// Simulation timing and seed.
    pub simulation: SimulationConfig,
    /// Template for every prosumer of the neighbourhood.
    pub prosumer: ProsumerConfig,
    /// Per-prosumer variation.
    pub neighborhood: NeighborhoodConfig,
    /// Synthetic load and irradiance profiles.
    pub profile: ProfileConfig,
    /// LV network and solver settings.
    pub grid: GridConfig,
    /// Risk thresholds.
    pub supervisor: SupervisorLimits,
}

/// Simulation timing and global parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationConfig {
    /// Timestamp of step 0, written as `"YYYY-MM-DDTHH:MM:SS"`.
    pub start: NaiveDateTime,
    /// Timestep length (seconds, must be > 0).
    pub timestep_seconds: f64,
    /// Number of timesteps (must be > 0).
    pub steps: usize,
    /// Master random seed.
    pub seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            start: NaiveDate::from_ymd_opt(2021, 6, 1)
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .unwrap_or_default(),
            timestep_seconds: 900.0,
            steps: 96,
            seed: 42,
        }
    }
}

impl SimulationConfig {
    /// Converts to the engine's run configuration.
    ///
    /// # Panics
    ///
    /// Panics on a non-positive timestep or zero steps; call
    /// [`ScenarioConfig::validate`] first.
    pub fn to_sim_config(&self) -> SimConfig {
        SimConfig::new(self.start, self.timestep_seconds, self.steps, self.seed)
    }
}

/// Battery implementation used by every prosumer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BatteryModel {
    /// Linear energy bucket.
    #[default]
    Simple,
    /// RC equivalent circuit.
    Rc,
}

/// Prosumer template: PV sizing and battery parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProsumerConfig {
    /// Any one of installed capacity, panel count or roof area.
    pub sizing: PvSizing,
    pub panel_rated_kw: f64,
    pub panel_area_m2: f64,
    /// Fraction of DC output lost in wiring and inverter (0.0-1.0).
    pub system_loss_fraction: f64,
    pub pv_strategy: PvStrategy,
    pub battery_model: BatteryModel,
    /// Usable battery energy (kWh).
    pub capacity_kwh: f64,
    /// Initial state of charge (%).
    pub initial_soc: f64,
    /// `[low, high]` band in percent, used in buffer-grid mode.
    pub soc_band: SocBand,
    pub battery_mode: BatteryMode,
    /// Cell parameters of the RC model.
    pub cell: CellParams,
}

impl Default for ProsumerConfig {
    fn default() -> Self {
        Self {
            sizing: PvSizing::capacity(2.1),
            panel_rated_kw: 0.3,
            panel_area_m2: 1.96,
            system_loss_fraction: 0.0035,
            pv_strategy: PvStrategy::SelfConsumption,
            battery_model: BatteryModel::Simple,
            capacity_kwh: 3.5,
            initial_soc: 60.0,
            soc_band: SocBand::default(),
            battery_mode: BatteryMode::SelfConsumption,
            cell: CellParams::default(),
        }
    }
}

/// Variation between prosumers of one neighbourhood.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NeighborhoodConfig {
    /// Load scale is drawn from `1 ± load_variation` (0.0-1.0).
    pub load_variation: f64,
    /// When set, PV capacity = ratio * scaled peak load.
    pub pv_to_peak_ratio: Option<f64>,
}

impl Default for NeighborhoodConfig {
    fn default() -> Self {
        Self {
            load_variation: 0.3,
            pv_to_peak_ratio: None,
        }
    }
}

/// Synthetic profile parameters.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProfileConfig {
    /// Baseline household consumption (kW).
    pub load_base_kw: f64,
    /// Sinusoidal amplitude (kW).
    pub load_amp_kw: f64,
    /// Phase offset (radians).
    pub load_phase_rad: f64,
    /// Gaussian noise standard deviation (kW).
    pub load_noise_std: f64,
    /// Clear-sky irradiance at solar noon (W/m2).
    pub peak_irradiance_w_m2: f64,
    pub sunrise_hour: f64,
    pub sunset_hour: f64,
    /// AR(1) cloud correlation (0.0-1.0).
    pub cloud_alpha: f64,
    pub cloud_noise_std: f64,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            load_base_kw: 0.8,
            load_amp_kw: 0.5,
            // evening peak around 19:00
            load_phase_rad: -3.4,
            load_noise_std: 0.05,
            peak_irradiance_w_m2: 800.0,
            sunrise_hour: 6.0,
            sunset_hour: 20.0,
            cloud_alpha: 0.9,
            cloud_noise_std: 0.2,
        }
    }
}

impl ProfileConfig {
    /// Highest noise-free household demand (kW).
    pub fn peak_load_kw(&self) -> f64 {
        self.load_base_kw + self.load_amp_kw.abs()
    }
}

/// LV network topology and sweep settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GridConfig {
    pub slack_vm_pu: f64,
    pub nominal_kv: f64,
    pub tolerance_pu: f64,
    pub max_iterations: usize,
    /// First bus is the slack bus.
    pub buses: Vec<BusSpec>,
    pub lines: Vec<LineSpec>,
}

impl Default for GridConfig {
    fn default() -> Self {
        let (buses, lines) = default_topology();
        let s = SweepSettings::default();
        Self {
            slack_vm_pu: s.slack_vm_pu,
            nominal_kv: s.nominal_kv,
            tolerance_pu: s.tolerance_pu,
            max_iterations: s.max_iterations,
            buses,
            lines,
        }
    }
}

impl GridConfig {
    pub fn settings(&self) -> SweepSettings {
        SweepSettings {
            slack_vm_pu: self.slack_vm_pu,
            nominal_kv: self.nominal_kv,
            tolerance_pu: self.tolerance_pu,
            max_iterations: self.max_iterations,
        }
    }

    /// Builds the radial feeder solver.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::error::SolverError`] if the topology is not a tree.
    pub fn build_feeder(&self) -> Result<RadialFeeder, crate::error::SolverError> {
        RadialFeeder::new(
            "LV",
            self.buses.clone(),
            self.lines.clone(),
            self.settings(),
        )
    }
}

impl ScenarioConfig {
    /// Returns the baseline scenario: 2.1 kW PV and a 3.5 kWh battery per household.
    pub fn baseline() -> Self {
        Self::default()
    }

    /// Returns the high-PV preset: 6 kW arrays under a strong sun, the
    /// supervisor's over-voltage path is exercised.
    pub fn high_pv() -> Self {
        Self {
            prosumer: ProsumerConfig {
                sizing: PvSizing::capacity(6.0),
                ..ProsumerConfig::default()
            },
            profile: ProfileConfig {
                peak_irradiance_w_m2: 900.0,
                cloud_noise_std: 0.1,
                ..ProfileConfig::default()
            },
            ..Self::default()
        }
    }

    /// Returns the buffer-grid preset: batteries keep a 30-70 % band.
    ///
    /// The supervisor only observes here, otherwise its `to_default`
    /// bucket would put every battery back into self-consumption.
    pub fn buffer_grid() -> Self {
        Self {
            prosumer: ProsumerConfig {
                battery_mode: BatteryMode::BufferGrid,
                soc_band: SocBand::new(30.0, 70.0).unwrap_or_default(),
                initial_soc: 50.0,
                ..ProsumerConfig::default()
            },
            supervisor: SupervisorLimits {
                bypass: true,
                ..SupervisorLimits::default()
            },
            ..Self::default()
        }
    }

    /// Returns the RC preset: equivalent-circuit batteries, PV sized to peak load.
    pub fn rc_battery() -> Self {
        Self {
            prosumer: ProsumerConfig {
                battery_model: BatteryModel::Rc,
                ..ProsumerConfig::default()
            },
            neighborhood: NeighborhoodConfig {
                pv_to_peak_ratio: Some(1.6),
                ..NeighborhoodConfig::default()
            },
            ..Self::default()
        }
    }

    /// Available preset names.
    pub const PRESETS: &[&str] = &["baseline", "high_pv", "buffer_grid", "rc_battery"];

    /// Loads a scenario from a named preset.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] if the preset name is unknown.
    pub fn from_preset(name: &str) -> Result<Self, ConfigurationError> {
        match name {
            "baseline" => Ok(Self::baseline()),
            "high_pv" => Ok(Self::high_pv()),
            "buffer_grid" => Ok(Self::buffer_grid()),
            "rc_battery" => Ok(Self::rc_battery()),
            _ => Err(ConfigurationError::invalid(
                "preset",
                format!(
                    "unknown preset \"{name}\", available: {}",
                    Self::PRESETS.join(", ")
                ),
            )),
        }
    }

    /// Parses a scenario from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] if the file cannot be read or the TOML is invalid.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigurationError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigurationError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses a scenario from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] if the TOML is invalid or contains unknown fields.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigurationError> {
        Ok(toml::from_str(s)?)
    }

    /// Validates all fields and returns every violation found.
    ///
    /// Returns an empty vector if the configuration is valid.
    pub fn validate(&self) -> Vec<ConfigurationError> {
        let mut errors = Vec::new();
        let mut check = |ok: bool, field: &str, message: &str| {
            if !ok {
                errors.push(ConfigurationError::invalid(field, message));
            }
        };

        let s = &self.simulation;
        check(
            s.timestep_seconds.is_finite() && s.timestep_seconds > 0.0,
            "simulation.timestep_seconds",
            "must be > 0",
        );
        check(s.steps > 0, "simulation.steps", "must be > 0");

        let n = &self.neighborhood;
        check(
            (0.0..1.0).contains(&n.load_variation),
            "neighborhood.load_variation",
            "must be in [0, 1)",
        );
        check(
            n.pv_to_peak_ratio.is_none_or(|r| r.is_finite() && r > 0.0),
            "neighborhood.pv_to_peak_ratio",
            "must be > 0",
        );

        let p = &self.profile;
        check(p.load_base_kw >= 0.0, "profile.load_base_kw", "must be >= 0");
        check(p.load_noise_std >= 0.0, "profile.load_noise_std", "must be >= 0");
        check(
            p.peak_irradiance_w_m2 >= 0.0,
            "profile.peak_irradiance_w_m2",
            "must be >= 0",
        );
        check(
            (0.0..=24.0).contains(&p.sunrise_hour) && (0.0..=24.0).contains(&p.sunset_hour),
            "profile.sunrise_hour",
            "sunrise and sunset must lie within 0..=24",
        );
        check(
            p.sunrise_hour < p.sunset_hour,
            "profile.sunset_hour",
            "must be > sunrise_hour",
        );
        check(
            (0.0..=1.0).contains(&p.cloud_alpha),
            "profile.cloud_alpha",
            "must be in [0, 1]",
        );
        check(p.cloud_noise_std >= 0.0, "profile.cloud_noise_std", "must be >= 0");

        let v = &self.supervisor;
        check(
            v.undervoltage_pu < v.overvoltage_pu,
            "supervisor.undervoltage_pu",
            "must be < overvoltage_pu",
        );
        check(
            v.thermal_loading_percent > 0.0,
            "supervisor.thermal_loading_percent",
            "must be > 0",
        );
        check(self.grid.max_iterations > 0, "grid.max_iterations", "must be > 0");
        check(self.grid.tolerance_pu > 0.0, "grid.tolerance_pu", "must be > 0");

        match self.grid.build_feeder() {
            Ok(feeder) if feeder.prosumer_buses().is_empty() => errors.push(
                ConfigurationError::invalid("grid.buses", "no bus hosts a prosumer"),
            ),
            Ok(_) => {}
            Err(e) => errors.push(ConfigurationError::invalid("grid", e.to_string())),
        }

        if let Err(e) = build_prosumer("template", &self.prosumer, &self.prosumer.sizing) {
            errors.push(ConfigurationError::invalid("prosumer", e.to_string()));
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn baseline_validates() {
        let cfg = ScenarioConfig::baseline();
        let errors = cfg.validate();
        assert!(errors.is_empty(), "baseline errors: {errors:?}");
    }

    #[test]
    fn all_presets_validate() {
        for name in ScenarioConfig::PRESETS {
            let cfg = ScenarioConfig::from_preset(name).expect("known preset");
            let errors = cfg.validate();
            assert!(errors.is_empty(), "preset {name} errors: {errors:?}");
        }
    }

    #[test]
    fn unknown_preset_errors() {
        let err = ScenarioConfig::from_preset("nonexistent").unwrap_err();
        assert!(err.to_string().contains("unknown preset"));
    }

    #[test]
    fn baseline_defaults() {
        let cfg = ScenarioConfig::baseline();
        assert_eq!(cfg.simulation.steps, 96);
        assert_eq!(cfg.simulation.timestep_seconds, 900.0);
        assert_eq!(cfg.prosumer.capacity_kwh, 3.5);
        assert_eq!(cfg.prosumer.sizing.installed_capacity_kw, Some(2.1));
        assert_eq!(cfg.grid.buses.len(), 12);
        assert_eq!(cfg.supervisor.overvoltage_pu, 1.03);
    }

    #[test]
    fn empty_toml_gives_baseline() {
        let cfg = ScenarioConfig::from_toml_str("").expect("valid toml");
        assert_eq!(cfg.simulation.seed, 42);
        assert_eq!(cfg.prosumer.battery_model, BatteryModel::Simple);
        assert_eq!(cfg.grid, GridConfig::default());
    }

    #[test]
    fn toml_overrides() {
        let toml = r#"
[simulation]
start = "2021-07-01T06:00:00"
steps = 48
seed = 7

[prosumer]
battery_model = "rc"
battery_mode = "buffer-grid"
pv_strategy = "curtailment"
soc_band = [25.0, 75.0]

[prosumer.sizing]
panel_count = 10

[neighborhood]
pv_to_peak_ratio = 1.2

[supervisor]
include_downstream = true
"#;
        let cfg = ScenarioConfig::from_toml_str(toml).expect("valid toml");
        assert_eq!(cfg.simulation.steps, 48);
        assert_eq!(cfg.simulation.seed, 7);
        assert_eq!(cfg.prosumer.battery_model, BatteryModel::Rc);
        assert_eq!(cfg.prosumer.battery_mode, BatteryMode::BufferGrid);
        assert_eq!(cfg.prosumer.pv_strategy, PvStrategy::Curtailment);
        assert_eq!(cfg.prosumer.soc_band.low(), 25.0);
        assert_eq!(cfg.prosumer.sizing.panel_count, Some(10));
        assert_eq!(cfg.neighborhood.pv_to_peak_ratio, Some(1.2));
        assert!(cfg.supervisor.include_downstream);
        // Unspecified values keep their defaults.
        assert_eq!(cfg.prosumer.capacity_kwh, 3.5);
        assert!(cfg.validate().is_empty());
    }

    #[test]
    fn unknown_field_rejected() {
        let toml = "[simulation]\nbogus_field = 42\n";
        assert!(ScenarioConfig::from_toml_str(toml).is_err());
    }

    #[test]
    fn mode_typo_rejected() {
        let toml = "[prosumer]\nbattery_mode = \"self_consumption\"\n";
        assert!(ScenarioConfig::from_toml_str(toml).is_err());
    }

    #[test]
    fn invalid_band_rejected_at_parse() {
        let toml = "[prosumer]\nsoc_band = [80.0, 20.0]\n";
        assert!(ScenarioConfig::from_toml_str(toml).is_err());
    }

    #[test]
    fn validate_collects_every_violation() {
        let mut cfg = ScenarioConfig::baseline();
        cfg.simulation.steps = 0;
        cfg.simulation.timestep_seconds = -1.0;
        cfg.profile.sunrise_hour = 21.0;
        cfg.prosumer.capacity_kwh = 0.0;
        let errors = cfg.validate();
        let fields: Vec<String> = errors
            .iter()
            .filter_map(|e| match e {
                ConfigurationError::Invalid { field, .. } => Some(field.clone()),
                _ => None,
            })
            .collect();
        assert!(fields.contains(&"simulation.steps".to_string()));
        assert!(fields.contains(&"simulation.timestep_seconds".to_string()));
        assert!(fields.contains(&"profile.sunset_hour".to_string()));
        assert!(fields.contains(&"prosumer".to_string()));
    }

    #[test]
    fn broken_topology_fails_validation() {
        let mut cfg = ScenarioConfig::baseline();
        cfg.grid.lines.pop();
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.to_string().contains("grid")));
    }

    #[test]
    fn missing_file_is_read_error() {
        let err = ScenarioConfig::from_toml_file(Path::new("/nonexistent/scenario.toml"))
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::Read { .. }));
    }
}
