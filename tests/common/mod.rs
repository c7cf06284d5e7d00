//! Shared test fixtures for integration tests.
#![allow(dead_code)]

use chrono::NaiveDateTime;
use prosumer_sim::config::ScenarioConfig;
use prosumer_sim::devices::{
    BatteryMode, PanelSpec, PvGenerator, PvInstallation, PvSizing, PvStrategy, SimpleBattery,
    SocBand,
};
use prosumer_sim::sim::grid::{BusResult, GridState, LineResult};
use prosumer_sim::sim::prosumer::Prosumer;

/// Noon on the default simulation day.
pub fn noon() -> NaiveDateTime {
    NaiveDateTime::parse_from_str("2021-06-01 12:00:00", "%Y-%m-%d %H:%M:%S")
        .expect("valid timestamp")
}

/// Baseline scenario shortened to `steps` timesteps.
pub fn baseline_config(steps: usize) -> ScenarioConfig {
    let mut cfg = ScenarioConfig::baseline();
    cfg.simulation.steps = steps;
    cfg
}

/// Default prosumer: 2.1 kW PV (7 panels), 3.5 kWh simple battery.
pub fn default_prosumer(name: &str, soc: f64, mode: BatteryMode, strategy: PvStrategy) -> Prosumer {
    let installation =
        PvInstallation::new(&PvSizing::capacity(2.1), PanelSpec::default(), 0.0035, strategy)
            .expect("valid pv");
    let battery = SimpleBattery::new(3.5, soc, mode, SocBand::default()).expect("valid battery");
    Prosumer::new(name, PvGenerator::new(installation), battery)
}

/// Grid state with the given bus voltages and no lines. `LV0` is the slack bus.
pub fn voltage_state(buses: &[(&str, f64)]) -> GridState {
    GridState {
        buses: buses
            .iter()
            .map(|&(name, vm_pu)| BusResult {
                name: name.to_string(),
                vm_pu,
                hosts_prosumer: name != "LV0",
            })
            .collect(),
        lines: Vec::new(),
        slack_p_kw: 0.0,
    }
}

/// Line result with the given loading.
pub fn line(name: &str, from: &str, to: &str, loading_percent: f64) -> LineResult {
    LineResult {
        name: name.to_string(),
        from_bus: from.to_string(),
        to_bus: to.to_string(),
        loading_percent,
    }
}
