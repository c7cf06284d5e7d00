//! A feeder's worth of prosumers keyed by bus name.

use std::collections::BTreeMap;

use rand::{Rng, SeedableRng, rngs::StdRng};
use tracing::debug;

use crate::config::{BatteryModel, NeighborhoodConfig, ProsumerConfig};
use crate::devices::{
    PanelSpec, PvGenerator, PvInstallation, PvSizing, RcBattery, SimpleBattery, Storage,
};
use crate::error::ConfigurationError;
use crate::sim::prosumer::Prosumer;

/// Builds one prosumer from a template and an explicit PV sizing.
///
/// # Errors
///
/// Returns a [`ConfigurationError`] if the PV or battery parameters are invalid.
pub fn build_prosumer(
    name: &str,
    cfg: &ProsumerConfig,
    sizing: &PvSizing,
) -> Result<Prosumer, ConfigurationError> {
    let panel = PanelSpec {
        rated_kw: cfg.panel_rated_kw,
        area_m2: cfg.panel_area_m2,
    };
    let installation =
        PvInstallation::new(sizing, panel, cfg.system_loss_fraction, cfg.pv_strategy)?;
    let battery: Storage = match cfg.battery_model {
        BatteryModel::Simple => SimpleBattery::new(
            cfg.capacity_kwh,
            cfg.initial_soc,
            cfg.battery_mode,
            cfg.soc_band,
        )?
        .into(),
        BatteryModel::Rc => RcBattery::new(
            cfg.capacity_kwh,
            cfg.initial_soc,
            cfg.battery_mode,
            cfg.soc_band,
            cfg.cell,
        )?
        .into(),
    };
    Ok(Prosumer::new(name, PvGenerator::new(installation), battery))
}

/// Prosumers iterated in bus-name order.
#[derive(Debug, Clone, Default)]
pub struct Neighborhood {
    prosumers: BTreeMap<String, Prosumer>,
}

impl Neighborhood {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates one prosumer per bus with a seeded load-scale variation.
    ///
    /// Each prosumer's load scale is drawn uniformly from
    /// `1 ± load_variation`. When a PV-to-peak ratio is configured, PV is
    /// sized to that fraction of the scaled `peak_load_kw`; otherwise the
    /// template's sizing is used.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigurationError`] raised while building a prosumer.
    pub fn generate(
        buses: &[String],
        template: &ProsumerConfig,
        variation: &NeighborhoodConfig,
        peak_load_kw: f64,
        seed: u64,
    ) -> Result<Self, ConfigurationError> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut hood = Self::new();
        for bus in buses {
            let u: f64 = rng.random_range(-1.0..=1.0);
            let load_scale = 1.0 + variation.load_variation * u;
            let sizing = match variation.pv_to_peak_ratio {
                Some(ratio) => PvSizing::capacity(ratio * peak_load_kw * load_scale),
                None => template.sizing.clone(),
            };
            let prosumer = build_prosumer(bus, template, &sizing)?.with_load_scale(load_scale);
            debug!(
                prosumer = %bus,
                load_scale,
                pv_kw = prosumer.pv.installation.installed_capacity_kw,
                "prosumer created"
            );
            hood.insert(prosumer);
        }
        Ok(hood)
    }

    /// Adds a prosumer under its own name, replacing any previous one.
    pub fn insert(&mut self, prosumer: Prosumer) -> Option<Prosumer> {
        self.prosumers.insert(prosumer.name.clone(), prosumer)
    }

    pub fn get(&self, name: &str) -> Option<&Prosumer> {
        self.prosumers.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Prosumer> {
        self.prosumers.get_mut(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Prosumer)> {
        self.prosumers.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&String, &mut Prosumer)> {
        self.prosumers.iter_mut()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.prosumers.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.prosumers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prosumers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::EnergyStore;

    fn buses() -> Vec<String> {
        ["LV1.1", "LV1.2", "LV2.1"].iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn one_prosumer_per_bus_in_name_order() {
        let hood = Neighborhood::generate(
            &buses(),
            &ProsumerConfig::default(),
            &NeighborhoodConfig::default(),
            1.3,
            42,
        )
        .expect("valid neighborhood");
        assert_eq!(hood.len(), 3);
        assert_eq!(hood.names().collect::<Vec<_>>(), vec!["LV1.1", "LV1.2", "LV2.1"]);
    }

    #[test]
    fn load_scale_within_variation() {
        let variation = NeighborhoodConfig {
            load_variation: 0.3,
            pv_to_peak_ratio: None,
        };
        let hood =
            Neighborhood::generate(&buses(), &ProsumerConfig::default(), &variation, 1.3, 7)
                .expect("valid neighborhood");
        for (_, p) in hood.iter() {
            assert!((0.7..=1.3).contains(&p.load_scale));
        }
    }

    #[test]
    fn same_seed_same_neighborhood() {
        let make = || {
            Neighborhood::generate(
                &buses(),
                &ProsumerConfig::default(),
                &NeighborhoodConfig::default(),
                1.3,
                11,
            )
            .expect("valid neighborhood")
        };
        let a = make();
        let b = make();
        for ((_, pa), (_, pb)) in a.iter().zip(b.iter()) {
            assert_eq!(pa.load_scale, pb.load_scale);
        }
    }

    #[test]
    fn pv_sized_from_peak_load() {
        let variation = NeighborhoodConfig {
            load_variation: 0.0,
            pv_to_peak_ratio: Some(0.7),
        };
        let hood =
            Neighborhood::generate(&buses(), &ProsumerConfig::default(), &variation, 3.0, 1)
                .expect("valid neighborhood");
        for (_, p) in hood.iter() {
            // 0.7 * 3.0 = 2.1 kW = 7 panels
            assert_eq!(p.pv.installation.panel_count, 7);
        }
    }

    #[test]
    fn rc_model_is_selected_by_config() {
        let cfg = ProsumerConfig {
            battery_model: BatteryModel::Rc,
            ..ProsumerConfig::default()
        };
        let p = build_prosumer("LV1.1", &cfg, &PvSizing::capacity(2.1)).expect("valid prosumer");
        assert_eq!(p.battery.device_type(), "RCBattery");
    }

    #[test]
    fn invalid_template_fails_generation() {
        let cfg = ProsumerConfig {
            capacity_kwh: -1.0,
            ..ProsumerConfig::default()
        };
        let r = Neighborhood::generate(&buses(), &cfg, &NeighborhoodConfig::default(), 1.3, 1);
        assert!(r.is_err());
    }
}
