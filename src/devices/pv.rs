//! Rooftop PV installation sizing and irradiance-driven production.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::devices::types::{PowerSource, PvStrategy};
use crate::error::ConfigurationError;
use crate::recorder::Recorder;

/// Tolerance used when deciding whether a capacity is a whole number of panels.
const PANEL_MULTIPLE_TOLERANCE: f64 = 1e-9;

/// Conversion from Wh/m2 per second to kW/m2.
const WH_PER_SECOND_TO_KW: f64 = 3.6;

/// Rated power and footprint of one module.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PanelSpec {
    pub rated_kw: f64,
    pub area_m2: f64,
}

impl Default for PanelSpec {
    fn default() -> Self {
        Self {
            rated_kw: 0.3,
            area_m2: 1.96,
        }
    }
}

/// Caller-supplied sizing. At least one field must be set.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PvSizing {
    pub installed_capacity_kw: Option<f64>,
    pub panel_count: Option<u32>,
    pub roof_area_m2: Option<f64>,
}

impl PvSizing {
    pub fn capacity(kw: f64) -> Self {
        Self {
            installed_capacity_kw: Some(kw),
            ..Self::default()
        }
    }

    pub fn panels(count: u32) -> Self {
        Self {
            panel_count: Some(count),
            ..Self::default()
        }
    }

    pub fn roof(area_m2: f64) -> Self {
        Self {
            roof_area_m2: Some(area_m2),
            ..Self::default()
        }
    }
}

/// Static description of a PV system after sizing reconciliation.
///
/// `installed_capacity_kw == panel_count * panel_rated_kw` holds for every
/// value returned by [`PvInstallation::new`].
#[derive(Debug, Clone, PartialEq)]
pub struct PvInstallation {
    pub installed_capacity_kw: f64,
    pub panel_count: u32,
    pub panel_rated_kw: f64,
    pub panel_area_m2: f64,
    /// Fixed inverter and wiring derate (0..1).
    pub system_loss_fraction: f64,
    pub strategy: PvStrategy,
}

impl PvInstallation {
    /// Reconciles a sizing request into a consistent installation.
    ///
    /// Given any one of installed capacity, panel count or roof area the other
    /// two are derived. A capacity that is not a whole number of panels is
    /// raised to the next whole panel with a warning.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] when no sizing is given, a value is
    /// out of range, the panels do not fit on the roof, or capacity and
    /// panel count disagree.
    pub fn new(
        sizing: &PvSizing,
        panel: PanelSpec,
        system_loss_fraction: f64,
        strategy: PvStrategy,
    ) -> Result<Self, ConfigurationError> {
        positive("panel_rated_kw", panel.rated_kw)?;
        positive("panel_area_m2", panel.area_m2)?;
        if !(0.0..1.0).contains(&system_loss_fraction) {
            return Err(ConfigurationError::OutOfRange {
                field: "system_loss_fraction",
                value: system_loss_fraction,
                constraint: "in [0, 1)",
            });
        }
        if let Some(roof) = sizing.roof_area_m2 {
            positive("roof_area_m2", roof)?;
        }

        let (installed_capacity_kw, panel_count) =
            match (sizing.installed_capacity_kw, sizing.panel_count) {
                (Some(kw), count) => {
                    positive("installed_capacity_kw", kw)?;
                    let (kw, n) = whole_panels(kw, panel.rated_kw);
                    if let Some(count) = count {
                        if count != n {
                            return Err(ConfigurationError::SizingMismatch {
                                installed_capacity_kw: kw,
                                panel_count: count,
                                panel_rated_kw: panel.rated_kw,
                            });
                        }
                    }
                    (kw, n)
                }
                (None, Some(count)) => {
                    if count == 0 {
                        return Err(ConfigurationError::OutOfRange {
                            field: "panel_count",
                            value: 0.0,
                            constraint: "> 0",
                        });
                    }
                    (f64::from(count) * panel.rated_kw, count)
                }
                (None, None) => {
                    let roof = sizing
                        .roof_area_m2
                        .ok_or(ConfigurationError::MissingPvSizing)?;
                    let fit = (roof / panel.area_m2).floor();
                    if fit < 1.0 {
                        return Err(ConfigurationError::RoofTooSmall {
                            panel_count: 1,
                            panel_area_m2: panel.area_m2,
                            roof_area_m2: roof,
                        });
                    }
                    let n = fit as u32;
                    (f64::from(n) * panel.rated_kw, n)
                }
            };

        if let Some(roof) = sizing.roof_area_m2 {
            if f64::from(panel_count) * panel.area_m2 > roof + PANEL_MULTIPLE_TOLERANCE {
                return Err(ConfigurationError::RoofTooSmall {
                    panel_count,
                    panel_area_m2: panel.area_m2,
                    roof_area_m2: roof,
                });
            }
        }

        Ok(Self {
            installed_capacity_kw,
            panel_count,
            panel_rated_kw: panel.rated_kw,
            panel_area_m2: panel.area_m2,
            system_loss_fraction,
            strategy,
        })
    }

    /// Total module area in m2.
    pub fn array_area_m2(&self) -> f64 {
        f64::from(self.panel_count) * self.panel_area_m2
    }
}

fn positive(field: &'static str, value: f64) -> Result<(), ConfigurationError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigurationError::OutOfRange {
            field,
            value,
            constraint: "> 0",
        })
    }
}

/// Rounds a capacity up to whole panels; exact multiples keep the caller's value.
fn whole_panels(capacity_kw: f64, rated_kw: f64) -> (f64, u32) {
    let exact = capacity_kw / rated_kw;
    let nearest = exact.round();
    if (exact - nearest).abs() < PANEL_MULTIPLE_TOLERANCE && nearest >= 1.0 {
        return (capacity_kw, nearest as u32);
    }
    let n = exact.ceil().max(1.0) as u32;
    let adjusted = f64::from(n) * rated_kw;
    warn!(
        requested_kw = capacity_kw,
        adjusted_kw = adjusted,
        panels = n,
        "installed capacity is not a whole number of panels, readjusted upward"
    );
    (adjusted, n)
}

/// One PV observation per timestep.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PvRecord {
    pub irradiance_wh_m2: f64,
    /// Array output before the system-loss derate.
    pub raw_kw: f64,
    /// Output after the derate; this is what the household sees.
    pub produced_kw: f64,
    /// Settled by the controller after the battery has responded.
    pub curtailed_kw: f64,
}

/// PV generator: a sized installation plus its production history.
#[derive(Debug, Clone)]
pub struct PvGenerator {
    pub installation: PvInstallation,
    history: Recorder<PvRecord>,
}

impl PvGenerator {
    pub fn new(installation: PvInstallation) -> Self {
        Self {
            installation,
            history: Recorder::new(),
        }
    }

    pub fn strategy(&self) -> PvStrategy {
        self.installation.strategy
    }

    pub fn set_strategy(&mut self, strategy: PvStrategy) {
        self.installation.strategy = strategy;
    }

    /// Records the curtailment decided for the latest production step.
    pub fn settle_curtailment(&mut self, curtailed_kw: f64) {
        if let Some(row) = self.history.last_mut() {
            row.curtailed_kw = curtailed_kw;
        }
    }

    pub fn history(&self) -> &Recorder<PvRecord> {
        &self.history
    }

    /// Array output clipped to the installed capacity, before losses.
    pub fn raw_power_kw(&self, irradiance_wh_m2: f64, timestep_seconds: f64) -> f64 {
        let inst = &self.installation;
        let p_sun_kw =
            irradiance_wh_m2 * inst.array_area_m2() / timestep_seconds * WH_PER_SECOND_TO_KW;
        p_sun_kw.max(0.0).min(inst.installed_capacity_kw)
    }

    /// Produced power without recording anything.
    pub fn power_kw(&self, irradiance_wh_m2: f64, timestep_seconds: f64) -> f64 {
        self.derate(self.raw_power_kw(irradiance_wh_m2, timestep_seconds))
    }

    fn derate(&self, raw_kw: f64) -> f64 {
        raw_kw * (1.0 - self.installation.system_loss_fraction)
    }
}

impl PowerSource for PvGenerator {
    fn production(&mut self, irradiance_wh_m2: f64, timestep_seconds: f64) -> f64 {
        let raw_kw = self.raw_power_kw(irradiance_wh_m2, timestep_seconds);
        let produced_kw = self.derate(raw_kw);
        self.history.record(PvRecord {
            irradiance_wh_m2,
            raw_kw,
            produced_kw,
            curtailed_kw: 0.0,
        });
        produced_kw
    }

    fn device_type(&self) -> &'static str {
        "PVGenerator"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn install(sizing: PvSizing) -> Result<PvInstallation, ConfigurationError> {
        PvInstallation::new(&sizing, PanelSpec::default(), 0.0035, PvStrategy::SelfConsumption)
    }

    #[test]
    fn exact_capacity_is_kept_verbatim() {
        let inst = install(PvSizing::capacity(2.1)).expect("valid sizing");
        assert_eq!(inst.panel_count, 7);
        assert_eq!(inst.installed_capacity_kw, 2.1);
    }

    #[test]
    fn fractional_capacity_rounds_up() {
        let inst = install(PvSizing::capacity(2.0)).expect("valid sizing");
        assert_eq!(inst.panel_count, 7);
        assert!((inst.installed_capacity_kw - 2.1).abs() < 1e-12);
    }

    #[test]
    fn panel_count_derives_capacity() {
        let inst = install(PvSizing::panels(10)).expect("valid sizing");
        assert!((inst.installed_capacity_kw - 3.0).abs() < 1e-12);
    }

    #[test]
    fn roof_area_derives_panels() {
        let inst = install(PvSizing::roof(20.0)).expect("valid sizing");
        // floor(20 / 1.96) = 10
        assert_eq!(inst.panel_count, 10);
        assert!(inst.array_area_m2() <= 20.0);
    }

    #[test]
    fn missing_sizing_is_an_error() {
        assert!(matches!(
            install(PvSizing::default()),
            Err(ConfigurationError::MissingPvSizing)
        ));
    }

    #[test]
    fn roof_too_small_for_panels() {
        let sizing = PvSizing {
            panel_count: Some(12),
            roof_area_m2: Some(10.0),
            ..PvSizing::default()
        };
        assert!(matches!(
            install(sizing),
            Err(ConfigurationError::RoofTooSmall { panel_count: 12, .. })
        ));
    }

    #[test]
    fn roof_smaller_than_one_panel() {
        assert!(matches!(
            install(PvSizing::roof(1.0)),
            Err(ConfigurationError::RoofTooSmall { .. })
        ));
    }

    #[test]
    fn capacity_and_count_must_agree() {
        let sizing = PvSizing {
            installed_capacity_kw: Some(2.1),
            panel_count: Some(8),
            ..PvSizing::default()
        };
        assert!(matches!(
            install(sizing),
            Err(ConfigurationError::SizingMismatch { panel_count: 8, .. })
        ));
    }

    #[test]
    fn negative_capacity_is_rejected() {
        assert!(matches!(
            install(PvSizing::capacity(-1.0)),
            Err(ConfigurationError::OutOfRange {
                field: "installed_capacity_kw",
                ..
            })
        ));
    }

    #[test]
    fn production_reference_scenario() {
        let inst = install(PvSizing::capacity(2.1)).expect("valid sizing");
        let mut pv = PvGenerator::new(inst);
        // 500 Wh/m2 over 60 s on 7 x 1.96 m2 is far above the 2.1 kW ceiling.
        let p = pv.production(500.0, 60.0);
        assert_eq!(p, 2.1 * (1.0 - 0.0035));
        assert_eq!(pv.history().len(), 1);
    }

    #[test]
    fn record_keeps_output_before_and_after_losses() {
        let inst = install(PvSizing::capacity(2.1)).expect("valid sizing");
        let mut pv = PvGenerator::new(inst);
        let p = pv.production(500.0, 60.0);
        let row = pv.history().last().copied().expect("one row");
        assert_eq!(row.raw_kw, 2.1);
        assert_eq!(row.produced_kw, p);
        assert!(row.produced_kw < row.raw_kw);
    }

    #[test]
    fn production_below_ceiling_follows_irradiance() {
        let inst = install(PvSizing::capacity(2.1)).expect("valid sizing");
        let pv = PvGenerator::new(inst);
        // 50 Wh/m2 over one hour on 13.72 m2 = 0.686 kW
        let p = pv.power_kw(50.0, 3600.0);
        assert!((p - 0.686 * 0.9965).abs() < 1e-9);
    }

    #[test]
    fn settle_curtailment_amends_latest_row() {
        let inst = install(PvSizing::capacity(2.1)).expect("valid sizing");
        let mut pv = PvGenerator::new(inst);
        pv.production(0.0, 60.0);
        pv.production(500.0, 60.0);
        pv.settle_curtailment(0.4);
        let rows = pv.history().rows();
        assert_eq!(rows[0].curtailed_kw, 0.0);
        assert_eq!(rows[1].curtailed_kw, 0.4);
    }
}
