//! Per-timestep energy controller of one household.

use std::fmt;

use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::trace;

use crate::devices::{
    BatteryMode, BatteryStatus, EnergyStore, PowerSource, PvGenerator, PvStrategy, Storage,
};
use crate::error::SimulationInputError;
use crate::recorder::Recorder;

/// Flows smaller than this are treated as zero when classifying.
pub const FLOW_EPSILON_KW: f64 = 1e-9;

/// Log label attached to every prosumer record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FlowEvent {
    SupplyFromGrid,
    BatteryDischargeAndGridSupply,
    DemandSatisfiedByBattery,
    GridFeedIn,
    BatteryChargeAndGridFeedIn,
    SurplusAbsorbedByBattery,
    DemandMatchesPv,
}

impl FlowEvent {
    pub fn label(self) -> &'static str {
        match self {
            Self::SupplyFromGrid => "supply from grid",
            Self::BatteryDischargeAndGridSupply => "battery discharge and supply from grid",
            Self::DemandSatisfiedByBattery => "demand satisfied by battery",
            Self::GridFeedIn => "grid feed-in",
            Self::BatteryChargeAndGridFeedIn => "battery charge and grid feed-in",
            Self::SurplusAbsorbedByBattery => "surplus absorbed by battery",
            Self::DemandMatchesPv => "demand matches pv yield",
        }
    }
}

impl fmt::Display for FlowEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Outcome of [`classify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    /// -1 grid supplies the deficit, 0 no exchange needed, +1 surplus fed in.
    pub grid_status: i8,
    /// -1 discharging, 0 idle, +1 charging.
    pub battery_status: i8,
    pub event: FlowEvent,
}

/// Classifies one step from the household net flow, the flow the battery
/// accepted and what it rejected.
///
/// Pure function: identical inputs always give identical outputs.
pub fn classify(net_flow_kw: f64, battery_flow_kw: f64, rejected_kw: f64) -> Classification {
    let contributed = battery_flow_kw.abs() > FLOW_EPSILON_KW;
    if net_flow_kw > FLOW_EPSILON_KW {
        if rejected_kw < -FLOW_EPSILON_KW {
            Classification {
                grid_status: -1,
                battery_status: if contributed { -1 } else { 0 },
                event: if contributed {
                    FlowEvent::BatteryDischargeAndGridSupply
                } else {
                    FlowEvent::SupplyFromGrid
                },
            }
        } else {
            Classification {
                grid_status: 0,
                battery_status: -1,
                event: FlowEvent::DemandSatisfiedByBattery,
            }
        }
    } else if net_flow_kw < -FLOW_EPSILON_KW {
        if rejected_kw > FLOW_EPSILON_KW {
            Classification {
                grid_status: 1,
                battery_status: if contributed { 1 } else { 0 },
                event: if contributed {
                    FlowEvent::BatteryChargeAndGridFeedIn
                } else {
                    FlowEvent::GridFeedIn
                },
            }
        } else {
            Classification {
                grid_status: 0,
                battery_status: 1,
                event: FlowEvent::SurplusAbsorbedByBattery,
            }
        }
    } else {
        Classification {
            grid_status: 0,
            battery_status: 0,
            event: FlowEvent::DemandMatchesPv,
        }
    }
}

/// One prosumer observation per timestep.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProsumerRecord {
    /// Set by [`Prosumer::run_pflow`]; `None` for bare [`Prosumer::control`] calls.
    pub timestamp: Option<NaiveDateTime>,
    pub load_kw: f64,
    pub pv_kw: f64,
    /// `load - pv`: positive deficit, negative surplus.
    pub net_flow_kw: f64,
    /// Accepted battery flow (positive = discharge).
    pub battery_flow_kw: f64,
    pub battery_soc: f64,
    pub battery_state: BatteryStatus,
    pub battery_status: i8,
    /// Exchange with the grid (positive = feed-in, negative = supply).
    pub grid_flow_kw: f64,
    pub grid_status: i8,
    pub curtailed_kw: f64,
    pub log: FlowEvent,
}

/// A household with PV, a battery and a grid connection.
#[derive(Debug, Clone)]
pub struct Prosumer {
    pub name: String,
    pub pv: PvGenerator,
    pub battery: Storage,
    /// Multiplier applied to the shared load profile.
    pub load_scale: f64,
    history: Recorder<ProsumerRecord>,
}

impl Prosumer {
    pub fn new(name: impl Into<String>, pv: PvGenerator, battery: impl Into<Storage>) -> Self {
        Self {
            name: name.into(),
            pv,
            battery: battery.into(),
            load_scale: 1.0,
            history: Recorder::new(),
        }
    }

    pub fn with_load_scale(mut self, load_scale: f64) -> Self {
        self.load_scale = load_scale;
        self
    }

    pub fn history(&self) -> &Recorder<ProsumerRecord> {
        &self.history
    }

    pub fn battery_mode(&self) -> BatteryMode {
        self.battery.mode()
    }

    pub fn pv_strategy(&self) -> PvStrategy {
        self.pv.strategy()
    }

    pub fn set_battery_mode(&mut self, mode: BatteryMode) {
        self.battery.set_mode(mode);
    }

    pub fn set_pvgen_strategy(&mut self, strategy: PvStrategy) {
        self.pv.set_strategy(strategy);
    }

    /// Runs one timestep without a timestamp label.
    ///
    /// # Errors
    ///
    /// Returns a [`SimulationInputError`] for a non-finite irradiance or
    /// load, or an invalid timestep. Nothing is recorded in that case.
    pub fn control(
        &mut self,
        irradiance_wh_m2: f64,
        load_kw: f64,
        timestep_seconds: f64,
    ) -> Result<ProsumerRecord, SimulationInputError> {
        self.step(irradiance_wh_m2, load_kw, timestep_seconds, None)
    }

    /// Runs one timestep labelled with `timestamp`.
    ///
    /// # Errors
    ///
    /// Same as [`Prosumer::control`].
    pub fn run_pflow(
        &mut self,
        irradiance_wh_m2: f64,
        load_kw: f64,
        timestep_seconds: f64,
        timestamp: NaiveDateTime,
    ) -> Result<ProsumerRecord, SimulationInputError> {
        self.step(irradiance_wh_m2, load_kw, timestep_seconds, Some(timestamp))
    }

    fn step(
        &mut self,
        irradiance_wh_m2: f64,
        load_kw: f64,
        timestep_seconds: f64,
        timestamp: Option<NaiveDateTime>,
    ) -> Result<ProsumerRecord, SimulationInputError> {
        if !irradiance_wh_m2.is_finite() {
            return Err(SimulationInputError::Irradiance(irradiance_wh_m2));
        }
        if !load_kw.is_finite() {
            return Err(SimulationInputError::Load(load_kw));
        }
        if !(timestep_seconds.is_finite() && timestep_seconds > 0.0) {
            return Err(SimulationInputError::Timestep(timestep_seconds));
        }

        let pv_kw = self.pv.production(irradiance_wh_m2, timestep_seconds);
        let net_flow_kw = load_kw - pv_kw;
        let response = self.battery.process(net_flow_kw, timestep_seconds);

        let (grid_flow_kw, curtailed_kw) = match self.pv.strategy() {
            PvStrategy::SelfConsumption => (response.rejected_kw, 0.0),
            PvStrategy::Curtailment if response.rejected_kw >= 0.0 => (0.0, response.rejected_kw),
            PvStrategy::Curtailment => (response.rejected_kw, 0.0),
        };
        self.pv.settle_curtailment(curtailed_kw);

        let c = classify(net_flow_kw, response.accepted_kw, response.rejected_kw);
        let record = ProsumerRecord {
            timestamp,
            load_kw,
            pv_kw,
            net_flow_kw,
            battery_flow_kw: response.accepted_kw,
            battery_soc: self.battery.soc(),
            battery_state: self.battery.status(),
            battery_status: c.battery_status,
            grid_flow_kw,
            grid_status: c.grid_status,
            curtailed_kw,
            log: c.event,
        };
        trace!(
            prosumer = %self.name,
            net_kw = net_flow_kw,
            grid_kw = grid_flow_kw,
            soc = record.battery_soc,
            event = %c.event,
            "control"
        );
        self.history.record(record);
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::{PanelSpec, PvInstallation, PvSizing, SimpleBattery, SocBand};
    use crate::sim::power_balance::residual_kw;
    use approx::assert_abs_diff_eq;

    fn prosumer(soc: f64, strategy: PvStrategy, mode: BatteryMode) -> Prosumer {
        let inst = PvInstallation::new(&PvSizing::capacity(2.1), PanelSpec::default(), 0.0035, strategy)
            .expect("valid pv");
        let battery = SimpleBattery::new(3.5, soc, mode, SocBand::default()).expect("valid battery");
        Prosumer::new("LV1.2", PvGenerator::new(inst), battery)
    }

    #[test]
    fn classification_table() {
        let c = classify(1.0, 0.4, -0.6);
        assert_eq!((c.grid_status, c.battery_status), (-1, -1));
        assert_eq!(c.event.label(), "battery discharge and supply from grid");

        let c = classify(1.0, 0.0, -1.0);
        assert_eq!((c.grid_status, c.battery_status), (-1, 0));
        assert_eq!(c.event.label(), "supply from grid");

        let c = classify(1.0, 1.0, 0.0);
        assert_eq!((c.grid_status, c.battery_status), (0, -1));
        assert_eq!(c.event.label(), "demand satisfied by battery");

        let c = classify(-1.0, -0.75, 0.25);
        assert_eq!((c.grid_status, c.battery_status), (1, 1));
        assert_eq!(c.event.label(), "battery charge and grid feed-in");

        let c = classify(-1.0, 0.0, 1.0);
        assert_eq!((c.grid_status, c.battery_status), (1, 0));
        assert_eq!(c.event.label(), "grid feed-in");

        let c = classify(-1.0, -1.0, 0.0);
        assert_eq!((c.grid_status, c.battery_status), (0, 1));
        assert_eq!(c.event.label(), "surplus absorbed by battery");

        let c = classify(0.0, 0.0, 0.0);
        assert_eq!((c.grid_status, c.battery_status), (0, 0));
        assert_eq!(c.event.label(), "demand matches pv yield");
    }

    #[test]
    fn classification_is_deterministic() {
        let inputs = [(1.0, 0.4, -0.6), (-2.0, -0.5, 1.5), (0.0, 0.0, 0.0), (0.3, 0.3, 0.0)];
        for &(n, b, r) in &inputs {
            assert_eq!(classify(n, b, r), classify(n, b, r));
        }
    }

    #[test]
    fn night_deficit_discharges_battery() {
        let mut p = prosumer(60.0, PvStrategy::SelfConsumption, BatteryMode::SelfConsumption);
        let r = p.control(0.0, 1.0, 900.0).expect("valid input");
        assert_eq!(r.pv_kw, 0.0);
        assert_eq!(r.battery_flow_kw, 1.0);
        assert_eq!(r.grid_flow_kw, 0.0);
        assert_eq!(r.log, FlowEvent::DemandSatisfiedByBattery);
        assert!(r.timestamp.is_none());
    }

    #[test]
    fn full_battery_feeds_surplus_into_grid() {
        let mut p = prosumer(100.0, PvStrategy::SelfConsumption, BatteryMode::SelfConsumption);
        let r = p.control(500.0, 0.5, 60.0).expect("valid input");
        assert!(r.grid_flow_kw > 0.0);
        assert_eq!(r.grid_status, 1);
        assert_eq!(r.curtailed_kw, 0.0);
        assert_eq!(r.log, FlowEvent::GridFeedIn);
    }

    #[test]
    fn curtailment_discards_rejected_surplus() {
        let mut p = prosumer(100.0, PvStrategy::Curtailment, BatteryMode::SelfConsumption);
        let r = p.control(500.0, 0.5, 60.0).expect("valid input");
        assert_eq!(r.grid_flow_kw, 0.0);
        assert!(r.curtailed_kw > 0.0);
        // Classification still follows the battery's rejection.
        assert_eq!(r.grid_status, 1);
        let pv_row = p.pv.history().last().copied();
        assert_eq!(pv_row.map(|row| row.curtailed_kw), Some(r.curtailed_kw));
    }

    #[test]
    fn curtailment_still_draws_deficit_from_grid() {
        let mut p = prosumer(0.0, PvStrategy::Curtailment, BatteryMode::SelfConsumption);
        let r = p.control(0.0, 1.0, 900.0).expect("valid input");
        assert_eq!(r.grid_flow_kw, -1.0);
        assert_eq!(r.curtailed_kw, 0.0);
        assert_eq!(r.log, FlowEvent::SupplyFromGrid);
    }

    #[test]
    fn energy_balance_holds_every_step() {
        let mut p = prosumer(50.0, PvStrategy::SelfConsumption, BatteryMode::BufferGrid);
        let irr = [0.0, 20.0, 80.0, 150.0, 200.0, 200.0, 120.0, 40.0, 0.0, 0.0];
        let load = [0.4, 0.5, 0.6, 0.3, 0.2, 2.5, 1.0, 0.8, 1.5, 2.0];
        for k in 0..40 {
            let r = p.control(irr[k % 10], load[k % 10], 900.0).expect("valid input");
            assert_abs_diff_eq!(residual_kw(&r), 0.0, epsilon = 1e-9);
            assert!((0.0..=100.0).contains(&r.battery_soc));
        }
        p.set_pvgen_strategy(PvStrategy::Curtailment);
        for k in 0..40 {
            let r = p.control(irr[k % 10], load[k % 10], 900.0).expect("valid input");
            assert_abs_diff_eq!(residual_kw(&r), 0.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn nan_input_fails_without_recording() {
        let mut p = prosumer(60.0, PvStrategy::SelfConsumption, BatteryMode::SelfConsumption);
        assert!(matches!(
            p.control(f64::NAN, 1.0, 900.0),
            Err(SimulationInputError::Irradiance(_))
        ));
        assert!(matches!(
            p.control(100.0, f64::INFINITY, 900.0),
            Err(SimulationInputError::Load(_))
        ));
        assert!(matches!(
            p.control(100.0, 1.0, 0.0),
            Err(SimulationInputError::Timestep(_))
        ));
        assert!(p.history().is_empty());
        assert!(p.pv.history().is_empty());
        assert!(p.battery.history().is_empty());
    }

    #[test]
    fn run_pflow_records_timestamp() {
        let mut p = prosumer(60.0, PvStrategy::SelfConsumption, BatteryMode::SelfConsumption);
        let ts = NaiveDateTime::parse_from_str("2021-06-01 12:00:00", "%Y-%m-%d %H:%M:%S")
            .expect("valid timestamp");
        let r = p.run_pflow(100.0, 0.5, 900.0, ts).expect("valid input");
        assert_eq!(r.timestamp, Some(ts));
    }

    #[test]
    fn recorders_stay_aligned() {
        let mut p = prosumer(60.0, PvStrategy::SelfConsumption, BatteryMode::SelfConsumption);
        for k in 0..37 {
            p.control((k % 7) as f64 * 30.0, 0.6, 900.0).expect("valid input");
        }
        assert_eq!(p.history().len(), 37);
        assert_eq!(p.pv.history().len(), 37);
        assert_eq!(p.battery.history().len(), 37);
    }

    #[test]
    fn mode_setters_reach_sub_objects() {
        let mut p = prosumer(60.0, PvStrategy::SelfConsumption, BatteryMode::SelfConsumption);
        p.set_battery_mode(BatteryMode::BufferGrid);
        p.set_pvgen_strategy(PvStrategy::Curtailment);
        assert_eq!(p.battery.mode(), BatteryMode::BufferGrid);
        assert_eq!(p.pv.installation.strategy, PvStrategy::Curtailment);
    }
}
