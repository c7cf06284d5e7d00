//! Li-ion pack modelled as series cells with a two-branch RC equivalent circuit.

use serde::{Deserialize, Serialize};

use crate::devices::battery::{SocBand, bms_split};
use crate::devices::types::{
    BatteryEvent, BatteryMode, BatteryRecord, BatteryResponse, BatteryStatus, EnergyStore,
};
use crate::error::ConfigurationError;
use crate::recorder::Recorder;

/// Integration sub-step in seconds.
const SUB_STEP_SECONDS: f64 = 1.0;

/// Electrical parameters of one cell.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CellParams {
    /// Nominal capacity (Ah).
    pub capacity_ah: f64,
    /// Nominal voltage (V).
    pub nominal_v: f64,
    /// Discharge cut-off voltage (V).
    pub discharge_cutoff_v: f64,
    /// Charge cut-off voltage (V).
    pub charge_cutoff_v: f64,
    /// Current limit as a multiple of capacity.
    pub max_c_rate: f64,
    /// Series resistance (ohm).
    pub rs_ohm: f64,
    pub r1_ohm: f64,
    pub c1_farad: f64,
    pub r2_ohm: f64,
    pub c2_farad: f64,
}

impl Default for CellParams {
    fn default() -> Self {
        Self {
            capacity_ah: 2.55,
            nominal_v: 3.7,
            discharge_cutoff_v: 3.0,
            charge_cutoff_v: 4.2,
            max_c_rate: 10.0,
            rs_ohm: 0.078,
            r1_ohm: 0.078,
            c1_farad: 2.0,
            r2_ohm: 0.078,
            c2_farad: 2.0,
        }
    }
}

impl CellParams {
    fn validate(&self) -> Result<(), ConfigurationError> {
        let fields: [(&'static str, f64); 10] = [
            ("cell.capacity_ah", self.capacity_ah),
            ("cell.nominal_v", self.nominal_v),
            ("cell.discharge_cutoff_v", self.discharge_cutoff_v),
            ("cell.charge_cutoff_v", self.charge_cutoff_v),
            ("cell.max_c_rate", self.max_c_rate),
            ("cell.rs_ohm", self.rs_ohm),
            ("cell.r1_ohm", self.r1_ohm),
            ("cell.c1_farad", self.c1_farad),
            ("cell.r2_ohm", self.r2_ohm),
            ("cell.c2_farad", self.c2_farad),
        ];
        for (field, value) in fields {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigurationError::OutOfRange {
                    field,
                    value,
                    constraint: "> 0",
                });
            }
        }
        Ok(())
    }

    /// Charge held by a full cell in ampere-seconds.
    fn full_charge_as(&self) -> f64 {
        self.capacity_ah * 3600.0
    }
}

/// Per-cell internal state observed at the end of each step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CellRecord {
    pub charge_as: f64,
    pub v1: f64,
    pub v2: f64,
    pub v_cell: f64,
}

/// Battery pack integrating an RC equivalent circuit per cell.
///
/// Same external contract as [`SimpleBattery`](super::SimpleBattery): the
/// BMS policy decides the requested split, the circuit then decides how much
/// of it the cells can take before hitting 0 % or 100 %.
#[derive(Debug, Clone)]
pub struct RcBattery {
    pub capacity_kwh: f64,
    pub cell: CellParams,
    /// Cells sharing the pack power.
    cells: f64,
    pub mode: BatteryMode,
    pub band: SocBand,
    charge_as: f64,
    v1: f64,
    v2: f64,
    current_a: f64,
    soc: f64,
    status: BatteryStatus,
    history: Recorder<BatteryRecord>,
    cell_history: Recorder<CellRecord>,
}

impl RcBattery {
    /// Creates a pack of `capacity_kwh` built from `cell`.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] if capacity, SOC or any cell
    /// parameter is out of range.
    pub fn new(
        capacity_kwh: f64,
        initial_soc: f64,
        mode: BatteryMode,
        band: SocBand,
        cell: CellParams,
    ) -> Result<Self, ConfigurationError> {
        if !(capacity_kwh.is_finite() && capacity_kwh > 0.0) {
            return Err(ConfigurationError::OutOfRange {
                field: "capacity_kwh",
                value: capacity_kwh,
                constraint: "> 0",
            });
        }
        if !(0.0..=100.0).contains(&initial_soc) {
            return Err(ConfigurationError::OutOfRange {
                field: "initial_soc",
                value: initial_soc,
                constraint: "in [0, 100]",
            });
        }
        cell.validate()?;

        let cells = capacity_kwh * 1000.0 / (cell.capacity_ah * cell.nominal_v);
        Ok(Self {
            capacity_kwh,
            cell,
            cells,
            mode,
            band,
            charge_as: cell.full_charge_as() * initial_soc / 100.0,
            v1: 0.0,
            v2: 0.0,
            current_a: 0.0,
            soc: initial_soc,
            status: BatteryStatus::from_soc(initial_soc),
            history: Recorder::new(),
            cell_history: Recorder::new(),
        })
    }

    pub fn cell_count(&self) -> f64 {
        self.cells
    }

    pub fn cell_history(&self) -> &Recorder<CellRecord> {
        &self.cell_history
    }

    /// Open-circuit voltage of one cell at the current SOC.
    pub fn open_circuit_v(&self) -> f64 {
        self.cell.charge_cutoff_v - (1.2 - self.soc / 100.0)
    }

    /// Terminal voltage of one cell for the last applied current.
    pub fn terminal_v(&self) -> f64 {
        self.open_circuit_v() - self.v1 - self.v2 - self.current_a * self.cell.rs_ohm
    }

    /// Advances both RC branches by `dt` seconds at constant current.
    fn relax(&mut self, current_a: f64, dt: f64) {
        let c = &self.cell;
        self.v1 = rc_branch(self.v1, current_a, c.r1_ohm, c.c1_farad, dt);
        self.v2 = rc_branch(self.v2, current_a, c.r2_ohm, c.c2_farad, dt);
    }

    /// Integrates the cell at constant current for up to `timestep_seconds`.
    ///
    /// Returns the time actually spent before a SOC bound was reached.
    fn integrate(&mut self, current_a: f64, timestep_seconds: f64) -> f64 {
        let q_max = self.cell.full_charge_as();
        let sub_steps = (timestep_seconds / SUB_STEP_SECONDS).ceil().max(1.0);
        let h = timestep_seconds / sub_steps;
        let mut elapsed = 0.0;

        for _ in 0..(sub_steps as usize) {
            let q_next = self.charge_as - current_a * h;
            if q_next < 0.0 || q_next > q_max {
                let bound = if q_next < 0.0 { 0.0 } else { q_max };
                let t_cross = ((self.charge_as - bound) / current_a).clamp(0.0, h);
                self.relax(current_a, t_cross);
                self.charge_as = bound;
                elapsed += t_cross;
                return elapsed;
            }
            self.relax(current_a, h);
            self.charge_as = q_next;
            elapsed += h;
        }
        elapsed.min(timestep_seconds)
    }

    fn record(&mut self, accepted_kw: f64, rejected_kw: f64, event: BatteryEvent, overload: bool) {
        self.history.record(BatteryRecord {
            accepted_kw,
            rejected_kw,
            soc_percent: self.soc,
            status: self.status,
            event,
            overload,
        });
        self.cell_history.record(CellRecord {
            charge_as: self.charge_as,
            v1: self.v1,
            v2: self.v2,
            v_cell: self.terminal_v(),
        });
    }
}

/// Exact solution of `dv/dt = (i - v/r) / c` over `dt` at constant `i`.
fn rc_branch(v: f64, current_a: f64, r: f64, c: f64, dt: f64) -> f64 {
    let decay = (-dt / (r * c)).exp();
    v * decay + current_a * r * (1.0 - decay)
}

impl EnergyStore for RcBattery {
    fn process(&mut self, power_kw: f64, timestep_seconds: f64) -> BatteryResponse {
        let (p_acc, p_rej) = bms_split(power_kw, self.soc, self.mode, self.band);

        if p_acc == 0.0 {
            self.current_a = 0.0;
            self.relax(0.0, timestep_seconds);
            // A full or empty pack refusing a request keeps its SOC status.
            self.status = if power_kw == 0.0 {
                BatteryStatus::StandBy
            } else {
                BatteryStatus::from_soc(self.soc)
            };
            let event = BatteryEvent::classify(power_kw, 0.0, self.soc);
            self.record(0.0, p_rej, event, false);
            return BatteryResponse {
                accepted_kw: 0.0,
                rejected_kw: p_rej,
            };
        }

        let current_a = p_acc * 1000.0 / self.cells / self.cell.nominal_v;
        if current_a.abs() > self.cell.capacity_ah * self.cell.max_c_rate {
            self.current_a = 0.0;
            self.relax(0.0, timestep_seconds);
            self.status = BatteryStatus::StandBy;
            self.record(0.0, -power_kw, BatteryEvent::Overload, true);
            return BatteryResponse {
                accepted_kw: 0.0,
                rejected_kw: -power_kw,
            };
        }

        let elapsed = self.integrate(current_a, timestep_seconds);
        let frac = (elapsed / timestep_seconds).clamp(0.0, 1.0);
        self.current_a = current_a;
        self.soc = (self.charge_as / self.cell.full_charge_as() * 100.0).clamp(0.0, 100.0);
        self.status = BatteryStatus::from_soc(self.soc);

        let accepted_kw = p_acc * frac;
        let rejected_kw = p_rej - p_acc * (1.0 - frac);
        let event = BatteryEvent::classify(power_kw, accepted_kw, self.soc);
        self.record(accepted_kw, rejected_kw, event, false);

        BatteryResponse {
            accepted_kw,
            rejected_kw,
        }
    }

    fn soc(&self) -> f64 {
        self.soc
    }

    fn status(&self) -> BatteryStatus {
        self.status
    }

    fn mode(&self) -> BatteryMode {
        self.mode
    }

    fn set_mode(&mut self, mode: BatteryMode) {
        self.mode = mode;
    }

    fn capacity_kwh(&self) -> f64 {
        self.capacity_kwh
    }

    fn history(&self) -> &Recorder<BatteryRecord> {
        &self.history
    }

    fn device_type(&self) -> &'static str {
        "RCBattery"
    }
}
