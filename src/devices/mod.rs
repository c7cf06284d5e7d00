//! Prosumer devices: PV generation and battery storage.

/// Linear energy-bucket battery.
pub mod battery;
/// RC equivalent-circuit battery.
pub mod battery_rc;
/// PV installation sizing and production.
pub mod pv;
pub mod types;

pub use battery::{SimpleBattery, SocBand};
pub use battery_rc::{CellParams, CellRecord, RcBattery};
pub use pv::{PanelSpec, PvGenerator, PvInstallation, PvRecord, PvSizing};
pub use types::{
    BatteryEvent, BatteryMode, BatteryRecord, BatteryResponse, BatteryStatus, EnergyStore,
    PowerSource, PvStrategy,
};

use crate::recorder::Recorder;

/// Battery variant selected per prosumer.
#[derive(Debug, Clone)]
pub enum Storage {
    Simple(SimpleBattery),
    Rc(RcBattery),
}

impl From<SimpleBattery> for Storage {
    fn from(b: SimpleBattery) -> Self {
        Self::Simple(b)
    }
}

impl From<RcBattery> for Storage {
    fn from(b: RcBattery) -> Self {
        Self::Rc(b)
    }
}

impl Storage {
    fn inner(&self) -> &dyn EnergyStore {
        match self {
            Self::Simple(b) => b,
            Self::Rc(b) => b,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn EnergyStore {
        match self {
            Self::Simple(b) => b,
            Self::Rc(b) => b,
        }
    }
}

impl EnergyStore for Storage {
    fn process(&mut self, power_kw: f64, timestep_seconds: f64) -> BatteryResponse {
        self.inner_mut().process(power_kw, timestep_seconds)
    }

    fn soc(&self) -> f64 {
        self.inner().soc()
    }

    fn status(&self) -> BatteryStatus {
        self.inner().status()
    }

    fn mode(&self) -> BatteryMode {
        self.inner().mode()
    }

    fn set_mode(&mut self, mode: BatteryMode) {
        self.inner_mut().set_mode(mode);
    }

    fn capacity_kwh(&self) -> f64 {
        self.inner().capacity_kwh()
    }

    fn history(&self) -> &Recorder<BatteryRecord> {
        self.inner().history()
    }

    fn device_type(&self) -> &'static str {
        self.inner().device_type()
    }
}
