use serde::Deserialize;

use crate::devices::types::{
    BatteryEvent, BatteryMode, BatteryRecord, BatteryResponse, BatteryStatus, EnergyStore,
};
use crate::error::ConfigurationError;
use crate::recorder::Recorder;

/// SOC band used by [`BatteryMode::BufferGrid`], in percent.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(try_from = "(f64, f64)")]
pub struct SocBand {
    low: f64,
    high: f64,
}

impl SocBand {
    /// Creates a band, requiring `0 < low < high < 100`.
    ///
    /// Both bounds are divisors in the tapering policy, so a zero or full
    /// bound is rejected here rather than at the first step.
    pub fn new(low: f64, high: f64) -> Result<Self, ConfigurationError> {
        if low.is_finite() && high.is_finite() && 0.0 < low && low < high && high < 100.0 {
            Ok(Self { low, high })
        } else {
            Err(ConfigurationError::InvalidSocBand { low, high })
        }
    }

    pub fn low(&self) -> f64 {
        self.low
    }

    pub fn high(&self) -> f64 {
        self.high
    }
}

impl Default for SocBand {
    fn default() -> Self {
        Self {
            low: 20.0,
            high: 80.0,
        }
    }
}

impl TryFrom<(f64, f64)> for SocBand {
    type Error = ConfigurationError;

    fn try_from((low, high): (f64, f64)) -> Result<Self, Self::Error> {
        Self::new(low, high)
    }
}

/// BMS policy: splits a request into `(accepted, rejected)` before any
/// capacity clamp.
///
/// Rejected power is sign-flipped relative to the request so that
/// `accepted - rejected == requested`.
pub(crate) fn bms_split(
    requested_kw: f64,
    soc_percent: f64,
    mode: BatteryMode,
    band: SocBand,
) -> (f64, f64) {
    let status = BatteryStatus::from_soc(soc_percent);
    if requested_kw < 0.0 {
        if status == BatteryStatus::FullyCharged {
            return (0.0, -requested_kw);
        }
        if mode == BatteryMode::BufferGrid && soc_percent >= band.high {
            let frac = (100.0 - soc_percent) / (100.0 - band.high);
            return (requested_kw * frac, -requested_kw * (1.0 - frac));
        }
        (requested_kw, 0.0)
    } else if requested_kw > 0.0 {
        if status == BatteryStatus::Depleted {
            return (0.0, -requested_kw);
        }
        if mode == BatteryMode::BufferGrid && soc_percent <= band.low {
            let frac = soc_percent / band.low;
            return (requested_kw * frac, -requested_kw * (1.0 - frac));
        }
        (requested_kw, 0.0)
    } else {
        (0.0, 0.0)
    }
}

/// Linear energy-bucket battery.
///
/// # Power Flow Convention
/// - Positive power: Discharging (relieves household load)
/// - Negative power: Charging (absorbs PV surplus)
#[derive(Debug, Clone)]
pub struct SimpleBattery {
    /// Battery capacity in kilowatt-hours.
    pub capacity_kwh: f64,

    /// State of charge in percent.
    soc: f64,

    pub mode: BatteryMode,

    pub band: SocBand,

    status: BatteryStatus,

    history: Recorder<BatteryRecord>,
}

impl SimpleBattery {
    /// Creates a new battery.
    ///
    /// # Arguments
    ///
    /// * `capacity_kwh` - Usable capacity in kWh (must be > 0)
    /// * `initial_soc` - Initial state of charge in percent (0 to 100)
    /// * `mode` - Initial operating mode
    /// * `band` - SOC band applied in buffer-grid mode
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] if capacity or SOC is out of range.
    pub fn new(
        capacity_kwh: f64,
        initial_soc: f64,
        mode: BatteryMode,
        band: SocBand,
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

        Ok(Self {
            capacity_kwh,
            soc: initial_soc,
            mode,
            band,
            status: BatteryStatus::from_soc(initial_soc),
            history: Recorder::new(),
        })
    }

    /// Stored energy in kWh.
    pub fn energy_kwh(&self) -> f64 {
        self.capacity_kwh * self.soc / 100.0
    }
}

impl EnergyStore for SimpleBattery {
    fn process(&mut self, power_kw: f64, timestep_seconds: f64) -> BatteryResponse {
        let h = timestep_seconds / 3600.0;
        let c = self.capacity_kwh;
        let stored = self.energy_kwh();

        let (mut accepted, mut rejected) = bms_split(power_kw, self.soc, self.mode, self.band);
        let q = stored - accepted * h;

        if accepted > 0.0 && q < 0.0 {
            // Discharge clipped at empty; the remainder is a shortfall.
            accepted = stored / h;
            rejected += q / h;
            self.soc = 0.0;
        } else if accepted < 0.0 && q > c {
            // Charge clipped at full; the excess goes back out.
            accepted = -(c - stored) / h;
            rejected += (q - c) / h;
            self.soc = 100.0;
        } else {
            self.soc = (q / c * 100.0).clamp(0.0, 100.0);
        }

        self.status = BatteryStatus::from_soc(self.soc);
        self.history.record(BatteryRecord {
            accepted_kw: accepted,
            rejected_kw: rejected,
            soc_percent: self.soc,
            status: self.status,
            event: BatteryEvent::classify(power_kw, accepted, self.soc),
            overload: false,
        });

        BatteryResponse {
            accepted_kw: accepted,
            rejected_kw: rejected,
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
        "Battery"
    }
}
