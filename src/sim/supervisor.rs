//! Central grid supervisor: inspects the solved network and reassigns
//! prosumer operating modes for the next timestep.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::devices::{BatteryMode, PvStrategy};
use crate::sim::grid::GridState;
use crate::sim::neighborhood::Neighborhood;

/// Risk thresholds and switching options.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SupervisorLimits {
    /// A bus at or above this voltage is over-voltage (pu).
    pub overvoltage_pu: f64,
    /// A bus at or below this voltage is under-voltage (pu).
    pub undervoltage_pu: f64,
    /// A line at or above this loading is overloaded (%).
    pub thermal_loading_percent: f64,
    /// Also switch every bus fed through an overloaded line.
    pub include_downstream: bool,
    /// Evaluate risks but never switch a prosumer.
    pub bypass: bool,
}

impl Default for SupervisorLimits {
    fn default() -> Self {
        Self {
            overvoltage_pu: 1.03,
            undervoltage_pu: 0.97,
            thermal_loading_percent: 80.0,
            include_downstream: false,
            bypass: false,
        }
    }
}

/// Risk predicates of the latest solved state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RiskFlags {
    pub overvoltage: bool,
    pub undervoltage: bool,
    pub thermal_overload: bool,
    /// Placeholder: never raised.
    pub slack_power: bool,
}

impl RiskFlags {
    pub fn any(&self) -> bool {
        self.overvoltage || self.undervoltage || self.thermal_overload || self.slack_power
    }
}

impl fmt::Display for RiskFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ov={} uv={} th={}",
            u8::from(self.overvoltage),
            u8::from(self.undervoltage),
            u8::from(self.thermal_overload)
        )
    }
}

/// Bucket a prosumer is placed in by [`GridSupervisor::risk_identifier`].
///
/// Buckets are applied in declaration order, so a bus named by two
/// buckets ends up with the policy of the later one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskKind {
    Overvoltage,
    Undervoltage,
    ThermalOverload,
    ToDefault,
}

impl RiskKind {
    /// Battery mode and PV strategy imposed on prosumers in this bucket.
    pub fn policy(self) -> (BatteryMode, PvStrategy) {
        match self {
            Self::Overvoltage => (BatteryMode::SelfConsumption, PvStrategy::Curtailment),
            Self::Undervoltage => (BatteryMode::BufferGrid, PvStrategy::SelfConsumption),
            Self::ThermalOverload => (BatteryMode::SelfConsumption, PvStrategy::Curtailment),
            Self::ToDefault => (BatteryMode::SelfConsumption, PvStrategy::SelfConsumption),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Overvoltage => "overvoltage",
            Self::Undervoltage => "undervoltage",
            Self::ThermalOverload => "thermal_overload",
            Self::ToDefault => "to_default",
        }
    }
}

impl fmt::Display for RiskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Prosumer buses grouped by the risk that names them.
pub type RiskBuckets = BTreeMap<RiskKind, Vec<String>>;

/// Outcome of one [`GridSupervisor::control_prosumers`] call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SupervisorReport {
    pub flags: RiskFlags,
    pub buckets: RiskBuckets,
    /// Prosumers whose mode or strategy actually changed.
    pub switched: usize,
}

/// Memoryless feedback controller over the latest solved grid state.
#[derive(Debug, Clone, Default)]
pub struct GridSupervisor {
    pub limits: SupervisorLimits,
    last_flags: RiskFlags,
}

impl GridSupervisor {
    pub fn new(limits: SupervisorLimits) -> Self {
        Self {
            limits,
            last_flags: RiskFlags::default(),
        }
    }

    /// Flags from the most recent [`GridSupervisor::check_net`].
    pub fn last_flags(&self) -> RiskFlags {
        self.last_flags
    }

    /// Evaluates the risk predicates against a solved state.
    pub fn check_net(&mut self, state: &GridState) -> RiskFlags {
        let flags = RiskFlags {
            overvoltage: state
                .buses
                .iter()
                .any(|b| b.vm_pu >= self.limits.overvoltage_pu),
            undervoltage: state
                .buses
                .iter()
                .any(|b| b.vm_pu <= self.limits.undervoltage_pu),
            thermal_overload: state
                .lines
                .iter()
                .any(|l| l.loading_percent >= self.limits.thermal_loading_percent),
            slack_power: false,
        };
        self.last_flags = flags;
        flags
    }

    /// Maps every active risk to the buses that triggered it.
    ///
    /// Thermal overloads name the receiving bus of each overloaded line,
    /// plus everything downstream of it when configured. Prosumer buses
    /// not named by any risk go to [`RiskKind::ToDefault`].
    pub fn risk_identifier(&self, state: &GridState, flags: &RiskFlags) -> RiskBuckets {
        let mut buckets = RiskBuckets::new();

        if flags.overvoltage {
            let buses = state
                .buses
                .iter()
                .filter(|b| b.vm_pu >= self.limits.overvoltage_pu)
                .map(|b| b.name.clone())
                .collect();
            buckets.insert(RiskKind::Overvoltage, buses);
        }
        if flags.undervoltage {
            let buses = state
                .buses
                .iter()
                .filter(|b| b.vm_pu <= self.limits.undervoltage_pu)
                .map(|b| b.name.clone())
                .collect();
            buckets.insert(RiskKind::Undervoltage, buses);
        }
        if flags.thermal_overload {
            let mut buses: Vec<String> = Vec::new();
            let mut seen = BTreeSet::new();
            let overloaded = state
                .lines
                .iter()
                .filter(|l| l.loading_percent >= self.limits.thermal_loading_percent);
            for line in overloaded {
                let mut hit = vec![line.to_bus.clone()];
                if self.limits.include_downstream {
                    hit.extend(state.downstream_of(&line.to_bus));
                }
                for bus in hit {
                    if seen.insert(bus.clone()) {
                        buses.push(bus);
                    }
                }
            }
            buckets.insert(RiskKind::ThermalOverload, buses);
        }

        if !flags.slack_power {
            let named: BTreeSet<&str> = buckets.values().flatten().map(String::as_str).collect();
            let rest: Vec<String> = state
                .prosumer_buses()
                .filter(|b| !named.contains(b))
                .map(str::to_string)
                .collect();
            buckets.insert(RiskKind::ToDefault, rest);
        }
        buckets
    }

    /// Applies the policy of `kind` to the named prosumers.
    ///
    /// Names without a prosumer (the slack bus, for instance) are skipped.
    ///
    /// # Returns
    ///
    /// The number of prosumers whose mode or strategy changed.
    pub fn switch_behavior(
        &self,
        kind: RiskKind,
        neighborhood: &mut Neighborhood,
        prosumer_ids: &[String],
    ) -> usize {
        let (mode, strategy) = kind.policy();
        let mut switched = 0;
        for id in prosumer_ids {
            let Some(prosumer) = neighborhood.get_mut(id) else {
                continue;
            };
            if prosumer.battery_mode() == mode && prosumer.pv_strategy() == strategy {
                continue;
            }
            info!(
                prosumer = %id,
                risk = %kind,
                battery_mode = %mode,
                pv_strategy = %strategy,
                "switching prosumer behavior"
            );
            prosumer.set_battery_mode(mode);
            prosumer.set_pvgen_strategy(strategy);
            switched += 1;
        }
        switched
    }

    /// Single entry point: check, identify, then switch every bucket.
    pub fn control_prosumers(
        &mut self,
        state: &GridState,
        neighborhood: &mut Neighborhood,
    ) -> SupervisorReport {
        let flags = self.check_net(state);
        let buckets = self.risk_identifier(state, &flags);
        let mut switched = 0;
        if !self.limits.bypass {
            for (kind, ids) in &buckets {
                switched += self.switch_behavior(*kind, neighborhood, ids);
            }
        }
        SupervisorReport {
            flags,
            buckets,
            switched,
        }
    }
}
