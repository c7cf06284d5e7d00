//! Solved network state and the power-flow solver seam.

use std::collections::{BTreeSet, VecDeque};

use serde::Serialize;

use crate::error::SolverError;

/// Active-power demand at a bus (kW, consumption positive).
#[derive(Debug, Clone, PartialEq)]
pub struct BusInjection {
    pub bus: String,
    pub p_kw: f64,
}

/// Solved bus voltage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BusResult {
    pub name: String,
    pub vm_pu: f64,
    /// Bus carries a prosumer connection.
    pub hosts_prosumer: bool,
}

/// Solved line loading.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineResult {
    pub name: String,
    pub from_bus: String,
    pub to_bus: String,
    /// Current as a percentage of the thermal rating.
    pub loading_percent: f64,
}

/// Result tables of one power-flow solve.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GridState {
    pub buses: Vec<BusResult>,
    pub lines: Vec<LineResult>,
    /// Active power drawn from the external grid (kW, import positive).
    pub slack_p_kw: f64,
}

impl GridState {
    pub fn min_vm_pu(&self) -> Option<f64> {
        self.buses.iter().map(|b| b.vm_pu).reduce(f64::min)
    }

    pub fn max_vm_pu(&self) -> Option<f64> {
        self.buses.iter().map(|b| b.vm_pu).reduce(f64::max)
    }

    pub fn max_loading_percent(&self) -> Option<f64> {
        self.lines.iter().map(|l| l.loading_percent).reduce(f64::max)
    }

    /// Names of every bus fed through `bus`, excluding `bus` itself.
    pub fn downstream_of(&self, bus: &str) -> Vec<String> {
        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::from([bus.to_string()]);
        let mut out = Vec::new();
        while let Some(current) = queue.pop_front() {
            for line in self.lines.iter().filter(|l| l.from_bus == current) {
                if line.to_bus != bus && seen.insert(line.to_bus.clone()) {
                    out.push(line.to_bus.clone());
                    queue.push_back(line.to_bus.clone());
                }
            }
        }
        out
    }

    pub fn prosumer_buses(&self) -> impl Iterator<Item = &str> {
        self.buses
            .iter()
            .filter(|b| b.hosts_prosumer)
            .map(|b| b.name.as_str())
    }
}

/// External AC power-flow engine, consumed as a black box.
pub trait PowerFlowSolver {
    /// Solves the network for the given bus demands.
    ///
    /// # Errors
    ///
    /// Returns a [`SolverError`] for unknown buses or a failed solve.
    fn solve(&mut self, injections: &[BusInjection]) -> Result<GridState, SolverError>;
}
