//! Radial low-voltage feeder solved by backward/forward sweep.

use std::collections::HashMap;

use num_complex::Complex64;
use serde::Deserialize;
use tracing::trace;

use crate::error::SolverError;
use crate::sim::grid::{BusInjection, BusResult, GridState, LineResult, PowerFlowSolver};

/// Three-phase power base (MVA).
const S_BASE_MVA: f64 = 1.0;

/// A network node. The first bus of a feeder is the slack bus.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BusSpec {
    pub name: String,
    #[serde(default = "default_hosts_prosumer")]
    pub hosts_prosumer: bool,
}

fn default_hosts_prosumer() -> bool {
    true
}

/// A cable section oriented away from the slack bus.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LineSpec {
    pub name: String,
    pub from_bus: String,
    pub to_bus: String,
    pub length_km: f64,
    pub r_ohm_per_km: f64,
    pub x_ohm_per_km: f64,
    /// Thermal current rating (kA).
    pub max_i_ka: f64,
}

/// Solver settings shared by every solve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SweepSettings {
    pub slack_vm_pu: f64,
    pub nominal_kv: f64,
    pub tolerance_pu: f64,
    pub max_iterations: usize,
}

impl Default for SweepSettings {
    fn default() -> Self {
        Self {
            slack_vm_pu: 1.0,
            nominal_kv: 0.4,
            tolerance_pu: 1e-8,
            max_iterations: 50,
        }
    }
}

fn bus(name: &str, hosts_prosumer: bool) -> BusSpec {
    BusSpec {
        name: name.to_string(),
        hosts_prosumer,
    }
}

fn nayy_4x120(name: &str, from: &str, to: &str, length_km: f64) -> LineSpec {
    LineSpec {
        name: name.to_string(),
        from_bus: from.to_string(),
        to_bus: to.to_string(),
        length_km,
        r_ohm_per_km: 0.225,
        x_ohm_per_km: 0.08,
        max_i_ka: 0.242,
    }
}

fn overhead_15_al1(name: &str, from: &str, to: &str, length_km: f64) -> LineSpec {
    LineSpec {
        name: name.to_string(),
        from_bus: from.to_string(),
        to_bus: to.to_string(),
        length_km,
        r_ohm_per_km: 1.8769,
        x_ohm_per_km: 0.35,
        max_i_ka: 0.105,
    }
}

/// Reference LV network: a secondary substation bus `LV0` feeding two
/// branches, the second one ending in thin overhead sections.
pub fn default_topology() -> (Vec<BusSpec>, Vec<LineSpec>) {
    let buses = vec![
        bus("LV0", false),
        bus("LV1.1", true),
        bus("LV1.2", true),
        bus("LV1.3", true),
        bus("LV1.4", true),
        bus("LV1.5", true),
        bus("LV2.1", true),
        bus("LV2.2", true),
        bus("LV2.3", true),
        bus("LV2.4", true),
        bus("LV2.2.1", true),
        bus("LV2.2.2", true),
    ];
    let lines = vec![
        nayy_4x120("line1.1", "LV0", "LV1.1", 0.08),
        nayy_4x120("line1.2", "LV1.1", "LV1.2", 0.08),
        nayy_4x120("line1.3", "LV1.2", "LV1.3", 0.08),
        nayy_4x120("line1.4", "LV1.3", "LV1.4", 0.08),
        nayy_4x120("line1.5", "LV1.4", "LV1.5", 0.08),
        nayy_4x120("line2.1", "LV0", "LV2.1", 0.12),
        nayy_4x120("line2.2", "LV2.1", "LV2.2", 0.12),
        overhead_15_al1("line2.3", "LV2.2", "LV2.3", 0.12),
        overhead_15_al1("line2.4", "LV2.3", "LV2.4", 0.12),
        overhead_15_al1("line2.2.1", "LV2.2", "LV2.2.1", 0.12),
        overhead_15_al1("line2.2.2", "LV2.2.1", "LV2.2.2", 0.12),
    ];
    (buses, lines)
}

/// Radial feeder with a fixed topology.
///
/// Loads are constant-power at unity power factor. Voltages are solved in
/// per-unit on a 1 MVA base with the first bus held at the slack voltage.
#[derive(Debug, Clone)]
pub struct RadialFeeder {
    name: String,
    buses: Vec<BusSpec>,
    lines: Vec<LineSpec>,
    settings: SweepSettings,
    index: HashMap<String, usize>,
    /// Line feeding each bus; `None` for the slack bus.
    parent_line: Vec<Option<usize>>,
    /// Buses in breadth-first order from the slack bus.
    order: Vec<usize>,
    z_pu: Vec<Complex64>,
    line_from: Vec<usize>,
}

impl RadialFeeder {
    /// Builds a feeder and checks that the lines form a tree rooted at the
    /// first bus.
    ///
    /// # Errors
    ///
    /// Returns [`SolverError::Topology`] for duplicate or unknown buses,
    /// non-positive line parameters, loops or disconnected buses.
    pub fn new(
        name: impl Into<String>,
        buses: Vec<BusSpec>,
        lines: Vec<LineSpec>,
        settings: SweepSettings,
    ) -> Result<Self, SolverError> {
        if buses.is_empty() {
            return Err(SolverError::Topology("feeder has no buses".into()));
        }
        if !(settings.nominal_kv > 0.0 && settings.slack_vm_pu > 0.0) {
            return Err(SolverError::Topology(
                "nominal voltage and slack voltage must be positive".into(),
            ));
        }

        let mut index = HashMap::with_capacity(buses.len());
        for (i, b) in buses.iter().enumerate() {
            if index.insert(b.name.clone(), i).is_some() {
                return Err(SolverError::Topology(format!("duplicate bus \"{}\"", b.name)));
            }
        }

        let z_base = settings.nominal_kv * settings.nominal_kv / S_BASE_MVA;
        let mut parent_line = vec![None; buses.len()];
        let mut children: Vec<Vec<usize>> = vec![Vec::new(); buses.len()];
        let mut z_pu = Vec::with_capacity(lines.len());
        let mut line_from = Vec::with_capacity(lines.len());

        for (l, line) in lines.iter().enumerate() {
            let lookup = |name: &str| {
                index.get(name).copied().ok_or_else(|| {
                    SolverError::Topology(format!(
                        "line \"{}\" references unknown bus \"{name}\"",
                        line.name
                    ))
                })
            };
            let from = lookup(&line.from_bus)?;
            let to = lookup(&line.to_bus)?;
            if !(line.length_km > 0.0 && line.r_ohm_per_km >= 0.0 && line.max_i_ka > 0.0) {
                return Err(SolverError::Topology(format!(
                    "line \"{}\" needs positive length and rating",
                    line.name
                )));
            }
            if to == 0 || parent_line[to].replace(l).is_some() {
                return Err(SolverError::Topology(format!(
                    "bus \"{}\" is fed by more than one line",
                    line.to_bus
                )));
            }
            children[from].push(to);
            z_pu.push(
                Complex64::new(line.r_ohm_per_km, line.x_ohm_per_km) * line.length_km / z_base,
            );
            line_from.push(from);
        }

        let mut order = Vec::with_capacity(buses.len());
        order.push(0);
        let mut head = 0;
        while head < order.len() {
            let b = order[head];
            head += 1;
            order.extend(children[b].iter().copied());
        }
        if order.len() != buses.len() {
            return Err(SolverError::Topology(
                "every bus must be reachable from the slack bus exactly once".into(),
            ));
        }

        Ok(Self {
            name: name.into(),
            buses,
            lines,
            settings,
            index,
            parent_line,
            order,
            z_pu,
            line_from,
        })
    }

    /// The reference LV network with default solver settings.
    pub fn lv_default() -> Result<Self, SolverError> {
        let (buses, lines) = default_topology();
        Self::new("LV", buses, lines, SweepSettings::default())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn buses(&self) -> &[BusSpec] {
        &self.buses
    }

    pub fn lines(&self) -> &[LineSpec] {
        &self.lines
    }

    /// Names of buses that carry a prosumer.
    pub fn prosumer_buses(&self) -> Vec<String> {
        self.buses
            .iter()
            .filter(|b| b.hosts_prosumer)
            .map(|b| b.name.clone())
            .collect()
    }

    fn base_current_ka(&self) -> f64 {
        S_BASE_MVA / (3f64.sqrt() * self.settings.nominal_kv)
    }
}

impl PowerFlowSolver for RadialFeeder {
    fn solve(&mut self, injections: &[BusInjection]) -> Result<GridState, SolverError> {
        let n = self.buses.len();
        let mut s_pu = vec![Complex64::new(0.0, 0.0); n];
        for inj in injections {
            let b = self
                .index
                .get(&inj.bus)
                .copied()
                .ok_or_else(|| SolverError::UnknownBus(inj.bus.clone()))?;
            s_pu[b] += Complex64::new(inj.p_kw / 1000.0 / S_BASE_MVA, 0.0);
        }

        let slack = Complex64::new(self.settings.slack_vm_pu, 0.0);
        let mut v = vec![slack; n];
        let mut i_line = vec![Complex64::new(0.0, 0.0); self.lines.len()];
        let mut i_total = Complex64::new(0.0, 0.0);
        let mut mismatch = f64::INFINITY;

        for iteration in 1..=self.settings.max_iterations {
            // Backward sweep: accumulate branch currents towards the slack bus.
            let mut i_branch: Vec<Complex64> = (0..n).map(|b| (s_pu[b] / v[b]).conj()).collect();
            for &b in self.order.iter().rev() {
                if let Some(l) = self.parent_line[b] {
                    i_line[l] = i_branch[b];
                    let from = self.line_from[l];
                    let carried = i_branch[b];
                    i_branch[from] += carried;
                }
            }
            i_total = i_branch[0];

            // Forward sweep: voltage drops away from the slack bus.
            let mut v_next = v.clone();
            for &b in self.order.iter().skip(1) {
                if let Some(l) = self.parent_line[b] {
                    v_next[b] = v_next[self.line_from[l]] - self.z_pu[l] * i_line[l];
                }
            }

            mismatch = v
                .iter()
                .zip(&v_next)
                .map(|(a, b)| (a - b).norm())
                .fold(0.0, f64::max);
            v = v_next;
            trace!(feeder = %self.name, iteration, mismatch, "sweep");

            if mismatch < self.settings.tolerance_pu {
                let i_base = self.base_current_ka();
                let buses = self
                    .buses
                    .iter()
                    .zip(&v)
                    .map(|(spec, vb)| BusResult {
                        name: spec.name.clone(),
                        vm_pu: vb.norm(),
                        hosts_prosumer: spec.hosts_prosumer,
                    })
                    .collect();
                let lines = self
                    .lines
                    .iter()
                    .zip(&i_line)
                    .map(|(spec, il)| LineResult {
                        name: spec.name.clone(),
                        from_bus: spec.from_bus.clone(),
                        to_bus: spec.to_bus.clone(),
                        loading_percent: il.norm() * i_base / spec.max_i_ka * 100.0,
                    })
                    .collect();
                let slack_p_kw = (v[0] * i_total.conj()).re * S_BASE_MVA * 1000.0;
                return Ok(GridState {
                    buses,
                    lines,
                    slack_p_kw,
                });
            }
        }

        Err(SolverError::NotConverged {
            iterations: self.settings.max_iterations,
            mismatch_pu: mismatch,
        })
    }
}
