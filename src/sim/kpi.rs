//! Post-hoc KPI computation from step summaries.

use std::fmt;

use serde::Serialize;

use super::types::StepSummary;

/// Aggregate key performance indicators of a complete simulation run.
///
/// Computed post-hoc from `Vec<StepSummary>` so reported metrics always
/// agree with the step data.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KpiReport {
    pub steps: usize,
    /// Household demand (kWh).
    pub load_kwh: f64,
    /// PV energy after curtailment is subtracted (kWh).
    pub pv_kwh: f64,
    /// Energy drawn from the grid by households (kWh).
    pub import_kwh: f64,
    /// Energy fed into the grid by households (kWh).
    pub export_kwh: f64,
    pub curtailed_kwh: f64,
    /// Sum of |battery power| * dt (kWh).
    pub battery_throughput_kwh: f64,
    /// Share of demand not covered by grid imports (%).
    pub self_sufficiency_pct: f64,
    pub overvoltage_steps: usize,
    pub undervoltage_steps: usize,
    pub thermal_overload_steps: usize,
    pub min_vm_pu: f64,
    pub max_vm_pu: f64,
    pub peak_loading_percent: f64,
    /// Peak power drawn from the external grid (kW).
    pub peak_slack_kw: f64,
    /// Total prosumer mode switches issued by the supervisor.
    pub mode_switches: usize,
}

impl KpiReport {
    /// Computes all KPIs from the complete step summary vector.
    ///
    /// # Arguments
    ///
    /// * `summaries` - Step summaries of the run
    /// * `dt_hours` - Timestep duration in hours
    pub fn from_summaries(summaries: &[StepSummary], dt_hours: f64) -> Self {
        let mut load = 0.0;
        let mut pv = 0.0;
        let mut import = 0.0;
        let mut export = 0.0;
        let mut curtailed = 0.0;
        let mut throughput = 0.0;
        let mut ov = 0;
        let mut uv = 0;
        let mut th = 0;
        let mut min_vm = f64::INFINITY;
        let mut max_vm = f64::NEG_INFINITY;
        let mut peak_loading = 0.0_f64;
        let mut peak_slack = 0.0_f64;
        let mut switches = 0;

        for s in summaries {
            load += s.load_kw * dt_hours;
            pv += (s.pv_kw - s.curtailed_kw) * dt_hours;
            import += s.import_kw * dt_hours;
            export += s.export_kw * dt_hours;
            curtailed += s.curtailed_kw * dt_hours;
            throughput += s.battery_kw.abs() * dt_hours;

            ov += usize::from(s.flags.overvoltage);
            uv += usize::from(s.flags.undervoltage);
            th += usize::from(s.flags.thermal_overload);

            min_vm = min_vm.min(s.min_vm_pu);
            max_vm = max_vm.max(s.max_vm_pu);
            peak_loading = peak_loading.max(s.max_loading_percent);
            peak_slack = peak_slack.max(s.slack_p_kw);
            switches += s.switched;
        }

        let self_sufficiency_pct = if load > 0.0 {
            (100.0 * (load - import) / load).clamp(0.0, 100.0)
        } else {
            0.0
        };

        Self {
            steps: summaries.len(),
            load_kwh: load,
            pv_kwh: pv,
            import_kwh: import,
            export_kwh: export,
            curtailed_kwh: curtailed,
            battery_throughput_kwh: throughput,
            self_sufficiency_pct,
            overvoltage_steps: ov,
            undervoltage_steps: uv,
            thermal_overload_steps: th,
            min_vm_pu: if min_vm.is_finite() { min_vm } else { 0.0 },
            max_vm_pu: if max_vm.is_finite() { max_vm } else { 0.0 },
            peak_loading_percent: peak_loading,
            peak_slack_kw: peak_slack,
            mode_switches: switches,
        }
    }
}

impl fmt::Display for KpiReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- KPI Report ---")?;
        writeln!(f, "Steps:                 {}", self.steps)?;
        writeln!(f, "Load energy:           {:.3} kWh", self.load_kwh)?;
        writeln!(f, "PV energy:             {:.3} kWh", self.pv_kwh)?;
        writeln!(f, "Grid import:           {:.3} kWh", self.import_kwh)?;
        writeln!(f, "Grid export:           {:.3} kWh", self.export_kwh)?;
        writeln!(f, "Curtailed:             {:.3} kWh", self.curtailed_kwh)?;
        writeln!(f, "Battery throughput:    {:.3} kWh", self.battery_throughput_kwh)?;
        writeln!(f, "Self-sufficiency:      {:.1}%", self.self_sufficiency_pct)?;
        writeln!(
            f,
            "Risk steps:            ov={} uv={} th={}",
            self.overvoltage_steps, self.undervoltage_steps, self.thermal_overload_steps
        )?;
        writeln!(
            f,
            "Voltage range:         [{:.4}, {:.4}] pu",
            self.min_vm_pu, self.max_vm_pu
        )?;
        writeln!(f, "Peak line loading:     {:.1}%", self.peak_loading_percent)?;
        writeln!(f, "Peak slack power:      {:.2} kW", self.peak_slack_kw)?;
        write!(f, "Mode switches:         {}", self.mode_switches)
    }
}
