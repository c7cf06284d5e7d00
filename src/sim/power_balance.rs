//! Per-record energy balance check.

use crate::sim::prosumer::ProsumerRecord;

/// Computes the energy-balance residual of one prosumer record.
///
/// With battery flow positive on discharge and grid flow positive on
/// feed-in, a consistent record satisfies
/// `load - pv - battery + grid + curtailed == 0`.
///
/// # Returns
///
/// The residual in kW; zero up to floating-point error.
pub fn residual_kw(record: &ProsumerRecord) -> f64 {
    balance_kw(
        record.load_kw,
        record.pv_kw,
        record.battery_flow_kw,
        record.grid_flow_kw,
        record.curtailed_kw,
    )
}

/// Signed sum of the five flows of a household.
pub fn balance_kw(
    load_kw: f64,
    pv_kw: f64,
    battery_kw: f64,
    grid_kw: f64,
    curtailed_kw: f64,
) -> f64 {
    load_kw - pv_kw - battery_kw + grid_kw + curtailed_kw
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deficit_covered_by_grid() {
        // 2 kW load, 0.5 kW pv, battery gives 1 kW, grid supplies 0.5 kW
        assert_eq!(balance_kw(2.0, 0.5, 1.0, -0.5, 0.0), 0.0);
    }

    #[test]
    fn surplus_split_between_battery_and_grid() {
        // 3 kW pv, 1 kW load, battery charges 1.5 kW, 0.5 kW fed in
        assert_eq!(balance_kw(1.0, 3.0, -1.5, 0.5, 0.0), 0.0);
    }

    #[test]
    fn curtailed_surplus_closes_the_balance() {
        assert_eq!(balance_kw(1.0, 3.0, -1.5, 0.0, 0.5), 0.0);
    }

    #[test]
    fn inconsistent_flows_leave_a_residual() {
        assert_eq!(balance_kw(1.0, 0.0, 0.0, 0.0, 0.0), 1.0);
    }
}
