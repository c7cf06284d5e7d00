/// Fixed-interval simulation clock.
pub mod clock;
pub mod engine;
/// Radial LV feeder and its backward/forward sweep solver.
pub mod feeder;
pub mod grid;
pub mod kpi;
pub mod neighborhood;
pub mod power_balance;
pub mod prosumer;
/// Central grid supervisor.
pub mod supervisor;
pub mod types;
