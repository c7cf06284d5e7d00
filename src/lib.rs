//! Low-voltage neighbourhood simulator of PV + battery prosumers under a
//! central grid supervisor.

pub mod cli;
pub mod config;
pub mod devices;
pub mod error;
/// CSV export.
pub mod io;
pub mod profiles;
pub mod recorder;
pub mod runner;
/// Prosumer control, grid model, supervisor and simulation engine.
pub mod sim;
pub mod telemetry;
