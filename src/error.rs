//! Error taxonomy shared by the library and the binary.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Invalid or mutually inconsistent sizing or scenario parameters.
///
/// Raised eagerly at construction time; a prosumer that fails to build is
/// never part of a simulation.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("missing PV sizing: one of installed_capacity_kw, panel_count or roof_area_m2 is required")]
    MissingPvSizing,

    #[error("{field} must be {constraint}, got {value}")]
    OutOfRange {
        field: &'static str,
        value: f64,
        constraint: &'static str,
    },

    #[error(
        "{panel_count} panels of {panel_area_m2} m2 do not fit on a roof of {roof_area_m2} m2"
    )]
    RoofTooSmall {
        panel_count: u32,
        panel_area_m2: f64,
        roof_area_m2: f64,
    },

    #[error(
        "installed capacity {installed_capacity_kw} kW does not match {panel_count} panels of {panel_rated_kw} kW"
    )]
    SizingMismatch {
        installed_capacity_kw: f64,
        panel_count: u32,
        panel_rated_kw: f64,
    },

    #[error("invalid SOC band ({low}, {high}): expected 0 < low < high < 100")]
    InvalidSocBand { low: f64, high: f64 },

    #[error("config error: {field}: {message}")]
    Invalid { field: String, message: String },

    #[error("cannot read scenario \"{}\": {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid scenario TOML: {0}")]
    Toml(#[from] toml::de::Error),
}

impl ConfigurationError {
    /// Shorthand for a scenario-level validation failure at a dotted field path.
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Malformed time-series input for a single timestep.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SimulationInputError {
    #[error("irradiance must be finite, got {0} Wh/m2")]
    Irradiance(f64),

    #[error("load demand must be finite, got {0} kW")]
    Load(f64),

    #[error("no input sample for step {step}: series holds {len} samples")]
    MissingSample { step: usize, len: usize },

    #[error("timestep must be positive and finite, got {0} s")]
    Timestep(f64),

    #[error("cannot derive a timestep from fewer than two timestamps")]
    ShortSeries,
}

/// Failures of the power-flow collaborator.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SolverError {
    #[error("power flow did not converge after {iterations} iterations (mismatch {mismatch_pu:.3e} pu)")]
    NotConverged { iterations: usize, mismatch_pu: f64 },

    #[error("injection targets unknown bus \"{0}\"")]
    UnknownBus(String),

    #[error("invalid topology: {0}")]
    Topology(String),
}

/// Run-level error returned by the simulation engine.
#[derive(Debug, Error)]
pub enum SimError {
    #[error(transparent)]
    Config(#[from] ConfigurationError),

    #[error("step {step}, prosumer \"{prosumer}\": {source}")]
    Input {
        step: usize,
        prosumer: String,
        #[source]
        source: SimulationInputError,
    },

    #[error("step {step}: {source}")]
    Series {
        step: usize,
        #[source]
        source: SimulationInputError,
    },

    #[error("step {step}: {source}")]
    Solver {
        step: usize,
        #[source]
        source: SolverError,
    },
}
