//! Synthetic input series for stand-alone runs.

pub mod irradiance;
/// Household demand profile.
pub mod load;

pub use irradiance::IrradianceProfile;
pub use load::LoadProfile;
