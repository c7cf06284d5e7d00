use rand::{SeedableRng, rngs::StdRng};

use crate::devices::types::gaussian_noise;

/// Household demand generator with a daily sinusoidal shape.
///
/// # Examples
///
/// ```
/// use prosumer_sim::profiles::load::LoadProfile;
///
/// let mut load = LoadProfile::new(
///     0.8,  // base_kw - average consumption
///     0.5,  // amp_kw - daily variation
///     1.2,  // phase_rad
///     0.05, // noise_std
///     96,   // steps_per_day - 15 minute resolution
///     42,   // seed
/// );
/// assert!(load.demand_kw(48) >= 0.0);
/// ```
#[derive(Debug, Clone)]
pub struct LoadProfile {
    /// Baseline power consumption in kilowatts
    pub base_kw: f64,

    /// Amplitude of the sinusoidal variation in kilowatts
    pub amp_kw: f64,

    /// Phase offset of the sinusoidal pattern in radians
    pub phase_rad: f64,

    /// Standard deviation of the Gaussian noise in kilowatts
    pub noise_std: f64,

    /// Number of time steps per simulated day
    pub steps_per_day: usize,

    rng: StdRng,
}

impl LoadProfile {
    pub fn new(
        base_kw: f64,
        amp_kw: f64,
        phase_rad: f64,
        noise_std: f64,
        steps_per_day: usize,
        seed: u64,
    ) -> Self {
        Self {
            base_kw,
            amp_kw,
            phase_rad,
            noise_std,
            steps_per_day: steps_per_day.max(1),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Demand at a timestep in kW, never negative.
    pub fn demand_kw(&mut self, timestep: usize) -> f64 {
        let day_pos = (timestep % self.steps_per_day) as f64 / self.steps_per_day as f64;
        let angle = 2.0 * std::f64::consts::PI * day_pos + self.phase_rad;
        let noise = gaussian_noise(&mut self.rng, self.noise_std);

        (self.base_kw + self.amp_kw * angle.sin() + noise).max(0.0)
    }

    /// Demand for timesteps `0..steps`.
    pub fn series(&mut self, steps: usize) -> Vec<f64> {
        (0..steps).map(|t| self.demand_kw(t)).collect()
    }
}
