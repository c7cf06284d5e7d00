//! Irradiance series with a half-sine daylight shape and AR(1) cloud cover.

use rand::{SeedableRng, rngs::StdRng};

use crate::devices::types::gaussian_noise;

/// Minimum cloud multiplier (heavy overcast).
const MULTIPLIER_MIN: f64 = 0.2;
/// Maximum cloud multiplier (enhanced irradiance from cloud edges).
const MULTIPLIER_MAX: f64 = 1.2;

/// Fraction of peak irradiance at `hour` of day, zero outside daylight.
pub fn daylight_frac(hour: f64, sunrise_hour: f64, sunset_hour: f64) -> f64 {
    if hour < sunrise_hour || hour >= sunset_hour {
        return 0.0;
    }
    let x = (hour - sunrise_hour) / (sunset_hour - sunrise_hour);
    (std::f64::consts::PI * x).sin().max(0.0)
}

/// Seeded generator of irradiance accumulated per timestep (Wh/m2).
///
/// The cloud multiplier evolves as
/// ```text
/// m(t) = alpha * m(t-1) + (1 - alpha) * (1 + epsilon(t))
/// ```
/// and is clamped to \[0.2, 1.2\], so consecutive steps stay correlated.
#[derive(Debug, Clone)]
pub struct IrradianceProfile {
    /// Clear-sky irradiance at solar noon (W/m2).
    pub peak_w_m2: f64,
    pub sunrise_hour: f64,
    pub sunset_hour: f64,
    /// AR(1) correlation coefficient (0.0 = uncorrelated, 1.0 = fully persistent).
    pub alpha: f64,
    /// Standard deviation of the AR(1) innovation noise.
    pub cloud_noise_std: f64,
    multiplier: f64,
    rng: StdRng,
}

impl IrradianceProfile {
    /// # Panics
    ///
    /// Panics if `sunrise_hour >= sunset_hour` or either lies outside 0..=24.
    pub fn new(
        peak_w_m2: f64,
        sunrise_hour: f64,
        sunset_hour: f64,
        alpha: f64,
        cloud_noise_std: f64,
        seed: u64,
    ) -> Self {
        assert!(
            (0.0..=24.0).contains(&sunrise_hour)
                && (0.0..=24.0).contains(&sunset_hour)
                && sunrise_hour < sunset_hour,
            "sunrise_hour must be < sunset_hour, both within a day"
        );
        Self {
            peak_w_m2: peak_w_m2.max(0.0),
            sunrise_hour,
            sunset_hour,
            alpha: alpha.clamp(0.0, 1.0),
            cloud_noise_std: cloud_noise_std.max(0.0),
            multiplier: 1.0,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    fn advance_multiplier(&mut self) -> f64 {
        let epsilon = gaussian_noise(&mut self.rng, self.cloud_noise_std);
        self.multiplier = self.alpha * self.multiplier + (1.0 - self.alpha) * (1.0 + epsilon);
        self.multiplier = self.multiplier.clamp(MULTIPLIER_MIN, MULTIPLIER_MAX);
        self.multiplier
    }

    /// Irradiance accumulated over the step starting at `hour` (Wh/m2).
    ///
    /// The cloud state advances on every call, day or night.
    pub fn energy_wh_m2(&mut self, hour: f64, timestep_seconds: f64) -> f64 {
        let m = self.advance_multiplier();
        let w_m2 = self.peak_w_m2 * daylight_frac(hour, self.sunrise_hour, self.sunset_hour) * m;
        w_m2 * timestep_seconds / 3600.0
    }

    /// Irradiance for `steps` consecutive steps starting at `start_hour`.
    pub fn series(&mut self, start_hour: f64, timestep_seconds: f64, steps: usize) -> Vec<f64> {
        (0..steps)
            .map(|t| {
                let hour = (start_hour + t as f64 * timestep_seconds / 3600.0) % 24.0;
                self.energy_wh_m2(hour, timestep_seconds)
            })
            .collect()
    }
}
