//! Light-level to irradiance conversion.
//!
//! The sensor only reports illuminance, so irradiance is estimated with a
//! site-calibrated divisor and capped at the Standard Test Conditions ceiling.

use crate::config::AnalysisConfig;
use crate::models::{IrradianceStats, SensorSample};

/// Estimated irradiance in W/m² for a light reading
pub fn estimate(light: f64, config: &AnalysisConfig) -> f64 {
    (light / config.light_to_irradiance).min(config.max_irradiance)
}

/// True when the unclamped estimate would exceed the ceiling
pub fn is_clamped(light: f64, config: &AnalysisConfig) -> bool {
    light / config.light_to_irradiance > config.max_irradiance
}

/// Counts how often the ceiling was hit across a sensor series.
pub fn clamp_stats(samples: &[SensorSample], config: &AnalysisConfig) -> IrradianceStats {
    let clamped = samples
        .iter()
        .filter(|sample| is_clamped(sample.light, config))
        .count();

    IrradianceStats {
        samples: samples.len(),
        clamped,
        clamped_fraction: if samples.is_empty() {
            0.0
        } else {
            clamped as f64 / samples.len() as f64
        },
    }
}
