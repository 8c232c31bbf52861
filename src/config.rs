use std::path::Path;

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use snafu::ResultExt;

use crate::error::{ConfigurationSnafu, IoSnafu, Result, TomlDeSnafu, TomlSeSnafu};

const MINUTES_PER_DAY: u32 = 24 * 60;

/// Site constants and analysis tuning for one run.
///
/// Every field has a default, so a TOML file only needs to name what differs
/// from a 10 kWp installation sampled on a 30 minute grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Peak DC capacity of the array in kWp
    pub capacity_kwp: f64,
    /// Light units per W/m²
    pub light_to_irradiance: f64,
    /// Irradiance ceiling in W/m² (Standard Test Conditions)
    pub max_irradiance: f64,
    /// Nominal Operating Cell Temperature in °C
    pub noct: f64,
    /// Fractional power change per °C of cell temperature
    pub temp_coefficient: f64,
    pub reference_temp: f64,
    pub bucket_minutes: u32,
    /// First bucket start of the midday window, inclusive
    pub window_start: NaiveTime,
    /// Last bucket start of the midday window, inclusive
    pub window_end: NaiveTime,
    pub min_valid_irradiance: f64,
    pub baseline_days: u32,
    pub current_days: u32,
    pub recovery_days: u32,
    pub default_cleaning_interval_days: u32,
    /// Price per kWh used when the generation feed carries none
    pub default_unit_price: f64,
    /// Share of clamped sensor samples above which recalibration is suggested
    pub clamp_warning_fraction: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            capacity_kwp: 10.0,
            light_to_irradiance: 165.0,
            max_irradiance: 1000.0,
            noct: 45.0,
            temp_coefficient: -0.0036,
            reference_temp: 25.0,
            bucket_minutes: 30,
            window_start: NaiveTime::from_hms_opt(10, 0, 0).unwrap_or(NaiveTime::MIN),
            window_end: NaiveTime::from_hms_opt(13, 0, 0).unwrap_or(NaiveTime::MIN),
            min_valid_irradiance: 50.0,
            baseline_days: 3,
            current_days: 3,
            recovery_days: 3,
            default_cleaning_interval_days: 14,
            default_unit_price: 0.22,
            clamp_warning_fraction: 0.10,
        }
    }
}

impl AnalysisConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).context(IoSnafu { path })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: AnalysisConfig = toml::from_str(content).context(TomlDeSnafu)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context(TomlSeSnafu)
    }

    /// Length of one bucket in hours
    pub fn bucket_hours(&self) -> f64 {
        self.bucket_minutes as f64 / 60.0
    }

    /// Rejects settings that would make the physics or the bucketing meaningless.
    pub fn validate(&self) -> Result<()> {
        positive("capacity_kwp", self.capacity_kwp)?;
        positive("light_to_irradiance", self.light_to_irradiance)?;
        positive("max_irradiance", self.max_irradiance)?;

        if self.bucket_minutes == 0 || MINUTES_PER_DAY % self.bucket_minutes != 0 {
            return ConfigurationSnafu {
                message: format!(
                    "bucket_minutes must divide a day evenly, got {}",
                    self.bucket_minutes
                ),
            }
            .fail();
        }

        if self.window_start > self.window_end {
            return ConfigurationSnafu {
                message: format!(
                    "window_start {} is after window_end {}",
                    self.window_start, self.window_end
                ),
            }
            .fail();
        }

        for (name, days) in [
            ("baseline_days", self.baseline_days),
            ("current_days", self.current_days),
            ("recovery_days", self.recovery_days),
            ("default_cleaning_interval_days", self.default_cleaning_interval_days),
        ] {
            if days == 0 {
                return ConfigurationSnafu {
                    message: format!("{name} must be at least 1"),
                }
                .fail();
            }
        }

        if !(0.0..=1.0).contains(&self.clamp_warning_fraction) {
            return ConfigurationSnafu {
                message: format!(
                    "clamp_warning_fraction must lie in [0, 1], got {}",
                    self.clamp_warning_fraction
                ),
            }
            .fail();
        }

        Ok(())
    }
}

fn positive(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        ConfigurationSnafu {
            message: format!("{name} must be positive, got {value}"),
        }
        .fail()
    }
}
