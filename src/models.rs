use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorSample {
    pub timestamp: NaiveDateTime,
    pub temperature: f64,
    pub humidity: f64,
    pub light: f64,
    /// Derived from `light` with the run's calibration
    pub irradiance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationSample {
    pub timestamp: NaiveDateTime,
    pub energy_kwh: f64,
    pub unit_price: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct CleaningEvent {
    pub timestamp: NaiveDateTime,
}

impl CleaningEvent {
    pub fn date(&self) -> NaiveDate {
        self.timestamp.date()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergedInterval {
    pub timestamp: NaiveDateTime,
    pub temperature: f64,
    pub humidity: f64,
    pub light: f64,
    pub irradiance: f64,
    pub actual_kwh: f64,
    pub unit_price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceRecord {
    #[serde(flatten)]
    pub interval: MergedInterval,
    pub theoretical_kwh: f64,
    pub performance_ratio: f64,
    pub cell_temperature: f64,
    pub temp_adjusted_pr: f64,
    pub valid: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyAggregate {
    pub date: NaiveDate,
    pub intervals: usize,
    pub temperature: f64,
    pub humidity: f64,
    pub light: f64,
    pub irradiance: f64,
    pub actual_kwh: f64,
    pub theoretical_kwh: f64,
    pub performance_ratio: f64,
    pub temp_adjusted_pr: f64,
    pub cell_temperature: f64,
    pub revenue: f64,
    /// Ratio of summed actual to summed theoretical output
    pub daily_pr: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DegradationAssessment {
    pub baseline_date: Option<NaiveDate>,
    pub baseline_pr: f64,
    pub current_pr: f64,
    pub degradation_percent: f64,
    pub degradation_rate_per_day: f64,
    pub days_since_baseline: i64,
    pub days_to_95_percent: Option<u32>,
    pub days_to_90_percent: Option<u32>,
    pub days_to_85_percent: Option<u32>,
    pub days_to_80_percent: Option<u32>,
    pub recommended_interval_days: u32,
    pub soiling_loss_index: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CleaningRecovery {
    pub cleaning_date: NaiveDateTime,
    pub pr_before: f64,
    pub pr_after: f64,
    pub recovery_percent: f64,
    pub kwh_before_avg: f64,
    pub kwh_after_avg: f64,
    pub days_before: usize,
    pub days_after: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemperatureAnalysis {
    /// Percent PR change per °C of cell temperature
    pub measured_coefficient: f64,
    pub expected_coefficient: f64,
    pub bins_used: usize,
    pub avg_cell_temp: f64,
    pub max_cell_temp: f64,
    pub min_cell_temp: f64,
    pub avg_ambient_temp: f64,
    pub max_ambient_temp: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct IrradianceStats {
    pub samples: usize,
    pub clamped: usize,
    pub clamped_fraction: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeRange {
    pub min: NaiveDateTime,
    pub max: NaiveDateTime,
}

impl TimeRange {
    pub fn of(timestamps: impl Iterator<Item = NaiveDateTime>) -> Option<Self> {
        timestamps.fold(None, |range, ts| match range {
            None => Some(TimeRange { min: ts, max: ts }),
            Some(r) => Some(TimeRange {
                min: r.min.min(ts),
                max: r.max.max(ts),
            }),
        })
    }

    /// Range of the bucket starts covering this range.
    pub fn floored(&self, bucket_minutes: u32) -> TimeRange {
        TimeRange {
            min: crate::merge::bucket_start(self.min, bucket_minutes),
            max: crate::merge::bucket_start(self.max, bucket_minutes),
        }
    }

    pub fn intersect(&self, other: &TimeRange) -> Option<TimeRange> {
        let min = self.min.max(other.min);
        let max = self.max.min(other.max);
        (min <= max).then_some(TimeRange { min, max })
    }
}

/// Why a merge produced no intervals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeFailure {
    EmptySeries,
    DisjointRanges,
    MisalignedBuckets,
    OutsideWindow,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct MergeDiagnostics {
    pub sensor_rows: usize,
    pub generation_rows: usize,
    pub sensor_range: Option<TimeRange>,
    pub generation_range: Option<TimeRange>,
    /// Overlap of the two ranges floored to bucket starts
    pub overlap: Option<TimeRange>,
    pub sensor_buckets: usize,
    pub generation_buckets: usize,
    pub joined_rows: usize,
    pub merged_rows: usize,
    pub sensor_sample_buckets: Vec<NaiveDateTime>,
    pub generation_sample_buckets: Vec<NaiveDateTime>,
    pub failure: Option<MergeFailure>,
}

impl MergeDiagnostics {
    pub fn cause_label(&self) -> &'static str {
        match self.failure {
            Some(MergeFailure::EmptySeries) => "one of the series is empty",
            Some(MergeFailure::DisjointRanges) => {
                "sensor and generation series do not overlap in time (check uploaded date ranges)"
            }
            Some(MergeFailure::MisalignedBuckets) => {
                "series overlap but no bucket boundaries coincide (check device clocks)"
            }
            Some(MergeFailure::OutsideWindow) => {
                "buckets coincide only outside the midday analysis window"
            }
            None => "merge succeeded",
        }
    }
}

/// What was wrong with an input table that could not be normalized
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "problem", rename_all = "snake_case")]
pub enum InputDiagnostics {
    MissingColumn {
        table: String,
        role: String,
        headers: Vec<String>,
    },
    MalformedTimestamp {
        column: String,
        rows: usize,
        sample: Option<String>,
    },
}
