//! Alignment of the high-rate sensor feed with the bucketed inverter feed.

use std::collections::BTreeMap;

use chrono::{NaiveDateTime, NaiveTime, Timelike};

use crate::config::AnalysisConfig;
use crate::error::{NoOverlapSnafu, Result};
use crate::models::{
    GenerationSample, MergeDiagnostics, MergeFailure, MergedInterval, SensorSample, TimeRange,
};

const SAMPLE_BUCKETS: usize = 5;

#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub intervals: Vec<MergedInterval>,
    pub diagnostics: MergeDiagnostics,
}

#[derive(Debug, Default)]
struct SensorBucket {
    count: usize,
    temperature: f64,
    humidity: f64,
    light: f64,
    irradiance: f64,
}

impl SensorBucket {
    fn add(&mut self, sample: &SensorSample) {
        self.count += 1;
        self.temperature += sample.temperature;
        self.humidity += sample.humidity;
        self.light += sample.light;
        self.irradiance += sample.irradiance;
    }

    fn mean(&self, total: f64) -> f64 {
        total / self.count as f64
    }
}

/// Floors a timestamp to the start of its bucket.
pub fn bucket_start(timestamp: NaiveDateTime, bucket_minutes: u32) -> NaiveDateTime {
    let width = bucket_minutes.max(1) * 60;
    let seconds = timestamp.time().num_seconds_from_midnight();
    let floored = NaiveTime::from_num_seconds_from_midnight_opt(seconds - seconds % width, 0)
        .unwrap_or(NaiveTime::MIN);
    timestamp.date().and_time(floored)
}

/// Whether a bucket start lies inside the inclusive midday window.
pub fn in_window(bucket: NaiveDateTime, config: &AnalysisConfig) -> bool {
    let time = bucket.time();
    time >= config.window_start && time <= config.window_end
}

fn aggregate_sensor(
    samples: &[SensorSample],
    bucket_minutes: u32,
) -> BTreeMap<NaiveDateTime, SensorBucket> {
    let mut buckets: BTreeMap<NaiveDateTime, SensorBucket> = BTreeMap::new();
    for sample in samples {
        buckets
            .entry(bucket_start(sample.timestamp, bucket_minutes))
            .or_default()
            .add(sample);
    }
    buckets
}

/// Duplicate reports in one bucket are summed; the first price is kept.
fn aggregate_generation(
    samples: &[GenerationSample],
    bucket_minutes: u32,
) -> BTreeMap<NaiveDateTime, (f64, f64)> {
    let mut buckets: BTreeMap<NaiveDateTime, (f64, f64)> = BTreeMap::new();
    for sample in samples {
        let entry = buckets
            .entry(bucket_start(sample.timestamp, bucket_minutes))
            .or_insert((0.0, sample.unit_price));
        entry.0 += sample.energy_kwh;
    }
    buckets
}

/// Inner-joins both series on bucket start and keeps the midday window.
///
/// Fails with `NoOverlap` when nothing survives, carrying the ranges of both
/// inputs so a wrong upload window can be told apart from drifting clocks.
pub fn merge(
    sensor: &[SensorSample],
    generation: &[GenerationSample],
    config: &AnalysisConfig,
) -> Result<MergeOutcome> {
    let width = config.bucket_minutes;
    let sensor_range = TimeRange::of(sensor.iter().map(|s| s.timestamp));
    let generation_range = TimeRange::of(generation.iter().map(|g| g.timestamp));
    // Compared on bucket starts, since that is what the join sees.
    let overlap = match (&sensor_range, &generation_range) {
        (Some(a), Some(b)) => a.floored(width).intersect(&b.floored(width)),
        _ => None,
    };

    let sensor_buckets = aggregate_sensor(sensor, config.bucket_minutes);
    let generation_buckets = aggregate_generation(generation, config.bucket_minutes);

    let joined: Vec<MergedInterval> = sensor_buckets
        .iter()
        .filter_map(|(timestamp, bucket)| {
            let (actual_kwh, unit_price) = generation_buckets.get(timestamp)?;
            Some(MergedInterval {
                timestamp: *timestamp,
                temperature: bucket.mean(bucket.temperature),
                humidity: bucket.mean(bucket.humidity),
                light: bucket.mean(bucket.light),
                irradiance: bucket.mean(bucket.irradiance),
                actual_kwh: *actual_kwh,
                unit_price: *unit_price,
            })
        })
        .collect();
    let joined_rows = joined.len();

    let intervals: Vec<MergedInterval> = joined
        .into_iter()
        .filter(|interval| in_window(interval.timestamp, config))
        .collect();

    let mut diagnostics = MergeDiagnostics {
        sensor_rows: sensor.len(),
        generation_rows: generation.len(),
        sensor_range,
        generation_range,
        overlap,
        sensor_buckets: sensor_buckets.len(),
        generation_buckets: generation_buckets.len(),
        joined_rows,
        merged_rows: intervals.len(),
        ..MergeDiagnostics::default()
    };

    tracing::debug!(
        "merge: {} sensor buckets, {} generation buckets, {} joined, {} in window",
        diagnostics.sensor_buckets,
        diagnostics.generation_buckets,
        joined_rows,
        intervals.len()
    );

    if intervals.is_empty() {
        diagnostics.failure = Some(if sensor.is_empty() || generation.is_empty() {
            MergeFailure::EmptySeries
        } else if joined_rows > 0 {
            MergeFailure::OutsideWindow
        } else if overlap.is_none() {
            MergeFailure::DisjointRanges
        } else {
            MergeFailure::MisalignedBuckets
        });
        diagnostics.sensor_sample_buckets =
            sensor_buckets.keys().take(SAMPLE_BUCKETS).copied().collect();
        diagnostics.generation_sample_buckets =
            generation_buckets.keys().take(SAMPLE_BUCKETS).copied().collect();

        tracing::warn!("merge produced no intervals: {}", diagnostics.cause_label());
        return NoOverlapSnafu {
            diagnostics: Box::new(diagnostics),
        }
        .fail();
    }

    Ok(MergeOutcome {
        intervals,
        diagnostics,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use chrono::{Duration, NaiveDate};

    fn at(m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, m, d).unwrap().and_hms_opt(h, min, 0).unwrap()
    }

    fn sensor(timestamp: NaiveDateTime, light: f64) -> SensorSample {
        SensorSample {
            timestamp,
            temperature: 30.0,
            humidity: 40.0,
            light,
            irradiance: light / 165.0,
        }
    }

    fn generation(timestamp: NaiveDateTime, energy_kwh: f64, unit_price: f64) -> GenerationSample {
        GenerationSample {
            timestamp,
            energy_kwh,
            unit_price,
        }
    }

    fn config() -> AnalysisConfig {
        AnalysisConfig::default()
    }

    fn failure(err: Error) -> MergeDiagnostics {
        match err {
            Error::NoOverlap { diagnostics } => *diagnostics,
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn floors_to_bucket_start() {
        let late = at(6, 1, 10, 29) + Duration::seconds(59);
        assert_eq!(bucket_start(late, 30), at(6, 1, 10, 0));
        assert_eq!(bucket_start(at(6, 1, 10, 30), 30), at(6, 1, 10, 30));
        assert_eq!(bucket_start(at(6, 1, 23, 59), 30), at(6, 1, 23, 30));
    }

    #[test]
    fn per_second_sensor_day_yields_seven_midday_intervals() {
        let start = at(6, 1, 0, 0);
        let sensor_series: Vec<SensorSample> = (0..86_400)
            .map(|s| sensor(start + Duration::seconds(s), 82_500.0))
            .collect();
        let generation_series: Vec<GenerationSample> = (0..48)
            .map(|i| generation(start + Duration::minutes(30 * i), 2.5, 0.22))
            .collect();

        let outcome = merge(&sensor_series, &generation_series, &config()).unwrap();
        let times: Vec<String> = outcome
            .intervals
            .iter()
            .map(|i| i.timestamp.format("%H:%M").to_string())
            .collect();

        assert_eq!(times, ["10:00", "10:30", "11:00", "11:30", "12:00", "12:30", "13:00"]);
        assert_eq!(outcome.diagnostics.joined_rows, 48);
        assert!((outcome.intervals[0].irradiance - 500.0).abs() < 1e-9);
    }

    #[test]
    fn averages_sensor_and_sums_duplicate_generation() {
        let sensor_series = vec![
            sensor(at(6, 1, 11, 0), 66_000.0),
            sensor(at(6, 1, 11, 10), 99_000.0),
        ];
        let generation_series = vec![
            generation(at(6, 1, 11, 0), 1.5, 0.20),
            generation(at(6, 1, 11, 15), 1.0, 0.30),
        ];

        let outcome = merge(&sensor_series, &generation_series, &config()).unwrap();
        assert_eq!(outcome.intervals.len(), 1);
        let interval = &outcome.intervals[0];
        assert!((interval.light - 82_500.0).abs() < 1e-9);
        assert!((interval.irradiance - 500.0).abs() < 1e-9);
        assert!((interval.actual_kwh - 2.5).abs() < 1e-9);
        assert_eq!(interval.unit_price, 0.20);
    }

    #[test]
    fn disjoint_months_report_both_ranges() {
        let sensor_series: Vec<SensorSample> =
            (1..=31).map(|d| sensor(at(1, d, 11, 0), 80_000.0)).collect();
        let generation_series: Vec<GenerationSample> =
            (1..=28).map(|d| generation(at(2, d, 11, 0), 2.0, 0.22)).collect();

        let err = merge(&sensor_series, &generation_series, &config()).unwrap_err();
        let diagnostics = failure(err);

        assert_eq!(diagnostics.failure, Some(MergeFailure::DisjointRanges));
        assert_eq!(diagnostics.sensor_range.unwrap().min, at(1, 1, 11, 0));
        assert_eq!(diagnostics.sensor_range.unwrap().max, at(1, 31, 11, 0));
        assert_eq!(diagnostics.generation_range.unwrap().min, at(2, 1, 11, 0));
        assert_eq!(diagnostics.generation_range.unwrap().max, at(2, 28, 11, 0));
        assert!(diagnostics.overlap.is_none());
        assert_eq!(diagnostics.merged_rows, 0);
    }

    #[test]
    fn overlapping_ranges_without_shared_buckets_are_misaligned() {
        let sensor_series: Vec<SensorSample> =
            (1..=5).map(|d| sensor(at(6, d, 7, 0), 20_000.0)).collect();
        let generation_series: Vec<GenerationSample> =
            (1..=5).map(|d| generation(at(6, d, 16, 0), 1.0, 0.22)).collect();

        let err = merge(&sensor_series, &generation_series, &config()).unwrap_err();
        let diagnostics = failure(err);

        assert_eq!(diagnostics.failure, Some(MergeFailure::MisalignedBuckets));
        assert!(diagnostics.overlap.is_some());
        assert_eq!(diagnostics.sensor_sample_buckets.len(), 5);
    }

    #[test]
    fn joins_outside_window_only_are_flagged() {
        let sensor_series = vec![sensor(at(6, 1, 15, 5), 50_000.0)];
        let generation_series = vec![generation(at(6, 1, 15, 0), 1.0, 0.22)];

        let err = merge(&sensor_series, &generation_series, &config()).unwrap_err();
        let diagnostics = failure(err);
        assert_eq!(diagnostics.failure, Some(MergeFailure::OutsideWindow));
        assert_eq!(diagnostics.joined_rows, 1);
    }

    #[test]
    fn afternoon_buckets_joining_off_raw_range_are_outside_window() {
        let sensor_series: Vec<SensorSample> = (0..60)
            .map(|m| sensor(at(6, 1, 15, 5) + Duration::minutes(m), 50_000.0))
            .collect();
        let generation_series: Vec<GenerationSample> = (0..13)
            .map(|i| generation(at(6, 1, 9, 0) + Duration::minutes(30 * i), 1.0, 0.22))
            .collect();

        let err = merge(&sensor_series, &generation_series, &config()).unwrap_err();
        let diagnostics = failure(err);

        assert_eq!(diagnostics.joined_rows, 1);
        assert_eq!(diagnostics.failure, Some(MergeFailure::OutsideWindow));
        let overlap = diagnostics.overlap.unwrap();
        assert_eq!(overlap.min, at(6, 1, 15, 0));
        assert_eq!(overlap.max, at(6, 1, 15, 0));
    }

    #[test]
    fn empty_series_is_reported() {
        let generation_series = vec![generation(at(6, 1, 11, 0), 1.0, 0.22)];
        let err = merge(&[], &generation_series, &AnalysisConfig::default()).unwrap_err();
        assert_eq!(failure(err).failure, Some(MergeFailure::EmptySeries));
    }
}
