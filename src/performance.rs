//! Per-interval performance model and daily roll-up.

use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::config::AnalysisConfig;
use crate::models::{DailyAggregate, MergedInterval, PerformanceRecord};

/// Irradiance at which nameplate capacity is rated, W/m²
const STC_IRRADIANCE: f64 = 1000.0;
/// Irradiance at which NOCT is specified, W/m²
const NOCT_IRRADIANCE: f64 = 800.0;
/// Ambient temperature at which NOCT is specified, °C
const NOCT_AMBIENT: f64 = 20.0;

/// Expected energy for one bucket at the measured irradiance
pub fn theoretical_kwh(irradiance: f64, config: &AnalysisConfig) -> f64 {
    (irradiance / STC_IRRADIANCE * config.capacity_kwp * config.bucket_hours()).max(0.0)
}

pub fn performance_ratio(actual_kwh: f64, theoretical_kwh: f64) -> f64 {
    if theoretical_kwh <= 0.0 {
        return 0.0;
    }
    actual_kwh / theoretical_kwh
}

/// NOCT cell temperature model
pub fn cell_temperature(ambient: f64, irradiance: f64, config: &AnalysisConfig) -> f64 {
    ambient + (config.noct - NOCT_AMBIENT) * (irradiance / NOCT_IRRADIANCE)
}

/// Removes the thermal loss from a PR so that what remains is mostly soiling.
pub fn temp_adjusted_pr(pr: f64, cell_temperature: f64, config: &AnalysisConfig) -> f64 {
    let factor = 1.0 + config.temp_coefficient * (cell_temperature - config.reference_temp);
    if factor > 0.0 {
        pr / factor
    } else {
        pr
    }
}

pub fn evaluate(interval: &MergedInterval, config: &AnalysisConfig) -> PerformanceRecord {
    let theoretical = theoretical_kwh(interval.irradiance, config);
    let pr = performance_ratio(interval.actual_kwh, theoretical);
    let cell = cell_temperature(interval.temperature, interval.irradiance, config);

    PerformanceRecord {
        interval: interval.clone(),
        theoretical_kwh: theoretical,
        performance_ratio: pr,
        cell_temperature: cell,
        temp_adjusted_pr: temp_adjusted_pr(pr, cell, config),
        valid: interval.irradiance >= config.min_valid_irradiance,
    }
}

pub fn evaluate_all(
    intervals: &[MergedInterval],
    config: &AnalysisConfig,
) -> Vec<PerformanceRecord> {
    intervals.iter().map(|interval| evaluate(interval, config)).collect()
}

#[derive(Default)]
struct DayTotals {
    count: usize,
    temperature: f64,
    humidity: f64,
    light: f64,
    irradiance: f64,
    actual_kwh: f64,
    theoretical_kwh: f64,
    performance_ratio: f64,
    temp_adjusted_pr: f64,
    cell_temperature: f64,
    revenue: f64,
}

/// One row per calendar date built from valid records only.
///
/// Daily PR is the ratio of the summed energies, so low-output intervals with
/// extreme ratios do not dominate the day.
pub fn aggregate_daily(records: &[PerformanceRecord]) -> Vec<DailyAggregate> {
    let mut days: BTreeMap<NaiveDate, DayTotals> = BTreeMap::new();

    for record in records.iter().filter(|record| record.valid) {
        let totals = days.entry(record.interval.timestamp.date()).or_default();
        totals.count += 1;
        totals.temperature += record.interval.temperature;
        totals.humidity += record.interval.humidity;
        totals.light += record.interval.light;
        totals.irradiance += record.interval.irradiance;
        totals.actual_kwh += record.interval.actual_kwh;
        totals.theoretical_kwh += record.theoretical_kwh;
        totals.performance_ratio += record.performance_ratio;
        totals.temp_adjusted_pr += record.temp_adjusted_pr;
        totals.cell_temperature += record.cell_temperature;
        totals.revenue += record.interval.actual_kwh * record.interval.unit_price;
    }

    days.into_iter()
        .map(|(date, totals)| {
            let n = totals.count as f64;
            DailyAggregate {
                date,
                intervals: totals.count,
                temperature: totals.temperature / n,
                humidity: totals.humidity / n,
                light: totals.light / n,
                irradiance: totals.irradiance / n,
                actual_kwh: totals.actual_kwh,
                theoretical_kwh: totals.theoretical_kwh,
                performance_ratio: totals.performance_ratio / n,
                temp_adjusted_pr: totals.temp_adjusted_pr / n,
                cell_temperature: totals.cell_temperature / n,
                revenue: totals.revenue,
                daily_pr: performance_ratio(totals.actual_kwh, totals.theoretical_kwh),
            }
        })
        .collect()
}
