//! Measured temperature sensitivity of the array.

use crate::config::AnalysisConfig;
use crate::models::{PerformanceRecord, TemperatureAnalysis};

const BIN_LOWER: f64 = 20.0;
const BIN_UPPER: f64 = 60.0;
const BIN_WIDTH: f64 = 5.0;

/// Index of the right-closed bin `(lower, lower + width]` holding `cell`.
fn bin_index(cell: f64) -> Option<usize> {
    if cell <= BIN_LOWER || cell > BIN_UPPER {
        return None;
    }
    Some((((cell - BIN_LOWER) / BIN_WIDTH).ceil() as usize).saturating_sub(1))
}

/// Least-squares slope of y over x
fn linear_slope(points: &[(f64, f64)]) -> Option<f64> {
    let n = points.len() as f64;
    if points.len() < 2 {
        return None;
    }
    let mean_x = points.iter().map(|(x, _)| x).sum::<f64>() / n;
    let mean_y = points.iter().map(|(_, y)| y).sum::<f64>() / n;
    let sxx: f64 = points.iter().map(|(x, _)| (x - mean_x).powi(2)).sum();
    if sxx <= f64::EPSILON {
        return None;
    }
    let sxy: f64 = points.iter().map(|(x, y)| (x - mean_x) * (y - mean_y)).sum();
    Some(sxy / sxx)
}

/// Fits PR against binned cell temperature over the valid records.
///
/// Returns `None` when there is no valid record at all.
pub fn analyze(
    records: &[PerformanceRecord],
    config: &AnalysisConfig,
) -> Option<TemperatureAnalysis> {
    let valid: Vec<&PerformanceRecord> =
        records.iter().filter(|record| record.valid).collect();
    if valid.is_empty() {
        return None;
    }

    let bin_count = ((BIN_UPPER - BIN_LOWER) / BIN_WIDTH) as usize;
    let mut bins = vec![(0usize, 0.0f64, 0.0f64); bin_count];
    for record in &valid {
        if let Some(index) = bin_index(record.cell_temperature) {
            let bin = &mut bins[index];
            bin.0 += 1;
            bin.1 += record.cell_temperature;
            bin.2 += record.performance_ratio;
        }
    }

    let points: Vec<(f64, f64)> = bins
        .iter()
        .filter(|(count, _, _)| *count > 0)
        .map(|(count, cell, pr)| (cell / *count as f64, pr / *count as f64))
        .collect();

    let expected = config.temp_coefficient * 100.0;
    let mean_pr = points.iter().map(|(_, pr)| pr).sum::<f64>() / points.len().max(1) as f64;
    let measured = match linear_slope(&points) {
        Some(slope) if mean_pr > 0.0 => slope / mean_pr * 100.0,
        _ => expected,
    };

    let n = valid.len() as f64;
    let cells = valid.iter().map(|record| record.cell_temperature);
    let ambients = valid.iter().map(|record| record.interval.temperature);

    Some(TemperatureAnalysis {
        measured_coefficient: measured,
        expected_coefficient: expected,
        bins_used: points.len(),
        avg_cell_temp: cells.clone().sum::<f64>() / n,
        max_cell_temp: cells.clone().fold(f64::NEG_INFINITY, f64::max),
        min_cell_temp: cells.fold(f64::INFINITY, f64::min),
        avg_ambient_temp: ambients.clone().sum::<f64>() / n,
        max_ambient_temp: ambients.fold(f64::NEG_INFINITY, f64::max),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MergedInterval;
    use chrono::NaiveDate;

    fn record(cell_temperature: f64, performance_ratio: f64, valid: bool) -> PerformanceRecord {
        PerformanceRecord {
            interval: MergedInterval {
                timestamp: NaiveDate::from_ymd_opt(2025, 6, 1)
                    .unwrap()
                    .and_hms_opt(11, 0, 0)
                    .unwrap(),
                temperature: cell_temperature - 15.0,
                humidity: 40.0,
                light: 80_000.0,
                irradiance: 480.0,
                actual_kwh: 2.0,
                unit_price: 0.22,
            },
            theoretical_kwh: 2.4,
            performance_ratio,
            cell_temperature,
            temp_adjusted_pr: performance_ratio,
            valid,
        }
    }

    #[test]
    fn bins_are_right_closed() {
        assert_eq!(bin_index(20.0), None);
        assert_eq!(bin_index(20.1), Some(0));
        assert_eq!(bin_index(25.0), Some(0));
        assert_eq!(bin_index(25.1), Some(1));
        assert_eq!(bin_index(60.0), Some(7));
        assert_eq!(bin_index(60.5), None);
    }

    #[test]
    fn recovers_linear_sensitivity() {
        // PR falls 0.004 per °C around 0.8
        let records: Vec<PerformanceRecord> = [32.0, 37.0, 42.0, 47.0]
            .iter()
            .map(|cell| record(*cell, 0.8 - 0.004 * (cell - 39.5), true))
            .collect();
        let analysis = analyze(&records, &AnalysisConfig::default()).unwrap();

        assert_eq!(analysis.bins_used, 4);
        assert!((analysis.measured_coefficient - (-0.5)).abs() < 1e-6);
        assert!((analysis.expected_coefficient - (-0.36)).abs() < 1e-9);
        assert!((analysis.max_cell_temp - 47.0).abs() < 1e-9);
        assert!((analysis.min_cell_temp - 32.0).abs() < 1e-9);
        assert!((analysis.avg_ambient_temp - 24.5).abs() < 1e-9);
    }

    #[test]
    fn single_bin_falls_back_to_expected() {
        let records = vec![record(41.0, 0.8, true), record(42.0, 0.78, true)];
        let analysis = analyze(&records, &AnalysisConfig::default()).unwrap();
        assert_eq!(analysis.bins_used, 1);
        assert!((analysis.measured_coefficient - (-0.36)).abs() < 1e-9);
    }

    #[test]
    fn no_valid_records_gives_none() {
        assert!(analyze(&[record(40.0, 0.8, false)], &AnalysisConfig::default()).is_none());
    }
}
