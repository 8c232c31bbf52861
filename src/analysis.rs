//! End-to-end analysis run.
//!
//! Input-stage failures never cross this boundary as errors: `analyze` always
//! returns a well-formed response, with the diagnostic payload attached when
//! the run could not produce a report.

use serde::Serialize;

use crate::config::AnalysisConfig;
use crate::degradation;
use crate::error::{Error, ErrorKind, Result};
use crate::irradiance;
use crate::merge;
use crate::models::{
    CleaningEvent, DailyAggregate, GenerationSample, InputDiagnostics, MergeDiagnostics,
    SensorSample,
};
use crate::normalize::{self, RawTable};
use crate::performance;
use crate::recovery;
use crate::report::{self, Report, ReportInputs};
use crate::temperature;

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisResponse {
    pub success: bool,
    pub message: Option<String>,
    pub error_kind: Option<ErrorKind>,
    pub diagnostics: Option<MergeDiagnostics>,
    pub input_diagnostics: Option<InputDiagnostics>,
    pub report: Option<Report>,
}

impl AnalysisResponse {
    fn from_result(result: Result<Report>) -> Self {
        match result {
            Ok(report) => Self {
                success: true,
                message: None,
                error_kind: None,
                diagnostics: None,
                input_diagnostics: None,
                report: Some(report),
            },
            Err(err) => {
                tracing::error!("analysis failed: {}", err);
                Self {
                    success: false,
                    message: Some(err.to_string()),
                    error_kind: Some(err.kind()),
                    diagnostics: err.diagnostics().cloned(),
                    input_diagnostics: err.input_diagnostics(),
                    report: None,
                }
            }
        }
    }
}

/// Runs the whole pipeline over raw tables and folds any failure into the response.
pub fn analyze(
    sensor: &RawTable,
    generation: &RawTable,
    cleaning_events: &[CleaningEvent],
    config: &AnalysisConfig,
) -> AnalysisResponse {
    AnalysisResponse::from_result(run(sensor, generation, cleaning_events, config))
}

pub fn run(
    sensor: &RawTable,
    generation: &RawTable,
    cleaning_events: &[CleaningEvent],
    config: &AnalysisConfig,
) -> Result<Report> {
    config.validate()?;

    let sensor = normalize::normalize_sensor(sensor, config)?;
    let generation = normalize::normalize_generation(generation, config)?;
    tracing::info!(
        "normalized {} sensor and {} generation rows",
        sensor.len(),
        generation.len()
    );

    run_samples(&sensor, &generation, cleaning_events, config)
}

/// Pipeline over already-normalized series.
pub fn run_samples(
    sensor: &[SensorSample],
    generation: &[GenerationSample],
    cleaning_events: &[CleaningEvent],
    config: &AnalysisConfig,
) -> Result<Report> {
    config.validate()?;

    let merged = merge::merge(sensor, generation, config)?;
    let records = performance::evaluate_all(&merged.intervals, config);
    let valid_interval_count = records.iter().filter(|record| record.valid).count();
    let daily = performance::aggregate_daily(&records);

    let mut events = cleaning_events.to_vec();
    events.sort();

    let degradation = degradation::assess(&daily, &events, config);
    let recovery = recovery::analyze(&daily, &events, config);
    let temperature = temperature::analyze(&records, config);
    let irradiance = irradiance::clamp_stats(sensor, config);

    tracing::info!(
        "{} intervals ({} valid) over {} days, soiling loss {:.2}%",
        records.len(),
        valid_interval_count,
        daily.len(),
        degradation.soiling_loss_index
    );

    Ok(report::build_report(ReportInputs {
        config,
        interval_count: records.len(),
        valid_interval_count,
        daily: &daily,
        degradation,
        temperature,
        recovery,
        cleaning_events_count: events.len(),
        irradiance,
        merge: merged.diagnostics,
    }))
}

/// Full daily performance table, without the report window applied.
pub fn daily_performance(
    sensor: &RawTable,
    generation: &RawTable,
    config: &AnalysisConfig,
) -> Result<Vec<DailyAggregate>> {
    config.validate()?;
    let sensor = normalize::normalize_sensor(sensor, config)?;
    let generation = normalize::normalize_generation(generation, config)?;
    let merged = merge::merge(&sensor, &generation, config)?;
    let records = performance::evaluate_all(&merged.intervals, config);
    Ok(performance::aggregate_daily(&records))
}

/// Normalizes and merges only, returning the diagnostics either way.
pub fn merge_check(
    sensor: &RawTable,
    generation: &RawTable,
    config: &AnalysisConfig,
) -> Result<MergeDiagnostics> {
    config.validate()?;
    let sensor = normalize::normalize_sensor(sensor, config)?;
    let generation = normalize::normalize_generation(generation, config)?;

    match merge::merge(&sensor, &generation, config) {
        Ok(outcome) => Ok(outcome.diagnostics),
        Err(Error::NoOverlap { diagnostics }) => Ok(*diagnostics),
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MergeFailure;
    use chrono::{Duration, NaiveDate, NaiveDateTime};

    const SENSOR_HEADERS: [&str; 4] = ["Timestamp", "Temperature (°C)", "Humidity (%)", "Lux"];
    const GENERATION_HEADERS: [&str; 5] = [
        "Site name",
        "Generation date",
        "Time period",
        "Electricity unit price (QAR/kWh)",
        "Electricity generation (kWh)",
    ];

    fn day_start(month: u32, day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, month, day).unwrap().and_hms_opt(0, 0, 0).unwrap()
    }

    /// Per-minute sensor rows between 09:00 and 14:00 at constant light.
    fn sensor_rows(days: &[NaiveDateTime], lux: f64) -> Vec<Vec<String>> {
        days.iter()
            .flat_map(|day| {
                (9 * 60..14 * 60).map(move |minute| {
                    let ts = *day + Duration::minutes(minute);
                    vec![
                        ts.format("%m/%d/%Y %H:%M").to_string(),
                        "25".to_string(),
                        "35".to_string(),
                        lux.to_string(),
                    ]
                })
            })
            .collect()
    }

    /// Half-hourly generation rows between 09:00 and 14:00.
    fn generation_rows(days: &[(NaiveDateTime, f64)]) -> Vec<Vec<String>> {
        days.iter()
            .flat_map(|(day, kwh)| {
                (18..28).map(move |slot| {
                    let ts = *day + Duration::minutes(30 * slot);
                    vec![
                        "Roof".to_string(),
                        ts.format("%Y-%m-%d").to_string(),
                        ts.format("%H:%M").to_string(),
                        "0.22".to_string(),
                        kwh.to_string(),
                    ]
                })
            })
            .collect()
    }

    fn table(headers: &[&str], rows: Vec<Vec<String>>) -> RawTable {
        RawTable::new(headers.iter().map(|h| h.to_string()).collect(), rows)
    }

    #[test]
    fn constant_stc_output_has_unit_ratio_and_no_loss() {
        let days: Vec<NaiveDateTime> = (1..=5).map(|d| day_start(6, d)).collect();
        let sensor = table(&SENSOR_HEADERS, sensor_rows(&days, 165_000.0));
        let generation = table(
            &GENERATION_HEADERS,
            generation_rows(&days.iter().map(|d| (*d, 5.0)).collect::<Vec<_>>()),
        );

        let response = analyze(&sensor, &generation, &[], &AnalysisConfig::default());
        assert!(response.success, "{:?}", response.message);
        let report = response.report.unwrap();

        assert_eq!(report.summary.interval_count, 35);
        assert_eq!(report.daily_data.len(), 5);
        for day in &report.daily_data {
            assert!((day.daily_pr - 1.0).abs() < 1e-9);
            assert!((day.performance_ratio - 1.0).abs() < 1e-9);
        }
        assert!((report.degradation.baseline_pr - 1.0).abs() < 1e-9);
        assert!((report.degradation.current_pr - 1.0).abs() < 1e-9);
        assert_eq!(report.degradation.degradation_percent, 0.0);
        assert_eq!(report.degradation.recommended_interval_days, 14);
        assert_eq!(report.irradiance.clamped, 0);
        assert!((report.summary.overall_pr_percent - 100.0).abs() < 1e-6);
    }

    #[test]
    fn cleaning_event_shows_recovery() {
        let before: Vec<NaiveDateTime> = (1..=3).map(|d| day_start(6, d)).collect();
        let after: Vec<NaiveDateTime> = (5..=7).map(|d| day_start(6, d)).collect();
        let all: Vec<NaiveDateTime> = before.iter().chain(after.iter()).copied().collect();

        // 600 W/m² on 10 kWp gives 3 kWh per half hour
        let sensor = table(&SENSOR_HEADERS, sensor_rows(&all, 99_000.0));
        let mut generation_days: Vec<(NaiveDateTime, f64)> =
            before.iter().map(|d| (*d, 2.1)).collect();
        generation_days.extend(after.iter().map(|d| (*d, 2.52)));
        let generation = table(&GENERATION_HEADERS, generation_rows(&generation_days));
        let cleanings = normalize::parse_cleaning_dates("2025-06-04\n");

        let config = AnalysisConfig::default();
        let report = run(&sensor, &generation, &cleanings, &config).unwrap();

        assert_eq!(report.cleaning_events_count, 1);
        assert_eq!(report.cleaning_recovery.len(), 1);
        let recovery = &report.cleaning_recovery[0];
        assert!((recovery.pr_before - 0.70).abs() < 1e-6);
        assert!((recovery.pr_after - 0.84).abs() < 1e-6);
        assert!((recovery.recovery_percent - 20.0).abs() < 1e-4);

        assert_eq!(
            report.degradation.baseline_date,
            NaiveDate::from_ymd_opt(2025, 6, 4)
        );
        assert!((report.degradation.baseline_pr - 0.84).abs() < 1e-6);
        assert!(report.degradation.degradation_percent < 1e-6);
    }

    #[test]
    fn disjoint_uploads_fail_with_structured_diagnostics() {
        let sensor = table(&SENSOR_HEADERS, sensor_rows(&[day_start(1, 15)], 99_000.0));
        let generation_days = [(day_start(2, 15), 2.0)];
        let generation = table(&GENERATION_HEADERS, generation_rows(&generation_days));

        let response = analyze(&sensor, &generation, &[], &AnalysisConfig::default());

        assert!(!response.success);
        assert!(response.report.is_none());
        assert_eq!(response.error_kind, Some(ErrorKind::NoOverlap));
        let diagnostics = response.diagnostics.unwrap();
        assert_eq!(diagnostics.failure, Some(MergeFailure::DisjointRanges));
        assert!(diagnostics.sensor_range.is_some());
        assert!(diagnostics.generation_range.is_some());
        assert!(response.message.unwrap().contains("do not overlap"));
    }

    #[test]
    fn invalid_configuration_is_rejected_before_parsing() {
        let config = AnalysisConfig {
            capacity_kwp: 0.0,
            ..AnalysisConfig::default()
        };
        let response = analyze(&RawTable::default(), &RawTable::default(), &[], &config);
        assert!(!response.success);
        assert_eq!(response.error_kind, Some(ErrorKind::Configuration));
    }

    #[test]
    fn unrecognised_columns_are_malformed_input() {
        let sensor = table(&["when", "value"], vec![vec!["x".into(), "1".into()]]);
        let config = AnalysisConfig::default();
        let response = analyze(&sensor, &RawTable::default(), &[], &config);
        assert_eq!(response.error_kind, Some(ErrorKind::MalformedInput));
        assert!(response.diagnostics.is_none());
        assert_eq!(
            response.input_diagnostics,
            Some(InputDiagnostics::MissingColumn {
                table: "sensor".to_string(),
                role: "timestamp".to_string(),
                headers: vec!["when".to_string(), "value".to_string()],
            })
        );
    }

    #[test]
    fn unparseable_timestamps_carry_the_offending_value() {
        let sensor = table(
            &SENSOR_HEADERS,
            vec![
                vec!["soon".into(), "25".into(), "35".into(), "1000".into()],
                vec!["later".into(), "25".into(), "35".into(), "1000".into()],
            ],
        );
        let config = AnalysisConfig::default();
        let response = analyze(&sensor, &RawTable::default(), &[], &config);

        assert_eq!(response.error_kind, Some(ErrorKind::MalformedInput));
        assert_eq!(
            response.input_diagnostics,
            Some(InputDiagnostics::MalformedTimestamp {
                column: "Timestamp".to_string(),
                rows: 2,
                sample: Some("soon".to_string()),
            })
        );
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["input_diagnostics"]["problem"], "malformed_timestamp");
    }

    #[test]
    fn dim_days_still_produce_a_report() {
        let days = [day_start(6, 1), day_start(6, 2)];
        // 30 W/m², below the validity threshold
        let sensor = table(&SENSOR_HEADERS, sensor_rows(&days, 4_950.0));
        let generation = table(
            &GENERATION_HEADERS,
            generation_rows(&days.iter().map(|d| (*d, 0.1)).collect::<Vec<_>>()),
        );

        let report = run(&sensor, &generation, &[], &AnalysisConfig::default()).unwrap();
        assert_eq!(report.summary.interval_count, 14);
        assert_eq!(report.summary.valid_interval_count, 0);
        assert!(report.daily_data.is_empty());
        assert!(report.summary.data_range.is_none());
        assert_eq!(report.degradation.days_to_90_percent, None);
        assert_eq!(report.degradation.recommended_interval_days, 14);
        assert!(report.temperature_analysis.is_none());
    }

    #[test]
    fn daily_performance_is_not_windowed() {
        let days: Vec<NaiveDateTime> = (0..120)
            .map(|d| day_start(1, 1) + Duration::days(d))
            .collect();
        let sensor = table(&SENSOR_HEADERS, sensor_rows(&days, 99_000.0));
        let generation = table(
            &GENERATION_HEADERS,
            generation_rows(&days.iter().map(|d| (*d, 2.7)).collect::<Vec<_>>()),
        );
        let config = AnalysisConfig::default();

        let daily = daily_performance(&sensor, &generation, &config).unwrap();
        assert_eq!(daily.len(), 120);
        assert!((daily[0].daily_pr - 0.9).abs() < 1e-6);

        let report = run(&sensor, &generation, &[], &config).unwrap();
        assert_eq!(report.daily_data.len(), 30);
        assert_eq!(report.summary.data_range.unwrap().days, 120);
    }

    #[test]
    fn merge_check_returns_diagnostics_on_failure() {
        let sensor = table(&SENSOR_HEADERS, sensor_rows(&[day_start(1, 15)], 99_000.0));
        let generation_days = [(day_start(2, 15), 2.0)];
        let generation = table(&GENERATION_HEADERS, generation_rows(&generation_days));
        let config = AnalysisConfig::default();
        let diagnostics = merge_check(&sensor, &generation, &config).unwrap();
        assert_eq!(diagnostics.failure, Some(MergeFailure::DisjointRanges));
        assert_eq!(diagnostics.sensor_rows, 300);
    }
}
