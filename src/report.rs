use std::fmt::Write;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::config::AnalysisConfig;
use crate::models::{
    CleaningRecovery, DailyAggregate, DegradationAssessment, IrradianceStats, MergeDiagnostics,
    TemperatureAnalysis,
};

/// Full daily table is embedded up to this many days
const FULL_DAILY_LIMIT: usize = 100;
/// Otherwise only the most recent days are kept
const RECENT_DAILY_WINDOW: usize = 30;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub days: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub data_range: Option<DataRange>,
    pub interval_count: usize,
    pub valid_interval_count: usize,
    pub total_generation_kwh: f64,
    pub total_theoretical_kwh: f64,
    pub avg_daily_kwh: f64,
    pub avg_daily_theoretical_kwh: f64,
    pub overall_pr_percent: f64,
    pub total_revenue: f64,
    pub system_capacity_kwp: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub config: AnalysisConfig,
    pub summary: Summary,
    pub degradation: DegradationAssessment,
    pub temperature_analysis: Option<TemperatureAnalysis>,
    pub cleaning_recovery: Vec<CleaningRecovery>,
    pub cleaning_events_count: usize,
    pub irradiance: IrradianceStats,
    pub merge: MergeDiagnostics,
    pub recommendations: Vec<String>,
    pub daily_data: Vec<DailyAggregate>,
}

/// Everything the assembler needs from one run.
pub struct ReportInputs<'a> {
    pub config: &'a AnalysisConfig,
    pub interval_count: usize,
    pub valid_interval_count: usize,
    pub daily: &'a [DailyAggregate],
    pub degradation: DegradationAssessment,
    pub temperature: Option<TemperatureAnalysis>,
    pub recovery: Vec<CleaningRecovery>,
    pub cleaning_events_count: usize,
    pub irradiance: IrradianceStats,
    pub merge: MergeDiagnostics,
}

/// Point of the daily PR chart
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendPoint {
    pub date: NaiveDate,
    pub daily_pr_percent: f64,
    pub actual_kwh: f64,
    pub theoretical_kwh: f64,
    pub avg_temp: f64,
    pub avg_irradiance: f64,
}

pub fn summarize(
    daily: &[DailyAggregate],
    interval_count: usize,
    valid_interval_count: usize,
    config: &AnalysisConfig,
) -> Summary {
    let total_actual: f64 = daily.iter().map(|day| day.actual_kwh).sum();
    let total_theoretical: f64 = daily.iter().map(|day| day.theoretical_kwh).sum();
    let days = daily.len();

    Summary {
        data_range: match (daily.first(), daily.last()) {
            (Some(first), Some(last)) => Some(DataRange {
                start: first.date,
                end: last.date,
                days,
            }),
            _ => None,
        },
        interval_count,
        valid_interval_count,
        total_generation_kwh: total_actual,
        total_theoretical_kwh: total_theoretical,
        avg_daily_kwh: if days == 0 { 0.0 } else { total_actual / days as f64 },
        avg_daily_theoretical_kwh: if days == 0 {
            0.0
        } else {
            total_theoretical / days as f64
        },
        overall_pr_percent: if total_theoretical > 0.0 {
            total_actual / total_theoretical * 100.0
        } else {
            0.0
        },
        total_revenue: daily.iter().map(|day| day.revenue).sum(),
        system_capacity_kwp: config.capacity_kwp,
    }
}

pub fn recommendations(
    degradation: &DegradationAssessment,
    irradiance: &IrradianceStats,
    config: &AnalysisConfig,
) -> Vec<String> {
    let mut lines = Vec::new();

    let status = match degradation.degradation_percent {
        loss if loss >= 15.0 => "URGENT: clean panels immediately, 15%+ performance loss detected",
        loss if loss >= 10.0 => "RECOMMENDED: schedule cleaning soon, 10%+ performance loss",
        loss if loss >= 5.0 => "MONITORING: performance declining, watch the trend",
        _ => "GOOD: panels performing well",
    };
    lines.push(status.to_string());

    if let Some(days) = degradation.days_to_90_percent.filter(|days| *days > 0) {
        lines.push(format!("Optimal cleaning interval: every {} days", days));
    }

    if degradation.degradation_rate_per_day > 0.0 {
        lines.push(format!(
            "Degradation rate: {:.2}%/day",
            degradation.degradation_rate_per_day
        ));
    }

    if irradiance.samples > 0 && irradiance.clamped_fraction > config.clamp_warning_fraction {
        lines.push(format!(
            "CALIBRATION: {:.1}% of light readings hit the {} W/m² ceiling, \
             check the light-to-irradiance factor ({})",
            irradiance.clamped_fraction * 100.0,
            config.max_irradiance,
            config.light_to_irradiance
        ));
    }

    lines
}

/// Keeps the whole table for short runs, the most recent days otherwise.
pub fn daily_window(daily: &[DailyAggregate]) -> Vec<DailyAggregate> {
    if daily.len() <= FULL_DAILY_LIMIT {
        daily.to_vec()
    } else {
        daily[daily.len() - RECENT_DAILY_WINDOW..].to_vec()
    }
}

pub fn pr_trend(daily: &[DailyAggregate]) -> Vec<TrendPoint> {
    daily
        .iter()
        .map(|day| TrendPoint {
            date: day.date,
            daily_pr_percent: day.daily_pr * 100.0,
            actual_kwh: day.actual_kwh,
            theoretical_kwh: day.theoretical_kwh,
            avg_temp: day.temperature,
            avg_irradiance: day.irradiance,
        })
        .collect()
}

pub fn build_report(inputs: ReportInputs<'_>) -> Report {
    let summary = summarize(
        inputs.daily,
        inputs.interval_count,
        inputs.valid_interval_count,
        inputs.config,
    );
    let recommendations =
        recommendations(&inputs.degradation, &inputs.irradiance, inputs.config);

    Report {
        id: Uuid::new_v4(),
        generated_at: Utc::now(),
        config: inputs.config.clone(),
        summary,
        degradation: inputs.degradation,
        temperature_analysis: inputs.temperature,
        cleaning_recovery: inputs.recovery,
        cleaning_events_count: inputs.cleaning_events_count,
        irradiance: inputs.irradiance,
        merge: inputs.merge,
        recommendations,
        daily_data: daily_window(inputs.daily),
    }
}

fn days_label(days: Option<u32>) -> String {
    days.map(|d| format!("~{d} days"))
        .unwrap_or_else(|| "indeterminate".to_string())
}

pub fn render_markdown(report: &Report) -> String {
    let mut output = String::new();
    let summary = &report.summary;
    let degradation = &report.degradation;

    let _ = writeln!(output, "# Solar Panel Cleaning Analysis");
    let _ = writeln!(
        output,
        "Report {} generated {}",
        report.id,
        report.generated_at.format("%Y-%m-%d %H:%M UTC")
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Summary");

    match &summary.data_range {
        Some(range) => {
            let _ = writeln!(
                output,
                "- Data range: {} to {} ({} days, {} intervals)",
                range.start, range.end, range.days, summary.interval_count
            );
        }
        None => {
            let _ = writeln!(output, "- No valid days in the analysed window.");
        }
    }
    let _ = writeln!(output, "- System capacity: {} kWp", summary.system_capacity_kwp);
    let _ = writeln!(
        output,
        "- Generation: {:.2} kWh actual vs {:.2} kWh theoretical ({:.2} kWh/day)",
        summary.total_generation_kwh, summary.total_theoretical_kwh, summary.avg_daily_kwh
    );
    let _ = writeln!(output, "- Overall PR: {:.1}%", summary.overall_pr_percent);
    let _ = writeln!(output, "- Revenue: {:.2}", summary.total_revenue);

    let _ = writeln!(output);
    let _ = writeln!(output, "## Degradation");
    if let Some(date) = degradation.baseline_date {
        let _ = writeln!(output, "- Baseline from: {}", date);
    }
    let _ = writeln!(output, "- Baseline PR: {:.1}%", degradation.baseline_pr * 100.0);
    let _ = writeln!(output, "- Current PR: {:.1}%", degradation.current_pr * 100.0);
    let _ = writeln!(
        output,
        "- Soiling loss index: {:.2}%",
        degradation.soiling_loss_index
    );
    let _ = writeln!(
        output,
        "- Degradation rate: {:.3}%/day over {} days",
        degradation.degradation_rate_per_day, degradation.days_since_baseline
    );
    for (capacity, days) in [
        (95, degradation.days_to_95_percent),
        (90, degradation.days_to_90_percent),
        (85, degradation.days_to_85_percent),
        (80, degradation.days_to_80_percent),
    ] {
        let _ = writeln!(output, "- {}% capacity in: {}", capacity, days_label(days));
    }
    let _ = writeln!(
        output,
        "- Recommended cleaning interval: every {} days",
        degradation.recommended_interval_days
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## Temperature");
    match &report.temperature_analysis {
        Some(temp) => {
            let _ = writeln!(
                output,
                "- Measured coefficient: {:.3}%/°C (expected {:.3}%/°C, {} bins)",
                temp.measured_coefficient, temp.expected_coefficient, temp.bins_used
            );
            let _ = writeln!(
                output,
                "- Cell temperature: avg {:.1}°C, max {:.1}°C",
                temp.avg_cell_temp, temp.max_cell_temp
            );
            let _ = writeln!(
                output,
                "- Ambient temperature: avg {:.1}°C, max {:.1}°C",
                temp.avg_ambient_temp, temp.max_ambient_temp
            );
        }
        None => {
            let _ = writeln!(output, "No valid intervals for temperature analysis.");
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Cleaning Recovery");
    if report.cleaning_recovery.is_empty() {
        let _ = writeln!(
            output,
            "No measurable cleaning events ({} recorded).",
            report.cleaning_events_count
        );
    } else {
        for recovery in &report.cleaning_recovery {
            let _ = writeln!(
                output,
                "- {}: PR {:.1}% -> {:.1}% ({:+.1}%)",
                recovery.cleaning_date.format("%Y-%m-%d"),
                recovery.pr_before * 100.0,
                recovery.pr_after * 100.0,
                recovery.recovery_percent
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Recommendations");
    for line in &report.recommendations {
        let _ = writeln!(output, "- {}", line);
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Daily Performance");
    if report.daily_data.is_empty() {
        let _ = writeln!(output, "No valid days.");
    } else {
        let _ = writeln!(
            output,
            "| Date | PR % | Actual kWh | Theoretical kWh | Temp °C | Irradiance W/m² |"
        );
        let _ = writeln!(output, "|---|---|---|---|---|---|");
        for point in pr_trend(&report.daily_data) {
            let _ = writeln!(
                output,
                "| {} | {:.1} | {:.2} | {:.2} | {:.1} | {:.0} |",
                point.date,
                point.daily_pr_percent,
                point.actual_kwh,
                point.theoretical_kwh,
                point.avg_temp,
                point.avg_irradiance
            );
        }
    }

    output
}
