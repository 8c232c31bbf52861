use chrono::{Duration, NaiveDate};

use crate::config::AnalysisConfig;
use crate::models::{CleaningEvent, DailyAggregate, DegradationAssessment};

/// Capacity-loss milestones in percent, paired with 95/90/85/80 % capacity
const MILESTONES: [f64; 4] = [5.0, 10.0, 15.0, 20.0];

fn mean_pr<'a>(rows: impl Iterator<Item = &'a DailyAggregate>) -> Option<f64> {
    let (sum, count) = rows.fold((0.0, 0usize), |(sum, count), row| {
        (sum + row.daily_pr, count + 1)
    });
    (count > 0).then(|| sum / count as f64)
}

/// Percent of baseline PR lost, never negative
pub fn soiling_loss_index(baseline_pr: f64, current_pr: f64) -> f64 {
    if baseline_pr <= 0.0 {
        return 0.0;
    }
    ((baseline_pr - current_pr) / baseline_pr * 100.0).max(0.0)
}

/// Days until `loss_percent` is reached at a constant rate; `None` when the
/// rate gives nothing to forecast.
pub fn days_to_loss(loss_percent: f64, rate_per_day: f64) -> Option<u32> {
    if rate_per_day <= 0.0 || !rate_per_day.is_finite() {
        return None;
    }
    Some((loss_percent / rate_per_day).floor().min(u32::MAX as f64) as u32)
}

fn empty_assessment(config: &AnalysisConfig) -> DegradationAssessment {
    DegradationAssessment {
        baseline_date: None,
        baseline_pr: 0.0,
        current_pr: 0.0,
        degradation_percent: 0.0,
        degradation_rate_per_day: 0.0,
        days_since_baseline: 0,
        days_to_95_percent: None,
        days_to_90_percent: None,
        days_to_85_percent: None,
        days_to_80_percent: None,
        recommended_interval_days: config.default_cleaning_interval_days,
        soiling_loss_index: 0.0,
    }
}

/// Baseline-to-now PR comparison anchored at the latest cleaning.
///
/// `daily` must be sorted by date, as produced by `aggregate_daily`.
pub fn assess(
    daily: &[DailyAggregate],
    cleaning_events: &[CleaningEvent],
    config: &AnalysisConfig,
) -> DegradationAssessment {
    let (Some(first), Some(last)) = (daily.first(), daily.last()) else {
        tracing::warn!("no valid daily rows, degradation is indeterminate");
        return empty_assessment(config);
    };

    let anchor: NaiveDate = cleaning_events
        .iter()
        .max()
        .map(CleaningEvent::date)
        .unwrap_or(first.date);
    let baseline_days = config.baseline_days as usize;
    let baseline_end = anchor + Duration::days(config.baseline_days as i64);

    let baseline_pr = mean_pr(
        daily
            .iter()
            .filter(|row| row.date >= anchor && row.date < baseline_end),
    )
    .or_else(|| mean_pr(daily.iter().filter(|row| row.date >= anchor).take(baseline_days)))
    .or_else(|| mean_pr(daily.iter().take(baseline_days)))
    .unwrap_or(0.0);

    let current_days = config.current_days as usize;
    let current_pr = if daily.len() >= current_days {
        mean_pr(daily[daily.len() - current_days..].iter())
    } else {
        Some(last.daily_pr)
    }
    .unwrap_or(0.0);

    let days_since_baseline = (last.date - anchor).num_days().max(0);
    let loss = soiling_loss_index(baseline_pr, current_pr);
    let rate = if days_since_baseline > 0 {
        loss / days_since_baseline as f64
    } else {
        0.0
    };

    let [to_95, to_90, to_85, to_80] =
        MILESTONES.map(|milestone| days_to_loss(milestone, rate));

    tracing::debug!(
        "baseline {:.3} from {}, current {:.3}, loss {:.2}% over {} days",
        baseline_pr,
        anchor,
        current_pr,
        loss,
        days_since_baseline
    );

    DegradationAssessment {
        baseline_date: Some(anchor),
        baseline_pr,
        current_pr,
        degradation_percent: loss,
        degradation_rate_per_day: rate,
        days_since_baseline,
        days_to_95_percent: to_95,
        days_to_90_percent: to_90,
        days_to_85_percent: to_85,
        days_to_80_percent: to_80,
        recommended_interval_days: to_90
            .filter(|days| *days > 0)
            .unwrap_or(config.default_cleaning_interval_days),
        soiling_loss_index: loss,
    }
}
