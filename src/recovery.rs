use chrono::Duration;

use crate::config::AnalysisConfig;
use crate::models::{CleaningEvent, CleaningRecovery, DailyAggregate};

fn window_means(rows: &[&DailyAggregate]) -> Option<(f64, f64)> {
    if rows.is_empty() {
        return None;
    }
    let n = rows.len() as f64;
    let pr = rows.iter().map(|row| row.daily_pr).sum::<f64>() / n;
    let kwh = rows.iter().map(|row| row.actual_kwh).sum::<f64>() / n;
    Some((pr, kwh))
}

/// PR change across each cleaning, comparing the days just before and after.
///
/// Events without daily rows on both sides are left out rather than reported
/// as a zero recovery.
pub fn analyze(
    daily: &[DailyAggregate],
    cleaning_events: &[CleaningEvent],
    config: &AnalysisConfig,
) -> Vec<CleaningRecovery> {
    let span = Duration::days(config.recovery_days as i64);

    cleaning_events
        .iter()
        .filter_map(|event| {
            let date = event.date();
            let before: Vec<&DailyAggregate> = daily
                .iter()
                .filter(|row| row.date >= date - span && row.date < date)
                .collect();
            let after: Vec<&DailyAggregate> = daily
                .iter()
                .filter(|row| row.date > date && row.date <= date + span)
                .collect();

            let (Some((pr_before, kwh_before)), Some((pr_after, kwh_after))) =
                (window_means(&before), window_means(&after))
            else {
                tracing::debug!("cleaning on {} skipped, not enough surrounding data", date);
                return None;
            };

            Some(CleaningRecovery {
                cleaning_date: event.timestamp,
                pr_before,
                pr_after,
                recovery_percent: if pr_before > 0.0 {
                    (pr_after - pr_before) / pr_before * 100.0
                } else {
                    0.0
                },
                kwh_before_avg: kwh_before,
                kwh_after_avg: kwh_after,
                days_before: before.len(),
                days_after: after.len(),
            })
        })
        .collect()
}
