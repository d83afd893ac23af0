use crate::domain::models::{CompletionMarker, FocusMetricBucket, FocusSession, HabitMetrics};
use chrono::{DateTime, Datelike, Days, NaiveDate, Utc};
use std::collections::BTreeSet;

/// Sum of per-session durations in whole minutes. No rounding beyond
/// the difference computation itself.
pub fn total_focused_minutes(sessions: &[FocusSession]) -> i64 {
    sessions
        .iter()
        .map(|session| (session.time_to - session.time_from).num_minutes())
        .sum()
}

/// Derived month view over the focus metric buckets: total cycle count
/// plus the set of days carrying at least one completed cycle.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MonthFocusSummary {
    pub cycle_count: u32,
    pub marked_dates: BTreeSet<NaiveDate>,
}

impl MonthFocusSummary {
    pub fn is_marked(&self, day: NaiveDate) -> bool {
        self.marked_dates.contains(&day)
    }
}

pub fn summarize_focus_month(buckets: &[FocusMetricBucket]) -> MonthFocusSummary {
    let mut summary = MonthFocusSummary::default();
    for bucket in buckets {
        // A bucket the server keyed with an impossible day is dropped
        // rather than failing the whole view.
        let Some(date) = bucket.as_date() else {
            continue;
        };
        summary.marked_dates.insert(date);
        summary.cycle_count += bucket.count;
    }
    summary
}

/// Per-habit month view: `completed/month_days` and an integer percent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HabitMonthSummary {
    pub completed_count: u32,
    pub month_days: u32,
}

impl HabitMonthSummary {
    pub fn ratio_label(&self) -> String {
        format!("{}/{}", self.completed_count, self.month_days)
    }

    /// round(completed / month_days * 100). A month always has at
    /// least one day, so the division is total.
    pub fn percent(&self) -> u32 {
        ((self.completed_count as f64 / self.month_days as f64) * 100.0).round() as u32
    }

    pub fn percent_label(&self) -> String {
        format!("{}%", self.percent())
    }
}

pub fn summarize_habit_month(metrics: &HabitMetrics, month: NaiveDate) -> HabitMonthSummary {
    let completed_count = metrics
        .completed_dates
        .iter()
        .filter(|date| {
            let day = date.date_naive();
            day.year() == month.year() && day.month() == month.month()
        })
        .count() as u32;

    HabitMonthSummary {
        completed_count,
        month_days: days_in_month(month),
    }
}

pub fn days_in_month(month: NaiveDate) -> u32 {
    let first = month.with_day(1).unwrap_or(month);
    let next_month = first
        .checked_add_days(Days::new(32))
        .and_then(|date| date.with_day(1));
    match next_month {
        Some(next) => next.signed_duration_since(first).num_days() as u32,
        None => 31,
    }
}

/// Projects raw completion instants onto calendar-day markers, the
/// uniform shape calendar decoration consumes for both habits and
/// focus cycles.
pub fn completion_markers(dates: &[DateTime<Utc>]) -> BTreeSet<CompletionMarker> {
    dates
        .iter()
        .map(|date| CompletionMarker::from_instant(*date))
        .collect()
}
