use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Account identity returned by the auth callback and cached in the
/// session store for the lifetime of the login.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserData {
    pub id: String,
    pub name: String,
    pub avatar_url: String,
    pub token: String,
}

impl UserData {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "user.id")?;
        validate_non_empty(&self.token, "user.token")?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Habit {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub completed_dates: Vec<DateTime<Utc>>,
    #[serde(rename = "userId")]
    pub owner_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Habit {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "habit.id")?;
        validate_non_empty(&self.name, "habit.name")?;
        Ok(())
    }

    /// Completion dates are stored at start-of-day granularity; membership
    /// is checked against the calendar day, not the raw instant.
    pub fn is_completed_on(&self, day: NaiveDate) -> bool {
        self.completed_dates
            .iter()
            .any(|date| date.date_naive() == day)
    }
}

/// Per-habit month view: the completion dates the server grouped for the
/// requested month.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HabitMetrics {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub completed_dates: Vec<DateTime<Utc>>,
}

/// One closed focus period. Both endpoints are known at creation time;
/// the client never persists an open-ended session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FocusSession {
    #[serde(rename = "_id")]
    pub id: String,
    pub time_from: DateTime<Utc>,
    pub time_to: DateTime<Utc>,
    #[serde(rename = "userId")]
    pub owner_id: String,
}

impl FocusSession {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "focus_session.id")?;
        if self.time_to < self.time_from {
            return Err("focus_session.time_to must be >= focus_session.time_from".to_string());
        }
        Ok(())
    }
}

/// One bucket of the per-month focus metrics: a calendar day keyed as
/// `[year, month, day]` with the count of sessions closed on that day.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FocusMetricBucket {
    #[serde(rename = "_id")]
    pub day: [u32; 3],
    pub count: u32,
}

impl FocusMetricBucket {
    pub fn as_date(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.day[0] as i32, self.day[1], self.day[2])
    }
}

/// Timer minutes held only in UI memory; zeroed on cancel. A zero value
/// blocks the start action rather than raising an error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimerConfig {
    pub focus_minutes: u32,
    pub rest_minutes: u32,
}

impl TimerConfig {
    pub fn new(focus_minutes: u32, rest_minutes: u32) -> Self {
        Self {
            focus_minutes,
            rest_minutes,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.focus_minutes > 0 && self.rest_minutes > 0
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimerState {
    #[default]
    Paused,
    Focus,
    Rest,
}

impl TimerState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Paused => "paused",
            Self::Focus => "focus",
            Self::Rest => "rest",
        }
    }
}

/// Shared projection over habit completions and focus cycles: anything
/// that decorates a calendar day reduces to this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct CompletionMarker {
    pub date: NaiveDate,
}

impl CompletionMarker {
    pub fn from_instant(instant: DateTime<Utc>) -> Self {
        Self {
            date: instant.date_naive(),
        }
    }
}

fn validate_non_empty(value: &str, field_name: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field_name} must not be empty"));
    }
    Ok(())
}
