use crate::application::auth::SessionManager;
use crate::application::bootstrap::bootstrap_workspace;
use crate::application::metrics::{
    completion_markers, summarize_focus_month, summarize_habit_month, total_focused_minutes,
};
use crate::domain::models::{Habit, TimerConfig, UserData};
use crate::infrastructure::api_client::{FocusTimeGateway, HabitGateway, ReqwestApiClient};
use crate::infrastructure::config::{
    read_api_base_url, read_default_timer_minutes, read_request_timeout_seconds,
    read_session_store_backend, read_session_write_retry, SessionStoreBackend, SessionWriteRetry,
};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::session_store::{
    JsonFileSessionStore, KeyringSessionStore, SessionStore,
};
use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub struct AppState {
    config_dir: PathBuf,
    logs_dir: PathBuf,
    session_store: Arc<dyn SessionStore>,
    api: Arc<ReqwestApiClient>,
    retry: SessionWriteRetry,
    default_timers: TimerConfig,
    log_guard: Mutex<()>,
}

impl AppState {
    pub fn new(workspace_root: PathBuf) -> Result<Self, InfraError> {
        let bootstrap = bootstrap_workspace(&workspace_root)?;
        let config_dir = workspace_root.join("config");
        let logs_dir = workspace_root.join("logs");

        let base_url = read_api_base_url(&config_dir)?;
        let timeout_seconds = read_request_timeout_seconds(&config_dir)?;
        let api = Arc::new(ReqwestApiClient::new(&base_url, timeout_seconds)?);

        let session_store: Arc<dyn SessionStore> = match read_session_store_backend(&config_dir)? {
            SessionStoreBackend::Keyring => Arc::new(KeyringSessionStore::default()),
            SessionStoreBackend::File => {
                Arc::new(JsonFileSessionStore::new(&bootstrap.session_file_path))
            }
        };

        let retry = read_session_write_retry(&config_dir)?;
        let (focus_minutes, rest_minutes) = read_default_timer_minutes(&config_dir)?;

        Ok(Self {
            config_dir,
            logs_dir,
            session_store,
            api,
            retry,
            default_timers: TimerConfig::new(focus_minutes, rest_minutes),
            log_guard: Mutex::new(()),
        })
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn api(&self) -> Arc<ReqwestApiClient> {
        Arc::clone(&self.api)
    }

    pub fn session_write_retry(&self) -> SessionWriteRetry {
        self.retry
    }

    pub fn default_timers(&self) -> TimerConfig {
        self.default_timers
    }

    pub fn session_manager(&self) -> SessionManager<dyn SessionStore, ReqwestApiClient> {
        SessionManager::new(Arc::clone(&self.session_store), Arc::clone(&self.api))
    }

    pub fn command_error(&self, command: &str, error: &InfraError) -> String {
        self.log_error(command, &error.to_string());
        error.to_string()
    }

    pub fn log_info(&self, command: &str, message: &str) {
        self.append_log("info", command, message);
    }

    pub fn log_error(&self, command: &str, message: &str) {
        self.append_log("error", command, message);
    }

    fn append_log(&self, level: &str, command: &str, message: &str) {
        let Ok(_guard) = self.log_guard.lock() else {
            return;
        };
        let path = self.logs_dir.join("commands.log");
        let payload = serde_json::json!({
            "timestamp": Utc::now().to_rfc3339(),
            "level": level,
            "command": command,
            "message": message,
        });

        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
            let _ = writeln!(file, "{}", payload);
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionResponse {
    pub id: String,
    pub name: String,
    pub avatar_url: String,
}

impl From<UserData> for SessionResponse {
    fn from(user: UserData) -> Self {
        Self {
            id: user.id,
            name: user.name,
            avatar_url: user.avatar_url,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorization_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<SessionResponse>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HabitItem {
    pub id: String,
    pub name: String,
    pub completed_today: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct HabitMetricsResponse {
    pub id: String,
    pub name: String,
    pub month: String,
    pub completed: String,
    pub percent: String,
    pub marked_dates: Vec<NaiveDate>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FocusDayResponse {
    pub date: NaiveDate,
    pub session_count: usize,
    pub total_minutes: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FocusMonthResponse {
    pub month: String,
    pub cycle_count: u32,
    pub marked_dates: Vec<NaiveDate>,
}

/// Raw minute input coerces to 0 instead of erroring; the start
/// precondition (`minutes > 0`) then blocks the action.
pub fn coerce_minutes(raw: &str) -> u32 {
    raw.trim().parse::<u32>().unwrap_or(0)
}

pub async fn login_impl(state: &AppState, code: Option<String>) -> Result<LoginResponse, InfraError> {
    let manager = state.session_manager();

    if let Some(raw_code) = code {
        let user = manager.authenticate_with_code(&raw_code).await?;
        state.log_info("login", &format!("authenticated user_id={}", user.id));
        return Ok(LoginResponse {
            status: "authenticated".to_string(),
            authorization_url: None,
            user: Some(user.into()),
        });
    }

    let authorization_url = manager.login_url().await?;
    state.log_info("login", "issued authorization url");
    Ok(LoginResponse {
        status: "authorization_required".to_string(),
        authorization_url: Some(authorization_url),
        user: None,
    })
}

pub fn logout_impl(state: &AppState) -> Result<bool, InfraError> {
    let manager = state.session_manager();
    let had_session = manager.current_user()?.is_some();
    manager.logout()?;
    state.log_info("logout", &format!("cleared session (existed={had_session})"));
    Ok(had_session)
}

pub fn whoami_impl(state: &AppState) -> Result<SessionResponse, InfraError> {
    let user = state.session_manager().require_user()?;
    Ok(user.into())
}

pub async fn list_habits_impl(state: &AppState) -> Result<Vec<HabitItem>, InfraError> {
    let user = state.session_manager().require_user()?;
    let habits = state.api.list_habits(&user.token).await?;
    let today = Utc::now().date_naive();

    state.log_info("habit_list", &format!("loaded {} habits", habits.len()));
    Ok(habits
        .into_iter()
        .map(|habit| habit_item(habit, today))
        .collect())
}

pub async fn create_habit_impl(state: &AppState, name: String) -> Result<HabitItem, InfraError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(InfraError::InvalidConfig(
            "habit name must not be empty".to_string(),
        ));
    }

    let user = state.session_manager().require_user()?;
    let habit = state.api.create_habit(&user.token, name).await?;
    state.log_info("habit_add", &format!("created habit_id={}", habit.id));
    Ok(habit_item(habit, Utc::now().date_naive()))
}

pub async fn toggle_habit_impl(state: &AppState, habit_id: String) -> Result<HabitItem, InfraError> {
    let habit_id = habit_id.trim();
    if habit_id.is_empty() {
        return Err(InfraError::InvalidConfig(
            "habit id must not be empty".to_string(),
        ));
    }

    let user = state.session_manager().require_user()?;
    state.api.toggle_habit(&user.token, habit_id).await?;

    // Re-fetch for the updated completion set, as the toggle endpoint
    // returns no body.
    let habits = state.api.list_habits(&user.token).await?;
    let habit = habits
        .into_iter()
        .find(|habit| habit.id == habit_id)
        .ok_or_else(|| InfraError::InvalidConfig(format!("habit not found: {habit_id}")))?;

    state.log_info("habit_toggle", &format!("toggled habit_id={habit_id}"));
    Ok(habit_item(habit, Utc::now().date_naive()))
}

pub async fn delete_habit_impl(state: &AppState, habit_id: String) -> Result<bool, InfraError> {
    let habit_id = habit_id.trim();
    if habit_id.is_empty() {
        return Err(InfraError::InvalidConfig(
            "habit id must not be empty".to_string(),
        ));
    }

    let user = state.session_manager().require_user()?;
    match state.api.delete_habit(&user.token, habit_id).await {
        Ok(()) => {
            state.log_info("habit_remove", &format!("deleted habit_id={habit_id}"));
            Ok(true)
        }
        Err(InfraError::Api { status: 404, .. }) => Ok(false),
        Err(error) => Err(error),
    }
}

pub async fn habit_metrics_impl(
    state: &AppState,
    habit_id: String,
    month: Option<String>,
) -> Result<HabitMetricsResponse, InfraError> {
    let habit_id = habit_id.trim();
    if habit_id.is_empty() {
        return Err(InfraError::InvalidConfig(
            "habit id must not be empty".to_string(),
        ));
    }

    let user = state.session_manager().require_user()?;
    let month = resolve_month(month)?;
    let metrics = state
        .api
        .habit_metrics(&user.token, habit_id, month_start_instant(month))
        .await?;

    let summary = summarize_habit_month(&metrics, month);
    let marked_dates = completion_markers(&metrics.completed_dates)
        .into_iter()
        .map(|marker| marker.date)
        .collect();

    state.log_info(
        "habit_metrics",
        &format!("habit_id={habit_id} month={} {}", month.format("%Y-%m"), summary.ratio_label()),
    );
    Ok(HabitMetricsResponse {
        id: metrics.id,
        name: metrics.name,
        month: month.format("%Y-%m").to_string(),
        completed: summary.ratio_label(),
        percent: summary.percent_label(),
        marked_dates,
    })
}

pub async fn focus_day_impl(
    state: &AppState,
    date: Option<String>,
) -> Result<FocusDayResponse, InfraError> {
    let user = state.session_manager().require_user()?;
    let date = resolve_day(date)?;
    let sessions = state
        .api
        .list_focus_sessions(&user.token, day_start_instant(date))
        .await?;

    let total_minutes = total_focused_minutes(&sessions);
    state.log_info(
        "focus_day",
        &format!("date={date} sessions={} minutes={total_minutes}", sessions.len()),
    );
    Ok(FocusDayResponse {
        date,
        session_count: sessions.len(),
        total_minutes,
    })
}

pub async fn focus_month_impl(
    state: &AppState,
    month: Option<String>,
) -> Result<FocusMonthResponse, InfraError> {
    let user = state.session_manager().require_user()?;
    let month = resolve_month(month)?;
    let buckets = state
        .api
        .focus_metrics(&user.token, month_start_instant(month))
        .await?;

    let summary = summarize_focus_month(&buckets);
    state.log_info(
        "focus_month",
        &format!(
            "month={} cycles={} marked_days={}",
            month.format("%Y-%m"),
            summary.cycle_count,
            summary.marked_dates.len()
        ),
    );
    Ok(FocusMonthResponse {
        month: month.format("%Y-%m").to_string(),
        cycle_count: summary.cycle_count,
        marked_dates: summary.marked_dates.into_iter().collect(),
    })
}

fn habit_item(habit: Habit, today: NaiveDate) -> HabitItem {
    let completed_today = habit.is_completed_on(today);
    HabitItem {
        id: habit.id,
        name: habit.name,
        completed_today,
    }
}

fn resolve_day(date: Option<String>) -> Result<NaiveDate, InfraError> {
    match normalized(date) {
        Some(raw) => NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
            .map_err(|error| InfraError::InvalidConfig(format!("date must be YYYY-MM-DD: {error}"))),
        None => Ok(Utc::now().date_naive()),
    }
}

fn resolve_month(month: Option<String>) -> Result<NaiveDate, InfraError> {
    match normalized(month) {
        Some(raw) => NaiveDate::parse_from_str(&format!("{raw}-01"), "%Y-%m-%d")
            .map_err(|error| InfraError::InvalidConfig(format!("month must be YYYY-MM: {error}"))),
        None => {
            let today = Utc::now().date_naive();
            Ok(today.with_day0(0).unwrap_or(today))
        }
    }
}

fn normalized(value: Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|raw| !raw.is_empty())
        .map(ToOwned::to_owned)
}

fn day_start_instant(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
}

fn month_start_instant(month: NaiveDate) -> DateTime<Utc> {
    day_start_instant(month.with_day0(0).unwrap_or(month))
}
