use crate::infrastructure::error::InfraError;
use std::fs;
use std::path::Path;

const APP_JSON: &str = "app.json";
const TIMERS_JSON: &str = "timers.json";

const DEFAULT_API_BASE_URL: &str = "http://localhost:3333";
const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStoreBackend {
    Keyring,
    File,
}

/// Retry policy for the focus-session write, the one write whose loss
/// corrupts derived metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionWriteRetry {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

impl Default for SessionWriteRetry {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
        }
    }
}

fn default_files() -> [(&'static str, serde_json::Value); 2] {
    [
        (
            APP_JSON,
            serde_json::json!({
                "schema": 1,
                "appName": "Habitus",
                "apiBaseUrl": DEFAULT_API_BASE_URL,
                "sessionStore": "keyring",
                "requestTimeoutSeconds": DEFAULT_REQUEST_TIMEOUT_SECONDS
            }),
        ),
        (
            TIMERS_JSON,
            serde_json::json!({
                "schema": 1,
                "defaultFocusMinutes": 25,
                "defaultRestMinutes": 5,
                "sessionWrite": {
                    "maxAttempts": 3,
                    "baseDelayMs": 500
                }
            }),
        ),
    ]
}

pub fn ensure_default_configs(config_dir: &Path) -> Result<(), InfraError> {
    for (name, value) in default_files() {
        let path = config_dir.join(name);
        if !path.exists() {
            let formatted = serde_json::to_string_pretty(&value)?;
            fs::write(path, format!("{formatted}\n"))?;
        }
    }
    Ok(())
}

fn read_config(path: &Path) -> Result<serde_json::Value, InfraError> {
    let raw = fs::read_to_string(path)?;
    let parsed: serde_json::Value = serde_json::from_str(&raw)?;
    let schema = parsed
        .get("schema")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| InfraError::InvalidConfig(format!("missing schema in {}", path.display())))?;
    if schema != 1 {
        return Err(InfraError::InvalidConfig(format!(
            "unsupported schema {} in {}",
            schema,
            path.display()
        )));
    }
    Ok(parsed)
}

pub fn read_api_base_url(config_dir: &Path) -> Result<String, InfraError> {
    let app = read_config(&config_dir.join(APP_JSON))?;
    let base_url = app
        .get("apiBaseUrl")
        .and_then(serde_json::Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(DEFAULT_API_BASE_URL);
    Ok(base_url.to_string())
}

pub fn read_request_timeout_seconds(config_dir: &Path) -> Result<u64, InfraError> {
    let app = read_config(&config_dir.join(APP_JSON))?;
    Ok(app
        .get("requestTimeoutSeconds")
        .and_then(serde_json::Value::as_u64)
        .filter(|value| *value > 0)
        .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECONDS))
}

pub fn read_session_store_backend(config_dir: &Path) -> Result<SessionStoreBackend, InfraError> {
    let app = read_config(&config_dir.join(APP_JSON))?;
    let raw = app
        .get("sessionStore")
        .and_then(serde_json::Value::as_str)
        .map(str::trim)
        .unwrap_or("keyring");
    match raw {
        "keyring" => Ok(SessionStoreBackend::Keyring),
        "file" => Ok(SessionStoreBackend::File),
        other => Err(InfraError::InvalidConfig(format!(
            "sessionStore must be \"keyring\" or \"file\", got \"{other}\""
        ))),
    }
}

pub fn read_default_timer_minutes(config_dir: &Path) -> Result<(u32, u32), InfraError> {
    let timers = read_config(&config_dir.join(TIMERS_JSON))?;
    let focus = timers
        .get("defaultFocusMinutes")
        .and_then(serde_json::Value::as_u64)
        .unwrap_or(25) as u32;
    let rest = timers
        .get("defaultRestMinutes")
        .and_then(serde_json::Value::as_u64)
        .unwrap_or(5) as u32;
    Ok((focus, rest))
}

pub fn read_session_write_retry(config_dir: &Path) -> Result<SessionWriteRetry, InfraError> {
    let timers = read_config(&config_dir.join(TIMERS_JSON))?;
    let defaults = SessionWriteRetry::default();
    let Some(section) = timers.get("sessionWrite") else {
        return Ok(defaults);
    };
    let max_attempts = section
        .get("maxAttempts")
        .and_then(serde_json::Value::as_u64)
        .filter(|value| *value > 0)
        .unwrap_or(defaults.max_attempts as u64) as u32;
    let base_delay_ms = section
        .get("baseDelayMs")
        .and_then(serde_json::Value::as_u64)
        .unwrap_or(defaults.base_delay_ms);
    Ok(SessionWriteRetry {
        max_attempts,
        base_delay_ms,
    })
}
