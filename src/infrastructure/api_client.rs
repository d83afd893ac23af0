use crate::domain::models::{FocusMetricBucket, FocusSession, Habit, HabitMetrics, UserData};
use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use std::time::Duration;
use url::Url;

#[async_trait]
pub trait AuthGateway: Send + Sync {
    /// `GET /auth`: returns the GitHub authorization redirect URL.
    async fn login_redirect(&self) -> Result<String, InfraError>;

    /// `GET /auth/callback?code=`: exchanges an OAuth code for the
    /// account identity plus API token.
    async fn exchange_code(&self, code: &str) -> Result<UserData, InfraError>;
}

#[async_trait]
pub trait HabitGateway: Send + Sync {
    async fn list_habits(&self, token: &str) -> Result<Vec<Habit>, InfraError>;

    async fn create_habit(&self, token: &str, name: &str) -> Result<Habit, InfraError>;

    /// Toggles today's membership in the habit's completed dates.
    async fn toggle_habit(&self, token: &str, habit_id: &str) -> Result<(), InfraError>;

    async fn delete_habit(&self, token: &str, habit_id: &str) -> Result<(), InfraError>;

    async fn habit_metrics(
        &self,
        token: &str,
        habit_id: &str,
        month: DateTime<Utc>,
    ) -> Result<HabitMetrics, InfraError>;
}

#[async_trait]
pub trait FocusTimeGateway: Send + Sync {
    async fn list_focus_sessions(
        &self,
        token: &str,
        date: DateTime<Utc>,
    ) -> Result<Vec<FocusSession>, InfraError>;

    /// Persists one closed focus period. Both endpoints are sent at
    /// once; the API never sees an open-ended session.
    async fn create_focus_session(
        &self,
        token: &str,
        time_from: DateTime<Utc>,
        time_to: DateTime<Utc>,
    ) -> Result<FocusSession, InfraError>;

    async fn focus_metrics(
        &self,
        token: &str,
        month: DateTime<Utc>,
    ) -> Result<Vec<FocusMetricBucket>, InfraError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestApiClient {
    client: Client,
    base_url: Url,
}

#[derive(Debug, serde::Deserialize)]
struct LoginRedirectResponse {
    #[serde(rename = "redirectUrl")]
    redirect_url: String,
}

#[derive(Debug, serde::Serialize)]
struct CreateHabitRequest<'a> {
    name: &'a str,
}

#[derive(Debug, serde::Serialize)]
struct CreateFocusSessionRequest {
    #[serde(rename = "timeFrom")]
    time_from: String,
    #[serde(rename = "timeTo")]
    time_to: String,
}

impl ReqwestApiClient {
    pub fn new(base_url: &str, timeout_seconds: u64) -> Result<Self, InfraError> {
        let base_url = Url::parse(base_url)
            .map_err(|error| InfraError::InvalidConfig(format!("invalid api base url: {error}")))?;
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .map_err(|error| InfraError::Network(format!("failed building http client: {error}")))?;
        Ok(Self { client, base_url })
    }

    fn ensure_non_empty(value: &str, field: &str) -> Result<(), InfraError> {
        if value.trim().is_empty() {
            return Err(InfraError::InvalidConfig(format!(
                "{field} must not be empty"
            )));
        }
        Ok(())
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, InfraError> {
        let mut url = self.base_url.clone();
        {
            let mut parts = url
                .path_segments_mut()
                .map_err(|_| InfraError::InvalidConfig("api base URL cannot be a base".to_string()))?;
            for segment in segments {
                parts.push(segment);
            }
        }
        Ok(url)
    }

    fn api_http_error(status: reqwest::StatusCode, body: &str) -> InfraError {
        let message = if body.trim().is_empty() {
            "empty response body".to_string()
        } else {
            body.trim().to_string()
        };
        InfraError::Api {
            status: status.as_u16(),
            message,
        }
    }

    async fn read_body(
        response: reqwest::Response,
        context: &str,
    ) -> Result<(reqwest::StatusCode, String), InfraError> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| InfraError::Network(format!("failed reading {context} response: {error}")))?;
        Ok((status, body))
    }

    fn parse_payload<T: serde::de::DeserializeOwned>(
        status: reqwest::StatusCode,
        body: &str,
        context: &str,
    ) -> Result<T, InfraError> {
        if !status.is_success() {
            return Err(Self::api_http_error(status, body));
        }
        serde_json::from_str::<T>(body).map_err(|error| InfraError::Api {
            status: status.as_u16(),
            message: format!("invalid {context} payload: {error}; body={body}"),
        })
    }

    fn check_status(status: reqwest::StatusCode, body: &str) -> Result<(), InfraError> {
        if !status.is_success() {
            return Err(Self::api_http_error(status, body));
        }
        Ok(())
    }
}

#[async_trait]
impl AuthGateway for ReqwestApiClient {
    async fn login_redirect(&self) -> Result<String, InfraError> {
        let endpoint = self.endpoint(&["auth"])?;
        let response = self
            .client
            .get(endpoint)
            .send()
            .await
            .map_err(|error| InfraError::Network(format!("network error while requesting login: {error}")))?;

        let (status, body) = Self::read_body(response, "login redirect").await?;
        let parsed: LoginRedirectResponse = Self::parse_payload(status, &body, "login redirect")?;
        Ok(parsed.redirect_url)
    }

    async fn exchange_code(&self, code: &str) -> Result<UserData, InfraError> {
        Self::ensure_non_empty(code, "authorization code")?;

        let endpoint = self.endpoint(&["auth", "callback"])?;
        let response = self
            .client
            .get(endpoint)
            .query(&[("code", code.trim())])
            .send()
            .await
            .map_err(|error| InfraError::Network(format!("network error while exchanging code: {error}")))?;

        let (status, body) = Self::read_body(response, "code exchange").await?;
        let user: UserData = Self::parse_payload(status, &body, "code exchange")?;
        user.validate().map_err(InfraError::Auth)?;
        Ok(user)
    }
}

#[async_trait]
impl HabitGateway for ReqwestApiClient {
    async fn list_habits(&self, token: &str) -> Result<Vec<Habit>, InfraError> {
        Self::ensure_non_empty(token, "token")?;

        let endpoint = self.endpoint(&["habit"])?;
        let response = self
            .client
            .get(endpoint)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|error| InfraError::Network(format!("network error while listing habits: {error}")))?;

        let (status, body) = Self::read_body(response, "habit list").await?;
        Self::parse_payload(status, &body, "habit list")
    }

    async fn create_habit(&self, token: &str, name: &str) -> Result<Habit, InfraError> {
        Self::ensure_non_empty(token, "token")?;
        Self::ensure_non_empty(name, "habit name")?;

        let endpoint = self.endpoint(&["habit"])?;
        let response = self
            .client
            .post(endpoint)
            .bearer_auth(token)
            .json(&CreateHabitRequest { name: name.trim() })
            .send()
            .await
            .map_err(|error| InfraError::Network(format!("network error while creating habit: {error}")))?;

        let (status, body) = Self::read_body(response, "habit create").await?;
        Self::parse_payload(status, &body, "habit create")
    }

    async fn toggle_habit(&self, token: &str, habit_id: &str) -> Result<(), InfraError> {
        Self::ensure_non_empty(token, "token")?;
        Self::ensure_non_empty(habit_id, "habit id")?;

        let endpoint = self.endpoint(&["habit", habit_id, "toggle"])?;
        let response = self
            .client
            .patch(endpoint)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|error| InfraError::Network(format!("network error while toggling habit: {error}")))?;

        let (status, body) = Self::read_body(response, "habit toggle").await?;
        Self::check_status(status, &body)
    }

    async fn delete_habit(&self, token: &str, habit_id: &str) -> Result<(), InfraError> {
        Self::ensure_non_empty(token, "token")?;
        Self::ensure_non_empty(habit_id, "habit id")?;

        let endpoint = self.endpoint(&["habit", habit_id])?;
        let response = self
            .client
            .delete(endpoint)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|error| InfraError::Network(format!("network error while deleting habit: {error}")))?;

        let (status, body) = Self::read_body(response, "habit delete").await?;
        Self::check_status(status, &body)
    }

    async fn habit_metrics(
        &self,
        token: &str,
        habit_id: &str,
        month: DateTime<Utc>,
    ) -> Result<HabitMetrics, InfraError> {
        Self::ensure_non_empty(token, "token")?;
        Self::ensure_non_empty(habit_id, "habit id")?;

        let endpoint = self.endpoint(&["habit", habit_id, "metrics"])?;
        let response = self
            .client
            .get(endpoint)
            .bearer_auth(token)
            .query(&[("date", month.to_rfc3339())])
            .send()
            .await
            .map_err(|error| InfraError::Network(format!("network error while loading habit metrics: {error}")))?;

        let (status, body) = Self::read_body(response, "habit metrics").await?;
        Self::parse_payload(status, &body, "habit metrics")
    }
}

#[async_trait]
impl FocusTimeGateway for ReqwestApiClient {
    async fn list_focus_sessions(
        &self,
        token: &str,
        date: DateTime<Utc>,
    ) -> Result<Vec<FocusSession>, InfraError> {
        Self::ensure_non_empty(token, "token")?;

        let endpoint = self.endpoint(&["focus-time"])?;
        let response = self
            .client
            .get(endpoint)
            .bearer_auth(token)
            .query(&[("date", date.to_rfc3339())])
            .send()
            .await
            .map_err(|error| InfraError::Network(format!("network error while listing focus sessions: {error}")))?;

        let (status, body) = Self::read_body(response, "focus session list").await?;
        Self::parse_payload(status, &body, "focus session list")
    }

    async fn create_focus_session(
        &self,
        token: &str,
        time_from: DateTime<Utc>,
        time_to: DateTime<Utc>,
    ) -> Result<FocusSession, InfraError> {
        Self::ensure_non_empty(token, "token")?;
        if time_to < time_from {
            return Err(InfraError::InvalidConfig(
                "timeTo must be >= timeFrom".to_string(),
            ));
        }

        let endpoint = self.endpoint(&["focus-time"])?;
        let response = self
            .client
            .post(endpoint)
            .bearer_auth(token)
            .json(&CreateFocusSessionRequest {
                time_from: time_from.to_rfc3339(),
                time_to: time_to.to_rfc3339(),
            })
            .send()
            .await
            .map_err(|error| InfraError::Network(format!("network error while persisting focus session: {error}")))?;

        let (status, body) = Self::read_body(response, "focus session create").await?;
        Self::parse_payload(status, &body, "focus session create")
    }

    async fn focus_metrics(
        &self,
        token: &str,
        month: DateTime<Utc>,
    ) -> Result<Vec<FocusMetricBucket>, InfraError> {
        Self::ensure_non_empty(token, "token")?;

        let endpoint = self.endpoint(&["focus-time", "metrics"])?;
        let response = self
            .client
            .get(endpoint)
            .bearer_auth(token)
            .query(&[("date", month.to_rfc3339())])
            .send()
            .await
            .map_err(|error| InfraError::Network(format!("network error while loading focus metrics: {error}")))?;

        let (status, body) = Self::read_body(response, "focus metrics").await?;
        Self::parse_payload(status, &body, "focus metrics")
    }
}
