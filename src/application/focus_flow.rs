use crate::application::timer::{CountdownTimer, NowProvider};
use crate::domain::models::{FocusSession, TimerConfig, TimerState};
use crate::infrastructure::api_client::FocusTimeGateway;
use crate::infrastructure::config::SessionWriteRetry;
use crate::infrastructure::error::InfraError;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

/// What one tick of the flow surfaced to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowEvent {
    Tick,
    /// The focus countdown expired; the open period was closed and
    /// persisted, and the flow moved to Rest.
    FocusEnded { persisted: Option<FocusSession> },
    /// The rest countdown ran out. The flow stays in Rest until the
    /// user resumes or cancels.
    RestFinished,
}

/// PAUSED -> FOCUS -> REST -> FOCUS -> ... state machine driving the two
/// countdown timers and the focus-session writes.
///
/// The session record is persisted before the machine advances to Rest;
/// a failed write leaves the machine in Focus with the open period
/// intact so the transition can be retried.
pub struct FocusFlow<G: FocusTimeGateway> {
    gateway: Arc<G>,
    token: String,
    config: TimerConfig,
    state: TimerState,
    time_from: Option<DateTime<Utc>>,
    focus_timer: CountdownTimer,
    rest_timer: CountdownTimer,
    retry: SessionWriteRetry,
    now_provider: NowProvider,
}

impl<G: FocusTimeGateway> FocusFlow<G> {
    pub fn new(gateway: Arc<G>, token: impl Into<String>, retry: SessionWriteRetry) -> Self {
        Self::with_now_provider(gateway, token, retry, Arc::new(Utc::now))
    }

    pub fn with_now_provider(
        gateway: Arc<G>,
        token: impl Into<String>,
        retry: SessionWriteRetry,
        now_provider: NowProvider,
    ) -> Self {
        Self {
            gateway,
            token: token.into(),
            config: TimerConfig::default(),
            state: TimerState::Paused,
            time_from: None,
            focus_timer: CountdownTimer::with_now_provider(Arc::clone(&now_provider)),
            rest_timer: CountdownTimer::with_now_provider(Arc::clone(&now_provider)),
            retry,
            now_provider,
        }
    }

    pub fn state(&self) -> TimerState {
        self.state
    }

    pub fn config(&self) -> TimerConfig {
        self.config
    }

    pub fn set_config(&mut self, config: TimerConfig) {
        self.config = config;
    }

    /// PAUSED -> FOCUS. Requires both minute values to be positive;
    /// zero values block the start rather than raising a different
    /// error per field.
    pub fn begin_focus(&mut self) -> Result<(), InfraError> {
        if self.state != TimerState::Paused {
            return Err(InfraError::InvalidConfig(
                "timer must be paused before starting focus".to_string(),
            ));
        }
        if !self.config.is_ready() {
            return Err(InfraError::InvalidConfig(
                "focus and rest minutes must be > 0".to_string(),
            ));
        }
        self.enter_focus();
        Ok(())
    }

    /// FOCUS -> REST. Closes the open focus period through the gateway
    /// first; only a successful write advances the state.
    pub async fn start_rest(&mut self) -> Result<Option<FocusSession>, InfraError> {
        if self.state != TimerState::Focus {
            return Err(InfraError::InvalidConfig(
                "rest can only start from focus".to_string(),
            ));
        }
        let persisted = self.close_open_focus().await?;
        self.enter_rest();
        Ok(persisted)
    }

    /// REST -> FOCUS with a fresh open period. Entry carries the same
    /// positive-minutes precondition as `begin_focus`.
    pub fn resume_focus(&mut self) -> Result<(), InfraError> {
        if self.state != TimerState::Rest {
            return Err(InfraError::InvalidConfig(
                "resume is only available during rest".to_string(),
            ));
        }
        if !self.config.is_ready() {
            return Err(InfraError::InvalidConfig(
                "focus and rest minutes must be > 0".to_string(),
            ));
        }
        self.rest_timer.pause();
        self.enter_focus();
        Ok(())
    }

    /// Any state -> PAUSED. Pauses both timers, zeroes the minute
    /// config and discards an unpersisted open interval.
    pub fn cancel(&mut self) {
        self.focus_timer.pause();
        self.rest_timer.pause();
        self.config.reset();
        self.time_from = None;
        self.state = TimerState::Paused;
    }

    /// Periodic wake-up. A focus expiry takes the same
    /// close-and-persist path as a user-triggered rest.
    pub async fn tick(&mut self) -> Result<FlowEvent, InfraError> {
        match self.state {
            TimerState::Focus => {
                if self.focus_timer.tick() {
                    let persisted = self.close_open_focus().await?;
                    self.enter_rest();
                    return Ok(FlowEvent::FocusEnded { persisted });
                }
                Ok(FlowEvent::Tick)
            }
            TimerState::Rest => {
                if self.rest_timer.tick() {
                    return Ok(FlowEvent::RestFinished);
                }
                Ok(FlowEvent::Tick)
            }
            TimerState::Paused => Ok(FlowEvent::Tick),
        }
    }

    /// Remaining (minutes, seconds) for whichever countdown the state
    /// displays. Paused shows the configured focus minutes.
    pub fn display(&self) -> (u32, u32) {
        match self.state {
            TimerState::Paused => (self.config.focus_minutes, 0),
            TimerState::Focus => (self.focus_timer.minutes(), self.focus_timer.seconds()),
            TimerState::Rest => (self.rest_timer.minutes(), self.rest_timer.seconds()),
        }
    }

    fn enter_focus(&mut self) {
        let now = (self.now_provider)();
        self.time_from = Some(now);
        self.focus_timer
            .restart(now + Duration::seconds(self.config.focus_minutes as i64 * 60));
        self.state = TimerState::Focus;
    }

    fn enter_rest(&mut self) {
        let now = (self.now_provider)();
        self.focus_timer.pause();
        self.rest_timer
            .restart(now + Duration::seconds(self.config.rest_minutes as i64 * 60));
        self.state = TimerState::Rest;
    }

    async fn close_open_focus(&mut self) -> Result<Option<FocusSession>, InfraError> {
        let Some(time_from) = self.time_from else {
            return Ok(None);
        };
        let time_to = (self.now_provider)();
        let session = self.persist_with_retry(time_from, time_to).await?;
        self.time_from = None;
        Ok(Some(session))
    }

    /// The focus-session write is the one write whose loss corrupts
    /// derived metrics, so connectivity failures are retried with
    /// exponential backoff. Rejected requests surface immediately.
    async fn persist_with_retry(
        &self,
        time_from: DateTime<Utc>,
        time_to: DateTime<Utc>,
    ) -> Result<FocusSession, InfraError> {
        let mut attempt = 1u32;
        loop {
            match self
                .gateway
                .create_focus_session(&self.token, time_from, time_to)
                .await
            {
                Ok(session) => return Ok(session),
                Err(error) if error.is_retryable() && attempt < self.retry.max_attempts => {
                    let delay = backoff_delay_ms(self.retry.base_delay_ms, attempt);
                    tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

/// Doubles per attempt, saturating once the shift would leave u64
/// range (attempt counts are config-supplied, not bounded here).
fn backoff_delay_ms(base_delay_ms: u64, attempt: u32) -> u64 {
    let factor = 1u64
        .checked_shl(attempt.saturating_sub(1))
        .unwrap_or(u64::MAX);
    base_delay_ms.saturating_mul(factor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::FocusMetricBucket;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Debug, Clone)]
    enum FakeResponse {
        Success,
        Network(String),
        Rejected(u16),
    }

    #[derive(Debug, Default)]
    struct FakeFocusGateway {
        // Responses consumed front-to-back; an empty script succeeds.
        script: Mutex<VecDeque<FakeResponse>>,
        create_calls: AtomicUsize,
        recorded: Mutex<Vec<(DateTime<Utc>, DateTime<Utc>)>>,
    }

    impl FakeFocusGateway {
        fn with_script(responses: Vec<FakeResponse>) -> Self {
            Self {
                script: Mutex::new(responses.into()),
                ..Self::default()
            }
        }

        fn recorded(&self) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
            self.recorded.lock().expect("recorded mutex poisoned").clone()
        }

        fn calls(&self) -> usize {
            self.create_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl FocusTimeGateway for FakeFocusGateway {
        async fn list_focus_sessions(
            &self,
            _token: &str,
            _date: DateTime<Utc>,
        ) -> Result<Vec<FocusSession>, InfraError> {
            Ok(Vec::new())
        }

        async fn create_focus_session(
            &self,
            _token: &str,
            time_from: DateTime<Utc>,
            time_to: DateTime<Utc>,
        ) -> Result<FocusSession, InfraError> {
            self.create_calls.fetch_add(1, Ordering::SeqCst);
            let response = self
                .script
                .lock()
                .expect("script mutex poisoned")
                .pop_front()
                .unwrap_or(FakeResponse::Success);
            match response {
                FakeResponse::Success => {
                    self.recorded
                        .lock()
                        .expect("recorded mutex poisoned")
                        .push((time_from, time_to));
                    Ok(FocusSession {
                        id: format!("fcs-{}", self.calls()),
                        time_from,
                        time_to,
                        owner_id: "usr-1".to_string(),
                    })
                }
                FakeResponse::Network(message) => Err(InfraError::Network(message)),
                FakeResponse::Rejected(status) => Err(InfraError::Api {
                    status,
                    message: "rejected".to_string(),
                }),
            }
        }

        async fn focus_metrics(
            &self,
            _token: &str,
            _month: DateTime<Utc>,
        ) -> Result<Vec<FocusMetricBucket>, InfraError> {
            Ok(Vec::new())
        }
    }

    fn fixed_time(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn manual_clock(start: DateTime<Utc>) -> (Arc<Mutex<DateTime<Utc>>>, NowProvider) {
        let instant = Arc::new(Mutex::new(start));
        let handle = Arc::clone(&instant);
        let provider: NowProvider =
            Arc::new(move || *handle.lock().expect("clock mutex poisoned"));
        (instant, provider)
    }

    fn advance(clock: &Arc<Mutex<DateTime<Utc>>>, seconds: i64) {
        let mut guard = clock.lock().expect("clock mutex poisoned");
        *guard += Duration::seconds(seconds);
    }

    fn fast_retry() -> SessionWriteRetry {
        SessionWriteRetry {
            max_attempts: 3,
            base_delay_ms: 1,
        }
    }

    fn flow_at(
        gateway: Arc<FakeFocusGateway>,
        start: &str,
    ) -> (FocusFlow<FakeFocusGateway>, Arc<Mutex<DateTime<Utc>>>) {
        let (clock, provider) = manual_clock(fixed_time(start));
        let mut flow = FocusFlow::with_now_provider(gateway, "tok-abc", fast_retry(), provider);
        flow.set_config(TimerConfig::new(25, 5));
        (flow, clock)
    }

    #[test]
    fn begin_focus_requires_positive_minutes() {
        let gateway = Arc::new(FakeFocusGateway::default());
        let (mut flow, _clock) = flow_at(Arc::clone(&gateway), "2024-03-01T10:00:00Z");

        flow.set_config(TimerConfig::new(25, 0));
        assert!(flow.begin_focus().is_err());
        flow.set_config(TimerConfig::new(0, 5));
        assert!(flow.begin_focus().is_err());
        assert_eq!(flow.state(), TimerState::Paused);

        flow.set_config(TimerConfig::new(25, 5));
        flow.begin_focus().expect("begin focus");
        assert_eq!(flow.state(), TimerState::Focus);
        assert_eq!(flow.display(), (25, 0));
    }

    #[test]
    fn begin_focus_is_rejected_while_running() {
        let gateway = Arc::new(FakeFocusGateway::default());
        let (mut flow, _clock) = flow_at(Arc::clone(&gateway), "2024-03-01T10:00:00Z");
        flow.begin_focus().expect("begin focus");
        assert!(flow.begin_focus().is_err());
    }

    #[tokio::test]
    async fn start_rest_persists_exactly_one_session_before_rest() {
        let gateway = Arc::new(FakeFocusGateway::default());
        let (mut flow, clock) = flow_at(Arc::clone(&gateway), "2024-03-01T10:00:00Z");

        flow.begin_focus().expect("begin focus");
        let t0 = fixed_time("2024-03-01T10:00:00Z");
        advance(&clock, 20 * 60);

        let persisted = flow.start_rest().await.expect("start rest");
        let t1 = fixed_time("2024-03-01T10:20:00Z");

        assert_eq!(gateway.calls(), 1);
        assert_eq!(gateway.recorded(), vec![(t0, t1)]);
        let session = persisted.expect("session persisted");
        assert_eq!(session.time_from, t0);
        assert_eq!(session.time_to, t1);
        assert_eq!(flow.state(), TimerState::Rest);
        assert_eq!(flow.display(), (5, 0));
    }

    #[tokio::test]
    async fn rejected_write_keeps_machine_in_focus_without_retry() {
        let gateway = Arc::new(FakeFocusGateway::with_script(vec![FakeResponse::Rejected(
            422,
        )]));
        let (mut flow, clock) = flow_at(Arc::clone(&gateway), "2024-03-01T10:00:00Z");

        flow.begin_focus().expect("begin focus");
        advance(&clock, 60);

        assert!(flow.start_rest().await.is_err());
        assert_eq!(gateway.calls(), 1);
        assert_eq!(flow.state(), TimerState::Focus);

        // The open period survives the failure, so the transition can
        // be retried and still closes from the original start instant.
        let persisted = flow.start_rest().await.expect("retried rest");
        assert_eq!(
            persisted.expect("session persisted").time_from,
            fixed_time("2024-03-01T10:00:00Z")
        );
        assert_eq!(flow.state(), TimerState::Rest);
    }

    #[tokio::test]
    async fn connectivity_failure_is_retried_with_backoff() {
        let gateway = Arc::new(FakeFocusGateway::with_script(vec![
            FakeResponse::Network("connection refused".to_string()),
            FakeResponse::Network("connection refused".to_string()),
            FakeResponse::Success,
        ]));
        let (mut flow, clock) = flow_at(Arc::clone(&gateway), "2024-03-01T10:00:00Z");

        flow.begin_focus().expect("begin focus");
        advance(&clock, 60);

        let persisted = flow.start_rest().await.expect("start rest");
        assert!(persisted.is_some());
        assert_eq!(gateway.calls(), 3);
        assert_eq!(flow.state(), TimerState::Rest);
    }

    #[tokio::test]
    async fn connectivity_failure_exhausts_attempts_and_stays_in_focus() {
        let gateway = Arc::new(FakeFocusGateway::with_script(vec![
            FakeResponse::Network("down".to_string()),
            FakeResponse::Network("down".to_string()),
            FakeResponse::Network("down".to_string()),
        ]));
        let (mut flow, clock) = flow_at(Arc::clone(&gateway), "2024-03-01T10:00:00Z");

        flow.begin_focus().expect("begin focus");
        advance(&clock, 60);

        assert!(matches!(
            flow.start_rest().await,
            Err(InfraError::Network(_))
        ));
        assert_eq!(gateway.calls(), 3);
        assert_eq!(flow.state(), TimerState::Focus);
    }

    #[tokio::test]
    async fn focus_expiry_closes_period_and_enters_rest() {
        let gateway = Arc::new(FakeFocusGateway::default());
        let (mut flow, clock) = flow_at(Arc::clone(&gateway), "2024-03-01T10:00:00Z");

        flow.begin_focus().expect("begin focus");
        assert_eq!(flow.tick().await.expect("tick"), FlowEvent::Tick);

        advance(&clock, 25 * 60);
        let event = flow.tick().await.expect("tick");
        match event {
            FlowEvent::FocusEnded { persisted } => {
                let session = persisted.expect("session persisted");
                assert_eq!(session.time_from, fixed_time("2024-03-01T10:00:00Z"));
                assert_eq!(session.time_to, fixed_time("2024-03-01T10:25:00Z"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(gateway.calls(), 1);
        assert_eq!(flow.state(), TimerState::Rest);
    }

    #[tokio::test]
    async fn rest_expiry_only_surfaces_a_display_event() {
        let gateway = Arc::new(FakeFocusGateway::default());
        let (mut flow, clock) = flow_at(Arc::clone(&gateway), "2024-03-01T10:00:00Z");

        flow.begin_focus().expect("begin focus");
        advance(&clock, 60);
        flow.start_rest().await.expect("start rest");

        advance(&clock, 5 * 60);
        assert_eq!(flow.tick().await.expect("tick"), FlowEvent::RestFinished);
        assert_eq!(flow.state(), TimerState::Rest);
        // Fired once; subsequent ticks are quiet.
        assert_eq!(flow.tick().await.expect("tick"), FlowEvent::Tick);
    }

    #[tokio::test]
    async fn resume_opens_a_fresh_period_from_the_resume_instant() {
        let gateway = Arc::new(FakeFocusGateway::default());
        let (mut flow, clock) = flow_at(Arc::clone(&gateway), "2024-03-01T10:00:00Z");

        flow.begin_focus().expect("begin focus");
        advance(&clock, 10 * 60);
        flow.start_rest().await.expect("start rest");

        advance(&clock, 3 * 60);
        flow.resume_focus().expect("resume");
        assert_eq!(flow.state(), TimerState::Focus);

        advance(&clock, 7 * 60);
        flow.start_rest().await.expect("second rest");

        let recorded = gateway.recorded();
        assert_eq!(recorded.len(), 2);
        assert_eq!(recorded[1].0, fixed_time("2024-03-01T10:13:00Z"));
        assert_eq!(recorded[1].1, fixed_time("2024-03-01T10:20:00Z"));
    }

    #[test]
    fn backoff_delay_doubles_then_saturates() {
        assert_eq!(backoff_delay_ms(500, 1), 500);
        assert_eq!(backoff_delay_ms(500, 2), 1000);
        assert_eq!(backoff_delay_ms(500, 3), 2000);
        assert_eq!(backoff_delay_ms(500, 64), u64::MAX);
        assert_eq!(backoff_delay_ms(500, 200), u64::MAX);
    }

    #[tokio::test]
    async fn resume_requires_positive_minutes() {
        let gateway = Arc::new(FakeFocusGateway::default());
        let (mut flow, clock) = flow_at(Arc::clone(&gateway), "2024-03-01T10:00:00Z");

        flow.begin_focus().expect("begin focus");
        advance(&clock, 60);
        flow.start_rest().await.expect("start rest");

        flow.set_config(TimerConfig::new(0, 5));
        assert!(flow.resume_focus().is_err());
        assert_eq!(flow.state(), TimerState::Rest);

        flow.set_config(TimerConfig::new(25, 5));
        flow.resume_focus().expect("resume");
        assert_eq!(flow.state(), TimerState::Focus);
    }

    #[tokio::test]
    async fn cancel_discards_open_interval_and_resets_config() {
        let gateway = Arc::new(FakeFocusGateway::default());
        let (mut flow, clock) = flow_at(Arc::clone(&gateway), "2024-03-01T10:00:00Z");

        flow.begin_focus().expect("begin focus");
        advance(&clock, 10 * 60);
        flow.cancel();

        assert_eq!(flow.state(), TimerState::Paused);
        assert_eq!(flow.config(), TimerConfig::default());
        // The in-progress interval is discarded, never persisted.
        assert_eq!(gateway.calls(), 0);

        // Expired-at-cancel timers stay quiet afterwards.
        advance(&clock, 60 * 60);
        assert_eq!(flow.tick().await.expect("tick"), FlowEvent::Tick);
        assert_eq!(gateway.calls(), 0);
    }

    #[tokio::test]
    async fn cancel_from_paused_touches_nothing_persisted() {
        let gateway = Arc::new(FakeFocusGateway::default());
        let (mut flow, _clock) = flow_at(Arc::clone(&gateway), "2024-03-01T10:00:00Z");

        flow.cancel();
        assert_eq!(flow.state(), TimerState::Paused);
        assert_eq!(flow.config(), TimerConfig::default());
        assert_eq!(gateway.calls(), 0);
    }
}
