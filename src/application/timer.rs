use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

pub type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Wall-clock countdown around a target expiry instant.
///
/// Remaining time is recomputed from the stored expiry on every read
/// instead of decrementing a counter, so missed ticks self-correct.
/// The expiry fires at most once per `restart`, and never after
/// `pause` until the next `restart` re-arms it.
pub struct CountdownTimer {
    expiry: Option<DateTime<Utc>>,
    paused: bool,
    fired: bool,
    frozen_remaining: Duration,
    now_provider: NowProvider,
}

impl CountdownTimer {
    pub fn new() -> Self {
        Self::with_now_provider(Arc::new(Utc::now))
    }

    pub fn with_now_provider(now_provider: NowProvider) -> Self {
        Self {
            expiry: None,
            paused: false,
            fired: false,
            frozen_remaining: Duration::zero(),
            now_provider,
        }
    }

    /// Arms the timer for a new expiry, clearing the paused and fired
    /// flags. An already-past expiry fires on the next tick.
    pub fn restart(&mut self, expiry: DateTime<Utc>) {
        self.expiry = Some(expiry);
        self.paused = false;
        self.fired = false;
    }

    /// Freezes the remaining time and suppresses expiry firing until
    /// the next restart.
    pub fn pause(&mut self) {
        if !self.paused {
            self.frozen_remaining = self.live_remaining();
            self.paused = true;
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn remaining(&self) -> Duration {
        if self.paused {
            self.frozen_remaining
        } else {
            self.live_remaining()
        }
    }

    pub fn minutes(&self) -> u32 {
        (self.remaining().num_seconds() / 60) as u32
    }

    pub fn seconds(&self) -> u32 {
        (self.remaining().num_seconds() % 60) as u32
    }

    /// Returns true exactly when the armed expiry is reached; at most
    /// once per restart.
    pub fn tick(&mut self) -> bool {
        if self.paused || self.fired {
            return false;
        }
        let Some(expiry) = self.expiry else {
            return false;
        };
        if (self.now_provider)() >= expiry {
            self.fired = true;
            return true;
        }
        false
    }

    fn live_remaining(&self) -> Duration {
        let Some(expiry) = self.expiry else {
            return Duration::zero();
        };
        (expiry - (self.now_provider)()).max(Duration::zero())
    }
}

impl Default for CountdownTimer {
    fn default() -> Self {
        Self::new()
    }
}
