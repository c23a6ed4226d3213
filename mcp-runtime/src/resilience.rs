use std::sync::Mutex;
use std::time::{Duration, Instant};

pub const DEFAULT_MAX_RETRIES: u32 = 2;
pub const DEFAULT_BREAKER_THRESHOLD: u32 = 5;
pub const DEFAULT_BREAKER_COOLDOWN: Duration = Duration::from_secs(30);
const BACKOFF_BASE: Duration = Duration::from_millis(250);
const BACKOFF_CAP: Duration = Duration::from_secs(4);

/// Bounded exponential backoff for idempotent GETs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: BACKOFF_BASE,
            max_delay: BACKOFF_CAP,
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (0-based). A server-provided
    /// Retry-After wins but is still capped.
    pub fn delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let computed = self
            .base_delay
            .saturating_mul(2_u32.saturating_pow(attempt.min(16)));
        retry_after.unwrap_or(computed).min(self.max_delay)
    }

    pub fn allows(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }
}

/// Statuses worth retrying: throttling and gateway/availability errors.
pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 502 | 503 | 504)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerSettings {
    pub failure_threshold: u32,
    pub cooldown: Duration,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_BREAKER_THRESHOLD,
            cooldown: DEFAULT_BREAKER_COOLDOWN,
        }
    }
}

#[derive(Debug, Default)]
struct BreakerState {
    consecutive_failures: u32,
    open_until: Option<Instant>,
    probe_in_flight: bool,
}

/// How a call got past the breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Closed,
    /// The single half-open call after a cooldown.
    Probe,
}

/// Consecutive-failure circuit breaker.
///
/// Closed until `failure_threshold` failures in a row, then open for
/// `cooldown`. After the cooldown exactly one probe is let through; its
/// outcome closes the circuit or re-opens it for another cooldown.
#[derive(Debug)]
pub struct CircuitBreaker {
    settings: BreakerSettings,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(settings: BreakerSettings) -> Self {
        Self {
            settings,
            state: Mutex::new(BreakerState::default()),
        }
    }

    /// `Err(remaining)` while the circuit rejects calls.
    pub fn check(&self) -> Result<Admission, Duration> {
        self.check_at(Instant::now())
    }

    fn check_at(&self, now: Instant) -> Result<Admission, Duration> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let Some(open_until) = state.open_until else {
            return Ok(Admission::Closed);
        };
        if now < open_until {
            return Err(open_until - now);
        }
        if state.probe_in_flight {
            return Err(Duration::ZERO);
        }
        state.probe_in_flight = true;
        Ok(Admission::Probe)
    }

    /// The probe ended without an outcome (its future was dropped). The
    /// circuit stays open and the next caller becomes the probe.
    pub fn abandon_probe(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.probe_in_flight {
            state.probe_in_flight = false;
            tracing::debug!("vendor API half-open probe abandoned");
        }
    }

    pub fn record_success(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        *state = BreakerState::default();
    }

    pub fn record_failure(&self) {
        self.record_failure_at(Instant::now());
    }

    fn record_failure_at(&self, now: Instant) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);
        let was_probe = state.probe_in_flight;
        state.probe_in_flight = false;
        if was_probe || state.consecutive_failures >= self.settings.failure_threshold {
            if state.open_until.is_none() || was_probe {
                tracing::warn!(
                    consecutive_failures = state.consecutive_failures,
                    cooldown_secs = self.settings.cooldown.as_secs(),
                    "vendor API circuit opened"
                );
            }
            state.open_until = Some(now + self.settings.cooldown);
        }
    }
}
