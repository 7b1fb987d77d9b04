//! Circuit breaker for the HTTP collaborators.
//!
//! Consecutive failures open the circuit; after the recovery timeout one probe
//! is let through (half-open) and enough successes close it again. While open,
//! callers skip the request entirely and treat the cycle as "no update".

use parking_lot::Mutex;
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiCircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone)]
pub struct ApiCircuitBreakerConfig {
    /// Consecutive failures that open the circuit
    pub failure_threshold: u32,
    /// Time spent open before a probe is allowed
    pub recovery_timeout: Duration,
    /// Half-open successes needed to close
    pub success_threshold: u32,
}

impl Default for ApiCircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(30),
            success_threshold: 2,
        }
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: ApiCircuitState,
    consecutive_failures: u32,
    half_open_successes: u32,
    opened_at: Option<Instant>,
}

#[derive(Debug)]
pub struct ApiCircuitBreaker {
    name: String,
    config: ApiCircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl ApiCircuitBreaker {
    pub fn new(name: &str, config: ApiCircuitBreakerConfig) -> Self {
        Self {
            name: name.to_string(),
            config,
            inner: Mutex::new(BreakerInner {
                state: ApiCircuitState::Closed,
                consecutive_failures: 0,
                half_open_successes: 0,
                opened_at: None,
            }),
        }
    }

    pub fn with_defaults(name: &str) -> Self {
        Self::new(name, ApiCircuitBreakerConfig::default())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ApiCircuitState {
        self.inner.lock().state
    }

    pub fn failure_count(&self) -> u32 {
        self.inner.lock().consecutive_failures
    }

    /// Whether a request may be attempted now. Moves OPEN to HALF-OPEN once the
    /// recovery timeout has passed.
    pub fn is_available(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            ApiCircuitState::Closed | ApiCircuitState::HalfOpen => true,
            ApiCircuitState::Open => {
                let recovered = inner
                    .opened_at
                    .map(|t| t.elapsed() >= self.config.recovery_timeout)
                    .unwrap_or(true);
                if recovered {
                    inner.state = ApiCircuitState::HalfOpen;
                    inner.half_open_successes = 0;
                    info!("Circuit '{}' half-open, probing", self.name);
                }
                recovered
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        inner.consecutive_failures = 0;
        if inner.state == ApiCircuitState::HalfOpen {
            inner.half_open_successes += 1;
            if inner.half_open_successes < self.config.success_threshold {
                return;
            }
            info!(
                "Circuit '{}' closed after {} successful probes",
                self.name, inner.half_open_successes
            );
        }
        inner.state = ApiCircuitState::Closed;
        inner.opened_at = None;
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        inner.consecutive_failures += 1;
        match inner.state {
            ApiCircuitState::Closed if inner.consecutive_failures >= self.config.failure_threshold => {
                inner.state = ApiCircuitState::Open;
                inner.opened_at = Some(Instant::now());
                warn!(
                    "Circuit '{}' OPEN after {} consecutive failures",
                    self.name, inner.consecutive_failures
                );
            }
            ApiCircuitState::HalfOpen => {
                inner.state = ApiCircuitState::Open;
                inner.opened_at = Some(Instant::now());
                warn!("Circuit '{}' re-opened, probe failed", self.name);
            }
            _ => {}
        }
    }

    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.state = ApiCircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.half_open_successes = 0;
        inner.opened_at = None;
    }
}
