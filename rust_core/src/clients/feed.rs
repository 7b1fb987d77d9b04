use crate::circuit_breaker::{ApiCircuitBreaker, ApiCircuitBreakerConfig, ApiCircuitState};
use crate::error::FeedError;
use crate::models::GameState;
use async_trait::async_trait;
use chrono::DateTime;
use parking_lot::Mutex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Source of normalized game states
#[async_trait]
pub trait GameFeed: Send + Sync {
    /// Most recent state of a live game
    async fn latest_state(&self, game_id: &str) -> Result<GameState, FeedError>;

    /// State of a simulated game at a fixed point in its recording
    async fn state_at(&self, game_id: &str, timestamp: i64) -> Result<GameState, FeedError>;

    /// Every state of the game in order, for replay
    async fn history(&self, game_id: &str) -> Result<Vec<HistoryItem>, FeedError>;

    fn feed_name(&self) -> &str;
}

/// One historical state and the real-world time of the action that produced it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryItem {
    pub state: GameState,
    #[serde(default)]
    pub time_actual: Option<String>,
}

impl HistoryItem {
    pub fn new(state: GameState, time_actual: Option<&str>) -> Self {
        Self {
            state,
            time_actual: time_actual.map(str::to_string),
        }
    }

    /// Epoch millis of `time_actual`, when present and RFC 3339
    pub fn timestamp_ms(&self) -> Option<i64> {
        let raw = self.time_actual.as_deref()?;
        DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|t| t.timestamp_millis())
    }
}

#[derive(Debug, Deserialize)]
struct StateResponse {
    state: Option<GameState>,
}

#[derive(Debug, Deserialize)]
struct HistoryResponse {
    #[serde(default)]
    states: Vec<HistoryItem>,
}

/// Reads already-normalized states from `{base}/api/games/{id}`
#[derive(Clone)]
pub struct HttpGameFeed {
    client: Client,
    base_url: String,
    circuit_breaker: Arc<ApiCircuitBreaker>,
}

impl std::fmt::Debug for HttpGameFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpGameFeed")
            .field("base_url", &self.base_url)
            .field("circuit_breaker_state", &self.circuit_breaker.state())
            .finish()
    }
}

impl HttpGameFeed {
    pub fn new(base_url: &str) -> Self {
        Self::with_config(base_url, ApiCircuitBreakerConfig::default())
    }

    pub fn with_config(base_url: &str, config: ApiCircuitBreakerConfig) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| Client::new()),
            base_url: base_url.trim_end_matches('/').to_string(),
            circuit_breaker: Arc::new(ApiCircuitBreaker::new("game_feed", config)),
        }
    }

    pub fn circuit_state(&self) -> ApiCircuitState {
        self.circuit_breaker.state()
    }

    fn game_url(&self, game_id: &str) -> String {
        format!("{}/api/games/{}", self.base_url, game_id)
    }

    /// GET with the circuit breaker around it
    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: String,
        query: &[(&str, String)],
    ) -> Result<T, FeedError> {
        if !self.circuit_breaker.is_available() {
            return Err(FeedError::CircuitOpen(self.circuit_breaker.name().to_string()));
        }

        let result = self.fetch_internal(&url, query).await;
        match &result {
            Ok(_) => self.circuit_breaker.record_success(),
            // Bad payloads do not count against the circuit
            Err(FeedError::Malformed(_)) => {}
            Err(_) => self.circuit_breaker.record_failure(),
        }
        result
    }

    async fn fetch_internal<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, FeedError> {
        let resp = self.client.get(url).query(query).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FeedError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        let body = resp.text().await?;
        serde_json::from_str(&body).map_err(|e| FeedError::Malformed(e.to_string()))
    }
}

#[async_trait]
impl GameFeed for HttpGameFeed {
    async fn latest_state(&self, game_id: &str) -> Result<GameState, FeedError> {
        let resp: StateResponse = self.get_json(self.game_url(game_id), &[]).await?;
        resp.state
            .ok_or_else(|| FeedError::Malformed(format!("no state for game {}", game_id)))
    }

    async fn state_at(&self, game_id: &str, timestamp: i64) -> Result<GameState, FeedError> {
        let resp: StateResponse = self
            .get_json(self.game_url(game_id), &[("timestamp", timestamp.to_string())])
            .await?;
        resp.state
            .ok_or_else(|| FeedError::Malformed(format!("no state for game {} at {}", game_id, timestamp)))
    }

    async fn history(&self, game_id: &str) -> Result<Vec<HistoryItem>, FeedError> {
        let resp: HistoryResponse = self
            .get_json(self.game_url(game_id), &[("loadAll", "true".to_string())])
            .await?;
        debug!("Fetched {} historical states for {}", resp.states.len(), game_id);
        Ok(resp.states)
    }

    fn feed_name(&self) -> &str {
        "http"
    }
}

/// In-process feed that plays back a fixed script.
///
/// `latest_state` hands out scripted states in order and then keeps returning
/// the last one, the way a finished game keeps reporting its final state.
#[derive(Debug, Default)]
pub struct ScriptedFeed {
    pending: Mutex<VecDeque<GameState>>,
    last: Mutex<Option<GameState>>,
    history: Vec<HistoryItem>,
    failures: AtomicU32,
}

impl ScriptedFeed {
    pub fn new(states: Vec<GameState>) -> Self {
        Self {
            pending: Mutex::new(states.into()),
            ..Default::default()
        }
    }

    pub fn with_history(history: Vec<HistoryItem>) -> Self {
        Self {
            history,
            ..Default::default()
        }
    }

    /// Queue another state behind the script
    pub fn push(&self, state: GameState) {
        self.pending.lock().push_back(state);
    }

    /// Fail the next `n` fetches with a transient error
    pub fn fail_next(&self, n: u32) {
        self.failures.store(n, Ordering::SeqCst);
    }

    fn next_state(&self) -> Result<GameState, FeedError> {
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(FeedError::Status {
                status: 503,
                url: "scripted".to_string(),
            });
        }

        let mut last = self.last.lock();
        if let Some(state) = self.pending.lock().pop_front() {
            *last = Some(state);
        }
        last.clone().ok_or(FeedError::Exhausted)
    }
}

#[async_trait]
impl GameFeed for ScriptedFeed {
    async fn latest_state(&self, _game_id: &str) -> Result<GameState, FeedError> {
        self.next_state()
    }

    async fn state_at(&self, _game_id: &str, _timestamp: i64) -> Result<GameState, FeedError> {
        self.next_state()
    }

    async fn history(&self, _game_id: &str) -> Result<Vec<HistoryItem>, FeedError> {
        Ok(self.history.clone())
    }

    fn feed_name(&self) -> &str {
        "scripted"
    }
}
