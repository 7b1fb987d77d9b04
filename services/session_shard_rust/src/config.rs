//! Configuration constants and environment loading for SessionShard
//!
//! This module manages all runtime configuration:
//! - Game and session identity
//! - Feed mode and polling/playback intervals
//! - Collaborator endpoints and circuit breaker settings
//! - Seat assignments

use anyhow::{anyhow, Result};
use courtcall_core::circuit_breaker::ApiCircuitBreakerConfig;
use courtcall_core::models::ParticipantLabel;
use courtcall_core::roster::Participant;
use courtcall_core::session::FeedMode;
use std::env;
use std::time::Duration;
use tracing::warn;

/// Default feed service base URL
pub const DEFAULT_FEED_BASE_URL: &str = "http://localhost:3000";

/// Default document store base URL
pub const DEFAULT_STORE_BASE_URL: &str = "http://localhost:3000";

/// Default live polling interval in seconds
pub const DEFAULT_POLL_INTERVAL_SECS: f64 = 1.5;

/// Default delayed-playback tick in milliseconds
pub const DEFAULT_PLAYBACK_TICK_MS: u64 = 100;

/// Default broadcast stream delay in seconds
pub const DEFAULT_STREAM_DELAY_SECS: f64 = 0.0;

/// Default bound of the gesture intake channel
pub const DEFAULT_GESTURE_CHANNEL_CAPACITY: usize = 64;

/// Default bound of the outbound event broadcast channel
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct SessionShardConfig {
    pub shard_id: String,
    pub game_id: String,
    /// Persistence is disabled without a session
    pub session_id: Option<String>,
    pub feed_base_url: String,
    pub store_base_url: String,
    pub feed_mode: FeedMode,
    /// Recording position for simulated sessions (epoch ms)
    pub simulated_timestamp: Option<i64>,
    pub poll_interval: Duration,
    pub playback_tick: Duration,
    pub stream_delay_secs: f64,
    pub player_stats_path: Option<String>,
    pub gesture_channel_capacity: usize,
    pub event_channel_capacity: usize,
    pub feed_circuit_breaker: ApiCircuitBreakerConfig,
    pub seats: Vec<(ParticipantLabel, Participant)>,
}

impl SessionShardConfig {
    /// Load configuration from environment variables with sensible defaults
    pub fn from_env() -> Result<Self> {
        let game_id = env::var("GAME_ID")
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| anyhow!("GAME_ID is required"))?;

        let feed_mode = match env::var("FEED_MODE") {
            Ok(raw) => FeedMode::parse(&raw).unwrap_or_else(|| {
                warn!("Unknown FEED_MODE '{}', using live", raw);
                FeedMode::Live
            }),
            Err(_) => FeedMode::Live,
        };

        let poll_interval_secs = parse_env_f64("POLL_INTERVAL_SECS", DEFAULT_POLL_INTERVAL_SECS).clamp(0.25, 10.0);
        let playback_tick_ms = parse_env("PLAYBACK_TICK_MS", DEFAULT_PLAYBACK_TICK_MS).clamp(20, 1000);
        let stream_delay_secs = parse_env_f64("STREAM_DELAY_SECS", DEFAULT_STREAM_DELAY_SECS).clamp(0.0, 120.0);

        let seats = [
            (ParticipantLabel::Left, "SEAT_LEFT"),
            (ParticipantLabel::Center, "SEAT_CENTER"),
            (ParticipantLabel::Right, "SEAT_RIGHT"),
        ]
        .into_iter()
        .filter_map(|(label, var)| {
            let raw = env::var(var).ok()?;
            match Participant::parse(&raw) {
                Some(participant) => Some((label, participant)),
                None => {
                    warn!("Ignoring malformed {}='{}'", var, raw);
                    None
                }
            }
        })
        .collect();

        Ok(Self {
            shard_id: env::var("SHARD_ID").unwrap_or_else(|_| format!("session-{}", uuid::Uuid::new_v4())),
            game_id,
            session_id: non_empty_env("SESSION_ID"),
            feed_base_url: env::var("FEED_BASE_URL").unwrap_or_else(|_| DEFAULT_FEED_BASE_URL.to_string()),
            store_base_url: env::var("STORE_BASE_URL").unwrap_or_else(|_| DEFAULT_STORE_BASE_URL.to_string()),
            feed_mode,
            simulated_timestamp: env::var("SIMULATED_TIMESTAMP").ok().and_then(|v| v.trim().parse().ok()),
            poll_interval: Duration::from_secs_f64(poll_interval_secs),
            playback_tick: Duration::from_millis(playback_tick_ms),
            stream_delay_secs,
            player_stats_path: non_empty_env("PLAYER_STATS_PATH"),
            gesture_channel_capacity: parse_env("GESTURE_CHANNEL_CAPACITY", DEFAULT_GESTURE_CHANNEL_CAPACITY).max(1),
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            feed_circuit_breaker: load_feed_circuit_breaker_config(),
            seats,
        })
    }

    /// Defaults for an in-process session, used by tests and simulations
    pub fn for_game(game_id: &str, feed_mode: FeedMode) -> Self {
        Self {
            shard_id: "local".to_string(),
            game_id: game_id.to_string(),
            session_id: None,
            feed_base_url: DEFAULT_FEED_BASE_URL.to_string(),
            store_base_url: DEFAULT_STORE_BASE_URL.to_string(),
            feed_mode,
            simulated_timestamp: None,
            poll_interval: Duration::from_secs_f64(DEFAULT_POLL_INTERVAL_SECS),
            playback_tick: Duration::from_millis(DEFAULT_PLAYBACK_TICK_MS),
            stream_delay_secs: DEFAULT_STREAM_DELAY_SECS,
            player_stats_path: None,
            gesture_channel_capacity: DEFAULT_GESTURE_CHANNEL_CAPACITY,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            feed_circuit_breaker: ApiCircuitBreakerConfig::default(),
            seats: Vec::new(),
        }
    }
}

/// Load feed circuit breaker configuration from environment
pub fn load_feed_circuit_breaker_config() -> ApiCircuitBreakerConfig {
    ApiCircuitBreakerConfig {
        failure_threshold: parse_env("FEED_CB_FAILURE_THRESHOLD", 5u32).max(1),
        recovery_timeout: Duration::from_secs(parse_env("FEED_CB_RECOVERY_TIMEOUT_SECS", 30u64)),
        success_threshold: 2,
    }
}

fn parse_env<T: std::str::FromStr>(var: &str, default: T) -> T {
    env::var(var)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

/// Like `parse_env`, but NaN and infinities fall back to the default
fn parse_env_f64(var: &str, default: f64) -> f64 {
    Some(parse_env(var, default))
        .filter(|v| v.is_finite())
        .unwrap_or(default)
}

fn non_empty_env(var: &str) -> Option<String> {
    env::var(var)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
