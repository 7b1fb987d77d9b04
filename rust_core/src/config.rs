//! Engine timing and capacity constants.
//!
//! These reproduce the live experience exactly; the service layer may override
//! individual fields but the defaults are the reference behavior.

/// Maximum number of game-state samples kept in the timeline
pub const DEFAULT_TIMELINE_CAPACITY: usize = 500;

/// Maximum predictions kept per seat while a window is open
pub const DEFAULT_PREDICTION_BUFFER: usize = 10;

/// Countdown length of a prediction window, in ticks
pub const DEFAULT_COUNTDOWN_TICKS: u8 = 3;

/// Length of one countdown tick
pub const DEFAULT_COUNTDOWN_TICK_MS: i64 = 1_000;

/// Pause between the window closing and points being resolved
pub const DEFAULT_REVEAL_DELAY_MS: i64 = 3_000;

/// Prompt shows this long before the shot becomes visible on the delayed stream
pub const POPUP_LEAD_MS: i64 = 3_000;

/// Shots whose projected appearance is further in the past than this are skipped
pub const STALE_SHOT_CUTOFF_MS: i64 = 10_000;

/// Points at stake per shot before multipliers
pub const DEFAULT_BASE_POINTS: i64 = 1_000;

/// Per-seat point breakdowns are hidden after this long
pub const PLAYER_DISPLAY_RESET_MS: i64 = 2_500;

/// Lane-by-lane preview is hidden after this long
pub const LANE_POINTS_RESET_MS: i64 = 3_000;

/// Single-participant points popup duration
pub const POINTS_EARNED_OVERLAY_MS: i64 = 1_800;

/// Shot result overlay duration
pub const RESULT_OVERLAY_MS: i64 = 1_800;

/// Celebration duration after a made shot
pub const MONEY_RAIN_MS: i64 = 3_000;

/// Number of distinct shot identities remembered by the detector
pub const DEFAULT_SEEN_SHOT_MEMORY: usize = 256;

/// Shots waiting for the current window to finish
pub const DEFAULT_PENDING_SHOT_LIMIT: usize = 8;

/// Gap between consecutive samples that is reported as a stall
pub const TIMELINE_GAP_WARN_MS: i64 = 30_000;

/// Spacing used for historical loads that carry no timestamps (15 minutes total)
pub const UNTIMED_HISTORY_SPAN_MS: i64 = 900_000;

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub timeline_capacity: usize,
    pub prediction_buffer: usize,
    pub countdown_ticks: u8,
    pub countdown_tick_ms: i64,
    pub reveal_delay_ms: i64,
    pub popup_lead_ms: i64,
    pub stale_cutoff_ms: i64,
    pub base_points: i64,
    pub player_display_reset_ms: i64,
    pub lane_points_reset_ms: i64,
    pub points_earned_overlay_ms: i64,
    pub result_overlay_ms: i64,
    pub money_rain_ms: i64,
    pub seen_shot_memory: usize,
    pub pending_shot_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timeline_capacity: DEFAULT_TIMELINE_CAPACITY,
            prediction_buffer: DEFAULT_PREDICTION_BUFFER,
            countdown_ticks: DEFAULT_COUNTDOWN_TICKS,
            countdown_tick_ms: DEFAULT_COUNTDOWN_TICK_MS,
            reveal_delay_ms: DEFAULT_REVEAL_DELAY_MS,
            popup_lead_ms: POPUP_LEAD_MS,
            stale_cutoff_ms: STALE_SHOT_CUTOFF_MS,
            base_points: DEFAULT_BASE_POINTS,
            player_display_reset_ms: PLAYER_DISPLAY_RESET_MS,
            lane_points_reset_ms: LANE_POINTS_RESET_MS,
            points_earned_overlay_ms: POINTS_EARNED_OVERLAY_MS,
            result_overlay_ms: RESULT_OVERLAY_MS,
            money_rain_ms: MONEY_RAIN_MS,
            seen_shot_memory: DEFAULT_SEEN_SHOT_MEMORY,
            pending_shot_limit: DEFAULT_PENDING_SHOT_LIMIT,
        }
    }
}

impl EngineConfig {
    /// Total wall time from window open to points resolution
    pub fn window_span_ms(&self) -> i64 {
        self.countdown_ticks as i64 * self.countdown_tick_ms + self.reveal_delay_ms
    }
}
