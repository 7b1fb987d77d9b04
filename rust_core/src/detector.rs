//! New-shot detection with exactly-once semantics.
//!
//! Polling returns the same snapshot many times and the delayed-playback path
//! replays snapshots the live path already saw. The detector collapses all of
//! these to a single firing per shot identity and decides how long to hold the
//! prediction prompt so it lines up with the viewer's delayed stream.

use crate::anchor::ClockAnchor;
use crate::config::{DEFAULT_SEEN_SHOT_MEMORY, POPUP_LEAD_MS, STALE_SHOT_CUTOFF_MS};
use crate::models::{GameState, ShotEvent};
use rustc_hash::FxHashSet;
use std::collections::VecDeque;
use tracing::{debug, warn};

/// Dedup identity of a shot: shooter, raw result text and game clock
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShotIdentity {
    pub player_name: String,
    pub shot_result: String,
    pub clock: String,
}

impl ShotIdentity {
    pub fn key(&self) -> String {
        format!("{}-{}-{}", self.player_name, self.shot_result, self.clock)
    }
}

/// Inputs the popup-delay policy needs besides the sample itself
#[derive(Debug, Clone, Copy)]
pub struct DetectionContext<'a> {
    /// Simulated/test games are already time-aligned
    pub simulated: bool,
    pub anchor: Option<&'a ClockAnchor>,
    pub stream_delay_ms: i64,
    pub now: i64,
}

/// A shot that should open a prediction window
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedShot {
    pub identity: ShotIdentity,
    pub shot: ShotEvent,
    pub period: u32,
    pub clock: String,
    pub event_timestamp: i64,
    pub detected_at: i64,
    pub popup_delay_ms: i64,
}

impl DetectedShot {
    /// Wall-clock instant the prediction window should open
    pub fn opens_at(&self) -> i64 {
        self.detected_at + self.popup_delay_ms
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Detection {
    /// Sample carries no shot, or the shot has no shooter
    NoShot,
    /// Identity already processed
    Duplicate,
    /// Shot is already visible on the delayed stream by more than the cutoff
    Stale { late_by_ms: i64 },
    Fire(DetectedShot),
}

#[derive(Debug, Clone)]
pub struct ShotDetector {
    last_processed: Option<ShotIdentity>,
    seen: FxHashSet<ShotIdentity>,
    order: VecDeque<ShotIdentity>,
    memory: usize,
    lead_ms: i64,
    stale_cutoff_ms: i64,
}

impl Default for ShotDetector {
    fn default() -> Self {
        Self::new(DEFAULT_SEEN_SHOT_MEMORY, POPUP_LEAD_MS, STALE_SHOT_CUTOFF_MS)
    }
}

impl ShotDetector {
    pub fn new(memory: usize, lead_ms: i64, stale_cutoff_ms: i64) -> Self {
        Self {
            last_processed: None,
            seen: FxHashSet::default(),
            order: VecDeque::new(),
            memory: memory.max(1),
            lead_ms,
            stale_cutoff_ms,
        }
    }

    pub fn last_processed(&self) -> Option<&ShotIdentity> {
        self.last_processed.as_ref()
    }

    /// Whether an identity has already been processed
    pub fn contains(&self, identity: &ShotIdentity) -> bool {
        self.seen.contains(identity)
    }

    /// Decide whether `state` carries a shot that has not fired yet.
    ///
    /// The identity is marked processed before the staleness check, so a shot
    /// skipped as stale never fires later either.
    pub fn check_for_new_shot(
        &mut self,
        state: &GameState,
        timestamp: i64,
        from_delayed_feed: bool,
        ctx: &DetectionContext<'_>,
    ) -> Detection {
        let shot = match state.last_shot.as_ref() {
            Some(shot) => shot,
            None => return Detection::NoShot,
        };
        let player_name = match shot.shooter() {
            Some(name) => name.to_string(),
            None => return Detection::NoShot,
        };

        let identity = ShotIdentity {
            player_name,
            shot_result: shot.shot_result.clone().unwrap_or_default(),
            clock: state.clock.clone(),
        };

        if self.last_processed.as_ref() == Some(&identity) || self.seen.contains(&identity) {
            return Detection::Duplicate;
        }
        self.remember(identity.clone());

        let popup_delay_ms = if ctx.simulated || from_delayed_feed {
            0
        } else if let Some(anchor) = ctx.anchor {
            let appears_at = anchor.appearance_time(timestamp, ctx.stream_delay_ms);
            let time_until_appears = appears_at - ctx.now;
            if time_until_appears < -self.stale_cutoff_ms {
                warn!(
                    "Shot already passed on stream ({}ms ago), skipping {}",
                    -time_until_appears,
                    identity.key()
                );
                return Detection::Stale {
                    late_by_ms: -time_until_appears,
                };
            }
            (time_until_appears - self.lead_ms).max(0)
        } else {
            0
        };

        debug!(
            "New shot {} (delayed feed: {}, popup in {}ms)",
            identity.key(),
            from_delayed_feed,
            popup_delay_ms
        );

        Detection::Fire(DetectedShot {
            identity,
            shot: shot.clone(),
            period: state.period,
            clock: state.clock.clone(),
            event_timestamp: timestamp,
            detected_at: ctx.now,
            popup_delay_ms,
        })
    }

    fn remember(&mut self, identity: ShotIdentity) {
        if self.order.len() >= self.memory {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        self.seen.insert(identity.clone());
        self.order.push_back(identity.clone());
        self.last_processed = Some(identity);
    }
}
