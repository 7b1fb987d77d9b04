//! Clock anchoring between the live feed and a delayed broadcast.
//!
//! An anchor pins one feed timestamp to the wall-clock instant a viewer said
//! "my stream shows this game clock now". From there the feed position the
//! viewer is watching can be projected forward in real time.

use crate::clock::format_clock;
use crate::timeline::GameStateTimeline;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockAnchor {
    /// Feed timestamp of the anchored sample
    pub reference_timestamp: i64,
    /// Wall clock when the anchor was taken
    pub wall_clock_at_reference: i64,
}

/// Where the delayed viewer currently is on the feed timeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Projection {
    pub target_timestamp: i64,
    /// True when the raw projection ran past the newest sample
    pub clamped: bool,
    pub elapsed_ms: i64,
}

impl ClockAnchor {
    pub fn new(reference_timestamp: i64, wall_clock_at_reference: i64) -> Self {
        Self {
            reference_timestamp,
            wall_clock_at_reference,
        }
    }

    /// Feed timestamp the viewer is seeing at `now`, never past `latest_available`.
    pub fn project(&self, now: i64, stream_delay_ms: i64, latest_available: i64) -> Projection {
        let elapsed_ms = now - self.wall_clock_at_reference;
        let raw = self.reference_timestamp + elapsed_ms - stream_delay_ms;
        Projection {
            target_timestamp: raw.min(latest_available),
            clamped: raw > latest_available,
            elapsed_ms,
        }
    }

    /// Wall-clock instant a feed event becomes visible on the delayed stream
    pub fn appearance_time(&self, event_timestamp: i64, stream_delay_ms: i64) -> i64 {
        self.wall_clock_at_reference + (event_timestamp - self.reference_timestamp) - stream_delay_ms
    }
}

/// Holder for the single active anchor of a session.
///
/// Replacing the anchor swaps the whole value; there is never a half-updated anchor.
#[derive(Debug, Clone, Default)]
pub struct ClockSync {
    anchor: Option<ClockAnchor>,
}

impl ClockSync {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<&ClockAnchor> {
        self.anchor.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.anchor.is_some()
    }

    pub fn set(&mut self, anchor: ClockAnchor) {
        self.anchor = Some(anchor);
    }

    /// Drop the anchor; playback falls back to always showing the latest sample.
    pub fn clear(&mut self) {
        if self.anchor.take().is_some() {
            info!("Clock anchor cleared, showing latest feed state");
        }
    }

    /// Anchor to the sample closest to the given game clock.
    ///
    /// On a miss the previous anchor (if any) is kept and `None` is returned.
    pub fn sync_to(
        &mut self,
        target_clock: &str,
        target_period: Option<u32>,
        timeline: &GameStateTimeline,
        now: i64,
    ) -> Option<ClockAnchor> {
        let found = match timeline.find_nearest_by_game_clock(target_clock, target_period) {
            Some(found) => found,
            None => {
                debug!(
                    "Clock sync miss for {} (period {:?}), keeping previous anchor",
                    target_clock, target_period
                );
                return None;
            }
        };

        let anchor = ClockAnchor::new(found.sample.timestamp, now);
        info!(
            "Clock anchored: Q{} {} -> feed ts {} ({:.1}s behind live)",
            found.sample.state.period,
            format_clock(&found.sample.state.clock),
            anchor.reference_timestamp,
            found.delay_seconds
        );
        self.anchor = Some(anchor);
        Some(anchor)
    }

    /// Projected feed position at `now`, or `None` without an anchor or data
    pub fn project(
        &self,
        now: i64,
        stream_delay_ms: i64,
        timeline: &GameStateTimeline,
    ) -> Option<Projection> {
        let anchor = self.anchor?;
        let latest = timeline.latest_timestamp()?;
        Some(anchor.project(now, stream_delay_ms, latest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::GameState;

    fn timeline() -> GameStateTimeline {
        let mut timeline = GameStateTimeline::default();
        timeline.push(GameState::new(2, "6:00"), 10_000);
        timeline.push(GameState::new(2, "5:45"), 25_000);
        timeline.push(GameState::new(2, "5:30"), 40_000);
        timeline
    }

    #[test]
    fn test_sync_to_sets_anchor() {
        let mut sync = ClockSync::new();
        let anchor = sync.sync_to("5:45", Some(2), &timeline(), 1_000_000).unwrap();
        assert_eq!(anchor.reference_timestamp, 25_000);
        assert_eq!(anchor.wall_clock_at_reference, 1_000_000);
        assert_eq!(sync.current(), Some(&anchor));
    }

    #[test]
    fn test_sync_miss_keeps_previous_anchor() {
        let mut sync = ClockSync::new();
        sync.set(ClockAnchor::new(1, 2));
        assert!(sync.sync_to("5:45", Some(4), &timeline(), 99).is_none());
        assert_eq!(sync.current(), Some(&ClockAnchor::new(1, 2)));
    }

    #[test]
    fn test_projection_advances_with_wall_time() {
        let anchor = ClockAnchor::new(25_000, 1_000_000);
        let p = anchor.project(1_005_000, 0, 40_000);
        assert_eq!(p.target_timestamp, 30_000);
        assert!(!p.clamped);
        assert_eq!(p.elapsed_ms, 5_000);
    }

    #[test]
    fn test_projection_subtracts_stream_delay() {
        let anchor = ClockAnchor::new(25_000, 1_000_000);
        let p = anchor.project(1_010_000, 4_000, 40_000);
        assert_eq!(p.target_timestamp, 31_000);
    }

    #[test]
    fn test_projection_never_passes_latest_sample() {
        let anchor = ClockAnchor::new(25_000, 1_000_000);
        let p = anchor.project(1_100_000, 0, 40_000);
        assert_eq!(p.target_timestamp, 40_000);
        assert!(p.clamped);
    }

    #[test]
    fn test_appearance_time() {
        let anchor = ClockAnchor::new(25_000, 1_000_000);
        assert_eq!(anchor.appearance_time(35_000, 2_000), 1_008_000);
    }

    #[test]
    fn test_clear_drops_anchor() {
        let mut sync = ClockSync::new();
        sync.set(ClockAnchor::new(1, 2));
        sync.clear();
        assert!(!sync.is_active());
        assert!(sync.project(10, 0, &timeline()).is_none());
    }
}
