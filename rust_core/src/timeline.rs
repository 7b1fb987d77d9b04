//! Rolling timeline of observed game states.
//!
//! This module provides:
//! - Capacity-bounded append with oldest eviction
//! - Lookup by nearest wall-clock timestamp (never later than the target)
//! - Lookup by nearest in-game clock within a period
//! - Atomic replacement for historical bulk loads

use crate::clock::{decode_clock, format_clock};
use crate::config::{DEFAULT_TIMELINE_CAPACITY, TIMELINE_GAP_WARN_MS};
use crate::models::GameState;
use std::collections::VecDeque;
use tracing::warn;

/// One observed state and the wall-clock millis it was observed at
#[derive(Debug, Clone, PartialEq)]
pub struct TimelineSample {
    /// Monotonic per-timeline sequence number, used to detect "same sample again"
    pub seq: u64,
    pub state: GameState,
    pub timestamp: i64,
}

/// Result of a game-clock lookup
#[derive(Debug, Clone, Copy)]
pub struct ClockMatch<'a> {
    pub sample: &'a TimelineSample,
    /// How far behind the latest sample the match is, in seconds
    pub delay_seconds: f64,
}

#[derive(Debug, Clone)]
pub struct GameStateTimeline {
    samples: VecDeque<TimelineSample>,
    capacity: usize,
    next_seq: u64,
}

impl Default for GameStateTimeline {
    fn default() -> Self {
        Self::new(DEFAULT_TIMELINE_CAPACITY)
    }
}

impl GameStateTimeline {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity.min(1024)),
            capacity: capacity.max(1),
            next_seq: 0,
        }
    }

    /// Append a sample, evicting the oldest entries beyond capacity.
    ///
    /// Returns the sequence number assigned to the sample.
    pub fn push(&mut self, state: GameState, timestamp: i64) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.samples.push_back(TimelineSample {
            seq,
            state,
            timestamp,
        });
        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
        seq
    }

    /// Replace the whole timeline in one step.
    ///
    /// A bulk load defines the timeline as given; capacity applies again from the next push.
    pub fn reset(&mut self, items: Vec<(GameState, i64)>) {
        let mut samples = VecDeque::with_capacity(items.len());
        for (state, timestamp) in items {
            samples.push_back(TimelineSample {
                seq: self.next_seq,
                state,
                timestamp,
            });
            self.next_seq += 1;
        }
        self.samples = samples;
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &TimelineSample> {
        self.samples.iter()
    }

    pub fn earliest(&self) -> Option<&TimelineSample> {
        self.samples.front()
    }

    pub fn latest(&self) -> Option<&TimelineSample> {
        self.samples.back()
    }

    pub fn latest_timestamp(&self) -> Option<i64> {
        self.samples.back().map(|s| s.timestamp)
    }

    /// Sample with the greatest timestamp not after `target`.
    ///
    /// Falls back to the earliest sample when every sample is after the target.
    pub fn find_nearest_by_timestamp(&self, target: i64) -> Option<&TimelineSample> {
        let first = self.samples.front()?;

        let mut best: Option<(usize, &TimelineSample)> = None;
        for (idx, sample) in self.samples.iter().enumerate() {
            if sample.timestamp <= target {
                let better = best
                    .map(|(_, b)| sample.timestamp > b.timestamp)
                    .unwrap_or(true);
                if better {
                    best = Some((idx, sample));
                }
            }
        }

        let (idx, sample) = match best {
            Some(found) => found,
            None => return Some(first),
        };

        if let Some(next) = self.samples.get(idx + 1) {
            let gap = next.timestamp - sample.timestamp;
            if target > sample.timestamp && gap > TIMELINE_GAP_WARN_MS {
                warn!(
                    "Timeline gap: stuck at Q{} {} | next sample is {:.1}s away",
                    sample.state.period,
                    format_clock(&sample.state.clock),
                    gap as f64 / 1000.0
                );
            }
        }

        Some(sample)
    }

    /// Sample in `period` whose clock is closest to `target_clock`.
    ///
    /// `period` defaults to the latest sample's period. Ties keep the first
    /// sample encountered. An empty target clock matches nothing.
    pub fn find_nearest_by_game_clock(
        &self,
        target_clock: &str,
        period: Option<u32>,
    ) -> Option<ClockMatch<'_>> {
        if target_clock.trim().is_empty() {
            return None;
        }
        let latest = self.samples.back()?;
        let search_period = period.unwrap_or(latest.state.period);
        let target_seconds = decode_clock(target_clock) as i64;

        let mut closest: Option<(&TimelineSample, i64)> = None;
        for sample in &self.samples {
            if sample.state.period != search_period {
                continue;
            }
            let diff = (decode_clock(&sample.state.clock) as i64 - target_seconds).abs();
            let better = closest.map(|(_, d)| diff < d).unwrap_or(true);
            if better {
                closest = Some((sample, diff));
            }
        }

        closest.map(|(sample, _)| ClockMatch {
            sample,
            delay_seconds: (latest.timestamp - sample.timestamp) as f64 / 1000.0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(period: u32, clock: &str) -> GameState {
        GameState::new(period, clock)
    }

    fn timeline_of(items: &[(u32, &str, i64)]) -> GameStateTimeline {
        let mut timeline = GameStateTimeline::default();
        for (period, clock, ts) in items {
            timeline.push(state(*period, clock), *ts);
        }
        timeline
    }

    #[test]
    fn test_push_evicts_oldest_beyond_capacity() {
        let mut timeline = GameStateTimeline::new(3);
        for i in 0..5 {
            timeline.push(state(1, "12:00"), i * 100);
        }
        assert_eq!(timeline.len(), 3);
        assert_eq!(timeline.earliest().unwrap().timestamp, 200);
        assert_eq!(timeline.latest().unwrap().timestamp, 400);
        assert_eq!(timeline.latest().unwrap().seq, 4);
    }

    #[test]
    fn test_nearest_by_timestamp_picks_floor() {
        let timeline = timeline_of(&[(1, "12:00", 1_000), (1, "11:50", 2_000), (1, "11:40", 3_000)]);
        assert_eq!(timeline.find_nearest_by_timestamp(2_500).unwrap().timestamp, 2_000);
        assert_eq!(timeline.find_nearest_by_timestamp(2_000).unwrap().timestamp, 2_000);
    }

    #[test]
    fn test_nearest_by_timestamp_before_all_returns_earliest() {
        let timeline = timeline_of(&[(1, "12:00", 1_000), (1, "11:50", 2_000)]);
        assert_eq!(timeline.find_nearest_by_timestamp(10).unwrap().timestamp, 1_000);
    }

    #[test]
    fn test_nearest_by_timestamp_after_all_returns_latest() {
        let timeline = timeline_of(&[(1, "12:00", 1_000), (1, "11:50", 2_000)]);
        assert_eq!(timeline.find_nearest_by_timestamp(99_999).unwrap().timestamp, 2_000);
    }

    #[test]
    fn test_nearest_by_timestamp_empty() {
        let timeline = GameStateTimeline::default();
        assert!(timeline.find_nearest_by_timestamp(0).is_none());
    }

    #[test]
    fn test_nearest_by_game_clock_within_period() {
        let timeline = timeline_of(&[
            (1, "PT01M00.00S", 1_000),
            (2, "PT05M30.00S", 2_000),
            (2, "PT05M20.00S", 3_000),
            (2, "PT05M00.00S", 4_000),
        ]);
        let found = timeline.find_nearest_by_game_clock("5:23", Some(2)).unwrap();
        assert_eq!(found.sample.timestamp, 3_000);
        assert!((found.delay_seconds - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_nearest_by_game_clock_defaults_to_latest_period() {
        let timeline = timeline_of(&[(1, "5:23", 1_000), (2, "8:00", 2_000), (2, "6:00", 3_000)]);
        let found = timeline.find_nearest_by_game_clock("5:23", None).unwrap();
        assert_eq!(found.sample.timestamp, 3_000);
    }

    #[test]
    fn test_nearest_by_game_clock_ties_keep_first() {
        let timeline = timeline_of(&[(1, "5:30", 1_000), (1, "5:10", 2_000)]);
        let found = timeline.find_nearest_by_game_clock("5:20", Some(1)).unwrap();
        assert_eq!(found.sample.timestamp, 1_000);
    }

    #[test]
    fn test_nearest_by_game_clock_misses() {
        let timeline = timeline_of(&[(1, "5:30", 1_000)]);
        assert!(timeline.find_nearest_by_game_clock("5:30", Some(3)).is_none());
        assert!(timeline.find_nearest_by_game_clock("", Some(1)).is_none());
    }

    #[test]
    fn test_reset_replaces_everything() {
        let mut timeline = timeline_of(&[(1, "12:00", 1_000)]);
        let first_seq = timeline.latest().unwrap().seq;
        timeline.reset(vec![(state(2, "6:00"), 50), (state(2, "5:50"), 60)]);
        assert_eq!(timeline.len(), 2);
        assert_eq!(timeline.earliest().unwrap().timestamp, 50);
        assert!(timeline.earliest().unwrap().seq > first_seq);
    }
}
