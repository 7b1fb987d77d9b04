//! Prediction window state machine.
//!
//! `Closed -> Open -> Resolving -> Closed`. The countdown and the reveal delay
//! run on wall-clock deadlines owned by the window, independent of feed
//! polling, so an opened window always runs to completion.

use crate::config::{
    DEFAULT_COUNTDOWN_TICKS, DEFAULT_COUNTDOWN_TICK_MS, DEFAULT_PREDICTION_BUFFER,
    DEFAULT_REVEAL_DELAY_MS,
};
use crate::models::{ParticipantLabel, Prediction};
use std::collections::{BTreeMap, VecDeque};
use tracing::{debug, info};

/// Latest prediction per seat, frozen when the window stops accepting input
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PredictionSnapshot {
    latest: BTreeMap<ParticipantLabel, Prediction>,
}

impl PredictionSnapshot {
    pub fn latest(&self, label: ParticipantLabel) -> Option<&Prediction> {
        self.latest.get(&label)
    }

    pub fn labels(&self) -> impl Iterator<Item = ParticipantLabel> + '_ {
        self.latest.keys().copied()
    }

    pub fn contains(&self, label: ParticipantLabel) -> bool {
        self.latest.contains_key(&label)
    }

    pub fn len(&self) -> usize {
        self.latest.len()
    }

    pub fn is_empty(&self) -> bool {
        self.latest.is_empty()
    }

    pub fn insert(&mut self, label: ParticipantLabel, prediction: Prediction) {
        self.latest.insert(label, prediction);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WindowPhase {
    Closed,
    Open {
        opened_at: i64,
        remaining: u8,
    },
    Resolving {
        snapshot: PredictionSnapshot,
        resolve_at: i64,
    },
}

impl WindowPhase {
    pub fn name(&self) -> &'static str {
        match self {
            WindowPhase::Closed => "CLOSED",
            WindowPhase::Open { .. } => "OPEN",
            WindowPhase::Resolving { .. } => "RESOLVING",
        }
    }
}

/// One transition produced by `advance`
#[derive(Debug, Clone, PartialEq)]
pub enum WindowStep {
    /// Countdown moved down one tick and the window is still open
    Tick { remaining: u8 },
    /// Countdown finished; predictions are frozen until resolution
    Closed { snapshot: PredictionSnapshot },
    /// Reveal delay elapsed; score this snapshot. The window is CLOSED again.
    Resolve(PredictionSnapshot),
}

#[derive(Debug, Clone)]
pub struct PredictionWindow {
    phase: WindowPhase,
    buffers: BTreeMap<ParticipantLabel, VecDeque<Prediction>>,
    buffer_capacity: usize,
    countdown_ticks: u8,
    tick_ms: i64,
    reveal_delay_ms: i64,
}

impl Default for PredictionWindow {
    fn default() -> Self {
        Self::new(
            DEFAULT_PREDICTION_BUFFER,
            DEFAULT_COUNTDOWN_TICKS,
            DEFAULT_COUNTDOWN_TICK_MS,
            DEFAULT_REVEAL_DELAY_MS,
        )
    }
}

impl PredictionWindow {
    pub fn new(buffer_capacity: usize, countdown_ticks: u8, tick_ms: i64, reveal_delay_ms: i64) -> Self {
        Self {
            phase: WindowPhase::Closed,
            buffers: BTreeMap::new(),
            buffer_capacity: buffer_capacity.max(1),
            countdown_ticks: countdown_ticks.max(1),
            tick_ms: tick_ms.max(1),
            reveal_delay_ms: reveal_delay_ms.max(0),
        }
    }

    pub fn phase(&self) -> &WindowPhase {
        &self.phase
    }

    pub fn is_open(&self) -> bool {
        matches!(self.phase, WindowPhase::Open { .. })
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.phase, WindowPhase::Closed)
    }

    pub fn countdown_ticks(&self) -> u8 {
        self.countdown_ticks
    }

    /// Open the window, clearing every seat's buffer.
    ///
    /// Returns false (and does nothing) unless the window is CLOSED.
    pub fn open(&mut self, now: i64) -> bool {
        if !self.is_closed() {
            debug!("Ignoring open() while window is {}", self.phase.name());
            return false;
        }
        self.buffers.clear();
        self.phase = WindowPhase::Open {
            opened_at: now,
            remaining: self.countdown_ticks,
        };
        info!("Prediction window opened ({} tick countdown)", self.countdown_ticks);
        true
    }

    /// Append a prediction to the seat's buffer.
    ///
    /// Dropped when no seat is given or the window is not OPEN.
    pub fn record(&mut self, label: Option<ParticipantLabel>, prediction: Prediction) -> bool {
        let label = match label {
            Some(label) if self.is_open() => label,
            _ => return false,
        };
        let buffer = self.buffers.entry(label).or_default();
        buffer.push_back(prediction);
        while buffer.len() > self.buffer_capacity {
            buffer.pop_front();
        }
        true
    }

    /// Buffered predictions for a seat, oldest first
    pub fn predictions(&self, label: ParticipantLabel) -> impl Iterator<Item = &Prediction> {
        self.buffers.get(&label).into_iter().flat_map(|b| b.iter())
    }

    pub fn snapshot(&self) -> PredictionSnapshot {
        let mut snapshot = PredictionSnapshot::default();
        for (label, buffer) in &self.buffers {
            if let Some(last) = buffer.back() {
                snapshot.insert(*label, last.clone());
            }
        }
        snapshot
    }

    /// Next wall-clock instant `advance` has work to do
    pub fn next_deadline(&self) -> Option<i64> {
        match &self.phase {
            WindowPhase::Closed => None,
            WindowPhase::Open { opened_at, remaining } => {
                let elapsed_ticks = (self.countdown_ticks - remaining) as i64 + 1;
                Some(opened_at + elapsed_ticks * self.tick_ms)
            }
            WindowPhase::Resolving { resolve_at, .. } => Some(*resolve_at),
        }
    }

    /// Apply at most one due transition. Call until it returns `None`.
    pub fn advance(&mut self, now: i64) -> Option<WindowStep> {
        let due = self.next_deadline()?;
        if now < due {
            return None;
        }

        match std::mem::replace(&mut self.phase, WindowPhase::Closed) {
            WindowPhase::Closed => None,
            WindowPhase::Open { opened_at, remaining } => {
                let remaining = remaining.saturating_sub(1);
                if remaining > 0 {
                    self.phase = WindowPhase::Open { opened_at, remaining };
                    return Some(WindowStep::Tick { remaining });
                }
                let snapshot = self.snapshot();
                info!(
                    "Prediction window closed with {} seat(s) predicting",
                    snapshot.len()
                );
                self.phase = WindowPhase::Resolving {
                    snapshot: snapshot.clone(),
                    resolve_at: due + self.reveal_delay_ms,
                };
                Some(WindowStep::Closed { snapshot })
            }
            WindowPhase::Resolving { snapshot, .. } => Some(WindowStep::Resolve(snapshot)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ShotType;

    fn guess(ts: i64, shot_type: ShotType) -> Prediction {
        Prediction {
            timestamp: ts,
            period: 2,
            clock: "5:23".to_string(),
            shot_type: Some(shot_type),
        }
    }

    fn drain(window: &mut PredictionWindow, now: i64) -> Vec<WindowStep> {
        let mut steps = Vec::new();
        while let Some(step) = window.advance(now) {
            steps.push(step);
        }
        steps
    }

    #[test]
    fn test_full_lifecycle_timing() {
        let mut window = PredictionWindow::default();
        assert!(window.open(10_000));
        assert_eq!(window.next_deadline(), Some(11_000));

        assert!(drain(&mut window, 10_999).is_empty());
        assert_eq!(drain(&mut window, 11_000), vec![WindowStep::Tick { remaining: 2 }]);
        assert_eq!(drain(&mut window, 12_000), vec![WindowStep::Tick { remaining: 1 }]);

        let steps = drain(&mut window, 13_000);
        assert!(matches!(steps.as_slice(), [WindowStep::Closed { .. }]));
        assert_eq!(window.phase().name(), "RESOLVING");
        assert_eq!(window.next_deadline(), Some(16_000));

        let steps = drain(&mut window, 16_000);
        assert!(matches!(steps.as_slice(), [WindowStep::Resolve(_)]));
        assert!(window.is_closed());
        assert_eq!(window.next_deadline(), None);
    }

    #[test]
    fn test_late_advance_catches_up_in_order() {
        let mut window = PredictionWindow::default();
        window.open(0);
        let steps = drain(&mut window, 60_000);
        assert_eq!(steps.len(), 4);
        assert!(matches!(steps[3], WindowStep::Resolve(_)));
    }

    #[test]
    fn test_record_dropped_while_closed() {
        let mut window = PredictionWindow::default();
        assert!(!window.record(Some(ParticipantLabel::Left), guess(1, ShotType::Dunk)));

        window.open(100);
        assert!(window.snapshot().is_empty());
        assert!(window.record(Some(ParticipantLabel::Left), guess(200, ShotType::Layup)));
        assert!(!window.record(None, guess(200, ShotType::Layup)));

        let snapshot = window.snapshot();
        assert_eq!(
            snapshot.latest(ParticipantLabel::Left).and_then(|p| p.shot_type),
            Some(ShotType::Layup)
        );
    }

    #[test]
    fn test_snapshot_frozen_at_close() {
        let mut window = PredictionWindow::default();
        window.open(0);
        window.record(Some(ParticipantLabel::Center), guess(500, ShotType::Normal));
        let closed = drain(&mut window, 3_000);
        let frozen = match closed.last() {
            Some(WindowStep::Closed { snapshot }) => snapshot.clone(),
            other => panic!("expected close, got {:?}", other),
        };

        // Late gesture while resolving is ignored
        assert!(!window.record(Some(ParticipantLabel::Center), guess(3_500, ShotType::Dunk)));
        let resolved = drain(&mut window, 6_000);
        assert_eq!(resolved, vec![WindowStep::Resolve(frozen)]);
    }

    #[test]
    fn test_buffer_keeps_latest_ten() {
        let mut window = PredictionWindow::default();
        window.open(0);
        for i in 0..15 {
            window.record(Some(ParticipantLabel::Right), guess(i, ShotType::Normal));
        }
        let kept: Vec<i64> = window.predictions(ParticipantLabel::Right).map(|p| p.timestamp).collect();
        assert_eq!(kept, (5..15).collect::<Vec<_>>());
    }

    #[test]
    fn test_buffers_survive_resolution_until_next_open() {
        let mut window = PredictionWindow::default();
        window.open(0);
        window.record(Some(ParticipantLabel::Left), guess(1, ShotType::Dunk));
        drain(&mut window, 10_000);
        assert!(window.is_closed());
        assert_eq!(window.predictions(ParticipantLabel::Left).count(), 1);

        window.open(20_000);
        assert_eq!(window.predictions(ParticipantLabel::Left).count(), 0);
    }

    #[test]
    fn test_open_rejected_while_busy() {
        let mut window = PredictionWindow::default();
        assert!(window.open(0));
        assert!(!window.open(500));
        drain(&mut window, 3_000);
        assert!(!window.open(3_500));
    }
}
