//! Point resolution for a finished prediction window.
//!
//! Each seat's delta is computed independently from a single consistent
//! `(outcome, snapshot)` pair:
//!
//! ```text
//! final = round(±base × shot_multiplier × streak_multiplier × odds_factor)
//! ```

use crate::config::DEFAULT_BASE_POINTS;
use crate::models::{ParticipantLabel, ShotType};
use crate::odds::ShootingOdds;
use crate::window::PredictionSnapshot;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Streak bonus added per consecutive make after the first
pub const STREAK_STEP: f64 = 0.2;

/// Multiplier for a made shot whose gesture class was called correctly
pub const SHOT_MATCH_MULTIPLIER: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShotOutcome {
    pub is_made: bool,
    pub actual_shot_type: ShotType,
}

/// Per-seat breakdown shown next to the seat's score
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointsBreakdown {
    /// Signed base delta (negative on a miss)
    pub base_points: i64,
    pub shot_multiplier: f64,
    pub streak_multiplier: f64,
    pub odds_multiplier: f64,
    pub final_points: i64,
}

/// Consecutive-make counters per seat
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreakState {
    streaks: BTreeMap<ParticipantLabel, u32>,
}

impl StreakState {
    pub fn get(&self, label: ParticipantLabel) -> u32 {
        self.streaks.get(&label).copied().unwrap_or(0)
    }

    pub fn set(&mut self, label: ParticipantLabel, streak: u32) {
        self.streaks.insert(label, streak);
    }

    pub fn reset(&mut self, label: ParticipantLabel) {
        self.streaks.remove(&label);
    }
}

/// Single-participant popup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoloPopup {
    pub label: ParticipantLabel,
    /// Base delta of the shot, before multipliers
    pub value: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub outcome: ShotOutcome,
    pub odds: ShootingOdds,
    pub base_delta: i64,
    /// Seats that had a prediction and an occupant
    pub participants: Vec<ParticipantLabel>,
    pub deltas: BTreeMap<ParticipantLabel, i64>,
    pub display: BTreeMap<ParticipantLabel, PointsBreakdown>,
    pub next_streaks: StreakState,
    /// Presentation preview per seat; `None` for empty seats
    pub lanes: BTreeMap<ParticipantLabel, Option<f64>>,
    pub popup: Option<SoloPopup>,
}

/// `1.0` for a streak of 0 or 1, then `+0.2` per additional make
pub fn streak_multiplier(streak: u32) -> f64 {
    1.0 + streak.saturating_sub(1) as f64 * STREAK_STEP
}

/// Round half up, matching how the displayed totals have always been rounded
pub fn round_points(value: f64) -> i64 {
    (value + 0.5).floor() as i64
}

pub fn final_delta(base_delta: i64, shot_multiplier: f64, streak_multiplier: f64, odds_factor: f64) -> i64 {
    round_points(base_delta as f64 * shot_multiplier * streak_multiplier * odds_factor)
}

#[derive(Debug, Clone, Copy)]
pub struct ScoringEngine {
    base_points: i64,
}

impl Default for ScoringEngine {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_POINTS)
    }
}

impl ScoringEngine {
    pub fn new(base_points: i64) -> Self {
        Self { base_points }
    }

    pub fn base_points(&self) -> i64 {
        self.base_points
    }

    /// Score one shot for every occupied seat that has a snapshot prediction.
    ///
    /// Seats without a prediction get no delta and keep their streak.
    pub fn resolve(
        &self,
        outcome: ShotOutcome,
        snapshot: &PredictionSnapshot,
        occupied: &[ParticipantLabel],
        streaks: &StreakState,
        odds: &ShootingOdds,
    ) -> Resolution {
        let base_delta = if outcome.is_made {
            self.base_points
        } else {
            -self.base_points
        };
        let odds_factor = odds.factor_for(outcome.is_made);

        let participants: Vec<ParticipantLabel> = ParticipantLabel::ALL
            .into_iter()
            .filter(|label| occupied.contains(label) && snapshot.contains(*label))
            .collect();

        let mut deltas = BTreeMap::new();
        let mut display = BTreeMap::new();
        let mut next_streaks = streaks.clone();

        for label in &participants {
            let predicted = snapshot.latest(*label).and_then(|p| p.shot_type);
            let shot_multiplier = if outcome.is_made && predicted == Some(outcome.actual_shot_type) {
                SHOT_MATCH_MULTIPLIER
            } else {
                1.0
            };

            let new_streak = if outcome.is_made {
                streaks.get(*label) + 1
            } else {
                0
            };
            next_streaks.set(*label, new_streak);

            let streak_mult = streak_multiplier(new_streak);
            let delta = final_delta(base_delta, shot_multiplier, streak_mult, odds_factor);

            debug!(
                "{}: {} x{} x{:.1} x{:.2} = {}",
                label, base_delta, shot_multiplier, streak_mult, odds_factor, delta
            );

            deltas.insert(*label, delta);
            display.insert(
                *label,
                PointsBreakdown {
                    base_points: base_delta,
                    shot_multiplier,
                    streak_multiplier: streak_mult,
                    odds_multiplier: odds_factor,
                    final_points: delta,
                },
            );
        }

        let lanes = lane_breakdown(outcome, base_delta, odds_factor, snapshot, &participants, occupied);
        let popup = match participants.as_slice() {
            [only] => Some(SoloPopup {
                label: *only,
                value: base_delta,
            }),
            _ => None,
        };

        Resolution {
            outcome,
            odds: *odds,
            base_delta,
            participants,
            deltas,
            display,
            next_streaks,
            lanes,
            popup,
        }
    }
}

/// Lane preview: a gesture match doubles the lane whether or not the shot fell
fn lane_breakdown(
    outcome: ShotOutcome,
    base_delta: i64,
    odds_factor: f64,
    snapshot: &PredictionSnapshot,
    participants: &[ParticipantLabel],
    occupied: &[ParticipantLabel],
) -> BTreeMap<ParticipantLabel, Option<f64>> {
    let mut lanes: BTreeMap<ParticipantLabel, Option<f64>> =
        ParticipantLabel::ALL.into_iter().map(|l| (l, None)).collect();

    for label in participants {
        let predicted = snapshot.latest(*label).and_then(|p| p.shot_type);
        let matched = if predicted == Some(outcome.actual_shot_type) {
            SHOT_MATCH_MULTIPLIER
        } else {
            1.0
        };
        lanes.insert(*label, Some(base_delta as f64 * matched * odds_factor));
    }
    for label in occupied {
        if !participants.contains(label) {
            lanes.insert(*label, Some(0.0));
        }
    }
    lanes
}
