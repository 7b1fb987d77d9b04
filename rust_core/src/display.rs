//! Presentation state for the shot experience.
//!
//! The state is only ever changed by `reduce`, one explicit transition at a
//! time, so any sequence of transitions can be replayed and asserted on.

use crate::config::DEFAULT_COUNTDOWN_TICKS;
use crate::models::{ParticipantLabel, ShotType};
use crate::odds::{ShootingOdds, StatLabel};
use crate::scoring::{PointsBreakdown, StreakState};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Odds shown on the incoming-shot prompt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveShotOdds {
    pub player_name: String,
    pub percentage: Option<f64>,
    pub stat_label: Option<StatLabel>,
    pub reward_multiplier: f64,
    pub loss_multiplier: f64,
    pub is_three: bool,
}

impl ActiveShotOdds {
    pub fn new(player_name: &str, odds: &ShootingOdds, is_three: bool) -> Self {
        Self {
            player_name: player_name.to_string(),
            percentage: odds.percentage,
            stat_label: odds.stat_label,
            reward_multiplier: odds.reward_multiplier,
            loss_multiplier: odds.loss_multiplier,
            is_three,
        }
    }
}

/// Shot shown on the result overlay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShotDisplay {
    pub player_name: String,
    pub team_tricode: Option<String>,
    pub shot_result: String,
    pub shot_type: Option<String>,
    pub gesture_class: ShotType,
    pub points: Option<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Overlay {
    Score,
    Miss,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeatPointsDisplay {
    pub show: bool,
    pub points: i64,
    pub base_points: i64,
    pub shot_multiplier: f64,
    pub streak_multiplier: f64,
    pub odds_multiplier: f64,
}

impl SeatPointsDisplay {
    pub fn hidden() -> Self {
        Self {
            show: false,
            points: 0,
            base_points: 0,
            shot_multiplier: 1.0,
            streak_multiplier: 1.0,
            odds_multiplier: 1.0,
        }
    }
}

impl From<&PointsBreakdown> for SeatPointsDisplay {
    fn from(b: &PointsBreakdown) -> Self {
        Self {
            show: true,
            points: b.final_points,
            base_points: b.base_points,
            shot_multiplier: b.shot_multiplier,
            streak_multiplier: b.streak_multiplier,
            odds_multiplier: b.odds_multiplier,
        }
    }
}

fn hidden_seats() -> BTreeMap<ParticipantLabel, SeatPointsDisplay> {
    ParticipantLabel::ALL
        .into_iter()
        .map(|l| (l, SeatPointsDisplay::hidden()))
        .collect()
}

fn empty_lanes() -> BTreeMap<ParticipantLabel, Option<f64>> {
    ParticipantLabel::ALL.into_iter().map(|l| (l, None)).collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShotExperienceState {
    pub show_shot_incoming: bool,
    pub shot_countdown: u8,
    pub active_shot_odds: Option<ActiveShotOdds>,
    pub prediction_window_active: bool,
    pub show_shot_result: bool,
    pub current_shot: Option<ShotDisplay>,
    pub overlay: Option<Overlay>,
    pub show_money_rain: bool,
    pub seat_points: BTreeMap<ParticipantLabel, SeatPointsDisplay>,
    pub streaks: StreakState,
    pub lane_points: BTreeMap<ParticipantLabel, Option<f64>>,
    pub show_points_earned: bool,
    pub points_earned: i64,
    pub points_earned_label: Option<String>,
}

impl Default for ShotExperienceState {
    fn default() -> Self {
        Self {
            show_shot_incoming: false,
            shot_countdown: DEFAULT_COUNTDOWN_TICKS,
            active_shot_odds: None,
            prediction_window_active: false,
            show_shot_result: false,
            current_shot: None,
            overlay: None,
            show_money_rain: false,
            seat_points: hidden_seats(),
            streaks: StreakState::default(),
            lane_points: empty_lanes(),
            show_points_earned: false,
            points_earned: 0,
            points_earned_label: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    WindowOpened {
        countdown: u8,
        odds: ActiveShotOdds,
    },
    CountdownTick {
        remaining: u8,
    },
    WindowClosed,
    OutcomeResolved {
        shot: ShotDisplay,
        made: bool,
        seats: BTreeMap<ParticipantLabel, PointsBreakdown>,
        streaks: StreakState,
        lanes: BTreeMap<ParticipantLabel, Option<f64>>,
        /// Solo popup label and value
        popup: Option<(String, i64)>,
    },
    DisplayReset,
    LaneReset,
    PointsEarnedCleared,
    ResultCleared,
    MoneyRainCleared,
}

impl Transition {
    pub fn name(&self) -> &'static str {
        match self {
            Transition::WindowOpened { .. } => "WindowOpened",
            Transition::CountdownTick { .. } => "CountdownTick",
            Transition::WindowClosed => "WindowClosed",
            Transition::OutcomeResolved { .. } => "OutcomeResolved",
            Transition::DisplayReset => "DisplayReset",
            Transition::LaneReset => "LaneReset",
            Transition::PointsEarnedCleared => "PointsEarnedCleared",
            Transition::ResultCleared => "ResultCleared",
            Transition::MoneyRainCleared => "MoneyRainCleared",
        }
    }
}

pub fn reduce(state: ShotExperienceState, transition: Transition) -> ShotExperienceState {
    match transition {
        Transition::WindowOpened { countdown, odds } => ShotExperienceState {
            show_shot_incoming: true,
            shot_countdown: countdown,
            active_shot_odds: Some(odds),
            prediction_window_active: true,
            ..state
        },
        Transition::CountdownTick { remaining } => ShotExperienceState {
            shot_countdown: remaining,
            ..state
        },
        Transition::WindowClosed => ShotExperienceState {
            show_shot_incoming: false,
            active_shot_odds: None,
            prediction_window_active: false,
            ..state
        },
        Transition::OutcomeResolved {
            shot,
            made,
            seats,
            streaks,
            lanes,
            popup,
        } => {
            let mut seat_points = state.seat_points.clone();
            for (label, breakdown) in &seats {
                seat_points.insert(*label, SeatPointsDisplay::from(breakdown));
            }
            let participated = !seats.is_empty();
            let (show_points_earned, points_earned, points_earned_label) = match popup {
                Some((label, value)) => (true, value, Some(label)),
                None => (false, state.points_earned, None),
            };
            ShotExperienceState {
                show_shot_result: true,
                current_shot: Some(shot),
                overlay: Some(if made { Overlay::Score } else { Overlay::Miss }),
                show_money_rain: if participated { made } else { state.show_money_rain },
                seat_points,
                streaks,
                lane_points: lanes,
                show_points_earned,
                points_earned,
                points_earned_label,
                ..state
            }
        }
        Transition::DisplayReset => ShotExperienceState {
            seat_points: hidden_seats(),
            ..state
        },
        Transition::LaneReset => ShotExperienceState {
            lane_points: empty_lanes(),
            ..state
        },
        Transition::PointsEarnedCleared => ShotExperienceState {
            show_points_earned: false,
            points_earned: 0,
            points_earned_label: None,
            ..state
        },
        Transition::ResultCleared => ShotExperienceState {
            show_shot_result: false,
            current_shot: None,
            overlay: None,
            ..state
        },
        Transition::MoneyRainCleared => ShotExperienceState {
            show_money_rain: false,
            ..state
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn odds() -> ActiveShotOdds {
        ActiveShotOdds::new("Jayson Tatum", &ShootingOdds::neutral(), true)
    }

    fn shot() -> ShotDisplay {
        ShotDisplay {
            player_name: "Jayson Tatum".to_string(),
            team_tricode: Some("BOS".to_string()),
            shot_result: "Made".to_string(),
            shot_type: Some("3PT Jump Shot".to_string()),
            gesture_class: ShotType::Normal,
            points: Some(3),
        }
    }

    fn breakdown(final_points: i64) -> PointsBreakdown {
        PointsBreakdown {
            base_points: 1000,
            shot_multiplier: 2.0,
            streak_multiplier: 1.0,
            odds_multiplier: 1.0,
            final_points,
        }
    }

    #[test]
    fn test_window_cycle() {
        let state = ShotExperienceState::default();
        let state = reduce(state, Transition::WindowOpened { countdown: 3, odds: odds() });
        assert!(state.show_shot_incoming && state.prediction_window_active);
        assert_eq!(state.shot_countdown, 3);

        let state = reduce(state, Transition::CountdownTick { remaining: 1 });
        assert_eq!(state.shot_countdown, 1);

        let state = reduce(state, Transition::WindowClosed);
        assert!(!state.show_shot_incoming);
        assert!(!state.prediction_window_active);
        assert!(state.active_shot_odds.is_none());
    }

    #[test]
    fn test_outcome_then_timed_clears() {
        let mut seats = BTreeMap::new();
        seats.insert(ParticipantLabel::Left, breakdown(2000));
        let mut streaks = StreakState::default();
        streaks.set(ParticipantLabel::Left, 1);
        let mut lanes = empty_lanes();
        lanes.insert(ParticipantLabel::Left, Some(2000.0));

        let state = reduce(
            ShotExperienceState::default(),
            Transition::OutcomeResolved {
                shot: shot(),
                made: true,
                seats,
                streaks: streaks.clone(),
                lanes,
                popup: Some(("Sam".to_string(), 1000)),
            },
        );
        assert_eq!(state.overlay, Some(Overlay::Score));
        assert!(state.show_money_rain);
        assert!(state.seat_points[&ParticipantLabel::Left].show);
        assert_eq!(state.seat_points[&ParticipantLabel::Left].points, 2000);
        assert!(!state.seat_points[&ParticipantLabel::Right].show);
        assert_eq!(state.streaks, streaks);
        assert_eq!(state.points_earned_label.as_deref(), Some("Sam"));

        let state = reduce(state, Transition::PointsEarnedCleared);
        assert!(!state.show_points_earned);
        assert_eq!(state.points_earned, 0);

        let state = reduce(state, Transition::ResultCleared);
        assert!(state.current_shot.is_none() && state.overlay.is_none());

        let state = reduce(state, Transition::DisplayReset);
        assert!(!state.seat_points[&ParticipantLabel::Left].show);

        let state = reduce(state, Transition::LaneReset);
        assert_eq!(state.lane_points[&ParticipantLabel::Left], None);

        let state = reduce(state, Transition::MoneyRainCleared);
        assert!(!state.show_money_rain);
        // Streaks persist across display resets
        assert_eq!(state.streaks.get(ParticipantLabel::Left), 1);
    }

    #[test]
    fn test_outcome_without_participants_shows_result_only() {
        let state = reduce(
            ShotExperienceState::default(),
            Transition::OutcomeResolved {
                shot: shot(),
                made: false,
                seats: BTreeMap::new(),
                streaks: StreakState::default(),
                lanes: empty_lanes(),
                popup: None,
            },
        );
        assert!(state.show_shot_result);
        assert_eq!(state.overlay, Some(Overlay::Miss));
        assert!(!state.show_money_rain);
        assert!(!state.show_points_earned);
    }
}
