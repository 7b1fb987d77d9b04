//! Outbound session events consumed by presentation.

use crate::display::ActiveShotOdds;
use crate::models::{ParticipantLabel, ShotType};
use crate::scoring::PointsBreakdown;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointsPopup {
    /// Participant display name, or the seat label when unnamed
    pub label: String,
    pub value: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    WindowOpened {
        countdown: u8,
        odds: ActiveShotOdds,
        shooter: String,
        is_three: bool,
    },
    CountdownTick {
        remaining: u8,
    },
    WindowClosed,
    ShotResultAvailable {
        made: bool,
        shot_type: ShotType,
        points: Option<u8>,
        shooter: String,
        team: Option<String>,
    },
    PointsEarned {
        deltas: BTreeMap<ParticipantLabel, i64>,
        display: BTreeMap<ParticipantLabel, PointsBreakdown>,
        popup: Option<PointsPopup>,
    },
    DisplayReset,
}

impl SessionEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            SessionEvent::WindowOpened { .. } => "window_opened",
            SessionEvent::CountdownTick { .. } => "countdown_tick",
            SessionEvent::WindowClosed => "window_closed",
            SessionEvent::ShotResultAvailable { .. } => "shot_result_available",
            SessionEvent::PointsEarned { .. } => "points_earned",
            SessionEvent::DisplayReset => "display_reset",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_serialize_with_type_tag() {
        let event = SessionEvent::CountdownTick { remaining: 2 };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "countdown_tick");
        assert_eq!(json["remaining"], 2);

        let mut deltas = BTreeMap::new();
        deltas.insert(ParticipantLabel::Left, 2000);
        let earned = SessionEvent::PointsEarned {
            deltas,
            display: BTreeMap::new(),
            popup: Some(PointsPopup {
                label: "Sam".to_string(),
                value: 1000,
            }),
        };
        let json = serde_json::to_value(&earned).unwrap();
        assert_eq!(json["deltas"]["Left"], 2000);
        assert_eq!(json["popup"]["label"], "Sam");
        assert_eq!(earned.kind(), "points_earned");
    }
}
