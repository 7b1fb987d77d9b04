// Shared models for the Courtcall engine and services
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Game State (normalized feed sample)
// ============================================================================

/// Home/away score pair as reported by the feed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Score {
    #[serde(default)]
    pub home: u32,
    #[serde(default)]
    pub away: u32,
}

/// One normalized game-state sample produced by the feed parser.
///
/// The engine only reads `period`, `clock` and `last_shot`; the rest is carried
/// through for presentation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    #[serde(default = "default_period", deserialize_with = "deserialize_period")]
    pub period: u32,
    /// Encoded game clock, either `PT05M23.40S` or `5:23`
    #[serde(default, deserialize_with = "deserialize_nullable_string")]
    pub clock: String,
    #[serde(default)]
    pub score: Score,
    #[serde(default)]
    pub home_team: Option<String>,
    #[serde(default)]
    pub away_team: Option<String>,
    #[serde(default)]
    pub last_shot: Option<ShotEvent>,
}

impl GameState {
    pub fn new(period: u32, clock: impl Into<String>) -> Self {
        Self {
            period,
            clock: clock.into(),
            ..Default::default()
        }
    }

    pub fn with_shot(mut self, shot: ShotEvent) -> Self {
        self.last_shot = Some(shot);
        self
    }

    pub fn with_score(mut self, home: u32, away: u32) -> Self {
        self.score = Score { home, away };
        self
    }
}

fn default_period() -> u32 {
    1
}

/// Periods arrive as numbers, numeric strings or null. Anything unreadable is period 1.
fn deserialize_period<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(parse_period_value(&value))
}

pub fn parse_period_value(value: &serde_json::Value) -> u32 {
    match value {
        serde_json::Value::Number(n) => n
            .as_u64()
            .map(|p| p as u32)
            .or_else(|| n.as_f64().map(|p| p.max(0.0) as u32))
            .filter(|p| *p > 0)
            .unwrap_or(1),
        serde_json::Value::String(s) => s.trim().parse::<u32>().ok().filter(|p| *p > 0).unwrap_or(1),
        _ => 1,
    }
}

fn deserialize_nullable_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Player ids arrive as either JSON numbers or strings.
fn deserialize_player_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    match value {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(s.trim().to_string())),
        Some(serde_json::Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(de::Error::custom(format!("unexpected player id: {}", other))),
    }
}

// ============================================================================
// Shot Events
// ============================================================================

/// The most recent shot attempt attached to a game-state sample.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShotEvent {
    #[serde(default, deserialize_with = "deserialize_player_id")]
    pub player_id: Option<String>,
    #[serde(default)]
    pub player_name: Option<String>,
    #[serde(default)]
    pub team_tricode: Option<String>,
    /// Free text from the feed, usually "Made" or "Missed"
    #[serde(default)]
    pub shot_result: Option<String>,
    /// Free text from the feed, e.g. "3PT Jump Shot", "Driving Layup"
    #[serde(default)]
    pub shot_type: Option<String>,
    #[serde(default)]
    pub points: Option<u8>,
}

impl ShotEvent {
    pub fn new(player_name: &str, shot_result: &str, shot_type: &str, points: Option<u8>) -> Self {
        Self {
            player_id: None,
            player_name: Some(player_name.to_string()),
            team_tricode: None,
            shot_result: Some(shot_result.to_string()),
            shot_type: Some(shot_type.to_string()),
            points,
        }
    }

    pub fn with_player_id(mut self, player_id: &str) -> Self {
        self.player_id = Some(player_id.to_string());
        self
    }

    pub fn with_team(mut self, tricode: &str) -> Self {
        self.team_tricode = Some(tricode.to_string());
        self
    }

    /// Shooter name, if present and non-blank
    pub fn shooter(&self) -> Option<&str> {
        self.player_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }

    pub fn result(&self) -> ShotResult {
        ShotResult::parse(self.shot_result.as_deref().unwrap_or_default())
    }

    pub fn is_made(&self) -> bool {
        self.result() == ShotResult::Made
    }

    pub fn shot_class(&self) -> ShotClass {
        let three_by_points = self.points == Some(3);
        let three_by_type = self
            .shot_type
            .as_deref()
            .map(|t| t.contains('3'))
            .unwrap_or(false);
        if three_by_points || three_by_type {
            ShotClass::ThreePoint
        } else {
            ShotClass::TwoPoint
        }
    }

    /// Gesture bucket the shot falls into, for matching against predictions
    pub fn gesture_class(&self) -> ShotType {
        ShotType::classify(self.shot_type.as_deref().unwrap_or_default())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShotResult {
    Made,
    Missed,
    Other(String),
}

impl ShotResult {
    pub fn parse(raw: &str) -> Self {
        let lower = raw.to_lowercase();
        if lower.contains("made") {
            ShotResult::Made
        } else if lower.contains("miss") {
            ShotResult::Missed
        } else {
            ShotResult::Other(raw.to_string())
        }
    }
}

/// Shot classification used by the odds model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShotClass {
    TwoPoint,
    ThreePoint,
}

impl ShotClass {
    pub fn is_three(&self) -> bool {
        matches!(self, ShotClass::ThreePoint)
    }
}

/// Gesture-level shot classification shared by predictions and feed shots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShotType {
    Normal,
    Layup,
    Dunk,
}

impl ShotType {
    pub fn classify(raw: &str) -> Self {
        let lower = raw.to_lowercase();
        if lower.contains("dunk") {
            ShotType::Dunk
        } else if lower.contains("layup") {
            ShotType::Layup
        } else {
            ShotType::Normal
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ShotType::Normal => "normal",
            ShotType::Layup => "layup",
            ShotType::Dunk => "dunk",
        }
    }
}

impl fmt::Display for ShotType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Participants & Predictions
// ============================================================================

/// Seat a participant occupies in front of the camera
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ParticipantLabel {
    Left,
    Center,
    Right,
}

impl ParticipantLabel {
    pub const ALL: [ParticipantLabel; 3] = [
        ParticipantLabel::Left,
        ParticipantLabel::Center,
        ParticipantLabel::Right,
    ];

    /// Storage slot for the points store
    pub fn slot(&self) -> u8 {
        match self {
            ParticipantLabel::Left => 0,
            ParticipantLabel::Center => 1,
            ParticipantLabel::Right => 2,
        }
    }

    pub fn from_slot(slot: u8) -> Option<Self> {
        match slot {
            0 => Some(ParticipantLabel::Left),
            1 => Some(ParticipantLabel::Center),
            2 => Some(ParticipantLabel::Right),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ParticipantLabel::Left => "Left",
            ParticipantLabel::Center => "Center",
            ParticipantLabel::Right => "Right",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "left" | "left player" => Some(ParticipantLabel::Left),
            "center" | "center player" => Some(ParticipantLabel::Center),
            "right" | "right player" => Some(ParticipantLabel::Right),
            _ => None,
        }
    }
}

impl fmt::Display for ParticipantLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single gesture guess recorded while a prediction window is open
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub timestamp: i64,
    pub period: u32,
    pub clock: String,
    pub shot_type: Option<ShotType>,
}

/// Discrete event delivered by the gesture recognizer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GestureEvent {
    pub label: Option<ParticipantLabel>,
    pub shot_type: Option<ShotType>,
    pub timestamp: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_period_accepts_numbers_strings_and_null() {
        let numeric: GameState = serde_json::from_str(r#"{"period": 3, "clock": "5:00"}"#).unwrap();
        assert_eq!(numeric.period, 3);

        let text: GameState = serde_json::from_str(r#"{"period": "2", "clock": "5:00"}"#).unwrap();
        assert_eq!(text.period, 2);

        let null: GameState = serde_json::from_str(r#"{"period": null, "clock": null}"#).unwrap();
        assert_eq!(null.period, 1);
        assert_eq!(null.clock, "");

        let missing: GameState = serde_json::from_str(r#"{}"#).unwrap();
        assert_eq!(missing.period, 1);
    }

    #[test]
    fn test_shot_event_from_feed_json() {
        let state: GameState = serde_json::from_str(
            r#"{
                "period": 2,
                "clock": "PT05M23.00S",
                "score": {"home": 58, "away": 62},
                "lastShot": {
                    "playerId": 1628369,
                    "playerName": "Jayson Tatum",
                    "teamTricode": "BOS",
                    "shotResult": "Made",
                    "shotType": "Jump Shot",
                    "points": 2
                }
            }"#,
        )
        .unwrap();

        let shot = state.last_shot.unwrap();
        assert_eq!(shot.player_id.as_deref(), Some("1628369"));
        assert_eq!(shot.shooter(), Some("Jayson Tatum"));
        assert!(shot.is_made());
        assert_eq!(shot.shot_class(), ShotClass::TwoPoint);
        assert_eq!(shot.gesture_class(), ShotType::Normal);
        assert_eq!(state.score, Score { home: 58, away: 62 });
    }

    #[test]
    fn test_shot_classification() {
        let three = ShotEvent::new("A", "Missed", "3PT Jump Shot", Some(0));
        assert_eq!(three.shot_class(), ShotClass::ThreePoint);
        assert_eq!(three.result(), ShotResult::Missed);

        let by_points = ShotEvent::new("A", "Made", "Jump Shot", Some(3));
        assert_eq!(by_points.shot_class(), ShotClass::ThreePoint);

        assert_eq!(ShotType::classify("Driving Layup"), ShotType::Layup);
        assert_eq!(ShotType::classify("Alley Oop DUNK"), ShotType::Dunk);
        assert_eq!(ShotType::classify("Fadeaway"), ShotType::Normal);
        assert_eq!(
            ShotResult::parse("Blocked"),
            ShotResult::Other("Blocked".to_string())
        );
    }

    #[test]
    fn test_blank_shooter_is_none() {
        let shot = ShotEvent::new("   ", "Made", "Layup", Some(2));
        assert_eq!(shot.shooter(), None);
    }

    #[test]
    fn test_label_slots_round_trip() {
        for label in ParticipantLabel::ALL {
            assert_eq!(ParticipantLabel::from_slot(label.slot()), Some(label));
        }
        assert_eq!(ParticipantLabel::from_slot(3), None);
        assert_eq!(ParticipantLabel::parse("Center Player"), Some(ParticipantLabel::Center));
        assert_eq!(ParticipantLabel::parse("bench"), None);
    }
}
