//! Shooter-difficulty odds.
//!
//! Backing a weak shooter's make pays more and costs less when it misses;
//! backing an elite shooter pays less and costs more. The multipliers are a
//! deterministic function of the shooter's season percentage for the shot
//! class being attempted.

use crate::error::StatsError;
use crate::models::{ShotClass, ShotEvent};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

pub const MIN_REWARD_MULTIPLIER: f64 = 0.8;
pub const MAX_REWARD_MULTIPLIER: f64 = 2.4;
pub const MIN_LOSS_MULTIPLIER: f64 = 0.6;
pub const MAX_LOSS_MULTIPLIER: f64 = 2.4;

/// Normalized percentage treated as an average shooter
const NORMALIZED_PIVOT: f64 = 0.35;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatLabel {
    #[serde(rename = "FG%")]
    FieldGoal,
    #[serde(rename = "3P%")]
    ThreePoint,
}

impl StatLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatLabel::FieldGoal => "FG%",
            StatLabel::ThreePoint => "3P%",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShootingOdds {
    pub reward_multiplier: f64,
    pub loss_multiplier: f64,
    pub percentage: Option<f64>,
    pub stat_label: Option<StatLabel>,
}

impl ShootingOdds {
    /// Used when the shooter has no usable season percentage
    pub fn neutral() -> Self {
        Self {
            reward_multiplier: 1.0,
            loss_multiplier: 1.0,
            percentage: None,
            stat_label: None,
        }
    }

    /// Multiplier applied to a made (reward) or missed (loss) outcome
    pub fn factor_for(&self, is_made: bool) -> f64 {
        if is_made {
            self.reward_multiplier
        } else {
            self.loss_multiplier
        }
    }
}

impl Default for ShootingOdds {
    fn default() -> Self {
        Self::neutral()
    }
}

// ============================================================================
// Season stats
// ============================================================================

/// Row of the season stats export
#[derive(Debug, Clone, Deserialize)]
pub struct PlayerShootingRecord {
    #[serde(rename = "PLAYER_ID", default)]
    pub player_id: Option<serde_json::Value>,
    #[serde(rename = "PLAYER_NAME")]
    pub player_name: String,
    #[serde(rename = "FG_PCT", default)]
    pub fg_pct: Option<f64>,
    #[serde(rename = "FG3_PCT", default)]
    pub fg3_pct: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ShootingSplits {
    pub fg_pct: Option<f64>,
    pub fg3_pct: Option<f64>,
}

/// Season shooting splits indexed by player id and by normalized name
#[derive(Debug, Clone, Default)]
pub struct PlayerStatsBook {
    by_id: HashMap<String, ShootingSplits>,
    by_name: HashMap<String, ShootingSplits>,
}

/// Lowercase and strip everything but ASCII letters and digits
pub fn normalize_player_name(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        .collect()
}

impl PlayerStatsBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: Vec<PlayerShootingRecord>) -> Self {
        let mut book = Self::new();
        for record in records {
            let splits = ShootingSplits {
                fg_pct: record.fg_pct,
                fg3_pct: record.fg3_pct,
            };
            let id = match &record.player_id {
                Some(serde_json::Value::Number(n)) => Some(n.to_string()),
                Some(serde_json::Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
                _ => None,
            };
            book.insert(id.as_deref(), &record.player_name, splits);
        }
        book
    }

    /// Load the JSON stats export.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, StatsError> {
        let content = fs::read_to_string(path.as_ref())?;
        let records: Vec<PlayerShootingRecord> = serde_json::from_str(&content)?;
        let book = Self::from_records(records);
        info!(
            "Loaded season shooting stats for {} players from {}",
            book.len(),
            path.as_ref().display()
        );
        Ok(book)
    }

    /// Load the stats export, falling back to an empty book (neutral odds for everyone).
    pub fn load_or_empty(path: Option<&str>) -> Self {
        let path = match path {
            Some(p) => p,
            None => return Self::new(),
        };
        if !Path::new(path).exists() {
            warn!("Season stats file {} not found, all odds will be neutral", path);
            return Self::new();
        }
        match Self::load(path) {
            Ok(book) => book,
            Err(e) => {
                warn!("{}; all odds will be neutral", e);
                Self::new()
            }
        }
    }

    pub fn insert(&mut self, player_id: Option<&str>, player_name: &str, splits: ShootingSplits) {
        if let Some(id) = player_id {
            self.by_id.insert(id.to_string(), splits);
        }
        let key = normalize_player_name(player_name);
        if !key.is_empty() {
            self.by_name.insert(key, splits);
        }
    }

    pub fn len(&self) -> usize {
        self.by_name.len().max(self.by_id.len())
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty() && self.by_id.is_empty()
    }

    /// Id lookup first, then normalized name
    pub fn splits(&self, player_id: Option<&str>, player_name: Option<&str>) -> Option<&ShootingSplits> {
        if let Some(found) = player_id.and_then(|id| self.by_id.get(id)) {
            return Some(found);
        }
        let key = normalize_player_name(player_name?);
        if key.is_empty() {
            return None;
        }
        self.by_name.get(&key)
    }
}

/// Percentage for the shot class, falling back to the other split only when
/// the preferred one is missing. A present but non-positive value is neutral.
fn select_percentage(splits: &ShootingSplits, class: ShotClass) -> Option<(f64, StatLabel)> {
    let fg = splits.fg_pct.map(|p| (p, StatLabel::FieldGoal));
    let fg3 = splits.fg3_pct.map(|p| (p, StatLabel::ThreePoint));
    let chosen = match class {
        ShotClass::ThreePoint => fg3.or(fg),
        ShotClass::TwoPoint => fg.or(fg3),
    };
    chosen.filter(|(p, _)| p.is_finite() && *p > 0.0)
}

fn lerp(start: f64, end: f64, t: f64) -> f64 {
    start + (end - start) * t
}

/// Two-decimal rounding on the exact decimal value of the double, ties away
/// from zero. Matches JS `toFixed(2)`, which `(x * 100.0).round()` does not
/// when the multiplication itself rounds.
fn round2(value: f64) -> f64 {
    if !value.is_finite() {
        return value;
    }
    // Formatting is correctly rounded, so the first three places are exact at this width
    let exact = format!("{:.60}", value.abs());
    let (whole, frac) = exact.split_once('.').unwrap_or((exact.as_str(), ""));
    let whole = match whole.parse::<u64>() {
        Ok(w) => w,
        Err(_) => return value,
    };
    let cents = frac.get(..2).and_then(|d| d.parse::<u64>().ok()).unwrap_or(0);
    let round_up = frac.as_bytes().get(2).map(|d| *d >= b'5').unwrap_or(false);
    let hundredths = whole * 100 + cents + u64::from(round_up);
    (hundredths as f64 / 100.0).copysign(value)
}

/// Reward and loss multipliers for a shooter percentage.
pub fn directional_multipliers(pct: f64, class: ShotClass) -> (f64, f64) {
    let three = class.is_three();
    let (min_pct, max_pct) = if three { (0.22, 0.45) } else { (0.40, 0.65) };
    let clamped = pct.clamp(min_pct, max_pct);
    let normalized = (clamped - min_pct) / (max_pct - min_pct).max(0.0001);
    // negative = below-average shooter
    let bias = normalized - NORMALIZED_PIVOT;

    let (reward, loss) = if bias >= 0.0 {
        let reward = lerp(if three { 1.05 } else { 1.0 }, 0.8, (bias * 1.2).min(1.0));
        let loss = lerp(if three { 1.7 } else { 1.5 }, 2.4, (bias * 1.1).min(1.0));
        (reward, loss)
    } else {
        let easy = (bias.abs() * 1.3).min(1.0);
        let reward = lerp(if three { 1.4 } else { 1.3 }, 2.4, easy);
        let loss = lerp(if three { 1.0 } else { 0.95 }, 0.6, easy);
        (reward, loss)
    };

    (
        round2(reward.clamp(MIN_REWARD_MULTIPLIER, MAX_REWARD_MULTIPLIER)),
        round2(loss.clamp(MIN_LOSS_MULTIPLIER, MAX_LOSS_MULTIPLIER)),
    )
}

#[derive(Debug, Clone, Default)]
pub struct OddsModel {
    book: PlayerStatsBook,
}

impl OddsModel {
    pub fn new(book: PlayerStatsBook) -> Self {
        Self { book }
    }

    pub fn book(&self) -> &PlayerStatsBook {
        &self.book
    }

    pub fn compute_difficulty(
        &self,
        player_id: Option<&str>,
        player_name: Option<&str>,
        class: ShotClass,
    ) -> ShootingOdds {
        let selected = self
            .book
            .splits(player_id, player_name)
            .and_then(|splits| select_percentage(splits, class));

        match selected {
            Some((pct, label)) => {
                let (reward, loss) = directional_multipliers(pct, class);
                ShootingOdds {
                    reward_multiplier: reward,
                    loss_multiplier: loss,
                    percentage: Some(pct),
                    stat_label: Some(label),
                }
            }
            None => ShootingOdds::neutral(),
        }
    }

    pub fn odds_for_shot(&self, shot: &ShotEvent) -> ShootingOdds {
        self.compute_difficulty(shot.player_id.as_deref(), shot.shooter(), shot.shot_class())
    }
}
