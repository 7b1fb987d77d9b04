//! CourtCall Core - live game-feed synchronization and shot-prediction scoring.
//!
//! This crate provides:
//! - A bounded timeline of timestamped game states
//! - Clock anchoring of the feed to a delayed broadcast
//! - Shot detection with identity dedup and stream-aligned timing
//! - The prediction window state machine (countdown, close, reveal)
//! - Shooting-percentage odds and the points/streak scoring engine
//! - Pure display-state reduction and outbound session events
//! - Feed and persistence clients with circuit breaking and retry

pub mod anchor;
pub mod circuit_breaker;
pub mod clients;
pub mod clock;
pub mod config;
pub mod detector;
pub mod display;
pub mod error;
pub mod events;
pub mod models;
pub mod odds;
pub mod retry;
pub mod roster;
pub mod scoring;
pub mod session;
pub mod store;
pub mod time;
pub mod timeline;
pub mod window;

pub use anchor::{ClockAnchor, ClockSync, Projection};
pub use config::EngineConfig;
pub use detector::{DetectedShot, Detection, ShotDetector, ShotIdentity};
pub use display::{reduce, ShotExperienceState, Transition};
pub use error::{FeedError, StatsError, StoreError};
pub use events::{PointsPopup, SessionEvent};
pub use models::{GameState, GestureEvent, ParticipantLabel, Prediction, ShotEvent, ShotType};
pub use odds::{OddsModel, PlayerStatsBook, ShootingOdds};
pub use roster::{Participant, Roster};
pub use scoring::{PointsBreakdown, Resolution, ScoringEngine, ShotOutcome, StreakState};
pub use session::{FeedMode, GameSession, ResolvedShot};
pub use time::{ManualClock, TimeSource, WallClock};
pub use timeline::GameStateTimeline;
pub use window::{PredictionSnapshot, PredictionWindow, WindowPhase};
