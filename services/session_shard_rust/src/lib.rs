//! SessionShard: drives one live game session.
//!
//! One task owns the session and:
//! - Polls the game feed (live) or loads it once (simulated, replay)
//! - Advances delayed playback and prediction-window timers
//! - Takes gestures and control commands over channels
//! - Broadcasts session events and persists resolved shots

pub mod config;
pub mod persist;
pub mod shard;

pub use config::SessionShardConfig;
pub use persist::Persistence;
pub use shard::{SessionShard, ShardCommand, ShardHandle};
