pub mod feed;

// Re-export commonly used types
pub use feed::{GameFeed, HistoryItem, HttpGameFeed, ScriptedFeed};
