use crate::domain::cache::CacheTier;
use crate::domain::task::TaskType;
use serde::{Deserialize, Serialize};

/// Why a generation ended.
#[derive(Deserialize, Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TerminalReason {
    Complete,
    Length,
    Interrupted,
    Error,
}

/// A completed generation, either live from a provider or materialised
/// from a cache entry.
#[derive(Deserialize, Clone, Debug, Serialize, PartialEq)]
pub struct Response {
    pub content: String,
    pub provider: String,
    pub model: String,
    pub tokens_used: Option<u32>,
    pub terminal_reason: TerminalReason,
    pub task_type: Option<TaskType>,
    /// Set when the body came out of a cache tier rather than a live call.
    pub cached: bool,
    pub cache_tier: Option<CacheTier>,
}

impl Response {
    pub fn is_complete(&self) -> bool {
        self.terminal_reason == TerminalReason::Complete
    }

    /// Live responses that ended in error or interruption must not be
    /// written back to the cache.
    pub fn is_cache_worthy(&self) -> bool {
        !matches!(
            self.terminal_reason,
            TerminalReason::Error | TerminalReason::Interrupted
        )
    }
}
