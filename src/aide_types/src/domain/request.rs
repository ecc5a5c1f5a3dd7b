use crate::domain::common::ProviderName;
use crate::domain::task::TaskType;
use serde::{Deserialize, Serialize};

/// Generation parameters forwarded to the provider endpoint.
#[derive(Deserialize, Clone, Copy, Debug, Serialize, PartialEq)]
pub struct GenerationParams {
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
    /// Per-call deadline in seconds; falls back to the router default.
    pub timeout_secs: Option<u64>,
}

impl Default for GenerationParams {
    fn default() -> Self {
        GenerationParams {
            temperature: None,
            max_output_tokens: None,
            timeout_secs: None,
        }
    }
}

/// Caller hints steering routing and caching for one request.
#[derive(Deserialize, Clone, Debug, Serialize, PartialEq)]
pub struct RequestHints {
    pub preferred_provider: Option<ProviderName>,
    pub task_type: Option<TaskType>,
    pub use_cache: bool,
    /// Skip the semantic tier even when it is enabled.
    pub skip_semantic: bool,
    pub category: Option<crate::domain::cache::CacheCategory>,
}

impl Default for RequestHints {
    fn default() -> Self {
        RequestHints {
            preferred_provider: None,
            task_type: None,
            use_cache: true,
            skip_semantic: false,
            category: None,
        }
    }
}
