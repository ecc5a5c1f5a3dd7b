use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Cache categories controlling TTL and cacheability.
///
/// `SystemAction` responses describe device-side effects and are never
/// served from or written to any tier.
#[derive(Deserialize, Clone, Copy, Debug, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum CacheCategory {
    Static,
    Weather,
    News,
    Calendar,
    IotStatus,
    General,
    Conversation,
    SystemAction,
}

impl CacheCategory {
    /// TTL for entries in this category. `None` means the category is not
    /// cacheable at all.
    pub fn ttl(&self) -> Option<Duration> {
        match self {
            CacheCategory::Static => Some(Duration::from_secs(7 * 24 * 3600)),
            CacheCategory::Weather => Some(Duration::from_secs(30 * 60)),
            CacheCategory::News => Some(Duration::from_secs(60 * 60)),
            CacheCategory::Calendar => Some(Duration::from_secs(15 * 60)),
            CacheCategory::IotStatus => Some(Duration::from_secs(5 * 60)),
            CacheCategory::General => Some(Duration::from_secs(60 * 60)),
            CacheCategory::Conversation => Some(Duration::from_secs(30 * 60)),
            CacheCategory::SystemAction => None,
        }
    }

    pub fn is_cacheable(&self) -> bool {
        self.ttl().is_some()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CacheCategory::Static => "static",
            CacheCategory::Weather => "weather",
            CacheCategory::News => "news",
            CacheCategory::Calendar => "calendar",
            CacheCategory::IotStatus => "iot-status",
            CacheCategory::General => "general",
            CacheCategory::Conversation => "conversation",
            CacheCategory::SystemAction => "system-action",
        }
    }

    pub fn parse(s: &str) -> Option<CacheCategory> {
        match s {
            "static" => Some(CacheCategory::Static),
            "weather" => Some(CacheCategory::Weather),
            "news" => Some(CacheCategory::News),
            "calendar" => Some(CacheCategory::Calendar),
            "iot-status" => Some(CacheCategory::IotStatus),
            "general" => Some(CacheCategory::General),
            "conversation" => Some(CacheCategory::Conversation),
            "system-action" => Some(CacheCategory::SystemAction),
            _ => None,
        }
    }
}

/// Which tier produced a cache hit.
#[derive(Deserialize, Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum CacheTier {
    Template,
    Memory,
    Persistent,
    Semantic,
}

/// Per-tier hit counters, exported through `status()`.
#[derive(Deserialize, Clone, Copy, Debug, Serialize, PartialEq, Default)]
pub struct CacheStats {
    pub l0_hits: u64,
    pub l1_hits: u64,
    pub l2_hits: u64,
    pub l3_hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub l1_size: usize,
}

impl CacheStats {
    pub fn hits(&self) -> u64 {
        self.l0_hits + self.l1_hits + self.l2_hits + self.l3_hits
    }

    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits() + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits() as f64 / total as f64
        }
    }
}
