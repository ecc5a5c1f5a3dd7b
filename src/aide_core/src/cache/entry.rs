//! The cache entry record shared by the memory and persistent tiers.

use aide_types::prelude::{CacheCategory, Fingerprint};

/// One cached response. Timestamps are UNIX epoch seconds; `expires_at`
/// of zero means the entry never expires.
#[derive(Clone, Debug, PartialEq)]
pub struct CacheEntry {
    pub key: Fingerprint,
    pub value: String,
    pub category: CacheCategory,
    pub created_at: f64,
    pub expires_at: f64,
    pub access_count: u64,
    pub last_accessed: f64,
    pub embedding: Option<Vec<f32>>,
    pub metadata: Option<serde_json::Value>,
}

impl CacheEntry {
    pub fn new(
        key: Fingerprint,
        value: String,
        category: CacheCategory,
        now: f64,
        ttl_override_secs: Option<u64>,
    ) -> Self {
        let ttl_secs = match ttl_override_secs {
            Some(secs) => secs as f64,
            None => category.ttl().map(|d| d.as_secs_f64()).unwrap_or(0.0),
        };
        CacheEntry {
            key,
            value,
            category,
            created_at: now,
            expires_at: if ttl_secs > 0.0 { now + ttl_secs } else { 0.0 },
            access_count: 0,
            last_accessed: 0.0,
            embedding: None,
            metadata: None,
        }
    }

    /// Strict comparison: an entry is observable only while `now <= expires_at`.
    pub fn is_expired(&self, now: f64) -> bool {
        self.expires_at > 0.0 && now > self.expires_at
    }

    pub fn touch(&mut self, now: f64) {
        self.access_count += 1;
        self.last_accessed = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aide_types::prelude::CacheCategory;

    #[test]
    fn zero_expiry_never_expires() {
        let mut entry = CacheEntry::new(
            "k".into(),
            "v".into(),
            CacheCategory::Static,
            1000.0,
            Some(0),
        );
        entry.expires_at = 0.0;
        assert!(!entry.is_expired(f64::MAX));
    }

    #[test]
    fn expiry_boundary_is_strict() {
        let entry = CacheEntry::new(
            "k".into(),
            "v".into(),
            CacheCategory::General,
            1000.0,
            Some(60),
        );
        assert_eq!(entry.expires_at, 1060.0);
        assert!(!entry.is_expired(1060.0));
        assert!(entry.is_expired(1060.0001));
    }

    #[test]
    fn category_ttl_applies_when_no_override() {
        let entry = CacheEntry::new("k".into(), "v".into(), CacheCategory::Weather, 0.0, None);
        assert_eq!(entry.expires_at, 30.0 * 60.0);
    }
}
