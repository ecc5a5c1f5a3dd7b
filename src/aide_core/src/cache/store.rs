//! L2: persistent SQLite cache.
//!
//! Single-table layout with secondary indices on expiry and category so
//! sweeps and bulk invalidation stay cheap. All access goes through an
//! async connection pool; callers treat each call as an isolated unit of
//! work. Failures here must never fail a request; the facade degrades
//! to a miss and logs.

use crate::cache::entry::CacheEntry;
use aide_types::prelude::CacheCategory;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Row, Sqlite};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info, warn};

const SCHEMA: &str = "\
CREATE TABLE IF NOT EXISTS cache (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    category TEXT NOT NULL,
    created_at REAL NOT NULL,
    expires_at REAL NOT NULL,
    access_count INTEGER DEFAULT 0,
    last_accessed REAL,
    embedding BLOB,
    metadata TEXT
)";

pub struct PersistentCache {
    pool: Pool<Sqlite>,
    max_entries: u64,
    cleanup_interval_secs: f64,
    last_cleanup: Mutex<f64>,
}

impl PersistentCache {
    /// Open (or create) the cache database at `path`.
    pub async fn open(
        path: &Path,
        max_entries: u64,
        cleanup_interval_secs: u64,
    ) -> Result<Self, sqlx::Error> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| sqlx::Error::Io(e))?;
            }
        }
        let conn_string = connection_string(path);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect(&conn_string)
            .await?;

        sqlx::query(SCHEMA).execute(&pool).await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_cache_expires ON cache(expires_at)")
            .execute(&pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_cache_category ON cache(category)")
            .execute(&pool)
            .await?;

        info!(path = %path.display(), max_entries, "Opened persistent cache");
        Ok(PersistentCache {
            pool,
            max_entries,
            cleanup_interval_secs: cleanup_interval_secs as f64,
            last_cleanup: Mutex::new(0.0),
        })
    }

    /// Lookup with TTL enforcement and access-stat update.
    pub async fn get(&self, key: &str, now: f64) -> Result<Option<CacheEntry>, sqlx::Error> {
        self.maybe_cleanup(now).await;

        let row = sqlx::query("SELECT * FROM cache WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };

        let expires_at: f64 = row.try_get("expires_at")?;
        if expires_at > 0.0 && now > expires_at {
            sqlx::query("DELETE FROM cache WHERE key = ?")
                .bind(key)
                .execute(&self.pool)
                .await?;
            debug!(key, "Expired persistent entry removed on read");
            return Ok(None);
        }

        sqlx::query(
            "UPDATE cache SET access_count = access_count + 1, last_accessed = ? WHERE key = ?",
        )
        .bind(now)
        .bind(key)
        .execute(&self.pool)
        .await?;

        let category_text: String = row.try_get("category")?;
        let category = CacheCategory::parse(&category_text).unwrap_or(CacheCategory::General);
        let access_count: i64 = row.try_get("access_count")?;
        let embedding: Option<Vec<u8>> = row.try_get("embedding")?;
        let metadata_text: Option<String> = row.try_get("metadata")?;

        Ok(Some(CacheEntry {
            key: row.try_get("key")?,
            value: row.try_get("value")?,
            category,
            created_at: row.try_get("created_at")?,
            expires_at,
            access_count: access_count.max(0) as u64 + 1,
            last_accessed: now,
            embedding: embedding.as_deref().map(decode_embedding),
            metadata: metadata_text.and_then(|m| serde_json::from_str(&m).ok()),
        }))
    }

    pub async fn insert(&self, entry: &CacheEntry) -> Result<(), sqlx::Error> {
        let embedding_blob = entry.embedding.as_deref().map(encode_embedding);
        let metadata_text = entry
            .metadata
            .as_ref()
            .map(|m| serde_json::to_string(m).unwrap_or_default());

        sqlx::query(
            "INSERT OR REPLACE INTO cache \
             (key, value, category, created_at, expires_at, access_count, last_accessed, embedding, metadata) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&entry.key)
        .bind(&entry.value)
        .bind(entry.category.as_str())
        .bind(entry.created_at)
        .bind(entry.expires_at)
        .bind(entry.access_count as i64)
        .bind(entry.last_accessed)
        .bind(embedding_blob)
        .bind(metadata_text)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn remove(&self, key: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM cache WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn clear(&self) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM cache").execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    /// Bulk invalidation of one category.
    pub async fn clear_category(&self, category: CacheCategory) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM cache WHERE category = ?")
            .bind(category.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn count(&self) -> Result<u64, sqlx::Error> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM cache")
            .fetch_one(&self.pool)
            .await?;
        let n: i64 = row.try_get("n")?;
        Ok(n.max(0) as u64)
    }

    /// Run the periodic sweep if the interval has elapsed. Errors inside
    /// the sweep are logged and swallowed; the read path must not fail
    /// because housekeeping did.
    async fn maybe_cleanup(&self, now: f64) {
        {
            let mut last = self.last_cleanup.lock().expect("cleanup clock poisoned");
            if now - *last <= self.cleanup_interval_secs {
                return;
            }
            *last = now;
        }
        if let Err(e) = self.cleanup(now).await {
            warn!(error = %e, "Persistent cache sweep failed");
        }
    }

    /// Delete expired rows, then enforce the row bound by dropping the
    /// oldest-by-last-accessed overflow.
    pub async fn cleanup(&self, now: f64) -> Result<u64, sqlx::Error> {
        let expired = sqlx::query("DELETE FROM cache WHERE expires_at > 0 AND expires_at < ?")
            .bind(now)
            .execute(&self.pool)
            .await?
            .rows_affected();

        let count = self.count().await?;
        if count > self.max_entries {
            let excess = (count - self.max_entries) as i64;
            sqlx::query(
                "DELETE FROM cache WHERE key IN (\
                 SELECT key FROM cache ORDER BY last_accessed ASC LIMIT ?)",
            )
            .bind(excess)
            .execute(&self.pool)
            .await?;
        }

        if expired > 0 {
            debug!(expired, "Persistent cache sweep removed expired rows");
        }
        Ok(expired)
    }
}

fn connection_string(path: &Path) -> String {
    let path: PathBuf = path.to_path_buf();
    format!("sqlite://{}?mode=rwc", path.display())
}

/// Embeddings are stored as little-endian float32 vectors.
fn encode_embedding(vector: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(vector.len() * 4);
    for value in vector {
        out.extend_from_slice(&value.to_le_bytes());
    }
    out
}

fn decode_embedding(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use aide_types::prelude::CacheCategory;
    use tempfile::TempDir;

    async fn open_temp(max_entries: u64) -> (TempDir, PersistentCache) {
        let dir = TempDir::new().expect("tempdir");
        let store = PersistentCache::open(&dir.path().join("cache.db"), max_entries, 3600)
            .await
            .expect("open");
        (dir, store)
    }

    fn entry(key: &str, now: f64) -> CacheEntry {
        CacheEntry::new(
            key.to_string(),
            format!("value-{key}"),
            CacheCategory::General,
            now,
            None,
        )
    }

    #[tokio::test]
    async fn round_trip_preserves_fields() {
        let (_dir, store) = open_temp(100).await;
        let mut stored = entry("a", 100.0);
        stored.embedding = Some(vec![0.25, -1.5, 3.0]);
        stored.metadata = Some(serde_json::json!({"provider": "fast-remote"}));
        store.insert(&stored).await.expect("insert");

        let got = store.get("a", 101.0).await.expect("get").expect("hit");
        assert_eq!(got.value, "value-a");
        assert_eq!(got.category, CacheCategory::General);
        assert_eq!(got.embedding.as_deref(), Some(&[0.25, -1.5, 3.0][..]));
        assert_eq!(got.metadata, stored.metadata);
        assert_eq!(got.access_count, 1);
    }

    #[tokio::test]
    async fn expired_row_is_deleted_on_read() {
        let (_dir, store) = open_temp(100).await;
        let mut stored = entry("a", 100.0);
        stored.expires_at = 110.0;
        store.insert(&stored).await.expect("insert");

        assert!(store.get("a", 110.0).await.expect("get").is_some());
        assert!(store.get("a", 111.0).await.expect("get").is_none());
        assert_eq!(store.count().await.expect("count"), 0);
    }

    #[tokio::test]
    async fn cleanup_enforces_row_bound_by_recency() {
        let (_dir, store) = open_temp(2).await;
        for (i, key) in ["a", "b", "c"].iter().enumerate() {
            let mut e = entry(key, 100.0);
            e.last_accessed = 100.0 + i as f64;
            store.insert(&e).await.expect("insert");
        }
        store.cleanup(200.0).await.expect("cleanup");
        assert_eq!(store.count().await.expect("count"), 2);
        // "a" had the oldest last_accessed and is gone.
        assert!(store.get("a", 200.0).await.expect("get").is_none());
        assert!(store.get("c", 200.0).await.expect("get").is_some());
    }

    #[tokio::test]
    async fn clear_category_removes_only_that_category() {
        let (_dir, store) = open_temp(100).await;
        let mut weather = entry("w", 100.0);
        weather.category = CacheCategory::Weather;
        store.insert(&weather).await.expect("insert");
        store.insert(&entry("g", 100.0)).await.expect("insert");

        let removed = store
            .clear_category(CacheCategory::Weather)
            .await
            .expect("clear");
        assert_eq!(removed, 1);
        assert!(store.get("g", 100.0).await.expect("get").is_some());
    }
}
