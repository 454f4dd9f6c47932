//! SQLite cache for fetched API responses, keyed by a hash of the normalized request.

use rusqlite::{Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// A cached response and the Unix time it was stored.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CachedResponse {
    pub body: String,
    pub stored_utc: i64,
}

impl CachedResponse {
    pub fn age_secs(&self, now_utc: i64) -> i64 {
        (now_utc - self.stored_utc).max(0)
    }
}

pub struct Cache {
    conn: Mutex<Connection>,
}

impl Cache {
    /// Open or create cache at `path`. Creates parent dirs if needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CacheError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::init(Connection::open(path)?)
    }

    pub fn in_memory() -> Result<Self, CacheError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, CacheError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS responses (
                key TEXT PRIMARY KEY,
                endpoint TEXT NOT NULL,
                body TEXT NOT NULL,
                stored_utc INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_responses_endpoint ON responses(endpoint);
            "#,
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn key_for(content: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(content.as_bytes());
        hex::encode(hasher.finalize())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, CacheError> {
        self.conn
            .lock()
            .map_err(|e| CacheError::Io(std::io::Error::other(e.to_string())))
    }

    pub fn get(&self, key: &str) -> Result<Option<CachedResponse>, CacheError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT body, stored_utc FROM responses WHERE key = ?1")?;
        let row = stmt
            .query_row([key], |r| {
                Ok(CachedResponse {
                    body: r.get(0)?,
                    stored_utc: r.get(1)?,
                })
            })
            .optional()?;
        Ok(row)
    }

    pub fn set(&self, key: &str, endpoint: &str, body: &str) -> Result<(), CacheError> {
        let stored = time::OffsetDateTime::now_utc().unix_timestamp();
        self.set_at(key, endpoint, body, stored)
    }

    pub fn set_at(
        &self,
        key: &str,
        endpoint: &str,
        body: &str,
        stored_utc: i64,
    ) -> Result<(), CacheError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO responses (key, endpoint, body, stored_utc) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![key, endpoint, body, stored_utc],
        )?;
        Ok(())
    }

    /// Drop every response for `endpoint`; used when the user forces a refresh.
    pub fn invalidate_endpoint(&self, endpoint: &str) -> Result<usize, CacheError> {
        let conn = self.lock()?;
        Ok(conn.execute("DELETE FROM responses WHERE endpoint = ?1", [endpoint])?)
    }

    pub fn purge_older_than(&self, cutoff_utc: i64) -> Result<usize, CacheError> {
        let conn = self.lock()?;
        Ok(conn.execute("DELETE FROM responses WHERE stored_utc < ?1", [cutoff_utc])?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn cache_key_deterministic() {
        let k1 = Cache::key_for(r#"{"stake":"x","endpoint":"/account_rewards"}"#);
        let k2 = Cache::key_for(r#"{"stake":"x","endpoint":"/account_rewards"}"#);
        assert_eq!(k1, k2);
        assert_eq!(k1.len(), 64);
    }

    #[test]
    fn cache_get_set_on_disk() {
        let tmp = NamedTempFile::new().unwrap();
        let cache = Cache::open(tmp.path()).unwrap();
        let key = Cache::key_for("req1");
        cache.set_at(&key, "/tip", r#"[{"epoch_no":500}]"#, 1_000).unwrap();
        let hit = cache.get(&key).unwrap().unwrap();
        assert_eq!(hit.body, r#"[{"epoch_no":500}]"#);
        assert_eq!(hit.age_secs(1_030), 30);
        assert!(cache.get("nonexistent").unwrap().is_none());
    }

    #[test]
    fn invalidate_and_purge() {
        let cache = Cache::in_memory().unwrap();
        cache.set_at("a", "/tip", "1", 100).unwrap();
        cache.set_at("b", "/pool_info", "2", 100).unwrap();
        cache.set_at("c", "/pool_info", "3", 500).unwrap();
        assert_eq!(cache.invalidate_endpoint("/tip").unwrap(), 1);
        assert_eq!(cache.purge_older_than(200).unwrap(), 1);
        assert!(cache.get("b").unwrap().is_none());
        assert!(cache.get("c").unwrap().is_some());
    }
}
