//! In-process expiring key-value cache.
//!
//! Entries live under a namespace (`sessions`, `devices`, `confirm`, ...)
//! and hold either a scalar string or a string hash. Every entry carries an
//! expiry measured on the injected [`Clock`]; expired entries read as
//! absent and are dropped by [`Cache::purge_expired`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

use crate::clock::Clock;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Entry {0} has the wrong type for this operation")]
    WrongType(String),

    #[error("Field {field} of {key} is not an integer")]
    NotAnInteger { key: String, field: String },
}

#[derive(Debug, Clone)]
enum Value {
    Scalar(String),
    Hash(HashMap<String, String>),
}

#[derive(Debug)]
struct Entry {
    value: Value,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// Thread-safe expiring cache shared by the session, provisioning and
/// confirmation stores.
#[derive(Clone)]
pub struct Cache {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
    clock: Arc<dyn Clock>,
}

/// Longest lifetime an entry can be given. Larger TTLs are clamped.
pub const MAX_TTL: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

fn full_key(namespace: &str, key: &str) -> String {
    format!("{namespace}:{key}")
}

impl Cache {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            clock,
        }
    }

    fn expiry(&self, ttl: Duration) -> Instant {
        let now = self.clock.now();
        now.checked_add(ttl.min(MAX_TTL)).unwrap_or(now)
    }

    /// Store a scalar value, replacing whatever was there.
    pub async fn set(&self, namespace: &str, key: &str, value: impl Into<String>, ttl: Duration) {
        let entry = Entry {
            value: Value::Scalar(value.into()),
            expires_at: self.expiry(ttl),
        };
        self.entries
            .write()
            .await
            .insert(full_key(namespace, key), entry);
    }

    /// Read a scalar value.
    pub async fn get(&self, namespace: &str, key: &str) -> Result<Option<String>, CacheError> {
        let now = self.clock.now();
        let k = full_key(namespace, key);
        let entries = self.entries.read().await;
        match entries.get(&k) {
            Some(entry) if entry.is_live(now) => match &entry.value {
                Value::Scalar(v) => Ok(Some(v.clone())),
                Value::Hash(_) => Err(CacheError::WrongType(k)),
            },
            _ => Ok(None),
        }
    }

    pub async fn exists(&self, namespace: &str, key: &str) -> bool {
        let now = self.clock.now();
        self.entries
            .read()
            .await
            .get(&full_key(namespace, key))
            .is_some_and(|e| e.is_live(now))
    }

    /// Remove an entry. Returns `true` if a live entry was removed.
    pub async fn delete(&self, namespace: &str, key: &str) -> bool {
        let now = self.clock.now();
        self.entries
            .write()
            .await
            .remove(&full_key(namespace, key))
            .is_some_and(|e| e.is_live(now))
    }

    /// Store a whole hash, replacing any previous entry under the key.
    pub async fn hset(
        &self,
        namespace: &str,
        key: &str,
        fields: HashMap<String, String>,
        ttl: Duration,
    ) {
        let entry = Entry {
            value: Value::Hash(fields),
            expires_at: self.expiry(ttl),
        };
        self.entries
            .write()
            .await
            .insert(full_key(namespace, key), entry);
    }

    /// Read every field of a hash.
    pub async fn hgetall(
        &self,
        namespace: &str,
        key: &str,
    ) -> Result<Option<HashMap<String, String>>, CacheError> {
        let now = self.clock.now();
        let k = full_key(namespace, key);
        let entries = self.entries.read().await;
        match entries.get(&k) {
            Some(entry) if entry.is_live(now) => match &entry.value {
                Value::Hash(fields) => Ok(Some(fields.clone())),
                Value::Scalar(_) => Err(CacheError::WrongType(k)),
            },
            _ => Ok(None),
        }
    }

    /// Atomically add `delta` to an integer hash field and return the new
    /// value. The entry keeps its original expiry. Returns `None` when the
    /// entry does not exist.
    pub async fn hincr(
        &self,
        namespace: &str,
        key: &str,
        field: &str,
        delta: i64,
    ) -> Result<Option<i64>, CacheError> {
        let now = self.clock.now();
        let k = full_key(namespace, key);
        let mut entries = self.entries.write().await;
        let Some(entry) = entries.get_mut(&k).filter(|e| e.is_live(now)) else {
            return Ok(None);
        };
        let Value::Hash(fields) = &mut entry.value else {
            return Err(CacheError::WrongType(k));
        };
        let current = match fields.get(field) {
            Some(raw) => raw.parse::<i64>().map_err(|_| CacheError::NotAnInteger {
                key: k.clone(),
                field: field.to_string(),
            })?,
            None => 0,
        };
        let updated = current + delta;
        fields.insert(field.to_string(), updated.to_string());
        Ok(Some(updated))
    }

    /// Remaining lifetime of a live entry.
    pub async fn ttl(&self, namespace: &str, key: &str) -> Option<Duration> {
        let now = self.clock.now();
        self.entries
            .read()
            .await
            .get(&full_key(namespace, key))
            .filter(|e| e.is_live(now))
            .map(|e| e.expires_at.saturating_duration_since(now))
    }

    /// Drop every expired entry. Returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, e| e.is_live(now));
        let removed = before - entries.len();
        if removed > 0 {
            debug!(removed, "Purged expired cache entries");
        }
        removed
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn test_cache() -> (Cache, ManualClock) {
        let clock = ManualClock::new();
        (Cache::new(Arc::new(clock.clone())), clock)
    }

    #[tokio::test]
    async fn scalar_set_get_delete() {
        let (cache, _) = test_cache();
        cache.set("devices", "tok", "ipc-01", Duration::from_secs(60)).await;

        assert_eq!(cache.get("devices", "tok").await.unwrap().as_deref(), Some("ipc-01"));
        assert!(cache.exists("devices", "tok").await);
        assert!(cache.get("sessions", "tok").await.unwrap().is_none());

        assert!(cache.delete("devices", "tok").await);
        assert!(!cache.delete("devices", "tok").await);
        assert!(!cache.exists("devices", "tok").await);
    }

    #[tokio::test]
    async fn oversized_ttl_is_clamped() {
        let (cache, _) = test_cache();
        cache.set("devices", "tok", "ipc-01", Duration::MAX).await;
        cache
            .hset("confirm", "user:1", HashMap::new(), Duration::from_secs(u64::MAX))
            .await;

        assert!(cache.exists("devices", "tok").await);
        assert_eq!(cache.ttl("devices", "tok").await, Some(MAX_TTL));
        assert!(cache.hgetall("confirm", "user:1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn entries_expire_on_the_injected_clock() {
        let (cache, clock) = test_cache();
        cache.set("devices", "tok", "ipc-01", Duration::from_secs(3600)).await;

        clock.advance(Duration::from_secs(3599));
        assert!(cache.exists("devices", "tok").await);
        assert_eq!(cache.ttl("devices", "tok").await, Some(Duration::from_secs(1)));

        clock.advance(Duration::from_secs(1));
        assert!(!cache.exists("devices", "tok").await);
        assert!(cache.get("devices", "tok").await.unwrap().is_none());
        assert_eq!(cache.purge_expired().await, 1);
    }

    #[tokio::test]
    async fn hash_increment_keeps_expiry() {
        let (cache, clock) = test_cache();
        let fields = HashMap::from([("attempts".to_string(), "3".to_string())]);
        cache.hset("confirm", "user:1", fields, Duration::from_secs(600)).await;

        clock.advance(Duration::from_secs(100));
        assert_eq!(cache.hincr("confirm", "user:1", "attempts", -1).await.unwrap(), Some(2));
        assert_eq!(cache.ttl("confirm", "user:1").await, Some(Duration::from_secs(500)));

        let stored = cache.hgetall("confirm", "user:1").await.unwrap().unwrap();
        assert_eq!(stored["attempts"], "2");
    }

    #[tokio::test]
    async fn hash_increment_on_missing_entry_is_none() {
        let (cache, _) = test_cache();
        assert_eq!(cache.hincr("confirm", "user:9", "attempts", -1).await.unwrap(), None);
    }

    #[tokio::test]
    async fn wrong_type_is_reported() {
        let (cache, _) = test_cache();
        cache.set("confirm", "user:1", "scalar", Duration::from_secs(60)).await;
        assert!(matches!(
            cache.hgetall("confirm", "user:1").await,
            Err(CacheError::WrongType(_))
        ));
        assert!(matches!(
            cache.hincr("confirm", "user:1", "attempts", 1).await,
            Err(CacheError::WrongType(_))
        ));
    }

    #[tokio::test]
    async fn concurrent_increments_are_not_lost() {
        let (cache, _) = test_cache();
        let fields = HashMap::from([("n".to_string(), "0".to_string())]);
        cache.hset("c", "k", fields, Duration::from_secs(60)).await;

        let mut handles = Vec::new();
        for _ in 0..20 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                cache.hincr("c", "k", "n", 1).await.unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        let stored = cache.hgetall("c", "k").await.unwrap().unwrap();
        assert_eq!(stored["n"], "20");
    }
}
