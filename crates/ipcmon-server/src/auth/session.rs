//! Cookie sessions stored in the expiring cache.

use std::time::Duration;

use ipcmon_core::Cache;
use tracing::{debug, info};

const NAMESPACE: &str = "sessions";

/// Maps opaque session ids to user ids. Deleting a session is logging out.
#[derive(Clone)]
pub struct SessionStore {
    cache: Cache,
    ttl: Duration,
}

impl SessionStore {
    pub const fn new(cache: Cache, ttl: Duration) -> Self {
        Self { cache, ttl }
    }

    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Start a session for a user and return its id.
    pub async fn create(&self, user_id: i64) -> String {
        let session_id = uuid::Uuid::new_v4().simple().to_string();
        self.cache
            .set(NAMESPACE, &session_id, user_id.to_string(), self.ttl)
            .await;
        info!(user_id, "Session created");
        session_id
    }

    /// Resolve a session id. A miss, an expired entry or a corrupt value all
    /// read as unauthenticated.
    pub async fn resolve(&self, session_id: &str) -> Option<i64> {
        match self.cache.get(NAMESPACE, session_id).await {
            Ok(Some(raw)) => raw.parse().ok(),
            Ok(None) => None,
            Err(e) => {
                debug!(error = %e, "Unreadable session entry");
                None
            }
        }
    }

    pub async fn destroy(&self, session_id: &str) -> bool {
        self.cache.delete(NAMESPACE, session_id).await
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use ipcmon_core::ManualClock;

    use super::*;

    #[tokio::test]
    async fn create_resolve_destroy() {
        let clock = ManualClock::new();
        let store = SessionStore::new(Cache::new(Arc::new(clock)), Duration::from_secs(60));

        let id = store.create(42).await;
        assert_eq!(id.len(), 32);
        assert_eq!(store.resolve(&id).await, Some(42));

        assert!(store.destroy(&id).await);
        assert_eq!(store.resolve(&id).await, None);
    }

    #[tokio::test]
    async fn sessions_expire() {
        let clock = ManualClock::new();
        let store = SessionStore::new(
            Cache::new(Arc::new(clock.clone())),
            Duration::from_secs(86_400),
        );
        let id = store.create(1).await;

        clock.advance(Duration::from_secs(86_400));
        assert_eq!(store.resolve(&id).await, None);
    }
}
