//! Volatile in-process session backend
//!
//! Suitable for single-instance deployments. Entries expire after the
//! configured inactivity TTL (moka time-to-idle) and operations never
//! fail.

use async_trait::async_trait;
use moka::future::Cache;
use std::time::Duration;

use super::{Session, SessionPatch, SessionStats, SessionStore, StoreError};

/// Session store over a TTL-bearing in-memory cache.
#[derive(Clone)]
pub struct MemorySessionStore {
    cache: Cache<String, Session>,
}

impl MemorySessionStore {
    /// Create a store whose entries expire after `ttl` of inactivity.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(100_000)
            .time_to_idle(ttl)
            .build();
        Self { cache }
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(&self, sender: &str) -> Result<Session, StoreError> {
        Ok(self.cache.get(sender).await.unwrap_or_default())
    }

    async fn set(&self, sender: &str, patch: SessionPatch) -> Result<(), StoreError> {
        let mut session = self.cache.get(sender).await.unwrap_or_default();
        session.apply(patch);
        self.cache.insert(sender.to_string(), session).await;
        Ok(())
    }

    async fn clear(&self, sender: &str) -> Result<(), StoreError> {
        self.cache.invalidate(sender).await;
        Ok(())
    }

    async fn stats(&self) -> Result<SessionStats, StoreError> {
        self.cache.run_pending_tasks().await;
        let mut total = 0;
        let mut authenticated = 0;
        let mut onboarding = 0;
        for (_, session) in &self.cache {
            total += 1;
            if session.is_authenticated() {
                authenticated += 1;
            }
            if session.is_onboarding() {
                onboarding += 1;
            }
        }
        Ok(SessionStats {
            total,
            authenticated,
            onboarding,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::session::SessionUser;

    fn store() -> MemorySessionStore {
        MemorySessionStore::new(Duration::from_secs(60))
    }

    #[tokio::test]
    async fn test_get_returns_empty_session() {
        let store = store();
        let session = store.get("u1").await.unwrap();
        assert_eq!(session, Session::default());
    }

    #[tokio::test]
    async fn test_set_merges_across_calls() {
        let store = store();
        store
            .set(
                "u1",
                SessionPatch {
                    token: Some("tok".into()),
                    ..SessionPatch::default()
                },
            )
            .await
            .unwrap();
        store
            .set(
                "u1",
                SessionPatch {
                    scene_step: Some(2),
                    ..SessionPatch::default()
                },
            )
            .await
            .unwrap();

        let session = store.get("u1").await.unwrap();
        assert_eq!(session.token.as_deref(), Some("tok"));
        assert_eq!(session.scene_step, 2);
    }

    #[tokio::test]
    async fn test_clear_then_get_is_empty() {
        let store = store();
        store
            .set(
                "u1",
                SessionPatch {
                    token: Some("tok".into()),
                    ..SessionPatch::default()
                },
            )
            .await
            .unwrap();
        store.clear("u1").await.unwrap();
        assert_eq!(store.get("u1").await.unwrap(), Session::default());
    }

    #[tokio::test]
    async fn test_stats_counts_projections() {
        let store = store();
        store
            .set(
                "auth",
                SessionPatch {
                    token: Some("tok".into()),
                    ..SessionPatch::default()
                },
            )
            .await
            .unwrap();
        store
            .set(
                "onb",
                SessionPatch {
                    token: Some("tok2".into()),
                    user: Some(SessionUser {
                        name: "Ana".into(),
                        onboarding_step: Some(1),
                    }),
                    ..SessionPatch::default()
                },
            )
            .await
            .unwrap();
        store.set("anon", SessionPatch::default()).await.unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.authenticated, 2);
        assert_eq!(stats.onboarding, 1);
    }
}
