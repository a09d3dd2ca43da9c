//! Durable shared session backend over Cloudflare R2 / AWS S3
//!
//! One JSON object per sender under `sessions/`, stamped with an
//! `expires_at` instant so every replica agrees on expiry. Reads go
//! through a short-lived write-through cache; an expired object is
//! treated as absent and deleted lazily.

use async_trait::async_trait;
use aws_credential_types::Credentials;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use aws_types::region::Region;
use chrono::{DateTime, Utc};
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use super::{Session, SessionPatch, SessionStats, SessionStore, StoreError};
use crate::config::Settings;

const KEY_PREFIX: &str = "sessions/";

/// On-bucket envelope: the session plus its absolute expiry instant.
#[derive(Debug, Serialize, Deserialize)]
struct StoredSession {
    session: Session,
    expires_at: DateTime<Utc>,
}

/// R2/S3-backed session store shared across bot instances.
pub struct DurableSessionStore {
    client: Client,
    bucket: String,
    ttl: chrono::Duration,
    cache: Cache<String, Session>,
}

impl DurableSessionStore {
    /// Create a new durable store from the R2 settings.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Config` when any R2 credential is missing.
    pub async fn new(settings: &Settings) -> Result<Self, StoreError> {
        let endpoint_url = settings
            .r2_endpoint_url
            .as_ref()
            .ok_or_else(|| StoreError::Config("R2_ENDPOINT_URL is missing".into()))?;
        let access_key = settings
            .r2_access_key_id
            .as_ref()
            .ok_or_else(|| StoreError::Config("R2_ACCESS_KEY_ID is missing".into()))?;
        let secret_key = settings
            .r2_secret_access_key
            .as_ref()
            .ok_or_else(|| StoreError::Config("R2_SECRET_ACCESS_KEY is missing".into()))?;
        let bucket = settings
            .r2_bucket_name
            .as_ref()
            .ok_or_else(|| StoreError::Config("R2_BUCKET_NAME is missing".into()))?;

        let credentials = Credentials::new(access_key, secret_key, None, None, "session-store");

        let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(Region::new("auto"))
            .load()
            .await;

        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .endpoint_url(endpoint_url)
            .force_path_style(true)
            .build();

        let client = Client::from_conf(s3_config);

        // Cache much shorter than the session TTL so other replicas'
        // writes become visible within a minute
        let cache = Cache::builder()
            .max_capacity(10_000)
            .time_to_live(Duration::from_secs(60))
            .build();

        let ttl = chrono::Duration::from_std(settings.session_ttl())
            .map_err(|e| StoreError::Config(format!("session TTL out of range: {e}")))?;

        Ok(Self {
            client,
            bucket: bucket.clone(),
            ttl,
            cache,
        })
    }

    fn key(sender: &str) -> String {
        format!("{KEY_PREFIX}{sender}.json")
    }

    async fn load(&self, sender: &str) -> Result<Option<Session>, StoreError> {
        if let Some(session) = self.cache.get(sender).await {
            return Ok(Some(session));
        }

        let key = Self::key(sender);
        let result = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await;

        match result {
            Ok(output) => {
                let data = output
                    .body
                    .collect()
                    .await
                    .map_err(|e| StoreError::Unavailable(e.to_string()))?
                    .into_bytes();
                let stored: StoredSession = serde_json::from_slice(&data)?;
                if stored.expires_at <= Utc::now() {
                    debug!(sender, "session expired, deleting");
                    self.delete(sender).await?;
                    return Ok(None);
                }
                self.cache
                    .insert(sender.to_string(), stored.session.clone())
                    .await;
                Ok(Some(stored.session))
            }
            Err(SdkError::ServiceError(err)) if err.err().is_no_such_key() => Ok(None),
            Err(e) => Err(StoreError::Unavailable(e.to_string())),
        }
    }

    async fn store(&self, sender: &str, session: &Session) -> Result<(), StoreError> {
        let stored = StoredSession {
            session: session.clone(),
            expires_at: Utc::now() + self.ttl,
        };
        let body = serde_json::to_vec(&stored)?;

        // Write-through: the cache reflects the write immediately
        self.cache.insert(sender.to_string(), session.clone()).await;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(Self::key(sender))
            .body(ByteStream::from(body))
            .content_type("application/json")
            .send()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        Ok(())
    }

    async fn delete(&self, sender: &str) -> Result<(), StoreError> {
        self.cache.invalidate(sender).await;
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(Self::key(sender))
            .send()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(())
    }

    /// Re-stamp the expiry of an existing session without other changes.
    ///
    /// # Errors
    ///
    /// Propagates bucket failures; a missing session is a no-op.
    pub async fn extend_ttl(&self, sender: &str) -> Result<(), StoreError> {
        if let Some(session) = self.load(sender).await? {
            self.store(sender, &session).await?;
        }
        Ok(())
    }

    /// Verify the bucket is reachable.
    ///
    /// # Errors
    ///
    /// Returns the bucket error as a string for health reporting.
    pub async fn health_check(&self) -> Result<(), String> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for DurableSessionStore {
    async fn get(&self, sender: &str) -> Result<Session, StoreError> {
        Ok(self.load(sender).await?.unwrap_or_default())
    }

    async fn set(&self, sender: &str, patch: SessionPatch) -> Result<(), StoreError> {
        let mut session = self.load(sender).await?.unwrap_or_default();
        session.apply(patch);
        self.store(sender, &session).await
    }

    async fn clear(&self, sender: &str) -> Result<(), StoreError> {
        self.delete(sender).await
    }

    async fn stats(&self) -> Result<SessionStats, StoreError> {
        let mut stats = SessionStats {
            total: 0,
            authenticated: 0,
            onboarding: 0,
        };

        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(KEY_PREFIX)
            .into_paginator()
            .send();

        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| StoreError::Unavailable(e.to_string()))?;
            for object in page.contents() {
                let Some(key) = object.key() else { continue };
                let sender = key
                    .trim_start_matches(KEY_PREFIX)
                    .trim_end_matches(".json");
                match self.load(sender).await {
                    Ok(Some(session)) => {
                        stats.total += 1;
                        if session.is_authenticated() {
                            stats.authenticated += 1;
                        }
                        if session.is_onboarding() {
                            stats.onboarding += 1;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => warn!(key, "skipping unreadable session: {e}"),
                }
            }
        }

        Ok(stats)
    }
}
