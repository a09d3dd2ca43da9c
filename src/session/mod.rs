//! Conversational session state
//!
//! A session is keyed by sender identity and holds auth state plus the
//! progress of any active guided scene. Writes go through a merge-only
//! patch type so callers can update a single field without clobbering
//! the rest.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

use crate::scene::SceneKind;

pub mod durable;
pub mod memory;

pub use durable::DurableSessionStore;
pub use memory::MemorySessionStore;

/// Onboarding step at which a user counts as fully onboarded.
pub const ONBOARDING_COMPLETE: u32 = 5;

/// Errors from session store operations.
///
/// The in-memory backend never produces these; the durable backend
/// surfaces connection and serialization failures.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Error talking to the backing store
    #[error("store unavailable: {0}")]
    Unavailable(String),
    /// Error during JSON serialization or deserialization
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// Configuration error (missing credentials, etc.)
    #[error("configuration error: {0}")]
    Config(String),
}

/// The authenticated user attached to a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    /// Display name
    pub name: String,
    /// Backend onboarding progress, `None` once complete
    pub onboarding_step: Option<u32>,
}

/// Per-sender conversational state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Backend API token; absent means unauthenticated
    pub token: Option<String>,
    /// Authenticated user details
    pub user: Option<SessionUser>,
    /// Currently active guided scene, if any
    pub scene: Option<SceneKind>,
    /// Step position inside the active scene
    #[serde(default)]
    pub scene_step: u32,
    /// Scratch data accumulated by scene steps
    #[serde(default)]
    pub scene_data: HashMap<String, Value>,
}

impl Session {
    /// A session is authenticated iff it carries a non-empty token.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.token.as_deref().is_some_and(|t| !t.is_empty())
    }

    /// Whether the authenticated user still has onboarding steps left.
    #[must_use]
    pub fn is_onboarding(&self) -> bool {
        self.user
            .as_ref()
            .and_then(|u| u.onboarding_step)
            .is_some_and(|step| step < ONBOARDING_COMPLETE)
    }

    /// Apply a merge patch in place.
    ///
    /// Top-level fields are replaced only when the patch carries them;
    /// `scene_data` is merged key-by-key, with `Value::Null` deleting a
    /// key. Clearing scene state wholesale goes through
    /// `reset_scene_data`.
    pub fn apply(&mut self, patch: SessionPatch) {
        if let Some(token) = patch.token {
            self.token = Some(token);
        }
        if let Some(user) = patch.user {
            self.user = Some(user);
        }
        if let Some(scene) = patch.scene {
            self.scene = scene;
        }
        if let Some(step) = patch.scene_step {
            self.scene_step = step;
        }
        if patch.reset_scene_data {
            self.scene_data.clear();
        }
        for (key, value) in patch.scene_data {
            if value.is_null() {
                self.scene_data.remove(&key);
            } else {
                self.scene_data.insert(key, value);
            }
        }
    }
}

/// A partial session update with merge semantics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionPatch {
    /// New API token
    pub token: Option<String>,
    /// New user details
    pub user: Option<SessionUser>,
    /// New active scene (`Some(None)` deactivates scenes)
    pub scene: Option<Option<SceneKind>>,
    /// New scene step
    pub scene_step: Option<u32>,
    /// Keys to merge into `scene_data` (`Null` deletes)
    pub scene_data: HashMap<String, Value>,
    /// Clear all scene data before merging
    pub reset_scene_data: bool,
}

impl SessionPatch {
    /// A patch entering `scene` at `step`, discarding prior scene data.
    #[must_use]
    pub fn enter_scene(scene: SceneKind, step: u32) -> Self {
        Self {
            scene: Some(Some(scene)),
            scene_step: Some(step),
            reset_scene_data: true,
            ..Self::default()
        }
    }

    /// A patch leaving any active scene and dropping its data.
    #[must_use]
    pub fn leave_scene() -> Self {
        Self {
            scene: Some(None),
            scene_step: Some(0),
            reset_scene_data: true,
            ..Self::default()
        }
    }
}

/// Aggregate session counters for observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    /// Sessions currently stored
    pub total: usize,
    /// Sessions holding an auth token
    pub authenticated: usize,
    /// Sessions whose user is mid-onboarding
    pub onboarding: usize,
}

/// Interface for session store backends.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Fetch the session for a sender, empty if none exists.
    async fn get(&self, sender: &str) -> Result<Session, StoreError>;
    /// Merge a patch onto the sender's session and persist it.
    async fn set(&self, sender: &str, patch: SessionPatch) -> Result<(), StoreError>;
    /// Remove the session entirely, including scene progress.
    async fn clear(&self, sender: &str) -> Result<(), StoreError>;
    /// Aggregate counters.
    async fn stats(&self) -> Result<SessionStats, StoreError>;
}
