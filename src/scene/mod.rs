//! Guided multi-step conversation scenes
//!
//! A scene is a static table of step descriptors indexed by the step
//! counter persisted in the session. The engine runs each step's
//! validator before its transition, never advances on invalid input,
//! and performs at most one external call per step. Scenes can chain
//! (login hands off to onboarding) via `StepOutcome::Switch`.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::api::ApiClient;
use crate::config::Settings;
use crate::session::{Session, SessionPatch, SessionStore};
use crate::transport::ChannelProvider;

pub mod login;
pub mod onboarding;

/// The scenes the engine knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SceneKind {
    /// Two-step authentication wizard
    Login,
    /// Four-step account setup wizard
    Onboarding,
}

/// Collaborators available to scene steps.
pub struct SceneContext<'a> {
    /// Sender the scene is running for
    pub sender: &'a str,
    /// Backend API collaborator
    pub api: &'a dyn ApiClient,
    /// Application settings (registration link, ...)
    pub settings: &'a Settings,
}

/// What a step's transition decided.
pub enum StepOutcome {
    /// Remain at the current step and send `reply`
    Stay {
        /// Message to send
        reply: String,
    },
    /// Apply `patch`, advance one step, optionally send `reply` before
    /// the next step's prompt
    Advance {
        /// Session changes to persist
        patch: SessionPatch,
        /// Message sent before the next prompt
        reply: Option<String>,
    },
    /// Apply `patch`, leave the scene and send `reply`
    Complete {
        /// Session changes to persist (scene fields are cleared by the
        /// engine)
        patch: SessionPatch,
        /// Final message
        reply: String,
    },
    /// Apply `patch`, then enter another scene at `step`
    Switch {
        /// Target scene
        scene: SceneKind,
        /// Target step, clamped into range by the engine
        step: u32,
        /// Session changes to persist before switching
        patch: SessionPatch,
        /// Message sent before the target step's prompt
        reply: String,
    },
    /// Clear the session entirely and send `reply` (expired token
    /// mid-scene)
    Abort {
        /// Final message
        reply: String,
    },
}

/// One step of a scene.
#[async_trait]
pub trait SceneStep: Send + Sync {
    /// The prompt asking for this step's input.
    fn prompt(&self, session: &Session, ctx: &SceneContext<'_>) -> String;
    /// Cheap input check run before the transition; `Err` carries the
    /// reply to send while staying at this step.
    fn validate(&self, input: &str, session: &Session) -> Result<(), String>;
    /// Side-effecting transition. Performs at most one external call.
    async fn transition(
        &self,
        ctx: &SceneContext<'_>,
        session: &Session,
        input: &str,
    ) -> StepOutcome;
}

fn steps_for(kind: SceneKind) -> &'static [&'static dyn SceneStep] {
    match kind {
        SceneKind::Login => login::STEPS,
        SceneKind::Onboarding => onboarding::STEPS,
    }
}

/// The step after `current`, or `None` when the table ends there.
fn next_step(current: u32, len: usize) -> Option<u32> {
    let next = current + 1;
    ((next as usize) < len).then_some(next)
}

/// Table-driven driver for guided scenes.
pub struct SceneEngine {
    api: Arc<dyn ApiClient>,
    sessions: Arc<dyn SessionStore>,
    settings: Arc<Settings>,
}

impl SceneEngine {
    /// Wire the engine to its collaborators.
    #[must_use]
    pub fn new(
        api: Arc<dyn ApiClient>,
        sessions: Arc<dyn SessionStore>,
        settings: Arc<Settings>,
    ) -> Self {
        Self {
            api,
            sessions,
            settings,
        }
    }

    fn context<'a>(&'a self, sender: &'a str) -> SceneContext<'a> {
        SceneContext {
            sender,
            api: self.api.as_ref(),
            settings: &self.settings,
        }
    }

    /// Activate `kind` at `step` for a sender and send that step's
    /// prompt. An out-of-range step falls back to the first step.
    pub async fn enter(
        &self,
        channel: &dyn ChannelProvider,
        sender: &str,
        kind: SceneKind,
        step: u32,
    ) -> Result<()> {
        let steps = steps_for(kind);
        let step = if (step as usize) < steps.len() { step } else { 0 };

        self.sessions
            .set(sender, SessionPatch::enter_scene(kind, step))
            .await?;

        let session = self.sessions.get(sender).await?;
        let ctx = self.context(sender);
        let prompt = steps[step as usize].prompt(&session, &ctx);
        channel.send_text(sender, &prompt).await
    }

    /// Feed one input into the sender's active scene.
    ///
    /// A session positioned outside the scene's step range is reset to
    /// the first step, and the input is processed there.
    pub async fn handle_input(
        &self,
        channel: &dyn ChannelProvider,
        sender: &str,
        input: &str,
    ) -> Result<()> {
        let mut session = self.sessions.get(sender).await?;
        let Some(kind) = session.scene else {
            debug!(sender, "no active scene, ignoring scene input");
            return Ok(());
        };

        let steps = steps_for(kind);
        if session.scene_step as usize >= steps.len() {
            warn!(
                sender,
                step = session.scene_step,
                "scene step out of range, resetting"
            );
            self.sessions
                .set(
                    sender,
                    SessionPatch {
                        scene_step: Some(0),
                        ..SessionPatch::default()
                    },
                )
                .await?;
            session.scene_step = 0;
        }

        let step = steps[session.scene_step as usize];
        let ctx = self.context(sender);

        if let Err(reply) = step.validate(input, &session) {
            channel.send_text(sender, &reply).await?;
            return Ok(());
        }

        match step.transition(&ctx, &session, input).await {
            StepOutcome::Stay { reply } => channel.send_text(sender, &reply).await,
            StepOutcome::Advance { mut patch, reply } => {
                let Some(next) = next_step(session.scene_step, steps.len()) else {
                    // Last step advanced: there is nothing to prompt
                    // for, so the scene ends
                    warn!(sender, "scene advanced past its last step, completing");
                    patch.scene = Some(None);
                    patch.scene_step = Some(0);
                    patch.reset_scene_data = true;
                    self.sessions.set(sender, patch).await?;
                    if let Some(reply) = reply {
                        channel.send_text(sender, &reply).await?;
                    }
                    return Ok(());
                };
                patch.scene_step = Some(next);
                self.sessions.set(sender, patch).await?;

                if let Some(reply) = reply {
                    channel.send_text(sender, &reply).await?;
                }
                let session = self.sessions.get(sender).await?;
                let prompt = steps[next as usize].prompt(&session, &ctx);
                channel.send_text(sender, &prompt).await
            }
            StepOutcome::Complete { mut patch, reply } => {
                patch.scene = Some(None);
                patch.scene_step = Some(0);
                patch.reset_scene_data = true;
                self.sessions.set(sender, patch).await?;
                channel.send_text(sender, &reply).await
            }
            StepOutcome::Switch {
                scene,
                step,
                patch,
                reply,
            } => {
                self.sessions.set(sender, patch).await?;
                channel.send_text(sender, &reply).await?;
                self.enter(channel, sender, scene, step).await
            }
            StepOutcome::Abort { reply } => {
                self.sessions.clear(sender).await?;
                channel.send_text(sender, &reply).await
            }
        }
    }
}
