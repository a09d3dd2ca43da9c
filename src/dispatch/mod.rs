//! Message routing and per-sender serialization
//!
//! The dispatcher classifies each inbound message in a fixed priority
//! order: rate limit, group gate, active scene, media, command, then
//! free-text quick entry. Messages for one sender are processed
//! strictly in order by a dedicated worker task; different senders run
//! concurrently.

use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::api::ApiClient;
use crate::config::Settings;
use crate::ocr::OcrEngine;
use crate::rate_limit::RateLimiter;
use crate::scene::{SceneEngine, SceneKind};
use crate::session::SessionStore;
use crate::stt::SpeechToText;
use crate::transport::{ChannelProvider, IncomingMessage};

pub mod command;
pub mod group;
pub mod media;
pub mod quick_entry;

/// A worker whose queue stays empty this long closes it and exits.
/// The timeout only elapses while the worker is waiting on an empty
/// queue, so a worker draining a backlog is never considered idle.
const WORKER_IDLE: Duration = Duration::from_secs(10 * 60);
/// How often finished workers are swept out of the map.
const WORKER_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

pub(crate) const LOGIN_REQUIRED: &str =
    "❌ Você precisa fazer login primeiro.\n\nDigite /start para começar.";
pub(crate) const SESSION_EXPIRED: &str =
    "❌ Sessão expirada. Digite /start para fazer login novamente.";
const APOLOGY: &str = "😔 Algo deu errado ao processar sua mensagem. Tente novamente.";

/// Top-level message orchestrator.
pub struct Dispatcher {
    pub(crate) settings: Arc<Settings>,
    pub(crate) channel: Arc<dyn ChannelProvider>,
    pub(crate) sessions: Arc<dyn SessionStore>,
    pub(crate) api: Arc<dyn ApiClient>,
    pub(crate) limiter: RateLimiter,
    pub(crate) scenes: SceneEngine,
    pub(crate) ocr: Arc<dyn OcrEngine>,
    pub(crate) stt: Arc<dyn SpeechToText>,
}

struct Worker {
    tx: mpsc::UnboundedSender<IncomingMessage>,
    handle: tokio::task::JoinHandle<()>,
}

impl Dispatcher {
    /// Wire the dispatcher to its collaborators.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        settings: Arc<Settings>,
        channel: Arc<dyn ChannelProvider>,
        sessions: Arc<dyn SessionStore>,
        api: Arc<dyn ApiClient>,
        ocr: Arc<dyn OcrEngine>,
        stt: Arc<dyn SpeechToText>,
    ) -> Self {
        let limiter = RateLimiter::new(settings.rate_limit_per_minute);
        let scenes = SceneEngine::new(
            Arc::clone(&api),
            Arc::clone(&sessions),
            Arc::clone(&settings),
        );
        Self {
            settings,
            channel,
            sessions,
            api,
            limiter,
            scenes,
            ocr,
            stt,
        }
    }

    /// Per-sender rate limiter, for stats and the periodic sweep.
    #[must_use]
    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Consume the inbound stream, fanning out to one worker task per
    /// sender so a sender's messages are serialized and ordered.
    pub async fn run(self: Arc<Self>, mut rx: mpsc::UnboundedReceiver<IncomingMessage>) {
        let mut workers: HashMap<String, Worker> = HashMap::new();
        let mut sweep = tokio::time::interval(WORKER_SWEEP_INTERVAL);
        info!("dispatcher running");

        loop {
            tokio::select! {
                maybe = rx.recv() => {
                    let Some(msg) = maybe else { break };
                    self.deliver(&mut workers, msg);
                }
                _ = sweep.tick() => {
                    let before = workers.len();
                    workers.retain(|_, w| !w.handle.is_finished());
                    if workers.len() < before {
                        debug!(retired = before - workers.len(), "idle sender workers retired");
                    }
                }
            }
        }
        info!("dispatcher stopped");
    }

    fn deliver(self: &Arc<Self>, workers: &mut HashMap<String, Worker>, msg: IncomingMessage) {
        let sender = msg.sender.clone();
        let msg = match workers.get(&sender) {
            Some(worker) => match worker.tx.send(msg) {
                Ok(()) => return,
                // Worker closed its queue (idle timeout or panic)
                Err(mpsc::error::SendError(msg)) => msg,
            },
            None => msg,
        };
        let predecessor = workers.remove(&sender).map(|w| w.handle);
        let fresh = self.spawn_worker(sender.clone(), predecessor);
        let _ = fresh.tx.send(msg);
        workers.insert(sender, fresh);
    }

    fn spawn_worker(
        self: &Arc<Self>,
        sender: String,
        predecessor: Option<tokio::task::JoinHandle<()>>,
    ) -> Worker {
        let (tx, mut rx) = mpsc::unbounded_channel::<IncomingMessage>();
        let dispatcher = Arc::clone(self);
        let handle = tokio::spawn(async move {
            // A replaced worker may still be draining its queue; wait
            // for it so one sender never runs two workers at once.
            if let Some(prev) = predecessor {
                let _ = prev.await;
            }
            loop {
                let msg = match tokio::time::timeout(WORKER_IDLE, rx.recv()).await {
                    Ok(Some(msg)) => msg,
                    Ok(None) => break,
                    Err(_) => {
                        // Idle: refuse new deliveries, drain what is left
                        rx.close();
                        continue;
                    }
                };
                if let Err(e) = dispatcher.route(&msg).await {
                    error!(sender = %msg.sender, "message processing failed: {e:#}");
                    let _ = dispatcher.channel.send_text(&msg.sender, APOLOGY).await;
                }
            }
            debug!(sender, "sender worker exiting");
        });
        Worker { tx, handle }
    }

    /// Route one message through the priority chain.
    pub async fn route(&self, msg: &IncomingMessage) -> Result<()> {
        if !self.limiter.admit(&msg.sender).await {
            let remaining = self.limiter.remaining_block(&msg.sender).await;
            let reply = format!(
                "⏳ *Calma aí!*\n\n\
                 Você enviou muitas mensagens em pouco tempo.\n\
                 Aguarde {} segundos e tente novamente.",
                remaining.as_secs().max(1)
            );
            return self.channel.send_text(&msg.sender, &reply).await;
        }

        if msg.is_group {
            if !self.settings.group_support {
                debug!(sender = %msg.sender, "group support disabled, dropping message");
                return Ok(());
            }
            return group::handle(self, msg).await;
        }

        let session = self.sessions.get(&msg.sender).await?;

        // Active scene captures all non-command text
        if session.scene.is_some() && msg.media.is_none() && !msg.text.starts_with('/') {
            return self
                .scenes
                .handle_input(self.channel.as_ref(), &msg.sender, &msg.text)
                .await;
        }

        if msg.media.is_some() {
            return media::handle(self, msg, &session).await;
        }

        if msg.text.starts_with('/') {
            return command::handle(self, &msg.sender, &msg.text, &session).await;
        }

        quick_entry::handle(self, &msg.sender, &msg.text, &session).await
    }

    /// Begin the login wizard for a sender.
    pub(crate) async fn start_login(&self, sender: &str) -> Result<()> {
        self.scenes
            .enter(self.channel.as_ref(), sender, SceneKind::Login, 0)
            .await
    }

    /// Clear the session and tell the user to log in again. Used
    /// whenever a collaborator reports a rejected token.
    pub(crate) async fn expire_session(&self, sender: &str) -> Result<()> {
        self.sessions.clear(sender).await?;
        self.channel.send_text(sender, SESSION_EXPIRED).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::api::MockApiClient;
    use crate::ocr::MockOcrEngine;
    use crate::session::MockSessionStore;
    use crate::stt::MockSpeechToText;
    use crate::transport::{BotIdentity, OutgoingMedia};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Channel whose sends take simulated time, recording start/end
    /// order so overlapping processing is observable.
    struct SlowChannel {
        events: Mutex<Vec<&'static str>>,
        delay: Duration,
    }

    #[async_trait]
    impl ChannelProvider for SlowChannel {
        async fn send_text(&self, _recipient: &str, _text: &str) -> Result<()> {
            self.events.lock().unwrap().push("start");
            tokio::time::sleep(self.delay).await;
            self.events.lock().unwrap().push("end");
            Ok(())
        }

        async fn send_media(&self, _recipient: &str, _media: OutgoingMedia) -> Result<()> {
            Ok(())
        }

        async fn bot_identity(&self) -> Result<BotIdentity> {
            Ok(BotIdentity {
                id: "42".to_string(),
                name: "bot".to_string(),
            })
        }

        async fn probe_contact_exists(&self, _id: &str) -> Result<bool> {
            Ok(true)
        }

        async fn disconnect(&self) -> Result<()> {
            Ok(())
        }
    }

    fn group_msg(text: &str) -> IncomingMessage {
        IncomingMessage {
            sender: "g1".to_string(),
            text: text.to_string(),
            media: None,
            is_group: true,
            group_name: Some("Turma".to_string()),
        }
    }

    // A worker stuck on a slow reply must keep its queue past the idle
    // horizon: a message arriving mid-drain joins the same queue rather
    // than running on a freshly spawned parallel worker.
    #[tokio::test(start_paused = true)]
    async fn test_busy_worker_is_not_retired_and_sends_stay_ordered() {
        let mut settings: Settings = serde_json::from_str("{}").unwrap();
        settings.group_support = true;

        let channel = Arc::new(SlowChannel {
            events: Mutex::new(Vec::new()),
            delay: WORKER_IDLE * 2,
        });
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::new(settings),
            Arc::clone(&channel) as Arc<dyn ChannelProvider>,
            Arc::new(MockSessionStore::new()),
            Arc::new(MockApiClient::new()),
            Arc::new(MockOcrEngine::new()),
            Arc::new(MockSpeechToText::new()),
        ));

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(Arc::clone(&dispatcher).run(rx));

        // Group /saldo draws the privacy redirect, which is slow here
        tx.send(group_msg("/saldo")).unwrap();
        tokio::time::sleep(WORKER_IDLE + WORKER_IDLE / 2).await;
        tx.send(group_msg("/saldo")).unwrap();
        tokio::time::sleep(WORKER_IDLE * 6).await;

        let events = channel.events.lock().unwrap().clone();
        assert_eq!(events, vec!["start", "end", "start", "end"]);
    }

    // After a worker idles out and exits, the next message from that
    // sender must still be processed (by a successor worker).
    #[tokio::test(start_paused = true)]
    async fn test_retired_worker_is_replaced_without_losing_messages() {
        let mut settings: Settings = serde_json::from_str("{}").unwrap();
        settings.group_support = true;

        let channel = Arc::new(SlowChannel {
            events: Mutex::new(Vec::new()),
            delay: Duration::from_millis(10),
        });
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::new(settings),
            Arc::clone(&channel) as Arc<dyn ChannelProvider>,
            Arc::new(MockSessionStore::new()),
            Arc::new(MockApiClient::new()),
            Arc::new(MockOcrEngine::new()),
            Arc::new(MockSpeechToText::new()),
        ));

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(Arc::clone(&dispatcher).run(rx));

        tx.send(group_msg("/saldo")).unwrap();
        tokio::time::sleep(WORKER_IDLE * 2).await;
        tx.send(group_msg("/saldo")).unwrap();
        tokio::time::sleep(WORKER_IDLE * 2).await;

        let events = channel.events.lock().unwrap().clone();
        assert_eq!(events, vec!["start", "end", "start", "end"]);
    }
}
