//! Telegram transport adapter
//!
//! Maps teloxide updates into `IncomingMessage` values pushed through
//! an mpsc channel, and implements outbound sends with automatic retry
//! on transient network failures.

use anyhow::{Context, Result};
use std::time::Duration;
use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::types::InputFile;
use tokio::sync::mpsc;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;
use tracing::{debug, info, warn};

use super::{
    BotIdentity, ChannelProvider, IncomingMedia, IncomingMessage, MediaKind, OutgoingMedia,
};

const INITIAL_BACKOFF_MS: u64 = 500;
const MAX_BACKOFF_MS: u64 = 4_000;
const MAX_RETRIES: usize = 3;

/// Retry a Telegram API call with exponential backoff and jitter.
async fn retry_telegram_operation<F, Fut, T>(operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let retry_strategy = ExponentialBackoff::from_millis(INITIAL_BACKOFF_MS)
        .max_delay(Duration::from_millis(MAX_BACKOFF_MS))
        .map(jitter)
        .take(MAX_RETRIES);

    Retry::spawn(retry_strategy, operation).await.map_err(|e| {
        warn!(
            "Telegram API operation failed after {} attempts: {}",
            MAX_RETRIES, e
        );
        e
    })
}

/// Telegram channel implementation over teloxide.
#[derive(Clone)]
pub struct TelegramChannel {
    bot: Bot,
}

impl TelegramChannel {
    /// Wrap an existing bot handle.
    #[must_use]
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    fn chat_id(recipient: &str) -> Result<ChatId> {
        let id: i64 = recipient
            .parse()
            .with_context(|| format!("invalid chat id: {recipient}"))?;
        Ok(ChatId(id))
    }
}

#[async_trait::async_trait]
impl ChannelProvider for TelegramChannel {
    async fn send_text(&self, recipient: &str, text: &str) -> Result<()> {
        let chat_id = Self::chat_id(recipient)?;
        retry_telegram_operation(|| async {
            self.bot
                .send_message(chat_id, text)
                .await
                .map_err(|e| anyhow::anyhow!("Telegram send error: {e}"))
        })
        .await?;
        Ok(())
    }

    async fn send_media(&self, recipient: &str, media: OutgoingMedia) -> Result<()> {
        let chat_id = Self::chat_id(recipient)?;
        retry_telegram_operation(|| async {
            let mut file = InputFile::memory(media.data.clone());
            if let Some(name) = &media.filename {
                file = file.file_name(name.clone());
            }
            let result = match media.kind {
                MediaKind::Image => {
                    let mut req = self.bot.send_photo(chat_id, file);
                    if let Some(caption) = &media.caption {
                        req = req.caption(caption.clone());
                    }
                    req.await
                }
                MediaKind::Audio => {
                    let mut req = self.bot.send_audio(chat_id, file);
                    if let Some(caption) = &media.caption {
                        req = req.caption(caption.clone());
                    }
                    req.await
                }
                MediaKind::Video => {
                    let mut req = self.bot.send_video(chat_id, file);
                    if let Some(caption) = &media.caption {
                        req = req.caption(caption.clone());
                    }
                    req.await
                }
                MediaKind::Document => {
                    let mut req = self.bot.send_document(chat_id, file);
                    if let Some(caption) = &media.caption {
                        req = req.caption(caption.clone());
                    }
                    req.await
                }
            };
            result.map_err(|e| anyhow::anyhow!("Telegram media send error: {e}"))?;
            Ok(())
        })
        .await
    }

    async fn bot_identity(&self) -> Result<BotIdentity> {
        let me = self.bot.get_me().await?;
        Ok(BotIdentity {
            id: me.id.0.to_string(),
            name: me.username().to_string(),
        })
    }

    async fn probe_contact_exists(&self, id: &str) -> Result<bool> {
        let chat_id = Self::chat_id(id)?;
        Ok(self.bot.get_chat(chat_id).await.is_ok())
    }

    async fn disconnect(&self) -> Result<()> {
        // Long polling stops when the update loop is dropped
        debug!("telegram channel disconnect requested");
        Ok(())
    }
}

async fn download_file(bot: &Bot, file_id: teloxide::types::FileId) -> Result<Vec<u8>> {
    retry_telegram_operation(|| async {
        let file = bot.get_file(file_id.clone()).await?;
        let mut buf = Vec::new();
        bot.download_file(&file.path, &mut buf).await?;
        Ok(buf)
    })
    .await
}

/// Extract and download the media payload of a message, if any.
async fn extract_media(bot: &Bot, msg: &Message) -> Result<Option<IncomingMedia>> {
    if let Some(voice) = msg.voice() {
        let data = download_file(bot, voice.file.id.clone()).await?;
        return Ok(Some(IncomingMedia {
            kind: MediaKind::Audio,
            data,
            filename: None,
        }));
    }

    if let Some(audio) = msg.audio() {
        let data = download_file(bot, audio.file.id.clone()).await?;
        return Ok(Some(IncomingMedia {
            kind: MediaKind::Audio,
            data,
            filename: audio.file_name.clone(),
        }));
    }

    if let Some(photos) = msg.photo() {
        if let Some(photo) = photos.last() {
            let data = download_file(bot, photo.file.id.clone()).await?;
            return Ok(Some(IncomingMedia {
                kind: MediaKind::Image,
                data,
                filename: None,
            }));
        }
    }

    if msg.video().is_some() {
        // Not downloaded: the media handler rejects videos anyway
        return Ok(Some(IncomingMedia {
            kind: MediaKind::Video,
            data: Vec::new(),
            filename: None,
        }));
    }

    if let Some(doc) = msg.document() {
        let data = download_file(bot, doc.file.id.clone()).await?;
        return Ok(Some(IncomingMedia {
            kind: MediaKind::Document,
            data,
            filename: doc.file_name.clone(),
        }));
    }

    Ok(None)
}

async fn handle_update(
    bot: Bot,
    msg: Message,
    tx: mpsc::UnboundedSender<IncomingMessage>,
) -> std::result::Result<(), teloxide::RequestError> {
    let text = msg
        .text()
        .or_else(|| msg.caption())
        .unwrap_or("")
        .to_string();

    let media = match extract_media(&bot, &msg).await {
        Ok(media) => media,
        Err(e) => {
            warn!(chat = msg.chat.id.0, "failed to download media: {e}");
            None
        }
    };

    if text.is_empty() && media.is_none() {
        return Ok(());
    }

    let incoming = IncomingMessage {
        sender: msg.chat.id.0.to_string(),
        text,
        media,
        is_group: msg.chat.is_group() || msg.chat.is_supergroup(),
        group_name: msg.chat.title().map(ToString::to_string),
    };

    if tx.send(incoming).is_err() {
        warn!("dispatcher channel closed, dropping update");
    }
    Ok(())
}

/// Run the long-polling update loop, forwarding every message into the
/// dispatcher's channel. Blocks until shutdown (Ctrl-C).
pub async fn run_updates(bot: Bot, tx: mpsc::UnboundedSender<IncomingMessage>) {
    info!("Telegram update loop running...");

    let handler = Update::filter_message().endpoint(handle_update);

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![tx])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
}
