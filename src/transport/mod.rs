//! Chat transport abstraction
//!
//! The engine talks to the chat network only through `ChannelProvider`;
//! inbound traffic arrives as `IncomingMessage` values over an mpsc
//! channel so the dispatcher never sees transport-specific types.

use anyhow::Result;
use async_trait::async_trait;

pub mod telegram;

pub use telegram::TelegramChannel;

/// Kind of media attached to a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    /// Photo or receipt image
    Image,
    /// Voice note or audio file
    Audio,
    /// Video (unsupported downstream)
    Video,
    /// Arbitrary document
    Document,
}

/// Media payload downloaded from the transport.
#[derive(Debug, Clone)]
pub struct IncomingMedia {
    /// Media subtype
    pub kind: MediaKind,
    /// Raw bytes
    pub data: Vec<u8>,
    /// Original filename, when the transport provides one
    pub filename: Option<String>,
}

/// One inbound message, already normalized by the transport adapter.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    /// Sender identity, opaque to the engine
    pub sender: String,
    /// Text or caption, empty when absent
    pub text: String,
    /// Attached media, if any
    pub media: Option<IncomingMedia>,
    /// Whether the message came from a group conversation
    pub is_group: bool,
    /// Group title, for group replies
    pub group_name: Option<String>,
}

/// Media payload to send out.
#[derive(Debug, Clone)]
pub struct OutgoingMedia {
    /// Media subtype
    pub kind: MediaKind,
    /// Raw bytes
    pub data: Vec<u8>,
    /// Caption shown alongside the media
    pub caption: Option<String>,
    /// Filename for documents
    pub filename: Option<String>,
}

/// The bot's own identity on the transport.
#[derive(Debug, Clone)]
pub struct BotIdentity {
    /// Transport-level id
    pub id: String,
    /// Display name / username
    pub name: String,
}

/// Outbound side of a chat transport.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChannelProvider: Send + Sync {
    /// Send a plain text message.
    async fn send_text(&self, recipient: &str, text: &str) -> Result<()>;
    /// Send a media payload.
    async fn send_media(&self, recipient: &str, media: OutgoingMedia) -> Result<()>;
    /// The bot's identity, used for group mention detection.
    async fn bot_identity(&self) -> Result<BotIdentity>;
    /// Whether a contact id resolves on the transport.
    async fn probe_contact_exists(&self, id: &str) -> Result<bool>;
    /// Shut the transport connection down.
    async fn disconnect(&self) -> Result<()>;
}
