//! The chat platform boundary.

use async_trait::async_trait;

use crate::bot::message::{ChatInfo, ClientInfo, ContactRecord, LidMapping, MediaPayload, QuotedMessage};

#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("bridge request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("bridge returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("failed to decode bridge response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Everything the bot needs from a WhatsApp client session.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// Reply to a message, attaching mention metadata.
    async fn reply(&self, message_id: &str, text: &str, mentions: &[String]) -> Result<(), PlatformError>;

    async fn send_message(&self, chat_id: &str, text: &str) -> Result<(), PlatformError>;

    /// Show the "composing" indicator.
    async fn set_typing(&self, chat_id: &str) -> Result<(), PlatformError>;

    async fn clear_state(&self, chat_id: &str) -> Result<(), PlatformError>;

    /// `None` when the message carries no downloadable media.
    async fn download_media(&self, message_id: &str) -> Result<Option<MediaPayload>, PlatformError>;

    async fn quoted_message(&self, message_id: &str) -> Result<Option<QuotedMessage>, PlatformError>;

    /// Phone-mapping utility for linked identifiers.
    async fn lid_phone_number(&self, wid: &str) -> Result<Option<LidMapping>, PlatformError>;

    /// Generic contact store lookup.
    async fn contact(&self, wid: &str) -> Result<Option<ContactRecord>, PlatformError>;

    async fn chat_info(&self, chat_id: &str) -> Result<ChatInfo, PlatformError>;

    async fn client_info(&self) -> Result<ClientInfo, PlatformError>;
}
