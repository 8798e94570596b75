//! Bot engine - turns inbound WhatsApp messages into commands or Gemini queries.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::bot::commands::{self, Command};
use crate::bot::debug_report;
use crate::bot::gemini::{ModelApi, ModelError, Part};
use crate::bot::identity::IdentityResolver;
use crate::bot::media::MediaPreprocessor;
use crate::bot::mentions::extract_mentions;
use crate::bot::message::{InboundMessage, MediaPayload};
use crate::bot::platform::{ChatPlatform, PlatformError};
use crate::bot::state::{BotState, ReloadError};

const DEFAULT_SENDER_NAME: &str = "Usuario";

/// Engine settings that don't change at runtime.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Unix seconds. Older messages are history replayed on reconnect.
    pub started_at: i64,
    /// Answer every message with a diagnostics report instead of commands.
    pub debug_mode: bool,
    /// Prefix queries with a line naming the sender.
    pub sender_context: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("{0}")]
    Platform(#[from] PlatformError),
    #[error("{0}")]
    Model(#[from] ModelError),
}

pub struct Engine {
    config: EngineConfig,
    state: BotState,
    platform: Arc<dyn ChatPlatform>,
    model_api: Arc<dyn ModelApi>,
    identity: IdentityResolver,
    media: MediaPreprocessor,
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        state: BotState,
        platform: Arc<dyn ChatPlatform>,
        model_api: Arc<dyn ModelApi>,
        identity: IdentityResolver,
        media: MediaPreprocessor,
    ) -> Self {
        Self { config, state, platform, model_api, identity, media }
    }

    pub fn state(&self) -> &BotState {
        &self.state
    }

    /// Handle one `message_create` event. Never fails; problems are logged
    /// and, on the query path, reported back into the chat.
    pub async fn handle_message(&self, msg: InboundMessage) {
        if msg.timestamp < self.config.started_at {
            return;
        }

        if self.config.debug_mode {
            self.handle_debug(&msg).await;
            return;
        }

        let Some(command) = commands::parse(&msg.body) else {
            return;
        };

        match command {
            Command::Info => {
                let status = self.state.status().await;
                self.send_reply(&msg, &commands::info_reply(&status)).await;
            }
            Command::Tokens(arg) => self.handle_tokens(&msg, arg).await,
            Command::Model(alias) => self.handle_model(&msg, alias).await,
            Command::Reset => {
                let reply = if self.state.reset_session(&msg.chat_id).await {
                    info!("🧹 Session reset for {}", msg.chat_id);
                    commands::RESET_DONE
                } else {
                    commands::RESET_NOTHING
                };
                self.send_reply(&msg, reply).await;
            }
            Command::Query(query) => {
                if let Err(e) = self.handle_query(&msg, query).await {
                    error!("❌ Query failed in {}: {:?}", msg.chat_id, e);
                    if let Err(e) = self.platform.clear_state(&msg.chat_id).await {
                        warn!("Failed to clear typing state: {}", e);
                    }
                    self.send_reply(&msg, &commands::query_failed_reply(&e)).await;
                }
            }
        }
    }

    async fn handle_tokens(&self, msg: &InboundMessage, arg: &str) {
        let Some(ceiling) = commands::parse_token_ceiling(arg) else {
            self.send_reply(msg, &commands::tokens_invalid_reply()).await;
            return;
        };

        let reply = match self.state.set_token_ceiling(ceiling).await {
            Ok(()) => commands::tokens_set_reply(ceiling),
            Err(ReloadError::CeilingOutOfRange(_)) => commands::tokens_invalid_reply(),
            Err(e) => {
                error!("Model reload failed: {}", e);
                commands::reload_failed_reply(&e)
            }
        };
        self.send_reply(msg, &reply).await;
    }

    async fn handle_model(&self, msg: &InboundMessage, alias: &str) {
        let reply = match self.state.switch_model(alias).await {
            Ok(model_id) => commands::model_set_reply(model_id),
            Err(ReloadError::UnknownAlias { valid }) => commands::model_unknown_reply(&valid),
            Err(e) => {
                error!("Model reload failed: {}", e);
                commands::reload_failed_reply(&e)
            }
        };
        self.send_reply(msg, &reply).await;
    }

    async fn handle_query(&self, msg: &InboundMessage, query: &str) -> Result<(), QueryError> {
        let chat_id = msg.chat_id.as_str();
        let sender = self.identity.resolve(msg, self.platform.as_ref()).await;
        let name = msg
            .notify_name
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or(DEFAULT_SENDER_NAME);

        let model_id = self.state.status().await.model_id;
        info!(
            "📩 [{}] From: {} ({}): \"{}\"",
            model_id,
            sender.phone,
            name,
            if query.is_empty() { "[Media]".to_string() } else { query.chars().take(80).collect() }
        );

        if let Err(e) = self.platform.set_typing(chat_id).await {
            warn!("Failed to set typing state: {}", e);
        }

        let media = self.media.prepare(msg, self.platform.as_ref()).await?;

        let context = self
            .config
            .sender_context
            .then(|| sender_context_line(&sender.phone, name));
        let Some(parts) = build_parts(query, media.as_ref(), context.as_deref()) else {
            self.send_reply(msg, commands::EMPTY_QUERY).await;
            self.clear_typing(chat_id).await;
            return Ok(());
        };

        let session = self.state.session(chat_id).await;
        let reply = {
            let mut session = session.lock().await;
            session.send_message(self.model_api.as_ref(), parts).await?
        };

        if let Some(usage) = reply.usage {
            self.state.record_usage(usage).await;
        }

        let mentions = extract_mentions(&reply.text);
        info!("🤖 Replying in {} ({} chars, {} mention(s))", chat_id, reply.text.len(), mentions.len());

        self.platform.reply(&msg.id, &reply.text, &mentions).await?;
        self.clear_typing(chat_id).await;
        Ok(())
    }

    async fn handle_debug(&self, msg: &InboundMessage) {
        if debug_report::is_report(&msg.body) {
            return;
        }

        info!("📨 Message received in {}, building debug report", msg.chat_id);
        let reply = match debug_report::build_report(msg, self.platform.as_ref(), &self.identity).await {
            Ok(report) => report,
            Err(e) => {
                error!("Debug report failed: {}", e);
                debug_report::report_failed_reply(&e)
            }
        };
        self.send_reply(msg, &reply).await;
    }

    async fn send_reply(&self, msg: &InboundMessage, text: &str) {
        if let Err(e) = self.platform.reply(&msg.id, text, &[]).await {
            error!("Failed to reply in {}: {}", msg.chat_id, e);
        }
    }

    async fn clear_typing(&self, chat_id: &str) {
        if let Err(e) = self.platform.clear_state(chat_id).await {
            warn!("Failed to clear typing state: {}", e);
        }
    }
}

pub fn sender_context_line(phone: &str, name: &str) -> String {
    format!("[Sistema: Mensaje de +{phone}, nombre \"{name}\"].\n")
}

/// Instruction used when media arrives without text.
pub fn default_media_prompt(media: &MediaPayload) -> &'static str {
    if media.mime_type.starts_with("audio") {
        "Transcribe este audio y responde."
    } else if media.is_image() {
        "Describe esta imagen."
    } else {
        "Analiza este archivo."
    }
}

/// Request parts: media first, then text. `None` when there is nothing to send.
pub fn build_parts(query: &str, media: Option<&MediaPayload>, context: Option<&str>) -> Option<Vec<Part>> {
    let context = context.unwrap_or_default();
    let mut parts = Vec::with_capacity(2);

    if let Some(media) = media {
        parts.push(Part::inline(media.mime_type.as_str(), media.data.as_str()));
    }

    if !query.is_empty() {
        parts.push(Part::text(format!("{context}{query}")));
    } else if let Some(media) = media {
        parts.push(Part::text(format!("{context}{}", default_media_prompt(media))));
    } else {
        return None;
    }

    Some(parts)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn media(mime: &str) -> MediaPayload {
        MediaPayload { mime_type: mime.to_string(), data: "QUJD".to_string(), filename: None }
    }

    #[test]
    fn test_text_only_parts() {
        let parts = build_parts("what is 2+2", None, None).unwrap();
        assert_eq!(parts, vec![Part::text("what is 2+2")]);
    }

    #[test]
    fn test_context_prefix() {
        let context = sender_context_line("5491122", "Ana");
        assert_eq!(context, "[Sistema: Mensaje de +5491122, nombre \"Ana\"].\n");

        let parts = build_parts("hola", None, Some(&context)).unwrap();
        assert_eq!(parts, vec![Part::text(format!("{context}hola"))]);
    }

    #[test]
    fn test_media_comes_first() {
        let audio = media("audio/mp3");
        let parts = build_parts("resumilo", Some(&audio), None).unwrap();
        assert_eq!(parts, vec![Part::inline("audio/mp3", "QUJD"), Part::text("resumilo")]);
    }

    #[test]
    fn test_default_prompts_by_media_type() {
        let cases = [
            ("audio/mp3", "Transcribe este audio y responde."),
            ("image/jpeg", "Describe esta imagen."),
            ("application/pdf", "Analiza este archivo."),
        ];
        for (mime, prompt) in cases {
            let m = media(mime);
            let parts = build_parts("", Some(&m), Some("ctx\n")).unwrap();
            assert_eq!(parts.len(), 2);
            assert_eq!(parts[1], Part::text(format!("ctx\n{prompt}")));
        }
    }

    #[test]
    fn test_nothing_to_send() {
        assert_eq!(build_parts("", None, Some("ctx\n")), None);
    }
}
