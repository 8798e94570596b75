//! HTTP client for the WhatsApp Web bridge.
//!
//! The bridge is a sidecar that owns the browser session (pairing, auth,
//! framing) and exposes message events and client actions over local HTTP.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::debug;

use crate::bot::message::{ChatInfo, ClientInfo, ContactRecord, EventBatch, LidMapping, MediaPayload, QuotedMessage};
use crate::bot::platform::{ChatPlatform, PlatformError};

/// Bridge API client.
pub struct BridgeClient {
    base_url: String,
    http: reqwest::Client,
}

impl BridgeClient {
    pub fn new(base_url: &str) -> Result<Self, PlatformError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Long-poll for messages created after `cursor`.
    pub async fn poll_events(&self, cursor: u64, timeout_secs: u64) -> Result<EventBatch, PlatformError> {
        let response = self
            .http
            .get(self.url("/events"))
            .query(&[("after", cursor), ("timeout", timeout_secs)])
            .timeout(Duration::from_secs(timeout_secs + 10))
            .send()
            .await?;

        let body = success_body(response).await?;
        let batch: EventBatch = serde_json::from_str(&body)?;
        if !batch.messages.is_empty() {
            debug!("Polled {} event(s), cursor {}", batch.messages.len(), batch.cursor);
        }
        Ok(batch)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, PlatformError> {
        let response = self.http.get(self.url(path)).send().await?;
        let body = success_body(response).await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Like `get_json`, but a 404 means "not there" rather than an error.
    async fn get_optional<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, PlatformError> {
        let response = self.http.get(self.url(path)).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body = success_body(response).await?;
        Ok(Some(serde_json::from_str(&body)?))
    }

    async fn post(&self, path: &str, payload: serde_json::Value) -> Result<(), PlatformError> {
        let response = self.http.post(self.url(path)).json(&payload).send().await?;
        success_body(response).await.map(|_| ())
    }
}

async fn success_body(response: reqwest::Response) -> Result<String, PlatformError> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(PlatformError::Status { status: status.as_u16(), body });
    }
    Ok(body)
}

fn segment(id: &str) -> String {
    urlencoding::encode(id).into_owned()
}

#[async_trait]
impl ChatPlatform for BridgeClient {
    async fn reply(&self, message_id: &str, text: &str, mentions: &[String]) -> Result<(), PlatformError> {
        self.post(
            &format!("/messages/{}/reply", segment(message_id)),
            json!({ "text": text, "mentions": mentions }),
        )
        .await
    }

    async fn send_message(&self, chat_id: &str, text: &str) -> Result<(), PlatformError> {
        self.post(&format!("/chats/{}/messages", segment(chat_id)), json!({ "text": text }))
            .await
    }

    async fn set_typing(&self, chat_id: &str) -> Result<(), PlatformError> {
        self.post(&format!("/chats/{}/state", segment(chat_id)), json!({ "state": "typing" }))
            .await
    }

    async fn clear_state(&self, chat_id: &str) -> Result<(), PlatformError> {
        self.post(&format!("/chats/{}/state", segment(chat_id)), json!({ "state": "clear" }))
            .await
    }

    async fn download_media(&self, message_id: &str) -> Result<Option<MediaPayload>, PlatformError> {
        let media: Option<MediaPayload> = self
            .get_optional(&format!("/messages/{}/media", segment(message_id)))
            .await?;
        if let Some(ref m) = media {
            debug!("📥 Downloaded media ({}, {} base64 chars)", m.mime_type, m.data.len());
        }
        Ok(media)
    }

    async fn quoted_message(&self, message_id: &str) -> Result<Option<QuotedMessage>, PlatformError> {
        self.get_optional(&format!("/messages/{}/quoted", segment(message_id)))
            .await
    }

    async fn lid_phone_number(&self, wid: &str) -> Result<Option<LidMapping>, PlatformError> {
        self.get_optional(&format!("/directory/lid/{}", segment(wid))).await
    }

    async fn contact(&self, wid: &str) -> Result<Option<ContactRecord>, PlatformError> {
        self.get_optional(&format!("/directory/contacts/{}", segment(wid)))
            .await
    }

    async fn chat_info(&self, chat_id: &str) -> Result<ChatInfo, PlatformError> {
        self.get_json(&format!("/chats/{}", segment(chat_id))).await
    }

    async fn client_info(&self) -> Result<ClientInfo, PlatformError> {
        self.get_json("/me").await
    }
}
