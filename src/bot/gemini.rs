//! Gemini API client and conversation sessions.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Upper bound for `maxOutputTokens` accepted by `!tokens`.
pub const MAX_OUTPUT_TOKENS_LIMIT: u32 = 8192;

const TEMPERATURE: f32 = 1.0;
const TOP_P: f32 = 0.95;
const TOP_K: u32 = 64;

const HARM_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },
    #[error("failed to parse response: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("prompt blocked: {0}")]
    Blocked(String),
    #[error("empty reply from model")]
    EmptyReply,
    #[error("invalid model configuration: {0}")]
    InvalidConfig(String),
}

// --- Wire types ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub parts: Vec<Part>,
}

/// Either text or inline binary data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<Blob>,
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self { text: Some(text.into()), inline_data: None }
    }

    pub fn inline(mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            text: None,
            inline_data: Some(Blob { mime_type: mime_type.into(), data: data.into() }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blob {
    pub mime_type: String,
    /// Base64.
    pub data: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemInstruction {
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SafetySetting {
    pub category: &'static str,
    pub threshold: &'static str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub max_output_tokens: u32,
    pub response_mime_type: &'static str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    pub google_search: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub contents: Vec<Content>,
    pub system_instruction: SystemInstruction,
    pub safety_settings: Vec<SafetySetting>,
    pub generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Tool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    #[serde(default)]
    pub usage_metadata: Option<UsageMetadata>,
    #[serde(default)]
    pub prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<Content>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    #[serde(default)]
    pub prompt_token_count: u64,
    #[serde(default)]
    pub candidates_token_count: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    #[serde(default)]
    pub block_reason: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    message: String,
}

impl GenerateResponse {
    /// Concatenated text of the first candidate.
    pub fn text(&self) -> Result<String, ModelError> {
        let Some(candidate) = self.candidates.first() else {
            let reason = self
                .prompt_feedback
                .as_ref()
                .and_then(|f| f.block_reason.clone())
                .unwrap_or_else(|| "no candidates returned".to_string());
            return Err(ModelError::Blocked(reason));
        };

        let text: String = candidate
            .content
            .iter()
            .flat_map(|c| c.parts.iter())
            .filter_map(|p| p.text.as_deref())
            .collect();

        if text.is_empty() {
            return match candidate.finish_reason.as_deref() {
                Some(reason @ ("SAFETY" | "BLOCKLIST" | "PROHIBITED_CONTENT")) => {
                    Err(ModelError::Blocked(reason.to_string()))
                }
                _ => Err(ModelError::EmptyReply),
            };
        }
        Ok(text)
    }
}

// --- Transport ---

/// Transport for `generateContent`.
#[async_trait]
pub trait ModelApi: Send + Sync {
    async fn generate_content(&self, model_id: &str, request: &GenerateRequest) -> Result<GenerateResponse, ModelError>;
}

pub struct GeminiClient {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl GeminiClient {
    pub fn new(api_key: String, base_url: &str) -> Result<Self, ModelError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;

        Ok(Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }
}

#[async_trait]
impl ModelApi for GeminiClient {
    async fn generate_content(&self, model_id: &str, request: &GenerateRequest) -> Result<GenerateResponse, ModelError> {
        let url = format!("{}/v1beta/models/{}:generateContent", self.base_url, model_id);

        let response = self
            .client
            .post(&url)
            .query(&[("key", &self.api_key)])
            .json(request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        debug!("Gemini response status: {status}");

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorEnvelope>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(ModelError::Api { status: status.as_u16(), message });
        }

        Ok(serde_json::from_str(&body)?)
    }
}

// --- Model handle and sessions ---

/// A configured model: id, output ceiling, system instructions and fixed
/// safety/generation settings. Never mutated; replaced on reload.
#[derive(Debug)]
pub struct ModelHandle {
    model_id: String,
    max_output_tokens: u32,
    instructions: Arc<str>,
    grounding: bool,
}

impl ModelHandle {
    pub fn new(model_id: &str, max_output_tokens: u32, instructions: Arc<str>, grounding: bool) -> Result<Self, ModelError> {
        if model_id.is_empty() || model_id.contains(|c: char| c.is_whitespace() || c == '/') {
            return Err(ModelError::InvalidConfig(format!("bad model id '{model_id}'")));
        }
        if !(1..=MAX_OUTPUT_TOKENS_LIMIT).contains(&max_output_tokens) {
            return Err(ModelError::InvalidConfig(format!(
                "max output tokens {max_output_tokens} outside 1..={MAX_OUTPUT_TOKENS_LIMIT}"
            )));
        }
        if instructions.trim().is_empty() {
            return Err(ModelError::InvalidConfig("empty system instructions".to_string()));
        }

        Ok(Self { model_id: model_id.to_string(), max_output_tokens, instructions, grounding })
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn max_output_tokens(&self) -> u32 {
        self.max_output_tokens
    }

    /// Build a request for the given conversation contents.
    pub fn request(&self, contents: Vec<Content>) -> GenerateRequest {
        GenerateRequest {
            contents,
            system_instruction: SystemInstruction {
                parts: vec![Part::text(self.instructions.as_ref())],
            },
            safety_settings: HARM_CATEGORIES
                .iter()
                .map(|&category| SafetySetting { category, threshold: "BLOCK_NONE" })
                .collect(),
            generation_config: GenerationConfig {
                temperature: TEMPERATURE,
                top_p: TOP_P,
                top_k: TOP_K,
                max_output_tokens: self.max_output_tokens,
                response_mime_type: "text/plain",
            },
            tools: if self.grounding {
                vec![Tool { google_search: serde_json::Map::new() }]
            } else {
                vec![]
            },
        }
    }
}

/// Text and usage of one model turn.
#[derive(Debug, Clone)]
pub struct ModelReply {
    pub text: String,
    pub usage: Option<UsageMetadata>,
}

/// A conversation bound to one model handle. History lives client-side.
pub struct ChatSession {
    handle: Arc<ModelHandle>,
    history: Vec<Content>,
}

impl ChatSession {
    pub fn new(handle: Arc<ModelHandle>) -> Self {
        Self { handle, history: Vec::new() }
    }

    pub fn handle(&self) -> &Arc<ModelHandle> {
        &self.handle
    }

    pub fn history(&self) -> &[Content] {
        &self.history
    }

    /// Send one user turn. History only grows when the model answers.
    pub async fn send_message(&mut self, api: &dyn ModelApi, parts: Vec<Part>) -> Result<ModelReply, ModelError> {
        let user_turn = Content { role: "user".to_string(), parts };

        let mut contents = self.history.clone();
        contents.push(user_turn.clone());
        let request = self.handle.request(contents);

        let response = api.generate_content(self.handle.model_id(), &request).await?;
        let text = response.text()?;

        let model_turn = response
            .candidates
            .first()
            .and_then(|c| c.content.clone())
            .unwrap_or_else(|| Content { role: "model".to_string(), parts: vec![Part::text(text.clone())] });

        self.history.push(user_turn);
        self.history.push(model_turn);

        Ok(ModelReply { text, usage: response.usage_metadata })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct CannedApi {
        responses: Mutex<Vec<Result<GenerateResponse, ModelError>>>,
        seen: Mutex<Vec<GenerateRequest>>,
    }

    impl CannedApi {
        fn new(responses: Vec<Result<GenerateResponse, ModelError>>) -> Self {
            Self { responses: Mutex::new(responses), seen: Mutex::new(Vec::new()) }
        }
    }

    #[async_trait]
    impl ModelApi for CannedApi {
        async fn generate_content(&self, _model_id: &str, request: &GenerateRequest) -> Result<GenerateResponse, ModelError> {
            self.seen.lock().unwrap().push(request.clone());
            self.responses.lock().unwrap().remove(0)
        }
    }

    fn reply(text: &str) -> GenerateResponse {
        serde_json::from_value(serde_json::json!({
            "candidates": [{"content": {"role": "model", "parts": [{"text": text}]}, "finishReason": "STOP"}],
            "usageMetadata": {"promptTokenCount": 10, "candidatesTokenCount": 4, "totalTokenCount": 14}
        }))
        .unwrap()
    }

    fn handle() -> Arc<ModelHandle> {
        Arc::new(ModelHandle::new("gemini-2.0-flash-lite", 650, Arc::from("be brief"), true).unwrap())
    }

    #[test]
    fn test_request_wire_shape() {
        let request = handle().request(vec![Content {
            role: "user".to_string(),
            parts: vec![Part::inline("audio/mp3", "AAAA"), Part::text("hola")],
        }]);
        let value = serde_json::to_value(&request).unwrap();

        assert_eq!(value["systemInstruction"]["parts"][0]["text"], "be brief");
        assert_eq!(value["generationConfig"]["maxOutputTokens"], 650);
        assert_eq!(value["generationConfig"]["topK"], 64);
        assert_eq!(value["generationConfig"]["responseMimeType"], "text/plain");
        assert_eq!(value["safetySettings"].as_array().unwrap().len(), 4);
        assert_eq!(value["safetySettings"][0]["threshold"], "BLOCK_NONE");
        assert!(value["tools"][0]["googleSearch"].is_object());

        let parts = &value["contents"][0]["parts"];
        assert_eq!(parts[0]["inlineData"]["mimeType"], "audio/mp3");
        assert!(parts[0].get("text").is_none());
        assert_eq!(parts[1]["text"], "hola");
    }

    #[test]
    fn test_request_without_grounding_omits_tools() {
        let handle = ModelHandle::new("gemini-2.5-pro", 100, Arc::from("x"), false).unwrap();
        let value = serde_json::to_value(handle.request(vec![])).unwrap();
        assert!(value.get("tools").is_none());
    }

    #[test]
    fn test_handle_rejects_bad_config() {
        assert!(ModelHandle::new("", 100, Arc::from("x"), true).is_err());
        assert!(ModelHandle::new("models/x y", 100, Arc::from("x"), true).is_err());
        assert!(ModelHandle::new("gemini-2.5-pro", 0, Arc::from("x"), true).is_err());
        assert!(ModelHandle::new("gemini-2.5-pro", 8193, Arc::from("x"), true).is_err());
        assert!(ModelHandle::new("gemini-2.5-pro", 100, Arc::from("  "), true).is_err());
    }

    #[test]
    fn test_response_text_concatenates_parts() {
        let response: GenerateResponse = serde_json::from_value(serde_json::json!({
            "candidates": [{"content": {"role": "model", "parts": [{"text": "a"}, {"text": "b"}]}}]
        }))
        .unwrap();
        assert_eq!(response.text().unwrap(), "ab");
        assert!(response.usage_metadata.is_none());
    }

    #[test]
    fn test_response_blocked_prompt() {
        let response: GenerateResponse = serde_json::from_value(serde_json::json!({
            "promptFeedback": {"blockReason": "OTHER"}
        }))
        .unwrap();
        assert!(matches!(response.text(), Err(ModelError::Blocked(reason)) if reason == "OTHER"));

        let response: GenerateResponse = serde_json::from_value(serde_json::json!({
            "candidates": [{"finishReason": "SAFETY"}]
        }))
        .unwrap();
        assert!(matches!(response.text(), Err(ModelError::Blocked(_))));

        let response: GenerateResponse = serde_json::from_value(serde_json::json!({
            "candidates": [{"finishReason": "MAX_TOKENS", "content": {"role": "model", "parts": []}}]
        }))
        .unwrap();
        assert!(matches!(response.text(), Err(ModelError::EmptyReply)));
    }

    #[tokio::test]
    async fn test_session_keeps_history() {
        let api = CannedApi::new(vec![Ok(reply("4")), Ok(reply("8"))]);
        let mut session = ChatSession::new(handle());

        let first = session.send_message(&api, vec![Part::text("2+2?")]).await.unwrap();
        assert_eq!(first.text, "4");
        assert_eq!(first.usage, Some(UsageMetadata { prompt_token_count: 10, candidates_token_count: 4 }));

        session.send_message(&api, vec![Part::text("times 2?")]).await.unwrap();
        assert_eq!(session.history().len(), 4);

        let seen = api.seen.lock().unwrap();
        assert_eq!(seen[0].contents.len(), 1);
        assert_eq!(seen[1].contents.len(), 3);
        assert_eq!(seen[1].contents[1].role, "model");
    }

    #[tokio::test]
    async fn test_session_history_untouched_on_failure() {
        let api = CannedApi::new(vec![Err(ModelError::Api { status: 500, message: "boom".to_string() })]);
        let mut session = ChatSession::new(handle());

        let result = session.send_message(&api, vec![Part::text("hola")]).await;
        assert!(result.is_err());
        assert!(session.history().is_empty());
    }
}
