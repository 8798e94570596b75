//! Runtime model configuration and the per-chat session cache.
//!
//! One `BotState` lives for the whole process. Reloads (model switch, token
//! ceiling change) build a fresh `ModelHandle` and drop every cached session
//! inside a single critical section, so a reload never interleaves with
//! another reload or with a session lookup.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;

use crate::bot::gemini::{ChatSession, MAX_OUTPUT_TOKENS_LIMIT, ModelError, ModelHandle, UsageMetadata};

/// `!modelo` aliases, in display order.
pub const MODEL_ALIASES: &[(&str, &str)] = &[
    ("3-pro", "gemini-3-pro-preview"),
    ("2.5-pro", "gemini-2.5-pro"),
    ("2.5-flash", "gemini-2.5-flash"),
    ("2.5-lite", "gemini-2.5-flash-lite"),
    ("2.0-flash", "gemini-2.0-flash"),
    ("2.0-lite", "gemini-2.0-flash-lite"),
];

pub fn resolve_alias(alias: &str) -> Option<&'static str> {
    let alias = alias.trim().to_lowercase();
    MODEL_ALIASES
        .iter()
        .find(|(name, _)| *name == alias)
        .map(|(_, model_id)| *model_id)
}

pub fn alias_names() -> Vec<&'static str> {
    MODEL_ALIASES.iter().map(|(name, _)| *name).collect()
}

#[derive(Debug, thiserror::Error)]
pub enum ReloadError {
    #[error("token ceiling {0} outside 1..={max}", max = MAX_OUTPUT_TOKENS_LIMIT)]
    CeilingOutOfRange(u32),
    #[error("unknown model alias; valid: {}", .valid.join(", "))]
    UnknownAlias { valid: Vec<&'static str> },
    #[error("failed to build model: {0}")]
    Build(#[from] ModelError),
}

/// Builds model handles with the fixed instructions and settings.
#[derive(Debug, Clone)]
pub struct ModelFactory {
    instructions: Arc<str>,
    grounding: bool,
}

impl ModelFactory {
    pub fn new(instructions: &str, grounding: bool) -> Self {
        Self { instructions: Arc::from(instructions), grounding }
    }

    pub fn build(&self, model_id: &str, max_output_tokens: u32) -> Result<Arc<ModelHandle>, ModelError> {
        let handle = ModelHandle::new(model_id, max_output_tokens, self.instructions.clone(), self.grounding)?;
        info!("🔄 Active model: {} ({} max tokens)", model_id, max_output_tokens);
        Ok(Arc::new(handle))
    }
}

/// Snapshot reported by `!info`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub model_id: String,
    pub token_ceiling: u32,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl StatusSnapshot {
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

pub type SharedSession = Arc<Mutex<ChatSession>>;

struct Runtime {
    handle: Arc<ModelHandle>,
    /// Bumped on every successful reload.
    generation: u64,
    sessions: HashMap<String, SharedSession>,
    input_tokens: u64,
    output_tokens: u64,
}

/// Configuration state, current model handle and session cache.
pub struct BotState {
    factory: ModelFactory,
    runtime: Mutex<Runtime>,
}

impl BotState {
    pub fn new(factory: ModelFactory, model_id: &str, token_ceiling: u32) -> Result<Self, ModelError> {
        let handle = factory.build(model_id, token_ceiling)?;
        Ok(Self {
            factory,
            runtime: Mutex::new(Runtime {
                handle,
                generation: 0,
                sessions: HashMap::new(),
                input_tokens: 0,
                output_tokens: 0,
            }),
        })
    }

    pub async fn status(&self) -> StatusSnapshot {
        let rt = self.runtime.lock().await;
        StatusSnapshot {
            model_id: rt.handle.model_id().to_string(),
            token_ceiling: rt.handle.max_output_tokens(),
            input_tokens: rt.input_tokens,
            output_tokens: rt.output_tokens,
        }
    }

    pub async fn generation(&self) -> u64 {
        self.runtime.lock().await.generation
    }

    /// Switch to the model behind `alias`. Returns the model id.
    pub async fn switch_model(&self, alias: &str) -> Result<&'static str, ReloadError> {
        let model_id = resolve_alias(alias).ok_or_else(|| ReloadError::UnknownAlias { valid: alias_names() })?;

        let mut rt = self.runtime.lock().await;
        let ceiling = rt.handle.max_output_tokens();
        let handle = self.factory.build(model_id, ceiling)?;
        install(&mut rt, handle);
        Ok(model_id)
    }

    pub async fn set_token_ceiling(&self, ceiling: u32) -> Result<(), ReloadError> {
        if !(1..=MAX_OUTPUT_TOKENS_LIMIT).contains(&ceiling) {
            return Err(ReloadError::CeilingOutOfRange(ceiling));
        }

        let mut rt = self.runtime.lock().await;
        let handle = self.factory.build(rt.handle.model_id(), ceiling)?;
        install(&mut rt, handle);
        Ok(())
    }

    /// The session for `chat_id` under the current handle, created on first use.
    pub async fn session(&self, chat_id: &str) -> SharedSession {
        let mut rt = self.runtime.lock().await;
        let handle = rt.handle.clone();
        rt.sessions
            .entry(chat_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(ChatSession::new(handle))))
            .clone()
    }

    /// Forget one chat's session. Returns whether there was one.
    pub async fn reset_session(&self, chat_id: &str) -> bool {
        self.runtime.lock().await.sessions.remove(chat_id).is_some()
    }

    pub async fn has_session(&self, chat_id: &str) -> bool {
        self.runtime.lock().await.sessions.contains_key(chat_id)
    }

    pub async fn record_usage(&self, usage: UsageMetadata) {
        let mut rt = self.runtime.lock().await;
        rt.input_tokens += usage.prompt_token_count;
        rt.output_tokens += usage.candidates_token_count;
    }
}

fn install(rt: &mut Runtime, handle: Arc<ModelHandle>) {
    let dropped = rt.sessions.len();
    rt.handle = handle;
    rt.sessions.clear();
    rt.generation += 1;
    if dropped > 0 {
        info!("🧹 Dropped {} session(s) after reload", dropped);
    }
}
