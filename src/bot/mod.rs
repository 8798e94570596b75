//! Bot module - relays WhatsApp messages to Gemini.

pub mod bridge;
pub mod commands;
pub mod debug_report;
pub mod engine;
pub mod gemini;
pub mod identity;
pub mod media;
pub mod mentions;
pub mod message;
pub mod platform;
pub mod state;
pub mod transcode;


pub use bridge::BridgeClient;
pub use engine::{Engine, EngineConfig};
pub use gemini::{GeminiClient, ModelApi};
pub use identity::IdentityResolver;
pub use media::MediaPreprocessor;
pub use message::{InboundMessage, MediaPayload, QuotedMessage};
pub use platform::ChatPlatform;
pub use state::{BotState, ModelFactory};
pub use transcode::FfmpegTranscoder;
