use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::bot::gemini::{DEFAULT_BASE_URL, MAX_OUTPUT_TOKENS_LIMIT};

/// Environment variable holding the Gemini API key.
pub const API_KEY_VAR: &str = "GEMINI_API_KEY";

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}", path = .path.display())]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("failed to parse config file '{path}': {source}", path = .path.display())]
    ParseJson { path: PathBuf, source: serde_json::Error },
    #[error("{var} is not set", var = API_KEY_VAR)]
    MissingApiKey,
    #[error("failed to read instructions '{path}': {source}", path = .path.display())]
    ReadInstructions { path: PathBuf, source: std::io::Error },
    #[error("config validation error: {0}")]
    Validation(String),
}

#[derive(Deserialize)]
#[serde(default)]
struct ConfigFile {
    /// Base URL of the WhatsApp bridge sidecar.
    bridge_url: String,
    /// Used when the bridge can't tell us our own number.
    bot_number: Option<String>,
    default_model: String,
    max_output_tokens: u32,
    /// Relative paths resolve against the config file's directory.
    instructions_path: String,
    data_dir: Option<String>,
    debug_mode: bool,
    sender_context: bool,
    grounding: bool,
    poll_timeout_secs: u64,
    ffmpeg_path: String,
    gemini_base_url: String,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            bridge_url: "http://127.0.0.1:3000".to_string(),
            bot_number: None,
            default_model: "gemini-2.0-flash-lite".to_string(),
            max_output_tokens: 650,
            instructions_path: "instructions.txt".to_string(),
            data_dir: None,
            debug_mode: false,
            sender_context: true,
            grounding: true,
            poll_timeout_secs: 30,
            ffmpeg_path: "ffmpeg".to_string(),
            gemini_base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the config file, if one was given.
    pub config_path: Option<PathBuf>,
    pub gemini_api_key: String,
    pub gemini_base_url: String,
    pub bridge_url: String,
    pub bot_number: Option<String>,
    pub default_model: String,
    pub max_output_tokens: u32,
    pub instructions_path: PathBuf,
    /// System instruction text, read at load time.
    pub instructions: String,
    /// Directory for state files (logs).
    pub data_dir: PathBuf,
    pub debug_mode: bool,
    pub sender_context: bool,
    pub grounding: bool,
    pub poll_timeout_secs: u64,
    pub ffmpeg_path: PathBuf,
}

impl Config {
    /// Load from an optional JSON file. Without a file every key takes its
    /// default. `api_key` comes from the environment.
    pub fn load(path: Option<&Path>, api_key: Option<String>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .map_err(|e| ConfigError::ReadFile { path: path.to_path_buf(), source: e })?;
                serde_json::from_str(&content)
                    .map_err(|e| ConfigError::ParseJson { path: path.to_path_buf(), source: e })?
            }
            None => ConfigFile::default(),
        };

        let gemini_api_key = api_key
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .ok_or(ConfigError::MissingApiKey)?;

        if !(1..=MAX_OUTPUT_TOKENS_LIMIT).contains(&file.max_output_tokens) {
            return Err(ConfigError::Validation(format!(
                "max_output_tokens must be between 1 and {MAX_OUTPUT_TOKENS_LIMIT}, got {}",
                file.max_output_tokens
            )));
        }
        if file.default_model.trim().is_empty() {
            return Err(ConfigError::Validation("default_model must not be empty".into()));
        }
        if !file.bridge_url.starts_with("http://") && !file.bridge_url.starts_with("https://") {
            return Err(ConfigError::Validation(format!(
                "bridge_url must be an http(s) URL, got '{}'",
                file.bridge_url
            )));
        }
        if file.poll_timeout_secs == 0 {
            return Err(ConfigError::Validation("poll_timeout_secs must be positive".into()));
        }

        let base_dir = path.and_then(Path::parent).unwrap_or(Path::new(""));
        let instructions_path = base_dir.join(&file.instructions_path);
        let instructions = std::fs::read_to_string(&instructions_path)
            .map_err(|e| ConfigError::ReadInstructions { path: instructions_path.clone(), source: e })?;
        if instructions.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "instructions file '{}' is empty",
                instructions_path.display()
            )));
        }

        let data_dir = file
            .data_dir
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        Ok(Self {
            config_path: path.map(Path::to_path_buf),
            gemini_api_key,
            gemini_base_url: file.gemini_base_url.trim_end_matches('/').to_string(),
            bridge_url: file.bridge_url.trim_end_matches('/').to_string(),
            bot_number: file.bot_number.filter(|n| !n.trim().is_empty()),
            default_model: file.default_model.trim().to_string(),
            max_output_tokens: file.max_output_tokens,
            instructions_path,
            instructions,
            data_dir,
            debug_mode: file.debug_mode,
            sender_context: file.sender_context,
            grounding: file.grounding,
            poll_timeout_secs: file.poll_timeout_secs,
            ffmpeg_path: PathBuf::from(file.ffmpeg_path),
        })
    }
}
