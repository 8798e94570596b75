//! Audio transcoding through ffmpeg.
//!
//! Input and output go through temp files (ffmpeg wants a seekable OGG
//! input). Both files are `NamedTempFile`s, so they are removed when this
//! function returns, whichever way it returns.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tempfile::NamedTempFile;
use tokio::process::Command;
use tracing::debug;

use crate::bot::message::MediaPayload;

pub const NORMALIZED_AUDIO_MIME: &str = "audio/mp3";
pub const NORMALIZED_AUDIO_FILENAME: &str = "audio.mp3";

#[derive(Debug, thiserror::Error)]
pub enum TranscodeError {
    #[error("invalid base64 payload: {0}")]
    Decode(#[from] base64::DecodeError),
    #[error("temp file error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
    #[error("ffmpeg exited with {status}: {stderr}")]
    Ffmpeg { status: String, stderr: String },
    #[error("ffmpeg produced no output")]
    EmptyOutput,
}

#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Convert an audio payload to `audio/mp3`.
    async fn to_mp3(&self, media: &MediaPayload) -> Result<MediaPayload, TranscodeError>;
}

pub struct FfmpegTranscoder {
    program: PathBuf,
}

impl FfmpegTranscoder {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self { program: program.into() }
    }
}

impl Default for FfmpegTranscoder {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

/// Temp file named after the current time so concurrent runs never collide.
fn scoped_temp(prefix: &str, suffix: &str) -> std::io::Result<NamedTempFile> {
    let stamp = chrono::Utc::now().timestamp_millis();
    tempfile::Builder::new()
        .prefix(&format!("{prefix}_{stamp}_"))
        .suffix(suffix)
        .tempfile()
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn to_mp3(&self, media: &MediaPayload) -> Result<MediaPayload, TranscodeError> {
        let input_bytes = STANDARD.decode(&media.data)?;

        let input = scoped_temp("input", ".ogg")?;
        tokio::fs::write(input.path(), &input_bytes).await?;
        let output = scoped_temp("output", ".mp3")?;

        let result = Command::new(&self.program)
            .arg("-y")
            .arg("-i")
            .arg(input.path())
            .args(["-f", "mp3"])
            .arg(output.path())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|source| TranscodeError::Spawn {
                program: self.program.display().to_string(),
                source,
            })?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            let tail: String = stderr.lines().rev().take(3).collect::<Vec<_>>().join(" | ");
            return Err(TranscodeError::Ffmpeg { status: result.status.to_string(), stderr: tail });
        }

        let mp3 = tokio::fs::read(output.path()).await?;
        if mp3.is_empty() {
            return Err(TranscodeError::EmptyOutput);
        }

        debug!("Transcoded {} ({} bytes) to mp3 ({} bytes)", media.mime_type, input_bytes.len(), mp3.len());

        Ok(MediaPayload {
            mime_type: NORMALIZED_AUDIO_MIME.to_string(),
            data: STANDARD.encode(&mp3),
            filename: Some(NORMALIZED_AUDIO_FILENAME.to_string()),
        })
    }
}
