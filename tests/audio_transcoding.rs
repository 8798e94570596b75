//! Integration tests for audio transcoding.
//!
//! These tests require ffmpeg on PATH (or in `FFMPEG_PATH`).
//!
//! Run with: cargo test --features integ_test --test audio_transcoding

#[cfg(feature = "integ_test")]
mod tests {
    use std::path::PathBuf;
    use std::process::Command;

    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use whemini::bot::message::MediaPayload;
    use whemini::bot::transcode::{FfmpegTranscoder, NORMALIZED_AUDIO_MIME, TranscodeError, Transcoder};

    fn ffmpeg_path() -> PathBuf {
        std::env::var("FFMPEG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("ffmpeg"))
    }

    fn ffmpeg_available() -> bool {
        Command::new(ffmpeg_path()).arg("-version").output().is_ok_and(|o| o.status.success())
    }

    /// One second of a 440 Hz tone as an OGG/Opus voice note.
    fn voice_note() -> Option<Vec<u8>> {
        let dir = tempfile::tempdir().ok()?;
        let path = dir.path().join("tone.ogg");
        let status = Command::new(ffmpeg_path())
            .args(["-y", "-f", "lavfi", "-i", "sine=frequency=440:duration=1", "-c:a", "libopus"])
            .arg(&path)
            .output()
            .ok()?;
        if !status.status.success() {
            return None;
        }
        std::fs::read(&path).ok()
    }

    #[tokio::test]
    async fn test_voice_note_becomes_mp3() {
        if !ffmpeg_available() {
            eprintln!("Skipping test: ffmpeg not found");
            return;
        }
        let Some(ogg) = voice_note() else {
            eprintln!("Skipping test: ffmpeg cannot encode opus here");
            return;
        };

        let transcoder = FfmpegTranscoder::new(ffmpeg_path());
        let media = MediaPayload {
            mime_type: "audio/ogg; codecs=opus".to_string(),
            data: STANDARD.encode(&ogg),
            filename: None,
        };

        let mp3 = transcoder.to_mp3(&media).await.expect("transcoding should succeed");
        assert_eq!(mp3.mime_type, NORMALIZED_AUDIO_MIME);
        assert_eq!(mp3.filename.as_deref(), Some("audio.mp3"));

        let bytes = STANDARD.decode(&mp3.data).unwrap();
        // ID3 tag or a raw MPEG frame sync.
        assert!(bytes.starts_with(b"ID3") || (bytes[0] == 0xFF && bytes[1] & 0xE0 == 0xE0));
    }

    #[tokio::test]
    async fn test_garbage_input_is_ffmpeg_error() {
        if !ffmpeg_available() {
            eprintln!("Skipping test: ffmpeg not found");
            return;
        }

        let transcoder = FfmpegTranscoder::new(ffmpeg_path());
        let media = MediaPayload {
            mime_type: "audio/ogg".to_string(),
            data: STANDARD.encode(b"definitely not an ogg stream"),
            filename: None,
        };

        let err = transcoder.to_mp3(&media).await.unwrap_err();
        assert!(matches!(err, TranscodeError::Ffmpeg { .. }));
    }
}
