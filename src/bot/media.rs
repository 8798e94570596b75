//! Attachment extraction and audio normalization.

use std::sync::Arc;

use tracing::{info, warn};

use crate::bot::message::{InboundMessage, MediaPayload};
use crate::bot::platform::{ChatPlatform, PlatformError};
use crate::bot::transcode::Transcoder;

pub struct MediaPreprocessor {
    transcoder: Arc<dyn Transcoder>,
}

impl MediaPreprocessor {
    pub fn new(transcoder: Arc<dyn Transcoder>) -> Self {
        Self { transcoder }
    }

    /// The message's own attachment, else the quoted message's attachment.
    /// Audio is converted to mp3 when possible. Download errors propagate;
    /// transcoding errors only degrade to the original payload.
    pub async fn prepare(&self, msg: &InboundMessage, platform: &dyn ChatPlatform) -> Result<Option<MediaPayload>, PlatformError> {
        let media = if msg.has_media {
            platform.download_media(&msg.id).await?
        } else if msg.has_quoted_msg {
            match platform.quoted_message(&msg.id).await? {
                Some(quoted) if quoted.has_media => platform.download_media(&quoted.id).await?,
                _ => None,
            }
        } else {
            None
        };

        let Some(media) = media else {
            return Ok(None);
        };

        if !media.is_audio() {
            return Ok(Some(media));
        }

        Ok(Some(self.normalize_audio(media).await))
    }

    async fn normalize_audio(&self, media: MediaPayload) -> MediaPayload {
        match self.transcoder.to_mp3(&media).await {
            Ok(converted) => {
                info!("🎵 Converted {} to {}", media.mime_type, converted.mime_type);
                converted
            }
            Err(e) => {
                warn!("⚠️ Audio conversion failed, using original: {}", e);
                media
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::message::QuotedMessage;
    use crate::bot::tests::mock::{MockPlatform, MockTranscoder};
    use crate::bot::transcode::NORMALIZED_AUDIO_MIME;

    fn payload(mime: &str) -> MediaPayload {
        MediaPayload { mime_type: mime.to_string(), data: "AAAA".to_string(), filename: None }
    }

    fn msg(has_media: bool, has_quoted_msg: bool) -> InboundMessage {
        InboundMessage {
            id: "m1".to_string(),
            chat_id: "c1@c.us".to_string(),
            has_media,
            has_quoted_msg,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_no_media() {
        let platform = MockPlatform::new();
        let prep = MediaPreprocessor::new(Arc::new(MockTranscoder::ok()));
        assert_eq!(prep.prepare(&msg(false, false), &platform).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_image_passes_through() {
        let platform = MockPlatform::new();
        platform.media.lock().unwrap().insert("m1".to_string(), payload("image/jpeg"));
        let transcoder = Arc::new(MockTranscoder::ok());
        let prep = MediaPreprocessor::new(transcoder.clone());

        let media = prep.prepare(&msg(true, false), &platform).await.unwrap();
        assert_eq!(media, Some(payload("image/jpeg")));
        assert_eq!(transcoder.calls(), 0);
    }

    #[tokio::test]
    async fn test_audio_is_normalized() {
        let platform = MockPlatform::new();
        platform.media.lock().unwrap().insert("m1".to_string(), payload("audio/ogg"));
        let prep = MediaPreprocessor::new(Arc::new(MockTranscoder::ok()));

        let media = prep.prepare(&msg(true, false), &platform).await.unwrap().unwrap();
        assert_eq!(media.mime_type, NORMALIZED_AUDIO_MIME);
    }

    #[tokio::test]
    async fn test_transcode_failure_returns_original() {
        let platform = MockPlatform::new();
        platform.media.lock().unwrap().insert("m1".to_string(), payload("audio/ogg"));
        let prep = MediaPreprocessor::new(Arc::new(MockTranscoder::failing()));

        let media = prep.prepare(&msg(true, false), &platform).await.unwrap();
        assert_eq!(media, Some(payload("audio/ogg")));
    }

    #[tokio::test]
    async fn test_quoted_media() {
        let platform = MockPlatform::new();
        platform
            .quoted
            .lock()
            .unwrap()
            .insert("m1".to_string(), QuotedMessage { id: "q1".to_string(), has_media: true });
        platform.media.lock().unwrap().insert("q1".to_string(), payload("image/png"));
        let prep = MediaPreprocessor::new(Arc::new(MockTranscoder::ok()));

        let media = prep.prepare(&msg(false, true), &platform).await.unwrap();
        assert_eq!(media, Some(payload("image/png")));
    }

    #[tokio::test]
    async fn test_quoted_without_media() {
        let platform = MockPlatform::new();
        platform
            .quoted
            .lock()
            .unwrap()
            .insert("m1".to_string(), QuotedMessage { id: "q1".to_string(), has_media: false });
        platform.media.lock().unwrap().insert("q1".to_string(), payload("image/png"));
        let prep = MediaPreprocessor::new(Arc::new(MockTranscoder::ok()));

        assert_eq!(prep.prepare(&msg(false, true), &platform).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_own_media_wins_over_quoted() {
        let platform = MockPlatform::new();
        platform.media.lock().unwrap().insert("m1".to_string(), payload("image/jpeg"));
        platform
            .quoted
            .lock()
            .unwrap()
            .insert("m1".to_string(), QuotedMessage { id: "q1".to_string(), has_media: true });
        platform.media.lock().unwrap().insert("q1".to_string(), payload("image/png"));
        let prep = MediaPreprocessor::new(Arc::new(MockTranscoder::ok()));

        let media = prep.prepare(&msg(true, true), &platform).await.unwrap();
        assert_eq!(media, Some(payload("image/jpeg")));
    }
}
