//! Message types exchanged with the WhatsApp bridge.
//!
//! Field names follow the bridge's JSON, which mirrors what whatsapp-web.js
//! exposes on `Message`, `MessageMedia`, `Contact` and `Chat`.

use serde::{Deserialize, Serialize};

/// Server suffix of a phone-linked WhatsApp identifier.
pub const PHONE_SERVER_SUFFIX: &str = "@c.us";

/// Server suffix of a linked identifier (LID).
pub const LID_SERVER_SUFFIX: &str = "@lid";

/// An inbound `message_create` event.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Serialized message id, used to reply and to fetch media.
    pub id: String,
    /// Serialized chat id (`...@c.us` for direct chats, `...@g.us` for groups).
    pub chat_id: String,
    #[serde(default)]
    pub body: String,
    /// Unix seconds.
    pub timestamp: i64,
    #[serde(default)]
    pub from_me: bool,
    #[serde(default)]
    pub from: Option<String>,
    /// Sender inside a group chat.
    #[serde(default)]
    pub author: Option<String>,
    /// `id.participant` of the message key.
    #[serde(default)]
    pub participant: Option<String>,
    /// Raw fields the library does not surface directly.
    #[serde(default)]
    pub raw: RawMessageData,
    #[serde(default)]
    pub notify_name: Option<String>,
    #[serde(default)]
    pub has_media: bool,
    #[serde(default)]
    pub has_quoted_msg: bool,
}

impl InboundMessage {
    /// Best guess at who sent the message: the group author, else `from`.
    pub fn sender_candidate(&self) -> Option<&str> {
        non_empty(&self.author).or_else(|| non_empty(&self.from))
    }
}

/// The `_data` blob of a message.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawMessageData {
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub participant: Option<String>,
    /// `_data.id.participant`
    #[serde(default)]
    pub id_participant: Option<String>,
}

/// Downloaded attachment. `data` is base64.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaPayload {
    #[serde(rename = "mimetype")]
    pub mime_type: String,
    pub data: String,
    #[serde(default)]
    pub filename: Option<String>,
}

impl MediaPayload {
    pub fn is_audio(&self) -> bool {
        self.mime_type.starts_with("audio") || self.mime_type.contains("ogg")
    }

    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image")
    }
}

/// The message quoted by an inbound message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotedMessage {
    pub id: String,
    #[serde(default)]
    pub has_media: bool,
}

/// Result of the phone-mapping utility for a linked identifier.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LidMapping {
    #[serde(default)]
    pub user: Option<String>,
}

/// A contact record from the client's contact store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContactRecord {
    #[serde(default)]
    pub userid: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub pushname: Option<String>,
    #[serde(default)]
    pub is_my_contact: bool,
    #[serde(default)]
    pub id: Option<ContactWid>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContactWid {
    pub user: String,
    pub server: String,
}

impl ContactRecord {
    /// First phone-like value the record carries.
    pub fn phone(&self) -> Option<&str> {
        non_empty(&self.userid)
            .or_else(|| non_empty(&self.phone_number))
            .or_else(|| {
                self.id
                    .as_ref()
                    .filter(|wid| wid.server == "c.us" && !wid.user.is_empty())
                    .map(|wid| wid.user.as_str())
            })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatInfo {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub is_group: bool,
    #[serde(default)]
    pub participants: Vec<Participant>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Participant {
    pub id: String,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub is_super_admin: bool,
}

/// The bot's own account, as reported by the bridge.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientInfo {
    pub wid: String,
    #[serde(default)]
    pub pushname: Option<String>,
    #[serde(default)]
    pub platform: Option<String>,
}

impl ClientInfo {
    /// The user part of the serialized wid.
    pub fn user(&self) -> &str {
        self.wid.split('@').next().unwrap_or_default()
    }
}

/// One long-poll response from the bridge.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventBatch {
    pub cursor: u64,
    #[serde(default)]
    pub messages: Vec<InboundMessage>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// Keep only the digits of an identifier. Empty results are `None`.
pub fn digits_only(id: &str) -> Option<String> {
    let digits: String = id.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() { None } else { Some(digits) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digits_only() {
        assert_eq!(digits_only("5491122334455@c.us").as_deref(), Some("5491122334455"));
        assert_eq!(digits_only("+54 9 11-2233").as_deref(), Some("549112233"));
        assert_eq!(digits_only("status@broadcast"), None);
    }

    #[test]
    fn test_sender_candidate_prefers_author() {
        let msg = InboundMessage {
            from: Some("120363@g.us".to_string()),
            author: Some("5491122@c.us".to_string()),
            ..Default::default()
        };
        assert_eq!(msg.sender_candidate(), Some("5491122@c.us"));

        let msg = InboundMessage {
            from: Some("5491122@c.us".to_string()),
            author: None,
            ..Default::default()
        };
        assert_eq!(msg.sender_candidate(), Some("5491122@c.us"));
    }

    #[test]
    fn test_sender_candidate_skips_empty_author() {
        let msg = InboundMessage {
            from: Some("5491122334455@c.us".to_string()),
            author: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(msg.sender_candidate(), Some("5491122334455@c.us"));

        let msg = InboundMessage { from: Some(String::new()), author: Some(String::new()), ..Default::default() };
        assert_eq!(msg.sender_candidate(), None);
    }

    #[test]
    fn test_contact_phone_skips_empty_fields() {
        let contact = ContactRecord {
            userid: Some(String::new()),
            phone_number: Some("5491177".to_string()),
            ..Default::default()
        };
        assert_eq!(contact.phone(), Some("5491177"));
    }

    #[test]
    fn test_audio_detection() {
        let media = |mime: &str| MediaPayload {
            mime_type: mime.to_string(),
            data: String::new(),
            filename: None,
        };
        assert!(media("audio/ogg; codecs=opus").is_audio());
        assert!(media("audio/mpeg").is_audio());
        assert!(media("application/ogg").is_audio());
        assert!(!media("image/jpeg").is_audio());
        assert!(media("image/jpeg").is_image());
    }

    #[test]
    fn test_contact_phone_order() {
        let contact = ContactRecord {
            userid: None,
            phone_number: Some("5491100".to_string()),
            id: Some(ContactWid { user: "999".to_string(), server: "c.us".to_string() }),
            ..Default::default()
        };
        assert_eq!(contact.phone(), Some("5491100"));

        let contact = ContactRecord {
            id: Some(ContactWid { user: "999".to_string(), server: "lid".to_string() }),
            ..Default::default()
        };
        assert_eq!(contact.phone(), None);
    }

    #[test]
    fn test_inbound_message_parses_bridge_json() {
        let json = r#"{
            "id": "false_5491100@c.us_ABC",
            "chat_id": "5491100@c.us",
            "body": "!bot hola",
            "timestamp": 1700000000,
            "from": "5491100@c.us",
            "raw": {"id_participant": "123@lid"},
            "has_media": true
        }"#;
        let msg: InboundMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.body, "!bot hola");
        assert!(msg.has_media);
        assert!(!msg.has_quoted_msg);
        assert_eq!(msg.raw.id_participant.as_deref(), Some("123@lid"));
    }

    #[test]
    fn test_client_info_user() {
        let info = ClientInfo { wid: "5491100@c.us".to_string(), ..Default::default() };
        assert_eq!(info.user(), "5491100");
    }
}
