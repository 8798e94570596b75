//! Sender phone-number resolution.
//!
//! WhatsApp hands out two kinds of sender ids: phone-linked (`...@c.us`) and
//! opaque linked ids (`...@lid`), depending on group and privacy settings.
//! Resolution walks an ordered list of strategies and takes the first hit.
//! Strategies never fail loudly; the fallback always produces a value.

use async_trait::async_trait;
use tracing::debug;

use crate::bot::message::{InboundMessage, LID_SERVER_SUFFIX, PHONE_SERVER_SUFFIX, digits_only};
use crate::bot::platform::ChatPlatform;

/// Returned when no identifier is available at all.
pub const UNKNOWN_SENDER: &str = "unknown";

/// A resolved phone number and the strategy that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub phone: String,
    pub source: &'static str,
}

#[async_trait]
pub trait IdentityStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn resolve(&self, msg: &InboundMessage, platform: &dyn ChatPlatform) -> Option<String>;
}

/// Messages we sent ourselves resolve to the bot's own number.
pub struct SelfOrigin {
    own_number: Option<String>,
}

#[async_trait]
impl IdentityStrategy for SelfOrigin {
    fn name(&self) -> &'static str {
        "self"
    }

    async fn resolve(&self, msg: &InboundMessage, _platform: &dyn ChatPlatform) -> Option<String> {
        if !msg.from_me {
            return None;
        }
        self.own_number.as_deref().and_then(digits_only)
    }
}

/// `author`/`from` already in phone form.
pub struct DirectSender;

#[async_trait]
impl IdentityStrategy for DirectSender {
    fn name(&self) -> &'static str {
        "direct"
    }

    async fn resolve(&self, msg: &InboundMessage, _platform: &dyn ChatPlatform) -> Option<String> {
        msg.sender_candidate()
            .filter(|id| id.contains(PHONE_SERVER_SUFFIX))
            .and_then(digits_only)
    }
}

/// Nested `_data` fields in phone form.
pub struct NestedSender;

#[async_trait]
impl IdentityStrategy for NestedSender {
    fn name(&self) -> &'static str {
        "nested"
    }

    async fn resolve(&self, msg: &InboundMessage, _platform: &dyn ChatPlatform) -> Option<String> {
        [&msg.raw.id_participant, &msg.raw.participant]
            .into_iter()
            .filter_map(|field| field.as_deref())
            .filter(|id| id.contains(PHONE_SERVER_SUFFIX))
            .find_map(digits_only)
    }
}

/// Ask the live client: LID phone mapping first, then the contact store.
pub struct DirectoryLookup;

#[async_trait]
impl IdentityStrategy for DirectoryLookup {
    fn name(&self) -> &'static str {
        "directory"
    }

    async fn resolve(&self, msg: &InboundMessage, platform: &dyn ChatPlatform) -> Option<String> {
        let wid = lookup_wid(msg.sender_candidate()?);

        match platform.lid_phone_number(&wid).await {
            Ok(Some(mapping)) => {
                if let Some(phone) = mapping.user.as_deref().and_then(digits_only) {
                    return Some(phone);
                }
            }
            Ok(None) => {}
            Err(e) => debug!("LID mapping for {} failed: {}", wid, e),
        }

        match platform.contact(&wid).await {
            Ok(Some(contact)) => contact.phone().and_then(digits_only),
            Ok(None) => None,
            Err(e) => {
                debug!("Contact lookup for {} failed: {}", wid, e);
                None
            }
        }
    }
}

/// Bare ids are assumed to be linked ids.
pub fn lookup_wid(id: &str) -> String {
    if id.contains('@') {
        id.to_string()
    } else {
        format!("{id}{LID_SERVER_SUFFIX}")
    }
}

pub struct IdentityResolver {
    strategies: Vec<Box<dyn IdentityStrategy>>,
}

impl IdentityResolver {
    /// The standard chain: self, direct, nested, directory.
    pub fn new(own_number: Option<String>) -> Self {
        Self::with_strategies(vec![
            Box::new(SelfOrigin { own_number }),
            Box::new(DirectSender),
            Box::new(NestedSender),
            Box::new(DirectoryLookup),
        ])
    }

    pub fn with_strategies(strategies: Vec<Box<dyn IdentityStrategy>>) -> Self {
        Self { strategies }
    }

    pub async fn resolve(&self, msg: &InboundMessage, platform: &dyn ChatPlatform) -> Resolution {
        for strategy in &self.strategies {
            if let Some(phone) = strategy.resolve(msg, platform).await {
                return Resolution { phone, source: strategy.name() };
            }
        }

        let phone = msg
            .sender_candidate()
            .and_then(digits_only)
            .unwrap_or_else(|| UNKNOWN_SENDER.to_string());
        Resolution { phone, source: "fallback" }
    }
}
