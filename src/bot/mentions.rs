//! `@<digits>` mention tags in model output.

use std::sync::LazyLock;

use regex::Regex;

use crate::bot::message::PHONE_SERVER_SUFFIX;

static MENTION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"@([0-9]+)").expect("valid mention pattern"));

/// Recipient ids for every `@digits` tag, in order, duplicates kept.
/// The text itself is left alone.
pub fn extract_mentions(text: &str) -> Vec<String> {
    MENTION
        .captures_iter(text)
        .map(|caps| format!("{}{}", &caps[1], PHONE_SERVER_SUFFIX))
        .collect()
}
