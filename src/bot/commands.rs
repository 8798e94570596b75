//! In-chat commands and their reply texts.

use crate::bot::gemini::MAX_OUTPUT_TOKENS_LIMIT;
use crate::bot::state::StatusSnapshot;

const BOT_PREFIX: &str = "!bot";

/// What a message asks for. Matched in this order; first match wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    /// `!info`
    Info,
    /// `!tokens <n>`, argument unparsed
    Tokens(&'a str),
    /// `!modelo <alias>`
    Model(&'a str),
    /// `!reset`
    Reset,
    /// `!bot [text]`, any case
    Query(&'a str),
}

/// Parse a message body. `None` means the message is not for the bot.
pub fn parse(body: &str) -> Option<Command<'_>> {
    let text = body.trim();

    if text == "!info" {
        return Some(Command::Info);
    }
    if let Some(arg) = text.strip_prefix("!tokens ") {
        return Some(Command::Tokens(arg.trim()));
    }
    if let Some(arg) = text.strip_prefix("!modelo ") {
        return Some(Command::Model(arg.trim()));
    }
    if text == "!reset" {
        return Some(Command::Reset);
    }
    if text
        .get(..BOT_PREFIX.len())
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(BOT_PREFIX))
    {
        return Some(Command::Query(text[BOT_PREFIX.len()..].trim()));
    }
    None
}

/// A valid `!tokens` argument.
pub fn parse_token_ceiling(arg: &str) -> Option<u32> {
    arg.parse::<u32>()
        .ok()
        .filter(|n| (1..=MAX_OUTPUT_TOKENS_LIMIT).contains(n))
}

pub fn info_reply(status: &StatusSnapshot) -> String {
    format!(
        "📊 *Estado de Whemini*\n🧠 Modelo: `{}`\n📏 Tokens Max: {}\n📈 Uso: {} in / {} out ({} total)",
        status.model_id,
        status.token_ceiling,
        status.input_tokens,
        status.output_tokens,
        status.total_tokens()
    )
}

pub fn tokens_set_reply(ceiling: u32) -> String {
    format!("✅ Tokens ajustados a: {ceiling}")
}

pub fn tokens_invalid_reply() -> String {
    format!("❌ El límite de tokens debe ser un número entre 1 y {MAX_OUTPUT_TOKENS_LIMIT}.")
}

pub fn model_set_reply(model_id: &str) -> String {
    format!("✅ Modelo cambiado a: `{model_id}`")
}

pub fn model_unknown_reply(valid: &[&str]) -> String {
    format!("❌ Modelos: {}", valid.join(", "))
}

pub fn reload_failed_reply(error: &impl std::fmt::Display) -> String {
    format!("❌ No se pudo recargar el modelo: {error}")
}

pub const RESET_DONE: &str = "🤖 *Memoria reiniciada.*";
pub const RESET_NOTHING: &str = "🤖 No había memoria que olvidar.";
pub const EMPTY_QUERY: &str = "🤖 Escribe tu pregunta después de !bot o adjunta un archivo.";

pub fn query_failed_reply(error: &impl std::fmt::Display) -> String {
    format!("🤖 Error: {error}")
}
