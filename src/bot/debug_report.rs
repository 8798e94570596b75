//! Sender/chat diagnostics for tracking down identity resolution problems.
//!
//! In debug mode the bot answers every message with this report instead of
//! running commands. Reports start with [`REPORT_HEADER`] so the bot never
//! reports on its own reports.

use std::fmt::Write;

use crate::bot::identity::{IdentityResolver, lookup_wid};
use crate::bot::message::InboundMessage;
use crate::bot::platform::{ChatPlatform, PlatformError};

pub const REPORT_HEADER: &str = "🔍 *REPORTE DE DEBUG*";

fn field(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("undefined")
}

pub fn is_report(body: &str) -> bool {
    body.starts_with(REPORT_HEADER)
}

pub async fn build_report(
    msg: &InboundMessage,
    platform: &dyn ChatPlatform,
    resolver: &IdentityResolver,
) -> Result<String, PlatformError> {
    let mut out = format!("{REPORT_HEADER} 🔍\n\n");

    // Writing into a String cannot fail.
    let _ = writeln!(out, "🆔 *IDENTIFICACIÓN DEL REMITENTE*");
    let _ = writeln!(out, "🔹 msg.from: `{}`", field(&msg.from));
    let _ = writeln!(out, "🔹 msg.author: `{}`", field(&msg.author));
    let _ = writeln!(out, "🔹 msg.id.participant: `{}`", field(&msg.participant));
    let _ = writeln!(out, "🔹 msg.id.remote: `{}`", msg.chat_id);
    let _ = writeln!(out, "🔹 msg._data.from: `{}`", field(&msg.raw.from));
    let _ = writeln!(out, "🔹 msg._data.author: `{}`", field(&msg.raw.author));
    let _ = writeln!(out, "🔹 msg._data.participant: `{}`", field(&msg.raw.participant));
    let _ = writeln!(out, "🔹 msg._data.id.participant: `{}`", field(&msg.raw.id_participant));

    match msg.sender_candidate() {
        Some(candidate) => {
            let wid = lookup_wid(candidate);
            let lid = match platform.lid_phone_number(&wid).await {
                Ok(Some(mapping)) => field(&mapping.user).to_string(),
                Ok(None) => "sin mapeo".to_string(),
                Err(e) => format!("error: {e}"),
            };
            let _ = writeln!(out, "🔹 LID → teléfono ({wid}): `{lid}`");

            let contact = match platform.contact(&wid).await {
                Ok(Some(c)) => format!(
                    "userid={} phoneNumber={} pushname={} isMyContact={}",
                    field(&c.userid),
                    field(&c.phone_number),
                    field(&c.pushname),
                    c.is_my_contact
                ),
                Ok(None) => "no encontrado".to_string(),
                Err(e) => format!("error: {e}"),
            };
            let _ = writeln!(out, "🔹 Contacto: `{contact}`");
        }
        None => {
            let _ = writeln!(out, "🔹 Sin identificador de remitente para buscar");
        }
    }

    let resolution = resolver.resolve(msg, platform).await;
    let _ = writeln!(out, "🔹 *Número resuelto:* `{}` (vía {})", resolution.phone, resolution.source);

    let chat = platform.chat_info(&msg.chat_id).await?;
    let _ = writeln!(out, "\n🏠 *CONTEXTO DEL CHAT*");
    let _ = writeln!(out, "🔸 Es Grupo: {}", if chat.is_group { "SÍ" } else { "NO" });
    let _ = writeln!(out, "🔸 Nombre Chat: {}", chat.name);
    let _ = writeln!(out, "🔸 Chat ID: `{}`", chat.id);

    if chat.is_group {
        let sender = msg.sender_candidate().unwrap_or_default();
        match chat.participants.iter().find(|p| p.id == sender) {
            Some(p) => {
                let _ = writeln!(
                    out,
                    "🔸 Participante: Admin? {} | SuperAdmin? {}",
                    p.is_admin, p.is_super_admin
                );
            }
            None => {
                let _ = writeln!(out, "🔸 ⚠️ El emisor NO aparece en la lista de participantes (¿LID?)");
            }
        }
    }

    let me = platform.client_info().await?;
    let _ = writeln!(out, "\n🤖 *INFO DEL CLIENTE (BOT)*");
    let _ = writeln!(out, "▫️ Mi ID: `{}`", me.wid);
    let _ = writeln!(out, "▫️ Mi Nombre: {}", field(&me.pushname));
    let _ = write!(out, "▫️ Plataforma: {}", field(&me.platform));

    Ok(out)
}

pub fn report_failed_reply(error: &impl std::fmt::Display) -> String {
    format!("⚠️ Error fatal generando reporte: {error}")
}
