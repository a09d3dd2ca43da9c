//! Free-text quick entry
//!
//! Authenticated free text becomes a transaction; unauthenticated free
//! text starts the login wizard. A pending OCR confirmation, when
//! present, intercepts SIM/NÃO answers before normal parsing.

use anyhow::Result;
use serde_json::Value;
use std::collections::HashMap;
use tracing::warn;

use super::Dispatcher;
use crate::api::ApiError;
use crate::classifier::TransactionKind;
use crate::entry::{format_brl, parse_quick_entry};
use crate::session::{Session, SessionPatch};

/// Scene-data key holding a transaction awaiting SIM/NÃO confirmation.
pub(crate) const PENDING_OCR_KEY: &str = "pending_ocr";

const USAGE_HELP: &str = "💡 *Como usar o lançamento rápido:*\n\n\
📝 Formato: `[+/-] Descrição Valor`\n\n\
*Exemplos:*\n\
• `Almoço 35.00` (detecta despesa)\n\
• `Salário 5000` (detecta receita)\n\
• `+ Freelance 800` (força receita)\n\
• `- Uber 25.50` (força despesa)\n\n\
Use /ajuda para ver todos os comandos.";

/// Handle non-command, non-media text outside any scene.
pub async fn handle(
    d: &Dispatcher,
    sender: &str,
    text: &str,
    session: &Session,
) -> Result<()> {
    if !session.is_authenticated() {
        return d.start_login(sender).await;
    }
    let Some(token) = session.token.as_deref() else {
        return d.start_login(sender).await;
    };

    if let Some(pending) = session.scene_data.get(PENDING_OCR_KEY) {
        if handle_pending_confirmation(d, sender, token, text, pending).await? {
            return Ok(());
        }
        // Neither SIM nor NÃO: fall through to normal processing
    }

    let Some(entry) = parse_quick_entry(text) else {
        return d.channel.send_text(sender, USAGE_HELP).await;
    };

    match d
        .api
        .create_transaction(token, &entry.description, entry.amount, entry.kind)
        .await
    {
        Ok(()) => {
            let reply = format!(
                "{} *{} salva com sucesso!*\n\n\
                 📝 Descrição: {}\n\
                 💵 Valor: {}\n\
                 🔍 Tipo: {} ({})",
                entry.kind.icon(),
                entry.kind.label(),
                entry.description,
                format_brl(entry.amount),
                entry.kind.label(),
                entry.detection_method(),
            );
            d.channel.send_text(sender, &reply).await
        }
        Err(ApiError::Unauthorized) => d.expire_session(sender).await,
        Err(e) => {
            warn!(sender, "quick entry failed: {e}");
            d.channel
                .send_text(sender, &format!("❌ Erro ao salvar transação: {e}"))
                .await
        }
    }
}

/// Returns `true` when the input was consumed as a SIM/NÃO answer.
async fn handle_pending_confirmation(
    d: &Dispatcher,
    sender: &str,
    token: &str,
    text: &str,
    pending: &Value,
) -> Result<bool> {
    let answer = text.trim().to_lowercase();

    let clear_pending = SessionPatch {
        scene_data: HashMap::from([(PENDING_OCR_KEY.to_string(), Value::Null)]),
        ..SessionPatch::default()
    };

    match answer.as_str() {
        "sim" | "s" | "yes" => {
            let description = pending
                .get("description")
                .and_then(|v| v.as_str())
                .unwrap_or("Comprovante")
                .to_string();
            let amount = pending.get("amount").and_then(Value::as_f64).unwrap_or(0.0);
            let kind: TransactionKind = pending
                .get("type")
                .cloned()
                .and_then(|v| serde_json::from_value(v).ok())
                .unwrap_or(TransactionKind::Expense);

            match d
                .api
                .create_transaction(token, &description, amount, kind)
                .await
            {
                Ok(()) => {
                    d.sessions.set(sender, clear_pending).await?;
                    let reply = format!(
                        "{} *{} salva com sucesso!*\n\n\
                         📝 Descrição: {description}\n\
                         💵 Valor: {}\n\
                         🔍 Tipo: {} (OCR)",
                        kind.icon(),
                        kind.label(),
                        format_brl(amount),
                        kind.label(),
                    );
                    d.channel.send_text(sender, &reply).await?;
                }
                Err(ApiError::Unauthorized) => {
                    d.expire_session(sender).await?;
                }
                Err(e) => {
                    warn!(sender, "pending OCR save failed: {e}");
                    d.channel
                        .send_text(sender, "❌ Erro ao salvar transação. Tente novamente.")
                        .await?;
                }
            }
            Ok(true)
        }
        "não" | "nao" | "n" | "no" => {
            d.sessions.set(sender, clear_pending).await?;
            d.channel
                .send_text(
                    sender,
                    "❌ Transação cancelada.\n\n\
                     💡 Envie outra imagem ou digite manualmente:\n\
                     `Descrição Valor` (ex: \"Almoço 45\")",
                )
                .await?;
            Ok(true)
        }
        _ => Ok(false),
    }
}
