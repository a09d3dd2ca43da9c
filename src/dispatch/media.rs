//! Media handler
//!
//! Images go through OCR and end in a SIM/NÃO confirmation; voice notes
//! are transcribed and persisted immediately; videos and documents get
//! informational replies.

use anyhow::Result;
use serde_json::json;
use std::collections::HashMap;
use tracing::warn;

use super::quick_entry::PENDING_OCR_KEY;
use super::{Dispatcher, LOGIN_REQUIRED};
use crate::api::ApiError;
use crate::classifier;
use crate::entry::{format_brl, parse_quick_entry};
use crate::session::{Session, SessionPatch};
use crate::stt::SttError;
use crate::transport::{IncomingMessage, MediaKind};

/// Handle a message carrying media.
pub async fn handle(d: &Dispatcher, msg: &IncomingMessage, session: &Session) -> Result<()> {
    if !session.is_authenticated() {
        return d.channel.send_text(&msg.sender, LOGIN_REQUIRED).await;
    }
    let Some(media) = &msg.media else {
        return Ok(());
    };
    let Some(token) = session.token.as_deref() else {
        return d.channel.send_text(&msg.sender, LOGIN_REQUIRED).await;
    };

    match media.kind {
        MediaKind::Image => handle_image(d, msg, &media.data).await,
        MediaKind::Audio => handle_audio(d, &msg.sender, token, &media.data).await,
        MediaKind::Video => {
            d.channel
                .send_text(
                    &msg.sender,
                    "🎥 Vídeos não são suportados no momento.\n\n\
                     Use o lançamento rápido para registrar transações:\n\
                     `Descrição Valor` (ex: \"Pizza 65\")",
                )
                .await
        }
        MediaKind::Document => {
            let filename = media.filename.as_deref().unwrap_or("documento");
            d.channel
                .send_text(
                    &msg.sender,
                    &format!(
                        "📄 *Documento recebido:* {filename}\n\n\
                         🚧 A análise de documentos será ativada em breve.\n\n\
                         💡 *Próximas funcionalidades:*\n\
                         • Importação de extratos bancários (PDF/OFX)\n\
                         • Leitura de faturas de cartão\n\
                         • Análise de planilhas Excel\n\n\
                         Por enquanto, use /excel para exportar suas transações."
                    ),
                )
                .await
        }
    }
}

async fn handle_image(d: &Dispatcher, msg: &IncomingMessage, image: &[u8]) -> Result<()> {
    let sender = &msg.sender;
    d.channel
        .send_text(sender, "📸 *Imagem recebida!*\n\n🔍 Processando com OCR...")
        .await?;

    let outcome = match d.ocr.extract_text(image).await {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!(sender, "OCR failed: {e}");
            return d
                .channel
                .send_text(
                    sender,
                    &format!(
                        "❌ Erro ao processar imagem: {e}\n\n\
                         💡 *Dica:* Digite manualmente:\n\
                         `Descrição Valor` (ex: \"Mercado 150.50\")"
                    ),
                )
                .await;
        }
    };

    let Some(amount) = outcome.detected_amount else {
        let excerpt: String = outcome.text.chars().take(500).collect();
        return d
            .channel
            .send_text(
                sender,
                &format!(
                    "📄 *Texto extraído ({:.0}% confiança):*\n\n\
                     {excerpt}\n\n\
                     ❌ Não consegui detectar um valor monetário.\n\n\
                     💡 *Dica:* Digite manualmente no formato:\n\
                     `Descrição Valor` (ex: \"Almoço 45\")",
                    outcome.confidence
                ),
            )
            .await;
    };

    let description = outcome
        .detected_description
        .or_else(|| (!msg.text.is_empty()).then(|| msg.text.clone()))
        .unwrap_or_else(|| "Comprovante".to_string());
    let classification = classifier::classify(&description);

    d.channel
        .send_text(
            sender,
            &format!(
                "✅ *Dados extraídos ({:.0}% confiança):*\n\n\
                 📝 Descrição: {description}\n\
                 💵 Valor: {}\n\
                 🔍 Tipo detectado: {}\n\n\
                 📨 Deseja salvar esta transação?\n\
                 Digite *SIM* para confirmar ou *NÃO* para cancelar.",
                outcome.confidence,
                format_brl(amount),
                classification.kind.label(),
            ),
        )
        .await?;

    // Stash the detected transaction for the SIM/NÃO answer
    d.sessions
        .set(
            sender,
            SessionPatch {
                scene_data: HashMap::from([(
                    PENDING_OCR_KEY.to_string(),
                    json!({
                        "description": description,
                        "amount": amount,
                        "type": classification.kind,
                    }),
                )]),
                ..SessionPatch::default()
            },
        )
        .await?;
    Ok(())
}

async fn handle_audio(d: &Dispatcher, sender: &str, token: &str, audio: &[u8]) -> Result<()> {
    if !d.stt.is_configured() {
        return d
            .channel
            .send_text(
                sender,
                "🎤 *Áudio recebido!*\n\n\
                 ⚠️ Serviço de transcrição não configurado.\n\n\
                 💡 *Para ativar:*\n\
                 Configure OPENAI_API_KEY no ambiente.\n\n\
                 Por enquanto, digite suas transações:\n\
                 `Descrição Valor` (ex: \"Uber 28.50\")",
            )
            .await;
    }

    let validation = d.stt.validate_audio(audio);
    if !validation.valid {
        let reason = validation.error.unwrap_or_else(|| "Áudio inválido.".to_string());
        return d
            .channel
            .send_text(
                sender,
                &format!("❌ {reason}\n\nEnvie um áudio mais curto ou digite manualmente."),
            )
            .await;
    }

    d.channel
        .send_text(sender, "🎤 *Áudio recebido!*\n\n🔊 Transcrevendo...")
        .await?;

    let transcript = match d.stt.transcribe(audio).await {
        Ok(text) => text,
        Err(SttError::EmptyTranscript) => {
            return d
                .channel
                .send_text(
                    sender,
                    "❌ Não consegui entender o áudio.\n\n\
                     💡 Tente falar mais claramente ou digite manualmente:\n\
                     `Descrição Valor` (ex: \"Mercado 235.90\")",
                )
                .await;
        }
        Err(e) => {
            warn!(sender, "transcription failed: {e}");
            return d
                .channel
                .send_text(
                    sender,
                    &format!(
                        "❌ Erro ao transcrever áudio: {e}\n\n\
                         💡 *Dica:* Digite manualmente:\n\
                         `Descrição Valor` (ex: \"Cinema 40\")"
                    ),
                )
                .await;
        }
    };

    d.channel
        .send_text(
            sender,
            &format!("📝 *Transcrição:*\n\"{transcript}\"\n\n🔍 Processando..."),
        )
        .await?;

    let Some(entry) = parse_quick_entry(&transcript) else {
        return d
            .channel
            .send_text(
                sender,
                "❌ Não consegui detectar um valor numérico.\n\n\
                 💡 Exemplo de comando por áudio:\n\
                 \"Almoço trinta e cinco reais\"\n\
                 \"Uber vinte e oito e cinquenta\"\n\n\
                 Ou digite manualmente: `Descrição Valor`",
            )
            .await;
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
                 🔍 Tipo: {} ({})\n\
                 🎤 Via: Áudio (Whisper API)",
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
            warn!(sender, "voice entry failed: {e}");
            d.channel
                .send_text(sender, &format!("❌ Erro ao salvar transação: {e}"))
                .await
        }
    }
}
