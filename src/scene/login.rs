//! Login scene: identifier check, then credential exchange.
//!
//! Successful authentication either ends the scene (returning user) or
//! chains straight into onboarding at the user's saved progress step.

use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;

use super::{SceneContext, SceneKind, SceneStep, StepOutcome};
use crate::api::ApiError;
use crate::session::{Session, SessionPatch, SessionUser, ONBOARDING_COMPLETE};

/// Ordered step table for the login scene.
pub static STEPS: &[&dyn SceneStep] = &[&IdentifierStep, &CredentialStep];

/// Step 0: ask for and verify the e-mail/phone identifier.
pub struct IdentifierStep;

/// Step 1: ask for the credential and authenticate.
pub struct CredentialStep;

#[async_trait]
impl SceneStep for IdentifierStep {
    fn prompt(&self, _session: &Session, _ctx: &SceneContext<'_>) -> String {
        "🤖 *Bem-vindo ao Fayol Bot!*\n\n\
         Seu assistente financeiro inteligente.\n\n\
         Para começar, vou precisar de algumas informações:\n\n\
         📧 *Passo 1/2:* Digite seu e-mail cadastrado:"
            .to_string()
    }

    fn validate(&self, input: &str, _session: &Session) -> Result<(), String> {
        if input.trim().is_empty() {
            return Err("⚠️ Por favor, envie um e-mail ou celular válido.".to_string());
        }
        Ok(())
    }

    async fn transition(
        &self,
        ctx: &SceneContext<'_>,
        _session: &Session,
        input: &str,
    ) -> StepOutcome {
        let identifier = input.trim();

        match ctx.api.check_identifier_exists(identifier).await {
            Ok(true) => StepOutcome::Advance {
                patch: SessionPatch {
                    scene_data: HashMap::from([(
                        "identifier".to_string(),
                        json!(identifier),
                    )]),
                    ..SessionPatch::default()
                },
                reply: Some("✅ Encontrado!".to_string()),
            },
            Ok(false) => StepOutcome::Stay {
                reply: format!(
                    "❌ Usuário \"{identifier}\" não encontrado no sistema.\n\n\
                     📝 Para criar uma conta, acesse:\n\
                     {}/auth/register\n\n\
                     Digite outro e-mail ou celular para tentar novamente.",
                    ctx.settings.web_app_url
                ),
            },
            Err(e) if e.is_offline() => StepOutcome::Stay {
                reply: "🔌 O servidor do Fayol parece estar offline.\n\n\
                        Tente novamente em alguns instantes."
                    .to_string(),
            },
            Err(_) => StepOutcome::Stay {
                reply: "⚠️ Erro técnico ao verificar usuário.\n\nTente novamente.".to_string(),
            },
        }
    }
}

#[async_trait]
impl SceneStep for CredentialStep {
    fn prompt(&self, _session: &Session, _ctx: &SceneContext<'_>) -> String {
        "🔐 *Passo 2/2:* Digite sua senha:".to_string()
    }

    fn validate(&self, input: &str, _session: &Session) -> Result<(), String> {
        if input.trim().is_empty() {
            return Err("⚠️ Por favor, digite sua senha.".to_string());
        }
        Ok(())
    }

    async fn transition(
        &self,
        ctx: &SceneContext<'_>,
        session: &Session,
        input: &str,
    ) -> StepOutcome {
        let Some(identifier) = session
            .scene_data
            .get("identifier")
            .and_then(|v| v.as_str())
        else {
            // Identifier lost (evicted session); restart the wizard
            return StepOutcome::Switch {
                scene: SceneKind::Login,
                step: 0,
                patch: SessionPatch::default(),
                reply: "❌ Sessão inválida. Vamos recomeçar.".to_string(),
            };
        };

        match ctx.api.authenticate(identifier, input.trim()).await {
            Ok(auth) => {
                let name = auth.user.name.clone();
                let onboarding_step = auth.user.onboarding_step;
                let patch = SessionPatch {
                    token: Some(auth.token),
                    user: Some(SessionUser {
                        name: name.clone(),
                        onboarding_step,
                    }),
                    ..SessionPatch::default()
                };

                match onboarding_step {
                    Some(step) if step < ONBOARDING_COMPLETE => StepOutcome::Switch {
                        scene: SceneKind::Onboarding,
                        step,
                        patch,
                        reply: format!(
                            "🎉 *Bem-vindo, {name}!*\n\n\
                             Antes de começar, vamos configurar sua conta..."
                        ),
                    },
                    _ => StepOutcome::Complete {
                        patch,
                        reply: format!(
                            "🎉 *Olá de volta, {name}!*\n\n\
                             Estou pronto! Digite \"Almoço 20.00\" para lançar uma despesa.\n\n\
                             Use /ajuda para ver todos os comandos disponíveis."
                        ),
                    },
                }
            }
            Err(ApiError::InvalidCredentials | ApiError::Unauthorized) => StepOutcome::Stay {
                reply: "🚫 E-mail/celular ou senha incorretos.\n\nTente novamente.".to_string(),
            },
            Err(e) if e.is_offline() => StepOutcome::Stay {
                reply: "🔌 Servidor offline. Tente novamente em alguns instantes.".to_string(),
            },
            Err(_) => StepOutcome::Stay {
                reply: "⚠️ Erro ao fazer login. Tente novamente.".to_string(),
            },
        }
    }
}
