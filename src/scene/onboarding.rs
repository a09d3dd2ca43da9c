//! Onboarding scene: display name, first account, opening balance and
//! investor profile.
//!
//! The balance step performs the single `create_account` call; the
//! session's step counter is what lets a user resume mid-scene after
//! logging in again.

use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;

use super::{SceneContext, SceneStep, StepOutcome};
use crate::api::{ApiError, NewAccount, OnboardingPatch};
use crate::session::{Session, SessionPatch, SessionUser, ONBOARDING_COMPLETE};

/// Ordered step table for the onboarding scene.
pub static STEPS: &[&dyn SceneStep] = &[&NameStep, &AccountNameStep, &BalanceStep, &ProfileStep];

/// Step 0: ask for the user's display name.
pub struct NameStep;

/// Step 1: ask for the first account's name.
pub struct AccountNameStep;

/// Step 2: ask for the opening balance and create the account.
pub struct BalanceStep;

/// Step 3: ask for the investor profile and finish onboarding.
pub struct ProfileStep;

const SESSION_EXPIRED: &str = "❌ Sessão expirada. Digite /start para fazer login novamente.";

fn token_of(session: &Session) -> Option<&str> {
    session.token.as_deref().filter(|t| !t.is_empty())
}

#[async_trait]
impl SceneStep for NameStep {
    fn prompt(&self, _session: &Session, _ctx: &SceneContext<'_>) -> String {
        "🚀 *Bem-vindo ao Fayol!*\n\n\
         Vamos configurar seu perfil para começar.\n\n\
         Primeiro, como você gostaria de ser chamado?"
            .to_string()
    }

    fn validate(&self, input: &str, _session: &Session) -> Result<(), String> {
        if input.trim().chars().count() < 2 {
            return Err("⚠️ Por favor, digite um nome válido (mínimo 2 letras).".to_string());
        }
        Ok(())
    }

    async fn transition(
        &self,
        ctx: &SceneContext<'_>,
        session: &Session,
        input: &str,
    ) -> StepOutcome {
        let name = input.trim().to_string();
        let Some(token) = token_of(session) else {
            return StepOutcome::Abort {
                reply: "❌ Sessão inválida. Digite /start para recomeçar.".to_string(),
            };
        };

        let patch = OnboardingPatch {
            step: 2,
            name: Some(name.clone()),
            ..OnboardingPatch::default()
        };
        match ctx.api.update_onboarding(token, patch).await {
            Ok(()) => StepOutcome::Advance {
                patch: SessionPatch {
                    user: Some(SessionUser {
                        name: name.clone(),
                        onboarding_step: Some(2),
                    }),
                    ..SessionPatch::default()
                },
                reply: Some(format!("Prazer, {name}! 👋")),
            },
            Err(ApiError::Unauthorized) => StepOutcome::Abort {
                reply: SESSION_EXPIRED.to_string(),
            },
            Err(_) => StepOutcome::Stay {
                reply: "❌ Erro ao salvar nome. Tente novamente.".to_string(),
            },
        }
    }
}

#[async_trait]
impl SceneStep for AccountNameStep {
    fn prompt(&self, _session: &Session, _ctx: &SceneContext<'_>) -> String {
        "Agora vamos criar sua *Conta Principal*.\n\n\
         Qual nome você quer dar para ela?\n\n\
         *Exemplos:* Nubank, Carteira, Itaú, Conta Corrente"
            .to_string()
    }

    fn validate(&self, input: &str, _session: &Session) -> Result<(), String> {
        if input.trim().is_empty() {
            return Err("⚠️ Por favor, digite o nome da conta.".to_string());
        }
        Ok(())
    }

    async fn transition(
        &self,
        _ctx: &SceneContext<'_>,
        _session: &Session,
        input: &str,
    ) -> StepOutcome {
        StepOutcome::Advance {
            patch: SessionPatch {
                scene_data: HashMap::from([(
                    "account_name".to_string(),
                    json!(input.trim()),
                )]),
                ..SessionPatch::default()
            },
            reply: None,
        }
    }
}

#[async_trait]
impl SceneStep for BalanceStep {
    fn prompt(&self, session: &Session, _ctx: &SceneContext<'_>) -> String {
        let account_name = session
            .scene_data
            .get("account_name")
            .and_then(|v| v.as_str())
            .unwrap_or("sua conta");
        format!(
            "Certo, conta \"{account_name}\".\n\n\
             Qual o *saldo atual* dela?\n\n\
             *Exemplos:* 1500.00 ou 0"
        )
    }

    fn validate(&self, input: &str, _session: &Session) -> Result<(), String> {
        let parsed: Result<f64, _> = input.trim().replace(',', ".").parse();
        match parsed {
            Ok(value) if !value.is_nan() => Ok(()),
            _ => Err(
                "⚠️ Por favor, digite um valor numérico válido.\n\n*Exemplos:* 0 ou 1250.50"
                    .to_string(),
            ),
        }
    }

    async fn transition(
        &self,
        ctx: &SceneContext<'_>,
        session: &Session,
        input: &str,
    ) -> StepOutcome {
        // Validated above
        let balance: f64 = match input.trim().replace(',', ".").parse() {
            Ok(value) => value,
            Err(_) => {
                return StepOutcome::Stay {
                    reply: "⚠️ Por favor, digite um valor numérico válido.\n\n\
                            *Exemplos:* 0 ou 1250.50"
                        .to_string(),
                }
            }
        };

        let Some(token) = token_of(session) else {
            return StepOutcome::Abort {
                reply: "❌ Sessão inválida. Digite /start para recomeçar.".to_string(),
            };
        };
        let Some(account_name) = session
            .scene_data
            .get("account_name")
            .and_then(|v| v.as_str())
        else {
            return StepOutcome::Abort {
                reply: "❌ Sessão inválida. Digite /start para recomeçar.".to_string(),
            };
        };

        let account = NewAccount {
            name: account_name.to_string(),
            kind: "CHECKING".to_string(),
            balance,
        };
        match ctx.api.create_account(token, account).await {
            Ok(()) => StepOutcome::Advance {
                patch: SessionPatch {
                    user: session.user.clone().map(|u| SessionUser {
                        onboarding_step: Some(3),
                        ..u
                    }),
                    ..SessionPatch::default()
                },
                reply: None,
            },
            Err(ApiError::Unauthorized) => StepOutcome::Abort {
                reply: SESSION_EXPIRED.to_string(),
            },
            Err(_) => StepOutcome::Stay {
                reply: "❌ Erro ao criar conta. Vamos tentar o saldo novamente.\n\n\
                        Digite o saldo da conta:"
                    .to_string(),
            },
        }
    }
}

fn profile_for_choice(choice: &str) -> Option<(&'static str, &'static str)> {
    match choice {
        "1" => Some(("CONSERVATIVE", "Conservador 🛡️")),
        "2" => Some(("MODERATE", "Moderado ⚖️")),
        "3" => Some(("AGGRESSIVE", "Agressivo 🚀")),
        _ => None,
    }
}

#[async_trait]
impl SceneStep for ProfileStep {
    fn prompt(&self, _session: &Session, _ctx: &SceneContext<'_>) -> String {
        "✅ Conta criada!\n\n\
         Por fim, qual seu *Perfil de Investidor*?\n\n\
         1️⃣ Conservador 🛡️\n\
         2️⃣ Moderado ⚖️\n\
         3️⃣ Agressivo 🚀\n\n\
         Digite *1*, *2* ou *3*:"
            .to_string()
    }

    fn validate(&self, input: &str, _session: &Session) -> Result<(), String> {
        if profile_for_choice(input.trim()).is_none() {
            return Err("⚠️ Opção inválida. Por favor, digite *1*, *2* ou *3*.".to_string());
        }
        Ok(())
    }

    async fn transition(
        &self,
        ctx: &SceneContext<'_>,
        session: &Session,
        input: &str,
    ) -> StepOutcome {
        let Some((profile, profile_name)) = profile_for_choice(input.trim()) else {
            return StepOutcome::Stay {
                reply: "⚠️ Opção inválida. Por favor, digite *1*, *2* ou *3*.".to_string(),
            };
        };
        let Some(token) = token_of(session) else {
            return StepOutcome::Abort {
                reply: "❌ Sessão inválida. Digite /start para recomeçar.".to_string(),
            };
        };

        let patch = OnboardingPatch {
            step: ONBOARDING_COMPLETE,
            investor_profile: Some(profile.to_string()),
            ..OnboardingPatch::default()
        };
        match ctx.api.update_onboarding(token, patch).await {
            Ok(()) => StepOutcome::Complete {
                patch: SessionPatch {
                    user: session.user.clone().map(|u| SessionUser {
                        onboarding_step: Some(ONBOARDING_COMPLETE),
                        ..u
                    }),
                    ..SessionPatch::default()
                },
                reply: format!(
                    "🎉 *Tudo Pronto!*\n\n\
                     Perfil selecionado: *{profile_name}*\n\n\
                     Seu perfil foi configurado com sucesso. Agora você pode começar a \
                     controlar suas finanças.\n\n\
                     💡 *Dica:* Envie \"Almoço 25.00\" para registrar sua primeira despesa.\n\n\
                     Use /ajuda para ver todos os comandos disponíveis."
                ),
            },
            Err(ApiError::Unauthorized) => StepOutcome::Abort {
                reply: SESSION_EXPIRED.to_string(),
            },
            Err(_) => StepOutcome::Stay {
                reply: "❌ Erro ao salvar perfil. Tente selecionar novamente (1, 2 ou 3)."
                    .to_string(),
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::api::MockApiClient;
    use crate::scene::SceneContext;
    use crate::config::Settings;

    fn authed_session() -> Session {
        Session {
            token: Some("tok".into()),
            user: Some(SessionUser {
                name: "Ana".into(),
                onboarding_step: Some(0),
            }),
            ..Session::default()
        }
    }

    #[test]
    fn test_name_validation_rejects_short_names() {
        assert!(NameStep.validate("A", &Session::default()).is_err());
        assert!(NameStep.validate("  ", &Session::default()).is_err());
        assert!(NameStep.validate("Ana", &Session::default()).is_ok());
    }

    #[test]
    fn test_balance_validation() {
        let session = Session::default();
        assert!(BalanceStep.validate("1250.50", &session).is_ok());
        assert!(BalanceStep.validate("1250,50", &session).is_ok());
        assert!(BalanceStep.validate("0", &session).is_ok());
        assert!(BalanceStep.validate("abc", &session).is_err());
        assert!(BalanceStep.validate("", &session).is_err());
    }

    #[test]
    fn test_profile_validation() {
        let session = Session::default();
        assert!(ProfileStep.validate("1", &session).is_ok());
        assert!(ProfileStep.validate(" 3 ", &session).is_ok());
        assert!(ProfileStep.validate("4", &session).is_err());
        assert!(ProfileStep.validate("conservador", &session).is_err());
    }

    #[tokio::test]
    async fn test_name_step_without_token_aborts() {
        let api = MockApiClient::new();
        let settings: Settings = serde_json::from_str("{}").unwrap();
        let ctx = SceneContext {
            sender: "u1",
            api: &api,
            settings: &settings,
        };

        let outcome = NameStep.transition(&ctx, &Session::default(), "Ana").await;
        assert!(matches!(outcome, StepOutcome::Abort { .. }));
    }

    #[tokio::test]
    async fn test_profile_step_completes_scene() {
        let mut api = MockApiClient::new();
        api.expect_update_onboarding().returning(|_, _| Ok(()));
        let settings: Settings = serde_json::from_str("{}").unwrap();
        let ctx = SceneContext {
            sender: "u1",
            api: &api,
            settings: &settings,
        };

        let outcome = ProfileStep.transition(&ctx, &authed_session(), "2").await;
        match outcome {
            StepOutcome::Complete { reply, .. } => assert!(reply.contains("Moderado")),
            _ => panic!("expected completion"),
        }
    }
}
