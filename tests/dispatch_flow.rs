//! End-to-end routing tests: login wizard, quick entry, rate limiting
//! and group handling, wired through the real dispatcher with fake
//! collaborators.

#![allow(clippy::unwrap_used)]

use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use fayol_bot::api::{
    ApiClient, ApiError, AuthSuccess, AuthUser, CategoryExpense, DashboardSummary, Insight,
    NewAccount, OnboardingPatch, PeriodSummary, ReportFormat, TransactionEntry,
};
use fayol_bot::classifier::TransactionKind;
use fayol_bot::config::Settings;
use fayol_bot::dispatch::Dispatcher;
use fayol_bot::ocr::{OcrEngine, OcrError, OcrOutcome};
use fayol_bot::session::{MemorySessionStore, SessionPatch, SessionStore, SessionUser};
use fayol_bot::stt::{AudioValidation, SpeechToText, SttError};
use fayol_bot::transport::{
    BotIdentity, ChannelProvider, IncomingMedia, IncomingMessage, MediaKind, OutgoingMedia,
};

#[derive(Default)]
struct RecordingChannel {
    sent: Mutex<Vec<(String, String)>>,
    media: Mutex<Vec<(String, OutgoingMedia)>>,
}

impl RecordingChannel {
    fn texts_for(&self, recipient: &str) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(r, _)| r == recipient)
            .map(|(_, t)| t.clone())
            .collect()
    }

    fn last_text(&self) -> String {
        self.sent
            .lock()
            .unwrap()
            .last()
            .map(|(_, t)| t.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ChannelProvider for RecordingChannel {
    async fn send_text(&self, recipient: &str, text: &str) -> anyhow::Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((recipient.to_string(), text.to_string()));
        Ok(())
    }

    async fn send_media(&self, recipient: &str, media: OutgoingMedia) -> anyhow::Result<()> {
        self.media
            .lock()
            .unwrap()
            .push((recipient.to_string(), media));
        Ok(())
    }

    async fn bot_identity(&self) -> anyhow::Result<BotIdentity> {
        Ok(BotIdentity {
            id: "42".to_string(),
            name: "fayol_bot".to_string(),
        })
    }

    async fn probe_contact_exists(&self, _id: &str) -> anyhow::Result<bool> {
        Ok(true)
    }

    async fn disconnect(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

struct FakeApi {
    onboarding_step: Option<u32>,
    transactions: Mutex<Vec<(String, f64, TransactionKind)>>,
}

impl FakeApi {
    fn returning_user() -> Self {
        Self {
            onboarding_step: Some(5),
            transactions: Mutex::new(Vec::new()),
        }
    }

    fn mid_onboarding(step: u32) -> Self {
        Self {
            onboarding_step: Some(step),
            transactions: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ApiClient for FakeApi {
    async fn check_identifier_exists(&self, _identifier: &str) -> Result<bool, ApiError> {
        Ok(true)
    }

    async fn authenticate(
        &self,
        _identifier: &str,
        _credential: &str,
    ) -> Result<AuthSuccess, ApiError> {
        Ok(AuthSuccess {
            token: "tok-1".to_string(),
            user: AuthUser {
                id: "u1".to_string(),
                name: "João".to_string(),
                onboarding_step: self.onboarding_step,
            },
        })
    }

    async fn update_onboarding(
        &self,
        _token: &str,
        _patch: OnboardingPatch,
    ) -> Result<(), ApiError> {
        Ok(())
    }

    async fn create_account(&self, _token: &str, _account: NewAccount) -> Result<(), ApiError> {
        Ok(())
    }

    async fn create_transaction(
        &self,
        _token: &str,
        description: &str,
        amount: f64,
        kind: TransactionKind,
    ) -> Result<(), ApiError> {
        self.transactions
            .lock()
            .unwrap()
            .push((description.to_string(), amount, kind));
        Ok(())
    }

    async fn dashboard_summary(&self, _token: &str) -> Result<DashboardSummary, ApiError> {
        Ok(DashboardSummary {
            total_balance: 1500.0,
            period: PeriodSummary {
                income: 5000.0,
                expense: 3500.0,
                result: 1500.0,
            },
        })
    }

    async fn recent_transactions(
        &self,
        _token: &str,
        _limit: usize,
    ) -> Result<Vec<TransactionEntry>, ApiError> {
        Ok(Vec::new())
    }

    async fn expenses_by_category(&self, _token: &str) -> Result<Vec<CategoryExpense>, ApiError> {
        Ok(Vec::new())
    }

    async fn insights(&self, _token: &str) -> Result<Vec<Insight>, ApiError> {
        Ok(Vec::new())
    }

    async fn download_report(
        &self,
        _token: &str,
        _format: ReportFormat,
    ) -> Result<Vec<u8>, ApiError> {
        Ok(vec![0x25, 0x50, 0x44, 0x46])
    }
}

struct StubOcr;

#[async_trait]
impl OcrEngine for StubOcr {
    async fn extract_text(&self, _image: &[u8]) -> Result<OcrOutcome, OcrError> {
        Err(OcrError::NotConfigured)
    }
}

/// OCR fake that always reads the same supermarket receipt.
struct ReceiptOcr;

#[async_trait]
impl OcrEngine for ReceiptOcr {
    async fn extract_text(&self, _image: &[u8]) -> Result<OcrOutcome, OcrError> {
        Ok(OcrOutcome {
            text: "Supermercado Bom Preço\nTotal: R$ 87,50".to_string(),
            confidence: 93.0,
            detected_amount: Some(87.5),
            detected_description: Some("Supermercado Bom Preço".to_string()),
        })
    }
}

struct StubStt;

#[async_trait]
impl SpeechToText for StubStt {
    fn is_configured(&self) -> bool {
        false
    }

    fn validate_audio(&self, _audio: &[u8]) -> AudioValidation {
        AudioValidation {
            valid: true,
            error: None,
        }
    }

    async fn transcribe(&self, _audio: &[u8]) -> Result<String, SttError> {
        Err(SttError::NotConfigured)
    }
}

struct Harness {
    dispatcher: Dispatcher,
    channel: Arc<RecordingChannel>,
    api: Arc<FakeApi>,
    sessions: Arc<MemorySessionStore>,
}

fn harness_full(
    api: FakeApi,
    ocr: Arc<dyn OcrEngine>,
    tune: impl FnOnce(&mut Settings),
) -> Harness {
    let mut settings: Settings =
        serde_json::from_str("{}").expect("defaults must deserialize");
    tune(&mut settings);

    let channel = Arc::new(RecordingChannel::default());
    let api = Arc::new(api);
    let sessions = Arc::new(MemorySessionStore::new(settings.session_ttl()));
    let dispatcher = Dispatcher::new(
        Arc::new(settings),
        Arc::clone(&channel) as Arc<dyn ChannelProvider>,
        Arc::clone(&sessions) as Arc<dyn SessionStore>,
        Arc::clone(&api) as Arc<dyn ApiClient>,
        ocr,
        Arc::new(StubStt),
    );

    Harness {
        dispatcher,
        channel,
        api,
        sessions,
    }
}

fn harness_with(api: FakeApi, tune: impl FnOnce(&mut Settings)) -> Harness {
    harness_full(api, Arc::new(StubOcr), tune)
}

fn harness(api: FakeApi) -> Harness {
    harness_with(api, |_| {})
}

fn text_msg(sender: &str, text: &str) -> IncomingMessage {
    IncomingMessage {
        sender: sender.to_string(),
        text: text.to_string(),
        media: None,
        is_group: false,
        group_name: None,
    }
}

fn image_msg(sender: &str) -> IncomingMessage {
    IncomingMessage {
        sender: sender.to_string(),
        text: String::new(),
        media: Some(IncomingMedia {
            kind: MediaKind::Image,
            data: vec![0xFF, 0xD8],
            filename: None,
        }),
        is_group: false,
        group_name: None,
    }
}

fn group_msg(sender: &str, text: &str) -> IncomingMessage {
    IncomingMessage {
        sender: sender.to_string(),
        text: text.to_string(),
        media: None,
        is_group: true,
        group_name: Some("Família".to_string()),
    }
}

async fn seed_authenticated(h: &Harness, sender: &str) {
    h.sessions
        .set(
            sender,
            SessionPatch {
                token: Some("tok-1".to_string()),
                user: Some(SessionUser {
                    name: "João".to_string(),
                    onboarding_step: Some(5),
                }),
                ..SessionPatch::default()
            },
        )
        .await
        .expect("seed session");
}

#[tokio::test]
async fn test_full_login_then_quick_entry() {
    let h = harness(FakeApi::returning_user());

    h.dispatcher.route(&text_msg("1", "/start")).await.unwrap();
    assert!(h.channel.last_text().contains("Bem-vindo ao Fayol Bot"));

    h.dispatcher
        .route(&text_msg("1", "joao@example.com"))
        .await
        .unwrap();
    let texts = h.channel.texts_for("1");
    assert!(texts.iter().any(|t| t.contains("✅ Encontrado!")));
    assert!(texts.iter().any(|t| t.contains("Passo 2/2")));

    h.dispatcher
        .route(&text_msg("1", "senha123"))
        .await
        .unwrap();
    assert!(h.channel.last_text().contains("Olá de volta, João"));

    let session = h.sessions.get("1").await.unwrap();
    assert!(session.is_authenticated());
    assert!(session.scene.is_none());

    // Free text now lands as a quick entry
    h.dispatcher
        .route(&text_msg("1", "Almoço 35"))
        .await
        .unwrap();
    let saved = h.api.transactions.lock().unwrap().clone();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].1, 35.0);
    assert_eq!(saved[0].2, TransactionKind::Expense);
    assert!(h.channel.last_text().contains("salva com sucesso"));
}

#[tokio::test]
async fn test_login_chains_into_onboarding_at_saved_step() {
    let h = harness(FakeApi::mid_onboarding(2));

    h.dispatcher.route(&text_msg("7", "/start")).await.unwrap();
    h.dispatcher
        .route(&text_msg("7", "ana@example.com"))
        .await
        .unwrap();
    h.dispatcher.route(&text_msg("7", "senha")).await.unwrap();

    let texts = h.channel.texts_for("7");
    assert!(texts.iter().any(|t| t.contains("Bem-vindo, João")));
    // Resumed at the balance step, not from the beginning
    assert!(texts.iter().any(|t| t.contains("saldo atual")));

    let session = h.sessions.get("7").await.unwrap();
    assert_eq!(session.scene_step, 2);
}

#[tokio::test]
async fn test_unauthenticated_free_text_starts_login() {
    let h = harness(FakeApi::returning_user());

    h.dispatcher
        .route(&text_msg("3", "Almoço 35"))
        .await
        .unwrap();

    assert!(h.channel.last_text().contains("Bem-vindo ao Fayol Bot"));
    assert!(h.api.transactions.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_commands_require_login() {
    let h = harness(FakeApi::returning_user());

    h.dispatcher.route(&text_msg("4", "/saldo")).await.unwrap();

    assert!(h
        .channel
        .last_text()
        .contains("Você precisa fazer login primeiro"));
}

#[tokio::test]
async fn test_saldo_renders_summary() {
    let h = harness(FakeApi::returning_user());
    seed_authenticated(&h, "5").await;

    h.dispatcher.route(&text_msg("5", "/saldo")).await.unwrap();

    let reply = h.channel.last_text();
    assert!(reply.contains("R$ 1.500,00"));
    assert!(reply.contains("R$ 5.000,00"));
}

#[tokio::test]
async fn test_rate_limit_flood_gets_cooldown_reply() {
    let h = harness_with(FakeApi::returning_user(), |s| {
        s.rate_limit_per_minute = 2;
    });
    seed_authenticated(&h, "6").await;

    h.dispatcher.route(&text_msg("6", "/ajuda")).await.unwrap();
    h.dispatcher.route(&text_msg("6", "/ajuda")).await.unwrap();
    h.dispatcher.route(&text_msg("6", "/ajuda")).await.unwrap();

    assert!(h.channel.last_text().contains("Calma aí"));
}

#[tokio::test]
async fn test_group_messages_dropped_when_support_disabled() {
    let h = harness(FakeApi::returning_user());

    h.dispatcher
        .route(&group_msg("8", "fayol quanto gastei?"))
        .await
        .unwrap();

    assert!(h.channel.texts_for("8").is_empty());
}

#[tokio::test]
async fn test_group_financial_command_redirected_to_private() {
    let h = harness_with(FakeApi::returning_user(), |s| {
        s.group_support = true;
    });

    h.dispatcher.route(&group_msg("9", "/saldo")).await.unwrap();

    assert!(h.channel.last_text().contains("Uso em Grupo Limitado"));
}

#[tokio::test]
async fn test_scene_captures_free_text_before_quick_entry() {
    let h = harness(FakeApi::returning_user());

    h.dispatcher.route(&text_msg("10", "/start")).await.unwrap();
    // Inside the login scene: amounts are identifiers, not transactions
    h.dispatcher
        .route(&text_msg("10", "Almoço 35"))
        .await
        .unwrap();

    assert!(h.api.transactions.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_relatorio_sends_document() {
    let h = harness(FakeApi::returning_user());
    seed_authenticated(&h, "11").await;

    h.dispatcher
        .route(&text_msg("11", "/relatorio"))
        .await
        .unwrap();

    let media = h.channel.media.lock().unwrap();
    assert_eq!(media.len(), 1);
    let filename = media[0].1.filename.clone().unwrap_or_default();
    assert!(filename.starts_with("Relatorio_Fayol_"));
    assert!(filename.ends_with(".pdf"));
}

#[tokio::test]
async fn test_receipt_image_confirmed_with_sim_saves_and_clears_pending() {
    let h = harness_full(FakeApi::returning_user(), Arc::new(ReceiptOcr), |_| {});
    seed_authenticated(&h, "20").await;

    h.dispatcher.route(&image_msg("20")).await.unwrap();
    let reply = h.channel.last_text();
    assert!(reply.contains("Dados extraídos"));
    assert!(reply.contains("R$ 87,50"));
    assert!(reply.contains("Digite *SIM*"));
    assert!(h
        .sessions
        .get("20")
        .await
        .unwrap()
        .scene_data
        .contains_key("pending_ocr"));

    h.dispatcher.route(&text_msg("20", "SIM")).await.unwrap();

    let saved = h.api.transactions.lock().unwrap().clone();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].0, "Supermercado Bom Preço");
    assert_eq!(saved[0].1, 87.5);
    assert_eq!(saved[0].2, TransactionKind::Expense);
    assert!(h.channel.last_text().contains("salva com sucesso"));
    assert!(!h
        .sessions
        .get("20")
        .await
        .unwrap()
        .scene_data
        .contains_key("pending_ocr"));
}

#[tokio::test]
async fn test_receipt_image_declined_with_nao_cancels_and_clears_pending() {
    let h = harness_full(FakeApi::returning_user(), Arc::new(ReceiptOcr), |_| {});
    seed_authenticated(&h, "21").await;

    h.dispatcher.route(&image_msg("21")).await.unwrap();
    h.dispatcher.route(&text_msg("21", "não")).await.unwrap();

    assert!(h.channel.last_text().contains("Transação cancelada"));
    assert!(h.api.transactions.lock().unwrap().is_empty());
    assert!(!h
        .sessions
        .get("21")
        .await
        .unwrap()
        .scene_data
        .contains_key("pending_ocr"));
}

#[tokio::test]
async fn test_other_text_falls_through_and_keeps_pending_receipt() {
    let h = harness_full(FakeApi::returning_user(), Arc::new(ReceiptOcr), |_| {});
    seed_authenticated(&h, "22").await;

    h.dispatcher.route(&image_msg("22")).await.unwrap();
    // Not an answer: processed as a normal quick entry
    h.dispatcher.route(&text_msg("22", "Uber 25")).await.unwrap();

    let saved = h.api.transactions.lock().unwrap().clone();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].0, "Uber");
    assert_eq!(saved[0].1, 25.0);

    // The receipt still awaits its SIM/NÃO answer
    assert!(h
        .sessions
        .get("22")
        .await
        .unwrap()
        .scene_data
        .contains_key("pending_ocr"));

    h.dispatcher.route(&text_msg("22", "sim")).await.unwrap();
    let saved = h.api.transactions.lock().unwrap().clone();
    assert_eq!(saved.len(), 2);
    assert_eq!(saved[1].1, 87.5);
}
