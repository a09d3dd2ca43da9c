use dotenvy::dotenv;
use fayol_bot::api::HttpApiClient;
use fayol_bot::config::{SessionBackend, Settings, TransportKind};
use fayol_bot::dispatch::Dispatcher;
use fayol_bot::ocr::HttpOcrEngine;
use fayol_bot::session::{DurableSessionStore, MemorySessionStore, SessionStore};
use fayol_bot::stt::{SpeechToText, WhisperTranscriber};
use fayol_bot::transport::telegram::{self, TelegramChannel};
use regex::Regex;
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;
use teloxide::Bot;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::{prelude::*, EnvFilter};

/// Patterns that must never reach the log output.
struct RedactionPatterns {
    telegram_token: Regex,
    r2_secret: Regex,
}

impl RedactionPatterns {
    fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            telegram_token: Regex::new(r"[0-9]{8,10}:[A-Za-z0-9_-]{35}")?,
            r2_secret: Regex::new(r"R2_SECRET_ACCESS_KEY=[^\s&]+")?,
        })
    }

    fn redact(&self, input: &str) -> String {
        let output = self
            .telegram_token
            .replace_all(input, "[TELEGRAM_TOKEN]")
            .into_owned();
        self.r2_secret
            .replace_all(&output, "R2_SECRET_ACCESS_KEY=[MASKED]")
            .into_owned()
    }
}

struct RedactingWriter {
    patterns: Arc<RedactionPatterns>,
}

impl Write for RedactingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let s = String::from_utf8_lossy(buf);
        io::stderr().write_all(self.patterns.redact(&s).as_bytes())?;
        // Report the original length even when redaction changed it
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()
    }
}

struct RedactingMakeWriter {
    patterns: Arc<RedactionPatterns>,
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for RedactingMakeWriter {
    type Writer = RedactingWriter;

    fn make_writer(&'a self) -> Self::Writer {
        RedactingWriter {
            patterns: self.patterns.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    let patterns = Arc::new(RedactionPatterns::new().map_err(|e| {
        eprintln!("Failed to compile redaction patterns: {e}");
        e
    })?);
    init_logging(patterns);

    info!("Starting Fayol bot...");

    let settings = init_settings();

    let api = Arc::new(HttpApiClient::new(&settings)?);
    let ocr = Arc::new(HttpOcrEngine::new(&settings)?);
    let stt = Arc::new(WhisperTranscriber::new(&settings)?);
    if stt.is_configured() {
        info!("Voice transcription enabled (model: {})", settings.stt_model);
    } else {
        warn!("OPENAI_API_KEY not set, voice transcription disabled");
    }

    let sessions = init_sessions(&settings).await;

    match settings.transport {
        TransportKind::Telegram => info!("Transport: Telegram (long polling)"),
    }
    let Some(token) = settings.telegram_token.clone().filter(|t| !t.is_empty()) else {
        error!("TELEGRAM_TOKEN is required for the telegram transport");
        std::process::exit(1);
    };
    let bot = Bot::new(token);
    let channel = Arc::new(TelegramChannel::new(bot.clone()));

    let (tx, rx) = mpsc::unbounded_channel();
    let dispatcher = Arc::new(Dispatcher::new(
        Arc::clone(&settings),
        channel,
        sessions,
        api,
        ocr,
        stt,
    ));

    // Hourly sweep keeps the rate-limiter map from accumulating idle senders
    let limiter = dispatcher.limiter().clone();
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_secs(60 * 60));
        tick.tick().await;
        loop {
            tick.tick().await;
            limiter.sweep().await;
            let stats = limiter.stats().await;
            info!(
                tracked = stats.tracked,
                blocked = stats.blocked,
                "rate limiter swept"
            );
        }
    });

    tokio::spawn(Arc::clone(&dispatcher).run(rx));

    info!("Bot is running...");
    telegram::run_updates(bot, tx).await;

    Ok(())
}

fn init_logging(patterns: Arc<RedactionPatterns>) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(RedactingMakeWriter { patterns }))
        .init();
}

fn init_settings() -> Arc<Settings> {
    match Settings::new() {
        Ok(s) => {
            info!("Configuration loaded successfully.");
            Arc::new(s)
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    }
}

async fn init_sessions(settings: &Settings) -> Arc<dyn SessionStore> {
    match settings.session_backend {
        SessionBackend::Memory => {
            info!("Session store: in-memory (ttl: {:?})", settings.session_ttl());
            Arc::new(MemorySessionStore::new(settings.session_ttl()))
        }
        SessionBackend::Durable => match DurableSessionStore::new(settings).await {
            Ok(store) => {
                match store.health_check().await {
                    Ok(()) => info!("Session store: durable bucket reachable"),
                    Err(e) => error!("Durable session bucket check failed: {e}"),
                }
                Arc::new(store)
            }
            Err(e) => {
                error!("Failed to initialize durable session store: {}", e);
                std::process::exit(1);
            }
        },
    }
}
