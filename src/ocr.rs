//! Receipt OCR collaborator
//!
//! The engine posts image bytes to an external OCR service and runs
//! pure heuristics over the returned text to pick out a monetary amount
//! and a plausible establishment line.

// Allow non_std_lazy_statics because lazy_regex! uses once_cell internally
#![allow(clippy::non_std_lazy_statics)]

use async_trait::async_trait;
use lazy_regex::lazy_regex;
use serde::Deserialize;
use thiserror::Error;

use crate::config::Settings;

/// Match "R$ 35,50" / "R$ 35.50"
static RE_CURRENCY: lazy_regex::Lazy<regex::Regex> = lazy_regex!(r"(?i)R\$\s*(\d+[.,]\d{2})");
/// Match "Total: R$ 35,50"
static RE_TOTAL: lazy_regex::Lazy<regex::Regex> =
    lazy_regex!(r"(?i)total[:\s]*R?\$?\s*(\d+[.,]\d{2})");
/// Match "Valor: 35,50"
static RE_VALOR: lazy_regex::Lazy<regex::Regex> =
    lazy_regex!(r"(?i)valor[:\s]*R?\$?\s*(\d+[.,]\d{2})");
/// Match a bare decimal amount, optionally followed by "reais"
static RE_BARE_AMOUNT: lazy_regex::Lazy<regex::Regex> =
    lazy_regex!(r"(?i)(\d+[.,]\d{2})\s*(?:reais)?");

/// Lines containing one of these are treated as the establishment name.
const ESTABLISHMENT_KEYWORDS: &[&str] = &[
    "restaurante",
    "supermercado",
    "farmácia",
    "farmacia",
    "posto",
    "loja",
    "mercado",
    "padaria",
];

/// Errors from the OCR collaborator.
#[derive(Error, Debug)]
pub enum OcrError {
    /// The OCR service endpoint is not configured
    #[error("OCR service not configured")]
    NotConfigured,
    /// HTTP failure talking to the OCR service
    #[error("OCR request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Result of running OCR over a receipt image.
#[derive(Debug, Clone)]
pub struct OcrOutcome {
    /// Full extracted text
    pub text: String,
    /// Recognition confidence, 0-100
    pub confidence: f64,
    /// Monetary amount picked out of the text, if any
    pub detected_amount: Option<f64>,
    /// Establishment or first significant line, if any
    pub detected_description: Option<String>,
}

/// Interface to an OCR engine.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Extract text and transaction hints from an image.
    async fn extract_text(&self, image: &[u8]) -> Result<OcrOutcome, OcrError>;
}

/// OCR engine backed by an external HTTP recognition service.
pub struct HttpOcrEngine {
    http: reqwest::Client,
    endpoint: Option<String>,
}

#[derive(Deserialize)]
struct OcrResponse {
    text: String,
    confidence: f64,
}

impl HttpOcrEngine {
    /// Build from settings; an absent endpoint yields a client that
    /// always reports `NotConfigured`.
    ///
    /// # Errors
    ///
    /// Fails if the underlying HTTP client cannot be constructed.
    pub fn new(settings: &Settings) -> Result<Self, OcrError> {
        let http = reqwest::Client::builder()
            .timeout(settings.api_timeout())
            .build()?;
        Ok(Self {
            http,
            endpoint: settings.ocr_endpoint.clone(),
        })
    }
}

#[async_trait]
impl OcrEngine for HttpOcrEngine {
    async fn extract_text(&self, image: &[u8]) -> Result<OcrOutcome, OcrError> {
        let endpoint = self.endpoint.as_ref().ok_or(OcrError::NotConfigured)?;

        let part = reqwest::multipart::Part::bytes(image.to_vec()).file_name("receipt.jpg");
        let form = reqwest::multipart::Form::new()
            .part("image", part)
            .text("lang", "por");

        let response: OcrResponse = self
            .http
            .post(endpoint)
            .multipart(form)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(OcrOutcome {
            detected_amount: extract_amount(&response.text),
            detected_description: extract_description(&response.text),
            text: response.text,
            confidence: response.confidence,
        })
    }
}

/// Pick a monetary amount out of OCR text.
///
/// Labelled lines ("Total", "Valor") win over a bare "R$" match, which
/// wins over any bare decimal number.
#[must_use]
pub fn extract_amount(text: &str) -> Option<f64> {
    for re in [&*RE_TOTAL, &*RE_VALOR, &*RE_CURRENCY, &*RE_BARE_AMOUNT] {
        if let Some(captures) = re.captures(text) {
            if let Some(m) = captures.get(1) {
                if let Ok(value) = m.as_str().replace(',', ".").parse::<f64>() {
                    if value > 0.0 {
                        return Some(value);
                    }
                }
            }
        }
    }
    None
}

/// Pick a plausible description line out of OCR text.
///
/// Prefers a line mentioning a known establishment type; otherwise the
/// first line longer than three characters that is not purely numeric.
#[must_use]
pub fn extract_description(text: &str) -> Option<String> {
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    for line in &lines {
        let lowered = line.to_lowercase();
        if ESTABLISHMENT_KEYWORDS.iter().any(|k| lowered.contains(k)) {
            return Some((*line).to_string());
        }
    }

    lines
        .iter()
        .find(|l| l.len() > 3 && !l.chars().all(|c| c.is_ascii_digit()))
        .map(|l| (*l).to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_labelled_total_first() {
        let text = "Itens: 12,00\nTotal: R$ 35,50";
        assert_eq!(extract_amount(text), Some(35.5));
    }

    #[test]
    fn test_extracts_currency_amount() {
        assert_eq!(extract_amount("R$ 89.90 pago no débito"), Some(89.9));
    }

    #[test]
    fn test_extracts_bare_decimal() {
        assert_eq!(extract_amount("pago 45,00 reais"), Some(45.0));
    }

    #[test]
    fn test_no_amount_found() {
        assert_eq!(extract_amount("cupom fiscal sem valores"), None);
    }

    #[test]
    fn test_description_prefers_establishment_line() {
        let text = "CNPJ 12.345\nSupermercado Bom Preço\nTotal 50,00";
        assert_eq!(
            extract_description(text),
            Some("Supermercado Bom Preço".to_string())
        );
    }

    #[test]
    fn test_description_falls_back_to_first_significant_line() {
        let text = "123\nPizzaria do Zé\n45,00";
        assert_eq!(extract_description(text), Some("Pizzaria do Zé".to_string()));
    }

    #[test]
    fn test_description_none_for_numeric_only() {
        assert_eq!(extract_description("123\n456"), None);
    }
}
