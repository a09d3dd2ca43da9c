//! Free-text quick-entry parsing and pt-BR currency formatting.
//!
//! This module uses the `lazy-regex` crate so the amount pattern is
//! validated at compile time and initialized on first use.

// Allow non_std_lazy_statics because lazy_regex! uses once_cell internally
#![allow(clippy::non_std_lazy_statics)]

use lazy_regex::lazy_regex;

use crate::classifier::{self, Confidence, TransactionKind};

/// Match a monetary amount with optional comma/dot decimals: 150, 25.50, 25,50
static RE_AMOUNT: lazy_regex::Lazy<regex::Regex> = lazy_regex!(r"(\d+(?:[.,]\d{1,2})?)");

/// Fallback description when the message is just a number.
const DEFAULT_DESCRIPTION: &str = "Lançamento Rápido";

/// A parsed quick-entry transaction, ready to persist.
#[derive(Debug, Clone, PartialEq)]
pub struct QuickEntry {
    /// Monetary amount, always positive
    pub amount: f64,
    /// Description extracted from the text
    pub description: String,
    /// Detected transaction kind
    pub kind: TransactionKind,
    /// Whether an explicit `+`/`-` prefix decided the kind
    pub via_prefix: bool,
    /// Keyword that decided the kind, when the classifier matched one
    pub matched_keyword: Option<&'static str>,
}

impl QuickEntry {
    /// Portuguese description of how the kind was detected, for the
    /// confirmation reply.
    #[must_use]
    pub fn detection_method(&self) -> String {
        if self.via_prefix {
            "manual (prefixo)".to_string()
        } else if let Some(keyword) = self.matched_keyword {
            format!("automática (palavra-chave: \"{keyword}\")")
        } else {
            "padrão (sem palavra-chave encontrada)".to_string()
        }
    }
}

/// Parse a free-text message into a quick-entry transaction.
///
/// Returns `None` when no amount is present (the caller replies with a
/// usage hint). The kind is resolved by an explicit `+`/`-` prefix when
/// present, otherwise by keyword classification of the text.
#[must_use]
pub fn parse_quick_entry(text: &str) -> Option<QuickEntry> {
    let prefix = classifier::prefix_override(text);
    let body = classifier::strip_prefix(text);

    let captures = RE_AMOUNT.captures(body)?;
    let matched = captures.get(1)?;
    let amount: f64 = matched.as_str().replace(',', ".").parse().ok()?;
    if amount <= 0.0 {
        return None;
    }

    let description = {
        let mut remainder = String::with_capacity(body.len());
        remainder.push_str(&body[..matched.start()]);
        remainder.push_str(&body[matched.end()..]);
        let cleaned = remainder.split_whitespace().collect::<Vec<_>>().join(" ");
        if cleaned.is_empty() {
            DEFAULT_DESCRIPTION.to_string()
        } else {
            cleaned
        }
    };

    let (kind, via_prefix, matched_keyword) = match prefix {
        Some(kind) => (kind, true, None),
        None => {
            let classification = classifier::classify(body);
            (
                classification.kind,
                false,
                classification.matched_keyword,
            )
        }
    };

    Some(QuickEntry {
        amount,
        description,
        kind,
        via_prefix,
        matched_keyword,
    })
}

/// Confidence of the classification behind a parsed entry.
#[must_use]
pub fn entry_confidence(entry: &QuickEntry) -> Confidence {
    if entry.via_prefix || entry.matched_keyword.is_some() {
        Confidence::High
    } else {
        Confidence::Low
    }
}

/// Format a value as Brazilian currency: 1234.5 -> "R$ 1.234,50".
#[must_use]
pub fn format_brl(value: f64) -> String {
    let negative = value < 0.0;
    let cents = (value.abs() * 100.0).round() as u64;
    let whole = cents / 100;
    let fraction = cents % 100;

    let digits = whole.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i).is_multiple_of(3) {
            grouped.push('.');
        }
        grouped.push(c);
    }

    let sign = if negative { "-" } else { "" };
    format!("{sign}R$ {grouped},{fraction:02}")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_amount_and_description() {
        let entry = parse_quick_entry("Almoço 35").unwrap();
        assert!((entry.amount - 35.0).abs() < f64::EPSILON);
        assert_eq!(entry.description, "Almoço");
        assert_eq!(entry.kind, TransactionKind::Expense);
        assert!(!entry.via_prefix);
        assert_eq!(entry.matched_keyword, Some("almoço"));
    }

    #[test]
    fn test_comma_decimal() {
        let entry = parse_quick_entry("Uber 25,50").unwrap();
        assert!((entry.amount - 25.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_prefix_forces_kind() {
        let entry = parse_quick_entry("+ Freelance 800").unwrap();
        assert_eq!(entry.kind, TransactionKind::Income);
        assert!(entry.via_prefix);
        assert_eq!(entry.detection_method(), "manual (prefixo)");
    }

    #[test]
    fn test_bare_number_gets_default_description() {
        let entry = parse_quick_entry("120").unwrap();
        assert_eq!(entry.description, "Lançamento Rápido");
    }

    #[test]
    fn test_no_amount_returns_none() {
        assert!(parse_quick_entry("apenas texto sem valor").is_none());
        assert!(parse_quick_entry("").is_none());
    }

    #[test]
    fn test_detection_method_keyword() {
        let entry = parse_quick_entry("Salário 5000").unwrap();
        assert_eq!(
            entry.detection_method(),
            "automática (palavra-chave: \"salário\")"
        );
        assert_eq!(entry_confidence(&entry), Confidence::High);
    }

    #[test]
    fn test_detection_method_default() {
        let entry = parse_quick_entry("Xyz 100").unwrap();
        assert_eq!(
            entry.detection_method(),
            "padrão (sem palavra-chave encontrada)"
        );
        assert_eq!(entry_confidence(&entry), Confidence::Low);
    }

    #[test]
    fn test_format_brl() {
        assert_eq!(format_brl(1234.56), "R$ 1.234,56");
        assert_eq!(format_brl(0.5), "R$ 0,50");
        assert_eq!(format_brl(1_000_000.0), "R$ 1.000.000,00");
        assert_eq!(format_brl(-42.1), "-R$ 42,10");
    }
}
