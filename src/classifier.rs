//! Keyword-based transaction type detection
//!
//! A deterministic, case-insensitive heuristic: transfer keywords are
//! checked first (most specific), then income, then expense; anything
//! unmatched defaults to a low-confidence expense. Matching is
//! substring-based, and accented/unaccented spellings are distinct
//! entries rather than being normalized away.

use serde::{Deserialize, Serialize};

/// Kind of financial entry detected in free text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionKind {
    /// Money coming in (salary, sale, refund, ...)
    Income,
    /// Money going out (meals, transport, bills, ...)
    Expense,
    /// Movement between the user's own accounts
    Transfer,
}

impl TransactionKind {
    /// Emoji used in confirmation replies.
    #[must_use]
    pub const fn icon(self) -> &'static str {
        match self {
            Self::Income => "💰",
            Self::Expense => "💸",
            Self::Transfer => "🔄",
        }
    }

    /// Human-readable (pt-BR) label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Income => "Receita",
            Self::Expense => "Despesa",
            Self::Transfer => "Transferência",
        }
    }
}

/// Qualitative certainty attached to a classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    /// A keyword matched
    High,
    /// Reserved for future scoring refinements
    Medium,
    /// Nothing matched; the default kind was assumed
    Low,
}

/// Result of classifying a free-text description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    /// Detected transaction kind
    pub kind: TransactionKind,
    /// Certainty tier
    pub confidence: Confidence,
    /// The keyword that decided the kind, if any
    pub matched_keyword: Option<&'static str>,
}

/// Keywords indicating a transfer between accounts. Checked first.
const TRANSFER_KEYWORDS: &[&str] = &[
    "transferência",
    "transferencia",
    "transferir",
    "transferi",
    "enviar para",
    "enviei para",
    "mover para",
];

/// Keywords indicating income.
const INCOME_KEYWORDS: &[&str] = &[
    // Salaries and payments
    "salário",
    "salario",
    "pagamento",
    "salario recebido",
    "recebido",
    "recebimento",
    "recebi",
    "ganho",
    "renda",
    "honorários",
    "honorarios",
    // Sales and business
    "venda",
    "vendido",
    "vendeu",
    "lucro",
    "comissão",
    "comissao",
    "freelance",
    "freela",
    "projeto",
    "bônus",
    "bonus",
    "prêmio",
    "premio",
    // Investments
    "dividendo",
    "dividendos",
    "rendimento",
    "juros",
    "resgate",
    "investimento recebido",
    "retorno",
    // Refunds
    "reembolso",
    "devolução",
    "devolucao",
    "estorno",
    "cashback",
    // Other
    "presente recebido",
    "doação recebida",
    "doacao recebida",
    "pix recebido",
    "transferência recebida",
    "transferencia recebida",
    "depósito",
    "deposito",
    "entrada",
    "crédito",
    "credito",
];

/// Keywords indicating an expense.
const EXPENSE_KEYWORDS: &[&str] = &[
    // Food
    "almoço",
    "almoco",
    "jantar",
    "café",
    "cafe",
    "lanche",
    "comida",
    "restaurante",
    "ifood",
    "uber eats",
    "delivery",
    "pizza",
    "hamburguer",
    "mercado",
    "supermercado",
    "feira",
    "padaria",
    "açougue",
    "acougue",
    // Transport
    "uber",
    "taxi",
    "99",
    "gasolina",
    "combustível",
    "combustivel",
    "estacionamento",
    "pedágio",
    "pedagio",
    "ônibus",
    "onibus",
    "metrô",
    "metro",
    "transporte",
    "passagem",
    // Housing
    "aluguel",
    "condomínio",
    "condominio",
    "luz",
    "água",
    "agua",
    "internet",
    "gás",
    "gas",
    "iptu",
    "energia",
    "telefone",
    // Shopping
    "compra",
    "comprei",
    "loja",
    "shopping",
    "roupa",
    "calçado",
    "calcado",
    "eletrônico",
    "eletronico",
    "amazon",
    "mercado livre",
    // Health
    "farmácia",
    "farmacia",
    "remédio",
    "remedio",
    "médico",
    "medico",
    "consulta",
    "exame",
    "plano de saúde",
    "plano de saude",
    // Entertainment
    "cinema",
    "netflix",
    "spotify",
    "show",
    "balada",
    "bar",
    "academia",
    "livro",
    "game",
    "jogo",
    // Services
    "conta",
    "boleto",
    "fatura",
    "cartão",
    "cartao",
    "mensalidade",
    "assinatura",
    "serviço",
    "servico",
    "manutenção",
    "manutencao",
    // Other
    "pago",
    "paguei",
    "gasto",
    "despesa",
    "débito",
    "debito",
    "saída",
    "saida",
    "pagamento de",
    "pix enviado",
];

/// Classify a description into income/expense/transfer.
///
/// First substring match wins, in the priority order transfer → income →
/// expense. Unmatched text is assumed to be an expense with low
/// confidence.
#[must_use]
pub fn classify(text: &str) -> Classification {
    let lowered = text.trim().to_lowercase();

    for &keyword in TRANSFER_KEYWORDS {
        if lowered.contains(keyword) {
            return Classification {
                kind: TransactionKind::Transfer,
                confidence: Confidence::High,
                matched_keyword: Some(keyword),
            };
        }
    }

    for &keyword in INCOME_KEYWORDS {
        if lowered.contains(keyword) {
            return Classification {
                kind: TransactionKind::Income,
                confidence: Confidence::High,
                matched_keyword: Some(keyword),
            };
        }
    }

    for &keyword in EXPENSE_KEYWORDS {
        if lowered.contains(keyword) {
            return Classification {
                kind: TransactionKind::Expense,
                confidence: Confidence::High,
                matched_keyword: Some(keyword),
            };
        }
    }

    Classification {
        kind: TransactionKind::Expense,
        confidence: Confidence::Low,
        matched_keyword: None,
    }
}

/// Detect an explicit `+`/`-` prefix forcing the kind.
///
/// Returns `None` when no prefix is present. A prefix, when present,
/// takes precedence over keyword classification entirely.
#[must_use]
pub fn prefix_override(text: &str) -> Option<TransactionKind> {
    let trimmed = text.trim();
    if trimmed.starts_with('+') {
        Some(TransactionKind::Income)
    } else if trimmed.starts_with('-') {
        Some(TransactionKind::Expense)
    } else {
        None
    }
}

/// Remove a leading `+`/`-` prefix (and surrounding whitespace).
#[must_use]
pub fn strip_prefix(text: &str) -> &str {
    let trimmed = text.trim();
    if let Some(rest) = trimmed.strip_prefix('+').or_else(|| trimmed.strip_prefix('-')) {
        rest.trim()
    } else {
        trimmed
    }
}
