//! Slash-command handler
//!
//! `/start` is the only command that works unauthenticated; everything
//! else requires a session token and maps a rejected token to a session
//! clear plus a re-login prompt.

use anyhow::Result;
use chrono::Utc;
use tracing::warn;

use super::{Dispatcher, LOGIN_REQUIRED};
use crate::api::{ApiError, ReportFormat};
use crate::classifier::TransactionKind;
use crate::entry::format_brl;
use crate::session::Session;
use crate::transport::{MediaKind, OutgoingMedia};

/// Handle a message starting with `/`.
pub async fn handle(
    d: &Dispatcher,
    sender: &str,
    text: &str,
    session: &Session,
) -> Result<()> {
    let command = text
        .to_lowercase()
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_string();

    if command == "/start" {
        return handle_start(d, sender, session).await;
    }

    let Some(token) = session.token.as_deref().filter(|t| !t.is_empty()) else {
        return d.channel.send_text(sender, LOGIN_REQUIRED).await;
    };

    match command.as_str() {
        "/help" | "/ajuda" => d.channel.send_text(sender, HELP_TEXT).await,
        "/saldo" => handle_balance(d, sender, token).await,
        "/extrato" => handle_statement(d, sender, token).await,
        "/categorias" | "/gastos" => handle_categories(d, sender, token).await,
        "/insights" => handle_insights(d, sender, token).await,
        "/relatorio" => handle_report(d, sender, token).await,
        "/excel" => handle_excel(d, sender, token).await,
        "/receita" => d.channel.send_text(sender, INCOME_PROMPT).await,
        "/despesa" => d.channel.send_text(sender, EXPENSE_PROMPT).await,
        "/exemplos" => d.channel.send_text(sender, EXAMPLES_TEXT).await,
        "/dicas" => d.channel.send_text(sender, TIPS_TEXT).await,
        "/logout" => {
            d.sessions.clear(sender).await?;
            d.channel
                .send_text(sender, "👋 Desconectado. Digite /start para entrar novamente.")
                .await
        }
        _ => {
            d.channel
                .send_text(
                    sender,
                    "❓ Comando não reconhecido.\n\n\
                     Digite /ajuda para ver todos os comandos disponíveis.",
                )
                .await
        }
    }
}

async fn handle_start(d: &Dispatcher, sender: &str, session: &Session) -> Result<()> {
    if session.is_authenticated() {
        let name = session
            .user
            .as_ref()
            .map_or("Investidor", |u| u.name.as_str());
        let menu = format!(
            "Olá de volta, {name}! 👋\n\n\
             *Painel Principal:*\n\
             💰 /saldo - Resumo financeiro\n\
             📄 /extrato - Últimas transações\n\
             📊 /categorias - Gastos por categoria\n\
             💡 /insights - Dicas da IA\n\n\
             ✨ *Novo! Detecção Inteligente:*\n\
             Digite descrição + valor e o bot detecta automaticamente se é receita ou despesa!\n\n\
             *Exemplos:*\n\
             • \"Salário 5000\" → 💰 Receita\n\
             • \"Almoço 45\" → 💸 Despesa\n\
             • \"+ Freelance 800\" → 💰 Receita (forçado)\n\n\
             Digite /ajuda para ver todos os comandos."
        );
        return d.channel.send_text(sender, &menu).await;
    }
    d.start_login(sender).await
}

async fn handle_balance(d: &Dispatcher, sender: &str, token: &str) -> Result<()> {
    match d.api.dashboard_summary(token).await {
        Ok(summary) => {
            let result_icon = if summary.period.result >= 0.0 {
                "🟢"
            } else {
                "🔴"
            };
            let reply = format!(
                "💰 *Saldo Atual:* {}\n\n\
                 📅 *Resumo do Mês:*\n\
                 📈 Receitas: {}\n\
                 💸 Despesas: {}\n\
                 ───────────────\n\
                 {result_icon} Resultado: {}",
                format_brl(summary.total_balance),
                format_brl(summary.period.income),
                format_brl(summary.period.expense),
                format_brl(summary.period.result),
            );
            d.channel.send_text(sender, &reply).await
        }
        Err(ApiError::Unauthorized) => d.expire_session(sender).await,
        Err(e) => {
            warn!(sender, "balance lookup failed: {e}");
            d.channel
                .send_text(sender, "❌ Erro ao buscar saldo. Tente novamente mais tarde.")
                .await
        }
    }
}

async fn handle_statement(d: &Dispatcher, sender: &str, token: &str) -> Result<()> {
    match d.api.recent_transactions(token, 5).await {
        Ok(transactions) if transactions.is_empty() => {
            d.channel.send_text(sender, "Sem transações recentes.").await
        }
        Ok(transactions) => {
            let mut reply = String::from("📄 *Últimas 5 Transações*\n\n");
            for t in &transactions {
                let icon = if t.kind == TransactionKind::Income {
                    "💰"
                } else {
                    "💸"
                };
                let date = t.date.format("%d/%m");
                reply.push_str(&format!(
                    "{icon} *{}*\n   {}  •  {date}\n\n",
                    t.description,
                    format_brl(t.amount),
                ));
            }
            d.channel.send_text(sender, &reply).await
        }
        Err(ApiError::Unauthorized) => d.expire_session(sender).await,
        Err(e) => {
            warn!(sender, "statement lookup failed: {e}");
            d.channel.send_text(sender, "❌ Erro ao buscar extrato.").await
        }
    }
}

async fn handle_categories(d: &Dispatcher, sender: &str, token: &str) -> Result<()> {
    match d.api.expenses_by_category(token).await {
        Ok(categories) if categories.is_empty() => {
            d.channel
                .send_text(sender, "Nenhum gasto categorizado neste mês.")
                .await
        }
        Ok(categories) => {
            let total: f64 = categories.iter().map(|c| c.amount).sum();
            let mut reply = String::from("📊 *Gastos por Categoria (Top 5)*\n\n");
            for cat in categories.iter().take(5) {
                let percent = if total > 0.0 {
                    (cat.amount / total * 100.0).round()
                } else {
                    0.0
                };
                let bar = "█".repeat(((percent / 10.0).ceil() as usize).max(1));
                let icon = cat.icon.as_deref().unwrap_or("🏷️");
                reply.push_str(&format!(
                    "{icon} *{}* ({percent:.0}%)\n{bar} {}\n\n",
                    cat.name,
                    format_brl(cat.amount),
                ));
            }
            d.channel.send_text(sender, &reply).await
        }
        Err(ApiError::Unauthorized) => d.expire_session(sender).await,
        Err(e) => {
            warn!(sender, "category lookup failed: {e}");
            d.channel
                .send_text(sender, "❌ Erro ao buscar categorias.")
                .await
        }
    }
}

async fn handle_insights(d: &Dispatcher, sender: &str, token: &str) -> Result<()> {
    match d.api.insights(token).await {
        Ok(insights) if insights.is_empty() => {
            d.channel
                .send_text(
                    sender,
                    "🤖 A IA ainda está analisando seus dados. Volte mais tarde!",
                )
                .await
        }
        Ok(insights) => {
            let mut reply = String::from("💡 *Insights da IA Fayol*\n\n");
            for insight in &insights {
                let icon = match insight.kind.as_str() {
                    "warning" => "⚠️",
                    "success" => "✅",
                    _ => "ℹ️",
                };
                reply.push_str(&format!("{icon} {}\n\n", insight.text));
            }
            d.channel.send_text(sender, &reply).await
        }
        Err(ApiError::Unauthorized) => d.expire_session(sender).await,
        Err(e) => {
            warn!(sender, "insights lookup failed: {e}");
            d.channel.send_text(sender, "❌ Erro ao gerar insights.").await
        }
    }
}

async fn handle_report(d: &Dispatcher, sender: &str, token: &str) -> Result<()> {
    d.channel
        .send_text(
            sender,
            "📄 Gerando seu relatório mensal em PDF. Aguarde um momento...",
        )
        .await?;

    match d.api.download_report(token, ReportFormat::Pdf).await {
        Ok(data) => {
            let filename = format!("Relatorio_Fayol_{}.pdf", Utc::now().format("%Y-%m-%d"));
            d.channel
                .send_media(
                    sender,
                    OutgoingMedia {
                        kind: MediaKind::Document,
                        data,
                        caption: Some(
                            "📄 Aqui está o seu relatório mensal consolidado.".to_string(),
                        ),
                        filename: Some(filename),
                    },
                )
                .await
        }
        Err(ApiError::Unauthorized) => d.expire_session(sender).await,
        Err(e) => {
            warn!(sender, "report download failed: {e}");
            d.channel
                .send_text(
                    sender,
                    "❌ Ocorreu um erro ao gerar o relatório. Tente novamente mais tarde.",
                )
                .await
        }
    }
}

async fn handle_excel(d: &Dispatcher, sender: &str, token: &str) -> Result<()> {
    d.channel
        .send_text(sender, "📊 Gerando planilha de transações...")
        .await?;

    match d.api.download_report(token, ReportFormat::Excel).await {
        Ok(data) => {
            let filename = format!("Extrato_Fayol_{}.xlsx", Utc::now().format("%Y-%m-%d"));
            d.channel
                .send_media(
                    sender,
                    OutgoingMedia {
                        kind: MediaKind::Document,
                        data,
                        caption: None,
                        filename: Some(filename),
                    },
                )
                .await
        }
        Err(ApiError::Unauthorized) => d.expire_session(sender).await,
        Err(e) => {
            warn!(sender, "spreadsheet download failed: {e}");
            d.channel.send_text(sender, "❌ Erro ao gerar planilha.").await
        }
    }
}

const HELP_TEXT: &str = "🤖 *Central de Ajuda - Fayol Bot*\n\n\
Olá! Sou seu assistente financeiro inteligente. Veja como posso te ajudar:\n\n\
━━━━━━━━━━━━━━━━━━━━━━\n\n\
💰 *CONSULTAR SUAS FINANÇAS*\n\
/saldo - Ver saldo e resumo mensal\n\
/extrato - Últimas 5 movimentações\n\
/categorias - Seus gastos organizados\n\
/insights - Análise inteligente com IA\n\n\
📝 *REGISTRAR TRANSAÇÕES*\n\
/receita - Adicionar uma receita\n\
/despesa - Adicionar uma despesa\n\n\
✨ *LANÇAMENTO RÁPIDO*\n\
Simplesmente digite a descrição e valor:\n\
• \"Salário 5000\" (detecta receita)\n\
• \"Almoço 35\" (detecta despesa)\n\
• \"+ Venda 500\" (força receita)\n\
• \"- Uber 28\" (força despesa)\n\n\
📄 *RELATÓRIOS*\n\
/relatorio - Baixar PDF do mês\n\
/excel - Exportar planilha Excel\n\n\
❓ *MAIS AJUDA*\n\
/exemplos - Ver mais exemplos práticos\n\
/dicas - Dicas para usar melhor o bot\n\n\
⚙️ *CONFIGURAÇÕES*\n\
/logout - Sair da sua conta\n\n\
━━━━━━━━━━━━━━━━━━━━━━\n\n\
💡 *Dica:* O bot detecta automaticamente se é receita ou despesa baseado nas palavras que você usa!";

const INCOME_PROMPT: &str = "💰 *Adicionar Receita*\n\n\
Digite a descrição e o valor da receita:\n\n\
*Exemplos:*\n\
• `Salário 5000`\n\
• `Freelance 1500`\n\
• `Venda 350.50`";

const EXPENSE_PROMPT: &str = "💸 *Adicionar Despesa*\n\n\
Digite a descrição e o valor da despesa:\n\n\
*Exemplos:*\n\
• `Almoço 45`\n\
• `Uber 28.50`\n\
• `Mercado 235.90`";

const EXAMPLES_TEXT: &str = "📚 *Exemplos Práticos de Uso*\n\n\
━━━━━━━━━━━━━━━━━━━━━━\n\n\
💰 *RECEITAS (detectadas automaticamente):*\n\n\
✅ \"Salário 5000\"\n\
✅ \"Freelance projeto web 1500\"\n\
✅ \"Venda notebook 2800\"\n\
✅ \"Pagamento cliente 950\"\n\
✅ \"Bônus empresa 800\"\n\
✅ \"Dividendos ações 250.50\"\n\
✅ \"Reembolso despesas 180\"\n\
✅ \"Prêmio loteria 500\"\n\n\
💸 *DESPESAS (detectadas automaticamente):*\n\n\
✅ \"Almoço restaurante 45\"\n\
✅ \"Uber para casa 28.50\"\n\
✅ \"Mercado supermercado 235.90\"\n\
✅ \"Gasolina 180\"\n\
✅ \"Netflix 39.90\"\n\
✅ \"Conta de luz 150\"\n\
✅ \"Farmácia remédios 85.50\"\n\
✅ \"Cinema 40\"\n\
✅ \"Pizza delivery 65\"\n\
✅ \"Academia mensalidade 99\"\n\n\
✨ *USANDO PREFIXOS (forçar tipo):*\n\n\
➕ \"+ Presente recebido 200\" (força receita)\n\
➕ \"+ Estorno cartão 89.90\" (força receita)\n\
➖ \"- Compra online 450\" (força despesa)\n\
➖ \"- Pagamento boleto 320\" (força despesa)\n\n\
━━━━━━━━━━━━━━━━━━━━━━\n\n\
💡 *Lembre-se:* Você pode usar vírgula ou ponto para decimais:\n\
• \"Almoço 35,50\" ✅\n\
• \"Almoço 35.50\" ✅";

const TIPS_TEXT: &str = "💡 *Dicas para Usar Melhor o Fayol Bot*\n\n\
━━━━━━━━━━━━━━━━━━━━━━\n\n\
🎯 *DICA 1: Seja Específico na Descrição*\n\
Quanto mais detalhada a descrição, melhor!\n\
❌ \"Compra 150\"\n\
✅ \"Mercado supermercado 150\"\n\n\
🎯 *DICA 2: Use Palavras-chave Conhecidas*\n\
O bot reconhece mais de 90 palavras!\n\
• Receitas: salário, freelance, venda, bônus\n\
• Despesas: almoço, uber, mercado, conta\n\n\
🎯 *DICA 3: Prefixos para Casos Ambíguos*\n\
Se o bot errar, use + ou - para corrigir:\n\
\"+ Estorno 50\" (força receita)\n\
\"- Pagamento 100\" (força despesa)\n\n\
🎯 *DICA 4: Consulte Regularmente*\n\
Use /saldo diariamente para acompanhar\n\
Use /categorias para ver onde está gastando\n\
Use /insights para dicas da IA\n\n\
🎯 *DICA 5: Exporte Seus Dados*\n\
Use /relatorio para PDF completo\n\
Use /excel para análise em planilhas\n\n\
🎯 *DICA 6: Registre no Momento*\n\
Quanto mais rápido registrar, menos esquece!\n\
O bot foi feito para ser RÁPIDO 🚀\n\n\
🎯 *DICA 7: Formatos Flexíveis*\n\
Todos funcionam igualmente:\n\
• \"Almoço 35,50\"\n\
• \"Almoço 35.50\"\n\
• \"35.50 Almoço\"\n\
• \"35,50 Almoço\"\n\n\
━━━━━━━━━━━━━━━━━━━━━━\n\n\
📱 Use /exemplos para ver mais casos práticos!";
