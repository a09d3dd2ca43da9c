//! Group-chat handler
//!
//! Financial commands are private-only. In a group the bot answers a
//! short allow-list of informational commands and otherwise replies
//! only when mentioned by name.

use anyhow::Result;
use tracing::debug;

use super::Dispatcher;
use crate::transport::IncomingMessage;

const ALLOWED_COMMANDS: &[&str] = &["/start", "/help", "/ajuda", "/exemplos", "/dicas"];
const ACTIVATION_KEYWORDS: &[&str] = &["fayol", "bot", "@bot"];

const PRIVACY_REDIRECT: &str = "⚠️ *Uso em Grupo Limitado*\n\n\
Por questões de privacidade, comandos financeiros não são permitidos em grupos.\n\n\
💡 *Fale comigo no privado para:*\n\
• Ver seu saldo e extratos\n\
• Registrar transações\n\
• Gerar relatórios\n\n\
*Comandos permitidos aqui:*\n\
/help - Ver ajuda\n\
/exemplos - Ver exemplos de uso\n\
/dicas - Dicas do bot";

const GROUP_HELP: &str = "🤖 *Fayol Bot - Ajuda*\n\n\
Sou seu assistente financeiro pessoal!\n\n\
🔒 *Privacidade em Primeiro Lugar*\n\
Por segurança, comandos financeiros só funcionam em conversas privadas.\n\n\
💬 *Como usar:*\n\
1. Adicione-me aos seus contatos\n\
2. Envie /start no privado\n\
3. Faça login com sua conta Fayol\n\
4. Comece a gerenciar suas finanças!\n\n\
📚 Use /exemplos para ver casos de uso";

const GROUP_EXAMPLES: &str = "📚 *Exemplos de Uso (no privado)*\n\n\
💰 *Lançamento Rápido:*\n\
• \"Salário 5000\" → Receita\n\
• \"Almoço 45\" → Despesa\n\
• \"+ Freelance 800\" → Força receita\n\n\
📊 *Consultas:*\n\
/saldo - Ver resumo financeiro\n\
/extrato - Últimas transações\n\
/categorias - Gastos organizados\n\n\
📄 *Relatórios:*\n\
/relatorio - Baixar PDF\n\
/excel - Exportar planilha\n\n\
💬 Fale comigo no privado para começar!";

const GROUP_TIPS: &str = "💡 *Dicas do Fayol Bot*\n\n\
🚀 *Lançamento Rápido:*\n\
Digite \"Descrição + Valor\" e o bot detecta automaticamente o tipo!\n\n\
🎯 *Detecção Inteligente:*\n\
Reconhece 90+ palavras-chave como \"salário\", \"almoço\", \"uber\", etc.\n\n\
✨ *Use Prefixos:*\n\
+ para forçar receita\n\
- para forçar despesa\n\n\
📱 *Privacidade:*\n\
Todas as funções financeiras são EXCLUSIVAS de conversas privadas.\n\n\
Adicione-me e envie /start!";

/// Handle a message that arrived through a group chat.
pub async fn handle(d: &Dispatcher, msg: &IncomingMessage) -> Result<()> {
    let group_name = msg.group_name.as_deref().unwrap_or("Grupo");
    let text = msg.text.trim().to_lowercase();

    if text.starts_with('/') {
        return handle_group_command(d, &msg.sender, &text).await;
    }

    if !mentions_bot(&text) {
        debug!(group = group_name, "group message ignored (not mentioned)");
        return Ok(());
    }

    let reply = format!(
        "👋 Olá! Sou o *Fayol Bot*, assistente financeiro.\n\n\
         🔒 Por privacidade, não posso processar transações aqui no grupo \"{group_name}\".\n\n\
         💬 *Fale comigo no privado* para:\n\
         • Consultar saldo e extratos\n\
         • Registrar receitas e despesas\n\
         • Gerar relatórios e insights\n\n\
         📱 Adicione-me aos seus contatos e envie uma mensagem!\n\n\
         Use /help para ver o que posso fazer."
    );
    d.channel.send_text(&msg.sender, &reply).await
}

fn mentions_bot(text: &str) -> bool {
    ACTIVATION_KEYWORDS.iter().any(|k| text.contains(k))
}

async fn handle_group_command(d: &Dispatcher, sender: &str, text: &str) -> Result<()> {
    let command = text.split_whitespace().next().unwrap_or(text);

    if !ALLOWED_COMMANDS.contains(&command) {
        return d.channel.send_text(sender, PRIVACY_REDIRECT).await;
    }

    let reply = match command {
        "/exemplos" => GROUP_EXAMPLES,
        "/dicas" => GROUP_TIPS,
        _ => GROUP_HELP,
    };
    d.channel.send_text(sender, reply).await
}
