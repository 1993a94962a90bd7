//! services/api/src/bot/messages.rs
//!
//! The fixed reply texts of the intake conversation.

/// Greeting sent on the first contact, before any photo is requested.
pub const INTRO: &str = "👋 Olá! Eu sou o bot do *Eco Heróis* ♻️\n\
Eu te ajudo a mapear locais com descarte incorreto de lixo.\n\n\
📸 Por favor, envie uma *imagem* do local com lixo para começarmos.";

pub const CONFIRMATION_QUESTION: &str =
    "Essa descrição está correta?\n\nResponda com *sim* ou *não*.";

pub const LOCATION_REQUEST: &str =
    "📍 Agora, por favor, compartilhe a localização exata ou envie o endereço do local da foto.";

pub const THANK_YOU: &str = "✅ Obrigado! Sua contribuição ajuda a combater a poluição e \
proteger o meio ambiente 🌱\nTenha um ótimo dia!";

/// Closing acknowledgement for any message after the report is done.
pub const CLOSING: &str =
    "🌍 Obrigado novamente! Caso queira fazer outro envio, reinicie a conversa.";

pub const PHOTO_REPROMPT: &str =
    "📸 Por favor, envie uma *foto* do local com lixo para continuarmos.";

pub const MEDIA_FAILED: &str = "⚠️ Não consegui baixar a imagem, envie novamente.";

pub const ANALYSIS_RETRY: &str =
    "⚠️ Não consegui analisar a imagem agora. Tente novamente em instantes.";

pub const IMAGE_NOT_REAL: &str = "⚠️ Imagem não parece ser real. Tente enviar outra.";

pub const NO_WASTE_FOUND: &str =
    "🧹 Não identifiquei lixo na imagem. Tente outra foto, por favor.";

pub const RESEND_PHOTO: &str = "😅 Tudo bem! Envie novamente a *foto correta*.";

pub const YES_NO_REPROMPT: &str = "Por favor, responda apenas com *sim* ou *não*.";

pub const LOCATION_REPROMPT: &str = "📍 Envie a localização ou um endereço válido.";

/// Builds the analysis reply that embeds the classifier's description.
pub fn analysis_reply(description: &str) -> String {
    format!(
        "📸 Análise da imagem:\n\n{}\n\n{}",
        description, CONFIRMATION_QUESTION
    )
}
