//! services/api/src/adapters/report_llm.rs
//!
//! This module contains the adapter for the narrative-report LLM.
//! It implements the `ReportWriter` port from the `core` crate.

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use eco_report_core::{
    domain::{GeneratedReport, ReportStats},
    ports::{PortError, PortResult, ReportWriter},
};

const SYSTEM_INSTRUCTIONS: &str =
    "Você é uma analista ambiental especialista em sustentabilidade urbana.";

/// The heading that separates the situation summary from the recommended
/// actions in the model's answer.
const ACTIONS_HEADING: &str = "Ações recomendadas:";

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `ReportWriter` using an OpenAI-compatible LLM.
#[derive(Clone)]
pub struct OpenAiReportAdapter {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiReportAdapter {
    /// Creates a new `OpenAiReportAdapter`.
    pub fn new(client: Client<OpenAIConfig>, model: String) -> Self {
        Self { client, model }
    }

    fn build_prompt(stats: &ReportStats) -> String {
        let join_or_none = |items: &[String]| {
            if items.is_empty() {
                "Nenhum".to_string()
            } else {
                items.join(", ")
            }
        };

        format!(
            "Com base nos dados a seguir, gere um relatório técnico para um gestor público \
municipal responsável por limpeza urbana e sustentabilidade.\n\n\
Os dados da operação são:\n\
- Total de denúncias: {}\n\
- Imagens validadas por IA: {}\n\
- Bairros críticos: {}\n\
- Locais reincidentes: {}\n\
- Escolas engajadas: {}\n\
- Alunos participantes: {}\n\
- Parcerias ativas: {}\n\n\
Gere:\n\
1. Um resumo descritivo da situação ambiental;\n\
2. Uma lista de ações recomendadas, voltadas à gestão pública (educação, \
infraestrutura, campanhas, etc.), iniciada pelo título \"{}\";\n\
3. Use linguagem clara e formal, direcionada a um gestor público.",
            stats.total_denuncias,
            stats.ia_approved,
            join_or_none(&stats.bairros_criticos),
            join_or_none(&stats.locais_reincidentes),
            stats.engajamento_colaborativo,
            stats.alunos_engajados,
            stats.parcerias_ativas,
            ACTIONS_HEADING,
        )
    }

    /// Splits the model's answer into the situation summary and the
    /// recommended-actions list. When the heading is missing the whole text
    /// becomes the description and the actions are left empty.
    fn split_answer(text: &str) -> GeneratedReport {
        match text.find(ACTIONS_HEADING) {
            Some(pos) => GeneratedReport {
                description: text[..pos].trim().to_string(),
                acoes_recomendadas: text[pos + ACTIONS_HEADING.len()..].trim().to_string(),
            },
            None => GeneratedReport {
                description: text.trim().to_string(),
                acoes_recomendadas: String::new(),
            },
        }
    }
}

//=========================================================================================
// `ReportWriter` Trait Implementation
//=========================================================================================

#[async_trait]
impl ReportWriter for OpenAiReportAdapter {
    /// Generates the narrative summary and recommended actions from the
    /// aggregate counters.
    async fn generate(&self, stats: &ReportStats) -> PortResult<GeneratedReport> {
        let messages = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(SYSTEM_INSTRUCTIONS)
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(Self::build_prompt(stats))
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .n(1)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e: OpenAIError| PortError::Unavailable(e.to_string()))?;

        let text = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(PortError::Unavailable(
                "report model returned no text output".to_string(),
            ));
        }

        Ok(Self::split_answer(&text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_answer_separates_heading() {
        let report = OpenAiReportAdapter::split_answer(
            "A situação é crítica nos bairros centrais.\n\nAções recomendadas:\n1. Campanhas educativas.",
        );
        assert_eq!(report.description, "A situação é crítica nos bairros centrais.");
        assert_eq!(report.acoes_recomendadas, "1. Campanhas educativas.");
    }

    #[test]
    fn split_answer_without_heading_keeps_everything_as_description() {
        let report = OpenAiReportAdapter::split_answer("Resumo sem ações.");
        assert_eq!(report.description, "Resumo sem ações.");
        assert!(report.acoes_recomendadas.is_empty());
    }

    #[test]
    fn prompt_writes_nenhum_for_empty_lists() {
        let prompt = OpenAiReportAdapter::build_prompt(&ReportStats {
            total_denuncias: 12,
            ..Default::default()
        });
        assert!(prompt.contains("Total de denúncias: 12"));
        assert!(prompt.contains("Bairros críticos: Nenhum"));
    }
}
