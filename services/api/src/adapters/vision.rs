//! services/api/src/adapters/vision.rs
//!
//! This module contains the adapter for the vision-capable classification LLM.
//! It implements the `ImageClassifier` port from the `core` crate.

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestMessageContentPartImageArgs,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs, ImageDetail, ImageUrlArgs,
    },
    Client,
};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use eco_report_core::{
    domain::ClassificationResult,
    ports::{ImageClassifier, PortError, PortResult},
};

/// The fixed contract with the vision model: a brief free-text description of
/// the visible waste, or one of the two literal sentinel markers.
const SYSTEM_INSTRUCTIONS: &str = "Você é um assistente especializado em análise visual para \
detecção de lixo em imagens. Ao receber uma imagem: \
- Descreva brevemente os tipos de lixo visíveis (ex.: plástico, vidro, papel, metal, orgânico). \
- Cite marcas, logotipos ou rótulos identificáveis, se houver. \
- Informe elementos de contexto do local, como rua, parque, praia, rio, etc. \
Regras especiais: \
- Se a imagem parecer gerada por IA, ilustração, pintura ou irreal, responda exatamente: <fake>. \
- Se não houver lixo visível, responda exatamente: <not-found>. \
Responda de forma objetiva, sem comentários adicionais nem explicações.";

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `ImageClassifier` using an OpenAI-compatible
/// vision model. Every image is classified independently; no caching, no retry.
#[derive(Clone)]
pub struct OpenAiVisionAdapter {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiVisionAdapter {
    /// Creates a new `OpenAiVisionAdapter`.
    pub fn new(client: Client<OpenAIConfig>, model: String) -> Self {
        Self { client, model }
    }
}

//=========================================================================================
// `ImageClassifier` Trait Implementation
//=========================================================================================

#[async_trait]
impl ImageClassifier for OpenAiVisionAdapter {
    /// Sends the image as a base64 data URL with `detail=high` and interprets
    /// the model's first text output. An empty response is a failed call so
    /// the intake engine can ask the user to try again.
    async fn classify(&self, image: &[u8]) -> PortResult<ClassificationResult> {
        let data_url = format!("data:image/jpeg;base64,{}", BASE64.encode(image));

        let messages = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(SYSTEM_INSTRUCTIONS)
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(vec![ChatCompletionRequestMessageContentPartImageArgs::default()
                    .image_url(
                        ImageUrlArgs::default()
                            .url(data_url)
                            .detail(ImageDetail::High)
                            .build()
                            .map_err(|e| PortError::Unexpected(e.to_string()))?,
                    )
                    .build()
                    .map_err(|e| PortError::Unexpected(e.to_string()))?
                    .into()])
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

        // Call the API and manually map the error, which respects the orphan rule.
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

        let text = text.trim();
        if text.is_empty() {
            return Err(PortError::Unavailable(
                "vision model returned no text output".to_string(),
            ));
        }

        Ok(ClassificationResult::from_model_text(text))
    }
}
