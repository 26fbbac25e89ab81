use super::completion_repository::CompletionRepository;
use super::openai_error::provider_error;
use crate::domain::resilience::ProviderError;
use crate::domain::script::{ChatRole, CompletionRequest};
use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequest,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use std::sync::Arc;

/// Chat completions through the OpenAI API
pub struct OpenAiCompletionRepository {
    client: Arc<Client<OpenAIConfig>>,
    model: String,
}

impl OpenAiCompletionRepository {
    pub fn new(client: Arc<Client<OpenAIConfig>>, model: String) -> Self {
        Self { client, model }
    }

    fn build_request(&self, request: &CompletionRequest) -> Result<CreateChatCompletionRequest, OpenAIError> {
        let messages = request
            .messages
            .iter()
            .map(|message| -> Result<ChatCompletionRequestMessage, OpenAIError> {
                Ok(match message.role {
                    ChatRole::System => ChatCompletionRequestSystemMessageArgs::default()
                        .content(message.content.as_str())
                        .build()?
                        .into(),
                    ChatRole::User => ChatCompletionRequestUserMessageArgs::default()
                        .content(message.content.as_str())
                        .build()?
                        .into(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .max_tokens(request.max_tokens)
            .temperature(request.temperature)
            .build()
    }
}

#[async_trait]
impl CompletionRepository for OpenAiCompletionRepository {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError> {
        let start_time = std::time::Instant::now();
        let chat_request = self.build_request(request).map_err(provider_error)?;

        let response = self.client.chat().create(chat_request).await.map_err(|e| {
            tracing::warn!(error = %e, model = %self.model, "OpenAI completion failed");
            provider_error(e)
        })?;

        let text = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default();

        tracing::debug!(
            provider = "openai",
            model = %self.model,
            latency_ms = start_time.elapsed().as_millis() as u64,
            prompt_tokens = response.usage.as_ref().map(|u| u.prompt_tokens),
            completion_tokens = response.usage.as_ref().map(|u| u.completion_tokens),
            output_length = text.len(),
            "Completion received"
        );

        Ok(text)
    }
}
