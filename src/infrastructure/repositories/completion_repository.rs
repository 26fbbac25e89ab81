use crate::domain::resilience::ProviderError;
use crate::domain::script::CompletionRequest;
use async_trait::async_trait;

/// Text-generation provider used to write the dialogue script
#[async_trait]
pub trait CompletionRepository: Send + Sync {
    /// Returns the generated text of the first choice
    async fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError>;
}
