use crate::domain::resilience::ProviderError;
use async_trait::async_trait;

/// Speech synthesis provider (OpenAI, AWS Polly).
///
/// Implementations handle provider-specific input limits themselves by
/// splitting long text and concatenating the audio in order.
#[async_trait]
pub trait TtsRepository: Send + Sync {
    /// Synthesize `text` with `voice`, returning MP3 bytes
    async fn synthesize(&self, text: &str, voice: &str) -> Result<Vec<u8>, ProviderError>;
}
