use super::text_chunks::split_at_sentences;
use super::tts_repository::TtsRepository;
use crate::domain::resilience::ProviderError;
use async_trait::async_trait;
use aws_sdk_polly::{
    config::http::HttpResponse,
    error::{DisplayErrorContext, ProvideErrorMetadata, SdkError},
    types::{Engine, OutputFormat, VoiceId},
    Client as PollyClient,
};
use std::sync::Arc;

/// AWS Polly has a limit of 3000 characters per request
const MAX_BATCH_SIZE: usize = 3000;

/// AWS Polly implementation of TTS repository
pub struct PollyTtsRepository {
    polly_client: Arc<PollyClient>,
}

impl PollyTtsRepository {
    pub fn new(polly_client: Arc<PollyClient>) -> Self {
        Self { polly_client }
    }

    /// Call AWS Polly to synthesize a single text batch
    async fn call_polly(&self, text: &str, voice: &str) -> Result<Vec<u8>, ProviderError> {
        let voice_id = VoiceId::from(voice);
        let engine = Engine::Neural;

        tracing::debug!(
            voice = voice,
            engine = ?engine,
            text_length = text.len(),
            "Calling AWS Polly synthesize_speech"
        );

        let result = self
            .polly_client
            .synthesize_speech()
            .text(text)
            .voice_id(voice_id)
            .output_format(OutputFormat::Mp3)
            .engine(engine)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(
                    error = %DisplayErrorContext(&e),
                    voice = voice,
                    text_length = text.len(),
                    "AWS Polly synthesize_speech failed"
                );
                sdk_error(e)
            })?;

        let audio_stream = result.audio_stream.collect().await.map_err(|e| {
            tracing::warn!(error = %e, "Failed to collect audio stream from Polly response");
            ProviderError::new(format!("connection error reading Polly audio stream: {}", e))
        })?;

        Ok(audio_stream.into_bytes().to_vec())
    }
}

/// Carry the HTTP status and service error code into the provider error
fn sdk_error<E>(err: SdkError<E, HttpResponse>) -> ProviderError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
{
    let status = err.raw_response().map(|response| response.status().as_u16());
    let code = err.code().map(str::to_string);
    let message = match (&err, err.message()) {
        (SdkError::TimeoutError(_), _) => "request timeout".to_string(),
        (SdkError::DispatchFailure(_), _) => {
            format!("connection error: {}", DisplayErrorContext(&err))
        }
        (_, Some(message)) => message.to_string(),
        (_, None) => DisplayErrorContext(&err).to_string(),
    };

    let mut provider = ProviderError::new(message);
    if let Some(status) = status {
        provider = provider.with_status(status);
    }
    if let Some(code) = code {
        provider = provider.with_code(code);
    }
    provider
}

#[async_trait]
impl TtsRepository for PollyTtsRepository {
    async fn synthesize(&self, text: &str, voice: &str) -> Result<Vec<u8>, ProviderError> {
        let start_time = std::time::Instant::now();

        let batches = split_at_sentences(text, MAX_BATCH_SIZE);
        let mut audio_data = Vec::new();
        for (index, batch) in batches.iter().enumerate() {
            audio_data.extend(self.call_polly(batch, voice).await?);
            tracing::trace!(batch_index = index, total_audio_size = audio_data.len(), "Batch merged");
        }

        tracing::debug!(
            provider = "polly",
            voice = voice,
            latency_ms = start_time.elapsed().as_millis() as u64,
            characters_count = text.len(),
            batch_count = batches.len(),
            audio_size_bytes = audio_data.len(),
            "TTS synthesis completed"
        );

        Ok(audio_data)
    }
}
