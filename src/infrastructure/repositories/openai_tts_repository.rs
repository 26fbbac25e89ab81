use super::openai_error::provider_error;
use super::text_chunks::split_at_sentences;
use super::tts_repository::TtsRepository;
use crate::domain::resilience::ProviderError;
use async_openai::{
    config::OpenAIConfig,
    types::{CreateSpeechRequest, SpeechModel, Voice},
    Client,
};
use async_trait::async_trait;
use std::sync::Arc;

/// OpenAI has a limit of 4096 characters per request
const MAX_CHUNK_SIZE: usize = 4096;

pub struct OpenAiTtsRepository {
    client: Arc<Client<OpenAIConfig>>,
    model: String,
}

impl OpenAiTtsRepository {
    pub fn new(client: Arc<Client<OpenAIConfig>>, model: String) -> Self {
        Self { client, model }
    }

    fn speech_model(&self) -> SpeechModel {
        match self.model.as_str() {
            "tts-1" => SpeechModel::Tts1,
            "tts-1-hd" => SpeechModel::Tts1Hd,
            other => SpeechModel::Other(other.to_string()),
        }
    }

    fn voice(name: &str) -> Result<Voice, ProviderError> {
        match name.to_lowercase().as_str() {
            "alloy" => Ok(Voice::Alloy),
            "echo" => Ok(Voice::Echo),
            "fable" => Ok(Voice::Fable),
            "onyx" => Ok(Voice::Onyx),
            "nova" => Ok(Voice::Nova),
            "shimmer" => Ok(Voice::Shimmer),
            other => Err(ProviderError::new(format!("invalid request: unknown OpenAI voice '{}'", other))
                .with_status(400)),
        }
    }

    async fn call_openai(&self, text: &str, voice: Voice) -> Result<Vec<u8>, ProviderError> {
        tracing::debug!(
            model = %self.model,
            text_length = text.len(),
            "Calling OpenAI TTS API"
        );

        let request = CreateSpeechRequest {
            model: self.speech_model(),
            input: text.to_string(),
            voice,
            response_format: None,
            speed: None,
        };

        let response = self.client.audio().speech(request).await.map_err(|e| {
            tracing::warn!(error = %e, model = %self.model, text_length = text.len(), "OpenAI TTS call failed");
            provider_error(e)
        })?;

        Ok(response.bytes.to_vec())
    }
}

#[async_trait]
impl TtsRepository for OpenAiTtsRepository {
    async fn synthesize(&self, text: &str, voice: &str) -> Result<Vec<u8>, ProviderError> {
        let start_time = std::time::Instant::now();
        let voice_id = Self::voice(voice)?;

        let chunks = split_at_sentences(text, MAX_CHUNK_SIZE);
        let mut audio = Vec::new();
        for chunk in &chunks {
            audio.extend(self.call_openai(chunk, voice_id.clone()).await?);
        }

        tracing::debug!(
            provider = "openai",
            voice = voice,
            latency_ms = start_time.elapsed().as_millis() as u64,
            characters_count = text.len(),
            chunk_count = chunks.len(),
            audio_size_bytes = audio.len(),
            "TTS synthesis completed"
        );

        Ok(audio)
    }
}
