use super::model::{AudioSegment, VoiceMap};
use crate::domain::job::{EventPublisher, JobEvent};
use crate::domain::resilience::{
    estimate_synthesis_cost, CircuitBreaker, OperationType, PipelineError, RateLimiter,
    RetryPolicy,
};
use crate::domain::script::SpeakerTurn;
use crate::infrastructure::repositories::TtsRepository;
use futures::future::join_all;
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Synthesized audio keyed by (voice, text)
pub type AudioCache = Cache<(String, String), Arc<Vec<u8>>>;

pub fn audio_cache() -> AudioCache {
    Cache::builder()
        .max_capacity(500)
        .time_to_idle(Duration::from_secs(30 * 60))
        .build()
}

#[derive(Debug, Clone)]
pub struct BatchAudioConfig {
    /// Turns dispatched together; bounds in-flight calls and memory
    pub batch_size: usize,
    pub call_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for BatchAudioConfig {
    fn default() -> Self {
        Self {
            batch_size: 5,
            call_timeout: Duration::from_secs(60),
            retry: RetryPolicy::exponential(
                "audio_synthesis",
                2,
                Duration::from_secs(1),
                Duration::from_secs(8),
            ),
        }
    }
}

/// Turns ordered speaker turns into per-turn audio.
///
/// Batches run one after another; turns inside a batch are synthesized
/// concurrently. A turn that exhausts its retries yields a segment without
/// audio instead of failing the whole run.
pub struct BatchAudioGenerator {
    tts: Arc<dyn TtsRepository>,
    rate_limiter: Arc<RateLimiter>,
    circuit_breaker: Arc<CircuitBreaker>,
    config: BatchAudioConfig,
    cache: Option<AudioCache>,
}

impl BatchAudioGenerator {
    pub fn new(
        tts: Arc<dyn TtsRepository>,
        rate_limiter: Arc<RateLimiter>,
        circuit_breaker: Arc<CircuitBreaker>,
        config: BatchAudioConfig,
    ) -> Self {
        Self {
            tts,
            rate_limiter,
            circuit_breaker,
            config,
            cache: None,
        }
    }

    pub fn with_cache(mut self, cache: AudioCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Synthesize every turn. The result has one segment per input turn,
    /// sorted by (original line, sequence).
    pub async fn generate_batch(
        &self,
        turns: &[SpeakerTurn],
        voices: &VoiceMap,
        cancel: &CancellationToken,
        events: &EventPublisher,
    ) -> Result<Vec<AudioSegment>, PipelineError> {
        voices.validate()?;

        if turns.is_empty() {
            return Ok(Vec::new());
        }

        let batch_size = self.config.batch_size.max(1);
        let batch_count = turns.len().div_ceil(batch_size);
        let mut segments = Vec::with_capacity(turns.len());

        tracing::info!(
            job_id = %events.job_id(),
            turns = turns.len(),
            batches = batch_count,
            batch_size = batch_size,
            "Starting audio synthesis"
        );

        for (batch_index, batch) in turns.chunks(batch_size).enumerate() {
            if cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }

            let started = tokio::time::Instant::now();
            let results = join_all(
                batch
                    .iter()
                    .map(|turn| self.synthesize_turn(turn, voices, cancel)),
            )
            .await;

            if cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }

            let mut failed = 0usize;
            for segment in results {
                if let (Some(error), Some(error_kind)) = (&segment.error, segment.error_kind) {
                    failed += 1;
                    events.emit(JobEvent::TurnFailed {
                        original_line_index: segment.turn.original_line_index,
                        sequence_index: segment.turn.sequence_index,
                        error_kind,
                        error: error.clone(),
                    });
                }
                segments.push(segment);
            }

            tracing::info!(
                job_id = %events.job_id(),
                batch_index = batch_index,
                succeeded = batch.len() - failed,
                failed = failed,
                latency_ms = started.elapsed().as_millis() as u64,
                "Audio batch completed"
            );

            events.emit(JobEvent::BatchCompleted {
                batch: batch_index + 1,
                batches: batch_count,
                succeeded: batch.len() - failed,
                failed,
            });
            events.emit(JobEvent::Progress {
                step: format!("synthesized {}/{} turns", segments.len(), turns.len()),
                percent: segments.len() as f32 * 100.0 / turns.len() as f32,
            });
        }

        segments.sort_by_key(|segment| segment.turn.order_key());
        Ok(segments)
    }

    async fn synthesize_turn(
        &self,
        turn: &SpeakerTurn,
        voices: &VoiceMap,
        cancel: &CancellationToken,
    ) -> AudioSegment {
        let voice = voices.voice_for(turn.role).unwrap_or_default().to_string();

        match self.synthesize_text(&turn.text, &voice, cancel).await {
            Ok(audio) => AudioSegment::synthesized(turn.clone(), voice, audio),
            Err(err) => {
                if !matches!(err, PipelineError::Cancelled) {
                    tracing::warn!(
                        line = turn.original_line_index,
                        sequence = turn.sequence_index,
                        role = %turn.role,
                        error_kind = %err.kind(),
                        error = %err,
                        "Turn synthesis failed, substituting silence"
                    );
                }
                AudioSegment::failed(turn.clone(), voice, &err)
            }
        }
    }

    /// One turn's audio: cache, then breaker-gated, rate-limited,
    /// time-boxed provider calls under the retry policy.
    pub async fn synthesize_text(
        &self,
        text: &str,
        voice: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, PipelineError> {
        let key = (voice.to_string(), text.to_string());
        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.get(&key).await {
                tracing::debug!(voice = voice, text_length = text.len(), "Audio cache hit");
                return Ok(hit.as_ref().clone());
            }
        }

        let cost = estimate_synthesis_cost(text);
        let audio = self
            .config
            .retry
            .run(cancel, |_| self.attempt(text, voice, cost, cancel))
            .await?;

        if let Some(cache) = &self.cache {
            cache.insert(key, Arc::new(audio.clone())).await;
        }
        Ok(audio)
    }

    async fn attempt(
        &self,
        text: &str,
        voice: &str,
        cost: u32,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, PipelineError> {
        let operation = OperationType::AudioSynthesis;
        if !self.circuit_breaker.allow(operation) {
            return Err(PipelineError::CircuitOpen(operation.to_string()));
        }

        let call_timeout = self.config.call_timeout;
        let result = self
            .rate_limiter
            // the retry policy in `synthesize_text` is the only retry layer
            .execute(cost, 1, cancel, || async move {
                match tokio::time::timeout(call_timeout, self.tts.synthesize(text, voice)).await {
                    Ok(Ok(audio)) => Ok(audio),
                    Ok(Err(err)) => Err(PipelineError::Provider(err)),
                    Err(_) => Err(PipelineError::Timeout(call_timeout)),
                }
            })
            .await;

        match &result {
            Ok(_) => self.circuit_breaker.on_success(operation),
            Err(PipelineError::Cancelled) => {}
            Err(err) => self.circuit_breaker.on_failure(operation, err),
        }
        result
    }
}
