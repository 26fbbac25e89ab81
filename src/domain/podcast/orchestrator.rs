use super::model::{ArticleInput, PodcastJob};
use crate::domain::audio::{AudioAssembler, BatchAudioGenerator, VoiceMap};
use crate::domain::job::{EventPublisher, JobEvent, JobHandle, JobResult, JobStatus, StatusUpdate};
use crate::domain::resilience::{
    estimate_completion_cost, CircuitBreaker, OperationType, PipelineError, ProviderError,
    RateLimiter, RetryPolicy,
};
use crate::domain::script::{CompletionRequest, PromptBuilder, ScriptSection, ScriptSegmenter, Speakers};
use crate::infrastructure::repositories::{CompletionRepository, StorageRepository};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

const AUDIO_CONTENT_TYPE: &str = "audio/mpeg";

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub speakers: Speakers,
    /// Extra names the model may use for the host, e.g. a full name
    pub host_aliases: Vec<String>,
    pub cohost_aliases: Vec<String>,
    pub voices: VoiceMap,
    pub max_output_tokens: u32,
    pub completion_timeout: Duration,
    pub bucket: String,
    pub upload_retry: RetryPolicy,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            speakers: Speakers {
                host: "Alex".to_string(),
                cohost: "Jordan".to_string(),
            },
            host_aliases: Vec::new(),
            cohost_aliases: Vec::new(),
            voices: VoiceMap::new("alloy", "nova"),
            max_output_tokens: 1500,
            completion_timeout: Duration::from_secs(90),
            bucket: "podcasts".to_string(),
            upload_retry: RetryPolicy::linear("upload", 3, Duration::from_secs(2)),
        }
    }
}

/// Runs one podcast job end to end: script, turns, audio, upload.
///
/// Every status change goes through the job handle so the tracker stays the
/// single writer of the job record.
pub struct Orchestrator {
    completion: Arc<dyn CompletionRepository>,
    storage: Arc<dyn StorageRepository>,
    rate_limiter: Arc<RateLimiter>,
    circuit_breaker: Arc<CircuitBreaker>,
    audio: BatchAudioGenerator,
    assembler: AudioAssembler,
    prompts: PromptBuilder,
    segmenter: ScriptSegmenter,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(
        completion: Arc<dyn CompletionRepository>,
        storage: Arc<dyn StorageRepository>,
        rate_limiter: Arc<RateLimiter>,
        circuit_breaker: Arc<CircuitBreaker>,
        audio: BatchAudioGenerator,
        config: OrchestratorConfig,
    ) -> Self {
        let mut hosts = vec![config.speakers.host.clone()];
        hosts.extend(config.host_aliases.iter().cloned());
        let mut cohosts = vec![config.speakers.cohost.clone()];
        cohosts.extend(config.cohost_aliases.iter().cloned());

        Self {
            completion,
            storage,
            rate_limiter,
            circuit_breaker,
            audio,
            assembler: AudioAssembler::new(),
            prompts: PromptBuilder::new(config.speakers.clone(), config.max_output_tokens),
            segmenter: ScriptSegmenter::new(&hosts, &cohosts),
            config,
        }
    }

    pub async fn execute(&self, job: JobHandle, request: PodcastJob) -> Result<JobResult, PipelineError> {
        let cancel = job.cancel_token().clone();
        let events = job.events().clone();

        let script = self
            .generate_script(&request.articles, &cancel, &events)
            .await?;
        job.transition(
            StatusUpdate::new(JobStatus::ScriptGenerated, "script generated").with_script(script.clone()),
        )
        .await?;

        let turns = self.segmenter.segment(&script)?;
        drop(script);
        tracing::info!(job_id = %request.job_id, turns = turns.len(), "Script segmented");

        job.advance(
            JobStatus::GeneratingAudio,
            &format!("synthesizing {} turns", turns.len()),
        )
        .await?;
        let segments = self
            .audio
            .generate_batch(&turns, &self.config.voices, &cancel, &events)
            .await?;

        let synthesized = segments.iter().filter(|s| s.has_audio()).count();
        if synthesized == 0 {
            return Err(PipelineError::Provider(ProviderError::new(format!(
                "no audio synthesized: all {} turns failed",
                turns.len()
            ))));
        }
        tracing::info!(
            job_id = %request.job_id,
            synthesized = synthesized,
            failed = turns.len() - synthesized,
            "Audio synthesis finished"
        );
        drop(turns);

        job.advance(JobStatus::CombiningAudio, "combining audio").await?;
        let audio = self.assembler.combine(segments)?;
        tracing::info!(job_id = %request.job_id, bytes = audio.len(), "Audio combined");

        job.advance(JobStatus::Uploading, "uploading audio").await?;
        let audio_url = self
            .upload(request.user_id, request.job_id, audio, &cancel)
            .await?;

        Ok(JobResult { audio_url })
    }

    /// Introduction, one section per article, conclusion; generated in order
    pub async fn generate_script(
        &self,
        articles: &[ArticleInput],
        cancel: &CancellationToken,
        events: &EventPublisher,
    ) -> Result<String, PipelineError> {
        let plan = ScriptSection::plan(articles.len());
        let mut sections = Vec::with_capacity(plan.len());

        for (index, section) in plan.iter().enumerate() {
            let request = self.prompts.build(*section, articles);
            let text = self.generate_section(&request, cancel).await.map_err(|err| {
                tracing::error!(section = %section.label(), error = %err, "Script section failed");
                err
            })?;

            events.emit(JobEvent::SectionGenerated {
                section: section.label(),
                chars: text.len(),
            });
            events.emit(JobEvent::Progress {
                step: format!("generated {}", section.label()),
                percent: (index + 1) as f32 * 100.0 / plan.len() as f32,
            });
            sections.push(text);
        }

        Ok(sections.join("\n\n"))
    }

    async fn generate_section(
        &self,
        request: &CompletionRequest,
        cancel: &CancellationToken,
    ) -> Result<String, PipelineError> {
        let cost = estimate_completion_cost(request.serialized_len(), request.max_tokens);
        let timeout = self.config.completion_timeout;

        let attempts = self.rate_limiter.max_attempts();

        self.guarded(OperationType::ScriptGeneration, || {
            self.rate_limiter.execute(cost, attempts, cancel, || async move {
                match tokio::time::timeout(timeout, self.completion.complete(request)).await {
                    Ok(Ok(text)) if text.trim().is_empty() => Err(PipelineError::Provider(
                        ProviderError::new("empty completion response"),
                    )),
                    Ok(Ok(text)) => Ok(text.trim().to_string()),
                    Ok(Err(err)) => Err(PipelineError::Provider(err)),
                    Err(_) => Err(PipelineError::Timeout(timeout)),
                }
            })
        })
        .await
    }

    async fn upload(
        &self,
        user_id: Uuid,
        job_id: Uuid,
        audio: Vec<u8>,
        cancel: &CancellationToken,
    ) -> Result<String, PipelineError> {
        let path = format!("{}/{}.mp3", user_id, job_id);
        let bucket = self.config.bucket.as_str();
        let audio = audio.as_slice();
        let path = path.as_str();

        self.config
            .upload_retry
            .run(cancel, |attempt| {
                self.guarded(OperationType::Upload, move || async move {
                    tracing::debug!(path = path, attempt = attempt, bytes = audio.len(), "Uploading audio");
                    self.storage
                        .upload(bucket, path, audio, AUDIO_CONTENT_TYPE)
                        .await
                        .map_err(|err| PipelineError::Upload(err.to_string()))
                })
            })
            .await
    }

    /// Gate `call` on the breaker for `operation` and report its outcome
    async fn guarded<T, F, Fut>(&self, operation: OperationType, call: F) -> Result<T, PipelineError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, PipelineError>>,
    {
        if !self.circuit_breaker.allow(operation) {
            return Err(PipelineError::CircuitOpen(operation.to_string()));
        }

        let result = call().await;
        match &result {
            Ok(_) => self.circuit_breaker.on_success(operation),
            Err(PipelineError::Cancelled) => {}
            Err(err) => self.circuit_breaker.on_failure(operation, err),
        }
        result
    }
}
