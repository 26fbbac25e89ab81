use super::error::PodcastServiceError;
use super::orchestrator::Orchestrator;
use crate::domain::job::JobLifecycleTracker;
use crate::domain::podcast::{
    CreatePodcastRequest, JobEventResponse, PodcastAcceptedResponse, PodcastJobResponse,
};
use crate::infrastructure::repositories::JobRepository;
use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

pub struct PodcastService {
    tracker: Arc<JobLifecycleTracker>,
    orchestrator: Arc<Orchestrator>,
    job_repo: Arc<dyn JobRepository>,
}

impl PodcastService {
    pub fn new(
        tracker: Arc<JobLifecycleTracker>,
        orchestrator: Arc<Orchestrator>,
        job_repo: Arc<dyn JobRepository>,
    ) -> Self {
        Self {
            tracker,
            orchestrator,
            job_repo,
        }
    }
}

#[async_trait]
pub trait PodcastServiceApi: Send + Sync {
    /// Validate, record the job and start the pipeline in the background
    async fn submit(
        &self,
        request: CreatePodcastRequest,
    ) -> Result<PodcastAcceptedResponse, PodcastServiceError>;

    async fn get_job(&self, job_id: Uuid) -> Result<PodcastJobResponse, PodcastServiceError>;

    async fn list_events(&self, job_id: Uuid) -> Result<Vec<JobEventResponse>, PodcastServiceError>;

    async fn cancel(&self, job_id: Uuid) -> Result<(), PodcastServiceError>;
}

#[async_trait]
impl PodcastServiceApi for PodcastService {
    async fn submit(
        &self,
        request: CreatePodcastRequest,
    ) -> Result<PodcastAcceptedResponse, PodcastServiceError> {
        let job = request.validate()?;
        let job_id = job.job_id;

        self.tracker.accept(job_id, job.user_id).await?;
        let handle = self.tracker.start(job_id)?;

        tracing::info!(
            job_id = %job_id,
            user_id = %job.user_id,
            articles = job.articles.len(),
            "Podcast job accepted"
        );

        let tracker = self.tracker.clone();
        let orchestrator = self.orchestrator.clone();
        self.tracker.spawn(async move {
            let status = tracker
                .run(handle, |handle| async move { orchestrator.execute(handle, job).await })
                .await;
            tracing::info!(job_id = %job_id, status = %status, "Podcast job finished");
        });

        Ok(PodcastAcceptedResponse {
            success: true,
            message: "Podcast generation started".to_string(),
            job_id,
        })
    }

    async fn get_job(&self, job_id: Uuid) -> Result<PodcastJobResponse, PodcastServiceError> {
        let job = self
            .job_repo
            .find_by_id(job_id)
            .await?
            .ok_or(PodcastServiceError::NotFound)?;
        Ok(PodcastJobResponse::from(job))
    }

    async fn list_events(&self, job_id: Uuid) -> Result<Vec<JobEventResponse>, PodcastServiceError> {
        if self.job_repo.find_by_id(job_id).await?.is_none() {
            return Err(PodcastServiceError::NotFound);
        }

        let events = self.job_repo.list_events(job_id).await?;
        Ok(events.into_iter().map(JobEventResponse::from).collect())
    }

    async fn cancel(&self, job_id: Uuid) -> Result<(), PodcastServiceError> {
        if self.tracker.cancel(job_id) {
            Ok(())
        } else {
            Err(PodcastServiceError::NotFound)
        }
    }
}
