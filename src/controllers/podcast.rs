use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::podcast::{
    CreatePodcastRequest, JobEventResponse, PodcastAcceptedResponse, PodcastJobResponse,
    PodcastServiceApi,
};
use crate::error::{AppError, AppResult};

pub struct PodcastController {
    podcast_service: Arc<dyn PodcastServiceApi>,
}

impl PodcastController {
    pub fn new(podcast_service: Arc<dyn PodcastServiceApi>) -> Self {
        Self { podcast_service }
    }

    /// POST /api/podcasts - Accept a job and start the pipeline
    pub async fn create_podcast(
        State(controller): State<Arc<PodcastController>>,
        body: Result<Json<CreatePodcastRequest>, axum::extract::rejection::JsonRejection>,
    ) -> AppResult<(StatusCode, Json<PodcastAcceptedResponse>)> {
        let Json(request) = body.map_err(|e| AppError::BadRequest(e.body_text()))?;
        let accepted = controller.podcast_service.submit(request).await?;
        Ok((StatusCode::ACCEPTED, Json(accepted)))
    }

    /// GET /api/podcasts/{jobId} - Job status and outcome
    pub async fn get_podcast(
        State(controller): State<Arc<PodcastController>>,
        Path(job_id): Path<Uuid>,
    ) -> AppResult<Json<PodcastJobResponse>> {
        let job = controller.podcast_service.get_job(job_id).await?;
        Ok(Json(job))
    }

    /// GET /api/podcasts/{jobId}/events - Job event log
    pub async fn list_events(
        State(controller): State<Arc<PodcastController>>,
        Path(job_id): Path<Uuid>,
    ) -> AppResult<Json<Vec<JobEventResponse>>> {
        let events = controller.podcast_service.list_events(job_id).await?;
        Ok(Json(events))
    }

    /// POST /api/podcasts/{jobId}/cancel - Cancel a running job
    pub async fn cancel_podcast(
        State(controller): State<Arc<PodcastController>>,
        Path(job_id): Path<Uuid>,
    ) -> AppResult<StatusCode> {
        controller.podcast_service.cancel(job_id).await?;
        Ok(StatusCode::ACCEPTED)
    }
}
