pub mod error;
pub mod model;
pub mod orchestrator;
pub mod service;

pub use error::PodcastServiceError;
pub use model::{ArticleInput, ArticleRequest, CreatePodcastRequest, PodcastJob};
pub use orchestrator::{Orchestrator, OrchestratorConfig};
pub use service::{PodcastService, PodcastServiceApi};

use crate::domain::job::{Job, JobEventRecord, JobStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Immediate response for POST /api/podcasts
#[derive(Debug, Serialize, Deserialize)]
pub struct PodcastAcceptedResponse {
    pub success: bool,
    pub message: String,
    pub job_id: Uuid,
}

/// Response for GET /api/podcasts/{jobId}
#[derive(Debug, Serialize, Deserialize)]
pub struct PodcastJobResponse {
    pub job_id: Uuid,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_step: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_percent: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<Job> for PodcastJobResponse {
    fn from(job: Job) -> Self {
        Self {
            job_id: job.id,
            status: job.status,
            current_step: job.current_step,
            progress_percent: job.progress_percent,
            audio_url: job.audio_url,
            script: job.script,
            error: job.error_message,
            created_at: job.created_at,
            processing_started_at: job.processing_started_at,
            completed_at: job.completed_at,
        }
    }
}

/// Entry of GET /api/podcasts/{jobId}/events
#[derive(Debug, Serialize, Deserialize)]
pub struct JobEventResponse {
    pub event_type: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl From<JobEventRecord> for JobEventResponse {
    fn from(record: JobEventRecord) -> Self {
        Self {
            event_type: record.event_type,
            payload: record.payload,
            created_at: record.created_at,
        }
    }
}
