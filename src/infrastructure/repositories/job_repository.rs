use crate::domain::job::{Job, JobEventRecord, StatusUpdate};
use crate::error::AppResult;
use async_trait::async_trait;
use uuid::Uuid;

/// Durable job record plus its append-only event log
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Insert a queued job. Fails with `Conflict` if the id is taken.
    async fn create(&self, job_id: Uuid, user_id: Uuid) -> AppResult<Job>;

    async fn find_by_id(&self, job_id: Uuid) -> AppResult<Option<Job>>;

    /// Persist a status change; sets processing/completed timestamps
    async fn update_status(&self, job_id: Uuid, update: &StatusUpdate) -> AppResult<()>;

    async fn update_progress(&self, job_id: Uuid, step: &str, percent: f32) -> AppResult<()>;

    async fn append_event(
        &self,
        job_id: Uuid,
        event_type: &str,
        payload: serde_json::Value,
    ) -> AppResult<()>;

    /// Events in insertion order
    async fn list_events(&self, job_id: Uuid) -> AppResult<Vec<JobEventRecord>>;

    async fn ping(&self) -> AppResult<()>;
}
