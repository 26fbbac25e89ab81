use super::job_repository::JobRepository;
use crate::domain::job::{Job, JobEventRecord, StatusUpdate};
use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use uuid::Uuid;

/// Finished jobs kept before the oldest are evicted
pub const DEFAULT_FINISHED_JOB_LIMIT: usize = 1000;

#[derive(Default)]
struct Store {
    jobs: HashMap<Uuid, Job>,
    events: HashMap<Uuid, Vec<JobEventRecord>>,
    /// terminal jobs, oldest first
    finished: VecDeque<Uuid>,
    next_event_id: i64,
}

impl Store {
    fn evict_finished(&mut self, limit: usize) {
        while self.finished.len() > limit {
            let Some(job_id) = self.finished.pop_front() else {
                break;
            };
            self.jobs.remove(&job_id);
            self.events.remove(&job_id);
            tracing::debug!(job_id = %job_id, "Evicted finished job from memory");
        }
    }
}

/// Process-local job store, used when no database is configured.
///
/// Meant for development: nothing survives a restart, and only the most
/// recent finished jobs are kept along with their events.
pub struct InMemoryJobRepository {
    store: Mutex<Store>,
    finished_limit: usize,
}

impl Default for InMemoryJobRepository {
    fn default() -> Self {
        Self::with_finished_limit(DEFAULT_FINISHED_JOB_LIMIT)
    }
}

impl InMemoryJobRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_finished_limit(finished_limit: usize) -> Self {
        Self {
            store: Mutex::new(Store::default()),
            finished_limit,
        }
    }
}

#[async_trait]
impl JobRepository for InMemoryJobRepository {
    async fn create(&self, job_id: Uuid, user_id: Uuid) -> AppResult<Job> {
        let mut store = self.store.lock();
        if store.jobs.contains_key(&job_id) {
            return Err(AppError::Conflict(format!("job {} already exists", job_id)));
        }
        let job = Job::new(job_id, user_id);
        store.jobs.insert(job_id, job.clone());
        Ok(job)
    }

    async fn find_by_id(&self, job_id: Uuid) -> AppResult<Option<Job>> {
        Ok(self.store.lock().jobs.get(&job_id).cloned())
    }

    async fn update_status(&self, job_id: Uuid, update: &StatusUpdate) -> AppResult<()> {
        let mut store = self.store.lock();
        let job = store
            .jobs
            .get_mut(&job_id)
            .ok_or_else(|| AppError::NotFound(format!("job {}", job_id)))?;
        let was_terminal = job.status.is_terminal();
        job.apply(update);

        if !was_terminal && job.status.is_terminal() {
            store.finished.push_back(job_id);
            store.evict_finished(self.finished_limit);
        }
        Ok(())
    }

    async fn update_progress(&self, job_id: Uuid, step: &str, percent: f32) -> AppResult<()> {
        let mut store = self.store.lock();
        let job = store
            .jobs
            .get_mut(&job_id)
            .ok_or_else(|| AppError::NotFound(format!("job {}", job_id)))?;
        // Late progress must not overwrite a finished job
        if job.status.is_terminal() {
            return Ok(());
        }
        job.current_step = Some(step.to_string());
        job.progress_percent = Some(percent);
        job.updated_at = Utc::now();
        Ok(())
    }

    async fn append_event(
        &self,
        job_id: Uuid,
        event_type: &str,
        payload: serde_json::Value,
    ) -> AppResult<()> {
        let mut store = self.store.lock();
        // evicted or unknown jobs keep no events
        if !store.jobs.contains_key(&job_id) {
            return Ok(());
        }
        store.next_event_id += 1;
        let record = JobEventRecord {
            id: store.next_event_id,
            job_id,
            event_type: event_type.to_string(),
            payload,
            created_at: Utc::now(),
        };
        store.events.entry(job_id).or_default().push(record);
        Ok(())
    }

    async fn list_events(&self, job_id: Uuid) -> AppResult<Vec<JobEventRecord>> {
        Ok(self
            .store
            .lock()
            .events
            .get(&job_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::job::JobStatus;
    use serde_json::json;

    #[tokio::test]
    async fn test_create_rejects_duplicate_id() {
        let repo = InMemoryJobRepository::new();
        let id = Uuid::new_v4();
        repo.create(id, Uuid::new_v4()).await.unwrap();
        let err = repo.create(id, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_progress_ignored_after_terminal_status() {
        let repo = InMemoryJobRepository::new();
        let id = Uuid::new_v4();
        repo.create(id, Uuid::new_v4()).await.unwrap();
        repo.update_status(id, &StatusUpdate::new(JobStatus::Failed, "failed").with_error("boom"))
            .await
            .unwrap();
        repo.update_progress(id, "audio", 50.0).await.unwrap();

        let job = repo.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(job.current_step.as_deref(), Some("failed"));
        assert_eq!(job.progress_percent, None);
        assert!(job.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_events_listed_in_order_per_job() {
        let repo = InMemoryJobRepository::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        repo.create(a, Uuid::new_v4()).await.unwrap();
        repo.create(b, Uuid::new_v4()).await.unwrap();
        repo.append_event(a, "progress", json!({"percent": 10})).await.unwrap();
        repo.append_event(b, "progress", json!({})).await.unwrap();
        repo.append_event(a, "finished", json!({})).await.unwrap();

        let events = repo.list_events(a).await.unwrap();
        let types: Vec<_> = events.iter().map(|e| e.event_type.as_str()).collect();
        assert_eq!(types, vec!["progress", "finished"]);
        assert!(events[0].id < events[1].id);
    }

    #[tokio::test]
    async fn test_oldest_finished_jobs_evicted_past_limit() {
        let repo = InMemoryJobRepository::with_finished_limit(2);
        let ids: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        let running = Uuid::new_v4();
        repo.create(running, Uuid::new_v4()).await.unwrap();

        for id in &ids {
            repo.create(*id, Uuid::new_v4()).await.unwrap();
            repo.append_event(*id, "status_changed", json!({})).await.unwrap();
            repo.update_status(*id, &StatusUpdate::new(JobStatus::Failed, "failed").with_error("boom"))
                .await
                .unwrap();
        }

        assert!(repo.find_by_id(ids[0]).await.unwrap().is_none());
        assert!(repo.list_events(ids[0]).await.unwrap().is_empty());
        assert!(repo.find_by_id(ids[1]).await.unwrap().is_some());
        assert_eq!(repo.list_events(ids[2]).await.unwrap().len(), 1);
        // unfinished jobs never count against the limit
        assert!(repo.find_by_id(running).await.unwrap().is_some());

        // late events for an evicted job are dropped
        repo.append_event(ids[0], "finished", json!({})).await.unwrap();
        assert!(repo.list_events(ids[0]).await.unwrap().is_empty());
    }
}
