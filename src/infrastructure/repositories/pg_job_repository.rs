use super::job_repository::JobRepository;
use crate::domain::job::{Job, JobEventRecord, JobStatus, StatusUpdate};
use crate::error::{AppError, AppResult};
use crate::infrastructure::db::{check_connection, DbPool};
use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

pub struct PgJobRepository {
    pool: Arc<DbPool>,
}

impl PgJobRepository {
    pub fn new(pool: Arc<DbPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobRepository for PgJobRepository {
    async fn create(&self, job_id: Uuid, user_id: Uuid) -> AppResult<Job> {
        let pool = self.pool.as_ref();
        let job = sqlx::query_as::<_, Job>(
            r#"
            INSERT INTO podcast_jobs (id, user_id, status, created_at, updated_at)
            VALUES ($1, $2, $3, NOW(), NOW())
            ON CONFLICT (id) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(job_id)
        .bind(user_id)
        .bind(JobStatus::Queued)
        .fetch_optional(pool)
        .await?;

        job.ok_or_else(|| AppError::Conflict(format!("job {} already exists", job_id)))
    }

    async fn find_by_id(&self, job_id: Uuid) -> AppResult<Option<Job>> {
        let pool = self.pool.as_ref();
        let job = sqlx::query_as::<_, Job>("SELECT * FROM podcast_jobs WHERE id = $1")
            .bind(job_id)
            .fetch_optional(pool)
            .await?;

        Ok(job)
    }

    async fn update_status(&self, job_id: Uuid, update: &StatusUpdate) -> AppResult<()> {
        let pool = self.pool.as_ref();
        let result = sqlx::query(
            r#"
            UPDATE podcast_jobs
            SET status = $2,
                current_step = $3,
                script = COALESCE($4, script),
                audio_url = COALESCE($5, audio_url),
                error_message = COALESCE($6, error_message),
                progress_percent = CASE WHEN $2 = 'completed' THEN 100 ELSE progress_percent END,
                processing_started_at = CASE
                    WHEN $2 = 'processing' THEN COALESCE(processing_started_at, NOW())
                    ELSE processing_started_at
                END,
                completed_at = CASE WHEN $7 THEN NOW() ELSE completed_at END,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .bind(update.status)
        .bind(&update.step)
        .bind(update.script.as_deref())
        .bind(update.audio_url.as_deref())
        .bind(update.error_message.as_deref())
        .bind(update.status.is_terminal())
        .execute(pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("job {}", job_id)));
        }
        Ok(())
    }

    async fn update_progress(&self, job_id: Uuid, step: &str, percent: f32) -> AppResult<()> {
        let pool = self.pool.as_ref();
        // Late progress must not overwrite a finished job
        sqlx::query(
            r#"
            UPDATE podcast_jobs
            SET current_step = $2, progress_percent = $3, updated_at = NOW()
            WHERE id = $1 AND status NOT IN ('completed', 'failed', 'timeout')
            "#,
        )
        .bind(job_id)
        .bind(step)
        .bind(percent)
        .execute(pool)
        .await?;

        Ok(())
    }

    async fn append_event(
        &self,
        job_id: Uuid,
        event_type: &str,
        payload: serde_json::Value,
    ) -> AppResult<()> {
        let pool = self.pool.as_ref();
        sqlx::query(
            r#"
            INSERT INTO podcast_job_events (job_id, event_type, payload, created_at)
            VALUES ($1, $2, $3, NOW())
            "#,
        )
        .bind(job_id)
        .bind(event_type)
        .bind(payload)
        .execute(pool)
        .await?;

        Ok(())
    }

    async fn list_events(&self, job_id: Uuid) -> AppResult<Vec<JobEventRecord>> {
        let pool = self.pool.as_ref();
        let events = sqlx::query_as::<_, JobEventRecord>(
            "SELECT * FROM podcast_job_events WHERE job_id = $1 ORDER BY id ASC",
        )
        .bind(job_id)
        .fetch_all(pool)
        .await?;

        Ok(events)
    }

    async fn ping(&self) -> AppResult<()> {
        check_connection(self.pool.as_ref()).await?;
        Ok(())
    }
}
