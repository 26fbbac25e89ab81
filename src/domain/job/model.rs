use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    ScriptGenerated,
    GeneratingAudio,
    CombiningAudio,
    Uploading,
    Completed,
    Failed,
    Timeout,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::ScriptGenerated => "script_generated",
            JobStatus::GeneratingAudio => "generating_audio",
            JobStatus::CombiningAudio => "combining_audio",
            JobStatus::Uploading => "uploading",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Timeout => "timeout",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Timeout
        )
    }

    /// Forward-only lifecycle. Failure and timeout are reachable from any
    /// non-terminal state; nothing leaves a terminal state.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        match (self, next) {
            (from, _) if from.is_terminal() => false,
            (_, Failed | Timeout) => true,
            (Queued, Processing)
            | (Processing, ScriptGenerated)
            | (ScriptGenerated, GeneratingAudio)
            | (GeneratingAudio, CombiningAudio)
            | (CombiningAudio, Uploading)
            | (Uploading, Completed) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Job {
    pub id: Uuid,
    pub user_id: Uuid,
    pub status: JobStatus,
    pub current_step: Option<String>,
    pub progress_percent: Option<f32>,
    pub script: Option<String>,
    pub audio_url: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub processing_started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(id: Uuid, user_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id,
            user_id,
            status: JobStatus::Queued,
            current_step: None,
            progress_percent: None,
            script: None,
            audio_url: None,
            error_message: None,
            created_at: now,
            updated_at: now,
            processing_started_at: None,
            completed_at: None,
        }
    }

    /// Apply a status update the way the store persists it
    pub fn apply(&mut self, update: &StatusUpdate) {
        let now = Utc::now();
        self.status = update.status;
        self.current_step = Some(update.step.clone());
        if update.script.is_some() {
            self.script = update.script.clone();
        }
        if update.audio_url.is_some() {
            self.audio_url = update.audio_url.clone();
        }
        if update.error_message.is_some() {
            self.error_message = update.error_message.clone();
        }
        if update.status == JobStatus::Processing && self.processing_started_at.is_none() {
            self.processing_started_at = Some(now);
        }
        if update.status == JobStatus::Completed {
            self.progress_percent = Some(100.0);
        }
        if update.status.is_terminal() {
            self.completed_at = Some(now);
        }
        self.updated_at = now;
    }
}

/// Persisted status change plus whatever artifacts the new state carries
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub status: JobStatus,
    pub step: String,
    pub script: Option<String>,
    pub audio_url: Option<String>,
    pub error_message: Option<String>,
}

impl StatusUpdate {
    pub fn new(status: JobStatus, step: impl Into<String>) -> Self {
        Self {
            status,
            step: step.into(),
            script: None,
            audio_url: None,
            error_message: None,
        }
    }

    pub fn with_script(mut self, script: impl Into<String>) -> Self {
        self.script = Some(script.into());
        self
    }

    pub fn with_audio_url(mut self, audio_url: impl Into<String>) -> Self {
        self.audio_url = Some(audio_url.into());
        self
    }

    pub fn with_error(mut self, error_message: impl Into<String>) -> Self {
        self.error_message = Some(error_message.into());
        self
    }
}

/// Row of the per-job event log
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct JobEventRecord {
    pub id: i64,
    pub job_id: Uuid,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}
