use super::model::JobStatus;
use crate::domain::resilience::ErrorKind;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::time::Instant;
use uuid::Uuid;

const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Structured progress and health events published while a job runs
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    StatusChanged {
        status: JobStatus,
        step: String,
    },
    Progress {
        step: String,
        percent: f32,
    },
    SectionGenerated {
        section: String,
        chars: usize,
    },
    BatchCompleted {
        batch: usize,
        batches: usize,
        succeeded: usize,
        failed: usize,
    },
    TurnFailed {
        original_line_index: usize,
        sequence_index: usize,
        error_kind: ErrorKind,
        error: String,
    },
    Heartbeat {
        status: JobStatus,
        step: String,
        elapsed_secs: u64,
    },
    Stalled {
        status: JobStatus,
        step: String,
        idle_secs: u64,
    },
    Finished {
        status: JobStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl JobEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            JobEvent::StatusChanged { .. } => "status_changed",
            JobEvent::Progress { .. } => "progress",
            JobEvent::SectionGenerated { .. } => "section_generated",
            JobEvent::BatchCompleted { .. } => "batch_completed",
            JobEvent::TurnFailed { .. } => "turn_failed",
            JobEvent::Heartbeat { .. } => "heartbeat",
            JobEvent::Stalled { .. } => "stalled",
            JobEvent::Finished { .. } => "finished",
        }
    }

    /// Liveness signals do not count as forward progress
    pub fn is_progress(&self) -> bool {
        !matches!(self, JobEvent::Heartbeat { .. } | JobEvent::Stalled { .. })
    }
}

/// Event as delivered to subscribers
#[derive(Debug, Clone, Serialize)]
pub struct JobNotification {
    pub job_id: Uuid,
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub event: JobEvent,
}

/// Latest known position of a job, kept for heartbeats and the watchdog
#[derive(Debug, Clone)]
pub struct ProgressSnapshot {
    pub status: JobStatus,
    pub step: String,
    pub percent: f32,
    pub started_at: Instant,
    pub last_progress_at: Instant,
}

/// Fan-out of job events to the tracker's recorder and any other subscriber.
///
/// Cheap to clone; every clone publishes into the same channel and updates
/// the same progress snapshot.
#[derive(Clone)]
pub struct EventPublisher {
    job_id: Uuid,
    sender: broadcast::Sender<JobNotification>,
    progress: Arc<Mutex<ProgressSnapshot>>,
}

impl EventPublisher {
    pub fn new(job_id: Uuid, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        let now = Instant::now();
        Self {
            job_id,
            sender,
            progress: Arc::new(Mutex::new(ProgressSnapshot {
                status: JobStatus::Queued,
                step: "queued".to_string(),
                percent: 0.0,
                started_at: now,
                last_progress_at: now,
            })),
        }
    }

    /// Publisher with no job behind it, for running pipeline stages standalone
    pub fn detached() -> Self {
        Self::new(Uuid::nil(), DEFAULT_EVENT_CAPACITY)
    }

    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobNotification> {
        self.sender.subscribe()
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        self.progress.lock().clone()
    }

    pub fn emit(&self, event: JobEvent) {
        if event.is_progress() {
            let mut progress = self.progress.lock();
            progress.last_progress_at = Instant::now();
            match &event {
                JobEvent::StatusChanged { status, step } => {
                    progress.status = *status;
                    progress.step = step.clone();
                }
                JobEvent::Progress { step, percent } => {
                    progress.step = step.clone();
                    progress.percent = percent.clamp(0.0, 100.0);
                }
                _ => {}
            }
        }

        let notification = JobNotification {
            job_id: self.job_id,
            at: Utc::now(),
            event,
        };
        // no subscribers is fine
        let _ = self.sender.send(notification);
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::detached()
    }
}
