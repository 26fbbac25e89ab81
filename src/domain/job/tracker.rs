use super::error::JobError;
use super::events::{EventPublisher, JobEvent, JobNotification};
use super::model::{Job, JobStatus, StatusUpdate};
use crate::domain::resilience::PipelineError;
use crate::error::AppError;
use crate::infrastructure::repositories::JobRepository;
use futures::FutureExt;
use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{
    self,
    error::{RecvError, TryRecvError},
};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub heartbeat_interval: Duration,
    pub watchdog_interval: Duration,
    /// Time without progress before the watchdog raises an alert
    pub stuck_threshold: Duration,
    pub master_timeout: Duration,
    /// Exit the process once a job hits the master timeout
    pub terminate_on_timeout: bool,
    pub event_capacity: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(30),
            watchdog_interval: Duration::from_secs(30),
            stuck_threshold: Duration::from_secs(120),
            master_timeout: Duration::from_secs(30 * 60),
            terminate_on_timeout: false,
            event_capacity: 256,
        }
    }
}

/// What a successful pipeline run produced
#[derive(Debug, Clone, PartialEq)]
pub struct JobResult {
    pub audio_url: String,
}

/// Per-job view handed to the pipeline: status transitions, progress
/// events and the job-scoped cancellation token.
#[derive(Clone)]
pub struct JobHandle {
    job_id: Uuid,
    repo: Arc<dyn JobRepository>,
    publisher: EventPublisher,
    cancel: CancellationToken,
}

impl JobHandle {
    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    pub fn events(&self) -> &EventPublisher {
        &self.publisher
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn status(&self) -> JobStatus {
        self.publisher.snapshot().status
    }

    /// Persist a forward transition and publish it
    pub async fn transition(&self, update: StatusUpdate) -> Result<(), PipelineError> {
        let current = self.status();
        if !current.can_transition_to(update.status) {
            return Err(PipelineError::InvalidInput(format!(
                "illegal job transition {} -> {}",
                current, update.status
            )));
        }

        self.repo
            .update_status(self.job_id, &update)
            .await
            .map_err(|e| PipelineError::Store(e.to_string()))?;

        tracing::info!(
            job_id = %self.job_id,
            from = %current,
            status = %update.status,
            step = %update.step,
            "Job status changed"
        );

        self.publisher.emit(JobEvent::StatusChanged {
            status: update.status,
            step: update.step,
        });
        Ok(())
    }

    pub async fn advance(&self, status: JobStatus, step: &str) -> Result<(), PipelineError> {
        self.transition(StatusUpdate::new(status, step)).await
    }

    pub fn progress(&self, step: impl Into<String>, percent: f32) {
        self.publisher.emit(JobEvent::Progress {
            step: step.into(),
            percent,
        });
    }
}

enum Outcome {
    Finished(Result<JobResult, PipelineError>),
    TimedOut,
}

/// Owns the job state machine.
///
/// Every running job gets a cancellation token derived from the tracker's
/// root token, a heartbeat, a watchdog, an event recorder that persists
/// progress, and a master timeout. Background job tasks are spawned
/// through the tracker so shutdown can wait for their final writes.
pub struct JobLifecycleTracker {
    repo: Arc<dyn JobRepository>,
    config: TrackerConfig,
    shutdown: CancellationToken,
    active: Mutex<HashMap<Uuid, CancellationToken>>,
    tasks: TaskTracker,
}

/// Drops the job from the active registry however `run` ends
struct Registration<'a> {
    active: &'a Mutex<HashMap<Uuid, CancellationToken>>,
    job_id: Uuid,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        self.active.lock().remove(&self.job_id);
    }
}

impl JobLifecycleTracker {
    pub fn new(repo: Arc<dyn JobRepository>, config: TrackerConfig, shutdown: CancellationToken) -> Self {
        Self {
            repo,
            config,
            shutdown,
            active: Mutex::new(HashMap::new()),
            tasks: TaskTracker::new(),
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Record a new queued job, or return the existing one if it has not started
    pub async fn accept(&self, job_id: Uuid, user_id: Uuid) -> Result<Job, JobError> {
        if self.is_active(job_id) {
            return Err(JobError::AlreadyStarted(job_id));
        }

        match self.repo.find_by_id(job_id).await? {
            Some(job) if job.status == JobStatus::Queued && job.user_id == user_id => Ok(job),
            Some(_) => Err(JobError::AlreadyStarted(job_id)),
            None => self.repo.create(job_id, user_id).await.map_err(|e| match e {
                AppError::Conflict(_) => JobError::AlreadyStarted(job_id),
                other => JobError::from(other),
            }),
        }
    }

    /// Register the job as running and hand out its handle
    pub fn start(&self, job_id: Uuid) -> Result<JobHandle, JobError> {
        let mut active = self.active.lock();
        if active.contains_key(&job_id) {
            return Err(JobError::AlreadyStarted(job_id));
        }

        let cancel = self.shutdown.child_token();
        active.insert(job_id, cancel.clone());

        Ok(JobHandle {
            job_id,
            repo: self.repo.clone(),
            publisher: EventPublisher::new(job_id, self.config.event_capacity),
            cancel,
        })
    }

    pub fn is_active(&self, job_id: Uuid) -> bool {
        self.active.lock().contains_key(&job_id)
    }

    pub fn active_jobs(&self) -> usize {
        self.active.lock().len()
    }

    /// Cancel a running job; false if it is not running here
    pub fn cancel(&self, job_id: Uuid) -> bool {
        match self.active.lock().get(&job_id) {
            Some(token) => {
                tracing::info!(job_id = %job_id, "Cancelling job");
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every running job
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Run a job task in the background, tracked for shutdown
    pub fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tasks.spawn(task);
    }

    /// Cancel every running job and wait up to `grace` for their tasks to
    /// record a terminal status. False if some were still running.
    pub async fn shutdown_and_wait(&self, grace: Duration) -> bool {
        self.shutdown();
        self.tasks.close();

        match tokio::time::timeout(grace, self.tasks.wait()).await {
            Ok(()) => {
                tracing::info!("All jobs stopped");
                true
            }
            Err(_) => {
                tracing::warn!(
                    remaining = self.tasks.len(),
                    grace_secs = grace.as_secs(),
                    "Jobs still running after shutdown grace period"
                );
                false
            }
        }
    }

    /// Supervise `pipeline` until it finishes, fails, is cancelled or hits
    /// the master timeout. Returns the terminal status written to the store.
    pub async fn run<F, Fut>(&self, handle: JobHandle, pipeline: F) -> JobStatus
    where
        F: FnOnce(JobHandle) -> Fut,
        Fut: Future<Output = Result<JobResult, PipelineError>>,
    {
        let job_id = handle.job_id;
        let _registration = Registration {
            active: &self.active,
            job_id,
        };
        let timers = handle.cancel.child_token();
        let recorder_stop = CancellationToken::new();
        // stop the background tasks even if this future is dropped midway
        let _timers_guard = timers.clone().drop_guard();
        let _recorder_guard = recorder_stop.clone().drop_guard();

        let recorder = tokio::spawn(record_events(
            self.repo.clone(),
            handle.publisher.subscribe(),
            recorder_stop.clone(),
        ));
        let heartbeat = tokio::spawn(heartbeat(
            handle.publisher.clone(),
            timers.clone(),
            self.config.heartbeat_interval,
        ));
        let watchdog = tokio::spawn(watchdog(
            handle.publisher.clone(),
            timers.clone(),
            self.config.watchdog_interval,
            self.config.stuck_threshold,
        ));

        let outcome = match handle.advance(JobStatus::Processing, "starting").await {
            Err(err) => Outcome::Finished(Err(err)),
            Ok(()) => {
                let pipeline_handle = handle.clone();
                let pipeline = AssertUnwindSafe(async move { pipeline(pipeline_handle).await }).catch_unwind();
                tokio::select! {
                    biased;
                    _ = handle.cancel.cancelled() => Outcome::Finished(Err(PipelineError::Cancelled)),
                    _ = tokio::time::sleep(self.config.master_timeout) => Outcome::TimedOut,
                    result = pipeline => Outcome::Finished(
                        result.unwrap_or_else(|panic| Err(PipelineError::Panicked(panic_message(&*panic)))),
                    ),
                }
            }
        };
        timers.cancel();

        let update = match outcome {
            Outcome::Finished(Ok(result)) => {
                StatusUpdate::new(JobStatus::Completed, "completed").with_audio_url(result.audio_url)
            }
            Outcome::Finished(Err(PipelineError::Cancelled)) => {
                tracing::warn!(job_id = %job_id, "Job cancelled");
                StatusUpdate::new(JobStatus::Failed, "cancelled")
                    .with_error(PipelineError::Cancelled.to_string())
            }
            Outcome::Finished(Err(err)) => {
                tracing::error!(
                    job_id = %job_id,
                    error_kind = %err.kind(),
                    error = %err,
                    "Job failed"
                );
                StatusUpdate::new(JobStatus::Failed, "failed").with_error(err.to_string())
            }
            Outcome::TimedOut => {
                let last = handle.publisher.snapshot();
                tracing::error!(
                    job_id = %job_id,
                    last_status = %last.status,
                    last_step = %last.step,
                    timeout_secs = self.config.master_timeout.as_secs(),
                    "Job hit master timeout"
                );
                handle.cancel.cancel();
                StatusUpdate::new(JobStatus::Timeout, "timeout").with_error(format!(
                    "master timeout after {}s (last status: {}, step: {})",
                    self.config.master_timeout.as_secs(),
                    last.status,
                    last.step
                ))
            }
        };

        let status = finish(&handle, update).await;

        recorder_stop.cancel();
        let _ = heartbeat.await;
        let _ = watchdog.await;
        if let Err(err) = recorder.await {
            tracing::warn!(job_id = %job_id, error = %err, "Event recorder ended abnormally");
        }

        if status == JobStatus::Timeout && self.config.terminate_on_timeout {
            tracing::error!(job_id = %job_id, "Terminating worker after master timeout");
            std::process::exit(1);
        }

        status
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Write the terminal state. A completion the state machine rejects is
/// recorded as a failure instead.
async fn finish(handle: &JobHandle, update: StatusUpdate) -> JobStatus {
    let update = match handle.transition(update.clone()).await {
        Ok(()) => update,
        Err(PipelineError::InvalidInput(reason)) => {
            let fallback = StatusUpdate::new(JobStatus::Failed, "failed").with_error(reason);
            if let Err(err) = handle.transition(fallback.clone()).await {
                tracing::error!(job_id = %handle.job_id, error = %err, "Failed to record job failure");
            }
            fallback
        }
        Err(err) => {
            tracing::error!(
                job_id = %handle.job_id,
                status = %update.status,
                error = %err,
                "Failed to persist terminal job status"
            );
            update
        }
    };

    handle.publisher.emit(JobEvent::Finished {
        status: update.status,
        error: update.error_message.clone(),
    });
    update.status
}

async fn heartbeat(publisher: EventPublisher, stop: CancellationToken, every: Duration) {
    let mut ticker = tokio::time::interval_at(Instant::now() + every, every);
    loop {
        tokio::select! {
            _ = stop.cancelled() => return,
            _ = ticker.tick() => {
                let snapshot = publisher.snapshot();
                let elapsed_secs = snapshot.started_at.elapsed().as_secs();
                tracing::info!(
                    job_id = %publisher.job_id(),
                    status = %snapshot.status,
                    step = %snapshot.step,
                    percent = snapshot.percent,
                    elapsed_secs = elapsed_secs,
                    "Job heartbeat"
                );
                publisher.emit(JobEvent::Heartbeat {
                    status: snapshot.status,
                    step: snapshot.step,
                    elapsed_secs,
                });
            }
        }
    }
}

async fn watchdog(
    publisher: EventPublisher,
    stop: CancellationToken,
    every: Duration,
    stuck_threshold: Duration,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + every, every);
    loop {
        tokio::select! {
            _ = stop.cancelled() => return,
            _ = ticker.tick() => {
                let snapshot = publisher.snapshot();
                let idle = snapshot.last_progress_at.elapsed();
                if idle >= stuck_threshold {
                    tracing::warn!(
                        job_id = %publisher.job_id(),
                        status = %snapshot.status,
                        step = %snapshot.step,
                        idle_secs = idle.as_secs(),
                        threshold_secs = stuck_threshold.as_secs(),
                        "Job appears stuck"
                    );
                    publisher.emit(JobEvent::Stalled {
                        status: snapshot.status,
                        step: snapshot.step,
                        idle_secs: idle.as_secs(),
                    });
                }
            }
        }
    }
}

/// Persist published events until stopped, then drain whatever is queued
async fn record_events(
    repo: Arc<dyn JobRepository>,
    mut events: broadcast::Receiver<JobNotification>,
    stop: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            received = events.recv() => match received {
                Ok(notification) => record(repo.as_ref(), &notification).await,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped = skipped, "Event recorder lagged, events dropped");
                }
                Err(RecvError::Closed) => return,
            },
            _ = stop.cancelled() => break,
        }
    }

    loop {
        match events.try_recv() {
            Ok(notification) => record(repo.as_ref(), &notification).await,
            Err(TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }
}

async fn record(repo: &dyn JobRepository, notification: &JobNotification) {
    // heartbeats are log-only
    if matches!(notification.event, JobEvent::Heartbeat { .. }) {
        return;
    }

    let payload = match serde_json::to_value(&notification.event) {
        Ok(payload) => payload,
        Err(err) => {
            tracing::warn!(error = %err, "Failed to serialize job event");
            return;
        }
    };

    if let Err(err) = repo
        .append_event(notification.job_id, notification.event.event_type(), payload)
        .await
    {
        tracing::warn!(
            job_id = %notification.job_id,
            event_type = notification.event.event_type(),
            error = %err,
            "Failed to append job event"
        );
    }

    if let JobEvent::Progress { step, percent } = &notification.event {
        if let Err(err) = repo.update_progress(notification.job_id, step, *percent).await {
            tracing::warn!(job_id = %notification.job_id, error = %err, "Failed to update job progress");
        }
    }
}
