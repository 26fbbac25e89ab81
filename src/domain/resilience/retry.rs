use super::error::PipelineError;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Delay schedule between attempts. `attempt` is the 1-based attempt that just failed.
#[derive(Debug, Clone, PartialEq)]
pub enum Backoff {
    Fixed(Duration),
    Linear { step: Duration },
    Exponential { initial: Duration, max: Duration },
}

impl Backoff {
    pub fn delay(&self, attempt: u32) -> Duration {
        match self {
            Backoff::Fixed(delay) => *delay,
            Backoff::Linear { step } => step.saturating_mul(attempt.max(1)),
            Backoff::Exponential { initial, max } => {
                let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
                initial.saturating_mul(factor).min(*max)
            }
        }
    }
}

/// Decides whether an error is worth another attempt
pub type RetryPredicate = fn(&PipelineError) -> bool;

/// Cancellation and open circuits never benefit from retrying
pub fn default_retryable(err: &PipelineError) -> bool {
    !matches!(
        err,
        PipelineError::Cancelled
            | PipelineError::CircuitOpen(_)
            | PipelineError::CapacityExceeded { .. }
            | PipelineError::InvalidInput(_)
            | PipelineError::Panicked(_)
    )
}

/// Shared retry policy used by the rate limiter, audio synthesis and uploads
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    name: &'static str,
    max_attempts: u32,
    backoff: Backoff,
    retryable: RetryPredicate,
}

impl RetryPolicy {
    pub fn new(name: &'static str, max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            name,
            max_attempts: max_attempts.max(1),
            backoff,
            retryable: default_retryable,
        }
    }

    pub fn exponential(name: &'static str, max_attempts: u32, initial: Duration, max: Duration) -> Self {
        Self::new(name, max_attempts, Backoff::Exponential { initial, max })
    }

    pub fn linear(name: &'static str, max_attempts: u32, step: Duration) -> Self {
        Self::new(name, max_attempts, Backoff::Linear { step })
    }

    pub fn with_predicate(mut self, retryable: RetryPredicate) -> Self {
        self.retryable = retryable;
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    pub fn should_retry(&self, err: &PipelineError, attempt: u32) -> bool {
        attempt < self.max_attempts && (self.retryable)(err)
    }

    /// Run `op` until it succeeds, the policy gives up, or `cancel` fires.
    pub async fn run<T, F, Fut>(&self, cancel: &CancellationToken, op: F) -> Result<T, PipelineError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, PipelineError>>,
    {
        let backoff = self.backoff.clone();
        self.run_with_backoff(cancel, move |attempt, _| backoff.delay(attempt), op)
            .await
    }

    /// Like [`RetryPolicy::run`] but the caller computes each delay, e.g. from
    /// provider retry-after hints or limiter state.
    pub async fn run_with_backoff<T, F, Fut, B>(
        &self,
        cancel: &CancellationToken,
        mut delay_for: B,
        mut op: F,
    ) -> Result<T, PipelineError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, PipelineError>>,
        B: FnMut(u32, &PipelineError) -> Duration,
    {
        let mut attempt = 1;
        loop {
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(PipelineError::Cancelled),
                result = op(attempt) => result,
            };

            let err = match result {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !self.should_retry(&err, attempt) {
                if attempt > 1 {
                    tracing::warn!(
                        policy = self.name,
                        attempts = attempt,
                        error = %err,
                        "Giving up after retries"
                    );
                }
                return Err(err);
            }

            let delay = delay_for(attempt, &err);
            tracing::debug!(
                policy = self.name,
                attempt = attempt,
                max_attempts = self.max_attempts,
                delay_ms = delay.as_millis() as u64,
                error_kind = %err.kind(),
                error = %err,
                "Attempt failed, backing off"
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(PipelineError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
            attempt += 1;
        }
    }
}
