use super::error::PipelineError;
use super::retry::{Backoff, RetryPolicy};
use parking_lot::Mutex;
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Shortest wait handed out on denial, so callers never spin
const MIN_DENIAL_WAIT: Duration = Duration::from_millis(10);

#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    pub max_requests_per_minute: u32,
    pub max_tokens_per_minute: u32,
    /// Backoff floor after a provider rate-limit response
    pub min_backoff: Duration,
    /// Backoff ceiling; doubling stops here
    pub max_backoff: Duration,
    /// Fixed wait after a non rate-limit failure
    pub error_delay: Duration,
    /// Attempts for callers without a retry policy of their own
    pub max_attempts: u32,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            max_requests_per_minute: 50,
            max_tokens_per_minute: 40_000,
            min_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
            error_delay: Duration::from_secs(1),
            max_attempts: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reservation {
    Granted,
    Denied { retry_in: Duration },
}

#[derive(Debug, Clone, Serialize)]
pub struct RateLimiterStats {
    pub available_requests: f64,
    pub available_tokens: f64,
    pub current_backoff_ms: u64,
    pub successes: u64,
    pub failures: u64,
    pub rate_limit_hits: u64,
    pub denials: u64,
}

#[derive(Debug)]
struct Buckets {
    requests: f64,
    tokens: f64,
    last_refill: Instant,
    backoff: Duration,
}

impl Buckets {
    /// available = min(max, available + max * elapsed / 60)
    fn refill(&mut self, now: Instant, max_requests: f64, max_tokens: f64) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        if elapsed <= 0.0 {
            return;
        }
        self.requests = (self.requests + max_requests * elapsed / 60.0).min(max_requests);
        self.tokens = (self.tokens + max_tokens * elapsed / 60.0).min(max_tokens);
        self.last_refill = now;
    }
}

/// Token-bucket governor for outbound completion and synthesis calls.
///
/// Tracks two buckets refilled continuously over a one-minute window: a
/// request-count bucket and a token (cost) bucket. One instance is shared
/// by every job in the process to enforce a global ceiling on provider
/// traffic.
pub struct RateLimiter {
    config: RateLimiterConfig,
    state: Mutex<Buckets>,
    successes: AtomicU64,
    failures: AtomicU64,
    rate_limit_hits: AtomicU64,
    denials: AtomicU64,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        let config = RateLimiterConfig {
            max_requests_per_minute: config.max_requests_per_minute.max(1),
            max_tokens_per_minute: config.max_tokens_per_minute.max(1),
            max_attempts: config.max_attempts.max(1),
            ..config
        };
        let state = Buckets {
            requests: config.max_requests_per_minute as f64,
            tokens: config.max_tokens_per_minute as f64,
            last_refill: Instant::now(),
            backoff: config.min_backoff,
        };

        Self {
            config,
            state: Mutex::new(state),
            successes: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            rate_limit_hits: AtomicU64::new(0),
            denials: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &RateLimiterConfig {
        &self.config
    }

    fn max_requests(&self) -> f64 {
        self.config.max_requests_per_minute as f64
    }

    fn max_tokens(&self) -> f64 {
        self.config.max_tokens_per_minute as f64
    }

    /// Reserve one request plus `cost` tokens if both buckets can cover it
    pub fn try_reserve(&self, cost: u32) -> Reservation {
        self.try_reserve_at(cost, Instant::now())
    }

    fn try_reserve_at(&self, cost: u32, now: Instant) -> Reservation {
        let cost = cost as f64;
        let mut state = self.state.lock();
        state.refill(now, self.max_requests(), self.max_tokens());

        if state.requests >= 1.0 && state.tokens >= cost {
            state.requests -= 1.0;
            state.tokens -= cost;
            return Reservation::Granted;
        }

        self.denials.fetch_add(1, Ordering::Relaxed);

        let request_deficit = (1.0 - state.requests).max(0.0);
        let token_deficit = (cost - state.tokens).max(0.0);
        let request_wait = request_deficit * 60.0 / self.max_requests();
        let token_wait = token_deficit * 60.0 / self.max_tokens();
        let retry_in = Duration::from_secs_f64(request_wait.max(token_wait)).max(MIN_DENIAL_WAIT);

        Reservation::Denied { retry_in }
    }

    /// Wait until a reservation for `cost` is granted
    pub async fn acquire(&self, cost: u32, cancel: &CancellationToken) -> Result<(), PipelineError> {
        if cost > self.config.max_tokens_per_minute {
            return Err(PipelineError::CapacityExceeded {
                requested: cost,
                capacity: self.config.max_tokens_per_minute,
            });
        }

        loop {
            match self.try_reserve(cost) {
                Reservation::Granted => return Ok(()),
                Reservation::Denied { retry_in } => {
                    tracing::debug!(
                        cost = cost,
                        retry_in_ms = retry_in.as_millis() as u64,
                        "Rate limiter capacity exhausted, waiting"
                    );
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(PipelineError::Cancelled),
                        _ = tokio::time::sleep(retry_in) => {}
                    }
                }
            }
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }

    /// Perform `call` once capacity is reserved, making up to
    /// `max_attempts` calls in total and retrying on provider rate-limit
    /// responses and transient failures. Callers that run their own retry
    /// policy pass 1.
    pub async fn execute<T, F, Fut>(
        &self,
        cost: u32,
        max_attempts: u32,
        cancel: &CancellationToken,
        mut call: F,
    ) -> Result<T, PipelineError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, PipelineError>>,
    {
        let policy = RetryPolicy::new(
            "rate_limiter",
            max_attempts,
            Backoff::Fixed(self.config.error_delay),
        );

        policy
            .run_with_backoff(
                cancel,
                |_, err| self.backoff_after(err),
                |_| {
                    let pending = call();
                    async move {
                        self.acquire(cost, cancel).await?;
                        let result = pending.await;
                        self.record(&result);
                        result
                    }
                },
            )
            .await
    }

    fn record<T>(&self, result: &Result<T, PipelineError>) {
        match result {
            Ok(_) => {
                self.successes.fetch_add(1, Ordering::Relaxed);
                self.state.lock().backoff = self.config.min_backoff;
            }
            Err(PipelineError::Cancelled) => {}
            Err(err) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                if err.is_rate_limit() {
                    self.rate_limit_hits.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(error = %err, "Provider rate limit hit");
                }
            }
        }
    }

    /// Wait before the next attempt. Rate-limit responses wait
    /// max(backoff, provider hint) and double the backoff; anything else
    /// waits the fixed error delay and resets the backoff to its floor.
    fn backoff_after(&self, err: &PipelineError) -> Duration {
        let mut state = self.state.lock();
        if err.is_rate_limit() {
            let wait = err
                .retry_after_hint()
                .map_or(state.backoff, |hint| hint.max(state.backoff));
            state.backoff = state
                .backoff
                .saturating_mul(2)
                .min(self.config.max_backoff);
            wait
        } else {
            state.backoff = self.config.min_backoff;
            self.config.error_delay
        }
    }

    pub fn stats(&self) -> RateLimiterStats {
        let mut state = self.state.lock();
        state.refill(Instant::now(), self.max_requests(), self.max_tokens());

        RateLimiterStats {
            available_requests: state.requests,
            available_tokens: state.tokens,
            current_backoff_ms: state.backoff.as_millis() as u64,
            successes: self.successes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            rate_limit_hits: self.rate_limit_hits.load(Ordering::Relaxed),
            denials: self.denials.load(Ordering::Relaxed),
        }
    }
}

/// Cost of a text-generation call: serialized prompt length / 4 plus the output ceiling
pub fn estimate_completion_cost(serialized_prompt_len: usize, max_output_tokens: u32) -> u32 {
    let prompt_tokens = u32::try_from(serialized_prompt_len / 4).unwrap_or(u32::MAX);
    prompt_tokens.saturating_add(max_output_tokens)
}

/// Cost of a speech-synthesis call: input length / 4, no output cost
pub fn estimate_synthesis_cost(text: &str) -> u32 {
    u32::try_from(text.len() / 4).unwrap_or(u32::MAX)
}
