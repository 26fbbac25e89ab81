pub mod circuit_breaker;
pub mod error;
pub mod rate_limiter;
pub mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState, OperationType};
pub use error::{classify, ErrorKind, PipelineError, ProviderError};
pub use rate_limiter::{
    estimate_completion_cost, estimate_synthesis_cost, RateLimiter, RateLimiterConfig,
    RateLimiterStats, Reservation,
};
pub use retry::{Backoff, RetryPolicy};
