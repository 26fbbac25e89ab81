use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use std::time::Duration;

static RETRY_AFTER_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:try again in|retry after|retry-after:?)\s*(\d+(?:\.\d+)?)\s*(ms|s|sec|secs|seconds)?")
        .expect("retry-after pattern is valid")
});

/// Failure categories used for retry decisions and the job event log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Network,
    Timeout,
    RateLimit,
    ApiError,
    Memory,
    SegmentationFailure,
    AssemblyMismatch,
    Cancelled,
    Unknown,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Network => "network",
            ErrorKind::Timeout => "timeout",
            ErrorKind::RateLimit => "rate_limit",
            ErrorKind::ApiError => "api_error",
            ErrorKind::Memory => "memory",
            ErrorKind::SegmentationFailure => "segmentation_failure",
            ErrorKind::AssemblyMismatch => "assembly_mismatch",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error reported by a downstream collaborator (completion, synthesis, storage)
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderError {
    pub status: Option<u16>,
    pub code: Option<String>,
    pub message: String,
    pub retry_after: Option<Duration>,
}

impl ProviderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: None,
            code: None,
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }

    pub fn kind(&self) -> ErrorKind {
        classify(self.status, self.code.as_deref(), &self.message)
    }

    /// Provider-suggested wait, either explicit or parsed from the message
    pub fn retry_after_hint(&self) -> Option<Duration> {
        self.retry_after.or_else(|| parse_retry_after(&self.message))
    }
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status {
            Some(status) => write!(f, "[{}] {}", status, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for ProviderError {}

/// Errors raised inside the synthesis pipeline
#[derive(Debug, Clone, thiserror::Error)]
pub enum PipelineError {
    #[error("provider error: {0}")]
    Provider(ProviderError),
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),
    #[error("circuit open for {0}")]
    CircuitOpen(String),
    #[error("requested cost {requested} exceeds limiter capacity {capacity}")]
    CapacityExceeded { requested: u32, capacity: u32 },
    #[error("job cancelled")]
    Cancelled,
    #[error("segmentation failed: {0}")]
    Segmentation(String),
    #[error("assembled audio size mismatch: expected {expected} bytes, got {actual}")]
    AssemblyMismatch { expected: usize, actual: usize },
    #[error("upload failed: {0}")]
    Upload(String),
    #[error("job store error: {0}")]
    Store(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("pipeline panicked: {0}")]
    Panicked(String),
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Provider(e) => e.kind(),
            PipelineError::Timeout(_) => ErrorKind::Timeout,
            PipelineError::CircuitOpen(_) => ErrorKind::ApiError,
            PipelineError::CapacityExceeded { .. } => ErrorKind::RateLimit,
            PipelineError::Cancelled => ErrorKind::Cancelled,
            PipelineError::Segmentation(_) => ErrorKind::SegmentationFailure,
            PipelineError::AssemblyMismatch { .. } => ErrorKind::AssemblyMismatch,
            PipelineError::Upload(msg) | PipelineError::Store(msg) => classify(None, None, msg),
            PipelineError::InvalidInput(_) | PipelineError::Panicked(_) => ErrorKind::Unknown,
        }
    }

    pub fn is_rate_limit(&self) -> bool {
        self.kind() == ErrorKind::RateLimit
    }

    pub fn retry_after_hint(&self) -> Option<Duration> {
        match self {
            PipelineError::Provider(e) => e.retry_after_hint(),
            _ => None,
        }
    }
}

impl From<ProviderError> for PipelineError {
    fn from(err: ProviderError) -> Self {
        PipelineError::Provider(err)
    }
}

/// Classify a downstream failure by status code, provider code and message text
pub fn classify(status: Option<u16>, code: Option<&str>, message: &str) -> ErrorKind {
    if status == Some(429) {
        return ErrorKind::RateLimit;
    }

    let code = code.map(str::to_lowercase).unwrap_or_default();
    if code.contains("rate_limit") || code.contains("throttl") || code.contains("quota") {
        return ErrorKind::RateLimit;
    }

    let message = message.to_lowercase();
    let matches = |patterns: &[&str]| patterns.iter().any(|p| message.contains(p));

    if matches(&["rate limit", "rate_limit", "ratelimit", "too many requests", "429", "throttl", "quota exceeded"]) {
        ErrorKind::RateLimit
    } else if status == Some(408) || status == Some(504) || matches(&["timed out", "timeout", "deadline exceeded"]) {
        ErrorKind::Timeout
    } else if matches(&["out of memory", "allocation failed", "memory limit"]) {
        ErrorKind::Memory
    } else if matches(&[
        "connection",
        "network",
        "dns",
        "econnreset",
        "econnrefused",
        "socket",
        "broken pipe",
        "unreachable",
    ]) {
        ErrorKind::Network
    } else if status.is_some_and(|s| s >= 400) || matches(&["api error", "invalid request", "bad request", "unauthorized", "status"]) {
        ErrorKind::ApiError
    } else {
        ErrorKind::Unknown
    }
}

/// Parse hints such as "Please try again in 20s" or "try again in 450ms"
pub fn parse_retry_after(message: &str) -> Option<Duration> {
    let captures = RETRY_AFTER_PATTERN.captures(message)?;
    let value: f64 = captures.get(1)?.as_str().parse().ok()?;
    let millis = match captures.get(2).map(|m| m.as_str().to_lowercase()) {
        Some(unit) if unit == "ms" => value,
        _ => value * 1000.0,
    };
    Some(Duration::from_millis(millis.round() as u64))
}
