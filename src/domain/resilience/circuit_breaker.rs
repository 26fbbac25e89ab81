use super::error::PipelineError;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

/// Kinds of outbound work governed by a breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum OperationType {
    AudioSynthesis,
    ScriptGeneration,
    Upload,
}

impl OperationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::AudioSynthesis => "audioSynthesis",
            OperationType::ScriptGeneration => "scriptGeneration",
            OperationType::Upload => "upload",
        }
    }
}

impl std::fmt::Display for OperationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub reset_timeout: Duration,
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    /// Thresholds used for audio synthesis
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(30),
            success_threshold: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CircuitSnapshot {
    pub operation: OperationType,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
}

#[derive(Debug)]
struct Circuit {
    config: CircuitBreakerConfig,
    state: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    last_failure: Option<Instant>,
}

impl Circuit {
    fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            state: CircuitState::Closed,
            consecutive_failures: 0,
            consecutive_successes: 0,
            last_failure: None,
        }
    }

    fn reset_elapsed(&self, now: Instant) -> bool {
        self.last_failure
            .map_or(true, |at| now.saturating_duration_since(at) >= self.config.reset_timeout)
    }
}

/// Per-operation failure isolator with closed, open and half-open states.
///
/// Operations without a configured circuit are always allowed.
#[derive(Debug, Default)]
pub struct CircuitBreaker {
    circuits: Mutex<HashMap<OperationType, Circuit>>,
}

impl CircuitBreaker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_operation(self, operation: OperationType, config: CircuitBreakerConfig) -> Self {
        self.circuits.lock().insert(operation, Circuit::new(config));
        self
    }

    pub fn allow(&self, operation: OperationType) -> bool {
        let mut circuits = self.circuits.lock();
        let Some(circuit) = circuits.get_mut(&operation) else {
            return true;
        };

        match circuit.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                if circuit.reset_elapsed(Instant::now()) {
                    circuit.state = CircuitState::HalfOpen;
                    circuit.consecutive_successes = 0;
                    tracing::info!(operation = %operation, "Circuit half-open, probing recovery");
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn on_success(&self, operation: OperationType) {
        let mut circuits = self.circuits.lock();
        let Some(circuit) = circuits.get_mut(&operation) else {
            return;
        };

        match circuit.state {
            CircuitState::Closed => circuit.consecutive_failures = 0,
            CircuitState::HalfOpen => {
                circuit.consecutive_successes += 1;
                if circuit.consecutive_successes >= circuit.config.success_threshold {
                    circuit.state = CircuitState::Closed;
                    circuit.consecutive_failures = 0;
                    circuit.consecutive_successes = 0;
                    circuit.last_failure = None;
                    tracing::info!(operation = %operation, "Circuit closed after successful trial calls");
                }
            }
            // late result from a call issued before the circuit opened
            CircuitState::Open => {}
        }
    }

    pub fn on_failure(&self, operation: OperationType, error: &PipelineError) {
        let mut circuits = self.circuits.lock();
        let Some(circuit) = circuits.get_mut(&operation) else {
            return;
        };

        circuit.last_failure = Some(Instant::now());
        match circuit.state {
            CircuitState::Closed => {
                circuit.consecutive_failures += 1;
                if circuit.consecutive_failures >= circuit.config.failure_threshold {
                    circuit.state = CircuitState::Open;
                    tracing::warn!(
                        operation = %operation,
                        failures = circuit.consecutive_failures,
                        error = %error,
                        "Circuit opened"
                    );
                }
            }
            CircuitState::HalfOpen => {
                circuit.state = CircuitState::Open;
                circuit.consecutive_successes = 0;
                circuit.consecutive_failures += 1;
                tracing::warn!(
                    operation = %operation,
                    error = %error,
                    "Trial call failed, circuit reopened"
                );
            }
            CircuitState::Open => circuit.consecutive_failures += 1,
        }
    }

    /// Current state; unconfigured operations report closed
    pub fn state(&self, operation: OperationType) -> CircuitState {
        self.circuits
            .lock()
            .get(&operation)
            .map_or(CircuitState::Closed, |c| c.state)
    }

    pub fn snapshot(&self) -> Vec<CircuitSnapshot> {
        let circuits = self.circuits.lock();
        let mut snapshot: Vec<CircuitSnapshot> = circuits
            .iter()
            .map(|(operation, circuit)| CircuitSnapshot {
                operation: *operation,
                state: circuit.state,
                consecutive_failures: circuit.consecutive_failures,
                consecutive_successes: circuit.consecutive_successes,
            })
            .collect();
        snapshot.sort_by_key(|s| s.operation.as_str());
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new().with_operation(
            OperationType::AudioSynthesis,
            CircuitBreakerConfig {
                failure_threshold: 3,
                reset_timeout: Duration::from_secs(30),
                success_threshold: 2,
            },
        )
    }

    fn failure() -> PipelineError {
        PipelineError::Timeout(Duration::from_secs(60))
    }

    #[tokio::test(start_paused = true)]
    async fn test_opens_after_threshold_consecutive_failures() {
        let breaker = breaker();
        let op = OperationType::AudioSynthesis;

        breaker.on_failure(op, &failure());
        breaker.on_failure(op, &failure());
        assert_eq!(breaker.state(op), CircuitState::Closed);
        assert!(breaker.allow(op));

        breaker.on_failure(op, &failure());
        assert_eq!(breaker.state(op), CircuitState::Open);
        assert!(!breaker.allow(op));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets_failure_streak_while_closed() {
        let breaker = breaker();
        let op = OperationType::AudioSynthesis;

        breaker.on_failure(op, &failure());
        breaker.on_failure(op, &failure());
        breaker.on_success(op);
        breaker.on_failure(op, &failure());
        breaker.on_failure(op, &failure());
        assert_eq!(breaker.state(op), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_after_reset_timeout() {
        let breaker = breaker();
        let op = OperationType::AudioSynthesis;
        for _ in 0..3 {
            breaker.on_failure(op, &failure());
        }

        tokio::time::advance(Duration::from_secs(29)).await;
        assert!(!breaker.allow(op));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(breaker.allow(op));
        assert_eq!(breaker.state(op), CircuitState::HalfOpen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_failure_reopens_immediately() {
        let breaker = breaker();
        let op = OperationType::AudioSynthesis;
        for _ in 0..3 {
            breaker.on_failure(op, &failure());
        }
        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(breaker.allow(op));

        breaker.on_success(op);
        breaker.on_failure(op, &failure());
        assert_eq!(breaker.state(op), CircuitState::Open);
        assert!(!breaker.allow(op));
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_successes_close_circuit() {
        let breaker = breaker();
        let op = OperationType::AudioSynthesis;
        for _ in 0..3 {
            breaker.on_failure(op, &failure());
        }
        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(breaker.allow(op));

        breaker.on_success(op);
        assert_eq!(breaker.state(op), CircuitState::HalfOpen);
        breaker.on_success(op);
        assert_eq!(breaker.state(op), CircuitState::Closed);

        let snapshot = breaker.snapshot();
        assert_eq!(snapshot[0].consecutive_failures, 0);
        assert_eq!(snapshot[0].consecutive_successes, 0);
    }

    #[test]
    fn test_unconfigured_operation_always_allowed() {
        let breaker = breaker();
        let op = OperationType::ScriptGeneration;
        for _ in 0..100 {
            breaker.on_failure(op, &failure());
        }
        assert!(breaker.allow(op));
        assert_eq!(breaker.state(op), CircuitState::Closed);
    }
}
