//! Circuit breaker for external service calls.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: service assumed down, calls fail fast
//! - Half-Open: a single trial call probes for recovery
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive_failures >= error_threshold
//! Open → Half-Open: reset_timeout elapsed since last failure (next caller wins the trial)
//! Half-Open → Closed: trial call succeeds
//! Half-Open → Open: trial call fails (a single failure is enough)
//! ```
//!
//! # Design Decisions
//! - One breaker per named service, shared by every caller of that service
//! - State, failure count and last failure time live behind one mutex
//! - Fail fast in Open state (the operation is never invoked)
//! - Single trial in Half-Open; concurrent callers are rejected until it resolves
//! - Every admitted call records exactly one outcome, even when it times out

use std::fmt;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::observability::metrics;
use crate::resilience::timeouts::{run_with_deadline, DeadlineOutcome};

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half-open",
        }
    }

    /// Gauge encoding: 0 closed, 1 half-open, 2 open.
    pub fn gauge_value(&self) -> f64 {
        match self {
            CircuitState::Closed => 0.0,
            CircuitState::HalfOpen => 1.0,
            CircuitState::Open => 2.0,
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Breaker configuration, fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerConfig {
    /// Deadline for a single call.
    pub timeout: Duration,
    /// Consecutive failures that open the circuit.
    pub error_threshold: u32,
    /// Time after the last failure before a trial call is allowed.
    pub reset_timeout: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(10_000),
            error_threshold: 5,
            reset_timeout: Duration::from_millis(30_000),
        }
    }
}

impl BreakerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_error_threshold(mut self, threshold: u32) -> Self {
        self.error_threshold = threshold;
        self
    }

    pub fn with_reset_timeout(mut self, reset_timeout: Duration) -> Self {
        self.reset_timeout = reset_timeout;
        self
    }

    /// Apply the fields set in `overrides` on top of this config.
    pub fn merged(mut self, overrides: &BreakerOverrides) -> Self {
        if let Some(ms) = overrides.timeout_ms {
            self.timeout = Duration::from_millis(ms);
        }
        if let Some(threshold) = overrides.error_threshold {
            self.error_threshold = threshold;
        }
        if let Some(ms) = overrides.reset_timeout_ms {
            self.reset_timeout = Duration::from_millis(ms);
        }
        self
    }
}

/// Partial breaker settings, merged over a base [`BreakerConfig`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct BreakerOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_threshold: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset_timeout_ms: Option<u64>,
}

impl BreakerOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timeout_ms(mut self, ms: u64) -> Self {
        self.timeout_ms = Some(ms);
        self
    }

    pub fn error_threshold(mut self, threshold: u32) -> Self {
        self.error_threshold = Some(threshold);
        self
    }

    pub fn reset_timeout_ms(mut self, ms: u64) -> Self {
        self.reset_timeout_ms = Some(ms);
        self
    }

    /// Copy every field set in `other` over this one.
    pub fn overlay(&mut self, other: &BreakerOverrides) {
        if other.timeout_ms.is_some() {
            self.timeout_ms = other.timeout_ms;
        }
        if other.error_threshold.is_some() {
            self.error_threshold = other.error_threshold;
        }
        if other.reset_timeout_ms.is_some() {
            self.reset_timeout_ms = other.reset_timeout_ms;
        }
    }
}

/// Error returned by [`CircuitBreaker::execute`].
#[derive(Debug, thiserror::Error)]
pub enum BreakerError<E> {
    /// The breaker refused the call without invoking the operation.
    #[error("Circuit breaker is open for {name}")]
    Open { name: String },

    /// The operation did not finish within the breaker's deadline.
    #[error("Request to {name} timed out after {}ms", .timeout.as_millis())]
    Timeout { name: String, timeout: Duration },

    /// The operation's own error, unchanged.
    #[error("{0}")]
    Operation(E),
}

impl<E> BreakerError<E> {
    pub fn is_open(&self) -> bool {
        matches!(self, BreakerError::Open { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, BreakerError::Timeout { .. })
    }

    /// The operation's error, if that is what failed the call.
    pub fn into_operation(self) -> Option<E> {
        match self {
            BreakerError::Operation(e) => Some(e),
            _ => None,
        }
    }
}

/// Point-in-time view of a breaker, for health and admin reporting.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub name: String,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub error_threshold: u32,
    pub timeout_ms: u64,
    pub reset_timeout_ms: u64,
    /// Milliseconds since the last recorded failure.
    pub last_failure_ago_ms: Option<u64>,
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    last_failure: Option<Instant>,
}

/// How a call got past the admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    /// Admitted while Closed.
    Normal,
    /// The single Half-Open trial.
    Trial,
}

#[derive(Debug, Clone, Copy)]
enum Outcome {
    Success,
    Failed,
    TimedOut,
}

impl Outcome {
    fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Failed => "failure",
            Outcome::TimedOut => "timeout",
        }
    }
}

/// Circuit breaker guarding calls to one named service.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    /// Create a closed breaker. A zero threshold is raised to 1.
    pub fn new(name: impl Into<String>, mut config: BreakerConfig) -> Self {
        config.error_threshold = config.error_threshold.max(1);
        let name = name.into();
        metrics::record_breaker_state(&name, CircuitState::Closed);

        Self {
            name,
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                last_failure: None,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.lock().consecutive_failures
    }

    /// Read-only view; never moves an expired Open breaker to Half-Open.
    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.lock();
        BreakerSnapshot {
            name: self.name.clone(),
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            error_threshold: self.config.error_threshold,
            timeout_ms: self.config.timeout.as_millis() as u64,
            reset_timeout_ms: self.config.reset_timeout.as_millis() as u64,
            last_failure_ago_ms: inner
                .last_failure
                .map(|at| at.elapsed().as_millis() as u64),
        }
    }

    /// Run `operation` through the breaker.
    ///
    /// Fails with [`BreakerError::Open`] without calling `operation` while the
    /// circuit is open. Otherwise the operation runs on its own task under the
    /// configured deadline; a late result after [`BreakerError::Timeout`] is
    /// discarded. A panic in the operation counts as a failure and is resumed
    /// on the caller.
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let Some(admission) = self.admit() else {
            metrics::record_breaker_call(&self.name, "rejected");
            tracing::debug!(breaker = %self.name, "Circuit open, rejecting call");
            return Err(BreakerError::Open {
                name: self.name.clone(),
            });
        };

        let permit = Permit::new(self, admission);
        let started = Instant::now();
        let outcome = run_with_deadline(self.config.timeout, operation()).await;
        metrics::record_call_duration(&self.name, started.elapsed());

        match outcome {
            DeadlineOutcome::Completed(Ok(value)) => {
                permit.settle(Outcome::Success);
                Ok(value)
            }
            DeadlineOutcome::Completed(Err(e)) => {
                permit.settle(Outcome::Failed);
                Err(BreakerError::Operation(e))
            }
            DeadlineOutcome::Panicked(payload) => {
                permit.settle(Outcome::Failed);
                std::panic::resume_unwind(payload)
            }
            // Cancelled only happens while the runtime shuts down; the result
            // will never arrive, which is a timeout from the caller's side.
            DeadlineOutcome::Cancelled | DeadlineOutcome::Elapsed => {
                permit.settle(Outcome::TimedOut);
                Err(BreakerError::Timeout {
                    name: self.name.clone(),
                    timeout: self.config.timeout,
                })
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Critical sections never panic midway, so a poisoned guard still
        // holds consistent state.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Decide whether a call may proceed. `None` means fail fast.
    fn admit(&self) -> Option<Admission> {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => Some(Admission::Normal),
            CircuitState::Open => {
                let reset_due = inner
                    .last_failure
                    .map_or(true, |at| at.elapsed() >= self.config.reset_timeout);
                if reset_due {
                    self.transition(&mut inner, CircuitState::HalfOpen);
                    Some(Admission::Trial)
                } else {
                    None
                }
            }
            CircuitState::HalfOpen => None,
        }
    }

    fn record(&self, admission: Admission, outcome: Outcome) {
        let mut inner = self.lock();
        metrics::record_breaker_call(&self.name, outcome.as_str());

        if let Outcome::Success = outcome {
            match (admission, inner.state) {
                (Admission::Trial, _) | (Admission::Normal, CircuitState::Closed) => {
                    inner.consecutive_failures = 0;
                    inner.last_failure = None;
                    self.transition(&mut inner, CircuitState::Closed);
                }
                (Admission::Normal, state) => {
                    // Admitted before the circuit opened; only the trial may close it.
                    tracing::debug!(breaker = %self.name, state = %state, "Ignoring stale success");
                }
            }
            return;
        }

        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
        inner.last_failure = Some(Instant::now());

        tracing::warn!(
            breaker = %self.name,
            failures = inner.consecutive_failures,
            threshold = self.config.error_threshold,
            cause = outcome.as_str(),
            "Breaker call failed"
        );

        let opens = match (admission, inner.state) {
            (Admission::Trial, _) => true,
            (Admission::Normal, CircuitState::Closed) => {
                inner.consecutive_failures >= self.config.error_threshold
            }
            _ => false,
        };
        if opens {
            self.transition(&mut inner, CircuitState::Open);
        }
    }

    /// The trial was dropped before it finished; let the next caller retry it.
    fn release_trial(&self) {
        let mut inner = self.lock();
        if inner.state == CircuitState::HalfOpen {
            tracing::warn!(breaker = %self.name, "Trial call abandoned, reopening circuit");
            self.transition(&mut inner, CircuitState::Open);
        }
    }

    fn transition(&self, inner: &mut Inner, to: CircuitState) {
        if inner.state == to {
            return;
        }
        let from = inner.state;
        inner.state = to;

        tracing::info!(
            breaker = %self.name,
            from = %from,
            to = %to,
            failures = inner.consecutive_failures,
            "Circuit state changed"
        );
        metrics::record_breaker_transition(&self.name, to);
    }
}

/// Tracks one admitted call until its outcome is recorded.
struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    admission: Admission,
    settled: bool,
}

impl<'a> Permit<'a> {
    fn new(breaker: &'a CircuitBreaker, admission: Admission) -> Self {
        Self {
            breaker,
            admission,
            settled: false,
        }
    }

    fn settle(mut self, outcome: Outcome) {
        self.settled = true;
        self.breaker.record(self.admission, outcome);
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if !self.settled && self.admission == Admission::Trial {
            self.breaker.release_trial();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_config(threshold: u32) -> BreakerConfig {
        BreakerConfig::new()
            .with_timeout(Duration::from_millis(50))
            .with_error_threshold(threshold)
            .with_reset_timeout(Duration::from_millis(100))
    }

    async fn fail(cb: &CircuitBreaker) -> BreakerError<&'static str> {
        cb.execute(|| async { Err::<(), _>("boom") }).await.unwrap_err()
    }

    #[test]
    fn test_config_defaults() {
        let config = BreakerConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert_eq!(config.error_threshold, 5);
        assert_eq!(config.reset_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_overrides_merge_only_set_fields() {
        let merged = BreakerConfig::default()
            .merged(&BreakerOverrides::new().timeout_ms(30_000).error_threshold(3));
        assert_eq!(merged.timeout, Duration::from_secs(30));
        assert_eq!(merged.error_threshold, 3);
        assert_eq!(merged.reset_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_zero_threshold_is_raised() {
        let cb = CircuitBreaker::new("zero", BreakerConfig::new().with_error_threshold(0));
        assert_eq!(cb.config().error_threshold, 1);
    }

    #[test]
    fn test_initial_snapshot() {
        let cb = CircuitBreaker::new("svc", BreakerConfig::default());
        let snap = cb.snapshot();
        assert_eq!(snap.name, "svc");
        assert_eq!(snap.state, CircuitState::Closed);
        assert_eq!(snap.consecutive_failures, 0);
        assert_eq!(snap.timeout_ms, 10_000);
        assert!(snap.last_failure_ago_ms.is_none());
    }

    #[tokio::test]
    async fn test_success_resets_failures() {
        let cb = CircuitBreaker::new("svc", fast_config(5));
        fail(&cb).await;
        fail(&cb).await;
        assert_eq!(cb.consecutive_failures(), 2);
        assert!(cb.snapshot().last_failure_ago_ms.is_some());

        let value = cb.execute(|| async { Ok::<_, &str>(42) }).await.unwrap();
        assert_eq!(value, 42);
        assert_eq!(cb.consecutive_failures(), 0);
        assert!(cb.snapshot().last_failure_ago_ms.is_none());
    }

    #[tokio::test]
    async fn test_closed_stays_below_threshold() {
        let cb = CircuitBreaker::new("svc", fast_config(3));
        for expected in 1..3 {
            fail(&cb).await;
            assert_eq!(cb.state(), CircuitState::Closed);
            assert_eq!(cb.consecutive_failures(), expected);
        }
        fail(&cb).await;
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn test_operation_error_is_propagated_unchanged() {
        let cb = CircuitBreaker::new("svc", fast_config(5));
        let err = fail(&cb).await;
        assert_eq!(err.into_operation(), Some("boom"));
    }

    #[tokio::test]
    async fn test_timeout_counts_once() {
        let cb = CircuitBreaker::new("svc", fast_config(5));
        let err = cb
            .execute(|| async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok::<_, &str>(())
            })
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(cb.consecutive_failures(), 1);

        // Well past the point the slow call would have succeeded.
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(cb.consecutive_failures(), 1);
        assert!(cb.snapshot().last_failure_ago_ms.is_some());
    }

    #[tokio::test]
    async fn test_open_does_not_invoke_operation() {
        let cb = CircuitBreaker::new("svc", fast_config(1));
        fail(&cb).await;
        assert_eq!(cb.state(), CircuitState::Open);

        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let err = cb
            .execute(move || {
                c.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, &str>(()) }
            })
            .await
            .unwrap_err();
        assert!(err.is_open());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(cb.consecutive_failures(), 1, "rejections are not failures");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_half_open_admits_single_trial() {
        const CALLERS: u32 = 32;

        for round in 0..20 {
            let cb = Arc::new(CircuitBreaker::new(
                "svc",
                BreakerConfig::new()
                    .with_timeout(Duration::from_secs(5))
                    .with_error_threshold(1)
                    .with_reset_timeout(Duration::from_millis(10)),
            ));
            fail(&cb).await;
            tokio::time::sleep(Duration::from_millis(20)).await;

            let calls = Arc::new(AtomicU32::new(0));
            let rejected = Arc::new(AtomicU32::new(0));
            let release = Arc::new(tokio::sync::Notify::new());
            let barrier = Arc::new(tokio::sync::Barrier::new(CALLERS as usize));

            let handles: Vec<_> = (0..CALLERS)
                .map(|_| {
                    let cb = cb.clone();
                    let calls = calls.clone();
                    let rejected = rejected.clone();
                    let release = release.clone();
                    let barrier = barrier.clone();
                    tokio::spawn(async move {
                        barrier.wait().await;
                        let result = cb
                            .execute(move || async move {
                                calls.fetch_add(1, Ordering::SeqCst);
                                release.notified().await;
                                Ok::<_, &str>(())
                            })
                            .await;
                        if let Err(e) = &result {
                            assert!(e.is_open());
                            rejected.fetch_add(1, Ordering::SeqCst);
                        }
                        result
                    })
                })
                .collect();

            // The trial holds until every other caller has been turned away.
            tokio::time::timeout(Duration::from_secs(2), async {
                while rejected.load(Ordering::SeqCst) < CALLERS - 1 {
                    tokio::time::sleep(Duration::from_millis(1)).await;
                }
            })
            .await
            .unwrap_or_else(|_| panic!("round {round}: more than one trial admitted"));
            release.notify_one();

            for handle in handles {
                let _ = handle.await.unwrap();
            }
            assert_eq!(calls.load(Ordering::SeqCst), 1, "round {round}");
            assert_eq!(rejected.load(Ordering::SeqCst), CALLERS - 1, "round {round}");
            assert_eq!(cb.state(), CircuitState::Closed);
        }
    }

    #[tokio::test]
    async fn test_dropped_trial_reopens() {
        let cb = CircuitBreaker::new("svc", fast_config(1).with_timeout(Duration::from_secs(5)));
        fail(&cb).await;
        tokio::time::sleep(Duration::from_millis(150)).await;

        let trial = cb.execute(|| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, &str>(())
        });
        let abandoned = tokio::time::timeout(Duration::from_millis(20), trial).await;
        assert!(abandoned.is_err());
        assert_eq!(cb.state(), CircuitState::Open);

        // The reset window had already elapsed, so the next call is a trial.
        cb.execute(|| async { Ok::<_, &str>(()) }).await.unwrap();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_stale_success_does_not_close() {
        let cb = Arc::new(CircuitBreaker::new(
            "svc",
            fast_config(1).with_timeout(Duration::from_secs(1)),
        ));

        let slow = {
            let cb = cb.clone();
            tokio::spawn(async move {
                cb.execute(|| async {
                    tokio::time::sleep(Duration::from_millis(60)).await;
                    Ok::<_, &str>(())
                })
                .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        fail(&cb).await;
        assert_eq!(cb.state(), CircuitState::Open);

        slow.await.unwrap().unwrap();
        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(cb.consecutive_failures(), 1);
    }

    #[test]
    fn test_state_labels() {
        assert_eq!(CircuitState::HalfOpen.to_string(), "half-open");
        assert_eq!(
            serde_json::to_string(&CircuitState::HalfOpen).unwrap(),
            "\"half-open\""
        );
    }
}
