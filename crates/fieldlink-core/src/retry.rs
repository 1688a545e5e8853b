// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Retry execution for protocol operations.
//!
//! Every protocol call goes through a [`RetryExecutor`], which owns three
//! responsibilities:
//!
//! - bounded retry with a fixed delay and a per-call timeout
//! - failure classification (non-retryable errors surface immediately)
//! - the "long lost connection" fast-fail: once the link has been down for
//!   longer than a full retry budget could bridge, new operations fail at
//!   once instead of burning through their attempts
//!
//! A [`StopToken`] is honored before every attempt and during every delay,
//! so shutdown never waits out a backoff.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rand::Rng;
use tracing::{debug, warn};

use crate::error::{ClientResult, CommunicationError};
use crate::shutdown::StopToken;

// =============================================================================
// OperationKind
// =============================================================================

/// Coarse label for the operation being retried, used in logs and timeout
/// errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    /// Session establishment.
    Connect,
    /// Attribute read.
    Read,
    /// Attribute write.
    Write,
    /// Subscription or monitored-item management.
    Subscribe,
    /// Method invocation.
    Call,
    /// Address-space browse.
    Browse,
    /// Session teardown.
    Disconnect,
}

impl OperationKind {
    /// Stable lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Read => "read",
            Self::Write => "write",
            Self::Subscribe => "subscribe",
            Self::Call => "call",
            Self::Browse => "browse",
            Self::Disconnect => "disconnect",
        }
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// RetryPolicy
// =============================================================================

/// Bounded retry parameters for a single operation.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum number of attempts (at least 1).
    pub max_attempts: u32,
    /// Fixed delay between attempts.
    pub retry_delay: Duration,
    /// Upper bound for a single attempt.
    pub timeout: Duration,
}

impl RetryPolicy {
    /// Creates a policy.
    pub fn new(max_attempts: u32, retry_delay: Duration, timeout: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            retry_delay,
            timeout,
        }
    }

    /// The worst-case wall time a full retry cycle can cover.
    ///
    /// A disconnection older than this cannot be bridged by retrying, which
    /// is exactly the long-lost-connection condition.
    pub fn budget(&self) -> Duration {
        (self.retry_delay + self.timeout).saturating_mul(self.max_attempts)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay: Duration::from_millis(1000),
            timeout: Duration::from_millis(5000),
        }
    }
}

// =============================================================================
// FailoverBackoff
// =============================================================================

/// Exponential backoff with optional jitter, used by the unbounded
/// server-switch loop.
#[derive(Debug, Clone)]
pub struct FailoverBackoff {
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Cap applied after multiplication.
    pub max_delay: Duration,
    /// Growth factor per attempt.
    pub multiplier: f64,
    /// Jitter factor (0.0 = none, 1.0 = up to 100%).
    pub jitter_factor: f64,
}

impl FailoverBackoff {
    /// Creates a backoff with multiplier 2.0 and no jitter.
    pub fn new(initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            initial_delay,
            max_delay,
            multiplier: 2.0,
            jitter_factor: 0.0,
        }
    }

    /// Sets the growth factor.
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Sets the jitter factor.
    pub fn with_jitter(mut self, jitter_factor: f64) -> Self {
        self.jitter_factor = jitter_factor.clamp(0.0, 1.0);
        self
    }

    /// Delay for the given 0-based attempt number.
    pub fn delay(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt as i32);
        let capped = base.min(self.max_delay.as_secs_f64());

        let with_jitter = if self.jitter_factor > 0.0 {
            let mut rng = rand::thread_rng();
            let range = capped * self.jitter_factor;
            (capped + rng.gen_range(-range..=range)).max(0.0)
        } else {
            capped
        };

        Duration::from_secs_f64(with_jitter)
    }
}

impl Default for FailoverBackoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(1000), Duration::from_secs(60))
    }
}

// =============================================================================
// LinkState
// =============================================================================

/// Shared record of when the link to the current server was lost.
///
/// Cloneable; all clones observe the same state. The disconnection instant
/// is sticky: repeated `mark_disconnected` calls keep the earliest one so
/// the long-lost check measures the full outage, not the latest blip.
#[derive(Clone, Default)]
pub struct LinkState {
    disconnected_since: Arc<Mutex<Option<Instant>>>,
}

impl LinkState {
    /// Creates a connected link state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the link as up, clearing any outage start.
    pub fn mark_connected(&self) {
        *self.disconnected_since.lock() = None;
    }

    /// Records the link as down. Keeps the earliest outage start.
    pub fn mark_disconnected(&self) {
        let mut since = self.disconnected_since.lock();
        if since.is_none() {
            *since = Some(Instant::now());
        }
    }

    /// Returns how long the link has been down, or `None` when up.
    pub fn disconnected_for(&self) -> Option<Duration> {
        self.disconnected_since.lock().map(|t| t.elapsed())
    }

    /// Returns `true` while no outage is recorded.
    pub fn is_connected(&self) -> bool {
        self.disconnected_since.lock().is_none()
    }

    #[cfg(test)]
    pub(crate) fn set_disconnected_since(&self, instant: Instant) {
        *self.disconnected_since.lock() = Some(instant);
    }
}

impl std::fmt::Debug for LinkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkState")
            .field("disconnected_for", &self.disconnected_for())
            .finish()
    }
}

// =============================================================================
// RetryStats
// =============================================================================

/// Cumulative counters for retry execution.
#[derive(Debug, Default)]
pub struct RetryStats {
    attempts: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    fast_fails: AtomicU64,
}

impl RetryStats {
    /// Total attempts made (including retries).
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    /// Operations that eventually succeeded.
    pub fn successes(&self) -> u64 {
        self.successes.load(Ordering::Relaxed)
    }

    /// Operations that exhausted their attempts or hit a non-retryable
    /// error.
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Operations rejected by the long-lost-connection check.
    pub fn fast_fails(&self) -> u64 {
        self.fast_fails.load(Ordering::Relaxed)
    }
}

// =============================================================================
// RetryExecutor
// =============================================================================

/// Executes operations under a [`RetryPolicy`] with stop and link-state
/// awareness.
#[derive(Clone)]
pub struct RetryExecutor {
    policy: RetryPolicy,
    link: LinkState,
    stop: StopToken,
    stats: Arc<RetryStats>,
}

impl RetryExecutor {
    /// Creates an executor.
    pub fn new(policy: RetryPolicy, link: LinkState, stop: StopToken) -> Self {
        Self {
            policy,
            link,
            stop,
            stats: Arc::new(RetryStats::default()),
        }
    }

    /// The policy this executor runs under.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// The shared link state.
    pub fn link(&self) -> &LinkState {
        &self.link
    }

    /// The stop token honored between attempts.
    pub fn stop_token(&self) -> &StopToken {
        &self.stop
    }

    /// Cumulative counters.
    pub fn stats(&self) -> &RetryStats {
        &self.stats
    }

    /// Runs `op` with bounded retry.
    ///
    /// Returns `Ok(Some(value))` on success and `Ok(None)` when the client
    /// was stopped; in the stopped case the pending attempt is never made.
    /// Errors are the last attempt's failure, or `LongLostConnection` when
    /// the outage already exceeds the retry budget.
    pub async fn execute<F, Fut, T>(&self, kind: OperationKind, mut op: F) -> ClientResult<Option<T>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ClientResult<T>>,
    {
        for attempt in 1..=self.policy.max_attempts {
            if self.stop.is_stopped() {
                debug!(operation = %kind, "stop observed, abandoning operation");
                return Ok(None);
            }

            // An outage longer than the whole budget cannot be bridged by
            // the attempts we have left.
            if let Some(outage) = self.link.disconnected_for() {
                if outage > self.policy.budget() {
                    self.stats.fast_fails.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        operation = %kind,
                        outage_ms = outage.as_millis() as u64,
                        budget_ms = self.policy.budget().as_millis() as u64,
                        "connection lost beyond retry budget, failing fast"
                    );
                    return Err(CommunicationError::long_lost(outage).into());
                }
            }

            self.stats.attempts.fetch_add(1, Ordering::Relaxed);

            let result = match tokio::time::timeout(self.policy.timeout, op()).await {
                Ok(result) => result,
                Err(_) => Err(crate::error::ClientError::timeout(
                    kind.as_str(),
                    self.policy.timeout,
                )),
            };

            match result {
                Ok(value) => {
                    self.stats.successes.fetch_add(1, Ordering::Relaxed);
                    return Ok(Some(value));
                }
                Err(error) if !error.is_retryable() => {
                    self.stats.failures.fetch_add(1, Ordering::Relaxed);
                    return Err(error);
                }
                Err(error) if attempt == self.policy.max_attempts => {
                    self.stats.failures.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        operation = %kind,
                        attempts = attempt,
                        error = %error,
                        "operation failed after final attempt"
                    );
                    return Err(error);
                }
                Err(error) => {
                    debug!(
                        operation = %kind,
                        attempt,
                        error = %error,
                        "attempt failed, retrying after delay"
                    );
                    tokio::select! {
                        _ = self.stop.stopped() => return Ok(None),
                        _ = tokio::time::sleep(self.policy.retry_delay) => {}
                    }
                }
            }
        }

        unreachable!("retry loop always returns within max_attempts")
    }

    /// Runs `op` until it succeeds, a non-retryable error occurs, or the
    /// client stops, with the given backoff between failures.
    ///
    /// This is the engine of the server-switch loop: attempts are unbounded
    /// and each failure stretches the delay.
    pub async fn run_until_stopped<F, Fut, T>(
        &self,
        kind: OperationKind,
        backoff: &FailoverBackoff,
        mut op: F,
    ) -> ClientResult<Option<T>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ClientResult<T>>,
    {
        let mut attempt: u32 = 0;
        loop {
            if self.stop.is_stopped() {
                debug!(operation = %kind, "stop observed, abandoning loop");
                return Ok(None);
            }

            self.stats.attempts.fetch_add(1, Ordering::Relaxed);

            match op().await {
                Ok(value) => {
                    self.stats.successes.fetch_add(1, Ordering::Relaxed);
                    return Ok(Some(value));
                }
                Err(error) if !error.is_retryable() => {
                    self.stats.failures.fetch_add(1, Ordering::Relaxed);
                    return Err(error);
                }
                Err(error) => {
                    let delay = backoff.delay(attempt);
                    attempt = attempt.saturating_add(1);
                    debug!(
                        operation = %kind,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "loop attempt failed, backing off"
                    );
                    tokio::select! {
                        _ = self.stop.stopped() => return Ok(None),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClientError;
    use std::sync::atomic::AtomicU32;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(
            max_attempts,
            Duration::from_millis(1),
            Duration::from_millis(100),
        )
    }

    #[tokio::test]
    async fn test_retry_invokes_exactly_max_attempts_on_persistent_failure() {
        let executor = RetryExecutor::new(fast_policy(3), LinkState::new(), StopToken::new());
        let invocations = Arc::new(AtomicU32::new(0));

        let counted = invocations.clone();
        let result: ClientResult<Option<()>> = executor
            .execute(OperationKind::Read, move || {
                let counted = counted.clone();
                async move {
                    counted.fetch_add(1, Ordering::SeqCst);
                    Err(ClientError::request_failed("read", "still down"))
                }
            })
            .await;

        assert_eq!(invocations.load(Ordering::SeqCst), 3);
        assert!(matches!(
            result,
            Err(ClientError::Communication(
                CommunicationError::RequestFailed { .. }
            ))
        ));
        assert_eq!(executor.stats().failures(), 1);
    }

    #[tokio::test]
    async fn test_success_on_second_attempt_stops_retrying() {
        let executor = RetryExecutor::new(fast_policy(3), LinkState::new(), StopToken::new());
        let invocations = Arc::new(AtomicU32::new(0));

        let counted = invocations.clone();
        let result = executor
            .execute(OperationKind::Write, move || {
                let counted = counted.clone();
                async move {
                    if counted.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(ClientError::request_failed("write", "transient"))
                    } else {
                        Ok(7u32)
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(result, Some(7));
        assert_eq!(invocations.load(Ordering::SeqCst), 2);
        assert_eq!(executor.stats().successes(), 1);
    }

    #[tokio::test]
    async fn test_non_retryable_error_surfaces_immediately() {
        let executor = RetryExecutor::new(fast_policy(5), LinkState::new(), StopToken::new());
        let invocations = Arc::new(AtomicU32::new(0));

        let counted = invocations.clone();
        let result: ClientResult<Option<()>> = executor
            .execute(OperationKind::Subscribe, move || {
                let counted = counted.clone();
                async move {
                    counted.fetch_add(1, Ordering::SeqCst);
                    Err(crate::error::ConfigurationError::EmptyTagSet.into())
                }
            })
            .await;

        assert_eq!(invocations.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(e) if e.is_configuration()));
    }

    #[tokio::test]
    async fn test_stopped_before_execute_never_invokes_operation() {
        let stop = StopToken::new();
        stop.stop();
        let executor = RetryExecutor::new(fast_policy(3), LinkState::new(), stop);
        let invocations = Arc::new(AtomicU32::new(0));

        let counted = invocations.clone();
        let result: ClientResult<Option<u32>> = executor
            .execute(OperationKind::Read, move || {
                let counted = counted.clone();
                async move {
                    counted.fetch_add(1, Ordering::SeqCst);
                    Ok(1)
                }
            })
            .await;

        assert!(matches!(result, Ok(None)));
        assert_eq!(invocations.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_stop_during_retry_delay_abandons_remaining_attempts() {
        let stop = StopToken::new();
        let policy = RetryPolicy::new(
            3,
            Duration::from_secs(30),
            Duration::from_millis(100),
        );
        let executor = RetryExecutor::new(policy, LinkState::new(), stop.clone());
        let invocations = Arc::new(AtomicU32::new(0));

        let counted = invocations.clone();
        let stopper = stop.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            stopper.stop();
        });

        let result: ClientResult<Option<()>> = executor
            .execute(OperationKind::Read, move || {
                let counted = counted.clone();
                async move {
                    counted.fetch_add(1, Ordering::SeqCst);
                    Err(ClientError::request_failed("read", "down"))
                }
            })
            .await;

        assert!(matches!(result, Ok(None)));
        assert_eq!(invocations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_long_outage_fails_fast_without_invoking_operation() {
        // Budget: 2 * (1000ms + 100ms) = 2.2s; outage is 10s.
        let policy = RetryPolicy::new(
            2,
            Duration::from_millis(1000),
            Duration::from_millis(100),
        );
        let link = LinkState::new();
        link.set_disconnected_since(Instant::now() - Duration::from_secs(10));

        let executor = RetryExecutor::new(policy, link, StopToken::new());
        let invocations = Arc::new(AtomicU32::new(0));

        let counted = invocations.clone();
        let result: ClientResult<Option<()>> = executor
            .execute(OperationKind::Read, move || {
                let counted = counted.clone();
                async move {
                    counted.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .await;

        assert_eq!(invocations.load(Ordering::SeqCst), 0);
        assert!(matches!(
            result,
            Err(ClientError::Communication(
                CommunicationError::LongLostConnection { .. }
            ))
        ));
        assert_eq!(executor.stats().fast_fails(), 1);
    }

    #[tokio::test]
    async fn test_short_outage_still_attempts() {
        let link = LinkState::new();
        link.mark_disconnected();

        let executor = RetryExecutor::new(fast_policy(2), link.clone(), StopToken::new());
        let result = executor
            .execute(OperationKind::Connect, || async { Ok(42u32) })
            .await
            .unwrap();

        assert_eq!(result, Some(42));
        link.mark_connected();
        assert!(link.is_connected());
    }

    #[tokio::test]
    async fn test_timeout_is_classified_as_retryable() {
        let policy = RetryPolicy::new(
            2,
            Duration::from_millis(1),
            Duration::from_millis(10),
        );
        let executor = RetryExecutor::new(policy, LinkState::new(), StopToken::new());

        let result: ClientResult<Option<()>> = executor
            .execute(OperationKind::Call, || async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;

        assert!(matches!(
            result,
            Err(ClientError::Communication(CommunicationError::Timeout { .. }))
        ));
        assert_eq!(executor.stats().attempts(), 2);
    }

    #[tokio::test]
    async fn test_run_until_stopped_retries_past_bounded_budget() {
        let executor = RetryExecutor::new(fast_policy(2), LinkState::new(), StopToken::new());
        let backoff = FailoverBackoff::new(Duration::from_millis(1), Duration::from_millis(2));
        let invocations = Arc::new(AtomicU32::new(0));

        let counted = invocations.clone();
        let result = executor
            .run_until_stopped(OperationKind::Connect, &backoff, move || {
                let counted = counted.clone();
                async move {
                    // Succeeds only on the 6th try, well past max_attempts=2.
                    if counted.fetch_add(1, Ordering::SeqCst) < 5 {
                        Err(ClientError::connect_failed("opc.tcp://a", "refused"))
                    } else {
                        Ok("connected")
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(result, Some("connected"));
        assert_eq!(invocations.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn test_run_until_stopped_cancels_on_stop() {
        let stop = StopToken::new();
        let executor = RetryExecutor::new(fast_policy(2), LinkState::new(), stop.clone());
        let backoff = FailoverBackoff::new(Duration::from_secs(30), Duration::from_secs(60));

        let stopper = stop.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            stopper.stop();
        });

        let result: ClientResult<Option<()>> = executor
            .run_until_stopped(OperationKind::Connect, &backoff, || async {
                Err(ClientError::connect_failed("opc.tcp://a", "refused"))
            })
            .await;

        assert!(matches!(result, Ok(None)));
    }

    #[test]
    fn test_policy_budget() {
        let policy = RetryPolicy::new(
            3,
            Duration::from_millis(1000),
            Duration::from_millis(5000),
        );
        assert_eq!(policy.budget(), Duration::from_millis(18_000));
    }

    #[test]
    fn test_failover_backoff_growth_and_cap() {
        let backoff = FailoverBackoff::new(Duration::from_millis(100), Duration::from_secs(1));
        assert_eq!(backoff.delay(0), Duration::from_millis(100));
        assert_eq!(backoff.delay(1), Duration::from_millis(200));
        assert_eq!(backoff.delay(2), Duration::from_millis(400));
        assert_eq!(backoff.delay(10), Duration::from_secs(1));
    }

    #[test]
    fn test_failover_backoff_jitter_range() {
        let backoff = FailoverBackoff::new(Duration::from_millis(100), Duration::from_secs(1))
            .with_jitter(0.5);
        let delay = backoff.delay(0);
        assert!(delay >= Duration::from_millis(50));
        assert!(delay <= Duration::from_millis(150));
    }
}
