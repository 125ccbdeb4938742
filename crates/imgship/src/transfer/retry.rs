// ai
//! 🔄 Retry — the "have you tried turning it off and on again" of network I/O.
//!
//! Every fetch and every upload goes through [`retry`]. One attempt at a time, each one
//! fenced by a timeout, with exponential backoff in between:
//! `delay = base × 2^(attempt-1)`.
//!
//! 🧠 Knowledge graph:
//! - `AttemptError`: what a single attempt says about itself. Transient or permanent. No third option.
//! - `RetryState`: `{attempts_made, next_delay}`. Lives on the worker's stack. Never escapes.
//! - `RetryFailure`: what the loop says when it gives up (permanent, exhausted, or cancelled).
//! - Cancellation is checked BETWEEN attempts. An attempt in flight always gets to finish. 🦆

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::common::ErrorKind;

/// 🩺 The verdict on one attempt.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AttemptError {
    /// Timeouts, connection resets, 5xx. Worth another shot.
    #[error("transient: {0}")]
    Transient(String),
    /// 4xx, malformed locators, auth denials. Retrying would be a cry for help.
    #[error("permanent: {0}")]
    Permanent(String),
}

impl AttemptError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AttemptError::Transient(_) => ErrorKind::Transient,
            AttemptError::Permanent(_) => ErrorKind::Permanent,
        }
    }

    pub fn cause(&self) -> &str {
        match self {
            AttemptError::Transient(cause) | AttemptError::Permanent(cause) => cause,
        }
    }
}

/// 💀 Why the retry loop stopped without a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryFailure {
    /// Permanent, Exhausted, or Cancelled. Never Transient.
    pub kind: ErrorKind,
    pub attempts: u32,
    pub last_cause: String,
}

/// ✅ A value plus how many attempts it cost.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Retried<T> {
    pub value: T,
    pub attempts: u32,
}

/// 🔧 The shape of a retry policy. Fetcher and uploader each get their own copy with their own timeout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Always ≥ 1.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub attempt_timeout: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, attempt_timeout: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            attempt_timeout,
        }
    }

    /// ⏱️ Delay to wait after attempt number `attempt` (1-based) fails.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1u32 << exponent)
    }
}

/// 📒 Per-job retry bookkeeping. Owned by exactly one worker for exactly one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryState {
    pub attempts_made: u32,
    pub next_delay: Duration,
}

impl RetryState {
    pub fn new(policy: &RetryPolicy) -> Self {
        Self {
            attempts_made: 0,
            next_delay: policy.base_delay,
        }
    }

    /// 🔢 Marks the start of another attempt and returns its 1-based number.
    pub fn begin_attempt(&mut self) -> u32 {
        self.attempts_made += 1;
        self.attempts_made
    }

    /// 🤔 Whether another attempt is allowed after the one that just failed.
    pub fn can_retry(&self, policy: &RetryPolicy) -> bool {
        self.attempts_made < policy.max_attempts
    }

    /// ⏭️ Hands out the delay to wait now and arms the next one.
    pub fn take_delay(&mut self, policy: &RetryPolicy) -> Duration {
        let delay = policy.delay_after(self.attempts_made);
        self.next_delay = policy.delay_after(self.attempts_made + 1);
        delay
    }
}

/// 🔄 Runs `attempt` until it succeeds, fails permanently, runs out of attempts, or the run is cancelled.
///
/// `attempt` receives the 1-based attempt number. Each call is bounded by `policy.attempt_timeout`;
/// a timeout counts as a transient failure. Backoff sleeps only suspend this job.
pub async fn retry<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    what: &str,
    attempt: F,
) -> Result<Retried<T>, RetryFailure>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, AttemptError>>,
{
    retry_paced(policy, cancel, what, || std::future::ready(()), attempt).await
}

/// 🔄 [`retry`], but every attempt first waits on `pace`.
///
/// The pacing wait happens before the attempt's timeout starts ticking, so a long queue at
/// the pacer never burns an attempt. Cancellation during the wait ends the loop as `Cancelled`
/// with the attempts made so far (possibly zero).
pub async fn retry_paced<T, P, PaceFut, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    what: &str,
    mut pace: P,
    mut attempt: F,
) -> Result<Retried<T>, RetryFailure>
where
    P: FnMut() -> PaceFut,
    PaceFut: Future<Output = ()>,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, AttemptError>>,
{
    let mut state = RetryState::new(policy);
    let mut last_cause = String::from("cancelled before the first attempt");

    loop {
        tokio::select! {
            biased;
            _ = pace() => {}
            _ = cancel.cancelled() => return Err(cancelled(state.attempts_made, last_cause)),
        }

        let attempt_number = state.begin_attempt();
        let verdict = match tokio::time::timeout(policy.attempt_timeout, attempt(attempt_number)).await {
            Ok(verdict) => verdict,
            Err(_) => Err(AttemptError::Transient(format!(
                "timed out after {:?}",
                policy.attempt_timeout
            ))),
        };

        let error = match verdict {
            Ok(value) => {
                return Ok(Retried {
                    value,
                    attempts: attempt_number,
                });
            }
            Err(error) => error,
        };

        if let AttemptError::Permanent(cause) = error {
            return Err(RetryFailure {
                kind: ErrorKind::Permanent,
                attempts: attempt_number,
                last_cause: cause,
            });
        }

        last_cause = error.cause().to_string();
        if !state.can_retry(policy) {
            return Err(RetryFailure {
                kind: ErrorKind::Exhausted,
                attempts: attempt_number,
                last_cause,
            });
        }

        let delay = state.take_delay(policy);
        warn!(
            "🔄 {} attempt {}/{} failed ({}); backing off {:?}",
            what, attempt_number, policy.max_attempts, last_cause, delay
        );

        if cancel.is_cancelled() {
            return Err(cancelled(attempt_number, last_cause));
        }
        tokio::select! {
            _ = cancel.cancelled() => return Err(cancelled(attempt_number, last_cause)),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

fn cancelled(attempts: u32, last_cause: String) -> RetryFailure {
    RetryFailure {
        kind: ErrorKind::Cancelled,
        attempts,
        last_cause,
    }
}
