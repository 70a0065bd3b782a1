//! Bounded retry executor for repository-port calls.
//!
//! # Responsibility
//! - Absorb rate-limit/transient store failures behind a back-off loop.
//! - Propagate non-transient failures immediately.
//!
//! # Invariants
//! - At most `max_attempts` calls per execution; exhaustion surfaces as
//!   `SessionError::StoreUnavailable` wrapping the last transient failure.
//! - Back-off duration comes from the failure when supplied, otherwise
//!   from the policy default.
//! - Stateless across calls; safe to share between independent sessions.

use crate::repo::document_repo::RepoError;
use crate::session::{SessionError, SessionResult};
use log::warn;
use std::sync::Arc;
use std::time::Duration;

/// How many attempts to make and how long to wait when the store does
/// not say.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub default_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            default_backoff: Duration::from_millis(100),
        }
    }
}

/// Sleep seam, injectable so tests can count back-offs deterministically.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

/// Production sleeper backed by the OS clock.
#[derive(Debug, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Per-call retry wrapper around repository-port invocations.
#[derive(Clone)]
pub struct RetryExecutor {
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl Default for RetryExecutor {
    fn default() -> Self {
        Self::new(RetryPolicy::default(), Arc::new(ThreadSleeper))
    }
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy, sleeper: Arc<dyn Sleeper>) -> Self {
        Self { policy, sleeper }
    }

    /// Runs `call` until it succeeds, fails permanently, or the attempt
    /// cap is reached.
    pub fn execute<T>(&self, mut call: impl FnMut() -> Result<T, RepoError>) -> SessionResult<T> {
        let max_attempts = self.policy.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            match call() {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() => {
                    if attempt == max_attempts {
                        return Err(SessionError::StoreUnavailable {
                            attempts: max_attempts,
                            source: err,
                        });
                    }
                    let backoff = match &err {
                        RepoError::Transient {
                            retry_after: Some(delay),
                            ..
                        } => *delay,
                        _ => self.policy.default_backoff,
                    };
                    warn!(
                        "event=retry_backoff module=session status=retrying attempt={attempt} backoff_ms={} error={err}",
                        backoff.as_millis()
                    );
                    self.sleeper.sleep(backoff);
                }
                Err(err) => return Err(SessionError::Repo(err)),
            }
        }

        unreachable!("retry loop always returns within max_attempts iterations")
    }
}
