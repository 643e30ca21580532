//! Bounded external calls
//!
//! Every network round-trip runs under a timeout. Errors that are transient
//! (timeouts, transport failures) get one more attempt; reverts and other
//! deterministic failures are returned immediately.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Classification used by [`with_retry`]
pub trait Transient: Sized {
    /// Whether repeating the same call could succeed
    fn is_transient(&self) -> bool;

    /// Error value for a call that exceeded its time budget
    fn timed_out(operation: &str, after: Duration) -> Self;
}

/// Timeout and retry budget for one class of calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallPolicy {
    pub timeout: Duration,
    pub retries: u32,
    pub backoff: Duration,
}

impl CallPolicy {
    pub fn new(timeout: Duration, retries: u32) -> Self {
        Self {
            timeout,
            retries,
            backoff: Duration::from_millis(500),
        }
    }

    /// Same timeout, no second attempt
    pub fn single_attempt(&self) -> Self {
        Self { retries: 0, ..*self }
    }
}

impl Default for CallPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(30), 1)
    }
}

/// Run `op` under `policy`, retrying transient failures
pub async fn with_retry<T, E, F, Fut>(policy: &CallPolicy, operation: &str, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Transient + Display,
{
    let mut attempt = 0;
    loop {
        let outcome = match tokio::time::timeout(policy.timeout, op()).await {
            Ok(result) => result,
            Err(_) => Err(E::timed_out(operation, policy.timeout)),
        };

        match outcome {
            Err(e) if e.is_transient() && attempt < policy.retries => {
                attempt += 1;
                warn!("{} failed ({}), retrying ({}/{})", operation, e, attempt, policy.retries);
                tokio::time::sleep(policy.backoff).await;
            }
            other => return other,
        }
    }
}
