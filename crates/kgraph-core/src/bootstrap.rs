//! # Schema Bootstrap
//!
//! One-time store setup at startup. This is the only place the engine
//! retries: while the store is unreachable (`GraphError::StoreUnavailable`)
//! the setup is attempted up to a fixed number of times with a fixed pause
//! in between. Every other error is returned at once.

use crate::GraphError;
use crate::graph::GraphStore;
use crate::primitives::{DEFAULT_BOOTSTRAP_ATTEMPTS, DEFAULT_BOOTSTRAP_BACKOFF_MS};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Fixed-backoff retry policy for schema setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total number of attempts, the first one included. Zero behaves as one.
    pub attempts: u32,
    /// Pause between attempts, in milliseconds.
    pub backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_BOOTSTRAP_ATTEMPTS,
            backoff_ms: DEFAULT_BOOTSTRAP_BACKOFF_MS,
        }
    }
}

impl RetryPolicy {
    /// A policy that tries once and never sleeps.
    #[must_use]
    pub fn no_retry() -> Self {
        Self {
            attempts: 1,
            backoff_ms: 0,
        }
    }

    #[must_use]
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

/// Run `op` until it succeeds, fails with a non-transport error, or the
/// policy runs out of attempts.
pub fn with_retry<T>(
    policy: RetryPolicy,
    mut op: impl FnMut() -> Result<T, GraphError>,
) -> Result<T, GraphError> {
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(GraphError::StoreUnavailable(reason)) if attempt < attempts => {
                tracing::warn!(
                    attempt,
                    attempts,
                    backoff_ms = policy.backoff_ms,
                    %reason,
                    "store unavailable, retrying schema setup"
                );
                std::thread::sleep(policy.backoff());
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Ensure the store's schema, retrying while the store is unreachable.
pub fn ensure_schema<S: GraphStore>(store: &mut S, policy: RetryPolicy) -> Result<(), GraphError> {
    with_retry(policy, || store.ensure_schema())?;
    tracing::info!("graph schema ready");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Graph;

    fn fast(attempts: u32) -> RetryPolicy {
        RetryPolicy {
            attempts,
            backoff_ms: 0,
        }
    }

    #[test]
    fn default_policy_is_five_times_two_seconds() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.attempts, 5);
        assert_eq!(policy.backoff(), Duration::from_secs(2));
    }

    #[test]
    fn retries_transport_failures_until_success() {
        let mut calls = 0;
        let result = with_retry(fast(5), || {
            calls += 1;
            if calls < 3 {
                Err(GraphError::StoreUnavailable("down".to_string()))
            } else {
                Ok(calls)
            }
        });
        assert_eq!(result.expect("eventually succeeds"), 3);
    }

    #[test]
    fn gives_up_after_last_attempt() {
        let mut calls = 0;
        let result: Result<(), GraphError> = with_retry(fast(4), || {
            calls += 1;
            Err(GraphError::StoreUnavailable("down".to_string()))
        });
        assert!(matches!(result, Err(GraphError::StoreUnavailable(_))));
        assert_eq!(calls, 4);
    }

    #[test]
    fn other_errors_are_not_retried() {
        let mut calls = 0;
        let result: Result<(), GraphError> = with_retry(fast(5), || {
            calls += 1;
            Err(GraphError::SerializationError("bad version".to_string()))
        });
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }

    #[test]
    fn zero_attempts_still_tries_once() {
        let mut calls = 0;
        let _ = with_retry(fast(0), || {
            calls += 1;
            Ok::<(), GraphError>(())
        });
        assert_eq!(calls, 1);
    }

    #[test]
    fn ensure_schema_on_memory_store() {
        let mut graph = Graph::new();
        ensure_schema(&mut graph, RetryPolicy::no_retry()).expect("schema");
    }
}
