//! Retrying dispatch
//!
//! Runs named operations with bounded parallelism, bounded finished-but-
//! undelivered results, submission-order delivery and exponential backoff.
//!
//! # Example
//!
//! ```ignore
//! let queue = RetryingQueue::new(RetryQueueConfig::default());
//! let body = queue
//!     .run("fetch", || async {
//!         match client.fetch().await {
//!             Ok(body) => Ok::<_, FetchError>(RetryOutcome::success(body)),
//!             Err(e) if e.is_throttled() => Ok(RetryOutcome::retry_after(e.retry_after())),
//!             Err(e) => Err(e),
//!         }
//!     })
//!     .await?;
//! ```

mod queue;

pub use queue::RetryingQueue;

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Retrying queue errors
#[derive(Debug, Error)]
pub enum RetryQueueError {
    /// The queue was cancelled while the operation was waiting or running
    #[error("operation '{name}' cancelled")]
    Cancelled {
        /// Operation name
        name: String,
    },
}

/// Result type for retrying queue operations
pub type RetryQueueResult<T> = std::result::Result<T, RetryQueueError>;

/// Outcome of one attempt of a queued operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome<T> {
    /// Finished with a value
    Success {
        /// Value handed back to the caller
        value: T,
        /// Return as soon as finished instead of in submission order
        ignore_return_order: bool,
    },
    /// Try again later
    Retry {
        /// Delay before the next attempt; the queue's backoff when absent
        retry_after: Option<Duration>,
    },
}

impl<T> RetryOutcome<T> {
    /// Success delivered in submission order
    pub fn success(value: T) -> Self {
        Self::Success {
            value,
            ignore_return_order: false,
        }
    }

    /// Success delivered immediately
    pub fn success_unordered(value: T) -> Self {
        Self::Success {
            value,
            ignore_return_order: true,
        }
    }

    /// Retry after the current backoff
    pub fn retry() -> Self {
        Self::Retry { retry_after: None }
    }

    /// Retry after an explicit delay
    pub fn retry_after(delay: Duration) -> Self {
        Self::Retry {
            retry_after: Some(delay),
        }
    }
}

/// Retrying queue configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryQueueConfig {
    /// Operations allowed to execute at once
    pub max_concurrent_operations: usize,
    /// Finished order-respecting operations allowed to wait for their turn
    pub max_pending_results: usize,
    /// First backoff delay
    pub initial_backoff: Duration,
    /// Backoff ceiling
    pub max_backoff: Duration,
}

impl Default for RetryQueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent_operations: 3,
            max_pending_results: 2,
            initial_backoff: Duration::from_secs(15),
            max_backoff: Duration::from_secs(60),
        }
    }
}

impl RetryQueueConfig {
    /// Create default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set max concurrent operations
    #[must_use]
    pub fn with_max_concurrent_operations(mut self, max: usize) -> Self {
        self.max_concurrent_operations = max;
        self
    }

    /// Set max pending results
    #[must_use]
    pub fn with_max_pending_results(mut self, max: usize) -> Self {
        self.max_pending_results = max;
        self
    }

    /// Set initial backoff
    #[must_use]
    pub fn with_initial_backoff(mut self, delay: Duration) -> Self {
        self.initial_backoff = delay;
        self
    }

    /// Set max backoff
    #[must_use]
    pub fn with_max_backoff(mut self, delay: Duration) -> Self {
        self.max_backoff = delay;
        self
    }

    /// Backoff following `current`: doubled, kept within
    /// `[initial_backoff, max_backoff]`
    #[must_use]
    pub fn next_backoff(&self, current: Duration) -> Duration {
        current
            .saturating_mul(2)
            .min(self.max_backoff)
            .max(self.initial_backoff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_sequence() {
        let config = RetryQueueConfig::default();
        let mut backoff = config.initial_backoff;
        let mut delays = Vec::new();
        for _ in 0..5 {
            delays.push(backoff.as_secs());
            backoff = config.next_backoff(backoff);
        }
        assert_eq!(delays, vec![15, 30, 60, 60, 60]);
    }

    #[test]
    fn test_backoff_never_below_initial() {
        let config = RetryQueueConfig::new()
            .with_initial_backoff(Duration::from_secs(5))
            .with_max_backoff(Duration::from_secs(1));
        assert_eq!(config.next_backoff(Duration::ZERO), Duration::from_secs(5));
    }

    #[test]
    fn test_outcome_constructors() {
        assert_eq!(
            RetryOutcome::success(1),
            RetryOutcome::Success {
                value: 1,
                ignore_return_order: false
            }
        );
        assert_eq!(
            RetryOutcome::<()>::retry_after(Duration::from_secs(2)),
            RetryOutcome::Retry {
                retry_after: Some(Duration::from_secs(2))
            }
        );
    }
}
