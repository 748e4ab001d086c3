//! Retrying queue implementation
//!
//! Every gate is a predicate over [`QueueState`], checked and applied
//! atomically through a `watch` channel; waiters wake on each state change.

use futures::{future, FutureExt};
use std::collections::BTreeSet;
use std::fmt::Display;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{RetryOutcome, RetryQueueConfig, RetryQueueError, RetryQueueResult};

#[derive(Debug, Default)]
struct QueueState {
    next_seq: u64,
    // waiting to start
    pending: BTreeSet<u64>,
    // started and not yet returned or retried
    started: BTreeSet<u64>,
    executing: usize,
    pending_results: usize,
}

/// Bounded-concurrency, ordered-return dispatcher with backoff
pub struct RetryingQueue {
    config: RetryQueueConfig,
    state: watch::Sender<QueueState>,
    cancel: CancellationToken,
}

/// Bookkeeping of one submitted operation; released on drop so an abandoned
/// or cancelled call never blocks the others
struct Ticket<'a> {
    state: &'a watch::Sender<QueueState>,
    seq: u64,
    executing: bool,
    pending_result: bool,
}

impl Drop for Ticket<'_> {
    fn drop(&mut self) {
        let (seq, executing, pending_result) = (self.seq, self.executing, self.pending_result);
        self.state.send_modify(|s| {
            s.pending.remove(&seq);
            s.started.remove(&seq);
            if executing {
                s.executing -= 1;
            }
            if pending_result {
                s.pending_results -= 1;
            }
        });
    }
}

impl RetryingQueue {
    /// Create a queue
    pub fn new(config: RetryQueueConfig) -> Self {
        Self::with_cancellation(config, CancellationToken::new())
    }

    /// Create a queue whose operations fail with
    /// [`RetryQueueError::Cancelled`] once `token` is cancelled
    pub fn with_cancellation(config: RetryQueueConfig, token: CancellationToken) -> Self {
        let (state, _) = watch::channel(QueueState::default());
        Self {
            config,
            state,
            cancel: token,
        }
    }

    /// Configuration
    pub fn config(&self) -> &RetryQueueConfig {
        &self.config
    }

    /// Cancel every waiting and running operation
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether the queue has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Run `operation` until it succeeds.
    ///
    /// A body error or panic counts as a retry with the current backoff.
    /// Order-respecting successes are returned in submission order.
    ///
    /// # Errors
    ///
    /// [`RetryQueueError::Cancelled`] when the queue is cancelled first.
    pub async fn run<T, E, F, Fut>(&self, name: &str, mut operation: F) -> RetryQueueResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<RetryOutcome<T>, E>>,
        E: Display,
    {
        let mut ticket = self.submit();
        let seq = ticket.seq;
        let mut backoff = self.config.initial_backoff;
        let mut attempt: u32 = 0;

        loop {
            let (max_concurrent, max_pending) = (
                self.config.max_concurrent_operations,
                self.config.max_pending_results,
            );
            self.acquire(name, |s| {
                let ready = s.pending.first() == Some(&seq)
                    && s.executing < max_concurrent
                    && s.pending_results < max_pending;
                if ready {
                    s.pending.remove(&seq);
                    s.started.insert(seq);
                    s.executing += 1;
                }
                ready
            })
            .await?;
            ticket.executing = true;
            attempt += 1;
            debug!(operation = name, seq, attempt, "Operation started");

            let result = tokio::select! {
                // covers panics while building the future as well as polling it
                result = AssertUnwindSafe(future::lazy(|_| operation()).flatten()).catch_unwind() => result,
                _ = self.cancel.cancelled() => return Err(self.cancelled(name)),
            };

            self.state.send_modify(|s| s.executing -= 1);
            ticket.executing = false;

            let retry_after = match result {
                Ok(Ok(RetryOutcome::Success {
                    value,
                    ignore_return_order: true,
                })) => {
                    debug!(operation = name, seq, "Operation finished, returning immediately");
                    return Ok(value);
                }
                Ok(Ok(RetryOutcome::Success { value, .. })) => {
                    self.state.send_modify(|s| s.pending_results += 1);
                    ticket.pending_result = true;

                    self.acquire(name, |s| s.started.first() == Some(&seq))
                        .await?;
                    debug!(operation = name, seq, "Operation finished in order");
                    return Ok(value);
                }
                Ok(Ok(RetryOutcome::Retry { retry_after })) => retry_after,
                Ok(Err(e)) => {
                    warn!(operation = name, attempt, error = %e, "Operation failed");
                    None
                }
                Err(_) => {
                    warn!(operation = name, attempt, "Operation panicked");
                    None
                }
            };

            self.state.send_modify(|s| {
                s.started.remove(&seq);
            });

            let delay = retry_after.unwrap_or(backoff);
            backoff = self.config.next_backoff(backoff);
            debug!(
                operation = name,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "Retrying operation"
            );
            self.sleep(name, delay).await?;

            self.state.send_modify(|s| {
                s.pending.insert(seq);
            });
        }
    }

    fn submit(&self) -> Ticket<'_> {
        let mut seq = 0;
        self.state.send_modify(|s| {
            seq = s.next_seq;
            s.next_seq += 1;
            s.pending.insert(seq);
        });
        Ticket {
            state: &self.state,
            seq,
            executing: false,
            pending_result: false,
        }
    }

    /// Wait until `apply` reports that it could update the state
    async fn acquire(
        &self,
        name: &str,
        mut apply: impl FnMut(&mut QueueState) -> bool,
    ) -> RetryQueueResult<()> {
        let mut rx = self.state.subscribe();
        loop {
            rx.borrow_and_update();
            if self.state.send_if_modified(&mut apply) {
                return Ok(());
            }

            tokio::select! {
                changed = rx.changed() => {
                    if changed.is_err() {
                        return Err(self.cancelled(name));
                    }
                }
                _ = self.cancel.cancelled() => return Err(self.cancelled(name)),
            }
        }
    }

    async fn sleep(&self, name: &str, delay: Duration) -> RetryQueueResult<()> {
        tokio::select! {
            _ = tokio::time::sleep(delay) => Ok(()),
            _ = self.cancel.cancelled() => Err(self.cancelled(name)),
        }
    }

    fn cancelled(&self, name: &str) -> RetryQueueError {
        debug!(operation = name, "Operation cancelled");
        RetryQueueError::Cancelled {
            name: name.to_string(),
        }
    }
}

impl Default for RetryingQueue {
    fn default() -> Self {
        Self::new(RetryQueueConfig::default())
    }
}
