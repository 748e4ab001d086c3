//! Serial durable writer
//!
//! Every mutation of the [`FrequencyStore`] is funneled through one task so
//! writes never interleave, while cache reads never wait on storage.

use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use super::store::FrequencyStore;
use super::types::{FrequencyConstraint, Occurrence};
use crate::storage::{StorageError, StorageResult};

enum WriteOp {
    Occurrences(Vec<Occurrence>),
    ReplaceConstraints {
        delete: Vec<String>,
        reset: Vec<String>,
        upsert: Vec<FrequencyConstraint>,
        reply: oneshot::Sender<StorageResult<()>>,
    },
    Flush(oneshot::Sender<()>),
}

/// Handle to the writer task
#[derive(Clone)]
pub(crate) struct FrequencyWriter {
    tx: mpsc::UnboundedSender<WriteOp>,
}

/// Pending reply of a queued constraint replacement
pub(crate) struct PendingWrite(Option<oneshot::Receiver<StorageResult<()>>>);

impl PendingWrite {
    pub(crate) async fn wait(self) -> StorageResult<()> {
        match self.0 {
            Some(rx) => rx.await.unwrap_or_else(|_| Err(writer_stopped())),
            None => Err(writer_stopped()),
        }
    }
}

fn writer_stopped() -> StorageError {
    StorageError::Transaction("frequency writer stopped".to_string())
}

impl FrequencyWriter {
    /// Spawn the writer task on the current tokio runtime
    pub(crate) fn spawn(store: Arc<dyn FrequencyStore>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run(store, rx));
        Self { tx }
    }

    /// Queue occurrences without waiting for them to be written
    pub(crate) fn record(&self, occurrences: Vec<Occurrence>) {
        if occurrences.is_empty() {
            return;
        }
        if self.tx.send(WriteOp::Occurrences(occurrences)).is_err() {
            warn!("Frequency writer stopped, occurrences not persisted");
        }
    }

    /// Queue deletion of `delete` (with history), clearing of the history of
    /// `reset`, then upsert of `upsert`
    pub(crate) fn replace_constraints(
        &self,
        delete: Vec<String>,
        reset: Vec<String>,
        upsert: Vec<FrequencyConstraint>,
    ) -> PendingWrite {
        let (reply, rx) = oneshot::channel();
        let op = WriteOp::ReplaceConstraints {
            delete,
            reset,
            upsert,
            reply,
        };
        PendingWrite(self.tx.send(op).ok().map(|_| rx))
    }

    /// Wait until every previously queued write has been applied
    pub(crate) async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        if self.tx.send(WriteOp::Flush(tx)).is_ok() {
            let _ = rx.await;
        }
    }
}

async fn run(store: Arc<dyn FrequencyStore>, mut rx: mpsc::UnboundedReceiver<WriteOp>) {
    while let Some(op) = rx.recv().await {
        match op {
            WriteOp::Occurrences(occurrences) => {
                if let Err(e) = store.insert_occurrences(&occurrences).await {
                    warn!(error = %e, count = occurrences.len(), "Failed to persist occurrences");
                }
            }
            WriteOp::ReplaceConstraints {
                delete,
                reset,
                upsert,
                reply,
            } => {
                let result = replace(store.as_ref(), &delete, &reset, &upsert).await;
                if let Err(e) = &result {
                    warn!(error = %e, "Failed to persist constraint changes");
                }
                let _ = reply.send(result);
            }
            WriteOp::Flush(reply) => {
                let _ = reply.send(());
            }
        }
    }
    debug!("Frequency writer stopped");
}

async fn replace(
    store: &dyn FrequencyStore,
    delete: &[String],
    reset: &[String],
    upsert: &[FrequencyConstraint],
) -> StorageResult<()> {
    store.delete_constraints(delete).await?;
    store.delete_occurrences(reset).await?;
    for constraint in upsert {
        store.upsert_constraint(constraint).await?;
    }
    Ok(())
}
