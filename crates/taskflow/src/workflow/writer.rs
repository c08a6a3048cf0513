//! Debounced, loss-tolerant per-workflow state writer.
//!
//! Producers push updates faster than persistence can (or should) keep up
//! with; the writer keeps only the most recent update between persistence
//! attempts rather than queueing every one, matching the "conflation"
//! shape used for rapidly-changing state rather than a strict log.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

use crate::workflow::error::PersistenceError;

/// Input channel capacity. Beyond this, newly sent updates are dropped.
pub const WRITER_BUFFER: usize = 100;

/// An update waiting to be persisted.
#[derive(Debug, Clone)]
pub struct Update {
    pub tenant_id: String,
    pub workflow_id: String,
    pub payload: Value,
}

/// Outbound dependency: durably (or not — this crate makes no guarantee)
/// stores the latest payload for a workflow.
#[async_trait]
pub trait StatePersistence: Send + Sync {
    async fn persist_state(&self, workflow_id: &str, payload: Value) -> Result<(), PersistenceError>;
}

/// Result of a non-blocking [`WriterHandle::send`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Buffered for the background consumer.
    Accepted,
    /// The buffer was full; the update was discarded.
    Dropped,
}

/// Handle to a running debounced writer for one workflow.
pub struct WriterHandle {
    tx: Mutex<Option<mpsc::Sender<Update>>>,
    done: Arc<Notify>,
    join: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl WriterHandle {
    /// Start the background consumer: block for one update, then
    /// non-blockingly drain any further buffered updates keeping only the
    /// most recent, then persist. Repeats until the input channel closes,
    /// at which point the last accepted update (if any) is persisted before
    /// exit.
    #[instrument(skip(persistence))]
    pub fn start(persistence: Arc<dyn StatePersistence>) -> Self {
        let (tx, mut rx) = mpsc::channel::<Update>(WRITER_BUFFER);
        let done = Arc::new(Notify::new());
        let done_signal = done.clone();

        let join = tokio::spawn(async move {
            while let Some(mut latest) = rx.recv().await {
                while let Ok(next) = rx.try_recv() {
                    latest = next;
                }
                if let Err(err) = persistence
                    .persist_state(&latest.workflow_id, latest.payload)
                    .await
                {
                    warn!(workflow_id = %latest.workflow_id, %err, "state persistence failed");
                }
            }
            debug!("writer loop exited");
            done_signal.notify_waiters();
        });

        Self {
            tx: Mutex::new(Some(tx)),
            done,
            join: tokio::sync::Mutex::new(Some(join)),
        }
    }

    /// Non-blocking enqueue of an update. Returns `Dropped` once `stop` has
    /// been called.
    pub fn send(&self, update: Update) -> SendOutcome {
        let Some(tx) = self.tx.lock().clone() else {
            warn!(workflow_id = %update.workflow_id, "writer already stopped, dropping update");
            return SendOutcome::Dropped;
        };
        match tx.try_send(update) {
            Ok(()) => SendOutcome::Accepted,
            Err(mpsc::error::TrySendError::Full(update)) => {
                warn!(workflow_id = %update.workflow_id, "writer buffer full, dropping update");
                SendOutcome::Dropped
            }
            Err(mpsc::error::TrySendError::Closed(update)) => {
                warn!(workflow_id = %update.workflow_id, "writer already stopped, dropping update");
                SendOutcome::Dropped
            }
        }
    }

    /// Close the input channel and wait for the background consumer to
    /// flush its last accepted update and exit. Idempotent.
    pub async fn stop(&self) {
        let notified = self.done.notified();
        let sender = self.tx.lock().take();
        if let Some(handle) = self.join.lock().await.take() {
            drop(sender);
            notified.await;
            let _ = handle.await;
        }
    }
}
