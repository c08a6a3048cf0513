//! Deadline-bounded, concurrent shutdown of every workflow in a registry.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::queue::Queue;
use crate::workflow::heartbeat::HeartbeatHandle;
use crate::workflow::registry::WorkflowInfrastructure;
use crate::workflow::writer::WriterHandle;

#[derive(Debug, thiserror::Error)]
pub enum ShutdownError {
    /// The deadline fired before every workflow finished cleanup. Cleanups
    /// still in flight are detached and will complete eventually.
    #[error("shutdown deadline exceeded")]
    DeadlineExceeded,
}

/// Per-workflow cleanup invoked before its infrastructure is torn down.
/// `None` skips the callback entirely.
pub type CleanupCallback =
    Arc<dyn Fn(String) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Cancel every workflow's queue, run its cleanup callback, stop its writer
/// and heartbeat, then remove it from the registry — concurrently across
/// workflows, bounded by `deadline`.
///
/// Returns `Ok(())` if every workflow finished before the deadline fired,
/// `Err(ShutdownError::DeadlineExceeded)` otherwise.
#[instrument(skip(registry, cleanup, deadline))]
pub async fn shutdown(
    registry: &WorkflowInfrastructure,
    cleanup: Option<CleanupCallback>,
    deadline: &CancellationToken,
) -> Result<(), ShutdownError> {
    let ids = registry.workflow_ids();
    info!(count = ids.len(), "shutting down workflow infrastructure");

    // Extract ownership of each workflow's handles up front, then spawn its
    // cleanup as its own task: if the deadline wins the select below, these
    // tasks keep running to completion in the background instead of being
    // dropped mid-flight.
    let handles: Vec<_> = ids
        .into_iter()
        .map(|workflow_id| {
            let queue = registry.delete_queue(&workflow_id);
            let writer = registry.delete_writer(&workflow_id);
            let heartbeat = registry.delete_heartbeat(&workflow_id);
            let cleanup = cleanup.clone();
            tokio::spawn(shutdown_one(workflow_id, queue, writer, heartbeat, cleanup))
        })
        .collect();

    let all_done = futures::future::join_all(handles);

    tokio::select! {
        _ = all_done => {
            info!("shutdown completed before deadline");
            Ok(())
        }
        _ = deadline.cancelled() => {
            warn!("shutdown deadline exceeded; remaining cleanups detached");
            Err(ShutdownError::DeadlineExceeded)
        }
    }
}

async fn shutdown_one(
    workflow_id: String,
    queue: Option<Arc<Queue>>,
    writer: Option<Arc<WriterHandle>>,
    heartbeat: Option<Arc<HeartbeatHandle>>,
    cleanup: Option<CleanupCallback>,
) {
    if let Some(queue) = queue {
        queue.cancel();
    }

    if let Some(cleanup) = cleanup {
        cleanup(workflow_id).await;
    }

    if let Some(writer) = writer {
        writer.stop().await;
    }
    if let Some(heartbeat) = heartbeat {
        heartbeat.stop().await;
    }
}
