//! Per-workflow ownership heartbeat.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::workflow::error::PersistenceError;

/// How often the heartbeat loop renews ownership.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Outbound dependency: tells the owning system this process still holds a
/// workflow, by its `server_instance_id`.
#[async_trait]
pub trait HeartbeatPersistence: Send + Sync {
    async fn update_heartbeat(
        &self,
        workflow_id: &str,
        server_instance_id: &str,
    ) -> Result<(), PersistenceError>;
}

/// Releases a tenant-scoped context (e.g. a pooled connection) on drop, so
/// release happens on every path including a panic while the guard is held.
pub struct TenantContextGuard {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl TenantContextGuard {
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// A guard with nothing to release.
    pub fn noop() -> Self {
        Self { release: None }
    }
}

impl Drop for TenantContextGuard {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

/// Outbound dependency: acquires whatever tenant-scoped context the
/// persistence call needs for `project_id`.
#[async_trait]
pub trait TenantContextAcquirer: Send + Sync {
    async fn acquire(&self, project_id: &str) -> Result<TenantContextGuard, PersistenceError>;
}

#[derive(Debug, thiserror::Error)]
pub enum HeartbeatError {
    #[error("heartbeat already started for this workflow")]
    AlreadyStarted,
}

impl fmt::Debug for HeartbeatHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeartbeatHandle").finish_non_exhaustive()
    }
}

/// Handle to a running heartbeat loop for one workflow.
pub struct HeartbeatHandle {
    cancel: CancellationToken,
    join: Arc<tokio::sync::Mutex<Option<JoinHandle<()>>>>,
}

impl HeartbeatHandle {
    /// Start the background loop: every [`HEARTBEAT_INTERVAL`], acquire a
    /// tenant context scoped to `project_id`, renew ownership, release the
    /// context. Failures are logged and swallowed — ownership is
    /// best-effort.
    pub fn start(
        workflow_id: impl Into<String>,
        project_id: impl Into<String>,
        server_instance_id: impl Into<String>,
        acquirer: Arc<dyn TenantContextAcquirer>,
        persistence: Arc<dyn HeartbeatPersistence>,
    ) -> Self {
        let workflow_id = workflow_id.into();
        let project_id = project_id.into();
        let server_instance_id = server_instance_id.into();
        let _span = tracing::info_span!("heartbeat", %workflow_id).entered();
        let cancel = CancellationToken::new();
        let loop_cancel = cancel.clone();

        let join = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(HEARTBEAT_INTERVAL);
            ticker.tick().await; // first tick fires immediately; skip it

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let guard = match acquirer.acquire(&project_id).await {
                            Ok(guard) => guard,
                            Err(err) => {
                                warn!(%workflow_id, %err, "heartbeat context acquisition failed");
                                continue;
                            }
                        };
                        if let Err(err) = persistence
                            .update_heartbeat(&workflow_id, &server_instance_id)
                            .await
                        {
                            warn!(%workflow_id, %err, "heartbeat update failed");
                        }
                        drop(guard);
                    }
                    _ = loop_cancel.cancelled() => {
                        debug!(%workflow_id, "heartbeat loop stopping");
                        break;
                    }
                }
            }
        });

        Self {
            cancel,
            join: Arc::new(tokio::sync::Mutex::new(Some(join))),
        }
    }

    /// Stop the loop. Idempotent: a second call is a no-op.
    pub async fn stop(&self) {
        self.cancel.cancel();
        if let Some(handle) = self.join.lock().await.take() {
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingPersistence(Arc<AtomicUsize>);

    #[async_trait]
    impl HeartbeatPersistence for CountingPersistence {
        async fn update_heartbeat(
            &self,
            _workflow_id: &str,
            _server_instance_id: &str,
        ) -> Result<(), PersistenceError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct NoopAcquirer;

    #[async_trait]
    impl TenantContextAcquirer for NoopAcquirer {
        async fn acquire(&self, _project_id: &str) -> Result<TenantContextGuard, PersistenceError> {
            Ok(TenantContextGuard::noop())
        }
    }

    struct FailingAcquirer;

    #[async_trait]
    impl TenantContextAcquirer for FailingAcquirer {
        async fn acquire(&self, _project_id: &str) -> Result<TenantContextGuard, PersistenceError> {
            Err("context unavailable".into())
        }
    }

    #[tokio::test]
    async fn stop_is_idempotent_and_joins_the_loop() {
        let count = Arc::new(AtomicUsize::new(0));
        let handle = HeartbeatHandle::start(
            "wf-1",
            "project-1",
            "server-1",
            Arc::new(NoopAcquirer),
            Arc::new(CountingPersistence(count.clone())),
        );

        handle.stop().await;
        handle.stop().await;
    }

    #[tokio::test]
    async fn acquisition_failure_is_swallowed() {
        let count = Arc::new(AtomicUsize::new(0));
        let handle = HeartbeatHandle::start(
            "wf-1",
            "project-1",
            "server-1",
            Arc::new(FailingAcquirer),
            Arc::new(CountingPersistence(count.clone())),
        );
        handle.stop().await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn guard_release_runs_on_drop() {
        let released = Arc::new(AtomicUsize::new(0));
        let r = released.clone();
        let guard = TenantContextGuard::new(move || {
            r.fetch_add(1, Ordering::SeqCst);
        });
        drop(guard);
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }
}
