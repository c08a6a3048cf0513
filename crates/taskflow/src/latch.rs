//! A one-shot "done" signal that can be renewed, so a queue can be reused
//! across successive batches of work.

use tokio::sync::Notify;

/// Closable-then-renewable latch backing [`crate::queue::Queue::wait`].
///
/// The latch is observed to be in state `{open, closed}`, starting closed
/// (an empty queue is vacuously done). `wait` subscribes to the underlying
/// [`Notify`] *before* checking state, so a `close()` that races with the
/// start of a `wait()` is never missed.
pub struct DoneLatch {
    notify: Notify,
    closed: std::sync::atomic::AtomicBool,
}

impl DoneLatch {
    pub fn new() -> Self {
        Self {
            notify: Notify::new(),
            closed: std::sync::atomic::AtomicBool::new(true),
        }
    }

    /// Close the latch, waking any current and future waiters until the
    /// next `reopen`.
    pub fn close(&self) {
        self.closed
            .store(true, std::sync::atomic::Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Reopen the latch, renewing it for the next batch. Called by
    /// `enqueue` when it observes the latch already closed.
    pub fn reopen(&self) {
        self.closed
            .store(false, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// Wait until the latch is closed. Returns immediately if already
    /// closed.
    pub async fn wait(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_closed() {
                return;
            }
            notified.await;
            if self.is_closed() {
                return;
            }
        }
    }
}

impl Default for DoneLatch {
    fn default() -> Self {
        Self::new()
    }
}
