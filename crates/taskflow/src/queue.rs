//! The work queue: the orchestrator tying together task state, the
//! concurrency strategy and the retry policy.
//!
//! Mirrors the shape of the teacher's `WorkerPool` (semaphore-gated
//! execution, a background-loop-per-concern, graceful shutdown), but the
//! admission decision is made synchronously under one lock instead of via a
//! semaphore, since a strategy's decision depends on task *class*, not just
//! a single count.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::latch::DoneLatch;
use crate::retry::{retryable_by_default, RetryableClassifier, RetryPolicy};
use crate::state::{TaskSnapshot, TaskState, TaskStatus};
use crate::strategy::ConcurrencyStrategy;
use crate::task::{EnqueueHandle, Task, TaskError};

/// Errors surfaced by queue operations.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// `wait` observed a task reach `Failed`; carries that task's error
    /// message (first such task in FIFO order).
    #[error("task failed: {0}")]
    TaskFailed(String),

    /// The cancellation signal passed to `wait` fired before the queue
    /// drained. The queue has been cancelled as a side effect.
    #[error("wait was cancelled")]
    WaitCancelled,
}

type Observer = Arc<dyn Fn(&[TaskSnapshot]) + Send + Sync>;

/// Builder-style configuration for a [`Queue`].
#[derive(Clone)]
pub struct QueueConfig {
    pub strategy: ConcurrencyStrategy,
    pub retry_policy: RetryPolicy,
    pub retryable: RetryableClassifier,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            strategy: ConcurrencyStrategy::default(),
            retry_policy: RetryPolicy::default(),
            retryable: retryable_by_default(),
        }
    }
}

impl QueueConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_strategy(mut self, strategy: ConcurrencyStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn with_retryable(mut self, classifier: RetryableClassifier) -> Self {
        self.retryable = classifier;
        self
    }
}

struct QueueInner {
    tasks: Vec<TaskState>,
    strategy: ConcurrencyStrategy,
    paused: bool,
    observer: Option<Observer>,
}

/// Orchestrates a FIFO sequence of tasks under a [`ConcurrencyStrategy`],
/// with retry, cancellation, pause and a reusable completion signal.
///
/// Constructed via [`Queue::new`], which returns an `Arc<Queue>` since
/// running tasks hold their own handle back into the queue (to enqueue
/// follow-ups) and spawned runners outlive the call that created them.
pub struct Queue {
    inner: Mutex<QueueInner>,
    cancel_token: CancellationToken,
    cancelled: AtomicBool,
    done: DoneLatch,
    retry_policy: RetryPolicy,
    retryable: RetryableClassifier,
    weak_self: Weak<Queue>,
}

enum RunOutcome {
    Success,
    Cancelled,
    Failed(Box<dyn std::error::Error + Send + Sync>),
}

impl Queue {
    /// Create a new, empty queue.
    pub fn new(config: QueueConfig) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            inner: Mutex::new(QueueInner {
                tasks: Vec::new(),
                strategy: config.strategy,
                paused: false,
                observer: None,
            }),
            cancel_token: CancellationToken::new(),
            cancelled: AtomicBool::new(false),
            done: DoneLatch::new(),
            retry_policy: config.retry_policy,
            retryable: config.retryable,
            weak_self: weak.clone(),
        })
    }

    fn arc(&self) -> Arc<Queue> {
        self.weak_self
            .upgrade()
            .expect("Queue::arc called after the queue was dropped")
    }

    /// Append a task in FIFO order. Ignored (and logged) if the queue has
    /// already been cancelled or paused. Reopens the done latch if it was
    /// previously closed, so the queue can be reused across batches.
    #[instrument(skip(self, task), fields(task_id = %task.id()))]
    pub fn enqueue(&self, task: Box<dyn Task>) -> Result<(), QueueError> {
        let task: Arc<dyn Task> = Arc::from(task);
        {
            let mut inner = self.inner.lock();
            if self.cancelled.load(Ordering::SeqCst) {
                warn!("enqueue after cancel/pause ignored");
                return Ok(());
            }
            if self.done.is_closed() {
                self.done.reopen();
            }
            inner.tasks.push(TaskState::new(task));
            self.notify_locked(&inner);
        }
        self.dispatch();
        Ok(())
    }

    /// Install an observer, replacing any previous one. Invoked with the
    /// full snapshot sequence under the queue lock on every state change —
    /// implementations MUST NOT re-enter the queue from the callback.
    pub fn set_observer<F>(&self, observer: F)
    where
        F: Fn(&[TaskSnapshot]) + Send + Sync + 'static,
    {
        self.inner.lock().observer = Some(Arc::new(observer));
    }

    /// Snapshot of all tasks, in FIFO order.
    pub fn tasks(&self) -> Vec<TaskSnapshot> {
        self.inner.lock().tasks.iter().map(TaskState::snapshot).collect()
    }

    pub fn is_paused(&self) -> bool {
        self.inner.lock().paused
    }

    pub fn is_complete(&self) -> bool {
        self.inner.lock().tasks.iter().all(|t| t.status.is_terminal())
    }

    pub fn has_failures(&self) -> bool {
        self.inner
            .lock()
            .tasks
            .iter()
            .any(|t| t.status == TaskStatus::Failed)
    }

    pub fn task_count(&self) -> usize {
        self.inner.lock().tasks.len()
    }

    pub fn pending_count(&self) -> usize {
        self.inner
            .lock()
            .tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Pending)
            .count()
    }

    pub fn completed_count(&self) -> usize {
        self.inner
            .lock()
            .tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Completed)
            .count()
    }

    /// `(completed+failed+cancelled+paused)*100/total`; 100 when empty.
    pub fn progress(&self) -> u8 {
        let inner = self.inner.lock();
        let total = inner.tasks.len();
        if total == 0 {
            return 100;
        }
        let done = inner.tasks.iter().filter(|t| t.status.is_terminal()).count();
        ((done * 100) / total) as u8
    }

    /// Wait until every task currently in the queue reaches a terminal
    /// status. Returns the first FIFO failure's error, if any. If `cancel`
    /// fires first, the queue is cancelled and `WaitCancelled` is returned.
    /// Returns immediately on an empty (or already-drained) queue.
    pub async fn wait(&self, cancel: &CancellationToken) -> Result<(), QueueError> {
        tokio::select! {
            _ = self.done.wait() => {}
            _ = cancel.cancelled() => {
                self.cancel();
                return Err(QueueError::WaitCancelled);
            }
        }

        let inner = self.inner.lock();
        for t in inner.tasks.iter() {
            if t.status == TaskStatus::Failed {
                return Err(QueueError::TaskFailed(
                    t.last_error.clone().unwrap_or_default(),
                ));
            }
        }
        Ok(())
    }

    /// Idempotent. Fires the cancellation signal and transitions pending
    /// tasks to `Cancelled`; running tasks are reclassified when their
    /// runner observes the signal.
    #[instrument(skip(self))]
    pub fn cancel(&self) {
        self.stop_accepting(false);
    }

    /// Like `cancel`, but pending/in-flight tasks resolve to `Paused`
    /// instead of `Cancelled`.
    #[instrument(skip(self))]
    pub fn pause(&self) {
        self.stop_accepting(true);
    }

    fn stop_accepting(&self, paused: bool) {
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(paused, "queue stopping acceptance of new work");

        let status = if paused {
            TaskStatus::Paused
        } else {
            TaskStatus::Cancelled
        };

        // `all_terminal` is checked and, if true, the done latch is closed
        // while still holding `inner`'s lock, so a concurrent `enqueue` can
        // never observe the latch still open, push a task, and then lose a
        // race against a stale close triggered by this snapshot.
        {
            let mut inner = self.inner.lock();
            inner.paused = paused;
            for t in inner.tasks.iter_mut() {
                if t.status == TaskStatus::Pending {
                    t.mark_terminal(status, None);
                }
            }
            self.notify_locked(&inner);
            if inner.tasks.iter().all(|t| t.status.is_terminal()) {
                self.done.close();
            }
        }

        self.cancel_token.cancel();
    }

    fn notify_locked(&self, inner: &QueueInner) {
        if let Some(observer) = &inner.observer {
            let snapshots: Vec<TaskSnapshot> = inner.tasks.iter().map(TaskState::snapshot).collect();
            observer(&snapshots);
        }
    }

    /// Scan pending tasks in FIFO order, starting every one the strategy
    /// currently admits, until none remain eligible.
    fn dispatch(&self) {
        while self.dispatch_once() {}
    }

    fn dispatch_once(&self) -> bool {
        let idx = {
            let mut inner = self.inner.lock();
            let mut candidate = None;
            for i in 0..inner.tasks.len() {
                if inner.tasks[i].status == TaskStatus::Pending {
                    let class = inner.tasks[i].class();
                    if inner.strategy.may_start(class) {
                        candidate = Some(i);
                        break;
                    }
                }
            }
            let Some(idx) = candidate else {
                return false;
            };

            let class = inner.tasks[idx].class();
            inner.tasks[idx].mark_running();
            inner.strategy.on_start(class);
            debug!(idx, ?class, "dispatching task");
            self.notify_locked(&inner);
            idx
        };

        let queue = self.arc();
        tokio::spawn(async move { queue.run(idx).await });
        true
    }

    async fn run(self: Arc<Self>, idx: usize) {
        let (task, class) = {
            let inner = self.inner.lock();
            (inner.tasks[idx].task.clone(), inner.tasks[idx].class())
        };
        let handle = EnqueueHandle::new(Arc::clone(&self));

        let mut retry_count = 0u32;
        let outcome = 'attempt: loop {
            let result = task.execute(&self.cancel_token, &handle).await;
            match result {
                Ok(()) => break 'attempt RunOutcome::Success,
                Err(TaskError::Cancelled) => break 'attempt RunOutcome::Cancelled,
                Err(TaskError::Failed(err)) => {
                    if !(self.retryable)(err.as_ref()) {
                        debug!(idx, "non-retryable error");
                        break 'attempt RunOutcome::Failed(err);
                    }
                    if !self.retry_policy.has_attempts_remaining(retry_count) {
                        warn!(idx, retry_count, "retries exhausted");
                        break 'attempt RunOutcome::Failed(err);
                    }

                    retry_count += 1;
                    {
                        let mut inner = self.inner.lock();
                        inner.tasks[idx].retry_count = retry_count;
                    }
                    let delay = self.retry_policy.delay_for_attempt(retry_count);
                    debug!(idx, retry_count, ?delay, "retrying after backoff");

                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = self.cancel_token.cancelled() => {
                            break 'attempt RunOutcome::Cancelled;
                        }
                    }
                }
            }
        };

        match outcome {
            RunOutcome::Success => self.finish(idx, class, TaskStatus::Completed, None),
            RunOutcome::Cancelled => {
                let paused = self.inner.lock().paused;
                let status = if paused { TaskStatus::Paused } else { TaskStatus::Cancelled };
                self.finish(idx, class, status, None);
            }
            RunOutcome::Failed(err) => self.finish(idx, class, TaskStatus::Failed, Some(err.to_string())),
        }
    }

    fn finish(
        &self,
        idx: usize,
        class: crate::task::TaskClass,
        status: TaskStatus,
        error: Option<String>,
    ) {
        // As in `stop_accepting`, close the done latch under the same lock
        // guard that computed `all_terminal`: otherwise a concurrent
        // `enqueue` running between lock release and `close()` could push a
        // new pending task and still lose the race to a stale close.
        {
            let mut inner = self.inner.lock();
            inner.strategy.on_complete(class);
            inner.tasks[idx].mark_terminal(status, error);
            self.notify_locked(&inner);
            if inner.tasks.iter().all(|t| t.status.is_terminal()) {
                self.done.close();
            }
        }
        self.dispatch();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::ConcurrencyStrategy;
    use crate::task::TaskClass;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    struct SleepTask {
        id: String,
        class: TaskClass,
        sleep: Duration,
        running: Arc<AtomicUsize>,
        max_running: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Task for SleepTask {
        fn id(&self) -> &str {
            &self.id
        }
        fn name(&self) -> &str {
            &self.id
        }
        fn contends_for_scarce_resource(&self) -> bool {
            self.class == TaskClass::Scarce
        }
        async fn execute(
            &self,
            _cancel: &CancellationToken,
            _enqueue: &EnqueueHandle,
        ) -> Result<(), TaskError> {
            let n = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_running.fetch_max(n, Ordering::SeqCst);
            tokio::time::sleep(self.sleep).await;
            self.running.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn serialized_strategy_runs_scarce_tasks_one_at_a_time() {
        let queue = Queue::new(QueueConfig::new().with_strategy(ConcurrencyStrategy::serialized()));
        let running = Arc::new(AtomicUsize::new(0));
        let max_running = Arc::new(AtomicUsize::new(0));

        for i in 0..3 {
            queue
                .enqueue(Box::new(SleepTask {
                    id: format!("t{i}"),
                    class: TaskClass::Scarce,
                    sleep: Duration::from_millis(30),
                    running: running.clone(),
                    max_running: max_running.clone(),
                }))
                .unwrap();
        }

        let start = tokio::time::Instant::now();
        queue.wait(&CancellationToken::new()).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(90));
        assert_eq!(max_running.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn enqueue_after_cancel_is_ignored() {
        let queue = Queue::new(QueueConfig::new());
        queue.cancel();
        queue
            .enqueue(Box::new(SleepTask {
                id: "late".into(),
                class: TaskClass::Data,
                sleep: Duration::from_millis(1),
                running: Arc::new(AtomicUsize::new(0)),
                max_running: Arc::new(AtomicUsize::new(0)),
            }))
            .unwrap();
        assert_eq!(queue.task_count(), 0);
    }

    #[tokio::test]
    async fn wait_is_immediate_on_empty_queue() {
        let queue = Queue::new(QueueConfig::new());
        tokio::time::timeout(Duration::from_millis(20), queue.wait(&CancellationToken::new()))
            .await
            .expect("wait should not block")
            .expect("empty queue is not a failure");
    }

    #[tokio::test]
    async fn queue_is_reusable_across_batches() {
        let queue = Queue::new(QueueConfig::new());
        let running = Arc::new(AtomicUsize::new(0));
        let max_running = Arc::new(AtomicUsize::new(0));

        queue
            .enqueue(Box::new(SleepTask {
                id: "batch1".into(),
                class: TaskClass::Data,
                sleep: Duration::from_millis(5),
                running: running.clone(),
                max_running: max_running.clone(),
            }))
            .unwrap();
        queue.wait(&CancellationToken::new()).await.unwrap();
        assert!(queue.is_complete());

        queue
            .enqueue(Box::new(SleepTask {
                id: "batch2".into(),
                class: TaskClass::Data,
                sleep: Duration::from_millis(5),
                running,
                max_running,
            }))
            .unwrap();
        queue.wait(&CancellationToken::new()).await.unwrap();
        assert_eq!(queue.completed_count(), 2);
    }

    struct InstantTask {
        id: String,
    }

    #[async_trait]
    impl Task for InstantTask {
        fn id(&self) -> &str {
            &self.id
        }
        fn name(&self) -> &str {
            &self.id
        }
        fn contends_for_scarce_resource(&self) -> bool {
            false
        }
        async fn execute(
            &self,
            _cancel: &CancellationToken,
            _enqueue: &EnqueueHandle,
        ) -> Result<(), TaskError> {
            Ok(())
        }
    }

    /// `wait()` must never report done while a concurrently-enqueued task is
    /// still pending or running: the done latch close and a racing enqueue
    /// must never interleave such that a closed latch hides a live task.
    #[tokio::test]
    async fn wait_never_misses_a_task_enqueued_while_the_last_one_finishes() {
        for i in 0..200 {
            let queue = Queue::new(QueueConfig::new());
            queue
                .enqueue(Box::new(InstantTask { id: format!("first-{i}") }))
                .unwrap();

            let racer = {
                let queue = queue.clone();
                tokio::spawn(async move {
                    queue
                        .enqueue(Box::new(InstantTask { id: format!("racer-{i}") }))
                        .unwrap();
                })
            };

            queue.wait(&CancellationToken::new()).await.unwrap();
            racer.await.unwrap();
            // Whether or not the racer beat `wait`, every task it saw must
            // have reached a terminal status once `wait` (and the racer)
            // returned — a stale close must never leave one stuck pending.
            queue.wait(&CancellationToken::new()).await.unwrap();
            assert!(queue.is_complete(), "iteration {i}: a task was left non-terminal");
        }
    }
}
