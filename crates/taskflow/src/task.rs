//! Task contract: the abstract unit of work a queue schedules and executes.

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::queue::{Queue, QueueError};

/// Which resource lane a task contends for.
///
/// `Scarce` tasks count against the rate-limited external (LLM) lane;
/// `Data` tasks count against the local-storage lane. See
/// [`crate::strategy::ConcurrencyStrategy`] for how the two lanes are bounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskClass {
    /// Contends for the scarce, rate-limited external resource.
    Scarce,
    /// Contends for the local data resource.
    Data,
}

/// Error taxonomy returned by [`Task::execute`].
///
/// Unlike the teacher's `ActivityError`, retryability is not self-declared:
/// it is decided by an externally supplied oracle (see
/// [`crate::retry::RetryableClassifier`]) so that the same task
/// implementation can be reused under different retry policies.
#[derive(Debug)]
pub enum TaskError {
    /// The task observed the cancellation signal and stopped promptly.
    ///
    /// This is the cancellation sentinel: returning it is how a task tells
    /// the queue "I was cancelled, not broken" so it is never retried and
    /// never counted as a failure.
    Cancelled,
    /// The task failed for some other reason. The queue consults the
    /// retryability oracle to decide whether to retry.
    Failed(Box<dyn StdError + Send + Sync>),
}

impl TaskError {
    /// Construct a [`TaskError::Failed`] from any standard error.
    pub fn failed(err: impl StdError + Send + Sync + 'static) -> Self {
        Self::Failed(Box::new(err))
    }

    /// Construct a [`TaskError::Failed`] from a plain message.
    pub fn message(msg: impl Into<String>) -> Self {
        Self::Failed(Box::new(SimpleError(msg.into())))
    }
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancelled => write!(f, "task was cancelled"),
            Self::Failed(err) => write!(f, "{err}"),
        }
    }
}

impl StdError for TaskError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Cancelled => None,
            Self::Failed(err) => Some(err.as_ref()),
        }
    }
}

#[derive(Debug)]
struct SimpleError(String);

impl fmt::Display for SimpleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl StdError for SimpleError {}

/// Handle passed to a running task so it can submit follow-up work into the
/// same queue, under the same strategy, without holding any lock itself.
#[derive(Clone)]
pub struct EnqueueHandle {
    queue: Arc<Queue>,
}

impl EnqueueHandle {
    pub(crate) fn new(queue: Arc<Queue>) -> Self {
        Self { queue }
    }

    /// Append a follow-up task to the owning queue, in FIFO order.
    pub fn enqueue(&self, task: Box<dyn Task>) -> Result<(), QueueError> {
        self.queue.enqueue(task)
    }
}

/// A unit of work belonging to a workflow.
///
/// Mirrors the teacher's `Activity` trait, but is not generic over typed
/// input/output: task identity, payload and result shape are the producer's
/// business, not the engine's (see the crate's Non-goals).
#[async_trait]
pub trait Task: Send + Sync {
    /// Opaque, producer-assigned identity. Not interpreted by the engine.
    fn id(&self) -> &str;

    /// Human-readable name, for observability only.
    fn name(&self) -> &str;

    /// `true` if this task contends for the scarce external resource,
    /// `false` if it contends for the local data resource.
    fn contends_for_scarce_resource(&self) -> bool;

    /// Execute the task.
    ///
    /// Implementations MUST observe `cancel` and return
    /// [`TaskError::Cancelled`] promptly once it fires. Implementations MAY
    /// call `enqueue.enqueue(...)` to submit follow-up tasks.
    async fn execute(
        &self,
        cancel: &CancellationToken,
        enqueue: &EnqueueHandle,
    ) -> Result<(), TaskError>;

    /// Convenience accessor used by the queue to classify a task without an
    /// extra trait object hop.
    fn class(&self) -> TaskClass {
        if self.contends_for_scarce_resource() {
            TaskClass::Scarce
        } else {
            TaskClass::Data
        }
    }
}
