//! # Taskflow
//!
//! A task execution engine for multi-workflow, mixed-resource pipelines.
//!
//! ## Features
//!
//! - **Pluggable concurrency strategies**: serialized, parallel-scarce or
//!   throttled-scarce admission for tasks that contend for a rate-limited
//!   external resource versus a local data resource
//! - **Exponential backoff retry**: jittered, capped, externally classified
//!   as retryable or terminal
//! - **Cooperative lifecycle**: cancel, pause and deadline-bounded shutdown
//!   distinguished from genuine task failure
//! - **Per-workflow infrastructure**: ownership heartbeat and a debounced,
//!   drain-and-keep-latest state writer
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                           Queue                               │
//! │  (dispatch under a ConcurrencyStrategy, retry, cancel/pause) │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  WorkflowInfrastructure                      │
//! │     (queue / writer / heartbeat registry, keyed by wf id)   │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │              HeartbeatHandle       WriterHandle              │
//! │          (ownership renewal)    (debounced persistence)      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use taskflow::prelude::*;
//!
//! let queue = Queue::new(QueueConfig::new().with_strategy(ConcurrencyStrategy::parallel_scarce()));
//! queue.enqueue(Box::new(my_task))?;
//! queue.wait(&CancellationToken::new()).await?;
//! ```

pub mod latch;
pub mod queue;
pub mod retry;
pub mod state;
pub mod strategy;
pub mod task;
pub mod workflow;

/// Prelude for common imports
pub mod prelude {
    pub use crate::queue::{Queue, QueueConfig, QueueError};
    pub use crate::retry::{retryable_by_default, RetryPolicy, RetryableClassifier};
    pub use crate::state::{TaskSnapshot, TaskStatus};
    pub use crate::strategy::ConcurrencyStrategy;
    pub use crate::task::{EnqueueHandle, Task, TaskClass, TaskError};
    pub use crate::workflow::{
        HeartbeatError, HeartbeatHandle, HeartbeatPersistence, PersistenceError, SendOutcome,
        ShutdownError, StatePersistence, TenantContextAcquirer, TenantContextGuard, Update,
        WorkflowInfrastructure, WriterHandle,
    };
}

// Re-export key types at crate root
pub use queue::{Queue, QueueConfig, QueueError};
pub use retry::{retryable_by_default, RetryPolicy, RetryableClassifier};
pub use state::{TaskSnapshot, TaskStatus};
pub use strategy::ConcurrencyStrategy;
pub use task::{EnqueueHandle, Task, TaskClass, TaskError};
pub use workflow::{
    shutdown, CleanupCallback, HeartbeatError, HeartbeatHandle, HeartbeatPersistence,
    PersistenceError, SendOutcome, ShutdownError, StatePersistence, TenantContextAcquirer,
    TenantContextGuard, Update, WorkflowInfrastructure, WriterHandle,
};
