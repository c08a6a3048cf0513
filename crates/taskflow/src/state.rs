//! Per-task mutable state and the immutable snapshot projection of it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::task::{Task, TaskClass};

/// Where a task sits in its lifecycle. See the state machine in the crate
/// docs for the allowed transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Enqueued, not yet eligible or not yet picked up by the dispatcher.
    Pending,
    /// Currently executing (including retry backoff).
    Running,
    /// Finished successfully.
    Completed,
    /// Finished with a terminal error.
    Failed,
    /// Terminated by `cancel()`.
    Cancelled,
    /// Terminated by `pause()`.
    Paused,
}

impl TaskStatus {
    /// Terminal statuses are final: once reached, no further transition occurs.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Cancelled | Self::Paused
        )
    }
}

/// Owned by exactly one queue. Holds the task itself plus its mutable
/// lifecycle record.
pub struct TaskState {
    pub(crate) task: Arc<dyn Task>,
    pub(crate) status: TaskStatus,
    pub(crate) started_at: Option<DateTime<Utc>>,
    pub(crate) completed_at: Option<DateTime<Utc>>,
    pub(crate) last_error: Option<String>,
    pub(crate) retry_count: u32,
}

impl TaskState {
    pub(crate) fn new(task: Arc<dyn Task>) -> Self {
        Self {
            task,
            status: TaskStatus::Pending,
            started_at: None,
            completed_at: None,
            last_error: None,
            retry_count: 0,
        }
    }

    pub(crate) fn class(&self) -> TaskClass {
        self.task.class()
    }

    pub(crate) fn snapshot(&self) -> TaskSnapshot {
        TaskSnapshot {
            id: self.task.id().to_string(),
            name: self.task.name().to_string(),
            class: self.class(),
            status: self.status,
            started_at: self.started_at,
            completed_at: self.completed_at,
            last_error: self.last_error.clone(),
            retry_count: self.retry_count,
        }
    }

    /// Transition into `Running`, recording the start timestamp.
    pub(crate) fn mark_running(&mut self) {
        debug_assert!(!self.status.is_terminal());
        self.status = TaskStatus::Running;
        self.started_at = Some(Utc::now());
    }

    /// Transition into a terminal status, recording completion and, for
    /// `Failed`, the error.
    pub(crate) fn mark_terminal(&mut self, status: TaskStatus, error: Option<String>) {
        debug_assert!(status.is_terminal());
        if self.status.is_terminal() {
            // Terminal monotonicity: never overwrite a settled status.
            return;
        }
        self.status = status;
        self.completed_at = Some(Utc::now());
        self.last_error = error;
    }
}

/// Immutable projection of [`TaskState`] handed to observers. Safe to clone
/// and send across threads; carries no reference back into the queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub id: String,
    pub name: String,
    pub class: TaskClass,
    pub status: TaskStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub retry_count: u32,
}

impl Serialize for TaskClass {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            TaskClass::Scarce => serializer.serialize_str("scarce"),
            TaskClass::Data => serializer.serialize_str("data"),
        }
    }
}

impl<'de> Deserialize<'de> for TaskClass {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        match s.as_str() {
            "scarce" => Ok(TaskClass::Scarce),
            "data" => Ok(TaskClass::Data),
            other => Err(serde::de::Error::unknown_variant(other, &["scarce", "data"])),
        }
    }
}
