//! Process-wide registry of per-workflow infrastructure.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use crate::queue::Queue;
use crate::workflow::heartbeat::{HeartbeatError, HeartbeatHandle};
use crate::workflow::writer::WriterHandle;
use std::sync::Arc;

/// Process-wide registry keyed by workflow identifier.
///
/// Carries a process-unique `server_instance_id`, generated once at
/// construction, used as the ownership token the heartbeat loop renews.
/// No automatic lifecycle beyond storage: queues, writers and heartbeats
/// are owned by whoever called `store`, until `delete` removes the entry.
pub struct WorkflowInfrastructure {
    server_instance_id: String,
    queues: DashMap<String, Arc<Queue>>,
    writers: DashMap<String, Arc<WriterHandle>>,
    heartbeats: DashMap<String, Arc<HeartbeatHandle>>,
}

impl WorkflowInfrastructure {
    pub fn new() -> Self {
        Self {
            server_instance_id: Uuid::now_v7().to_string(),
            queues: DashMap::new(),
            writers: DashMap::new(),
            heartbeats: DashMap::new(),
        }
    }

    /// This process's ownership token, used in heartbeat renewal.
    pub fn server_instance_id(&self) -> &str {
        &self.server_instance_id
    }

    pub fn store_queue(&self, workflow_id: impl Into<String>, queue: Arc<Queue>) {
        self.queues.insert(workflow_id.into(), queue);
    }

    pub fn load_queue(&self, workflow_id: &str) -> Option<Arc<Queue>> {
        self.queues.get(workflow_id).map(|entry| entry.value().clone())
    }

    pub fn delete_queue(&self, workflow_id: &str) -> Option<Arc<Queue>> {
        self.queues.remove(workflow_id).map(|(_, q)| q)
    }

    pub fn store_writer(&self, workflow_id: impl Into<String>, writer: Arc<WriterHandle>) {
        self.writers.insert(workflow_id.into(), writer);
    }

    pub fn load_writer(&self, workflow_id: &str) -> Option<Arc<WriterHandle>> {
        self.writers.get(workflow_id).map(|entry| entry.value().clone())
    }

    pub fn delete_writer(&self, workflow_id: &str) -> Option<Arc<WriterHandle>> {
        self.writers.remove(workflow_id).map(|(_, w)| w)
    }

    /// Register a workflow's heartbeat handle. Exactly one heartbeat may be
    /// registered per workflow at a time: a second registration for a
    /// workflow whose previous handle was never removed via
    /// [`Self::delete_heartbeat`] fails rather than silently replacing it.
    pub fn store_heartbeat(
        &self,
        workflow_id: impl Into<String>,
        heartbeat: Arc<HeartbeatHandle>,
    ) -> Result<(), HeartbeatError> {
        match self.heartbeats.entry(workflow_id.into()) {
            Entry::Occupied(_) => Err(HeartbeatError::AlreadyStarted),
            Entry::Vacant(slot) => {
                slot.insert(heartbeat);
                Ok(())
            }
        }
    }

    pub fn load_heartbeat(&self, workflow_id: &str) -> Option<Arc<HeartbeatHandle>> {
        self.heartbeats.get(workflow_id).map(|entry| entry.value().clone())
    }

    pub fn delete_heartbeat(&self, workflow_id: &str) -> Option<Arc<HeartbeatHandle>> {
        self.heartbeats.remove(workflow_id).map(|(_, h)| h)
    }

    /// Every workflow id currently holding a queue entry.
    pub fn workflow_ids(&self) -> Vec<String> {
        self.queues.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }
}

impl Default for WorkflowInfrastructure {
    fn default() -> Self {
        Self::new()
    }
}
