//! Per-workflow infrastructure: ownership heartbeat, debounced state writer,
//! the registry tying them (and a workflow's queue) together, and the
//! shutdown coordinator that tears all of it down within a deadline.

mod error;
mod heartbeat;
mod registry;
mod shutdown;
mod writer;

pub use error::PersistenceError;
pub use heartbeat::{
    HeartbeatError, HeartbeatHandle, HeartbeatPersistence, TenantContextAcquirer,
    TenantContextGuard, HEARTBEAT_INTERVAL,
};
pub use registry::WorkflowInfrastructure;
pub use shutdown::{shutdown, CleanupCallback, ShutdownError};
pub use writer::{SendOutcome, StatePersistence, Update, WriterHandle, WRITER_BUFFER};
