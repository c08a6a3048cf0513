//! Shared error type for the workflow infrastructure's outbound
//! persistence-style dependencies.

use std::error::Error as StdError;

/// Error returned by [`crate::workflow::StatePersistence`],
/// [`crate::workflow::HeartbeatPersistence`] and
/// [`crate::workflow::TenantContextAcquirer`].
///
/// Wraps the caller's underlying cause; the engine does not interpret it
/// beyond logging and, for persistence and heartbeat calls, swallowing it.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct PersistenceError(#[source] Box<dyn StdError + Send + Sync>);

impl PersistenceError {
    pub fn new(source: impl StdError + Send + Sync + 'static) -> Self {
        Self(Box::new(source))
    }
}

impl From<Box<dyn StdError + Send + Sync>> for PersistenceError {
    fn from(source: Box<dyn StdError + Send + Sync>) -> Self {
        Self(source)
    }
}

impl From<String> for PersistenceError {
    fn from(message: String) -> Self {
        Self(message.into())
    }
}

impl From<&str> for PersistenceError {
    fn from(message: &str) -> Self {
        Self(message.into())
    }
}
