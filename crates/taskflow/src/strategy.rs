//! Concurrency strategies: decide whether a pending task of a given class
//! may start, and track in-flight counts per lane.
//!
//! Modeled as a closed tagged variant rather than a trait object, per the
//! teacher's preference for sum types over small closed interfaces (see
//! `WorkflowAction`, `CircuitState` in the reference crate).

use crate::task::TaskClass;

/// Decides admission of pending tasks into the scarce and data lanes.
#[derive(Debug, Clone)]
pub enum ConcurrencyStrategy {
    /// At most one scarce task and one data task running at a time.
    Serialized { running_scarce: u32, running_data: u32 },
    /// Unbounded scarce concurrency; data lane still serialized.
    ParallelScarce { running_data: u32 },
    /// Up to `limit` scarce tasks concurrently; data lane still serialized.
    ThrottledScarce {
        limit: u32,
        running_scarce: u32,
        running_data: u32,
    },
}

impl ConcurrencyStrategy {
    /// At most one task per lane running concurrently.
    pub fn serialized() -> Self {
        Self::Serialized {
            running_scarce: 0,
            running_data: 0,
        }
    }

    /// Unbounded scarce-lane concurrency; data lane still serialized.
    pub fn parallel_scarce() -> Self {
        Self::ParallelScarce { running_data: 0 }
    }

    /// Up to `limit` scarce tasks concurrently (clamped to at least 1).
    pub fn throttled_scarce(limit: i64) -> Self {
        Self::ThrottledScarce {
            limit: limit.max(1) as u32,
            running_scarce: 0,
            running_data: 0,
        }
    }

    /// May a pending task of `class` start right now?
    pub fn may_start(&self, class: TaskClass) -> bool {
        match (self, class) {
            (Self::Serialized { running_scarce, .. }, TaskClass::Scarce) => *running_scarce == 0,
            (Self::Serialized { running_data, .. }, TaskClass::Data) => *running_data == 0,
            (Self::ParallelScarce { .. }, TaskClass::Scarce) => true,
            (Self::ParallelScarce { running_data }, TaskClass::Data) => *running_data == 0,
            (Self::ThrottledScarce { limit, running_scarce, .. }, TaskClass::Scarce) => {
                running_scarce < limit
            }
            (Self::ThrottledScarce { running_data, .. }, TaskClass::Data) => *running_data == 0,
        }
    }

    /// Record that a task of `class` has started. Caller must have already
    /// checked [`Self::may_start`] under the same lock.
    pub fn on_start(&mut self, class: TaskClass) {
        match (self, class) {
            (Self::Serialized { running_scarce, .. }, TaskClass::Scarce) => *running_scarce += 1,
            (Self::Serialized { running_data, .. }, TaskClass::Data) => *running_data += 1,
            (Self::ParallelScarce { .. }, TaskClass::Scarce) => {}
            (Self::ParallelScarce { running_data }, TaskClass::Data) => *running_data += 1,
            (Self::ThrottledScarce { running_scarce, .. }, TaskClass::Scarce) => {
                *running_scarce += 1
            }
            (Self::ThrottledScarce { running_data, .. }, TaskClass::Data) => *running_data += 1,
        }
    }

    /// Record that a running task of `class` has finished (success, failure,
    /// or cancellation — anything that stops occupying the lane).
    pub fn on_complete(&mut self, class: TaskClass) {
        match (self, class) {
            (Self::Serialized { running_scarce, .. }, TaskClass::Scarce) => {
                *running_scarce = running_scarce.saturating_sub(1)
            }
            (Self::Serialized { running_data, .. }, TaskClass::Data) => {
                *running_data = running_data.saturating_sub(1)
            }
            (Self::ParallelScarce { .. }, TaskClass::Scarce) => {}
            (Self::ParallelScarce { running_data }, TaskClass::Data) => {
                *running_data = running_data.saturating_sub(1)
            }
            (Self::ThrottledScarce { running_scarce, .. }, TaskClass::Scarce) => {
                *running_scarce = running_scarce.saturating_sub(1)
            }
            (Self::ThrottledScarce { running_data, .. }, TaskClass::Data) => {
                *running_data = running_data.saturating_sub(1)
            }
        }
    }
}

impl Default for ConcurrencyStrategy {
    fn default() -> Self {
        Self::serialized()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use TaskClass::{Data, Scarce};

    #[test]
    fn serialized_allows_one_per_lane() {
        let mut s = ConcurrencyStrategy::serialized();
        assert!(s.may_start(Scarce));
        s.on_start(Scarce);
        assert!(!s.may_start(Scarce));
        assert!(s.may_start(Data));
        s.on_start(Data);
        assert!(!s.may_start(Data));

        s.on_complete(Scarce);
        assert!(s.may_start(Scarce));
    }

    #[test]
    fn parallel_scarce_is_unbounded() {
        let mut s = ConcurrencyStrategy::parallel_scarce();
        for _ in 0..50 {
            assert!(s.may_start(Scarce));
            s.on_start(Scarce);
        }
        assert!(s.may_start(Data));
        s.on_start(Data);
        assert!(!s.may_start(Data));
    }

    #[test]
    fn throttled_scarce_respects_limit() {
        let mut s = ConcurrencyStrategy::throttled_scarce(2);
        assert!(s.may_start(Scarce));
        s.on_start(Scarce);
        assert!(s.may_start(Scarce));
        s.on_start(Scarce);
        assert!(!s.may_start(Scarce));

        s.on_complete(Scarce);
        assert!(s.may_start(Scarce));
    }

    #[test]
    fn throttled_scarce_clamps_nonpositive_limits() {
        assert!(matches!(
            ConcurrencyStrategy::throttled_scarce(0),
            ConcurrencyStrategy::ThrottledScarce { limit: 1, .. }
        ));
        assert!(matches!(
            ConcurrencyStrategy::throttled_scarce(-5),
            ConcurrencyStrategy::ThrottledScarce { limit: 1, .. }
        ));
    }
}
