//! # In-Flight Guard
//!
//! Marks a sub-resource as "pass running" so overlapping invocations skip it
//! instead of racing on the watermark.
//!
//! ```text
//! tick 1: try_acquire("mrc1") → Some(guard) ── pass runs ──────────► drop
//! tick 2:          try_acquire("mrc1") → None   (Skipped(InFlight))
//! tick 3:                                          try_acquire → Some
//! ```
//!
//! The marker is released when the guard drops, including on panic or
//! early return.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

/// Set of sub-resources with a pass in progress.
#[derive(Debug, Clone, Default)]
pub struct InFlight {
    active: Arc<Mutex<HashSet<String>>>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `subresource_id`, or returns `None` if it is already claimed.
    pub fn try_acquire(&self, subresource_id: &str) -> Option<InFlightGuard> {
        let mut active = lock(&self.active);
        if !active.insert(subresource_id.to_string()) {
            return None;
        }
        Some(InFlightGuard {
            subresource_id: subresource_id.to_string(),
            active: Arc::clone(&self.active),
        })
    }

    pub fn is_active(&self, subresource_id: &str) -> bool {
        lock(&self.active).contains(subresource_id)
    }
}

fn lock(set: &Mutex<HashSet<String>>) -> MutexGuard<'_, HashSet<String>> {
    // the set stays consistent even if a holder panicked
    set.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Claim on one sub-resource; released on drop.
#[derive(Debug)]
pub struct InFlightGuard {
    subresource_id: String,
    active: Arc<Mutex<HashSet<String>>>,
}

impl InFlightGuard {
    pub fn subresource_id(&self) -> &str {
        &self.subresource_id
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        lock(&self.active).remove(&self.subresource_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_is_refused_until_drop() {
        let in_flight = InFlight::new();

        let guard = in_flight.try_acquire("mrc1").unwrap();
        assert_eq!(guard.subresource_id(), "mrc1");
        assert!(in_flight.is_active("mrc1"));
        assert!(in_flight.try_acquire("mrc1").is_none());

        // other sub-resources are independent
        let other = in_flight.try_acquire("mrc2");
        assert!(other.is_some());

        drop(guard);
        assert!(!in_flight.is_active("mrc1"));
        assert!(in_flight.try_acquire("mrc1").is_some());
    }

    #[test]
    fn test_clones_share_state() {
        let a = InFlight::new();
        let b = a.clone();

        let _guard = a.try_acquire("eco1").unwrap();
        assert!(b.try_acquire("eco1").is_none());
    }
}
