//! At-most-one active processing task per request id.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use crate::types::request::RequestId;

#[derive(Debug, Default)]
struct Inner {
    in_flight: Mutex<HashSet<RequestId>>,
}

/// In-flight membership shared by the engine and every task it spawns.
#[derive(Debug, Clone, Default)]
pub struct AdmissionTracker {
    inner: Arc<Inner>,
}

impl AdmissionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically check and insert `id`. Returns false while `id` is in flight.
    pub fn admit(&self, id: RequestId) -> bool {
        self.inner
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id)
    }

    /// Like [`admit`](Self::admit), but hands back a guard that releases the
    /// id when dropped, on every exit path of the owning task.
    pub fn try_admit(&self, id: RequestId) -> Option<AdmissionGuard> {
        self.admit(id).then(|| AdmissionGuard {
            tracker: self.clone(),
            id,
        })
    }

    pub fn release(&self, id: &RequestId) {
        self.inner
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
    }

    pub fn len(&self) -> usize {
        self.inner
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Scoped admission. Dropping it releases the id exactly once.
#[derive(Debug)]
pub struct AdmissionGuard {
    tracker: AdmissionTracker,
    id: RequestId,
}

impl Drop for AdmissionGuard {
    fn drop(&mut self) {
        self.tracker.release(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::B256;

    #[test]
    fn test_second_admit_is_refused() {
        let tracker = AdmissionTracker::new();
        let id = B256::repeat_byte(1);
        assert_eq!((tracker.admit(id), tracker.admit(id)), (true, false));
    }

    #[test]
    fn test_release_makes_id_admissible_again() {
        let tracker = AdmissionTracker::new();
        let id = B256::repeat_byte(2);
        assert!(tracker.admit(id));
        tracker.release(&id);
        assert!(tracker.admit(id));
    }

    #[test]
    fn test_guard_releases_on_drop() {
        let tracker = AdmissionTracker::new();
        let id = B256::repeat_byte(3);

        let guard = tracker.try_admit(id).unwrap();
        assert!(tracker.try_admit(id).is_none());
        assert_eq!(tracker.len(), 1);

        drop(guard);
        assert_eq!(tracker.len(), 0);
        assert!(tracker.try_admit(id).is_some());
    }

    #[test]
    fn test_concurrent_admits_yield_single_winner() {
        let tracker = AdmissionTracker::new();
        let id = B256::repeat_byte(4);

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let tracker = tracker.clone();
                std::thread::spawn(move || tracker.admit(id))
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|admitted| *admitted)
            .count();

        assert_eq!(winners, 1);
    }
}
