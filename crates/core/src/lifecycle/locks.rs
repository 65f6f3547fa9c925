use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::domain::ticket::RequesterId;

/// Lock table keyed by requester identity.
///
/// Requests for the same requester run one at a time; unrelated requesters
/// never wait on each other. Slots are held weakly and pruned once no holder
/// or waiter references them.
#[derive(Default)]
pub struct RequesterLocks {
    slots: Mutex<HashMap<RequesterId, Weak<AsyncMutex<()>>>>,
}

pub struct RequesterGuard {
    _guard: OwnedMutexGuard<()>,
}

impl RequesterLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, requester_id: &RequesterId) -> RequesterGuard {
        let slot = self.slot(requester_id);
        RequesterGuard { _guard: slot.lock_owned().await }
    }

    /// Number of requesters with a live slot.
    pub fn active(&self) -> usize {
        let mut slots = match self.slots.lock() {
            Ok(slots) => slots,
            Err(poisoned) => poisoned.into_inner(),
        };
        slots.retain(|_, slot| slot.strong_count() > 0);
        slots.len()
    }

    fn slot(&self, requester_id: &RequesterId) -> Arc<AsyncMutex<()>> {
        let mut slots = match self.slots.lock() {
            Ok(slots) => slots,
            Err(poisoned) => poisoned.into_inner(),
        };
        slots.retain(|_, slot| slot.strong_count() > 0);

        if let Some(existing) = slots.get(requester_id).and_then(Weak::upgrade) {
            return existing;
        }

        let fresh = Arc::new(AsyncMutex::new(()));
        slots.insert(requester_id.clone(), Arc::downgrade(&fresh));
        fresh
    }
}
