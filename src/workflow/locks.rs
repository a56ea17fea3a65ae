use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::domain::RequestId;

/// Per-request async mutexes. Different requests never contend.
#[derive(Debug, Default, Clone)]
pub struct RequestLocks {
    locks: Arc<DashMap<RequestId, Arc<Mutex<()>>>>,
}

impl RequestLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, id: &RequestId) -> Arc<Mutex<()>> {
        self.locks
            .entry(id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    pub async fn acquire(&self, id: &RequestId) -> OwnedMutexGuard<()> {
        self.slot(id).lock_owned().await
    }

    pub fn try_acquire(&self, id: &RequestId) -> Option<OwnedMutexGuard<()>> {
        self.slot(id).try_lock_owned().ok()
    }

    /// Drop entries nobody holds or waits on.
    pub fn prune(&self) {
        self.locks.retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
