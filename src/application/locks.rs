use crate::domain::pool::PoolId;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Per-pool mutual-exclusion registry.
///
/// Every write touching a pool's round/payout state runs under that pool's
/// lock so payouts, round advancement, and position reordering never
/// interleave for the same pool. Single-node stand-in for row-level locking
/// on the pool record; collections for different members stay concurrent.
#[derive(Default, Clone)]
pub struct PoolLocks {
    inner: Arc<Mutex<HashMap<PoolId, Arc<Mutex<()>>>>>,
}

impl PoolLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, pool_id: PoolId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().await;
            map.entry(pool_id).or_default().clone()
        };
        lock.lock_owned().await
    }
}
