use super::locks::PoolLocks;
use crate::domain::pool::{Member, MemberId, PoolId, PoolStatus};
use crate::domain::ports::PoolStoreRef;
use crate::error::{EngineError, Result};
use std::collections::HashSet;

/// Validates and applies reorderings of the payout rotation.
///
/// Only members who have not yet received a payout can move; completed
/// rounds keep their historical recipients and payout events untouched.
/// Runs under the pool lock so it never interleaves with a payout in
/// flight. Future rounds' due dates and recipients are derived from
/// position, so rewriting positions is the whole job.
#[derive(Clone)]
pub struct PositionManager {
    pools: PoolStoreRef,
    locks: PoolLocks,
}

impl PositionManager {
    pub fn new(pools: PoolStoreRef, locks: PoolLocks) -> Self {
        Self { pools, locks }
    }

    /// Reassigns the not-yet-paid members' positions to follow `new_order`.
    ///
    /// `new_order` must be a permutation of exactly the members still owed a
    /// payout; anything else fails with `InvalidPermutation`. The freed
    /// positions are refilled in ascending order, so the dense `1..=N`
    /// permutation invariant is preserved.
    pub async fn reorder_positions(
        &self,
        pool_id: PoolId,
        new_order: &[MemberId],
    ) -> Result<Vec<Member>> {
        let _guard = self.locks.acquire(pool_id).await;

        let pool = self
            .pools
            .get_pool(pool_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("pool {pool_id}")))?;
        if pool.status == PoolStatus::Completed {
            return Err(EngineError::PoolClosed(pool_id));
        }

        let members = self.pools.pool_members(pool_id).await?;
        let unpaid: Vec<&Member> = members.iter().filter(|m| !m.payout_received).collect();

        let expected: HashSet<MemberId> = unpaid.iter().map(|m| m.id).collect();
        let proposed: HashSet<MemberId> = new_order.iter().copied().collect();
        if proposed.len() != new_order.len() {
            return Err(EngineError::InvalidPermutation(
                "duplicate member ids in new order".to_string(),
            ));
        }
        if proposed != expected {
            return Err(EngineError::InvalidPermutation(format!(
                "new order must contain exactly the {} members still awaiting a payout",
                expected.len()
            )));
        }

        // Refill the positions the unpaid members currently hold, lowest
        // first; paid members' positions are never touched.
        let mut free_positions: Vec<u32> = unpaid.iter().map(|m| m.position).collect();
        free_positions.sort_unstable();

        let mut updated = Vec::with_capacity(new_order.len());
        for (position, member_id) in free_positions.into_iter().zip(new_order) {
            let mut member = members
                .iter()
                .find(|m| m.id == *member_id)
                .cloned()
                .ok_or_else(|| {
                    EngineError::InvalidPermutation(format!("unknown member {member_id}"))
                })?;
            if member.position != position {
                member.position = position;
                self.pools.put_member(member.clone()).await?;
            }
            updated.push(member);
        }
        tracing::info!(pool_id, reordered = updated.len(), "positions reordered");
        Ok(updated)
    }
}
