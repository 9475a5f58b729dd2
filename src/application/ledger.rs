use super::locks::PoolLocks;
use crate::domain::contribution::Contribution;
use crate::domain::pool::{Member, MemberId, MemberRole, Pool, PoolId, PoolStatus};
use crate::domain::ports::{ClockRef, ContributionStoreRef, PayoutStoreRef, PoolStoreRef};
use crate::error::{EngineError, Result};
use chrono::{DateTime, Utc};
use std::collections::HashSet;

/// Read-only snapshot of one round's state.
#[derive(Debug, Clone)]
pub struct RoundState {
    pub round: u32,
    pub due_date: DateTime<Utc>,
    /// Member whose position equals the round number. Absent only while the
    /// pool is still filling up.
    pub recipient: Option<Member>,
    pub contributions: Vec<Contribution>,
    /// Size of the current member list the completeness check counts against.
    pub expected: usize,
    pub is_complete: bool,
    pub payout_processed: bool,
}

/// Durable record of pool configuration, member positions, and per-round
/// state. Exclusively owns Pool/Member state transitions; everything else
/// reads through it.
#[derive(Clone)]
pub struct PoolLedger {
    pools: PoolStoreRef,
    contributions: ContributionStoreRef,
    payouts: PayoutStoreRef,
    clock: ClockRef,
    locks: PoolLocks,
}

impl PoolLedger {
    pub fn new(
        pools: PoolStoreRef,
        contributions: ContributionStoreRef,
        payouts: PayoutStoreRef,
        clock: ClockRef,
        locks: PoolLocks,
    ) -> Self {
        Self {
            pools,
            contributions,
            payouts,
            clock,
            locks,
        }
    }

    pub async fn create_pool(&self, pool: Pool) -> Result<Pool> {
        if self.pools.get_pool(pool.id).await?.is_some() {
            return Err(EngineError::Validation(format!(
                "pool {} already exists",
                pool.id
            )));
        }
        self.pools.put_pool(pool.clone()).await?;
        tracing::info!(pool_id = pool.id, rounds = pool.total_rounds, "pool created");
        Ok(pool)
    }

    pub async fn pool(&self, pool_id: PoolId) -> Result<Pool> {
        self.pools
            .get_pool(pool_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("pool {pool_id}")))
    }

    pub async fn member(&self, member_id: MemberId) -> Result<Member> {
        self.pools
            .get_member(member_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("member {member_id}")))
    }

    pub async fn round_state(&self, pool_id: PoolId, round: u32) -> Result<RoundState> {
        let pool = self.pool(pool_id).await?;
        if round == 0 || round > pool.total_rounds {
            return Err(EngineError::Validation(format!(
                "round {round} out of range for pool {pool_id}"
            )));
        }
        let members = self.pools.pool_members(pool_id).await?;
        let contributions = self.contributions.round_contributions(pool_id, round).await?;
        let contributed: HashSet<MemberId> = contributions.iter().map(|c| c.member_id).collect();
        let is_complete =
            !members.is_empty() && members.iter().all(|m| contributed.contains(&m.id));
        Ok(RoundState {
            round,
            due_date: pool.round_due_date(round),
            recipient: members.iter().find(|m| m.position == round).cloned(),
            contributions,
            expected: members.len(),
            is_complete,
            payout_processed: self.payouts.get(pool_id, round).await?.is_some(),
        })
    }

    /// Adds a member at the next free position.
    ///
    /// Membership is capped at `total_rounds` (fixed at creation); the pool
    /// activates once a second member joins. Returns the member and whether
    /// this join activated the pool.
    pub async fn join_member(
        &self,
        pool_id: PoolId,
        member_id: MemberId,
        name: impl Into<String>,
        payout_destination: Option<String>,
    ) -> Result<(Member, bool)> {
        let _guard = self.locks.acquire(pool_id).await;

        let mut pool = self.pool(pool_id).await?;
        if pool.status == PoolStatus::Completed {
            return Err(EngineError::PoolClosed(pool_id));
        }
        if self.pools.get_member(member_id).await?.is_some() {
            return Err(EngineError::Validation(format!(
                "member {member_id} already exists"
            )));
        }
        let members = self.pools.pool_members(pool_id).await?;
        if members.len() as u32 >= pool.total_rounds {
            return Err(EngineError::PoolFull(pool_id));
        }

        let role = if member_id == pool.admin_id {
            MemberRole::Admin
        } else {
            MemberRole::Member
        };
        let position = members.len() as u32 + 1;
        let mut member = Member::new(member_id, pool_id, name, position, role, self.clock.now());
        member.payout_destination = payout_destination;
        self.pools.put_member(member.clone()).await?;

        let activated = pool.status == PoolStatus::Pending && members.len() + 1 >= 2;
        if activated {
            pool.status = PoolStatus::Active;
            self.pools.put_pool(pool).await?;
            tracing::info!(pool_id, "pool activated");
        }
        Ok((member, activated))
    }

    /// Moves the pool to the next round, or completes it after the final one.
    ///
    /// Refused unless the current round's payout event exists: a round can
    /// never be skipped without its payout.
    pub async fn advance_round(&self, pool_id: PoolId) -> Result<Pool> {
        let _guard = self.locks.acquire(pool_id).await;
        self.advance_round_locked(pool_id).await
    }

    /// Same as [`advance_round`](Self::advance_round) but assumes the caller
    /// already holds the pool lock (the payout path advances inside its own
    /// critical section).
    pub(crate) async fn advance_round_locked(&self, pool_id: PoolId) -> Result<Pool> {
        let mut pool = self.pool(pool_id).await?;
        if pool.status != PoolStatus::Active {
            return Err(EngineError::InvalidTransition(format!(
                "pool {pool_id} is not active"
            )));
        }
        if self.payouts.get(pool_id, pool.current_round).await?.is_none() {
            return Err(EngineError::InvalidTransition(format!(
                "round {} of pool {pool_id} has no payout recorded",
                pool.current_round
            )));
        }
        pool.current_round += 1;
        if pool.current_round > pool.total_rounds {
            pool.status = PoolStatus::Completed;
            tracing::info!(pool_id, "pool completed");
        }
        self.pools.put_pool(pool.clone()).await?;
        Ok(pool)
    }
}
