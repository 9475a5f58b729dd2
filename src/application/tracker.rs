use super::locks::PoolLocks;
use crate::domain::contribution::{Contribution, ContributionSource};
use crate::domain::pool::{Member, MemberId, PoolId};
use crate::domain::ports::{ClockRef, ContributionStoreRef, PoolStoreRef};
use crate::error::{EngineError, Result};
use std::collections::HashSet;

/// Sole writer of contribution rows.
///
/// Triggered by the scheduler on a completed collection or by an external
/// manual-confirmation call; either way the write path is the same.
#[derive(Clone)]
pub struct ContributionTracker {
    pools: PoolStoreRef,
    contributions: ContributionStoreRef,
    clock: ClockRef,
    locks: PoolLocks,
}

impl ContributionTracker {
    pub fn new(
        pools: PoolStoreRef,
        contributions: ContributionStoreRef,
        clock: ClockRef,
        locks: PoolLocks,
    ) -> Self {
        Self {
            pools,
            contributions,
            clock,
            locks,
        }
    }

    /// Records a member's contribution to a round.
    ///
    /// Idempotent: a second call for the same (round, member) returns the
    /// existing row untouched and never double-counts stats. The first write
    /// wins, including its `source`. On-time vs missed is judged against the
    /// round's due date.
    pub async fn record_contribution(
        &self,
        pool_id: PoolId,
        round: u32,
        member_id: MemberId,
        source: ContributionSource,
    ) -> Result<Contribution> {
        let _guard = self.locks.acquire(pool_id).await;

        let pool = self
            .pools
            .get_pool(pool_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("pool {pool_id}")))?;
        if round == 0 || round > pool.total_rounds {
            return Err(EngineError::Validation(format!(
                "round {round} out of range for pool {pool_id}"
            )));
        }
        let mut member = self
            .pools
            .get_member(member_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("member {member_id}")))?;
        if member.pool_id != pool_id {
            return Err(EngineError::Validation(format!(
                "member {member_id} does not belong to pool {pool_id}"
            )));
        }

        if let Some(existing) = self.contributions.get(pool_id, round, member_id).await? {
            return Ok(existing);
        }

        let now = self.clock.now();
        let contribution = Contribution {
            pool_id,
            round,
            member_id,
            contributed_at: now,
            source,
        };
        self.contributions.put(contribution.clone()).await?;

        let on_time = now <= pool.round_due_date(round);
        member.record_payment(pool.contribution_amount.value(), on_time);
        self.pools.put_member(member).await?;

        tracing::debug!(pool_id, round, member_id, ?source, on_time, "contribution recorded");
        Ok(contribution)
    }

    /// True iff every member of the *current* member list has a contribution
    /// row for the round (the recipient included). A mid-round position
    /// change cannot skew this: it counts members, not positions.
    pub async fn is_round_complete(&self, pool_id: PoolId, round: u32) -> Result<bool> {
        let members = self.pools.pool_members(pool_id).await?;
        if members.is_empty() {
            return Ok(false);
        }
        Ok(self.missing(&members, pool_id, round).await?.is_empty())
    }

    /// Members of the round with no contribution yet, in position order.
    pub async fn missing_members(&self, pool_id: PoolId, round: u32) -> Result<Vec<Member>> {
        let members = self.pools.pool_members(pool_id).await?;
        self.missing(&members, pool_id, round).await
    }

    async fn missing(
        &self,
        members: &[Member],
        pool_id: PoolId,
        round: u32,
    ) -> Result<Vec<Member>> {
        let contributed: HashSet<MemberId> = self
            .contributions
            .round_contributions(pool_id, round)
            .await?
            .iter()
            .map(|c| c.member_id)
            .collect();
        Ok(members
            .iter()
            .filter(|m| !contributed.contains(&m.id))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ledger::PoolLedger;
    use crate::domain::pool::{Amount, Frequency, Pool};
    use crate::infrastructure::in_memory::{InMemoryStore, SystemClock};
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    async fn tracker_with_pool() -> (ContributionTracker, PoolLedger) {
        let store = Arc::new(InMemoryStore::new());
        let clock: ClockRef = Arc::new(SystemClock);
        let locks = PoolLocks::new();
        let ledger = PoolLedger::new(
            store.clone(),
            store.clone(),
            store.clone(),
            clock.clone(),
            locks.clone(),
        );
        let tracker = ContributionTracker::new(store.clone(), store, clock, locks);

        let pool = Pool::new(
            1,
            "tanda",
            10,
            Amount::new(dec!(10)).unwrap(),
            dec!(0),
            Frequency::Weekly,
            chrono::Utc::now() + chrono::Duration::days(1),
            3,
        )
        .unwrap();
        ledger.create_pool(pool).await.unwrap();
        for (id, name) in [(10, "Ana"), (11, "Bea"), (12, "Carla")] {
            ledger.join_member(1, id, name, None).await.unwrap();
        }
        (tracker, ledger)
    }

    #[tokio::test]
    async fn test_record_is_idempotent() {
        let (tracker, ledger) = tracker_with_pool().await;

        let first = tracker
            .record_contribution(1, 1, 11, ContributionSource::Collection)
            .await
            .unwrap();
        let second = tracker
            .record_contribution(1, 1, 11, ContributionSource::ManualConfirm)
            .await
            .unwrap();

        // Same row back; first write's source wins
        assert_eq!(first, second);
        assert_eq!(second.source, ContributionSource::Collection);

        // Stats incremented exactly once
        let member = ledger.member(11).await.unwrap();
        assert_eq!(member.payments_on_time, 1);
        assert_eq!(member.payments_missed, 0);
        assert_eq!(member.total_contributed, dec!(10));
    }

    #[tokio::test]
    async fn test_late_contribution_counts_as_missed() {
        let store = Arc::new(InMemoryStore::new());
        let clock: ClockRef = Arc::new(SystemClock);
        let locks = PoolLocks::new();
        let ledger = PoolLedger::new(
            store.clone(),
            store.clone(),
            store.clone(),
            clock.clone(),
            locks.clone(),
        );
        let tracker = ContributionTracker::new(store.clone(), store, clock, locks);

        // Round 1 was due a week ago
        let pool = Pool::new(
            1,
            "tanda",
            10,
            Amount::new(dec!(10)).unwrap(),
            dec!(0),
            Frequency::Weekly,
            chrono::Utc::now() - chrono::Duration::weeks(1),
            2,
        )
        .unwrap();
        ledger.create_pool(pool).await.unwrap();
        ledger.join_member(1, 10, "Ana", None).await.unwrap();
        ledger.join_member(1, 11, "Bea", None).await.unwrap();

        tracker
            .record_contribution(1, 1, 10, ContributionSource::ManualConfirm)
            .await
            .unwrap();
        let member = ledger.member(10).await.unwrap();
        assert_eq!(member.payments_missed, 1);
        assert_eq!(member.payments_on_time, 0);
    }

    #[tokio::test]
    async fn test_round_completeness_includes_recipient() {
        let (tracker, _) = tracker_with_pool().await;

        // Members 11 and 12 contribute; 10 is round 1's recipient and still owes
        for member_id in [11, 12] {
            tracker
                .record_contribution(1, 1, member_id, ContributionSource::Collection)
                .await
                .unwrap();
        }
        assert!(!tracker.is_round_complete(1, 1).await.unwrap());
        let missing = tracker.missing_members(1, 1).await.unwrap();
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].id, 10);

        tracker
            .record_contribution(1, 1, 10, ContributionSource::Collection)
            .await
            .unwrap();
        assert!(tracker.is_round_complete(1, 1).await.unwrap());
    }

    #[tokio::test]
    async fn test_rejects_foreign_member() {
        let (tracker, ledger) = tracker_with_pool().await;
        let other = Pool::new(
            2,
            "otra",
            20,
            Amount::new(dec!(5)).unwrap(),
            dec!(0),
            Frequency::Weekly,
            chrono::Utc::now(),
            2,
        )
        .unwrap();
        ledger.create_pool(other).await.unwrap();
        ledger.join_member(2, 20, "Zoe", None).await.unwrap();

        let err = tracker
            .record_contribution(1, 1, 20, ContributionSource::Collection)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }
}
