//! Application layer: the five engine components and the facade that wires
//! them together over a shared set of storage ports and the per-pool locks.

pub mod ledger;
pub mod locks;
pub mod payouts;
pub mod positions;
pub mod queries;
pub mod scheduler;
pub mod tracker;

use crate::config::CollectionPolicy;
use crate::domain::contribution::{Contribution, ContributionSource};
use crate::domain::payout::PayoutEvent;
use crate::domain::pool::{Member, MemberId, Pool, PoolId, PoolStatus};
use crate::domain::ports::{
    ClockRef, CollectionStore, CollectionStoreRef, ContributionStore, ContributionStoreRef,
    NotifierRef, PaymentProcessorRef, PayoutStore, PayoutStoreRef, PoolStore, PoolStoreRef,
};
use crate::error::Result;
use ledger::PoolLedger;
use locks::PoolLocks;
use payouts::PayoutEngine;
use positions::PositionManager;
use queries::QuerySurface;
use scheduler::CollectionScheduler;
use std::sync::Arc;
use tracker::ContributionTracker;

/// The rotation engine: one facade over the ledger, tracker, scheduler,
/// payout engine, position manager, and query surface.
///
/// The facade owns the cross-component choreography (activating a pool
/// schedules round 1's collections, a processed payout opens the next
/// round) while each component stays independently usable.
#[derive(Clone)]
pub struct Engine {
    pub ledger: PoolLedger,
    pub tracker: ContributionTracker,
    pub scheduler: CollectionScheduler,
    pub payouts: PayoutEngine,
    pub positions: PositionManager,
    pub queries: QuerySurface,
}

impl Engine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pools: PoolStoreRef,
        contributions: ContributionStoreRef,
        collections: CollectionStoreRef,
        payouts: PayoutStoreRef,
        processor: PaymentProcessorRef,
        notifier: NotifierRef,
        clock: ClockRef,
        policy: CollectionPolicy,
    ) -> Self {
        let locks = PoolLocks::new();
        let ledger = PoolLedger::new(
            pools.clone(),
            contributions.clone(),
            payouts.clone(),
            clock.clone(),
            locks.clone(),
        );
        let tracker = ContributionTracker::new(
            pools.clone(),
            contributions.clone(),
            clock.clone(),
            locks.clone(),
        );
        let scheduler = CollectionScheduler::new(
            pools.clone(),
            contributions.clone(),
            collections.clone(),
            tracker.clone(),
            processor,
            notifier.clone(),
            clock.clone(),
            policy,
        );
        let payout_engine = PayoutEngine::new(
            pools.clone(),
            payouts.clone(),
            tracker.clone(),
            ledger.clone(),
            notifier,
            clock.clone(),
            locks.clone(),
        );
        let positions = PositionManager::new(pools.clone(), locks);
        let queries = QuerySurface::new(pools, contributions, collections, payouts, tracker.clone(), clock);
        Self {
            ledger,
            tracker,
            scheduler,
            payouts: payout_engine,
            positions,
            queries,
        }
    }

    /// Convenience constructor for a backend that implements all four
    /// storage ports (the in-memory and RocksDB stores both do).
    pub fn with_store<S>(
        store: Arc<S>,
        processor: PaymentProcessorRef,
        notifier: NotifierRef,
        clock: ClockRef,
        policy: CollectionPolicy,
    ) -> Self
    where
        S: PoolStore + ContributionStore + CollectionStore + PayoutStore + 'static,
    {
        Self::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store,
            processor,
            notifier,
            clock,
            policy,
        )
    }

    pub async fn create_pool(&self, pool: Pool) -> Result<Pool> {
        self.ledger.create_pool(pool).await
    }

    /// Adds a member. Once the pool is active (whether this join activated
    /// it or it already was), the current round's collections are topped up
    /// so the newcomer gets an obligation too.
    pub async fn join_member(
        &self,
        pool_id: PoolId,
        member_id: MemberId,
        name: impl Into<String>,
        payout_destination: Option<String>,
    ) -> Result<Member> {
        let (member, _activated) = self
            .ledger
            .join_member(pool_id, member_id, name, payout_destination)
            .await?;
        self.open_current_round(pool_id).await?;
        Ok(member)
    }

    /// Manual-confirmation entry point for a member's contribution.
    pub async fn record_contribution(
        &self,
        pool_id: PoolId,
        round: u32,
        member_id: MemberId,
        source: ContributionSource,
    ) -> Result<Contribution> {
        self.tracker
            .record_contribution(pool_id, round, member_id, source)
            .await
    }

    /// Pays out the current round and opens the next one.
    pub async fn process_payout(&self, pool_id: PoolId, actor_id: MemberId) -> Result<PayoutEvent> {
        let event = self.payouts.process_payout(pool_id, actor_id).await?;
        self.open_current_round(pool_id).await?;
        Ok(event)
    }

    /// Admin-triggered early payout; same round-opening choreography.
    pub async fn initiate_early_payout(
        &self,
        pool_id: PoolId,
        actor_id: MemberId,
        reason: Option<String>,
    ) -> Result<PayoutEvent> {
        let event = self
            .payouts
            .initiate_early_payout(pool_id, actor_id, reason)
            .await?;
        self.open_current_round(pool_id).await?;
        Ok(event)
    }

    /// Schedules collections for the pool's current round, unless the pool
    /// has completed.
    async fn open_current_round(&self, pool_id: PoolId) -> Result<()> {
        let pool = self.ledger.pool(pool_id).await?;
        if pool.status == PoolStatus::Active {
            self.scheduler
                .schedule_round(pool_id, pool.current_round)
                .await?;
        }
        Ok(())
    }
}
