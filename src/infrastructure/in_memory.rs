use crate::domain::collection::{Collection, CollectionId, CollectionStatus};
use crate::domain::contribution::Contribution;
use crate::domain::payout::PayoutEvent;
use crate::domain::pool::{Member, MemberId, Pool, PoolId};
use crate::domain::ports::{
    Clock, CollectionStore, ContributionStore, PayoutStore, PoolStore,
};
use crate::error::{EngineError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

/// Thread-safe in-memory backend implementing every storage port.
///
/// One `RwLock<HashMap>` per entity; wrap in an `Arc` to share. Suits tests
/// and single-node deployments that do not need durability.
#[derive(Default)]
pub struct InMemoryStore {
    pools: RwLock<HashMap<PoolId, Pool>>,
    members: RwLock<HashMap<MemberId, Member>>,
    contributions: RwLock<HashMap<(PoolId, u32, MemberId), Contribution>>,
    collections: RwLock<HashMap<CollectionId, Collection>>,
    payouts: RwLock<HashMap<(PoolId, u32), PayoutEvent>>,
    next_collection_id: AtomicU64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PoolStore for InMemoryStore {
    async fn get_pool(&self, pool_id: PoolId) -> Result<Option<Pool>> {
        Ok(self.pools.read().await.get(&pool_id).cloned())
    }

    async fn put_pool(&self, pool: Pool) -> Result<()> {
        self.pools.write().await.insert(pool.id, pool);
        Ok(())
    }

    async fn get_member(&self, member_id: MemberId) -> Result<Option<Member>> {
        Ok(self.members.read().await.get(&member_id).cloned())
    }

    async fn put_member(&self, member: Member) -> Result<()> {
        self.members.write().await.insert(member.id, member);
        Ok(())
    }

    async fn pool_members(&self, pool_id: PoolId) -> Result<Vec<Member>> {
        let mut members: Vec<Member> = self
            .members
            .read()
            .await
            .values()
            .filter(|m| m.pool_id == pool_id)
            .cloned()
            .collect();
        members.sort_by_key(|m| m.position);
        Ok(members)
    }
}

#[async_trait]
impl ContributionStore for InMemoryStore {
    async fn get(
        &self,
        pool_id: PoolId,
        round: u32,
        member_id: MemberId,
    ) -> Result<Option<Contribution>> {
        Ok(self
            .contributions
            .read()
            .await
            .get(&(pool_id, round, member_id))
            .cloned())
    }

    async fn put(&self, contribution: Contribution) -> Result<()> {
        self.contributions.write().await.insert(
            (
                contribution.pool_id,
                contribution.round,
                contribution.member_id,
            ),
            contribution,
        );
        Ok(())
    }

    async fn round_contributions(&self, pool_id: PoolId, round: u32) -> Result<Vec<Contribution>> {
        Ok(self
            .contributions
            .read()
            .await
            .values()
            .filter(|c| c.pool_id == pool_id && c.round == round)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl CollectionStore for InMemoryStore {
    async fn get(&self, id: CollectionId) -> Result<Option<Collection>> {
        Ok(self.collections.read().await.get(&id).cloned())
    }

    async fn put(&self, collection: Collection) -> Result<()> {
        self.collections
            .write()
            .await
            .insert(collection.id, collection);
        Ok(())
    }

    async fn put_if_status(
        &self,
        collection: Collection,
        expected: CollectionStatus,
    ) -> Result<bool> {
        let mut collections = self.collections.write().await;
        match collections.get(&collection.id) {
            Some(stored) if stored.status == expected => {
                collections.insert(collection.id, collection);
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(EngineError::NotFound(format!(
                "collection {}",
                collection.id
            ))),
        }
    }

    async fn find(
        &self,
        pool_id: PoolId,
        round: u32,
        member_id: MemberId,
    ) -> Result<Option<Collection>> {
        Ok(self
            .collections
            .read()
            .await
            .values()
            .find(|c| c.pool_id == pool_id && c.round == round && c.member_id == member_id)
            .cloned())
    }

    async fn pool_collections(&self, pool_id: PoolId) -> Result<Vec<Collection>> {
        let mut collections: Vec<Collection> = self
            .collections
            .read()
            .await
            .values()
            .filter(|c| c.pool_id == pool_id)
            .cloned()
            .collect();
        collections.sort_by_key(|c| c.id);
        Ok(collections)
    }

    async fn open_collections(&self) -> Result<Vec<Collection>> {
        let mut open: Vec<Collection> = self
            .collections
            .read()
            .await
            .values()
            .filter(|c| !c.status.is_terminal())
            .cloned()
            .collect();
        open.sort_by_key(|c| c.id);
        Ok(open)
    }

    async fn next_id(&self) -> Result<CollectionId> {
        Ok(self.next_collection_id.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

#[async_trait]
impl PayoutStore for InMemoryStore {
    async fn get(&self, pool_id: PoolId, round: u32) -> Result<Option<PayoutEvent>> {
        Ok(self.payouts.read().await.get(&(pool_id, round)).cloned())
    }

    async fn pool_payouts(&self, pool_id: PoolId) -> Result<Vec<PayoutEvent>> {
        let mut payouts: Vec<PayoutEvent> = self
            .payouts
            .read()
            .await
            .values()
            .filter(|p| p.pool_id == pool_id)
            .cloned()
            .collect();
        payouts.sort_by_key(|p| p.round);
        Ok(payouts)
    }

    async fn insert_once(&self, event: PayoutEvent) -> Result<()> {
        let mut payouts = self.payouts.write().await;
        if payouts.contains_key(&(event.pool_id, event.round)) {
            return Err(EngineError::AlreadyProcessed {
                pool_id: event.pool_id,
                round: event.round,
            });
        }
        payouts.insert((event.pool_id, event.round), event);
        Ok(())
    }
}

/// Wall-clock time source.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CollectionPolicy;
    use crate::domain::pool::Amount;
    use rust_decimal_macros::dec;

    fn collection(id: CollectionId) -> Collection {
        Collection::new(
            id,
            1,
            2,
            1,
            Amount::new(dec!(10)).unwrap(),
            Utc::now(),
            &CollectionPolicy::default(),
        )
    }

    #[tokio::test]
    async fn test_put_if_status_guards_stale_writes() {
        let store = InMemoryStore::new();
        CollectionStore::put(&store, collection(1)).await.unwrap();

        let mut cancelled = collection(1);
        cancelled.cancel().unwrap();
        assert!(
            store
                .put_if_status(cancelled.clone(), CollectionStatus::Scheduled)
                .await
                .unwrap()
        );

        // Second writer still expects Scheduled and must lose
        let mut paid = collection(1);
        paid.mark_manually_paid().unwrap();
        assert!(
            !store
                .put_if_status(paid, CollectionStatus::Scheduled)
                .await
                .unwrap()
        );
        let stored = CollectionStore::get(&store, 1).await.unwrap().unwrap();
        assert_eq!(stored.status, CollectionStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_put_if_status_missing_row() {
        let store = InMemoryStore::new();
        let err = store
            .put_if_status(collection(9), CollectionStatus::Scheduled)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_next_id_is_unique() {
        let store = InMemoryStore::new();
        let first = store.next_id().await.unwrap();
        let second = store.next_id().await.unwrap();
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn test_insert_once_rejects_duplicate() {
        let store = InMemoryStore::new();
        let event = PayoutEvent {
            pool_id: 1,
            round: 1,
            recipient_id: 2,
            amount: dec!(30),
            processed_at: Utc::now(),
            triggered_by: crate::domain::payout::PayoutTrigger::AllContributionsComplete,
            actor_id: 2,
            reason: None,
        };
        store.insert_once(event.clone()).await.unwrap();
        let err = store.insert_once(event).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::AlreadyProcessed { pool_id: 1, round: 1 }
        ));
    }
}
