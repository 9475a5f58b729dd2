use crate::domain::collection::{Collection, CollectionId, CollectionStatus};
use crate::domain::contribution::Contribution;
use crate::domain::payout::PayoutEvent;
use crate::domain::pool::{Member, MemberId, Pool, PoolId};
use crate::domain::ports::{CollectionStore, ContributionStore, PayoutStore, PoolStore};
use crate::error::{EngineError, Result};
use async_trait::async_trait;
use rocksdb::{ColumnFamilyDescriptor, DB, IteratorMode, Options};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::{Arc, Mutex};

pub const CF_POOLS: &str = "pools";
pub const CF_MEMBERS: &str = "members";
pub const CF_CONTRIBUTIONS: &str = "contributions";
pub const CF_COLLECTIONS: &str = "collections";
pub const CF_PAYOUTS: &str = "payouts";
pub const CF_META: &str = "meta";

const NEXT_COLLECTION_ID_KEY: &[u8] = b"next_collection_id";

/// Persistent store backed by RocksDB, one column family per entity with
/// JSON values and big-endian integer keys.
///
/// Read-modify-write operations (`put_if_status`, `insert_once`, id
/// allocation) serialize through an internal mutex; everything else goes
/// straight to the DB. `Clone` shares the underlying handle.
#[derive(Clone)]
pub struct RocksDbStore {
    db: Arc<DB>,
    write_guard: Arc<Mutex<()>>,
}

impl RocksDbStore {
    /// Opens or creates the database, ensuring all column families exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cfs = [
            CF_POOLS,
            CF_MEMBERS,
            CF_CONTRIBUTIONS,
            CF_COLLECTIONS,
            CF_PAYOUTS,
            CF_META,
        ]
        .into_iter()
        .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
        .collect::<Vec<_>>();

        let db = DB::open_cf_descriptors(&opts, path, cfs)
            .map_err(|e| EngineError::Storage(e.to_string()))?;
        Ok(Self {
            db: Arc::new(db),
            write_guard: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &str) -> Result<&rocksdb::ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| EngineError::Storage(format!("column family {name} not found")))
    }

    fn put_json<T: Serialize>(&self, cf: &str, key: &[u8], value: &T) -> Result<()> {
        let bytes =
            serde_json::to_vec(value).map_err(|e| EngineError::Storage(e.to_string()))?;
        self.db
            .put_cf(self.cf(cf)?, key, bytes)
            .map_err(|e| EngineError::Storage(e.to_string()))
    }

    fn get_json<T: DeserializeOwned>(&self, cf: &str, key: &[u8]) -> Result<Option<T>> {
        match self
            .db
            .get_cf(self.cf(cf)?, key)
            .map_err(|e| EngineError::Storage(e.to_string()))?
        {
            Some(bytes) => Ok(Some(
                serde_json::from_slice(&bytes).map_err(|e| EngineError::Storage(e.to_string()))?,
            )),
            None => Ok(None),
        }
    }

    fn scan<T: DeserializeOwned>(&self, cf: &str) -> Result<Vec<T>> {
        let mut rows = Vec::new();
        for item in self.db.iterator_cf(self.cf(cf)?, IteratorMode::Start) {
            let (_, value) = item.map_err(|e| EngineError::Storage(e.to_string()))?;
            rows.push(
                serde_json::from_slice(&value).map_err(|e| EngineError::Storage(e.to_string()))?,
            );
        }
        Ok(rows)
    }

    fn contribution_key(pool_id: PoolId, round: u32, member_id: MemberId) -> [u8; 20] {
        let mut key = [0u8; 20];
        key[..8].copy_from_slice(&pool_id.to_be_bytes());
        key[8..12].copy_from_slice(&round.to_be_bytes());
        key[12..].copy_from_slice(&member_id.to_be_bytes());
        key
    }

    fn payout_key(pool_id: PoolId, round: u32) -> [u8; 12] {
        let mut key = [0u8; 12];
        key[..8].copy_from_slice(&pool_id.to_be_bytes());
        key[8..].copy_from_slice(&round.to_be_bytes());
        key
    }
}

#[async_trait]
impl PoolStore for RocksDbStore {
    async fn get_pool(&self, pool_id: PoolId) -> Result<Option<Pool>> {
        self.get_json(CF_POOLS, &pool_id.to_be_bytes())
    }

    async fn put_pool(&self, pool: Pool) -> Result<()> {
        self.put_json(CF_POOLS, &pool.id.to_be_bytes(), &pool)
    }

    async fn get_member(&self, member_id: MemberId) -> Result<Option<Member>> {
        self.get_json(CF_MEMBERS, &member_id.to_be_bytes())
    }

    async fn put_member(&self, member: Member) -> Result<()> {
        self.put_json(CF_MEMBERS, &member.id.to_be_bytes(), &member)
    }

    async fn pool_members(&self, pool_id: PoolId) -> Result<Vec<Member>> {
        let mut members: Vec<Member> = self
            .scan(CF_MEMBERS)?
            .into_iter()
            .filter(|m: &Member| m.pool_id == pool_id)
            .collect();
        members.sort_by_key(|m| m.position);
        Ok(members)
    }
}

#[async_trait]
impl ContributionStore for RocksDbStore {
    async fn get(
        &self,
        pool_id: PoolId,
        round: u32,
        member_id: MemberId,
    ) -> Result<Option<Contribution>> {
        self.get_json(
            CF_CONTRIBUTIONS,
            &Self::contribution_key(pool_id, round, member_id),
        )
    }

    async fn put(&self, contribution: Contribution) -> Result<()> {
        self.put_json(
            CF_CONTRIBUTIONS,
            &Self::contribution_key(
                contribution.pool_id,
                contribution.round,
                contribution.member_id,
            ),
            &contribution,
        )
    }

    async fn round_contributions(&self, pool_id: PoolId, round: u32) -> Result<Vec<Contribution>> {
        Ok(self
            .scan(CF_CONTRIBUTIONS)?
            .into_iter()
            .filter(|c: &Contribution| c.pool_id == pool_id && c.round == round)
            .collect())
    }
}

#[async_trait]
impl CollectionStore for RocksDbStore {
    async fn get(&self, id: CollectionId) -> Result<Option<Collection>> {
        self.get_json(CF_COLLECTIONS, &id.to_be_bytes())
    }

    async fn put(&self, collection: Collection) -> Result<()> {
        self.put_json(CF_COLLECTIONS, &collection.id.to_be_bytes(), &collection)
    }

    async fn put_if_status(
        &self,
        collection: Collection,
        expected: CollectionStatus,
    ) -> Result<bool> {
        let _guard = self
            .write_guard
            .lock()
            .map_err(|_| EngineError::Storage("write guard poisoned".to_string()))?;
        let stored: Option<Collection> =
            self.get_json(CF_COLLECTIONS, &collection.id.to_be_bytes())?;
        match stored {
            Some(existing) if existing.status == expected => {
                self.put_json(CF_COLLECTIONS, &collection.id.to_be_bytes(), &collection)?;
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
            .scan(CF_COLLECTIONS)?
            .into_iter()
            .find(|c: &Collection| {
                c.pool_id == pool_id && c.round == round && c.member_id == member_id
            }))
    }

    async fn pool_collections(&self, pool_id: PoolId) -> Result<Vec<Collection>> {
        Ok(self
            .scan(CF_COLLECTIONS)?
            .into_iter()
            .filter(|c: &Collection| c.pool_id == pool_id)
            .collect())
    }

    async fn open_collections(&self) -> Result<Vec<Collection>> {
        Ok(self
            .scan(CF_COLLECTIONS)?
            .into_iter()
            .filter(|c: &Collection| !c.status.is_terminal())
            .collect())
    }

    async fn next_id(&self) -> Result<CollectionId> {
        let _guard = self
            .write_guard
            .lock()
            .map_err(|_| EngineError::Storage("write guard poisoned".to_string()))?;
        let next = self
            .get_json::<CollectionId>(CF_META, NEXT_COLLECTION_ID_KEY)?
            .unwrap_or(0)
            + 1;
        self.put_json(CF_META, NEXT_COLLECTION_ID_KEY, &next)?;
        Ok(next)
    }
}

#[async_trait]
impl PayoutStore for RocksDbStore {
    async fn get(&self, pool_id: PoolId, round: u32) -> Result<Option<PayoutEvent>> {
        self.get_json(CF_PAYOUTS, &Self::payout_key(pool_id, round))
    }

    async fn pool_payouts(&self, pool_id: PoolId) -> Result<Vec<PayoutEvent>> {
        let mut payouts: Vec<PayoutEvent> = self
            .scan(CF_PAYOUTS)?
            .into_iter()
            .filter(|p: &PayoutEvent| p.pool_id == pool_id)
            .collect();
        payouts.sort_by_key(|p| p.round);
        Ok(payouts)
    }

    async fn insert_once(&self, event: PayoutEvent) -> Result<()> {
        let _guard = self
            .write_guard
            .lock()
            .map_err(|_| EngineError::Storage("write guard poisoned".to_string()))?;
        let key = Self::payout_key(event.pool_id, event.round);
        if self.get_json::<PayoutEvent>(CF_PAYOUTS, &key)?.is_some() {
            return Err(EngineError::AlreadyProcessed {
                pool_id: event.pool_id,
                round: event.round,
            });
        }
        self.put_json(CF_PAYOUTS, &key, &event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CollectionPolicy;
    use crate::domain::pool::{Amount, Frequency};
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_open_creates_column_families() {
        let dir = tempdir().unwrap();
        let store = RocksDbStore::open(dir.path()).unwrap();
        for cf in [CF_POOLS, CF_MEMBERS, CF_CONTRIBUTIONS, CF_COLLECTIONS, CF_PAYOUTS, CF_META] {
            assert!(store.db.cf_handle(cf).is_some());
        }
    }

    #[tokio::test]
    async fn test_pool_round_trip() {
        let dir = tempdir().unwrap();
        let store = RocksDbStore::open(dir.path()).unwrap();

        let pool = Pool::new(
            1,
            "tanda",
            10,
            Amount::new(dec!(10)).unwrap(),
            dec!(0),
            Frequency::Weekly,
            Utc::now(),
            3,
        )
        .unwrap();
        store.put_pool(pool.clone()).await.unwrap();
        assert_eq!(store.get_pool(1).await.unwrap().unwrap(), pool);
        assert!(store.get_pool(2).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_collection_cas_survives_reopen() {
        let dir = tempdir().unwrap();
        let collection = Collection::new(
            1,
            1,
            2,
            1,
            Amount::new(dec!(10)).unwrap(),
            Utc::now(),
            &CollectionPolicy::default(),
        );
        {
            let store = RocksDbStore::open(dir.path()).unwrap();
            CollectionStore::put(&store, collection.clone()).await.unwrap();
        }
        let store = RocksDbStore::open(dir.path()).unwrap();
        let mut cancelled = collection.clone();
        cancelled.cancel().unwrap();
        assert!(
            store
                .put_if_status(cancelled, CollectionStatus::Scheduled)
                .await
                .unwrap()
        );
        // Stale expectation loses
        let mut paid = collection;
        paid.mark_manually_paid().unwrap();
        assert!(
            !store
                .put_if_status(paid, CollectionStatus::Scheduled)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_next_id_is_durable() {
        let dir = tempdir().unwrap();
        let first = {
            let store = RocksDbStore::open(dir.path()).unwrap();
            store.next_id().await.unwrap()
        };
        let store = RocksDbStore::open(dir.path()).unwrap();
        let second = store.next_id().await.unwrap();
        assert!(second > first);
    }
}
