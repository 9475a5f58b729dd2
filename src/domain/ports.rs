use super::collection::{Collection, CollectionId, CollectionStatus};
use super::contribution::Contribution;
use super::payout::PayoutEvent;
use super::pool::{Amount, Member, MemberId, Pool, PoolId};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;

#[async_trait]
pub trait PoolStore: Send + Sync {
    async fn get_pool(&self, pool_id: PoolId) -> Result<Option<Pool>>;
    async fn put_pool(&self, pool: Pool) -> Result<()>;
    async fn get_member(&self, member_id: MemberId) -> Result<Option<Member>>;
    async fn put_member(&self, member: Member) -> Result<()>;
    /// All members of a pool, sorted by position.
    async fn pool_members(&self, pool_id: PoolId) -> Result<Vec<Member>>;
}

#[async_trait]
pub trait ContributionStore: Send + Sync {
    async fn get(
        &self,
        pool_id: PoolId,
        round: u32,
        member_id: MemberId,
    ) -> Result<Option<Contribution>>;
    async fn put(&self, contribution: Contribution) -> Result<()>;
    async fn round_contributions(&self, pool_id: PoolId, round: u32) -> Result<Vec<Contribution>>;
}

#[async_trait]
pub trait CollectionStore: Send + Sync {
    async fn get(&self, id: CollectionId) -> Result<Option<Collection>>;
    async fn put(&self, collection: Collection) -> Result<()>;
    /// Persists only if the stored row's status still matches `expected`.
    /// Returns `false` on a lost race so overlapping sweeps never double-fire.
    async fn put_if_status(
        &self,
        collection: Collection,
        expected: CollectionStatus,
    ) -> Result<bool>;
    async fn find(
        &self,
        pool_id: PoolId,
        round: u32,
        member_id: MemberId,
    ) -> Result<Option<Collection>>;
    async fn pool_collections(&self, pool_id: PoolId) -> Result<Vec<Collection>>;
    /// Every collection in a non-terminal status, across pools. The sweep
    /// decides per row whether anything is due.
    async fn open_collections(&self) -> Result<Vec<Collection>>;
    async fn next_id(&self) -> Result<CollectionId>;
}

#[async_trait]
pub trait PayoutStore: Send + Sync {
    async fn get(&self, pool_id: PoolId, round: u32) -> Result<Option<PayoutEvent>>;
    async fn pool_payouts(&self, pool_id: PoolId) -> Result<Vec<PayoutEvent>>;
    /// At-most-once insert per (pool, round); fails with `AlreadyProcessed`
    /// when an event exists. This is the engine's idempotency boundary.
    async fn insert_once(&self, event: PayoutEvent) -> Result<()>;
}

/// How the payment processor classified a declined charge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclineKind {
    /// Worth retrying later (network blip, temporary hold).
    Transient,
    /// Instrument permanently invalid; retrying is wasted work.
    Terminal,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChargeOutcome {
    Approved,
    Declined { kind: DeclineKind, reason: String },
}

/// Executes a single charge against a member's stored payment instrument.
///
/// The engine always passes an idempotency key derived from
/// (collection id, attempt number) so a network-level retry of the same
/// attempt cannot double-charge.
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    async fn charge(
        &self,
        member_id: MemberId,
        amount: Amount,
        idempotency_key: &str,
    ) -> Result<ChargeOutcome>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum NotificationEvent {
    ContributionDue {
        pool_id: PoolId,
        round: u32,
        due_date: DateTime<Utc>,
    },
    CollectionFailed {
        pool_id: PoolId,
        collection_id: CollectionId,
        round: u32,
        reason: String,
    },
    CollectionEscalated {
        pool_id: PoolId,
        member_id: MemberId,
        round: u32,
        attempts: u32,
    },
    PayoutProcessed {
        pool_id: PoolId,
        round: u32,
        amount: Decimal,
    },
}

/// Delivers reminders and alerts to members. Fire-and-forget from the
/// engine's perspective: a delivery failure is logged and never rolls back
/// a completed collection or payout.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, member_id: MemberId, event: NotificationEvent) -> Result<()>;
}

/// Time source, injected so tests can drive the schedule deterministically.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub type PoolStoreRef = Arc<dyn PoolStore>;
pub type ContributionStoreRef = Arc<dyn ContributionStore>;
pub type CollectionStoreRef = Arc<dyn CollectionStore>;
pub type PayoutStoreRef = Arc<dyn PayoutStore>;
pub type PaymentProcessorRef = Arc<dyn PaymentProcessor>;
pub type NotifierRef = Arc<dyn Notifier>;
pub type ClockRef = Arc<dyn Clock>;
