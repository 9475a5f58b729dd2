use super::tracker::ContributionTracker;
use crate::config::CollectionPolicy;
use crate::domain::collection::{Collection, CollectionId, CollectionStatus};
use crate::domain::contribution::ContributionSource;
use crate::domain::pool::{MemberId, PoolId, PoolStatus};
use crate::domain::ports::{
    ChargeOutcome, ClockRef, CollectionStoreRef, ContributionStoreRef, DeclineKind,
    NotificationEvent, NotifierRef, PaymentProcessorRef, PoolStoreRef,
};
use crate::error::{EngineError, Result};
use chrono::Duration;

/// Outcome counts of one sweep pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    /// Scheduled collections promoted to pending.
    pub promoted: usize,
    /// Charge attempts fired (first tries and due retries).
    pub attempted: usize,
    /// Stuck `processing` rows reclaimed to failed.
    pub reclaimed: usize,
    /// Exhausted collections escalated to the pool admin.
    pub escalated: usize,
}

/// Owns the collection lifecycle: creates obligations when a round opens,
/// promotes them past the grace period, drives charge attempts with
/// exponential backoff, and escalates exhausted ones to the pool admin.
///
/// Every transition is a compare-and-swap on the row's current status, so
/// overlapping sweep runs never double-fire an attempt.
#[derive(Clone)]
pub struct CollectionScheduler {
    pools: PoolStoreRef,
    contributions: ContributionStoreRef,
    collections: CollectionStoreRef,
    tracker: ContributionTracker,
    processor: PaymentProcessorRef,
    notifier: NotifierRef,
    clock: ClockRef,
    policy: CollectionPolicy,
}

impl CollectionScheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pools: PoolStoreRef,
        contributions: ContributionStoreRef,
        collections: CollectionStoreRef,
        tracker: ContributionTracker,
        processor: PaymentProcessorRef,
        notifier: NotifierRef,
        clock: ClockRef,
        policy: CollectionPolicy,
    ) -> Self {
        Self {
            pools,
            contributions,
            collections,
            tracker,
            processor,
            notifier,
            clock,
            policy,
        }
    }

    /// Creates one collection per member who has not yet contributed to the
    /// round. Idempotent per (pool, round, member): re-running after a crash
    /// or an overlapping trigger creates nothing new.
    pub async fn schedule_round(&self, pool_id: PoolId, round: u32) -> Result<Vec<Collection>> {
        let pool = self
            .pools
            .get_pool(pool_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("pool {pool_id}")))?;
        if pool.status != PoolStatus::Active {
            return Err(EngineError::InvalidTransition(format!(
                "pool {pool_id} is not active"
            )));
        }
        let due_date = pool.round_due_date(round);
        let mut created = Vec::new();
        for member in self.pools.pool_members(pool_id).await? {
            if self
                .contributions
                .get(pool_id, round, member.id)
                .await?
                .is_some()
            {
                continue;
            }
            if self
                .collections
                .find(pool_id, round, member.id)
                .await?
                .is_some()
            {
                continue;
            }
            let collection = Collection::new(
                self.collections.next_id().await?,
                pool_id,
                member.id,
                round,
                pool.contribution_amount,
                due_date,
                &self.policy,
            );
            self.collections.put(collection.clone()).await?;
            created.push(collection);
        }
        tracing::info!(pool_id, round, created = created.len(), "round collections scheduled");
        Ok(created)
    }

    /// One non-blocking pass over open collections.
    ///
    /// Promotes rows past their grace period, fires due attempts and
    /// retries, reclaims rows stuck in `processing` past the timeout
    /// threshold, and escalates exhausted rows. Safe to run in overlapping
    /// windows.
    pub async fn sweep(&self) -> Result<SweepReport> {
        let now = self.clock.now();
        let mut report = SweepReport::default();

        for collection in self.collections.open_collections().await? {
            match collection.status {
                CollectionStatus::Scheduled => {
                    if now < collection.collection_eligible_at() {
                        continue;
                    }
                    // Paid during the grace period: settle the row, no
                    // reminder.
                    if self
                        .contributions
                        .get(collection.pool_id, collection.round, collection.member_id)
                        .await?
                        .is_some()
                    {
                        let mut settled = collection.clone();
                        settled.mark_manually_paid()?;
                        self.collections
                            .put_if_status(settled, CollectionStatus::Scheduled)
                            .await?;
                        continue;
                    }
                    let mut promoted = collection.clone();
                    promoted.promote(now)?;
                    if self
                        .collections
                        .put_if_status(promoted, CollectionStatus::Scheduled)
                        .await?
                    {
                        report.promoted += 1;
                        self.send(
                            collection.member_id,
                            NotificationEvent::ContributionDue {
                                pool_id: collection.pool_id,
                                round: collection.round,
                                due_date: collection.due_date,
                            },
                        )
                        .await;
                    }
                }
                CollectionStatus::Pending => {
                    if self.attempt(collection).await?.is_some() {
                        report.attempted += 1;
                    }
                }
                CollectionStatus::Failed => {
                    if collection.retries_exhausted() {
                        if self.maybe_escalate(&collection).await? {
                            report.escalated += 1;
                        }
                    } else if collection.next_retry_at.is_some_and(|at| now >= at)
                        && self.attempt(collection).await?.is_some()
                    {
                        report.attempted += 1;
                    }
                }
                CollectionStatus::Processing => {
                    let stuck = collection
                        .last_attempt_at
                        .is_some_and(|at| now - at >= self.policy.stuck_processing());
                    if stuck {
                        let mut failed = collection.clone();
                        failed.fail_attempt(
                            now,
                            "attempt stuck in processing past timeout",
                            true,
                            self.policy.retry_interval(),
                            self.policy.retry_ceiling(),
                        )?;
                        if self
                            .collections
                            .put_if_status(failed, CollectionStatus::Processing)
                            .await?
                        {
                            tracing::warn!(
                                collection_id = collection.id,
                                "reclaimed stuck collection"
                            );
                            report.reclaimed += 1;
                        }
                    }
                }
                _ => {}
            }
        }
        Ok(report)
    }

    /// Fires one charge attempt for a pending or retry-due collection.
    /// Returns `None` if another sweep won the race for this row.
    async fn attempt(&self, mut collection: Collection) -> Result<Option<Collection>> {
        let expected = collection.status;
        let now = self.clock.now();

        // A manual confirmation may have landed since this collection was
        // created; charging on top of it would double-collect. Close the
        // obligation instead.
        if self
            .contributions
            .get(collection.pool_id, collection.round, collection.member_id)
            .await?
            .is_some()
        {
            let mut settled = collection;
            settled.mark_manually_paid()?;
            self.collections.put_if_status(settled, expected).await?;
            return Ok(None);
        }

        collection.begin_attempt(now)?;
        if !self
            .collections
            .put_if_status(collection.clone(), expected)
            .await?
        {
            return Ok(None);
        }
        Ok(Some(self.run_charge(collection).await?))
    }

    /// Executes the processor call for a collection already moved to
    /// `processing` and records the outcome.
    async fn run_charge(&self, mut collection: Collection) -> Result<Collection> {
        let key = collection.idempotency_key();
        let outcome = tokio::time::timeout(
            self.policy.charge_timeout(),
            self.processor
                .charge(collection.member_id, collection.amount, &key),
        )
        .await;
        let now = self.clock.now();

        match outcome {
            Ok(Ok(ChargeOutcome::Approved)) => {
                // The contribution lands before the terminal transition. If
                // this write fails the row stays `processing`, the reclaim
                // pass sweeps it back, and the pre-charge guard in `attempt`
                // settles it once the contribution is visible.
                self.tracker
                    .record_contribution(
                        collection.pool_id,
                        collection.round,
                        collection.member_id,
                        ContributionSource::Collection,
                    )
                    .await?;
                collection.complete(now)?;
                self.collections
                    .put_if_status(collection.clone(), CollectionStatus::Processing)
                    .await?;
                tracing::info!(
                    collection_id = collection.id,
                    member_id = collection.member_id,
                    "collection completed"
                );
            }
            Ok(Ok(ChargeOutcome::Declined { kind, reason })) => {
                // The processor's classification decides whether we keep
                // retrying; a terminal decline burns the attempt budget.
                let retryable = kind == DeclineKind::Transient;
                self.record_failure(&mut collection, now, reason, retryable)
                    .await?;
            }
            Ok(Err(err)) => {
                // Transport-level error from the processor client
                self.record_failure(&mut collection, now, err.to_string(), true)
                    .await?;
            }
            Err(_elapsed) => {
                let reason = format!(
                    "charge timed out after {:?}",
                    self.policy.charge_timeout()
                );
                self.record_failure(&mut collection, now, reason, true)
                    .await?;
            }
        }
        Ok(collection)
    }

    async fn record_failure(
        &self,
        collection: &mut Collection,
        now: chrono::DateTime<chrono::Utc>,
        reason: String,
        retryable: bool,
    ) -> Result<()> {
        collection.fail_attempt(
            now,
            reason.clone(),
            retryable,
            self.policy.retry_interval(),
            self.policy.retry_ceiling(),
        )?;
        self.collections
            .put_if_status(collection.clone(), CollectionStatus::Processing)
            .await?;
        tracing::warn!(
            collection_id = collection.id,
            attempt = collection.attempt_count,
            retryable,
            %reason,
            "collection attempt failed"
        );
        self.send(
            collection.member_id,
            NotificationEvent::CollectionFailed {
                pool_id: collection.pool_id,
                collection_id: collection.id,
                round: collection.round,
                reason,
            },
        )
        .await;
        if collection.retries_exhausted() {
            self.maybe_escalate(collection).await?;
        }
        Ok(())
    }

    /// Notifies the pool admin once per exhausted collection, after the
    /// configured number of days past the due date.
    async fn maybe_escalate(&self, collection: &Collection) -> Result<bool> {
        if !self.policy.escalate_to_admin || collection.escalated {
            return Ok(false);
        }
        let now = self.clock.now();
        if now - collection.due_date < Duration::days(self.policy.escalate_after_days) {
            return Ok(false);
        }
        let Some(pool) = self.pools.get_pool(collection.pool_id).await? else {
            return Ok(false);
        };
        let mut marked = collection.clone();
        marked.escalated = true;
        if !self
            .collections
            .put_if_status(marked, CollectionStatus::Failed)
            .await?
        {
            return Ok(false);
        }
        self.send(
            pool.admin_id,
            NotificationEvent::CollectionEscalated {
                pool_id: collection.pool_id,
                member_id: collection.member_id,
                round: collection.round,
                attempts: collection.attempt_count,
            },
        )
        .await;
        tracing::warn!(
            collection_id = collection.id,
            pool_id = collection.pool_id,
            "collection escalated to pool admin"
        );
        Ok(true)
    }

    /// Admin cancellation, valid only from `scheduled` or `pending`. The
    /// status guard is checked at write time, not against the stale read.
    pub async fn cancel_collection(&self, id: CollectionId) -> Result<Collection> {
        let collection = self.load(id).await?;
        let expected = collection.status;
        let mut cancelled = collection;
        cancelled.cancel()?;
        if !self
            .collections
            .put_if_status(cancelled.clone(), expected)
            .await?
        {
            return Err(EngineError::InvalidState(format!(
                "collection {id} changed concurrently; re-read and retry"
            )));
        }
        tracing::info!(collection_id = id, "collection cancelled");
        Ok(cancelled)
    }

    /// Admin-forced out-of-band attempt, regardless of schedule or backoff.
    pub async fn manual_collect(&self, id: CollectionId) -> Result<Collection> {
        let collection = self.load(id).await?;
        let expected = collection.status;
        let mut forced = collection;
        forced.force_attempt(self.clock.now())?;
        if !self
            .collections
            .put_if_status(forced.clone(), expected)
            .await?
        {
            return Err(EngineError::InvalidState(format!(
                "collection {id} changed concurrently; re-read and retry"
            )));
        }
        self.run_charge(forced).await
    }

    /// Admin records that the member paid outside the automated path.
    /// Writes a manual-confirm contribution for the round.
    pub async fn mark_manually_paid(&self, id: CollectionId) -> Result<Collection> {
        let collection = self.load(id).await?;
        let expected = collection.status;
        let mut paid = collection;
        paid.mark_manually_paid()?;
        if !self
            .collections
            .put_if_status(paid.clone(), expected)
            .await?
        {
            return Err(EngineError::InvalidState(format!(
                "collection {id} changed concurrently; re-read and retry"
            )));
        }
        self.tracker
            .record_contribution(
                paid.pool_id,
                paid.round,
                paid.member_id,
                ContributionSource::ManualConfirm,
            )
            .await?;
        Ok(paid)
    }

    async fn load(&self, id: CollectionId) -> Result<Collection> {
        self.collections
            .get(id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("collection {id}")))
    }

    async fn send(&self, member_id: MemberId, event: NotificationEvent) {
        if let Err(err) = self.notifier.notify(member_id, event).await {
            tracing::warn!(member_id, error = %err, "notification delivery failed");
        }
    }
}
