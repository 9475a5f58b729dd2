use super::ledger::PoolLedger;
use super::locks::PoolLocks;
use super::tracker::ContributionTracker;
use crate::domain::payout::{PayoutEvent, PayoutTrigger};
use crate::domain::pool::{MemberId, MemberRole, Pool, PoolId, PoolStatus};
use crate::domain::ports::{
    ClockRef, NotificationEvent, NotifierRef, PayoutStoreRef, PoolStoreRef,
};
use crate::error::{EngineError, Result};

/// Result of an eligibility check, with enough detail for an admin screen
/// to say exactly who is holding the round up.
#[derive(Debug, Clone, PartialEq)]
pub struct Eligibility {
    pub eligible: bool,
    pub missing_member_names: Vec<String>,
}

/// Decides when a round's payout may happen and executes it.
///
/// The payout write is guarded twice: the per-pool lock serializes the whole
/// read-check-write span, and the payout store's at-most-once insert is the
/// final idempotency boundary against duplicate transfers.
#[derive(Clone)]
pub struct PayoutEngine {
    pools: PoolStoreRef,
    payouts: PayoutStoreRef,
    tracker: ContributionTracker,
    ledger: PoolLedger,
    notifier: NotifierRef,
    clock: ClockRef,
    locks: PoolLocks,
}

impl PayoutEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pools: PoolStoreRef,
        payouts: PayoutStoreRef,
        tracker: ContributionTracker,
        ledger: PoolLedger,
        notifier: NotifierRef,
        clock: ClockRef,
        locks: PoolLocks,
    ) -> Self {
        Self {
            pools,
            payouts,
            tracker,
            ledger,
            notifier,
            clock,
            locks,
        }
    }

    /// Current round is eligible iff every member has contributed and no
    /// payout event exists yet. Never guesses who is missing: the names come
    /// from the same completeness check the payout path uses.
    pub async fn evaluate_eligibility(&self, pool_id: PoolId) -> Result<Eligibility> {
        let pool = self.active_pool(pool_id).await?;
        if self.payouts.get(pool_id, pool.current_round).await?.is_some() {
            return Ok(Eligibility {
                eligible: false,
                missing_member_names: Vec::new(),
            });
        }
        let missing = self
            .tracker
            .missing_members(pool_id, pool.current_round)
            .await?;
        Ok(Eligibility {
            eligible: missing.is_empty(),
            missing_member_names: missing.into_iter().map(|m| m.name).collect(),
        })
    }

    /// Pays the current round's pot to its recipient and advances the round.
    ///
    /// Safe under concurrent invocation: of N simultaneous calls exactly one
    /// writes the payout event; the rest fail with `AlreadyProcessed`.
    pub async fn process_payout(&self, pool_id: PoolId, actor_id: MemberId) -> Result<PayoutEvent> {
        let _guard = self.locks.acquire(pool_id).await;
        self.execute(
            pool_id,
            actor_id,
            PayoutTrigger::AllContributionsComplete,
            None,
        )
        .await
    }

    /// Admin-triggered payout before the round's due date.
    ///
    /// Same completeness and idempotency gates as the normal path, plus:
    /// the actor must be the pool admin, the due date must genuinely lie in
    /// the future, and the recipient needs a payout destination on file.
    /// Does not shift later rounds' schedule.
    pub async fn initiate_early_payout(
        &self,
        pool_id: PoolId,
        actor_id: MemberId,
        reason: Option<String>,
    ) -> Result<PayoutEvent> {
        let _guard = self.locks.acquire(pool_id).await;

        let pool = self.active_pool(pool_id).await?;
        let actor = self.ledger.member(actor_id).await?;
        if actor.pool_id != pool_id || actor.role != MemberRole::Admin {
            return Err(EngineError::Unauthorized(format!(
                "member {actor_id} is not an admin of pool {pool_id}"
            )));
        }
        if self.clock.now() >= pool.round_due_date(pool.current_round) {
            return Err(EngineError::Validation(format!(
                "round {} of pool {pool_id} is already due; use the normal payout path",
                pool.current_round
            )));
        }
        let recipient = self.recipient(&pool).await?;
        if recipient.payout_destination.is_none() {
            return Err(EngineError::Validation(format!(
                "recipient {} has no payout destination configured",
                recipient.id
            )));
        }
        self.execute(
            pool_id,
            actor_id,
            PayoutTrigger::EarlyPayoutAdminOverride,
            reason,
        )
        .await
    }

    /// Shared payout path. Caller must hold the pool lock.
    async fn execute(
        &self,
        pool_id: PoolId,
        actor_id: MemberId,
        triggered_by: PayoutTrigger,
        reason: Option<String>,
    ) -> Result<PayoutEvent> {
        let pool = self.active_pool(pool_id).await?;
        let round = pool.current_round;

        if self.payouts.get(pool_id, round).await?.is_some() {
            return Err(EngineError::AlreadyProcessed { pool_id, round });
        }
        let missing = self.tracker.missing_members(pool_id, round).await?;
        if !missing.is_empty() {
            return Err(EngineError::InvalidTransition(format!(
                "round {round} of pool {pool_id} is incomplete: {} contribution(s) missing",
                missing.len()
            )));
        }

        let members = self.pools.pool_members(pool_id).await?;
        let mut recipient = self.recipient(&pool).await?;
        let event = PayoutEvent {
            pool_id,
            round,
            recipient_id: recipient.id,
            amount: pool.pot_amount(members.len()),
            processed_at: self.clock.now(),
            triggered_by,
            actor_id,
            reason,
        };
        // The at-most-once insert is the point of no return; a concurrent
        // writer that lost the lock race fails here with AlreadyProcessed.
        self.payouts.insert_once(event.clone()).await?;

        recipient.payout_received = true;
        self.pools.put_member(recipient.clone()).await?;
        self.ledger.advance_round_locked(pool_id).await?;

        tracing::info!(
            pool_id,
            round,
            recipient_id = recipient.id,
            amount = %event.amount,
            ?triggered_by,
            "payout processed"
        );
        if let Err(err) = self
            .notifier
            .notify(
                recipient.id,
                NotificationEvent::PayoutProcessed {
                    pool_id,
                    round,
                    amount: event.amount,
                },
            )
            .await
        {
            tracing::warn!(recipient_id = recipient.id, error = %err, "payout notification failed");
        }
        Ok(event)
    }

    async fn active_pool(&self, pool_id: PoolId) -> Result<Pool> {
        let pool = self.ledger.pool(pool_id).await?;
        match pool.status {
            PoolStatus::Active => Ok(pool),
            PoolStatus::Pending => Err(EngineError::InvalidTransition(format!(
                "pool {pool_id} has not started"
            ))),
            PoolStatus::Completed => Err(EngineError::PoolClosed(pool_id)),
        }
    }

    async fn recipient(&self, pool: &Pool) -> Result<crate::domain::pool::Member> {
        self.pools
            .pool_members(pool.id)
            .await?
            .into_iter()
            .find(|m| m.position == pool.current_round)
            .ok_or_else(|| {
                EngineError::NotFound(format!(
                    "no member holds position {} in pool {}",
                    pool.current_round, pool.id
                ))
            })
    }
}
