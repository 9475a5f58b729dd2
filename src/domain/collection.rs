use super::pool::{Amount, MemberId, PoolId};
use crate::config::CollectionPolicy;
use crate::error::{EngineError, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

pub type CollectionId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionStatus {
    /// Created when the round opened; waiting for the grace period to pass.
    Scheduled,
    /// Past the grace period, eligible for a charge attempt.
    Pending,
    /// A charge attempt is in flight.
    Processing,
    /// Charge succeeded; a contribution was recorded.
    Completed,
    /// Last attempt failed. Retryable until attempts are exhausted.
    Failed,
    /// Cancelled by an admin before completion.
    Cancelled,
    /// Admin recorded an out-of-band payment.
    ManuallyPaid,
}

impl CollectionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CollectionStatus::Completed | CollectionStatus::Cancelled | CollectionStatus::ManuallyPaid
        )
    }
}

/// A scheduled automated charge against a member's stored payment instrument
/// for one round's contribution.
///
/// Lifecycle: `Scheduled` -> `Pending` (grace period elapsed) -> `Processing`
/// (attempt in flight) -> `Completed` or `Failed` (backoff retry up to
/// `max_attempts`). An admin may move any non-completed collection to
/// `Cancelled` or `ManuallyPaid`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    pub id: CollectionId,
    pub pool_id: PoolId,
    pub member_id: MemberId,
    pub round: u32,
    pub amount: Amount,
    pub due_date: DateTime<Utc>,
    pub grace_period_hours: i64,
    pub status: CollectionStatus,
    pub attempt_count: u32,
    pub max_attempts: u32,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
    /// Set once the pool admin has been notified about exhausted retries.
    pub escalated: bool,
}

impl Collection {
    pub fn new(
        id: CollectionId,
        pool_id: PoolId,
        member_id: MemberId,
        round: u32,
        amount: Amount,
        due_date: DateTime<Utc>,
        policy: &CollectionPolicy,
    ) -> Self {
        Self {
            id,
            pool_id,
            member_id,
            round,
            amount,
            due_date,
            grace_period_hours: policy.grace_period_hours,
            status: CollectionStatus::Scheduled,
            attempt_count: 0,
            max_attempts: policy.max_attempts,
            last_attempt_at: None,
            next_retry_at: None,
            failure_reason: None,
            escalated: false,
        }
    }

    pub fn collection_eligible_at(&self) -> DateTime<Utc> {
        self.due_date + Duration::hours(self.grace_period_hours)
    }

    /// Key for the next charge attempt; stable under network-level retries of
    /// the same attempt, unique across attempts.
    pub fn idempotency_key(&self) -> String {
        format!("collection-{}-attempt-{}", self.id, self.attempt_count + 1)
    }

    pub fn retries_exhausted(&self) -> bool {
        self.attempt_count >= self.max_attempts
    }

    /// `Scheduled` -> `Pending` once the grace period has elapsed.
    pub fn promote(&mut self, now: DateTime<Utc>) -> Result<()> {
        if self.status != CollectionStatus::Scheduled {
            return Err(self.transition_error("promote"));
        }
        if now < self.collection_eligible_at() {
            return Err(EngineError::InvalidState(format!(
                "collection {} not eligible until {}",
                self.id,
                self.collection_eligible_at()
            )));
        }
        self.status = CollectionStatus::Pending;
        Ok(())
    }

    /// `Pending` (or retryable `Failed`) -> `Processing`.
    pub fn begin_attempt(&mut self, now: DateTime<Utc>) -> Result<()> {
        match self.status {
            CollectionStatus::Pending => {}
            CollectionStatus::Failed if !self.retries_exhausted() => {}
            _ => return Err(self.transition_error("begin attempt")),
        }
        self.status = CollectionStatus::Processing;
        self.last_attempt_at = Some(now);
        Ok(())
    }

    /// Out-of-band attempt forced by an admin, regardless of schedule.
    /// Valid from any state except `Processing` and the terminal set.
    pub fn force_attempt(&mut self, now: DateTime<Utc>) -> Result<()> {
        match self.status {
            CollectionStatus::Scheduled | CollectionStatus::Pending | CollectionStatus::Failed => {}
            CollectionStatus::Processing => {
                return Err(EngineError::InvalidState(format!(
                    "collection {} already has an attempt in flight",
                    self.id
                )));
            }
            _ => return Err(self.transition_error("force attempt")),
        }
        self.status = CollectionStatus::Processing;
        self.last_attempt_at = Some(now);
        Ok(())
    }

    /// `Processing` -> `Completed` after a successful charge.
    pub fn complete(&mut self, now: DateTime<Utc>) -> Result<()> {
        if self.status != CollectionStatus::Processing {
            return Err(self.transition_error("complete"));
        }
        self.status = CollectionStatus::Completed;
        self.attempt_count += 1;
        self.last_attempt_at = Some(now);
        self.next_retry_at = None;
        self.failure_reason = None;
        Ok(())
    }

    /// `Processing` -> `Failed`, scheduling the next retry when the failure
    /// is retryable and attempts remain.
    ///
    /// A non-retryable failure (instrument permanently invalid, per the
    /// processor's classification) burns all remaining attempts so the
    /// sweep never retries it.
    pub fn fail_attempt(
        &mut self,
        now: DateTime<Utc>,
        reason: impl Into<String>,
        retryable: bool,
        retry_interval: Duration,
        retry_ceiling: Duration,
    ) -> Result<()> {
        if self.status != CollectionStatus::Processing {
            return Err(self.transition_error("fail attempt"));
        }
        self.attempt_count += 1;
        if !retryable {
            self.attempt_count = self.max_attempts;
        }
        self.status = CollectionStatus::Failed;
        self.last_attempt_at = Some(now);
        self.failure_reason = Some(reason.into());
        self.next_retry_at = if retryable && !self.retries_exhausted() {
            Some(now + self.backoff(retry_interval, retry_ceiling))
        } else {
            None
        };
        Ok(())
    }

    /// Exponential backoff: interval * 2^(attempt_count - 1), capped.
    fn backoff(&self, retry_interval: Duration, retry_ceiling: Duration) -> Duration {
        let exponent = self.attempt_count.saturating_sub(1).min(16);
        let delay = retry_interval * (1i32 << exponent);
        delay.min(retry_ceiling)
    }

    /// Admin cancellation; only valid before an attempt has run its course.
    pub fn cancel(&mut self) -> Result<()> {
        match self.status {
            CollectionStatus::Scheduled | CollectionStatus::Pending => {
                self.status = CollectionStatus::Cancelled;
                self.next_retry_at = None;
                Ok(())
            }
            _ => Err(self.transition_error("cancel")),
        }
    }

    /// Admin recorded payment received outside the automated path.
    pub fn mark_manually_paid(&mut self) -> Result<()> {
        if self.status.is_terminal() {
            return Err(self.transition_error("mark manually paid"));
        }
        self.status = CollectionStatus::ManuallyPaid;
        self.next_retry_at = None;
        Ok(())
    }

    fn transition_error(&self, action: &str) -> EngineError {
        EngineError::InvalidState(format!(
            "cannot {action} collection {} in status {:?}",
            self.id, self.status
        ))
    }
}
