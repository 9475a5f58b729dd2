use super::tracker::ContributionTracker;
use crate::domain::collection::CollectionStatus;
use crate::domain::contribution::ContributionSource;
use crate::domain::pool::{MemberId, PoolId, PoolStatus};
use crate::domain::ports::{
    ClockRef, CollectionStoreRef, ContributionStoreRef, PayoutStoreRef, PoolStoreRef,
};
use crate::error::{EngineError, Result};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;

/// Snapshot of the current round's payout situation.
#[derive(Debug, Clone, PartialEq)]
pub struct PayoutStatus {
    pub pool_id: PoolId,
    pub status: PoolStatus,
    pub round: u32,
    pub recipient_name: Option<String>,
    pub due_date: DateTime<Utc>,
    pub pot_amount: Decimal,
    pub eligible: bool,
    pub payout_processed: bool,
    pub missing_member_names: Vec<String>,
}

/// Collection counts over a trailing window of due dates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectionsSummary {
    pub pool_id: PoolId,
    pub window_days: i64,
    pub total: usize,
    pub scheduled: usize,
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub manually_paid: usize,
    pub amount_collected: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MemberProgress {
    pub member_id: MemberId,
    pub name: String,
    pub position: u32,
    pub contributed: bool,
    pub source: Option<ContributionSource>,
    pub contributed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContributionProgress {
    pub pool_id: PoolId,
    pub round: u32,
    pub expected: usize,
    pub contributed: usize,
    pub members: Vec<MemberProgress>,
}

/// Read-only projections for the surrounding API layer. No locking: these
/// are advisory snapshots, never write paths.
#[derive(Clone)]
pub struct QuerySurface {
    pools: PoolStoreRef,
    contributions: ContributionStoreRef,
    collections: CollectionStoreRef,
    payouts: PayoutStoreRef,
    tracker: ContributionTracker,
    clock: ClockRef,
}

impl QuerySurface {
    pub fn new(
        pools: PoolStoreRef,
        contributions: ContributionStoreRef,
        collections: CollectionStoreRef,
        payouts: PayoutStoreRef,
        tracker: ContributionTracker,
        clock: ClockRef,
    ) -> Self {
        Self {
            pools,
            contributions,
            collections,
            payouts,
            tracker,
            clock,
        }
    }

    pub async fn payout_status(&self, pool_id: PoolId) -> Result<PayoutStatus> {
        let pool = self
            .pools
            .get_pool(pool_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("pool {pool_id}")))?;
        let members = self.pools.pool_members(pool_id).await?;
        let round = pool.current_round.min(pool.total_rounds);
        let payout_processed = self.payouts.get(pool_id, round).await?.is_some();
        let missing = self.tracker.missing_members(pool_id, round).await?;
        Ok(PayoutStatus {
            pool_id,
            status: pool.status,
            round,
            recipient_name: members
                .iter()
                .find(|m| m.position == round)
                .map(|m| m.name.clone()),
            due_date: pool.round_due_date(round),
            pot_amount: pool.pot_amount(members.len()),
            eligible: pool.status == PoolStatus::Active
                && !payout_processed
                && !members.is_empty()
                && missing.is_empty(),
            payout_processed,
            missing_member_names: missing.into_iter().map(|m| m.name).collect(),
        })
    }

    /// Counts collections whose due date falls within the past
    /// `window_days`, bucketed by status.
    pub async fn collections_summary(
        &self,
        pool_id: PoolId,
        window_days: i64,
    ) -> Result<CollectionsSummary> {
        let cutoff = self.clock.now() - Duration::days(window_days);
        let mut summary = CollectionsSummary {
            pool_id,
            window_days,
            ..Default::default()
        };
        for collection in self.collections.pool_collections(pool_id).await? {
            if collection.due_date < cutoff {
                continue;
            }
            summary.total += 1;
            match collection.status {
                CollectionStatus::Scheduled => summary.scheduled += 1,
                CollectionStatus::Pending => summary.pending += 1,
                CollectionStatus::Processing => summary.processing += 1,
                CollectionStatus::Completed => {
                    summary.completed += 1;
                    summary.amount_collected += collection.amount.value();
                }
                CollectionStatus::Failed => summary.failed += 1,
                CollectionStatus::Cancelled => summary.cancelled += 1,
                CollectionStatus::ManuallyPaid => summary.manually_paid += 1,
            }
        }
        Ok(summary)
    }

    pub async fn contribution_progress(
        &self,
        pool_id: PoolId,
        round: u32,
    ) -> Result<ContributionProgress> {
        let members = self.pools.pool_members(pool_id).await?;
        if members.is_empty() && self.pools.get_pool(pool_id).await?.is_none() {
            return Err(EngineError::NotFound(format!("pool {pool_id}")));
        }
        let contributions = self.contributions.round_contributions(pool_id, round).await?;
        let progress: Vec<MemberProgress> = members
            .iter()
            .map(|member| {
                let row = contributions.iter().find(|c| c.member_id == member.id);
                MemberProgress {
                    member_id: member.id,
                    name: member.name.clone(),
                    position: member.position,
                    contributed: row.is_some(),
                    source: row.map(|c| c.source),
                    contributed_at: row.map(|c| c.contributed_at),
                }
            })
            .collect();
        Ok(ContributionProgress {
            pool_id,
            round,
            expected: members.len(),
            contributed: progress.iter().filter(|p| p.contributed).count(),
            members: progress,
        })
    }
}
