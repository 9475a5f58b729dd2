use super::pool::{MemberId, PoolId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a contribution entered the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContributionSource {
    /// Successful automated collection.
    Collection,
    /// Member-reported payment confirmed out of band.
    ManualConfirm,
    /// Pool admin recorded it directly.
    AdminOverride,
}

/// One member's contribution to one round.
///
/// Exactly one record may exist per (pool, round, member); its existence is
/// the "has contributed" fact. The round's recipient is not exempt and gets
/// a record like everyone else.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contribution {
    pub pool_id: PoolId,
    pub round: u32,
    pub member_id: MemberId,
    pub contributed_at: DateTime<Utc>,
    pub source: ContributionSource,
}
