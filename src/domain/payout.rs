use super::pool::{MemberId, PoolId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoutTrigger {
    AllContributionsComplete,
    EarlyPayoutAdminOverride,
}

/// The authoritative record that a round's pot was paid out.
///
/// At most one event exists per (pool, round); its presence is the
/// idempotency marker that blocks duplicate transfers and gates
/// round advancement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayoutEvent {
    pub pool_id: PoolId,
    pub round: u32,
    pub recipient_id: MemberId,
    pub amount: Decimal,
    pub processed_at: DateTime<Utc>,
    pub triggered_by: PayoutTrigger,
    pub actor_id: MemberId,
    pub reason: Option<String>,
}
