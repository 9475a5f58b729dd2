use crate::error::{EngineError, Result};
use chrono::{DateTime, Months, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub type PoolId = u64;
pub type MemberId = u64;

/// A positive monetary amount.
///
/// Wrapper around `rust_decimal::Decimal` so contribution amounts can never
/// be zero or negative once constructed.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self> {
        if value > Decimal::ZERO {
            Ok(Self(value))
        } else {
            Err(EngineError::Validation(
                "amount must be positive".to_string(),
            ))
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = EngineError;

    fn try_from(value: Decimal) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

/// Contribution cadence of a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Weekly,
    Biweekly,
    Monthly,
    Custom { days: u32 },
}

impl Frequency {
    /// Date reached after `periods` whole intervals from `start`.
    ///
    /// Monthly uses calendar-month arithmetic rather than a 30-day
    /// approximation, clamping to the last valid day of the target month.
    pub fn offset_from(&self, start: DateTime<Utc>, periods: u32) -> DateTime<Utc> {
        match self {
            Frequency::Weekly => start + chrono::Duration::weeks(periods as i64),
            Frequency::Biweekly => start + chrono::Duration::weeks(2 * periods as i64),
            Frequency::Monthly => start
                .checked_add_months(Months::new(periods))
                .unwrap_or(start),
            Frequency::Custom { days } => {
                start + chrono::Duration::days(*days as i64 * periods as i64)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolStatus {
    Pending,
    Active,
    Completed,
}

/// A rotating savings pool: fixed membership, fixed contribution, one payout
/// recipient per round in position order.
///
/// `total_rounds` equals the member count and is fixed at creation;
/// `current_round` stays within `1..=total_rounds` while the pool runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pool {
    pub id: PoolId,
    pub name: String,
    pub admin_id: MemberId,
    pub contribution_amount: Amount,
    /// Flat fee deducted from each round's pot.
    pub platform_fee: Decimal,
    pub frequency: Frequency,
    pub start_date: DateTime<Utc>,
    pub total_rounds: u32,
    pub current_round: u32,
    pub status: PoolStatus,
}

impl Pool {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: PoolId,
        name: impl Into<String>,
        admin_id: MemberId,
        contribution_amount: Amount,
        platform_fee: Decimal,
        frequency: Frequency,
        start_date: DateTime<Utc>,
        total_rounds: u32,
    ) -> Result<Self> {
        if total_rounds < 2 {
            return Err(EngineError::Validation(
                "a pool needs at least two rounds".to_string(),
            ));
        }
        if platform_fee < Decimal::ZERO {
            return Err(EngineError::Validation(
                "platform fee cannot be negative".to_string(),
            ));
        }
        if let Frequency::Custom { days: 0 } = frequency {
            return Err(EngineError::Validation(
                "custom frequency needs at least one day".to_string(),
            ));
        }
        Ok(Self {
            id,
            name: name.into(),
            admin_id,
            contribution_amount,
            platform_fee,
            frequency,
            start_date,
            total_rounds,
            current_round: 1,
            status: PoolStatus::Pending,
        })
    }

    /// Due date of a 1-based round: start + (round - 1) intervals.
    pub fn round_due_date(&self, round: u32) -> DateTime<Utc> {
        self.frequency.offset_from(self.start_date, round.saturating_sub(1))
    }

    /// Pot paid to a round's recipient: contribution x member count - fee.
    pub fn pot_amount(&self, member_count: usize) -> Decimal {
        self.contribution_amount.value() * Decimal::from(member_count as u64) - self.platform_fee
    }

    pub fn is_final_round(&self) -> bool {
        self.current_round >= self.total_rounds
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    Admin,
    Member,
}

/// A pool member with a fixed place in the payout rotation.
///
/// Positions form a dense permutation `1..=N` per pool; the member whose
/// position equals the pool's current round is that round's recipient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub id: MemberId,
    pub pool_id: PoolId,
    pub name: String,
    pub position: u32,
    pub role: MemberRole,
    pub join_date: DateTime<Utc>,
    pub payments_on_time: u32,
    pub payments_missed: u32,
    pub total_contributed: Decimal,
    pub payout_received: bool,
    /// External destination for payouts (bank alias, wallet handle, ...).
    pub payout_destination: Option<String>,
}

impl Member {
    pub fn new(
        id: MemberId,
        pool_id: PoolId,
        name: impl Into<String>,
        position: u32,
        role: MemberRole,
        join_date: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            pool_id,
            name: name.into(),
            position,
            role,
            join_date,
            payments_on_time: 0,
            payments_missed: 0,
            total_contributed: Decimal::ZERO,
            payout_received: false,
            payout_destination: None,
        }
    }

    /// Scheduled payout date, derived from position and the pool schedule.
    pub fn payout_date(&self, pool: &Pool) -> DateTime<Utc> {
        pool.round_due_date(self.position)
    }

    pub fn record_payment(&mut self, amount: Decimal, on_time: bool) {
        if on_time {
            self.payments_on_time += 1;
        } else {
            self.payments_missed += 1;
        }
        self.total_contributed += amount;
    }
}
