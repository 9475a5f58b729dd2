use crate::domain::pool::{Amount, MemberId};
use crate::domain::ports::{ChargeOutcome, NotificationEvent, Notifier, PaymentProcessor};
use crate::error::Result;
use async_trait::async_trait;

/// Processor stand-in that approves every charge.
///
/// Used by the daemon until the real PSP adapter lands.
// TODO: replace with the production PSP adapter once the credentials flow
// for stored instruments is settled.
#[derive(Default)]
pub struct SandboxProcessor;

#[async_trait]
impl PaymentProcessor for SandboxProcessor {
    async fn charge(
        &self,
        member_id: MemberId,
        amount: Amount,
        idempotency_key: &str,
    ) -> Result<ChargeOutcome> {
        tracing::info!(
            member_id,
            amount = %amount.value(),
            idempotency_key,
            "sandbox charge approved"
        );
        Ok(ChargeOutcome::Approved)
    }
}

/// Notifier that logs deliveries instead of sending them.
#[derive(Default)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, member_id: MemberId, event: NotificationEvent) -> Result<()> {
        tracing::info!(member_id, ?event, "notification");
        Ok(())
    }
}
