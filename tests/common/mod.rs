#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tanda_engine::Engine;
use tanda_engine::config::CollectionPolicy;
use tanda_engine::domain::pool::{Amount, Frequency, MemberId, Pool, PoolId};
use tanda_engine::domain::ports::{
    ChargeOutcome, Clock, DeclineKind, NotificationEvent, Notifier, PaymentProcessor,
};
use tanda_engine::error::Result;
use tanda_engine::infrastructure::in_memory::InMemoryStore;

/// Clock fixed at a start instant, advanced explicitly by the test.
#[derive(Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn at(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn advance(&self, delta: chrono::Duration) {
        *self.now.lock().unwrap() += delta;
    }

    pub fn set(&self, instant: DateTime<Utc>) {
        *self.now.lock().unwrap() = instant;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// Scripted behavior for one charge call.
#[derive(Debug, Clone)]
pub enum ScriptedCharge {
    Approve,
    DeclineTransient(&'static str),
    DeclineTerminal(&'static str),
    /// Never returns; exercises the charge timeout.
    Hang,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChargeCall {
    pub member_id: MemberId,
    pub amount: Decimal,
    pub idempotency_key: String,
}

/// Processor that replays per-member scripts and records every call.
/// Members without a script are approved.
#[derive(Clone, Default)]
pub struct ScriptedProcessor {
    scripts: Arc<Mutex<HashMap<MemberId, VecDeque<ScriptedCharge>>>>,
    calls: Arc<Mutex<Vec<ChargeCall>>>,
}

impl ScriptedProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, member_id: MemberId, outcomes: impl IntoIterator<Item = ScriptedCharge>) {
        self.scripts
            .lock()
            .unwrap()
            .entry(member_id)
            .or_default()
            .extend(outcomes);
    }

    pub fn calls(&self) -> Vec<ChargeCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, member_id: MemberId) -> Vec<ChargeCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.member_id == member_id)
            .collect()
    }
}

#[async_trait]
impl PaymentProcessor for ScriptedProcessor {
    async fn charge(
        &self,
        member_id: MemberId,
        amount: Amount,
        idempotency_key: &str,
    ) -> Result<ChargeOutcome> {
        let next = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(ChargeCall {
                member_id,
                amount: amount.value(),
                idempotency_key: idempotency_key.to_string(),
            });
            self.scripts
                .lock()
                .unwrap()
                .get_mut(&member_id)
                .and_then(|queue| queue.pop_front())
        };
        match next {
            None | Some(ScriptedCharge::Approve) => Ok(ChargeOutcome::Approved),
            Some(ScriptedCharge::DeclineTransient(reason)) => Ok(ChargeOutcome::Declined {
                kind: DeclineKind::Transient,
                reason: reason.to_string(),
            }),
            Some(ScriptedCharge::DeclineTerminal(reason)) => Ok(ChargeOutcome::Declined {
                kind: DeclineKind::Terminal,
                reason: reason.to_string(),
            }),
            Some(ScriptedCharge::Hang) => {
                tokio::time::sleep(std::time::Duration::from_secs(86_400)).await;
                Ok(ChargeOutcome::Approved)
            }
        }
    }
}

/// Notifier that records every delivery.
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    events: Arc<Mutex<Vec<(MemberId, NotificationEvent)>>>,
}

impl RecordingNotifier {
    pub fn events(&self) -> Vec<(MemberId, NotificationEvent)> {
        self.events.lock().unwrap().clone()
    }

    pub fn escalations_to(&self, member_id: MemberId) -> usize {
        self.events()
            .iter()
            .filter(|(to, event)| {
                *to == member_id
                    && matches!(event, NotificationEvent::CollectionEscalated { .. })
            })
            .count()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, member_id: MemberId, event: NotificationEvent) -> Result<()> {
        self.events.lock().unwrap().push((member_id, event));
        Ok(())
    }
}

pub struct Harness {
    pub engine: Engine,
    pub store: Arc<InMemoryStore>,
    pub clock: ManualClock,
    pub processor: ScriptedProcessor,
    pub notifier: RecordingNotifier,
}

pub fn start_instant() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 6, 1, 9, 0, 0).unwrap()
}

pub fn harness(policy: CollectionPolicy) -> Harness {
    let store = Arc::new(InMemoryStore::new());
    let clock = ManualClock::at(start_instant());
    let processor = ScriptedProcessor::new();
    let notifier = RecordingNotifier::default();
    let engine = Engine::with_store(
        store.clone(),
        Arc::new(processor.clone()),
        Arc::new(notifier.clone()),
        Arc::new(clock.clone()),
        policy,
    );
    Harness {
        engine,
        store,
        clock,
        processor,
        notifier,
    }
}

/// Weekly pool starting now, $10 contribution, no platform fee; the first
/// listed member is the admin. Every member gets a payout destination.
pub async fn seed_pool(
    harness: &Harness,
    pool_id: PoolId,
    members: &[(MemberId, &str)],
) -> Pool {
    let pool = Pool::new(
        pool_id,
        "la tanda",
        members[0].0,
        Amount::new(dec!(10)).unwrap(),
        dec!(0),
        Frequency::Weekly,
        harness.clock.now(),
        members.len() as u32,
    )
    .unwrap();
    harness.engine.create_pool(pool.clone()).await.unwrap();
    for (member_id, name) in members {
        harness
            .engine
            .join_member(pool_id, *member_id, *name, Some(format!("acct-{member_id}")))
            .await
            .unwrap();
    }
    pool
}
