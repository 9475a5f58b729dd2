mod common;

use common::*;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tanda_engine::EngineError;
use tanda_engine::config::CollectionPolicy;
use tanda_engine::domain::contribution::ContributionSource;
use tanda_engine::domain::ports::{PayoutStore, PoolStore};

const MEMBERS: [(u64, &str); 6] = [
    (100, "Ana"),
    (101, "Bea"),
    (102, "Carla"),
    (103, "Dora"),
    (104, "Elsa"),
    (105, "Fina"),
];

/// Repeated random reorders must always leave a dense 1..=N permutation,
/// with each member holding the slot their place in the new order implies.
#[tokio::test]
async fn test_random_reorders_keep_positions_dense() {
    let h = harness(CollectionPolicy::default());
    seed_pool(&h, 1, &MEMBERS).await;
    let ids: Vec<u64> = MEMBERS.iter().map(|(id, _)| *id).collect();

    let mut rng = StdRng::seed_from_u64(42);
    for _ in 0..20 {
        let mut order = ids.clone();
        order.shuffle(&mut rng);
        h.engine.positions.reorder_positions(1, &order).await.unwrap();

        let members = h.store.pool_members(1).await.unwrap();
        let mut positions: Vec<u32> = members.iter().map(|m| m.position).collect();
        positions.sort_unstable();
        assert_eq!(positions, (1..=6).collect::<Vec<u32>>());

        for (index, id) in order.iter().enumerate() {
            let member = members.iter().find(|m| m.id == *id).unwrap();
            assert_eq!(member.position as usize, index + 1);
        }
    }
}

#[tokio::test]
async fn test_reorder_after_payout_preserves_history() {
    let h = harness(CollectionPolicy::default());
    seed_pool(&h, 1, &[(10, "Ana"), (11, "Bea"), (12, "Carla")]).await;
    for member in [10, 11, 12] {
        h.engine
            .record_contribution(1, 1, member, ContributionSource::ManualConfirm)
            .await
            .unwrap();
    }
    let paid = h.engine.process_payout(1, 10).await.unwrap();
    assert_eq!(paid.recipient_id, 10);

    h.engine.positions.reorder_positions(1, &[12, 11]).await.unwrap();

    // The completed round keeps its event and its recipient's slot.
    let history = h.store.pool_payouts(1).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].recipient_id, 10);
    assert_eq!(h.engine.ledger.member(10).await.unwrap().position, 1);
    assert_eq!(h.engine.ledger.member(12).await.unwrap().position, 2);
    assert_eq!(h.engine.ledger.member(11).await.unwrap().position, 3);

    // A paid member cannot re-enter the rotation.
    let err = h
        .engine
        .positions
        .reorder_positions(1, &[10, 11, 12])
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidPermutation(_)));
}

/// A reorder racing a payout on the same pool must fully serialize: either
/// the reorder lands first and the payout pays the new position-1 holder,
/// or the payout lands first and the reorder (which still names the paid
/// member) is rejected. Neither interleaving may corrupt the rotation.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_reorder_racing_payout_never_corrupts_rotation() {
    for _ in 0..10 {
        let h = harness(CollectionPolicy::default());
        seed_pool(&h, 1, &[(10, "Ana"), (11, "Bea"), (12, "Carla")]).await;
        for member in [10, 11, 12] {
            h.engine
                .record_contribution(1, 1, member, ContributionSource::ManualConfirm)
                .await
                .unwrap();
        }

        let payout_engine = h.engine.clone();
        let reorder_engine = h.engine.clone();
        let payout = tokio::spawn(async move { payout_engine.process_payout(1, 10).await });
        let reorder = tokio::spawn(async move {
            reorder_engine.positions.reorder_positions(1, &[12, 11, 10]).await
        });
        let event = payout.await.unwrap().unwrap();
        let reorder_result = reorder.await.unwrap();

        match &reorder_result {
            // Reorder won: Carla took position 1 before the payout ran.
            Ok(_) => assert_eq!(event.recipient_id, 12),
            // Payout won: the full-membership order now names a paid member.
            Err(EngineError::InvalidPermutation(_)) => assert_eq!(event.recipient_id, 10),
            Err(other) => panic!("unexpected reorder error: {other}"),
        }

        let members = h.store.pool_members(1).await.unwrap();
        let mut positions: Vec<u32> = members.iter().map(|m| m.position).collect();
        positions.sort_unstable();
        assert_eq!(positions, vec![1, 2, 3]);

        let recipient = members.iter().find(|m| m.id == event.recipient_id).unwrap();
        assert!(recipient.payout_received);
        assert_eq!(recipient.position, 1);

        let history = h.store.pool_payouts(1).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].recipient_id, event.recipient_id);
        assert_eq!(h.engine.ledger.pool(1).await.unwrap().current_round, 2);
    }
}

#[tokio::test]
async fn test_corrupted_orders_leave_positions_untouched() {
    let h = harness(CollectionPolicy::default());
    seed_pool(&h, 1, &MEMBERS).await;
    let ids: Vec<u64> = MEMBERS.iter().map(|(id, _)| *id).collect();

    let snapshot = h.store.pool_members(1).await.unwrap();
    let mut rng = StdRng::seed_from_u64(7);

    for _ in 0..10 {
        let mut order = ids.clone();
        order.shuffle(&mut rng);

        // Duplicate entry
        let mut duplicated = order.clone();
        duplicated[5] = duplicated[0];
        let err = h
            .engine
            .positions
            .reorder_positions(1, &duplicated)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidPermutation(_)));

        // Missing entry
        let err = h
            .engine
            .positions
            .reorder_positions(1, &order[..5])
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidPermutation(_)));

        // Non-member
        let mut stranger = order.clone();
        stranger[3] = 999;
        let err = h
            .engine
            .positions
            .reorder_positions(1, &stranger)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidPermutation(_)));
    }

    assert_eq!(h.store.pool_members(1).await.unwrap(), snapshot);
}
