//! Staking economics across services: oracle-driven tier movement, the
//! slashing invariants, withdrawal delays, and reward flows.

mod common;

use common::TestMarket;
use meshmarket::{
    Address, HolderTier, JobPerformance, LockPeriod, MarketError, SlashReason, TokenAmount,
    TokenLedger, WorkerTier,
};

#[tokio::test]
async fn tier_tracks_the_oracle_price() {
    let m = TestMarket::new();
    let w = m.register("0xw", 2_600, TestMarket::caps(16)).await;
    assert_eq!(
        m.workers.get_worker_tier(w).await.unwrap(),
        Some(WorkerTier::Enterprise)
    );

    // Token halves: $1,300 staked only clears Premium
    m.oracle.update_price(&m.admin, 50).unwrap();
    assert_eq!(
        m.workers.get_worker_tier(w).await.unwrap(),
        Some(WorkerTier::Premium)
    );

    // Token 100x: $260,000 clears Hyperscale on value, but reputation 5000
    // caps the tier at Fleet (min_reputation 5000)
    m.oracle.update_price(&m.admin, 10_000).unwrap();
    assert_eq!(
        m.workers.get_worker_tier(w).await.unwrap(),
        Some(WorkerTier::Fleet)
    );
}

#[tokio::test]
async fn adding_stake_never_lowers_the_tier() {
    let m = TestMarket::new();
    let owner = Address::from("0xw");
    let w = m.register("0xw", 150, TestMarket::caps(16)).await;

    let mut last = m.workers.get_worker_tier(w).await.unwrap();
    for add in [400_u128, 2_000, 8_000, 40_000] {
        m.ledger.mint(&owner, TokenAmount::from_tokens(add));
        m.workers
            .stake(&owner, w, TokenAmount::from_tokens(add), LockPeriod::Flexible)
            .await
            .unwrap();
        let tier = m.workers.get_worker_tier(w).await.unwrap();
        assert!(tier >= last, "tier dropped after adding stake");
        last = tier;
    }
}

#[tokio::test]
async fn lifetime_slashed_never_exceeds_peak_stake() {
    let m = TestMarket::new();
    let w = m.register("0xw", 1_000, TestMarket::caps(16)).await;

    // Hammer the worker with every violation class
    for reason in [
        SlashReason::Downtime,
        SlashReason::SlaViolation,
        SlashReason::InvalidResult,
        SlashReason::AbandonedJob,
        SlashReason::Fraud,
        SlashReason::Fraud,
    ] {
        m.workers
            .slash_worker(&m.admin, w, reason, "0xev".to_string())
            .await
            .unwrap();
        let p = m.workers.get_worker_profile(w).await.unwrap();
        assert!(p.lifetime_slashed <= p.peak_stake);
        assert!(p.stake.saturating_add(p.lifetime_slashed) <= p.peak_stake);
    }

    // The second fraud slash found nothing left to take
    let p = m.workers.get_worker_profile(w).await.unwrap();
    assert_eq!(p.stake, TokenAmount::ZERO);
}

#[tokio::test]
async fn unstake_waits_out_the_delay_and_survives_price_moves() {
    let m = TestMarket::new();
    let owner = Address::from("0xw");
    let w = m.register("0xw", 2_600, TestMarket::caps(16)).await;

    m.workers
        .request_unstake(&owner, w, TokenAmount::from_tokens(600))
        .await
        .unwrap();
    // A second request cannot stack
    assert!(matches!(
        m.workers
            .request_unstake(&owner, w, TokenAmount::from_tokens(1))
            .await,
        Err(MarketError::DuplicateSubmission(_))
    ));

    m.clock.advance(7 * 24 * 3600 + 1);
    let paid = m.workers.complete_unstake(&owner, w).await.unwrap();
    assert_eq!(paid, TokenAmount::from_tokens(600));
    assert_eq!(m.ledger.balance_of(&owner), TokenAmount::from_tokens(600));

    // Remaining $2,000 no longer clears Enterprise
    assert_eq!(
        m.workers.get_worker_tier(w).await.unwrap(),
        Some(WorkerTier::Premium)
    );
}

#[tokio::test]
async fn locked_stake_cannot_start_unstaking() {
    let m = TestMarket::new();
    let owner = Address::from("0xlocked");
    m.ledger.mint(&owner, TokenAmount::from_tokens(2_600));
    let w = m
        .workers
        .register_worker(
            owner.clone(),
            TestMarket::caps(16),
            TokenAmount::from_tokens(2_600),
            LockPeriod::SixMonths,
        )
        .await
        .unwrap();

    assert!(matches!(
        m.workers
            .request_unstake(&owner, w, TokenAmount::from_tokens(100))
            .await,
        Err(MarketError::InvalidArgument(_))
    ));

    m.clock.advance(180 * 24 * 3600 + 1);
    assert!(m
        .workers
        .request_unstake(&owner, w, TokenAmount::from_tokens(100))
        .await
        .is_ok());
}

#[tokio::test]
async fn slash_challenge_flow_end_to_end() {
    let m = TestMarket::new();
    let owner = Address::from("0xw");
    let w = m.register("0xw", 10_000, TestMarket::caps(16)).await;

    m.workers
        .slash_worker(&m.admin, w, SlashReason::SlaViolation, "0xev".to_string())
        .await
        .unwrap();
    let p = m.workers.get_worker_profile(w).await.unwrap();
    assert_eq!(p.stake, TokenAmount::from_tokens(9_500));

    // Only the owner may challenge, and only within the window
    assert!(m
        .workers
        .challenge_slash(&Address::from("0xmallory"), w, 0)
        .await
        .is_err());
    m.workers.challenge_slash(&owner, w, 0).await.unwrap();

    // Double challenge is rejected
    assert!(matches!(
        m.workers.challenge_slash(&owner, w, 0).await,
        Err(MarketError::DuplicateSubmission(_))
    ));

    m.workers
        .resolve_slash_challenge(&m.admin, w, 0, true)
        .await
        .unwrap();
    let p = m.workers.get_worker_profile(w).await.unwrap();
    assert_eq!(p.stake, TokenAmount::from_tokens(10_000));
    assert_eq!(p.lifetime_slashed, TokenAmount::ZERO);
}

#[tokio::test]
async fn challenge_after_window_fails_with_specific_error() {
    let m = TestMarket::new();
    let owner = Address::from("0xw");
    let w = m.register("0xw", 10_000, TestMarket::caps(16)).await;

    m.workers
        .slash_worker(&m.admin, w, SlashReason::Downtime, "0xev".to_string())
        .await
        .unwrap();
    m.clock.advance(3 * 24 * 3600 + 1);
    assert_eq!(
        m.workers.challenge_slash(&owner, w, 0).await,
        Err(MarketError::SlashChallengeWindowClosed)
    );
}

#[tokio::test]
async fn reward_bonus_scales_with_tier() {
    let m = TestMarket::new();
    m.ledger.mint(&m.treasury, TokenAmount::from_tokens(10_000));

    let basic = m.register("0xbasic", 150, TestMarket::caps(16)).await;
    let enterprise = m.register("0xent", 2_600, TestMarket::caps(16)).await;

    let base = TokenAmount::from_tokens(1_000);
    let basic_total = m
        .workers
        .distribute_rewards(&m.admin, basic, base)
        .await
        .unwrap();
    let enterprise_total = m
        .workers
        .distribute_rewards(&m.admin, enterprise, base)
        .await
        .unwrap();

    // Basic 100 bps vs Enterprise 400 bps
    assert_eq!(basic_total, TokenAmount::from_tokens(1_010));
    assert_eq!(enterprise_total, TokenAmount::from_tokens(1_040));
}

#[tokio::test]
async fn reputation_ema_converges_over_repeated_jobs() {
    let m = TestMarket::new();
    let w = m.register("0xw", 2_600, TestMarket::caps(16)).await;

    // Sustained good work climbs toward the ceiling without crossing it
    let mut last = 5_000;
    for _ in 0..50 {
        let score = m
            .workers
            .update_reputation(&m.admin, w, JobPerformance::success())
            .await
            .unwrap();
        assert!(score >= last);
        assert!(score <= 10_000);
        last = score;
    }
    assert!(last > 9_900);

    // One bad job dents but does not erase the history
    let after_failure = m
        .workers
        .update_reputation(&m.admin, w, JobPerformance::failure())
        .await
        .unwrap();
    assert!(after_failure > 8_500);
}

#[tokio::test]
async fn delegation_lifts_holder_tier_not_worker_tier() {
    let m = TestMarket::new();
    let w = m.register("0xw", 2_600, TestMarket::caps(16)).await;
    let backer = m.fund("0xbacker", 300_000);

    m.workers
        .delegate(&backer, w, TokenAmount::from_tokens(300_000))
        .await
        .unwrap();

    assert_eq!(
        m.workers.get_worker_tier(w).await.unwrap(),
        Some(WorkerTier::Enterprise)
    );
    assert_eq!(
        m.workers.get_holder_tier(w).await.unwrap(),
        HolderTier::Institution
    );
}
