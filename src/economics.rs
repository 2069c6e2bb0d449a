//! # Marketplace Economics
//!
//! Tier tables, slashing percentages, and the reputation update rule.
//!
//! Key properties:
//! - A worker's tier is a pure function of staked USD value and reputation;
//!   it is recomputed on read and never stored authoritatively.
//! - Slash amounts are table-driven percentages of current stake, capped at
//!   the stake itself.
//! - Reputation is an exponential moving average over per-job signals,
//!   clamped to [0, 10000].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{Address, TokenAmount, WorkerId};

// =============================================================================
// Reputation bounds
// =============================================================================

/// Maximum reputation score
pub const REPUTATION_MAX: u32 = 10_000;

/// Score assigned to freshly registered workers
pub const REPUTATION_INITIAL: u32 = 5_000;

// =============================================================================
// Worker tiers
// =============================================================================

/// Worker service class, ordered lowest to highest.
///
/// Gates allocation priority and reward bonuses. Derived from staked USD
/// value and reputation; both conditions must hold, so a well-funded but
/// low-reputation worker is capped at a lower tier.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum WorkerTier {
    Basic,
    Premium,
    Enterprise,
    Infrastructure,
    Fleet,
    Datacenter,
    Hyperscale,
    Institutional,
}

/// One row of the tier eligibility/benefit table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierPolicy {
    pub tier: WorkerTier,
    /// Minimum staked USD value, in cents
    pub usd_requirement_cents: u128,
    /// Minimum reputation score (0-10000)
    pub min_reputation: u32,
    /// Allocation priority multiplier (1 = Basic .. 8 = Institutional)
    pub allocation_priority: u8,
    /// Performance bonus on rewards, in basis points
    pub reward_bonus_bps: u32,
}

/// Default tier table. USD requirements and bonus spread are network
/// policy; the Enterprise row anchors at $2,500.
pub const TIER_TABLE: [TierPolicy; 8] = [
    TierPolicy {
        tier: WorkerTier::Basic,
        usd_requirement_cents: 10_000, // $100
        min_reputation: 0,
        allocation_priority: 1,
        reward_bonus_bps: 100,
    },
    TierPolicy {
        tier: WorkerTier::Premium,
        usd_requirement_cents: 50_000, // $500
        min_reputation: 2_000,
        allocation_priority: 2,
        reward_bonus_bps: 250,
    },
    TierPolicy {
        tier: WorkerTier::Enterprise,
        usd_requirement_cents: 250_000, // $2,500
        min_reputation: 3_000,
        allocation_priority: 3,
        reward_bonus_bps: 400,
    },
    TierPolicy {
        tier: WorkerTier::Infrastructure,
        usd_requirement_cents: 1_000_000, // $10,000
        min_reputation: 4_000,
        allocation_priority: 4,
        reward_bonus_bps: 600,
    },
    TierPolicy {
        tier: WorkerTier::Fleet,
        usd_requirement_cents: 5_000_000, // $50,000
        min_reputation: 5_000,
        allocation_priority: 5,
        reward_bonus_bps: 900,
    },
    TierPolicy {
        tier: WorkerTier::Datacenter,
        usd_requirement_cents: 10_000_000, // $100,000
        min_reputation: 6_000,
        allocation_priority: 6,
        reward_bonus_bps: 1_200,
    },
    TierPolicy {
        tier: WorkerTier::Hyperscale,
        usd_requirement_cents: 25_000_000, // $250,000
        min_reputation: 7_000,
        allocation_priority: 7,
        reward_bonus_bps: 1_600,
    },
    TierPolicy {
        tier: WorkerTier::Institutional,
        usd_requirement_cents: 50_000_000, // $500,000
        min_reputation: 8_000,
        allocation_priority: 8,
        reward_bonus_bps: 2_000,
    },
];

impl WorkerTier {
    pub fn policy(&self) -> &'static TierPolicy {
        // Table rows are declared in tier order
        &TIER_TABLE[*self as usize]
    }

    pub fn allocation_priority(&self) -> u8 {
        self.policy().allocation_priority
    }

    pub fn reward_bonus_bps(&self) -> u32 {
        self.policy().reward_bonus_bps
    }

    /// Compute the tier for a given staked USD value and reputation.
    ///
    /// Walks the table from highest to lowest; the result is the highest
    /// tier whose USD requirement AND reputation minimum are both met.
    /// Returns `None` when even Basic is out of reach.
    pub fn compute(usd_value_cents: u128, reputation: u32) -> Option<WorkerTier> {
        TIER_TABLE
            .iter()
            .rev()
            .find(|policy| {
                usd_value_cents >= policy.usd_requirement_cents
                    && reputation >= policy.min_reputation
            })
            .map(|policy| policy.tier)
    }
}

impl fmt::Display for WorkerTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Derived classification of token holders by USD value of holdings
/// (stake plus delegations). Recomputed on read, never stored.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum HolderTier {
    Regular,
    Whale,
    Institution,
    HyperWhale,
}

impl HolderTier {
    /// Classification thresholds, in USD cents
    pub fn from_usd_cents(usd_value_cents: u128) -> HolderTier {
        const WHALE: u128 = 5_000_000; // $50,000
        const INSTITUTION: u128 = 25_000_000; // $250,000
        const HYPER_WHALE: u128 = 100_000_000; // $1,000,000

        if usd_value_cents >= HYPER_WHALE {
            HolderTier::HyperWhale
        } else if usd_value_cents >= INSTITUTION {
            HolderTier::Institution
        } else if usd_value_cents >= WHALE {
            HolderTier::Whale
        } else {
            HolderTier::Regular
        }
    }
}

// =============================================================================
// Slashing
// =============================================================================

/// Defined violations, each mapped to a confiscation percentage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SlashReason {
    /// Missed heartbeats while holding a reservation
    Downtime,
    /// Result delivered after the SLA deadline
    SlaViolation,
    /// Result failed verification
    InvalidResult,
    /// Assigned job abandoned without a result
    AbandonedJob,
    /// Provably fabricated result or proof
    Fraud,
    /// Key compromise or protocol-level attack
    SecurityBreach,
}

impl SlashReason {
    /// Confiscation percentage of current stake (1% minor .. 100% fraud)
    pub fn slash_percent(&self) -> u8 {
        match self {
            SlashReason::Downtime => 1,
            SlashReason::SlaViolation => 5,
            SlashReason::InvalidResult => 10,
            SlashReason::AbandonedJob => 15,
            SlashReason::Fraud => 100,
            SlashReason::SecurityBreach => 100,
        }
    }

    /// Violations that always deactivate the worker, regardless of the
    /// cumulative-slash threshold
    pub fn is_severe(&self) -> bool {
        matches!(self, SlashReason::Fraud | SlashReason::SecurityBreach)
    }
}

impl fmt::Display for SlashReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Immutable append-only slash log entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlashRecord {
    pub worker: WorkerId,
    pub reason: SlashReason,
    pub amount: TokenAmount,
    pub timestamp: u64,
    pub evidence_hash: String,
    pub reporter: Address,
}

/// Lifetime slashing beyond this share of peak stake auto-deactivates the
/// worker (status `Slashed`, removed from the allocation pool)
pub const AUTO_SLASH_THRESHOLD_BPS: u32 = 2_500; // 25%

// =============================================================================
// Reputation
// =============================================================================

/// Reputation EMA parameters. The smoothing keeps single noisy jobs from
/// swinging the score while staying responsive over a handful of jobs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ReputationPolicy {
    /// Weight on the previous score (0.9 by default)
    pub history_weight: f64,
    /// Weight on the fresh per-job signal (0.1 by default)
    pub signal_weight: f64,
    /// Share of the signal driven by result quality
    pub quality_weight: f64,
    /// Share of the signal driven by response time
    pub response_time_weight: f64,
}

impl Default for ReputationPolicy {
    fn default() -> Self {
        Self {
            history_weight: 0.9,
            signal_weight: 0.1,
            quality_weight: 0.8,
            response_time_weight: 0.2,
        }
    }
}

/// Per-job performance signal, each component on the 0-10000 scale
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct JobPerformance {
    /// Result quality (verification margin, output acceptance)
    pub quality_score: u32,
    /// Timeliness relative to the SLA deadline
    pub response_score: u32,
}

impl JobPerformance {
    /// Canonical signal for a cleanly verified on-time job
    pub fn success() -> Self {
        Self {
            quality_score: REPUTATION_MAX,
            response_score: REPUTATION_MAX,
        }
    }

    /// Canonical signal for a failed or rejected job
    pub fn failure() -> Self {
        Self {
            quality_score: 0,
            response_score: 0,
        }
    }
}

impl ReputationPolicy {
    /// EMA update: `new = history_weight * old + signal_weight * signal`,
    /// where the signal blends quality and response time. Clamped to
    /// [0, 10000].
    pub fn update(&self, old_score: u32, performance: JobPerformance) -> u32 {
        let signal = performance.quality_score as f64 * self.quality_weight
            + performance.response_score as f64 * self.response_time_weight;
        let new_score =
            self.history_weight * old_score as f64 + self.signal_weight * signal;
        (new_score.round() as i64).clamp(0, REPUTATION_MAX as i64) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_table_is_ordered() {
        for window in TIER_TABLE.windows(2) {
            assert!(window[0].usd_requirement_cents < window[1].usd_requirement_cents);
            assert!(window[0].min_reputation <= window[1].min_reputation);
            assert!(window[0].allocation_priority < window[1].allocation_priority);
            assert!(window[0].reward_bonus_bps < window[1].reward_bonus_bps);
        }
        assert_eq!(TIER_TABLE[0].reward_bonus_bps, 100);
        assert_eq!(TIER_TABLE[7].reward_bonus_bps, 2_000);
    }

    #[test]
    fn test_tier_policy_lookup_matches_table() {
        assert_eq!(WorkerTier::Basic.policy().tier, WorkerTier::Basic);
        assert_eq!(
            WorkerTier::Institutional.policy().tier,
            WorkerTier::Institutional
        );
        assert_eq!(WorkerTier::Enterprise.policy().usd_requirement_cents, 250_000);
    }

    #[test]
    fn test_tier_compute_enterprise_at_2600_usd() {
        // Scenario A: $2,600 staked with adequate reputation -> Enterprise
        let tier = WorkerTier::compute(260_000, REPUTATION_INITIAL).unwrap();
        assert_eq!(tier, WorkerTier::Enterprise);
    }

    #[test]
    fn test_tier_requires_both_conditions() {
        // Well-funded but low-reputation worker is capped below its capital
        let capital_rich = WorkerTier::compute(50_000_000, 0).unwrap();
        assert_eq!(capital_rich, WorkerTier::Basic);

        // Reputation alone cannot buy a tier either
        assert_eq!(WorkerTier::compute(0, REPUTATION_MAX), None);
    }

    #[test]
    fn test_tier_monotonic_in_stake() {
        let reputation = REPUTATION_MAX;
        let mut last = None;
        for usd in [0u128, 10_000, 50_000, 250_000, 5_000_000, 50_000_000] {
            let tier = WorkerTier::compute(usd, reputation);
            assert!(tier >= last, "tier decreased as stake grew");
            last = tier;
        }
    }

    #[test]
    fn test_holder_tier_thresholds() {
        assert_eq!(HolderTier::from_usd_cents(0), HolderTier::Regular);
        assert_eq!(HolderTier::from_usd_cents(4_999_999), HolderTier::Regular);
        assert_eq!(HolderTier::from_usd_cents(5_000_000), HolderTier::Whale);
        assert_eq!(HolderTier::from_usd_cents(25_000_000), HolderTier::Institution);
        assert_eq!(HolderTier::from_usd_cents(100_000_000), HolderTier::HyperWhale);
    }

    #[test]
    fn test_slash_percent_range() {
        assert_eq!(SlashReason::Downtime.slash_percent(), 1);
        assert_eq!(SlashReason::Fraud.slash_percent(), 100);
        assert!(SlashReason::Fraud.is_severe());
        assert!(!SlashReason::SlaViolation.is_severe());
    }

    #[test]
    fn test_reputation_ema_moves_toward_signal() {
        let policy = ReputationPolicy::default();

        let up = policy.update(5_000, JobPerformance::success());
        assert_eq!(up, 5_500); // 0.9*5000 + 0.1*10000

        let down = policy.update(5_000, JobPerformance::failure());
        assert_eq!(down, 4_500); // 0.9*5000 + 0.1*0
    }

    #[test]
    fn test_reputation_clamped() {
        let policy = ReputationPolicy::default();
        assert!(policy.update(REPUTATION_MAX, JobPerformance::success()) <= REPUTATION_MAX);
        assert_eq!(policy.update(0, JobPerformance::failure()), 0);
    }
}
