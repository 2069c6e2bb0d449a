//! # Engine Configuration
//!
//! Tunable policy knobs grouped per concern. Everything here is network
//! policy rather than protocol law: defaults match mainnet parameters, and
//! tests override individual fields through struct update syntax.

use serde::{Deserialize, Serialize};

use crate::economics::ReputationPolicy;
use crate::types::TokenAmount;

/// Relative weights for allocation scoring. Applied only to workers that
/// already passed the binary hardware filter; must sum to 1.0.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AllocationWeights {
    pub hardware: f64,
    pub tier: f64,
    pub reputation: f64,
}

impl Default for AllocationWeights {
    fn default() -> Self {
        Self {
            hardware: 0.4,
            tier: 0.3,
            reputation: 0.3,
        }
    }
}

/// Stake lifecycle parameters
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StakingPolicy {
    /// Delay between an unstake request and withdrawal eligibility, seconds
    pub unstake_delay_secs: u64,
    /// Absolute floor below which registration is rejected outright, in wei.
    /// The USD tier floor is the real gate; this catches dust registrations
    /// when the oracle price collapses.
    pub min_stake: TokenAmount,
    /// Seconds a slash stays challengeable after being applied
    pub slash_challenge_window_secs: u64,
}

impl Default for StakingPolicy {
    fn default() -> Self {
        Self {
            unstake_delay_secs: 7 * 24 * 3600,
            min_stake: TokenAmount::from_tokens(1),
            slash_challenge_window_secs: 3 * 24 * 3600,
        }
    }
}

/// Job lifecycle parameters
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct JobPolicy {
    /// Platform cut of each job payment, in basis points
    pub platform_fee_bps: u32,
    /// Lifetime of a worker reservation taken during allocation, seconds
    pub reservation_duration_secs: u64,
    /// A worker silent longer than this is considered offline, seconds
    pub heartbeat_timeout_secs: u64,
    /// Default wall-clock budget for a job when the client sets none, seconds
    pub default_deadline_secs: u64,
    /// Jobs a worker may hold at once; allocation skips workers at the limit
    pub max_concurrent_jobs: u32,
}

impl Default for JobPolicy {
    fn default() -> Self {
        Self {
            platform_fee_bps: 250, // 2.5%
            reservation_duration_secs: 300,
            heartbeat_timeout_secs: 600,
            default_deadline_secs: 24 * 3600,
            max_concurrent_jobs: 1,
        }
    }
}

/// Top-level engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarketConfig {
    pub allocation: AllocationWeights,
    pub reputation: ReputationPolicy,
    pub staking: StakingPolicy,
    pub job: JobPolicy,
}
