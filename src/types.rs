//! # Core Types
//!
//! Fundamental identifier, amount, error, and clock types shared by every
//! module in the marketplace engine.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Unique identifier for a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct JobId(pub u64);

impl JobId {
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

/// Unique identifier for a worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WorkerId(pub u64);

impl WorkerId {
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker-{}", self.0)
    }
}

/// Unique identifier for a proof-generation job
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProofJobId(pub u64);

impl fmt::Display for ProofJobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "proof-{}", self.0)
    }
}

/// Opaque on-ledger account address (clients, worker owners, the oracle role)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address(String);

impl Address {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Address {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Number of wei in one whole MESH token (18 decimals)
pub const TOKEN_DECIMALS: u128 = 1_000_000_000_000_000_000;

/// MESH token amount (in wei, 18 decimals)
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct TokenAmount(u128);

impl TokenAmount {
    pub const ZERO: TokenAmount = TokenAmount(0);

    /// Create an amount from raw wei
    pub fn from_wei(wei: u128) -> Self {
        Self(wei)
    }

    /// Create an amount from whole tokens
    pub fn from_tokens(tokens: u128) -> Self {
        Self(tokens.saturating_mul(TOKEN_DECIMALS))
    }

    pub fn as_wei(&self) -> u128 {
        self.0
    }

    /// Whole-token value, truncating dust
    pub fn as_tokens(&self) -> u128 {
        self.0 / TOKEN_DECIMALS
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn saturating_add(self, other: TokenAmount) -> TokenAmount {
        TokenAmount(self.0.saturating_add(other.0))
    }

    pub fn saturating_sub(self, other: TokenAmount) -> TokenAmount {
        TokenAmount(self.0.saturating_sub(other.0))
    }

    pub fn min(self, other: TokenAmount) -> TokenAmount {
        TokenAmount(self.0.min(other.0))
    }

    /// Fraction of this amount expressed in basis points (100 bps = 1%)
    pub fn bps(&self, basis_points: u32) -> TokenAmount {
        TokenAmount(
            self.0 / 10_000 * basis_points as u128
                + self.0 % 10_000 * basis_points as u128 / 10_000,
        )
    }

    /// Percentage of this amount (0-100)
    pub fn percent(&self, pct: u8) -> TokenAmount {
        self.bps(pct as u32 * 100)
    }
}

impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{:06} MESH",
            self.0 / TOKEN_DECIMALS,
            (self.0 % TOKEN_DECIMALS) / 1_000_000_000_000
        )
    }
}

/// Error taxonomy for the marketplace core.
///
/// Every rejected operation surfaces a specific kind so the off-chain
/// coordinator can decide whether to retry with a different worker, wait,
/// or alert the user. All errors abort the enclosing operation with no
/// partial effect.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MarketError {
    #[error("invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("insufficient stake: required {required} wei, found {available} wei")]
    InsufficientStake { required: u128, available: u128 },

    #[error("unauthorized caller: {0}")]
    UnauthorizedCaller(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("deadline exceeded: {0}")]
    DeadlineExceeded(String),

    #[error("capability mismatch: {0}")]
    CapabilityMismatch(String),

    #[error("duplicate submission: {0}")]
    DuplicateSubmission(String),

    #[error("slash challenge window closed")]
    SlashChallengeWindowClosed,

    #[error("proof verification failed: {0}")]
    ProofVerificationFailed(String),

    #[error("insufficient funds: required {required} wei, found {available} wei")]
    InsufficientFunds { required: u128, available: u128 },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("registry is paused")]
    Paused,

    #[error("no eligible worker for the requested capabilities")]
    NoEligibleWorker,

    #[error("worker {0} is already reserved")]
    WorkerReserved(WorkerId),
}

/// Result type for marketplace operations
pub type MarketResult<T> = Result<T, MarketError>;

/// Time source for deadline and lock evaluation.
///
/// Deadlines are evaluated lazily by comparing stored timestamps against
/// `now()` on the next touching operation; the core never runs timer
/// threads, so tests can drive a synthetic clock deterministically.
pub trait Clock: Send + Sync {
    /// Current time in unix seconds
    fn now(&self) -> u64;
}

/// Wall-clock time source for production use
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        chrono::Utc::now().timestamp() as u64
    }
}

/// Manually driven clock for tests and simulations
#[derive(Debug)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start: u64) -> Self {
        Self {
            now: AtomicU64::new(start),
        }
    }

    pub fn set(&self, now: u64) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: u64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Hash arbitrary bytes into a hex digest (result hashes, dispute evidence)
pub fn hash_bytes(data: &[u8]) -> String {
    use sha2::{Digest, Sha256};

    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("0x{}", hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_amount_conversion() {
        let amount = TokenAmount::from_tokens(2600);
        assert_eq!(amount.as_wei(), 2_600_000_000_000_000_000_000);
        assert_eq!(amount.as_tokens(), 2600);
    }

    #[test]
    fn test_token_amount_bps() {
        let amount = TokenAmount::from_tokens(100);
        // 250 bps = 2.5%
        assert_eq!(
            amount.bps(250),
            TokenAmount::from_wei(2_500_000_000_000_000_000)
        );
        // 100% stays exact
        assert_eq!(amount.bps(10_000), amount);
    }

    #[test]
    fn test_token_amount_percent_full_slash() {
        let stake = TokenAmount::from_tokens(5000);
        assert_eq!(stake.percent(100), stake);
        assert_eq!(stake.percent(0), TokenAmount::ZERO);
    }

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new(1_000);
        assert_eq!(clock.now(), 1_000);
        clock.advance(604_800);
        assert_eq!(clock.now(), 605_800);
        clock.set(42);
        assert_eq!(clock.now(), 42);
    }

    #[test]
    fn test_hash_bytes_is_stable() {
        let a = hash_bytes(b"result payload");
        let b = hash_bytes(b"result payload");
        assert_eq!(a, b);
        assert!(a.starts_with("0x"));
        assert_eq!(a.len(), 66);
    }

    #[test]
    fn test_id_ordering_is_stable() {
        assert!(WorkerId(1) < WorkerId(2));
        assert!(JobId(10) > JobId(9));
    }
}
