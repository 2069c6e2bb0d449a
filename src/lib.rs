//! # MeshMarket Core
//!
//! Job/worker matching and economic-security engine for a decentralized
//! compute marketplace. Clients escrow payment for compute jobs, workers
//! collateralize their participation with stake, and the engine handles
//! allocation, verification settlement, reputation, slashing, and the proof
//! bounty market. Transport, execution, and proof checking live in the
//! surrounding node; this crate is the authoritative state machine they
//! drive.

pub mod capabilities;
pub mod config;
pub mod economics;
pub mod events;
pub mod guard;
pub mod ledger;
pub mod market;
pub mod oracle;
pub mod types;

// Re-export core identifiers and results
pub use types::{
    Address, Clock, JobId, ManualClock, MarketError, MarketResult, ProofJobId, SystemClock,
    TokenAmount, WorkerId,
};

// Re-export the capability model
pub use capabilities::{CapabilityFlags, ComputeRequirements, WorkerCapabilities};

// Re-export economics policy types
pub use economics::{
    HolderTier, JobPerformance, ReputationPolicy, SlashReason, TierPolicy, WorkerTier,
};

// Re-export configuration
pub use config::{AllocationWeights, JobPolicy, MarketConfig, StakingPolicy};

// Re-export the core services
pub use market::{
    Job, JobRegistry, JobState, LockPeriod, ProofCoordinator, ProofEconomics, ProofJobSpec,
    ProofJobState, ProofPolicy, ProofPriority, ProofType, ProverMetrics, SlaMetrics, StakeInfo,
    VerificationMethod, WorkerProfile, WorkerRegistry, WorkerStatus,
};

// Re-export collaborator seams
pub use events::{EventLog, EventRecord, MarketEvent};
pub use guard::{AccessControl, Pausable, Role};
pub use ledger::{InMemoryLedger, TokenLedger};
pub use oracle::PriceOracle;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Initialize the library's logging
pub fn init() -> MarketResult<()> {
    tracing_subscriber::fmt::init();
    Ok(())
}
