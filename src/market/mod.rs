//! Core marketplace services: worker staking/allocation, job lifecycle, and
//! proof-generation economics.

pub mod job_registry;
pub mod proof_coordinator;
pub mod worker_registry;

pub use job_registry::{Job, JobRegistry, JobState, VerificationMethod};
pub use proof_coordinator::{
    ProofCoordinator, ProofEconomics, ProofJobSpec, ProofJobState, ProofPolicy, ProofPriority,
    ProofType, ProverMetrics, SlaMetrics,
};
pub use worker_registry::{
    LockPeriod, StakeInfo, WorkerProfile, WorkerRegistry, WorkerStatus,
};
