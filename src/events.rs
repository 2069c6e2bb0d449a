//! # Marketplace Events
//!
//! Append-only event log with live fan-out. Every state-changing operation
//! records exactly one event on success; consumers either replay the
//! sequenced log or subscribe to the unbounded channel for live delivery.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

use crate::economics::{SlashReason, WorkerTier};
use crate::types::{Address, JobId, ProofJobId, TokenAmount, WorkerId};

/// Everything observable that happens in the marketplace core
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MarketEvent {
    // ------------------------------- jobs -------------------------------
    JobSubmitted {
        job_id: JobId,
        client: Address,
        payment: TokenAmount,
    },
    JobAllocated {
        job_id: JobId,
        worker_id: WorkerId,
        score: u32,
    },
    JobProcessingStarted {
        job_id: JobId,
        worker_id: WorkerId,
    },
    JobResultSubmitted {
        job_id: JobId,
        worker_id: WorkerId,
        result_hash: String,
    },
    JobCompleted {
        job_id: JobId,
        worker_id: WorkerId,
        worker_payout: TokenAmount,
        platform_fee: TokenAmount,
    },
    JobFailed {
        job_id: JobId,
        worker_id: Option<WorkerId>,
        reason: String,
    },
    JobCancelled {
        job_id: JobId,
        refund: TokenAmount,
    },
    JobExpired {
        job_id: JobId,
    },
    JobDisputed {
        job_id: JobId,
        disputant: Address,
    },
    DisputeResolved {
        job_id: JobId,
        upheld: bool,
    },

    // ------------------------------ workers -----------------------------
    WorkerRegistered {
        worker_id: WorkerId,
        owner: Address,
        stake: TokenAmount,
        tier: Option<WorkerTier>,
    },
    StakeAdded {
        worker_id: WorkerId,
        amount: TokenAmount,
        total: TokenAmount,
    },
    StakeDelegated {
        worker_id: WorkerId,
        delegator: Address,
        amount: TokenAmount,
    },
    UnstakeRequested {
        worker_id: WorkerId,
        amount: TokenAmount,
        available_at: u64,
    },
    UnstakeCompleted {
        worker_id: WorkerId,
        amount: TokenAmount,
    },
    ReputationUpdated {
        worker_id: WorkerId,
        old_score: u32,
        new_score: u32,
    },
    WorkerSlashed {
        worker_id: WorkerId,
        reason: SlashReason,
        amount: TokenAmount,
        deactivated: bool,
    },
    SlashChallenged {
        worker_id: WorkerId,
        slash_index: usize,
    },
    SlashChallengeResolved {
        worker_id: WorkerId,
        slash_index: usize,
        overturned: bool,
        refund: TokenAmount,
    },
    RewardsDistributed {
        worker_id: WorkerId,
        base: TokenAmount,
        bonus: TokenAmount,
    },
    RewardsClaimed {
        worker_id: WorkerId,
        amount: TokenAmount,
    },
    WorkerStatusChanged {
        worker_id: WorkerId,
        status: String,
    },
    WorkerBanned {
        worker_id: WorkerId,
    },

    // ------------------------------ proofs ------------------------------
    ProofJobSubmitted {
        proof_id: ProofJobId,
        reward: TokenAmount,
    },
    ProofJobClaimed {
        proof_id: ProofJobId,
        worker_id: WorkerId,
    },
    ProofVerified {
        proof_id: ProofJobId,
        worker_id: WorkerId,
        reward: TokenAmount,
    },
    ProofFailed {
        proof_id: ProofJobId,
        worker_id: WorkerId,
        slashed: TokenAmount,
    },
    ProofRewardEscalated {
        proof_id: ProofJobId,
        old_reward: TokenAmount,
        new_reward: TokenAmount,
    },
    ProofDisputed {
        proof_id: ProofJobId,
    },
    NetworkCapacityAlert {
        queued_proofs: usize,
        active_provers: usize,
    },
}

/// A sequenced, timestamped log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Monotonic sequence number, unique across the log
    pub sequence: u64,
    /// Unix seconds at emission
    pub timestamp: u64,
    pub event: MarketEvent,
}

/// Append-only event log with a live subscription channel.
///
/// Emission never blocks: the channel is unbounded, and a dropped receiver
/// simply stops live delivery while the log keeps growing.
pub struct EventLog {
    records: Mutex<Vec<EventRecord>>,
    sender: mpsc::UnboundedSender<EventRecord>,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<EventRecord>>>,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLog {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            records: Mutex::new(Vec::new()),
            sender,
            receiver: Mutex::new(Some(receiver)),
        }
    }

    /// Append an event, assigning the next sequence number
    pub fn emit(&self, timestamp: u64, event: MarketEvent) {
        let mut records = self.records.lock();
        let record = EventRecord {
            sequence: records.len() as u64,
            timestamp,
            event,
        };
        debug!(sequence = record.sequence, event = ?record.event, "event emitted");
        records.push(record.clone());
        // Send failure just means nobody is listening live
        let _ = self.sender.send(record);
    }

    /// Take the live event receiver (can only be called once)
    pub fn take_event_receiver(&self) -> Option<mpsc::UnboundedReceiver<EventRecord>> {
        self.receiver.lock().take()
    }

    /// Snapshot of the full log, in sequence order
    pub fn records(&self) -> Vec<EventRecord> {
        self.records.lock().clone()
    }

    /// Number of events recorded so far
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// JSON dump of the full log, for operator tooling
    pub fn export_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.records())
    }
}
