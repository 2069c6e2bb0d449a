//! # Proof Coordinator
//!
//! Economics for proof-generation work: bounty escrow, stake-gated claims,
//! reward escalation for stale bounties, conflict disputes, and per-type SLA
//! tracking. Proof *checking* itself is the verifier's job upstream; this
//! module only prices, assigns, and settles the work.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::economics::{JobPerformance, SlashReason};
use crate::events::{EventLog, MarketEvent};
use crate::guard::{AccessControl, Pausable, Role};
use crate::ledger::TokenLedger;
use crate::market::worker_registry::WorkerRegistry;
use crate::types::{Address, MarketError, MarketResult, ProofJobId, TokenAmount, WorkerId};

// =============================================================================
// Proof taxonomy and economics
// =============================================================================

/// Supported proof systems
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProofType {
    Groth16,
    Plonk,
    Stark,
    Stwo,
    RiscZero,
    Sp1,
    TeeAttestation,
    Custom,
}

/// Bounty urgency; scales the base reward
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ProofPriority {
    Standard,
    High,
    Critical,
    Emergency,
}

impl ProofPriority {
    pub fn reward_multiplier_bps(&self) -> u32 {
        match self {
            ProofPriority::Standard => 10_000,
            ProofPriority::High => 12_500,
            ProofPriority::Critical => 15_000,
            ProofPriority::Emergency => 20_000,
        }
    }
}

/// Per-type pricing and stake gate
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ProofEconomics {
    /// Bounty for a Standard-priority job of this type
    pub base_reward: TokenAmount,
    /// Minimum prover stake to claim; the collateral a bad proof forfeits
    pub stake_requirement: TokenAmount,
    /// Wall-clock budget from claim to submission, seconds
    pub max_computation_secs: u64,
}

/// Proof-market policy table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofPolicy {
    /// Queued longer than this before escalation becomes available
    pub escalation_after_secs: u64,
    /// Each escalation raises the reward by this much
    pub escalation_step_bps: u32,
    /// Reward never exceeds this multiple of the original bounty
    pub escalation_cap_bps: u32,
    /// Capacity alert fires when a type's success rate drops below this
    pub sla_alert_threshold: f64,
    /// Minimum settled jobs before the alert can fire
    pub sla_min_sample: u64,
}

impl Default for ProofPolicy {
    fn default() -> Self {
        Self {
            escalation_after_secs: 600,
            escalation_step_bps: 2_500,  // +25% per escalation
            escalation_cap_bps: 30_000,  // 3x the original bounty
            sla_alert_threshold: 0.8,
            sla_min_sample: 10,
        }
    }
}

impl ProofPolicy {
    /// Heavier systems pay more and demand more collateral and time
    pub fn economics(&self, proof_type: ProofType) -> ProofEconomics {
        let (reward_tokens, stake_tokens, secs) = match proof_type {
            ProofType::Groth16 => (10, 500, 600),
            ProofType::Plonk => (12, 500, 900),
            ProofType::Stark => (20, 1_000, 1_800),
            ProofType::Stwo => (15, 750, 1_200),
            ProofType::RiscZero => (25, 1_000, 3_600),
            ProofType::Sp1 => (25, 1_000, 3_600),
            ProofType::TeeAttestation => (5, 250, 300),
            ProofType::Custom => (30, 2_000, 7_200),
        };
        ProofEconomics {
            base_reward: TokenAmount::from_tokens(reward_tokens),
            stake_requirement: TokenAmount::from_tokens(stake_tokens),
            max_computation_secs: secs,
        }
    }
}

// =============================================================================
// Proof job state
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProofJobState {
    /// Bounty posted, unclaimed
    Queued,
    /// A prover holds the exclusive claim
    Claimed,
    /// Proof submitted, verification pending
    Submitted,
    /// Verified and paid. Terminal.
    Verified,
    /// Rejected; prover slashed, requester refunded. Terminal.
    Failed,
    /// Conflicting submissions; admin ruling pending
    Disputed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofSubmission {
    pub worker_id: WorkerId,
    pub proof_hash: String,
    pub submitted_at: u64,
}

/// One proof bounty and its history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofJobSpec {
    pub proof_id: ProofJobId,
    pub requester: Address,
    pub proof_type: ProofType,
    pub priority: ProofPriority,
    /// Content hash of the statement/circuit inputs
    pub input_hash: String,
    /// Current bounty (escalations raise it)
    pub reward: TokenAmount,
    /// Bounty at submission; denominator of the escalation cap
    pub original_reward: TokenAmount,
    pub state: ProofJobState,
    pub prover: Option<WorkerId>,
    pub created_at: u64,
    pub claimed_at: Option<u64>,
    /// Claim-relative computation deadline, set on claim
    pub compute_deadline: Option<u64>,
    pub submissions: Vec<ProofSubmission>,
}

/// Rolling per-type service quality
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SlaMetrics {
    pub settled: u64,
    pub succeeded: u64,
    pub failed: u64,
    /// Sum of claim-to-verification seconds over succeeded jobs
    total_completion_secs: u64,
}

impl SlaMetrics {
    pub fn success_rate(&self) -> f64 {
        if self.settled == 0 {
            return 1.0;
        }
        self.succeeded as f64 / self.settled as f64
    }

    pub fn avg_completion_secs(&self) -> u64 {
        if self.succeeded == 0 {
            return 0;
        }
        self.total_completion_secs / self.succeeded
    }
}

/// Per-prover track record in the proof market
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ProverMetrics {
    pub claimed: u64,
    pub verified: u64,
    pub failed: u64,
    pub timed_out: u64,
    pub earned: TokenAmount,
}

struct ProofTable {
    jobs: HashMap<ProofJobId, ProofJobSpec>,
    next_id: u64,
    sla: HashMap<ProofType, SlaMetrics>,
    provers: HashMap<WorkerId, ProverMetrics>,
}

// =============================================================================
// Coordinator
// =============================================================================

/// Proof bounty market over the worker registry
pub struct ProofCoordinator {
    policy: ProofPolicy,
    access: Arc<AccessControl>,
    pause: Arc<Pausable>,
    ledger: Arc<dyn TokenLedger>,
    events: Arc<EventLog>,
    workers: Arc<WorkerRegistry>,
    treasury: Address,
    /// Identity for internal worker-registry mutations; holds Coordinator
    authority: Address,
    proofs: RwLock<ProofTable>,
}

impl ProofCoordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        policy: ProofPolicy,
        access: Arc<AccessControl>,
        pause: Arc<Pausable>,
        ledger: Arc<dyn TokenLedger>,
        events: Arc<EventLog>,
        workers: Arc<WorkerRegistry>,
        treasury: Address,
        authority: Address,
    ) -> Self {
        Self {
            policy,
            access,
            pause,
            ledger,
            events,
            workers,
            treasury,
            authority,
            proofs: RwLock::new(ProofTable {
                jobs: HashMap::new(),
                next_id: 1,
                sla: HashMap::new(),
                provers: HashMap::new(),
            }),
        }
    }

    fn now(&self) -> u64 {
        self.workers.clock().now()
    }

    // -------------------------------------------------------------------
    // Bounty lifecycle
    // -------------------------------------------------------------------

    /// Post a proof bounty. The reward is the per-type base scaled by
    /// priority, escrowed from the requester up front.
    pub async fn submit_prove_job(
        &self,
        requester: Address,
        proof_type: ProofType,
        priority: ProofPriority,
        input_hash: String,
    ) -> MarketResult<ProofJobId> {
        self.pause.ensure_active()?;
        let now = self.now();
        let economics = self.policy.economics(proof_type);
        let reward = economics.base_reward.bps(priority.reward_multiplier_bps());

        let mut table = self.proofs.write().await;
        self.ledger.transfer_from(&requester, &self.treasury, reward)?;

        let proof_id = ProofJobId(table.next_id);
        table.next_id += 1;
        table.jobs.insert(
            proof_id,
            ProofJobSpec {
                proof_id,
                requester,
                proof_type,
                priority,
                input_hash,
                reward,
                original_reward: reward,
                state: ProofJobState::Queued,
                prover: None,
                created_at: now,
                claimed_at: None,
                compute_deadline: None,
                submissions: Vec::new(),
            },
        );

        info!(proof = %proof_id, ?proof_type, ?priority, reward = %reward, "prove job submitted");
        self.events.emit(now, MarketEvent::ProofJobSubmitted { proof_id, reward });
        Ok(proof_id)
    }

    /// Take the exclusive claim on a bounty. Gated on the prover holding at
    /// least the per-type stake requirement, so a bad proof has collateral
    /// behind it.
    pub async fn claim_prove_job(
        &self,
        caller: &Address,
        worker_id: WorkerId,
        proof_id: ProofJobId,
    ) -> MarketResult<()> {
        self.pause.ensure_active()?;
        let now = self.now();
        let mut table = self.proofs.write().await;
        self.requeue_if_overdue(&mut table, proof_id, now).await?;

        let profile = self.workers.get_worker_profile(worker_id).await?;
        if &profile.owner != caller {
            return Err(MarketError::UnauthorizedCaller(format!(
                "{} does not own {}",
                caller, worker_id
            )));
        }
        if !profile.status.is_allocatable() {
            return Err(MarketError::InvalidStateTransition {
                from: format!("{:?}", profile.status),
                to: "proving".to_string(),
            });
        }

        let job = Self::job_mut(&mut table, proof_id)?;
        if job.state != ProofJobState::Queued {
            return Err(MarketError::InvalidStateTransition {
                from: format!("{:?}", job.state),
                to: "Claimed".to_string(),
            });
        }
        let economics = self.policy.economics(job.proof_type);
        if profile.stake < economics.stake_requirement {
            return Err(MarketError::InsufficientStake {
                required: economics.stake_requirement.as_wei(),
                available: profile.stake.as_wei(),
            });
        }

        job.state = ProofJobState::Claimed;
        job.prover = Some(worker_id);
        job.claimed_at = Some(now);
        job.compute_deadline = Some(now + economics.max_computation_secs);
        table.provers.entry(worker_id).or_default().claimed += 1;

        info!(proof = %proof_id, worker = %worker_id, "prove job claimed");
        self.events.emit(now, MarketEvent::ProofJobClaimed { proof_id, worker_id });
        Ok(())
    }

    /// Submit a proof for a claimed bounty.
    ///
    /// A submission from someone other than the claim holder, carrying a
    /// different hash, marks the job Disputed for an admin ruling instead of
    /// being dropped: conflicting proofs are evidence, not noise.
    pub async fn submit_proof(
        &self,
        caller: &Address,
        worker_id: WorkerId,
        proof_id: ProofJobId,
        proof_hash: String,
    ) -> MarketResult<()> {
        self.pause.ensure_active()?;
        let now = self.now();
        let mut table = self.proofs.write().await;
        self.requeue_if_overdue(&mut table, proof_id, now).await?;

        let profile = self.workers.get_worker_profile(worker_id).await?;
        if &profile.owner != caller {
            return Err(MarketError::UnauthorizedCaller(format!(
                "{} does not own {}",
                caller, worker_id
            )));
        }

        let job = Self::job_mut(&mut table, proof_id)?;
        match job.state {
            ProofJobState::Claimed if job.prover == Some(worker_id) => {
                job.submissions.push(ProofSubmission {
                    worker_id,
                    proof_hash,
                    submitted_at: now,
                });
                job.state = ProofJobState::Submitted;
                debug!(proof = %proof_id, worker = %worker_id, "proof submitted");
                Ok(())
            }
            ProofJobState::Claimed | ProofJobState::Submitted => {
                if job.submissions.iter().any(|s| s.proof_hash == proof_hash) {
                    return Err(MarketError::DuplicateSubmission(proof_id.to_string()));
                }
                job.submissions.push(ProofSubmission {
                    worker_id,
                    proof_hash,
                    submitted_at: now,
                });
                job.state = ProofJobState::Disputed;
                warn!(proof = %proof_id, worker = %worker_id, "conflicting proof, disputed");
                self.events.emit(now, MarketEvent::ProofDisputed { proof_id });
                Ok(())
            }
            other => Err(MarketError::InvalidStateTransition {
                from: format!("{:?}", other),
                to: "Submitted".to_string(),
            }),
        }
    }

    /// Apply the verifier's verdict and settle the bounty.
    ///
    /// Valid: the prover is paid the bounty (plus its tier bonus) and
    /// credits a success. Invalid: the requester is refunded, the prover is
    /// slashed for an invalid result, and the failure lands in the SLA
    /// metrics.
    pub async fn verify_zk_proof(
        &self,
        caller: &Address,
        proof_id: ProofJobId,
        valid: bool,
    ) -> MarketResult<()> {
        self.pause.ensure_active()?;
        self.access.require(caller, Role::Coordinator)?;
        let now = self.now();
        let mut table = self.proofs.write().await;

        let job = Self::job(&table, proof_id)?;
        if job.state != ProofJobState::Submitted {
            return Err(MarketError::InvalidStateTransition {
                from: format!("{:?}", job.state),
                to: if valid { "Verified" } else { "Failed" }.to_string(),
            });
        }
        let worker_id = job.prover.ok_or_else(|| {
            MarketError::NotFound(format!("{} has no prover", proof_id))
        })?;
        self.settle(&mut table, proof_id, worker_id, valid, now).await
    }

    /// Raise a stale bounty to attract provers. Available once the job has
    /// sat unclaimed past the escalation delay; each call adds the step
    /// percentage, capped at the policy multiple of the original bounty.
    /// The requester escrows the difference.
    pub async fn escalate_prove_job_reward(
        &self,
        caller: &Address,
        proof_id: ProofJobId,
    ) -> MarketResult<TokenAmount> {
        self.pause.ensure_active()?;
        let now = self.now();
        let mut table = self.proofs.write().await;

        let job = Self::job(&table, proof_id)?;
        if &job.requester != caller {
            return Err(MarketError::UnauthorizedCaller(format!(
                "{} is not the requester of {}",
                caller, proof_id
            )));
        }
        if job.state != ProofJobState::Queued {
            return Err(MarketError::InvalidStateTransition {
                from: format!("{:?}", job.state),
                to: "escalated".to_string(),
            });
        }
        if now < job.created_at + self.policy.escalation_after_secs {
            return Err(MarketError::InvalidArgument(format!(
                "escalation available at {}",
                job.created_at + self.policy.escalation_after_secs
            )));
        }

        let cap = job.original_reward.bps(self.policy.escalation_cap_bps);
        let raised = job
            .reward
            .saturating_add(job.reward.bps(self.policy.escalation_step_bps))
            .min(cap);
        if raised <= job.reward {
            return Err(MarketError::InvalidArgument(
                "reward already at escalation cap".to_string(),
            ));
        }
        let delta = raised.saturating_sub(job.reward);
        self.ledger.transfer_from(caller, &self.treasury, delta)?;

        let old_reward = job.reward;
        let job = Self::job_mut(&mut table, proof_id)?;
        job.reward = raised;

        info!(proof = %proof_id, old = %old_reward, new = %raised, "reward escalated");
        self.events.emit(
            now,
            MarketEvent::ProofRewardEscalated {
                proof_id,
                old_reward,
                new_reward: raised,
            },
        );
        Ok(raised)
    }

    /// Admin ruling on conflicting submissions: the submission matching
    /// `canonical_proof_hash` wins the bounty; every other submitter is
    /// slashed for fraud.
    pub async fn resolve_dispute(
        &self,
        caller: &Address,
        proof_id: ProofJobId,
        canonical_proof_hash: &str,
    ) -> MarketResult<WorkerId> {
        self.access.require(caller, Role::Admin)?;
        let now = self.now();
        let mut table = self.proofs.write().await;

        let job = Self::job(&table, proof_id)?;
        if job.state != ProofJobState::Disputed {
            return Err(MarketError::InvalidStateTransition {
                from: format!("{:?}", job.state),
                to: "resolved".to_string(),
            });
        }
        let winner = job
            .submissions
            .iter()
            .find(|s| s.proof_hash == canonical_proof_hash)
            .map(|s| s.worker_id)
            .ok_or_else(|| {
                MarketError::NotFound(format!(
                    "no submission on {} matches the canonical proof",
                    proof_id
                ))
            })?;
        let losers: Vec<WorkerId> = job
            .submissions
            .iter()
            .filter(|s| s.worker_id != winner)
            .map(|s| s.worker_id)
            .collect();

        for loser in losers {
            self.workers
                .slash_worker(
                    &self.authority,
                    loser,
                    SlashReason::Fraud,
                    canonical_proof_hash.to_string(),
                )
                .await?;
            self.workers
                .update_reputation(&self.authority, loser, JobPerformance::failure())
                .await?;
            let metrics = table.provers.entry(loser).or_default();
            metrics.failed += 1;
        }
        self.settle(&mut table, proof_id, winner, true, now).await?;
        Ok(winner)
    }

    // -------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------

    pub async fn get_proof_job(&self, proof_id: ProofJobId) -> MarketResult<ProofJobSpec> {
        let table = self.proofs.read().await;
        Self::job(&table, proof_id).cloned()
    }

    /// Rolling service quality for one proof type
    pub async fn get_sla_metrics(&self, proof_type: ProofType) -> SlaMetrics {
        let table = self.proofs.read().await;
        table.sla.get(&proof_type).copied().unwrap_or_default()
    }

    pub async fn get_prover_metrics(&self, worker_id: WorkerId) -> ProverMetrics {
        let table = self.proofs.read().await;
        table.provers.get(&worker_id).copied().unwrap_or_default()
    }

    /// Unclaimed bounties, oldest first
    pub async fn get_queued_jobs(&self) -> Vec<ProofJobId> {
        let table = self.proofs.read().await;
        let mut queued: Vec<(u64, ProofJobId)> = table
            .jobs
            .values()
            .filter(|j| j.state == ProofJobState::Queued)
            .map(|j| (j.created_at, j.proof_id))
            .collect();
        queued.sort();
        queued.into_iter().map(|(_, id)| id).collect()
    }

    // -------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------

    fn job<'t>(table: &'t ProofTable, id: ProofJobId) -> MarketResult<&'t ProofJobSpec> {
        table
            .jobs
            .get(&id)
            .ok_or_else(|| MarketError::NotFound(id.to_string()))
    }

    fn job_mut<'t>(
        table: &'t mut ProofTable,
        id: ProofJobId,
    ) -> MarketResult<&'t mut ProofJobSpec> {
        table
            .jobs
            .get_mut(&id)
            .ok_or_else(|| MarketError::NotFound(id.to_string()))
    }

    /// Lazy timeout: a claim past its computation deadline returns the
    /// bounty to the queue and penalizes the prover for the blown SLA.
    async fn requeue_if_overdue(
        &self,
        table: &mut ProofTable,
        proof_id: ProofJobId,
        now: u64,
    ) -> MarketResult<()> {
        let job = match table.jobs.get(&proof_id) {
            Some(j) => j,
            None => return Ok(()),
        };
        let overdue = job.state == ProofJobState::Claimed
            && matches!(job.compute_deadline, Some(d) if now > d);
        if !overdue {
            return Ok(());
        }
        let prover = job.prover.expect("claimed job has a prover");

        self.workers
            .slash_worker(
                &self.authority,
                prover,
                SlashReason::SlaViolation,
                job.input_hash.clone(),
            )
            .await?;
        self.workers
            .update_reputation(&self.authority, prover, JobPerformance::failure())
            .await?;

        let job = Self::job_mut(table, proof_id)?;
        job.state = ProofJobState::Queued;
        job.prover = None;
        job.claimed_at = None;
        job.compute_deadline = None;
        table.provers.entry(prover).or_default().timed_out += 1;

        warn!(proof = %proof_id, prover = %prover, "claim timed out, bounty requeued");
        Ok(())
    }

    async fn settle(
        &self,
        table: &mut ProofTable,
        proof_id: ProofJobId,
        worker_id: WorkerId,
        valid: bool,
        now: u64,
    ) -> MarketResult<()> {
        let job = Self::job(table, proof_id)?;
        let reward = job.reward;
        let requester = job.requester.clone();
        let proof_type = job.proof_type;
        let completion_secs = job
            .claimed_at
            .map(|c| now.saturating_sub(c))
            .unwrap_or(0);

        if valid {
            // The escrowed bounty funds the payout; the tier bonus rides on
            // top from the treasury
            self.workers
                .distribute_rewards(&self.authority, worker_id, reward)
                .await?;
            self.workers
                .update_reputation(&self.authority, worker_id, JobPerformance::success())
                .await?;

            let job = Self::job_mut(table, proof_id)?;
            job.state = ProofJobState::Verified;
            let metrics = table.provers.entry(worker_id).or_default();
            metrics.verified += 1;
            metrics.earned = metrics.earned.saturating_add(reward);

            info!(proof = %proof_id, worker = %worker_id, reward = %reward, "proof verified");
            self.events.emit(
                now,
                MarketEvent::ProofVerified {
                    proof_id,
                    worker_id,
                    reward,
                },
            );
        } else {
            self.ledger.transfer_from(&self.treasury, &requester, reward)?;
            let slashed = self
                .workers
                .slash_worker(
                    &self.authority,
                    worker_id,
                    SlashReason::InvalidResult,
                    format!("{}", proof_id),
                )
                .await?;
            self.workers
                .update_reputation(&self.authority, worker_id, JobPerformance::failure())
                .await?;

            let job = Self::job_mut(table, proof_id)?;
            job.state = ProofJobState::Failed;
            table.provers.entry(worker_id).or_default().failed += 1;

            warn!(proof = %proof_id, worker = %worker_id, slashed = %slashed, "proof rejected");
            self.events.emit(
                now,
                MarketEvent::ProofFailed {
                    proof_id,
                    worker_id,
                    slashed,
                },
            );
        }

        // Update the rolling SLA and alert on degraded capacity
        let sla = table.sla.entry(proof_type).or_default();
        sla.settled += 1;
        if valid {
            sla.succeeded += 1;
            sla.total_completion_secs += completion_secs;
        } else {
            sla.failed += 1;
        }
        if sla.settled >= self.policy.sla_min_sample
            && sla.success_rate() < self.policy.sla_alert_threshold
        {
            let queued = table
                .jobs
                .values()
                .filter(|j| j.state == ProofJobState::Queued)
                .count();
            let active = table
                .jobs
                .values()
                .filter(|j| j.state == ProofJobState::Claimed)
                .count();
            warn!(?proof_type, rate = sla.success_rate(), "proof SLA degraded");
            self.events.emit(
                now,
                MarketEvent::NetworkCapacityAlert {
                    queued_proofs: queued,
                    active_provers: active,
                },
            );
        }
        Ok(())
    }
}
