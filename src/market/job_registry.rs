//! # Job Registry
//!
//! Job lifecycle state machine with escrowed payments. Payment is escrowed
//! into the treasury at submission and leaves it exactly once: worker payout
//! minus platform fee on settlement, or a full client refund on
//! cancellation, failure, or expiry.
//!
//! Deadlines are evaluated lazily: any operation or read touching a job
//! first settles overdue expiry, so no state observed by a caller is stale.
//! Cross-entity worker mutations (assignment counts, reputation, slashes)
//! all go through the `WorkerRegistry`, which stays the single writer of
//! worker state.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::capabilities::ComputeRequirements;
use crate::config::MarketConfig;
use crate::economics::{JobPerformance, SlashReason};
use crate::events::{EventLog, MarketEvent};
use crate::guard::{AccessControl, Pausable, Role};
use crate::ledger::TokenLedger;
use crate::market::worker_registry::WorkerRegistry;
use crate::types::{Address, JobId, MarketError, MarketResult, TokenAmount, WorkerId};

// =============================================================================
// Job state
// =============================================================================

/// Job lifecycle states.
///
/// ```text
/// Queued -> Assigned -> Processing -> AwaitingVerification -> Completed
///    |         |            |                |        \
///    v         v            v                v         -> Failed
/// Cancelled  Expired     Expired          Disputed -> {Completed|Failed}
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobState {
    /// Submitted and escrowed, waiting for allocation
    Queued,
    /// A worker accepted the reservation; waiting for its ack
    Assigned,
    /// The worker acknowledged and is computing
    Processing,
    /// Result submitted, verification pending
    AwaitingVerification,
    /// Verified and settled. Terminal.
    Completed,
    /// Verification rejected the result. Terminal.
    Failed,
    /// A party contested the result; admin ruling pending
    Disputed,
    /// Client withdrew before assignment. Terminal.
    Cancelled,
    /// Deadline passed before completion. Terminal.
    Expired,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Failed | JobState::Cancelled | JobState::Expired
        )
    }
}

/// How a submitted result gets checked before settlement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VerificationMethod {
    /// Settle on submission sign-off alone
    None,
    /// Re-run a random sample of the workload
    StatisticalSampling,
    /// Full redundant execution on an independent worker
    RedundantCompute,
    /// Cryptographic proof checked by the proof coordinator
    ZkProof,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobResult {
    pub result_hash: String,
    pub submitted_at: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dispute {
    pub disputant: Address,
    pub reason: String,
    pub raised_at: u64,
}

/// One compute job and its full history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub job_id: JobId,
    pub client: Address,
    pub requirements: ComputeRequirements,
    pub payment: TokenAmount,
    pub verification: VerificationMethod,
    /// Content hash of the input payload
    pub input_hash: String,
    pub state: JobState,
    pub worker: Option<WorkerId>,
    pub submitted_at: u64,
    pub deadline: u64,
    pub assigned_at: Option<u64>,
    pub result: Option<JobResult>,
    pub dispute: Option<Dispute>,
}

struct JobTable {
    jobs: HashMap<JobId, Job>,
    next_id: u64,
    by_worker: HashMap<WorkerId, Vec<JobId>>,
    by_client: HashMap<Address, Vec<JobId>>,
}

// =============================================================================
// Registry
// =============================================================================

/// Escrowed job lifecycle over the worker registry
pub struct JobRegistry {
    config: MarketConfig,
    access: Arc<AccessControl>,
    pause: Arc<Pausable>,
    ledger: Arc<dyn TokenLedger>,
    events: Arc<EventLog>,
    workers: Arc<WorkerRegistry>,
    treasury: Address,
    /// Identity used for internal worker-registry mutations (slashes,
    /// reputation updates); must hold the Coordinator role
    authority: Address,
    jobs: RwLock<JobTable>,
}

impl JobRegistry {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: MarketConfig,
        access: Arc<AccessControl>,
        pause: Arc<Pausable>,
        ledger: Arc<dyn TokenLedger>,
        events: Arc<EventLog>,
        workers: Arc<WorkerRegistry>,
        treasury: Address,
        authority: Address,
    ) -> Self {
        Self {
            config,
            access,
            pause,
            ledger,
            events,
            workers,
            treasury,
            authority,
            jobs: RwLock::new(JobTable {
                jobs: HashMap::new(),
                next_id: 1,
                by_worker: HashMap::new(),
                by_client: HashMap::new(),
            }),
        }
    }

    fn now(&self) -> u64 {
        self.workers.clock().now()
    }

    // -------------------------------------------------------------------
    // Submission and allocation
    // -------------------------------------------------------------------

    /// Submit a job and escrow its payment.
    ///
    /// The transfer and the job record commit together: a ledger failure
    /// leaves no job behind.
    pub async fn submit_job(
        &self,
        client: Address,
        requirements: ComputeRequirements,
        payment: TokenAmount,
        verification: VerificationMethod,
        deadline_secs: Option<u64>,
        input_hash: String,
    ) -> MarketResult<JobId> {
        self.pause.ensure_active()?;
        if payment.is_zero() {
            return Err(MarketError::InvalidArgument("payment is zero".to_string()));
        }
        let deadline_secs = deadline_secs.unwrap_or(self.config.job.default_deadline_secs);
        if deadline_secs == 0 {
            return Err(MarketError::InvalidArgument("deadline is zero".to_string()));
        }
        let now = self.now();
        let mut table = self.jobs.write().await;
        self.ledger.transfer_from(&client, &self.treasury, payment)?;

        let job_id = JobId(table.next_id);
        table.next_id += 1;
        let deadline = now + deadline_secs;
        table.jobs.insert(
            job_id,
            Job {
                job_id,
                client: client.clone(),
                requirements,
                payment,
                verification,
                input_hash,
                state: JobState::Queued,
                worker: None,
                submitted_at: now,
                deadline,
                assigned_at: None,
                result: None,
                dispute: None,
            },
        );
        table.by_client.entry(client.clone()).or_default().push(job_id);

        info!(job = %job_id, client = %client, payment = %payment, "job submitted");
        self.events.emit(
            now,
            MarketEvent::JobSubmitted {
                job_id,
                client,
                payment,
            },
        );
        Ok(job_id)
    }

    /// AI-workload entry point; identical lifecycle, named for the calling
    /// surface
    pub async fn submit_ai_job(
        &self,
        client: Address,
        requirements: ComputeRequirements,
        payment: TokenAmount,
        verification: VerificationMethod,
        deadline_secs: Option<u64>,
        model_input_hash: String,
    ) -> MarketResult<JobId> {
        self.submit_job(
            client,
            requirements,
            payment,
            verification,
            deadline_secs,
            model_input_hash,
        )
        .await
    }

    /// Allocate the best eligible worker and bind it to the job.
    ///
    /// Allocation, reservation confirmation, and the state transition are
    /// one atomic step; `NoEligibleWorker` leaves the job Queued for retry.
    pub async fn allocate_and_assign(
        &self,
        caller: &Address,
        job_id: JobId,
    ) -> MarketResult<WorkerId> {
        self.pause.ensure_active()?;
        self.access.require(caller, Role::Coordinator)?;
        let now = self.now();
        let mut table = self.jobs.write().await;
        self.expire_if_due(&mut table, job_id, now).await?;

        let job = Self::job(&table, job_id)?;
        if job.state != JobState::Queued {
            return Err(MarketError::InvalidStateTransition {
                from: format!("{:?}", job.state),
                to: "Assigned".to_string(),
            });
        }
        let requirements = job.requirements.clone();

        let (worker_id, _score) = self.workers.allocate_job(job_id, &requirements).await?;
        self.workers.confirm_reservation(worker_id, job_id).await?;

        let job = Self::job_mut(&mut table, job_id)?;
        job.state = JobState::Assigned;
        job.worker = Some(worker_id);
        job.assigned_at = Some(now);
        table.by_worker.entry(worker_id).or_default().push(job_id);
        Ok(worker_id)
    }

    /// Worker acknowledgment: Assigned -> Processing
    pub async fn start_processing(&self, caller: &Address, job_id: JobId) -> MarketResult<()> {
        self.pause.ensure_active()?;
        let now = self.now();
        let mut table = self.jobs.write().await;
        self.expire_if_due(&mut table, job_id, now).await?;

        let job = Self::job_mut(&mut table, job_id)?;
        let worker_id = Self::assigned_worker(job)?;
        self.require_worker_owner(caller, worker_id).await?;
        if job.state != JobState::Assigned {
            return Err(MarketError::InvalidStateTransition {
                from: format!("{:?}", job.state),
                to: "Processing".to_string(),
            });
        }
        job.state = JobState::Processing;
        debug!(job = %job_id, worker = %worker_id, "processing started");
        self.events.emit(
            now,
            MarketEvent::JobProcessingStarted { job_id, worker_id },
        );
        Ok(())
    }

    // -------------------------------------------------------------------
    // Results and settlement
    // -------------------------------------------------------------------

    /// Submit the computed result. Valid while Assigned or Processing (a
    /// result from an Assigned worker implies the ack), moving the job to
    /// AwaitingVerification; jobs with no verification method settle to
    /// Completed in the same transaction. A result arriving after the
    /// deadline expires the job instead.
    pub async fn submit_job_result(
        &self,
        caller: &Address,
        job_id: JobId,
        result_hash: String,
    ) -> MarketResult<()> {
        self.pause.ensure_active()?;
        let now = self.now();
        let mut table = self.jobs.write().await;
        self.expire_if_due(&mut table, job_id, now).await?;

        let job = Self::job_mut(&mut table, job_id)?;
        let worker_id = Self::assigned_worker(job)?;
        self.require_worker_owner(caller, worker_id).await?;
        if !matches!(job.state, JobState::Assigned | JobState::Processing) {
            return Err(MarketError::InvalidStateTransition {
                from: format!("{:?}", job.state),
                to: "AwaitingVerification".to_string(),
            });
        }
        if job.result.is_some() {
            return Err(MarketError::DuplicateSubmission(job_id.to_string()));
        }
        job.result = Some(JobResult {
            result_hash: result_hash.clone(),
            submitted_at: now,
        });
        job.state = JobState::AwaitingVerification;
        let settle_directly = job.verification == VerificationMethod::None;
        info!(job = %job_id, worker = %worker_id, "result submitted");
        self.events.emit(
            now,
            MarketEvent::JobResultSubmitted {
                job_id,
                worker_id,
                result_hash,
            },
        );
        if settle_directly {
            return self.settle_success(&mut table, job_id, now).await;
        }
        Ok(())
    }

    /// Apply the verification verdict and settle the escrow.
    ///
    /// Accepted: the worker is paid the escrow minus the platform fee and
    /// its reputation credits a success. Rejected: the client is refunded in
    /// full, the worker is slashed for an invalid result, and its reputation
    /// debits a failure.
    pub async fn verify_and_settle(
        &self,
        caller: &Address,
        job_id: JobId,
        verified: bool,
    ) -> MarketResult<()> {
        self.pause.ensure_active()?;
        self.access.require(caller, Role::Coordinator)?;
        let now = self.now();
        let mut table = self.jobs.write().await;
        self.expire_if_due(&mut table, job_id, now).await?;

        let job = Self::job(&table, job_id)?;
        if job.state != JobState::AwaitingVerification {
            return Err(MarketError::InvalidStateTransition {
                from: format!("{:?}", job.state),
                to: if verified { "Completed" } else { "Failed" }.to_string(),
            });
        }
        if verified {
            self.settle_success(&mut table, job_id, now).await
        } else {
            self.settle_failure(&mut table, job_id, now, "verification rejected the result")
                .await
        }
    }

    /// Contest a result awaiting verification; client or assigned worker
    pub async fn dispute(
        &self,
        caller: &Address,
        job_id: JobId,
        reason: String,
    ) -> MarketResult<()> {
        self.pause.ensure_active()?;
        let now = self.now();
        let mut table = self.jobs.write().await;
        self.expire_if_due(&mut table, job_id, now).await?;

        let job = Self::job(&table, job_id)?;
        if job.state != JobState::AwaitingVerification {
            return Err(MarketError::InvalidStateTransition {
                from: format!("{:?}", job.state),
                to: "Disputed".to_string(),
            });
        }
        let is_client = &job.client == caller;
        let is_worker = match job.worker {
            Some(w) => self.require_worker_owner(caller, w).await.is_ok(),
            None => false,
        };
        if !is_client && !is_worker {
            return Err(MarketError::UnauthorizedCaller(format!(
                "{} is not a party to {}",
                caller, job_id
            )));
        }

        let job = Self::job_mut(&mut table, job_id)?;
        job.dispute = Some(Dispute {
            disputant: caller.clone(),
            reason,
            raised_at: now,
        });
        job.state = JobState::Disputed;
        warn!(job = %job_id, disputant = %caller, "job disputed");
        self.events.emit(
            now,
            MarketEvent::JobDisputed {
                job_id,
                disputant: caller.clone(),
            },
        );
        Ok(())
    }

    /// Admin ruling on a dispute. Upholding the worker settles as a normal
    /// success; upholding the client refunds and slashes.
    pub async fn resolve_dispute(
        &self,
        caller: &Address,
        job_id: JobId,
        uphold_worker: bool,
    ) -> MarketResult<()> {
        self.access.require(caller, Role::Admin)?;
        let now = self.now();
        let mut table = self.jobs.write().await;

        let job = Self::job(&table, job_id)?;
        if job.state != JobState::Disputed {
            return Err(MarketError::InvalidStateTransition {
                from: format!("{:?}", job.state),
                to: "resolved".to_string(),
            });
        }
        self.events.emit(
            now,
            MarketEvent::DisputeResolved {
                job_id,
                upheld: uphold_worker,
            },
        );
        if uphold_worker {
            self.settle_success(&mut table, job_id, now).await
        } else {
            self.settle_failure(&mut table, job_id, now, "dispute resolved for the client")
                .await
        }
    }

    /// Client withdrawal before assignment; refunds the full escrow
    pub async fn cancel_job(&self, caller: &Address, job_id: JobId) -> MarketResult<TokenAmount> {
        self.pause.ensure_active()?;
        let now = self.now();
        let mut table = self.jobs.write().await;
        self.expire_if_due(&mut table, job_id, now).await?;

        let job = Self::job(&table, job_id)?;
        if &job.client != caller {
            return Err(MarketError::UnauthorizedCaller(format!(
                "{} is not the client of {}",
                caller, job_id
            )));
        }
        if job.state != JobState::Queued {
            return Err(MarketError::InvalidStateTransition {
                from: format!("{:?}", job.state),
                to: "Cancelled".to_string(),
            });
        }

        let refund = job.payment;
        self.ledger.transfer_from(&self.treasury, caller, refund)?;
        let job = Self::job_mut(&mut table, job_id)?;
        job.state = JobState::Cancelled;
        info!(job = %job_id, refund = %refund, "job cancelled");
        self.events.emit(now, MarketEvent::JobCancelled { job_id, refund });
        Ok(refund)
    }

    // -------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------

    /// Full job record. Touching a job settles overdue expiry first, so the
    /// returned state is never stale.
    pub async fn get_job_details(&self, job_id: JobId) -> MarketResult<Job> {
        let now = self.now();
        let mut table = self.jobs.write().await;
        self.expire_if_due(&mut table, job_id, now).await.ok();
        Self::job(&table, job_id).cloned()
    }

    pub async fn get_job_state(&self, job_id: JobId) -> MarketResult<JobState> {
        Ok(self.get_job_details(job_id).await?.state)
    }

    pub async fn get_jobs_by_worker(&self, worker_id: WorkerId) -> Vec<JobId> {
        let table = self.jobs.read().await;
        table.by_worker.get(&worker_id).cloned().unwrap_or_default()
    }

    pub async fn get_jobs_by_client(&self, client: &Address) -> Vec<JobId> {
        let table = self.jobs.read().await;
        table.by_client.get(client).cloned().unwrap_or_default()
    }

    // -------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------

    fn job<'t>(table: &'t JobTable, id: JobId) -> MarketResult<&'t Job> {
        table
            .jobs
            .get(&id)
            .ok_or_else(|| MarketError::NotFound(id.to_string()))
    }

    fn job_mut<'t>(table: &'t mut JobTable, id: JobId) -> MarketResult<&'t mut Job> {
        table
            .jobs
            .get_mut(&id)
            .ok_or_else(|| MarketError::NotFound(id.to_string()))
    }

    fn assigned_worker(job: &Job) -> MarketResult<WorkerId> {
        job.worker
            .ok_or_else(|| MarketError::NotFound(format!("{} has no assigned worker", job.job_id)))
    }

    async fn require_worker_owner(
        &self,
        caller: &Address,
        worker_id: WorkerId,
    ) -> MarketResult<()> {
        let profile = self.workers.get_worker_profile(worker_id).await?;
        if &profile.owner == caller {
            Ok(())
        } else {
            Err(MarketError::UnauthorizedCaller(format!(
                "{} does not own {}",
                caller, worker_id
            )))
        }
    }

    /// Settle overdue expiry on touch. A job past its deadline in any
    /// non-terminal pre-verification state expires: the client is refunded
    /// in full, and a worker that abandoned the assignment is slashed.
    /// Returns `DeadlineExceeded` when the touch found the job expired.
    async fn expire_if_due(
        &self,
        table: &mut JobTable,
        job_id: JobId,
        now: u64,
    ) -> MarketResult<()> {
        let job = match table.jobs.get(&job_id) {
            Some(j) => j,
            None => return Ok(()), // NotFound surfaces from the caller's lookup
        };
        let expirable = matches!(
            job.state,
            JobState::Queued | JobState::Assigned | JobState::Processing
        );
        if !expirable || now <= job.deadline {
            return Ok(());
        }

        let client = job.client.clone();
        let refund = job.payment;
        let worker = job.worker;

        self.ledger.transfer_from(&self.treasury, &client, refund)?;
        let job = Self::job_mut(table, job_id)?;
        job.state = JobState::Expired;

        if let Some(worker_id) = worker {
            // The assignment was abandoned
            self.workers
                .slash_worker(
                    &self.authority,
                    worker_id,
                    SlashReason::AbandonedJob,
                    job.input_hash.clone(),
                )
                .await?;
            self.workers
                .update_reputation(&self.authority, worker_id, JobPerformance::failure())
                .await?;
            self.workers.job_finished(worker_id, false).await;
        }

        warn!(job = %job_id, refund = %refund, "job expired");
        self.events.emit(now, MarketEvent::JobExpired { job_id });
        Err(MarketError::DeadlineExceeded(job_id.to_string()))
    }

    async fn settle_success(
        &self,
        table: &mut JobTable,
        job_id: JobId,
        now: u64,
    ) -> MarketResult<()> {
        let job = Self::job(table, job_id)?;
        let worker_id = Self::assigned_worker(job)?;
        let payment = job.payment;

        let platform_fee = payment.bps(self.config.job.platform_fee_bps);
        let worker_payout = payment.saturating_sub(platform_fee);
        let owner = self.workers.get_worker_profile(worker_id).await?.owner;
        self.ledger.transfer_from(&self.treasury, &owner, worker_payout)?;

        let job = Self::job_mut(table, job_id)?;
        job.state = JobState::Completed;

        self.workers
            .update_reputation(&self.authority, worker_id, JobPerformance::success())
            .await?;
        self.workers.job_finished(worker_id, true).await;

        info!(
            job = %job_id,
            worker = %worker_id,
            payout = %worker_payout,
            fee = %platform_fee,
            "job settled"
        );
        self.events.emit(
            now,
            MarketEvent::JobCompleted {
                job_id,
                worker_id,
                worker_payout,
                platform_fee,
            },
        );
        Ok(())
    }

    async fn settle_failure(
        &self,
        table: &mut JobTable,
        job_id: JobId,
        now: u64,
        reason: &str,
    ) -> MarketResult<()> {
        let job = Self::job(table, job_id)?;
        let worker_id = Self::assigned_worker(job)?;
        let refund = job.payment;
        let client = job.client.clone();
        let evidence = job
            .result
            .as_ref()
            .map(|r| r.result_hash.clone())
            .unwrap_or_default();

        self.ledger.transfer_from(&self.treasury, &client, refund)?;
        let job = Self::job_mut(table, job_id)?;
        job.state = JobState::Failed;

        self.workers
            .slash_worker(&self.authority, worker_id, SlashReason::InvalidResult, evidence)
            .await?;
        self.workers
            .update_reputation(&self.authority, worker_id, JobPerformance::failure())
            .await?;
        self.workers.job_finished(worker_id, false).await;

        warn!(job = %job_id, worker = %worker_id, reason, "job failed");
        self.events.emit(
            now,
            MarketEvent::JobFailed {
                job_id,
                worker_id: Some(worker_id),
                reason: reason.to_string(),
            },
        );
        Ok(())
    }
}
