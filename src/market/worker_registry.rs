//! # Worker Registry
//!
//! Staking, tiers, reputation, slashing, rewards, and job allocation. This
//! is the economic-security half of the marketplace: a worker's standing is
//! collateralized by its stake, and every privilege (allocation priority,
//! reward bonuses) is derived from stake value and behavioral history.
//!
//! Concurrency model: a single `tokio::sync::RwLock` over the worker table,
//! held across validate-then-mutate so every operation is atomic and
//! per-worker mutations are serialized. Reservations and heartbeat timeouts
//! are evaluated lazily against the injected clock on the next touching
//! operation; the registry runs no timers.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::capabilities::{ComputeRequirements, WorkerCapabilities};
use crate::config::MarketConfig;
use crate::economics::{
    HolderTier, JobPerformance, SlashReason, SlashRecord, WorkerTier,
    AUTO_SLASH_THRESHOLD_BPS, REPUTATION_INITIAL, TIER_TABLE,
};
use crate::events::{EventLog, MarketEvent};
use crate::guard::{AccessControl, Pausable, Role};
use crate::ledger::TokenLedger;
use crate::oracle::PriceOracle;
use crate::types::{
    Address, Clock, JobId, MarketError, MarketResult, TokenAmount, WorkerId, TOKEN_DECIMALS,
};

// =============================================================================
// Worker state
// =============================================================================

/// Worker lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkerStatus {
    /// Heartbeating and allocatable
    Active,
    /// Missed heartbeats; excluded from allocation until the next heartbeat
    Inactive,
    /// Deactivated by slashing; excluded until challenges resolve
    Slashed,
    /// Owner requested exit; winding down, no new allocations
    Exiting,
    /// Administratively banned. Terminal.
    Banned,
}

impl WorkerStatus {
    /// Only Active workers enter the allocation pool
    pub fn is_allocatable(&self) -> bool {
        matches!(self, WorkerStatus::Active)
    }
}

/// Optional stake lock. Locking boosts the USD value counted toward tier
/// eligibility while the lock is live, and blocks unstaking until it expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LockPeriod {
    Flexible,
    ThreeMonths,
    SixMonths,
    TwelveMonths,
}

impl LockPeriod {
    pub fn duration_secs(&self) -> u64 {
        match self {
            LockPeriod::Flexible => 0,
            LockPeriod::ThreeMonths => 90 * 24 * 3600,
            LockPeriod::SixMonths => 180 * 24 * 3600,
            LockPeriod::TwelveMonths => 365 * 24 * 3600,
        }
    }

    /// Tier-eligibility boost in basis points over the raw USD value
    pub fn tier_boost_bps(&self) -> u32 {
        match self {
            LockPeriod::Flexible => 0,
            LockPeriod::ThreeMonths => 500,
            LockPeriod::SixMonths => 1_500,
            LockPeriod::TwelveMonths => 3_000,
        }
    }
}

/// Exclusive short-lived claim on a worker taken during allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub job_id: JobId,
    pub expires_at: u64,
}

/// Pending withdrawal; the amount stays in `stake` (and stays slashable)
/// until `complete_unstake` runs after the delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingUnstake {
    pub amount: TokenAmount,
    pub available_at: u64,
}

/// Resolution status of one slash log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlashStatus {
    Applied,
    Challenged,
    Overturned,
    Upheld,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlashEntry {
    pub record: SlashRecord,
    pub status: SlashStatus,
    pub challenge_deadline: u64,
}

/// Everything the registry tracks per worker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerProfile {
    pub worker_id: WorkerId,
    pub owner: Address,
    pub capabilities: WorkerCapabilities,
    pub status: WorkerStatus,
    pub registered_at: u64,
    pub last_heartbeat: u64,

    /// Current stake in wei, including any pending-unstake amount
    pub stake: TokenAmount,
    /// Highest stake ever held; denominator of the auto-deactivation rule
    pub peak_stake: TokenAmount,
    /// Total confiscated over the worker's lifetime
    pub lifetime_slashed: TokenAmount,
    /// Third-party delegations; counts toward holder tier, not worker tier
    pub delegated: TokenAmount,
    pub lock_until: u64,
    pub lock_boost_bps: u32,
    pub pending_unstake: Option<PendingUnstake>,

    pub reputation: u32,
    pub accrued_rewards: TokenAmount,
    pub reservation: Option<Reservation>,
    /// Jobs currently assigned; bounds allocation and breaks score ties
    pub active_job_count: u32,
    pub completed_job_count: u64,
    pub slash_log: Vec<SlashEntry>,
}

/// Read-model of a worker's economic standing. USD value and tier are
/// recomputed from the live oracle price on every call, never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StakeInfo {
    pub staked: TokenAmount,
    pub delegated: TokenAmount,
    pub usd_value_cents: u128,
    /// USD value after the lock boost; this is what tiers are computed from
    pub effective_usd_cents: u128,
    pub tier: Option<WorkerTier>,
    pub lock_until: u64,
    pub pending_unstake: Option<PendingUnstake>,
    pub lifetime_slashed: TokenAmount,
    pub peak_stake: TokenAmount,
}

struct WorkerTable {
    profiles: HashMap<WorkerId, WorkerProfile>,
    next_id: u64,
}

// =============================================================================
// Registry
// =============================================================================

/// Staking, reputation, slashing, rewards, and allocation for the worker set
pub struct WorkerRegistry {
    config: MarketConfig,
    access: Arc<AccessControl>,
    pause: Arc<Pausable>,
    oracle: Arc<PriceOracle>,
    ledger: Arc<dyn TokenLedger>,
    events: Arc<EventLog>,
    clock: Arc<dyn Clock>,
    /// Account holding staked and escrowed funds
    treasury: Address,
    workers: RwLock<WorkerTable>,
}

impl WorkerRegistry {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: MarketConfig,
        access: Arc<AccessControl>,
        pause: Arc<Pausable>,
        oracle: Arc<PriceOracle>,
        ledger: Arc<dyn TokenLedger>,
        events: Arc<EventLog>,
        clock: Arc<dyn Clock>,
        treasury: Address,
    ) -> Self {
        Self {
            config,
            access,
            pause,
            oracle,
            ledger,
            events,
            clock,
            treasury,
            workers: RwLock::new(WorkerTable {
                profiles: HashMap::new(),
                next_id: 1,
            }),
        }
    }

    // -------------------------------------------------------------------
    // Registration and liveness
    // -------------------------------------------------------------------

    /// Register a new worker with an initial stake deposit.
    ///
    /// The stake must clear the lowest tier's USD requirement at the current
    /// oracle price (after any lock boost); otherwise registration is
    /// rejected with `InsufficientStake` and no funds move.
    pub async fn register_worker(
        &self,
        owner: Address,
        capabilities: WorkerCapabilities,
        stake: TokenAmount,
        lock: LockPeriod,
    ) -> MarketResult<WorkerId> {
        self.pause.ensure_active()?;
        capabilities.validate()?;
        if stake < self.config.staking.min_stake {
            return Err(MarketError::InsufficientStake {
                required: self.config.staking.min_stake.as_wei(),
                available: stake.as_wei(),
            });
        }

        let now = self.clock.now();
        let boost = lock.tier_boost_bps();
        let effective = Self::boosted_usd(self.oracle.usd_value_cents(stake), boost);
        let tier = WorkerTier::compute(effective, REPUTATION_INITIAL);
        if tier.is_none() {
            return Err(MarketError::InsufficientStake {
                required: self.required_wei_for_basic(),
                available: stake.as_wei(),
            });
        }

        let mut table = self.workers.write().await;
        // Deposit under the lock so a ledger failure leaves no profile behind
        self.ledger.transfer_from(&owner, &self.treasury, stake)?;

        let worker_id = WorkerId(table.next_id);
        table.next_id += 1;
        let profile = WorkerProfile {
            worker_id,
            owner: owner.clone(),
            capabilities,
            status: WorkerStatus::Active,
            registered_at: now,
            last_heartbeat: now,
            stake,
            peak_stake: stake,
            lifetime_slashed: TokenAmount::ZERO,
            delegated: TokenAmount::ZERO,
            lock_until: now + lock.duration_secs(),
            lock_boost_bps: boost,
            pending_unstake: None,
            reputation: REPUTATION_INITIAL,
            accrued_rewards: TokenAmount::ZERO,
            reservation: None,
            active_job_count: 0,
            completed_job_count: 0,
            slash_log: Vec::new(),
        };
        table.profiles.insert(worker_id, profile);

        info!(worker = %worker_id, owner = %owner, stake = %stake, ?tier, "worker registered");
        self.events.emit(
            now,
            MarketEvent::WorkerRegistered {
                worker_id,
                owner,
                stake,
                tier,
            },
        );
        Ok(worker_id)
    }

    /// Replace a worker's declared hardware; owner only
    pub async fn update_worker_capabilities(
        &self,
        caller: &Address,
        worker_id: WorkerId,
        capabilities: WorkerCapabilities,
    ) -> MarketResult<()> {
        self.pause.ensure_active()?;
        capabilities.validate()?;
        let mut table = self.workers.write().await;
        let profile = Self::profile_mut(&mut table, worker_id)?;
        Self::require_owner(profile, caller)?;
        debug!(worker = %worker_id, "capabilities updated");
        profile.capabilities = capabilities;
        Ok(())
    }

    /// Record a heartbeat. An Inactive worker returns to Active; terminal
    /// and penalized statuses are not revived by heartbeats.
    pub async fn submit_heartbeat(
        &self,
        caller: &Address,
        worker_id: WorkerId,
    ) -> MarketResult<WorkerStatus> {
        self.pause.ensure_active()?;
        let now = self.clock.now();
        let mut table = self.workers.write().await;
        let profile = Self::profile_mut(&mut table, worker_id)?;
        Self::require_owner(profile, caller)?;

        profile.last_heartbeat = now;
        if profile.status == WorkerStatus::Inactive {
            profile.status = WorkerStatus::Active;
            self.events.emit(
                now,
                MarketEvent::WorkerStatusChanged {
                    worker_id,
                    status: "Active".to_string(),
                },
            );
        }
        Ok(profile.status)
    }

    /// Owner-initiated wind-down: no new allocations, stake withdrawable
    /// through the normal unstake path.
    pub async fn request_exit(&self, caller: &Address, worker_id: WorkerId) -> MarketResult<()> {
        self.pause.ensure_active()?;
        let now = self.clock.now();
        let mut table = self.workers.write().await;
        let profile = Self::profile_mut(&mut table, worker_id)?;
        Self::require_owner(profile, caller)?;

        match profile.status {
            WorkerStatus::Active | WorkerStatus::Inactive => {
                profile.status = WorkerStatus::Exiting;
                profile.reservation = None;
                info!(worker = %worker_id, "worker exiting");
                self.events.emit(
                    now,
                    MarketEvent::WorkerStatusChanged {
                        worker_id,
                        status: "Exiting".to_string(),
                    },
                );
                Ok(())
            }
            other => Err(MarketError::InvalidStateTransition {
                from: format!("{:?}", other),
                to: "Exiting".to_string(),
            }),
        }
    }

    /// Administrative ban. Terminal: no status leaves Banned.
    pub async fn ban_worker(&self, caller: &Address, worker_id: WorkerId) -> MarketResult<()> {
        self.access.require(caller, Role::Admin)?;
        let now = self.clock.now();
        let mut table = self.workers.write().await;
        let profile = Self::profile_mut(&mut table, worker_id)?;

        warn!(worker = %worker_id, "worker banned");
        profile.status = WorkerStatus::Banned;
        profile.reservation = None;
        self.events.emit(now, MarketEvent::WorkerBanned { worker_id });
        Ok(())
    }

    // -------------------------------------------------------------------
    // Staking
    // -------------------------------------------------------------------

    /// Add stake; optionally extend the lock for a larger tier boost
    pub async fn stake(
        &self,
        caller: &Address,
        worker_id: WorkerId,
        amount: TokenAmount,
        lock: LockPeriod,
    ) -> MarketResult<TokenAmount> {
        self.pause.ensure_active()?;
        if amount.is_zero() {
            return Err(MarketError::InvalidArgument("stake amount is zero".to_string()));
        }
        let now = self.clock.now();
        let mut table = self.workers.write().await;
        let profile = Self::profile_mut(&mut table, worker_id)?;
        Self::require_owner(profile, caller)?;

        self.ledger.transfer_from(caller, &self.treasury, amount)?;
        profile.stake = profile.stake.saturating_add(amount);
        profile.peak_stake = profile.peak_stake.max(profile.stake);
        let new_lock_until = now + lock.duration_secs();
        if new_lock_until > profile.lock_until {
            profile.lock_until = new_lock_until;
            profile.lock_boost_bps = lock.tier_boost_bps();
        }

        info!(worker = %worker_id, amount = %amount, total = %profile.stake, "stake added");
        self.events.emit(
            now,
            MarketEvent::StakeAdded {
                worker_id,
                amount,
                total: profile.stake,
            },
        );
        Ok(profile.stake)
    }

    /// Third-party delegation. Counts toward the owner's holder tier only;
    /// worker tiers are computed from self-stake alone.
    pub async fn delegate(
        &self,
        delegator: &Address,
        worker_id: WorkerId,
        amount: TokenAmount,
    ) -> MarketResult<()> {
        self.pause.ensure_active()?;
        if amount.is_zero() {
            return Err(MarketError::InvalidArgument("delegation amount is zero".to_string()));
        }
        let now = self.clock.now();
        let mut table = self.workers.write().await;
        let profile = Self::profile_mut(&mut table, worker_id)?;

        self.ledger.transfer_from(delegator, &self.treasury, amount)?;
        profile.delegated = profile.delegated.saturating_add(amount);
        self.events.emit(
            now,
            MarketEvent::StakeDelegated {
                worker_id,
                delegator: delegator.clone(),
                amount,
            },
        );
        Ok(())
    }

    /// Start the withdrawal delay on part of the stake. The amount remains
    /// slashable until `complete_unstake`.
    pub async fn request_unstake(
        &self,
        caller: &Address,
        worker_id: WorkerId,
        amount: TokenAmount,
    ) -> MarketResult<u64> {
        self.pause.ensure_active()?;
        let now = self.clock.now();
        let mut table = self.workers.write().await;
        let profile = Self::profile_mut(&mut table, worker_id)?;
        Self::require_owner(profile, caller)?;

        if profile.pending_unstake.is_some() {
            return Err(MarketError::DuplicateSubmission(
                "unstake request already pending".to_string(),
            ));
        }
        if now < profile.lock_until {
            return Err(MarketError::InvalidArgument(format!(
                "stake locked until {}",
                profile.lock_until
            )));
        }
        if amount > profile.stake {
            return Err(MarketError::InsufficientStake {
                required: amount.as_wei(),
                available: profile.stake.as_wei(),
            });
        }

        let available_at = now + self.config.staking.unstake_delay_secs;
        profile.pending_unstake = Some(PendingUnstake {
            amount,
            available_at,
        });
        info!(worker = %worker_id, amount = %amount, available_at, "unstake requested");
        self.events.emit(
            now,
            MarketEvent::UnstakeRequested {
                worker_id,
                amount,
                available_at,
            },
        );
        Ok(available_at)
    }

    /// Withdraw a matured unstake request. Pays out the requested amount
    /// capped at the current stake, since slashes may have shrunk it.
    pub async fn complete_unstake(
        &self,
        caller: &Address,
        worker_id: WorkerId,
    ) -> MarketResult<TokenAmount> {
        self.pause.ensure_active()?;
        let now = self.clock.now();
        let mut table = self.workers.write().await;
        let profile = Self::profile_mut(&mut table, worker_id)?;
        Self::require_owner(profile, caller)?;

        let pending = profile.pending_unstake.ok_or_else(|| {
            MarketError::NotFound(format!("no pending unstake for {}", worker_id))
        })?;
        if now < pending.available_at {
            return Err(MarketError::InvalidArgument(format!(
                "unstake available at {}",
                pending.available_at
            )));
        }

        let payout = pending.amount.min(profile.stake);
        self.ledger.transfer_from(&self.treasury, caller, payout)?;
        profile.stake = profile.stake.saturating_sub(payout);
        profile.pending_unstake = None;

        info!(worker = %worker_id, amount = %payout, "unstake completed");
        self.events.emit(
            now,
            MarketEvent::UnstakeCompleted {
                worker_id,
                amount: payout,
            },
        );
        Ok(payout)
    }

    // -------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------

    pub async fn get_worker_profile(&self, worker_id: WorkerId) -> MarketResult<WorkerProfile> {
        let table = self.workers.read().await;
        Self::profile(&table, worker_id).cloned()
    }

    /// Economic standing at the current oracle price
    pub async fn get_stake_info(&self, worker_id: WorkerId) -> MarketResult<StakeInfo> {
        let table = self.workers.read().await;
        let profile = Self::profile(&table, worker_id)?;
        Ok(self.stake_info_of(profile, self.clock.now()))
    }

    pub async fn get_worker_tier(&self, worker_id: WorkerId) -> MarketResult<Option<WorkerTier>> {
        let table = self.workers.read().await;
        let profile = Self::profile(&table, worker_id)?;
        Ok(self.tier_of(profile, self.clock.now()))
    }

    /// Holder tier over self-stake plus delegations, at the current price
    pub async fn get_holder_tier(&self, worker_id: WorkerId) -> MarketResult<HolderTier> {
        let table = self.workers.read().await;
        let profile = Self::profile(&table, worker_id)?;
        let total = profile.stake.saturating_add(profile.delegated);
        Ok(HolderTier::from_usd_cents(self.oracle.usd_value_cents(total)))
    }

    /// Workers that pass the binary hardware filter and are allocatable
    /// right now (Active status, fresh heartbeat, no live reservation,
    /// below the concurrency limit).
    pub async fn get_eligible_workers(
        &self,
        requirements: &ComputeRequirements,
    ) -> Vec<WorkerId> {
        let now = self.clock.now();
        let table = self.workers.read().await;
        let mut eligible: Vec<WorkerId> = table
            .profiles
            .values()
            .filter(|p| self.is_allocatable(p, now) && requirements.meets(&p.capabilities))
            .map(|p| p.worker_id)
            .collect();
        eligible.sort();
        eligible
    }

    /// Weighted allocation score (0-100) for a worker that passes the hard
    /// filter; `CapabilityMismatch` if it does not.
    pub async fn get_tier_allocation_score(
        &self,
        worker_id: WorkerId,
        requirements: &ComputeRequirements,
    ) -> MarketResult<u32> {
        let table = self.workers.read().await;
        let profile = Self::profile(&table, worker_id)?;
        if let Some(mismatch) = requirements.first_mismatch(&profile.capabilities) {
            return Err(MarketError::CapabilityMismatch(mismatch));
        }
        Ok(self.allocation_score(profile, requirements, self.clock.now()))
    }

    // -------------------------------------------------------------------
    // Allocation and reservations
    // -------------------------------------------------------------------

    /// Pick the best eligible worker for a job and reserve it.
    ///
    /// Hard hardware requirements filter first; survivors are ranked by the
    /// weighted score. Ties break toward fewer assigned jobs, then the
    /// lowest worker id, so allocation is fully deterministic for a given
    /// table state.
    pub async fn allocate_job(
        &self,
        job_id: JobId,
        requirements: &ComputeRequirements,
    ) -> MarketResult<(WorkerId, u32)> {
        self.pause.ensure_active()?;
        let now = self.clock.now();
        let mut table = self.workers.write().await;
        Self::refresh_all(&mut table, &self.config, now);

        let best = table
            .profiles
            .values()
            .filter(|p| self.is_allocatable(p, now) && requirements.meets(&p.capabilities))
            .map(|p| {
                (
                    self.allocation_score(p, requirements, now),
                    p.active_job_count,
                    p.worker_id,
                )
            })
            // Highest score, then fewest active jobs, then lowest id
            .max_by(|a, b| {
                a.0.cmp(&b.0)
                    .then(b.1.cmp(&a.1))
                    .then(b.2.cmp(&a.2))
            });

        let (score, _, worker_id) = best.ok_or(MarketError::NoEligibleWorker)?;
        let profile = Self::profile_mut(&mut table, worker_id)?;
        profile.reservation = Some(Reservation {
            job_id,
            expires_at: now + self.config.job.reservation_duration_secs,
        });

        info!(job = %job_id, worker = %worker_id, score, "job allocated");
        self.events.emit(
            now,
            MarketEvent::JobAllocated {
                job_id,
                worker_id,
                score,
            },
        );
        Ok((worker_id, score))
    }

    /// Take an explicit reservation on a specific worker
    pub async fn reserve_worker(&self, worker_id: WorkerId, job_id: JobId) -> MarketResult<()> {
        self.pause.ensure_active()?;
        let now = self.clock.now();
        let mut table = self.workers.write().await;
        let config = self.config.clone();
        let profile = Self::profile_mut(&mut table, worker_id)?;
        Self::refresh(profile, &config, now);

        if !profile.status.is_allocatable() {
            return Err(MarketError::InvalidStateTransition {
                from: format!("{:?}", profile.status),
                to: "reserved".to_string(),
            });
        }
        if profile.reservation.is_some() {
            return Err(MarketError::WorkerReserved(worker_id));
        }
        profile.reservation = Some(Reservation {
            job_id,
            expires_at: now + config.job.reservation_duration_secs,
        });
        Ok(())
    }

    /// Convert a live reservation into an assignment. Fails if the
    /// reservation expired or belongs to a different job.
    pub async fn confirm_reservation(
        &self,
        worker_id: WorkerId,
        job_id: JobId,
    ) -> MarketResult<()> {
        let now = self.clock.now();
        let mut table = self.workers.write().await;
        let config = self.config.clone();
        let profile = Self::profile_mut(&mut table, worker_id)?;
        Self::refresh(profile, &config, now);

        match profile.reservation {
            Some(r) if r.job_id == job_id => {
                profile.reservation = None;
                profile.active_job_count += 1;
                Ok(())
            }
            Some(_) => Err(MarketError::WorkerReserved(worker_id)),
            None => Err(MarketError::DeadlineExceeded(format!(
                "reservation for {} on {} expired",
                job_id, worker_id
            ))),
        }
    }

    /// Drop a reservation without assigning
    pub async fn release_worker(&self, worker_id: WorkerId) -> MarketResult<()> {
        let mut table = self.workers.write().await;
        let profile = Self::profile_mut(&mut table, worker_id)?;
        profile.reservation = None;
        Ok(())
    }

    /// Called by the job registry when an assigned job leaves the worker
    /// (completed, failed, cancelled, or expired)
    pub(crate) async fn job_finished(&self, worker_id: WorkerId, completed: bool) {
        let mut table = self.workers.write().await;
        if let Some(profile) = table.profiles.get_mut(&worker_id) {
            profile.active_job_count = profile.active_job_count.saturating_sub(1);
            if completed {
                profile.completed_job_count += 1;
            }
        }
    }

    // -------------------------------------------------------------------
    // Reputation and rewards
    // -------------------------------------------------------------------

    /// Apply one job's performance signal to the reputation EMA
    pub async fn update_reputation(
        &self,
        caller: &Address,
        worker_id: WorkerId,
        performance: JobPerformance,
    ) -> MarketResult<u32> {
        self.access.require(caller, Role::Coordinator)?;
        let now = self.clock.now();
        let mut table = self.workers.write().await;
        let policy = self.config.reputation;
        let profile = Self::profile_mut(&mut table, worker_id)?;

        let old_score = profile.reputation;
        profile.reputation = policy.update(old_score, performance);
        debug!(worker = %worker_id, old_score, new_score = profile.reputation, "reputation updated");
        self.events.emit(
            now,
            MarketEvent::ReputationUpdated {
                worker_id,
                old_score,
                new_score: profile.reputation,
            },
        );
        Ok(profile.reputation)
    }

    /// Pay a base reward plus the worker's tier bonus.
    ///
    /// Pays from the treasury when funded; otherwise the full amount
    /// accrues on the profile for a later `claim_rewards`.
    pub async fn distribute_rewards(
        &self,
        caller: &Address,
        worker_id: WorkerId,
        base: TokenAmount,
    ) -> MarketResult<TokenAmount> {
        self.access.require(caller, Role::Coordinator)?;
        let now = self.clock.now();
        let mut table = self.workers.write().await;
        let profile = Self::profile_mut(&mut table, worker_id)?;

        let bonus_bps = self
            .tier_of(profile, now)
            .map(|t| t.reward_bonus_bps())
            .unwrap_or(0);
        let bonus = base.bps(bonus_bps);
        let total = base.saturating_add(bonus);

        let owner = profile.owner.clone();
        match self.ledger.transfer_from(&self.treasury, &owner, total) {
            Ok(()) => {}
            Err(MarketError::InsufficientFunds { .. }) => {
                warn!(worker = %worker_id, amount = %total, "treasury short, accruing reward");
                profile.accrued_rewards = profile.accrued_rewards.saturating_add(total);
            }
            Err(e) => return Err(e),
        }

        info!(worker = %worker_id, base = %base, bonus = %bonus, "rewards distributed");
        self.events.emit(
            now,
            MarketEvent::RewardsDistributed {
                worker_id,
                base,
                bonus,
            },
        );
        Ok(total)
    }

    /// Withdraw accrued rewards
    pub async fn claim_rewards(
        &self,
        caller: &Address,
        worker_id: WorkerId,
    ) -> MarketResult<TokenAmount> {
        self.pause.ensure_active()?;
        let now = self.clock.now();
        let mut table = self.workers.write().await;
        let profile = Self::profile_mut(&mut table, worker_id)?;
        Self::require_owner(profile, caller)?;

        let amount = profile.accrued_rewards;
        if amount.is_zero() {
            return Err(MarketError::NotFound(format!(
                "no accrued rewards for {}",
                worker_id
            )));
        }
        self.ledger.transfer_from(&self.treasury, caller, amount)?;
        profile.accrued_rewards = TokenAmount::ZERO;
        self.events.emit(now, MarketEvent::RewardsClaimed { worker_id, amount });
        Ok(amount)
    }

    // -------------------------------------------------------------------
    // Slashing
    // -------------------------------------------------------------------

    /// Confiscate the table percentage of current stake for a violation.
    ///
    /// The amount is capped at the current stake. Fraud-class violations,
    /// or lifetime slashing reaching 25% of peak stake, deactivate the
    /// worker (`Slashed`). Returns the confiscated amount.
    pub async fn slash_worker(
        &self,
        caller: &Address,
        worker_id: WorkerId,
        reason: SlashReason,
        evidence_hash: String,
    ) -> MarketResult<TokenAmount> {
        self.access.require(caller, Role::Coordinator)?;
        let now = self.clock.now();
        let window = self.config.staking.slash_challenge_window_secs;
        let mut table = self.workers.write().await;
        let profile = Self::profile_mut(&mut table, worker_id)?;

        let amount = profile.stake.percent(reason.slash_percent()).min(profile.stake);
        profile.stake = profile.stake.saturating_sub(amount);
        profile.lifetime_slashed = profile.lifetime_slashed.saturating_add(amount);
        profile.slash_log.push(SlashEntry {
            record: SlashRecord {
                worker: worker_id,
                reason,
                amount,
                timestamp: now,
                evidence_hash,
                reporter: caller.clone(),
            },
            status: SlashStatus::Applied,
            challenge_deadline: now + window,
        });

        let over_threshold =
            profile.lifetime_slashed >= profile.peak_stake.bps(AUTO_SLASH_THRESHOLD_BPS);
        let deactivated = reason.is_severe() || over_threshold;
        if deactivated && profile.status != WorkerStatus::Banned {
            profile.status = WorkerStatus::Slashed;
            profile.reservation = None;
        }

        warn!(
            worker = %worker_id,
            ?reason,
            amount = %amount,
            deactivated,
            "worker slashed"
        );
        self.events.emit(
            now,
            MarketEvent::WorkerSlashed {
                worker_id,
                reason,
                amount,
                deactivated,
            },
        );
        Ok(amount)
    }

    /// Contest a slash within the challenge window; owner only
    pub async fn challenge_slash(
        &self,
        caller: &Address,
        worker_id: WorkerId,
        slash_index: usize,
    ) -> MarketResult<()> {
        self.pause.ensure_active()?;
        let now = self.clock.now();
        let mut table = self.workers.write().await;
        let profile = Self::profile_mut(&mut table, worker_id)?;
        Self::require_owner(profile, caller)?;

        let entry = profile.slash_log.get_mut(slash_index).ok_or_else(|| {
            MarketError::NotFound(format!("slash entry {} for {}", slash_index, worker_id))
        })?;
        if entry.status != SlashStatus::Applied {
            return Err(MarketError::DuplicateSubmission(
                "slash already challenged or resolved".to_string(),
            ));
        }
        if now > entry.challenge_deadline {
            return Err(MarketError::SlashChallengeWindowClosed);
        }
        entry.status = SlashStatus::Challenged;
        self.events.emit(
            now,
            MarketEvent::SlashChallenged {
                worker_id,
                slash_index,
            },
        );
        Ok(())
    }

    /// Admin ruling on a challenged slash. Overturning refunds the amount
    /// into the stake and, when the worker was auto-deactivated by this
    /// slash, restores it to Active if it drops back under the threshold.
    pub async fn resolve_slash_challenge(
        &self,
        caller: &Address,
        worker_id: WorkerId,
        slash_index: usize,
        overturned: bool,
    ) -> MarketResult<()> {
        self.access.require(caller, Role::Admin)?;
        let now = self.clock.now();
        let mut table = self.workers.write().await;
        let profile = Self::profile_mut(&mut table, worker_id)?;

        let entry = profile.slash_log.get_mut(slash_index).ok_or_else(|| {
            MarketError::NotFound(format!("slash entry {} for {}", slash_index, worker_id))
        })?;
        if entry.status != SlashStatus::Challenged {
            return Err(MarketError::InvalidStateTransition {
                from: format!("{:?}", entry.status),
                to: "resolved".to_string(),
            });
        }

        let refund = if overturned { entry.record.amount } else { TokenAmount::ZERO };
        let severe = entry.record.reason.is_severe();
        entry.status = if overturned {
            SlashStatus::Overturned
        } else {
            SlashStatus::Upheld
        };

        if overturned {
            profile.stake = profile.stake.saturating_add(refund);
            profile.lifetime_slashed = profile.lifetime_slashed.saturating_sub(refund);
            let still_over =
                profile.lifetime_slashed >= profile.peak_stake.bps(AUTO_SLASH_THRESHOLD_BPS);
            if profile.status == WorkerStatus::Slashed && !still_over && !severe {
                profile.status = WorkerStatus::Active;
            }
        }

        info!(worker = %worker_id, slash_index, overturned, "slash challenge resolved");
        self.events.emit(
            now,
            MarketEvent::SlashChallengeResolved {
                worker_id,
                slash_index,
                overturned,
                refund,
            },
        );
        Ok(())
    }

    // -------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------

    fn profile<'t>(table: &'t WorkerTable, id: WorkerId) -> MarketResult<&'t WorkerProfile> {
        table
            .profiles
            .get(&id)
            .ok_or_else(|| MarketError::NotFound(id.to_string()))
    }

    fn profile_mut<'t>(
        table: &'t mut WorkerTable,
        id: WorkerId,
    ) -> MarketResult<&'t mut WorkerProfile> {
        table
            .profiles
            .get_mut(&id)
            .ok_or_else(|| MarketError::NotFound(id.to_string()))
    }

    fn require_owner(profile: &WorkerProfile, caller: &Address) -> MarketResult<()> {
        if &profile.owner == caller {
            Ok(())
        } else {
            Err(MarketError::UnauthorizedCaller(format!(
                "{} does not own {}",
                caller, profile.worker_id
            )))
        }
    }

    /// Expire stale reservations and heartbeats for one profile
    fn refresh(profile: &mut WorkerProfile, config: &MarketConfig, now: u64) {
        if let Some(r) = profile.reservation {
            if now >= r.expires_at {
                profile.reservation = None;
            }
        }
        if profile.status == WorkerStatus::Active
            && now.saturating_sub(profile.last_heartbeat) > config.job.heartbeat_timeout_secs
        {
            profile.status = WorkerStatus::Inactive;
        }
    }

    fn refresh_all(table: &mut WorkerTable, config: &MarketConfig, now: u64) {
        for profile in table.profiles.values_mut() {
            Self::refresh(profile, config, now);
        }
    }

    /// Read-path allocatability: status and heartbeat rules as in `refresh`,
    /// plus no live reservation and room under the concurrency limit
    fn is_allocatable(&self, profile: &WorkerProfile, now: u64) -> bool {
        profile.status.is_allocatable()
            && now.saturating_sub(profile.last_heartbeat) <= self.config.job.heartbeat_timeout_secs
            && !matches!(profile.reservation, Some(r) if now < r.expires_at)
            && profile.active_job_count < self.config.job.max_concurrent_jobs
    }

    fn boosted_usd(usd_cents: u128, boost_bps: u32) -> u128 {
        usd_cents * (10_000 + boost_bps as u128) / 10_000
    }

    /// Wei needed to clear the lowest tier at the current oracle price
    fn required_wei_for_basic(&self) -> u128 {
        let price = self.oracle.get_price();
        if price == 0 {
            return u128::MAX;
        }
        TIER_TABLE[0].usd_requirement_cents * TOKEN_DECIMALS / price
    }

    fn tier_of(&self, profile: &WorkerProfile, now: u64) -> Option<WorkerTier> {
        let usd = self.oracle.usd_value_cents(profile.stake);
        let effective = if now < profile.lock_until {
            Self::boosted_usd(usd, profile.lock_boost_bps)
        } else {
            usd
        };
        WorkerTier::compute(effective, profile.reputation)
    }

    fn stake_info_of(&self, profile: &WorkerProfile, now: u64) -> StakeInfo {
        let usd = self.oracle.usd_value_cents(profile.stake);
        let effective = if now < profile.lock_until {
            Self::boosted_usd(usd, profile.lock_boost_bps)
        } else {
            usd
        };
        StakeInfo {
            staked: profile.stake,
            delegated: profile.delegated,
            usd_value_cents: usd,
            effective_usd_cents: effective,
            tier: WorkerTier::compute(effective, profile.reputation),
            lock_until: profile.lock_until,
            pending_unstake: profile.pending_unstake,
            lifetime_slashed: profile.lifetime_slashed,
            peak_stake: profile.peak_stake,
        }
    }

    /// Weighted allocation score over hardware headroom, tier priority, and
    /// reputation, each normalized to 0-100
    fn allocation_score(
        &self,
        profile: &WorkerProfile,
        requirements: &ComputeRequirements,
        now: u64,
    ) -> u32 {
        let weights = self.config.allocation;
        let hardware = requirements.match_subscore(&profile.capabilities) as f64;
        let tier = self
            .tier_of(profile, now)
            .map(|t| t.allocation_priority() as f64 * 100.0 / 8.0)
            .unwrap_or(0.0);
        let reputation = profile.reputation as f64 / 100.0;
        (weights.hardware * hardware + weights.tier * tier + weights.reputation * reputation)
            .round() as u32
    }

    pub(crate) fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }
}
