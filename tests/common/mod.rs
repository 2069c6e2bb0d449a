//! Shared harness for the integration suites: a fully wired market over the
//! in-memory ledger, a manual clock, and a $1.00 oracle price.

use std::sync::Arc;

use meshmarket::{
    AccessControl, Address, CapabilityFlags, EventLog, InMemoryLedger, JobRegistry, LockPeriod,
    ManualClock, MarketConfig, Pausable, PriceOracle, ProofCoordinator, ProofPolicy,
    TokenAmount, WorkerCapabilities, WorkerId, WorkerRegistry,
};

pub struct TestMarket {
    pub jobs: JobRegistry,
    pub workers: Arc<WorkerRegistry>,
    pub proofs: ProofCoordinator,
    pub ledger: Arc<InMemoryLedger>,
    pub oracle: Arc<PriceOracle>,
    pub events: Arc<EventLog>,
    pub clock: Arc<ManualClock>,
    pub admin: Address,
    pub treasury: Address,
}

impl TestMarket {
    /// Wire the whole engine with default policy, a manual clock at t=1e6,
    /// and the token priced at $1.00
    pub fn new() -> Self {
        let admin = Address::from("0xadmin");
        let treasury = Address::from("0xtreasury");
        let access = Arc::new(AccessControl::new(admin.clone()));
        let pause = Arc::new(Pausable::new());
        let clock = Arc::new(ManualClock::new(1_000_000));
        let oracle = Arc::new(PriceOracle::new(access.clone(), clock.clone(), 100));
        let ledger = Arc::new(InMemoryLedger::new(treasury.clone()));
        let events = Arc::new(EventLog::new());
        let config = MarketConfig::default();

        let workers = Arc::new(WorkerRegistry::new(
            config.clone(),
            access.clone(),
            pause.clone(),
            oracle.clone(),
            ledger.clone(),
            events.clone(),
            clock.clone(),
            treasury.clone(),
        ));
        let jobs = JobRegistry::new(
            config,
            access.clone(),
            pause.clone(),
            ledger.clone(),
            events.clone(),
            workers.clone(),
            treasury.clone(),
            admin.clone(),
        );
        let proofs = ProofCoordinator::new(
            ProofPolicy::default(),
            access,
            pause,
            ledger.clone(),
            events.clone(),
            workers.clone(),
            treasury.clone(),
            admin.clone(),
        );

        Self {
            jobs,
            workers,
            proofs,
            ledger,
            oracle,
            events,
            clock,
            admin,
            treasury,
        }
    }

    /// CUDA worker with the given GPU memory; everything else mid-range
    pub fn caps(gpu_memory_gb: u32) -> WorkerCapabilities {
        WorkerCapabilities {
            gpu_memory_gb,
            cpu_cores: 16,
            ram_gb: 64,
            storage_gb: 1_000,
            bandwidth_mbps: 1_000,
            flags: CapabilityFlags::CUDA,
            gpu_model: "RTX 4090".to_string(),
            cpu_model: "EPYC 7543".to_string(),
        }
    }

    /// Mint and register a worker with a flexible (unlocked) stake
    pub async fn register(
        &self,
        owner: &str,
        stake_tokens: u128,
        capabilities: WorkerCapabilities,
    ) -> WorkerId {
        let owner = Address::from(owner);
        self.ledger
            .mint(&owner, TokenAmount::from_tokens(stake_tokens));
        self.workers
            .register_worker(
                owner,
                capabilities,
                TokenAmount::from_tokens(stake_tokens),
                LockPeriod::Flexible,
            )
            .await
            .expect("registration failed")
    }

    /// Mint spendable balance for a client or requester account
    pub fn fund(&self, account: &str, tokens: u128) -> Address {
        let account = Address::from(account);
        self.ledger.mint(&account, TokenAmount::from_tokens(tokens));
        account
    }
}
