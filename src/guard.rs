//! # Access Control & Pause Guards
//!
//! Composable authorization modules injected into the registries. Roles are
//! explicit grants keyed by account address; pausing gates every
//! state-changing operation without touching read paths.

use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::types::{Address, MarketError, MarketResult};

/// Privileged roles recognized by the core
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Governance/admin: bans, dispute and slash-challenge resolution, pausing
    Admin,
    /// Price feed updates
    Oracle,
    /// The off-chain coordinator: allocation retries, verification triggers
    Coordinator,
}

/// Role registry with explicit per-address grants
pub struct AccessControl {
    grants: RwLock<HashMap<Role, HashSet<Address>>>,
}

impl AccessControl {
    /// Create an access-control module with `admin` granted every role
    pub fn new(admin: Address) -> Self {
        let mut grants: HashMap<Role, HashSet<Address>> = HashMap::new();
        for role in [Role::Admin, Role::Oracle, Role::Coordinator] {
            grants.entry(role).or_default().insert(admin.clone());
        }
        Self {
            grants: RwLock::new(grants),
        }
    }

    /// Grant `role` to `account`; caller must hold Admin
    pub fn grant(&self, caller: &Address, role: Role, account: Address) -> MarketResult<()> {
        self.require(caller, Role::Admin)?;
        info!(account = %account, ?role, "role granted");
        self.grants.write().entry(role).or_default().insert(account);
        Ok(())
    }

    /// Revoke `role` from `account`; caller must hold Admin
    pub fn revoke(&self, caller: &Address, role: Role, account: &Address) -> MarketResult<()> {
        self.require(caller, Role::Admin)?;
        info!(account = %account, ?role, "role revoked");
        if let Some(holders) = self.grants.write().get_mut(&role) {
            holders.remove(account);
        }
        Ok(())
    }

    pub fn has_role(&self, account: &Address, role: Role) -> bool {
        self.grants
            .read()
            .get(&role)
            .map(|holders| holders.contains(account))
            .unwrap_or(false)
    }

    /// Fail with `UnauthorizedCaller` unless `account` holds `role`
    pub fn require(&self, account: &Address, role: Role) -> MarketResult<()> {
        if self.has_role(account, role) {
            Ok(())
        } else {
            warn!(account = %account, ?role, "unauthorized call rejected");
            Err(MarketError::UnauthorizedCaller(format!(
                "{} lacks {:?} role",
                account, role
            )))
        }
    }
}

/// Pause switch gating state-changing operations
pub struct Pausable {
    paused: RwLock<bool>,
}

impl Default for Pausable {
    fn default() -> Self {
        Self::new()
    }
}

impl Pausable {
    pub fn new() -> Self {
        Self {
            paused: RwLock::new(false),
        }
    }

    pub fn pause(&self) {
        warn!("registry paused");
        *self.paused.write() = true;
    }

    pub fn unpause(&self) {
        info!("registry unpaused");
        *self.paused.write() = false;
    }

    pub fn is_paused(&self) -> bool {
        *self.paused.read()
    }

    /// Fail with `Paused` while the pause switch is on
    pub fn ensure_active(&self) -> MarketResult<()> {
        if self.is_paused() {
            Err(MarketError::Paused)
        } else {
            Ok(())
        }
    }
}
