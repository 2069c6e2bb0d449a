//! # Token Ledger Interface
//!
//! The fungible-token ledger is an external collaborator: the core only
//! needs balance transfers for stake deposits, reward payouts, escrow, and
//! slash confiscation. `InMemoryLedger` is the reference implementation
//! used by tests and local simulation.

use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::debug;

use crate::types::{Address, MarketError, MarketResult, TokenAmount};

/// Operations the core consumes from the token ledger
pub trait TokenLedger: Send + Sync {
    /// Move tokens from the engine's own account to `to`
    fn transfer(&self, to: &Address, amount: TokenAmount) -> MarketResult<()>;

    /// Move tokens between two external accounts (requires prior approval
    /// on a real ledger; the in-memory fake only checks balance)
    fn transfer_from(&self, from: &Address, to: &Address, amount: TokenAmount)
        -> MarketResult<()>;

    fn balance_of(&self, account: &Address) -> TokenAmount;
}

/// In-memory ledger for tests and simulation
pub struct InMemoryLedger {
    engine_account: Address,
    balances: RwLock<HashMap<Address, TokenAmount>>,
}

impl InMemoryLedger {
    pub fn new(engine_account: Address) -> Self {
        Self {
            engine_account,
            balances: RwLock::new(HashMap::new()),
        }
    }

    /// Credit an account out of thin air (test setup only)
    pub fn mint(&self, account: &Address, amount: TokenAmount) {
        let mut balances = self.balances.write();
        let entry = balances.entry(account.clone()).or_insert(TokenAmount::ZERO);
        *entry = entry.saturating_add(amount);
    }

    pub fn engine_account(&self) -> &Address {
        &self.engine_account
    }

    fn move_tokens(
        balances: &mut HashMap<Address, TokenAmount>,
        from: &Address,
        to: &Address,
        amount: TokenAmount,
    ) -> MarketResult<()> {
        let from_balance = balances.get(from).copied().unwrap_or(TokenAmount::ZERO);
        if from_balance < amount {
            return Err(MarketError::InsufficientFunds {
                required: amount.as_wei(),
                available: from_balance.as_wei(),
            });
        }
        balances.insert(from.clone(), from_balance.saturating_sub(amount));
        let to_balance = balances.entry(to.clone()).or_insert(TokenAmount::ZERO);
        *to_balance = to_balance.saturating_add(amount);
        Ok(())
    }
}

impl TokenLedger for InMemoryLedger {
    fn transfer(&self, to: &Address, amount: TokenAmount) -> MarketResult<()> {
        let mut balances = self.balances.write();
        let from = self.engine_account.clone();
        Self::move_tokens(&mut balances, &from, to, amount)?;
        debug!(to = %to, amount = %amount, "ledger transfer");
        Ok(())
    }

    fn transfer_from(
        &self,
        from: &Address,
        to: &Address,
        amount: TokenAmount,
    ) -> MarketResult<()> {
        let mut balances = self.balances.write();
        Self::move_tokens(&mut balances, from, to, amount)?;
        debug!(from = %from, to = %to, amount = %amount, "ledger transfer_from");
        Ok(())
    }

    fn balance_of(&self, account: &Address) -> TokenAmount {
        self.balances
            .read()
            .get(account)
            .copied()
            .unwrap_or(TokenAmount::ZERO)
    }
}
