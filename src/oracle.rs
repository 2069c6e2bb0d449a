//! # Price Oracle
//!
//! Supplies the USD value of the staking token for tier computation. The
//! feed is an external collaborator; updates are restricted to the Oracle
//! role and stamped so consumers can reason about staleness.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use crate::guard::{AccessControl, Role};
use crate::types::{Address, Clock, MarketResult, TokenAmount, TOKEN_DECIMALS};

/// USD price feed, quoted in cents per whole token
pub struct PriceOracle {
    access: Arc<AccessControl>,
    clock: Arc<dyn Clock>,
    price_cents: RwLock<PricePoint>,
}

#[derive(Debug, Clone, Copy)]
struct PricePoint {
    cents_per_token: u128,
    updated_at: u64,
}

impl PriceOracle {
    pub fn new(access: Arc<AccessControl>, clock: Arc<dyn Clock>, initial_cents: u128) -> Self {
        let updated_at = clock.now();
        Self {
            access,
            clock,
            price_cents: RwLock::new(PricePoint {
                cents_per_token: initial_cents,
                updated_at,
            }),
        }
    }

    /// Current price in USD cents per whole token
    pub fn get_price(&self) -> u128 {
        self.price_cents.read().cents_per_token
    }

    /// Timestamp of the last update (unix seconds)
    pub fn last_updated(&self) -> u64 {
        self.price_cents.read().updated_at
    }

    /// Update the feed; restricted to the Oracle role
    pub fn update_price(&self, caller: &Address, new_price_cents: u128) -> MarketResult<()> {
        self.access.require(caller, Role::Oracle)?;
        let mut point = self.price_cents.write();
        info!(
            old_cents = point.cents_per_token,
            new_cents = new_price_cents,
            "oracle price updated"
        );
        point.cents_per_token = new_price_cents;
        point.updated_at = self.clock.now();
        Ok(())
    }

    /// USD value of a token amount, in cents
    pub fn usd_value_cents(&self, amount: TokenAmount) -> u128 {
        // amount_wei * cents_per_token / 1e18, ordered to avoid overflow
        // for realistic stakes (price fits in u64, stake below 2^96 wei).
        let price = self.get_price();
        amount.as_wei() / TOKEN_DECIMALS * price
            + amount.as_wei() % TOKEN_DECIMALS * price / TOKEN_DECIMALS
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ManualClock;

    fn oracle(price_cents: u128) -> (PriceOracle, Address) {
        let admin = Address::from("0xadmin");
        let access = Arc::new(AccessControl::new(admin.clone()));
        let clock = Arc::new(ManualClock::new(1_000));
        (PriceOracle::new(access, clock, price_cents), admin)
    }

    #[test]
    fn test_usd_value_whole_tokens() {
        // $1.00 per token
        let (oracle, _) = oracle(100);
        let value = oracle.usd_value_cents(TokenAmount::from_tokens(2600));
        assert_eq!(value, 260_000); // $2,600.00
    }

    #[test]
    fn test_usd_value_fractional_stake() {
        // $0.50 per token, 1.5 tokens => $0.75
        let (oracle, _) = oracle(50);
        let amount = TokenAmount::from_wei(1_500_000_000_000_000_000);
        assert_eq!(oracle.usd_value_cents(amount), 75);
    }

    #[test]
    fn test_update_requires_oracle_role() {
        let (oracle, admin) = oracle(100);
        let stranger = Address::from("0xstranger");

        assert!(oracle.update_price(&stranger, 200).is_err());
        assert_eq!(oracle.get_price(), 100);

        oracle.update_price(&admin, 200).unwrap();
        assert_eq!(oracle.get_price(), 200);
    }
}
