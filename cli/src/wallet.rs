//! Off-pool balances for the scenario's accounts

use std::collections::{BTreeMap, HashMap};

use amm_model::{Amount, AssetId};

pub const OWNER: &str = "owner";
pub const TRADER: &str = "trader1";
/// LP burn sink
pub const DEAD: &str = "dead";
/// The token's own contract account; collects transfer tax
pub const TOKEN_CONTRACT: &str = "token-contract";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{account} holds {available} {asset}, needs {required}")]
pub struct Shortfall {
    pub account: String,
    pub asset: AssetId,
    pub available: Amount,
    pub required: Amount,
}

/// Balances per `(account, asset)` plus LP shares per account.
#[derive(Debug, Default)]
pub struct WalletBook {
    balances: HashMap<(String, AssetId), Amount>,
    shares: BTreeMap<String, Amount>,
}

impl WalletBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn balance(&self, account: &str, asset: &AssetId) -> Amount {
        self.balances
            .get(&(account.to_string(), asset.clone()))
            .copied()
            .unwrap_or(0)
    }

    pub fn shares(&self, account: &str) -> Amount {
        self.shares.get(account).copied().unwrap_or(0)
    }

    /// Sum of every account's balance of `asset`.
    pub fn total(&self, asset: &AssetId) -> Amount {
        self.balances
            .iter()
            .filter(|((_, id), _)| id == asset)
            .map(|(_, amount)| *amount)
            .sum()
    }

    pub fn credit(&mut self, account: &str, asset: &AssetId, amount: Amount) {
        if amount == 0 {
            return;
        }
        *self.balances.entry((account.to_string(), asset.clone())).or_insert(0) += amount;
    }

    /// Fails without touching the book if `account` holds less than `amount`.
    pub fn ensure(&self, account: &str, asset: &AssetId, amount: Amount) -> Result<(), Shortfall> {
        let available = self.balance(account, asset);
        if available < amount {
            return Err(Shortfall {
                account: account.to_string(),
                asset: asset.clone(),
                available,
                required: amount,
            });
        }
        Ok(())
    }

    pub fn debit(&mut self, account: &str, asset: &AssetId, amount: Amount) -> Result<(), Shortfall> {
        self.ensure(account, asset, amount)?;
        if let Some(balance) = self.balances.get_mut(&(account.to_string(), asset.clone())) {
            *balance -= amount;
        }
        Ok(())
    }

    pub fn mint_shares(&mut self, account: &str, shares: Amount) {
        *self.shares.entry(account.to_string()).or_insert(0) += shares;
    }
}
