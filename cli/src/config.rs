//! Scenario configuration
//!
//! Every field has a default, so a config file only needs the values it
//! changes. Amounts are whole-unit decimal strings ("0.5", "2000") and are
//! converted with the owning asset's decimals.

use std::fs;
use std::path::Path;

use amm_model::Amount;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::units::parse_units;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenConfig {
    pub symbol: String,
    pub decimals: u8,
    /// Whole tokens minted to the owner at deploy
    pub supply: String,
    pub transfer_tax_bps: u32,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            symbol: "AC".to_string(),
            decimals: 18,
            supply: "1000000000".to_string(),
            transfer_tax_bps: 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BaseConfig {
    pub symbol: String,
    pub decimals: u8,
}

impl Default for BaseConfig {
    fn default() -> Self {
        Self {
            symbol: "WETH".to_string(),
            decimals: 18,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub fee_bps: u32,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self { fee_bps: 30 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeedConfig {
    /// Share of the token supply deposited, in percent
    pub supply_pct: u8,
    pub base_amount: String,
    pub slippage_pct: u8,
    pub deadline_secs: u64,
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self {
            supply_pct: 50,
            base_amount: "2000".to_string(),
            slippage_pct: 1,
            deadline_secs: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuyConfig {
    pub base_amount: String,
    pub slippage_pct: u8,
    pub deadline_secs: u64,
}

impl Default for BuyConfig {
    fn default() -> Self {
        Self {
            base_amount: "0.5".to_string(),
            slippage_pct: 5,
            deadline_secs: 120,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DepositConfig {
    /// Base deposited; the token side is priced from the last cached price
    pub base_amount: String,
    pub slippage_pct: u8,
    pub deadline_secs: u64,
}

impl Default for DepositConfig {
    fn default() -> Self {
        Self {
            base_amount: "0.02".to_string(),
            slippage_pct: 10,
            deadline_secs: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SellConfig {
    pub token_amount: String,
    pub slippage_pct: u8,
    pub deadline_secs: u64,
}

impl Default for SellConfig {
    fn default() -> Self {
        Self {
            token_amount: "50000".to_string(),
            slippage_pct: 10,
            deadline_secs: 120,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountsConfig {
    pub owner_base: String,
    pub trader_base: String,
}

impl Default for AccountsConfig {
    fn default() -> Self {
        Self {
            owner_base: "10000".to_string(),
            trader_base: "10000".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    pub token: TokenConfig,
    pub base: BaseConfig,
    pub pool: PoolConfig,
    pub seed: SeedConfig,
    pub buy: BuyConfig,
    pub second_deposit: DepositConfig,
    pub sell: SellConfig,
    pub accounts: AccountsConfig,
}

/// Config amounts converted to smallest units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Amounts {
    pub supply: Amount,
    pub seed_token: Amount,
    pub seed_base: Amount,
    pub buy_base: Amount,
    pub second_base: Amount,
    pub sell_token: Amount,
    pub owner_base: Amount,
    pub trader_base: Amount,
}

impl ScenarioConfig {
    /// Load from `path` (tilde-expanded), or the defaults when `None`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            None => Self::default(),
            Some(path) => {
                let expanded = shellexpand::tilde(&path.to_string_lossy()).into_owned();
                let text = fs::read_to_string(&expanded)
                    .with_context(|| format!("Failed to read config file: {}", expanded))?;
                toml::from_str(&text).with_context(|| format!("Failed to parse config file: {}", expanded))?
            }
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.token.symbol == self.base.symbol {
            bail!("token and base asset share the symbol {}", self.token.symbol);
        }
        if self.token.transfer_tax_bps >= 10_000 || self.pool.fee_bps >= 10_000 {
            bail!("fees and taxes must be below 10000 bps");
        }
        if self.seed.supply_pct == 0 || self.seed.supply_pct > 100 {
            bail!("seed.supply_pct must be in 1..=100, got {}", self.seed.supply_pct);
        }
        for pct in [self.seed.slippage_pct, self.buy.slippage_pct, self.second_deposit.slippage_pct, self.sell.slippage_pct] {
            if pct > 100 {
                bail!("slippage of {}% is out of range", pct);
            }
        }
        self.amounts()?;
        Ok(())
    }

    pub fn amounts(&self) -> Result<Amounts> {
        let token = self.token.decimals;
        let base = self.base.decimals;
        let supply = parse_units(&self.token.supply, token).context("token.supply")?;
        let seed_token = supply
            .checked_mul(self.seed.supply_pct as Amount)
            .map(|v| v / 100)
            .context("token.supply is too large")?;
        Ok(Amounts {
            supply,
            seed_token,
            seed_base: parse_units(&self.seed.base_amount, base).context("seed.base_amount")?,
            buy_base: parse_units(&self.buy.base_amount, base).context("buy.base_amount")?,
            second_base: parse_units(&self.second_deposit.base_amount, base).context("second_deposit.base_amount")?,
            sell_token: parse_units(&self.sell.token_amount, token).context("sell.token_amount")?,
            owner_base: parse_units(&self.accounts.owner_base, base).context("accounts.owner_base")?,
            trader_base: parse_units(&self.accounts.trader_base, base).context("accounts.trader_base")?,
        })
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }
}
