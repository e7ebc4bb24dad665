//! Launch sequence runner
//!
//! Runs the launch of a fee-on-transfer token against its base-asset pool:
//! - Deploy: register assets, create the pool, mint supply, fund accounts
//! - Seed liquidity from the owner, LP shares burned to the dead account
//! - Open trading
//! - Buy, second deposit (priced from the cached price), sell
//!
//! Each step is one guarded operation that returns a result. Failed steps
//! are reported and the run moves on; only an invariant violation stops it.

use std::sync::Arc;

use amm_model::math;
use amm_model::{
    AmmError, Amount, Asset, AssetId, Clock, Guard, LiquidityGuard, LiquidityReceipt, PoolRegistry, PoolRow,
    SwapReceipt,
};
use anyhow::Result;
use colored::Colorize;
use log::{error, info, warn};

use crate::config::{Amounts, ScenarioConfig};
use crate::units::{format_price, format_units};
use crate::wallet::{Shortfall, WalletBook, DEAD, OWNER, TOKEN_CONTRACT, TRADER};

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error(transparent)]
    Amm(#[from] AmmError),

    #[error(transparent)]
    Shortfall(#[from] Shortfall),

    #[error("trading is not open")]
    TradingClosed,

    #[error("no cached price: the pool was never seeded")]
    NoCachedPrice,
}

impl StepError {
    /// Stops the run instead of moving to the next step.
    pub fn is_fatal(&self) -> bool {
        matches!(self, StepError::Amm(AmmError::InvariantViolation))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Deploy,
    SeedLiquidity,
    OpenTrading,
    Buy,
    SecondDeposit,
    Sell,
}

impl Step {
    pub const ALL: [Step; 6] = [
        Step::Deploy,
        Step::SeedLiquidity,
        Step::OpenTrading,
        Step::Buy,
        Step::SecondDeposit,
        Step::Sell,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Step::Deploy => "Deploy",
            Step::SeedLiquidity => "Seed liquidity",
            Step::OpenTrading => "Open trading",
            Step::Buy => "Buy",
            Step::SecondDeposit => "Second deposit",
            Step::Sell => "Sell",
        }
    }
}

#[derive(Debug, Default)]
pub struct ScenarioReport {
    pub passed: usize,
    /// `(step, error)` for every step that failed
    pub failed: Vec<(&'static str, String)>,
}

impl ScenarioReport {
    pub fn print_summary(&self) -> Result<()> {
        println!("\n{}", "=== Launch Results ===".bright_cyan());
        println!("{} {} passed", "✓".bright_green(), self.passed);

        if !self.failed.is_empty() {
            println!("{} {} failed", "✗".bright_red(), self.failed.len());
            for (step, err) in &self.failed {
                println!("  {} {}", format!("{}:", step).dimmed(), err);
            }
            anyhow::bail!("{} steps failed", self.failed.len());
        }

        println!("{}", "All launch steps passed!".green().bold());
        Ok(())
    }
}

pub struct Scenario {
    config: ScenarioConfig,
    amounts: Amounts,
    registry: PoolRegistry,
    wallets: WalletBook,
    token: Asset,
    base: Asset,
    trading_open: bool,

    /// `(token reserve, base reserve)` as last printed
    cached_reserves: Option<(Amount, Amount)>,
}

impl Scenario {
    pub fn new(config: ScenarioConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;
        let amounts = config.amounts()?;
        let token = Asset::taxed(
            config.token.symbol.clone(),
            config.token.decimals,
            config.token.transfer_tax_bps,
        )?;
        let base = Asset::plain(config.base.symbol.clone(), config.base.decimals);

        Ok(Self {
            config,
            amounts,
            registry: PoolRegistry::new(clock),
            wallets: WalletBook::new(),
            token,
            base,
            trading_open: false,
            cached_reserves: None,
        })
    }

    pub fn wallets(&self) -> &WalletBook {
        &self.wallets
    }

    pub fn registry(&self) -> &PoolRegistry {
        &self.registry
    }

    pub fn snapshot(&self) -> Vec<PoolRow> {
        self.registry.snapshot()
    }

    /// Run every step in order.
    ///
    /// Returns the report, or the first fatal error.
    pub fn run(&mut self) -> Result<ScenarioReport, StepError> {
        let mut report = ScenarioReport::default();

        for step in Step::ALL {
            println!("\n{}", format!("=== {} ===", step.name()).bright_yellow().bold());
            match self.run_step(step) {
                Ok(()) => {
                    println!("{} {}", "✓".bright_green(), step.name());
                    report.passed += 1;
                }
                Err(e) if e.is_fatal() => {
                    println!("{} {}: {}", "✗".bright_red(), step.name(), e);
                    error!("{} stopped the run: {}", step.name(), e);
                    return Err(e);
                }
                Err(e) => {
                    println!("{} {}: {}", "✗".bright_red(), step.name(), e);
                    warn!("{} failed, continuing: {}", step.name(), e);
                    report.failed.push((step.name(), e.to_string()));
                }
            }
        }

        Ok(report)
    }

    pub fn run_step(&mut self, step: Step) -> Result<(), StepError> {
        match step {
            Step::Deploy => self.deploy(),
            Step::SeedLiquidity => self.seed_liquidity(),
            Step::OpenTrading => self.open_trading(),
            Step::Buy => self.buy(),
            Step::SecondDeposit => self.second_deposit(),
            Step::Sell => self.sell(),
        }
    }

    // ========================================================================
    // Steps
    // ========================================================================

    fn deploy(&mut self) -> Result<(), StepError> {
        self.registry.register_asset(self.base.clone());
        self.registry.register_asset(self.token.clone());
        let key = self
            .registry
            .create_pool(&self.token.id, &self.base.id, self.config.pool.fee_bps)?;

        self.wallets.credit(OWNER, &self.token.id, self.amounts.supply);
        self.wallets.credit(OWNER, &self.base.id, self.amounts.owner_base);
        self.wallets.credit(TRADER, &self.base.id, self.amounts.trader_base);
        info!("deployed {} with {} bps transfer tax", self.token.id, self.token.transfer_fee_bps);

        println!("{} {} ({} decimals)", "Token:".bright_cyan(), self.token.id, self.token.decimals);
        println!("{} {} bps", "Transfer tax:".bright_cyan(), self.token.transfer_fee_bps);
        println!("{} {} ({} bps fee)", "Pool:".bright_cyan(), key, self.config.pool.fee_bps);
        println!(
            "Token 0 is {} and Token 1 is {}",
            key.asset_a(),
            key.asset_b()
        );
        println!(
            "{} {}",
            "Owner token balance:".bright_cyan(),
            self.units(&self.token.id, self.wallets.balance(OWNER, &self.token.id))
        );
        Ok(())
    }

    fn seed_liquidity(&mut self) -> Result<(), StepError> {
        let (token_amount, base_amount) = (self.amounts.seed_token, self.amounts.seed_base);
        self.wallets.ensure(OWNER, &self.token.id, token_amount)?;
        self.wallets.ensure(OWNER, &self.base.id, base_amount)?;

        let guard = LiquidityGuard::with_slippage_pct(
            token_amount,
            base_amount,
            self.config.seed.slippage_pct,
            self.deadline(self.config.seed.deadline_secs),
        );
        let receipt = self
            .registry
            .add_liquidity(&self.token.id, &self.base.id, token_amount, base_amount, &guard)?;
        self.settle_deposit(OWNER, &receipt)?;

        self.print_pool()?;
        println!("{} {}", "LP balance of dead:".bright_cyan(), self.wallets.shares(DEAD));
        self.print_balances("after seeding");
        Ok(())
    }

    fn open_trading(&mut self) -> Result<(), StepError> {
        let (token_reserve, _) = self.registry.get_reserves(&self.token.id, &self.base.id)?;
        if token_reserve == 0 {
            return Err(AmmError::InsufficientLiquidity.into());
        }
        self.trading_open = true;
        info!("trading open for {}", self.token.id);
        println!("{} {}/{}", "Trading open:".bright_cyan(), self.token.id, self.base.id);
        Ok(())
    }

    fn buy(&mut self) -> Result<(), StepError> {
        self.require_trading()?;
        let amount_in = self.amounts.buy_base;
        let estimate = self.estimate(&self.base.id, &self.token.id, amount_in)?;
        println!(
            "Estimated {} received for {}: {}",
            self.token.id,
            self.units(&self.base.id, amount_in),
            self.units(&self.token.id, estimate)
        );
        self.print_balances("before buy");

        self.wallets.ensure(TRADER, &self.base.id, amount_in)?;
        let guard = Guard::with_slippage_pct(
            estimate,
            self.config.buy.slippage_pct,
            self.deadline(self.config.buy.deadline_secs),
        );
        let receipt = self.registry.swap(&self.base.id, &self.token.id, amount_in, &guard)?;
        self.settle_swap(TRADER, &receipt)?;

        self.print_pool()?;
        self.print_balances("after buy");
        self.print_contract_worth();
        Ok(())
    }

    /// Second deposit by the trader. The token side is priced from the
    /// cached reserves, not re-read from the pool; the guard is what
    /// protects against the pool having moved since.
    fn second_deposit(&mut self) -> Result<(), StepError> {
        self.require_trading()?;
        let (cached_token, cached_base) = self.cached_reserves.ok_or(StepError::NoCachedPrice)?;
        let base_amount = self.amounts.second_base;
        let token_amount = math::quote_deposit(base_amount, cached_base, cached_token)?;
        println!("{} {}", "Input token:".bright_cyan(), self.units(&self.token.id, token_amount));
        println!("{} {}", "Input base:".bright_cyan(), self.units(&self.base.id, base_amount));

        self.wallets.ensure(TRADER, &self.token.id, token_amount)?;
        self.wallets.ensure(TRADER, &self.base.id, base_amount)?;
        let guard = LiquidityGuard::with_slippage_pct(
            token_amount,
            base_amount,
            self.config.second_deposit.slippage_pct,
            self.deadline(self.config.second_deposit.deadline_secs),
        );
        let receipt = self
            .registry
            .add_liquidity(&self.token.id, &self.base.id, token_amount, base_amount, &guard)?;
        self.settle_deposit(TRADER, &receipt)?;

        self.print_pool()?;
        println!("{} {}", "LP balance of dead:".bright_cyan(), self.wallets.shares(DEAD));
        self.print_balances("after second deposit");
        Ok(())
    }

    fn sell(&mut self) -> Result<(), StepError> {
        self.require_trading()?;
        let amount_in = self.amounts.sell_token;
        self.print_balances("before sell");

        // Router estimate ignores the tax; the tolerance has to absorb it
        let estimate = self.estimate(&self.token.id, &self.base.id, amount_in)?;
        println!(
            "Estimated {} received for {}: {}",
            self.base.id,
            self.units(&self.token.id, amount_in),
            self.units(&self.base.id, estimate)
        );

        self.wallets.ensure(TRADER, &self.token.id, amount_in)?;
        let guard = Guard::with_slippage_pct(
            estimate,
            self.config.sell.slippage_pct,
            self.deadline(self.config.sell.deadline_secs),
        );
        let receipt = self
            .registry
            .sell_supporting_fee(&self.token.id, &self.base.id, amount_in, &guard)?;
        self.settle_swap(TRADER, &receipt)?;

        self.print_pool()?;
        self.print_balances("after sell");
        Ok(())
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn require_trading(&self) -> Result<(), StepError> {
        if !self.trading_open {
            return Err(StepError::TradingClosed);
        }
        Ok(())
    }

    fn deadline(&self, secs: u64) -> u64 {
        self.registry.now().saturating_add(secs)
    }

    fn estimate(&self, asset_in: &AssetId, asset_out: &AssetId, amount_in: Amount) -> Result<Amount, StepError> {
        let amounts = self
            .registry
            .quote_amounts_out(&[asset_in.clone(), asset_out.clone()], amount_in)?;
        Ok(amounts[amounts.len() - 1])
    }

    fn settle_swap(&mut self, account: &str, receipt: &SwapReceipt) -> Result<(), StepError> {
        self.wallets.debit(account, &receipt.asset_in, receipt.amount_in)?;
        self.wallets.credit(account, &receipt.asset_out, receipt.payout);
        self.wallets.credit(TOKEN_CONTRACT, &receipt.asset_in, receipt.tax_in);
        self.wallets.credit(TOKEN_CONTRACT, &receipt.asset_out, receipt.tax_out);
        Ok(())
    }

    fn settle_deposit(&mut self, account: &str, receipt: &LiquidityReceipt) -> Result<(), StepError> {
        let (token, base) = (self.token.id.clone(), self.base.id.clone());
        self.wallets.debit(account, &token, receipt.used_a)?;
        self.wallets.debit(account, &base, receipt.used_b)?;
        self.wallets.credit(TOKEN_CONTRACT, &token, receipt.used_a - receipt.received_a);
        self.wallets.credit(TOKEN_CONTRACT, &base, receipt.used_b - receipt.received_b);
        self.wallets.mint_shares(DEAD, receipt.minted);
        Ok(())
    }

    fn units(&self, asset: &AssetId, amount: Amount) -> String {
        let decimals = if asset == &self.token.id {
            self.token.decimals
        } else {
            self.base.decimals
        };
        format!("{} {}", format_units(amount, decimals), asset)
    }

    /// Print reserves and price, and cache them for later steps.
    fn print_pool(&mut self) -> Result<(), StepError> {
        let (token_reserve, base_reserve) = self.registry.get_reserves(&self.token.id, &self.base.id)?;
        println!(
            "{} {} / {}",
            "Reserves:".bright_cyan(),
            self.units(&self.token.id, token_reserve),
            self.units(&self.base.id, base_reserve)
        );
        println!(
            "{}/{}: {}",
            self.token.id,
            self.base.id,
            format_price(base_reserve, self.base.decimals, token_reserve, self.token.decimals)
        );
        self.cached_reserves = Some((token_reserve, base_reserve));
        Ok(())
    }

    fn print_balances(&self, label: &str) {
        let title = format!("Balances {}", label);
        println!("\n{}", title.bright_white());
        println!("{}", "=".repeat(title.len()).dimmed());
        let token = &self.token.id;
        let base = &self.base.id;
        println!(
            "{} {}",
            "Token contract:".bright_cyan(),
            self.units(token, self.wallets.balance(TOKEN_CONTRACT, token))
        );
        for account in [TRADER, OWNER] {
            println!(
                "{} {}, {}",
                format!("{}:", account).bright_cyan(),
                self.units(token, self.wallets.balance(account, token)),
                self.units(base, self.wallets.balance(account, base))
            );
        }
        println!("{} {} LP", format!("{}:", DEAD).bright_cyan(), self.wallets.shares(DEAD));
        println!();
    }

    /// Base value of the tax collected so far, at the current pool price.
    fn print_contract_worth(&self) {
        let collected = self.wallets.balance(TOKEN_CONTRACT, &self.token.id);
        if collected == 0 {
            return;
        }
        match self.estimate(&self.token.id, &self.base.id, collected) {
            Ok(worth) => println!(
                "{} {}",
                "Worth of token contract balance:".bright_cyan(),
                self.units(&self.base.id, worth)
            ),
            Err(e) => warn!("could not value token contract balance: {}", e),
        }
    }
}
