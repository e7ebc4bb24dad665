//! Concurrent multi-pool run
//!
//! One blocking task per pool, all trading at once through a shared
//! registry. Pools never share a lock, so the only thing checked at the end
//! is that every pool's reserve product held or grew.

use std::sync::Arc;

use amm_model::{AmmError, Amount, Asset, AssetId, Guard, PoolRegistry, PoolRow, U256};
use anyhow::{bail, Context, Result};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use log::debug;

use crate::config::ScenarioConfig;
use crate::units::format_units;

/// What each pool's task trades.
#[derive(Debug, Clone, Copy)]
pub struct TradePlan {
    pub trades: usize,
    pub buy_amount: Amount,
    pub sell_amount: Amount,
    pub deadline_secs: u64,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TradeStats {
    pub committed: usize,
    pub aborted: usize,
}

/// Build a registry with `pools` token/base pools, each seeded from the
/// scenario's seed amounts (net of tax).
pub fn build_registry(config: &ScenarioConfig, pools: usize) -> Result<(Arc<PoolRegistry>, AssetId, Vec<AssetId>)> {
    let amounts = config.amounts()?;
    let registry = Arc::new(PoolRegistry::default());
    let base = Asset::plain(config.base.symbol.clone(), config.base.decimals);
    registry.register_asset(base.clone());

    let mut tokens = Vec::with_capacity(pools);
    for i in 0..pools {
        let token = Asset::taxed(
            format!("{}{}", config.token.symbol, i),
            config.token.decimals,
            config.token.transfer_tax_bps,
        )?;
        let seeded = token.received(amounts.seed_token)?;
        registry.register_asset(token.clone());
        registry.create_pool(&token.id, &base.id, config.pool.fee_bps)?;
        registry.initialize_pool(&token.id, &base.id, seeded, amounts.seed_base)?;
        tokens.push(token.id);
    }

    Ok((registry, base.id, tokens))
}

/// Alternate buys and sells on one pool. Aborts are counted, not fatal.
pub fn trade_pool(
    registry: &PoolRegistry,
    base: &AssetId,
    token: &AssetId,
    plan: TradePlan,
    progress: &ProgressBar,
) -> Result<TradeStats, AmmError> {
    let mut stats = TradeStats::default();
    for i in 0..plan.trades {
        let guard = Guard::unbounded(registry.now().saturating_add(plan.deadline_secs));
        let result = if i % 2 == 0 {
            registry.swap(base, token, plan.buy_amount, &guard)
        } else {
            registry.sell_supporting_fee(token, base, plan.sell_amount, &guard)
        };
        match result {
            Ok(receipt) => {
                debug!("{} trade {}: {} -> {}", token, i, receipt.amount_in, receipt.payout);
                stats.committed += 1;
            }
            Err(AmmError::InvariantViolation) => return Err(AmmError::InvariantViolation),
            Err(_) => stats.aborted += 1,
        }
        progress.inc(1);
    }
    Ok(stats)
}

/// Pools whose reserve product dropped between `before` and `after`.
pub fn shrunk_pools(before: &[PoolRow], after: &[PoolRow]) -> Vec<String> {
    before
        .iter()
        .zip(after)
        .filter(|(old, new)| {
            U256::from(new.reserve_a) * U256::from(new.reserve_b)
                < U256::from(old.reserve_a) * U256::from(old.reserve_b)
        })
        .map(|(_, new)| new.pool_id.clone())
        .collect()
}

pub async fn run_concurrent(config: &ScenarioConfig, pools: usize, trades: usize, json: bool) -> Result<()> {
    if pools == 0 {
        bail!("need at least one pool");
    }
    let amounts = config.amounts()?;
    let (registry, base, tokens) = build_registry(config, pools)?;
    let before = registry.snapshot();

    println!("{}", "=== Concurrent Trading ===".bright_green().bold());
    println!("{} {}", "Pools:".bright_cyan(), pools);
    println!("{} {}", "Trades per pool:".bright_cyan(), trades);

    let progress = ProgressBar::new((pools * trades) as u64);
    progress.set_style(
        ProgressStyle::with_template("{spinner} [{bar:40}] {pos}/{len} trades")
            .context("Invalid progress template")?
            .progress_chars("=> "),
    );

    let plan = TradePlan {
        trades,
        buy_amount: amounts.buy_base,
        sell_amount: amounts.sell_token,
        deadline_secs: config.buy.deadline_secs,
    };
    let tasks: Vec<_> = tokens
        .iter()
        .cloned()
        .map(|token| {
            let registry = Arc::clone(&registry);
            let base = base.clone();
            let progress = progress.clone();
            tokio::task::spawn_blocking(move || trade_pool(&registry, &base, &token, plan, &progress))
        })
        .collect();

    let results = futures::future::join_all(tasks).await;
    progress.finish_and_clear();

    let mut total = TradeStats::default();
    for (token, result) in tokens.iter().zip(results) {
        let stats = result
            .with_context(|| format!("Trading task for {} panicked", token))?
            .with_context(|| format!("Pool {} broke its invariant", token))?;
        total.committed += stats.committed;
        total.aborted += stats.aborted;
    }

    let decimals = |id: &AssetId| {
        if *id == base {
            config.base.decimals
        } else {
            config.token.decimals
        }
    };
    let after = registry.snapshot();
    for row in &after {
        println!(
            "{} {} {} / {} {}",
            format!("{}:", row.pool_id).bright_cyan(),
            format_units(row.reserve_a, decimals(&row.asset_a)),
            row.asset_a,
            format_units(row.reserve_b, decimals(&row.asset_b)),
            row.asset_b
        );
    }
    println!("{} {} committed, {} aborted", "Trades:".bright_cyan(), total.committed, total.aborted);

    let shrunk = shrunk_pools(&before, &after);
    if !shrunk.is_empty() {
        println!("{} reserve product decreased on {}", "✗".bright_red(), shrunk.join(", "));
        bail!("{} pools lost value", shrunk.len());
    }
    println!("{} every pool's reserve product held or grew", "✓".bright_green());

    if json {
        println!("{}", serde_json::to_string_pretty(&after)?);
    }
    Ok(())
}
