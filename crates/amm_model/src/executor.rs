//! Guarded trade executor
//!
//! Each operation is one state transition on a [`Pool`]: read the reserves,
//! quote, apply the transfer tax at every boundary, check the guard, then
//! commit. Everything up to the commit works on locals, so any error leaves
//! the pool exactly as it was.
//!
//! Callers are responsible for holding the pool exclusively for the whole
//! call (see [`crate::registry`]).

use log::{debug, info};

use crate::asset::{actual_received, nominal_for, Asset, AssetId};
use crate::guard::{check_deadline, Guard, LiquidityGuard};
use crate::math::{self, to_amount, U256};
use crate::pool::Pool;
use crate::{AmmError, Amount, Result};

/// Realized amounts of a committed swap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapReceipt {
    pub asset_in: AssetId,
    pub asset_out: AssetId,

    /// Nominal amount the trader sent
    pub amount_in: Amount,

    /// Amount the pool received after the input asset's tax
    pub received: Amount,

    /// Amount the pool sent
    pub quoted_out: Amount,

    /// Amount the trader received after the output asset's tax
    pub payout: Amount,

    /// Tax kept by the input asset
    pub tax_in: Amount,

    /// Tax kept by the output asset
    pub tax_out: Amount,

    pub price_impact_bps: u32,
}

/// Realized amounts of a committed deposit, in the caller's asset order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiquidityReceipt {
    pub used_a: Amount,
    pub used_b: Amount,
    pub received_a: Amount,
    pub received_b: Amount,
    pub minted: Amount,
}

/// Realized amounts of a committed withdrawal, in the caller's asset order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawReceipt {
    pub burned: Amount,
    pub sent_a: Amount,
    pub sent_b: Amount,
    pub payout_a: Amount,
    pub payout_b: Amount,
}

fn check_pair(pool: &Pool, asset_a: &Asset, asset_b: &Asset) -> Result<()> {
    if asset_a.id == asset_b.id {
        return Err(AmmError::IdenticalAssets);
    }
    if !pool.key().contains(&asset_a.id) || !pool.key().contains(&asset_b.id) {
        return Err(AmmError::UnknownAsset);
    }
    Ok(())
}

/// Sell exactly `amount_in` (nominal) of `asset_in`.
///
/// The pool's outbound reserve drops by the pre-tax quoted amount; the
/// trader's payout is what survives the output asset's tax.
pub fn swap(
    pool: &mut Pool,
    asset_in: &Asset,
    asset_out: &Asset,
    amount_in: Amount,
    guard: &Guard,
    now: u64,
) -> Result<SwapReceipt> {
    check_deadline(now, guard.deadline)?;
    check_pair(pool, asset_in, asset_out)?;
    if amount_in == 0 {
        return Err(AmmError::InvalidAmount);
    }

    let received = actual_received(asset_in, amount_in)?;
    let (reserve_in, reserve_out) = pool.oriented(&asset_in.id)?;
    let quote = math::quote_exact_in(received, reserve_in, reserve_out, pool.fee_bps())?;
    if quote.amount_out == 0 {
        return Err(AmmError::InvalidAmount);
    }
    let payout = actual_received(asset_out, quote.amount_out)?;
    debug!(
        "{} quote: {} {} (received {}) -> {} {} (payout {}), impact {} bps",
        pool.key(),
        amount_in,
        asset_in.id,
        received,
        quote.amount_out,
        asset_out.id,
        payout,
        quote.price_impact_bps
    );

    guard.check(now, amount_in, payout)?;

    let new_in = reserve_in.checked_add(received).ok_or(AmmError::Overflow)?;
    let new_out = reserve_out - quote.amount_out;
    pool.commit_oriented(&asset_in.id, new_in, new_out)?;

    info!(
        "{} swap committed: reserves {} {} / {} {}",
        pool.key(),
        new_in,
        asset_in.id,
        new_out,
        asset_out.id
    );

    Ok(SwapReceipt {
        asset_in: asset_in.id.clone(),
        asset_out: asset_out.id.clone(),
        amount_in,
        received,
        quoted_out: quote.amount_out,
        payout,
        tax_in: amount_in - received,
        tax_out: quote.amount_out - payout,
        price_impact_bps: quote.price_impact_bps,
    })
}

/// Swap where one side is a fee-on-transfer asset.
///
/// A live router needs a separate entry point because it can only learn the
/// received amount after the transfer. Here the adapter already runs on both
/// sides, so this is [`swap`] with the taxed side recorded in the log.
pub fn sell_supporting_fee(
    pool: &mut Pool,
    asset_in: &Asset,
    asset_out: &Asset,
    amount_in: Amount,
    guard: &Guard,
    now: u64,
) -> Result<SwapReceipt> {
    debug!(
        "{} fee-supporting swap: taxed input {}, taxed output {}",
        pool.key(),
        asset_in.is_taxed(),
        asset_out.is_taxed()
    );
    swap(pool, asset_in, asset_out, amount_in, guard, now)
}

/// Buy exactly `amount_out` (pre-tax, as sent by the pool) of `asset_out`.
///
/// The nominal input is grossed up so the pool receives at least the quoted
/// input after the input asset's tax. `guard.max_amount_in` bounds that
/// nominal input.
pub fn swap_for_exact_out(
    pool: &mut Pool,
    asset_in: &Asset,
    asset_out: &Asset,
    amount_out: Amount,
    guard: &Guard,
    now: u64,
) -> Result<SwapReceipt> {
    check_deadline(now, guard.deadline)?;
    check_pair(pool, asset_in, asset_out)?;

    let (reserve_in, reserve_out) = pool.oriented(&asset_in.id)?;
    let quote = math::quote_exact_out(amount_out, reserve_in, reserve_out, pool.fee_bps())?;
    let amount_in = nominal_for(asset_in, quote.amount_in)?;
    let received = actual_received(asset_in, amount_in)?;
    let payout = actual_received(asset_out, amount_out)?;

    guard.check(now, amount_in, payout)?;

    let new_in = reserve_in.checked_add(received).ok_or(AmmError::Overflow)?;
    let new_out = reserve_out - amount_out;
    pool.commit_oriented(&asset_in.id, new_in, new_out)?;

    info!(
        "{} exact-out swap committed: paid {} {} for {} {}",
        pool.key(),
        amount_in,
        asset_in.id,
        amount_out,
        asset_out.id
    );

    Ok(SwapReceipt {
        asset_in: asset_in.id.clone(),
        asset_out: asset_out.id.clone(),
        amount_in,
        received,
        quoted_out: amount_out,
        payout,
        tax_in: amount_in - received,
        tax_out: amount_out - payout,
        price_impact_bps: quote.price_impact_bps,
    })
}

/// Deposit into `pool`, seeding it if empty.
///
/// On an initialized pool the router's optimal-pair rule applies: use all of
/// `amount_a_desired` with its matching B if that fits in `amount_b_desired`,
/// otherwise all of `amount_b_desired` with its matching A. Matching is done
/// on post-tax amounts so the reserve ratio holds for taxed assets. The used
/// amounts are checked against the guard before tax is applied.
pub fn add_liquidity(
    pool: &mut Pool,
    asset_a: &Asset,
    asset_b: &Asset,
    amount_a_desired: Amount,
    amount_b_desired: Amount,
    guard: &LiquidityGuard,
    now: u64,
) -> Result<LiquidityReceipt> {
    check_deadline(now, guard.deadline)?;
    check_pair(pool, asset_a, asset_b)?;
    if amount_a_desired == 0 || amount_b_desired == 0 {
        return Err(AmmError::InvalidAmount);
    }

    let seeding = !pool.is_initialized();
    let reserve_a = pool.reserve_of(&asset_a.id)?;
    let reserve_b = pool.reserve_of(&asset_b.id)?;

    // Match on what the pool will receive, then gross the match back up to
    // the nominal transfer that delivers it.
    let (used_a, used_b) = if seeding {
        (amount_a_desired, amount_b_desired)
    } else {
        let b_match = math::quote_deposit(actual_received(asset_a, amount_a_desired)?, reserve_a, reserve_b)?;
        let b_optimal = nominal_for(asset_b, b_match)?;
        if b_optimal <= amount_b_desired {
            (amount_a_desired, b_optimal)
        } else {
            let a_match = math::quote_deposit(actual_received(asset_b, amount_b_desired)?, reserve_b, reserve_a)?;
            let a_optimal = nominal_for(asset_a, a_match)?;
            if a_optimal > amount_a_desired {
                return Err(AmmError::InvariantViolation);
            }
            (a_optimal, amount_b_desired)
        }
    };

    guard.check(now, used_a, used_b)?;

    let received_a = actual_received(asset_a, used_a)?;
    let received_b = actual_received(asset_b, used_b)?;
    if received_a == 0 || received_b == 0 {
        return Err(AmmError::InvalidAmount);
    }

    let total = pool.total_liquidity();
    let minted = if seeding {
        math::initial_shares(received_a, received_b)?
    } else {
        let by_a = math::proportional_shares(received_a, reserve_a, total)?;
        let by_b = math::proportional_shares(received_b, reserve_b, total)?;
        by_a.min(by_b)
    };
    if minted == 0 {
        return Err(AmmError::InvalidAmount);
    }

    let new_a = reserve_a.checked_add(received_a).ok_or(AmmError::Overflow)?;
    let new_b = reserve_b.checked_add(received_b).ok_or(AmmError::Overflow)?;
    let new_total = total.checked_add(minted).ok_or(AmmError::Overflow)?;

    if seeding {
        if &asset_a.id == pool.key().asset_a() {
            pool.initialize(new_a, new_b)?;
        } else {
            pool.initialize(new_b, new_a)?;
        }
    } else {
        pool.commit_oriented(&asset_a.id, new_a, new_b)?;
    }
    pool.total_liquidity = new_total;

    info!(
        "{} liquidity {}: +{} {} +{} {}, minted {} (total {})",
        pool.key(),
        if seeding { "seeded" } else { "added" },
        received_a,
        asset_a.id,
        received_b,
        asset_b.id,
        minted,
        new_total
    );

    Ok(LiquidityReceipt {
        used_a,
        used_b,
        received_a,
        received_b,
        minted,
    })
}

/// Burn `shares` and pay out the proportional reserves, floor.
///
/// The guard applies to the payouts after tax. Burning every share drains
/// the pool to zero, after which it can be seeded again.
pub fn remove_liquidity(
    pool: &mut Pool,
    asset_a: &Asset,
    asset_b: &Asset,
    shares: Amount,
    guard: &LiquidityGuard,
    now: u64,
) -> Result<WithdrawReceipt> {
    check_deadline(now, guard.deadline)?;
    check_pair(pool, asset_a, asset_b)?;
    if !pool.is_initialized() {
        return Err(AmmError::InsufficientLiquidity);
    }
    let total = pool.total_liquidity();
    if shares == 0 || shares > total {
        return Err(AmmError::InvalidAmount);
    }

    let reserve_a = pool.reserve_of(&asset_a.id)?;
    let reserve_b = pool.reserve_of(&asset_b.id)?;
    let sent_a = to_amount(U256::from(reserve_a) * U256::from(shares) / U256::from(total))?;
    let sent_b = to_amount(U256::from(reserve_b) * U256::from(shares) / U256::from(total))?;
    if sent_a == 0 && sent_b == 0 {
        return Err(AmmError::InvalidAmount);
    }

    let payout_a = actual_received(asset_a, sent_a)?;
    let payout_b = actual_received(asset_b, sent_b)?;
    guard.check(now, payout_a, payout_b)?;

    pool.commit_oriented(&asset_a.id, reserve_a - sent_a, reserve_b - sent_b)?;
    pool.total_liquidity = total - shares;

    info!(
        "{} liquidity removed: -{} {} -{} {}, burned {}",
        pool.key(),
        sent_a,
        asset_a.id,
        sent_b,
        asset_b.id,
        shares
    );

    Ok(WithdrawReceipt {
        burned: shares,
        sent_a,
        sent_b,
        payout_a,
        payout_b,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::PoolKey;
    use crate::AmmError;

    const NOW: u64 = 1_700_000_000;
    const LATER: u64 = NOW + 60;

    fn weth() -> Asset {
        Asset::plain("WETH", 18)
    }

    fn token() -> Asset {
        Asset::taxed("AC", 18, 500).unwrap()
    }

    fn seeded(ac: Amount, eth: Amount) -> Pool {
        let key = PoolKey::new("AC".into(), "WETH".into()).unwrap();
        let mut pool = Pool::new(key, 30).unwrap();
        add_liquidity(
            &mut pool,
            &Asset::plain("AC", 18),
            &weth(),
            ac,
            eth,
            &LiquidityGuard::new(0, 0, LATER),
            NOW,
        )
        .unwrap();
        pool
    }

    #[test]
    fn test_seed_mints_geometric_mean() {
        let pool = seeded(1_000_000, 2_000);
        assert_eq!(pool.get_reserves(), (1_000_000, 2_000));
        assert_eq!(pool.total_liquidity(), 44_721);
    }

    #[test]
    fn test_swap_commits_quoted_amounts() {
        let mut pool = seeded(1_000_000, 2_000_000);
        let receipt = swap(&mut pool, &weth(), &Asset::plain("AC", 18), 10_000, &Guard::unbounded(LATER), NOW).unwrap();

        let expected = math::get_amount_out(10_000, 2_000_000, 1_000_000, 30).unwrap();
        assert_eq!(receipt.quoted_out, expected);
        assert_eq!(receipt.payout, expected);
        assert_eq!(pool.get_reserves(), (1_000_000 - expected, 2_010_000));
    }

    #[test]
    fn test_swap_taxed_output_pays_less_than_pool_sends() {
        let mut pool = seeded(1_000_000, 2_000_000);
        let receipt = swap(&mut pool, &weth(), &token(), 10_000, &Guard::unbounded(LATER), NOW).unwrap();

        assert_eq!(receipt.payout, receipt.quoted_out * 9_500 / 10_000);
        assert_eq!(receipt.tax_out, receipt.quoted_out - receipt.payout);
        // Pool accounts for what it sent, not what the trader got
        assert_eq!(pool.reserve_of(&"AC".into()).unwrap(), 1_000_000 - receipt.quoted_out);
    }

    #[test]
    fn test_swap_taxed_input_credits_received_only() {
        let mut pool = seeded(1_000_000, 2_000_000);
        let receipt = sell_supporting_fee(&mut pool, &token(), &weth(), 20_000, &Guard::unbounded(LATER), NOW).unwrap();

        assert_eq!(receipt.received, 19_000);
        assert_eq!(receipt.tax_in, 1_000);
        assert_eq!(pool.reserve_of(&"AC".into()).unwrap(), 1_019_000);
        assert_eq!(
            receipt.quoted_out,
            math::get_amount_out(19_000, 1_000_000, 2_000_000, 30).unwrap()
        );
    }

    #[test]
    fn test_swap_slippage_aborts_without_mutation() {
        let mut pool = seeded(1_000_000, 2_000_000);
        let before = pool.clone();
        let quoted = math::get_amount_out(10_000, 2_000_000, 1_000_000, 30).unwrap();

        let err = swap(&mut pool, &weth(), &token(), 10_000, &Guard::min_out(quoted, LATER), NOW).unwrap_err();
        assert_eq!(err, AmmError::SlippageExceeded);
        assert_eq!(pool, before);
    }

    #[test]
    fn test_swap_deadline_aborts_without_mutation() {
        let mut pool = seeded(1_000_000, 2_000_000);
        let before = pool.clone();

        let err = swap(&mut pool, &weth(), &token(), 10_000, &Guard::unbounded(NOW - 1), NOW).unwrap_err();
        assert_eq!(err, AmmError::DeadlineExpired);
        assert_eq!(pool, before);
    }

    #[test]
    fn test_swap_unknown_asset() {
        let mut pool = seeded(1_000_000, 2_000_000);
        let dai = Asset::plain("DAI", 18);
        let err = swap(&mut pool, &dai, &weth(), 10, &Guard::unbounded(LATER), NOW).unwrap_err();
        assert_eq!(err, AmmError::UnknownAsset);
    }

    #[test]
    fn test_swap_on_empty_pool() {
        let key = PoolKey::new("AC".into(), "WETH".into()).unwrap();
        let mut pool = Pool::new(key, 30).unwrap();
        let err = swap(&mut pool, &weth(), &token(), 10, &Guard::unbounded(LATER), NOW).unwrap_err();
        assert_eq!(err, AmmError::InsufficientLiquidity);
    }

    #[test]
    fn test_exact_out_respects_max_in() {
        let mut pool = seeded(1_000_000, 2_000_000);
        let required = math::get_amount_in(5_000, 1_000_000, 2_000_000, 30).unwrap();
        let nominal = nominal_for(&token(), required).unwrap();

        let before = pool.clone();
        let err = swap_for_exact_out(&mut pool, &token(), &weth(), 5_000, &Guard::max_in(nominal - 1, LATER), NOW)
            .unwrap_err();
        assert_eq!(err, AmmError::SlippageExceeded);
        assert_eq!(pool, before);

        let receipt =
            swap_for_exact_out(&mut pool, &token(), &weth(), 5_000, &Guard::max_in(nominal, LATER), NOW).unwrap();
        assert_eq!(receipt.amount_in, nominal);
        assert!(receipt.received >= required);
        assert_eq!(receipt.payout, 5_000);
        assert_eq!(pool.reserve_of(&"WETH".into()).unwrap(), 1_995_000);
    }

    #[test]
    fn test_add_liquidity_uses_matching_amount() {
        let mut pool = seeded(1_000_000, 2_000);
        let total = pool.total_liquidity();
        let receipt = add_liquidity(
            &mut pool,
            &weth(),
            &Asset::plain("AC", 18),
            20,
            20_000,
            &LiquidityGuard::new(0, 0, LATER),
            NOW,
        )
        .unwrap();

        assert_eq!((receipt.used_a, receipt.used_b), (20, 10_000));
        assert_eq!(receipt.minted, total * 20 / 2_000);
        assert_eq!(pool.get_reserves(), (1_010_000, 2_020));
    }

    #[test]
    fn test_add_liquidity_falls_back_to_b_side() {
        let mut pool = seeded(1_000_000, 2_000);
        let receipt = add_liquidity(
            &mut pool,
            &weth(),
            &Asset::plain("AC", 18),
            20,
            5_000,
            &LiquidityGuard::new(0, 0, LATER),
            NOW,
        )
        .unwrap();

        assert_eq!((receipt.used_a, receipt.used_b), (10, 5_000));
    }

    #[test]
    fn test_add_liquidity_min_guard() {
        let mut pool = seeded(1_000_000, 2_000);
        let before = pool.clone();
        let err = add_liquidity(
            &mut pool,
            &weth(),
            &Asset::plain("AC", 18),
            20,
            5_000,
            &LiquidityGuard::new(20, 0, LATER),
            NOW,
        )
        .unwrap_err();

        assert_eq!(err, AmmError::SlippageExceeded);
        assert_eq!(pool, before);
    }

    #[test]
    fn test_add_liquidity_taxed_deposit() {
        let key = PoolKey::new("AC".into(), "WETH".into()).unwrap();
        let mut pool = Pool::new(key, 30).unwrap();
        let receipt = add_liquidity(
            &mut pool,
            &token(),
            &weth(),
            1_000_000,
            2_000,
            &LiquidityGuard::new(0, 0, LATER),
            NOW,
        )
        .unwrap();

        assert_eq!(receipt.received_a, 950_000);
        assert_eq!(pool.get_reserves(), (950_000, 2_000));
    }

    #[test]
    fn test_add_liquidity_after_initialize_mints() {
        let key = PoolKey::new("AC".into(), "WETH".into()).unwrap();
        let mut pool = Pool::new(key, 30).unwrap();
        let seeded = pool.initialize(1_000_000, 2_000).unwrap();
        assert_eq!(seeded, 44_721);

        let receipt = add_liquidity(
            &mut pool,
            &Asset::plain("AC", 18),
            &weth(),
            10_000,
            20,
            &LiquidityGuard::new(0, 0, LATER),
            NOW,
        )
        .unwrap();

        assert_eq!(receipt.minted, 447);
        assert_eq!(pool.total_liquidity(), seeded + 447);
        assert_eq!(pool.get_reserves(), (1_010_000, 2_020));
    }

    #[test]
    fn test_taxed_deposit_keeps_ratio() {
        let key = PoolKey::new("AC".into(), "WETH".into()).unwrap();
        let mut pool = Pool::new(key, 30).unwrap();
        pool.initialize(950_000_000, 2_000_000).unwrap();

        // 95_000_000 AC arrives, matched by 200_000 WETH
        let receipt = add_liquidity(
            &mut pool,
            &token(),
            &weth(),
            100_000_000,
            1_000_000,
            &LiquidityGuard::new(0, 0, LATER),
            NOW,
        )
        .unwrap();

        assert_eq!((receipt.used_a, receipt.used_b), (100_000_000, 200_000));
        assert_eq!((receipt.received_a, receipt.received_b), (95_000_000, 200_000));
        assert_eq!(pool.get_reserves(), (1_045_000_000, 2_200_000));
    }

    #[test]
    fn test_taxed_deposit_keeps_ratio_when_token_side_binds() {
        let key = PoolKey::new("AC".into(), "WETH".into()).unwrap();
        let mut pool = Pool::new(key, 30).unwrap();
        pool.initialize(950_000_000, 2_000_000).unwrap();

        // Matching 1_000_000 WETH would need 500_000_000 AC nominal, so AC binds
        let receipt = add_liquidity(
            &mut pool,
            &weth(),
            &token(),
            1_000_000,
            100_000_000,
            &LiquidityGuard::new(0, 0, LATER),
            NOW,
        )
        .unwrap();

        assert_eq!((receipt.used_a, receipt.used_b), (200_000, 100_000_000));
        assert_eq!(pool.get_reserves(), (1_045_000_000, 2_200_000));
    }

    #[test]
    fn test_remove_all_drains_pool() {
        let mut pool = seeded(1_000_000, 2_000);
        let shares = pool.total_liquidity();
        let receipt = remove_liquidity(
            &mut pool,
            &Asset::plain("AC", 18),
            &weth(),
            shares,
            &LiquidityGuard::new(0, 0, LATER),
            NOW,
        )
        .unwrap();

        assert_eq!((receipt.sent_a, receipt.sent_b), (1_000_000, 2_000));
        assert_eq!(pool.get_reserves(), (0, 0));
        assert_eq!(pool.total_liquidity(), 0);
        assert!(!pool.is_initialized());
    }

    #[test]
    fn test_remove_too_many_shares() {
        let mut pool = seeded(1_000_000, 2_000);
        let shares = pool.total_liquidity() + 1;
        let err = remove_liquidity(
            &mut pool,
            &Asset::plain("AC", 18),
            &weth(),
            shares,
            &LiquidityGuard::new(0, 0, LATER),
            NOW,
        )
        .unwrap_err();
        assert_eq!(err, AmmError::InvalidAmount);
    }
}
