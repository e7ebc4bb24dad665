//! Pool registry: assets, pools, and per-pool serialization
//!
//! Every pool sits behind its own `RwLock`. Quotes take the read lock and
//! are advisory: they are stale as soon as another commit lands. Mutations
//! hold the write lock across the whole quote → guard → commit sequence, so
//! no trade can commit against reserves it did not quote from. Distinct
//! pools never contend; multi-pool trades lock in key order.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use log::{debug, error, warn};
use parking_lot::RwLock;

use crate::asset::{Asset, AssetId};
use crate::clock::{Clock, SystemClock};
use crate::executor::{self, LiquidityReceipt, SwapReceipt, WithdrawReceipt};
use crate::guard::{Guard, LiquidityGuard};
use crate::math::{self, Quote};
use crate::pool::{Pool, PoolKey, PoolRow};
use crate::{AmmError, Amount, Result};

/// Realized amounts of a committed multi-hop swap.
///
/// Adjacent legs share one transfer, so a leg's `tax_out` and the next leg's
/// `tax_in` are the same tax.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathReceipt {
    /// Nominal input, then what each pool sent
    pub amounts: Vec<Amount>,

    /// What the trader received at the end of the path
    pub payout: Amount,

    pub legs: Vec<SwapReceipt>,
}

pub struct PoolRegistry {
    assets: RwLock<HashMap<AssetId, Asset>>,
    pools: RwLock<BTreeMap<PoolKey, Arc<RwLock<Pool>>>>,
    clock: Arc<dyn Clock>,
}

impl Default for PoolRegistry {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

fn logged<T>(op: &str, key: &PoolKey, result: Result<T>) -> Result<T> {
    if let Err(e) = &result {
        if e.is_recoverable() {
            warn!("{} on {} aborted: {}", op, key, e);
        } else {
            error!("{} on {} failed: {}", op, key, e);
        }
    }
    result
}

fn seed_exact(pool: &mut Pool, x: &AssetId, reserve_x: Amount, reserve_y: Amount) -> Result<Amount> {
    if pool.is_initialized() {
        return Err(AmmError::AlreadyInitialized);
    }
    if x == pool.key().asset_a() {
        pool.initialize(reserve_x, reserve_y)
    } else {
        pool.initialize(reserve_y, reserve_x)
    }
}

impl PoolRegistry {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            assets: RwLock::new(HashMap::new()),
            pools: RwLock::new(BTreeMap::new()),
            clock,
        }
    }

    pub fn now(&self) -> u64 {
        self.clock.now()
    }

    /// Register or replace an asset.
    pub fn register_asset(&self, asset: Asset) {
        debug!("registered asset {} (tax {} bps)", asset.id, asset.transfer_fee_bps);
        self.assets.write().insert(asset.id.clone(), asset);
    }

    pub fn asset(&self, id: &AssetId) -> Result<Asset> {
        self.assets.read().get(id).cloned().ok_or(AmmError::UnknownAsset)
    }

    /// Create an empty pool for a pair of registered assets.
    pub fn create_pool(&self, x: &AssetId, y: &AssetId, fee_bps: u32) -> Result<PoolKey> {
        self.asset(x)?;
        self.asset(y)?;
        let key = PoolKey::new(x.clone(), y.clone())?;
        let pool = Pool::new(key.clone(), fee_bps)?;

        let mut pools = self.pools.write();
        if pools.contains_key(&key) {
            return Err(AmmError::AlreadyInitialized);
        }
        pools.insert(key.clone(), Arc::new(RwLock::new(pool)));
        debug!("created pool {} ({} bps)", key, fee_bps);
        Ok(key)
    }

    fn pool(&self, key: &PoolKey) -> Result<Arc<RwLock<Pool>>> {
        self.pools.read().get(key).cloned().ok_or(AmmError::UnknownPool)
    }

    fn lookup(&self, x: &AssetId, y: &AssetId) -> Result<(PoolKey, Arc<RwLock<Pool>>)> {
        let key = PoolKey::new(x.clone(), y.clone())?;
        let pool = self.pool(&key)?;
        Ok((key, pool))
    }

    /// Seed an empty pool with exact reserves, bypassing tax and guards.
    /// Mints `floor(sqrt(rx * ry))` liquidity.
    pub fn initialize_pool(&self, x: &AssetId, y: &AssetId, reserve_x: Amount, reserve_y: Amount) -> Result<Amount> {
        let (key, pool) = self.lookup(x, y)?;
        let mut pool = pool.write();
        let result = seed_exact(&mut pool, x, reserve_x, reserve_y);
        logged("initialize", &key, result)
    }

    /// Reserves oriented to the argument order: `(reserve of x, reserve of y)`.
    pub fn get_reserves(&self, x: &AssetId, y: &AssetId) -> Result<(Amount, Amount)> {
        let (_, pool) = self.lookup(x, y)?;
        let pool = pool.read();
        pool.oriented(x)
    }

    /// Copy of the pool's current state.
    pub fn pool_state(&self, x: &AssetId, y: &AssetId) -> Result<Pool> {
        let (_, pool) = self.lookup(x, y)?;
        let snapshot = pool.read().clone();
        Ok(snapshot)
    }

    pub fn quote_swap(&self, asset_in: &AssetId, asset_out: &AssetId, amount_in: Amount) -> Result<Quote> {
        let (_, pool) = self.lookup(asset_in, asset_out)?;
        let pool = pool.read();
        let (reserve_in, reserve_out) = pool.oriented(asset_in)?;
        math::quote_exact_in(amount_in, reserve_in, reserve_out, pool.fee_bps())
    }

    /// Output for `amount_in` actually received by the pool. No tax applied.
    pub fn quote_swap_output(&self, asset_in: &AssetId, asset_out: &AssetId, amount_in: Amount) -> Result<Amount> {
        Ok(self.quote_swap(asset_in, asset_out, amount_in)?.amount_out)
    }

    /// Least input the pool must receive to send `amount_out`. No tax applied.
    pub fn quote_swap_input(&self, asset_in: &AssetId, asset_out: &AssetId, amount_out: Amount) -> Result<Amount> {
        let (_, pool) = self.lookup(asset_in, asset_out)?;
        let pool = pool.read();
        let (reserve_in, reserve_out) = pool.oriented(asset_in)?;
        math::get_amount_in(amount_out, reserve_in, reserve_out, pool.fee_bps())
    }

    /// Amount of `asset_b` matching `amount_a` of `asset_a` at the current ratio.
    pub fn quote_liquidity_deposit(&self, asset_a: &AssetId, asset_b: &AssetId, amount_a: Amount) -> Result<Amount> {
        let (_, pool) = self.lookup(asset_a, asset_b)?;
        let pool = pool.read();
        let (reserve_a, reserve_b) = pool.oriented(asset_a)?;
        math::quote_deposit(amount_a, reserve_a, reserve_b)
    }

    /// Price of `base` in units of `quote` as `(numerator, denominator)`.
    pub fn spot_price(&self, base: &AssetId, quote: &AssetId) -> Result<(Amount, Amount)> {
        let (reserve_base, reserve_quote) = self.get_reserves(base, quote)?;
        if reserve_base == 0 {
            return Err(AmmError::InsufficientLiquidity);
        }
        Ok((reserve_quote, reserve_base))
    }

    /// Router-style estimate along `path`: one entry per path element, each
    /// leg reading its own pool's current reserves. Transfer tax is ignored.
    pub fn quote_amounts_out(&self, path: &[AssetId], amount_in: Amount) -> Result<Vec<Amount>> {
        if path.len() < 2 {
            return Err(AmmError::InvalidAmount);
        }
        let mut amounts = Vec::with_capacity(path.len());
        amounts.push(amount_in);
        for hop in path.windows(2) {
            let last = amounts[amounts.len() - 1];
            amounts.push(self.quote_swap_output(&hop[0], &hop[1], last)?);
        }
        Ok(amounts)
    }

    /// Inputs required along `path` to end with `amount_out`, computed back
    /// to front. Transfer tax is ignored.
    pub fn quote_amounts_in(&self, path: &[AssetId], amount_out: Amount) -> Result<Vec<Amount>> {
        if path.len() < 2 {
            return Err(AmmError::InvalidAmount);
        }
        let mut amounts = vec![0; path.len()];
        amounts[path.len() - 1] = amount_out;
        for i in (1..path.len()).rev() {
            amounts[i - 1] = self.quote_swap_input(&path[i - 1], &path[i], amounts[i])?;
        }
        Ok(amounts)
    }

    pub fn swap(&self, asset_in: &AssetId, asset_out: &AssetId, amount_in: Amount, guard: &Guard) -> Result<SwapReceipt> {
        let (a_in, a_out) = (self.asset(asset_in)?, self.asset(asset_out)?);
        let (key, pool) = self.lookup(asset_in, asset_out)?;
        let mut pool = pool.write();
        let now = self.now();
        logged("swap", &key, executor::swap(&mut pool, &a_in, &a_out, amount_in, guard, now))
    }

    pub fn sell_supporting_fee(
        &self,
        asset_in: &AssetId,
        asset_out: &AssetId,
        amount_in: Amount,
        guard: &Guard,
    ) -> Result<SwapReceipt> {
        let (a_in, a_out) = (self.asset(asset_in)?, self.asset(asset_out)?);
        let (key, pool) = self.lookup(asset_in, asset_out)?;
        let mut pool = pool.write();
        let now = self.now();
        logged(
            "fee-supporting swap",
            &key,
            executor::sell_supporting_fee(&mut pool, &a_in, &a_out, amount_in, guard, now),
        )
    }

    pub fn swap_for_exact_out(
        &self,
        asset_in: &AssetId,
        asset_out: &AssetId,
        amount_out: Amount,
        guard: &Guard,
    ) -> Result<SwapReceipt> {
        let (a_in, a_out) = (self.asset(asset_in)?, self.asset(asset_out)?);
        let (key, pool) = self.lookup(asset_in, asset_out)?;
        let mut pool = pool.write();
        let now = self.now();
        logged(
            "exact-out swap",
            &key,
            executor::swap_for_exact_out(&mut pool, &a_in, &a_out, amount_out, guard, now),
        )
    }

    pub fn add_liquidity(
        &self,
        asset_a: &AssetId,
        asset_b: &AssetId,
        amount_a_desired: Amount,
        amount_b_desired: Amount,
        guard: &LiquidityGuard,
    ) -> Result<LiquidityReceipt> {
        let (a, b) = (self.asset(asset_a)?, self.asset(asset_b)?);
        let (key, pool) = self.lookup(asset_a, asset_b)?;
        let mut pool = pool.write();
        let now = self.now();
        logged(
            "add liquidity",
            &key,
            executor::add_liquidity(&mut pool, &a, &b, amount_a_desired, amount_b_desired, guard, now),
        )
    }

    pub fn remove_liquidity(
        &self,
        asset_a: &AssetId,
        asset_b: &AssetId,
        shares: Amount,
        guard: &LiquidityGuard,
    ) -> Result<WithdrawReceipt> {
        let (a, b) = (self.asset(asset_a)?, self.asset(asset_b)?);
        let (key, pool) = self.lookup(asset_a, asset_b)?;
        let mut pool = pool.write();
        let now = self.now();
        logged(
            "remove liquidity",
            &key,
            executor::remove_liquidity(&mut pool, &a, &b, shares, guard, now),
        )
    }

    /// Sell `amount_in` of `path[0]` through every pool on `path`.
    ///
    /// Each intermediate transfer goes pool to pool, so tax on an
    /// intermediate asset is taken once. All legs run on copies and are
    /// written back only if the final payout passes `guard`.
    pub fn swap_exact_in_path(&self, path: &[AssetId], amount_in: Amount, guard: &Guard) -> Result<PathReceipt> {
        if path.len() < 2 {
            return Err(AmmError::InvalidAmount);
        }
        let assets = path.iter().map(|id| self.asset(id)).collect::<Result<Vec<_>>>()?;

        let mut handles: BTreeMap<PoolKey, Arc<RwLock<Pool>>> = BTreeMap::new();
        for hop in path.windows(2) {
            let (key, pool) = self.lookup(&hop[0], &hop[1])?;
            handles.insert(key, pool);
        }

        // BTreeMap iteration gives a global lock order
        let mut locked: Vec<_> = handles.iter().map(|(key, pool)| (key, pool.write())).collect();
        let mut working: BTreeMap<PoolKey, Pool> =
            locked.iter().map(|(key, pool)| ((*key).clone(), (**pool).clone())).collect();

        let now = self.now();
        let leg_guard = Guard::unbounded(guard.deadline);
        let mut amounts = vec![amount_in];
        let mut legs = Vec::with_capacity(path.len() - 1);
        let mut amount = amount_in;

        for (i, hop) in assets.windows(2).enumerate() {
            let key = PoolKey::new(hop[0].id.clone(), hop[1].id.clone())?;
            let pool = working.get_mut(&key).ok_or(AmmError::UnknownPool)?;
            let receipt = logged(
                "path swap",
                &key,
                executor::swap(pool, &hop[0], &hop[1], amount, &leg_guard, now),
            )?;
            debug!("leg {}: {} -> {}", i, amount, receipt.quoted_out);
            amount = receipt.quoted_out;
            amounts.push(receipt.quoted_out);
            legs.push(receipt);
        }

        let payout = legs.last().map(|leg| leg.payout).unwrap_or(0);
        if let Err(e) = guard.check(now, amount_in, payout) {
            warn!("path swap {:?} aborted: {}", path, e);
            return Err(e);
        }

        for (key, pool) in locked.iter_mut() {
            if let Some(updated) = working.remove(*key) {
                **pool = updated;
            }
        }

        Ok(PathReceipt { amounts, payout, legs })
    }

    /// One row per pool, in key order.
    pub fn snapshot(&self) -> Vec<PoolRow> {
        let pools: Vec<_> = self.pools.read().values().cloned().collect();
        pools.iter().map(|pool| pool.read().row()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    const NOW: u64 = 1_700_000_000;

    fn registry() -> (Arc<ManualClock>, PoolRegistry) {
        let clock = Arc::new(ManualClock::new(NOW));
        let registry = PoolRegistry::new(clock.clone());
        registry.register_asset(Asset::plain("WETH", 18));
        registry.register_asset(Asset::taxed("AC", 18, 500).unwrap());
        registry.register_asset(Asset::plain("USDC", 6));
        (clock, registry)
    }

    fn id(s: &str) -> AssetId {
        AssetId::new(s)
    }

    #[test]
    fn test_create_pool_twice() {
        let (_, reg) = registry();
        reg.create_pool(&id("WETH"), &id("AC"), 30).unwrap();
        assert_eq!(
            reg.create_pool(&id("AC"), &id("WETH"), 30),
            Err(AmmError::AlreadyInitialized)
        );
    }

    #[test]
    fn test_create_pool_unknown_asset() {
        let (_, reg) = registry();
        assert_eq!(reg.create_pool(&id("WETH"), &id("DAI"), 30), Err(AmmError::UnknownAsset));
    }

    #[test]
    fn test_unknown_pool() {
        let (_, reg) = registry();
        assert_eq!(reg.get_reserves(&id("WETH"), &id("AC")), Err(AmmError::UnknownPool));
    }

    #[test]
    fn test_reserves_follow_argument_order() {
        let (_, reg) = registry();
        reg.create_pool(&id("WETH"), &id("AC"), 30).unwrap();
        reg.initialize_pool(&id("WETH"), &id("AC"), 2_000, 1_000_000).unwrap();

        assert_eq!(reg.get_reserves(&id("WETH"), &id("AC")).unwrap(), (2_000, 1_000_000));
        assert_eq!(reg.get_reserves(&id("AC"), &id("WETH")).unwrap(), (1_000_000, 2_000));
        assert_eq!(
            reg.initialize_pool(&id("WETH"), &id("AC"), 1, 1),
            Err(AmmError::AlreadyInitialized)
        );
    }

    #[test]
    fn test_deadline_uses_registry_clock() {
        let (clock, reg) = registry();
        reg.create_pool(&id("WETH"), &id("AC"), 30).unwrap();
        reg.initialize_pool(&id("WETH"), &id("AC"), 2_000_000, 1_000_000).unwrap();

        let guard = Guard::unbounded(NOW + 60);
        clock.advance(61);
        assert_eq!(
            reg.swap(&id("WETH"), &id("AC"), 1_000, &guard),
            Err(AmmError::DeadlineExpired)
        );
        clock.set(NOW);
        assert!(reg.swap(&id("WETH"), &id("AC"), 1_000, &guard).is_ok());
    }

    #[test]
    fn test_amounts_out_matches_single_quotes() {
        let (_, reg) = registry();
        reg.create_pool(&id("WETH"), &id("AC"), 30).unwrap();
        reg.create_pool(&id("WETH"), &id("USDC"), 30).unwrap();
        reg.initialize_pool(&id("WETH"), &id("AC"), 2_000_000, 1_000_000_000).unwrap();
        reg.initialize_pool(&id("WETH"), &id("USDC"), 2_000_000, 4_000_000_000).unwrap();

        let path = [id("USDC"), id("WETH"), id("AC")];
        let amounts = reg.quote_amounts_out(&path, 10_000_000).unwrap();
        let leg1 = math::get_amount_out(10_000_000, 4_000_000_000, 2_000_000, 30).unwrap();
        let leg2 = math::get_amount_out(leg1, 2_000_000, 1_000_000_000, 30).unwrap();
        assert_eq!(amounts, vec![10_000_000, leg1, leg2]);

        let back = reg.quote_amounts_in(&path, leg2).unwrap();
        assert!(back[0] <= 10_000_000);
        assert_eq!(back[2], leg2);
    }

    #[test]
    fn test_path_swap_commits_all_legs() {
        let (_, reg) = registry();
        reg.create_pool(&id("WETH"), &id("AC"), 30).unwrap();
        reg.create_pool(&id("WETH"), &id("USDC"), 30).unwrap();
        reg.initialize_pool(&id("WETH"), &id("AC"), 2_000_000, 1_000_000_000).unwrap();
        reg.initialize_pool(&id("WETH"), &id("USDC"), 2_000_000, 4_000_000_000).unwrap();

        let path = [id("USDC"), id("WETH"), id("AC")];
        let estimate = reg.quote_amounts_out(&path, 10_000_000).unwrap();
        let receipt = reg
            .swap_exact_in_path(&path, 10_000_000, &Guard::unbounded(NOW + 60))
            .unwrap();

        assert_eq!(receipt.amounts, estimate);
        // Output asset is taxed on the way to the trader
        assert_eq!(receipt.payout, estimate[2] * 9_500 / 10_000);
        assert_eq!(
            reg.get_reserves(&id("USDC"), &id("WETH")).unwrap(),
            (4_010_000_000, 2_000_000 - estimate[1])
        );
        assert_eq!(
            reg.get_reserves(&id("WETH"), &id("AC")).unwrap(),
            (2_000_000 + estimate[1], 1_000_000_000 - estimate[2])
        );
    }

    #[test]
    fn test_path_swap_guard_leaves_all_pools_untouched() {
        let (_, reg) = registry();
        reg.create_pool(&id("WETH"), &id("AC"), 30).unwrap();
        reg.create_pool(&id("WETH"), &id("USDC"), 30).unwrap();
        reg.initialize_pool(&id("WETH"), &id("AC"), 2_000_000, 1_000_000_000).unwrap();
        reg.initialize_pool(&id("WETH"), &id("USDC"), 2_000_000, 4_000_000_000).unwrap();
        let before = reg.snapshot();

        let path = [id("USDC"), id("WETH"), id("AC")];
        let estimate = reg.quote_amounts_out(&path, 10_000_000).unwrap();
        let err = reg
            .swap_exact_in_path(&path, 10_000_000, &Guard::min_out(estimate[2], NOW + 60))
            .unwrap_err();

        assert_eq!(err, AmmError::SlippageExceeded);
        assert_eq!(reg.snapshot(), before);
    }

    #[test]
    fn test_path_revisiting_pool() {
        let (_, reg) = registry();
        reg.create_pool(&id("WETH"), &id("USDC"), 30).unwrap();
        reg.initialize_pool(&id("WETH"), &id("USDC"), 2_000_000, 4_000_000_000).unwrap();
        let k0 = reg.pool_state(&id("WETH"), &id("USDC")).unwrap().product();

        let path = [id("WETH"), id("USDC"), id("WETH")];
        let receipt = reg.swap_exact_in_path(&path, 10_000, &Guard::unbounded(NOW)).unwrap();

        assert!(receipt.payout < 10_000);
        assert!(reg.pool_state(&id("WETH"), &id("USDC")).unwrap().product() > k0);
    }

    #[test]
    fn test_snapshot_rows() {
        let (_, reg) = registry();
        reg.create_pool(&id("WETH"), &id("AC"), 30).unwrap();
        reg.initialize_pool(&id("AC"), &id("WETH"), 1_000_000, 2_000).unwrap();

        let rows = reg.snapshot();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].pool_id, "AC/WETH");
        assert_eq!((rows[0].reserve_a, rows[0].reserve_b), (1_000_000, 2_000));
        assert_eq!(rows[0].total_liquidity, 44_721);
        assert_eq!(rows[0].fee_bps, 30);
    }

    #[test]
    fn test_spot_price() {
        let (_, reg) = registry();
        reg.create_pool(&id("WETH"), &id("AC"), 30).unwrap();
        assert_eq!(reg.spot_price(&id("AC"), &id("WETH")), Err(AmmError::InsufficientLiquidity));
        reg.initialize_pool(&id("AC"), &id("WETH"), 1_000_000, 2_000).unwrap();
        assert_eq!(reg.spot_price(&id("AC"), &id("WETH")).unwrap(), (2_000, 1_000_000));
    }
}
