//! Reserve ledger for one pool

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::asset::AssetId;
use crate::math::{ensure_bps, initial_shares, product, U256};
use crate::{AmmError, Amount, Result};

/// Unordered pair key. `PoolKey::new(a, b) == PoolKey::new(b, a)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PoolKey {
    asset_a: AssetId,
    asset_b: AssetId,
}

impl PoolKey {
    pub fn new(x: AssetId, y: AssetId) -> Result<Self> {
        if x == y {
            return Err(AmmError::IdenticalAssets);
        }
        let (asset_a, asset_b) = if x < y { (x, y) } else { (y, x) };
        Ok(Self { asset_a, asset_b })
    }

    pub fn asset_a(&self) -> &AssetId {
        &self.asset_a
    }

    pub fn asset_b(&self) -> &AssetId {
        &self.asset_b
    }

    pub fn contains(&self, asset: &AssetId) -> bool {
        &self.asset_a == asset || &self.asset_b == asset
    }

    /// The other side of the pair.
    pub fn other(&self, asset: &AssetId) -> Result<&AssetId> {
        if asset == &self.asset_a {
            Ok(&self.asset_b)
        } else if asset == &self.asset_b {
            Ok(&self.asset_a)
        } else {
            Err(AmmError::UnknownAsset)
        }
    }
}

impl fmt::Display for PoolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.asset_a, self.asset_b)
    }
}

/// Two-asset reserve pair. Assets are held in canonical key order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pool {
    key: PoolKey,
    reserve_a: Amount,
    reserve_b: Amount,
    pub(crate) total_liquidity: Amount,
    fee_bps: u32,
}

impl Pool {
    /// Empty pool. Fails with `InvalidFee` for fees of 100% or more.
    pub fn new(key: PoolKey, fee_bps: u32) -> Result<Self> {
        ensure_bps(fee_bps)?;
        Ok(Self {
            key,
            reserve_a: 0,
            reserve_b: 0,
            total_liquidity: 0,
            fee_bps,
        })
    }

    pub fn key(&self) -> &PoolKey {
        &self.key
    }

    pub fn fee_bps(&self) -> u32 {
        self.fee_bps
    }

    pub fn total_liquidity(&self) -> Amount {
        self.total_liquidity
    }

    pub fn is_initialized(&self) -> bool {
        self.reserve_a != 0 || self.reserve_b != 0
    }

    /// `(reserve_a, reserve_b)` in canonical order.
    pub fn get_reserves(&self) -> (Amount, Amount) {
        (self.reserve_a, self.reserve_b)
    }

    /// Reserve held of `asset`.
    pub fn reserve_of(&self, asset: &AssetId) -> Result<Amount> {
        if asset == self.key.asset_a() {
            Ok(self.reserve_a)
        } else if asset == self.key.asset_b() {
            Ok(self.reserve_b)
        } else {
            Err(AmmError::UnknownAsset)
        }
    }

    /// `(reserve_in, reserve_out)` for a trade selling `asset_in`.
    pub fn oriented(&self, asset_in: &AssetId) -> Result<(Amount, Amount)> {
        let other = self.key.other(asset_in)?;
        Ok((self.reserve_of(asset_in)?, self.reserve_of(other)?))
    }

    /// `reserve_a * reserve_b`
    pub fn product(&self) -> U256 {
        product(self.reserve_a, self.reserve_b)
    }

    /// Seed an empty pool. Both sides must be non-zero.
    ///
    /// Mints `floor(sqrt(reserve_a * reserve_b))` liquidity and returns it.
    pub fn initialize(&mut self, reserve_a: Amount, reserve_b: Amount) -> Result<Amount> {
        if self.is_initialized() {
            return Err(AmmError::AlreadyInitialized);
        }
        if reserve_a == 0 || reserve_b == 0 {
            return Err(AmmError::InvariantViolation);
        }
        let shares = initial_shares(reserve_a, reserve_b)?;
        self.reserve_a = reserve_a;
        self.reserve_b = reserve_b;
        self.total_liquidity = shares;
        Ok(shares)
    }

    /// Replace both reserves at once.
    ///
    /// Only a full drain may zero a side, and then it must zero both.
    pub fn commit(&mut self, reserve_a: Amount, reserve_b: Amount) -> Result<()> {
        if !self.is_initialized() {
            return Err(AmmError::InvariantViolation);
        }
        if (reserve_a == 0) != (reserve_b == 0) {
            return Err(AmmError::InvariantViolation);
        }
        self.reserve_a = reserve_a;
        self.reserve_b = reserve_b;
        Ok(())
    }

    /// Commit with reserves keyed by asset rather than canonical order.
    pub(crate) fn commit_oriented(
        &mut self,
        asset_in: &AssetId,
        reserve_in: Amount,
        reserve_out: Amount,
    ) -> Result<()> {
        if asset_in == self.key.asset_a() {
            self.commit(reserve_in, reserve_out)
        } else if asset_in == self.key.asset_b() {
            self.commit(reserve_out, reserve_in)
        } else {
            Err(AmmError::UnknownAsset)
        }
    }

    /// Snapshot row for persistence or display.
    pub fn row(&self) -> PoolRow {
        PoolRow {
            pool_id: self.key.to_string(),
            asset_a: self.key.asset_a().clone(),
            asset_b: self.key.asset_b().clone(),
            reserve_a: self.reserve_a,
            reserve_b: self.reserve_b,
            total_liquidity: self.total_liquidity,
            fee_bps: self.fee_bps,
        }
    }
}

/// One row of the pool table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolRow {
    pub pool_id: String,
    pub asset_a: AssetId,
    pub asset_b: AssetId,
    pub reserve_a: Amount,
    pub reserve_b: Amount,
    pub total_liquidity: Amount,
    pub fee_bps: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> PoolKey {
        PoolKey::new("WETH".into(), "AC".into()).unwrap()
    }

    #[test]
    fn test_key_is_unordered() {
        let k1 = PoolKey::new("WETH".into(), "AC".into()).unwrap();
        let k2 = PoolKey::new("AC".into(), "WETH".into()).unwrap();
        assert_eq!(k1, k2);
        assert_eq!(k1.asset_a().as_str(), "AC");
        assert_eq!(k1.to_string(), "AC/WETH");
    }

    #[test]
    fn test_identical_assets_rejected() {
        assert_eq!(
            PoolKey::new("AC".into(), "AC".into()),
            Err(AmmError::IdenticalAssets)
        );
    }

    #[test]
    fn test_initialize_once() {
        let mut pool = Pool::new(key(), 30).unwrap();
        assert!(!pool.is_initialized());
        assert_eq!(pool.initialize(1_000, 2_000), Ok(1_414));
        assert_eq!(pool.get_reserves(), (1_000, 2_000));
        assert_eq!(pool.total_liquidity(), 1_414);
        assert_eq!(pool.initialize(1, 1), Err(AmmError::AlreadyInitialized));
    }

    #[test]
    fn test_initialize_rejects_zero_side() {
        let mut pool = Pool::new(key(), 30).unwrap();
        assert_eq!(pool.initialize(0, 2_000), Err(AmmError::InvariantViolation));
        assert!(!pool.is_initialized());
    }

    #[test]
    fn test_commit_before_initialize() {
        let mut pool = Pool::new(key(), 30).unwrap();
        assert_eq!(pool.commit(1, 1), Err(AmmError::InvariantViolation));
    }

    #[test]
    fn test_commit_one_sided_zero_rejected() {
        let mut pool = Pool::new(key(), 30).unwrap();
        pool.initialize(1_000, 2_000).unwrap();
        assert_eq!(pool.commit(0, 2_000), Err(AmmError::InvariantViolation));
        assert_eq!(pool.get_reserves(), (1_000, 2_000));

        // Full drain is terminal but legal
        pool.commit(0, 0).unwrap();
        assert!(!pool.is_initialized());
    }

    #[test]
    fn test_oriented_reserves() {
        let mut pool = Pool::new(key(), 30).unwrap();
        pool.initialize(1_000, 2_000).unwrap();
        assert_eq!(pool.oriented(&"AC".into()).unwrap(), (1_000, 2_000));
        assert_eq!(pool.oriented(&"WETH".into()).unwrap(), (2_000, 1_000));
        assert_eq!(pool.oriented(&"DAI".into()), Err(AmmError::UnknownAsset));

        pool.commit_oriented(&"WETH".into(), 2_500, 800).unwrap();
        assert_eq!(pool.get_reserves(), (800, 2_500));
    }

    #[test]
    fn test_invalid_fee() {
        assert_eq!(Pool::new(key(), 10_000), Err(AmmError::InvalidFee));
    }
}
