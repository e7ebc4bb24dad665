//! Assets and the fee-on-transfer adapter
//!
//! A taxed asset deducts `transfer_fee_bps` from every transfer it makes, so
//! the receiving side sees less than the nominal amount. The pool never
//! applies this itself; callers run every transfer boundary through
//! [`actual_received`] and feed the pool only what it really received.

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::math::{deduct_bps, ensure_bps, to_amount, U256};
use crate::{Amount, Result, BPS_SCALE};

/// Identifier of a fungible asset (its symbol).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AssetId(String);

impl AssetId {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self(symbol.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AssetId {
    fn from(symbol: &str) -> Self {
        Self::new(symbol)
    }
}

/// A fungible asset and its transfer tax.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub id: AssetId,

    /// Units per whole token, as a power of ten
    pub decimals: u8,

    /// Tax deducted on every transfer (0 for plain assets)
    pub transfer_fee_bps: u32,
}

impl Asset {
    /// Untaxed asset.
    pub fn plain(id: impl Into<String>, decimals: u8) -> Self {
        Self {
            id: AssetId::new(id),
            decimals,
            transfer_fee_bps: 0,
        }
    }

    /// Asset that deducts `transfer_fee_bps` on transfer. Fails with
    /// `InvalidFee` for rates of 100% or more.
    pub fn taxed(id: impl Into<String>, decimals: u8, transfer_fee_bps: u32) -> Result<Self> {
        ensure_bps(transfer_fee_bps)?;
        Ok(Self {
            id: AssetId::new(id),
            decimals,
            transfer_fee_bps,
        })
    }

    pub fn is_taxed(&self) -> bool {
        self.transfer_fee_bps > 0
    }

    /// What the recipient of a `nominal` transfer actually gets.
    pub fn received(&self, nominal: Amount) -> Result<Amount> {
        actual_received(self, nominal)
    }

    /// Portion of a `nominal` transfer kept by the asset as tax.
    pub fn tax_on(&self, nominal: Amount) -> Result<Amount> {
        Ok(nominal - self.received(nominal)?)
    }
}

/// `nominal * (10_000 - transfer_fee_bps) / 10_000`, floor. Untaxed assets
/// return `nominal` unchanged.
pub fn actual_received(asset: &Asset, nominal: Amount) -> Result<Amount> {
    if asset.transfer_fee_bps == 0 {
        return Ok(nominal);
    }
    deduct_bps(nominal, asset.transfer_fee_bps)
}

/// Smallest nominal transfer that delivers at least `received`.
pub fn nominal_for(asset: &Asset, received: Amount) -> Result<Amount> {
    if asset.transfer_fee_bps == 0 {
        return Ok(received);
    }
    let kept = U256::from(BPS_SCALE - asset.transfer_fee_bps as u128);
    let scaled = U256::from(received) * U256::from(BPS_SCALE);
    let (q, r) = scaled.div_mod(kept);
    to_amount(if r.is_zero() { q } else { q + U256::one() })
}
