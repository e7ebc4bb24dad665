//! Constant product AMM math (x·y=k)
//!
//! Pure functions over reserves; nothing here touches pool state. Rounding
//! always favours the pool: outputs floor, required inputs ceil.

use crate::{AmmError, Amount, Result, BPS_SCALE};

pub use wide::U256;

mod wide {
    use uint::construct_uint;

    construct_uint! {
        /// 256-bit unsigned integer for intermediate products.
        pub struct U256(4);
    }
}

/// Dry-run result of a swap quote. Never mutates state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quote {
    /// Amount the pool receives
    pub amount_in: Amount,

    /// Amount the pool sends
    pub amount_out: Amount,

    /// Shortfall against the spot price, in basis points (informational)
    pub price_impact_bps: u32,

    /// Pool fee applied to the input
    pub effective_fee_bps: u32,
}

/// Narrow a 256-bit intermediate back to an amount.
#[inline]
pub fn to_amount(value: U256) -> Result<Amount> {
    if value > U256::from(u128::MAX) {
        return Err(AmmError::Overflow);
    }
    Ok(value.as_u128())
}

#[inline]
fn ceil_div(n: U256, d: U256) -> U256 {
    let (q, r) = n.div_mod(d);
    if r.is_zero() {
        q
    } else {
        q + U256::one()
    }
}

/// Validate a basis-point rate (must be below 100%).
#[inline]
pub fn ensure_bps(bps: u32) -> Result<()> {
    if bps as u128 >= BPS_SCALE {
        return Err(AmmError::InvalidFee);
    }
    Ok(())
}

/// `amount * (10_000 - bps) / 10_000`, floor.
pub fn deduct_bps(amount: Amount, bps: u32) -> Result<Amount> {
    ensure_bps(bps)?;
    let kept = U256::from(BPS_SCALE - bps as u128);
    to_amount(U256::from(amount) * kept / U256::from(BPS_SCALE))
}

/// Output for an exact input (sell `amount_in` of the input side)
///
/// - in_after_fee = amount_in * (10000 - fee) / 10000
/// - amount_out = r_out * in_after_fee / (r_in + in_after_fee)
///
/// Both divisions floor, so `r_in * r_out` never decreases.
///
/// # Arguments
/// * `amount_in` - Amount the pool actually receives
/// * `reserve_in` - Reserve of the input asset
/// * `reserve_out` - Reserve of the output asset
/// * `fee_bps` - Pool fee in basis points (e.g., 30 = 0.30%)
pub fn get_amount_out(
    amount_in: Amount,
    reserve_in: Amount,
    reserve_out: Amount,
    fee_bps: u32,
) -> Result<Amount> {
    if reserve_in == 0 || reserve_out == 0 {
        return Err(AmmError::InsufficientLiquidity);
    }
    if amount_in == 0 {
        return Err(AmmError::InvalidAmount);
    }

    let in_after_fee = U256::from(deduct_bps(amount_in, fee_bps)?);
    let numerator = U256::from(reserve_out) * in_after_fee;
    let denominator = U256::from(reserve_in) + in_after_fee;

    to_amount(numerator / denominator)
}

/// Smallest input that yields at least `amount_out` (buy exact output)
///
/// - net = ceil(r_in * amount_out / (r_out - amount_out))
/// - amount_in = ceil(net * 10000 / (10000 - fee))
///
/// Feeding the result back through [`get_amount_out`] returns `>= amount_out`.
///
/// # Arguments
/// * `amount_out` - Desired output
/// * `reserve_in` - Reserve of the input asset
/// * `reserve_out` - Reserve of the output asset
/// * `fee_bps` - Pool fee in basis points
pub fn get_amount_in(
    amount_out: Amount,
    reserve_in: Amount,
    reserve_out: Amount,
    fee_bps: u32,
) -> Result<Amount> {
    if reserve_in == 0 || reserve_out == 0 {
        return Err(AmmError::InsufficientLiquidity);
    }
    if amount_out == 0 {
        return Err(AmmError::InvalidAmount);
    }
    // Cannot drain the output side completely
    if amount_out >= reserve_out {
        return Err(AmmError::InsufficientLiquidity);
    }
    ensure_bps(fee_bps)?;

    let net = ceil_div(
        U256::from(reserve_in) * U256::from(amount_out),
        U256::from(reserve_out - amount_out),
    );
    // gross >= net, so this also keeps the scaling below in range
    let net = U256::from(to_amount(net)?);
    let gross = ceil_div(
        net * U256::from(BPS_SCALE),
        U256::from(BPS_SCALE - fee_bps as u128),
    );

    to_amount(gross)
}

/// Matching deposit of B for `amount_a` of A at the current ratio, floor.
pub fn quote_deposit(amount_a: Amount, reserve_a: Amount, reserve_b: Amount) -> Result<Amount> {
    if reserve_a == 0 || reserve_b == 0 {
        return Err(AmmError::InsufficientLiquidity);
    }
    if amount_a == 0 {
        return Err(AmmError::InvalidAmount);
    }
    to_amount(U256::from(amount_a) * U256::from(reserve_b) / U256::from(reserve_a))
}

/// Floor of the square root (Babylonian method).
pub fn isqrt(n: U256) -> U256 {
    if n.is_zero() {
        return U256::zero();
    }
    if n < U256::from(4u8) {
        return U256::one();
    }
    let mut z = n;
    let mut x = (n >> 1) + U256::one();
    while x < z {
        z = x;
        x = (n / x + x) >> 1;
    }
    z
}

/// Liquidity minted by the seeding deposit: `floor(sqrt(a * b))`.
pub fn initial_shares(amount_a: Amount, amount_b: Amount) -> Result<Amount> {
    if amount_a == 0 || amount_b == 0 {
        return Err(AmmError::InvalidAmount);
    }
    // sqrt of a product of two u128 always fits in u128
    to_amount(isqrt(U256::from(amount_a) * U256::from(amount_b)))
}

/// Shares for a proportional deposit: `total * amount / reserve`, floor.
pub fn proportional_shares(amount: Amount, reserve: Amount, total: Amount) -> Result<Amount> {
    if reserve == 0 {
        return Err(AmmError::InsufficientLiquidity);
    }
    to_amount(U256::from(total) * U256::from(amount) / U256::from(reserve))
}

/// Shortfall of `amount_out` against the spot output, in basis points.
pub fn price_impact_bps(
    amount_in: Amount,
    amount_out: Amount,
    reserve_in: Amount,
    reserve_out: Amount,
) -> u32 {
    if reserve_in == 0 {
        return 0;
    }
    let spot_out = U256::from(amount_in) * U256::from(reserve_out) / U256::from(reserve_in);
    let out = U256::from(amount_out);
    if spot_out.is_zero() || out >= spot_out {
        return 0;
    }
    ((spot_out - out) * U256::from(BPS_SCALE) / spot_out).low_u32()
}

/// Full quote for an exact input.
pub fn quote_exact_in(
    amount_in: Amount,
    reserve_in: Amount,
    reserve_out: Amount,
    fee_bps: u32,
) -> Result<Quote> {
    let amount_out = get_amount_out(amount_in, reserve_in, reserve_out, fee_bps)?;
    Ok(Quote {
        amount_in,
        amount_out,
        price_impact_bps: price_impact_bps(amount_in, amount_out, reserve_in, reserve_out),
        effective_fee_bps: fee_bps,
    })
}

/// Full quote for an exact output.
pub fn quote_exact_out(
    amount_out: Amount,
    reserve_in: Amount,
    reserve_out: Amount,
    fee_bps: u32,
) -> Result<Quote> {
    let amount_in = get_amount_in(amount_out, reserve_in, reserve_out, fee_bps)?;
    Ok(Quote {
        amount_in,
        amount_out,
        price_impact_bps: price_impact_bps(amount_in, amount_out, reserve_in, reserve_out),
        effective_fee_bps: fee_bps,
    })
}

/// Product of two reserves, for invariant checks.
#[inline]
pub fn product(reserve_a: Amount, reserve_b: Amount) -> U256 {
    U256::from(reserve_a) * U256::from(reserve_b)
}
