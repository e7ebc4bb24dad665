//! Caller-supplied tolerances

use crate::{AmmError, Amount, Result};

/// Tolerance for a swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Guard {
    /// Least payout the caller accepts
    pub min_amount_out: Amount,

    /// Most the caller is willing to pay (exact-output trades only)
    pub max_amount_in: Option<Amount>,

    /// Unix seconds after which the trade must fail
    pub deadline: u64,
}

impl Guard {
    pub fn min_out(min_amount_out: Amount, deadline: u64) -> Self {
        Self {
            min_amount_out,
            max_amount_in: None,
            deadline,
        }
    }

    pub fn max_in(max_amount_in: Amount, deadline: u64) -> Self {
        Self {
            min_amount_out: 0,
            max_amount_in: Some(max_amount_in),
            deadline,
        }
    }

    /// Least output at `100 - slippage_pct` percent of `estimate`.
    pub fn with_slippage_pct(estimate: Amount, slippage_pct: u8, deadline: u64) -> Self {
        Self::min_out(keep_pct(estimate, slippage_pct), deadline)
    }

    /// Accept any price; only the deadline applies.
    pub fn unbounded(deadline: u64) -> Self {
        Self::min_out(0, deadline)
    }

    /// Deadline is checked first: an expired trade fails regardless of price.
    pub fn check(&self, now: u64, amount_in: Amount, payout: Amount) -> Result<()> {
        check_deadline(now, self.deadline)?;
        if payout < self.min_amount_out {
            return Err(AmmError::SlippageExceeded);
        }
        if let Some(max_in) = self.max_amount_in {
            if amount_in > max_in {
                return Err(AmmError::SlippageExceeded);
            }
        }
        Ok(())
    }
}

/// Tolerance for a deposit or withdrawal: least acceptable amount per side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiquidityGuard {
    pub min_a: Amount,
    pub min_b: Amount,
    pub deadline: u64,
}

impl LiquidityGuard {
    pub fn new(min_a: Amount, min_b: Amount, deadline: u64) -> Self {
        Self {
            min_a,
            min_b,
            deadline,
        }
    }

    /// Mins at `100 - slippage_pct` percent of the desired amounts.
    pub fn with_slippage_pct(desired_a: Amount, desired_b: Amount, slippage_pct: u8, deadline: u64) -> Self {
        Self::new(
            keep_pct(desired_a, slippage_pct),
            keep_pct(desired_b, slippage_pct),
            deadline,
        )
    }

    pub fn check(&self, now: u64, amount_a: Amount, amount_b: Amount) -> Result<()> {
        check_deadline(now, self.deadline)?;
        if amount_a < self.min_a || amount_b < self.min_b {
            return Err(AmmError::SlippageExceeded);
        }
        Ok(())
    }
}

/// `floor(amount * (100 - pct) / 100)` without overflowing.
fn keep_pct(amount: Amount, pct: u8) -> Amount {
    let keep = 100u128.saturating_sub(pct as u128);
    amount / 100 * keep + amount % 100 * keep / 100
}

#[inline]
pub fn check_deadline(now: u64, deadline: u64) -> Result<()> {
    if now > deadline {
        return Err(AmmError::DeadlineExpired);
    }
    Ok(())
}
