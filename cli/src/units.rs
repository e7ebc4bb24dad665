//! Decimal string <-> smallest-unit conversion

use amm_model::{Amount, U256};
use anyhow::{anyhow, bail, Result};

fn scale(decimals: u8) -> Result<Amount> {
    10u128
        .checked_pow(decimals as u32)
        .ok_or_else(|| anyhow!("{} decimals do not fit a 128-bit amount", decimals))
}

/// Parse a whole-unit decimal string ("0.5", "2000") into smallest units.
pub fn parse_units(value: &str, decimals: u8) -> Result<Amount> {
    let value = value.trim().replace('_', "");
    let (whole, frac) = match value.split_once('.') {
        Some((whole, frac)) => (whole, frac),
        None => (value.as_str(), ""),
    };
    if whole.is_empty() && frac.is_empty() {
        bail!("empty amount");
    }
    if !whole.chars().chain(frac.chars()).all(|c| c.is_ascii_digit()) {
        bail!("invalid amount: {}", value);
    }
    if frac.len() > decimals as usize {
        bail!("{} has more than {} decimal places", value, decimals);
    }

    let unit = scale(decimals)?;
    let whole: Amount = if whole.is_empty() { 0 } else { whole.parse()? };
    let frac_units: Amount = if frac.is_empty() {
        0
    } else {
        let padded = format!("{:0<width$}", frac, width = decimals as usize);
        padded.parse()?
    };

    whole
        .checked_mul(unit)
        .and_then(|w| w.checked_add(frac_units))
        .ok_or_else(|| anyhow!("amount {} overflows", value))
}

/// Format smallest units as a whole-unit decimal string. Always keeps one
/// fractional digit ("2000.0").
pub fn format_units(amount: Amount, decimals: u8) -> String {
    let unit = match scale(decimals) {
        Ok(unit) => unit,
        Err(_) => return amount.to_string(),
    };
    if decimals == 0 {
        return format!("{}.0", amount);
    }
    let frac = format!("{:0>width$}", amount % unit, width = decimals as usize);
    let frac = frac.trim_end_matches('0');
    format!("{}.{}", amount / unit, if frac.is_empty() { "0" } else { frac })
}

/// Price of one whole base unit in whole quote units from the raw reserves,
/// with up to 18 decimal places.
pub fn format_price(reserve_quote: Amount, quote_decimals: u8, reserve_base: Amount, base_decimals: u8) -> String {
    if reserve_base == 0 {
        return "n/a".to_string();
    }
    let numer = U256::from(reserve_quote).checked_mul(U256::exp10(base_decimals as usize + 18));
    let denom = U256::from(reserve_base).checked_mul(U256::exp10(quote_decimals as usize));
    match (numer, denom) {
        (Some(n), Some(d)) if d > U256::zero() => {
            let scaled = n / d;
            if scaled > U256::from(u128::MAX) {
                "n/a".to_string()
            } else {
                format_units(scaled.as_u128(), 18)
            }
        }
        _ => "n/a".to_string(),
    }
}
