//! One-off swap quotes against explicit reserves

use amm_model::math::{self, Quote};
use anyhow::{Context, Result};
use colored::Colorize;

use crate::units::{format_units, parse_units};

pub fn quote(
    reserve_in: &str,
    reserve_out: &str,
    amount: &str,
    fee_bps: u32,
    decimals: u8,
    exact_out: bool,
) -> Result<Quote> {
    let reserve_in = parse_units(reserve_in, decimals).context("reserve_in")?;
    let reserve_out = parse_units(reserve_out, decimals).context("reserve_out")?;
    let amount = parse_units(amount, decimals).context("amount")?;

    let quote = if exact_out {
        math::quote_exact_out(amount, reserve_in, reserve_out, fee_bps)?
    } else {
        math::quote_exact_in(amount, reserve_in, reserve_out, fee_bps)?
    };
    Ok(quote)
}

pub fn show_quote(
    reserve_in: &str,
    reserve_out: &str,
    amount: &str,
    fee_bps: u32,
    decimals: u8,
    exact_out: bool,
) -> Result<()> {
    let q = quote(reserve_in, reserve_out, amount, fee_bps, decimals, exact_out)?;

    println!("{}", "=== Quote ===".bright_green().bold());
    println!("{} {} / {}", "Reserves:".bright_cyan(), reserve_in, reserve_out);
    println!("{} {} bps", "Fee:".bright_cyan(), q.effective_fee_bps);
    println!("{} {}", "Amount in:".bright_cyan(), format_units(q.amount_in, decimals));
    println!("{} {}", "Amount out:".bright_cyan(), format_units(q.amount_out, decimals));

    let impact = format!("{}.{:02}%", q.price_impact_bps / 100, q.price_impact_bps % 100);
    if q.price_impact_bps >= 500 {
        println!("{} {}", "Price impact:".bright_cyan(), impact.bright_red());
    } else {
        println!("{} {}", "Price impact:".bright_cyan(), impact);
    }
    Ok(())
}
