//! Launchpad CLI - token launch scenario runner
//!
//! Drives the constant-product pool model through the launch sequence of a
//! fee-on-transfer token (deploy, seed liquidity, open trading, buy, second
//! deposit, sell) and offers one-off quotes and a concurrent multi-pool run.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use colored::Colorize;

mod concurrent;
mod config;
mod quote;
mod scenario;
mod units;
mod wallet;

use amm_model::SystemClock;
use config::ScenarioConfig;

#[derive(Parser)]
#[command(name = "launchpad")]
#[command(about = "Token launch scenario runner for a constant-product pool model", long_about = None)]
#[command(version)]
struct Cli {
    /// Scenario config file (TOML); built-in defaults when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full launch sequence
    Run {
        /// Print the final pool table as JSON
        #[arg(long)]
        json: bool,
    },

    /// Quote a single swap against explicit reserves
    Quote {
        /// Reserve of the asset being sold (whole units)
        #[arg(long)]
        reserve_in: String,

        /// Reserve of the asset being bought (whole units)
        #[arg(long)]
        reserve_out: String,

        /// Amount sold, or bought with --exact-out (whole units)
        #[arg(short, long)]
        amount: String,

        /// Pool fee in basis points
        #[arg(long, default_value = "30")]
        fee_bps: u32,

        /// Decimals of both assets
        #[arg(long, default_value = "18")]
        decimals: u8,

        /// Treat --amount as the desired output
        #[arg(long)]
        exact_out: bool,
    },

    /// Print the effective scenario config as TOML
    Config,

    /// Trade on several independent pools at once
    Concurrent {
        /// Number of pools
        #[arg(short, long, default_value = "4")]
        pools: usize,

        /// Trades per pool
        #[arg(short, long, default_value = "200")]
        trades: usize,

        /// Print the final pool table as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter)).init();

    let config = ScenarioConfig::load(cli.config.as_deref())?;

    if cli.verbose {
        if let Some(path) = &cli.config {
            println!("{} {}", "Config:".bright_cyan(), path.display());
        }
        println!("{} {}/{}", "Pair:".bright_cyan(), config.token.symbol, config.base.symbol);
    }

    match cli.command {
        Commands::Run { json } => {
            let mut scenario = scenario::Scenario::new(config, Arc::new(SystemClock))?;
            let report = scenario.run()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&scenario.snapshot())?);
            }
            report.print_summary()?;
        }
        Commands::Quote {
            reserve_in,
            reserve_out,
            amount,
            fee_bps,
            decimals,
            exact_out,
        } => {
            quote::show_quote(&reserve_in, &reserve_out, &amount, fee_bps, decimals, exact_out)?;
        }
        Commands::Config => {
            print!("{}", config.to_toml()?);
        }
        Commands::Concurrent { pools, trades, json } => {
            concurrent::run_concurrent(&config, pools, trades, json).await?;
        }
    }

    Ok(())
}
