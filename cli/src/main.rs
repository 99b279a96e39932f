//! SpaceFluxer CLI - off-chain simulator for Space AMM pools
//!
//! Seeds a pool from a TOML config (or the reference regime), runs mints and
//! PT sales against it, and quotes leveraged YT purchases.

use clap::{Parser, Subcommand};
use colored::Colorize;
use rust_decimal::Decimal;
use std::path::PathBuf;

mod config;
mod params;
mod quote;
mod simulate;

use config::{Overrides, SimConfig};

#[derive(Parser)]
#[command(name = "spacefluxer")]
#[command(about = "Space AMM simulator - price PTs and quote leveraged YT purchases", long_about = None)]
#[command(version)]
struct Cli {
    /// TOML file with [pool] and [reserves] tables
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (debug logging unless RUST_LOG is set)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Live Target -> Underlying scale (overrides config)
    #[arg(long, global = true)]
    scale: Option<Decimal>,

    /// Issuance fee fraction (overrides config)
    #[arg(long, global = true)]
    ifee: Option<Decimal>,

    /// Maturity date, YYYY-MM-DD UTC; sets ttm from now
    #[arg(long, global = true)]
    maturity: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Mint, sell PTs, then quote a YT purchase on the resulting pool
    Simulate {
        /// Target joined into the pool (LP shares minted)
        target_to_join: Decimal,

        /// PTs sold into the pool after joining
        pts_to_swap_in: Decimal,

        /// Target brought to the YT purchase
        target_in_for_yts: Decimal,

        /// Target to keep after repaying the flash loan
        #[arg(default_value = "0")]
        optimal_target_returned: Decimal,
    },

    /// Quote a PT sale against the configured reserves
    Quote {
        /// PTs sold into the pool
        amount_in: Decimal,
    },

    /// Quote a leveraged YT purchase against the configured reserves
    BuyYts {
        /// Target brought to the purchase
        initial_target: Decimal,

        /// Target to keep after repaying the flash loan
        #[arg(long, default_value = "0")]
        optimal_return: Decimal,

        /// Starting guess for the borrow amount
        #[arg(long, default_value = "0.5")]
        guess: Decimal,
    },

    /// Show resolved pool parameters
    Params,
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp(None)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = SimConfig::load(cli.config.as_deref())?;
    let overrides = Overrides::from_args(cli.scale, cli.ifee, cli.maturity.as_deref())?;
    let params = config.resolve(&overrides, chrono::Utc::now())?;

    if cli.verbose && !cli.json {
        if let Some(path) = &cli.config {
            println!("{} {}", "Config:".bright_cyan(), path.display());
        }
        println!("{} {}", "Exponent a:".bright_cyan(), params.exponent()?);
    }

    match cli.command {
        Commands::Simulate {
            target_to_join,
            pts_to_swap_in,
            target_in_for_yts,
            optimal_target_returned,
        } => {
            simulate::run_simulation(
                &config,
                params,
                target_to_join,
                pts_to_swap_in,
                target_in_for_yts,
                optimal_target_returned,
                cli.json,
            )?;
        }
        Commands::Quote { amount_in } => {
            quote::quote_pt_sale(&config, params, amount_in, cli.json)?;
        }
        Commands::BuyYts {
            initial_target,
            optimal_return,
            guess,
        } => {
            quote::quote_yt_purchase(&config, params, initial_target, optimal_return, guess, cli.json)?;
        }
        Commands::Params => {
            params::show_params(&config, params, chrono::Utc::now(), cli.json)?;
        }
    }

    Ok(())
}
