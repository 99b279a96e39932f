//! Reference harness: join the pool, sell PTs, then quote a YT purchase

use anyhow::{Context, Result};
use colored::Colorize;
use rust_decimal::Decimal;
use serde::Serialize;
use space_model::borrow::DEFAULT_BORROW_GUESS;
use space_model::FluxerParams;

use crate::config::SimConfig;
use crate::quote::{print_yt_purchase, YtPurchaseReport, BREAK_EVEN_TOLERANCE};

#[derive(Debug, Serialize)]
pub struct SimulationReport {
    pub target_to_join: Decimal,
    pub pts_to_swap_in: Decimal,
    pub target_out: Decimal,
    pub pt_reserves: Decimal,
    pub target_reserves: Decimal,
    pub supply: Decimal,
    pub spot_price: Decimal,
    /// Undefined at maturity (`ttm = 0`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub implied_rate: Option<Decimal>,
    pub yt_purchase: YtPurchaseReport,
}

impl SimulationReport {
    /// Join with `target_to_join`, sell `pts_to_swap_in`, then quote the YT purchase
    pub fn new(
        config: &SimConfig,
        params: FluxerParams,
        target_to_join: Decimal,
        pts_to_swap_in: Decimal,
        target_in_for_yts: Decimal,
        optimal_target_returned: Decimal,
    ) -> Result<Self> {
        let mut pool = config.pool(params)?;

        pool.mint(target_to_join)
            .with_context(|| format!("Failed to join with {} Target", target_to_join))?;
        let target_out = pool
            .swap_pts_for_target(pts_to_swap_in)
            .with_context(|| format!("Failed to sell {} PTs", pts_to_swap_in))?;
        let spot_price = pool.spot_price()?;

        let purchase = pool.quote_yt_purchase_from(target_in_for_yts, optimal_target_returned, DEFAULT_BORROW_GUESS)?;

        Ok(Self {
            target_to_join,
            pts_to_swap_in,
            target_out,
            pt_reserves: pool.pt_reserves(),
            target_reserves: pool.target_reserves(),
            supply: pool.supply(),
            spot_price,
            implied_rate: pool.implied_rate().ok(),
            yt_purchase: YtPurchaseReport::new(target_in_for_yts, purchase),
        })
    }
}

pub fn run_simulation(
    config: &SimConfig,
    params: FluxerParams,
    target_to_join: Decimal,
    pts_to_swap_in: Decimal,
    target_in_for_yts: Decimal,
    optimal_target_returned: Decimal,
    json: bool,
) -> Result<()> {
    let report = SimulationReport::new(
        config,
        params,
        target_to_join,
        pts_to_swap_in,
        target_in_for_yts,
        optimal_target_returned,
    )?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("{}", "=== Space Pool Simulation ===".bright_green().bold());
    println!("\n{}", "Join:".bright_yellow());
    println!("  {} {}", "Target joined:".bright_cyan(), report.target_to_join);
    println!("\n{}", "PT sale:".bright_yellow());
    println!("  {} {}", "PTs in:".bright_cyan(), report.pts_to_swap_in);
    println!("  {} {}", "Target out:".bright_cyan(), report.target_out);
    println!("\n{}", "Pool after sale:".bright_yellow());
    println!("  {} {}", "PT reserves:".bright_cyan(), report.pt_reserves);
    println!("  {} {}", "Target reserves:".bright_cyan(), report.target_reserves);
    println!("  {} {}", "LP supply:".bright_cyan(), report.supply);
    println!("  {} {}", "PT spot price:".bright_cyan(), report.spot_price.round_dp(12));
    match report.implied_rate {
        Some(rate) => println!("  {} {:.4}%", "Implied rate:".bright_cyan(), rate * Decimal::ONE_HUNDRED),
        None => println!("  {}", "At maturity (no implied rate)".dimmed()),
    }

    println!();
    print_yt_purchase(&report.yt_purchase, BREAK_EVEN_TOLERANCE);
    Ok(())
}
