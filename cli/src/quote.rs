//! Read-only quotes against the configured reserves

use anyhow::{Context, Result};
use colored::Colorize;
use rust_decimal::Decimal;
use serde::Serialize;
use space_model::{FluxerParams, YtPurchase};

use crate::config::SimConfig;

/// Magnified residual above which a YT quote is flagged as not breaking even
pub const BREAK_EVEN_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 6);

#[derive(Debug, Serialize)]
pub struct PtSaleReport {
    pub amount_in: Decimal,
    pub target_out: Decimal,
    pub effective_price: Decimal,
    pub spot_price: Decimal,
    /// `1 - effective / spot`
    pub price_impact: Decimal,
    pub max_pts_in: Decimal,
}

#[derive(Debug, Serialize)]
pub struct YtPurchaseReport {
    pub initial_target: Decimal,
    pub feasible: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_to_borrow: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub yts_received: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_returned: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost_per_yt: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub residual: Option<Decimal>,
}

impl YtPurchaseReport {
    pub fn new(initial_target: Decimal, purchase: Option<YtPurchase>) -> Self {
        match purchase {
            Some(p) => Self {
                initial_target,
                feasible: true,
                target_to_borrow: Some(p.target_to_borrow),
                yts_received: Some(p.yts_received()),
                target_returned: Some(p.target_returned),
                cost_per_yt: p.cost_per_yt(),
                residual: Some(p.residual),
            },
            None => Self {
                initial_target,
                feasible: false,
                target_to_borrow: None,
                yts_received: None,
                target_returned: None,
                cost_per_yt: None,
                residual: None,
            },
        }
    }
}

pub fn quote_pt_sale(config: &SimConfig, params: FluxerParams, amount_in: Decimal, json: bool) -> Result<()> {
    let pool = config.pool(params)?;

    let target_out = pool
        .quote_pts_for_target(amount_in)
        .with_context(|| format!("Failed to quote {} PTs", amount_in))?;
    let spot_price = pool.spot_price().context("Configure [reserves] to quote against")?;
    let effective_price = if amount_in.is_zero() {
        spot_price
    } else {
        target_out / amount_in
    };
    let price_impact = Decimal::ONE - effective_price / spot_price;

    let report = PtSaleReport {
        amount_in,
        target_out,
        effective_price,
        spot_price,
        price_impact,
        max_pts_in: pool.max_pts_in()?,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("{}", "=== PT Sale Quote ===".bright_green().bold());
    println!("{} {}", "PTs in:".bright_cyan(), report.amount_in);
    println!("{} {}", "Target out:".bright_cyan(), report.target_out);
    println!("{} {}", "Effective price:".bright_cyan(), report.effective_price.round_dp(12));
    println!("{} {}", "Spot price:".bright_cyan(), report.spot_price.round_dp(12));
    println!("{} {:.4}%", "Price impact:".bright_cyan(), report.price_impact * Decimal::ONE_HUNDRED);
    println!("{} {}", "Max PTs in:".bright_cyan(), report.max_pts_in.round_dp(12).to_string().dimmed());
    Ok(())
}

pub fn quote_yt_purchase(
    config: &SimConfig,
    params: FluxerParams,
    initial_target: Decimal,
    optimal_return: Decimal,
    guess: Decimal,
    json: bool,
) -> Result<()> {
    let pool = config.pool(params)?;
    let purchase = pool
        .quote_yt_purchase_from(initial_target, optimal_return, guess)
        .with_context(|| format!("Failed to quote YT purchase for {} Target", initial_target))?;
    let report = YtPurchaseReport::new(initial_target, purchase);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    print_yt_purchase(&report, BREAK_EVEN_TOLERANCE);
    Ok(())
}

pub fn print_yt_purchase(report: &YtPurchaseReport, tolerance: Decimal) {
    println!("{}", "=== YT Purchase Quote ===".bright_green().bold());
    println!("{} {}", "Target in:".bright_cyan(), report.initial_target);

    let (Some(borrow), Some(yts), Some(returned), Some(residual)) = (
        report.target_to_borrow,
        report.yts_received,
        report.target_returned,
        report.residual,
    ) else {
        println!("\n  {} No feasible borrow at these reserves", "✗".bright_red());
        return;
    };

    println!("{} {}", "Target to borrow:".bright_cyan(), borrow);
    println!("{} {}", "YTs received:".bright_cyan(), yts);
    println!("{} {}", "Target returned:".bright_cyan(), returned.round_dp(12));
    if let Some(cost) = report.cost_per_yt {
        println!("{} {}", "Cost per YT:".bright_cyan(), cost.round_dp(12));
    }

    if residual <= tolerance {
        println!("\n  {} Sale repays the loan", "✓".green());
    } else {
        log::warn!("borrow solve stopped at residual {}", residual);
        println!(
            "\n  {} Solver stopped short of break-even (residual {}); try another --guess",
            "⚠️".yellow(),
            residual
        );
    }
}
