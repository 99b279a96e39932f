//! Resolved pool parameters

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use colored::Colorize;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use space_model::FluxerParams;

use crate::config::SimConfig;

#[derive(Debug, Serialize)]
pub struct ParamsReport {
    pub ttm: Decimal,
    pub ts: Decimal,
    pub g2: Decimal,
    pub scale: Decimal,
    pub init_scale: Decimal,
    pub ifee: Decimal,
    pub exponent: Decimal,
    pub maturity: DateTime<Utc>,
    pub pt_reserves: Decimal,
    pub target_reserves: Decimal,
    pub supply: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spot_price: Option<Decimal>,
}

impl ParamsReport {
    pub fn new(config: &SimConfig, params: FluxerParams, now: DateTime<Utc>) -> Result<Self> {
        let pool = config.pool(params)?;
        let seconds = params.ttm.trunc().to_i64().context("ttm does not fit in i64 seconds")?;
        let maturity = now
            .checked_add_signed(Duration::seconds(seconds))
            .context("Maturity date out of range")?;

        Ok(Self {
            ttm: params.ttm,
            ts: params.ts,
            g2: params.g2,
            scale: params.scale,
            init_scale: params.init_scale,
            ifee: params.ifee,
            exponent: params.exponent()?,
            maturity,
            pt_reserves: pool.pt_reserves(),
            target_reserves: pool.target_reserves(),
            supply: pool.supply(),
            // Empty pools have no price
            spot_price: pool.spot_price().ok(),
        })
    }
}

pub fn show_params(config: &SimConfig, params: FluxerParams, now: DateTime<Utc>, json: bool) -> Result<()> {
    let report = ParamsReport::new(config, params, now)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("{}", "=== Pool Parameters ===".bright_green().bold());
    println!("  {} {} s", "ttm:".bright_cyan(), report.ttm);
    println!("  {} {}", "Maturity:".bright_cyan(), report.maturity.format("%Y-%m-%d %H:%M UTC"));
    println!("  {} {}", "ts:".bright_cyan(), report.ts);
    println!("  {} {}", "g2:".bright_cyan(), report.g2);
    println!("  {} {}", "Exponent a:".bright_cyan(), report.exponent);
    println!("  {} {}", "Scale:".bright_cyan(), report.scale);
    println!("  {} {}", "Initial scale:".bright_cyan(), report.init_scale);
    println!("  {} {}", "Issuance fee:".bright_cyan(), report.ifee);

    println!("\n{}", "Reserves:".bright_yellow());
    println!("  {} {}", "PT:".bright_cyan(), report.pt_reserves);
    println!("  {} {}", "Target:".bright_cyan(), report.target_reserves);
    println!("  {} {}", "LP supply:".bright_cyan(), report.supply);
    match report.spot_price {
        Some(p) => println!("  {} {}", "PT spot price:".bright_cyan(), p.round_dp(12)),
        None => println!("  {}", "Empty pool (no spot price)".dimmed()),
    }
    Ok(())
}
