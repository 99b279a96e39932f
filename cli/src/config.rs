//! Simulation config: TOML pool parameters, seed reserves and CLI overrides

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use space_model::pool::ts_from_years;
use space_model::{FluxerParams, SpaceFluxer};
use std::fs;
use std::path::Path;

/// Whole config file; every table and field is optional
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimConfig {
    pub pool: PoolConfig,
    pub reserves: ReservesConfig,
}

/// `[pool]` - unset fields fall back to the reference regime
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct PoolConfig {
    /// Seconds to maturity
    pub ttm: Option<Decimal>,
    /// Time stretch in years; `ts = 1 / (SECONDS_PER_YEAR * ts_years)`
    pub ts_years: Option<Decimal>,
    /// Raw per-second time scale (exclusive with `ts_years`)
    pub ts: Option<Decimal>,
    pub g2: Option<Decimal>,
    pub scale: Option<Decimal>,
    pub init_scale: Option<Decimal>,
    pub ifee: Option<Decimal>,
}

/// `[reserves]` - pool state to seed from; empty by default
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReservesConfig {
    pub pt: Decimal,
    pub target: Decimal,
    pub supply: Decimal,
}

/// Command-line values that win over the config file
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub scale: Option<Decimal>,
    pub ifee: Option<Decimal>,
    pub maturity: Option<NaiveDate>,
}

impl Overrides {
    pub fn from_args(scale: Option<Decimal>, ifee: Option<Decimal>, maturity: Option<&str>) -> Result<Self> {
        let maturity = maturity
            .map(|s| {
                NaiveDate::parse_from_str(s, "%Y-%m-%d")
                    .with_context(|| format!("Invalid maturity date '{}', expected YYYY-MM-DD", s))
            })
            .transpose()?;
        Ok(Self { scale, ifee, maturity })
    }
}

impl SimConfig {
    /// Load from `path` (`~` expanded), or defaults when no path is given
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let expanded = shellexpand::tilde(&path.to_string_lossy()).into_owned();
        let content = fs::read_to_string(&expanded)
            .with_context(|| format!("Failed to read config file: {}", expanded))?;
        Self::from_toml(&content).with_context(|| format!("Failed to parse config file: {}", expanded))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: SimConfig = toml::from_str(content)?;
        log::debug!("loaded config: {:?}", config);
        Ok(config)
    }

    /// Pool parameters after applying `overrides`; `now` anchors `--maturity`
    pub fn resolve(&self, overrides: &Overrides, now: DateTime<Utc>) -> Result<FluxerParams> {
        let reference = FluxerParams::reference();
        let pool = &self.pool;

        let ttm = match overrides.maturity {
            Some(date) => ttm_until(date, now)?,
            None => pool.ttm.unwrap_or(reference.ttm),
        };
        let ts = match (pool.ts, pool.ts_years) {
            (Some(_), Some(_)) => bail!("Set either pool.ts or pool.ts_years, not both"),
            (Some(ts), None) => ts,
            (None, Some(years)) => {
                if years <= Decimal::ZERO {
                    bail!("pool.ts_years must be positive, got {}", years);
                }
                ts_from_years(years)
            }
            (None, None) => reference.ts,
        };

        let params = FluxerParams {
            ttm,
            ts,
            g2: pool.g2.unwrap_or(reference.g2),
            scale: overrides.scale.or(pool.scale).unwrap_or(reference.scale),
            init_scale: pool.init_scale.unwrap_or(reference.init_scale),
            ifee: overrides.ifee.or(pool.ifee).unwrap_or(reference.ifee),
        };
        validate(&params)?;
        Ok(params)
    }

    /// Pool seeded with the configured reserves
    pub fn pool(&self, params: FluxerParams) -> Result<SpaceFluxer> {
        let r = &self.reserves;
        if r.pt < Decimal::ZERO || r.target < Decimal::ZERO || r.supply < Decimal::ZERO {
            bail!("Reserves must be non-negative: pt={} target={} supply={}", r.pt, r.target, r.supply);
        }
        Ok(SpaceFluxer::with_reserves(params, r.pt, r.target, r.supply))
    }
}

/// Whole seconds from `now` to midnight UTC on `maturity`
fn ttm_until(maturity: NaiveDate, now: DateTime<Utc>) -> Result<Decimal> {
    let midnight = maturity
        .and_hms_opt(0, 0, 0)
        .context("Invalid maturity time")?;
    let seconds = (Utc.from_utc_datetime(&midnight) - now).num_seconds();
    if seconds <= 0 {
        bail!("Maturity {} is not in the future", maturity);
    }
    Ok(Decimal::from(seconds))
}

fn validate(params: &FluxerParams) -> Result<()> {
    if params.ttm < Decimal::ZERO {
        bail!("ttm must be non-negative, got {}", params.ttm);
    }
    if params.scale <= Decimal::ZERO {
        bail!("scale must be positive, got {}", params.scale);
    }
    if params.init_scale <= Decimal::ZERO {
        bail!("init_scale must be positive, got {}", params.init_scale);
    }
    if params.ifee < Decimal::ZERO || params.ifee >= Decimal::ONE {
        bail!("ifee must be in [0, 1), got {}", params.ifee);
    }
    let a = params.exponent().context("Failed to compute invariant exponent")?;
    if a <= Decimal::ZERO {
        bail!("Invariant exponent a = {} is not positive; shorten ttm or lower g2/ts", a);
    }
    Ok(())
}
