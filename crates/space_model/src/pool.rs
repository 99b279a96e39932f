//! Space pool state and reserve bookkeeping

use log::debug;
use rust_decimal::Decimal;

use crate::math::{self, real_pow};
use crate::{Result, SpaceError, DEFAULT_TS_YEARS, G2_DENOMINATOR, G2_NUMERATOR, SECONDS_PER_YEAR};

/// Scalar pool parameters fixed for one simulation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FluxerParams {
    /// Time to maturity in seconds
    pub ttm: Decimal,
    /// Per-second time-scale constant of the invariant
    pub ts: Decimal,
    /// Fee/skew applied when selling PTs into the pool
    pub g2: Decimal,
    /// Live Target -> Underlying exchange rate
    pub scale: Decimal,
    /// Scale recorded at pool initialization
    pub init_scale: Decimal,
    /// Issuance fee fraction charged on flash-issuance
    pub ifee: Decimal,
}

impl FluxerParams {
    /// One-year pool with a 12-year time stretch, `g2 = 1000/950`, unit scales and no issuance fee
    pub fn reference() -> Self {
        let ttm = Decimal::from(SECONDS_PER_YEAR);
        Self {
            ttm,
            ts: ts_from_years(Decimal::from(DEFAULT_TS_YEARS)),
            g2: Decimal::from(G2_NUMERATOR) / Decimal::from(G2_DENOMINATOR),
            scale: Decimal::ONE,
            init_scale: Decimal::ONE,
            ifee: Decimal::ZERO,
        }
    }

    /// Invariant exponent `a = 1 - g2 · ts · ttm`
    pub fn exponent(&self) -> Result<Decimal> {
        math::exponent(self.g2, self.ts, self.ttm)
    }
}

impl Default for FluxerParams {
    fn default() -> Self {
        Self::reference()
    }
}

/// `ts = 1 / (SECONDS_PER_YEAR · years)`
pub fn ts_from_years(years: Decimal) -> Decimal {
    Decimal::ONE / (Decimal::from(SECONDS_PER_YEAR) * years)
}

/// Off-chain mirror of a Space pool
///
/// Single-owner and mutable: `mint` and `swap_pts_for_target` move reserves,
/// every `quote_*` / price query is read-only.
///
/// Reserves are `Decimal`s with 28 significant digits. Curve outputs lose
/// digits to the `x^a` round trip, so a quote is accurate to roughly
/// `reserves · 1e-27` Target: keep trades above that size, and reserves below
/// about 1e12 when sub-unit trades need full precision. Quotes never exceed
/// `amount_in · spot_price`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpaceFluxer {
    params: FluxerParams,
    pt_reserves: Decimal,
    target_reserves: Decimal,
    supply: Decimal,
}

impl SpaceFluxer {
    /// Empty pool
    pub fn new(params: FluxerParams) -> Self {
        Self::with_reserves(params, Decimal::ZERO, Decimal::ZERO, Decimal::ZERO)
    }

    /// Pool seeded with existing reserves (e.g. read from chain by other tooling)
    pub fn with_reserves(
        params: FluxerParams,
        pt_reserves: Decimal,
        target_reserves: Decimal,
        supply: Decimal,
    ) -> Self {
        Self {
            params,
            pt_reserves,
            target_reserves,
            supply,
        }
    }

    pub fn params(&self) -> &FluxerParams {
        &self.params
    }

    pub fn pt_reserves(&self) -> Decimal {
        self.pt_reserves
    }

    pub fn target_reserves(&self) -> Decimal {
        self.target_reserves
    }

    pub fn supply(&self) -> Decimal {
        self.supply
    }

    pub fn scale(&self) -> Decimal {
        self.params.scale
    }

    /// Replace the live scale; `init_scale` and reserves are untouched
    pub fn set_scale(&mut self, scale: Decimal) -> &mut Self {
        self.params.scale = scale;
        self
    }

    /// Invariant exponent `a`
    pub fn exponent(&self) -> Result<Decimal> {
        self.params.exponent()
    }

    /// PT reserves plus LP supply (unissued PTs count as reserve)
    pub fn pt_reserves_eff(&self) -> Result<Decimal> {
        self.pt_reserves
            .checked_add(self.supply)
            .ok_or(SpaceError::Overflow)
    }

    /// Target reserves in Underlying at the initial scale
    pub fn underlying_reserves_eff(&self) -> Result<Decimal> {
        self.target_reserves
            .checked_mul(self.params.init_scale)
            .ok_or(SpaceError::Overflow)
    }

    /// Current curve value `(pt + supply)^a + (target · init_scale)^a`
    pub fn invariant(&self) -> Result<Decimal> {
        let a = self.exponent()?;
        let x = real_pow(self.pt_reserves_eff()?, a).ok_or(SpaceError::Overflow)?;
        let y = real_pow(self.underlying_reserves_eff()?, a).ok_or(SpaceError::Overflow)?;
        x.checked_add(y).ok_or(SpaceError::Overflow)
    }

    /// Create `supply_to_mint` LP shares
    ///
    /// The first mint denominates the new supply in Target at `init_scale`.
    /// Later mints grow both reserves by `supply_to_mint / supply`, which keeps
    /// the curve's PT price unchanged.
    pub fn mint(&mut self, supply_to_mint: Decimal) -> Result<()> {
        if supply_to_mint <= Decimal::ZERO {
            return Err(SpaceError::InvalidAmount("supply to mint", supply_to_mint));
        }

        if self.supply.is_zero() {
            let target = supply_to_mint
                .checked_div(self.params.init_scale)
                .ok_or(SpaceError::Overflow)?;
            self.supply = supply_to_mint;
            self.target_reserves = target;
        } else {
            let ratio = supply_to_mint
                .checked_div(self.supply)
                .ok_or(SpaceError::Overflow)?;
            let pt_add = ratio.checked_mul(self.pt_reserves).ok_or(SpaceError::Overflow)?;
            let target_add = ratio
                .checked_mul(self.target_reserves)
                .ok_or(SpaceError::Overflow)?;

            // Compute everything before writing so a failure leaves the pool intact
            let pt = self.pt_reserves.checked_add(pt_add).ok_or(SpaceError::Overflow)?;
            let target = self
                .target_reserves
                .checked_add(target_add)
                .ok_or(SpaceError::Overflow)?;
            let supply = self.supply.checked_add(supply_to_mint).ok_or(SpaceError::Overflow)?;

            self.pt_reserves = pt;
            self.target_reserves = target;
            self.supply = supply;
        }

        debug!(
            "mint {}: pt={} target={} supply={}",
            supply_to_mint, self.pt_reserves, self.target_reserves, self.supply
        );
        Ok(())
    }

    /// Target received for selling `amount_in` PTs, without moving reserves
    ///
    /// Validates `amount_in >= 0`; see [`Self::price_pts_for_target`] for the math.
    pub fn quote_pts_for_target(&self, amount_in: Decimal) -> Result<Decimal> {
        if amount_in < Decimal::ZERO {
            return Err(SpaceError::InvalidAmount("PT amount in", amount_in));
        }
        if amount_in.is_zero() {
            return Ok(Decimal::ZERO);
        }
        self.price_pts_for_target(amount_in)
    }

    /// Curve evaluation shared by the swap and the borrow solver
    ///
    /// The invariant is anchored at `init_scale`, while the Underlying output
    /// is converted back to Target at the live `scale`. Negative inputs are
    /// priced as-is (the solver probes them).
    pub(crate) fn price_pts_for_target(&self, amount_in: Decimal) -> Result<Decimal> {
        let a = self.exponent()?;
        let out = math::underlying_out(
            self.pt_reserves_eff()?,
            self.underlying_reserves_eff()?,
            amount_in,
            a,
        )?;
        out.checked_div(self.params.scale).ok_or(SpaceError::Overflow)
    }

    /// Sell `amount_in` PTs into the pool and return the Target paid out
    ///
    /// Reserves are only updated when pricing succeeds.
    pub fn swap_pts_for_target(&mut self, amount_in: Decimal) -> Result<Decimal> {
        let target_out = self.quote_pts_for_target(amount_in)?;
        if amount_in.is_zero() {
            return Ok(target_out);
        }

        let target = self
            .target_reserves
            .checked_sub(target_out)
            .ok_or(SpaceError::Overflow)?;
        let pt = self.pt_reserves.checked_add(amount_in).ok_or(SpaceError::Overflow)?;
        self.target_reserves = target;
        self.pt_reserves = pt;

        debug!(
            "swap {} PT -> {} target: pt={} target={}",
            amount_in, target_out, self.pt_reserves, self.target_reserves
        );
        Ok(target_out)
    }

    /// Largest PT sale the curve can price at the current reserves
    pub fn max_pts_in(&self) -> Result<Decimal> {
        math::max_pts_in(
            self.pt_reserves_eff()?,
            self.underlying_reserves_eff()?,
            self.exponent()?,
        )
    }

    /// Marginal Target per PT at zero size: `(under_eff / pt_eff)^(1 - a) / scale`
    pub fn spot_price(&self) -> Result<Decimal> {
        let underlying = math::marginal_price(
            self.pt_reserves_eff()?,
            self.underlying_reserves_eff()?,
            self.exponent()?,
        )?;
        underlying
            .checked_div(self.params.scale)
            .ok_or(SpaceError::Overflow)
    }

    /// Annualized fixed rate implied by the PT's Underlying price
    ///
    /// `(1 / p)^(SECONDS_PER_YEAR / ttm) - 1`, where `p = spot_price · scale`.
    pub fn implied_rate(&self) -> Result<Decimal> {
        if self.params.ttm <= Decimal::ZERO {
            return Err(SpaceError::InvalidAmount("time to maturity", self.params.ttm));
        }
        let p = self
            .spot_price()?
            .checked_mul(self.params.scale)
            .ok_or(SpaceError::Overflow)?;
        let discount = Decimal::ONE.checked_div(p).ok_or(SpaceError::Overflow)?;
        let periods = Decimal::from(SECONDS_PER_YEAR)
            .checked_div(self.params.ttm)
            .ok_or(SpaceError::Overflow)?;
        let growth = real_pow(discount, periods).ok_or(SpaceError::Overflow)?;
        Ok(growth - Decimal::ONE)
    }
}
