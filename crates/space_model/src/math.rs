//! Constant-power-sum curve math (x^a + y^a = k)

use rust_decimal::{Decimal, MathematicalOps};

use crate::{Result, SpaceError};

/// `base^exp` for a non-negative base and a real exponent.
///
/// Returns `None` for a negative base (no real result) or when the
/// intermediate `exp(exp · ln(base))` overflows.
pub fn real_pow(base: Decimal, exp: Decimal) -> Option<Decimal> {
    if base < Decimal::ZERO {
        return None;
    }
    if base.is_zero() {
        return Some(Decimal::ZERO);
    }
    base.checked_powd(exp)
}

/// Invariant exponent `a = 1 - g2 · ts · ttm`
///
/// `a` tends to 1 at maturity (linear curve) and shrinks toward 0 far from
/// maturity (constant-product-like curve).
pub fn exponent(g2: Decimal, ts: Decimal, ttm: Decimal) -> Result<Decimal> {
    let t = ts.checked_mul(ttm).ok_or(SpaceError::Overflow)?;
    let g2t = g2.checked_mul(t).ok_or(SpaceError::Overflow)?;
    Decimal::ONE.checked_sub(g2t).ok_or(SpaceError::Overflow)
}

/// Underlying released by the curve when `amount_in` PTs are added
///
/// - x1 = pt_eff^a, y1 = under_eff^a
/// - x2 = (pt_eff + amount_in)^a
/// - y_post = (x1 + y1 - x2)^(1/a)
/// - out = under_eff - y_post
///
/// # Arguments
/// * `pt_eff` - PT reserves including the LP supply
/// * `under_eff` - Target reserves converted to Underlying at the initial scale
/// * `amount_in` - PTs sold into the pool
/// * `a` - invariant exponent
///
/// # Returns
/// * Underlying-denominated output
/// * `SpaceError::CurveExceeded` if `amount_in` moves past the curve's bound
pub fn underlying_out(
    pt_eff: Decimal,
    under_eff: Decimal,
    amount_in: Decimal,
    a: Decimal,
) -> Result<Decimal> {
    if a <= Decimal::ZERO {
        return Err(SpaceError::InvalidExponent(a));
    }
    if pt_eff < Decimal::ZERO || under_eff < Decimal::ZERO {
        return Err(SpaceError::EmptyPool);
    }

    let exceeded = SpaceError::CurveExceeded { amount_in };

    let pt_post = pt_eff.checked_add(amount_in).ok_or(SpaceError::Overflow)?;
    if pt_post < Decimal::ZERO {
        return Err(exceeded);
    }

    let x1 = real_pow(pt_eff, a).ok_or(SpaceError::Overflow)?;
    let y1 = real_pow(under_eff, a).ok_or(SpaceError::Overflow)?;
    let x2 = real_pow(pt_post, a).ok_or(SpaceError::Overflow)?;

    // x1 + y1 - x2 < 0 has no real (1/a)-th root
    let remaining = x1
        .checked_add(y1)
        .and_then(|k| k.checked_sub(x2))
        .ok_or(SpaceError::Overflow)?;
    if remaining < Decimal::ZERO {
        return Err(exceeded);
    }

    let inv_a = Decimal::ONE.checked_div(a).ok_or(SpaceError::Overflow)?;
    let y_post = real_pow(remaining, inv_a).ok_or(SpaceError::Overflow)?;
    let out = under_eff.checked_sub(y_post).ok_or(SpaceError::Overflow)?;

    // The curve is convex, so no sale beats the marginal price. Rounding in
    // `y_post` can break that on large reserves.
    if amount_in > Decimal::ZERO && pt_eff > Decimal::ZERO && under_eff > Decimal::ZERO {
        let cap = marginal_price(pt_eff, under_eff, a)?
            .checked_mul(amount_in)
            .ok_or(SpaceError::Overflow)?;
        return Ok(out.min(cap));
    }
    Ok(out)
}

/// Largest PT input the curve can absorb: `(x1 + y1)^(1/a) - pt_eff`
pub fn max_pts_in(pt_eff: Decimal, under_eff: Decimal, a: Decimal) -> Result<Decimal> {
    if a <= Decimal::ZERO {
        return Err(SpaceError::InvalidExponent(a));
    }
    let x1 = real_pow(pt_eff, a).ok_or(SpaceError::EmptyPool)?;
    let y1 = real_pow(under_eff, a).ok_or(SpaceError::EmptyPool)?;
    let k = x1.checked_add(y1).ok_or(SpaceError::Overflow)?;
    let inv_a = Decimal::ONE.checked_div(a).ok_or(SpaceError::Overflow)?;
    let pt_max = real_pow(k, inv_a).ok_or(SpaceError::Overflow)?;
    pt_max.checked_sub(pt_eff).ok_or(SpaceError::Overflow)
}

/// Marginal Underlying per PT at zero trade size: `(under_eff / pt_eff)^(1 - a)`
pub fn marginal_price(pt_eff: Decimal, under_eff: Decimal, a: Decimal) -> Result<Decimal> {
    if pt_eff <= Decimal::ZERO || under_eff <= Decimal::ZERO {
        return Err(SpaceError::EmptyPool);
    }
    let ratio = under_eff.checked_div(pt_eff).ok_or(SpaceError::Overflow)?;
    real_pow(ratio, Decimal::ONE - a).ok_or(SpaceError::Overflow)
}

/// Decimal exponent of `x` in scientific notation, i.e. `floor(log10(x))`
///
/// 0.005 -> -3, 1 -> 0, 250 -> 2. Computed from the mantissa digit count, so
/// it is exact.
pub fn decimal_exponent(x: Decimal) -> Result<i32> {
    if x <= Decimal::ZERO {
        return Err(SpaceError::InvalidAmount("magnitude", x));
    }
    let mut mantissa = x.mantissa().unsigned_abs();
    let mut digits: i32 = 0;
    while mantissa > 0 {
        mantissa /= 10;
        digits += 1;
    }
    Ok(digits - 1 - x.scale() as i32)
}

/// `10^n` for a possibly negative `n`
pub fn pow10(n: i32) -> Result<Decimal> {
    Decimal::TEN
        .checked_powi(n as i64)
        .ok_or(SpaceError::Overflow)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn close(a: Decimal, b: Decimal, tol: Decimal) -> bool {
        (a - b).abs() <= tol
    }

    // a for the one-year reference pool: 1 - (1000/950) / 12
    fn reference_a() -> Decimal {
        let ttm = Decimal::from(crate::SECONDS_PER_YEAR);
        let ts = Decimal::ONE / (ttm * dec!(12));
        let g2 = dec!(1000) / dec!(950);
        exponent(g2, ts, ttm).unwrap()
    }

    #[test]
    fn test_exponent_reference_regime() {
        let a = reference_a();
        assert!(close(a, dec!(0.9122807017543859649), dec!(0.000000000001)));
    }

    #[test]
    fn test_exponent_at_maturity_is_one() {
        let a = exponent(dec!(1.05), dec!(0.000001), Decimal::ZERO).unwrap();
        assert_eq!(a, Decimal::ONE);
    }

    #[test]
    fn test_underlying_out_reference_swap() {
        // Fresh pool after mint(1): pt_eff = 1, under_eff = 1, sell 0.5 PT
        let out = underlying_out(dec!(1), dec!(1), dec!(0.5), reference_a()).unwrap();
        assert!(close(out, dec!(0.47822697767208), dec!(0.0000000001)));
    }

    #[test]
    fn test_underlying_out_curve_exceeded() {
        // Bound for pt=1.5, under=0.52177 is ~0.6378 PTs
        let a = reference_a();
        let under = dec!(0.5217730223279197978);
        assert!(underlying_out(dec!(1.5), under, dec!(0.6), a).is_ok());
        let res = underlying_out(dec!(1.5), under, dec!(0.7), a);
        assert!(matches!(res, Err(SpaceError::CurveExceeded { .. })));
    }

    #[test]
    fn test_underlying_out_rejects_non_positive_exponent() {
        let res = underlying_out(dec!(1), dec!(1), dec!(0.1), Decimal::ZERO);
        assert!(matches!(res, Err(SpaceError::InvalidExponent(_))));
    }

    #[test]
    fn test_max_pts_in_matches_bound() {
        let a = reference_a();
        let under = dec!(0.5217730223279197978);
        let bound = max_pts_in(dec!(1.5), under, a).unwrap();
        assert!(close(bound, dec!(0.6378399453025), dec!(0.000000001)));
    }

    #[test]
    fn test_marginal_price_balanced_pool_is_one() {
        let price = marginal_price(dec!(2), dec!(2), reference_a()).unwrap();
        assert!(close(price, Decimal::ONE, dec!(0.000000000001)));
    }

    #[test]
    fn test_real_pow_negative_base() {
        assert_eq!(real_pow(dec!(-0.5), dec!(1.1)), None);
        assert_eq!(real_pow(Decimal::ZERO, dec!(0.9)), Some(Decimal::ZERO));
    }

    #[test]
    fn test_decimal_exponent() {
        assert_eq!(decimal_exponent(dec!(0.005)).unwrap(), -3);
        assert_eq!(decimal_exponent(dec!(0.0050)).unwrap(), -3);
        assert_eq!(decimal_exponent(dec!(1)).unwrap(), 0);
        assert_eq!(decimal_exponent(dec!(9.99)).unwrap(), 0);
        assert_eq!(decimal_exponent(dec!(250)).unwrap(), 2);
        assert!(decimal_exponent(Decimal::ZERO).is_err());
    }

    #[test]
    fn test_pow10() {
        assert_eq!(pow10(3).unwrap(), dec!(1000));
        assert_eq!(pow10(0).unwrap(), Decimal::ONE);
        assert_eq!(pow10(-2).unwrap(), dec!(0.01));
    }
}
