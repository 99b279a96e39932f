//! Leveraged YT purchase via flash-issuance
//!
//! The user brings `initial_target`; the pool lends `target_to_borrow` more.
//! Both are issued into PT+YT at the live scale (net of the issuance fee),
//! the fresh PTs are sold into the pool, and the sale must repay the loan
//! plus `optimal_target_returned`. The break-even borrow is found with
//! [`powell_within`] on the absolute residual, restricted to borrows the
//! curve can price.
//!
//! The residual `sale(b) - optimal - b` is concave in `b`. When the sale of
//! the user's own Target already covers `optimal_target_returned`, it is
//! positive at `b = 0` and has at most one root above zero, so the search is
//! floored at zero. Otherwise negative borrows stay in range and a negative
//! minimum reports the purchase as infeasible.

use log::{debug, info, warn};
use rust_decimal::Decimal;

use crate::math::{decimal_exponent, pow10};
use crate::optimize::{powell_within, PowellOptions};
use crate::pool::SpaceFluxer;
use crate::{Result, SpaceError};

/// Default starting guess for the borrow amount
pub const DEFAULT_BORROW_GUESS: Decimal = Decimal::from_parts(5, 0, 0, false, 1);

/// Quote for buying YTs with flash-borrowed Target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YtPurchase {
    /// Target the user contributes
    pub initial_target: Decimal,
    /// Target borrowed for issuance
    pub target_to_borrow: Decimal,
    /// PTs (and YTs) issued from `initial_target + target_to_borrow`
    pub pts_issued: Decimal,
    /// Target received for selling the issued PTs
    pub target_from_sale: Decimal,
    /// Target left after repaying the loan
    pub target_returned: Decimal,
    /// Magnified |sale - returned - borrowed| at the solution; ~0 at break-even
    pub residual: Decimal,
}

impl YtPurchase {
    /// YTs received equal the PTs issued
    pub fn yts_received(&self) -> Decimal {
        self.pts_issued
    }

    /// Net Target paid per YT
    pub fn cost_per_yt(&self) -> Option<Decimal> {
        (self.initial_target - self.target_returned).checked_div(self.pts_issued)
    }

    /// True when the sale covers the loan within `tol` (in magnified residual units)
    pub fn is_break_even(&self, tol: Decimal) -> bool {
        self.residual <= tol
    }
}

/// Residual of the borrow equation for one pool snapshot
struct BorrowObjective<'a> {
    pool: &'a SpaceFluxer,
    initial_target: Decimal,
    optimal_target_returned: Decimal,
    /// 10^-floor(log10(initial_target)); keeps tolerances scale-free
    magnifier: Decimal,
}

impl<'a> BorrowObjective<'a> {
    fn new(
        pool: &'a SpaceFluxer,
        initial_target: Decimal,
        optimal_target_returned: Decimal,
    ) -> Result<Self> {
        if initial_target <= Decimal::ZERO {
            return Err(SpaceError::InvalidAmount("initial target", initial_target));
        }
        let a = pool.exponent()?;
        if a <= Decimal::ZERO {
            return Err(SpaceError::InvalidExponent(a));
        }
        if pool.pt_reserves_eff()?.is_zero() || pool.underlying_reserves_eff()?.is_zero() {
            return Err(SpaceError::EmptyPool);
        }
        let magnifier = pow10(-decimal_exponent(initial_target)?)?;
        Ok(Self {
            pool,
            initial_target,
            optimal_target_returned,
            magnifier,
        })
    }

    /// `(initial + borrow) · (1 - ifee) · scale`
    fn pts_issued(&self, target_to_borrow: Decimal) -> Option<Decimal> {
        let params = self.pool.params();
        self.initial_target
            .checked_add(target_to_borrow)?
            .checked_mul(Decimal::ONE.checked_sub(params.ifee)?)?
            .checked_mul(params.scale)
    }

    /// Target from selling the issued PTs, `None` past the curve's bound
    fn target_from_sale(&self, target_to_borrow: Decimal) -> Option<Decimal> {
        let pts = self.pts_issued(target_to_borrow)?;
        self.pool.price_pts_for_target(pts).ok()
    }

    /// Magnified `|sale - optimal - borrow|`, `None` where the sale is unpriceable
    fn value(&self, target_to_borrow: Decimal) -> Option<Decimal> {
        self.target_from_sale(target_to_borrow)?
            .checked_sub(self.optimal_target_returned)?
            .checked_sub(target_to_borrow)?
            .abs()
            .checked_mul(self.magnifier)
    }

    /// Unpriceable candidates score as the candidate itself, which pulls the
    /// search toward smaller borrows.
    fn eval(&self, target_to_borrow: Decimal) -> Decimal {
        self.value(target_to_borrow).unwrap_or(target_to_borrow)
    }

    /// Borrows the search may visit, `(floor, ceiling)`
    ///
    /// The ceiling issues exactly `max_pts_in` PTs. The floor is zero when the
    /// sale of `initial_target` alone covers the desired return, else the
    /// borrow that would drain every effective PT.
    fn search_range(&self) -> Result<(Decimal, Decimal)> {
        let params = self.pool.params();
        let per_target = Decimal::ONE
            .checked_sub(params.ifee)
            .and_then(|net| net.checked_mul(params.scale))
            .ok_or(SpaceError::Overflow)?;
        if per_target <= Decimal::ZERO {
            return Err(SpaceError::InvalidAmount("PTs issued per Target", per_target));
        }

        let ceiling = self
            .pool
            .max_pts_in()?
            .checked_div(per_target)
            .and_then(|t| t.checked_sub(self.initial_target))
            .ok_or(SpaceError::Overflow)?;

        let own_sale_covers = self
            .target_from_sale(Decimal::ZERO)
            .is_some_and(|out| out > self.optimal_target_returned);
        if own_sale_covers {
            return Ok((Decimal::ZERO, ceiling));
        }

        let floor = self
            .pool
            .pt_reserves_eff()?
            .checked_div(per_target)
            .and_then(|t| (-t).checked_sub(self.initial_target))
            .ok_or(SpaceError::Overflow)?;
        Ok((floor, ceiling))
    }
}

/// `guess` when it lies inside `(floor, ceiling)`, else the middle of the
/// non-negative part of the range (or of the whole range when that is empty)
fn clamp_guess(guess: Decimal, floor: Decimal, ceiling: Decimal) -> Decimal {
    if floor < guess && guess < ceiling {
        return guess;
    }
    let low = floor.max(Decimal::ZERO);
    let low = if ceiling > low { low } else { floor };
    (low + ceiling) / Decimal::TWO
}

impl SpaceFluxer {
    /// Objective minimized by [`Self::target_to_borrow`], evaluated at one candidate
    pub fn borrow_residual(
        &self,
        initial_target: Decimal,
        optimal_target_returned: Decimal,
        target_to_borrow: Decimal,
    ) -> Result<Decimal> {
        let objective = BorrowObjective::new(self, initial_target, optimal_target_returned)?;
        Ok(objective.eval(target_to_borrow))
    }

    /// Target to borrow so the PT sale repays the loan and returns
    /// `optimal_target_returned`
    ///
    /// Runs one Powell minimization from `initial_vector` (usually
    /// `[DEFAULT_BORROW_GUESS]`), with the first trial step set to
    /// `initial_target` so the search scales with the trade. A guess the
    /// curve cannot price is moved into the priceable range first. Returns
    /// `Ok(None)` when the minimizer lands on a negative borrow, i.e. the
    /// purchase is infeasible at these reserves. The pool is not mutated.
    pub fn target_to_borrow(
        &self,
        initial_target: Decimal,
        optimal_target_returned: Decimal,
        initial_vector: &[Decimal],
    ) -> Result<Option<Decimal>> {
        self.target_to_borrow_with(
            initial_target,
            optimal_target_returned,
            initial_vector,
            &PowellOptions::default().with_initial_step(initial_target),
        )
    }

    /// [`Self::target_to_borrow`] with explicit minimizer settings
    pub fn target_to_borrow_with(
        &self,
        initial_target: Decimal,
        optimal_target_returned: Decimal,
        initial_vector: &[Decimal],
        opts: &PowellOptions,
    ) -> Result<Option<Decimal>> {
        let objective = BorrowObjective::new(self, initial_target, optimal_target_returned)?;
        let Some(guess) = initial_vector.first() else {
            return Err(SpaceError::EmptyStartVector);
        };
        let (floor, ceiling) = objective.search_range()?;
        let mut start = initial_vector.to_vec();
        start[0] = clamp_guess(*guess, floor, ceiling);
        if start[0] != *guess {
            debug!("borrow guess {} moved to {} (range [{}, {}])", guess, start[0], floor, ceiling);
        }

        let search = |x: &[Decimal]| {
            if x[0] < floor {
                return None;
            }
            objective.value(x[0])
        };
        let min = match powell_within(search, &start, opts) {
            Err(SpaceError::InfeasibleStart) => {
                info!("no priceable borrow for initial target {}", initial_target);
                return Ok(None);
            }
            res => res?,
        };

        let borrow = min.point[0];
        debug!(
            "borrow solve: initial={} optimal_return={} -> borrow={} residual={} iterations={}",
            initial_target, optimal_target_returned, borrow, min.value, min.iterations
        );

        if borrow < Decimal::ZERO {
            info!("no feasible borrow for initial target {}", initial_target);
            return Ok(None);
        }
        Ok(Some(borrow))
    }

    /// Full breakdown of a leveraged YT purchase, `None` when infeasible
    pub fn quote_yt_purchase(
        &self,
        initial_target: Decimal,
        optimal_target_returned: Decimal,
    ) -> Result<Option<YtPurchase>> {
        self.quote_yt_purchase_from(initial_target, optimal_target_returned, DEFAULT_BORROW_GUESS)
    }

    /// [`Self::quote_yt_purchase`] starting the search at `guess`
    pub fn quote_yt_purchase_from(
        &self,
        initial_target: Decimal,
        optimal_target_returned: Decimal,
        guess: Decimal,
    ) -> Result<Option<YtPurchase>> {
        let Some(target_to_borrow) =
            self.target_to_borrow(initial_target, optimal_target_returned, &[guess])?
        else {
            return Ok(None);
        };

        let objective = BorrowObjective::new(self, initial_target, optimal_target_returned)?;
        let pts_issued = objective.pts_issued(target_to_borrow).ok_or(SpaceError::Overflow)?;
        // The minimizer can stall on the curve's bound, where the sale is unpriceable
        let target_from_sale = match self.price_pts_for_target(pts_issued) {
            Err(SpaceError::CurveExceeded { amount_in }) => {
                warn!(
                    "borrow {} stalled at the curve bound ({} PTs); no executable purchase",
                    target_to_borrow, amount_in
                );
                return Ok(None);
            }
            res => res?,
        };
        let target_returned = target_from_sale
            .checked_sub(target_to_borrow)
            .ok_or(SpaceError::Overflow)?;

        Ok(Some(YtPurchase {
            initial_target,
            target_to_borrow,
            pts_issued,
            target_from_sale,
            target_returned,
            residual: objective.eval(target_to_borrow),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::FluxerParams;
    use rust_decimal_macros::dec;

    fn close(a: Decimal, b: Decimal, tol: Decimal) -> bool {
        (a - b).abs() <= tol
    }

    // mint(1) then sell 0.5 PT
    fn reference_pool(params: FluxerParams) -> SpaceFluxer {
        let mut pool = SpaceFluxer::new(params);
        pool.mint(dec!(1)).unwrap();
        pool.swap_pts_for_target(dec!(0.5)).unwrap();
        pool
    }

    #[test]
    fn test_default_guess() {
        assert_eq!(DEFAULT_BORROW_GUESS, dec!(0.5));
    }

    #[test]
    fn test_reference_borrow() {
        let pool = reference_pool(FluxerParams::reference());
        let borrow = pool
            .target_to_borrow(dec!(0.005), Decimal::ZERO, &[DEFAULT_BORROW_GUESS])
            .unwrap()
            .expect("feasible");

        assert!(close(borrow, dec!(0.0483679477504747), dec!(0.00000001)));
        let residual = pool.borrow_residual(dec!(0.005), Decimal::ZERO, borrow).unwrap();
        assert!(residual < dec!(0.000001));
    }

    fn pool_after_sale(size: Decimal, sold: Decimal) -> SpaceFluxer {
        let mut pool = SpaceFluxer::new(FluxerParams::reference());
        pool.mint(size).unwrap();
        pool.swap_pts_for_target(sold).unwrap();
        pool
    }

    #[test]
    fn test_default_guess_finds_root_after_any_sale() {
        // Pools near par leave little room below the default guess
        for (sold, expected) in [
            (dec!(0), dec!(0.2352651836)),
            (dec!(0.1), dec!(0.1553883781)),
            (dec!(0.2), dec!(0.1077616314)),
        ] {
            let pool = pool_after_sale(dec!(1), sold);
            let borrow = pool
                .target_to_borrow(dec!(0.005), Decimal::ZERO, &[DEFAULT_BORROW_GUESS])
                .unwrap()
                .unwrap_or_else(|| panic!("no borrow after selling {}", sold));

            assert!(close(borrow, expected, dec!(0.000001)), "sold {}: {}", sold, borrow);
            let residual = pool.borrow_residual(dec!(0.005), Decimal::ZERO, borrow).unwrap();
            assert!(residual < dec!(0.000001), "sold {}: residual {}", sold, residual);
        }
    }

    #[test]
    fn test_borrow_scales_with_pool_size() {
        // The reference trade shrunk 1000x borrows 1000x less
        let pool = pool_after_sale(dec!(0.001), dec!(0.0005));
        let borrow = pool
            .target_to_borrow(dec!(0.000005), Decimal::ZERO, &[DEFAULT_BORROW_GUESS])
            .unwrap()
            .expect("feasible");

        assert!(close(borrow, dec!(0.0000483679477505), dec!(0.000000000001)));
        let residual = pool.borrow_residual(dec!(0.000005), Decimal::ZERO, borrow).unwrap();
        assert!(residual < dec!(0.000001));
    }

    #[test]
    fn test_unpriceable_guess_is_moved_into_range() {
        let pool = reference_pool(FluxerParams::reference());
        for guess in [dec!(5), dec!(-1)] {
            let borrow = pool
                .target_to_borrow(dec!(0.005), Decimal::ZERO, &[guess])
                .unwrap()
                .expect("feasible");
            assert!(close(borrow, dec!(0.0483679477504747), dec!(0.00000001)), "guess {}", guess);
        }
    }

    #[test]
    fn test_return_above_own_sale_is_infeasible() {
        // Selling 0.005 PT fetches less than 0.01 Target, so only a negative borrow balances
        let pool = reference_pool(FluxerParams::reference());
        let res = pool
            .target_to_borrow(dec!(0.005), dec!(0.01), &[DEFAULT_BORROW_GUESS])
            .unwrap();
        assert_eq!(res, None);
    }

    #[test]
    fn test_clamp_guess() {
        assert_eq!(clamp_guess(dec!(0.5), dec!(0), dec!(1)), dec!(0.5));
        assert_eq!(clamp_guess(dec!(2), dec!(0), dec!(1)), dec!(0.5));
        assert_eq!(clamp_guess(dec!(-3), dec!(-2), dec!(1)), dec!(0.5));
        // Nothing priceable above zero
        assert_eq!(clamp_guess(dec!(0.5), dec!(-4), dec!(-2)), dec!(-3));
    }

    #[test]
    fn test_borrow_does_not_mutate_pool() {
        let pool = reference_pool(FluxerParams::reference());
        let before = pool.clone();
        pool.target_to_borrow(dec!(0.005), Decimal::ZERO, &[dec!(0.5)]).unwrap();
        assert_eq!(pool, before);
    }

    #[test]
    fn test_borrow_with_fee_and_scale() {
        // Same reserves, repriced after the scale moved
        let seeded = reference_pool(FluxerParams::reference());
        let params = FluxerParams {
            ifee: dec!(0.01),
            scale: dec!(1.1),
            ..FluxerParams::reference()
        };
        let pool = SpaceFluxer::with_reserves(
            params,
            seeded.pt_reserves(),
            seeded.target_reserves(),
            seeded.supply(),
        );
        let borrow = pool
            .target_to_borrow(dec!(0.005), Decimal::ZERO, &[dec!(0.5)])
            .unwrap()
            .expect("feasible");
        assert!(close(borrow, dec!(0.0436773754), dec!(0.0000001)));
    }

    #[test]
    fn test_borrow_with_desired_return() {
        let pool = reference_pool(FluxerParams::reference());
        let borrow = pool
            .target_to_borrow(dec!(0.005), dec!(0.0001), &[dec!(0.5)])
            .unwrap()
            .expect("feasible");
        // Keeping some Target back means borrowing less
        assert!(close(borrow, dec!(0.0473566288), dec!(0.0000001)));
    }

    #[test]
    fn test_infeasible_borrow_is_none() {
        // 1000 Target of PTs cannot be sold into a pool holding ~0.5 Target
        let pool = reference_pool(FluxerParams::reference());
        let res = pool
            .target_to_borrow(dec!(1000), Decimal::ZERO, &[dec!(0.5)])
            .unwrap();
        assert_eq!(res, None);
    }

    #[test]
    fn test_residual_falls_back_to_candidate_past_bound() {
        let pool = reference_pool(FluxerParams::reference());
        // 0.005 + 0.9 PTs is past the ~0.638 bound
        let residual = pool.borrow_residual(dec!(0.005), Decimal::ZERO, dec!(0.9)).unwrap();
        assert_eq!(residual, dec!(0.9));
    }

    #[test]
    fn test_residual_is_magnified() {
        let pool = reference_pool(FluxerParams::reference());
        let small = pool.borrow_residual(dec!(0.005), Decimal::ZERO, Decimal::ZERO).unwrap();
        let sale = pool.quote_pts_for_target(dec!(0.005)).unwrap();
        // initial 0.005 -> exponent -3 -> x1000
        assert_eq!(small, sale * dec!(1000));
    }

    #[test]
    fn test_invalid_inputs() {
        let pool = reference_pool(FluxerParams::reference());
        assert!(matches!(
            pool.target_to_borrow(Decimal::ZERO, Decimal::ZERO, &[dec!(0.5)]),
            Err(SpaceError::InvalidAmount(..))
        ));
        assert!(matches!(
            pool.target_to_borrow(dec!(0.005), Decimal::ZERO, &[]),
            Err(SpaceError::EmptyStartVector)
        ));

        let empty = SpaceFluxer::new(FluxerParams::reference());
        assert!(matches!(
            empty.target_to_borrow(dec!(0.005), Decimal::ZERO, &[dec!(0.5)]),
            Err(SpaceError::EmptyPool)
        ));
    }

    #[test]
    fn test_quote_yt_purchase_breakdown() {
        let pool = reference_pool(FluxerParams::reference());
        let quote = pool
            .quote_yt_purchase(dec!(0.005), Decimal::ZERO)
            .unwrap()
            .expect("feasible");

        assert_eq!(quote.pts_issued, quote.initial_target + quote.target_to_borrow);
        assert_eq!(quote.yts_received(), quote.pts_issued);
        assert!(close(quote.target_from_sale, quote.target_to_borrow, dec!(0.000000001)));
        assert!(quote.target_returned.abs() < dec!(0.000000001));
        assert!(quote.is_break_even(dec!(0.000001)));

        // ~0.053 YTs for 0.005 Target
        let cost = quote.cost_per_yt().unwrap();
        assert!(close(cost, dec!(0.005) / dec!(0.0533679477504747), dec!(0.000001)));
    }

    #[test]
    fn test_quote_stops_at_curve_bound() {
        // 0.3 Target plus any loan sells for more than the loan, up to the bound
        let pool = reference_pool(FluxerParams::reference());
        let quote = pool
            .quote_yt_purchase(dec!(0.3), Decimal::ZERO)
            .unwrap()
            .expect("priceable");

        assert!(quote.pts_issued <= pool.max_pts_in().unwrap() + dec!(0.000000001));
        assert!(quote.target_returned > Decimal::ZERO);
        assert!(!quote.is_break_even(dec!(0.000001)));
    }
}
