//! Derivative-free minimization over `Decimal` (Powell's direction-set method)
//!
//! - Each direction is searched by bracketing a minimum (golden-ratio
//!   expansion with bounded parabolic extrapolation), then refined with
//!   Brent's method.
//! - [`powell_within`] accepts objectives that are only defined on part of
//!   the space. A bracket trial point that lands outside is pulled back toward the
//!   last defined point, and Brent treats undefined points as `Decimal::MAX`.
//! - With more than one coordinate, the direction of largest decrease is
//!   replaced by the net displacement of the iteration when that helps.

use log::{debug, trace, warn};
use rust_decimal::Decimal;

use crate::{Result, SpaceError};

const ZERO: Decimal = Decimal::ZERO;
const ONE: Decimal = Decimal::ONE;
const TWO: Decimal = Decimal::TWO;

/// Golden ratio, used to grow brackets
const GOLD: Decimal = Decimal::from_parts(1_618_034, 0, 0, false, 6);
/// 1 - 1/golden ratio, used for golden-section steps
const CGOLD: Decimal = Decimal::from_parts(2_287_636_606, 889_333_922, 0, false, 19);
/// Max magnification of a parabolic extrapolation step
const GLIMIT: Decimal = Decimal::TEN;
/// Guards divisions and the absolute part of tolerances
const TINY: Decimal = Decimal::from_parts(1, 0, 0, false, 20);

const MAX_EXPANSIONS: usize = 50;
/// Bracket expansion stops past this magnitude
const MAX_ABSCISSA: Decimal = Decimal::from_parts(2_764_472_320, 232_830, 0, false, 0);
const BRENT_ITERATIONS: usize = 100;
/// Halvings toward the last defined point before a trial point gives up
const MAX_PULLBACKS: usize = 64;

/// Tuning for [`powell`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowellOptions {
    /// Relative decrease below which an iteration counts as converged
    pub ftol: Decimal,
    /// Absolute decrease below which an iteration counts as converged
    pub abs_tol: Decimal,
    /// Fractional precision of each line search
    pub line_tol: Decimal,
    /// First trial step along each direction
    pub initial_step: Decimal,
    /// Cap on outer iterations
    pub max_iterations: usize,
}

impl Default for PowellOptions {
    fn default() -> Self {
        Self {
            ftol: Decimal::new(1, 10),
            abs_tol: TINY,
            line_tol: Decimal::new(1, 12),
            initial_step: Decimal::new(1, 2),
            max_iterations: 200,
        }
    }
}

impl PowellOptions {
    /// Same settings with a different first trial step
    pub fn with_initial_step(self, initial_step: Decimal) -> Self {
        Self { initial_step, ..self }
    }
}

/// Result of a minimization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Minimum {
    /// Best point found
    pub point: Vec<Decimal>,
    /// Objective value at `point`
    pub value: Decimal,
    /// Outer iterations used
    pub iterations: usize,
    /// False if `max_iterations` ran out first
    pub converged: bool,
}

/// Minimize `f` starting from `x0`
///
/// `f` is never differentiated; it only needs to be evaluable everywhere the
/// search probes. Use [`powell_within`] when `f` has no value somewhere.
pub fn powell<F>(mut f: F, x0: &[Decimal], opts: &PowellOptions) -> Result<Minimum>
where
    F: FnMut(&[Decimal]) -> Decimal,
{
    powell_within(|x| Some(f(x)), x0, opts)
}

/// Minimize `f` over the region where it returns `Some`
///
/// The region must be an interval along every search line (convex in
/// practice) and `x0` must lie inside it; otherwise
/// `SpaceError::InfeasibleStart` is returned. The returned point is always
/// one where `f` had a value.
pub fn powell_within<F>(mut f: F, x0: &[Decimal], opts: &PowellOptions) -> Result<Minimum>
where
    F: FnMut(&[Decimal]) -> Option<Decimal>,
{
    let n = x0.len();
    if n == 0 {
        return Err(SpaceError::EmptyStartVector);
    }

    let mut dirs: Vec<Vec<Decimal>> = (0..n)
        .map(|i| (0..n).map(|j| if i == j { ONE } else { ZERO }).collect())
        .collect();
    let mut p = x0.to_vec();
    let mut pt = p.clone();
    let mut fret = f(&p[..]).ok_or(SpaceError::InfeasibleStart)?;

    for iter in 1..=opts.max_iterations {
        let fp = fret;
        let mut ibig = 0;
        let mut del = ZERO;

        for (i, dir) in dirs.iter().enumerate() {
            let mut xi = dir.clone();
            let before = fret;
            fret = line_minimize(&mut f, &mut p, fret, &mut xi, opts);
            if before.saturating_sub(fret) > del {
                del = before.saturating_sub(fret);
                ibig = i;
            }
        }

        debug!("powell iter {}: f={} at {:?}", iter, fret, p);

        let threshold = opts
            .ftol
            .saturating_mul(fp.abs().saturating_add(fret.abs()))
            .saturating_add(opts.abs_tol);
        if TWO.saturating_mul(fp.saturating_sub(fret)) <= threshold {
            return Ok(Minimum {
                point: p,
                value: fret,
                iterations: iter,
                converged: true,
            });
        }

        // A single coordinate has no second direction to swap in
        if n > 1 {
            let ptt: Vec<Decimal> = p
                .iter()
                .zip(&pt)
                .map(|(a, b)| TWO.saturating_mul(*a).saturating_sub(*b))
                .collect();
            let mut xit: Vec<Decimal> = p.iter().zip(&pt).map(|(a, b)| a.saturating_sub(*b)).collect();
            pt = p.clone();

            let fptt = f(&ptt[..]).unwrap_or(Decimal::MAX);
            if fptt < fp && should_replace_direction(fp, fret, fptt, del) {
                fret = line_minimize(&mut f, &mut p, fret, &mut xit, opts);
                dirs[ibig] = dirs[n - 1].clone();
                dirs[n - 1] = xit;
            }
        }
    }

    warn!(
        "powell did not converge in {} iterations (f={})",
        opts.max_iterations, fret
    );
    Ok(Minimum {
        point: p,
        value: fret,
        iterations: opts.max_iterations,
        converged: false,
    })
}

/// `2(fp - 2fret + fptt)(fp - fret - del)^2 - del(fp - fptt)^2 < 0`
fn should_replace_direction(fp: Decimal, fret: Decimal, fptt: Decimal, del: Decimal) -> bool {
    let test = || -> Option<bool> {
        let curvature = fp
            .checked_sub(TWO.checked_mul(fret)?)?
            .checked_add(fptt)?
            .checked_mul(TWO)?;
        let gain = fp.checked_sub(fret)?.checked_sub(del)?;
        let lhs = curvature.checked_mul(gain.checked_mul(gain)?)?;
        let spread = fp.checked_sub(fptt)?;
        let rhs = del.checked_mul(spread.checked_mul(spread)?)?;
        Some(lhs.checked_sub(rhs)? < ZERO)
    };
    test().unwrap_or(false)
}

/// Move `p` to the minimum of `f` along `xi`; `xi` becomes the displacement taken
///
/// `fp` is `f(p)`, which must be defined.
fn line_minimize<F>(
    f: &mut F,
    p: &mut [Decimal],
    fp: Decimal,
    xi: &mut [Decimal],
    opts: &PowellOptions,
) -> Decimal
where
    F: FnMut(&[Decimal]) -> Option<Decimal>,
{
    let origin = p.to_vec();
    let dir = xi.to_vec();
    let mut along = |t: Decimal| -> Option<Decimal> {
        let x: Vec<Decimal> = origin
            .iter()
            .zip(&dir)
            .map(|(o, d)| o.saturating_add(t.saturating_mul(*d)))
            .collect();
        f(x.as_slice())
    };

    let bracket = bracket_minimum(&mut along, ZERO, fp, opts.initial_step);
    trace!(
        "bracket [{}, {}, {}] f=[{}, {}, {}]",
        bracket.a, bracket.b, bracket.c, bracket.fa, bracket.fb, bracket.fc
    );
    let (t, fmin) = brent(&mut along, &bracket, opts.line_tol);

    for (x, d) in p.iter_mut().zip(xi.iter_mut()) {
        *d = d.saturating_mul(t);
        *x = x.saturating_add(*d);
    }
    fmin
}

/// Three abscissas with `fb <= fa` and `fb <= fc`, `b` between `a` and `c`
#[derive(Debug, Clone, Copy)]
struct Bracket {
    a: Decimal,
    b: Decimal,
    c: Decimal,
    fa: Decimal,
    fb: Decimal,
    fc: Decimal,
}

fn with_sign(magnitude: Decimal, sign_of: Decimal) -> Decimal {
    if sign_of >= ZERO {
        magnitude.abs()
    } else {
        -magnitude.abs()
    }
}

fn strictly_between(x: Decimal, lo: Decimal, hi: Decimal) -> bool {
    (lo < x && x < hi) || (hi < x && x < lo)
}

/// Walk downhill from `a` through `b` until the function turns up again
///
/// `fa` is `f(a)`. Arithmetic saturates, and expansion stops once the
/// abscissa leaves `±MAX_ABSCISSA`, so runaway objectives return the farthest
/// point tried. Trial points where `f` is undefined are pulled back toward the
/// bracket's leading point, so every returned abscissa has a value.
fn bracket_minimum<F>(f: &mut F, mut a: Decimal, mut fa: Decimal, b: Decimal) -> Bracket
where
    F: FnMut(Decimal) -> Option<Decimal>,
{
    let (mut b, mut fb) = pull_back(f, b, a, fa);
    if fb > fa {
        core::mem::swap(&mut a, &mut b);
        core::mem::swap(&mut fa, &mut fb);
    }
    let (mut c, mut fc) = pull_back(f, golden_step(b, a), b, fb);

    let mut expansions = 0;
    while fb > fc && expansions < MAX_EXPANSIONS && c.abs() < MAX_ABSCISSA {
        expansions += 1;

        // Parabola through (a, fa), (b, fb), (c, fc); vertex at u
        let r = (b - a).saturating_mul(fb.saturating_sub(fc));
        let q = (b - c).saturating_mul(fb.saturating_sub(fa));
        let diff = q.saturating_sub(r);
        let denom = TWO * with_sign(diff.abs().max(TINY), diff);
        let ulim = b.saturating_add(GLIMIT.saturating_mul(c - b));
        let u = (b - c)
            .checked_mul(q)
            .and_then(|t| (b - a).checked_mul(r).and_then(|s| t.checked_sub(s)))
            .and_then(|num| num.checked_div(denom))
            .and_then(|step| b.checked_sub(step))
            .unwrap_or(ulim);

        let (u, fu) = if strictly_between(u, b, c) {
            let (u, fu) = pull_back(f, u, c, fc);
            if fu < fc {
                return Bracket { a: b, b: u, c, fa: fb, fb: fu, fc };
            } else if fu > fb {
                return Bracket { a, b, c: u, fa, fb, fc: fu };
            }
            pull_back(f, golden_step(c, b), c, fc)
        } else if strictly_between(u, c, ulim) {
            let (u, fu) = pull_back(f, u, c, fc);
            if fu < fc {
                b = c;
                c = u;
                fb = fc;
                fc = fu;
                pull_back(f, golden_step(c, b), c, fc)
            } else {
                (u, fu)
            }
        } else if (ulim >= c && u >= ulim) || (ulim <= c && u <= ulim) {
            pull_back(f, ulim, c, fc)
        } else {
            pull_back(f, golden_step(c, b), c, fc)
        };

        a = b;
        b = c;
        c = u;
        fa = fb;
        fb = fc;
        fc = fu;
    }

    if fb > fc {
        warn!("bracket search stopped after {} expansions at {}", expansions, c);
    }
    Bracket { a, b, c, fa, fb, fc }
}

/// Evaluate `f` at `u`, halving the way back to `anchor` while `f` is undefined
///
/// `f(anchor) = f_anchor` must be defined; it is returned if no defined point
/// turns up.
fn pull_back<F>(f: &mut F, mut u: Decimal, anchor: Decimal, f_anchor: Decimal) -> (Decimal, Decimal)
where
    F: FnMut(Decimal) -> Option<Decimal>,
{
    for _ in 0..MAX_PULLBACKS {
        if let Some(fu) = f(u) {
            return (u, fu);
        }
        u = anchor.saturating_add(u.saturating_sub(anchor) / TWO);
    }
    trace!("no defined point between {} and {}", anchor, u);
    (anchor, f_anchor)
}

/// `to + GOLD · (to - from)`, saturating
fn golden_step(to: Decimal, from: Decimal) -> Decimal {
    to.saturating_add(GOLD.saturating_mul(to.saturating_sub(from)))
}

/// Brent's method: golden sections with parabolic interpolation when it behaves
///
/// Undefined points score `Decimal::MAX`, so they only ever shrink the interval.
fn brent<F>(f: &mut F, bracket: &Bracket, tol: Decimal) -> (Decimal, Decimal)
where
    F: FnMut(Decimal) -> Option<Decimal>,
{
    let half = Decimal::new(5, 1);
    let (mut a, mut b) = if bracket.a < bracket.c {
        (bracket.a, bracket.c)
    } else {
        (bracket.c, bracket.a)
    };
    let mut x = bracket.b;
    let mut w = x;
    let mut v = x;
    let mut fx = bracket.fb;
    let mut fw = fx;
    let mut fv = fx;
    let mut d = ZERO;
    let mut e = ZERO;

    for _ in 0..BRENT_ITERATIONS {
        let xm = half * a + half * b;
        let tol1 = tol.saturating_mul(x.abs()).saturating_add(TINY);
        let tol2 = TWO.saturating_mul(tol1);
        let spread = half * b - half * a;
        if x.saturating_sub(xm).abs() <= tol2.saturating_sub(spread) {
            return (x, fx);
        }

        if e.abs() > tol1 {
            let r = x.saturating_sub(w).saturating_mul(fx.saturating_sub(fv));
            let mut q = x.saturating_sub(v).saturating_mul(fx.saturating_sub(fw));
            let mut p = x
                .saturating_sub(v)
                .saturating_mul(q)
                .saturating_sub(x.saturating_sub(w).saturating_mul(r));
            q = TWO.saturating_mul(q.saturating_sub(r));
            if q > ZERO {
                p = -p;
            }
            q = q.abs();
            let etemp = e;
            e = d;
            if p.abs() >= (half * q).saturating_mul(etemp).abs()
                || p <= q.saturating_mul(a.saturating_sub(x))
                || p >= q.saturating_mul(b.saturating_sub(x))
            {
                e = if x >= xm { a.saturating_sub(x) } else { b.saturating_sub(x) };
                d = CGOLD * e;
            } else {
                // q > 0 here: q == 0 always takes the golden branch above
                d = p.checked_div(q).unwrap_or(ZERO);
                let u = x.saturating_add(d);
                if u.saturating_sub(a) < tol2 || b.saturating_sub(u) < tol2 {
                    d = with_sign(tol1, xm.saturating_sub(x));
                }
            }
        } else {
            e = if x >= xm { a.saturating_sub(x) } else { b.saturating_sub(x) };
            d = CGOLD * e;
        }

        let u = if d.abs() >= tol1 {
            x.saturating_add(d)
        } else {
            x.saturating_add(with_sign(tol1, d))
        };
        let fu = f(u).unwrap_or(Decimal::MAX);

        if fu <= fx {
            if u >= x {
                a = x;
            } else {
                b = x;
            }
            v = w;
            w = x;
            x = u;
            fv = fw;
            fw = fx;
            fx = fu;
        } else {
            if u < x {
                a = u;
            } else {
                b = u;
            }
            if fu <= fw || w == x {
                v = w;
                w = u;
                fv = fw;
                fw = fu;
            } else if fu <= fv || v == x || v == w {
                v = u;
                fv = fu;
            }
        }
    }

    warn!("brent line search hit {} iterations at {}", BRENT_ITERATIONS, x);
    (x, fx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn close(a: Decimal, b: Decimal, tol: Decimal) -> bool {
        (a - b).abs() <= tol
    }

    #[test]
    fn test_constants() {
        assert_eq!(GOLD, dec!(1.618034));
        assert!(close(CGOLD, dec!(0.3819660112501051518), dec!(0.0000000000000000001)));
        assert_eq!(TINY, dec!(0.00000000000000000001));
    }

    #[test]
    fn test_quadratic_1d() {
        let f = |x: &[Decimal]| (x[0] - dec!(3)) * (x[0] - dec!(3)) + dec!(2);
        let min = powell(f, &[dec!(0.5)], &PowellOptions::default()).unwrap();

        assert!(min.converged);
        assert!(close(min.point[0], dec!(3), dec!(0.000001)));
        assert!(close(min.value, dec!(2), dec!(0.000000001)));
    }

    #[test]
    fn test_absolute_value_kink() {
        // Same shape as the borrow residual: a V with its tip at zero
        let f = |x: &[Decimal]| (x[0] - dec!(0.2)).abs() * dec!(1000);
        let min = powell(f, &[dec!(0.5)], &PowellOptions::default()).unwrap();

        assert!(close(min.point[0], dec!(0.2), dec!(0.00000001)));
        assert!(min.value < dec!(0.00001));
    }

    #[test]
    fn test_coupled_quadratic_2d() {
        // Minimum at (1, -2)
        let f = |x: &[Decimal]| {
            let dx = x[0] - dec!(1);
            let dy = x[1] + dec!(2);
            dx * dx + dy * dy + dec!(0.5) * dx * dy
        };
        let min = powell(f, &[dec!(0), dec!(0)], &PowellOptions::default()).unwrap();

        assert!(close(min.point[0], dec!(1), dec!(0.00001)));
        assert!(close(min.point[1], dec!(-2), dec!(0.00001)));
    }

    #[test]
    fn test_minimum_far_from_start() {
        let f = |x: &[Decimal]| (x[0] - dec!(250)) * (x[0] - dec!(250));
        let min = powell(f, &[dec!(0.5)], &PowellOptions::default()).unwrap();
        assert!(close(min.point[0], dec!(250), dec!(0.0001)));
    }

    #[test]
    fn test_empty_start_vector() {
        let f = |_: &[Decimal]| ZERO;
        let res = powell(f, &[], &PowellOptions::default());
        assert!(matches!(res, Err(SpaceError::EmptyStartVector)));
    }

    #[test]
    fn test_bracket_contains_minimum() {
        let mut f = |x: Decimal| Some((x + dec!(4)) * (x + dec!(4)));
        let br = bracket_minimum(&mut f, dec!(0), dec!(16), dec!(0.01));
        let (lo, hi) = if br.a < br.c { (br.a, br.c) } else { (br.c, br.a) };
        assert!(lo <= dec!(-4) && dec!(-4) <= hi);
        assert!(br.fb <= br.fa && br.fb <= br.fc);
    }

    #[test]
    fn test_bracket_pulls_back_from_undefined_region() {
        // Defined on [-1, 1] only; the V tip sits close to the edge
        let mut f = |x: Decimal| (x.abs() <= dec!(1)).then(|| (x - dec!(0.9)).abs());
        let br = bracket_minimum(&mut f, dec!(0), dec!(0.9), dec!(0.5));

        for x in [br.a, br.b, br.c] {
            assert!(x.abs() <= dec!(1), "{} left the domain", x);
        }
        let (lo, hi) = if br.a < br.c { (br.a, br.c) } else { (br.c, br.a) };
        assert!(lo <= dec!(0.9) && dec!(0.9) <= hi);
    }

    #[test]
    fn test_kink_near_domain_edge() {
        // |x| kink at 0.2; left of -0.05 the objective has no value, and a
        // tiny first step makes the bracket extrapolate along the left arm
        let f = |x: &[Decimal]| (x[0] > dec!(-0.05)).then(|| (x[0] - dec!(0.2)).abs() * dec!(1000));
        let opts = PowellOptions {
            initial_step: dec!(0.001),
            ..PowellOptions::default()
        };
        let min = powell_within(f, &[dec!(0.5)], &opts).unwrap();

        assert!(min.converged);
        assert!(close(min.point[0], dec!(0.2), dec!(0.00000001)));
    }

    #[test]
    fn test_minimum_on_domain_edge() {
        // Falls toward +inf but is only defined up to 1
        let f = |x: &[Decimal]| (x[0] <= dec!(1)).then(|| -x[0]);
        let min = powell_within(f, &[dec!(0)], &PowellOptions::default()).unwrap();

        assert!(min.point[0] <= dec!(1));
        assert!(close(min.point[0], dec!(1), dec!(0.000001)));
    }

    #[test]
    fn test_undefined_start_is_rejected() {
        let f = |x: &[Decimal]| (x[0] < dec!(0)).then_some(x[0]);
        let res = powell_within(f, &[dec!(0.5)], &PowellOptions::default());
        assert!(matches!(res, Err(SpaceError::InfeasibleStart)));
    }
}
