//! Vector helpers and polynomial root finding for the intersection tests.
//!
//! The event predictors reduce every contact problem to the smallest
//! positive real root of a low-order polynomial `f(t) = separation^2 -
//! contact^2`. Ballistic pairs give quadratics; uniformly accelerated pairs
//! give quartics. Roots below [`EPS_TIME`] are rejected to suppress
//! re-collision chatter at the contact point.

use crate::core::particle::DIM;

/// Numeric floor for event times and geometric checks (reduced units).
pub const EPS_TIME: f64 = 1e-12;

/// Threshold below which a polynomial coefficient is treated as zero.
const EPS_COEFF: f64 = 1e-14;

#[inline]
pub fn dot(a: &[f64; DIM], b: &[f64; DIM]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

#[inline]
pub fn norm_sq(a: &[f64; DIM]) -> f64 {
    dot(a, a)
}

#[inline]
pub fn norm(a: &[f64; DIM]) -> f64 {
    norm_sq(a).sqrt()
}

#[inline]
pub fn sub(a: &[f64; DIM], b: &[f64; DIM]) -> [f64; DIM] {
    let mut out = [0.0; DIM];
    for ((o, &x), &y) in out.iter_mut().zip(a.iter()).zip(b.iter()) {
        *o = x - y;
    }
    out
}

/// `a + s * b`, componentwise.
#[inline]
pub fn add_scaled(a: &[f64; DIM], s: f64, b: &[f64; DIM]) -> [f64; DIM] {
    let mut out = *a;
    for (o, &x) in out.iter_mut().zip(b.iter()) {
        *o += s * x;
    }
    out
}

/// Real roots of `a t^2 + b t + c = 0`, ascending.
///
/// Uses the numerically stable form: the larger-magnitude root is computed
/// from `-(b + sign(b) sqrt(disc)) / 2` and the other from the root product,
/// avoiding cancellation when `b` and the discriminant root share a sign.
/// `|a|` below threshold falls back to the linear root; returns `None` when
/// no real root exists.
pub fn quadratic_roots(a: f64, b: f64, c: f64) -> Option<(f64, f64)> {
    if a.abs() < EPS_COEFF {
        if b.abs() < EPS_COEFF {
            return None;
        }
        let t = -c / b;
        return Some((t, t));
    }
    let disc = b * b - 4.0 * a * c;
    if disc < 0.0 {
        return None;
    }
    let sign = if b >= 0.0 { 1.0 } else { -1.0 };
    let q = -0.5 * (b + sign * disc.sqrt());
    let t1 = q / a;
    let t2 = if q.abs() < EPS_COEFF { t1 } else { c / q };
    Some(if t1 <= t2 { (t1, t2) } else { (t2, t1) })
}

/// Smallest root of `a t^2 + b t + c = 0` strictly above `floor`.
pub fn smallest_positive_quadratic_root(a: f64, b: f64, c: f64, floor: f64) -> Option<f64> {
    let (t1, t2) = quadratic_roots(a, b, c)?;
    if t1 > floor {
        Some(t1)
    } else if t2 > floor {
        Some(t2)
    } else {
        None
    }
}

/// Polynomial in ascending coefficient order: `c[0] + c[1] t + ... + c[4] t^4`.
pub type Quartic = [f64; 5];

#[inline]
fn poly_eval(c: &Quartic, t: f64) -> f64 {
    (((c[4] * t + c[3]) * t + c[2]) * t + c[1]) * t + c[0]
}

#[inline]
fn poly_deriv_eval(c: &Quartic, t: f64) -> f64 {
    ((4.0 * c[4] * t + 3.0 * c[3]) * t + 2.0 * c[2]) * t + c[1]
}

/// Effective degree after trimming near-zero leading coefficients, scaled
/// against the largest coefficient magnitude.
fn effective_degree(c: &Quartic) -> usize {
    let scale = c.iter().fold(0.0_f64, |m, x| m.max(x.abs())).max(1.0);
    for deg in (1..=4).rev() {
        if c[deg].abs() > EPS_COEFF * scale {
            return deg;
        }
    }
    0
}

/// Smallest down-crossing root of the quartic above `floor`: the first
/// `t > floor` where `f` passes from positive to non-positive. This is the
/// contact condition for an approaching pair; sign-flip the coefficients for
/// the inside-out (escape) configuration.
///
/// Brackets the root by scanning, then refines with safeguarded Newton
/// iteration. On convergence failure the root falls back to the companion
/// matrix eigenvalues.
pub fn smallest_positive_quartic_root(c: &Quartic, floor: f64) -> Option<f64> {
    let deg = effective_degree(c);
    if deg <= 1 {
        // Linear: a down-crossing needs a negative slope.
        if c[1] < 0.0 {
            let t = -c[0] / c[1];
            return (t > floor).then_some(t);
        }
        return None;
    }
    if deg == 2 {
        // Degenerate acceleration: the quadratic part decides. With a
        // positive leading coefficient the down-crossing is the lower root;
        // a negative one (sign-flipped inside-out test) crosses down at the
        // upper root.
        let (t1, t2) = quadratic_roots(c[2], c[1], c[0])?;
        let t = if c[2] > 0.0 { t1 } else { t2 };
        return (t > floor).then_some(t);
    }

    // Cauchy bound on the largest root magnitude.
    let lead = c[deg];
    let bound = 1.0 + (0..deg).fold(0.0_f64, |m, i| m.max((c[i] / lead).abs()));

    const STEPS: usize = 1024;
    let dt = (bound - floor) / STEPS as f64;
    if dt <= 0.0 {
        return None;
    }

    let mut t_prev = floor;
    let mut f_prev = poly_eval(c, t_prev);
    // Overlapping start: wait until f is positive before accepting a
    // down-crossing, so a pair sitting at contact does not re-fire.
    let mut seen_positive = f_prev > 0.0;
    for k in 1..=STEPS {
        let t = floor + dt * k as f64;
        let f = poly_eval(c, t);
        if seen_positive && f_prev > 0.0 && f <= 0.0 {
            return refine_root(c, t_prev, t).or_else(|| companion_fallback(c, deg, floor));
        }
        if f > 0.0 {
            seen_positive = true;
        }
        t_prev = t;
        f_prev = f;
    }
    None
}

/// Newton iteration safeguarded by bisection inside a sign-change bracket.
fn refine_root(c: &Quartic, mut lo: f64, mut hi: f64) -> Option<f64> {
    let mut t = 0.5 * (lo + hi);
    for _ in 0..80 {
        let f = poly_eval(c, t);
        if f.abs() < 1e-14 || (hi - lo) < 1e-15 * hi.max(1.0) {
            return Some(t);
        }
        if f > 0.0 {
            lo = t;
        } else {
            hi = t;
        }
        let df = poly_deriv_eval(c, t);
        let newton = if df.abs() > EPS_COEFF { t - f / df } else { f64::NAN };
        t = if newton.is_finite() && newton > lo && newton < hi {
            newton
        } else {
            0.5 * (lo + hi)
        };
    }
    None
}

/// Companion-matrix eigenvalue fallback for cubics and quartics.
fn companion_fallback(c: &Quartic, deg: usize, floor: f64) -> Option<f64> {
    let real_roots: Vec<f64> = match deg {
        4 => {
            let m = nalgebra::Matrix4::new(
                0.0, 0.0, 0.0, -c[0] / c[4],
                1.0, 0.0, 0.0, -c[1] / c[4],
                0.0, 1.0, 0.0, -c[2] / c[4],
                0.0, 0.0, 1.0, -c[3] / c[4],
            );
            m.complex_eigenvalues()
                .iter()
                .filter(|z| z.im.abs() <= 1e-9 * (1.0 + z.re.abs()))
                .map(|z| z.re)
                .collect()
        }
        3 => {
            let m = nalgebra::Matrix3::new(
                0.0, 0.0, -c[0] / c[3],
                1.0, 0.0, -c[1] / c[3],
                0.0, 1.0, -c[2] / c[3],
            );
            m.complex_eigenvalues()
                .iter()
                .filter(|z| z.im.abs() <= 1e-9 * (1.0 + z.re.abs()))
                .map(|z| z.re)
                .collect()
        }
        _ => return None,
    };
    real_roots
        .into_iter()
        .filter(|&t| t > floor)
        .min_by(|a, b| a.total_cmp(b))
}

/// Intersection time of a parabolic trajectory with a sphere of radius `r`.
///
/// `rel_r`, `rel_v`, `rel_a` are the relative position, velocity, and
/// acceleration of the pair. `inside` selects the escape root for a pair
/// currently within the radius (well release); otherwise the approach root
/// (collision/capture). Returns the time until intersection, `None` if the
/// trajectories never meet.
pub fn parabola_sphere(
    rel_r: &[f64; DIM],
    rel_v: &[f64; DIM],
    rel_a: &[f64; DIM],
    r: f64,
    inside: bool,
) -> Option<f64> {
    let mut c: Quartic = [
        norm_sq(rel_r) - r * r,
        2.0 * dot(rel_r, rel_v),
        norm_sq(rel_v) + dot(rel_r, rel_a),
        dot(rel_v, rel_a),
        0.25 * norm_sq(rel_a),
    ];
    if inside {
        for x in &mut c {
            *x = -*x;
        }
    }
    smallest_positive_quartic_root(&c, EPS_TIME)
}
