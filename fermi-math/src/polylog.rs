//! Complete Fermi-Dirac integrals F₂ and F₃.
//!
//! The column density of a harmonically trapped ideal Fermi gas is written in
//! terms of `-Li_s(-e^x)` for `s = 2` and `s = 3`. These are the complete
//! Fermi-Dirac integrals
//!
//! ```text
//! F_s(x) = 1/Γ(s) ∫₀^∞ t^(s-1) / (e^(t-x) + 1) dt = -Li_s(-e^x)
//! ```
//!
//! Both are evaluated with a closed-form piecewise polynomial:
//!
//! - For `x <= 0` the alternating series `Σ (-1)^(k+1) e^(kx) / k^s` is summed
//!   with a fixed-degree Chebyshev-accelerated weighting (Cohen, Rodriguez
//!   Villegas and Zagier), i.e. a polynomial of degree [`SERIES_TERMS`] in `e^x`.
//! - For `x > 0` the polylogarithm inversion identities map the argument back
//!   onto `-x`:
//!   - `F₂(x) = x²/2 + π²/6 - F₂(-x)`
//!   - `F₃(x) = x³/6 + π²x/6 + F₃(-x)`
//!
//! The weighting converges as `(3 + √8)^-n` uniformly over `e^x ∈ (0, 1]`, so
//! the same polynomial is exact to double precision at `x = 0` and for very
//! negative arguments alike. The relative error is well below `1e-12` over
//! `[-25, 25]`, comfortably inside the `1e-7` needed by the profile fits.
//!
//! Non-finite input propagates (NaN in, NaN out) and nothing here panics.

use ndarray::{Array1, ArrayView1};
use std::f64::consts::PI;
use std::sync::OnceLock;

/// Degree of the accelerated polynomial in `e^x`.
pub const SERIES_TERMS: usize = 30;

/// Signed acceleration weights `c_k / d` for [`SERIES_TERMS`] terms.
fn acceleration_weights() -> &'static [f64; SERIES_TERMS] {
    static WEIGHTS: OnceLock<[f64; SERIES_TERMS]> = OnceLock::new();
    WEIGHTS.get_or_init(|| {
        let n = SERIES_TERMS as f64;
        let mut d = (3.0 + 8.0_f64.sqrt()).powf(n);
        d = (d + 1.0 / d) / 2.0;

        let mut weights = [0.0; SERIES_TERMS];
        let mut b = -1.0;
        let mut c = -d;
        for (k, weight) in weights.iter_mut().enumerate() {
            let kf = k as f64;
            c = b - c;
            *weight = c / d;
            b = (kf + n) * (kf - n) * b / ((kf + 0.5) * (kf + 1.0));
        }
        weights
    })
}

/// `-Li_s(-y)` for `y ∈ [0, 1]` and integer order `s`.
fn alternating_polylog(y: f64, order: i32) -> f64 {
    let weights = acceleration_weights();
    let mut power = y;
    let mut sum = 0.0;
    for (k, weight) in weights.iter().enumerate() {
        let denom = ((k + 1) as f64).powi(order);
        sum += weight * power / denom;
        power *= y;
    }
    sum
}

/// Complete Fermi-Dirac integral `-Li₂(-e^x)`.
///
/// # Examples
///
/// ```
/// use fermi_math::polylog::fermi_poly2;
///
/// let at_zero = fermi_poly2(0.0);
/// assert!((at_zero - std::f64::consts::PI.powi(2) / 12.0).abs() < 1e-14);
/// ```
pub fn fermi_poly2(x: f64) -> f64 {
    if x.is_nan() {
        return f64::NAN;
    }
    if x <= 0.0 {
        alternating_polylog(x.exp(), 2)
    } else {
        x * x / 2.0 + PI * PI / 6.0 - alternating_polylog((-x).exp(), 2)
    }
}

/// Complete Fermi-Dirac integral `-Li₃(-e^x)`.
pub fn fermi_poly3(x: f64) -> f64 {
    if x.is_nan() {
        return f64::NAN;
    }
    if x <= 0.0 {
        alternating_polylog(x.exp(), 3)
    } else {
        x * x * x / 6.0 + PI * PI * x / 6.0 + alternating_polylog((-x).exp(), 3)
    }
}

/// Element-wise [`fermi_poly2`].
pub fn fermi_poly2_array(xs: ArrayView1<f64>) -> Array1<f64> {
    xs.mapv(fermi_poly2)
}

/// Element-wise [`fermi_poly3`].
pub fn fermi_poly3_array(xs: ArrayView1<f64>) -> Array1<f64> {
    xs.mapv(fermi_poly3)
}
