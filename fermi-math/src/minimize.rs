//! Bounded scalar minimization.
//!
//! Brent's method on a closed interval: golden-section steps with parabolic
//! interpolation whenever the parabola is well conditioned. The stopping rule
//! and step bookkeeping follow the classic `fminbound` formulation, so the
//! returned abscissa is within `x_tol` of a local minimum (or of a bound).

use log::{debug, warn};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Errors from the bounded minimizer.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MinimizeError {
    #[error("invalid bounds [{lower}, {upper}]")]
    InvalidBounds { lower: f64, upper: f64 },
    #[error("objective is NaN at x={x}")]
    NanObjective { x: f64 },
}

/// Options for [`minimize_bounded`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MinimizeOptions {
    /// Absolute tolerance on the abscissa
    pub x_tol: f64,
    /// Maximum objective evaluations
    pub max_evaluations: usize,
    /// Wall-clock limit; the best point so far is returned when exceeded
    pub deadline: Option<Duration>,
}

impl Default for MinimizeOptions {
    fn default() -> Self {
        Self {
            x_tol: 1e-5,
            max_evaluations: 500,
            deadline: None,
        }
    }
}

/// Why the minimizer stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MinimizeStatus {
    Converged,
    MaxEvaluations,
    Deadline,
}

/// Outcome of a bounded minimization.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MinimizeResult {
    pub x: f64,
    pub fx: f64,
    pub evaluations: usize,
    pub status: MinimizeStatus,
}

impl MinimizeResult {
    pub fn converged(&self) -> bool {
        self.status == MinimizeStatus::Converged
    }
}

/// Minimize `f` over `[lower, upper]`.
///
/// # Arguments
/// * `f` - Objective function
/// * `lower`, `upper` - Finite search bounds with `lower < upper`
/// * `options` - Tolerance, evaluation cap and optional deadline
///
/// # Returns
/// The best abscissa found with its objective value. Hitting the evaluation
/// cap or the deadline is not an error; it is reported in
/// [`MinimizeResult::status`].
///
/// # Examples
///
/// ```
/// use fermi_math::minimize::{minimize_bounded, MinimizeOptions};
///
/// let result = minimize_bounded(|x| (x - 0.3).powi(2), 0.0, 1.0, &MinimizeOptions::default()).unwrap();
/// assert!((result.x - 0.3).abs() < 1e-4);
/// ```
pub fn minimize_bounded<F>(
    mut f: F,
    lower: f64,
    upper: f64,
    options: &MinimizeOptions,
) -> Result<MinimizeResult, MinimizeError>
where
    F: FnMut(f64) -> f64,
{
    if !lower.is_finite() || !upper.is_finite() || lower >= upper {
        return Err(MinimizeError::InvalidBounds { lower, upper });
    }

    let start = Instant::now();
    let sqrt_eps = f64::EPSILON.sqrt();
    let golden_mean = 0.5 * (3.0 - 5.0_f64.sqrt());

    let mut eval = |x: f64| -> Result<f64, MinimizeError> {
        let value = f(x);
        if value.is_nan() {
            Err(MinimizeError::NanObjective { x })
        } else {
            Ok(value)
        }
    };

    let (mut a, mut b) = (lower, upper);
    // xf: best point, nfc: second best, fulc: previous second best
    let mut fulc = a + golden_mean * (b - a);
    let mut nfc = fulc;
    let mut xf = fulc;
    let mut rat: f64 = 0.0;
    let mut e: f64 = 0.0;
    let mut fx = eval(xf)?;
    let mut evaluations = 1;
    let mut ffulc = fx;
    let mut fnfc = fx;
    let mut xm = 0.5 * (a + b);
    let mut tol1 = sqrt_eps * xf.abs() + options.x_tol / 3.0;
    let mut tol2 = 2.0 * tol1;
    let mut status = MinimizeStatus::Converged;

    while (xf - xm).abs() > tol2 - 0.5 * (b - a) {
        if evaluations >= options.max_evaluations {
            status = MinimizeStatus::MaxEvaluations;
            break;
        }
        if options.deadline.is_some_and(|d| start.elapsed() >= d) {
            status = MinimizeStatus::Deadline;
            break;
        }

        let mut golden = true;
        if e.abs() > tol1 {
            golden = false;
            let mut r = (xf - nfc) * (fx - ffulc);
            let mut q = (xf - fulc) * (fx - fnfc);
            let mut p = (xf - fulc) * q - (xf - nfc) * r;
            q = 2.0 * (q - r);
            if q > 0.0 {
                p = -p;
            }
            q = q.abs();
            r = e;
            e = rat;

            if p.abs() < (0.5 * q * r).abs() && p > q * (a - xf) && p < q * (b - xf) {
                rat = p / q;
                let x = xf + rat;
                if (x - a) < tol2 || (b - x) < tol2 {
                    let si = if xm - xf >= 0.0 { 1.0 } else { -1.0 };
                    rat = tol1 * si;
                }
            } else {
                golden = true;
            }
        }

        if golden {
            e = if xf >= xm { a - xf } else { b - xf };
            rat = golden_mean * e;
        }

        let si = if rat >= 0.0 { 1.0 } else { -1.0 };
        let x = xf + si * rat.abs().max(tol1);
        let fu = eval(x)?;
        evaluations += 1;

        if fu <= fx {
            if x >= xf {
                a = xf;
            } else {
                b = xf;
            }
            fulc = nfc;
            ffulc = fnfc;
            nfc = xf;
            fnfc = fx;
            xf = x;
            fx = fu;
        } else {
            if x < xf {
                a = x;
            } else {
                b = x;
            }
            if fu <= fnfc || nfc == xf {
                fulc = nfc;
                ffulc = fnfc;
                nfc = x;
                fnfc = fu;
            } else if fu <= ffulc || fulc == xf || fulc == nfc {
                fulc = x;
                ffulc = fu;
            }
        }

        xm = 0.5 * (a + b);
        tol1 = sqrt_eps * xf.abs() + options.x_tol / 3.0;
        tol2 = 2.0 * tol1;
    }

    match status {
        MinimizeStatus::Converged => {
            debug!("bounded minimization converged at x={xf:.6} after {evaluations} evaluations")
        }
        MinimizeStatus::MaxEvaluations => {
            warn!("bounded minimization hit {evaluations} evaluations, best x={xf:.6}")
        }
        MinimizeStatus::Deadline => {
            warn!("bounded minimization deadline reached, best x={xf:.6}")
        }
    }

    Ok(MinimizeResult {
        x: xf,
        fx,
        evaluations,
        status,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_quadratic_minimum() {
        let result =
            minimize_bounded(|x| (x - 2.5).powi(2) + 1.0, 0.0, 10.0, &Default::default()).unwrap();
        assert!(result.converged());
        assert_relative_eq!(result.x, 2.5, epsilon = 1e-5);
        assert_relative_eq!(result.fx, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_minimum_at_bound() {
        let options = MinimizeOptions {
            x_tol: 1e-6,
            ..Default::default()
        };
        let result = minimize_bounded(|x| x, 0.6, 1.0, &options).unwrap();
        assert!((result.x - 0.6).abs() < 1e-5);
    }

    #[test]
    fn test_absolute_value_kink() {
        // Non-smooth objective like |T - T(q)|
        let options = MinimizeOptions {
            x_tol: 1e-8,
            ..Default::default()
        };
        let result = minimize_bounded(|x: f64| (x.cos() - 0.5).abs(), 0.0, 2.0, &options).unwrap();
        assert_relative_eq!(result.x, std::f64::consts::FRAC_PI_3, epsilon = 1e-6);
    }

    #[test]
    fn test_evaluation_cap() {
        let options = MinimizeOptions {
            x_tol: 1e-12,
            max_evaluations: 4,
            deadline: None,
        };
        let result = minimize_bounded(|x: f64| (x - 0.123).powi(2), 0.0, 1.0, &options).unwrap();
        assert_eq!(result.status, MinimizeStatus::MaxEvaluations);
        assert_eq!(result.evaluations, 4);
    }

    #[test]
    fn test_zero_deadline_returns_initial_point() {
        let options = MinimizeOptions {
            deadline: Some(Duration::ZERO),
            ..Default::default()
        };
        let result = minimize_bounded(|x: f64| (x - 0.9).powi(2), 0.0, 1.0, &options).unwrap();
        assert_eq!(result.status, MinimizeStatus::Deadline);
        assert_eq!(result.evaluations, 1);
    }

    #[test]
    fn test_invalid_bounds_and_nan() {
        assert!(matches!(
            minimize_bounded(|x| x, 1.0, 0.0, &Default::default()),
            Err(MinimizeError::InvalidBounds { .. })
        ));
        assert!(matches!(
            minimize_bounded(|_| f64::NAN, 0.0, 1.0, &Default::default()),
            Err(MinimizeError::NanObjective { .. })
        ));
    }
}
