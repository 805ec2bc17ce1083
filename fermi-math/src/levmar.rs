//! Levenberg-Marquardt nonlinear least squares.
//!
//! Minimizes `½‖r(p)‖²` for a residual function `r: ℝⁿ → ℝᵐ` with `m ≥ n`.
//! The Jacobian is approximated by forward differences. Each iteration solves
//! the Marquardt-scaled normal equations
//!
//! ```text
//! (JᵀJ + λ·D) δ = −Jᵀr
//! ```
//!
//! by Cholesky factorization and adapts `λ` from the gain ratio between the
//! actual and predicted cost reduction (Nielsen's update). As in MINPACK, the
//! scaling `D` holds the largest `diag(JᵀJ)` seen so far, so a parameter whose
//! sensitivity fades along the path stays damped. Termination follows
//! the MINPACK tests: relative cost reduction (`ftol`), relative step size
//! (`xtol`) and gradient magnitude (`gtol`), plus caps on iterations,
//! residual evaluations and wall-clock time.

use log::{debug, warn};
use nalgebra::{DMatrix, DVector};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Errors that prevent the solver from starting.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LevMarError {
    #[error("no residuals to minimize")]
    EmptyResiduals,
    #[error("{residuals} residuals cannot determine {params} parameters")]
    Underdetermined { residuals: usize, params: usize },
    #[error("residuals are not finite at the initial parameters")]
    NonFiniteInitial,
    #[error("residual function returned {got} values, expected {expected}")]
    ResidualLengthChanged { expected: usize, got: usize },
}

/// Solver settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevMarOptions {
    /// Relative reduction in cost below which the fit is converged
    pub ftol: f64,
    /// Relative parameter step below which the fit is converged
    pub xtol: f64,
    /// Largest gradient component below which the fit is converged
    pub gtol: f64,
    pub max_iterations: usize,
    /// Cap on residual evaluations, Jacobian columns included
    pub max_evaluations: usize,
    /// Initial damping factor
    pub initial_lambda: f64,
    /// Wall-clock limit; the best parameters so far are returned when hit
    pub deadline: Option<Duration>,
}

impl Default for LevMarOptions {
    fn default() -> Self {
        Self {
            ftol: 1e-8,
            xtol: 1e-8,
            gtol: 0.0,
            max_iterations: 200,
            max_evaluations: 2000,
            initial_lambda: 1e-3,
            deadline: None,
        }
    }
}

/// Reason the solver stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Residuals are exactly zero
    ExactFit,
    /// Actual and predicted relative cost reduction are both below `ftol`
    FunctionTolerance,
    /// Relative step size is below `xtol`
    StepTolerance,
    /// Gradient magnitude is below `gtol`
    GradientTolerance,
    MaxIterations,
    MaxEvaluations,
    Deadline,
    /// Damping grew without producing a cost reduction
    Stalled,
}

impl Termination {
    /// True for the tolerance-based stopping reasons.
    pub fn is_converged(&self) -> bool {
        matches!(
            self,
            Termination::ExactFit
                | Termination::FunctionTolerance
                | Termination::StepTolerance
                | Termination::GradientTolerance
        )
    }
}

/// Result of a Levenberg-Marquardt run.
#[derive(Debug, Clone, PartialEq)]
pub struct LevMarReport {
    /// Best parameters found
    pub params: DVector<f64>,
    /// `½‖r‖²` at `params`
    pub cost: f64,
    pub iterations: usize,
    pub evaluations: usize,
    pub termination: Termination,
}

impl LevMarReport {
    pub fn converged(&self) -> bool {
        self.termination.is_converged()
    }
}

const MAX_LAMBDA: f64 = 1e16;
const MIN_DIAGONAL: f64 = 1e-12;

fn half_norm_squared(r: &DVector<f64>) -> f64 {
    if r.iter().all(|v| v.is_finite()) {
        0.5 * r.norm_squared()
    } else {
        f64::INFINITY
    }
}

/// Raise each scaling entry to the matching `diag(JᵀJ)` if that is larger.
fn update_scaling(scale: &mut DVector<f64>, jtj: &DMatrix<f64>) {
    for (i, d) in scale.iter_mut().enumerate() {
        *d = d.max(jtj[(i, i)]).max(MIN_DIAGONAL);
    }
}

/// Forward-difference Jacobian of `f` at `params` given `r0 = f(params)`.
fn forward_jacobian<F>(f: &mut F, params: &DVector<f64>, r0: &DVector<f64>) -> DMatrix<f64>
where
    F: FnMut(&DVector<f64>) -> DVector<f64>,
{
    let base_step = f64::EPSILON.sqrt();
    let mut jacobian = DMatrix::zeros(r0.len(), params.len());
    let mut shifted = params.clone();
    for j in 0..params.len() {
        let mut h = base_step * params[j].abs();
        if h == 0.0 {
            h = base_step;
        }
        shifted[j] = params[j] + h;
        let r = f(&shifted);
        shifted[j] = params[j];
        // Exact step actually taken in floating point
        let h = (params[j] + h) - params[j];
        for i in 0..r0.len().min(r.len()) {
            jacobian[(i, j)] = (r[i] - r0[i]) / h;
        }
    }
    jacobian
}

/// Minimize the sum of squared residuals starting from `initial`.
///
/// # Arguments
/// * `residuals` - Residual function; must return the same length on every call
/// * `initial` - Starting parameters
/// * `options` - Tolerances, caps and deadline
///
/// # Returns
/// A report with the best parameters seen. Stopping on a cap or deadline is
/// not an error; check [`LevMarReport::converged`].
pub fn levenberg_marquardt<F>(
    mut residuals: F,
    initial: DVector<f64>,
    options: &LevMarOptions,
) -> Result<LevMarReport, LevMarError>
where
    F: FnMut(&DVector<f64>) -> DVector<f64>,
{
    let start = Instant::now();
    let n = initial.len();
    let mut params = initial;
    let mut r = residuals(&params);
    let m = r.len();
    let mut evaluations = 1;

    if m == 0 {
        return Err(LevMarError::EmptyResiduals);
    }
    if m < n {
        return Err(LevMarError::Underdetermined {
            residuals: m,
            params: n,
        });
    }
    let mut cost = half_norm_squared(&r);
    if !cost.is_finite() {
        return Err(LevMarError::NonFiniteInitial);
    }

    let mut lambda = options.initial_lambda;
    let mut nu = 2.0;
    let mut iterations = 0;
    let mut scale = DVector::<f64>::zeros(n);
    let deadline_hit = |start: &Instant| options.deadline.is_some_and(|d| start.elapsed() >= d);

    let termination = 'outer: loop {
        if cost == 0.0 {
            break Termination::ExactFit;
        }
        if iterations >= options.max_iterations {
            break Termination::MaxIterations;
        }
        if evaluations + n > options.max_evaluations {
            break Termination::MaxEvaluations;
        }
        if deadline_hit(&start) {
            break Termination::Deadline;
        }

        let jacobian = forward_jacobian(&mut residuals, &params, &r);
        evaluations += n;
        if !jacobian.iter().all(|v| v.is_finite()) {
            break Termination::Stalled;
        }

        let jtj = jacobian.tr_mul(&jacobian);
        let gradient = jacobian.tr_mul(&r);
        if gradient.amax() <= options.gtol {
            break Termination::GradientTolerance;
        }
        update_scaling(&mut scale, &jtj);
        iterations += 1;

        loop {
            let mut damped = jtj.clone();
            for i in 0..n {
                damped[(i, i)] += lambda * scale[i];
            }

            if let Some(cholesky) = damped.cholesky() {
                let delta = cholesky.solve(&(-&gradient));

                if delta.norm() <= options.xtol * (params.norm() + options.xtol) {
                    break 'outer Termination::StepTolerance;
                }

                let trial = &params + &delta;
                let trial_r = residuals(&trial);
                evaluations += 1;
                if trial_r.len() != m {
                    return Err(LevMarError::ResidualLengthChanged {
                        expected: m,
                        got: trial_r.len(),
                    });
                }
                let trial_cost = half_norm_squared(&trial_r);

                let predicted = 0.5 * delta.dot(&(lambda * scale.component_mul(&delta) - &gradient));
                let actual = cost - trial_cost;
                let rho = if predicted > 0.0 {
                    actual / predicted
                } else {
                    -1.0
                };

                if rho > 0.0 {
                    let previous = cost;
                    params = trial;
                    r = trial_r;
                    cost = trial_cost;
                    lambda *= (1.0_f64 / 3.0).max(1.0 - (2.0 * rho - 1.0).powi(3));
                    nu = 2.0;
                    debug!("levmar iter {iterations}: cost={cost:.6e} lambda={lambda:.3e}");

                    if actual <= options.ftol * previous && predicted <= options.ftol * previous {
                        break 'outer Termination::FunctionTolerance;
                    }
                    break;
                }
            }

            lambda *= nu;
            nu *= 2.0;
            if lambda > MAX_LAMBDA {
                break 'outer Termination::Stalled;
            }
            if evaluations >= options.max_evaluations {
                break 'outer Termination::MaxEvaluations;
            }
            if deadline_hit(&start) {
                break 'outer Termination::Deadline;
            }
        }
    };

    if termination.is_converged() {
        debug!(
            "levmar converged ({termination:?}) after {iterations} iterations, cost={cost:.6e}"
        );
    } else {
        warn!("levmar stopped without converging: {termination:?} after {iterations} iterations");
    }

    Ok(LevMarReport {
        params,
        cost,
        iterations,
        evaluations,
        termination,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn exponential_data() -> (Vec<f64>, Vec<f64>) {
        let t: Vec<f64> = (0..40).map(|i| i as f64 * 0.25).collect();
        let y = t.iter().map(|t| 3.0 * (-0.5 * t).exp() + 0.2).collect();
        (t, y)
    }

    #[test]
    fn test_exponential_decay_fit() {
        let (t, y) = exponential_data();
        let report = levenberg_marquardt(
            |p: &DVector<f64>| {
                DVector::from_iterator(
                    t.len(),
                    t.iter()
                        .zip(y.iter())
                        .map(|(t, y)| p[0] * (-p[1] * t).exp() + p[2] - y),
                )
            },
            DVector::from_vec(vec![1.0, 1.0, 0.0]),
            &LevMarOptions::default(),
        )
        .unwrap();

        assert!(report.converged(), "{:?}", report.termination);
        assert_relative_eq!(report.params[0], 3.0, max_relative = 1e-6);
        assert_relative_eq!(report.params[1], 0.5, max_relative = 1e-6);
        assert_relative_eq!(report.params[2], 0.2, max_relative = 1e-6);
        assert!(report.cost < 1e-12);
    }

    #[test]
    fn test_rosenbrock() {
        let options = LevMarOptions {
            xtol: 1e-12,
            ..Default::default()
        };
        let report = levenberg_marquardt(
            |p: &DVector<f64>| {
                DVector::from_vec(vec![10.0 * (p[1] - p[0] * p[0]), 1.0 - p[0]])
            },
            DVector::from_vec(vec![-1.2, 1.0]),
            &options,
        )
        .unwrap();
        assert!(report.converged());
        assert_relative_eq!(report.params[0], 1.0, epsilon = 1e-6);
        assert_relative_eq!(report.params[1], 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_iteration_cap_returns_best_so_far() {
        let (t, y) = exponential_data();
        let residuals = |p: &DVector<f64>| {
            DVector::from_iterator(
                t.len(),
                t.iter()
                    .zip(y.iter())
                    .map(|(t, y)| p[0] * (-p[1] * t).exp() + p[2] - y),
            )
        };
        let initial = DVector::from_vec(vec![1.0, 1.0, 0.0]);
        let initial_cost = half_norm_squared(&residuals(&initial));
        let options = LevMarOptions {
            max_iterations: 1,
            ..Default::default()
        };
        let report = levenberg_marquardt(residuals, initial, &options).unwrap();
        assert_eq!(report.termination, Termination::MaxIterations);
        assert!(!report.converged());
        assert!(report.cost < initial_cost);
    }

    #[test]
    fn test_scaling_keeps_largest_diagonal() {
        let mut scale = DVector::zeros(2);
        update_scaling(&mut scale, &DMatrix::from_row_slice(2, 2, &[4.0, 1.0, 1.0, 0.0]));
        assert_eq!(scale[0], 4.0);
        assert_eq!(scale[1], MIN_DIAGONAL);

        // A fading column does not lower its damping
        update_scaling(&mut scale, &DMatrix::from_row_slice(2, 2, &[1e-6, 0.0, 0.0, 9.0]));
        assert_eq!(scale[0], 4.0);
        assert_eq!(scale[1], 9.0);
    }

    #[test]
    fn test_saturating_parameter_fit() {
        // The second parameter enters through a logistic that flattens on both sides
        let t: Vec<f64> = (0..30).map(|i| i as f64 * 0.1).collect();
        let model = |p: &DVector<f64>, t: f64| p[0] * t + 1.0 / (1.0 + (-p[1]).exp());
        let y: Vec<f64> = t.iter().map(|&t| 2.0 * t + 1.0 / (1.0 + (-1.0f64).exp())).collect();
        let report = levenberg_marquardt(
            |p: &DVector<f64>| {
                DVector::from_iterator(t.len(), t.iter().zip(y.iter()).map(|(&t, y)| model(p, t) - y))
            },
            DVector::from_vec(vec![1.0, 0.0]),
            &LevMarOptions::default(),
        )
        .unwrap();
        assert!(report.converged(), "{:?}", report.termination);
        assert_relative_eq!(report.params[0], 2.0, max_relative = 1e-5);
        assert_relative_eq!(report.params[1], 1.0, max_relative = 1e-4);
    }

    #[test]
    fn test_zero_deadline() {
        let options = LevMarOptions {
            deadline: Some(Duration::ZERO),
            ..Default::default()
        };
        let report = levenberg_marquardt(
            |p: &DVector<f64>| DVector::from_vec(vec![p[0] - 1.0, p[0] + 1.0]),
            DVector::from_vec(vec![5.0]),
            &options,
        )
        .unwrap();
        assert_eq!(report.termination, Termination::Deadline);
        assert_eq!(report.params[0], 5.0);
    }

    #[test]
    fn test_exact_fit_stops_immediately() {
        let report = levenberg_marquardt(
            |p: &DVector<f64>| DVector::from_vec(vec![p[0] - 2.0, 2.0 * (p[0] - 2.0)]),
            DVector::from_vec(vec![2.0]),
            &LevMarOptions::default(),
        )
        .unwrap();
        assert_eq!(report.termination, Termination::ExactFit);
        assert_eq!(report.iterations, 0);
    }

    #[test]
    fn test_start_errors() {
        assert_eq!(
            levenberg_marquardt(
                |_: &DVector<f64>| DVector::zeros(0),
                DVector::from_vec(vec![1.0]),
                &LevMarOptions::default()
            )
            .unwrap_err(),
            LevMarError::EmptyResiduals
        );
        assert!(matches!(
            levenberg_marquardt(
                |p: &DVector<f64>| DVector::from_vec(vec![p[0]]),
                DVector::from_vec(vec![1.0, 2.0]),
                &LevMarOptions::default()
            ),
            Err(LevMarError::Underdetermined { .. })
        ));
        assert_eq!(
            levenberg_marquardt(
                |_: &DVector<f64>| DVector::from_vec(vec![f64::NAN]),
                DVector::from_vec(vec![1.0]),
                &LevMarOptions::default()
            )
            .unwrap_err(),
            LevMarError::NonFiniteInitial
        );
    }
}
