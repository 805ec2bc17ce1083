//! Least-squares fitting of radial profiles.
//!
//! Every [`FitModel`] variant goes through the same Levenberg-Marquardt
//! driver. The model supplies its free parameters and is rebuilt from the
//! solver's parameter vector on every residual evaluation, so fixed
//! quantities (such as the derived fugacity of a fixed-temperature fit) are
//! carried along untouched.

use std::time::Duration;

use log::{debug, warn};
use nalgebra::DVector;
use serde::{Deserialize, Serialize};

use fermi_math::{levenberg_marquardt, LevMarOptions, Termination};

use super::models::FitModel;
use crate::error::FitError;

/// Solver settings for profile fits.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitOptions {
    pub ftol: f64,
    pub xtol: f64,
    pub max_iterations: usize,
    pub max_evaluations: usize,
    /// Wall-clock limit for a single fit
    pub deadline: Option<Duration>,
}

impl Default for FitOptions {
    fn default() -> Self {
        let lm = LevMarOptions::default();
        Self {
            ftol: lm.ftol,
            xtol: lm.xtol,
            max_iterations: lm.max_iterations,
            max_evaluations: lm.max_evaluations,
            deadline: None,
        }
    }
}

impl FitOptions {
    fn solver_options(&self) -> LevMarOptions {
        LevMarOptions {
            ftol: self.ftol,
            xtol: self.xtol,
            max_iterations: self.max_iterations,
            max_evaluations: self.max_evaluations,
            deadline: self.deadline,
            ..LevMarOptions::default()
        }
    }
}

/// Outcome of a profile fit.
#[derive(Debug, Clone, PartialEq)]
pub struct FitResult {
    /// Best model found, with a positive size parameter
    pub model: FitModel,
    pub converged: bool,
    pub termination: Termination,
    pub iterations: usize,
    pub evaluations: usize,
    /// `½·Σ w²(model - data)²` at the returned model
    pub cost: f64,
}

/// Fit `model` to `(radii, values)`.
///
/// # Arguments
/// * `initial` - Starting model; its variant selects the functional form
/// * `radii` - Radial coordinates in pixels
/// * `values` - Measured profile
/// * `weights` - Optional per-sample weights applied to the residuals
/// * `options` - Solver settings
///
/// # Returns
/// The best model found. A fit that stops on an iteration cap or deadline is
/// returned with `converged == false` rather than as an error.
pub fn fit(
    initial: &FitModel,
    radii: &[f64],
    values: &[f64],
    weights: Option<&[f64]>,
    options: &FitOptions,
) -> Result<FitResult, FitError> {
    if radii.is_empty() {
        return Err(FitError::DegenerateInput("no profile samples to fit".to_string()));
    }
    if radii.len() != values.len() {
        return Err(FitError::DegenerateInput(format!(
            "{} radii but {} profile values",
            radii.len(),
            values.len()
        )));
    }
    if let Some(w) = weights {
        if w.len() != radii.len() {
            return Err(FitError::DegenerateInput(format!(
                "{} weights for {} profile values",
                w.len(),
                radii.len()
            )));
        }
    }

    let residuals = |p: &DVector<f64>| {
        let model = initial.with_parameters(p.as_slice());
        DVector::from_iterator(
            radii.len(),
            radii.iter().zip(values.iter()).enumerate().map(|(i, (&r, &v))| {
                let w = weights.map_or(1.0, |w| w[i]);
                w * (model.evaluate(r) - v)
            }),
        )
    };

    let start = DVector::from_vec(initial.parameters());
    let report = levenberg_marquardt(residuals, start, &options.solver_options())?;
    let model = initial
        .with_parameters(report.params.as_slice())
        .with_positive_size();

    if report.converged() {
        debug!(
            "{} fit converged ({:?}) after {} iterations: {:?}",
            model.name(),
            report.termination,
            report.iterations,
            model
        );
    } else {
        warn!(
            "{} fit did not converge ({:?}) after {} iterations, cost {:.3e}",
            model.name(),
            report.termination,
            report.iterations,
            report.cost
        );
    }

    Ok(FitResult {
        model,
        converged: report.converged(),
        termination: report.termination,
        iterations: report.iterations,
        evaluations: report.evaluations,
        cost: report.cost,
    })
}
