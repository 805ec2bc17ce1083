//! Temperature and atom number from a fitted profile.

use std::f64::consts::PI;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use fermi_math::{integrate_to_infinity, minimize_bounded, MinimizeOptions, QuadratureOptions};

use super::models::{t_over_tf_from_fugacity, FitModel};
use crate::error::FitError;

/// Search interval for the log-fugacity, covering T/T_F from about 1e4 down to 1e-4.
pub const FUGACITY_BOUNDS: (f64, f64) = (-30.0, 1e4);

/// Physical quantities extracted from a fit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observables {
    /// Reduced temperature T/T_F; infinite for a Gaussian fit
    pub t_over_tf: f64,
    pub atom_number: f64,
}

/// Log-fugacity `q` for which `(6·F3(q))^(-1/3)` equals `t_over_tf`.
///
/// Found by bounded minimization of `|T/T_F - (6·F3(q))^(-1/3)|` over
/// [`FUGACITY_BOUNDS`].
pub fn fugacity_from_temperature(t_over_tf: f64) -> Result<f64, FitError> {
    if !(t_over_tf > 0.0) || !t_over_tf.is_finite() {
        return Err(FitError::InvalidTemperature(t_over_tf));
    }
    let options = MinimizeOptions {
        x_tol: 1e-7,
        max_evaluations: 500,
        deadline: None,
    };
    let (lower, upper) = FUGACITY_BOUNDS;
    let result = minimize_bounded(
        |q| (t_over_tf - t_over_tf_from_fugacity(q)).abs(),
        lower,
        upper,
        &options,
    )?;
    if !result.converged() {
        warn!(
            "fugacity search for T/T_F={t_over_tf} stopped after {} evaluations ({:?})",
            result.evaluations, result.status
        );
    }
    Ok(result.x)
}

fn check_calibration(pixel_size: f64, cross_section: f64) -> Result<(), FitError> {
    if !(pixel_size > 0.0) || !pixel_size.is_finite() {
        return Err(FitError::InvalidCalibration(format!(
            "pixel size must be positive, got {pixel_size}"
        )));
    }
    if !(cross_section > 0.0) || !cross_section.is_finite() {
        return Err(FitError::InvalidCalibration(format!(
            "cross-section must be positive, got {cross_section}"
        )));
    }
    Ok(())
}

/// `∫₀^∞ 2πr·n(r) dr` in pixel units, integrated in units of the model size.
fn integrated_od(model: &FitModel) -> Result<f64, FitError> {
    let scale = model.size().abs();
    if !(scale > 0.0) || !scale.is_finite() {
        return Err(FitError::DegenerateInput(format!(
            "{} model has size {}",
            model.name(),
            model.size()
        )));
    }
    let options = QuadratureOptions {
        rel_tol: 1e-10,
        abs_tol: 0.0,
        ..QuadratureOptions::default()
    };
    let result = integrate_to_infinity(|s| 2.0 * PI * s * model.evaluate(s * scale), 0.0, &options)?;
    Ok(result.value * scale * scale)
}

/// T/T_F and atom number of an ideal Fermi gas fit.
///
/// # Arguments
/// * `model` - A fitted ideal Fermi model
/// * `pixel_size` - Object-plane pixel size in meters
/// * `cross_section` - Absorption cross-section in m²
///
/// # Returns
/// `T/T_F = (6·F3(q))^(-1/3)` and `N = pixel_size²/σ · ∫ 2πr·n(r) dr`
pub fn fermi_observables(
    model: &FitModel,
    pixel_size: f64,
    cross_section: f64,
) -> Result<Observables, FitError> {
    check_calibration(pixel_size, cross_section)?;
    let t_over_tf = match model {
        FitModel::Gaussian { .. } => {
            return Err(FitError::DegenerateInput(
                "a gaussian fit has no fugacity".to_string(),
            ))
        }
        FitModel::IdealFermi { log_fugacity, .. } => t_over_tf_from_fugacity(*log_fugacity),
        FitModel::IdealFermiFixedTemperature { t_over_tf, .. } => *t_over_tf,
    };
    let atom_number = pixel_size * pixel_size / cross_section * integrated_od(model)?;
    debug!("{}: T/T_F={t_over_tf:.4}, N={atom_number:.4e}", model.name());
    Ok(Observables {
        t_over_tf,
        atom_number,
    })
}

/// Atom number of a Gaussian fit; T/T_F is reported as infinite.
pub fn gaussian_observables(
    model: &FitModel,
    pixel_size: f64,
    cross_section: f64,
) -> Result<Observables, FitError> {
    check_calibration(pixel_size, cross_section)?;
    if !matches!(model, FitModel::Gaussian { .. }) {
        return Err(FitError::DegenerateInput(format!(
            "expected a gaussian model, got {}",
            model.name()
        )));
    }
    let atom_number = pixel_size * pixel_size / cross_section * integrated_od(model)?;
    Ok(Observables {
        t_over_tf: f64::INFINITY,
        atom_number,
    })
}

/// Observables for any model.
pub fn observables(
    model: &FitModel,
    pixel_size: f64,
    cross_section: f64,
) -> Result<Observables, FitError> {
    match model {
        FitModel::Gaussian { .. } => gaussian_observables(model, pixel_size, cross_section),
        _ => fermi_observables(model, pixel_size, cross_section),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{li6_resonant_cross_section, DEFAULT_PIXEL_SIZE};
    use approx::assert_relative_eq;

    #[test]
    fn test_fugacity_inverts_temperature() {
        for q in [-5.0, 0.0, 2.0, 8.0, 40.0] {
            let t = t_over_tf_from_fugacity(q);
            let found = fugacity_from_temperature(t).unwrap();
            assert_relative_eq!(found, q, epsilon = 1e-4);
        }
    }

    #[test]
    fn test_fugacity_rejects_bad_temperature() {
        for t in [0.0, -0.1, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                fugacity_from_temperature(t),
                Err(FitError::InvalidTemperature(_))
            ));
        }
    }

    #[test]
    fn test_fermi_atom_number_matches_closed_form() {
        let sigma = li6_resonant_cross_section();
        for (q, r) in [(-3.0, 25.0), (1.0, 18.0), (6.0, 30.0)] {
            let model = FitModel::ideal_fermi(0.7, q, r);
            let obs = fermi_observables(&model, DEFAULT_PIXEL_SIZE, sigma).unwrap();
            let expected = DEFAULT_PIXEL_SIZE.powi(2) / sigma * model.integrated_density();
            assert_relative_eq!(obs.atom_number, expected, max_relative = 1e-7);
            assert_relative_eq!(obs.t_over_tf, t_over_tf_from_fugacity(q), epsilon = 1e-15);
        }
    }

    #[test]
    fn test_gaussian_observables() {
        let model = FitModel::gaussian(1.0, 10.0);
        let obs = observables(&model, 1.0, 1.0).unwrap();
        assert!(obs.t_over_tf.is_infinite());
        assert_relative_eq!(obs.atom_number, PI * 100.0, max_relative = 1e-8);
        assert!(fermi_observables(&model, 1.0, 1.0).is_err());
        assert!(gaussian_observables(&FitModel::ideal_fermi(1.0, 1.0, 1.0), 1.0, 1.0).is_err());
    }

    #[test]
    fn test_calibration_checked() {
        let model = FitModel::ideal_fermi(1.0, 1.0, 10.0);
        assert!(matches!(
            observables(&model, 0.0, 1.0),
            Err(FitError::InvalidCalibration(_))
        ));
        assert!(matches!(
            observables(&model, 1.0, f64::NAN),
            Err(FitError::InvalidCalibration(_))
        ));
    }

    #[test]
    fn test_fixed_temperature_observables() {
        let model = FitModel::fixed_temperature(0.5, 20.0, 0.15).unwrap();
        let obs = fermi_observables(&model, 1.0, 1.0).unwrap();
        assert_eq!(obs.t_over_tf, 0.15);
        assert_relative_eq!(obs.atom_number, model.integrated_density(), max_relative = 1e-7);
    }
}
