//! Column-density models for radially averaged cloud profiles.
//!
//! The ideal Fermi gas profile in a harmonic trap, integrated along the line
//! of sight, is
//!
//! ```text
//! n(r) = n0 · F2(q - (r/R)²·f(q)) / F2(q),   f(q) = ln(1+e^q)·(1+e^q)/e^q
//! ```
//!
//! with `q` the log-fugacity `μ/kT`, `F2` the complete Fermi-Dirac integral
//! and `R` the cloud size. The factor `f(q)` makes `R` insensitive to the
//! temperature, which decouples the fit parameters.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use fermi_math::{fermi_poly2, fermi_poly3};

use super::observables::fugacity_from_temperature;
use crate::error::FitError;

/// `ln(1 + e^x)` without overflow.
fn softplus(x: f64) -> f64 {
    if x > 0.0 {
        x + (-x).exp().ln_1p()
    } else {
        x.exp().ln_1p()
    }
}

/// Size correction `ln(1+e^q)·(1+e^q)/e^q`.
///
/// Tends to 1 for a classical gas (`q → -∞`) and to `q` for a degenerate one.
pub fn fq(q: f64) -> f64 {
    if q < -20.0 {
        1.0 + 0.5 * q.exp()
    } else {
        softplus(q) * (1.0 + (-q).exp())
    }
}

/// Ideal Fermi gas column density at radius `r`.
pub fn ideal_fermi_density(r: f64, n0: f64, q: f64, r_cloud: f64) -> f64 {
    let s = r / r_cloud;
    n0 * fermi_poly2(q - s * s * fq(q)) / fermi_poly2(q)
}

/// Gaussian column density `n0·exp(-r²/σ²)`.
pub fn gaussian_density(r: f64, n0: f64, sigma: f64) -> f64 {
    n0 * (-(r * r) / (sigma * sigma)).exp()
}

/// T/T_F of an ideal Fermi gas with log-fugacity `q`: `(6·F3(q))^(-1/3)`.
pub fn t_over_tf_from_fugacity(q: f64) -> f64 {
    (6.0 * fermi_poly3(q)).powf(-1.0 / 3.0)
}

const HALF_WIDTH_MAX_DOUBLINGS: usize = 60;
const HALF_WIDTH_BISECTIONS: usize = 60;

/// A fitted or initial profile model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FitModel {
    /// Peak density, log-fugacity and cloud size are all free.
    IdealFermi {
        n0: f64,
        log_fugacity: f64,
        r_cloud: f64,
    },
    /// Temperature held fixed; `log_fugacity` is derived from `t_over_tf`.
    IdealFermiFixedTemperature {
        n0: f64,
        r_cloud: f64,
        t_over_tf: f64,
        log_fugacity: f64,
    },
    Gaussian { n0: f64, sigma: f64 },
}

impl FitModel {
    pub fn ideal_fermi(n0: f64, log_fugacity: f64, r_cloud: f64) -> Self {
        FitModel::IdealFermi {
            n0,
            log_fugacity,
            r_cloud,
        }
    }

    /// Fixed-temperature model; solves for the matching log-fugacity.
    pub fn fixed_temperature(n0: f64, r_cloud: f64, t_over_tf: f64) -> Result<Self, FitError> {
        let log_fugacity = fugacity_from_temperature(t_over_tf)?;
        Ok(FitModel::IdealFermiFixedTemperature {
            n0,
            r_cloud,
            t_over_tf,
            log_fugacity,
        })
    }

    pub fn gaussian(n0: f64, sigma: f64) -> Self {
        FitModel::Gaussian { n0, sigma }
    }

    pub fn name(&self) -> &'static str {
        match self {
            FitModel::IdealFermi { .. } => "ideal fermi",
            FitModel::IdealFermiFixedTemperature { .. } => "ideal fermi (fixed T)",
            FitModel::Gaussian { .. } => "gaussian",
        }
    }

    /// Column density at radius `r` in pixels.
    pub fn evaluate(&self, r: f64) -> f64 {
        match *self {
            FitModel::IdealFermi {
                n0,
                log_fugacity,
                r_cloud,
            }
            | FitModel::IdealFermiFixedTemperature {
                n0,
                log_fugacity,
                r_cloud,
                ..
            } => ideal_fermi_density(r, n0, log_fugacity, r_cloud),
            FitModel::Gaussian { n0, sigma } => gaussian_density(r, n0, sigma),
        }
    }

    /// Column density at every radius.
    pub fn profile(&self, radii: &[f64]) -> Vec<f64> {
        radii.iter().map(|&r| self.evaluate(r)).collect()
    }

    pub fn n0(&self) -> f64 {
        match *self {
            FitModel::IdealFermi { n0, .. }
            | FitModel::IdealFermiFixedTemperature { n0, .. }
            | FitModel::Gaussian { n0, .. } => n0,
        }
    }

    /// Cloud radius for Fermi models, `σ` for the Gaussian.
    pub fn size(&self) -> f64 {
        match *self {
            FitModel::IdealFermi { r_cloud, .. }
            | FitModel::IdealFermiFixedTemperature { r_cloud, .. } => r_cloud,
            FitModel::Gaussian { sigma, .. } => sigma,
        }
    }

    pub fn log_fugacity(&self) -> Option<f64> {
        match *self {
            FitModel::IdealFermi { log_fugacity, .. }
            | FitModel::IdealFermiFixedTemperature { log_fugacity, .. } => Some(log_fugacity),
            FitModel::Gaussian { .. } => None,
        }
    }

    /// Reduced temperature, `None` for the Gaussian model.
    pub fn t_over_tf(&self) -> Option<f64> {
        match *self {
            FitModel::IdealFermi { log_fugacity, .. } => Some(t_over_tf_from_fugacity(log_fugacity)),
            FitModel::IdealFermiFixedTemperature { t_over_tf, .. } => Some(t_over_tf),
            FitModel::Gaussian { .. } => None,
        }
    }

    /// Free parameters in solver order.
    pub fn parameters(&self) -> Vec<f64> {
        match *self {
            FitModel::IdealFermi {
                n0,
                log_fugacity,
                r_cloud,
            } => vec![n0, log_fugacity, r_cloud],
            FitModel::IdealFermiFixedTemperature { n0, r_cloud, .. } => vec![n0, r_cloud],
            FitModel::Gaussian { n0, sigma } => vec![n0, sigma],
        }
    }

    /// Copy of this model with the free parameters replaced.
    ///
    /// `params` must hold at least [`FitModel::parameters`]`.len()` values.
    pub fn with_parameters(&self, params: &[f64]) -> Self {
        match *self {
            FitModel::IdealFermi { .. } => FitModel::IdealFermi {
                n0: params[0],
                log_fugacity: params[1],
                r_cloud: params[2],
            },
            FitModel::IdealFermiFixedTemperature {
                t_over_tf,
                log_fugacity,
                ..
            } => FitModel::IdealFermiFixedTemperature {
                n0: params[0],
                r_cloud: params[1],
                t_over_tf,
                log_fugacity,
            },
            FitModel::Gaussian { .. } => FitModel::Gaussian {
                n0: params[0],
                sigma: params[1],
            },
        }
    }

    /// The sign of the size parameter does not enter the profile; report it positive.
    pub fn with_positive_size(&self) -> Self {
        match *self {
            FitModel::IdealFermi {
                n0,
                log_fugacity,
                r_cloud,
            } => FitModel::IdealFermi {
                n0,
                log_fugacity,
                r_cloud: r_cloud.abs(),
            },
            FitModel::IdealFermiFixedTemperature {
                n0,
                r_cloud,
                t_over_tf,
                log_fugacity,
            } => FitModel::IdealFermiFixedTemperature {
                n0,
                r_cloud: r_cloud.abs(),
                t_over_tf,
                log_fugacity,
            },
            FitModel::Gaussian { n0, sigma } => FitModel::Gaussian {
                n0,
                sigma: sigma.abs(),
            },
        }
    }

    /// Copy of this model with the size parameter replaced.
    pub fn with_size(&self, size: f64) -> Self {
        let mut params = self.parameters();
        if let Some(last) = params.last_mut() {
            *last = size;
        }
        self.with_parameters(&params)
    }

    /// Radius at which the profile has fallen to half its central value.
    ///
    /// Every model decreases monotonically in `r`, so the crossing is found
    /// by bracketing and bisection. Returns `None` for a non-positive peak
    /// or size.
    pub fn half_width(&self) -> Option<f64> {
        let size = self.size().abs();
        let half = 0.5 * self.evaluate(0.0);
        if !(half > 0.0) || !(size > 0.0) || !half.is_finite() {
            return None;
        }
        let mut lo = 0.0;
        let mut hi = size;
        for _ in 0..HALF_WIDTH_MAX_DOUBLINGS {
            if self.evaluate(hi) < half {
                break;
            }
            lo = hi;
            hi *= 2.0;
        }
        if !(self.evaluate(hi) < half) {
            return None;
        }
        for _ in 0..HALF_WIDTH_BISECTIONS {
            let mid = 0.5 * (lo + hi);
            if self.evaluate(mid) < half {
                hi = mid;
            } else {
                lo = mid;
            }
        }
        Some(0.5 * (lo + hi))
    }

    /// Closed-form integral `∫ 2πr·n(r) dr` in pixel² · OD units.
    pub fn integrated_density(&self) -> f64 {
        match *self {
            FitModel::IdealFermi {
                n0,
                log_fugacity: q,
                r_cloud,
            }
            | FitModel::IdealFermiFixedTemperature {
                n0,
                log_fugacity: q,
                r_cloud,
                ..
            } => n0 * PI * r_cloud * r_cloud * fermi_poly3(q) / (fq(q) * fermi_poly2(q)),
            FitModel::Gaussian { n0, sigma } => PI * n0 * sigma * sigma,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_fq_limits() {
        assert_relative_eq!(fq(-40.0), 1.0, epsilon = 1e-15);
        assert_relative_eq!(fq(0.0), 2.0 * 2.0_f64.ln(), epsilon = 1e-15);
        assert_relative_eq!(fq(50.0), 50.0, max_relative = 1e-12);
        // Both branches agree at the switch-over
        let direct = |q: f64| q.exp().ln_1p() * (1.0 + q.exp()) / q.exp();
        assert_relative_eq!(fq(-20.5), direct(-20.5), max_relative = 1e-12);
        assert_relative_eq!(fq(-19.5), direct(-19.5), max_relative = 1e-12);
        assert_relative_eq!(fq(3.0), direct(3.0), max_relative = 1e-12);
    }

    #[test]
    fn test_half_width() {
        let gaussian = FitModel::gaussian(0.7, 8.0);
        let half = gaussian.half_width().unwrap();
        assert_relative_eq!(half, 8.0 * 2.0_f64.ln().sqrt(), max_relative = 1e-10);

        // Scales linearly with the cloud size
        let fermi = FitModel::ideal_fermi(0.8, 4.0, 10.0);
        let wide = fermi.with_size(20.0);
        assert_relative_eq!(
            wide.half_width().unwrap(),
            2.0 * fermi.half_width().unwrap(),
            max_relative = 1e-10
        );
        assert_relative_eq!(
            fermi.evaluate(fermi.half_width().unwrap()),
            0.4,
            max_relative = 1e-9
        );
        assert!(FitModel::gaussian(0.0, 8.0).half_width().is_none());
    }

    #[test]
    fn test_with_size_keeps_other_parameters() {
        let model = FitModel::fixed_temperature(0.6, 12.0, 0.2).unwrap();
        let resized = model.with_size(30.0);
        assert_eq!(resized.size(), 30.0);
        assert_eq!(resized.n0(), 0.6);
        assert_eq!(resized.t_over_tf(), model.t_over_tf());
        assert_eq!(resized.log_fugacity(), model.log_fugacity());
    }

    #[test]
    fn test_fermi_profile_peak_and_decay() {
        let model = FitModel::ideal_fermi(1.3, 2.0, 15.0);
        assert_relative_eq!(model.evaluate(0.0), 1.3, epsilon = 1e-12);
        let profile = model.profile(&[0.0, 5.0, 10.0, 20.0, 40.0]);
        assert!(profile.windows(2).all(|w| w[1] < w[0]));
        assert!(profile[4] < 1e-3);
    }

    #[test]
    fn test_classical_limit_is_gaussian() {
        // Deep in the classical regime the Fermi profile reduces to exp(-(r/R)²)
        let fermi = FitModel::ideal_fermi(1.0, -25.0, 12.0);
        let gauss = FitModel::gaussian(1.0, 12.0);
        for r in [0.0, 3.0, 8.0, 12.0, 20.0] {
            assert_relative_eq!(fermi.evaluate(r), gauss.evaluate(r), max_relative = 1e-9);
        }
    }

    #[test]
    fn test_parameters_round_trip_through_solver_order() {
        let model = FitModel::ideal_fermi(0.9, 1.5, 20.0);
        assert_eq!(model.parameters(), vec![0.9, 1.5, 20.0]);
        let moved = model.with_parameters(&[1.0, 2.0, -21.0]);
        assert_eq!(moved, FitModel::ideal_fermi(1.0, 2.0, -21.0));
        assert_eq!(moved.with_positive_size().size(), 21.0);

        let gauss = FitModel::gaussian(0.5, 7.0).with_parameters(&[0.6, 8.0]);
        assert_eq!(gauss, FitModel::gaussian(0.6, 8.0));
        assert_eq!(gauss.t_over_tf(), None);
    }

    #[test]
    fn test_fixed_temperature_derives_fugacity() {
        let model = FitModel::fixed_temperature(1.0, 20.0, 0.2).unwrap();
        let q = model.log_fugacity().unwrap();
        assert_relative_eq!(t_over_tf_from_fugacity(q), 0.2, max_relative = 1e-6);
        assert_eq!(model.t_over_tf(), Some(0.2));
        assert_eq!(model.parameters().len(), 2);

        let moved = model.with_parameters(&[2.0, 30.0]);
        assert_eq!(moved.log_fugacity(), Some(q));
        assert!(FitModel::fixed_temperature(1.0, 20.0, -0.1).is_err());
    }

    #[test]
    fn test_t_over_tf_known_values() {
        // Classical gas: 6·F3(q) ≈ 6e^q
        assert_relative_eq!(
            t_over_tf_from_fugacity(-10.0),
            (6.0 * (-10.0_f64).exp()).powf(-1.0 / 3.0),
            max_relative = 1e-4
        );
        // Degenerate limit: F3(q) ≈ q³/6 so T/T_F ≈ 1/q
        assert_relative_eq!(t_over_tf_from_fugacity(200.0), 1.0 / 200.0, max_relative = 1e-4);
    }

    #[test]
    fn test_gaussian_integral() {
        let model = FitModel::gaussian(2.0, 5.0);
        assert_relative_eq!(model.integrated_density(), PI * 50.0, epsilon = 1e-12);
    }
}
