//! Ellipticity of an atom cloud from angular profile residuals.
//!
//! For a trial axis ratio the image is sampled on ellipses, and the line
//! profile along each angle is compared with the angle average beyond the fit
//! cutoff. The ratio minimizing the mean absolute per-angle residual is the
//! one whose ellipses follow the cloud's iso-density contours.

use std::time::Duration;

use log::{debug, warn};
use ndarray::{ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

use fermi_math::{minimize_bounded, MinimizeError, MinimizeOptions};

use super::range::RangeOptions;
use crate::error::AnalysisError;
use crate::image_proc::centroid::Point;
use crate::image_proc::radial::{line_profiles, radial_profile_errors, EllipseModel};

/// Search settings for [`estimate_ellipticity`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EllipticityOptions {
    /// Absolute tolerance on the axis ratio
    pub tolerance: f64,
    /// Search interval for the axis ratio
    pub bounds: (f64, f64),
    pub max_evaluations: usize,
    pub deadline: Option<Duration>,
    /// Radial step of the trial profiles in pixels
    pub dr: f64,
    /// Rotation of the trial ellipses in radians
    pub angle_rad: f64,
}

impl Default for EllipticityOptions {
    fn default() -> Self {
        Self {
            tolerance: 2e-3,
            bounds: (0.6, 1.0),
            max_evaluations: 100,
            deadline: None,
            dr: 0.3,
            angle_rad: 0.0,
        }
    }
}

/// Result of an ellipticity search.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EllipticityEstimate {
    pub ratio: f64,
    /// Mean absolute per-angle residual at `ratio`
    pub objective: f64,
    pub evaluations: usize,
    pub converged: bool,
}

impl EllipticityEstimate {
    pub fn ellipse(&self, angle_rad: f64) -> EllipseModel {
        EllipseModel::new(self.ratio, angle_rad)
    }
}

/// Mean absolute angular residual of the profiles sampled with `ellipse`.
pub fn angular_residual(
    od: &ArrayView2<f64>,
    center: Point,
    dr: f64,
    ellipse: EllipseModel,
    range: &RangeOptions,
) -> Result<f64, AnalysisError> {
    let lines = line_profiles(od, center, dr, None, ellipse)?;
    let average = lines.average();
    let cutoff = range.select(&average.values)?;
    let errors = radial_profile_errors(
        &lines.profiles.view(),
        &ArrayView1::from(&average.values),
        cutoff,
    )?;
    Ok(errors.mean_abs)
}

/// Estimate the axis ratio of the cloud in an OD image.
///
/// # Arguments
/// * `od` - Optical density image
/// * `center` - Cloud center
/// * `options` - Search interval, tolerance and limits
/// * `range` - Fit range settings used for the residual cutoff
///
/// # Returns
/// The best ratio found. Geometry failures while sampling (for example a
/// profile shorter than the minimum cutoff) are returned as errors.
pub fn estimate_ellipticity(
    od: &ArrayView2<f64>,
    center: Point,
    options: &EllipticityOptions,
    range: &RangeOptions,
) -> Result<EllipticityEstimate, AnalysisError> {
    let mut failure: Option<AnalysisError> = None;
    let objective = |ratio: f64| {
        match angular_residual(od, center, options.dr, EllipseModel::new(ratio, options.angle_rad), range) {
            Ok(value) => value,
            Err(e) => {
                failure.get_or_insert(e);
                f64::NAN
            }
        }
    };

    let minimize_options = MinimizeOptions {
        x_tol: options.tolerance,
        max_evaluations: options.max_evaluations,
        deadline: options.deadline,
    };
    let (lower, upper) = options.bounds;
    let result = minimize_bounded(objective, lower, upper, &minimize_options);

    let result = match (result, failure) {
        (_, Some(e)) => return Err(e),
        (Err(e @ MinimizeError::NanObjective { .. }), None) => {
            return Err(AnalysisError::DegenerateInput(format!(
                "ellipticity objective is undefined: {e}"
            )))
        }
        (Err(e), None) => return Err(e.into()),
        (Ok(result), None) => result,
    };

    if result.converged() {
        debug!(
            "ellipticity {:.4} after {} evaluations (residual {:.4e})",
            result.x, result.evaluations, result.fx
        );
    } else {
        warn!(
            "ellipticity search stopped at {:.4} ({:?}) after {} evaluations",
            result.x, result.status, result.evaluations
        );
    }

    Ok(EllipticityEstimate {
        ratio: result.x,
        objective: result.fx,
        evaluations: result.evaluations,
        converged: result.converged(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RangeError;
    use crate::fit::models::FitModel;
    use crate::image_proc::test_patterns::cloud_od_image;

    #[test]
    fn test_stretched_cloud_recovers_inverse_stretch() {
        let center = Point::new(60.0, 60.0);
        let model = FitModel::ideal_fermi(1.5, 2.0, 22.0);
        let stretch = 1.0 / 0.81;
        let od = cloud_od_image((121, 121), center, &model, stretch);

        let estimate = estimate_ellipticity(
            &od.view(),
            center,
            &EllipticityOptions::default(),
            &RangeOptions::default(),
        )
        .unwrap();
        assert!(estimate.converged);
        assert!(
            (estimate.ratio - 0.81).abs() < 0.01,
            "ratio {}",
            estimate.ratio
        );
    }

    #[test]
    fn test_round_cloud_is_circular() {
        let center = Point::new(50.0, 50.0);
        let model = FitModel::gaussian(1.5, 15.0);
        let od = cloud_od_image((101, 101), center, &model, 1.0);
        let estimate = estimate_ellipticity(
            &od.view(),
            center,
            &EllipticityOptions::default(),
            &RangeOptions::default(),
        )
        .unwrap();
        assert!(estimate.ratio > 0.98, "ratio {}", estimate.ratio);
    }

    #[test]
    fn test_small_image_surfaces_range_error() {
        let od = ndarray::Array2::from_elem((4, 4), 0.5);
        let result = estimate_ellipticity(
            &od.view(),
            Point::new(2.0, 2.0),
            &EllipticityOptions::default(),
            &RangeOptions::default(),
        );
        assert!(matches!(
            result,
            Err(AnalysisError::Range(RangeError::ProfileTooShort { .. }))
        ));
    }
}
