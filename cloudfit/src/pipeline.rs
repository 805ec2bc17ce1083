//! End-to-end analysis of a transmission image.
//!
//! The image is normalized, an initial guess is taken from the OD image, the
//! transmission is radially averaged around the cloud center and converted to
//! an OD profile, and the part of the profile below the fit OD is fitted.
//! Temperature and atom number follow from the fitted model.

use log::{debug, info, warn};
use ndarray::{s, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::config::{AnalysisConfig, EllipseSetting, FitModelKind};
use crate::error::{AnalysisError, GeometryError};
use crate::fit::ellipticity::estimate_ellipticity;
use crate::fit::fitter::{fit, FitResult};
use crate::fit::models::FitModel;
use crate::fit::observables::observables;
use crate::image_proc::absorption::{threshold_image, trans_to_od, DEFAULT_MAX_OD};
use crate::image_proc::centroid::{center_of_mass_checked, Point};
use crate::image_proc::normalize::normalize_background;
use crate::image_proc::radial::{radial_average, EllipseModel};

/// Initial log-fugacity for Fermi fits.
pub const GUESS_LOG_FUGACITY: f64 = 4.0;
/// Smallest initial cloud radius in pixels.
pub const MIN_GUESS_RADIUS: f64 = 10.0;
/// Half-width of the box averaged for the peak OD guess.
const PEAK_BOX_HALF_WIDTH: usize = 5;
/// Lowest temperature an error band is allowed to reach.
const MIN_BAND_TEMPERATURE: f64 = 0.001;

/// Starting parameters derived from the image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InitialGuess {
    pub n0: f64,
    pub log_fugacity: f64,
    pub r_cloud: f64,
}

/// A normalized image ready for profiling.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedImage {
    pub transmission: Array2<f64>,
    /// OD of `transmission`, saturated at the configured image OD
    pub od: Array2<f64>,
    pub center: Point,
    pub guess: InitialGuess,
}

/// Fits at fixed temperatures bracketing the free fit.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorBands {
    pub upper: FitModel,
    pub lower: FitModel,
    pub upper_profile: Vec<f64>,
    pub lower_profile: Vec<f64>,
}

/// Everything produced by [`fit_image`].
#[derive(Debug, Clone, PartialEq)]
pub struct ImageFit {
    /// Reduced temperature; infinite for Gaussian fits
    pub t_over_tf: f64,
    pub atom_number: f64,
    pub model: FitModel,
    pub fit: FitResult,
    pub center: Point,
    pub ellipse: EllipseModel,
    pub radii: Vec<f64>,
    pub od_profile: Vec<f64>,
    /// Fitted model evaluated at every radius
    pub fitted_profile: Vec<f64>,
    /// Index of the first fitted radius
    pub cutoff: usize,
    pub error_bands: Option<ErrorBands>,
}

/// Mean OD over a box of half-width 5 at `center`, clamped to the image.
fn peak_od(od: &ArrayView2<f64>, center: Point) -> f64 {
    let (rows, cols) = od.dim();
    let clamp_range = |c: f64, len: usize| {
        let c = c.max(0.0) as usize;
        let lo = c.saturating_sub(PEAK_BOX_HALF_WIDTH).min(len.saturating_sub(1));
        let hi = (c + PEAK_BOX_HALF_WIDTH).min(len).max(lo + 1);
        (lo, hi)
    };
    let (x0, x1) = clamp_range(center.x, rows);
    let (y0, y1) = clamp_range(center.y, cols);
    od.slice(s![x0..x1, y0..y1]).mean().unwrap_or(f64::NAN)
}

/// Half the number of rows whose mean OD exceeds 10% of the peak, at least [`MIN_GUESS_RADIUS`].
fn radius_guess(od: &ArrayView2<f64>, n0: f64) -> f64 {
    let radius = od
        .mean_axis(Axis(1))
        .map(|row_means| {
            let above = threshold_image(&row_means.view(), 0.1 * n0, false);
            0.5 * above.iter().filter(|&&b| b).count() as f64
        })
        .unwrap_or(0.0);
    radius.max(MIN_GUESS_RADIUS)
}

/// Normalize a transmission image and guess initial fit parameters.
///
/// The center is taken from `config.center` when given, otherwise from the
/// centroid of the OD image (before and again after normalization). When the
/// background mask does not fit inside the image the un-normalized image is
/// used and a warning is logged.
pub fn norm_and_guess(
    transmission: &ArrayView2<f64>,
    config: &AnalysisConfig,
) -> Result<PreparedImage, AnalysisError> {
    let od = trans_to_od(transmission, DEFAULT_MAX_OD);
    let center = match config.center {
        Some(c) => c,
        None => center_of_mass_checked(&od.view())?,
    };

    let n0 = peak_od(&od.view(), center);
    let r_cloud = radius_guess(&od.view(), n0);
    let guess = InitialGuess {
        n0,
        log_fugacity: GUESS_LOG_FUGACITY,
        r_cloud,
    };

    let transmission = if config.normalize {
        match normalize_background(transmission, center, r_cloud) {
            Ok(normalized) => normalized,
            Err(e @ GeometryError::CannotNormalize { .. }) => {
                warn!("couldn't normalize the image: {e}");
                transmission.to_owned()
            }
            Err(e) => return Err(e.into()),
        }
    } else {
        transmission.to_owned()
    };

    let od = trans_to_od(&transmission.view(), config.image_max_od);
    let center = match config.center {
        Some(c) => c,
        None => center_of_mass_checked(&od.view())?,
    };
    debug!(
        "initial guess n0={:.3} q={} r={:.1} at ({:.2}, {:.2})",
        guess.n0, guess.log_fugacity, guess.r_cloud, center.x, center.y
    );

    Ok(PreparedImage {
        transmission,
        od,
        center,
        guess,
    })
}

fn initial_model(kind: &FitModelKind, guess: &InitialGuess) -> Result<FitModel, AnalysisError> {
    Ok(match *kind {
        FitModelKind::IdealFermi | FitModelKind::IdealFermiWithErrorBands { .. } => {
            FitModel::ideal_fermi(guess.n0, guess.log_fugacity, guess.r_cloud)
        }
        FitModelKind::IdealFermiFixedTemperature { t_over_tf } => {
            FitModel::fixed_temperature(guess.n0, guess.r_cloud, t_over_tf)?
        }
        FitModelKind::Gaussian => FitModel::gaussian(guess.n0, guess.r_cloud),
    })
}

/// First radius where `values` drops below `level`, linearly interpolated.
fn half_max_radius(radii: &[f64], values: &[f64], level: f64) -> Option<f64> {
    let i = values.iter().position(|&v| v < level)?;
    if i == 0 {
        return None;
    }
    let (r0, r1) = (radii[i - 1], radii[i]);
    let (v0, v1) = (values[i - 1], values[i]);
    Some(r0 + (r1 - r0) * (v0 - level) / (v0 - v1))
}

/// Rescale the model size so its half width matches the measured profile.
///
/// The model is returned unchanged when the profile never falls below half
/// the model peak.
fn match_half_width(model: FitModel, radii: &[f64], od_profile: &[f64]) -> FitModel {
    let measured = half_max_radius(radii, od_profile, 0.5 * model.n0());
    match (measured, model.half_width()) {
        (Some(measured), Some(half)) if measured > 0.0 => {
            let size = model.size() * measured / half;
            debug!(
                "initial size {:.2} -> {:.2} from half width {:.2}",
                model.size(),
                size,
                measured
            );
            model.with_size(size)
        }
        _ => model,
    }
}

fn band_fit(
    t_over_tf: f64,
    start: &FitModel,
    radii: &[f64],
    values: &[f64],
    config: &AnalysisConfig,
) -> Result<FitModel, AnalysisError> {
    let initial = FitModel::fixed_temperature(start.n0(), start.size(), t_over_tf)?;
    Ok(fit(&initial, radii, values, None, &config.fit)?.model)
}

/// Fit a single transmission image.
///
/// # Arguments
/// * `transmission` - Transmission image (atoms dark, background near one)
/// * `config` - Analysis settings
///
/// # Returns
/// Temperature, atom number, the fitted model and the profiles behind them.
pub fn fit_image(
    transmission: &ArrayView2<f64>,
    config: &AnalysisConfig,
) -> Result<ImageFit, AnalysisError> {
    config.validate()?;
    let prepared = norm_and_guess(transmission, config)?;
    let center = prepared.center;

    let ellipse = match config.ellipse {
        EllipseSetting::Circular => EllipseModel::circle(),
        EllipseSetting::Fixed(ellipse) => ellipse,
        EllipseSetting::Estimate => {
            estimate_ellipticity(&prepared.od.view(), center, &config.ellipticity, &config.range)?
                .ellipse(config.ellipticity.angle_rad)
        }
    };

    let profile = radial_average(&prepared.transmission.view(), center, config.dr, None, ellipse)?;
    let od_profile = trans_to_od(&ArrayView1::from(&profile.values), config.profile_max_od).to_vec();
    let cutoff = config.range.select(&od_profile)?;
    let radii = profile.radii;
    let (fit_radii, fit_values) = (&radii[cutoff..], &od_profile[cutoff..]);

    let initial = match_half_width(
        initial_model(&config.model, &prepared.guess)?,
        &radii,
        &od_profile,
    );
    let result = fit(&initial, fit_radii, fit_values, None, &config.fit)?;
    let model = result.model;
    let obs = observables(&model, config.pixel_size, config.cross_section)?;

    let error_bands = match config.model {
        FitModelKind::IdealFermiWithErrorBands { band } => {
            let upper = band_fit(obs.t_over_tf + band, &model, fit_radii, fit_values, config)?;
            let lower_t = (obs.t_over_tf - band).max(MIN_BAND_TEMPERATURE);
            let lower = band_fit(lower_t, &model, fit_radii, fit_values, config)?;
            Some(ErrorBands {
                upper,
                lower,
                upper_profile: upper.profile(&radii),
                lower_profile: lower.profile(&radii),
            })
        }
        _ => None,
    };

    info!(
        "{} fit: T/T_F = {:.5}, N = {:.1} million",
        model.name(),
        obs.t_over_tf,
        obs.atom_number * 1e-6
    );

    Ok(ImageFit {
        t_over_tf: obs.t_over_tf,
        atom_number: obs.atom_number,
        fitted_profile: model.profile(&radii),
        model,
        fit: result,
        center,
        ellipse,
        radii,
        od_profile,
        cutoff,
        error_bands,
    })
}

/// Normalize several shots of the same cloud, average them and fit the mean.
pub fn fit_images(
    transmissions: &[ArrayView2<f64>],
    config: &AnalysisConfig,
) -> Result<ImageFit, AnalysisError> {
    let first = transmissions
        .first()
        .ok_or_else(|| AnalysisError::DegenerateInput("no images to fit".to_string()))?;
    if transmissions.len() == 1 {
        return fit_image(first, config);
    }

    let shape = first.dim();
    let mut sum = Array2::<f64>::zeros(shape);
    for image in transmissions {
        if image.dim() != shape {
            return Err(GeometryError::ShapeMismatch {
                expected: vec![shape.0, shape.1],
                got: image.shape().to_vec(),
            }
            .into());
        }
        sum += &norm_and_guess(image, config)?.transmission;
    }
    let average = sum / transmissions.len() as f64;
    fit_image(&average.view(), config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fit::fitter::FitOptions;
    use crate::image_proc::test_patterns::{cloud_od_image, transmission_from_od};
    use approx::assert_relative_eq;

    #[test]
    fn test_peak_od_box_is_clamped() {
        let od = Array2::from_elem((20, 20), 0.7);
        assert_relative_eq!(peak_od(&od.view(), Point::new(10.0, 10.0)), 0.7);
        assert_relative_eq!(peak_od(&od.view(), Point::new(0.0, 19.5)), 0.7);
    }

    #[test]
    fn test_radius_guess_floor() {
        let od = Array2::<f64>::zeros((50, 50));
        assert_eq!(radius_guess(&od.view(), 1.0), MIN_GUESS_RADIUS);

        // 30 rows well above threshold give a radius of 15
        let od = Array2::from_shape_fn((50, 50), |(i, _)| if (10..40).contains(&i) { 1.0 } else { 0.0 });
        assert_eq!(radius_guess(&od.view(), 1.0), 15.0);
    }

    #[test]
    fn test_half_max_radius_interpolates() {
        let radii = [0.0, 1.0, 2.0, 3.0];
        let values = [1.0, 0.8, 0.4, 0.1];
        assert_relative_eq!(half_max_radius(&radii, &values, 0.5).unwrap(), 1.75);
        assert!(half_max_radius(&radii, &values, 0.05).is_none());
        assert!(half_max_radius(&radii, &values, 2.0).is_none());
    }

    #[test]
    fn test_narrow_start_recovers_degenerate_cloud() {
        // Start with the row-count guess of a dilute cloud: half the true size
        let q = crate::fit::fugacity_from_temperature(0.15).unwrap();
        let truth = FitModel::ideal_fermi(0.8, q, 20.0);
        let radii: Vec<f64> = (8..214).map(|i| i as f64 * 0.3).collect();
        let profile = truth.profile(&radii);
        let guess = FitModel::ideal_fermi(0.74, GUESS_LOG_FUGACITY, 10.5);

        let start = match_half_width(guess, &radii, &profile);
        assert_relative_eq!(start.size(), 20.0, max_relative = 0.1);

        let result = fit(&start, &radii, &profile, None, &FitOptions::default()).unwrap();
        assert!(result.converged, "termination {:?}", result.termination);
        assert_relative_eq!(result.model.log_fugacity().unwrap(), q, max_relative = 0.01);
        assert_relative_eq!(result.model.size(), 20.0, max_relative = 0.01);
    }

    #[test]
    fn test_norm_and_guess_without_normalization() {
        let center = Point::new(40.0, 40.0);
        let od = cloud_od_image((81, 81), center, &FitModel::gaussian(0.6, 8.0), 1.0);
        let trans = transmission_from_od(&od);
        let config = AnalysisConfig {
            normalize: false,
            ..AnalysisConfig::default()
        };
        let prepared = norm_and_guess(&trans.view(), &config).unwrap();
        assert_relative_eq!(prepared.center.x, 40.0, epsilon = 1e-9);
        assert_relative_eq!(prepared.center.y, 40.0, epsilon = 1e-9);
        assert!(prepared.guess.n0 > 0.4 && prepared.guess.n0 <= 0.6);
        assert_eq!(prepared.guess.log_fugacity, GUESS_LOG_FUGACITY);
        assert_eq!(prepared.transmission, trans);
    }

    #[test]
    fn test_cannot_normalize_falls_back() {
        // Cloud in a corner: the mask leaves the image
        let center = Point::new(12.0, 12.0);
        let od = cloud_od_image((60, 60), center, &FitModel::gaussian(0.6, 5.0), 1.0);
        let trans = transmission_from_od(&od);
        let prepared = norm_and_guess(&trans.view(), &AnalysisConfig::default()).unwrap();
        assert_eq!(prepared.transmission, trans);
    }

    #[test]
    fn test_zero_od_image_is_degenerate() {
        let trans = Array2::from_elem((30, 30), 1.0);
        assert!(matches!(
            fit_image(&trans.view(), &AnalysisConfig::default()),
            Err(AnalysisError::Geometry(GeometryError::DegenerateInput(_)))
        ));
    }

    #[test]
    fn test_fit_images_requires_input() {
        assert!(matches!(
            fit_images(&[], &AnalysisConfig::default()),
            Err(AnalysisError::DegenerateInput(_))
        ));
    }
}
