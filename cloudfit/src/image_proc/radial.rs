//! Radial and line profiles of cloud images.
//!
//! Profiles are sampled on a `(radii × angles)` grid of points on ellipses
//! around a center and bilinearly interpolated. Averaging over the angle axis
//! gives the radial profile used for fitting; the un-averaged grid is kept
//! for the angular residuals that drive ellipticity estimation.

use std::f64::consts::PI;

use log::debug;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use fermi_math::bilinear_sample;

use super::centroid::Point;
use crate::error::GeometryError;

/// Sampling ellipse: axis ratio along rows and rotation angle in radians.
///
/// A ratio below one samples a cloud that is elongated along the columns.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EllipseModel {
    pub ratio: f64,
    pub angle_rad: f64,
}

impl Default for EllipseModel {
    fn default() -> Self {
        Self {
            ratio: 1.0,
            angle_rad: 0.0,
        }
    }
}

impl EllipseModel {
    pub fn new(ratio: f64, angle_rad: f64) -> Self {
        Self { ratio, angle_rad }
    }

    /// Circular sampling.
    pub fn circle() -> Self {
        Self::default()
    }
}

/// Angle-averaged profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RadialProfile {
    pub radii: Vec<f64>,
    pub values: Vec<f64>,
}

impl RadialProfile {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Profiles along every sampling angle before averaging.
#[derive(Debug, Clone, PartialEq)]
pub struct LineProfiles {
    pub radii: Array1<f64>,
    pub angles: Array1<f64>,
    /// Samples indexed `[radius, angle]`
    pub profiles: Array2<f64>,
}

impl LineProfiles {
    /// Average over angles.
    pub fn average(&self) -> RadialProfile {
        let values = self
            .profiles
            .mean_axis(Axis(1))
            .map(|m| m.to_vec())
            .unwrap_or_else(|| vec![f64::NAN; self.radii.len()]);
        RadialProfile {
            radii: self.radii.to_vec(),
            values,
        }
    }
}

/// Summed deviation of each line profile from the averaged profile.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileErrors {
    /// `Σ_r (profile(r, φ) - average(r))` for radii from the cutoff on
    pub per_angle: Array1<f64>,
    /// Mean of `|per_angle|`
    pub mean_abs: f64,
}

/// A line profile through a point.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageSlice {
    /// Position along the slice in pixels, centred on the slice point
    pub offsets: Array1<f64>,
    pub values: Array1<f64>,
}

/// Smallest distance from `center` to an image edge.
pub fn max_radius(shape: (usize, usize), center: Point) -> Result<f64, GeometryError> {
    let (rows, cols) = shape;
    if !center.x.is_finite() || !center.y.is_finite() {
        return Err(GeometryError::NoRadialExtent {
            x: center.x,
            y: center.y,
            rows,
            cols,
        });
    }
    let r_max = (rows as f64 - center.x)
        .min(center.x)
        .min(cols as f64 - center.y)
        .min(center.y);
    if !(r_max > 0.0) || !r_max.is_finite() {
        return Err(GeometryError::NoRadialExtent {
            x: center.x,
            y: center.y,
            rows,
            cols,
        });
    }
    Ok(r_max)
}

/// Radii `0, dr, 2dr, ...` strictly below `r_max`.
pub fn radial_grid(r_max: f64, dr: f64) -> Result<Array1<f64>, GeometryError> {
    if !(dr > 0.0) || !dr.is_finite() {
        return Err(GeometryError::InvalidStep(dr));
    }
    let count = (r_max / dr).ceil() as usize;
    Ok((0..count)
        .map(|i| i as f64 * dr)
        .filter(|&r| r < r_max)
        .collect())
}

/// `ceil(2π·r_max)` angles equally spaced over `[0, 2π)`.
pub fn default_angles(r_max: f64) -> Array1<f64> {
    let count = ((2.0 * PI * r_max).ceil() as usize).max(1);
    Array1::from_shape_fn(count, |i| 2.0 * PI * i as f64 / count as f64)
}

/// Sample the image along rays of an ellipse family.
///
/// # Arguments
/// * `image` - Image indexed `[x, y]`
/// * `center` - Center of the ellipses
/// * `radii` - Radial coordinates
/// * `angles` - Sampling angles in radians
/// * `ellipse` - Axis ratio and rotation
///
/// # Returns
/// Samples indexed `[radius, angle]`
pub fn sample_line_profiles(
    image: &ArrayView2<f64>,
    center: Point,
    radii: &ArrayView1<f64>,
    angles: &ArrayView1<f64>,
    ellipse: EllipseModel,
) -> Result<Array2<f64>, GeometryError> {
    if angles.is_empty() {
        return Err(GeometryError::NoAngles);
    }
    let shape = (radii.len(), angles.len());
    let (sin_a, cos_a) = ellipse.angle_rad.sin_cos();
    let ell = ellipse.ratio;

    let xs = Array2::from_shape_fn(shape, |(i, j)| {
        let (r, (sin_p, cos_p)) = (radii[i], angles[j].sin_cos());
        center.x + ell * r * cos_p * cos_a - r * sin_p * sin_a
    });
    let ys = Array2::from_shape_fn(shape, |(i, j)| {
        let (r, (sin_p, cos_p)) = (radii[i], angles[j].sin_cos());
        center.y + r * sin_p * cos_a - ell * r * cos_p * sin_a
    });

    Ok(bilinear_sample(image, &xs.view(), &ys.view())?)
}

/// Line profiles on the default radial grid.
///
/// Radii run from zero in steps of `dr` up to the distance from `center` to
/// the nearest image edge. Without explicit `angles`, [`default_angles`] is
/// used.
pub fn line_profiles(
    image: &ArrayView2<f64>,
    center: Point,
    dr: f64,
    angles: Option<&ArrayView1<f64>>,
    ellipse: EllipseModel,
) -> Result<LineProfiles, GeometryError> {
    let r_max = max_radius(image.dim(), center)?;
    let radii = radial_grid(r_max, dr)?;
    let angles = match angles {
        Some(a) => a.to_owned(),
        None => default_angles(r_max),
    };
    let profiles = sample_line_profiles(image, center, &radii.view(), &angles.view(), ellipse)?;
    debug!(
        "sampled {} radii x {} angles around ({:.2}, {:.2}), ellipse {:.3}",
        radii.len(),
        angles.len(),
        center.x,
        center.y,
        ellipse.ratio
    );
    Ok(LineProfiles {
        radii,
        angles,
        profiles,
    })
}

/// Angle-averaged profile of `image` around `center`.
///
/// # Arguments
/// * `image` - Image indexed `[x, y]`
/// * `center` - Center of the ellipses
/// * `dr` - Radial step in pixels
/// * `angles` - Optional sampling angles in radians
/// * `ellipse` - Axis ratio and rotation
pub fn radial_average(
    image: &ArrayView2<f64>,
    center: Point,
    dr: f64,
    angles: Option<&ArrayView1<f64>>,
    ellipse: EllipseModel,
) -> Result<RadialProfile, GeometryError> {
    Ok(line_profiles(image, center, dr, angles, ellipse)?.average())
}

/// Per-angle deviation of line profiles from an averaged profile.
///
/// Only radii at or beyond `cutoff` contribute.
pub fn radial_profile_errors(
    profiles: &ArrayView2<f64>,
    average: &ArrayView1<f64>,
    cutoff: usize,
) -> Result<ProfileErrors, GeometryError> {
    let (n_radii, n_angles) = profiles.dim();
    if average.len() != n_radii {
        return Err(GeometryError::ShapeMismatch {
            expected: vec![n_radii],
            got: vec![average.len()],
        });
    }
    if cutoff >= n_radii || n_angles == 0 {
        return Err(GeometryError::DegenerateInput(format!(
            "no profile samples beyond cutoff {cutoff} in a {n_radii}x{n_angles} grid"
        )));
    }

    let mut per_angle = Array1::<f64>::zeros(n_angles);
    for (row, &mean) in profiles.outer_iter().zip(average.iter()).skip(cutoff) {
        per_angle.zip_mut_with(&row, |acc, &v| *acc += v - mean);
    }
    let mean_abs = per_angle.mapv(f64::abs).sum() / n_angles as f64;
    Ok(ProfileErrors {
        per_angle,
        mean_abs,
    })
}

/// Samples per pixel along an image slice.
pub const SLICE_SAMPLES_PER_PIXEL: usize = 3;

/// Take a line profile through `center` at `angle_deg` from the row axis.
///
/// The slice extends over 80% of the shorter distance from `center` to where
/// the line leaves the image. With `width`, each sample is the mean over
/// `round(width)` points spread perpendicular to the slice.
pub fn image_slice(
    image: &ArrayView2<f64>,
    center: Point,
    angle_deg: f64,
    width: Option<f64>,
) -> Result<ImageSlice, GeometryError> {
    let angle = angle_deg.to_radians();
    let a = angle.tan();
    let b = center.y - center.x * a;
    let (rows, cols) = image.dim();
    let xmax = rows as f64 - 1.0;
    let ymax = cols as f64 - 1.0;

    // Where the line y = a·x + b enters and leaves the image
    let start = if 0.0 < b && b < ymax {
        (0.0, b)
    } else if 0.0 < -b / a && -b / a < xmax {
        (-b / a, 0.0)
    } else {
        ((ymax - b) / a, ymax)
    };
    let stop = if 0.0 < a * xmax + b && a * xmax + b < ymax {
        (xmax, a * xmax + b)
    } else if 0.0 < (ymax - b) / a && (ymax - b) / a < xmax {
        ((ymax - b) / a, ymax)
    } else {
        (-b / a, 0.0)
    };

    let dist = |p: (f64, f64)| ((p.0 - center.x).powi(2) + (p.1 - center.y).powi(2)).sqrt();
    let half_len = 0.8 * dist(start).min(dist(stop));
    if !(half_len > 0.0) || !half_len.is_finite() {
        return Err(GeometryError::DegenerateInput(format!(
            "slice through ({:.2}, {:.2}) at {angle_deg} deg has no extent",
            center.x, center.y
        )));
    }

    let step = 1.0 / SLICE_SAMPLES_PER_PIXEL as f64;
    let count = (2.0 * half_len * SLICE_SAMPLES_PER_PIXEL as f64).ceil() as usize;
    let ts: Vec<f64> = (0..count).map(|i| -half_len + i as f64 * step).collect();
    let (sin_t, cos_t) = angle.sin_cos();

    let values = match width {
        Some(w) => {
            let n_perp = (w.round() as usize).max(1);
            let perp: Vec<f64> = if n_perp == 1 {
                vec![-w / 2.0]
            } else {
                (0..n_perp)
                    .map(|k| -w / 2.0 + w * k as f64 / (n_perp - 1) as f64)
                    .collect()
            };
            let shape = (ts.len(), perp.len());
            let xs = Array2::from_shape_fn(shape, |(i, k)| {
                center.x + ts[i] * cos_t - perp[k] * sin_t
            });
            let ys = Array2::from_shape_fn(shape, |(i, k)| {
                center.y + ts[i] * sin_t + perp[k] * cos_t
            });
            let samples = bilinear_sample(image, &xs.view(), &ys.view())?;
            samples
                .mean_axis(Axis(1))
                .ok_or_else(|| GeometryError::DegenerateInput("empty slice width".to_string()))?
        }
        None => {
            let inner = if ts.len() > 2 { &ts[1..ts.len() - 1] } else { &ts[..0] };
            let xs: Array1<f64> = inner.iter().map(|t| center.x + t * cos_t).collect();
            let ys: Array1<f64> = inner.iter().map(|t| center.y + t * sin_t).collect();
            bilinear_sample(image, &xs.view(), &ys.view())?
        }
    };

    let half = values.len() as f64 / 2.0;
    let offsets = Array1::from_shape_fn(values.len(), |i| (i as f64 - half) * step);
    Ok(ImageSlice { offsets, values })
}
