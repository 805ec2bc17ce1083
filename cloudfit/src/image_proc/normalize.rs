//! Background normalization of absorption images.
//!
//! Probe beam intensity drifts between the shots with and without atoms leave
//! a residual tilt in the transmission image. [`normalize_background`] masks
//! the cloud and divides out first-order trends along both axes;
//! [`normalize_edge_strip`] applies a single scale factor taken from the
//! image border.

use log::debug;
use ndarray::{s, Array2, ArrayView2, Axis};

use fermi_math::polyfit;

use super::centroid::Point;
use crate::error::GeometryError;

/// Half-width of the background mask in units of the cloud radius.
pub const MASK_SCALE: f64 = 1.5;

/// Default width in pixels of the border strips used by [`normalize_edge_strip`].
pub const DEFAULT_STRIP_WIDTH: usize = 5;

/// Fit a line through per-index means outside `[lo, hi)` and return it
/// evaluated at every index `0..len`.
fn linear_trend(
    means_low: impl Iterator<Item = f64>,
    means_high: impl Iterator<Item = f64>,
    lo: usize,
    hi: usize,
    len: usize,
) -> Result<Vec<f64>, GeometryError> {
    let xs: Vec<f64> = (0..lo).chain(hi..len).map(|i| i as f64).collect();
    let ys: Vec<f64> = means_low.chain(means_high).collect();
    let line = polyfit(&xs, &ys, 1)?;
    Ok((0..len).map(|i| line.eval(i as f64)).collect())
}

/// Divide out linear background trends outside a box around the cloud.
///
/// The mask is the box `center ± 1.5·cloud_radius` (rounded to whole pixels).
/// Row means of the pixels above and below the mask are fitted with a line
/// and each row is divided by it; the column means left and right of the mask
/// are then fitted on the row-corrected image and each column is divided by
/// that second line.
///
/// # Arguments
/// * `image` - Transmission image
/// * `center` - Cloud center
/// * `cloud_radius` - Approximate cloud radius in pixels
///
/// # Returns
/// The normalized image, or [`GeometryError::CannotNormalize`] when the mask
/// touches the image border.
pub fn normalize_background(
    image: &ArrayView2<f64>,
    center: Point,
    cloud_radius: f64,
) -> Result<Array2<f64>, GeometryError> {
    let (rows, cols) = image.dim();
    let half = MASK_SCALE * cloud_radius;
    let x1 = (center.x - half).round() as i64;
    let x2 = (center.x + half).round() as i64;
    let y1 = (center.y - half).round() as i64;
    let y2 = (center.y + half).round() as i64;

    if !(x1 > 0 && x2 < rows as i64 && y1 > 0 && y2 < cols as i64) {
        return Err(GeometryError::CannotNormalize {
            row_range: (x1, x2),
            col_range: (y1, y2),
            rows,
            cols,
        });
    }
    let (x1, x2, y1, y2) = (x1 as usize, x2 as usize, y1 as usize, y2 as usize);

    let row_means = image.mean_axis(Axis(1)).ok_or_else(|| {
        GeometryError::DegenerateInput("image has no columns".to_string())
    })?;
    let row_trend = linear_trend(
        row_means.slice(s![..x1]).iter().copied(),
        row_means.slice(s![x2..]).iter().copied(),
        x1,
        x2,
        rows,
    )?;

    let mut normalized = image.to_owned();
    for (mut row, trend) in normalized.rows_mut().into_iter().zip(row_trend.iter()) {
        row /= *trend;
    }

    let col_means = normalized.mean_axis(Axis(0)).ok_or_else(|| {
        GeometryError::DegenerateInput("image has no rows".to_string())
    })?;
    let col_trend = linear_trend(
        col_means.slice(s![..y1]).iter().copied(),
        col_means.slice(s![y2..]).iter().copied(),
        y1,
        y2,
        cols,
    )?;
    for (mut col, trend) in normalized.columns_mut().into_iter().zip(col_trend.iter()) {
        col /= *trend;
    }

    debug!(
        "background normalized with mask rows {x1}..{x2}, cols {y1}..{y2}; row trend {:.4}..{:.4}",
        row_trend[0],
        row_trend[rows - 1]
    );
    Ok(normalized)
}

/// Scale an image so the mean over its four border strips equals `target`.
///
/// The top and bottom strips are averaged pairwise, as are the left and
/// right strips; the normalization factor is the mean over both averaged
/// strips.
///
/// # Arguments
/// * `image` - Image to scale
/// * `target` - Desired mean value at the border
/// * `strip_width` - Width of each strip in pixels
pub fn normalize_edge_strip(
    image: &ArrayView2<f64>,
    target: f64,
    strip_width: usize,
) -> Result<Array2<f64>, GeometryError> {
    let (rows, cols) = image.dim();
    if strip_width == 0 || strip_width > rows || strip_width > cols {
        return Err(GeometryError::DegenerateInput(format!(
            "strip width {strip_width} does not fit a {rows}x{cols} image"
        )));
    }

    let top = image.slice(s![..strip_width, ..]);
    let bottom = image.slice(s![rows - strip_width.., ..]);
    let left = image.slice(s![.., ..strip_width]);
    let right = image.slice(s![.., cols - strip_width..]);

    let vertical_sum = 0.5 * (top.sum() + bottom.sum());
    let horizontal_sum = 0.5 * (left.sum() + right.sum());
    let count = (top.len() + left.len()) as f64;
    let factor = (vertical_sum + horizontal_sum) / count;

    if factor == 0.0 || !factor.is_finite() {
        return Err(GeometryError::DegenerateInput(format!(
            "border mean {factor} cannot be normalized"
        )));
    }
    Ok(image.mapv(|v| v * target / factor))
}
