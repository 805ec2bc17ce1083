//! Bilinear sampling of images at fractional pixel coordinates.
//!
//! Coordinates follow the array layout: `x` indexes the first axis (rows) and
//! `y` the second (columns). Coordinates outside the image are clamped to the
//! nearest edge pixel, so every sample of a non-empty image is finite when the
//! image is.

use ndarray::{Array, ArrayView, ArrayView2, Dimension, Zip};
use thiserror::Error;

/// Error types for bilinear sampling.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InterpolationError {
    /// The image has no pixels to sample from
    #[error("cannot sample an empty image of shape {shape:?}")]
    EmptyImage { shape: (usize, usize) },
    /// Coordinate arrays do not have the same shape
    #[error("coordinate shapes differ: x {x_shape:?}, y {y_shape:?}")]
    DimensionMismatch {
        x_shape: Vec<usize>,
        y_shape: Vec<usize>,
    },
}

/// Lower index and fractional weight along one axis, clamped to `[0, len-1]`.
fn axis_weight(value: f64, len: usize) -> (usize, usize, f64) {
    let max = (len - 1) as f64;
    let clamped = value.clamp(0.0, max);
    let low = clamped.floor() as usize;
    let high = (low + 1).min(len - 1);
    (low, high, clamped - low as f64)
}

/// Sample a single point without checking the image is non-empty.
fn sample_unchecked(image: &ArrayView2<f64>, x: f64, y: f64) -> f64 {
    let (rows, cols) = image.dim();
    let (x0, x1, tx) = axis_weight(x, rows);
    let (y0, y1, ty) = axis_weight(y, cols);

    let top = image[[x0, y0]] * (1.0 - ty) + image[[x0, y1]] * ty;
    let bottom = image[[x1, y0]] * (1.0 - ty) + image[[x1, y1]] * ty;
    top * (1.0 - tx) + bottom * tx
}

/// Bilinearly interpolate `image` at a single point.
///
/// # Arguments
/// * `image` - Image indexed `[x, y]`
/// * `x` - Fractional row coordinate
/// * `y` - Fractional column coordinate
pub fn bilinear_at(image: &ArrayView2<f64>, x: f64, y: f64) -> Result<f64, InterpolationError> {
    if image.is_empty() {
        return Err(InterpolationError::EmptyImage { shape: image.dim() });
    }
    Ok(sample_unchecked(image, x, y))
}

/// Bilinearly interpolate `image` at every `(xs[i], ys[i])`.
///
/// The output has the shape of the coordinate arrays, which may have any
/// dimensionality. The radial profiler passes `(radii × angles)` grids.
///
/// # Examples
///
/// ```
/// use fermi_math::bilinear::bilinear_sample;
/// use ndarray::array;
///
/// let image = array![[0.0, 1.0], [2.0, 3.0]];
/// let xs = array![0.5, 5.0];
/// let ys = array![0.5, -1.0];
/// let values = bilinear_sample(&image.view(), &xs.view(), &ys.view()).unwrap();
/// assert_eq!(values[0], 1.5);
/// assert_eq!(values[1], 2.0); // clamped to pixel [1, 0]
/// ```
pub fn bilinear_sample<D: Dimension>(
    image: &ArrayView2<f64>,
    xs: &ArrayView<f64, D>,
    ys: &ArrayView<f64, D>,
) -> Result<Array<f64, D>, InterpolationError> {
    if image.is_empty() {
        return Err(InterpolationError::EmptyImage { shape: image.dim() });
    }
    if xs.shape() != ys.shape() {
        return Err(InterpolationError::DimensionMismatch {
            x_shape: xs.shape().to_vec(),
            y_shape: ys.shape().to_vec(),
        });
    }

    Ok(Zip::from(xs)
        .and(ys)
        .map_collect(|&x, &y| sample_unchecked(image, x, y)))
}
