//! Intensity-weighted centroid of an image.
//!
//! The centroid is taken over every pixel with the pixel value as weight, so
//! it should be computed on an OD image (atoms bright, background near zero).

use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};

use crate::error::GeometryError;

/// Position in pixel coordinates.
///
/// `x` is the row index (first array axis) and `y` the column index.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Raw zeroth and first moments `(m00, m10, m01)` with `m10` along rows.
fn raw_moments(image: &ArrayView2<f64>) -> (f64, f64, f64) {
    let mut m00 = 0.0;
    let mut m10 = 0.0;
    let mut m01 = 0.0;
    for ((row, col), &intensity) in image.indexed_iter() {
        m00 += intensity;
        m10 += row as f64 * intensity;
        m01 += col as f64 * intensity;
    }
    (m00, m10, m01)
}

/// Intensity-weighted center of mass over all pixels.
///
/// The result is NaN or infinite when the total intensity is zero; use
/// [`center_of_mass_checked`] when the input is not known to be positive.
///
/// # Arguments
/// * `image` - Image with non-negative weights
///
/// # Returns
/// Centroid as a [`Point`]
pub fn center_of_mass(image: &ArrayView2<f64>) -> Point {
    let (m00, m10, m01) = raw_moments(image);
    Point {
        x: m10 / m00,
        y: m01 / m00,
    }
}

/// Center of mass that rejects images without positive total intensity.
pub fn center_of_mass_checked(image: &ArrayView2<f64>) -> Result<Point, GeometryError> {
    let (m00, m10, m01) = raw_moments(image);
    if !(m00 > 0.0) || !m00.is_finite() {
        return Err(GeometryError::DegenerateInput(format!(
            "total intensity {m00} cannot weight a centroid"
        )));
    }
    Ok(Point {
        x: m10 / m00,
        y: m01 / m00,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::Array2;

    #[test]
    fn test_single_bright_pixel_in_ones() {
        let mut image = Array2::<f64>::ones((101, 101));
        image[[50, 50]] = 2.0;
        let com = center_of_mass(&image.view());
        assert_relative_eq!(com.x, 50.0, epsilon = 0.1);
        assert_relative_eq!(com.y, 50.0, epsilon = 0.1);
    }

    #[test]
    fn test_single_pixel() {
        let mut image = Array2::<f64>::zeros((5, 7));
        image[[1, 4]] = 100.0;
        let com = center_of_mass_checked(&image.view()).unwrap();
        assert_relative_eq!(com.x, 1.0, epsilon = 1e-12);
        assert_relative_eq!(com.y, 4.0, epsilon = 1e-12);
    }

    #[test]
    fn test_offset_gaussian() {
        let image = Array2::from_shape_fn((60, 80), |(i, j)| {
            let dx = i as f64 - 25.3;
            let dy = j as f64 - 41.7;
            (-(dx * dx + dy * dy) / 50.0).exp()
        });
        let com = center_of_mass(&image.view());
        assert_relative_eq!(com.x, 25.3, epsilon = 1e-4);
        assert_relative_eq!(com.y, 41.7, epsilon = 1e-4);
    }

    #[test]
    fn test_zero_image_is_degenerate() {
        let image = Array2::<f64>::zeros((10, 10));
        assert!(center_of_mass(&image.view()).x.is_nan());
        assert!(matches!(
            center_of_mass_checked(&image.view()),
            Err(GeometryError::DegenerateInput(_))
        ));
    }
}
