//! Synthetic absorption images for tests and benchmarks.
//!
//! Clouds are rendered from a [`FitModel`] column density, optionally
//! stretched along the columns, and converted to transmission or raw camera
//! frames. Noise is drawn from a seeded generator so every pattern is
//! reproducible.

use ndarray::Array2;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal, NormalError};

use super::centroid::Point;
use crate::fit::models::FitModel;

/// Render an OD image of `model` centred on `center`.
///
/// # Arguments
/// * `shape` - `(rows, cols)` of the image
/// * `center` - Cloud center
/// * `model` - Column density model, evaluated at the scaled radius
/// * `column_stretch` - Elongation of the cloud along the columns
///
/// # Returns
/// OD image with `od[x, y] = model(sqrt(dx² + (dy/stretch)²))`
pub fn cloud_od_image(
    shape: (usize, usize),
    center: Point,
    model: &FitModel,
    column_stretch: f64,
) -> Array2<f64> {
    Array2::from_shape_fn(shape, |(i, j)| {
        let dx = i as f64 - center.x;
        let dy = (j as f64 - center.y) / column_stretch;
        model.evaluate((dx * dx + dy * dy).sqrt())
    })
}

/// Transmission `e^-od` of an OD image.
pub fn transmission_from_od(od: &Array2<f64>) -> Array2<f64> {
    od.mapv(|v| (-v).exp())
}

/// Add zero-mean Gaussian noise with a fixed seed.
///
/// A negative or non-finite `std_dev` is rejected with
/// [`NormalError::BadVariance`].
pub fn add_gaussian_noise(
    image: &Array2<f64>,
    std_dev: f64,
    seed: u64,
) -> Result<Array2<f64>, NormalError> {
    if !(std_dev >= 0.0) || !std_dev.is_finite() {
        return Err(NormalError::BadVariance);
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let normal = Normal::new(0.0, std_dev)?;
    Ok(image.mapv(|v| v + normal.sample(&mut rng)))
}

/// Multiplicative background `(1 + row_slope·x)·(1 + col_slope·y)`.
pub fn tilted_background(shape: (usize, usize), row_slope: f64, col_slope: f64) -> Array2<f64> {
    Array2::from_shape_fn(shape, |(i, j)| {
        (1.0 + row_slope * i as f64) * (1.0 + col_slope * j as f64)
    })
}

/// Raw `[pwa, pwoa, df]` frames that reproduce `transmission`.
///
/// The probe beam is `probe_counts` above a uniform `dark_counts` level.
pub fn synthetic_raw_frames(
    transmission: &Array2<f64>,
    probe_counts: f64,
    dark_counts: f64,
) -> [Array2<f64>; 3] {
    let with_atoms = transmission.mapv(|t| probe_counts * t + dark_counts);
    let without_atoms = Array2::from_elem(transmission.dim(), probe_counts + dark_counts);
    let dark = Array2::from_elem(transmission.dim(), dark_counts);
    [with_atoms, without_atoms, dark]
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_cloud_peak_and_symmetry() {
        let center = Point::new(20.0, 30.0);
        let od = cloud_od_image((41, 61), center, &FitModel::gaussian(0.8, 6.0), 1.0);
        assert_relative_eq!(od[[20, 30]], 0.8, epsilon = 1e-12);
        assert_relative_eq!(od[[15, 30]], od[[25, 30]], epsilon = 1e-12);
        assert_relative_eq!(od[[20, 25]], od[[15, 30]], epsilon = 1e-12);
    }

    #[test]
    fn test_column_stretch() {
        let center = Point::new(20.0, 20.0);
        let od = cloud_od_image((41, 41), center, &FitModel::gaussian(1.0, 5.0), 2.0);
        assert_relative_eq!(od[[20, 30]], od[[25, 20]], epsilon = 1e-12);
    }

    #[test]
    fn test_noise_is_reproducible() {
        let image = Array2::<f64>::zeros((10, 10));
        let a = add_gaussian_noise(&image, 0.1, 7).unwrap();
        let b = add_gaussian_noise(&image, 0.1, 7).unwrap();
        let c = add_gaussian_noise(&image, 0.1, 8).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_noise_rejects_bad_std_dev() {
        let image = Array2::<f64>::zeros((4, 4));
        assert_eq!(
            add_gaussian_noise(&image, -1.0, 7).unwrap_err(),
            NormalError::BadVariance
        );
        assert!(add_gaussian_noise(&image, f64::NAN, 7).is_err());
        assert_eq!(add_gaussian_noise(&image, 0.0, 7).unwrap(), image);
    }

    #[test]
    fn test_raw_frames_reproduce_transmission() {
        let trans = Array2::from_elem((3, 3), 0.25);
        let [pwa, pwoa, df] = synthetic_raw_frames(&trans, 1000.0, 50.0);
        assert_relative_eq!((pwa[[1, 1]] - df[[1, 1]]) / (pwoa[[1, 1]] - df[[1, 1]]), 0.25);
    }

    #[test]
    fn test_tilted_background() {
        let bg = tilted_background((5, 5), 0.1, 0.0);
        assert_relative_eq!(bg[[4, 2]], 1.4, epsilon = 1e-12);
        assert_relative_eq!(bg[[0, 4]], 1.0, epsilon = 1e-12);
    }
}
