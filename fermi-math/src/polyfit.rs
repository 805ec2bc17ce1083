//! Least-squares polynomial fitting.

use nalgebra::{DMatrix, DVector};
use thiserror::Error;

/// Errors from polynomial fitting.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PolyfitError {
    #[error("x and y lengths differ: {x_len} vs {y_len}")]
    LengthMismatch { x_len: usize, y_len: usize },
    #[error("need at least {needed} points for degree {degree}, got {got}")]
    TooFewPoints {
        degree: usize,
        needed: usize,
        got: usize,
    },
    #[error("least-squares system is singular")]
    Singular,
}

/// Polynomial with coefficients in increasing power order.
#[derive(Debug, Clone, PartialEq)]
pub struct Polynomial {
    pub coefficients: Vec<f64>,
}

impl Polynomial {
    /// Evaluate with Horner's scheme.
    pub fn eval(&self, x: f64) -> f64 {
        self.coefficients
            .iter()
            .rev()
            .fold(0.0, |acc, &c| acc * x + c)
    }

    pub fn degree(&self) -> usize {
        self.coefficients.len().saturating_sub(1)
    }
}

/// Fit a polynomial of the given degree to `(xs, ys)` in the least-squares
/// sense.
///
/// # Arguments
/// * `xs` - Sample positions
/// * `ys` - Sample values, same length as `xs`
/// * `degree` - Polynomial degree
///
/// # Returns
/// The fitted [`Polynomial`] or an error if the system is underdetermined
pub fn polyfit(xs: &[f64], ys: &[f64], degree: usize) -> Result<Polynomial, PolyfitError> {
    if xs.len() != ys.len() {
        return Err(PolyfitError::LengthMismatch {
            x_len: xs.len(),
            y_len: ys.len(),
        });
    }
    let terms = degree + 1;
    if xs.len() < terms {
        return Err(PolyfitError::TooFewPoints {
            degree,
            needed: terms,
            got: xs.len(),
        });
    }

    let vandermonde = DMatrix::from_fn(xs.len(), terms, |i, j| xs[i].powi(j as i32));
    let rhs = DVector::from_column_slice(ys);

    let svd = vandermonde.svd(true, true);
    let max_singular = svd.singular_values.max();
    if !(max_singular > 0.0) {
        return Err(PolyfitError::Singular);
    }
    let eps = max_singular * f64::EPSILON * xs.len() as f64;
    if svd.singular_values.iter().any(|&s| s <= eps) {
        return Err(PolyfitError::Singular);
    }
    let solution = svd.solve(&rhs, eps).map_err(|_| PolyfitError::Singular)?;

    Ok(Polynomial {
        coefficients: solution.iter().copied().collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_linear_fit_exact() {
        let xs: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let ys: Vec<f64> = xs.iter().map(|x| 0.5 * x + 2.0).collect();
        let poly = polyfit(&xs, &ys, 1).unwrap();
        assert_relative_eq!(poly.coefficients[0], 2.0, epsilon = 1e-10);
        assert_relative_eq!(poly.coefficients[1], 0.5, epsilon = 1e-10);
        assert_relative_eq!(poly.eval(20.0), 12.0, epsilon = 1e-9);
    }

    #[test]
    fn test_linear_fit_least_squares() {
        // Symmetric residuals around y = x
        let xs = [0.0, 1.0, 2.0, 3.0];
        let ys = [0.1, 0.9, 2.1, 2.9];
        let poly = polyfit(&xs, &ys, 1).unwrap();
        assert_relative_eq!(poly.eval(1.5), 1.5, epsilon = 1e-10);
        assert_eq!(poly.degree(), 1);
    }

    #[test]
    fn test_quadratic_fit() {
        let xs: Vec<f64> = (-5..=5).map(|i| i as f64).collect();
        let ys: Vec<f64> = xs.iter().map(|x| 1.0 - 2.0 * x + 0.25 * x * x).collect();
        let poly = polyfit(&xs, &ys, 2).unwrap();
        assert_relative_eq!(poly.coefficients[2], 0.25, epsilon = 1e-10);
    }

    #[test]
    fn test_errors() {
        assert!(matches!(
            polyfit(&[1.0, 2.0], &[1.0], 1),
            Err(PolyfitError::LengthMismatch { .. })
        ));
        assert!(matches!(
            polyfit(&[1.0], &[1.0], 1),
            Err(PolyfitError::TooFewPoints { .. })
        ));
        assert!(matches!(
            polyfit(&[1.0, 1.0, 1.0], &[1.0, 2.0, 3.0], 1),
            Err(PolyfitError::Singular)
        ));
    }
}
