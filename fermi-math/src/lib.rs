//! fermi-math - Numerical building blocks for cold-atom image analysis
//!
//! This crate holds the numerics behind the cloud fitting pipeline and has
//! no knowledge of images beyond plain 2-D arrays:
//!
//! - **Polylog** - Complete Fermi-Dirac integrals `-Li₂(-eˣ)` and `-Li₃(-eˣ)`
//! - **Bilinear** - Clamp-to-edge bilinear sampling of images
//! - **Smooth** - Windowed 1-D smoothing and line mirroring
//! - **Polyfit** - Least-squares polynomial fits
//! - **Minimize** - Bounded Brent minimization
//! - **Quadrature** - Adaptive Gauss-Kronrod integration, including `[a, ∞)`
//! - **Levmar** - Levenberg-Marquardt nonlinear least squares
//!
//! # Example
//!
//! ```
//! use fermi_math::{fermi_poly3, minimize_bounded, MinimizeOptions};
//!
//! // Log-fugacity of an ideal Fermi gas at T/T_F = 0.2
//! let target = 0.2;
//! let result = minimize_bounded(
//!     |q| (target - (6.0 * fermi_poly3(q)).powf(-1.0 / 3.0)).abs(),
//!     -30.0,
//!     200.0,
//!     &MinimizeOptions::default(),
//! )
//! .unwrap();
//! assert!(result.x > 0.0);
//! ```

pub mod bilinear;
pub mod levmar;
pub mod minimize;
pub mod polyfit;
pub mod polylog;
pub mod quadrature;
pub mod smooth;

// Re-export commonly used types
pub use bilinear::{bilinear_at, bilinear_sample, InterpolationError};
pub use levmar::{levenberg_marquardt, LevMarError, LevMarOptions, LevMarReport, Termination};
pub use minimize::{minimize_bounded, MinimizeError, MinimizeOptions, MinimizeResult, MinimizeStatus};
pub use polyfit::{polyfit, Polynomial, PolyfitError};
pub use polylog::{fermi_poly2, fermi_poly2_array, fermi_poly3, fermi_poly3_array};
pub use quadrature::{integrate, integrate_to_infinity, QuadratureError, QuadratureOptions, QuadratureResult};
pub use smooth::{mirror_line, smooth, Window};
