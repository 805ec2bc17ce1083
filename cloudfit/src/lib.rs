//! Temperature and atom number of trapped Fermi gases from absorption images.
//!
//! A transmission image is normalized, radially averaged around the cloud
//! center and fitted with an ideal Fermi gas column-density profile. The fit
//! gives the reduced temperature T/T_F and, with the imaging calibration, the
//! atom number.
//!
//! ```no_run
//! use cloudfit::{fit_image, AnalysisConfig};
//! use ndarray::Array2;
//!
//! let transmission = Array2::<f64>::ones((256, 256));
//! let result = fit_image(&transmission.view(), &AnalysisConfig::default());
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod fit;
pub mod image_proc;
pub mod pipeline;

pub use config::{AnalysisConfig, EllipseSetting, FitModelKind};
pub use error::{AnalysisError, FitError, GeometryError, RangeError};
pub use fit::{FitModel, FitOptions, FitResult, Observables};
pub use image_proc::{EllipseModel, Point, RadialProfile};
pub use pipeline::{fit_image, fit_images, norm_and_guess, ErrorBands, ImageFit};
