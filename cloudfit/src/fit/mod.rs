//! Profile fitting and extraction of physical observables.
//!
//! - **models**: ideal Fermi and Gaussian column densities
//! - **fitter**: Levenberg-Marquardt fit of a radial profile
//! - **observables**: T/T_F and atom number from a fitted model
//! - **range**: first profile index used in a fit
//! - **ellipticity**: axis ratio of the cloud

pub mod ellipticity;
pub mod fitter;
pub mod models;
pub mod observables;
pub mod range;

pub use ellipticity::{estimate_ellipticity, EllipticityEstimate, EllipticityOptions};
pub use fitter::{fit, FitOptions, FitResult};
pub use models::{t_over_tf_from_fugacity, FitModel};
pub use observables::{
    fermi_observables, fugacity_from_temperature, gaussian_observables, observables, Observables,
};
pub use range::{select_fit_range, RangeOptions};
