use fermi_math::{InterpolationError, LevMarError, MinimizeError, PolyfitError, QuadratureError};
use thiserror::Error;

/// Errors from image geometry: centring, normalization and radial sampling.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    /// The background mask around the cloud touches the image border.
    #[error(
        "cloud mask rows {row_range:?} cols {col_range:?} reaches the edge of a {rows}x{cols} image, can't normalize"
    )]
    CannotNormalize {
        row_range: (i64, i64),
        col_range: (i64, i64),
        rows: usize,
        cols: usize,
    },

    /// Center too close to (or outside) the image edge for a radial profile.
    #[error("center ({x:.2}, {y:.2}) leaves no radial extent in a {rows}x{cols} image")]
    NoRadialExtent {
        x: f64,
        y: f64,
        rows: usize,
        cols: usize,
    },

    /// Radial step is zero, negative or not finite.
    #[error("radial step must be positive and finite, got {0}")]
    InvalidStep(f64),

    /// Empty angle set for line profiles.
    #[error("at least one sampling angle is required")]
    NoAngles,

    /// Images or arrays that must agree in shape do not.
    #[error("shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    /// Wrong number of raw frames for the requested frame combination.
    #[error("{combination} needs {expected} frames, got {got}")]
    FrameCount {
        combination: &'static str,
        expected: &'static str,
        got: usize,
    },

    /// Kinetics-mode strip does not fit inside the raw frame.
    #[error("strip rows {top}..{} exceed frame height {rows}", .top + .height)]
    StripOutOfBounds {
        top: usize,
        height: usize,
        rows: usize,
    },

    /// Input cannot define the requested quantity (e.g. zero total intensity).
    #[error("degenerate input: {0}")]
    DegenerateInput(String),

    /// Background trend fit failed.
    #[error("background fit failed: {0}")]
    Polyfit(#[from] PolyfitError),

    #[error(transparent)]
    Interpolation(#[from] InterpolationError),
}

/// Errors from fit range selection.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RangeError {
    /// The profile has fewer samples than the minimum cutoff index.
    #[error("profile of length {len} is shorter than min_cutoff {min_cutoff}")]
    ProfileTooShort { len: usize, min_cutoff: usize },
}

/// Errors from profile fitting and observable extraction.
///
/// Non-convergence is not an error; see `FitResult::converged`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FitError {
    /// Nothing to fit or the data arrays disagree.
    #[error("degenerate input: {0}")]
    DegenerateInput(String),

    /// Fixed temperature outside the physical range.
    #[error("T/T_F must be positive and finite, got {0}")]
    InvalidTemperature(f64),

    /// Pixel size or cross-section not usable.
    #[error("invalid calibration: {0}")]
    InvalidCalibration(String),

    #[error("solver failed to start: {0}")]
    Solver(#[from] LevMarError),

    #[error("fugacity search failed: {0}")]
    Minimize(#[from] MinimizeError),

    #[error("atom number integral failed: {0}")]
    Quadrature(#[from] QuadratureError),
}

/// Top level error for the analysis pipeline.
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error(transparent)]
    Geometry(#[from] GeometryError),

    #[error(transparent)]
    Range(#[from] RangeError),

    #[error(transparent)]
    Fit(#[from] FitError),

    #[error("ellipticity search failed: {0}")]
    Ellipticity(#[from] MinimizeError),

    /// Input cannot be analysed at all (e.g. no images).
    #[error("degenerate input: {0}")]
    DegenerateInput(String),

    /// Configuration validation failure.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("configuration parse error: {0}")]
    ConfigParse(#[from] serde_json::Error),
}
