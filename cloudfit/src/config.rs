//! Analysis configuration.
//!
//! Every field has a default, so a partial JSON document such as
//! `{"model": {"kind": "gaussian"}}` is a complete configuration.

use serde::{Deserialize, Serialize};

use crate::constants::{li6_resonant_cross_section, DEFAULT_PIXEL_SIZE};
use crate::error::AnalysisError;
use crate::fit::ellipticity::EllipticityOptions;
use crate::fit::fitter::FitOptions;
use crate::fit::range::RangeOptions;
use crate::image_proc::absorption::DEFAULT_MAX_OD;
use crate::image_proc::centroid::Point;
use crate::image_proc::radial::EllipseModel;

/// Half-width of the T/T_F band used for error estimates.
pub const DEFAULT_ERROR_BAND: f64 = 0.03;

/// Which profile model to fit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FitModelKind {
    #[default]
    IdealFermi,
    IdealFermiFixedTemperature { t_over_tf: f64 },
    Gaussian,
    /// Ideal Fermi fit followed by refits at `T/T_F ± band`
    IdealFermiWithErrorBands { band: f64 },
}

/// How the sampling ellipse is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum EllipseSetting {
    #[default]
    Circular,
    Fixed(EllipseModel),
    /// Search for the axis ratio with [`EllipticityOptions`]
    Estimate,
}

/// Settings for [`crate::pipeline::fit_image`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Object-plane pixel size in meters
    pub pixel_size: f64,
    /// Absorption cross-section in m²
    pub cross_section: f64,
    pub model: FitModelKind,
    /// Divide out background trends before profiling
    pub normalize: bool,
    /// Cloud center; computed from the OD image when absent
    pub center: Option<Point>,
    /// Radial step of the profile in pixels
    pub dr: f64,
    /// Saturation OD applied to the radially averaged transmission
    pub profile_max_od: f64,
    /// Saturation OD of the normalized image
    pub image_max_od: f64,
    pub ellipse: EllipseSetting,
    pub ellipticity: EllipticityOptions,
    pub range: RangeOptions,
    pub fit: FitOptions,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            pixel_size: DEFAULT_PIXEL_SIZE,
            cross_section: li6_resonant_cross_section(),
            model: FitModelKind::default(),
            normalize: true,
            center: None,
            dr: 0.3,
            profile_max_od: DEFAULT_MAX_OD,
            image_max_od: 3.0,
            ellipse: EllipseSetting::default(),
            ellipticity: EllipticityOptions::default(),
            range: RangeOptions::default(),
            fit: FitOptions::default(),
        }
    }
}

fn positive(name: &str, value: f64) -> Result<(), AnalysisError> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(AnalysisError::InvalidConfig(format!(
            "{name} must be positive and finite, got {value}"
        )))
    }
}

impl AnalysisConfig {
    /// Parse and validate a JSON configuration.
    pub fn from_json_str(json: &str) -> Result<Self, AnalysisError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_string(&self) -> Result<String, AnalysisError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check value ranges that the type system does not.
    pub fn validate(&self) -> Result<(), AnalysisError> {
        positive("pixel_size", self.pixel_size)?;
        positive("cross_section", self.cross_section)?;
        positive("dr", self.dr)?;
        positive("profile_max_od", self.profile_max_od)?;
        positive("image_max_od", self.image_max_od)?;

        match self.model {
            FitModelKind::IdealFermiFixedTemperature { t_over_tf } => {
                positive("t_over_tf", t_over_tf)?
            }
            FitModelKind::IdealFermiWithErrorBands { band } => positive("band", band)?,
            FitModelKind::IdealFermi | FitModelKind::Gaussian => {}
        }

        if let Some(center) = self.center {
            if !center.x.is_finite() || !center.y.is_finite() {
                return Err(AnalysisError::InvalidConfig(format!(
                    "center must be finite, got ({}, {})",
                    center.x, center.y
                )));
            }
        }
        if let EllipseSetting::Fixed(ellipse) = self.ellipse {
            positive("ellipse ratio", ellipse.ratio)?;
        }
        let (lower, upper) = self.ellipticity.bounds;
        if !(lower > 0.0 && lower < upper && upper.is_finite()) {
            return Err(AnalysisError::InvalidConfig(format!(
                "ellipticity bounds must satisfy 0 < lower < upper, got ({lower}, {upper})"
            )));
        }
        positive("ellipticity tolerance", self.ellipticity.tolerance)?;
        positive("ellipticity dr", self.ellipticity.dr)?;

        if self.fit.max_iterations == 0 {
            return Err(AnalysisError::InvalidConfig(
                "fit.max_iterations must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
