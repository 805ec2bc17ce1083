//! Choice of the first profile index used in a fit.
//!
//! High optical densities are unreliable (probe saturation, imaging
//! resolution), and the centre of a radially averaged profile is noisy since
//! few pixels contribute. Fits therefore start where the smoothed profile
//! falls below a maximum OD, but never before a minimum index.

use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};

use fermi_math::{smooth, Window};

use crate::error::RangeError;

/// Smoothing window applied before thresholding.
pub const RANGE_WINDOW_LEN: usize = 15;

/// Fit range settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RangeOptions {
    /// Profiles are fitted from the first radius where the smoothed OD drops below this
    pub od_max: f64,
    /// Smallest allowed cutoff index
    pub min_cutoff: usize,
    pub window_len: usize,
}

impl Default for RangeOptions {
    fn default() -> Self {
        Self {
            od_max: 1.0,
            min_cutoff: 8,
            window_len: RANGE_WINDOW_LEN,
        }
    }
}

impl RangeOptions {
    /// Cutoff index for `profile` with these settings.
    pub fn select(&self, profile: &[f64]) -> Result<usize, RangeError> {
        cutoff_index(profile, self.od_max, self.min_cutoff, self.window_len)
    }
}

fn cutoff_index(
    profile: &[f64],
    od_max: f64,
    min_cutoff: usize,
    window_len: usize,
) -> Result<usize, RangeError> {
    if min_cutoff > profile.len() {
        return Err(RangeError::ProfileTooShort {
            len: profile.len(),
            min_cutoff,
        });
    }
    let smoothed = smooth(&ArrayView1::from(profile), window_len, Window::Hanning);
    let found = smoothed
        .iter()
        .position(|&v| v < od_max)
        .unwrap_or(min_cutoff);
    Ok(found.max(min_cutoff))
}

/// Index of the first radius to include in a fit.
///
/// The profile is smoothed with a 15-sample Hanning window and the first
/// index whose smoothed value is below `od_max` is returned, raised to
/// `min_cutoff` if smaller.
///
/// # Arguments
/// * `profile` - Radially averaged OD profile
/// * `od_max` - Maximum OD to fit
/// * `min_cutoff` - Smallest allowed index
///
/// # Returns
/// The cutoff index, or [`RangeError::ProfileTooShort`] when the profile has
/// fewer than `min_cutoff` samples.
pub fn select_fit_range(profile: &[f64], od_max: f64, min_cutoff: usize) -> Result<usize, RangeError> {
    cutoff_index(profile, od_max, min_cutoff, RANGE_WINDOW_LEN)
}
