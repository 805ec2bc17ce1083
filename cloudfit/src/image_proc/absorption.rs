//! Transmission and optical density from raw absorption frames.
//!
//! An absorption shot consists of a probe image with atoms, a probe image
//! without atoms and one or two dark fields. The transmission is
//! `(pwa - df) / (pwoa - df2)` and the optical density `-ln(transmission)`.
//! Cameras deliver these frames in different layouts; [`FrameCombination`]
//! names the supported layouts.

use ndarray::{s, Array, Array2, ArrayView, ArrayView2, Dimension, Zip};
use serde::{Deserialize, Serialize};

use super::normalize::{normalize_edge_strip, DEFAULT_STRIP_WIDTH};
use crate::error::GeometryError;

/// Default maximum measurable optical density.
pub const DEFAULT_MAX_OD: f64 = 3.5;

/// Convert transmission to optical density.
///
/// Pixels whose transmission is at or below `e^-max_od` (including zero and
/// negative values from noise) are set to `max_od`.
pub fn trans_to_od<D: Dimension>(trans: &ArrayView<f64, D>, max_od: f64) -> Array<f64, D> {
    let floor = (-max_od).exp();
    trans.mapv(|t| if t > floor { -t.ln() } else { max_od })
}

/// Convert optical density to transmission, saturating at `max_od`.
pub fn od_to_trans<D: Dimension>(od: &ArrayView<f64, D>, max_od: f64) -> Array<f64, D> {
    od.mapv(|v| if v < max_od { (-v).exp() } else { (-max_od).exp() })
}

/// Correct a measured OD for the finite maximum observable OD.
///
/// Measured values at or above `od_max` have no finite correction and come
/// out as NaN or infinity, so this should only be applied to low-OD images.
pub fn maxod_correct<D: Dimension>(od: &ArrayView<f64, D>, od_max: f64) -> Array<f64, D> {
    let c = od_max.exp() - 1.0;
    od.mapv(|v| -((c + 1.0) / c * (-v).exp() - 1.0 / c).ln())
}

/// Binary threshold of an array.
///
/// With `below` set, elements strictly below `threshold` map to `true`;
/// otherwise elements at or above it do.
pub fn threshold_image<D: Dimension>(
    data: &ArrayView<f64, D>,
    threshold: f64,
    below: bool,
) -> Array<bool, D> {
    data.mapv(|v| (v < threshold) == below)
}

/// Layout of the raw frames delivered by the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum FrameCombination {
    /// `[pwa, pwoa, df]` or `[pwa, pwoa, df, df2]`
    #[default]
    Standard,
    /// Six frames: two charge-clearing frames followed by `[pwoa, pwa, df2, df]`
    ClearedCcd,
    /// `[pwa, pwoa]` with no dark field subtraction
    NoDarkField,
    /// Kinetics mode: frame 1 holds both probe images as horizontal strips
    /// and frame 2 the matching dark fields; frame 0 is discarded.
    KineticsMode {
        with_atoms_top: usize,
        without_atoms_top: usize,
        height: usize,
    },
}

impl FrameCombination {
    fn name(&self) -> &'static str {
        match self {
            FrameCombination::Standard => "standard",
            FrameCombination::ClearedCcd => "cleared-ccd",
            FrameCombination::NoDarkField => "no-dark-field",
            FrameCombination::KineticsMode { .. } => "kinetics-mode",
        }
    }
}

/// The four frames of an absorption shot.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFrames {
    pub with_atoms: Array2<f64>,
    pub without_atoms: Array2<f64>,
    pub dark: Array2<f64>,
    pub dark_without_atoms: Array2<f64>,
}

/// Transmission image and the optical density derived from it.
#[derive(Debug, Clone, PartialEq)]
pub struct AbsorptionImage {
    pub transmission: Array2<f64>,
    pub od: Array2<f64>,
}

fn strip(frame: &ArrayView2<f64>, top: usize, height: usize) -> Result<Array2<f64>, GeometryError> {
    let rows = frame.nrows();
    if top + height > rows || height == 0 {
        return Err(GeometryError::StripOutOfBounds { top, height, rows });
    }
    Ok(frame.slice(s![top..top + height, ..]).to_owned())
}

/// Arrange raw camera frames into the four frames of an absorption shot.
///
/// # Arguments
/// * `frames` - Raw frames in camera order
/// * `combination` - Camera layout
pub fn combine_frames(
    frames: &[ArrayView2<f64>],
    combination: &FrameCombination,
) -> Result<RawFrames, GeometryError> {
    let count_error = |expected: &'static str| GeometryError::FrameCount {
        combination: combination.name(),
        expected,
        got: frames.len(),
    };

    let raw = match *combination {
        FrameCombination::Standard => match frames {
            [pwa, pwoa, df] => RawFrames {
                with_atoms: pwa.to_owned(),
                without_atoms: pwoa.to_owned(),
                dark: df.to_owned(),
                dark_without_atoms: df.to_owned(),
            },
            [pwa, pwoa, df, df2] => RawFrames {
                with_atoms: pwa.to_owned(),
                without_atoms: pwoa.to_owned(),
                dark: df.to_owned(),
                dark_without_atoms: df2.to_owned(),
            },
            _ => return Err(count_error("3 or 4")),
        },
        FrameCombination::ClearedCcd => match frames {
            [_, _, pwoa, pwa, df2, df] => RawFrames {
                with_atoms: pwa.to_owned(),
                without_atoms: pwoa.to_owned(),
                dark: df.to_owned(),
                dark_without_atoms: df2.to_owned(),
            },
            _ => return Err(count_error("6")),
        },
        FrameCombination::NoDarkField => match frames {
            [pwa, pwoa] => RawFrames {
                with_atoms: pwa.to_owned(),
                without_atoms: pwoa.to_owned(),
                dark: Array2::zeros(pwa.dim()),
                dark_without_atoms: Array2::zeros(pwa.dim()),
            },
            _ => return Err(count_error("2")),
        },
        FrameCombination::KineticsMode {
            with_atoms_top,
            without_atoms_top,
            height,
        } => {
            if frames.len() < 3 {
                return Err(count_error("at least 3"));
            }
            let (probe, dark) = (&frames[1], &frames[2]);
            RawFrames {
                with_atoms: strip(probe, with_atoms_top, height)?,
                without_atoms: strip(probe, without_atoms_top, height)?,
                dark: strip(dark, with_atoms_top, height)?,
                dark_without_atoms: strip(dark, without_atoms_top, height)?,
            }
        }
    };

    let shape = raw.with_atoms.shape().to_vec();
    for other in [&raw.without_atoms, &raw.dark, &raw.dark_without_atoms] {
        if other.shape() != shape.as_slice() {
            return Err(GeometryError::ShapeMismatch {
                expected: shape,
                got: other.shape().to_vec(),
            });
        }
    }
    Ok(raw)
}

/// Transmission and OD of an absorption shot.
///
/// Dark-subtracted numerator and denominator are each clamped to at least 1
/// count before dividing. With `norm_edge` both are first scaled so their
/// border strips average to one, which assumes no atoms near the edge.
pub fn absorption_image(frames: &RawFrames, norm_edge: bool) -> Result<AbsorptionImage, GeometryError> {
    let mut numerator = (&frames.with_atoms - &frames.dark).mapv(|v| v.max(1.0));
    let mut denominator = (&frames.without_atoms - &frames.dark_without_atoms).mapv(|v| v.max(1.0));
    if norm_edge {
        numerator = normalize_edge_strip(&numerator.view(), 1.0, DEFAULT_STRIP_WIDTH)?;
        denominator = normalize_edge_strip(&denominator.view(), 1.0, DEFAULT_STRIP_WIDTH)?;
    }

    let transmission = numerator / denominator;
    let od = transmission.mapv(|t| -t.ln());
    Ok(AbsorptionImage { transmission, od })
}

/// Average several transmission images.
///
/// The OD of each image is computed with [`DEFAULT_MAX_OD`] before averaging,
/// so the mean OD is not simply `-ln` of the mean transmission.
pub fn average_images(images: &[ArrayView2<f64>]) -> Result<AbsorptionImage, GeometryError> {
    let first = images
        .first()
        .ok_or_else(|| GeometryError::DegenerateInput("no images to average".to_string()))?;
    let shape = first.dim();

    let mut transmission = Array2::<f64>::zeros(shape);
    let mut od = Array2::<f64>::zeros(shape);
    for image in images {
        if image.dim() != shape {
            return Err(GeometryError::ShapeMismatch {
                expected: vec![shape.0, shape.1],
                got: image.shape().to_vec(),
            });
        }
        let image_od = trans_to_od(image, DEFAULT_MAX_OD);
        Zip::from(&mut transmission)
            .and(&mut od)
            .and(image)
            .and(&image_od)
            .for_each(|t, o, &ti, &oi| {
                *t += ti;
                *o += oi;
            });
    }
    let n = images.len() as f64;
    transmission /= n;
    od /= n;
    Ok(AbsorptionImage { transmission, od })
}
