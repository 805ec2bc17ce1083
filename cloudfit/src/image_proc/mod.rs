//! Image-level processing of absorption shots.
//!
//! # Module Organization
//!
//! - **absorption**: raw frames to transmission and optical density
//! - **centroid**: intensity-weighted cloud center
//! - **normalize**: background and edge-strip normalization
//! - **radial**: radial averages, line profiles and image slices
//! - **test_patterns**: synthetic clouds for tests and benchmarks

pub mod absorption;
pub mod centroid;
pub mod normalize;
pub mod radial;
pub mod test_patterns;

pub use absorption::{
    absorption_image, average_images, combine_frames, maxod_correct, od_to_trans,
    threshold_image, trans_to_od, AbsorptionImage, FrameCombination, RawFrames, DEFAULT_MAX_OD,
};
pub use centroid::{center_of_mass, center_of_mass_checked, Point};
pub use normalize::{normalize_background, normalize_edge_strip};
pub use radial::{
    image_slice, line_profiles, radial_average, radial_profile_errors, EllipseModel, ImageSlice,
    LineProfiles, ProfileErrors, RadialProfile,
};
