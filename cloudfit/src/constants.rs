//! Physical constants (SI units, CODATA 2006) and imaging defaults.

use std::f64::consts::PI;

/// Planck constant (J s)
pub const H: f64 = 6.626_068_96e-34;
/// Reduced Planck constant (J s)
pub const HBAR: f64 = H / (2.0 * PI);
/// Boltzmann constant (J/K)
pub const K_B: f64 = 1.380_650_4e-23;
/// Bohr radius (m)
pub const A0: f64 = 0.529_177_208_59e-10;
/// Bohr magneton (J/T)
pub const MU_B: f64 = 9.274_009_49e-24;
/// Proton mass (kg)
pub const M_PROTON: f64 = 1.672_621_637e-27;
/// Electron mass (kg)
pub const M_ELECTRON: f64 = 9.109_382_15e-31;
/// Speed of light in vacuum (m/s)
pub const C0: f64 = 299_792_458.0;
/// Standard gravity (m/s²)
pub const G: f64 = 9.806_65;
/// Magnetic constant (N/A²)
pub const MU0: f64 = 4.0 * PI * 1e-7;
/// Electric constant (F/m)
pub const EPS0: f64 = 8.854_187_817e-12;
/// Elementary charge (C)
pub const E0: f64 = 1.602_176_487e-19;

/// Lithium-6 D2 line wavelength (m)
pub const LI6_WAVELENGTH: f64 = 671e-9;
/// Lithium-6 mass (kg)
pub const LI6_MASS: f64 = 6.0 * M_PROTON;

/// Default camera calibration (m per pixel)
pub const DEFAULT_PIXEL_SIZE: f64 = 10e-6;

/// Resonant absorption cross-section `3λ²/2π` of a two-level atom.
pub fn resonant_cross_section(wavelength: f64) -> f64 {
    3.0 * wavelength * wavelength / (2.0 * PI)
}

/// Resonant cross-section of lithium-6 on the D2 line (m²).
pub fn li6_resonant_cross_section() -> f64 {
    resonant_cross_section(LI6_WAVELENGTH)
}
