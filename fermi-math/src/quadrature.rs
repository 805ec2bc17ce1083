//! Adaptive Gauss-Kronrod quadrature.
//!
//! Globally adaptive 7/15-point Gauss-Kronrod integration: the interval with
//! the largest error estimate is bisected until the summed error estimate
//! meets `max(abs_tol, rel_tol * |I|)`. Semi-infinite ranges are handled by
//! the substitution `t = a + (1 - u) / u`, which maps `[a, ∞)` onto `(0, 1]`.
//! The Kronrod nodes are interior, so the integrand is never evaluated at
//! `u = 0`.

use thiserror::Error;

/// Errors from adaptive integration.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QuadratureError {
    /// The requested tolerance was not met within the subdivision budget.
    #[error("tolerance not reached after {subdivisions} subdivisions: value={value:.6e}, error={error:.3e}")]
    MaxSubdivisions {
        value: f64,
        error: f64,
        subdivisions: usize,
    },
    /// The integrand returned NaN or an infinity.
    #[error("integrand is not finite at x={x}")]
    NonFiniteIntegrand { x: f64 },
    /// Integration bounds are not finite or not ordered.
    #[error("invalid integration range [{lower}, {upper}]")]
    InvalidRange { lower: f64, upper: f64 },
}

/// Tolerances for [`integrate`] and [`integrate_to_infinity`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuadratureOptions {
    /// Relative tolerance on the integral
    pub rel_tol: f64,
    /// Absolute tolerance on the integral
    pub abs_tol: f64,
    /// Maximum number of intervals in the adaptive partition
    pub max_subdivisions: usize,
}

impl Default for QuadratureOptions {
    fn default() -> Self {
        Self {
            rel_tol: 1.5e-8,
            abs_tol: 1.5e-8,
            max_subdivisions: 500,
        }
    }
}

/// Integral value together with its error estimate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuadratureResult {
    pub value: f64,
    pub error: f64,
    pub evaluations: usize,
    pub subdivisions: usize,
}

const KRONROD_NODES: [f64; 8] = [
    0.991_455_371_120_812_6,
    0.949_107_912_342_758_5,
    0.864_864_423_359_769_1,
    0.741_531_185_599_394_4,
    0.586_087_235_467_691_1,
    0.405_845_151_377_397_2,
    0.207_784_955_007_898_5,
    0.0,
];

const KRONROD_WEIGHTS: [f64; 8] = [
    0.022_935_322_010_529_22,
    0.063_092_092_629_978_55,
    0.104_790_010_322_250_18,
    0.140_653_259_715_525_92,
    0.169_004_726_639_267_9,
    0.190_350_578_064_785_4,
    0.204_432_940_075_298_9,
    0.209_482_141_084_727_83,
];

// Weights of the embedded 7-point Gauss rule on the odd Kronrod nodes.
const GAUSS_WEIGHTS: [f64; 4] = [
    0.129_484_966_168_869_7,
    0.279_705_391_489_276_7,
    0.381_830_050_505_118_9,
    0.417_959_183_673_469_4,
];

#[derive(Debug, Clone, Copy)]
struct Segment {
    lower: f64,
    upper: f64,
    value: f64,
    error: f64,
}

/// Apply the 15-point Kronrod rule on `[lower, upper]`.
fn kronrod_segment<F>(f: &F, lower: f64, upper: f64) -> Result<Segment, QuadratureError>
where
    F: Fn(f64) -> f64,
{
    let center = 0.5 * (lower + upper);
    let half = 0.5 * (upper - lower);

    let eval = |x: f64| -> Result<f64, QuadratureError> {
        let value = f(x);
        if value.is_finite() {
            Ok(value)
        } else {
            Err(QuadratureError::NonFiniteIntegrand { x })
        }
    };

    let f_center = eval(center)?;
    let mut kronrod = f_center * KRONROD_WEIGHTS[7];
    let mut gauss = f_center * GAUSS_WEIGHTS[3];

    for (j, (&node, &weight)) in KRONROD_NODES[..7]
        .iter()
        .zip(KRONROD_WEIGHTS[..7].iter())
        .enumerate()
    {
        let dx = half * node;
        let pair = eval(center - dx)? + eval(center + dx)?;
        kronrod += weight * pair;
        if j % 2 == 1 {
            gauss += GAUSS_WEIGHTS[j / 2] * pair;
        }
    }

    Ok(Segment {
        lower,
        upper,
        value: kronrod * half,
        error: ((kronrod - gauss) * half).abs(),
    })
}

/// Integrate `f` over the finite interval `[lower, upper]`.
///
/// # Examples
///
/// ```
/// use fermi_math::quadrature::{integrate, QuadratureOptions};
///
/// let result = integrate(|x: f64| x.sin(), 0.0, std::f64::consts::PI, &QuadratureOptions::default())
///     .unwrap();
/// assert!((result.value - 2.0).abs() < 1e-10);
/// ```
pub fn integrate<F>(
    f: F,
    lower: f64,
    upper: f64,
    options: &QuadratureOptions,
) -> Result<QuadratureResult, QuadratureError>
where
    F: Fn(f64) -> f64,
{
    if !lower.is_finite() || !upper.is_finite() || upper < lower {
        return Err(QuadratureError::InvalidRange { lower, upper });
    }
    if upper == lower {
        return Ok(QuadratureResult {
            value: 0.0,
            error: 0.0,
            evaluations: 0,
            subdivisions: 0,
        });
    }

    let mut segments = vec![kronrod_segment(&f, lower, upper)?];
    let mut evaluations = 15;

    loop {
        let value: f64 = segments.iter().map(|s| s.value).sum();
        let error: f64 = segments.iter().map(|s| s.error).sum();
        let tolerance = options.abs_tol.max(options.rel_tol * value.abs());

        if error <= tolerance {
            return Ok(QuadratureResult {
                value,
                error,
                evaluations,
                subdivisions: segments.len(),
            });
        }
        if segments.len() >= options.max_subdivisions {
            return Err(QuadratureError::MaxSubdivisions {
                value,
                error,
                subdivisions: segments.len(),
            });
        }

        let worst = segments
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.error.total_cmp(&b.error))
            .map(|(i, _)| i)
            .unwrap_or(0);
        let segment = segments.swap_remove(worst);
        let mid = 0.5 * (segment.lower + segment.upper);

        // Interval can no longer be split in floating point.
        if mid <= segment.lower || mid >= segment.upper {
            segments.push(segment);
            let value: f64 = segments.iter().map(|s| s.value).sum();
            let error: f64 = segments.iter().map(|s| s.error).sum();
            return Err(QuadratureError::MaxSubdivisions {
                value,
                error,
                subdivisions: segments.len(),
            });
        }

        segments.push(kronrod_segment(&f, segment.lower, mid)?);
        segments.push(kronrod_segment(&f, mid, segment.upper)?);
        evaluations += 30;
    }
}

/// Integrate `f` over `[lower, ∞)`.
///
/// The integrand must decay fast enough for the integral to exist. It is
/// evaluated at arbitrarily large arguments and must return a finite value
/// (typically zero) there.
pub fn integrate_to_infinity<F>(
    f: F,
    lower: f64,
    options: &QuadratureOptions,
) -> Result<QuadratureResult, QuadratureError>
where
    F: Fn(f64) -> f64,
{
    if !lower.is_finite() {
        return Err(QuadratureError::InvalidRange {
            lower,
            upper: f64::INFINITY,
        });
    }
    let transformed = |u: f64| {
        let t = lower + (1.0 - u) / u;
        f(t) / (u * u)
    };
    integrate(transformed, 0.0, 1.0, options)
}
