//! Windowed smoothing and mirroring of 1-D series.

use ndarray::{Array1, ArrayView1};
use std::f64::consts::PI;

/// Smoothing window shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Window {
    /// Moving average
    Flat,
    Hanning,
    Hamming,
    Bartlett,
    Blackman,
}

impl Window {
    /// Window coefficients of length `len` (not normalized).
    pub fn coefficients(&self, len: usize) -> Array1<f64> {
        if len == 1 {
            return Array1::ones(1);
        }
        let m = (len - 1) as f64;
        Array1::from_shape_fn(len, |n| {
            let n = n as f64;
            match self {
                Window::Flat => 1.0,
                Window::Hanning => 0.5 - 0.5 * (2.0 * PI * n / m).cos(),
                Window::Hamming => 0.54 - 0.46 * (2.0 * PI * n / m).cos(),
                Window::Bartlett => 1.0 - (2.0 * n / m - 1.0).abs(),
                Window::Blackman => {
                    0.42 - 0.5 * (2.0 * PI * n / m).cos() + 0.08 * (4.0 * PI * n / m).cos()
                }
            }
        })
    }
}

/// Smooth a series by convolving it with a normalized window.
///
/// Both ends are padded with the series reflected through its end points:
/// `2·x[0] - x[k]` for `k = window_len..2` at the start and
/// `2·x[n-1] - x[n-1-k]` for `k = 0..window_len-1` at the end. Away from the
/// ends linear trends pass through unchanged. If the series is shorter than
/// `window_len` the window shrinks to half the series length; windows shorter
/// than 3 return the input unchanged.
///
/// # Arguments
/// * `series` - Data to smooth
/// * `window_len` - Window length in samples, ideally odd
/// * `window` - Window shape
///
/// # Returns
/// Smoothed series of the same length as the input
pub fn smooth(series: &ArrayView1<f64>, window_len: usize, window: Window) -> Array1<f64> {
    let n = series.len();
    let window_len = if n < window_len { n / 2 } else { window_len };
    if window_len < 3 {
        return series.to_owned();
    }

    let first = series[0];
    let last = series[n - 1];
    let head_start = window_len.min(n - 1);

    let mut padded = Vec::with_capacity(n + 2 * (window_len - 1));
    padded.extend((2..=head_start).rev().map(|k| 2.0 * first - series[k]));
    padded.extend(series.iter().copied());
    padded.extend((0..window_len - 1).map(|k| 2.0 * last - series[n - 1 - k]));

    let weights = window.coefficients(window_len);
    let total = weights.sum();
    let weights = weights / total;

    // "same"-mode convolution offset; even windows lean one sample left.
    let offset = window_len - 1 - window_len / 2;
    // Position of series[0] inside the padded buffer.
    let lead = head_start - 1;

    Array1::from_shape_fn(n, |i| {
        let top = i + lead + offset;
        weights
            .iter()
            .enumerate()
            .map(|(j, w)| w * padded[top - j])
            .sum()
    })
}

/// Mirror a series around its first element.
///
/// `[1, 2, 3]` becomes `[3, 2, 1, 2, 3]`. With `negative` the mirrored half is
/// negated, which turns a radial coordinate into a signed one:
/// `[0, 1, 2]` becomes `[-2, -1, 0, 1, 2]`.
pub fn mirror_line(data: &ArrayView1<f64>, negative: bool) -> Array1<f64> {
    let n = data.len();
    if n == 0 {
        return Array1::zeros(0);
    }
    let sign = if negative { -1.0 } else { 1.0 };
    let mut out = Vec::with_capacity(2 * n - 1);
    out.extend(data.iter().skip(1).rev().map(|v| sign * v));
    out.extend(data.iter().copied());
    Array1::from(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_mirror_line() {
        let data = array![1.0, 2.0, 3.0];
        assert_eq!(mirror_line(&data.view(), false), array![3.0, 2.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_mirror_line_negative() {
        let data = array![0.0, 1.0, 2.0];
        assert_eq!(
            mirror_line(&data.view(), true),
            array![-2.0, -1.0, 0.0, 1.0, 2.0]
        );
    }

    #[test]
    fn test_mirror_line_single_and_empty() {
        assert_eq!(mirror_line(&array![4.0].view(), true), array![4.0]);
        assert_eq!(mirror_line(&Array1::<f64>::zeros(0).view(), false).len(), 0);
    }

    #[test]
    fn test_window_shapes() {
        let hanning = Window::Hanning.coefficients(5);
        assert_relative_eq!(hanning[0], 0.0, epsilon = 1e-15);
        assert_relative_eq!(hanning[2], 1.0, epsilon = 1e-15);
        assert_relative_eq!(hanning[1], 0.5, epsilon = 1e-15);

        let bartlett = Window::Bartlett.coefficients(5);
        assert_eq!(bartlett, array![0.0, 0.5, 1.0, 0.5, 0.0]);

        let hamming = Window::Hamming.coefficients(3);
        assert_relative_eq!(hamming[0], 0.08, epsilon = 1e-15);
        assert_relative_eq!(hamming[1], 1.0, epsilon = 1e-15);

        let blackman = Window::Blackman.coefficients(3);
        assert_relative_eq!(blackman[0], 0.0, epsilon = 1e-15);
        assert_relative_eq!(blackman[1], 1.0, epsilon = 1e-15);
    }

    #[test]
    fn test_linear_series_unchanged_in_interior() {
        let series = Array1::from_shape_fn(40, |i| 4.0 - 0.1 * i as f64);
        for window in [
            Window::Flat,
            Window::Hanning,
            Window::Hamming,
            Window::Bartlett,
            Window::Blackman,
        ] {
            let smoothed = smooth(&series.view(), 15, window);
            assert_eq!(smoothed.len(), series.len());
            for i in 7..33 {
                assert_relative_eq!(smoothed[i], series[i], epsilon = 1e-12);
            }
            // Reflected padding keeps the ends close to the trend
            assert!((smoothed[0] - series[0]).abs() < 0.2);
            assert!((smoothed[39] - series[39]).abs() < 0.2);
        }
    }

    #[test]
    fn test_flat_window_is_moving_average() {
        let series = array![0.0, 0.0, 3.0, 0.0, 0.0, 0.0, 0.0];
        let smoothed = smooth(&series.view(), 3, Window::Flat);
        assert_relative_eq!(smoothed[1], 1.0, epsilon = 1e-15);
        assert_relative_eq!(smoothed[2], 1.0, epsilon = 1e-15);
        assert_relative_eq!(smoothed[3], 1.0, epsilon = 1e-15);
        assert_relative_eq!(smoothed[4], 0.0, epsilon = 1e-15);
    }

    #[test]
    fn test_spike_is_attenuated() {
        let mut series = Array1::<f64>::ones(30);
        series[15] = 11.0;
        let smoothed = smooth(&series.view(), 11, Window::Hanning);
        // Hanning(11) sums to 5, so the spike keeps a fifth of its height
        assert_relative_eq!(smoothed[15], 3.0, epsilon = 1e-12);
        assert!(smoothed[11] > 1.0);
        assert_relative_eq!(smoothed[9], 1.0, epsilon = 1e-12);
        assert_relative_eq!(smoothed.sum(), series.sum(), epsilon = 1e-9);
    }

    #[test]
    fn test_short_series_shrinks_window() {
        // len 5 < 15 so the window becomes 2 and the input is returned
        let series = array![5.0, 1.0, 4.0, 2.0, 3.0];
        assert_eq!(smooth(&series.view(), 15, Window::Hanning), series);

        // len 8 < 15 gives a window of 4
        let series = array![0.0, 0.0, 0.0, 8.0, 0.0, 0.0, 0.0, 0.0];
        let smoothed = smooth(&series.view(), 15, Window::Flat);
        assert_eq!(smoothed.len(), 8);
        assert!(smoothed[3] < 8.0);
    }
}
