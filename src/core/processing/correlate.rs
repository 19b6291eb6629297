//! Per-pixel change correlation between two co-registered variables.
//!
//! Each input is smoothed with a small convolution kernel (zero padding at the
//! edges), the past-to-future change of each variable is normalized by its own
//! largest magnitude, and the two normalized changes are combined per pixel.
//! NaN inputs stay NaN; use [`super::ops::nan_to_value`] afterwards for a dense grid.
use ndarray::{array, Array2, ArrayView2, Zip};
use tracing::debug;

use crate::error::{Error, Result};
use crate::types::CorrelationFraming;

/// Added to the normalization denominator so constant inputs give zero, not NaN
pub const NORMALIZATION_EPSILON: f64 = 1e-9;

/// Odd-sized convolution kernel
#[derive(Debug, Clone, PartialEq)]
pub struct SmoothingKernel {
    weights: Array2<f64>,
}

impl SmoothingKernel {
    pub fn new(weights: Array2<f64>) -> Result<Self> {
        let (rows, cols) = weights.dim();
        if rows % 2 == 0 || cols % 2 == 0 {
            return Err(Error::InvalidArgument {
                arg: "kernel",
                value: format!("{}x{} (dimensions must be odd)", rows, cols),
            });
        }
        if weights.iter().any(|w| !w.is_finite()) {
            return Err(Error::InvalidArgument {
                arg: "kernel",
                value: "non-finite weight".into(),
            });
        }
        Ok(Self { weights })
    }

    /// [[1, 2, 1], [2, 4, 2], [1, 2, 1]] / 16
    pub fn gaussian_3x3() -> Self {
        Self {
            weights: array![[1.0, 2.0, 1.0], [2.0, 4.0, 2.0], [1.0, 2.0, 1.0]] / 16.0,
        }
    }

    pub fn weights(&self) -> &Array2<f64> {
        &self.weights
    }
}

impl Default for SmoothingKernel {
    fn default() -> Self {
        Self::gaussian_3x3()
    }
}

/// Same-size 2-D convolution; neighbours outside the input count as zero.
pub fn convolve2d(input: ArrayView2<'_, f64>, kernel: &SmoothingKernel) -> Array2<f64> {
    let (rows, cols) = input.dim();
    let (krows, kcols) = kernel.weights.dim();
    let (kr, kc) = ((krows / 2) as isize, (kcols / 2) as isize);
    let weights = &kernel.weights;

    let mut out = Array2::zeros((rows, cols));
    Zip::indexed(&mut out).par_for_each(|(i, j), o| {
        let mut acc = 0.0;
        for ((m, n), &w) in weights.indexed_iter() {
            // Flipped kernel: true convolution
            let r = i as isize + kr - m as isize;
            let c = j as isize + kc - n as isize;
            if r < 0 || c < 0 || r >= rows as isize || c >= cols as isize {
                continue;
            }
            acc += w * input[[r as usize, c as usize]];
        }
        *o = acc;
    });
    out
}

/// Smoothed `future - past`, divided by its largest absolute value (+ epsilon),
/// so every finite value lies in [-1, 1].
pub fn normalized_change(
    past: ArrayView2<'_, f64>,
    future: ArrayView2<'_, f64>,
    kernel: &SmoothingKernel,
) -> Array2<f64> {
    let change = convolve2d(future, kernel) - convolve2d(past, kernel);
    let max_abs = change
        .iter()
        .filter(|v| !v.is_nan())
        .fold(0.0_f64, |m, v| m.max(v.abs()));
    change / (max_abs + NORMALIZATION_EPSILON)
}

/// Change-correlation score of variables `a` and `b` between two time slices.
///
/// `CoMovement` returns `na * nb` in [-1, 1]; `AntiCorrelation` returns
/// `(1 - na * nb) / 2` in [0, 1], high where the variables move apart.
pub fn correlate(
    past_a: ArrayView2<'_, f64>,
    future_a: ArrayView2<'_, f64>,
    past_b: ArrayView2<'_, f64>,
    future_b: ArrayView2<'_, f64>,
    kernel: &SmoothingKernel,
    framing: CorrelationFraming,
) -> Result<Array2<f64>> {
    let shape = past_a.shape();
    for other_shape in [future_a.shape(), past_b.shape(), future_b.shape()] {
        if other_shape != shape {
            return Err(Error::shape_mismatch(shape, other_shape));
        }
    }
    debug!("Correlating {:?} grids ({})", past_a.dim(), framing);

    let na = normalized_change(past_a, future_a, kernel);
    let nb = normalized_change(past_b, future_b, kernel);
    let score = match framing {
        CorrelationFraming::CoMovement => Zip::from(&na).and(&nb).map_collect(|a, b| a * b),
        CorrelationFraming::AntiCorrelation => {
            Zip::from(&na).and(&nb).map_collect(|a, b| (1.0 - a * b) / 2.0)
        }
    };
    Ok(score)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn zero_padding_at_edges() {
        let ones = Array2::from_elem((3, 3), 1.0);
        let out = convolve2d(ones.view(), &SmoothingKernel::gaussian_3x3());
        assert_abs_diff_eq!(out[[1, 1]], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(out[[0, 0]], 9.0 / 16.0, epsilon = 1e-12);
        assert_abs_diff_eq!(out[[0, 1]], 12.0 / 16.0, epsilon = 1e-12);
    }

    #[test]
    fn convolution_flips_the_kernel() {
        let kernel = SmoothingKernel::new(array![[0.0, 0.0, 1.0]]).unwrap();
        let input = array![[1.0, 2.0, 3.0]];
        // out[j] = input[j - 1]
        assert_eq!(convolve2d(input.view(), &kernel), array![[0.0, 1.0, 2.0]]);
    }

    #[test]
    fn even_kernel_is_rejected() {
        assert!(SmoothingKernel::new(Array2::ones((2, 3))).is_err());
    }

    #[test]
    fn unchanged_variable_gives_zero_not_nan() {
        let past = Array2::from_elem((4, 4), 7.0);
        let n = normalized_change(past.view(), past.view(), &SmoothingKernel::default());
        assert!(n.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn normalized_change_is_bounded() {
        let past = Array2::from_shape_fn((5, 5), |(r, c)| (r + c) as f64);
        let future = Array2::from_shape_fn((5, 5), |(r, c)| (r * c) as f64);
        let n = normalized_change(past.view(), future.view(), &SmoothingKernel::default());
        assert!(n.iter().all(|v| (-1.0..=1.0).contains(v)));
        let max = n.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
        assert_abs_diff_eq!(max, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn framings_of_opposite_changes() {
        let past = Array2::zeros((3, 3));
        let mut up = Array2::zeros((3, 3));
        up[[1, 1]] = 4.0;
        let down = up.mapv(|v: f64| -v);

        let co = correlate(
            past.view(),
            up.view(),
            past.view(),
            down.view(),
            &SmoothingKernel::default(),
            CorrelationFraming::CoMovement,
        )
        .unwrap();
        assert_abs_diff_eq!(co[[1, 1]], -1.0, epsilon = 1e-6);

        let anti = correlate(
            past.view(),
            up.view(),
            past.view(),
            down.view(),
            &SmoothingKernel::default(),
            CorrelationFraming::AntiCorrelation,
        )
        .unwrap();
        assert_abs_diff_eq!(anti[[1, 1]], 1.0, epsilon = 1e-6);
        assert!(anti.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn nan_propagates() {
        let past = Array2::zeros((3, 3));
        let mut future = Array2::from_elem((3, 3), 1.0);
        future[[0, 0]] = f64::NAN;
        let out = correlate(
            past.view(),
            future.view(),
            past.view(),
            future.view(),
            &SmoothingKernel::default(),
            CorrelationFraming::CoMovement,
        )
        .unwrap();
        assert!(out[[0, 0]].is_nan());
        assert!(out[[1, 1]].is_nan());
        assert!(!out[[2, 2]].is_nan());
    }

    #[test]
    fn shape_mismatch_is_an_error() {
        let a = Array2::zeros((3, 3));
        let b = Array2::zeros((3, 4));
        let k = SmoothingKernel::default();
        let co = CorrelationFraming::CoMovement;
        let err = correlate(a.view(), a.view(), a.view(), b.view(), &k, co).unwrap_err();
        match err {
            Error::ShapeMismatch { expected, actual } => {
                assert_eq!(expected, vec![3, 3]);
                assert_eq!(actual, vec![3, 4]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(correlate(a.view(), b.view(), a.view(), a.view(), &k, co).is_err());
        assert!(correlate(a.view(), a.view(), b.view(), a.view(), &k, co).is_err());
        assert!(correlate(a.view(), a.view(), a.view(), a.view(), &k, co).is_ok());
    }
}
