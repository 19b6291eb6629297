use ndarray::ArrayView2;
use serde::Serialize;

use crate::core::processing::ops::is_nodata;
use crate::core::processing::series::TimeSeriesStack;
use crate::error::Result;

/// Summary of the valid (non-nodata, non-NaN) pixels of one slice
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SliceStats {
    pub year: i32,
    pub valid_count: usize,
    pub nodata_count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    /// Population standard deviation
    pub std: f64,
    pub synthetic: bool,
}

/// Single pass min/max plus Welford mean/std over valid pixels.
fn compute(view: ArrayView2<'_, f64>, nodata: Option<f64>) -> (usize, f64, f64, f64, f64) {
    let mut count: u64 = 0;
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    let mut mean = 0.0_f64;
    let mut m2 = 0.0_f64;

    for &v in view.iter() {
        if is_nodata(v, nodata) {
            continue;
        }
        count += 1;
        min = min.min(v);
        max = max.max(v);
        let delta = v - mean;
        mean += delta / count as f64;
        m2 += delta * (v - mean);
    }

    if count == 0 {
        return (0, f64::NAN, f64::NAN, f64::NAN, f64::NAN);
    }
    let std = if count > 1 { (m2 / count as f64).sqrt() } else { 0.0 };
    (count as usize, min, max, mean, std)
}

/// Statistics of the slice for `year`.
pub fn slice_stats(stack: &TimeSeriesStack, year: i32) -> Result<SliceStats> {
    let view = stack.slice(year)?;
    let total = view.len();
    let (valid_count, min, max, mean, std) = compute(view, stack.nodata());
    Ok(SliceStats {
        year,
        valid_count,
        nodata_count: total - valid_count,
        min,
        max,
        mean,
        std,
        synthetic: stack.is_synthetic(year),
    })
}

/// Statistics for every year of the stack, in year order.
pub fn series_stats(stack: &TimeSeriesStack) -> Result<Vec<SliceStats>> {
    stack.years().map(|y| slice_stats(stack, y)).collect()
}
