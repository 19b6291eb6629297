//! Seams to the external raster collaborators: the pixel remapping primitive
//! (`Warper`) and the geographic coordinate transform (`CoordinateTransformer`).
//!
//! `AffineWarper` is an in-process warper for grids that share a CRS and only
//! differ in extent or resolution. Cross-CRS remapping goes through
//! [`crate::io::gdal::GdalWarper`].
use ndarray::{Array2, ArrayView2, Zip};

use crate::core::grid::GridRef;
use crate::error::{Error, Result};
use crate::types::ResampleKernel;

/// Pixel remapping primitive.
///
/// Implementations resample `src` (described by `src_grid`) into `dst`
/// (described by `dst_grid`). `dst` arrives pre-filled with the destination
/// nodata value; pixels the source does not cover, or whose samples are all
/// source nodata, must be left untouched.
pub trait Warper {
    fn warp(
        &self,
        src: ArrayView2<'_, f64>,
        src_grid: GridRef<'_>,
        dst: &mut Array2<f64>,
        dst_grid: GridRef<'_>,
        kernel: ResampleKernel,
    ) -> Result<()>;
}

/// Transforms geographic longitude/latitude (WGS84-style, degrees) into the
/// projected CRS of a grid.
pub trait CoordinateTransformer {
    fn lonlat_to_projected(&self, lon: f64, lat: f64) -> Result<(f64, f64)>;
}

#[inline]
fn is_valid(value: f64, nodata: Option<f64>) -> bool {
    !value.is_nan() && nodata.is_none_or(|nd| value != nd)
}

/// Smallest share of the cubic weight that must fall on valid samples
const MIN_CUBIC_SUPPORT: f64 = 0.5;

/// Keys cubic convolution weight (a = -0.5)
#[inline]
fn cubic_weight(x: f64) -> f64 {
    const A: f64 = -0.5;
    let x = x.abs();
    if x <= 1.0 {
        ((A + 2.0) * x - (A + 3.0)) * x * x + 1.0
    } else if x < 2.0 {
        ((A * x - 5.0 * A) * x + 8.0 * A) * x - 4.0 * A
    } else {
        0.0
    }
}

fn sample_nearest(src: &ArrayView2<'_, f64>, col: f64, row: f64, nodata: Option<f64>) -> Option<f64> {
    let (rows, cols) = src.dim();
    let c = col.floor();
    let r = row.floor();
    if c < 0.0 || r < 0.0 || c >= cols as f64 || r >= rows as f64 {
        return None;
    }
    let v = src[[r as usize, c as usize]];
    is_valid(v, nodata).then_some(v)
}

/// 4x4 cubic convolution around a pixel-edge based position; neighbours outside
/// the raster are clamped to the edge and nodata neighbours are dropped with
/// their weight renormalized.
fn sample_cubic(src: &ArrayView2<'_, f64>, col: f64, row: f64, nodata: Option<f64>) -> Option<f64> {
    let (rows, cols) = src.dim();
    if col < 0.0 || row < 0.0 || col >= cols as f64 || row >= rows as f64 {
        return None;
    }
    // Sample centers sit at half-pixel offsets
    let u = col - 0.5;
    let v = row - 0.5;
    let c0 = u.floor();
    let r0 = v.floor();
    let tu = u - c0;
    let tv = v - r0;

    let mut acc = 0.0;
    let mut weight_sum = 0.0;
    for dr in -1..=2_i64 {
        let wr = cubic_weight(tv - dr as f64);
        if wr == 0.0 {
            continue;
        }
        let rr = (r0 as i64 + dr).clamp(0, rows as i64 - 1) as usize;
        for dc in -1..=2_i64 {
            let wc = cubic_weight(tu - dc as f64);
            if wc == 0.0 {
                continue;
            }
            let cc = (c0 as i64 + dc).clamp(0, cols as i64 - 1) as usize;
            let s = src[[rr, cc]];
            if is_valid(s, nodata) {
                acc += wr * wc * s;
                weight_sum += wr * wc;
            }
        }
    }
    // Too little valid support left to renormalize without amplifying the lobes
    if weight_sum < MIN_CUBIC_SUPPORT {
        return sample_nearest(src, col, row, nodata);
    }
    Some(acc / weight_sum)
}

/// Same-CRS warper: maps every destination pixel center back into the source
/// grid through the two affine transforms.
#[derive(Debug, Default, Clone, Copy)]
pub struct AffineWarper;

impl Warper for AffineWarper {
    fn warp(
        &self,
        src: ArrayView2<'_, f64>,
        src_grid: GridRef<'_>,
        dst: &mut Array2<f64>,
        dst_grid: GridRef<'_>,
        kernel: ResampleKernel,
    ) -> Result<()> {
        if src_grid.crs != dst_grid.crs {
            return Err(Error::CrsMismatch {
                expected: src_grid.crs.to_string(),
                actual: dst_grid.crs.to_string(),
            });
        }
        if src.is_empty() {
            return Ok(());
        }
        let src_t = *src_grid.transform;
        let dst_t = *dst_grid.transform;
        let src_nodata = src_grid.nodata;

        Zip::indexed(dst).par_for_each(|(row, col), out| {
            let (x, y) = dst_t.apply(col as f64 + 0.5, row as f64 + 0.5);
            let (sc, sr) = src_t.invert(x, y);
            if !sc.is_finite() || !sr.is_finite() {
                return;
            }
            let sample = match kernel {
                ResampleKernel::Nearest => sample_nearest(&src, sc, sr, src_nodata),
                ResampleKernel::Cubic => sample_cubic(&src, sc, sr, src_nodata),
            };
            if let Some(v) = sample {
                *out = v;
            }
        });
        Ok(())
    }
}
