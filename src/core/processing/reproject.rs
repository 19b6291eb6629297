//! Resampling of raster layers onto a canonical grid.
use std::collections::BTreeMap;

use ndarray::Array2;
use tracing::{debug, info, warn};

use crate::core::grid::{CanonicalGrid, RasterLayer};
use crate::core::processing::ops::is_nodata;
use crate::error::Result;
use crate::io::loader::LoadFailure;
use crate::io::warp::Warper;
use crate::types::ResampleKernel;

/// Resample `layer` onto `grid`.
///
/// The destination starts filled with the grid nodata so pixels the source does
/// not cover stay nodata. The source layer is never modified. `kernel` must suit
/// the data (nearest for class labels, cubic for continuous quantities); this is
/// not checked.
pub fn reproject_to_grid(
    layer: &RasterLayer,
    grid: &CanonicalGrid,
    kernel: ResampleKernel,
    warper: &dyn Warper,
) -> Result<RasterLayer> {
    let src = layer.meta();
    debug!(
        "Reprojecting {}x{} layer onto {}x{} grid ({})",
        src.width, src.height, grid.width, grid.height, kernel
    );
    let mut dst = Array2::from_elem(grid.shape(), grid.nodata);
    warper.warp(layer.view(), src.grid_ref(), &mut dst, grid.grid_ref(), kernel)?;
    RasterLayer::new(dst, grid.metadata_for(src.dtype))
}

/// Layer already on `grid`, re-tagged with the grid metadata: its nodata samples
/// (and NaN) become the grid nodata so every harmonized layer shares one sentinel.
fn conform_to_grid(layer: RasterLayer, grid: &CanonicalGrid) -> Result<RasterLayer> {
    let (array, meta) = layer.into_parts();
    let array = if meta.nodata == Some(grid.nodata) {
        array
    } else {
        array.mapv(|v| if is_nodata(v, meta.nodata) { grid.nodata } else { v })
    };
    RasterLayer::new(array, grid.metadata_for(meta.dtype))
}

/// Layers that made it onto the grid, plus the ones that failed
#[derive(Debug, Default)]
pub struct HarmonizeOutcome {
    pub layers: BTreeMap<String, RasterLayer>,
    pub failures: Vec<LoadFailure>,
}

/// Bring every layer of a keyed series onto `grid`.
///
/// Layers already on the grid (within `tolerance`) skip the warp; only their
/// nodata is rewritten to the grid's. A layer that fails is reported by name and
/// dropped without affecting the others.
pub fn harmonize_layers(
    raw: BTreeMap<String, RasterLayer>,
    grid: &CanonicalGrid,
    kernel: ResampleKernel,
    warper: &dyn Warper,
    tolerance: f64,
) -> HarmonizeOutcome {
    let mut outcome = HarmonizeOutcome::default();
    let total = raw.len();
    let mut reprojected = 0usize;

    for (name, layer) in raw {
        let harmonized = if grid.matches(layer.meta(), tolerance) {
            conform_to_grid(layer, grid)
        } else {
            reprojected += 1;
            reproject_to_grid(&layer, grid, kernel, warper)
        };
        match harmonized {
            Ok(resampled) => {
                outcome.layers.insert(name, resampled);
            }
            Err(e) => {
                warn!("Failed to reproject {}: {}", name, e);
                outcome.failures.push(LoadFailure {
                    name,
                    reason: e.to_string(),
                });
            }
        }
    }

    info!(
        "Harmonized {} layers ({} reprojected, {} failed)",
        total,
        reprojected,
        outcome.failures.len()
    );
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::grid::{GeoTransform, SpatialMetadata};
    use crate::io::warp::AffineWarper;
    use crate::types::SampleType;
    use approx::assert_abs_diff_eq;

    fn small_grid() -> CanonicalGrid {
        CanonicalGrid {
            crs: "LOCAL_CS[\"grid\"]".to_string(),
            transform: GeoTransform::new(0.0, 100.0, 10.0, -10.0),
            width: 12,
            height: 8,
            nodata: 65535.0,
            dtype: SampleType::F32,
        }
    }

    fn ramp(rows: usize, cols: usize) -> Array2<f64> {
        Array2::from_shape_fn((rows, cols), |(r, c)| (r * cols + c) as f64 * 0.5)
    }

    #[test]
    fn identity_reprojection_is_idempotent() {
        for grid in [small_grid(), CanonicalGrid::modis_sinusoidal()] {
            let layer = RasterLayer::new(ramp(grid.height, grid.width), grid.metadata_for(SampleType::F32)).unwrap();
            for kernel in [ResampleKernel::Nearest, ResampleKernel::Cubic] {
                let out = reproject_to_grid(&layer, &grid, kernel, &AffineWarper).unwrap();
                assert_eq!(out.meta(), layer.meta());
                for (a, b) in out.array().iter().zip(layer.array().iter()) {
                    assert_abs_diff_eq!(*a, *b, epsilon = 1e-6);
                }
            }
        }
    }

    #[test]
    fn partial_coverage_fills_nodata() {
        let grid = small_grid();
        // Source covers only the left half of the grid at twice the resolution
        let meta = SpatialMetadata {
            crs: grid.crs.clone(),
            transform: GeoTransform::new(0.0, 100.0, 5.0, -5.0),
            width: 12,
            height: 16,
            dtype: SampleType::I16,
            nodata: None,
        };
        let layer = RasterLayer::new(Array2::from_elem((16, 12), 3.0), meta).unwrap();
        let out = reproject_to_grid(&layer, &grid, ResampleKernel::Nearest, &AffineWarper).unwrap();
        assert_eq!(out.meta().dtype, SampleType::I16);
        assert_eq!(out.meta().nodata, Some(65535.0));
        for ((_, c), v) in out.array().indexed_iter() {
            if c < 6 {
                assert_eq!(*v, 3.0);
            } else {
                assert_eq!(*v, 65535.0);
            }
        }
        // Input untouched
        assert!(layer.array().iter().all(|v| *v == 3.0));
    }

    #[test]
    fn harmonize_isolates_failures() {
        let grid = small_grid();
        let mut raw = BTreeMap::new();
        raw.insert(
            "on_grid_2010".to_string(),
            RasterLayer::new(ramp(8, 12), grid.metadata_for(SampleType::F32)).unwrap(),
        );
        let mut foreign = grid.metadata_for(SampleType::F32);
        foreign.crs = "EPSG:4326".to_string();
        raw.insert(
            "foreign_2011".to_string(),
            RasterLayer::new(ramp(8, 12), foreign).unwrap(),
        );
        let mut shifted = grid.metadata_for(SampleType::F32);
        shifted.transform.origin_x = 20.0;
        raw.insert(
            "shifted_2012".to_string(),
            RasterLayer::new(ramp(8, 12), shifted).unwrap(),
        );

        let outcome = harmonize_layers(raw, &grid, ResampleKernel::Nearest, &AffineWarper, 1e-9);
        assert_eq!(outcome.layers.len(), 2);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].name, "foreign_2011");
        let shifted = &outcome.layers["shifted_2012"];
        assert!(grid.matches(shifted.meta(), 1e-9));
        assert_eq!(shifted.array()[[0, 0]], 65535.0);
        assert_eq!(shifted.array()[[0, 2]], 0.0);
    }

    #[test]
    fn mixed_on_grid_and_shifted_years_share_grid_nodata() {
        use crate::core::processing::series::build_series;

        let grid = small_grid();
        let mut on_grid = grid.metadata_for(SampleType::F32);
        on_grid.nodata = Some(-9999.0);
        let mut first = Array2::from_elem((8, 12), 10.0);
        first[[4, 4]] = -9999.0;
        let mut shifted = grid.metadata_for(SampleType::F32);
        shifted.nodata = Some(-9999.0);
        shifted.transform.origin_x = 20.0;

        let mut raw = BTreeMap::new();
        raw.insert("pop_2010".to_string(), RasterLayer::new(first, on_grid).unwrap());
        raw.insert(
            "pop_2012".to_string(),
            RasterLayer::new(Array2::from_elem((8, 12), 20.0), shifted).unwrap(),
        );

        let outcome = harmonize_layers(raw, &grid, ResampleKernel::Nearest, &AffineWarper, 1e-9);
        assert!(outcome.failures.is_empty());
        for layer in outcome.layers.values() {
            assert_eq!(layer.meta(), &grid.metadata_for(SampleType::F32));
        }
        assert_eq!(outcome.layers["pop_2010"].array()[[4, 4]], 65535.0);

        let stack = build_series("pop", &outcome.layers, 2010, 2012).unwrap().stack;
        assert_eq!(stack.nodata(), Some(65535.0));
        let y2011 = stack.slice(2011).unwrap();
        assert_eq!(y2011[[0, 0]], 65535.0);
        assert_eq!(y2011[[0, 1]], 65535.0);
        assert_eq!(y2011[[4, 4]], 65535.0);
        assert_abs_diff_eq!(y2011[[0, 2]], 15.0, epsilon = 1e-12);
    }
}
