//! On-demand rectangular cutouts of a grid-aligned slice, addressed by two
//! geographic corners and resampled into a fixed-size output raster.
use ndarray::{Array2, ArrayView2};
use tracing::debug;

use crate::core::grid::{GeoTransform, GridRef};
use crate::error::{Error, Result};
use crate::io::warp::{CoordinateTransformer, Warper};
use crate::types::ResampleKernel;

/// 16:9 default output size
pub const DEFAULT_WINDOW_WIDTH: usize = 854;
pub const DEFAULT_WINDOW_HEIGHT: usize = 480;

/// A cutout query: two (lon, lat) corners in any order plus the output size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowRequest {
    pub corner1: (f64, f64),
    pub corner2: (f64, f64),
    pub width: usize,
    pub height: usize,
    pub kernel: ResampleKernel,
}

impl WindowRequest {
    pub fn new(corner1: (f64, f64), corner2: (f64, f64)) -> Self {
        Self {
            corner1,
            corner2,
            width: DEFAULT_WINDOW_WIDTH,
            height: DEFAULT_WINDOW_HEIGHT,
            kernel: ResampleKernel::Nearest,
        }
    }

    pub fn with_size(mut self, width: usize, height: usize) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_kernel(mut self, kernel: ResampleKernel) -> Self {
        self.kernel = kernel;
        self
    }
}

/// Resampled window owned by the caller; never cached.
#[derive(Debug, Clone)]
pub struct OverlayWindow {
    /// Shape (height, width) of the request
    pub array: Array2<f64>,
    pub transform: GeoTransform,
    pub crs: String,
    pub nodata: Option<f64>,
}

impl OverlayWindow {
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        let (rows, cols) = self.array.dim();
        self.transform.bounds(cols, rows)
    }
}

/// Transform fitting a `width` x `height` raster onto the extent.
/// Rejects non-finite, zero-area or inverted extents and empty outputs.
pub fn compute_bounds_transform(
    min_x: f64,
    min_y: f64,
    max_x: f64,
    max_y: f64,
    width: usize,
    height: usize,
) -> Result<GeoTransform> {
    if width == 0 || height == 0 {
        return Err(Error::DegenerateExtent {
            reason: format!("output size {}x{}", width, height),
        });
    }
    if ![min_x, min_y, max_x, max_y].iter().all(|v| v.is_finite()) {
        return Err(Error::DegenerateExtent {
            reason: format!("non-finite bounds ({}, {}, {}, {})", min_x, min_y, max_x, max_y),
        });
    }
    if max_x <= min_x || max_y <= min_y {
        return Err(Error::DegenerateExtent {
            reason: format!("zero-area bounds ({}, {}, {}, {})", min_x, min_y, max_x, max_y),
        });
    }
    Ok(GeoTransform::from_bounds(min_x, min_y, max_x, max_y, width, height))
}

/// Cut the window described by `request` out of `src`.
///
/// Both corners are projected into the source CRS and normalized to a bounding
/// box before the fixed-size destination grid is laid over it. Only the extent
/// changes; the output stays in the source CRS. Requests entirely outside the
/// source come back filled with nodata (NaN when the source has none).
pub fn extract_window(
    src: ArrayView2<'_, f64>,
    src_grid: GridRef<'_>,
    request: &WindowRequest,
    coords: &dyn CoordinateTransformer,
    warper: &dyn Warper,
) -> Result<OverlayWindow> {
    let (x1, y1) = coords.lonlat_to_projected(request.corner1.0, request.corner1.1)?;
    let (x2, y2) = coords.lonlat_to_projected(request.corner2.0, request.corner2.1)?;
    let (min_x, max_x) = (x1.min(x2), x1.max(x2));
    let (min_y, max_y) = (y1.min(y2), y1.max(y2));

    let transform = compute_bounds_transform(min_x, min_y, max_x, max_y, request.width, request.height)?;
    debug!(
        "Window ({:.1}, {:.1}) - ({:.1}, {:.1}) -> {}x{} ({})",
        min_x, min_y, max_x, max_y, request.width, request.height, request.kernel
    );

    let fill = src_grid.nodata.unwrap_or(f64::NAN);
    let mut array = Array2::from_elem((request.height, request.width), fill);
    let dst_grid = GridRef {
        crs: src_grid.crs,
        transform: &transform,
        nodata: src_grid.nodata,
    };
    warper.warp(src, src_grid, &mut array, dst_grid, request.kernel)?;

    Ok(OverlayWindow {
        array,
        transform,
        crs: src_grid.crs.to_string(),
        nodata: src_grid.nodata,
    })
}
