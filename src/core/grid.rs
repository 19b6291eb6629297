//! Spatial data model: affine geotransforms, raster layers with their metadata,
//! and the canonical reference grid every harmonized layer is resampled onto.
use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::SampleType;

/// Affine transformation mapping pixel (col, row) to projected (x, y):
/// ```text
/// x = origin_x + col * pixel_width + row * row_rotation
/// y = origin_y + col * col_rotation + row * pixel_height
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub origin_x: f64,
    pub origin_y: f64,
    pub pixel_width: f64,
    /// Usually negative for north-up rasters
    pub pixel_height: f64,
    pub row_rotation: f64,
    pub col_rotation: f64,
}

impl GeoTransform {
    /// North-up transform without rotation terms
    pub fn new(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            origin_y,
            pixel_width,
            pixel_height,
            row_rotation: 0.0,
            col_rotation: 0.0,
        }
    }

    /// From GDAL order: [origin_x, pixel_width, row_rotation, origin_y, col_rotation, pixel_height]
    pub fn from_gdal(coeffs: [f64; 6]) -> Self {
        Self {
            origin_x: coeffs[0],
            pixel_width: coeffs[1],
            row_rotation: coeffs[2],
            origin_y: coeffs[3],
            col_rotation: coeffs[4],
            pixel_height: coeffs[5],
        }
    }

    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.origin_x,
            self.pixel_width,
            self.row_rotation,
            self.origin_y,
            self.col_rotation,
            self.pixel_height,
        ]
    }

    /// Transform mapping a `width` x `height` raster exactly onto the given extent,
    /// upper-left anchored at (min_x, max_y).
    pub fn from_bounds(
        min_x: f64,
        min_y: f64,
        max_x: f64,
        max_y: f64,
        width: usize,
        height: usize,
    ) -> Self {
        Self::new(
            min_x,
            max_y,
            (max_x - min_x) / width as f64,
            -(max_y - min_y) / height as f64,
        )
    }

    /// Projected coordinates of fractional pixel position (col, row).
    /// Pass `col + 0.5, row + 0.5` for a pixel center.
    pub fn apply(&self, col: f64, row: f64) -> (f64, f64) {
        let x = self.origin_x + col * self.pixel_width + row * self.row_rotation;
        let y = self.origin_y + col * self.col_rotation + row * self.pixel_height;
        (x, y)
    }

    /// Fractional pixel position of projected (x, y); NaN for a singular transform.
    pub fn invert(&self, x: f64, y: f64) -> (f64, f64) {
        let det = self.pixel_width * self.pixel_height - self.row_rotation * self.col_rotation;
        if det.abs() < 1e-12 {
            return (f64::NAN, f64::NAN);
        }
        let dx = x - self.origin_x;
        let dy = y - self.origin_y;
        let col = (self.pixel_height * dx - self.row_rotation * dy) / det;
        let row = (-self.col_rotation * dx + self.pixel_width * dy) / det;
        (col, row)
    }

    /// (min_x, min_y, max_x, max_y) covered by a raster of the given size
    pub fn bounds(&self, width: usize, height: usize) -> (f64, f64, f64, f64) {
        let corners = [
            self.apply(0.0, 0.0),
            self.apply(width as f64, 0.0),
            self.apply(0.0, height as f64),
            self.apply(width as f64, height as f64),
        ];
        let mut min_x = f64::INFINITY;
        let mut min_y = f64::INFINITY;
        let mut max_x = f64::NEG_INFINITY;
        let mut max_y = f64::NEG_INFINITY;
        for (x, y) in corners {
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }
        (min_x, min_y, max_x, max_y)
    }

    /// Coefficient-wise closeness within an absolute tolerance
    pub fn approx_eq(&self, other: &GeoTransform, tolerance: f64) -> bool {
        self.to_gdal()
            .iter()
            .zip(other.to_gdal().iter())
            .all(|(a, b)| (a - b).abs() <= tolerance)
    }
}

/// Spatial metadata attached to every raster layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpatialMetadata {
    /// Coordinate reference system as WKT (compared verbatim)
    pub crs: String,
    pub transform: GeoTransform,
    pub width: usize,
    pub height: usize,
    pub dtype: SampleType,
    pub nodata: Option<f64>,
}

impl SpatialMetadata {
    pub fn grid_ref(&self) -> GridRef<'_> {
        GridRef {
            crs: &self.crs,
            transform: &self.transform,
            nodata: self.nodata,
        }
    }
}

/// Immutable pixel array plus its spatial metadata.
/// The array shape is always (height, width).
#[derive(Debug, Clone)]
pub struct RasterLayer {
    array: Array2<f64>,
    meta: SpatialMetadata,
}

impl RasterLayer {
    pub fn new(array: Array2<f64>, meta: SpatialMetadata) -> Result<Self> {
        if array.dim() != (meta.height, meta.width) {
            return Err(Error::shape_mismatch(
                &[meta.height, meta.width],
                array.shape(),
            ));
        }
        Ok(Self { array, meta })
    }

    pub fn array(&self) -> &Array2<f64> {
        &self.array
    }

    pub fn view(&self) -> ArrayView2<'_, f64> {
        self.array.view()
    }

    pub fn meta(&self) -> &SpatialMetadata {
        &self.meta
    }

    pub fn into_parts(self) -> (Array2<f64>, SpatialMetadata) {
        (self.array, self.meta)
    }
}

/// Borrowed grid description passed to warp primitives.
#[derive(Debug, Clone, Copy)]
pub struct GridRef<'a> {
    pub crs: &'a str,
    pub transform: &'a GeoTransform,
    pub nodata: Option<f64>,
}

/// Custom-spheroid sinusoidal WKT of the MODIS-style reference grid
pub const MODIS_SINUSOIDAL_WKT: &str = concat!(
    "PROJCS[\"unnamed\",GEOGCS[\"GCS_Unknown_datum_based_upon_the_custom_spheroid\",",
    "DATUM[\"D_Not_specified_based_on_custom_spheroid\",",
    "SPHEROID[\"Custom_spheroid\",6371007.181,0]],",
    "PRIMEM[\"Greenwich\",0],",
    "UNIT[\"degree\",0.0174532925199433,AUTHORITY[\"EPSG\",\"9122\"]]],",
    "PROJECTION[\"Sinusoidal\"],",
    "PARAMETER[\"longitude_of_center\",0],",
    "PARAMETER[\"false_easting\",0],",
    "PARAMETER[\"false_northing\",0],",
    "UNIT[\"metre\",1,AUTHORITY[\"EPSG\",\"9001\"]],",
    "AXIS[\"Easting\",EAST],",
    "AXIS[\"Northing\",NORTH]]"
);

/// Sphere radius of the reference grid's spheroid (metres)
pub const MODIS_SPHERE_RADIUS: f64 = 6_371_007.181;

/// Reference grid all harmonized layers share exactly.
///
/// Passed explicitly into every harmonization call so several grids can coexist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalGrid {
    pub crs: String,
    pub transform: GeoTransform,
    pub width: usize,
    pub height: usize,
    pub nodata: f64,
    pub dtype: SampleType,
}

impl CanonicalGrid {
    /// The fixed 565x769 sinusoidal grid (~463.3 m pixels, nodata 65535).
    /// Coefficients must stay bit-identical for compatibility with previously
    /// harmonized datasets.
    pub fn modis_sinusoidal() -> Self {
        Self {
            crs: MODIS_SINUSOIDAL_WKT.to_string(),
            transform: GeoTransform::new(
                -1378818.64438684,
                2036259.3891393621,
                463.31271652749996,
                -463.31271652749996,
            ),
            width: 565,
            height: 769,
            nodata: 65535.0,
            dtype: SampleType::F32,
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        self.transform.bounds(self.width, self.height)
    }

    pub fn grid_ref(&self) -> GridRef<'_> {
        GridRef {
            crs: &self.crs,
            transform: &self.transform,
            nodata: Some(self.nodata),
        }
    }

    /// Metadata of a layer resampled onto this grid, keeping the source sample type.
    pub fn metadata_for(&self, dtype: SampleType) -> SpatialMetadata {
        SpatialMetadata {
            crs: self.crs.clone(),
            transform: self.transform,
            width: self.width,
            height: self.height,
            dtype,
            nodata: Some(self.nodata),
        }
    }

    /// True when the metadata already describes this grid (CRS verbatim,
    /// transform within `tolerance`, exact dimensions).
    pub fn matches(&self, meta: &SpatialMetadata, tolerance: f64) -> bool {
        meta.crs == self.crs
            && meta.width == self.width
            && meta.height == self.height
            && meta.transform.approx_eq(&self.transform, tolerance)
    }
}

impl Default for CanonicalGrid {
    fn default() -> Self {
        Self::modis_sinusoidal()
    }
}
