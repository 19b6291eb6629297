use gdal::errors::GdalError as GdalCrateError;
use gdal::raster::Buffer;
use gdal::spatial_ref::{CoordTransform, SpatialRef};
use gdal::{Dataset, DriverManager};
use gdal_sys::{CPLErr, GDALResampleAlg};
use ndarray::{Array2, ArrayView2};
use std::os::raw::{c_double, c_int};
use std::path::Path;
use thiserror::Error;
use tracing::debug;

use crate::core::grid::{GeoTransform, GridRef, RasterLayer, SpatialMetadata};
use crate::io::loader::RasterOpener;
use crate::io::warp::{CoordinateTransformer, Warper};
use crate::types::{ResampleKernel, SampleType};

/// Errors encountered when using the GDAL adapters
#[derive(Debug, Error)]
pub enum GdalError {
    #[error("GDAL error: {0}")]
    Gdal(#[from] GdalCrateError),
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("Dimension mismatch: expected {0}x{1}, got {2}x{3}")]
    DimensionMismatch(usize, usize, usize, usize),
    #[error("Warp failed: {0}")]
    Warp(String),
}

/// Metadata extracted from a GDAL-supported dataset
#[derive(Debug, Clone)]
pub struct GdalMetadata {
    /// Width (pixels) of the raster
    pub size_x: usize,
    /// Height (lines) of the raster
    pub size_y: usize,
    /// Number of raster bands
    pub bands: usize,
    /// Affine geotransform coefficients ([origin_x, pixel_width, rot_x, origin_y, rot_y, pixel_height])
    pub geotransform: [f64; 6],
    /// Projection in WKT format, kept verbatim for CRS comparison
    pub projection: String,
    /// Sample type of band 1
    pub dtype: SampleType,
    /// Nodata value of band 1, if any
    pub nodata: Option<f64>,
}

/// Reader for single-band geospatial rasters via GDAL
pub struct GdalRasterReader {
    pub dataset: Dataset,
    pub metadata: GdalMetadata,
}

impl GdalRasterReader {
    /// Open a GDAL-supported dataset (e.g., GeoTIFF)
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, GdalError> {
        let dataset = Dataset::open(path.as_ref())?;
        let (size_x, size_y) = dataset.raster_size();
        let bands = dataset.raster_count() as usize;
        if bands == 0 {
            return Err(GdalError::UnsupportedFormat("No raster bands found".into()));
        }
        let geotransform = dataset
            .geo_transform()
            .unwrap_or([0.0, 1.0, 0.0, 0.0, 0.0, 1.0]);
        let projection = dataset.projection();

        let (dtype, nodata) = {
            let band = dataset.rasterband(1)?;
            let type_name = format!("{:?}", band.band_type());
            (
                SampleType::from_gdal_name(&type_name).unwrap_or(SampleType::F64),
                band.no_data_value(),
            )
        };

        Ok(GdalRasterReader {
            metadata: GdalMetadata {
                size_x: size_x as usize,
                size_y: size_y as usize,
                bands,
                geotransform,
                projection,
                dtype,
                nodata,
            },
            dataset,
        })
    }

    /// Read a single band (1-based index) as an f64 ndarray of shape (height, width)
    pub fn read_band(&self, index: usize) -> Result<Array2<f64>, GdalError> {
        if index == 0 || index > self.metadata.bands {
            return Err(GdalError::UnsupportedFormat(format!(
                "Band index {} out of range",
                index
            )));
        }
        let band = self.dataset.rasterband(index)?;
        let window = (self.metadata.size_x, self.metadata.size_y);
        let buf = band.read_as::<f64>((0, 0), window, window, None)?;
        let data_vec = buf.data().to_vec();
        let got = data_vec.len();
        Array2::from_shape_vec((self.metadata.size_y, self.metadata.size_x), data_vec).map_err(
            |_| {
                GdalError::DimensionMismatch(
                    self.metadata.size_x,
                    self.metadata.size_y,
                    got,
                    1,
                )
            },
        )
    }

    /// Band 1 together with its spatial metadata
    pub fn read_layer(&self) -> crate::Result<RasterLayer> {
        let array = self.read_band(1)?;
        RasterLayer::new(
            array,
            SpatialMetadata {
                crs: self.metadata.projection.clone(),
                transform: GeoTransform::from_gdal(self.metadata.geotransform),
                width: self.metadata.size_x,
                height: self.metadata.size_y,
                dtype: self.metadata.dtype,
                nodata: self.metadata.nodata,
            },
        )
    }
}

/// `RasterOpener` backed by GDAL
#[derive(Debug, Default, Clone, Copy)]
pub struct GdalOpener;

impl RasterOpener for GdalOpener {
    fn open(&self, path: &Path) -> crate::Result<RasterLayer> {
        GdalRasterReader::open(path)?.read_layer()
    }
}

/// Single-band in-memory dataset holding `data` on the given grid
fn mem_dataset(data: ArrayView2<'_, f64>, grid: GridRef<'_>) -> Result<Dataset, GdalError> {
    let (rows, cols) = data.dim();
    let driver = DriverManager::get_driver_by_name("MEM")?;
    let mut ds = driver.create_with_band_type::<f64, _>("", cols, rows, 1)?;
    ds.set_geo_transform(&grid.transform.to_gdal())?;
    ds.set_projection(grid.crs)?;
    {
        let mut band = ds.rasterband(1)?;
        if let Some(nd) = grid.nodata {
            band.set_no_data_value(Some(nd))?;
        }
        let mut buf = Buffer::new((cols, rows), data.iter().copied().collect::<Vec<f64>>());
        band.write((0, 0), (cols, rows), &mut buf)?;
    }
    Ok(ds)
}

fn resample_alg(kernel: ResampleKernel) -> GDALResampleAlg::Type {
    match kernel {
        ResampleKernel::Nearest => GDALResampleAlg::GRA_NearestNeighbour,
        ResampleKernel::Cubic => GDALResampleAlg::GRA_Cubic,
    }
}

/// Cross-CRS warper running the GDAL warp kernel on in-memory datasets.
/// Source and destination nodata are wired into the warp options so uncovered
/// destination pixels keep the destination nodata.
#[derive(Debug, Default, Clone, Copy)]
pub struct GdalWarper;

impl GdalWarper {
    fn run(
        &self,
        src_ds: &Dataset,
        dst_ds: &Dataset,
        src_nodata: Option<f64>,
        dst_nodata: Option<f64>,
        kernel: ResampleKernel,
        dst_size: (usize, usize),
    ) -> Result<(), GdalError> {
        let band_size = std::mem::size_of::<c_double>();
        unsafe {
            let warp_options = gdal_sys::GDALCreateWarpOptions();
            (*warp_options).hSrcDS = src_ds.c_dataset();
            (*warp_options).hDstDS = dst_ds.c_dataset();
            (*warp_options).nBandCount = 1;
            (*warp_options).panSrcBands =
                gdal_sys::CPLMalloc(std::mem::size_of::<c_int>()).cast::<c_int>();
            (*warp_options).panSrcBands.write(1);
            (*warp_options).panDstBands =
                gdal_sys::CPLMalloc(std::mem::size_of::<c_int>()).cast::<c_int>();
            (*warp_options).panDstBands.write(1);
            (*warp_options).eResampleAlg = resample_alg(kernel);
            if let Some(nd) = src_nodata {
                (*warp_options).padfSrcNoDataReal = gdal_sys::CPLMalloc(band_size).cast::<c_double>();
                (*warp_options).padfSrcNoDataReal.write(nd);
            }
            if let Some(nd) = dst_nodata {
                (*warp_options).padfDstNoDataReal = gdal_sys::CPLMalloc(band_size).cast::<c_double>();
                (*warp_options).padfDstNoDataReal.write(nd);
            }
            (*warp_options).pfnTransformer = Some(gdal_sys::GDALGenImgProjTransform);
            (*warp_options).pTransformerArg = gdal_sys::GDALCreateGenImgProjTransformer(
                src_ds.c_dataset(),
                std::ptr::null(),
                dst_ds.c_dataset(),
                std::ptr::null(),
                0,
                0.0,
                0,
            );
            if (*warp_options).pTransformerArg.is_null() {
                gdal_sys::GDALDestroyWarpOptions(warp_options);
                return Err(GdalError::Warp("failed to create transformer".into()));
            }

            let operation = gdal_sys::GDALCreateWarpOperation(warp_options);
            if operation.is_null() {
                gdal_sys::GDALDestroyGenImgProjTransformer((*warp_options).pTransformerArg);
                gdal_sys::GDALDestroyWarpOptions(warp_options);
                return Err(GdalError::Warp("failed to create warp operation".into()));
            }
            let rc = gdal_sys::GDALChunkAndWarpImage(
                operation,
                0,
                0,
                dst_size.0 as c_int,
                dst_size.1 as c_int,
            );
            gdal_sys::GDALDestroyWarpOperation(operation);
            gdal_sys::GDALDestroyGenImgProjTransformer((*warp_options).pTransformerArg);
            gdal_sys::GDALDestroyWarpOptions(warp_options);
            if rc != CPLErr::CE_None {
                return Err(GdalError::Warp(format!("GDALChunkAndWarpImage returned {}", rc)));
            }
        }
        Ok(())
    }
}

impl Warper for GdalWarper {
    fn warp(
        &self,
        src: ArrayView2<'_, f64>,
        src_grid: GridRef<'_>,
        dst: &mut Array2<f64>,
        dst_grid: GridRef<'_>,
        kernel: ResampleKernel,
    ) -> crate::Result<()> {
        let (rows, cols) = dst.dim();
        debug!("GDAL warp {:?} -> {}x{} ({})", src.dim(), cols, rows, kernel);
        let src_ds = mem_dataset(src, src_grid)?;
        let dst_ds = mem_dataset(dst.view(), dst_grid)?;
        self.run(&src_ds, &dst_ds, src_grid.nodata, dst_grid.nodata, kernel, (cols, rows))?;

        let band = dst_ds.rasterband(1).map_err(GdalError::from)?;
        let buf = band
            .read_as::<f64>((0, 0), (cols, rows), (cols, rows), None)
            .map_err(GdalError::from)?;
        for (out, &v) in dst.iter_mut().zip(buf.data().iter()) {
            *out = v;
        }
        Ok(())
    }
}

/// Longitude/latitude to projected coordinates through OGR
pub struct GdalCoordTransform {
    transform: CoordTransform,
}

impl GdalCoordTransform {
    /// Build a transform from geographic lon/lat (WGS84, x = longitude) to `dst_wkt`.
    pub fn from_lonlat_to(dst_wkt: &str) -> Result<Self, GdalError> {
        // PROJ string keeps lon/lat axis order regardless of authority conventions
        let src = SpatialRef::from_proj4("+proj=longlat +datum=WGS84 +no_defs")?;
        let dst = SpatialRef::from_wkt(dst_wkt)?;
        let transform = CoordTransform::new(&src, &dst)?;
        Ok(Self { transform })
    }
}

impl CoordinateTransformer for GdalCoordTransform {
    fn lonlat_to_projected(&self, lon: f64, lat: f64) -> crate::Result<(f64, f64)> {
        let mut xs = [lon];
        let mut ys = [lat];
        let mut zs = [0.0];
        self.transform
            .transform_coords(&mut xs, &mut ys, &mut zs)
            .map_err(GdalError::from)?;
        Ok((xs[0], ys[0]))
    }
}
