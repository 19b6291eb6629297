use gdal::raster::Buffer;
use gdal::{Dataset, DriverManager, Metadata};
use ndarray::ArrayView2;
use std::path::Path;
use tracing::info;

use crate::core::grid::GeoTransform;
use crate::io::gdal::GdalError;
use crate::types::SampleType;

/// Georeferencing written alongside the pixels
#[derive(Debug, Clone, Copy)]
pub struct TiffGeoref<'a> {
    pub crs: &'a str,
    pub transform: &'a GeoTransform,
    pub nodata: Option<f64>,
}

pub fn write_tiff_u8(
    output: &Path,
    cols: usize,
    rows: usize,
    data: &[u8],
) -> Result<Dataset, GdalError> {
    let driver = DriverManager::get_driver_by_name("GTiff")?;
    let ds = driver.create_with_band_type::<u8, _>(output, cols, rows, 1)?;
    {
        let mut band = ds.rasterband(1)?;
        let mut buf = Buffer::new((cols, rows), data.to_vec());
        band.write((0, 0), (cols, rows), &mut buf)?;
    }
    Ok(ds)
}

pub fn write_tiff_f32(
    output: &Path,
    cols: usize,
    rows: usize,
    data: &[f32],
) -> Result<Dataset, GdalError> {
    let driver = DriverManager::get_driver_by_name("GTiff")?;
    let ds = driver.create_with_band_type::<f32, _>(output, cols, rows, 1)?;
    {
        let mut band = ds.rasterband(1)?;
        let mut buf = Buffer::new((cols, rows), data.to_vec());
        band.write((0, 0), (cols, rows), &mut buf)?;
    }
    Ok(ds)
}

/// Band type actually written for `dtype`: bytes only when the nodata value
/// fits a byte, float32 otherwise.
pub fn storage_type(dtype: SampleType, nodata: Option<f64>) -> SampleType {
    match (dtype, nodata) {
        (SampleType::U8, None) => SampleType::U8,
        (SampleType::U8, Some(nd)) if nd.fract() == 0.0 && (0.0..=255.0).contains(&nd) => {
            SampleType::U8
        }
        _ => SampleType::F32,
    }
}

/// Byte samples saturated to 0..=255, NaN mapped to `fill`
fn to_u8_samples(array: ArrayView2<'_, f64>, fill: f64) -> Vec<u8> {
    array
        .iter()
        .map(|&v| if v.is_nan() { fill } else { v }.round().clamp(0.0, 255.0) as u8)
        .collect()
}

/// Write a single-band GeoTIFF with transform, projection, nodata and metadata items.
///
/// `uint8` data (class stacks) is stored as bytes with values saturated to
/// 0..=255 and NaN mapped to nodata, provided the nodata value itself fits a
/// byte; everything else is stored as float32.
pub fn write_geotiff(
    output: &Path,
    array: ArrayView2<'_, f64>,
    georef: TiffGeoref<'_>,
    dtype: SampleType,
    items: &[(String, String)],
) -> Result<(), GdalError> {
    let (rows, cols) = array.dim();
    let mut ds = match storage_type(dtype, georef.nodata) {
        SampleType::U8 => {
            let data = to_u8_samples(array, georef.nodata.unwrap_or(0.0));
            write_tiff_u8(output, cols, rows, &data)?
        }
        _ => {
            let data: Vec<f32> = array.iter().map(|&v| v as f32).collect();
            write_tiff_f32(output, cols, rows, &data)?
        }
    };

    ds.set_geo_transform(&georef.transform.to_gdal())?;
    if !georef.crs.is_empty() {
        ds.set_projection(georef.crs)?;
    }
    if let Some(nd) = georef.nodata {
        let mut band = ds.rasterband(1)?;
        band.set_no_data_value(Some(nd))?;
    }
    for (key, value) in items {
        ds.set_metadata_item(key, value, "")?;
    }

    info!("Wrote {}x{} GeoTIFF {:?}", cols, rows, output);
    Ok(())
}
