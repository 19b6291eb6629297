use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::core::grid::GeoTransform;
use crate::error::Result;
use crate::types::SampleType;

/// Provenance of a written raster, embedded as TIFF metadata items and/or
/// stored as a JSON sidecar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputMetadata {
    pub dataset: String,
    pub year: Option<i32>,
    /// What was written: `cutout`, `slice` or `correlation`
    pub product: String,
    /// Whether the year was synthesized rather than read
    pub synthetic: bool,
    pub width: usize,
    pub height: usize,
    pub dtype: SampleType,
    pub nodata: Option<f64>,
    pub geotransform: [f64; 6],
    pub crs: String,
    /// (lon, lat) corners of a cutout request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corners: Option<[(f64, f64); 2]>,
    pub conversion_tool: String,
    pub conversion_version: String,
    pub conversion_timestamp: DateTime<Utc>,
}

impl OutputMetadata {
    pub fn new(dataset: &str, product: &str, transform: &GeoTransform, crs: &str, shape: (usize, usize)) -> Self {
        Self {
            dataset: dataset.to_string(),
            year: None,
            product: product.to_string(),
            synthetic: false,
            width: shape.1,
            height: shape.0,
            dtype: SampleType::F32,
            nodata: None,
            geotransform: transform.to_gdal(),
            crs: crs.to_string(),
            corners: None,
            conversion_tool: env!("CARGO_PKG_NAME").to_string(),
            conversion_version: env!("CARGO_PKG_VERSION").to_string(),
            conversion_timestamp: Utc::now(),
        }
    }

    /// Upper-case key/value pairs for the default GDAL metadata domain.
    /// Georeferencing is carried by the raster itself and left out.
    pub fn to_items(&self) -> Vec<(String, String)> {
        let mut items = vec![
            ("DATASET".to_string(), self.dataset.clone()),
            ("PRODUCT".to_string(), self.product.clone()),
            ("SYNTHETIC".to_string(), self.synthetic.to_string()),
            ("DTYPE".to_string(), self.dtype.to_string()),
            ("CONVERSION_TOOL".to_string(), self.conversion_tool.clone()),
            ("CONVERSION_VERSION".to_string(), self.conversion_version.clone()),
            (
                "CONVERSION_TIMESTAMP".to_string(),
                self.conversion_timestamp.to_rfc3339(),
            ),
        ];
        if let Some(year) = self.year {
            items.push(("YEAR".to_string(), year.to_string()));
        }
        if let Some([(lon1, lat1), (lon2, lat2)]) = self.corners {
            items.push(("CORNERS".to_string(), format!("{},{},{},{}", lon1, lat1, lon2, lat2)));
        }
        items
    }
}

/// Write `<output>.json` next to the raster
pub fn write_metadata_sidecar(output_path: &Path, meta: &OutputMetadata) -> Result<PathBuf> {
    let sidecar_path = output_path.with_extension("json");
    let json_string = serde_json::to_string_pretty(meta)?;
    std::fs::write(&sidecar_path, json_string)?;
    info!("Created metadata sidecar: {:?}", sidecar_path);
    Ok(sidecar_path)
}
