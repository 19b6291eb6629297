//! Directory loading into a keyed raw series.
//!
//! Every `*.tif`/`*.tiff` file of a folder becomes one entry keyed by its file
//! stem. A file that fails to open is reported by name and skipped; it never
//! aborts the rest of the folder.
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::core::grid::{RasterLayer, SpatialMetadata};
use crate::error::Result;
use crate::types::SampleType;

/// Raster open primitive: one file in, one layer (band 1 + metadata) out.
pub trait RasterOpener {
    fn open(&self, path: &Path) -> Result<RasterLayer>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LoadOptions {
    /// Round samples to float32 precision and tag them `float32`
    pub as_f32: bool,
}

/// A file that could not be read
#[derive(Debug, Clone)]
pub struct LoadFailure {
    pub name: String,
    pub reason: String,
}

/// Result of loading a folder
#[derive(Debug, Default)]
pub struct LoadReport {
    pub layers: BTreeMap<String, RasterLayer>,
    pub failures: Vec<LoadFailure>,
    /// Entries that are not rasters (directories, other extensions)
    pub skipped: usize,
}

fn is_raster_file(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| matches!(e.to_ascii_lowercase().as_str(), "tif" | "tiff"))
            .unwrap_or(false)
}

fn to_f32(layer: RasterLayer) -> Result<RasterLayer> {
    let (array, meta) = layer.into_parts();
    let array = array.mapv(|v| v as f32 as f64);
    RasterLayer::new(
        array,
        SpatialMetadata {
            dtype: SampleType::F32,
            nodata: meta.nodata.map(|nd| nd as f32 as f64),
            ..meta
        },
    )
}

/// Load every raster of `dir` through `opener`.
pub fn load_raster_directory(
    dir: &Path,
    opener: &dyn RasterOpener,
    options: LoadOptions,
) -> Result<LoadReport> {
    info!("Loading rasters from {:?}", dir);
    let mut report = LoadReport::default();

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if !is_raster_file(&path) {
            debug!("Skipping non-raster entry: {:?}", path);
            report.skipped += 1;
            continue;
        }
        let name = match path.file_stem().and_then(|s| s.to_str()) {
            Some(stem) => stem.to_string(),
            None => {
                warn!("Skipping file with non UTF-8 name: {:?}", path);
                report.skipped += 1;
                continue;
            }
        };

        let loaded = opener.open(&path).and_then(|layer| {
            if options.as_f32 {
                to_f32(layer)
            } else {
                Ok(layer)
            }
        });
        match loaded {
            Ok(layer) => {
                debug!(
                    "Loaded {}: {}x{} {}",
                    name,
                    layer.meta().width,
                    layer.meta().height,
                    layer.meta().dtype
                );
                report.layers.insert(name, layer);
            }
            Err(e) => {
                warn!("Error loading raster {:?}: {}", path, e);
                report.failures.push(LoadFailure {
                    name,
                    reason: e.to_string(),
                });
            }
        }
    }

    info!(
        "Loaded {} layers ({} failed, {} skipped) from {:?}",
        report.layers.len(),
        report.failures.len(),
        report.skipped,
        dir
    );
    Ok(report)
}
