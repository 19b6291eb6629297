//! I/O layer around the engine: the collaborator seams (`warp`), the pure-Rust
//! sinusoidal transform, GDAL-backed adapters, directory loading, and `writers`
//! for GeoTIFF outputs, world files and metadata sidecars.
pub mod gdal;
pub use gdal::{GdalCoordTransform, GdalError, GdalMetadata, GdalOpener, GdalRasterReader, GdalWarper};

pub mod loader;
pub use loader::{LoadFailure, LoadOptions, LoadReport, RasterOpener, load_raster_directory};

pub mod sinusoidal;
pub use sinusoidal::SinusoidalTransform;

pub mod warp;
pub use warp::{AffineWarper, CoordinateTransformer, Warper};

pub mod writers;
