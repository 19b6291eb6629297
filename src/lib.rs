#![doc = r#"
geoharmon: a grid harmonization and temporal-series engine for geospatial rasters.

This crate takes heterogeneous per-year raster datasets (different resolutions, extents,
coordinate reference systems and temporal coverage), resamples them onto one canonical
grid, assembles dense year-indexed stacks with gap filling, and serves arbitrary
bounding-box cutouts of any year for visualization or analysis. It powers the
`geoharmon` CLI and can be embedded in your own Rust applications.

Requirements
------------
- GDAL development headers and runtime available on your system (for `io::gdal`).
- Rust 2024 edition toolchain.

Add dependency
--------------
```toml
[dependencies]
geoharmon = "0.1"
```

Quick start: build every dataset of a config
--------------------------------------------
```rust,no_run
use geoharmon::api::Catalog;
use geoharmon::io::{GdalOpener, GdalWarper};
use geoharmon::EngineConfig;

fn main() -> geoharmon::Result<()> {
    let config = EngineConfig::from_json_file("datasets.json")?;
    let (catalog, report) = Catalog::build(&config, &GdalOpener, &GdalWarper)?;

    for failed in &report.failed {
        eprintln!("{} omitted: {}", failed.name, failed.reason);
    }
    for stats in catalog.summary("population")? {
        println!("{} mean={:.2} synthetic={}", stats.year, stats.mean, stats.synthetic);
    }
    Ok(())
}
```

Cut a window out of one year
----------------------------
```rust,no_run
use geoharmon::api::Catalog;
use geoharmon::io::{GdalOpener, GdalWarper, SinusoidalTransform};
use geoharmon::{EngineConfig, WindowRequest};

fn main() -> geoharmon::Result<()> {
    let config = EngineConfig::from_json_file("datasets.json")?;
    let (catalog, _) = Catalog::build(&config, &GdalOpener, &GdalWarper)?;

    // Corners may come in any order; output defaults to 854x480
    let request = WindowRequest::new((-11.2843, 16.9779), (-12.3143, 16.4229));
    let window = catalog.cutout(
        "sheep",
        2015,
        &request,
        &SinusoidalTransform::modis(),
        &GdalWarper,
    )?;
    println!("{:?} at {:?}", window.array.dim(), window.transform);
    Ok(())
}
```

Building a series by hand
-------------------------
```rust
use std::collections::BTreeMap;
use ndarray::Array2;
use geoharmon::{build_series, CanonicalGrid, RasterLayer, SampleType};

fn stack_demo() -> geoharmon::Result<()> {
    let grid = CanonicalGrid::modis_sinusoidal();
    let mut raw = BTreeMap::new();
    for (key, value) in [("X_2010.tif", 1.0), ("X_2015.tif", 5.0), ("X_2020.tif", 9.0)] {
        let layer = RasterLayer::new(
            Array2::from_elem(grid.shape(), value),
            grid.metadata_for(SampleType::F32),
        )?;
        raw.insert(key.to_string(), layer);
    }

    let outcome = build_series("X", &raw, 2010, 2020)?;
    assert!((outcome.stack.slice(2012)?[[0, 0]] - 2.6).abs() < 1e-12);
    Ok(())
}
# stack_demo().unwrap();
```

Error handling
--------------
All public functions return `geoharmon::Result<T>`; match on `geoharmon::Error` to handle
specific cases, e.g. an empty series or a year outside the catalog range.

```rust,no_run
use geoharmon::{Error, WindowRequest};
# fn demo(catalog: &geoharmon::api::Catalog) {
let request = WindowRequest::new((-11.0, 17.0), (-12.0, 16.5));
let coords = geoharmon::io::SinusoidalTransform::modis();
match catalog.cutout("goats", 2031, &request, &coords, &geoharmon::io::AffineWarper) {
    Ok(window) => println!("{:?}", window.array.dim()),
    Err(Error::YearOutOfRange { year, start, end }) => eprintln!("{year} not in {start}-{end}"),
    Err(Error::UnknownDataset(name)) => eprintln!("no dataset {name}"),
    Err(other) => eprintln!("Other error: {other}"),
}
# }
```

Useful modules
--------------
- [`api`]: dataset building and the query `Catalog`.
- [`core`]: grid model, configuration and the processing steps.
- [`types`]: enums shared across the crate (e.g. `ResampleKernel`, `SeriesKind`).
- [`io`]: collaborator seams, GDAL adapters, directory loading and writers.
- [`error`]: crate-level `Error` and `Result`.
"#]

// Core modules (public)
pub mod api;
pub mod core;
pub mod error;
pub mod io;
pub mod types;

// Curated public API surface
// Types
pub use core::grid::{CanonicalGrid, GeoTransform, GridRef, RasterLayer, SpatialMetadata};
pub use core::params::{DatasetConfig, EngineConfig};
pub use error::{Error, Result};
pub use types::{
    CorrelationFraming, FillStrategy, ResampleKernel, SampleType, SeriesKind, ValidationPolicy,
};

// Engine steps
pub use core::processing::correlate::{SmoothingKernel, correlate};
pub use core::processing::reproject::{harmonize_layers, reproject_to_grid};
pub use core::processing::series::{
    TimeSeriesStack, build_categorical_series, build_series, build_stacked_series, extract_year,
};
pub use core::processing::validate::{MetadataMismatch, ValidationReport, validate, validate_layers};
pub use core::processing::window::{
    OverlayWindow, WindowRequest, compute_bounds_transform, extract_window,
};

// High-level API re-exports
pub use api::{BuildReport, Catalog, DatasetReport, build_dataset};
