//! High-level library API: build every configured dataset into a year-indexed
//! stack on the canonical grid, then serve cutouts, correlations and summaries
//! from the resulting [`Catalog`]. Prefer these entrypoints over the low-level
//! processing modules when integrating geoharmon.
use std::collections::BTreeMap;

use ndarray::Array2;
use tracing::{info, warn};

use crate::core::grid::{CanonicalGrid, GridRef, RasterLayer};
use crate::core::params::{DatasetConfig, EngineConfig};
use crate::core::processing::correlate::{correlate, SmoothingKernel};
use crate::core::processing::ops::nodata_to_nan;
use crate::core::processing::reproject::harmonize_layers;
use crate::core::processing::series::{
    build_categorical_series, build_series, build_stacked_series, SeriesOutcome, TimeSeriesStack,
};
use crate::core::processing::stats::{series_stats, SliceStats};
use crate::core::processing::validate::{
    validate_layers, MetadataField, MetadataMismatch, DEFAULT_TOLERANCE,
};
use crate::core::processing::window::{extract_window, OverlayWindow, WindowRequest};
use crate::error::{Error, Result};
use crate::io::loader::{load_raster_directory, LoadFailure, LoadOptions, RasterOpener};
use crate::io::warp::{CoordinateTransformer, Warper};
use crate::types::{CorrelationFraming, FillStrategy, SeriesKind};

/// What happened while building one dataset
#[derive(Debug, Clone, Default)]
pub struct DatasetReport {
    pub name: String,
    /// Layers that entered the series builder
    pub layers: usize,
    pub load_failures: Vec<LoadFailure>,
    pub harmonize_failures: Vec<LoadFailure>,
    pub malformed_keys: Vec<String>,
    pub mismatch: Option<MetadataMismatch>,
    pub synthetic_years: Vec<i32>,
    /// Pixels overwritten by `mask_with`
    pub masked: usize,
}

/// Build a stack from already loaded layers: harmonize, validate, then assemble
/// according to the dataset kind and fill strategy.
pub fn build_dataset_from_layers(
    config: &DatasetConfig,
    raw: BTreeMap<String, RasterLayer>,
    grid: &CanonicalGrid,
    start_year: i32,
    end_year: i32,
    warper: &dyn Warper,
) -> Result<(TimeSeriesStack, DatasetReport)> {
    let mut report = DatasetReport {
        name: config.name.clone(),
        ..Default::default()
    };

    let layers = if config.harmonize {
        let outcome = harmonize_layers(raw, grid, config.kernel(), warper, DEFAULT_TOLERANCE);
        report.harmonize_failures = outcome.failures;
        outcome.layers
    } else {
        raw
    };
    report.layers = layers.len();

    let validation = validate_layers(
        layers.iter().map(|(k, l)| (k.as_str(), l.meta())),
        &MetadataField::ALL,
        DEFAULT_TOLERANCE,
    );
    report.mismatch = validation.mismatch.clone();
    validation.enforce(config.validation)?;

    let SeriesOutcome { stack, malformed } = match (config.kind, config.fill) {
        (SeriesKind::Categorical, _) => build_categorical_series(
            &config.name,
            &layers,
            start_year,
            end_year,
            config.source_class_nodata,
        )?,
        (SeriesKind::Continuous, FillStrategy::Interpolate) => {
            build_series(&config.name, &layers, start_year, end_year)?
        }
        (SeriesKind::Continuous, FillStrategy::StackAvailable) => {
            build_stacked_series(&config.name, &layers, start_year, end_year)?
        }
    };
    report.malformed_keys = malformed;
    report.synthetic_years = stack.synthetic_years().to_vec();
    Ok((stack, report))
}

/// Load a dataset folder through `opener` and build its stack.
pub fn build_dataset(
    config: &DatasetConfig,
    grid: &CanonicalGrid,
    start_year: i32,
    end_year: i32,
    opener: &dyn RasterOpener,
    warper: &dyn Warper,
) -> Result<(TimeSeriesStack, DatasetReport)> {
    info!("Building dataset {} from {:?}", config.name, config.path);
    let loaded = load_raster_directory(
        &config.path,
        opener,
        LoadOptions {
            as_f32: config.as_f32,
        },
    )?;
    let load_failures = loaded.failures;
    let (stack, mut report) =
        build_dataset_from_layers(config, loaded.layers, grid, start_year, end_year, warper)?;
    report.load_failures = load_failures;
    Ok((stack, report))
}

/// Outcome of building every configured dataset
#[derive(Debug, Clone, Default)]
pub struct BuildReport {
    pub datasets: Vec<DatasetReport>,
    /// Datasets that could not be built at all
    pub failed: Vec<LoadFailure>,
}

impl BuildReport {
    pub fn built(&self) -> usize {
        self.datasets.len()
    }
}

/// Built stacks by dataset name, all on one canonical grid and year range.
/// Read-only after building apart from the explicit [`Catalog::mask`].
#[derive(Debug, Clone)]
pub struct Catalog {
    grid: CanonicalGrid,
    start_year: i32,
    end_year: i32,
    stacks: BTreeMap<String, TimeSeriesStack>,
}

impl Catalog {
    pub fn new(grid: CanonicalGrid, start_year: i32, end_year: i32) -> Self {
        Self {
            grid,
            start_year,
            end_year,
            stacks: BTreeMap::new(),
        }
    }

    /// Build every dataset of `config`. A dataset that fails is reported and
    /// left out; the others are still built. `mask_with` relations are applied
    /// once all datasets exist.
    pub fn build(
        config: &EngineConfig,
        opener: &dyn RasterOpener,
        warper: &dyn Warper,
    ) -> Result<(Self, BuildReport)> {
        config.validate()?;
        let mut catalog = Catalog::new(config.grid.clone(), config.start_year, config.end_year);
        let mut report = BuildReport::default();

        for dataset in &config.datasets {
            let built = build_dataset(
                dataset,
                &config.grid,
                config.start_year,
                config.end_year,
                opener,
                warper,
            )
            .and_then(|(stack, ds_report)| {
                catalog.insert(&dataset.name, stack)?;
                Ok(ds_report)
            });
            match built {
                Ok(ds_report) => report.datasets.push(ds_report),
                Err(e) => {
                    warn!("Dataset {} failed: {}", dataset.name, e);
                    report.failed.push(LoadFailure {
                        name: dataset.name.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        for dataset in &config.datasets {
            let Some(mask_name) = &dataset.mask_with else {
                continue;
            };
            if !catalog.contains(&dataset.name) {
                continue;
            }
            match catalog.mask(&dataset.name, mask_name) {
                Ok(masked) => {
                    if let Some(r) = report.datasets.iter_mut().find(|r| r.name == dataset.name) {
                        r.masked = masked;
                    }
                }
                Err(e) => warn!("Could not mask {} with {}: {}", dataset.name, mask_name, e),
            }
        }

        info!(
            "Built {} datasets ({} failed)",
            report.built(),
            report.failed.len()
        );
        Ok((catalog, report))
    }

    pub fn grid(&self) -> &CanonicalGrid {
        &self.grid
    }

    pub fn year_range(&self) -> (i32, i32) {
        (self.start_year, self.end_year)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.stacks.keys().map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.stacks.contains_key(name)
    }

    /// Add a stack; it must cover the catalog's year range on the catalog's grid.
    pub fn insert(&mut self, name: &str, stack: TimeSeriesStack) -> Result<()> {
        if stack.slice_shape() != self.grid.shape() {
            let (rows, cols) = stack.slice_shape();
            return Err(Error::shape_mismatch(
                &[self.grid.height, self.grid.width],
                &[rows, cols],
            ));
        }
        if stack.start_year() != self.start_year || stack.end_year() != self.end_year {
            return Err(Error::InvalidArgument {
                arg: "years",
                value: format!(
                    "{}-{} (expected {}-{})",
                    stack.start_year(),
                    stack.end_year(),
                    self.start_year,
                    self.end_year
                ),
            });
        }
        self.stacks.insert(name.to_string(), stack);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&TimeSeriesStack> {
        self.stacks
            .get(name)
            .ok_or_else(|| Error::UnknownDataset(name.to_string()))
    }

    fn check_year(&self, year: i32) -> Result<()> {
        if year < self.start_year || year > self.end_year {
            return Err(Error::YearOutOfRange {
                year,
                start: self.start_year,
                end: self.end_year,
            });
        }
        Ok(())
    }

    /// Set `target` pixels to its nodata wherever `mask` is nodata.
    pub fn mask(&mut self, target: &str, mask: &str) -> Result<usize> {
        if target == mask {
            return Err(Error::InvalidArgument {
                arg: "mask_with",
                value: target.to_string(),
            });
        }
        let mask_stack = self.get(mask)?.clone();
        let stack = self
            .stacks
            .get_mut(target)
            .ok_or_else(|| Error::UnknownDataset(target.to_string()))?;
        let masked = stack.mask_with(&mask_stack)?;
        info!("Masked {} pixels of {} with {}", masked, target, mask);
        Ok(masked)
    }

    /// Window of `name` at `year`. The year must lie in the catalog range and the
    /// corners must span a non-degenerate extent.
    pub fn cutout(
        &self,
        name: &str,
        year: i32,
        request: &WindowRequest,
        coords: &dyn CoordinateTransformer,
        warper: &dyn Warper,
    ) -> Result<OverlayWindow> {
        self.check_year(year)?;
        let stack = self.get(name)?;
        let slice = stack.slice(year)?;
        let src_grid = GridRef {
            crs: &self.grid.crs,
            transform: &self.grid.transform,
            nodata: stack.nodata(),
        };
        extract_window(slice, src_grid, request, coords, warper)
    }

    /// Change correlation of datasets `a` and `b` between two years.
    /// Nodata becomes NaN before smoothing, so it propagates into the score.
    pub fn correlate(
        &self,
        a: &str,
        b: &str,
        past_year: i32,
        future_year: i32,
        kernel: &SmoothingKernel,
        framing: CorrelationFraming,
    ) -> Result<Array2<f64>> {
        self.check_year(past_year)?;
        self.check_year(future_year)?;
        let sa = self.get(a)?;
        let sb = self.get(b)?;
        let past_a = nodata_to_nan(&sa.slice(past_year)?, sa.nodata());
        let future_a = nodata_to_nan(&sa.slice(future_year)?, sa.nodata());
        let past_b = nodata_to_nan(&sb.slice(past_year)?, sb.nodata());
        let future_b = nodata_to_nan(&sb.slice(future_year)?, sb.nodata());
        correlate(
            past_a.view(),
            future_a.view(),
            past_b.view(),
            future_b.view(),
            kernel,
            framing,
        )
    }

    /// Per-year statistics of one dataset
    pub fn summary(&self, name: &str) -> Result<Vec<SliceStats>> {
        series_stats(self.get(name)?)
    }
}
