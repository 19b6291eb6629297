use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::grid::CanonicalGrid;
use crate::error::{Error, Result};
use crate::types::{FillStrategy, ResampleKernel, SeriesKind, ValidationPolicy};

pub const DEFAULT_START_YEAR: i32 = 2010;
pub const DEFAULT_END_YEAR: i32 = 2023;

/// Negative class code land-cover products use for "no data"
pub const DEFAULT_SOURCE_CLASS_NODATA: f64 = -128.0;

fn default_true() -> bool {
    true
}

fn default_start_year() -> i32 {
    DEFAULT_START_YEAR
}

fn default_end_year() -> i32 {
    DEFAULT_END_YEAR
}

fn default_source_class_nodata() -> f64 {
    DEFAULT_SOURCE_CLASS_NODATA
}

/// One input dataset: a folder of single-band rasters, one per year.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    pub name: String,
    pub path: PathBuf,
    #[serde(default)]
    pub kind: SeriesKind,
    /// Kernel for grid harmonization; defaults by kind
    #[serde(default)]
    pub kernel: Option<ResampleKernel>,
    /// Reproject every layer onto the canonical grid before stacking
    #[serde(default = "default_true")]
    pub harmonize: bool,
    #[serde(default)]
    pub fill: FillStrategy,
    /// Normalize loaded samples to float32 precision
    #[serde(default)]
    pub as_f32: bool,
    /// Mask this dataset wherever the named dataset holds nodata
    #[serde(default)]
    pub mask_with: Option<String>,
    #[serde(default)]
    pub validation: ValidationPolicy,
    /// Source class value remapped to the unified class nodata (categorical only)
    #[serde(default = "default_source_class_nodata")]
    pub source_class_nodata: f64,
}

impl DatasetConfig {
    pub fn new<P: Into<PathBuf>>(name: &str, path: P, kind: SeriesKind) -> Self {
        Self {
            name: name.to_string(),
            path: path.into(),
            kind,
            kernel: None,
            harmonize: true,
            fill: FillStrategy::Interpolate,
            as_f32: false,
            mask_with: None,
            validation: ValidationPolicy::Warn,
            source_class_nodata: DEFAULT_SOURCE_CLASS_NODATA,
        }
    }

    pub fn kernel(&self) -> ResampleKernel {
        self.kernel.unwrap_or_else(|| self.kind.default_kernel())
    }
}

/// Engine configuration suitable for JSON config files
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub grid: CanonicalGrid,
    #[serde(default = "default_start_year")]
    pub start_year: i32,
    #[serde(default = "default_end_year")]
    pub end_year: i32,
    #[serde(default)]
    pub datasets: Vec<DatasetConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            grid: CanonicalGrid::modis_sinusoidal(),
            start_year: DEFAULT_START_YEAR,
            end_year: DEFAULT_END_YEAR,
            datasets: Vec::new(),
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(s: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&text)
    }

    pub fn dataset(&self, name: &str) -> Option<&DatasetConfig> {
        self.datasets.iter().find(|d| d.name == name)
    }

    pub fn validate(&self) -> Result<()> {
        if self.start_year > self.end_year {
            return Err(Error::InvalidArgument {
                arg: "start_year",
                value: format!("{} > end_year {}", self.start_year, self.end_year),
            });
        }
        if self.grid.width == 0 || self.grid.height == 0 {
            return Err(Error::InvalidArgument {
                arg: "grid",
                value: format!("{}x{}", self.grid.width, self.grid.height),
            });
        }
        let mut seen = HashSet::new();
        for d in &self.datasets {
            if !seen.insert(d.name.as_str()) {
                return Err(Error::InvalidArgument {
                    arg: "datasets.name",
                    value: format!("duplicate {}", d.name),
                });
            }
        }
        for d in &self.datasets {
            if let Some(mask) = &d.mask_with {
                if mask == &d.name || self.dataset(mask).is_none() {
                    return Err(Error::InvalidArgument {
                        arg: "mask_with",
                        value: format!("{} -> {}", d.name, mask),
                    });
                }
            }
        }
        Ok(())
    }
}
