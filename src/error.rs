//! Crate-level error type and `Result` alias.
//! Converts underlying I/O, GDAL and JSON errors, and provides semantic variants
//! for series assembly, query validation and grid compatibility failures.
use thiserror::Error;

use crate::core::processing::validate::MetadataMismatch;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("GDAL error: {0}")]
    Gdal(#[from] crate::io::GdalError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("No 4-digit year found in series key: {key}")]
    MalformedKey { key: String },

    #[error("No usable layers for dataset: {dataset}")]
    EmptySeries { dataset: String },

    #[error("Series is missing years: {missing:?}")]
    IncompleteSeries { missing: Vec<i32> },

    #[error("Degenerate extent: {reason}")]
    DegenerateExtent { reason: String },

    #[error("Year {year} outside supported range [{start}, {end}]")]
    YearOutOfRange { year: i32, start: i32, end: i32 },

    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("CRS mismatch: expected {expected}, got {actual}")]
    CrsMismatch { expected: String, actual: String },

    #[error("Inconsistent metadata: {0}")]
    Metadata(MetadataMismatch),

    #[error("Unknown dataset: {0}")]
    UnknownDataset(String),

    #[error("Invalid argument: {arg}={value}")]
    InvalidArgument { arg: &'static str, value: String },

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("External error: {0}")]
    External(String),
}

impl Error {
    pub fn external<E: std::fmt::Display>(e: E) -> Self {
        Error::External(e.to_string())
    }

    pub(crate) fn shape_mismatch(expected: &[usize], actual: &[usize]) -> Self {
        Error::ShapeMismatch {
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        }
    }
}
