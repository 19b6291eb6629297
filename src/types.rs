//! Shared types and enums used across geoharmon.
//! Includes `ResampleKernel`, `SampleType`, `SeriesKind`, `FillStrategy`,
//! `ValidationPolicy` and `CorrelationFraming`.
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Resampling kernel handed to the warp primitive.
///
/// Nearest is meant for categorical rasters (no invented classes), cubic for
/// continuous physical quantities. Picking the wrong one for the data is a
/// caller error and is not detected.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResampleKernel {
    Nearest,
    Cubic,
}

impl std::fmt::Display for ResampleKernel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResampleKernel::Nearest => write!(f, "nearest"),
            ResampleKernel::Cubic => write!(f, "cubic"),
        }
    }
}

/// Sample type recorded in raster metadata. Pixel values are always carried as
/// `f64` in memory; this tag describes the source (or narrowed) representation.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleType {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    F32,
    F64,
}

impl SampleType {
    /// Parse a GDAL data type name (`Byte`, `UInt16`, `Float32`, ...).
    pub fn from_gdal_name(name: &str) -> Option<Self> {
        let t = match name {
            "Byte" | "UInt8" => SampleType::U8,
            "Int8" => SampleType::I8,
            "UInt16" => SampleType::U16,
            "Int16" => SampleType::I16,
            "UInt32" => SampleType::U32,
            "Int32" => SampleType::I32,
            "Float32" => SampleType::F32,
            "Float64" => SampleType::F64,
            _ => return None,
        };
        Some(t)
    }

    pub fn is_integer(self) -> bool {
        !matches!(self, SampleType::F32 | SampleType::F64)
    }
}

impl std::fmt::Display for SampleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SampleType::U8 => "uint8",
            SampleType::I8 => "int8",
            SampleType::U16 => "uint16",
            SampleType::I16 => "int16",
            SampleType::U32 => "uint32",
            SampleType::I32 => "int32",
            SampleType::F32 => "float32",
            SampleType::F64 => "float64",
        };
        write!(f, "{}", s)
    }
}

/// Whether a dataset holds continuous quantities or discrete class labels.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeriesKind {
    #[default]
    Continuous,
    Categorical,
}

impl SeriesKind {
    /// Kernel used when a dataset config does not name one.
    pub fn default_kernel(self) -> ResampleKernel {
        match self {
            SeriesKind::Continuous => ResampleKernel::Cubic,
            SeriesKind::Categorical => ResampleKernel::Nearest,
        }
    }
}

/// How missing years of a continuous series are produced.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillStrategy {
    /// Linear interpolation between bracketing years, linear extrapolation outside.
    #[default]
    Interpolate,
    /// Stack the available years as-is; every year of the range must be present.
    StackAvailable,
}

/// What to do when layers of one dataset disagree on grid metadata.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationPolicy {
    #[default]
    Warn,
    Strict,
}

/// Output framing of the change-correlation score.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrelationFraming {
    /// `a * b`: positive where both variables move the same way.
    #[default]
    CoMovement,
    /// `(1 - a * b) / 2`: high where the variables move in opposite directions.
    AntiCorrelation,
}

impl std::fmt::Display for CorrelationFraming {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CorrelationFraming::CoMovement => write!(f, "CoMovement"),
            CorrelationFraming::AntiCorrelation => write!(f, "AntiCorrelation"),
        }
    }
}
