use clap::{Parser, Subcommand};
use std::path::PathBuf;

use geoharmon::core::processing::window::{DEFAULT_WINDOW_HEIGHT, DEFAULT_WINDOW_WIDTH};
use geoharmon::{CorrelationFraming, ResampleKernel};

#[derive(Parser)]
#[command(name = "geoharmon", version, about = "geoharmon CLI")]
pub struct CliArgs {
    /// Engine configuration file (JSON)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable logging
    #[arg(long, default_value_t = false, global = true)]
    pub log: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Check that every raster of a folder shares CRS, transform and dimensions
    Validate {
        /// Folder of *.tif / *.tiff rasters
        dir: PathBuf,

        /// Absolute tolerance for transform coefficients
        #[arg(long, default_value_t = 1e-9)]
        tolerance: f64,

        /// Exit with an error on the first mismatch instead of warning
        #[arg(long, default_value_t = false)]
        strict: bool,
    },

    /// Build every configured dataset and print a report
    Build,

    /// Cut a window out of one dataset's year slice and write it as GeoTIFF
    Cutout {
        dataset: String,

        year: i32,

        #[arg(long, allow_hyphen_values = true)]
        lon1: f64,

        #[arg(long, allow_hyphen_values = true)]
        lat1: f64,

        #[arg(long, allow_hyphen_values = true)]
        lon2: f64,

        #[arg(long, allow_hyphen_values = true)]
        lat2: f64,

        #[arg(long, default_value_t = DEFAULT_WINDOW_WIDTH)]
        width: usize,

        #[arg(long, default_value_t = DEFAULT_WINDOW_HEIGHT)]
        height: usize,

        #[arg(long, value_enum, default_value_t = ResampleKernel::Nearest)]
        kernel: ResampleKernel,

        /// Output GeoTIFF
        #[arg(short, long)]
        output: PathBuf,

        /// Also write a world file and .prj next to the output
        #[arg(long, default_value_t = false)]
        world_file: bool,

        /// Also write a JSON metadata sidecar
        #[arg(long, default_value_t = false)]
        sidecar: bool,

        /// Project corners with the built-in sinusoidal transform instead of GDAL/PROJ
        #[arg(long, default_value_t = false)]
        sinusoidal: bool,
    },

    /// Change correlation between two datasets over two years
    Correlate {
        a: String,

        b: String,

        #[arg(long)]
        past: i32,

        #[arg(long)]
        future: i32,

        #[arg(long, value_enum, default_value_t = CorrelationFraming::CoMovement)]
        framing: CorrelationFraming,

        /// Replace NaN in the score with this value
        #[arg(long, allow_hyphen_values = true)]
        fill_nan: Option<f64>,

        /// Output GeoTIFF
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Per-year statistics of a dataset, printed as JSON
    Summary { dataset: String },
}
