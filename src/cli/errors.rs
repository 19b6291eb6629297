use thiserror::Error;

/// Application-specific errors for the CLI
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Missing required argument: {arg}")]
    MissingArgument { arg: String },

    #[error("Window size must be greater than 0, got: {width}x{height}")]
    ZeroSize { width: usize, height: usize },

    #[error("Inconsistent rasters in {dir}: {detail}")]
    Inconsistent { dir: String, detail: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Engine(#[from] geoharmon::Error),
}
