//! Command Line Interface (CLI) layer for geoharmon.
//!
//! This module defines argument parsing (`args`), error types (`errors`),
//! and the orchestration logic (`runner`) for the validate, build, cutout,
//! correlate and summary subcommands. It wires user-provided options to the
//! library functionality exposed via `geoharmon::api`.
//!
//! If you are embedding geoharmon into another application, prefer using
//! the high-level `geoharmon::api` module instead of calling the CLI code.
pub mod args;
pub mod errors;
pub mod runner;

pub use args::CliArgs;
pub use runner::run;
