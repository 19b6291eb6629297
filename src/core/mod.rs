//! Core engine building blocks: the spatial data model (`grid`), configuration
//! (`params`), and the harmonization and time-series `processing` steps
//! consumed by the high-level `api` module.
pub mod grid;
pub mod params;
pub mod processing;
