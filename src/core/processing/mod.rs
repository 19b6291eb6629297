pub mod correlate;
pub mod ops;
pub mod reproject;
pub mod series;
pub mod stats;
pub mod validate;
pub mod window;
