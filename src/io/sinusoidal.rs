//! Pure-Rust longitude/latitude to sinusoidal projection on a sphere.
//!
//! Covers the canonical custom-spheroid sinusoidal CRS without libproj, so
//! window queries against that grid work wherever GDAL is not wanted.

use crate::core::grid::MODIS_SPHERE_RADIUS;
use crate::error::{Error, Result};
use crate::io::warp::CoordinateTransformer;

/// Spherical sinusoidal (equal-area) forward projection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SinusoidalTransform {
    pub radius: f64,
    /// Central meridian in degrees
    pub longitude_of_center: f64,
    pub false_easting: f64,
    pub false_northing: f64,
}

impl SinusoidalTransform {
    /// Parameters of the canonical grid's CRS
    pub fn modis() -> Self {
        Self {
            radius: MODIS_SPHERE_RADIUS,
            longitude_of_center: 0.0,
            false_easting: 0.0,
            false_northing: 0.0,
        }
    }

    /// Inverse projection, mostly useful for building test fixtures.
    pub fn projected_to_lonlat(&self, x: f64, y: f64) -> (f64, f64) {
        let lat = (y - self.false_northing) / self.radius;
        let lon = (x - self.false_easting) / (self.radius * lat.cos());
        (lon.to_degrees() + self.longitude_of_center, lat.to_degrees())
    }
}

impl Default for SinusoidalTransform {
    fn default() -> Self {
        Self::modis()
    }
}

impl CoordinateTransformer for SinusoidalTransform {
    fn lonlat_to_projected(&self, lon: f64, lat: f64) -> Result<(f64, f64)> {
        if !lon.is_finite() || !lat.is_finite() {
            return Err(Error::DegenerateExtent {
                reason: format!("non-finite corner ({}, {})", lon, lat),
            });
        }
        if !(-180.0..=180.0).contains(&lon) {
            return Err(Error::InvalidArgument {
                arg: "lon",
                value: lon.to_string(),
            });
        }
        if !(-90.0..=90.0).contains(&lat) {
            return Err(Error::InvalidArgument {
                arg: "lat",
                value: lat.to_string(),
            });
        }
        let phi = lat.to_radians();
        let lambda = (lon - self.longitude_of_center).to_radians();
        let x = self.radius * lambda * phi.cos() + self.false_easting;
        let y = self.radius * phi + self.false_northing;
        Ok((x, y))
    }
}
