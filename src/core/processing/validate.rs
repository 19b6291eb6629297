//! Spatial metadata consistency checks across a set of raster layers.
//!
//! The verdict never depends on iteration order: exact fields (CRS, width,
//! height) are compared against the value most layers agree on, and transforms
//! are consistent iff every coefficient spans at most `tolerance` across all
//! layers. Ties are broken by layer name.
use std::collections::BTreeMap;
use std::fmt;

use tracing::{info, warn};

use crate::core::grid::{GeoTransform, RasterLayer, SpatialMetadata};
use crate::error::{Error, Result};
use crate::types::ValidationPolicy;

pub const DEFAULT_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataField {
    Crs,
    Transform,
    Width,
    Height,
}

impl MetadataField {
    pub const ALL: [MetadataField; 4] = [
        MetadataField::Crs,
        MetadataField::Transform,
        MetadataField::Width,
        MetadataField::Height,
    ];
}

impl fmt::Display for MetadataField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataField::Crs => write!(f, "crs"),
            MetadataField::Transform => write!(f, "transform"),
            MetadataField::Width => write!(f, "width"),
            MetadataField::Height => write!(f, "height"),
        }
    }
}

/// One offending layer: which field disagreed, with the reference and actual values.
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataMismatch {
    pub layer: String,
    pub field: MetadataField,
    pub expected: String,
    pub actual: String,
}

impl fmt::Display for MetadataMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "layer '{}' {} differs: expected {}, got {}",
            self.layer, self.field, self.expected, self.actual
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    /// Number of layers compared
    pub checked: usize,
    pub mismatch: Option<MetadataMismatch>,
}

impl ValidationReport {
    pub fn is_consistent(&self) -> bool {
        self.mismatch.is_none()
    }

    /// Apply a policy: `Warn` keeps going, `Strict` turns a mismatch into an error.
    pub fn enforce(self, policy: ValidationPolicy) -> Result<()> {
        match (self.mismatch, policy) {
            (Some(m), ValidationPolicy::Strict) => Err(Error::Metadata(m)),
            _ => Ok(()),
        }
    }
}

/// Most common value; ties go to the smallest value so the choice is order-free.
fn consensus<T: Ord + Clone>(values: impl Iterator<Item = T>) -> Option<T> {
    let mut counts: BTreeMap<T, usize> = BTreeMap::new();
    for v in values {
        *counts.entry(v).or_insert(0) += 1;
    }
    let mut best: Option<(T, usize)> = None;
    for (v, n) in counts {
        if best.as_ref().is_none_or(|(_, m)| n > *m) {
            best = Some((v, n));
        }
    }
    best.map(|(v, _)| v)
}

fn check_exact<T, F>(
    entries: &[(&str, &SpatialMetadata)],
    field: MetadataField,
    get: F,
) -> Option<MetadataMismatch>
where
    T: Ord + Clone + fmt::Display,
    F: Fn(&SpatialMetadata) -> T,
{
    let expected = consensus(entries.iter().map(|(_, m)| get(m)))?;
    entries.iter().find_map(|(name, m)| {
        let actual = get(m);
        (actual != expected).then(|| MetadataMismatch {
            layer: name.to_string(),
            field,
            expected: expected.to_string(),
            actual: actual.to_string(),
        })
    })
}

fn median(mut values: Vec<f64>) -> f64 {
    values.sort_by(|a, b| a.total_cmp(b));
    values[(values.len() - 1) / 2]
}

fn format_transform(t: &GeoTransform) -> String {
    format!("{:?}", t.to_gdal())
}

fn check_transform(entries: &[(&str, &SpatialMetadata)], tolerance: f64) -> Option<MetadataMismatch> {
    if entries.is_empty() {
        return None;
    }
    let coeffs: Vec<[f64; 6]> = entries.iter().map(|(_, m)| m.transform.to_gdal()).collect();
    let spread_ok = (0..6).all(|k| {
        let (lo, hi) = coeffs
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), c| (lo.min(c[k]), hi.max(c[k])));
        hi - lo <= tolerance
    });
    if spread_ok {
        return None;
    }

    let mut reference = [0.0; 6];
    for (k, r) in reference.iter_mut().enumerate() {
        *r = median(coeffs.iter().map(|c| c[k]).collect());
    }
    // Farthest from the coefficient-wise median; entries are name-sorted so the
    // strict comparison keeps the first name on ties
    let mut worst: Option<(usize, f64)> = None;
    for (i, c) in coeffs.iter().enumerate() {
        let d = c
            .iter()
            .zip(reference.iter())
            .map(|(a, b)| (a - b).abs())
            .fold(0.0_f64, f64::max);
        if worst.is_none_or(|(_, wd)| d > wd) {
            worst = Some((i, d));
        }
    }
    let (i, _) = worst?;
    Some(MetadataMismatch {
        layer: entries[i].0.to_string(),
        field: MetadataField::Transform,
        expected: format_transform(&GeoTransform::from_gdal(reference)),
        actual: format_transform(&entries[i].1.transform),
    })
}

/// Compare `fields` of every layer's metadata; the first disagreeing field (in
/// `fields` order) is reported.
pub fn validate_layers<'a, I>(layers: I, fields: &[MetadataField], tolerance: f64) -> ValidationReport
where
    I: IntoIterator<Item = (&'a str, &'a SpatialMetadata)>,
{
    let mut entries: Vec<(&str, &SpatialMetadata)> = layers.into_iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));

    if entries.is_empty() {
        info!("Metadata validation: nothing to check");
        return ValidationReport::default();
    }

    let mismatch = fields.iter().find_map(|field| match field {
        MetadataField::Crs => check_exact(&entries, *field, |m| m.crs.clone()),
        MetadataField::Width => check_exact(&entries, *field, |m| m.width),
        MetadataField::Height => check_exact(&entries, *field, |m| m.height),
        MetadataField::Transform => check_transform(&entries, tolerance),
    });

    match &mismatch {
        Some(m) => warn!("Metadata mismatch: {}", m),
        None => info!("Metadata consistent across {} layers", entries.len()),
    }
    ValidationReport {
        checked: entries.len(),
        mismatch,
    }
}

/// Check CRS, transform and dimensions of a keyed layer set with the default tolerance.
pub fn validate(layers: &BTreeMap<String, RasterLayer>) -> bool {
    validate_layers(
        layers.iter().map(|(k, l)| (k.as_str(), l.meta())),
        &MetadataField::ALL,
        DEFAULT_TOLERANCE,
    )
    .is_consistent()
}
