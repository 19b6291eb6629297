//! Dense year-indexed stacks built from sparse, irregularly keyed per-year layers.
//!
//! Keys only need to embed a year somewhere (`"2010"`, `"Assaba_Pop_2010"`,
//! `"2010LCT"`). When a key holds more than one 4-digit run the first one wins;
//! datasets relying on that should have their keys normalized.
use std::collections::BTreeMap;
use std::ops::RangeInclusive;

use ndarray::{Array2, Array3, ArrayView2, Axis, Zip};
use tracing::{debug, info, warn};

use crate::core::grid::RasterLayer;
use crate::core::processing::ops::is_nodata;
use crate::error::{Error, Result};
use crate::types::SampleType;

/// Unified "no class" value of categorical stacks
pub const CLASS_NODATA: f64 = 255.0;

/// Year embedded in a series key: the first run of four ASCII digits.
pub fn extract_year(key: &str) -> Option<i32> {
    key.as_bytes()
        .windows(4)
        .find(|w| w.iter().all(u8::is_ascii_digit))
        .and_then(|w| std::str::from_utf8(w).ok())
        .and_then(|s| s.parse().ok())
}

/// Year-indexed 3-D stack `[year - start_year, row, col]` covering a contiguous year range.
#[derive(Debug, Clone)]
pub struct TimeSeriesStack {
    start_year: i32,
    array: Array3<f64>,
    nodata: Option<f64>,
    dtype: SampleType,
    synthetic_years: Vec<i32>,
}

impl TimeSeriesStack {
    pub fn new(
        start_year: i32,
        array: Array3<f64>,
        nodata: Option<f64>,
        dtype: SampleType,
        synthetic_years: Vec<i32>,
    ) -> Result<Self> {
        if array.len_of(Axis(0)) == 0 {
            return Err(Error::Processing("time series stack needs at least one year".into()));
        }
        Ok(Self {
            start_year,
            array,
            nodata,
            dtype,
            synthetic_years,
        })
    }

    pub fn start_year(&self) -> i32 {
        self.start_year
    }

    pub fn end_year(&self) -> i32 {
        self.start_year + self.array.len_of(Axis(0)) as i32 - 1
    }

    pub fn years(&self) -> RangeInclusive<i32> {
        self.start_year..=self.end_year()
    }

    pub fn array(&self) -> &Array3<f64> {
        &self.array
    }

    pub fn nodata(&self) -> Option<f64> {
        self.nodata
    }

    pub fn dtype(&self) -> SampleType {
        self.dtype
    }

    /// (rows, cols) of every slice
    pub fn slice_shape(&self) -> (usize, usize) {
        let (_, rows, cols) = self.array.dim();
        (rows, cols)
    }

    /// Years that were synthesized (interpolated, extrapolated or carried) rather than read
    pub fn synthetic_years(&self) -> &[i32] {
        &self.synthetic_years
    }

    pub fn is_synthetic(&self, year: i32) -> bool {
        self.synthetic_years.contains(&year)
    }

    pub fn slice(&self, year: i32) -> Result<ArrayView2<'_, f64>> {
        if !self.years().contains(&year) {
            return Err(Error::YearOutOfRange {
                year,
                start: self.start_year,
                end: self.end_year(),
            });
        }
        Ok(self.array.index_axis(Axis(0), (year - self.start_year) as usize))
    }

    /// Overwrite pixels with this stack's nodata wherever `mask` holds its own
    /// nodata. This is the only in-place mutation of a built stack. Returns the
    /// number of pixels that changed.
    pub fn mask_with(&mut self, mask: &TimeSeriesStack) -> Result<usize> {
        if self.array.dim() != mask.array.dim() {
            return Err(Error::shape_mismatch(self.array.shape(), mask.array.shape()));
        }
        let fill = self.nodata.unwrap_or(f64::NAN);
        let mask_nodata = mask.nodata;
        let mut changed = 0usize;
        Zip::from(&mut self.array)
            .and(&mask.array)
            .for_each(|v, &m| {
                let already = if fill.is_nan() { v.is_nan() } else { *v == fill };
                if is_nodata(m, mask_nodata) && !already {
                    *v = fill;
                    changed += 1;
                }
            });
        debug!("Masked {} pixels", changed);
        Ok(changed)
    }
}

/// Built stack plus the keys that were skipped because no year could be read from them
#[derive(Debug)]
pub struct SeriesOutcome {
    pub stack: TimeSeriesStack,
    pub malformed: Vec<String>,
}

struct YearIndex<'a> {
    by_year: BTreeMap<i32, &'a RasterLayer>,
    earliest: (i32, &'a RasterLayer),
    malformed: Vec<String>,
}

impl YearIndex<'_> {
    fn years(&self) -> Vec<i32> {
        self.by_year.keys().copied().collect()
    }
}

fn index_by_year<'a>(dataset: &str, raw: &'a BTreeMap<String, RasterLayer>) -> Result<YearIndex<'a>> {
    let mut by_year: BTreeMap<i32, &RasterLayer> = BTreeMap::new();
    let mut malformed = Vec::new();
    for (key, layer) in raw {
        let Some(year) = extract_year(key) else {
            warn!("{}", Error::MalformedKey { key: key.clone() });
            malformed.push(key.clone());
            continue;
        };
        if by_year.contains_key(&year) {
            warn!("Duplicate year {} in key {}, keeping the earlier key", year, key);
            continue;
        }
        by_year.insert(year, layer);
    }
    let earliest = match by_year.iter().next() {
        Some((y, l)) => (*y, *l),
        None => {
            return Err(Error::EmptySeries {
                dataset: dataset.to_string(),
            })
        }
    };

    let mut shapes = by_year.values().map(|l| l.array().dim());
    if let Some(first) = shapes.next() {
        if let Some(other) = shapes.find(|s| *s != first) {
            return Err(Error::shape_mismatch(&[first.0, first.1], &[other.0, other.1]));
        }
    }
    Ok(YearIndex {
        by_year,
        earliest,
        malformed,
    })
}

fn check_range(start_year: i32, end_year: i32) -> Result<()> {
    if start_year > end_year {
        return Err(Error::InvalidArgument {
            arg: "start_year",
            value: format!("{} > end_year {}", start_year, end_year),
        });
    }
    Ok(())
}

fn assemble(slices: Vec<Array2<f64>>) -> Result<Array3<f64>> {
    let views: Vec<ArrayView2<'_, f64>> = slices.iter().map(|a| a.view()).collect();
    ndarray::stack(Axis(0), &views).map_err(|e| Error::Processing(format!("stacking failed: {}", e)))
}

/// `base + t * (to - from)`, nodata wherever any operand is nodata.
fn extend_linear(
    base: &Array2<f64>,
    from: &Array2<f64>,
    to: &Array2<f64>,
    t: f64,
    nodata: Option<f64>,
) -> Array2<f64> {
    let fill = nodata.unwrap_or(f64::NAN);
    let mut out = Array2::zeros(base.dim());
    Zip::from(&mut out)
        .and(base)
        .and(from)
        .and(to)
        .par_for_each(|o, &b, &f, &t1| {
            *o = if is_nodata(b, nodata) || is_nodata(f, nodata) || is_nodata(t1, nodata) {
                fill
            } else {
                b + t * (t1 - f)
            };
        });
    out
}

/// Slice for `year`: verbatim when available, otherwise linear inter/extrapolation.
fn interpolate_year(index: &YearIndex<'_>, years: &[i32], year: i32, nodata: Option<f64>) -> Array2<f64> {
    if let Some(layer) = index.by_year.get(&year) {
        return layer.array().clone();
    }
    // A single sample has no slope
    if years.len() == 1 {
        return index.earliest.1.array().clone();
    }
    let arr = |y: i32| index.by_year[&y].array();

    let first = years[0];
    let last = years[years.len() - 1];
    if year < first {
        let (y0, y1) = (years[0], years[1]);
        let t = (year - y0) as f64 / (y1 - y0) as f64;
        return extend_linear(arr(y0), arr(y0), arr(y1), t, nodata);
    }
    if year > last {
        let (y0, y1) = (years[years.len() - 2], last);
        let t = (year - y1) as f64 / (y1 - y0) as f64;
        return extend_linear(arr(y1), arr(y0), arr(y1), t, nodata);
    }
    // Bracketing pair: the first available year above `year` and its predecessor
    let upper = years.partition_point(|&y| y < year);
    let (y0, y1) = (years[upper - 1], years[upper]);
    let t = (year - y0) as f64 / (y1 - y0) as f64;
    extend_linear(arr(y0), arr(y0), arr(y1), t, nodata)
}

/// Dense stack over `[start_year, end_year]` from a sparse keyed series, filling
/// missing years by linear interpolation between bracketing years and linear
/// extrapolation beyond the available range.
///
/// Keys without a year are skipped and returned in `malformed`; if no key is
/// usable the dataset fails with [`Error::EmptySeries`]. Nodata and dtype come
/// from the earliest available year.
pub fn build_series(
    dataset: &str,
    raw: &BTreeMap<String, RasterLayer>,
    start_year: i32,
    end_year: i32,
) -> Result<SeriesOutcome> {
    check_range(start_year, end_year)?;
    let index = index_by_year(dataset, raw)?;
    let years = index.years();
    let reference = index.earliest.1.meta();
    let nodata = reference.nodata;
    let dtype = reference.dtype;
    info!(
        "Building {} series {}-{} from years {:?}",
        dataset, start_year, end_year, years
    );

    let mut slices = Vec::with_capacity((end_year - start_year + 1) as usize);
    let mut synthetic = Vec::new();
    for year in start_year..=end_year {
        if !index.by_year.contains_key(&year) {
            debug!("{}: synthesizing {}", dataset, year);
            synthetic.push(year);
        }
        slices.push(interpolate_year(&index, &years, year, nodata));
    }
    if !synthetic.is_empty() {
        info!("{}: synthesized years {:?}", dataset, synthetic);
    }

    let stack = TimeSeriesStack::new(start_year, assemble(slices)?, nodata, dtype, synthetic)?;
    Ok(SeriesOutcome {
        stack,
        malformed: index.malformed,
    })
}

/// Stack the available years without synthesis. Every year of the range must be
/// present; years outside it are ignored.
pub fn build_stacked_series(
    dataset: &str,
    raw: &BTreeMap<String, RasterLayer>,
    start_year: i32,
    end_year: i32,
) -> Result<SeriesOutcome> {
    check_range(start_year, end_year)?;
    let index = index_by_year(dataset, raw)?;
    let missing: Vec<i32> = (start_year..=end_year)
        .filter(|y| !index.by_year.contains_key(y))
        .collect();
    if !missing.is_empty() {
        return Err(Error::IncompleteSeries { missing });
    }
    for y in index.by_year.keys().filter(|y| !(start_year..=end_year).contains(*y)) {
        debug!("{}: ignoring year {} outside {}-{}", dataset, y, start_year, end_year);
    }

    let reference = index.earliest.1.meta();
    let slices = (start_year..=end_year)
        .map(|y| index.by_year[&y].array().clone())
        .collect();
    let stack = TimeSeriesStack::new(
        start_year,
        assemble(slices)?,
        reference.nodata,
        reference.dtype,
        Vec::new(),
    )?;
    Ok(SeriesOutcome {
        stack,
        malformed: index.malformed,
    })
}

/// Class codes narrowed to `u8` range; source nodata, layer nodata and NaN become [`CLASS_NODATA`].
fn to_class_codes(layer: &RasterLayer, source_class_nodata: f64) -> Array2<f64> {
    let layer_nodata = layer.meta().nodata;
    layer.array().mapv(|v| {
        if v == source_class_nodata || is_nodata(v, layer_nodata) {
            CLASS_NODATA
        } else {
            v.round().clamp(0.0, 255.0)
        }
    })
}

/// Stack of discrete class labels. Classes are never blended: a missing year
/// repeats the nearest earlier available year (the earliest one for years
/// before coverage), and every such year is logged.
pub fn build_categorical_series(
    dataset: &str,
    raw: &BTreeMap<String, RasterLayer>,
    start_year: i32,
    end_year: i32,
    source_class_nodata: f64,
) -> Result<SeriesOutcome> {
    check_range(start_year, end_year)?;
    let index = index_by_year(dataset, raw)?;

    let mut slices = Vec::with_capacity((end_year - start_year + 1) as usize);
    let mut carried = Vec::new();
    for year in start_year..=end_year {
        let (source_year, layer) = match index.by_year.range(..=year).next_back() {
            Some((y, l)) => (*y, *l),
            None => index.earliest,
        };
        if source_year != year {
            warn!("{}: no classes for {}, carrying {}", dataset, year, source_year);
            carried.push(year);
        }
        slices.push(to_class_codes(layer, source_class_nodata));
    }

    let stack = TimeSeriesStack::new(
        start_year,
        assemble(slices)?,
        Some(CLASS_NODATA),
        SampleType::U8,
        carried,
    )?;
    Ok(SeriesOutcome {
        stack,
        malformed: index.malformed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::grid::{GeoTransform, SpatialMetadata};
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn layer_from(array: Array2<f64>, nodata: Option<f64>) -> RasterLayer {
        let (height, width) = array.dim();
        RasterLayer::new(
            array,
            SpatialMetadata {
                crs: "LOCAL_CS[\"t\"]".to_string(),
                transform: GeoTransform::new(0.0, 0.0, 1.0, -1.0),
                width,
                height,
                dtype: SampleType::F32,
                nodata,
            },
        )
        .unwrap()
    }

    fn constant(value: f64) -> RasterLayer {
        layer_from(Array2::from_elem((2, 3), value), Some(-9999.0))
    }

    #[test]
    fn year_is_first_four_digit_run() {
        assert_eq!(extract_year("2010"), Some(2010));
        assert_eq!(extract_year("Assaba_Pop_2010"), Some(2010));
        assert_eq!(extract_year("2010LCT"), Some(2010));
        assert_eq!(extract_year("v1999_2005"), Some(1999));
        assert_eq!(extract_year("20105"), Some(2010));
        assert_eq!(extract_year("pop_201"), None);
        assert_eq!(extract_year("no_year"), None);
    }

    #[test]
    fn interpolates_and_extrapolates() {
        let a = array![[1.0, 10.0], [0.0, -4.0]];
        let b = array![[6.0, 0.0], [5.0, 4.0]];
        let c = array![[2.0, 3.0], [5.0, 8.0]];
        let mut raw = BTreeMap::new();
        raw.insert("2010".to_string(), layer_from(a.clone(), None));
        raw.insert("2015".to_string(), layer_from(b.clone(), None));
        raw.insert("2020".to_string(), layer_from(c.clone(), None));

        let out = build_series("t", &raw, 2010, 2023).unwrap();
        let stack = &out.stack;
        assert_eq!(stack.array().dim(), (14, 2, 2));

        let y2012 = &a + &((&b - &a) * 0.4);
        let y2023 = &c + &((&c - &b) * 0.6);
        for (got, want) in stack.slice(2012).unwrap().iter().zip(y2012.iter()) {
            assert_abs_diff_eq!(*got, *want, epsilon = 1e-12);
        }
        for (got, want) in stack.slice(2023).unwrap().iter().zip(y2023.iter()) {
            assert_abs_diff_eq!(*got, *want, epsilon = 1e-12);
        }
        assert_eq!(stack.slice(2015).unwrap(), b.view());
        assert!(stack.is_synthetic(2012));
        assert!(!stack.is_synthetic(2020));
        assert_eq!(stack.synthetic_years().len(), 11);
    }

    #[test]
    fn extrapolates_before_first_year() {
        let mut raw = BTreeMap::new();
        raw.insert("X_2012".to_string(), constant(4.0));
        raw.insert("X_2014".to_string(), constant(6.0));
        let out = build_series("t", &raw, 2010, 2014).unwrap();
        assert!(out.stack.slice(2010).unwrap().iter().all(|v| *v == 2.0));
        assert!(out.stack.slice(2011).unwrap().iter().all(|v| *v == 3.0));
    }

    #[test]
    fn single_sample_is_repeated() {
        let x = array![[1.5, 2.5, 3.5], [4.5, 5.5, 6.5]];
        let mut raw = BTreeMap::new();
        raw.insert("X_2015".to_string(), layer_from(x.clone(), None));
        let out = build_series("t", &raw, 2010, 2023).unwrap();
        for year in 2010..=2023 {
            assert_eq!(out.stack.slice(year).unwrap(), x.view());
        }
    }

    #[test]
    fn malformed_keys_are_skipped() {
        let mut raw = BTreeMap::new();
        raw.insert("X_2010".to_string(), constant(1.0));
        raw.insert("readme".to_string(), constant(2.0));
        let out = build_series("t", &raw, 2010, 2011).unwrap();
        assert_eq!(out.malformed, vec!["readme".to_string()]);

        let mut bad = BTreeMap::new();
        bad.insert("a".to_string(), constant(1.0));
        bad.insert("b".to_string(), constant(1.0));
        assert!(matches!(
            build_series("bad", &bad, 2010, 2011),
            Err(Error::EmptySeries { dataset }) if dataset == "bad"
        ));
    }

    #[test]
    fn nodata_anchor_yields_nodata() {
        let mut raw = BTreeMap::new();
        raw.insert("2010".to_string(), layer_from(array![[1.0, -9999.0]], Some(-9999.0)));
        raw.insert("2012".to_string(), layer_from(array![[3.0, 5.0]], Some(-9999.0)));
        let out = build_series("t", &raw, 2010, 2012).unwrap();
        assert_eq!(out.stack.slice(2011).unwrap(), array![[2.0, -9999.0]].view());
        assert_eq!(out.stack.nodata(), Some(-9999.0));
    }

    #[test]
    fn mismatched_shapes_are_rejected() {
        let mut raw = BTreeMap::new();
        raw.insert("2010".to_string(), constant(1.0));
        raw.insert("2011".to_string(), layer_from(Array2::zeros((3, 3)), None));
        assert!(matches!(
            build_series("t", &raw, 2010, 2011),
            Err(Error::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn stacked_series_requires_every_year() {
        let mut raw = BTreeMap::new();
        raw.insert("gpp_2010".to_string(), constant(1.0));
        raw.insert("gpp_2012".to_string(), constant(3.0));
        match build_stacked_series("gpp", &raw, 2010, 2012) {
            Err(Error::IncompleteSeries { missing }) => assert_eq!(missing, vec![2011]),
            other => panic!("unexpected: {:?}", other.map(|o| o.stack.years())),
        }
        raw.insert("gpp_2011".to_string(), constant(2.0));
        raw.insert("gpp_2009".to_string(), constant(0.0));
        let out = build_stacked_series("gpp", &raw, 2010, 2012).unwrap();
        assert_eq!(out.stack.years(), 2010..=2012);
        assert!(out.stack.slice(2011).unwrap().iter().all(|v| *v == 2.0));
        assert!(out.stack.synthetic_years().is_empty());
    }

    #[test]
    fn categorical_remaps_and_carries() {
        let mut raw = BTreeMap::new();
        raw.insert("2011LCT".to_string(), layer_from(array![[-128.0, 7.0, f64::NAN]], None));
        raw.insert("2013LCT".to_string(), layer_from(array![[10.0, -128.0, 12.0]], None));
        let out = build_categorical_series("land", &raw, 2010, 2014, -128.0).unwrap();
        let stack = out.stack;
        assert_eq!(stack.dtype(), SampleType::U8);
        assert_eq!(stack.nodata(), Some(255.0));
        assert_eq!(stack.slice(2010).unwrap(), array![[255.0, 7.0, 255.0]].view());
        assert_eq!(stack.slice(2011).unwrap(), array![[255.0, 7.0, 255.0]].view());
        assert_eq!(stack.slice(2012).unwrap(), array![[255.0, 7.0, 255.0]].view());
        assert_eq!(stack.slice(2013).unwrap(), array![[10.0, 255.0, 12.0]].view());
        assert_eq!(stack.slice(2014).unwrap(), array![[10.0, 255.0, 12.0]].view());
        assert_eq!(stack.synthetic_years(), &[2010, 2012, 2014]);
    }

    #[test]
    fn mask_with_overwrites_in_place() {
        let mut raw = BTreeMap::new();
        raw.insert("2010".to_string(), constant(3.0));
        let mut sheep = build_series("sheep", &raw, 2010, 2011).unwrap().stack;

        let mut land_raw = BTreeMap::new();
        land_raw.insert(
            "2010".to_string(),
            layer_from(array![[1.0, -128.0, 2.0], [3.0, 4.0, -128.0]], None),
        );
        let land = build_categorical_series("land", &land_raw, 2010, 2011, -128.0)
            .unwrap()
            .stack;

        let changed = sheep.mask_with(&land).unwrap();
        assert_eq!(changed, 4);
        let slice = sheep.slice(2011).unwrap();
        assert_eq!(slice[[0, 1]], -9999.0);
        assert_eq!(slice[[1, 2]], -9999.0);
        assert_eq!(slice[[0, 0]], 3.0);
    }

    #[test]
    fn slice_outside_range_is_rejected() {
        let mut raw = BTreeMap::new();
        raw.insert("2010".to_string(), constant(1.0));
        let stack = build_series("t", &raw, 2010, 2012).unwrap().stack;
        assert!(matches!(
            stack.slice(2013),
            Err(Error::YearOutOfRange { year: 2013, start: 2010, end: 2012 })
        ));
    }
}
