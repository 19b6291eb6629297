use ndarray::{Array, ArrayBase, Data, Dimension, Zip};

/// True for NaN or the nodata sentinel
#[inline]
pub fn is_nodata(value: f64, nodata: Option<f64>) -> bool {
    value.is_nan() || nodata.is_some_and(|nd| value == nd)
}

/// Copy with every nodata sample replaced by NaN, the form renderers expect.
pub fn nodata_to_nan<S, D>(array: &ArrayBase<S, D>, nodata: Option<f64>) -> Array<f64, D>
where
    S: Data<Elem = f64>,
    D: Dimension,
{
    array.mapv(|v| if is_nodata(v, nodata) { f64::NAN } else { v })
}

/// Replace NaN in place (e.g. 0.0 for a dense correlation display grid).
/// Returns the number of replaced samples.
pub fn nan_to_value<D: Dimension>(array: &mut Array<f64, D>, value: f64) -> usize {
    let mut replaced = 0usize;
    Zip::from(array).for_each(|v| {
        if v.is_nan() {
            *v = value;
            replaced += 1;
        }
    });
    replaced
}
