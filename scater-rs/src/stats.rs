//! Statistics functions

use ndarray::prelude::*;
use ndarray::DataMut;
use ndarray_stats::errors::QuantileError;
use noisy_float::prelude::*;
use num_traits::FromPrimitive;
use std::ops::{Add, Div};

/// Consistency constant that makes the MAD estimate the standard deviation of normal data
pub const MAD_SCALE: f64 = 1.4826;

/// Return the median. Sorts its argument in place.
pub fn median_mut<S, T>(xs: &mut ArrayBase<S, Ix1>) -> Result<T, QuantileError>
where
    S: DataMut<Elem = T>,
    T: Clone + Copy + Ord + FromPrimitive,
    T: Add<Output = T> + Div<Output = T>,
{
    // quantile_mut from ndarray-stats can overflow the stack on large inputs, so sort instead
    if xs.is_empty() {
        return Err(QuantileError::EmptyInput);
    }
    let n = xs.len();
    match xs.as_slice_mut() {
        Some(vector) => vector.sort_unstable(),
        None => {
            let mut owned = xs.to_vec();
            owned.sort_unstable();
            xs.assign(&Array1::from(owned));
        }
    }
    let two = T::from_u64(2).ok_or(QuantileError::EmptyInput)?;
    Ok(if n % 2 == 0 { (xs[n / 2] + xs[n / 2 - 1]) / two } else { xs[n / 2] })
}

/// Values without NaN, in total order
fn non_nan(values: ArrayView1<f64>) -> Array1<N64> {
    values.iter().filter(|v| !v.is_nan()).map(|&v| n64(v)).collect()
}

/// Median ignoring NaN values. NaN when no value is left.
pub fn nan_median(values: ArrayView1<f64>) -> f64 {
    median_mut(&mut non_nan(values)).map_or(f64::NAN, N64::raw)
}

/// Median absolute deviation from `center`, ignoring NaN values and scaled by
/// `MAD_SCALE`. NaN when no value is left or `center` is not finite.
pub fn nan_mad(values: ArrayView1<f64>, center: f64) -> f64 {
    if !center.is_finite() {
        return f64::NAN;
    }
    let mut deviations = non_nan(values).mapv(|v| (v - n64(center)).abs());
    median_mut(&mut deviations).map_or(f64::NAN, |d| d.raw() * MAD_SCALE)
}

#[cfg(test)]
mod test_stats {
    use super::*;
    use ndarray::prelude::array;
    use ndarray_stats::interpolate::Midpoint;
    use ndarray_stats::QuantileExt;

    #[test]
    fn test_median_mut() {
        assert_eq!(
            median_mut(&mut Array::<usize, Ix1>::from(vec![])),
            Err(QuantileError::EmptyInput)
        );
        assert_eq!(median_mut(&mut array![1]), Ok(1));
        assert_eq!(median_mut(&mut array![1, 10]), Ok(5));
        assert_eq!(median_mut(&mut array![100, 1, 10]), Ok(10));
        assert_eq!(median_mut(&mut array![1, 10, 100, 1000]), Ok(55));

        assert_eq!(median_mut(&mut array![1.].mapv(n64)), Ok(n64(1.0)));
        assert_eq!(median_mut(&mut array![10., 1.].mapv(n64)), Ok(n64(5.5)));
        assert_eq!(median_mut(&mut array![1., 10., 100., 1000.].mapv(n64)), Ok(n64(55.0)));
    }

    #[test]
    fn test_median_strided() {
        // column views are not contiguous
        let mut m = Array2::<N64>::from_shape_fn((7, 3), |(i, j)| n64(((i * 5 + j * 3) % 7) as f64));
        let expected = m.clone().quantile_axis_mut(Axis(0), n64(0.5), &Midpoint).unwrap();
        for (j, e) in expected.iter().enumerate() {
            let mut col = m.column_mut(j);
            assert_eq!(median_mut(&mut col).unwrap(), *e);
        }
    }

    #[test]
    fn test_nan_aware() {
        let x = array![3.0, f64::NAN, 1.0, 2.0, 10.0];
        assert_eq!(nan_median(x.view()), 2.5);
        // deviations from 2.5: 0.5, 1.5, 0.5, 7.5 -> median 1.0
        assert_eq!(nan_mad(x.view(), 2.5), MAD_SCALE);
        assert!(nan_median(array![f64::NAN].view()).is_nan());
        assert!(nan_mad(Array1::<f64>::zeros(0).view(), 0.0).is_nan());
    }
}
