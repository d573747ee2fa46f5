use crate::error::{check_len, Result, ScaterError};
use anyhow::bail;
use log::debug;
use ndarray::prelude::*;
use scater_types::CountMatrix;
use std::str::FromStr;

/// Base of logarithm used by `normalize_counts`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogBase {
    /// ln
    E,
    /// log2
    Two,
    /// log10
    Ten,
}

impl FromStr for LogBase {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "e" => Ok(LogBase::E),
            "2" => Ok(LogBase::Two),
            "10" => Ok(LogBase::Ten),
            _ => bail!("Log base not recognized: {}", s),
        }
    }
}

/// Options for `normalize_counts`
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NormalizeOptions {
    /// apply `x -> log_b(x + pseudo_count)` after scaling
    pub log: bool,
    /// base of the log transform
    pub log_base: LogBase,
    /// added before the log transform
    pub pseudo_count: f64,
    /// rescale the size factors to unit mean first
    pub center_size_factors: bool,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        NormalizeOptions {
            log: true,
            log_base: LogBase::Two,
            pseudo_count: 1.0,
            center_size_factors: true,
        }
    }
}

/// Library size factors: total count of each column (cell) divided by the mean total,
/// so the factors have unit mean.
pub fn library_size_factors(matrix: &CountMatrix) -> Result<Array1<f64>> {
    let lib_sizes = matrix.col_sums();
    let mean = lib_sizes.mean().unwrap_or(0.0);
    if !(mean > 0.0) {
        return Err(ScaterError::InvalidParameter(
            "library size factors need at least one cell with non-zero counts".to_string(),
        ));
    }
    Ok(lib_sizes / mean)
}

/// Check that there is one strictly positive, finite size factor per column, and
/// rescale to unit mean when `center` is set.
fn checked_size_factors(matrix: &CountMatrix, size_factors: ArrayView1<f64>, center: bool) -> Result<Array1<f64>> {
    check_len("size factors", matrix.cols(), size_factors.len())?;
    if let Some(bad) = size_factors.iter().find(|&&s| !(s > 0.0 && s.is_finite())) {
        return Err(ScaterError::InvalidParameter(format!(
            "size factors must be positive and finite, found {bad}"
        )));
    }
    let mut sf = size_factors.to_owned();
    if center {
        if let Some(mean) = sf.mean() {
            sf /= mean;
        }
    }
    Ok(sf)
}

/// Divide each column by its size factor and optionally log-transform:
/// `x -> log_b(x / s + pseudo_count)`.
///
/// Sparse input stays sparse when the transform maps 0 to 0, i.e. without `log` or
/// with a pseudo-count of one. Otherwise the result is dense.
pub fn normalize_counts(
    matrix: &CountMatrix,
    size_factors: ArrayView1<f64>,
    options: &NormalizeOptions,
) -> Result<CountMatrix> {
    if options.log && !(options.pseudo_count > 0.0) {
        return Err(ScaterError::InvalidParameter(format!(
            "pseudo-count must be positive, got {}",
            options.pseudo_count
        )));
    }
    let sf = checked_size_factors(matrix, size_factors, options.center_size_factors)?;

    let pc = options.pseudo_count;
    let log_fn: fn(f64) -> f64 = match options.log_base {
        LogBase::E => f64::ln,
        LogBase::Two => f64::log2,
        LogBase::Ten => f64::log10,
    };
    let transform = |v: f64, _r: usize, c: usize| {
        let x = v / sf[c];
        if options.log {
            log_fn(x + pc)
        } else {
            x
        }
    };

    let keeps_zero = !options.log || pc == 1.0;
    let out = match matrix {
        CountMatrix::Sparse(_) if keeps_zero => matrix.map_stored(transform),
        CountMatrix::Sparse(m) => CountMatrix::Dense(m.to_dense()).map_stored(transform),
        CountMatrix::Dense(_) => matrix.map_stored(transform),
    };
    debug!(
        "normalized {:?} matrix (log: {}, sparse output: {})",
        matrix.shape(),
        options.log,
        out.is_sparse()
    );
    Ok(out)
}

/// Mean of the size-factor-scaled counts of each row (feature). Size factors default to
/// library size factors and are centered to unit mean.
pub fn calculate_average(matrix: &CountMatrix, size_factors: Option<ArrayView1<f64>>) -> Result<Array1<f64>> {
    let sf = match size_factors {
        Some(sf) => checked_size_factors(matrix, sf, true)?,
        None => library_size_factors(matrix)?,
    };
    let mut sums = Array1::<f64>::zeros(matrix.rows());
    matrix.for_each(|r, c, v| sums[r] += v / sf[c]);
    Ok(sums / matrix.cols() as f64)
}

#[cfg(test)]
mod test_normalization {
    use super::*;
    use crate::test_util::{layouts, random_counts, rng};
    use approx::assert_abs_diff_eq;

    fn example() -> Array2<f64> {
        array![
            [136.0, 936.0, 0.0, 0.0, 264.0],
            [134.0, 682.0, 417.0, 8.0, 391.0],
            [0.0, 133.0, 780.0, 0.0, 0.0],
            [396.0, 76.0, 96.0, 198.0, 0.0],
        ]
    }

    #[test]
    fn test_library_size_factors() {
        let m = CountMatrix::Dense(example());
        let sf = library_size_factors(&m).unwrap();
        // column sums 666, 1827, 1293, 206, 655
        let expected = array![666.0, 1827.0, 1293.0, 206.0, 655.0] / 929.4;
        assert_abs_diff_eq!(sf, expected, epsilon = 1e-12);
        assert_abs_diff_eq!(sf.mean().unwrap(), 1.0, epsilon = 1e-12);

        let zeros = CountMatrix::Dense(Array2::zeros((3, 2)));
        assert!(matches!(library_size_factors(&zeros), Err(ScaterError::InvalidParameter(_))));
    }

    #[test]
    fn test_log_normalize() {
        // # numpy
        // mat = np.array(...); sf = mat.sum(axis=0); sf = sf / sf.mean()
        // np.log2(1 + mat / sf)
        let dense = example();
        let m = CountMatrix::Dense(dense.clone());
        let sf = library_size_factors(&m).unwrap();
        let norm = normalize_counts(&m, sf.view(), &NormalizeOptions::default()).unwrap();

        let mut expected = dense;
        for (mut col, s) in expected.axis_iter_mut(Axis(1)).zip(sf.iter()) {
            col.mapv_inplace(|x| (x / s + 1.0).log2());
        }
        assert_abs_diff_eq!(norm.to_dense(), expected, epsilon = 1e-12);
        assert_abs_diff_eq!(norm.get(0, 0), (136.0f64 / 666.0 * 929.4 + 1.0).log2(), epsilon = 1e-9);
    }

    #[test]
    fn test_unit_factors_without_log_is_identity() {
        let m = CountMatrix::Dense(example());
        let options = NormalizeOptions {
            log: false,
            ..Default::default()
        };
        let ones = Array1::<f64>::ones(5);
        assert_eq!(normalize_counts(&m, ones.view(), &options).unwrap(), m);
    }

    #[test]
    fn test_sparse_matches_dense() {
        let rng = &mut rng(11);
        let dense = random_counts(rng, 20, 15, 0.3);
        let sf = Array1::from_shape_fn(15, |i| 0.5 + i as f64 / 10.0);
        for base in [LogBase::E, LogBase::Two, LogBase::Ten] {
            let options = NormalizeOptions {
                log_base: base,
                ..Default::default()
            };
            let results: Vec<CountMatrix> = layouts(&dense)
                .iter()
                .map(|m| normalize_counts(m, sf.view(), &options).unwrap())
                .collect();
            assert!(results[1].is_sparse() && results[2].is_sparse());
            assert_eq!(results[0].to_dense(), results[1].to_dense());
            assert_eq!(results[0].to_dense(), results[2].to_dense());
        }

        let options = NormalizeOptions {
            pseudo_count: 0.5,
            ..Default::default()
        };
        let csc = CountMatrix::Dense(dense).to_csc();
        let out = normalize_counts(&CountMatrix::Sparse(csc), sf.view(), &options).unwrap();
        assert!(!out.is_sparse());
        assert!(out.get(0, 0).is_finite());
    }

    #[test]
    fn test_size_factor_errors() {
        let m = CountMatrix::Dense(example());
        let short = Array1::<f64>::ones(4);
        assert!(matches!(
            normalize_counts(&m, short.view(), &NormalizeOptions::default()),
            Err(ScaterError::DimensionMismatch { .. })
        ));
        let with_zero = array![1.0, 1.0, 0.0, 1.0, 1.0];
        assert!(matches!(
            normalize_counts(&m, with_zero.view(), &NormalizeOptions::default()),
            Err(ScaterError::InvalidParameter(_))
        ));
        assert!(matches!(
            calculate_average(&m, Some(with_zero.view())),
            Err(ScaterError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_calculate_average() {
        let m = CountMatrix::Dense(array![[2.0, 6.0], [0.0, 4.0]]);
        // library sizes 2 and 10, size factors 1/3 and 5/3
        let avg = calculate_average(&m, None).unwrap();
        assert_abs_diff_eq!(avg, array![(6.0 + 3.6) / 2.0, 2.4 / 2.0], epsilon = 1e-12);

        let sf = array![2.0, 2.0];
        let avg = calculate_average(&m, Some(sf.view())).unwrap();
        assert_abs_diff_eq!(avg, array![4.0, 2.0], epsilon = 1e-12);
    }

    #[test]
    fn test_log_base_from_str() {
        assert_eq!("10".parse::<LogBase>().unwrap(), LogBase::Ten);
        assert!("log".parse::<LogBase>().is_err());
    }
}
