//! Median / MAD outlier calls on QC metrics and the standard per-cell filter.

use crate::error::{Result, ScaterError};
use crate::qc::{table_from_columns, QcMetrics};
use crate::stats::{nan_mad, nan_median};
use anyhow::bail;
use log::info;
use ndarray::{Array1, ArrayView1};
use scater_types::{Column, MetadataTable};
use std::str::FromStr;

/// Side of the distribution where outliers are called
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutlierKind {
    /// small values only
    Lower,
    /// large values only
    Higher,
    /// both tails
    Both,
}

impl FromStr for OutlierKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "lower" => Ok(OutlierKind::Lower),
            "higher" => Ok(OutlierKind::Higher),
            "both" => Ok(OutlierKind::Both),
            _ => bail!("Outlier type not recognized: {}", s),
        }
    }
}

/// Options for `is_outlier`
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OutlierOptions {
    /// number of MADs from the median beyond which a value is an outlier
    pub nmads: f64,
    /// which tails are tested
    pub kind: OutlierKind,
    /// compute thresholds on `ln(1 + x)`
    pub log: bool,
    /// minimum distance from the median, on the transformed scale
    pub min_diff: f64,
}

impl Default for OutlierOptions {
    fn default() -> Self {
        OutlierOptions {
            nmads: 3.0,
            kind: OutlierKind::Both,
            log: false,
            min_diff: 0.0,
        }
    }
}

/// Outlier flags and the thresholds that produced them
#[derive(Clone, Debug, PartialEq)]
pub struct Outliers {
    /// one flag per input value
    pub flags: Vec<bool>,
    /// values below this are outliers; `-inf` when the lower tail is not tested
    pub lower: f64,
    /// values above this are outliers; `inf` when the upper tail is not tested
    pub upper: f64,
}

impl Outliers {
    /// Number of flagged values
    pub fn count(&self) -> usize {
        self.flags.iter().filter(|&&f| f).count()
    }
}

/// Flag values more than `nmads` scaled MADs away from the median. NaN values do not
/// contribute to the thresholds and are never flagged. With `log` set, thresholds are
/// computed on `ln(1 + x)` and reported on the original scale.
pub fn is_outlier(values: ArrayView1<f64>, options: &OutlierOptions) -> Result<Outliers> {
    if !(options.nmads >= 0.0) || !(options.min_diff >= 0.0) {
        return Err(ScaterError::InvalidParameter(format!(
            "nmads and min_diff must be non-negative, got {} and {}",
            options.nmads, options.min_diff
        )));
    }
    if options.log && values.iter().any(|&v| v < 0.0) {
        return Err(ScaterError::InvalidParameter(
            "log-scale outliers need non-negative values".to_string(),
        ));
    }

    let scaled: Array1<f64> = if options.log {
        values.mapv(f64::ln_1p)
    } else {
        values.to_owned()
    };

    let median = nan_median(scaled.view());
    let diff = (options.nmads * nan_mad(scaled.view(), median)).max(options.min_diff);
    let mut lower = median - diff;
    let mut upper = median + diff;
    if median.is_nan() {
        lower = f64::NAN;
        upper = f64::NAN;
    }
    match options.kind {
        OutlierKind::Lower => upper = f64::INFINITY,
        OutlierKind::Higher => lower = f64::NEG_INFINITY,
        OutlierKind::Both => {}
    }

    let flags = scaled.iter().map(|&v| v < lower || v > upper).collect();
    if options.log {
        lower = lower.exp_m1();
        upper = upper.exp_m1();
    }
    Ok(Outliers { flags, lower, upper })
}

/// Result of `quick_per_cell_qc`
#[derive(Clone, Debug, PartialEq)]
pub struct PerCellFilter {
    /// cells with a low total count
    pub low_lib_size: Outliers,
    /// cells with few detected features
    pub low_n_features: Outliers,
    /// cells with a high percentage of counts in each named subset
    pub high_subsets_percent: Vec<(String, Outliers)>,
    /// union of all the above
    pub discard: Vec<bool>,
}

impl PerCellFilter {
    /// Number of discarded cells
    pub fn num_discarded(&self) -> usize {
        self.discard.iter().filter(|&&d| d).count()
    }

    /// Flag columns `low_lib_size`, `low_n_features`, `high_<subset>_percent` and `discard`
    pub fn to_table(&self) -> Result<MetadataTable> {
        let mut columns = vec![
            ("low_lib_size".to_string(), Column::Flag(self.low_lib_size.flags.clone())),
            ("low_n_features".to_string(), Column::Flag(self.low_n_features.flags.clone())),
        ];
        for (name, o) in &self.high_subsets_percent {
            columns.push((format!("high_{name}_percent"), Column::Flag(o.flags.clone())));
        }
        columns.push(("discard".to_string(), Column::Flag(self.discard.clone())));
        table_from_columns(self.discard.len(), columns)
    }
}

/// Standard cell filter: low library size and low detected percentage on the log scale,
/// and high percentages for each subset in `percent_subsets`.
pub fn quick_per_cell_qc(metrics: &QcMetrics, percent_subsets: &[&str], nmads: f64) -> Result<PerCellFilter> {
    let low = OutlierOptions {
        nmads,
        kind: OutlierKind::Lower,
        log: true,
        ..Default::default()
    };
    let high = OutlierOptions {
        nmads,
        kind: OutlierKind::Higher,
        ..Default::default()
    };

    let low_lib_size = is_outlier(metrics.sum.view(), &low)?;
    let low_n_features = is_outlier(metrics.detected.view(), &low)?;

    let mut discard: Vec<bool> = low_lib_size
        .flags
        .iter()
        .zip(&low_n_features.flags)
        .map(|(a, b)| *a || *b)
        .collect();

    let mut high_subsets_percent: Vec<(String, Outliers)> = Vec::with_capacity(percent_subsets.len());
    for &name in percent_subsets {
        if high_subsets_percent.iter().any(|(n, _)| n == name) {
            return Err(ScaterError::DuplicateSubsetName(name.to_string()));
        }
        let subset = metrics.subset(name).ok_or_else(|| ScaterError::UnresolvableSelector {
            subset: name.to_string(),
            reason: "no QC metrics for this subset".to_string(),
        })?;
        let o = is_outlier(subset.percent.view(), &high)?;
        for (d, f) in discard.iter_mut().zip(&o.flags) {
            *d |= *f;
        }
        high_subsets_percent.push((name.to_string(), o));
    }

    let filter = PerCellFilter {
        low_lib_size,
        low_n_features,
        high_subsets_percent,
        discard,
    };
    info!(
        "discarding {} of {} cells ({} low library size, {} low detected features)",
        filter.num_discarded(),
        filter.discard.len(),
        filter.low_lib_size.count(),
        filter.low_n_features.count()
    );
    Ok(filter)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::qc::{compute_metrics, Selector, Subset};
    use assert_approx_eq::assert_approx_eq;
    use ndarray::{array, Array2};
    use scater_types::CountMatrix;

    #[test]
    fn test_single_high_outlier() {
        let mut x: Vec<f64> = (1..=10).map(f64::from).collect();
        x.push(1000.0);
        let options = OutlierOptions {
            kind: OutlierKind::Higher,
            ..Default::default()
        };
        let o = is_outlier(Array1::from(x).view(), &options).unwrap();
        let mut expected = vec![false; 10];
        expected.push(true);
        assert_eq!(o.flags, expected);
        assert_eq!(o.lower, f64::NEG_INFINITY);
        // median 6, MAD 3 * 1.4826
        assert_approx_eq!(o.upper, 6.0 + 3.0 * 3.0 * 1.4826);
    }

    #[test]
    fn test_nan_ignored() {
        let x = array![1.0, f64::NAN, 1.0, 1.0, 50.0];
        let o = is_outlier(x.view(), &OutlierOptions::default()).unwrap();
        assert_eq!(o.flags, vec![false, false, false, false, true]);
        assert_eq!(o.lower, 1.0);
        assert_eq!(o.upper, 1.0);
    }

    #[test]
    fn test_min_diff_and_log_scale() {
        let x = array![100.0, 110.0, 90.0, 105.0, 20.0];
        let options = OutlierOptions {
            log: true,
            kind: OutlierKind::Lower,
            min_diff: 1.0,
            ..Default::default()
        };
        let o = is_outlier(x.view(), &options).unwrap();
        // median ln(101); the min_diff of one log unit dominates
        assert_approx_eq!(o.lower, (101.0f64.ln() - 1.0).exp_m1());
        assert_eq!(o.upper, f64::INFINITY);
        assert_eq!(o.flags, vec![false, false, false, false, true]);
    }

    #[test]
    fn test_degenerate_inputs() {
        let empty = Array1::<f64>::zeros(0);
        let o = is_outlier(empty.view(), &OutlierOptions::default()).unwrap();
        assert!(o.lower.is_nan() && o.upper.is_nan());

        let all_nan = array![f64::NAN, f64::NAN];
        let o = is_outlier(all_nan.view(), &OutlierOptions::default()).unwrap();
        assert_eq!(o.flags, vec![false, false]);

        let options = OutlierOptions {
            nmads: -1.0,
            ..Default::default()
        };
        assert!(is_outlier(all_nan.view(), &options).is_err());
        let options = OutlierOptions {
            log: true,
            ..Default::default()
        };
        assert!(is_outlier(array![-3.0].view(), &options).is_err());
    }

    #[test]
    fn test_quick_per_cell_qc() {
        // 4 features x 8 cells; cell 6 is nearly empty, cell 7 is dominated by feature 3
        let mut counts = Array2::<f64>::from_elem((4, 8), 20.0);
        counts.column_mut(6).fill(1.0);
        counts[(3, 7)] = 400.0;
        for c in 0..6 {
            counts[(3, c)] = 2.0 + c as f64;
        }
        counts[(3, 6)] = 0.0;
        let m = CountMatrix::Dense(counts);
        let metrics = compute_metrics(&m, &[Subset::new("mt", Selector::Indices(vec![3]))], 0.0, 1).unwrap();

        let filter = quick_per_cell_qc(&metrics, &["mt"], 3.0).unwrap();
        assert!(filter.low_lib_size.flags[6]);
        assert!(filter.high_subsets_percent[0].1.flags[7]);
        assert_eq!(filter.discard, vec![false, false, false, false, false, false, true, true]);
        assert_eq!(filter.num_discarded(), 2);

        let table = filter.to_table().unwrap();
        assert_eq!(
            table.names().collect::<Vec<_>>(),
            vec!["low_lib_size", "low_n_features", "high_mt_percent", "discard"]
        );

        assert!(matches!(
            quick_per_cell_qc(&metrics, &["ribo"], 3.0),
            Err(ScaterError::UnresolvableSelector { .. })
        ));
        assert_eq!(
            quick_per_cell_qc(&metrics, &["mt", "mt"], 3.0),
            Err(ScaterError::DuplicateSubsetName("mt".to_string()))
        );
    }
}
