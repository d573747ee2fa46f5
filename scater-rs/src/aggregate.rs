//! Sum / mean / detection statistics of matrix rows or columns across groups.

use crate::error::{Result, ScaterError};
use crate::group::{GroupIndex, GroupLabels};
use crate::workers::{fork_join, ParallelConfig};
use anyhow::bail;
use log::info;
use ndarray::{s, Array2, Axis};
use scater_types::{CountMatrix, GroupKey, MatrixAxis};
use std::str::FromStr;
use std::time::Instant;

/// Per-group statistic
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Statistic {
    /// sum over the members of each group
    Sum,
    /// sum divided by the number of members
    Mean,
    /// number of members with a value above the detection limit
    NumDetected,
    /// fraction of members with a value above the detection limit
    PropDetected,
}

impl FromStr for Statistic {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "sum" => Ok(Statistic::Sum),
            "mean" => Ok(Statistic::Mean),
            "num.detected" => Ok(Statistic::NumDetected),
            "prop.detected" => Ok(Statistic::PropDetected),
            _ => bail!("Statistic not recognized: {}", s),
        }
    }
}

impl Statistic {
    /// Counting statistics threshold values; the others use them as is
    fn is_detection(self) -> bool {
        matches!(self, Statistic::NumDetected | Statistic::PropDetected)
    }

    /// Statistics divided by the group size
    fn is_average(self) -> bool {
        matches!(self, Statistic::Mean | Statistic::PropDetected)
    }
}

/// Options for `aggregate_with_options`
#[derive(Clone, Debug, PartialEq)]
pub struct AggregateOptions {
    /// axis whose entries are grouped; `Columns` aggregates cells, `Rows` aggregates features
    pub axis: MatrixAxis,
    /// statistic computed per group
    pub statistic: Statistic,
    /// values strictly above this count as detected
    pub detection_limit: f64,
    /// worker ranges and backend
    pub parallel: ParallelConfig,
}

impl Default for AggregateOptions {
    fn default() -> Self {
        AggregateOptions {
            axis: MatrixAxis::Columns,
            statistic: Statistic::Sum,
            detection_limit: 0.0,
            parallel: ParallelConfig::serial(),
        }
    }
}

/// Aggregated values with the labels and sizes of the groups. When grouping columns,
/// `values` has one column per group; when grouping rows, one row per group.
#[derive(Clone, Debug, PartialEq)]
pub struct AggregationResult {
    /// axis that was grouped
    pub axis: MatrixAxis,
    /// key values of each group, in output order
    pub labels: GroupLabels,
    /// number of members of each group
    pub sizes: Vec<usize>,
    /// aggregated statistic
    pub values: CountMatrix,
}

/// Sum (`average = false`) or mean (`average = true`) of the entries along `axis` that
/// share a group in `key`, using `num_workers` workers.
pub fn aggregate(
    matrix: &CountMatrix,
    key: &GroupKey,
    axis: MatrixAxis,
    average: bool,
    num_workers: usize,
) -> Result<AggregationResult> {
    let options = AggregateOptions {
        axis,
        statistic: if average { Statistic::Mean } else { Statistic::Sum },
        parallel: ParallelConfig::rayon(num_workers),
        ..Default::default()
    };
    aggregate_with_options(matrix, key, &options)
}

/// Aggregate the entries along `options.axis` by group.
///
/// Entries with a missing key are ignored. The orthogonal axis is split into one
/// contiguous range per worker; each worker fills the output block for its range and
/// blocks are assembled in worker order, so the result does not depend on the number of
/// workers. Sparse input gives sparse output for `Sum` and `NumDetected`.
pub fn aggregate_with_options(
    matrix: &CountMatrix,
    key: &GroupKey,
    options: &AggregateOptions,
) -> Result<AggregationResult> {
    let tick = Instant::now();
    let axis = options.axis;
    let statistic = options.statistic;
    let limit = options.detection_limit;
    if !limit.is_finite() {
        return Err(ScaterError::InvalidParameter(format!(
            "detection limit must be finite, got {limit}"
        )));
    }
    // below zero, entries that are not stored count as detected too
    let zeros_detected = statistic.is_detection() && 0.0 > limit;

    let index = GroupIndex::from_key(key, matrix.len_of(axis))?;
    let other = axis.other();
    let n_other = matrix.len_of(other);
    let n_groups = index.num_groups();

    let blocks = fork_join(&options.parallel, n_other, |range| {
        let mut block = Array2::<f64>::zeros((range.len(), n_groups));
        if zeros_detected {
            // every member starts out detected; stored entries at or below the limit
            // are taken back out
            for mut row in block.rows_mut() {
                for (b, &size) in row.iter_mut().zip(index.sizes.iter()) {
                    *b = size as f64;
                }
            }
        }
        matrix.for_each_in(other, range.clone(), |r, c, v| {
            let (grouped, kept) = match axis {
                MatrixAxis::Columns => (c, r),
                MatrixAxis::Rows => (r, c),
            };
            if let Some(g) = index.assignment[grouped] {
                let contribution = match (statistic.is_detection(), zeros_detected, v > limit) {
                    (false, _, _) => v,
                    (true, false, true) => 1.0,
                    (true, true, false) => -1.0,
                    _ => 0.0,
                };
                block[(kept - range.start, g)] += contribution;
            }
        });
        Ok(block)
    })?;

    // blocks are (range, groups); the output puts groups along the grouped axis
    let mut out = match axis {
        MatrixAxis::Columns => Array2::<f64>::zeros((n_other, n_groups)),
        MatrixAxis::Rows => Array2::<f64>::zeros((n_groups, n_other)),
    };
    for (range, block) in blocks {
        match axis {
            MatrixAxis::Columns => out.slice_mut(s![range, ..]).assign(&block),
            MatrixAxis::Rows => out.slice_mut(s![.., range]).assign(&block.t()),
        }
    }

    if statistic.is_average() {
        let group_axis = match axis {
            MatrixAxis::Columns => Axis(1),
            MatrixAxis::Rows => Axis(0),
        };
        for (mut lane, &size) in out.axis_iter_mut(group_axis).zip(index.sizes.iter()) {
            lane /= size as f64;
        }
    }

    let values = if matrix.is_sparse() && !statistic.is_average() {
        CountMatrix::Sparse(CountMatrix::Dense(out).to_csc())
    } else {
        CountMatrix::Dense(out)
    };

    info!(
        "aggregated {} entries into {} groups ({:?}) took {:.3}s",
        index.assignment.len(),
        n_groups,
        statistic,
        tick.elapsed().as_millis() as f64 / 1000.0
    );

    Ok(AggregationResult {
        axis,
        labels: index.labels,
        sizes: index.sizes,
        values,
    })
}
