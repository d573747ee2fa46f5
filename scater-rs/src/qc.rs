//! Per-cell and per-feature quality control metrics, with optional named subsets of the
//! reduced axis (e.g. mitochondrial genes, spike-ins).

use crate::error::{Result, ScaterError};
use crate::workers::{fork_join, ParallelConfig};
use log::info;
use ndarray::{Array1, Array2, Axis};
use scater_types::{Column, CountMatrix, MatrixAxis, MetadataTable};
use std::collections::{HashMap, HashSet};
use std::time::Instant;

/// Entries of the reduced axis that belong to a subset
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Selector {
    /// zero-based positions
    Indices(Vec<usize>),
    /// one flag per entry of the reduced axis
    Mask(Vec<bool>),
    /// entry names, resolved against the names of the reduced axis
    Names(Vec<String>),
}

/// A named selection of the reduced axis
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Subset {
    /// column prefix in the metrics; must be present and unique
    pub name: Option<String>,
    /// entries of the reduced axis in the subset
    pub selector: Selector,
}

impl Subset {
    /// Named subset
    pub fn new(name: impl Into<String>, selector: Selector) -> Subset {
        Subset {
            name: Some(name.into()),
            selector,
        }
    }
}

/// Options for `compute_metrics_with_options`
#[derive(Clone, Debug, PartialEq)]
pub struct QcOptions {
    /// axis of the entities that get metrics; `Columns` for per-cell QC, `Rows` for
    /// per-feature QC. The other axis is reduced.
    pub entities: MatrixAxis,
    /// values strictly above this count as detected
    pub detection_limit: f64,
    /// worker ranges and backend
    pub parallel: ParallelConfig,
}

impl Default for QcOptions {
    fn default() -> Self {
        QcOptions {
            entities: MatrixAxis::Columns,
            detection_limit: 0.0,
            parallel: ParallelConfig::serial(),
        }
    }
}

/// Metrics of one subset, one value per entity
#[derive(Clone, Debug, PartialEq)]
pub struct SubsetMetrics {
    /// subset name
    pub name: String,
    /// number of reduced-axis entries in the subset
    pub size: usize,
    /// total over the subset entries
    pub sum: Array1<f64>,
    /// subset sum divided by the subset size
    pub mean: Array1<f64>,
    /// percentage of subset entries above the detection limit
    pub detected: Array1<f64>,
    /// subset mean divided by the overall mean
    pub ratio: Array1<f64>,
    /// subset sum as a percentage of the overall sum
    pub percent: Array1<f64>,
}

/// QC metrics of every entity of one axis
#[derive(Clone, Debug, PartialEq)]
pub struct QcMetrics {
    /// axis of the entities
    pub entities: MatrixAxis,
    /// total over the reduced axis
    pub sum: Array1<f64>,
    /// total divided by the length of the reduced axis
    pub mean: Array1<f64>,
    /// percentage of reduced-axis entries above the detection limit
    pub detected: Array1<f64>,
    /// one entry per requested subset, in request order
    pub subsets: Vec<SubsetMetrics>,
}

impl QcMetrics {
    /// Number of entities
    pub fn len(&self) -> usize {
        self.sum.len()
    }

    /// True if there are no entities
    pub fn is_empty(&self) -> bool {
        self.sum.is_empty()
    }

    /// Look up the metrics of a subset by name
    pub fn subset(&self, name: &str) -> Option<&SubsetMetrics> {
        self.subsets.iter().find(|s| s.name == name)
    }

    /// Tabular view. Subset columns are named `subsets_<name>_<field>` when `flatten`
    /// is set and `<name>.<field>` otherwise; the values are the same.
    pub fn to_table(&self, flatten: bool) -> Result<MetadataTable> {
        let mut columns = vec![
            ("sum".to_string(), Column::Numeric(self.sum.clone())),
            ("mean".to_string(), Column::Numeric(self.mean.clone())),
            ("detected".to_string(), Column::Numeric(self.detected.clone())),
        ];
        for s in &self.subsets {
            let fields = [
                ("sum", &s.sum),
                ("mean", &s.mean),
                ("detected", &s.detected),
                ("ratio", &s.ratio),
                ("percent", &s.percent),
            ];
            for (field, values) in fields {
                let name = if flatten {
                    format!("subsets_{}_{}", s.name, field)
                } else {
                    format!("{}.{}", s.name, field)
                };
                columns.push((name, Column::Numeric(values.clone())));
            }
        }
        table_from_columns(self.len(), columns)
    }
}

/// Table of `nrows` rows from named columns. Fails on a repeated name or a column of
/// the wrong length.
pub(crate) fn table_from_columns(nrows: usize, columns: Vec<(String, Column)>) -> Result<MetadataTable> {
    let mut table = MetadataTable::new(nrows);
    for (name, column) in columns {
        if table.get(&name).is_some() {
            return Err(ScaterError::InvalidParameter(format!("column {name:?} appears twice")));
        }
        table
            .insert(name, column)
            .map_err(|e| ScaterError::InvalidParameter(e.to_string()))?;
    }
    Ok(table)
}

/// Subset with its selector resolved to sorted, distinct positions
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct ResolvedSubset {
    pub(crate) name: String,
    pub(crate) indices: Vec<usize>,
}

/// Check subset names and resolve selectors against a reduced axis of length `len`.
/// Names are checked for every subset before any selector is resolved.
pub(crate) fn resolve_subsets(subsets: &[Subset], len: usize, names: Option<&[String]>) -> Result<Vec<ResolvedSubset>> {
    let mut seen = HashSet::new();
    for (index, s) in subsets.iter().enumerate() {
        match s.name.as_deref() {
            None | Some("") => return Err(ScaterError::SubsetsMustBeNamed { index }),
            Some(name) => {
                if !seen.insert(name) {
                    return Err(ScaterError::DuplicateSubsetName(name.to_string()));
                }
            }
        }
    }

    let lookup: Option<HashMap<&str, usize>> =
        names.map(|n| n.iter().enumerate().map(|(i, s)| (s.as_str(), i)).collect());

    subsets
        .iter()
        .map(|s| {
            let name = s.name.clone().unwrap_or_default();
            let fail = |reason: String| ScaterError::UnresolvableSelector {
                subset: name.clone(),
                reason,
            };
            let mut indices = match &s.selector {
                Selector::Indices(idx) => {
                    if let Some(bad) = idx.iter().find(|&&i| i >= len) {
                        return Err(fail(format!("index {bad} out of range for length {len}")));
                    }
                    idx.clone()
                }
                Selector::Mask(mask) => {
                    if mask.len() != len {
                        return Err(fail(format!("mask has length {}, expected {len}", mask.len())));
                    }
                    mask.iter().enumerate().filter_map(|(i, &m)| m.then_some(i)).collect()
                }
                Selector::Names(wanted) => {
                    let lookup = lookup
                        .as_ref()
                        .ok_or_else(|| fail("names given but the axis has no names".to_string()))?;
                    wanted
                        .iter()
                        .map(|w| lookup.get(w.as_str()).copied().ok_or_else(|| fail(format!("unknown name {w:?}"))))
                        .collect::<Result<Vec<usize>>>()?
                }
            };
            indices.sort_unstable();
            indices.dedup();
            Ok(ResolvedSubset { name, indices })
        })
        .collect()
}

/// Running totals of one worker range
struct Partial {
    sum: Array1<f64>,
    detected: Array1<f64>,
    /// subsets x entities
    sub_sum: Array2<f64>,
    sub_detected: Array2<f64>,
}

/// QC metrics of the columns (cells) of `matrix` with `num_workers` workers. Subset
/// selectors address rows.
pub fn compute_metrics(
    matrix: &CountMatrix,
    subsets: &[Subset],
    detection_limit: f64,
    num_workers: usize,
) -> Result<QcMetrics> {
    let options = QcOptions {
        detection_limit,
        parallel: ParallelConfig::rayon(num_workers),
        ..Default::default()
    };
    compute_metrics_with_options(matrix, subsets, None, &options)
}

/// QC metrics of the entities on `options.entities`, reducing over the other axis.
/// `reduced_names` resolves `Selector::Names`.
///
/// The reduced axis is split into worker ranges. Each worker accumulates totals and
/// detection counts for every entity and subset in one pass over its range; partials
/// are added in worker order before dividing.
pub fn compute_metrics_with_options(
    matrix: &CountMatrix,
    subsets: &[Subset],
    reduced_names: Option<&[String]>,
    options: &QcOptions,
) -> Result<QcMetrics> {
    let tick = Instant::now();
    let limit = options.detection_limit;
    if !limit.is_finite() {
        return Err(ScaterError::InvalidParameter(format!(
            "detection limit must be finite, got {limit}"
        )));
    }
    // below zero, entries that are not stored count as detected too
    let zeros_detected = 0.0 > limit;

    let entities = options.entities;
    let reduced = entities.other();
    let n_entities = matrix.len_of(entities);
    let n_reduced = matrix.len_of(reduced);
    let resolved = resolve_subsets(subsets, n_reduced, reduced_names)?;

    // subsets that each reduced entry belongs to
    let mut membership: Vec<Vec<usize>> = vec![Vec::new(); n_reduced];
    for (s, sub) in resolved.iter().enumerate() {
        for &i in &sub.indices {
            membership[i].push(s);
        }
    }

    let partials = fork_join(&options.parallel, n_reduced, |range| {
        let mut p = Partial {
            sum: Array1::zeros(n_entities),
            detected: Array1::zeros(n_entities),
            sub_sum: Array2::zeros((resolved.len(), n_entities)),
            sub_detected: Array2::zeros((resolved.len(), n_entities)),
        };
        // with `zeros_detected`, every entry starts out detected and stored entries
        // at or below the limit are taken back out
        if zeros_detected {
            p.detected.fill(range.len() as f64);
            for red in range.clone() {
                for &s in &membership[red] {
                    p.sub_detected.row_mut(s).mapv_inplace(|d| d + 1.0);
                }
            }
        }
        matrix.for_each_in(reduced, range, |r, c, v| {
            let (entity, red) = match entities {
                MatrixAxis::Columns => (c, r),
                MatrixAxis::Rows => (r, c),
            };
            let hit = match (zeros_detected, v > limit) {
                (false, true) => 1.0,
                (true, false) => -1.0,
                _ => 0.0,
            };
            p.sum[entity] += v;
            p.detected[entity] += hit;
            for &s in &membership[red] {
                p.sub_sum[(s, entity)] += v;
                p.sub_detected[(s, entity)] += hit;
            }
        });
        Ok(p)
    })?;

    let mut sum = Array1::<f64>::zeros(n_entities);
    let mut detected = Array1::<f64>::zeros(n_entities);
    let mut sub_sum = Array2::<f64>::zeros((resolved.len(), n_entities));
    let mut sub_detected = Array2::<f64>::zeros((resolved.len(), n_entities));
    for (_, p) in partials {
        sum += &p.sum;
        detected += &p.detected;
        sub_sum += &p.sub_sum;
        sub_detected += &p.sub_detected;
    }

    let n = n_reduced as f64;
    let mean = sum.mapv(|s| s / n);
    let subsets = resolved
        .into_iter()
        .zip(sub_sum.axis_iter(Axis(0)).zip(sub_detected.axis_iter(Axis(0))))
        .map(|(sub, (ss, sd))| {
            let size = sub.indices.len() as f64;
            let sub_mean = ss.mapv(|s| s / size);
            SubsetMetrics {
                name: sub.name,
                size: sub.indices.len(),
                ratio: &sub_mean / &mean,
                percent: &ss / &sum * 100.0,
                detected: sd.mapv(|d| d / size * 100.0),
                sum: ss.to_owned(),
                mean: sub_mean,
            }
        })
        .collect();

    info!(
        "qc metrics for {} entities over {} entries took {:.3}s",
        n_entities,
        n_reduced,
        tick.elapsed().as_millis() as f64 / 1000.0
    );

    Ok(QcMetrics {
        entities,
        detected: detected.mapv(|d| d / n * 100.0),
        mean,
        sum,
        subsets,
    })
}
