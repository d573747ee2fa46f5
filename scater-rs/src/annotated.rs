//! Entry points that read from and write to an `AnnotatedMatrix`.

use crate::aggregate::{aggregate_with_options, AggregateOptions, AggregationResult};
use crate::error::{check_len, Result, ScaterError};
use crate::labels::uniquify;
use crate::normalization::{library_size_factors, normalize_counts, NormalizeOptions};
use crate::qc::{compute_metrics_with_options, QcMetrics, QcOptions, Selector, Subset};
use log::{info, warn};
use ndarray::Array1;
use scater_types::{
    AnnotatedMatrix, Column, CountMatrix, GroupKey, MatrixAxis, MetadataTable, COUNTS_ASSAY, LOGCOUNTS_ASSAY,
};

/// Name of the assay holding size-factor-scaled counts without a log transform
pub const NORMCOUNTS_ASSAY: &str = "normcounts";

/// A matrix handed to an entry point: either a bare matrix or an assay of a container
#[derive(Clone, Copy, Debug)]
pub enum MatrixInput<'a> {
    /// bare matrix, without names
    Matrix(&'a CountMatrix),
    /// named assay of a container
    Assay {
        /// container holding the assay
        container: &'a AnnotatedMatrix,
        /// assay name, e.g. `counts`
        assay: &'a str,
    },
}

impl<'a> From<&'a CountMatrix> for MatrixInput<'a> {
    fn from(m: &'a CountMatrix) -> Self {
        MatrixInput::Matrix(m)
    }
}

impl<'a> MatrixInput<'a> {
    /// The matrix to compute on
    pub fn resolve(&self) -> Result<&'a CountMatrix> {
        match *self {
            MatrixInput::Matrix(m) => Ok(m),
            MatrixInput::Assay { container, assay } => container
                .assay(assay)
                .ok_or_else(|| ScaterError::UnknownAssay(assay.to_string())),
        }
    }

    /// Entry names along `axis`: feature ids for rows, barcodes for columns. Bare
    /// matrices have none.
    pub fn names(&self, axis: MatrixAxis) -> Option<&'a [String]> {
        match *self {
            MatrixInput::Matrix(_) => None,
            MatrixInput::Assay { container, .. } => Some(match axis {
                MatrixAxis::Rows => container.feature_ids.as_slice(),
                MatrixAxis::Columns => container.barcodes.as_slice(),
            }),
        }
    }
}

/// QC metrics of `input`. `Selector::Names` resolves against the feature ids (per-cell
/// QC) or barcodes (per-feature QC) of a container input.
pub fn qc_metrics(input: MatrixInput, subsets: &[Subset], options: &QcOptions) -> Result<QcMetrics> {
    let matrix = input.resolve()?;
    compute_metrics_with_options(matrix, subsets, input.names(options.entities.other()), options)
}

/// Group the entries of `input` along `options.axis`
pub fn aggregate_input(input: MatrixInput, key: &GroupKey, options: &AggregateOptions) -> Result<AggregationResult> {
    aggregate_with_options(input.resolve()?, key, options)
}

/// Subset of the features of one feature type, e.g. `Antibody Capture`
pub fn feature_type_subset(container: &AnnotatedMatrix, name: &str, feature_type: &str) -> Result<Subset> {
    let indices = container
        .feature_types
        .get_indices(feature_type)
        .ok_or_else(|| ScaterError::UnresolvableSelector {
            subset: name.to_string(),
            reason: format!("no features of type {feature_type:?}"),
        })?;
    Ok(Subset::new(name, Selector::Indices(indices.to_vec())))
}

fn append_columns(target: &mut MetadataTable, table: MetadataTable) -> Result<()> {
    target
        .extend(table)
        .map_err(|e| ScaterError::InvalidParameter(e.to_string()))
}

/// Per-cell QC of `assay`, appended to the column metadata as flattened columns.
///
/// For every alternative experiment with a `counts` assay, `altexps_<name>_sum`,
/// `altexps_<name>_detected` and `altexps_<name>_percent` are added too, and `total`
/// holds the sum over the main and alternative experiments. Returns the metrics of the
/// main experiment.
pub fn add_per_cell_qc(
    container: &mut AnnotatedMatrix,
    assay: &str,
    subsets: &[Subset],
    options: &QcOptions,
) -> Result<QcMetrics> {
    let options = QcOptions {
        entities: MatrixAxis::Columns,
        ..options.clone()
    };
    let input = MatrixInput::Assay {
        container: &*container,
        assay,
    };
    let metrics = qc_metrics(input, subsets, &options)?;
    let mut table = metrics.to_table(true)?;

    let mut alt_sums = Vec::new();
    for (name, alt) in &container.alt_exps {
        let Some(counts) = alt.assay(COUNTS_ASSAY) else {
            warn!("alternative experiment {} has no {} assay, skipped", name, COUNTS_ASSAY);
            continue;
        };
        let alt_metrics = compute_metrics_with_options(counts, &[], None, &options)?;
        check_len("alternative experiment cells", metrics.len(), alt_metrics.len())?;
        alt_sums.push((name.clone(), alt_metrics));
    }

    let mut total = metrics.sum.clone();
    for (_, m) in &alt_sums {
        total += &m.sum;
    }
    let mut alt_table = MetadataTable::new(metrics.len());
    let mut push = |name: String, values: Array1<f64>| {
        alt_table
            .insert(name, Column::Numeric(values))
            .map_err(|e| ScaterError::InvalidParameter(e.to_string()))
    };
    for (name, m) in &alt_sums {
        push(format!("altexps_{name}_sum"), m.sum.clone())?;
        push(format!("altexps_{name}_detected"), m.detected.clone())?;
        push(format!("altexps_{name}_percent"), &m.sum / &total * 100.0)?;
    }
    push("total".to_string(), total)?;
    append_columns(&mut table, alt_table)?;

    append_columns(&mut container.col_data, table)?;
    Ok(metrics)
}

/// Per-feature QC of `assay`, appended to the row metadata as flattened columns.
/// Subsets select cells.
pub fn add_per_feature_qc(
    container: &mut AnnotatedMatrix,
    assay: &str,
    subsets: &[Subset],
    options: &QcOptions,
) -> Result<()> {
    let options = QcOptions {
        entities: MatrixAxis::Rows,
        ..options.clone()
    };
    let input = MatrixInput::Assay {
        container: &*container,
        assay,
    };
    let metrics = qc_metrics(input, subsets, &options)?;
    append_columns(&mut container.row_data, metrics.to_table(true)?)
}

/// Sum the cells of `assay` by group into a new container with one column per group.
///
/// Barcodes of the result are the composite group ids and column metadata holds one
/// column per key and `ncells`. Feature ids, names and types are carried over; row
/// metadata is not, as per-feature values such as QC metrics describe the original
/// cells. Alternative experiments with a `counts` assay are aggregated with the same key.
pub fn aggregate_across_cells(
    container: &AnnotatedMatrix,
    assay: &str,
    key: &GroupKey,
    options: &AggregateOptions,
) -> Result<AnnotatedMatrix> {
    let options = AggregateOptions {
        axis: MatrixAxis::Columns,
        ..options.clone()
    };
    let res = aggregate_input(MatrixInput::Assay { container, assay }, key, &options)?;
    let ids = res.labels.ids();
    let n_groups = ids.len();

    let mut col_data = MetadataTable::new(n_groups);
    let mut columns: Vec<(String, Column)> = res
        .labels
        .names
        .iter()
        .zip(&res.labels.columns)
        .map(|(name, labels)| {
            let text = labels.iter().map(|l| Some(l.to_string())).collect();
            (name.clone(), Column::Text(text))
        })
        .collect();
    columns.push((
        "ncells".to_string(),
        Column::Numeric(res.sizes.iter().map(|&s| s as f64).collect()),
    ));
    for (name, column) in columns {
        col_data
            .insert(name, column)
            .map_err(|e| ScaterError::InvalidParameter(e.to_string()))?;
    }

    let mut assays = std::collections::BTreeMap::new();
    assays.insert(assay.to_string(), res.values);

    let mut out = AnnotatedMatrix {
        name: container.name.clone(),
        barcodes: ids,
        feature_ids: container.feature_ids.clone(),
        feature_names: container.feature_names.clone(),
        feature_types: container.feature_types.clone(),
        assays,
        row_data: MetadataTable::new(container.num_features()),
        col_data,
        ..Default::default()
    };

    for (name, alt) in &container.alt_exps {
        if alt.assay(COUNTS_ASSAY).is_none() {
            warn!("alternative experiment {} has no {} assay, not aggregated", name, COUNTS_ASSAY);
            continue;
        }
        let alt_agg = aggregate_across_cells(alt, COUNTS_ASSAY, key, &options)?;
        out.set_alt_exp(name.clone(), alt_agg)
            .map_err(|e| ScaterError::InvalidParameter(e.to_string()))?;
    }

    info!(
        "aggregated {} cells of {} into {} groups",
        container.num_barcodes(),
        container.name,
        n_groups
    );
    Ok(out)
}

/// Normalize the `counts` assay by size factors and store it as `logcounts`, or
/// `normcounts` without a log transform. Stored size factors are used when present;
/// otherwise library size factors are computed and stored.
pub fn log_norm_counts(container: &mut AnnotatedMatrix, options: &NormalizeOptions) -> Result<()> {
    let counts = container
        .assay(COUNTS_ASSAY)
        .ok_or_else(|| ScaterError::UnknownAssay(COUNTS_ASSAY.to_string()))?;
    let size_factors = match &container.size_factors {
        Some(sf) => sf.clone(),
        None => library_size_factors(counts)?,
    };
    let normalized = normalize_counts(counts, size_factors.view(), options)?;
    let name = if options.log { LOGCOUNTS_ASSAY } else { NORMCOUNTS_ASSAY };
    container
        .set_assay(name, normalized)
        .map_err(|e| ScaterError::InvalidParameter(e.to_string()))?;
    container.size_factors = Some(size_factors);
    Ok(())
}

/// Unique feature names from the feature ids and display names of the container
pub fn uniquify_feature_names(container: &AnnotatedMatrix) -> Result<Vec<String>> {
    let names: Vec<Option<&str>> = container.feature_names.iter().map(|n| n.as_deref()).collect();
    let ids: Vec<&str> = container.feature_ids.iter().map(String::as_str).collect();
    uniquify(&ids, &names)
}
