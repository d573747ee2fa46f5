//! Hand-off to external dimensionality reduction engines.
//!
//! The algorithms themselves (PCA, t-SNE, UMAP, ...) live behind `EmbeddingEngine`. This
//! module picks the input (highly variable features of an assay, or an existing reduced
//! dimension), centers and scales it, and stores what the engine returns on the container.

use crate::error::{Result, ScaterError};
use itertools::Itertools;
use log::info;
use ndarray::{s, Array1, Array2, ArrayView2, Axis};
use scater_types::{AnnotatedMatrix, CountMatrix, ReducedDim, LOGCOUNTS_ASSAY};
use std::time::Instant;

/// Low-dimensional coordinates returned by an engine
#[derive(Clone, Debug, PartialEq)]
pub struct Embedding {
    /// cells x components
    pub coordinates: Array2<f64>,
    /// percentage of variance explained per component, when the method has one
    pub percent_variance: Option<Array1<f64>>,
}

/// A dimensionality reduction method
pub trait EmbeddingEngine {
    /// Name under which results are stored by default, e.g. `PCA` or `UMAP`
    fn name(&self) -> &str;

    /// Embed `input` (cells x features) into `n_components` dimensions
    fn embed(&self, input: ArrayView2<f64>, n_components: usize) -> anyhow::Result<Embedding>;
}

/// Options for `run_embedding`
#[derive(Clone, Debug, PartialEq)]
pub struct EmbeddingOptions {
    /// key for the result in the reduced-dimension map; defaults to the engine name
    pub name: Option<String>,
    /// dimensions of the output
    pub n_components: usize,
    /// assay used when `use_dimred` is not set
    pub assay: String,
    /// number of most variable features to use
    pub ntop: usize,
    /// explicit feature rows, overriding `ntop`
    pub subset_features: Option<Vec<usize>>,
    /// subtract the mean of each feature
    pub center: bool,
    /// divide each feature by its standard deviation
    pub scale: bool,
    /// embed an existing reduced dimension instead of an assay
    pub use_dimred: Option<String>,
    /// number of leading components of `use_dimred` to keep
    pub n_dimred: Option<usize>,
}

impl Default for EmbeddingOptions {
    fn default() -> Self {
        EmbeddingOptions {
            name: None,
            n_components: 2,
            assay: LOGCOUNTS_ASSAY.to_string(),
            ntop: 500,
            subset_features: None,
            center: true,
            scale: false,
            use_dimred: None,
            n_dimred: None,
        }
    }
}

/// Rows of the `ntop` features with the largest variance across cells, most variable
/// first. Ties go to the lower row index.
pub fn select_top_variance(matrix: &CountMatrix, ntop: usize) -> Vec<usize> {
    let (_, vars) = matrix.row_mean_var();
    (0..vars.len())
        .sorted_by(|&a, &b| vars[b].total_cmp(&vars[a]).then(a.cmp(&b)))
        .take(ntop)
        .collect()
}

/// Dense cells x features input for an engine, taking the given feature rows in order.
/// Each feature is optionally centered to mean zero and scaled to unit (sample)
/// standard deviation; features with zero variance are not scaled.
pub fn prepare_input(matrix: &CountMatrix, features: &[usize], center: bool, scale: bool) -> Result<Array2<f64>> {
    let mut column_of: Vec<Option<usize>> = vec![None; matrix.rows()];
    for (j, &f) in features.iter().enumerate() {
        let slot = column_of.get_mut(f).ok_or_else(|| {
            ScaterError::InvalidParameter(format!("feature {f} out of range for {} rows", matrix.rows()))
        })?;
        *slot = Some(j);
    }
    if features.iter().duplicates().next().is_some() {
        return Err(ScaterError::InvalidParameter("feature rows must be distinct".to_string()));
    }

    let mut input = Array2::<f64>::zeros((matrix.cols(), features.len()));
    matrix.for_each(|r, c, v| {
        if let Some(j) = column_of[r] {
            input[(c, j)] = v;
        }
    });

    if center {
        if let Some(means) = input.mean_axis(Axis(0)) {
            input -= &means;
        }
    }
    if scale && input.nrows() > 1 {
        let sds = input.std_axis(Axis(0), 1.0);
        for (mut col, sd) in input.axis_iter_mut(Axis(1)).zip(sds.iter()) {
            if *sd > 0.0 {
                col /= *sd;
            }
        }
    }
    Ok(input)
}

/// Run `engine` on the container and store the result under `options.name`, or the
/// engine's name.
pub fn run_embedding(
    container: &mut AnnotatedMatrix,
    engine: &dyn EmbeddingEngine,
    options: &EmbeddingOptions,
) -> Result<()> {
    let tick = Instant::now();
    let input = match &options.use_dimred {
        Some(name) => {
            let dim = container
                .reduced_dims
                .get(name)
                .ok_or_else(|| ScaterError::UnknownReducedDim(name.clone()))?;
            let keep = options.n_dimred.unwrap_or(dim.coordinates.ncols()).min(dim.coordinates.ncols());
            dim.coordinates.slice(s![.., ..keep]).to_owned()
        }
        None => {
            let matrix = container
                .assay(&options.assay)
                .ok_or_else(|| ScaterError::UnknownAssay(options.assay.clone()))?;
            let features = match &options.subset_features {
                Some(f) => f.clone(),
                None => select_top_variance(matrix, options.ntop),
            };
            prepare_input(matrix, &features, options.center, options.scale)?
        }
    };

    let fail = |reason: String| ScaterError::Embedding {
        engine: engine.name().to_string(),
        reason,
    };
    let embedding = engine
        .embed(input.view(), options.n_components)
        .map_err(|e| fail(format!("{e:#}")))?;
    if embedding.coordinates.nrows() != container.num_barcodes() {
        return Err(fail(format!(
            "returned {} rows for {} cells",
            embedding.coordinates.nrows(),
            container.num_barcodes()
        )));
    }

    let name = options.name.clone().unwrap_or_else(|| engine.name().to_string());
    info!(
        "{} on {:?} input took {:.3}s",
        name,
        input.dim(),
        tick.elapsed().as_millis() as f64 / 1000.0
    );
    container
        .set_reduced_dim(
            name,
            ReducedDim {
                coordinates: embedding.coordinates,
                percent_variance: embedding.percent_variance,
            },
        )
        .map_err(|e| fail(e.to_string()))
}
