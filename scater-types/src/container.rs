use crate::label_class::LabelClass;
use crate::matrix::CountMatrix;
use crate::metadata::MetadataTable;
use anyhow::{bail, Error};
use ndarray::{Array1, Array2};
use std::collections::BTreeMap;

/// Name of the raw count assay
pub const COUNTS_ASSAY: &str = "counts";
/// Name of the log-normalized assay
pub const LOGCOUNTS_ASSAY: &str = "logcounts";

/// Reduced-dimension coordinates, cells on the rows
#[derive(Clone, Debug, PartialEq)]
pub struct ReducedDim {
    /// cells x components
    pub coordinates: Array2<f64>,
    /// percentage of variance explained per component, when the method reports it
    pub percent_variance: Option<Array1<f64>>,
}

/// Annotated feature-barcode matrix: named assays sharing feature and barcode annotations,
/// plus per-feature / per-cell metadata, reduced dimensions and alternative experiments.
#[derive(Clone, Debug, Default)]
pub struct AnnotatedMatrix {
    pub name: String,
    pub barcodes: Vec<String>,
    pub feature_ids: Vec<String>,
    pub feature_names: Vec<Option<String>>,
    pub feature_types: LabelClass,
    pub assays: BTreeMap<String, CountMatrix>,
    pub row_data: MetadataTable,
    pub col_data: MetadataTable,
    pub reduced_dims: BTreeMap<String, ReducedDim>,
    pub size_factors: Option<Array1<f64>>,
    pub alt_exps: BTreeMap<String, AnnotatedMatrix>,
}

impl AnnotatedMatrix {
    /// Wrap a count matrix. Feature names default to missing and every feature gets the
    /// same `feature_type`.
    pub fn new(
        name: impl Into<String>,
        counts: CountMatrix,
        feature_ids: Vec<String>,
        barcodes: Vec<String>,
    ) -> Result<AnnotatedMatrix, Error> {
        let [rows, cols] = counts.shape();
        if feature_ids.len() != rows {
            bail!("{} feature ids for a matrix with {} rows", feature_ids.len(), rows);
        }
        if barcodes.len() != cols {
            bail!("{} barcodes for a matrix with {} columns", barcodes.len(), cols);
        }
        let mut assays = BTreeMap::new();
        assays.insert(COUNTS_ASSAY.to_string(), counts);
        Ok(AnnotatedMatrix {
            name: name.into(),
            feature_names: vec![None; rows],
            feature_types: LabelClass::default(),
            row_data: MetadataTable::new(rows),
            col_data: MetadataTable::new(cols),
            feature_ids,
            barcodes,
            assays,
            ..Default::default()
        })
    }

    /// Number of features
    pub fn num_features(&self) -> usize {
        self.feature_ids.len()
    }

    /// Number of cells
    pub fn num_barcodes(&self) -> usize {
        self.barcodes.len()
    }

    /// Look up an assay by name
    pub fn assay(&self, name: &str) -> Option<&CountMatrix> {
        self.assays.get(name)
    }

    /// Add or replace an assay. Its shape must match the container.
    pub fn set_assay(&mut self, name: impl Into<String>, matrix: CountMatrix) -> Result<(), Error> {
        let name = name.into();
        if matrix.shape() != [self.num_features(), self.num_barcodes()] {
            bail!(
                "assay {} has shape {:?}, expected [{}, {}]",
                name,
                matrix.shape(),
                self.num_features(),
                self.num_barcodes()
            );
        }
        self.assays.insert(name, matrix);
        Ok(())
    }

    /// Add or replace a reduced-dimension result. Must have one row per cell.
    pub fn set_reduced_dim(&mut self, name: impl Into<String>, dim: ReducedDim) -> Result<(), Error> {
        let name = name.into();
        if dim.coordinates.nrows() != self.num_barcodes() {
            bail!(
                "reduced dimension {} has {} rows for {} cells",
                name,
                dim.coordinates.nrows(),
                self.num_barcodes()
            );
        }
        self.reduced_dims.insert(name, dim);
        Ok(())
    }

    /// Attach an alternative experiment over the same cells, e.g. antibody capture counts
    pub fn set_alt_exp(&mut self, name: impl Into<String>, exp: AnnotatedMatrix) -> Result<(), Error> {
        if exp.barcodes != self.barcodes {
            bail!("alternative experiment must share the barcodes of the main experiment");
        }
        self.alt_exps.insert(name.into(), exp);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use ndarray::array;

    fn small() -> AnnotatedMatrix {
        let counts = CountMatrix::Dense(array![[1.0, 2.0], [0.0, 3.0], [4.0, 0.0]]);
        AnnotatedMatrix::new(
            "small",
            counts,
            vec!["g1".into(), "g2".into(), "g3".into()],
            vec!["AAAC-1".into(), "AAAG-1".into()],
        )
        .unwrap()
    }

    #[test]
    fn test_new_checks_dimensions() {
        let counts = CountMatrix::Dense(Array2::zeros((2, 2)));
        assert!(AnnotatedMatrix::new("x", counts.clone(), vec!["a".into()], vec!["b".into(), "c".into()]).is_err());
        assert!(AnnotatedMatrix::new("x", counts, vec!["a".into(), "b".into()], vec!["c".into()]).is_err());
        let m = small();
        assert_eq!(m.feature_names, vec![None, None, None]);
        assert_eq!(m.col_data.nrows(), 2);
        assert!(m.assay(COUNTS_ASSAY).is_some());
    }

    #[test]
    fn test_set_assay_and_reduced_dim() {
        let mut m = small();
        assert!(m.set_assay("bad", CountMatrix::Dense(Array2::zeros((2, 2)))).is_err());
        m.set_assay(LOGCOUNTS_ASSAY, CountMatrix::Dense(Array2::zeros((3, 2)))).unwrap();
        assert!(m.assay(LOGCOUNTS_ASSAY).is_some());

        let bad = ReducedDim {
            coordinates: Array2::zeros((3, 2)),
            percent_variance: None,
        };
        assert!(m.set_reduced_dim("PCA", bad).is_err());
        let good = ReducedDim {
            coordinates: Array2::zeros((2, 2)),
            percent_variance: Some(array![60.0, 40.0]),
        };
        m.set_reduced_dim("PCA", good).unwrap();
        assert!(m.reduced_dims.contains_key("PCA"));

        let alt = small();
        m.set_alt_exp("copy", alt).unwrap();
        assert_eq!(m.alt_exps.len(), 1);
    }
}
