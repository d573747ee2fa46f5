//! # scater-types: data model shared by the scater-rs crates

/// Dense or compressed sparse count matrices
pub mod matrix;

/// Grouping keys: label sequences, factors with levels and key tables
pub mod group_key;

/// Feature-type partitions of the feature axis
pub mod label_class;

/// Named row / column metadata tables
pub mod metadata;

/// Annotated-matrix container holding assays, metadata and reduced dimensions
pub mod container;

pub use container::{AnnotatedMatrix, ReducedDim, COUNTS_ASSAY, LOGCOUNTS_ASSAY};
pub use group_key::{GroupKey, KeyColumn, KeyValues, Label};
pub use label_class::LabelClass;
pub use matrix::{CountMatrix, MatrixAxis};
pub use metadata::{Column, MetadataTable};
