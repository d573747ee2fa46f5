//! # scater-rs: single-cell quality control, normalization and aggregation in Rust

#![deny(missing_docs)]
#![deny(warnings)]

/// Group-wise sums, means and detection rates
pub mod aggregate;

/// Entry points operating on annotated matrices
pub mod annotated;

/// Hand-off to dimensionality reduction engines
pub mod embedding;

mod error;

/// Grouping key normalization
pub mod group;

/// Unique feature names
pub mod labels;

/// MTX loading routine
pub mod mtx;

/// Count matrix normalization methods
pub mod normalization;

/// Median / MAD outlier detection
pub mod outliers;

/// Per-cell and per-feature QC metrics
pub mod qc;

/// Medians and median absolute deviations
pub mod stats;

/// Worker ranges and fork-join execution
pub mod workers;

#[cfg(test)]
pub(crate) mod test_util;

pub use aggregate::{aggregate, aggregate_with_options, AggregateOptions, AggregationResult, Statistic};
pub use error::{Result, ScaterError};
pub use labels::uniquify;
pub use qc::{compute_metrics, QcMetrics, QcOptions, Selector, Subset};
pub use workers::{Backend, ParallelConfig};
