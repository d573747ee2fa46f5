/// Errors raised by the aggregation, QC and normalization routines. All of them are
/// raised before any output is produced.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScaterError {
    /// An input does not match the length of the axis it describes
    #[error("{what} has length {actual}, expected {expected}")]
    DimensionMismatch {
        /// the offending input
        what: &'static str,
        /// axis length
        expected: usize,
        /// input length
        actual: usize,
    },

    /// A QC subset has no name or an empty one
    #[error("subsets must be named: subset {index} has a missing or empty name")]
    SubsetsMustBeNamed {
        /// position of the subset in the request
        index: usize,
    },

    /// Two QC subsets share a name
    #[error("subset name {0:?} is used more than once")]
    DuplicateSubsetName(String),

    /// Fewer than one worker requested
    #[error("number of workers must be at least 1, got {0}")]
    InvalidWorkerCount(usize),

    /// A subset selector does not fit the reduced axis
    #[error("selector for {subset:?} cannot be resolved: {reason}")]
    UnresolvableSelector {
        /// subset name
        subset: String,
        /// what did not resolve
        reason: String,
    },

    /// Malformed grouping key
    #[error("invalid grouping key: {0}")]
    InvalidGroupKey(String),

    /// No assay with this name on the container
    #[error("assay {0:?} not found")]
    UnknownAssay(String),

    /// No reduced dimension with this name on the container
    #[error("reduced dimension {0:?} not found")]
    UnknownReducedDim(String),

    /// Option value outside its domain
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// An embedding engine failed or returned a malformed result
    #[error("embedding engine {engine} failed: {reason}")]
    Embedding {
        /// engine name
        engine: String,
        /// engine error or shape problem
        reason: String,
    },
}

/// Result type of the library routines
pub type Result<T> = std::result::Result<T, ScaterError>;

/// Fail with `DimensionMismatch` unless `actual == expected`
pub(crate) fn check_len(what: &'static str, expected: usize, actual: usize) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(ScaterError::DimensionMismatch { what, expected, actual })
    }
}
