//! Error types for model construction and inference-data handling.

use thiserror::Error;

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors raised while declaring a model or assembling sample groups.
///
/// Sampling itself never fails: divergences and poor mixing are reported
/// through the diagnostics, not as errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    /// Two priors share a name.
    #[error("duplicate parameter name: {0}")]
    DuplicateParam(String),
    /// An expression references a parameter that was never declared.
    #[error("unknown parameter: {0}")]
    UnknownParam(String),
    /// An expression references a data vector that was never registered.
    #[error("missing data key: {0}")]
    MissingData(String),
    /// Data vectors used together have different lengths.
    #[error("length mismatch for {key}: expected {expected}, got {actual}")]
    LengthMismatch {
        key: String,
        expected: usize,
        actual: usize,
    },
    /// A prior hyperparameter is out of its domain.
    #[error("invalid prior for {name}: {reason}")]
    InvalidPrior { name: String, reason: String },
    /// A likelihood mean that never touches data cannot produce a response vector.
    #[error("mean of {0} does not reference any data vector")]
    ScalarMean(String),
    /// The model declares no parameters.
    #[error("model has no parameters")]
    EmptyModel,
    /// A group of the same kind already exists in the container.
    #[error("group already present: {0}")]
    GroupExists(String),
    /// A stage needs a group that has not been produced yet.
    #[error("group not present: {0}")]
    MissingGroup(String),
    /// A group lacks a variable a stage needs.
    #[error("variable {name} not present in group {group}")]
    MissingVariable { group: String, name: String },
    /// A variable of the same name already exists in the group.
    #[error("duplicate variable {name} in group {group}")]
    DuplicateVariable { group: String, name: String },
    /// Sampler settings that cannot produce a valid run.
    #[error("invalid sampler configuration: {0}")]
    InvalidConfig(String),
}
