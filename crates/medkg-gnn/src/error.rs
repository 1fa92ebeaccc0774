//! Error types for the GNN core

use thiserror::Error;

/// Errors raised by model construction, forward passes and metrics
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GnnError {
    /// Feature matrix width does not match the encoder input dimension
    #[error("Feature dimension mismatch: expected {expected}, got {got}")]
    FeatureDimMismatch { expected: usize, got: usize },

    /// An edge references a node outside the feature matrix
    #[error("Edge ({src}, {dst}) references a node outside 0..{num_nodes}")]
    NodeOutOfRange {
        src: usize,
        dst: usize,
        num_nodes: usize,
    },

    /// Scores and labels differ in length
    #[error("Length mismatch: {scores} scores vs {labels} labels")]
    LengthMismatch { scores: usize, labels: usize },

    /// A metric needs both classes present
    #[error("Labels contain a single class; {0} is undefined")]
    SingleClass(&'static str),

    /// Invalid hyperparameter
    #[error("Invalid model configuration: {0}")]
    InvalidConfig(String),

    /// Optimizer state does not line up with the model parameters
    #[error("Optimizer state mismatch: {0}")]
    OptimizerState(String),

    /// Loss or logits became NaN or infinite
    #[error("Non-finite {0}; training has diverged")]
    NonFinite(&'static str),
}

pub type GnnResult<T> = Result<T, GnnError>;
