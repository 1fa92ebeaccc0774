//! Error types for the drug repurposing pipeline

use medkg_gnn::GnnError;
use thiserror::Error;

/// Malformed or referentially inconsistent input. Fatal to the current stage.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DataError {
    #[error("Relationship references unknown {role} entity '{id}'")]
    UnknownEntity { role: &'static str, id: String },

    #[error("Shape mismatch in {what}: expected {expected}, got {got}")]
    ShapeMismatch {
        what: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("{0} needs both positive and negative labels")]
    SingleClass(&'static str),

    #[error("Graph is empty: {0}")]
    EmptyGraph(&'static str),

    #[error("Unrecognised entity type '{0}' (expected Drug/CHEMICAL or Disease/DISEASE)")]
    InvalidEntityType(String),

    #[error("Confidence {confidence} for {drug_id} -> {disease_id} is outside [0, 1]")]
    InvalidConfidence {
        drug_id: String,
        disease_id: String,
        confidence: f64,
    },
}

pub type DataResult<T> = Result<T, DataError>;

/// Rejected before any computation starts
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Split ratios must sum to 1.0, got {0}")]
    RatioSum(f64),

    #[error("Split ratio '{name}' must be non-negative, got {value}")]
    NegativeRatio { name: &'static str, value: f64 },

    #[error("'{name}' must be positive")]
    NonPositive { name: &'static str },

    #[error("Invalid model configuration: {0}")]
    Model(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Top-level pipeline error
#[derive(Error, Debug)]
pub enum MedKgError {
    #[error("Data error: {0}")]
    Data(#[from] DataError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Model error: {0}")]
    Model(#[from] GnnError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),
}

pub type MedKgResult<T> = Result<T, MedKgError>;
