//! Pipeline configuration
//!
//! Every stage reads its section of [`PipelineConfig`]. Defaults match the
//! values the pipeline has always been run with; a YAML file can override any
//! subset of fields and the CLI can override individual values on top.

use crate::artifacts::ArtifactPaths;
use crate::error::{ConfigError, ConfigResult, MedKgResult};
use medkg_gnn::{AdamConfig, ModelConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Positive-edge partitioning and negative sampling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitConfig {
    pub train_ratio: f64,
    pub val_ratio: f64,
    pub test_ratio: f64,
    /// Negatives drawn per positive in each split
    pub neg_ratio: f64,
    pub seed: u64,
    /// Rejection-sampling attempts allowed per requested negative
    pub retry_factor: usize,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            train_ratio: 0.7,
            val_ratio: 0.15,
            test_ratio: 0.15,
            neg_ratio: 1.0,
            seed: 42,
            retry_factor: 10,
        }
    }
}

impl SplitConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        for (name, value) in [
            ("train_ratio", self.train_ratio),
            ("val_ratio", self.val_ratio),
            ("test_ratio", self.test_ratio),
        ] {
            if value < 0.0 || !value.is_finite() {
                return Err(ConfigError::NegativeRatio { name, value });
            }
        }
        let sum = self.train_ratio + self.val_ratio + self.test_ratio;
        if (sum - 1.0).abs() > 1e-6 {
            return Err(ConfigError::RatioSum(sum));
        }
        if !(self.neg_ratio > 0.0) {
            return Err(ConfigError::NonPositive { name: "neg_ratio" });
        }
        if self.retry_factor == 0 {
            return Err(ConfigError::NonPositive { name: "retry_factor" });
        }
        Ok(())
    }
}

/// Epoch loop, optimiser and early stopping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    pub epochs: usize,
    /// Epochs without a strictly better validation AUC before stopping
    pub patience: usize,
    pub optimizer: AdamConfig,
    /// Validation AUC the run is judged against in the summary
    pub target_auc: f64,
    /// Seed for the dropout RNG
    pub seed: u64,
    pub log_every: usize,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            epochs: 150,
            patience: 20,
            optimizer: AdamConfig::default(),
            target_auc: 0.75,
            seed: 42,
            log_every: 10,
        }
    }
}

impl TrainConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.epochs == 0 {
            return Err(ConfigError::NonPositive { name: "epochs" });
        }
        if self.patience == 0 {
            return Err(ConfigError::NonPositive { name: "patience" });
        }
        if !(self.optimizer.lr > 0.0) {
            return Err(ConfigError::NonPositive { name: "learning_rate" });
        }
        if self.optimizer.weight_decay < 0.0 {
            return Err(ConfigError::NonPositive { name: "weight_decay" });
        }
        Ok(())
    }
}

/// Held-out evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalConfig {
    pub k_values: Vec<usize>,
    pub threshold: f32,
    pub target_auc: f64,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            k_values: vec![10, 20, 50, 100],
            threshold: 0.5,
            target_auc: 0.75,
        }
    }
}

impl EvalConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.k_values.iter().any(|&k| k == 0) {
            return Err(ConfigError::NonPositive { name: "k_values" });
        }
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(ConfigError::NonPositive { name: "threshold" });
        }
        Ok(())
    }
}

/// Novel candidate generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictConfig {
    pub top_k: usize,
    /// Pairs scored per decoder call. Does not affect results.
    pub batch_size: usize,
}

impl Default for PredictConfig {
    fn default() -> Self {
        Self {
            top_k: 100,
            batch_size: 2000,
        }
    }
}

impl PredictConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.top_k == 0 {
            return Err(ConfigError::NonPositive { name: "top_k" });
        }
        if self.batch_size == 0 {
            return Err(ConfigError::NonPositive { name: "batch_size" });
        }
        Ok(())
    }
}

/// Complete configuration for all stages
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub split: SplitConfig,
    pub model: ModelConfig,
    pub train: TrainConfig,
    pub eval: EvalConfig,
    pub predict: PredictConfig,
    pub paths: ArtifactPaths,
}

impl PipelineConfig {
    /// Load from YAML. Missing sections and fields fall back to defaults.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> MedKgResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: PipelineConfig = serde_yaml::from_str(&text)?;
        tracing::debug!("Loaded pipeline configuration from {:?}", path.as_ref());
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        self.split.validate()?;
        self.model
            .validate()
            .map_err(|e| ConfigError::Model(e.to_string()))?;
        self.train.validate()?;
        self.eval.validate()?;
        self.predict.validate()?;
        Ok(())
    }
}
