//! Full-batch training loop with checkpointing and early stopping
//!
//! Every forward pass, train or validation, uses the train split's positive
//! edges as the message-passing structure.

use crate::artifacts::{load_bincode, save_bincode};
use crate::config::TrainConfig;
use crate::error::{DataError, MedKgResult};
use crate::split::{Split, SplitBundle};
use medkg_gnn::{
    average_precision, bce_with_logits, has_both_classes, roc_auc, sigmoid, Adam, GnnError, MessageGraph,
    ModelConfig, Parameterized, SageLinkPredictor,
};
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Metrics recorded after each epoch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    pub epoch: usize,
    pub train_loss: f64,
    pub train_auc: f64,
    pub val_loss: f64,
    pub val_auc: f64,
    pub val_ap: f64,
    /// A reported AUC/AP was undefined (single-class labels) and recorded as 0.0
    pub degenerate: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingHistory {
    pub epochs: Vec<EpochMetrics>,
}

impl TrainingHistory {
    pub fn last(&self) -> Option<&EpochMetrics> {
        self.epochs.last()
    }
}

/// Best model so far with its provenance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub epoch: usize,
    pub model_config: ModelConfig,
    pub model: SageLinkPredictor,
    pub optimizer: Adam,
    pub val_auc: f64,
    pub val_ap: f64,
}

impl Checkpoint {
    pub fn save(&self, path: impl AsRef<Path>) -> MedKgResult<()> {
        save_bincode(path.as_ref(), self)?;
        debug!("Checkpoint for epoch {} written to {:?}", self.epoch, path.as_ref());
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> MedKgResult<Self> {
        let checkpoint: Checkpoint = load_bincode(path.as_ref())?;
        info!(
            "Loaded checkpoint from epoch {} (val AUC {:.4})",
            checkpoint.epoch, checkpoint.val_auc
        );
        Ok(checkpoint)
    }
}

/// End-of-run report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSummary {
    pub num_parameters: usize,
    pub epochs_run: usize,
    pub stopped_early: bool,
    pub best_epoch: usize,
    pub best_val_auc: f64,
    /// Val AP of the checkpointed epoch, not the history-wide maximum
    pub best_val_ap: f64,
    pub final_train_auc: f64,
    pub final_val_auc: f64,
    pub target_auc: f64,
    pub target_reached: bool,
}

/// Everything `Trainer::fit` produces
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub history: TrainingHistory,
    pub best: Checkpoint,
    pub summary: TrainingSummary,
}

/// Loss and ranking metrics for one no-gradient pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplitScore {
    pub loss: f64,
    pub auc: f64,
    pub ap: f64,
    pub degenerate: bool,
}

/// AUC and AP, or 0.0 with the degenerate flag when a class is missing
fn ranking_metrics(probs: &[f32], labels: &[f32]) -> MedKgResult<(f64, f64, bool)> {
    if !has_both_classes(labels) {
        return Ok((0.0, 0.0, true));
    }
    Ok((roc_auc(probs, labels)?, average_precision(probs, labels)?, false))
}

fn ensure_finite(loss: f32, logits: &Array1<f32>) -> MedKgResult<()> {
    if !loss.is_finite() {
        return Err(GnnError::NonFinite("loss").into());
    }
    if logits.iter().any(|l| !l.is_finite()) {
        return Err(GnnError::NonFinite("logits").into());
    }
    Ok(())
}

/// Owns the model and optimiser for one run
pub struct Trainer {
    config: TrainConfig,
    model_config: ModelConfig,
    model: SageLinkPredictor,
    optimizer: Adam,
    features: Array2<f32>,
    structure: MessageGraph,
    rng: StdRng,
    checkpoint_path: Option<PathBuf>,
}

impl Trainer {
    /// The structure graph is built here from `splits.structure_edges()` and reused for every pass
    pub fn new(
        config: TrainConfig,
        model_config: ModelConfig,
        features: Array2<f32>,
        splits: &SplitBundle,
    ) -> MedKgResult<Self> {
        config.validate()?;
        let model = SageLinkPredictor::from_config(&model_config)?;
        let structure = MessageGraph::from_edges(features.nrows(), splits.structure_edges())?;
        info!(
            "Model created with {} parameters; message passing over {} train edges",
            model.num_parameters(),
            structure.edge_count
        );
        Ok(Self {
            optimizer: Adam::new(config.optimizer.clone()),
            rng: StdRng::seed_from_u64(config.seed),
            config,
            model_config,
            model,
            features,
            structure,
            checkpoint_path: None,
        })
    }

    /// Persist every improved checkpoint to `path`
    pub fn with_checkpoint_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.checkpoint_path = Some(path.into());
        self
    }

    pub fn model(&self) -> &SageLinkPredictor {
        &self.model
    }

    pub fn structure(&self) -> &MessageGraph {
        &self.structure
    }

    /// One full-batch forward/backward pass and optimiser step.
    /// Returns `(loss, auc, degenerate)` computed on the training forward output.
    pub fn train_epoch(&mut self, train: &Split) -> MedKgResult<(f64, f64, bool)> {
        if train.is_empty() {
            return Err(DataError::EmptyGraph("train split has no edges").into());
        }
        let labels = Array1::from_vec(train.labels.clone());
        let step = self.model.train_step(
            self.features.view(),
            &self.structure,
            &train.edges,
            labels.view(),
            &mut self.rng,
        )?;
        ensure_finite(step.loss, &step.logits)?;
        self.optimizer.step(&mut self.model, &step.grads)?;

        let probs: Vec<f32> = step.logits.iter().map(|&l| sigmoid(l)).collect();
        let (auc, _, degenerate) = ranking_metrics(&probs, &train.labels)?;
        Ok((step.loss as f64, auc, degenerate))
    }

    /// No-gradient pass over `split` with dropout off
    pub fn evaluate(&self, split: &Split) -> MedKgResult<SplitScore> {
        let logits = self
            .model
            .predict(self.features.view(), &self.structure, &split.edges)?;
        let labels = Array1::from_vec(split.labels.clone());
        let loss = bce_with_logits(logits.view(), labels.view())?;
        ensure_finite(loss, &logits)?;
        let loss = loss as f64;
        let probs: Vec<f32> = logits.iter().map(|&l| sigmoid(l)).collect();
        let (auc, ap, degenerate) = ranking_metrics(&probs, &split.labels)?;
        Ok(SplitScore {
            loss,
            auc,
            ap,
            degenerate,
        })
    }

    pub fn fit(&mut self, splits: &SplitBundle) -> MedKgResult<TrainingOutcome> {
        self.fit_with(splits, |_| {})
    }

    /// Run the epoch loop, calling `on_epoch` after each epoch's metrics are known
    pub fn fit_with<F>(&mut self, splits: &SplitBundle, mut on_epoch: F) -> MedKgResult<TrainingOutcome>
    where
        F: FnMut(&EpochMetrics),
    {
        info!(
            "Training for up to {} epochs (patience {}), {} train / {} val samples",
            self.config.epochs,
            self.config.patience,
            splits.train.len(),
            splits.val.len()
        );

        let mut history = TrainingHistory::default();
        let mut best: Option<Checkpoint> = None;
        let mut best_auc = f64::NEG_INFINITY;
        let mut patience_counter = 0;
        let mut stopped_early = false;

        for epoch in 1..=self.config.epochs {
            let (train_loss, train_auc, train_degenerate) = self.train_epoch(&splits.train)?;
            let val = self.evaluate(&splits.val)?;

            let metrics = EpochMetrics {
                epoch,
                train_loss,
                train_auc,
                val_loss: val.loss,
                val_auc: val.auc,
                val_ap: val.ap,
                degenerate: train_degenerate || val.degenerate,
            };
            if metrics.degenerate {
                warn!("Epoch {}: single-class labels, AUC reported as 0.0", epoch);
            }
            debug!(
                "Epoch {}: train_loss={:.4} train_auc={:.4} val_loss={:.4} val_auc={:.4} val_ap={:.4}",
                epoch, train_loss, train_auc, val.loss, val.auc, val.ap
            );
            on_epoch(&metrics);
            history.epochs.push(metrics);

            if val.auc > best_auc {
                best_auc = val.auc;
                patience_counter = 0;
                let checkpoint = Checkpoint {
                    epoch,
                    model_config: self.model_config.clone(),
                    model: self.model.clone(),
                    optimizer: self.optimizer.clone(),
                    val_auc: val.auc,
                    val_ap: val.ap,
                };
                if let Some(path) = &self.checkpoint_path {
                    checkpoint.save(path)?;
                }
                best = Some(checkpoint);
            } else {
                patience_counter += 1;
            }

            if patience_counter >= self.config.patience {
                info!("Early stopping at epoch {} (best val AUC {:.4})", epoch, best_auc);
                stopped_early = true;
                break;
            }
        }

        // epochs >= 1 is validated, so the first epoch always sets `best`
        let best = best.ok_or(DataError::EmptyGraph("no epochs were run"))?;
        let last = history.last().cloned();
        let summary = TrainingSummary {
            num_parameters: self.model.num_parameters(),
            epochs_run: history.epochs.len(),
            stopped_early,
            best_epoch: best.epoch,
            best_val_auc: best.val_auc,
            best_val_ap: best.val_ap,
            final_train_auc: last.as_ref().map_or(0.0, |m| m.train_auc),
            final_val_auc: last.as_ref().map_or(0.0, |m| m.val_auc),
            target_auc: self.config.target_auc,
            target_reached: best.val_auc >= self.config.target_auc,
        };
        info!(
            "Training complete: best val AUC {:.4} at epoch {}",
            summary.best_val_auc, summary.best_epoch
        );

        Ok(TrainingOutcome {
            history,
            best,
            summary,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SplitConfig;
    use crate::error::MedKgError;
    use crate::split::SplitGenerator;
    use tempfile::TempDir;

    fn toy_splits() -> (Array2<f32>, SplitBundle) {
        // 8 drugs (0..8), 8 diseases (8..16)
        let edges: Vec<(usize, usize)> = (0..8)
            .flat_map(|d| [(d, 8 + d), (d, 8 + (d + 3) % 8)])
            .collect();
        let splits = SplitGenerator::new(SplitConfig {
            train_ratio: 0.6,
            val_ratio: 0.2,
            test_ratio: 0.2,
            ..SplitConfig::default()
        })
        .generate_from_edges(&edges, 0..8, 8..16)
        .unwrap();
        let features = Array2::from_shape_fn((16, 2), |(i, j)| ((i * 7 + j * 3) % 5) as f32 - 2.0);
        (features, splits)
    }

    fn small_model() -> ModelConfig {
        ModelConfig {
            hidden_dim: 8,
            embedding_dim: 4,
            decoder_hidden: vec![8, 4],
            ..ModelConfig::default()
        }
    }

    #[test]
    fn test_history_length_bounded_by_epochs() {
        let (features, splits) = toy_splits();
        let config = TrainConfig {
            epochs: 5,
            ..TrainConfig::default()
        };
        let mut trainer = Trainer::new(config, small_model(), features, &splits).unwrap();
        let outcome = trainer.fit(&splits).unwrap();
        assert_eq!(outcome.history.epochs.len(), 5);
        assert_eq!(outcome.summary.epochs_run, 5);
        assert!(!outcome.summary.stopped_early);
        assert!(outcome.best.epoch >= 1 && outcome.best.epoch <= 5);
    }

    #[test]
    fn test_early_stopping_with_patience() {
        let (features, splits) = toy_splits();
        let patience = 3;
        let config = TrainConfig {
            epochs: 200,
            patience,
            ..TrainConfig::default()
        };
        let mut trainer = Trainer::new(config, small_model(), features, &splits).unwrap();
        let outcome = trainer.fit(&splits).unwrap();
        let epochs = &outcome.history.epochs;
        let best = &outcome.best;

        // val AUC takes finitely many values, so strict improvements run out well before 200
        assert!(outcome.summary.stopped_early);
        assert_eq!(epochs.len(), best.epoch + patience);
        assert_eq!(outcome.summary.epochs_run, best.epoch + patience);
        assert!(epochs[best.epoch..].iter().all(|m| m.val_auc <= best.val_auc));

        // the checkpoint is the first epoch reaching the maximum val AUC
        let max_auc = epochs.iter().map(|m| m.val_auc).fold(f64::NEG_INFINITY, f64::max);
        let first_max = epochs.iter().position(|m| m.val_auc == max_auc).unwrap() + 1;
        assert_eq!(best.epoch, first_max);
        assert_eq!(best.val_auc, epochs[best.epoch - 1].val_auc);
    }

    #[test]
    fn test_summary_reports_checkpoint_val_ap() {
        let (features, splits) = toy_splits();
        let config = TrainConfig {
            epochs: 20,
            ..TrainConfig::default()
        };
        let mut trainer = Trainer::new(config, small_model(), features, &splits).unwrap();
        let outcome = trainer.fit(&splits).unwrap();
        assert_eq!(outcome.summary.best_val_ap, outcome.best.val_ap);
        assert_eq!(
            outcome.summary.best_val_ap,
            outcome.history.epochs[outcome.best.epoch - 1].val_ap
        );
    }

    #[test]
    fn test_divergent_training_is_an_error() {
        let (features, splits) = toy_splits();
        let mut config = TrainConfig {
            epochs: 50,
            ..TrainConfig::default()
        };
        config.optimizer.lr = 1e30;
        let mut trainer = Trainer::new(config, small_model(), features, &splits).unwrap();
        let err = trainer.fit(&splits).unwrap_err();
        assert!(matches!(err, MedKgError::Model(GnnError::NonFinite(_))));
    }

    #[test]
    fn test_checkpoint_written_on_improvement() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("checkpoints").join("best_model.bin");
        let (features, splits) = toy_splits();
        let config = TrainConfig {
            epochs: 3,
            ..TrainConfig::default()
        };
        let mut trainer = Trainer::new(config, small_model(), features, &splits)
            .unwrap()
            .with_checkpoint_path(&path);
        let outcome = trainer.fit(&splits).unwrap();
        let loaded = Checkpoint::load(&path).unwrap();
        assert_eq!(loaded, outcome.best);
    }

    #[test]
    fn test_single_class_val_is_degenerate_not_error() {
        let (features, mut splits) = toy_splits();
        splits.val.labels.iter_mut().for_each(|y| *y = 1.0);
        splits.val.num_pos = splits.val.labels.len();
        splits.val.num_neg = 0;
        let config = TrainConfig {
            epochs: 2,
            ..TrainConfig::default()
        };
        let mut trainer = Trainer::new(config, small_model(), features, &splits).unwrap();
        let outcome = trainer.fit(&splits).unwrap();
        assert!(outcome.history.epochs.iter().all(|m| m.degenerate && m.val_auc == 0.0));
    }

    #[test]
    fn test_empty_train_split_rejected() {
        let (features, mut splits) = toy_splits();
        splits.train.edges.clear();
        splits.train.labels.clear();
        let mut trainer = Trainer::new(TrainConfig::default(), small_model(), features, &splits).unwrap();
        assert!(trainer.fit(&splits).is_err());
    }
}
