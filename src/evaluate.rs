//! Held-out test evaluation from a fixed model snapshot

use crate::config::EvalConfig;
use crate::error::{DataError, MedKgResult};
use crate::split::SplitBundle;
use medkg_gnn::{
    average_precision, has_both_classes, precision_at_k, precision_recall_curve, roc_auc, roc_curve, sigmoid,
    ConfusionMatrix, MessageGraph, PrPoint, RocPoint, SageLinkPredictor,
};
use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

/// Scalar test metrics, exported as `test_metrics.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestMetrics {
    pub auc_roc: f64,
    pub auc_pr: f64,
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    /// `[[tn, fp], [fn, tp]]`
    pub confusion_matrix: [[usize; 2]; 2],
    pub precision_at_k: BTreeMap<usize, f64>,
    pub threshold: f32,
    pub num_samples: usize,
    pub num_positive: usize,
    pub num_negative: usize,
    pub target_auc: f64,
    pub target_reached: bool,
}

/// Curve points, exported as `test_curves.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCurves {
    pub roc: Vec<RocPoint>,
    pub precision_recall: Vec<PrPoint>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationReport {
    pub metrics: TestMetrics,
    pub curves: TestCurves,
    /// Per-sample probabilities in test split order
    pub probabilities: Vec<f32>,
}

#[derive(Debug, Clone, Default)]
pub struct Evaluator {
    config: EvalConfig,
}

impl Evaluator {
    pub fn new(config: EvalConfig) -> Self {
        Self { config }
    }

    /// Score the test split with message passing over the train positives only
    pub fn evaluate(
        &self,
        model: &SageLinkPredictor,
        features: ArrayView2<'_, f32>,
        splits: &SplitBundle,
    ) -> MedKgResult<EvaluationReport> {
        let test = &splits.test;
        test.validate()?;
        if !has_both_classes(&test.labels) {
            return Err(DataError::SingleClass("test evaluation").into());
        }

        let structure = MessageGraph::from_edges(features.nrows(), splits.structure_edges())?;
        let logits = model.predict(features, &structure, &test.edges)?;
        let probs: Vec<f32> = logits.iter().map(|&l| sigmoid(l)).collect();
        self.score(probs, &test.labels)
    }

    /// Compute every metric from probabilities and labels
    pub fn score(&self, probs: Vec<f32>, labels: &[f32]) -> MedKgResult<EvaluationReport> {
        if probs.len() != labels.len() {
            return Err(DataError::ShapeMismatch {
                what: "test probabilities",
                expected: labels.len(),
                got: probs.len(),
            }
            .into());
        }
        if !has_both_classes(labels) {
            return Err(DataError::SingleClass("test evaluation").into());
        }

        let auc_roc = roc_auc(&probs, labels)?;
        let auc_pr = average_precision(&probs, labels)?;
        let cm = ConfusionMatrix::at_threshold(&probs, labels, self.config.threshold)?;
        let p_at_k = precision_at_k(&probs, labels, &self.config.k_values)?;
        let num_positive = labels.iter().filter(|&&y| y > 0.5).count();

        let metrics = TestMetrics {
            auc_roc,
            auc_pr,
            accuracy: cm.accuracy(),
            precision: cm.precision(),
            recall: cm.recall(),
            f1: cm.f1(),
            confusion_matrix: cm.as_matrix(),
            precision_at_k: p_at_k,
            threshold: self.config.threshold,
            num_samples: labels.len(),
            num_positive,
            num_negative: labels.len() - num_positive,
            target_auc: self.config.target_auc,
            target_reached: auc_roc >= self.config.target_auc,
        };
        let curves = TestCurves {
            roc: roc_curve(&probs, labels)?,
            precision_recall: precision_recall_curve(&probs, labels)?,
        };
        info!(
            "Test AUC-ROC {:.4}, AUC-PR {:.4}, F1 {:.4} over {} samples",
            metrics.auc_roc, metrics.auc_pr, metrics.f1, metrics.num_samples
        );

        Ok(EvaluationReport {
            metrics,
            curves,
            probabilities: probs,
        })
    }
}
