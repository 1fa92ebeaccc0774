//! Classification and ranking metrics for link prediction
//!
//! Scores are probabilities (or any monotone score), labels are `1.0` for a
//! positive edge and `0.0` for a negative one. Tied scores are handled the way
//! scikit-learn does: ROC-AUC uses average ranks, curves emit one point per
//! distinct threshold.

use crate::error::{GnnError, GnnResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

fn check_lengths(scores: &[f32], labels: &[f32]) -> GnnResult<()> {
    if scores.len() != labels.len() {
        return Err(GnnError::LengthMismatch {
            scores: scores.len(),
            labels: labels.len(),
        });
    }
    Ok(())
}

fn class_counts(labels: &[f32]) -> (usize, usize) {
    let pos = labels.iter().filter(|&&y| y > 0.5).count();
    (pos, labels.len() - pos)
}

/// True when both classes are present
pub fn has_both_classes(labels: &[f32]) -> bool {
    let (pos, neg) = class_counts(labels);
    pos > 0 && neg > 0
}

/// Indices sorted by score descending; equal scores keep their original order
fn descending_order(scores: &[f32]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));
    order
}

/// Area under the ROC curve (Mann–Whitney U with average ranks for ties)
pub fn roc_auc(scores: &[f32], labels: &[f32]) -> GnnResult<f64> {
    check_lengths(scores, labels)?;
    let (n_pos, n_neg) = class_counts(labels);
    if n_pos == 0 || n_neg == 0 {
        return Err(GnnError::SingleClass("ROC-AUC"));
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut pos_rank_sum = 0.0f64;
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && scores[order[j + 1]] == scores[order[i]] {
            j += 1;
        }
        // 1-based ranks i+1..=j+1 share their mean
        let avg_rank = (i + j + 2) as f64 / 2.0;
        for &idx in &order[i..=j] {
            if labels[idx] > 0.5 {
                pos_rank_sum += avg_rank;
            }
        }
        i = j + 1;
    }

    let n_pos_f = n_pos as f64;
    Ok((pos_rank_sum - n_pos_f * (n_pos_f + 1.0) / 2.0) / (n_pos_f * n_neg as f64))
}

/// Cumulative (tp, fp, threshold) at each distinct score, highest first
fn threshold_counts(scores: &[f32], labels: &[f32]) -> Vec<(usize, usize, f32)> {
    let order = descending_order(scores);
    let mut points = Vec::new();
    let (mut tp, mut fp) = (0usize, 0usize);
    for (pos, &idx) in order.iter().enumerate() {
        if labels[idx] > 0.5 {
            tp += 1;
        } else {
            fp += 1;
        }
        let last_of_group = order
            .get(pos + 1)
            .map_or(true, |&next| scores[next] != scores[idx]);
        if last_of_group {
            points.push((tp, fp, scores[idx]));
        }
    }
    points
}

/// Average precision: Σ (Rₙ − Rₙ₋₁) · Pₙ over distinct thresholds
pub fn average_precision(scores: &[f32], labels: &[f32]) -> GnnResult<f64> {
    check_lengths(scores, labels)?;
    let (n_pos, n_neg) = class_counts(labels);
    if n_pos == 0 || n_neg == 0 {
        return Err(GnnError::SingleClass("average precision"));
    }

    let mut ap = 0.0f64;
    let mut prev_recall = 0.0f64;
    for (tp, fp, _) in threshold_counts(scores, labels) {
        let precision = tp as f64 / (tp + fp) as f64;
        let recall = tp as f64 / n_pos as f64;
        ap += (recall - prev_recall) * precision;
        prev_recall = recall;
    }
    Ok(ap)
}

/// One point on the ROC curve
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RocPoint {
    pub fpr: f64,
    pub tpr: f64,
    pub threshold: f32,
}

/// ROC curve starting at (0, 0). The first threshold is one above the maximum score.
pub fn roc_curve(scores: &[f32], labels: &[f32]) -> GnnResult<Vec<RocPoint>> {
    check_lengths(scores, labels)?;
    let (n_pos, n_neg) = class_counts(labels);
    if n_pos == 0 || n_neg == 0 {
        return Err(GnnError::SingleClass("ROC curve"));
    }
    let max_score = scores.iter().cloned().fold(f32::NEG_INFINITY, f32::max);

    let mut curve = vec![RocPoint {
        fpr: 0.0,
        tpr: 0.0,
        threshold: max_score + 1.0,
    }];
    curve.extend(threshold_counts(scores, labels).into_iter().map(|(tp, fp, threshold)| RocPoint {
        fpr: fp as f64 / n_neg as f64,
        tpr: tp as f64 / n_pos as f64,
        threshold,
    }));
    Ok(curve)
}

/// One point on the precision-recall curve
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PrPoint {
    pub precision: f64,
    pub recall: f64,
    pub threshold: f32,
}

/// Precision-recall curve, highest threshold first
pub fn precision_recall_curve(scores: &[f32], labels: &[f32]) -> GnnResult<Vec<PrPoint>> {
    check_lengths(scores, labels)?;
    let (n_pos, _) = class_counts(labels);
    if n_pos == 0 {
        return Err(GnnError::SingleClass("precision-recall curve"));
    }
    Ok(threshold_counts(scores, labels)
        .into_iter()
        .map(|(tp, fp, threshold)| PrPoint {
            precision: tp as f64 / (tp + fp) as f64,
            recall: tp as f64 / n_pos as f64,
            threshold,
        })
        .collect())
}

/// Binary confusion counts at a fixed threshold
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub tn: usize,
    pub fp: usize,
    #[serde(rename = "fn")]
    pub fn_: usize,
    pub tp: usize,
}

impl ConfusionMatrix {
    /// Predict positive when `score >= threshold`
    pub fn at_threshold(scores: &[f32], labels: &[f32], threshold: f32) -> GnnResult<Self> {
        check_lengths(scores, labels)?;
        let mut cm = ConfusionMatrix::default();
        for (&s, &y) in scores.iter().zip(labels) {
            match (s >= threshold, y > 0.5) {
                (true, true) => cm.tp += 1,
                (true, false) => cm.fp += 1,
                (false, true) => cm.fn_ += 1,
                (false, false) => cm.tn += 1,
            }
        }
        Ok(cm)
    }

    pub fn total(&self) -> usize {
        self.tn + self.fp + self.fn_ + self.tp
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.tp + self.tn, self.total())
    }

    /// 0.0 when nothing was predicted positive
    pub fn precision(&self) -> f64 {
        ratio(self.tp, self.tp + self.fp)
    }

    /// 0.0 when there are no positives
    pub fn recall(&self) -> f64 {
        ratio(self.tp, self.tp + self.fn_)
    }

    pub fn f1(&self) -> f64 {
        let (p, r) = (self.precision(), self.recall());
        if p + r == 0.0 {
            0.0
        } else {
            2.0 * p * r / (p + r)
        }
    }

    /// `[[tn, fp], [fn, tp]]`
    pub fn as_matrix(&self) -> [[usize; 2]; 2] {
        [[self.tn, self.fp], [self.fn_, self.tp]]
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

/// Fraction of positives among the `k` highest scores, for each `k`.
///
/// A `k` of zero or larger than the number of samples is skipped.
pub fn precision_at_k(scores: &[f32], labels: &[f32], ks: &[usize]) -> GnnResult<BTreeMap<usize, f64>> {
    check_lengths(scores, labels)?;
    let order = descending_order(scores);
    let mut result = BTreeMap::new();
    for &k in ks {
        if k == 0 || k > order.len() {
            continue;
        }
        let hits = order[..k].iter().filter(|&&idx| labels[idx] > 0.5).count();
        result.insert(k, hits as f64 / k as f64);
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_nan_scores_do_not_panic() {
        let scores: Vec<f32> = (0..40).map(|i| if i % 3 == 0 { f32::NAN } else { i as f32 }).collect();
        let labels: Vec<f32> = (0..40).map(|i| (i % 2) as f32).collect();
        assert!(roc_auc(&scores, &labels).is_ok());
        assert!(average_precision(&scores, &labels).is_ok());
    }

    #[test]
    fn test_auc_perfect_and_inverted() {
        let labels = [1.0, 1.0, 0.0, 0.0];
        assert_eq!(roc_auc(&[0.9, 0.8, 0.2, 0.1], &labels).unwrap(), 1.0);
        assert_eq!(roc_auc(&[0.1, 0.2, 0.8, 0.9], &labels).unwrap(), 0.0);
    }

    #[test]
    fn test_auc_with_ties() {
        // sklearn: roc_auc_score([0, 0, 1, 1], [0.1, 0.4, 0.35, 0.8]) == 0.75
        let auc = roc_auc(&[0.1, 0.4, 0.35, 0.8], &[0.0, 0.0, 1.0, 1.0]).unwrap();
        assert_abs_diff_eq!(auc, 0.75, epsilon = 1e-12);
        // All scores tied → 0.5
        let auc = roc_auc(&[0.5, 0.5, 0.5], &[1.0, 0.0, 1.0]).unwrap();
        assert_abs_diff_eq!(auc, 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_single_class_is_error() {
        assert_eq!(
            roc_auc(&[0.3, 0.7], &[1.0, 1.0]).unwrap_err(),
            GnnError::SingleClass("ROC-AUC")
        );
        assert!(average_precision(&[0.3, 0.7], &[0.0, 0.0]).is_err());
        assert!(!has_both_classes(&[0.0, 0.0]));
    }

    #[test]
    fn test_average_precision_known_value() {
        // sklearn: average_precision_score([0, 0, 1, 1], [0.1, 0.4, 0.35, 0.8]) ≈ 0.8333
        let ap = average_precision(&[0.1, 0.4, 0.35, 0.8], &[0.0, 0.0, 1.0, 1.0]).unwrap();
        assert_abs_diff_eq!(ap, 5.0 / 6.0, epsilon = 1e-9);
    }

    #[test]
    fn test_curves_end_at_full_recall() {
        let scores = [0.1, 0.4, 0.35, 0.8];
        let labels = [0.0, 0.0, 1.0, 1.0];
        let roc = roc_curve(&scores, &labels).unwrap();
        assert_eq!(roc.first().map(|p| (p.fpr, p.tpr)), Some((0.0, 0.0)));
        assert_eq!(roc.last().map(|p| (p.fpr, p.tpr)), Some((1.0, 1.0)));
        let pr = precision_recall_curve(&scores, &labels).unwrap();
        assert_eq!(pr.len(), 4);
        assert_eq!(pr.last().map(|p| p.recall), Some(1.0));
    }

    #[test]
    fn test_confusion_and_zero_division() {
        let cm = ConfusionMatrix::at_threshold(&[0.9, 0.6, 0.4, 0.2], &[1.0, 0.0, 1.0, 0.0], 0.5).unwrap();
        assert_eq!(cm.as_matrix(), [[1, 1], [1, 1]]);
        assert_eq!(cm.accuracy(), 0.5);
        assert_eq!(cm.f1(), 0.5);

        let none_predicted = ConfusionMatrix::at_threshold(&[0.1, 0.2], &[1.0, 0.0], 0.5).unwrap();
        assert_eq!(none_predicted.precision(), 0.0);
        assert_eq!(none_predicted.f1(), 0.0);
    }

    #[test]
    fn test_precision_at_k_skips_large_k() {
        let scores = [0.9, 0.1, 0.8, 0.3];
        let labels = [1.0, 1.0, 0.0, 0.0];
        let p = precision_at_k(&scores, &labels, &[1, 2, 10]).unwrap();
        assert_eq!(p.get(&1), Some(&1.0));
        assert_eq!(p.get(&2), Some(&0.5));
        assert!(!p.contains_key(&10));
    }

    #[test]
    fn test_precision_at_one_tracks_top_label() {
        let p = precision_at_k(&[0.2, 0.7], &[1.0, 0.0], &[1]).unwrap();
        assert_eq!(p.get(&1), Some(&0.0));
    }
}
