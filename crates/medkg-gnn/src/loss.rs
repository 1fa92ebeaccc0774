//! Numerically stable sigmoid and binary cross-entropy on logits

use crate::error::{GnnError, GnnResult};
use ndarray::{Array1, ArrayView1, Zip};

pub fn sigmoid(x: f32) -> f32 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

/// Mean of `max(x, 0) - x·y + ln(1 + e^{-|x|})`
pub fn bce_with_logits(logits: ArrayView1<'_, f32>, labels: ArrayView1<'_, f32>) -> GnnResult<f32> {
    if logits.len() != labels.len() {
        return Err(GnnError::LengthMismatch {
            scores: logits.len(),
            labels: labels.len(),
        });
    }
    if logits.is_empty() {
        return Ok(0.0);
    }
    let mut total = 0.0f64;
    Zip::from(&logits).and(&labels).for_each(|&x, &y| {
        let term = x.max(0.0) - x * y + (-x.abs()).exp().ln_1p();
        total += term as f64;
    });
    Ok((total / logits.len() as f64) as f32)
}

/// d(mean BCE)/d(logit) = (σ(x) − y) / n
pub fn bce_with_logits_grad(logits: ArrayView1<'_, f32>, labels: ArrayView1<'_, f32>) -> Array1<f32> {
    let n = logits.len().max(1) as f32;
    Zip::from(&logits)
        .and(&labels)
        .map_collect(|&x, &y| (sigmoid(x) - y) / n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_sigmoid_extremes() {
        assert_eq!(sigmoid(0.0), 0.5);
        assert!(sigmoid(100.0) > 0.999);
        assert!(sigmoid(-100.0) < 1e-6);
        assert!(sigmoid(-1000.0).is_finite());
    }

    #[test]
    fn test_bce_matches_closed_form() {
        let logits = array![0.0f32, 2.0];
        let labels = array![1.0f32, 0.0];
        let expected = ((2.0f32).ln() + (1.0 + 2.0f32.exp()).ln()) / 2.0;
        let loss = bce_with_logits(logits.view(), labels.view()).unwrap();
        assert!((loss - expected).abs() < 1e-5);
    }

    #[test]
    fn test_bce_large_logits_stay_finite() {
        let logits = array![500.0f32, -500.0];
        let labels = array![0.0f32, 1.0];
        let loss = bce_with_logits(logits.view(), labels.view()).unwrap();
        assert!(loss.is_finite());
        assert!((loss - 500.0).abs() < 1e-3);
    }

    #[test]
    fn test_grad_sign() {
        let logits = array![0.0f32, 0.0];
        let labels = array![1.0f32, 0.0];
        let g = bce_with_logits_grad(logits.view(), labels.view());
        assert_eq!(g, array![-0.25f32, 0.25]);
    }
}
