//! Adam with L2 weight decay folded into the gradient

use crate::error::{GnnError, GnnResult};
use crate::model::Parameterized;
use serde::{Deserialize, Serialize};

/// Optimizer hyperparameters
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdamConfig {
    pub lr: f32,
    pub beta1: f32,
    pub beta2: f32,
    pub eps: f32,
    pub weight_decay: f32,
}

impl Default for AdamConfig {
    fn default() -> Self {
        Self {
            lr: 0.01,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
            weight_decay: 5e-4,
        }
    }
}

/// Adam optimizer. Moment buffers are allocated lazily on the first step, one
/// per parameter tensor in `Parameterized::parameters` order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Adam {
    pub config: AdamConfig,
    /// Completed steps, used for bias correction
    pub t: u64,
    m: Vec<Vec<f32>>,
    v: Vec<Vec<f32>>,
}

impl Adam {
    pub fn new(config: AdamConfig) -> Self {
        Self {
            config,
            t: 0,
            m: Vec::new(),
            v: Vec::new(),
        }
    }

    /// Apply one update to `params` from same-shaped `grads`
    pub fn step<P: Parameterized>(&mut self, params: &mut P, grads: &P) -> GnnResult<()> {
        let grad_views = grads.parameters();
        let mut param_views = params.parameters_mut();
        if grad_views.len() != param_views.len() {
            return Err(GnnError::OptimizerState(format!(
                "{} parameter tensors vs {} gradient tensors",
                param_views.len(),
                grad_views.len()
            )));
        }

        if self.m.is_empty() {
            self.m = param_views.iter().map(|p| vec![0.0; p.len()]).collect();
            self.v = self.m.clone();
        } else if self.m.len() != param_views.len() {
            return Err(GnnError::OptimizerState(format!(
                "state holds {} tensors, model has {}",
                self.m.len(),
                param_views.len()
            )));
        }

        self.t += 1;
        let AdamConfig {
            lr,
            beta1,
            beta2,
            eps,
            weight_decay,
        } = self.config.clone();
        let bias_correction1 = 1.0 - beta1.powi(self.t as i32);
        let bias_correction2 = 1.0 - beta2.powi(self.t as i32);

        for (slot, (param, grad)) in param_views.iter_mut().zip(grad_views.iter()).enumerate() {
            let m = &mut self.m[slot];
            let v = &mut self.v[slot];
            if param.len() != grad.len() || m.len() != param.len() {
                return Err(GnnError::OptimizerState(format!(
                    "tensor {} has {} values, gradient {}, state {}",
                    slot,
                    param.len(),
                    grad.len(),
                    m.len()
                )));
            }

            for (((p, &g), m_i), v_i) in param
                .iter_mut()
                .zip(grad.iter())
                .zip(m.iter_mut())
                .zip(v.iter_mut())
            {
                let g = g + weight_decay * *p;
                *m_i = beta1 * *m_i + (1.0 - beta1) * g;
                *v_i = beta2 * *v_i + (1.0 - beta2) * g * g;
                let m_hat = *m_i / bias_correction1;
                let v_hat = *v_i / bias_correction2;
                *p -= lr * m_hat / (v_hat.sqrt() + eps);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linear::Linear;
    use ndarray::{array, ArrayViewD, ArrayViewMutD};

    struct Scalar(Linear);

    impl Parameterized for Scalar {
        fn parameters(&self) -> Vec<ArrayViewD<'_, f32>> {
            self.0.parameters()
        }
        fn parameters_mut(&mut self) -> Vec<ArrayViewMutD<'_, f32>> {
            self.0.parameters_mut()
        }
    }

    #[test]
    fn test_first_step_moves_by_lr() {
        let mut param = Scalar(Linear {
            weight: array![[1.0f32]],
            bias: None,
        });
        let grad = Scalar(Linear {
            weight: array![[0.5f32]],
            bias: None,
        });
        let mut adam = Adam::new(AdamConfig {
            weight_decay: 0.0,
            ..AdamConfig::default()
        });
        adam.step(&mut param, &grad).unwrap();
        // Bias-corrected first step is lr * sign(g)
        assert!((param.0.weight[[0, 0]] - 0.99).abs() < 1e-5);
        assert_eq!(adam.t, 1);
    }

    #[test]
    fn test_shape_mismatch_is_error() {
        let mut param = Scalar(Linear {
            weight: array![[1.0f32, 2.0]],
            bias: None,
        });
        let grad = Scalar(Linear {
            weight: array![[0.5f32]],
            bias: None,
        });
        let mut adam = Adam::new(AdamConfig::default());
        assert!(adam.step(&mut param, &grad).is_err());
    }
}
