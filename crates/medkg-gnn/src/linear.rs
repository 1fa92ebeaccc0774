//! Dense affine layer with explicit backward pass

use ndarray::{Array1, Array2, ArrayView2, ArrayViewD, ArrayViewMutD, Axis};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// `y = x · W + b`, with `W` stored as `[in_features, out_features]`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Linear {
    pub weight: Array2<f32>,
    pub bias: Option<Array1<f32>>,
}

impl Linear {
    /// Uniform initialisation in `±1/sqrt(in_features)` for weight and bias
    pub fn new<R: Rng>(in_features: usize, out_features: usize, bias: bool, rng: &mut R) -> Self {
        let bound = 1.0 / (in_features.max(1) as f32).sqrt();
        let weight = Array2::from_shape_fn((in_features, out_features), |_| rng.gen_range(-bound..=bound));
        let bias = bias.then(|| Array1::from_shape_fn(out_features, |_| rng.gen_range(-bound..=bound)));
        Self { weight, bias }
    }

    pub fn in_features(&self) -> usize {
        self.weight.nrows()
    }

    pub fn out_features(&self) -> usize {
        self.weight.ncols()
    }

    pub fn forward(&self, x: ArrayView2<'_, f32>) -> Array2<f32> {
        let mut y = x.dot(&self.weight);
        if let Some(b) = &self.bias {
            y += b;
        }
        y
    }

    /// Returns `(parameter gradients, gradient w.r.t. the input)`
    pub fn backward(&self, x: ArrayView2<'_, f32>, grad_out: ArrayView2<'_, f32>) -> (Linear, Array2<f32>) {
        let grad_weight = x.t().dot(&grad_out);
        let grad_bias = self.bias.as_ref().map(|_| grad_out.sum_axis(Axis(0)));
        let grad_input = grad_out.dot(&self.weight.t());
        (
            Linear {
                weight: grad_weight,
                bias: grad_bias,
            },
            grad_input,
        )
    }

    /// Same as `backward` but skips the input gradient
    pub fn backward_params(&self, x: ArrayView2<'_, f32>, grad_out: ArrayView2<'_, f32>) -> Linear {
        Linear {
            weight: x.t().dot(&grad_out),
            bias: self.bias.as_ref().map(|_| grad_out.sum_axis(Axis(0))),
        }
    }

    pub fn parameters(&self) -> Vec<ArrayViewD<'_, f32>> {
        let mut params = vec![self.weight.view().into_dyn()];
        if let Some(b) = &self.bias {
            params.push(b.view().into_dyn());
        }
        params
    }

    pub fn parameters_mut(&mut self) -> Vec<ArrayViewMutD<'_, f32>> {
        let mut params = vec![self.weight.view_mut().into_dyn()];
        if let Some(b) = self.bias.as_mut() {
            params.push(b.view_mut().into_dyn());
        }
        params
    }
}
