//! MLP edge decoder
//!
//! Concatenates the source and destination embeddings and maps them to one raw
//! logit per edge. No activation on the final layer: callers apply sigmoid for
//! probabilities and BCE-with-logits for the loss.

use crate::activation::{dropout, relu, relu_backward, Mode};
use crate::linear::Linear;
use crate::model::Parameterized;
use ndarray::{s, Array1, Array2, ArrayView1, ArrayView2, ArrayViewD, ArrayViewMutD, Axis};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Capability: score candidate edges from their endpoint embeddings
pub trait EdgeDecoder: Parameterized + Sized {
    type Cache;

    /// Expected width of each endpoint embedding
    fn embedding_dim(&self) -> usize;

    fn forward(
        &self,
        src: ArrayView2<'_, f32>,
        dst: ArrayView2<'_, f32>,
        mode: &mut Mode<'_>,
    ) -> (Array1<f32>, Self::Cache);

    /// Returns `(parameter gradients, grad w.r.t. src, grad w.r.t. dst)`
    fn backward(&self, cache: &Self::Cache, grad_logits: ArrayView1<'_, f32>) -> (Self, Array2<f32>, Array2<f32>);
}

/// Feed-forward decoder: `2·D → hidden[0] → … → 1` with ReLU and dropout between layers
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MlpDecoder {
    pub layers: Vec<Linear>,
    pub dropout: f32,
}

pub struct MlpCache {
    inputs: Vec<Array2<f32>>,
    pre: Vec<Array2<f32>>,
    masks: Vec<Option<Array2<f32>>>,
}

impl MlpDecoder {
    pub fn new<R: Rng>(embedding_dim: usize, hidden: &[usize], dropout: f32, rng: &mut R) -> Self {
        let mut dims = Vec::with_capacity(hidden.len() + 2);
        dims.push(embedding_dim * 2);
        dims.extend_from_slice(hidden);
        dims.push(1);

        let layers = dims
            .windows(2)
            .map(|w| Linear::new(w[0], w[1], true, rng))
            .collect();
        Self { layers, dropout }
    }
}

impl EdgeDecoder for MlpDecoder {
    type Cache = MlpCache;

    fn embedding_dim(&self) -> usize {
        self.layers.first().map(|l| l.in_features() / 2).unwrap_or(0)
    }

    fn forward(
        &self,
        src: ArrayView2<'_, f32>,
        dst: ArrayView2<'_, f32>,
        mode: &mut Mode<'_>,
    ) -> (Array1<f32>, MlpCache) {
        let d = src.ncols();
        let mut input = Array2::<f32>::zeros((src.nrows(), d * 2));
        input.slice_mut(s![.., ..d]).assign(&src);
        input.slice_mut(s![.., d..]).assign(&dst);

        let last = self.layers.len().saturating_sub(1);
        let mut cache = MlpCache {
            inputs: Vec::with_capacity(self.layers.len()),
            pre: Vec::with_capacity(last),
            masks: Vec::with_capacity(last),
        };

        for (i, layer) in self.layers.iter().enumerate() {
            let pre = layer.forward(input.view());
            cache.inputs.push(input);
            if i == last {
                let logits = pre.index_axis(Axis(1), 0).to_owned();
                return (logits, cache);
            }
            let (out, mask) = dropout(relu(&pre), self.dropout, mode);
            cache.pre.push(pre);
            cache.masks.push(mask);
            input = out;
        }

        // No layers: every edge scores zero
        (Array1::zeros(src.nrows()), cache)
    }

    fn backward(&self, cache: &MlpCache, grad_logits: ArrayView1<'_, f32>) -> (Self, Array2<f32>, Array2<f32>) {
        let last = self.layers.len().saturating_sub(1);
        let mut grad = grad_logits.insert_axis(Axis(1)).to_owned();
        let mut layer_grads = Vec::with_capacity(self.layers.len());

        for i in (0..self.layers.len()).rev() {
            if i < last {
                if let Some(mask) = &cache.masks[i] {
                    grad *= mask;
                }
                relu_backward(&mut grad, &cache.pre[i]);
            }
            let (g, grad_input) = self.layers[i].backward(cache.inputs[i].view(), grad.view());
            layer_grads.push(g);
            grad = grad_input;
        }
        layer_grads.reverse();

        let d = grad.ncols() / 2;
        let grad_src = grad.slice(s![.., ..d]).to_owned();
        let grad_dst = grad.slice(s![.., d..]).to_owned();
        (
            MlpDecoder {
                layers: layer_grads,
                dropout: self.dropout,
            },
            grad_src,
            grad_dst,
        )
    }
}

impl Parameterized for MlpDecoder {
    fn parameters(&self) -> Vec<ArrayViewD<'_, f32>> {
        self.layers.iter().flat_map(|l| l.parameters()).collect()
    }

    fn parameters_mut(&mut self) -> Vec<ArrayViewMutD<'_, f32>> {
        self.layers.iter_mut().flat_map(|l| l.parameters_mut()).collect()
    }
}
