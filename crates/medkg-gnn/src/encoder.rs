//! GraphSAGE node encoder
//!
//! Two mean-aggregation convolutions:
//!
//! ```text
//! h_i' = W_neigh · mean_{j ∈ N(i)} h_j + b + W_root · h_i
//! ```
//!
//! `conv1` maps `in_dim → hidden` followed by ReLU and dropout, `conv2` maps
//! `hidden → embedding` with no output activation.

use crate::activation::{dropout, relu, relu_backward, Mode};
use crate::graph::MessageGraph;
use crate::linear::Linear;
use crate::model::Parameterized;
use ndarray::{Array2, ArrayView2, ArrayViewD, ArrayViewMutD};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Capability: produce node embeddings from features and a message-passing structure
pub trait GraphEncoder: Parameterized + Sized {
    /// Intermediate activations kept for the backward pass
    type Cache;

    fn input_dim(&self) -> usize;

    fn output_dim(&self) -> usize;

    fn forward(
        &self,
        x: ArrayView2<'_, f32>,
        graph: &MessageGraph,
        mode: &mut Mode<'_>,
    ) -> (Array2<f32>, Self::Cache);

    /// Parameter gradients, shaped like `self`
    fn backward(&self, graph: &MessageGraph, cache: &Self::Cache, grad_out: ArrayView2<'_, f32>) -> Self;
}

/// A single GraphSAGE convolution with mean aggregation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SageConv {
    /// Applied to the aggregated neighbourhood (with bias)
    pub lin_neigh: Linear,
    /// Applied to the node's own features (no bias)
    pub lin_root: Linear,
}

impl SageConv {
    pub fn new<R: Rng>(in_dim: usize, out_dim: usize, rng: &mut R) -> Self {
        Self {
            lin_neigh: Linear::new(in_dim, out_dim, true, rng),
            lin_root: Linear::new(in_dim, out_dim, false, rng),
        }
    }

    /// Returns the output and the aggregated input
    pub fn forward(&self, h: ArrayView2<'_, f32>, graph: &MessageGraph) -> (Array2<f32>, Array2<f32>) {
        let agg = graph.mean_aggregate(h);
        let out = self.lin_neigh.forward(agg.view()) + self.lin_root.forward(h);
        (out, agg)
    }

    /// Returns parameter gradients and the gradient w.r.t. `h`
    pub fn backward(
        &self,
        h: ArrayView2<'_, f32>,
        agg: ArrayView2<'_, f32>,
        graph: &MessageGraph,
        grad_out: ArrayView2<'_, f32>,
    ) -> (SageConv, Array2<f32>) {
        let (g_neigh, grad_agg) = self.lin_neigh.backward(agg, grad_out);
        let (g_root, grad_self) = self.lin_root.backward(h, grad_out);
        let grad_h = grad_self + graph.mean_aggregate_backward(grad_agg.view());
        (
            SageConv {
                lin_neigh: g_neigh,
                lin_root: g_root,
            },
            grad_h,
        )
    }

    fn param_grads(
        &self,
        h: ArrayView2<'_, f32>,
        agg: ArrayView2<'_, f32>,
        grad_out: ArrayView2<'_, f32>,
    ) -> SageConv {
        SageConv {
            lin_neigh: self.lin_neigh.backward_params(agg, grad_out),
            lin_root: self.lin_root.backward_params(h, grad_out),
        }
    }
}

impl Parameterized for SageConv {
    fn parameters(&self) -> Vec<ArrayViewD<'_, f32>> {
        let mut params = self.lin_neigh.parameters();
        params.extend(self.lin_root.parameters());
        params
    }

    fn parameters_mut(&mut self) -> Vec<ArrayViewMutD<'_, f32>> {
        let mut params = self.lin_neigh.parameters_mut();
        params.extend(self.lin_root.parameters_mut());
        params
    }
}

/// Two-layer GraphSAGE encoder
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SageEncoder {
    pub conv1: SageConv,
    pub conv2: SageConv,
    pub dropout: f32,
}

/// Activations recorded by `SageEncoder::forward`
pub struct SageCache {
    input: Array2<f32>,
    agg1: Array2<f32>,
    pre1: Array2<f32>,
    mask1: Option<Array2<f32>>,
    hidden: Array2<f32>,
    agg2: Array2<f32>,
}

impl SageEncoder {
    pub fn new<R: Rng>(in_dim: usize, hidden_dim: usize, out_dim: usize, dropout: f32, rng: &mut R) -> Self {
        Self {
            conv1: SageConv::new(in_dim, hidden_dim, rng),
            conv2: SageConv::new(hidden_dim, out_dim, rng),
            dropout,
        }
    }
}

impl GraphEncoder for SageEncoder {
    type Cache = SageCache;

    fn input_dim(&self) -> usize {
        self.conv1.lin_neigh.in_features()
    }

    fn output_dim(&self) -> usize {
        self.conv2.lin_neigh.out_features()
    }

    fn forward(
        &self,
        x: ArrayView2<'_, f32>,
        graph: &MessageGraph,
        mode: &mut Mode<'_>,
    ) -> (Array2<f32>, SageCache) {
        let (pre1, agg1) = self.conv1.forward(x, graph);
        let (hidden, mask1) = dropout(relu(&pre1), self.dropout, mode);
        let (z, agg2) = self.conv2.forward(hidden.view(), graph);
        let cache = SageCache {
            input: x.to_owned(),
            agg1,
            pre1,
            mask1,
            hidden,
            agg2,
        };
        (z, cache)
    }

    fn backward(&self, graph: &MessageGraph, cache: &SageCache, grad_out: ArrayView2<'_, f32>) -> Self {
        let (conv2, mut grad_hidden) =
            self.conv2
                .backward(cache.hidden.view(), cache.agg2.view(), graph, grad_out);
        if let Some(mask) = &cache.mask1 {
            grad_hidden *= mask;
        }
        relu_backward(&mut grad_hidden, &cache.pre1);
        let conv1 = self
            .conv1
            .param_grads(cache.input.view(), cache.agg1.view(), grad_hidden.view());
        SageEncoder {
            conv1,
            conv2,
            dropout: self.dropout,
        }
    }
}

impl Parameterized for SageEncoder {
    fn parameters(&self) -> Vec<ArrayViewD<'_, f32>> {
        let mut params = self.conv1.parameters();
        params.extend(self.conv2.parameters());
        params
    }

    fn parameters_mut(&mut self) -> Vec<ArrayViewMutD<'_, f32>> {
        let mut params = self.conv1.parameters_mut();
        params.extend(self.conv2.parameters_mut());
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_encoder_shapes() {
        let mut rng = StdRng::seed_from_u64(11);
        let encoder = SageEncoder::new(2, 8, 4, 0.5, &mut rng);
        let graph = MessageGraph::from_edges(5, &[(0, 3), (1, 4), (2, 3)]).unwrap();
        let x = Array2::<f32>::ones((5, 2));
        let (z, _) = encoder.forward(x.view(), &graph, &mut Mode::Eval);
        assert_eq!(z.dim(), (5, 4));
        assert_eq!(encoder.input_dim(), 2);
        assert_eq!(encoder.output_dim(), 4);
        // conv1: 2*8 + 8 + 2*8, conv2: 8*4 + 4 + 8*4
        assert_eq!(encoder.num_parameters(), 40 + 68);
    }

    #[test]
    fn test_eval_forward_is_deterministic() {
        let mut rng = StdRng::seed_from_u64(5);
        let encoder = SageEncoder::new(2, 8, 4, 0.5, &mut rng);
        let graph = MessageGraph::from_edges(3, &[(0, 2)]).unwrap();
        let x = ndarray::array![[0.1f32, -0.3], [1.2, 0.4], [-0.7, 0.9]];
        let (a, _) = encoder.forward(x.view(), &graph, &mut Mode::Eval);
        let (b, _) = encoder.forward(x.view(), &graph, &mut Mode::Eval);
        assert_eq!(a, b);
    }
}
