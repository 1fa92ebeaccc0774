//! Encode-then-decode link predictor
//!
//! `predict(X, structure_edges, query_edges)` encodes every node once over the
//! structure graph, then decodes only the query edges by indexing the
//! embedding matrix at their endpoints.

use crate::activation::Mode;
use crate::decoder::{EdgeDecoder, MlpDecoder};
use crate::encoder::{GraphEncoder, SageEncoder};
use crate::error::{GnnError, GnnResult};
use crate::graph::{EdgeIndex, MessageGraph};
use crate::loss::{bce_with_logits, bce_with_logits_grad};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, ArrayViewD, ArrayViewMutD, Axis};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

/// Anything with trainable tensors. Gradients use the same type as the parameters.
pub trait Parameterized {
    fn parameters(&self) -> Vec<ArrayViewD<'_, f32>>;

    fn parameters_mut(&mut self) -> Vec<ArrayViewMutD<'_, f32>>;

    /// Number of scalar trainable parameters
    fn num_parameters(&self) -> usize {
        self.parameters().iter().map(|p| p.len()).sum()
    }
}

/// Model hyperparameters
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub in_dim: usize,
    pub hidden_dim: usize,
    pub embedding_dim: usize,
    pub decoder_hidden: Vec<usize>,
    pub encoder_dropout: f32,
    pub decoder_dropout: f32,
    /// Seed for weight initialisation
    pub seed: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            in_dim: 2,
            hidden_dim: 64,
            embedding_dim: 32,
            decoder_hidden: vec![32, 16],
            encoder_dropout: 0.5,
            decoder_dropout: 0.3,
            seed: 42,
        }
    }
}

impl ModelConfig {
    pub fn validate(&self) -> GnnResult<()> {
        if self.in_dim == 0 || self.hidden_dim == 0 || self.embedding_dim == 0 {
            return Err(GnnError::InvalidConfig(
                "layer dimensions must be positive".to_string(),
            ));
        }
        if self.decoder_hidden.iter().any(|&h| h == 0) {
            return Err(GnnError::InvalidConfig(
                "decoder hidden sizes must be positive".to_string(),
            ));
        }
        for (name, p) in [
            ("encoder_dropout", self.encoder_dropout),
            ("decoder_dropout", self.decoder_dropout),
        ] {
            if !(0.0..1.0).contains(&p) {
                return Err(GnnError::InvalidConfig(format!(
                    "{} must be in [0, 1), got {}",
                    name, p
                )));
            }
        }
        Ok(())
    }
}

/// Output of one training forward/backward pass
pub struct TrainStep<E, D> {
    pub loss: f32,
    pub logits: Array1<f32>,
    pub grads: LinkPredictor<E, D>,
}

/// Two-stage model: graph encoder + edge decoder
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LinkPredictor<E = SageEncoder, D = MlpDecoder> {
    pub encoder: E,
    pub decoder: D,
}

/// The default GraphSAGE + MLP configuration
pub type SageLinkPredictor = LinkPredictor<SageEncoder, MlpDecoder>;

impl SageLinkPredictor {
    /// Build and initialise from a validated config
    pub fn from_config(config: &ModelConfig) -> GnnResult<Self> {
        config.validate()?;
        let mut rng = StdRng::seed_from_u64(config.seed);
        let encoder = SageEncoder::new(
            config.in_dim,
            config.hidden_dim,
            config.embedding_dim,
            config.encoder_dropout,
            &mut rng,
        );
        let decoder = MlpDecoder::new(
            config.embedding_dim,
            &config.decoder_hidden,
            config.decoder_dropout,
            &mut rng,
        );
        let model = Self { encoder, decoder };
        tracing::debug!("Initialised link predictor with {} parameters", model.num_parameters());
        Ok(model)
    }
}

impl<E: GraphEncoder, D: EdgeDecoder> LinkPredictor<E, D> {
    pub fn new(encoder: E, decoder: D) -> Self {
        Self { encoder, decoder }
    }

    /// Node embeddings `[N, embedding_dim]`
    pub fn encode(
        &self,
        x: ArrayView2<'_, f32>,
        graph: &MessageGraph,
        mode: &mut Mode<'_>,
    ) -> GnnResult<Array2<f32>> {
        self.check_inputs(x, graph)?;
        Ok(self.encoder.forward(x, graph, mode).0)
    }

    /// One raw logit per query edge
    pub fn decode(
        &self,
        z: ArrayView2<'_, f32>,
        edges: &[EdgeIndex],
        mode: &mut Mode<'_>,
    ) -> GnnResult<Array1<f32>> {
        let (src, dst) = gather_endpoints(z, edges)?;
        Ok(self.decoder.forward(src.view(), dst.view(), mode).0)
    }

    /// Inference: encode once over `graph`, decode `edges`, no dropout
    pub fn predict(
        &self,
        x: ArrayView2<'_, f32>,
        graph: &MessageGraph,
        edges: &[EdgeIndex],
    ) -> GnnResult<Array1<f32>> {
        let z = self.encode(x, graph, &mut Mode::Eval)?;
        self.decode(z.view(), edges, &mut Mode::Eval)
    }

    /// Full-batch training pass: forward with dropout, BCE-with-logits loss, backward
    pub fn train_step(
        &self,
        x: ArrayView2<'_, f32>,
        graph: &MessageGraph,
        edges: &[EdgeIndex],
        labels: ArrayView1<'_, f32>,
        rng: &mut StdRng,
    ) -> GnnResult<TrainStep<E, D>> {
        self.check_inputs(x, graph)?;
        if edges.len() != labels.len() {
            return Err(GnnError::LengthMismatch {
                scores: edges.len(),
                labels: labels.len(),
            });
        }

        let mut mode = Mode::Train(rng);
        let (z, enc_cache) = self.encoder.forward(x, graph, &mut mode);
        let (src, dst) = gather_endpoints(z.view(), edges)?;
        let (logits, dec_cache) = self.decoder.forward(src.view(), dst.view(), &mut mode);

        let loss = bce_with_logits(logits.view(), labels)?;
        let grad_logits = bce_with_logits_grad(logits.view(), labels);

        let (decoder_grads, grad_src, grad_dst) = self.decoder.backward(&dec_cache, grad_logits.view());
        let mut grad_z = Array2::<f32>::zeros(z.raw_dim());
        for (k, &(s, d)) in edges.iter().enumerate() {
            let mut row = grad_z.row_mut(s);
            row += &grad_src.row(k);
            let mut row = grad_z.row_mut(d);
            row += &grad_dst.row(k);
        }
        let encoder_grads = self.encoder.backward(graph, &enc_cache, grad_z.view());

        Ok(TrainStep {
            loss,
            logits,
            grads: LinkPredictor {
                encoder: encoder_grads,
                decoder: decoder_grads,
            },
        })
    }

    fn check_inputs(&self, x: ArrayView2<'_, f32>, graph: &MessageGraph) -> GnnResult<()> {
        if x.ncols() != self.encoder.input_dim() {
            return Err(GnnError::FeatureDimMismatch {
                expected: self.encoder.input_dim(),
                got: x.ncols(),
            });
        }
        if x.nrows() != graph.node_count {
            return Err(GnnError::InvalidConfig(format!(
                "feature matrix has {} rows but the structure graph has {} nodes",
                x.nrows(),
                graph.node_count
            )));
        }
        Ok(())
    }
}

impl<E: Parameterized, D: Parameterized> Parameterized for LinkPredictor<E, D> {
    fn parameters(&self) -> Vec<ArrayViewD<'_, f32>> {
        let mut params = self.encoder.parameters();
        params.extend(self.decoder.parameters());
        params
    }

    fn parameters_mut(&mut self) -> Vec<ArrayViewMutD<'_, f32>> {
        let mut params = self.encoder.parameters_mut();
        params.extend(self.decoder.parameters_mut());
        params
    }
}

/// Select the embedding rows for each edge's source and destination
fn gather_endpoints(z: ArrayView2<'_, f32>, edges: &[EdgeIndex]) -> GnnResult<(Array2<f32>, Array2<f32>)> {
    let n = z.nrows();
    let mut src = Vec::with_capacity(edges.len());
    let mut dst = Vec::with_capacity(edges.len());
    for &(s, d) in edges {
        if s >= n || d >= n {
            return Err(GnnError::NodeOutOfRange {
                src: s,
                dst: d,
                num_nodes: n,
            });
        }
        src.push(s);
        dst.push(d);
    }
    Ok((z.select(Axis(0), &src), z.select(Axis(0), &dst)))
}
