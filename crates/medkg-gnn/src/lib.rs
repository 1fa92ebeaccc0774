//! Graph neural network link prediction on ndarray
//!
//! A GraphSAGE encoder produces node embeddings over an undirected message
//! graph, an MLP decoder turns endpoint pairs into logits, and a small Adam
//! optimiser trains the whole thing full-batch. Gradients are computed by hand
//! and returned as a model-shaped value, so the optimiser only needs the
//! `Parameterized` view of both.

pub mod activation;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod graph;
pub mod linear;
pub mod loss;
pub mod metrics;
pub mod model;
pub mod optim;

pub use activation::Mode;
pub use decoder::{EdgeDecoder, MlpDecoder};
pub use encoder::{GraphEncoder, SageConv, SageEncoder};
pub use error::{GnnError, GnnResult};
pub use graph::{EdgeIndex, MessageGraph};
pub use linear::Linear;
pub use loss::{bce_with_logits, sigmoid};
pub use metrics::{
    average_precision, has_both_classes, precision_at_k, precision_recall_curve, roc_auc, roc_curve,
    ConfusionMatrix, PrPoint, RocPoint,
};
pub use model::{LinkPredictor, ModelConfig, Parameterized, SageLinkPredictor, TrainStep};
pub use optim::{Adam, AdamConfig};
