//! Medical knowledge graph drug repurposing
//!
//! Predicts novel drug–disease treatment links from a literature-derived
//! knowledge graph.
//!
//! # Pipeline
//!
//! 1. [`data::GraphTensorBuilder`] freezes entities and relationships into a
//!    node index space, a normalised feature matrix and an edge list.
//! 2. [`split::SplitGenerator`] partitions known edges into train/val/test and
//!    attaches rejection-sampled negatives.
//! 3. [`train::Trainer`] fits a GraphSAGE + MLP link predictor, message passing
//!    only over train positives, keeping the best checkpoint by val AUC.
//! 4. [`evaluate::Evaluator`] reports test metrics and Precision@K.
//! 5. [`candidates::CandidateGenerator`] scores every unknown drug × disease
//!    pair and ranks the top K.
//!
//! ## Example Usage
//!
//! ```rust
//! use medkg::data::{EntityRecord, EntityType, GraphTensorBuilder, RelationshipRecord};
//!
//! let graph = GraphTensorBuilder::new()
//!     .with_entities(vec![
//!         EntityRecord::new("CHEM_1", "metformin", EntityType::Drug, 12.0, 4.0),
//!         EntityRecord::new("DIS_1", "diabetes", EntityType::Disease, 30.0, 9.0),
//!     ])
//!     .with_relationships(vec![RelationshipRecord::new("CHEM_1", "DIS_1", 0.9, 3.0)])
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(graph.num_nodes(), 2);
//! assert_eq!(graph.edges, vec![(0, 1)]);
//! ```

pub mod artifacts;
pub mod cache;
pub mod candidates;
pub mod config;
pub mod data;
pub mod error;
pub mod evaluate;
pub mod pipeline;
pub mod split;
pub mod train;

pub use artifacts::ArtifactPaths;
pub use cache::{ArtifactCache, GraphStats, ModelStats};
pub use candidates::{Candidate, CandidateGenerator, CandidateSet, ConfidenceTiers};
pub use config::{EvalConfig, PipelineConfig, PredictConfig, SplitConfig, TrainConfig};
pub use data::{EntityRecord, EntityType, GraphBundle, GraphTensorBuilder, RelationshipRecord};
pub use error::{ConfigError, DataError, MedKgError, MedKgResult};
pub use evaluate::{EvaluationReport, Evaluator, TestCurves, TestMetrics};
pub use pipeline::Pipeline;
pub use split::{sample_negatives, NegativeSample, Split, SplitBundle, SplitGenerator, SplitKind, SplitStatistics};
pub use train::{Checkpoint, EpochMetrics, Trainer, TrainingHistory, TrainingOutcome, TrainingSummary};

pub use medkg_gnn::{AdamConfig, ModelConfig, SageLinkPredictor};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
