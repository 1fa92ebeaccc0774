//! Stage orchestration over the artifact layout
//!
//! Each stage reads its inputs from disk (or takes them in memory), writes
//! its artifacts, and returns the in-memory result so `run` can chain stages
//! without reloading.

use crate::artifacts::{load_bincode, load_json, save_bincode, save_csv, save_json, ArtifactPaths};
use crate::candidates::{CandidateGenerator, CandidateSet};
use crate::config::PipelineConfig;
use crate::data::{load_entities, load_relationships, GraphBundle, GraphTensorBuilder};
use crate::error::MedKgResult;
use crate::evaluate::{EvaluationReport, Evaluator};
use crate::split::{Split, SplitBundle, SplitGenerator, SplitKind, SplitStatistics};
use crate::train::{Checkpoint, EpochMetrics, Trainer, TrainingOutcome};
use std::path::Path;
use tracing::info;

pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    /// Validates the configuration up front
    pub fn new(config: PipelineConfig) -> MedKgResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn paths(&self) -> &ArtifactPaths {
        &self.config.paths
    }

    /// Build the graph bundle from entity and relationship tables and write it with its mapping
    pub fn export(&self, entities: impl AsRef<Path>, relationships: impl AsRef<Path>) -> MedKgResult<GraphBundle> {
        let graph = GraphTensorBuilder::new()
            .with_entities(load_entities(entities)?)
            .with_relationships(load_relationships(relationships)?)
            .build()?;
        save_bincode(self.paths().graph_bundle(), &graph)?;
        save_json(self.paths().graph_mapping(), &graph.mapping())?;
        info!("Graph bundle written to {:?}", self.paths().graph_bundle());
        Ok(graph)
    }

    pub fn load_graph(&self) -> MedKgResult<GraphBundle> {
        let graph: GraphBundle = load_bincode(self.paths().graph_bundle())?;
        graph.validate()?;
        Ok(graph)
    }

    pub fn split(&self, graph: &GraphBundle) -> MedKgResult<SplitBundle> {
        let splits = SplitGenerator::new(self.config.split.clone()).generate(graph)?;
        for kind in SplitKind::ALL {
            save_bincode(self.paths().split(kind), splits.get(kind))?;
        }
        save_json(self.paths().split_statistics(), &splits.statistics())?;
        Ok(splits)
    }

    pub fn load_splits(&self) -> MedKgResult<SplitBundle> {
        let load = |kind: SplitKind| -> MedKgResult<Split> {
            let split: Split = load_bincode(self.paths().split(kind))?;
            split.validate()?;
            Ok(split)
        };
        let stats: SplitStatistics = load_json(self.paths().split_statistics())?;
        Ok(SplitBundle {
            train: load(SplitKind::Train)?,
            val: load(SplitKind::Val)?,
            test: load(SplitKind::Test)?,
            config: stats.parameters,
        })
    }

    /// Train, writing the best checkpoint on every improvement and the history at the end
    pub fn train<F>(&self, graph: &GraphBundle, splits: &SplitBundle, on_epoch: F) -> MedKgResult<TrainingOutcome>
    where
        F: FnMut(&EpochMetrics),
    {
        let mut trainer = Trainer::new(
            self.config.train.clone(),
            self.config.model.clone(),
            graph.features.clone(),
            splits,
        )?
        .with_checkpoint_path(self.paths().checkpoint());
        let outcome = trainer.fit_with(splits, on_epoch)?;
        save_json(self.paths().training_history(), &outcome.history)?;
        Ok(outcome)
    }

    pub fn load_checkpoint(&self) -> MedKgResult<Checkpoint> {
        Checkpoint::load(self.paths().checkpoint())
    }

    pub fn evaluate(&self, graph: &GraphBundle, splits: &SplitBundle, checkpoint: &Checkpoint) -> MedKgResult<EvaluationReport> {
        let report = Evaluator::new(self.config.eval.clone()).evaluate(
            &checkpoint.model,
            graph.features.view(),
            splits,
        )?;
        save_json(self.paths().test_metrics(), &report.metrics)?;
        save_json(self.paths().test_curves(), &report.curves)?;
        Ok(report)
    }

    pub fn predict(&self, graph: &GraphBundle, splits: &SplitBundle, checkpoint: &Checkpoint) -> MedKgResult<CandidateSet> {
        let set = CandidateGenerator::new(self.config.predict.clone()).generate(&checkpoint.model, graph, splits)?;
        save_csv(self.paths().predictions(), &set.candidates)?;
        Ok(set)
    }
}
