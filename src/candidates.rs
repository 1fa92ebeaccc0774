//! Novel drug–disease candidate generation
//!
//! Enumerates every drug × disease pair, drops the ones already known in any
//! split, scores the rest in fixed-size batches against embeddings computed
//! once, and keeps the top K by probability.

use crate::config::PredictConfig;
use crate::data::GraphBundle;
use crate::error::{DataError, MedKgResult};
use crate::split::SplitBundle;
use medkg_gnn::{sigmoid, EdgeIndex, MessageGraph, Mode, SageLinkPredictor};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// One ranked prediction, also the CSV row of `novel_predictions.csv`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// 1-based, contiguous
    pub rank: usize,
    pub drug: String,
    pub drug_id: String,
    pub disease: String,
    pub disease_id: String,
    pub probability: f32,
    pub drug_frequency: f64,
    pub disease_frequency: f64,
    pub drug_num_papers: f64,
    pub disease_num_papers: f64,
}

/// Candidate counts by probability band
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfidenceTiers {
    /// probability >= 0.8
    pub high: usize,
    /// 0.6 <= probability < 0.8
    pub medium: usize,
    /// probability < 0.6
    pub lower: usize,
}

impl ConfidenceTiers {
    pub fn from_probabilities(probs: impl IntoIterator<Item = f32>) -> Self {
        let mut tiers = Self::default();
        for p in probs {
            if p >= 0.8 {
                tiers.high += 1;
            } else if p >= 0.6 {
                tiers.medium += 1;
            } else {
                tiers.lower += 1;
            }
        }
        tiers
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CandidateSet {
    pub candidates: Vec<Candidate>,
    /// Unknown pairs that were scored
    pub scored_pairs: usize,
    /// Pairs skipped because they are known positives
    pub excluded_known: usize,
    pub tiers: ConfidenceTiers,
}

/// Indices of the `top_k` highest probabilities. Equal probabilities keep input order.
pub fn rank_top_k(probs: &[f32], top_k: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..probs.len()).collect();
    order.sort_by(|&a, &b| probs[b].total_cmp(&probs[a]));
    order.truncate(top_k);
    order
}

/// Every `(drug, disease)` pair not in `known`, drug-index major
pub fn unknown_pairs(graph: &GraphBundle, known: &FxHashSet<EdgeIndex>) -> Vec<EdgeIndex> {
    graph
        .drug_indices()
        .flat_map(|drug| graph.disease_indices().map(move |disease| (drug, disease)))
        .filter(|pair| !known.contains(pair))
        .collect()
}

#[derive(Debug, Clone, Default)]
pub struct CandidateGenerator {
    config: PredictConfig,
}

impl CandidateGenerator {
    pub fn new(config: PredictConfig) -> Self {
        Self { config }
    }

    /// Probabilities for `pairs`, scored `batch_size` at a time over one set of embeddings
    pub fn score_pairs(
        &self,
        model: &SageLinkPredictor,
        graph: &GraphBundle,
        structure: &MessageGraph,
        pairs: &[EdgeIndex],
    ) -> MedKgResult<Vec<f32>> {
        let z = model.encode(graph.features.view(), structure, &mut Mode::Eval)?;
        let batch_size = self.config.batch_size.max(1);
        let mut probs = Vec::with_capacity(pairs.len());
        for (i, batch) in pairs.chunks(batch_size).enumerate() {
            let logits = model.decode(z.view(), batch, &mut Mode::Eval)?;
            probs.extend(logits.iter().map(|&l| sigmoid(l)));
            debug!("Scored batch {} ({} pairs)", i + 1, batch.len());
        }
        Ok(probs)
    }

    pub fn generate(
        &self,
        model: &SageLinkPredictor,
        graph: &GraphBundle,
        splits: &SplitBundle,
    ) -> MedKgResult<CandidateSet> {
        graph.validate()?;
        let mut known = graph.known_edge_set();
        known.extend(splits.all_positive_edges());

        let structure = MessageGraph::from_edges(graph.num_nodes(), splits.structure_edges())?;
        let pairs = unknown_pairs(graph, &known);
        let total = graph.num_drugs * graph.num_diseases;
        info!(
            "Scoring {} unknown pairs ({} known excluded)",
            pairs.len(),
            total - pairs.len()
        );

        let probs = self.score_pairs(model, graph, &structure, &pairs)?;
        let top = rank_top_k(&probs, self.config.top_k);

        let mut candidates = Vec::with_capacity(top.len());
        for (rank, &i) in top.iter().enumerate() {
            let (drug, disease) = pairs[i];
            let (drug_id, drug_meta) = graph.node(drug).ok_or(DataError::ShapeMismatch {
                what: "drug index",
                expected: graph.num_nodes(),
                got: drug,
            })?;
            let (disease_id, disease_meta) = graph.node(disease).ok_or(DataError::ShapeMismatch {
                what: "disease index",
                expected: graph.num_nodes(),
                got: disease,
            })?;
            candidates.push(Candidate {
                rank: rank + 1,
                drug: drug_meta.text.clone(),
                drug_id: drug_id.clone(),
                disease: disease_meta.text.clone(),
                disease_id: disease_id.clone(),
                probability: probs[i],
                drug_frequency: drug_meta.frequency,
                disease_frequency: disease_meta.frequency,
                drug_num_papers: drug_meta.num_papers,
                disease_num_papers: disease_meta.num_papers,
            });
        }

        let tiers = ConfidenceTiers::from_probabilities(candidates.iter().map(|c| c.probability));
        if let (Some(first), Some(last)) = (candidates.first(), candidates.last()) {
            info!(
                "Generated {} candidates, probability range [{:.4}, {:.4}]",
                candidates.len(),
                last.probability,
                first.probability
            );
        }

        Ok(CandidateSet {
            candidates,
            scored_pairs: pairs.len(),
            excluded_known: total - pairs.len(),
            tiers,
        })
    }
}
