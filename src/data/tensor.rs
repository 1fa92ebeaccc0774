//! Graph tensor builder
//!
//! Turns entity and relationship records into the numeric substrate every
//! later stage consumes: a frozen node index space (drug block first, then
//! disease block, each in input order), a z-score normalised feature matrix
//! and a drug→disease edge list.

use crate::data::records::{EntityRecord, EntityType, RelationshipRecord};
use crate::error::{DataError, DataResult};
use indexmap::IndexMap;
use medkg_gnn::EdgeIndex;
use ndarray::Array2;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::Range;
use tracing::{debug, info, warn};

/// Columns of the node feature matrix
pub const FEATURE_NAMES: [&str; 2] = ["frequency", "num_papers"];

/// Per-node metadata kept alongside the normalised features
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeMeta {
    pub text: String,
    pub entity_type: EntityType,
    /// Raw, un-normalised frequency
    pub frequency: f64,
    /// Raw, un-normalised paper count
    pub num_papers: f64,
}

/// Frozen graph snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphBundle {
    /// Entity id → metadata. Insertion order is the node index.
    pub nodes: IndexMap<String, NodeMeta>,
    /// Normalised features `[N, F]`
    pub features: Array2<f32>,
    pub feature_mean: Vec<f32>,
    pub feature_std: Vec<f32>,
    /// Known positive edges, always `(drug_index, disease_index)`
    pub edges: Vec<EdgeIndex>,
    /// `[confidence, num_papers]` per edge
    pub edge_attr: Vec<[f32; 2]>,
    pub num_drugs: usize,
    pub num_diseases: usize,
    /// Relationships dropped for referencing unknown entities
    pub dropped_relationships: usize,
}

impl GraphBundle {
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    pub fn drug_indices(&self) -> Range<usize> {
        0..self.num_drugs
    }

    pub fn disease_indices(&self) -> Range<usize> {
        self.num_drugs..self.num_drugs + self.num_diseases
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.nodes.get_index_of(id)
    }

    pub fn node(&self, idx: usize) -> Option<(&String, &NodeMeta)> {
        self.nodes.get_index(idx)
    }

    /// Every known positive pair
    pub fn known_edge_set(&self) -> FxHashSet<EdgeIndex> {
        self.edges.iter().copied().collect()
    }

    /// Check internal consistency after loading from disk
    pub fn validate(&self) -> DataResult<()> {
        let n = self.num_nodes();
        if self.features.nrows() != n {
            return Err(DataError::ShapeMismatch {
                what: "feature rows",
                expected: n,
                got: self.features.nrows(),
            });
        }
        if self.edge_attr.len() != self.edges.len() {
            return Err(DataError::ShapeMismatch {
                what: "edge attributes",
                expected: self.edges.len(),
                got: self.edge_attr.len(),
            });
        }
        if self.num_drugs + self.num_diseases != n {
            return Err(DataError::ShapeMismatch {
                what: "drug and disease blocks",
                expected: n,
                got: self.num_drugs + self.num_diseases,
            });
        }
        for &(s, d) in &self.edges {
            if !self.drug_indices().contains(&s) || !self.disease_indices().contains(&d) {
                return Err(DataError::ShapeMismatch {
                    what: "edge endpoint",
                    expected: n,
                    got: s.max(d),
                });
            }
        }
        Ok(())
    }

    /// Human-readable index map and counts
    pub fn mapping(&self) -> GraphMapping {
        let idx_to_node = self
            .nodes
            .iter()
            .enumerate()
            .map(|(idx, (id, meta))| {
                (
                    idx,
                    MappedNode {
                        id: id.clone(),
                        name: meta.text.clone(),
                        node_type: meta.entity_type,
                    },
                )
            })
            .collect();
        GraphMapping {
            idx_to_node,
            statistics: GraphCounts {
                total_nodes: self.num_nodes(),
                num_drugs: self.num_drugs,
                num_diseases: self.num_diseases,
                total_edges: self.num_edges(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappedNode {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: EntityType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphCounts {
    pub total_nodes: usize,
    pub num_drugs: usize,
    pub num_diseases: usize,
    pub total_edges: usize,
}

/// Exported next to the bundle for downstream presentation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphMapping {
    pub idx_to_node: BTreeMap<usize, MappedNode>,
    pub statistics: GraphCounts,
}

/// Builds a [`GraphBundle`] from typed records
#[derive(Debug, Default)]
pub struct GraphTensorBuilder {
    entities: Vec<EntityRecord>,
    relationships: Vec<RelationshipRecord>,
    strict: bool,
}

impl GraphTensorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entities(mut self, entities: impl IntoIterator<Item = EntityRecord>) -> Self {
        self.entities.extend(entities);
        self
    }

    pub fn with_relationships(mut self, relationships: impl IntoIterator<Item = RelationshipRecord>) -> Self {
        self.relationships.extend(relationships);
        self
    }

    /// Fail on the first relationship with an unknown endpoint instead of dropping it
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn build(self) -> DataResult<GraphBundle> {
        let mut nodes: IndexMap<String, NodeMeta> = IndexMap::new();
        let mut num_drugs = 0;
        let mut num_diseases = 0;

        for block in [EntityType::Drug, EntityType::Disease] {
            for entity in self.entities.iter().filter(|e| e.entity_type == block) {
                if nodes.contains_key(&entity.id) {
                    warn!("Duplicate entity id '{}' ignored", entity.id);
                    continue;
                }
                nodes.insert(
                    entity.id.clone(),
                    NodeMeta {
                        text: entity.text.clone(),
                        entity_type: entity.entity_type,
                        frequency: entity.frequency,
                        num_papers: entity.num_papers,
                    },
                );
                match block {
                    EntityType::Drug => num_drugs += 1,
                    EntityType::Disease => num_diseases += 1,
                }
            }
        }

        if num_drugs == 0 {
            return Err(DataError::EmptyGraph("no drug entities"));
        }
        if num_diseases == 0 {
            return Err(DataError::EmptyGraph("no disease entities"));
        }

        let (features, feature_mean, feature_std) = normalized_features(&nodes);

        let mut edges = Vec::with_capacity(self.relationships.len());
        let mut edge_attr = Vec::with_capacity(self.relationships.len());
        let mut seen: FxHashSet<EdgeIndex> = FxHashSet::default();
        let mut dropped = 0;

        for rel in &self.relationships {
            rel.validate()?;
            let drug = lookup(&nodes, &rel.drug_id, EntityType::Drug);
            let disease = lookup(&nodes, &rel.disease_id, EntityType::Disease);
            let (drug, disease) = match (drug, disease) {
                (Some(s), Some(d)) => (s, d),
                (s, _) => {
                    let err = if s.is_none() {
                        DataError::UnknownEntity {
                            role: "drug",
                            id: rel.drug_id.clone(),
                        }
                    } else {
                        DataError::UnknownEntity {
                            role: "disease",
                            id: rel.disease_id.clone(),
                        }
                    };
                    if self.strict {
                        return Err(err);
                    }
                    warn!("Dropping relationship: {}", err);
                    dropped += 1;
                    continue;
                }
            };
            if !seen.insert((drug, disease)) {
                debug!("Duplicate relationship {} -> {} ignored", rel.drug_id, rel.disease_id);
                continue;
            }
            edges.push((drug, disease));
            edge_attr.push([rel.confidence as f32, rel.num_papers as f32]);
        }

        info!(
            "Built graph: {} nodes ({} drugs, {} diseases), {} edges, {} dropped",
            nodes.len(),
            num_drugs,
            num_diseases,
            edges.len(),
            dropped
        );

        Ok(GraphBundle {
            nodes,
            features,
            feature_mean,
            feature_std,
            edges,
            edge_attr,
            num_drugs,
            num_diseases,
            dropped_relationships: dropped,
        })
    }
}

/// Index of `id` if it exists with the expected type
fn lookup(nodes: &IndexMap<String, NodeMeta>, id: &str, expected: EntityType) -> Option<usize> {
    nodes
        .get_full(id)
        .filter(|(_, _, meta)| meta.entity_type == expected)
        .map(|(idx, _, _)| idx)
}

/// Z-score each column over the whole node population. A zero std leaves the column centred only.
fn normalized_features(nodes: &IndexMap<String, NodeMeta>) -> (Array2<f32>, Vec<f32>, Vec<f32>) {
    let n = nodes.len();
    let raw: Vec<[f64; 2]> = nodes.values().map(|m| [m.frequency, m.num_papers]).collect();

    let mut mean = [0.0f64; 2];
    let mut std = [0.0f64; 2];
    for col in 0..FEATURE_NAMES.len() {
        mean[col] = raw.iter().map(|r| r[col]).sum::<f64>() / n as f64;
        let var = raw.iter().map(|r| (r[col] - mean[col]).powi(2)).sum::<f64>() / n as f64;
        std[col] = var.sqrt();
        if std[col] == 0.0 {
            std[col] = 1.0;
        }
    }

    let features = Array2::from_shape_fn((n, FEATURE_NAMES.len()), |(i, j)| {
        ((raw[i][j] - mean[j]) / std[j]) as f32
    });
    (
        features,
        mean.iter().map(|&m| m as f32).collect(),
        std.iter().map(|&s| s as f32).collect(),
    )
}
