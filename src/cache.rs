//! Read-through artifact cache
//!
//! Presentation layers ask for artifacts by path. Each entry remembers the
//! file's modification time and is reloaded when the file changes on disk.
//! Callers invalidate explicitly after they rewrite an artifact in-process.

use crate::artifacts::{load_bincode, load_json, ArtifactPaths};
use crate::data::GraphBundle;
use crate::error::MedKgResult;
use crate::evaluate::TestMetrics;
use crate::train::Checkpoint;
use lru::LruCache;
use medkg_gnn::Parameterized;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::debug;

const DEFAULT_CAPACITY: usize = 16;

struct CacheEntry {
    modified: Option<SystemTime>,
    value: Arc<dyn Any + Send + Sync>,
}

/// Bounded LRU of deserialised artifacts keyed by path
pub struct ArtifactCache {
    entries: LruCache<PathBuf, CacheEntry>,
    hits: u64,
    misses: u64,
}

impl Default for ArtifactCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

fn modified_time(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

impl ArtifactCache {
    /// A capacity of zero is treated as one
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(capacity),
            hits: 0,
            misses: 0,
        }
    }

    /// Return the cached value for `path`, loading it on a miss or when the file changed
    pub fn get_or_load<T, F>(&mut self, path: impl AsRef<Path>, load: F) -> MedKgResult<Arc<T>>
    where
        T: Any + Send + Sync,
        F: FnOnce(&Path) -> MedKgResult<T>,
    {
        let path = path.as_ref();
        let modified = modified_time(path);
        if let Some(entry) = self.entries.get(path) {
            if entry.modified == modified {
                if let Ok(value) = Arc::clone(&entry.value).downcast::<T>() {
                    self.hits += 1;
                    return Ok(value);
                }
            }
        }

        self.misses += 1;
        debug!("Artifact cache miss for {:?}", path);
        let value = Arc::new(load(path)?);
        self.entries.put(
            path.to_path_buf(),
            CacheEntry {
                modified,
                value: value.clone(),
            },
        );
        Ok(value)
    }

    /// Drop one entry. Returns whether it was cached.
    pub fn invalidate(&mut self, path: impl AsRef<Path>) -> bool {
        self.entries.pop(path.as_ref()).is_some()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `(hits, misses)` since creation
    pub fn counters(&self) -> (u64, u64) {
        (self.hits, self.misses)
    }

    pub fn graph(&mut self, paths: &ArtifactPaths) -> MedKgResult<Arc<GraphBundle>> {
        self.get_or_load(paths.graph_bundle(), |p| load_bincode::<GraphBundle>(p))
    }

    pub fn checkpoint(&mut self, paths: &ArtifactPaths) -> MedKgResult<Arc<Checkpoint>> {
        self.get_or_load(paths.checkpoint(), |p| Checkpoint::load(p))
    }

    pub fn test_metrics(&mut self, paths: &ArtifactPaths) -> MedKgResult<Arc<TestMetrics>> {
        self.get_or_load(paths.test_metrics(), |p| load_json::<TestMetrics>(p))
    }
}

/// Summary of the graph bundle for overview pages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphStats {
    pub num_nodes: usize,
    pub num_drugs: usize,
    pub num_diseases: usize,
    pub num_edges: usize,
    /// Known edges over all possible drug × disease pairs
    pub density: f64,
    pub mean_confidence: f64,
    pub high_confidence_edges: usize,
    /// Drugs with the most known edges, most connected first
    pub top_drugs: Vec<(String, usize)>,
}

impl GraphStats {
    pub fn from_bundle(graph: &GraphBundle, top_n: usize) -> Self {
        let possible = graph.num_drugs * graph.num_diseases;
        let mut degree = vec![0usize; graph.num_drugs];
        for &(drug, _) in &graph.edges {
            if let Some(d) = degree.get_mut(drug) {
                *d += 1;
            }
        }
        let mut by_degree: Vec<usize> = (0..graph.num_drugs).filter(|&i| degree[i] > 0).collect();
        by_degree.sort_by(|&a, &b| degree[b].cmp(&degree[a]));
        let top_drugs = by_degree
            .into_iter()
            .take(top_n)
            .filter_map(|i| graph.node(i).map(|(_, meta)| (meta.text.clone(), degree[i])))
            .collect();

        let confidences: Vec<f64> = graph.edge_attr.iter().map(|a| a[0] as f64).collect();
        let mean_confidence = if confidences.is_empty() {
            0.0
        } else {
            confidences.iter().sum::<f64>() / confidences.len() as f64
        };

        Self {
            num_nodes: graph.num_nodes(),
            num_drugs: graph.num_drugs,
            num_diseases: graph.num_diseases,
            num_edges: graph.num_edges(),
            density: if possible == 0 {
                0.0
            } else {
                graph.num_edges() as f64 / possible as f64
            },
            mean_confidence,
            high_confidence_edges: confidences.iter().filter(|&&c| c >= 0.8).count(),
            top_drugs,
        }
    }
}

/// Summary of the trained model and its test results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelStats {
    pub best_epoch: usize,
    pub val_auc: f64,
    pub val_ap: f64,
    pub num_parameters: usize,
    pub test_auc: Option<f64>,
    pub test_ap: Option<f64>,
}

impl ModelStats {
    pub fn new(checkpoint: &Checkpoint, metrics: Option<&TestMetrics>) -> Self {
        Self {
            best_epoch: checkpoint.epoch,
            val_auc: checkpoint.val_auc,
            val_ap: checkpoint.val_ap,
            num_parameters: checkpoint.model.num_parameters(),
            test_auc: metrics.map(|m| m.auc_roc),
            test_ap: metrics.map(|m| m.auc_pr),
        }
    }

    /// Read the checkpoint and, if present, the test metrics through `cache`
    pub fn load(cache: &mut ArtifactCache, paths: &ArtifactPaths) -> MedKgResult<Self> {
        let checkpoint = cache.checkpoint(paths)?;
        let metrics = if paths.test_metrics().exists() {
            Some(cache.test_metrics(paths)?)
        } else {
            None
        };
        Ok(Self::new(&checkpoint, metrics.as_deref()))
    }
}
