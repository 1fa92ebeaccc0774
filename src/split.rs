//! Train/val/test split generation
//!
//! Positive edges are partitioned once with a seeded shuffle. Each split then
//! receives its own rejection-sampled negatives, never drawn from the global
//! positive set and never repeated within the split, before a seeded
//! permutation interleaves positives and negatives.
//!
//! The train split's positives are kept separately as the message-passing
//! structure. Val and test positives never enter it.

use crate::config::SplitConfig;
use crate::data::GraphBundle;
use crate::error::{DataError, MedKgResult};
use medkg_gnn::EdgeIndex;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SplitKind {
    Train,
    Val,
    Test,
}

impl SplitKind {
    pub const ALL: [SplitKind; 3] = [SplitKind::Train, SplitKind::Val, SplitKind::Test];

    pub fn as_str(&self) -> &'static str {
        match self {
            SplitKind::Train => "train",
            SplitKind::Val => "val",
            SplitKind::Test => "test",
        }
    }

    /// Offset added to the base seed when drawing this split's negatives
    fn seed_offset(&self) -> u64 {
        match self {
            SplitKind::Train => 0,
            SplitKind::Val => 1,
            SplitKind::Test => 2,
        }
    }
}

impl fmt::Display for SplitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One labelled split
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Split {
    pub kind: SplitKind,
    /// Query edges, positives and negatives interleaved
    pub edges: Vec<EdgeIndex>,
    /// Parallel to `edges`: 1.0 positive, 0.0 negative
    pub labels: Vec<f32>,
    /// This split's positives in partition order
    pub positive_edges: Vec<EdgeIndex>,
    pub num_pos: usize,
    pub num_neg: usize,
}

impl Split {
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn negative_edges(&self) -> impl Iterator<Item = EdgeIndex> + '_ {
        self.edges
            .iter()
            .zip(&self.labels)
            .filter(|(_, y)| **y < 0.5)
            .map(|(&e, _)| e)
    }

    pub fn counts(&self) -> SplitCounts {
        let total = self.len();
        SplitCounts {
            total,
            positive: self.num_pos,
            negative: self.num_neg,
            pos_ratio: if total == 0 {
                0.0
            } else {
                self.num_pos as f64 / total as f64
            },
        }
    }

    pub fn validate(&self) -> Result<(), DataError> {
        if self.labels.len() != self.edges.len() {
            return Err(DataError::ShapeMismatch {
                what: "split labels",
                expected: self.edges.len(),
                got: self.labels.len(),
            });
        }
        if self.num_pos + self.num_neg != self.edges.len() {
            return Err(DataError::ShapeMismatch {
                what: "split counts",
                expected: self.edges.len(),
                got: self.num_pos + self.num_neg,
            });
        }
        Ok(())
    }
}

/// All three splits plus the shared message-passing structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitBundle {
    pub train: Split,
    pub val: Split,
    pub test: Split,
    pub config: SplitConfig,
}

impl SplitBundle {
    pub fn get(&self, kind: SplitKind) -> &Split {
        match kind {
            SplitKind::Train => &self.train,
            SplitKind::Val => &self.val,
            SplitKind::Test => &self.test,
        }
    }

    /// The only edges ever handed to the encoder: the train split's positives
    pub fn structure_edges(&self) -> &[EdgeIndex] {
        &self.train.positive_edges
    }

    /// Positives of every split
    pub fn all_positive_edges(&self) -> FxHashSet<EdgeIndex> {
        SplitKind::ALL
            .iter()
            .flat_map(|&k| self.get(k).positive_edges.iter().copied())
            .collect()
    }

    pub fn statistics(&self) -> SplitStatistics {
        SplitStatistics {
            train: self.train.counts(),
            val: self.val.counts(),
            test: self.test.counts(),
            parameters: self.config.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SplitCounts {
    pub total: usize,
    pub positive: usize,
    pub negative: usize,
    pub pos_ratio: f64,
}

/// Exported as `split_statistics.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitStatistics {
    pub train: SplitCounts,
    pub val: SplitCounts,
    pub test: SplitCounts,
    pub parameters: SplitConfig,
}

/// Result of one negative sampling call
#[derive(Debug, Clone, PartialEq)]
pub struct NegativeSample {
    pub pairs: Vec<EdgeIndex>,
    pub requested: usize,
    /// Retry budget ran out before `requested` pairs were found
    pub shortfall: bool,
}

/// Draw up to `count` distinct `(drug, disease)` pairs absent from `positives`.
///
/// Each attempt picks a drug and a disease uniformly. At most
/// `retry_factor * count` attempts are made; running out is logged, not fatal.
pub fn sample_negatives(
    drugs: Range<usize>,
    diseases: Range<usize>,
    count: usize,
    positives: &FxHashSet<EdgeIndex>,
    retry_factor: usize,
    seed: u64,
) -> NegativeSample {
    let mut pairs = Vec::with_capacity(count);
    if count == 0 {
        return NegativeSample {
            pairs,
            requested: 0,
            shortfall: false,
        };
    }

    if !drugs.is_empty() && !diseases.is_empty() {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut drawn: FxHashSet<EdgeIndex> = FxHashSet::default();
        let max_attempts = count.saturating_mul(retry_factor);
        let mut attempts = 0;
        while pairs.len() < count && attempts < max_attempts {
            attempts += 1;
            let pair = (rng.gen_range(drugs.clone()), rng.gen_range(diseases.clone()));
            if positives.contains(&pair) || !drawn.insert(pair) {
                continue;
            }
            pairs.push(pair);
        }
    }

    let shortfall = pairs.len() < count;
    if shortfall {
        warn!(
            "Negative sampling shortfall: found {} of {} requested pairs",
            pairs.len(),
            count
        );
    }
    NegativeSample {
        pairs,
        requested: count,
        shortfall,
    }
}

/// Partitions positives and attaches negatives
#[derive(Debug, Clone, Default)]
pub struct SplitGenerator {
    config: SplitConfig,
}

impl SplitGenerator {
    pub fn new(config: SplitConfig) -> Self {
        Self { config }
    }

    pub fn generate(&self, graph: &GraphBundle) -> MedKgResult<SplitBundle> {
        self.generate_from_edges(&graph.edges, graph.drug_indices(), graph.disease_indices())
    }

    pub fn generate_from_edges(
        &self,
        positives: &[EdgeIndex],
        drugs: Range<usize>,
        diseases: Range<usize>,
    ) -> MedKgResult<SplitBundle> {
        self.config.validate()?;
        let global: FxHashSet<EdgeIndex> = positives.iter().copied().collect();

        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let mut shuffled = positives.to_vec();
        shuffled.shuffle(&mut rng);

        let n = shuffled.len();
        let n_train = (((n as f64 * self.config.train_ratio) + 1e-9).floor() as usize).min(n);
        // val and test share the remainder in proportion to their ratios
        let rest = n - n_train;
        let held_out = self.config.val_ratio + self.config.test_ratio;
        let n_val = if held_out > 0.0 {
            (((rest as f64 * self.config.val_ratio / held_out) + 1e-9).floor() as usize).min(rest)
        } else {
            0
        };
        let test_pos = shuffled.split_off(n_train + n_val);
        let val_pos = shuffled.split_off(n_train);
        let train_pos = shuffled;

        let mut build = |kind: SplitKind, pos: Vec<EdgeIndex>| -> Split {
            let requested = (pos.len() as f64 * self.config.neg_ratio).floor() as usize;
            let negatives = sample_negatives(
                drugs.clone(),
                diseases.clone(),
                requested,
                &global,
                self.config.retry_factor,
                self.config.seed.wrapping_add(kind.seed_offset()),
            );
            let num_pos = pos.len();
            let num_neg = negatives.pairs.len();

            let mut rows: Vec<(EdgeIndex, f32)> = pos
                .iter()
                .map(|&e| (e, 1.0))
                .chain(negatives.pairs.into_iter().map(|e| (e, 0.0)))
                .collect();
            rows.shuffle(&mut rng);
            let (edges, labels): (Vec<EdgeIndex>, Vec<f32>) = rows.into_iter().unzip();

            Split {
                kind,
                edges,
                labels,
                positive_edges: pos,
                num_pos,
                num_neg,
            }
        };

        let train = build(SplitKind::Train, train_pos);
        let val = build(SplitKind::Val, val_pos);
        let test = build(SplitKind::Test, test_pos);

        for split in [&train, &val, &test] {
            info!(
                "{} split: {} positives, {} negatives",
                split.kind, split.num_pos, split.num_neg
            );
        }

        Ok(SplitBundle {
            train,
            val,
            test,
            config: self.config.clone(),
        })
    }
}
