//! Message-passing structure
//!
//! A dense, integer-indexed neighbourhood view in Compressed Sparse Row (CSR)
//! form. Every structure edge `(u, v)` is inserted in both directions so the
//! encoder aggregates over an undirected graph.

use crate::error::{GnnError, GnnResult};
use ndarray::{Array2, ArrayView2, Axis};

/// An edge as `(source_index, target_index)`
pub type EdgeIndex = (usize, usize);

/// Undirected CSR adjacency used for mean aggregation
#[derive(Debug, Clone, PartialEq)]
pub struct MessageGraph {
    /// Number of nodes
    pub node_count: usize,
    /// Offsets into `neighbors`. Size = node_count + 1
    pub offsets: Vec<usize>,
    /// Contiguous array of neighbour indices
    pub neighbors: Vec<usize>,
    /// Number of structure edges the graph was built from
    pub edge_count: usize,
}

impl MessageGraph {
    /// Build from a structure edge list, rejecting out-of-range endpoints
    pub fn from_edges(node_count: usize, edges: &[EdgeIndex]) -> GnnResult<Self> {
        let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); node_count];
        for &(u, v) in edges {
            if u >= node_count || v >= node_count {
                return Err(GnnError::NodeOutOfRange {
                    src: u,
                    dst: v,
                    num_nodes: node_count,
                });
            }
            adjacency[u].push(v);
            if u != v {
                adjacency[v].push(u);
            }
        }

        let mut offsets = Vec::with_capacity(node_count + 1);
        let mut neighbors = Vec::with_capacity(edges.len() * 2);
        offsets.push(0);
        for list in adjacency {
            neighbors.extend(list);
            offsets.push(neighbors.len());
        }

        Ok(Self {
            node_count,
            offsets,
            neighbors,
            edge_count: edges.len(),
        })
    }

    /// Degree of a node in the symmetrised graph
    pub fn degree(&self, idx: usize) -> usize {
        self.offsets[idx + 1] - self.offsets[idx]
    }

    /// Neighbours of a node
    pub fn neighbors(&self, idx: usize) -> &[usize] {
        &self.neighbors[self.offsets[idx]..self.offsets[idx + 1]]
    }

    /// Mean of neighbour rows. Isolated nodes aggregate to zero.
    pub fn mean_aggregate(&self, h: ArrayView2<'_, f32>) -> Array2<f32> {
        let mut out = Array2::<f32>::zeros((self.node_count, h.ncols()));
        for i in 0..self.node_count {
            let deg = self.degree(i);
            if deg == 0 {
                continue;
            }
            let scale = 1.0 / deg as f32;
            let mut row = out.row_mut(i);
            for &j in self.neighbors(i) {
                row.scaled_add(scale, &h.row(j));
            }
        }
        out
    }

    /// Transpose of `mean_aggregate`: routes each node's gradient back to its neighbours
    pub fn mean_aggregate_backward(&self, grad_agg: ArrayView2<'_, f32>) -> Array2<f32> {
        let mut out = Array2::<f32>::zeros((self.node_count, grad_agg.ncols()));
        for i in 0..self.node_count {
            let deg = self.degree(i);
            if deg == 0 {
                continue;
            }
            let scale = 1.0 / deg as f32;
            let g = grad_agg.index_axis(Axis(0), i);
            for &j in self.neighbors(i) {
                out.row_mut(j).scaled_add(scale, &g);
            }
        }
        out
    }
}
