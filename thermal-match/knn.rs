//! k-nearest-neighbour search over descriptor sets.
//!
//! Matching only sees the [`NeighborSearch`] trait. Two backends are provided:
//! an exact brute force scan and a forest of randomized kd-trees that bounds the
//! number of distance evaluations per query.

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use thermal_core::{Descriptor, DESCRIPTOR_SIZE};

/// Indexed descriptor found for a query, with its L2 distance
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub index: usize,
    pub distance: f32,
}

/// k-NN over an indexed descriptor set, results closest first
pub trait NeighborSearch: Send + Sync {
    /// Number of indexed descriptors
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Up to `k` neighbours of `query`, closest first
    fn knn(&self, query: &Descriptor, k: usize) -> Vec<Neighbor>;

    /// `knn` for every query, in query order
    fn knn_batch(&self, queries: &[Descriptor], k: usize) -> Vec<Vec<Neighbor>> {
        queries.par_iter().map(|q| self.knn(q, k)).collect()
    }
}

#[inline]
pub fn l2_squared(a: &Descriptor, b: &Descriptor) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Fixed-capacity list of the best candidates seen so far, sorted by squared distance
struct KnnResult {
    k: usize,
    items: Vec<(f32, usize)>,
}

impl KnnResult {
    fn new(k: usize) -> Self {
        Self {
            k,
            items: Vec::with_capacity(k + 1),
        }
    }

    fn is_full(&self) -> bool {
        self.items.len() >= self.k
    }

    fn worst(&self) -> f32 {
        if self.is_full() {
            self.items.last().map(|&(d, _)| d).unwrap_or(f32::INFINITY)
        } else {
            f32::INFINITY
        }
    }

    fn insert(&mut self, dist_sq: f32, index: usize) {
        if self.k == 0 || (self.is_full() && dist_sq >= self.worst()) {
            return;
        }
        // Equal distances keep the lower index first
        let pos = self
            .items
            .partition_point(|&(d, i)| d < dist_sq || (d == dist_sq && i < index));
        self.items.insert(pos, (dist_sq, index));
        self.items.truncate(self.k);
    }

    fn into_neighbors(self) -> Vec<Neighbor> {
        self.items
            .into_iter()
            .map(|(d, index)| Neighbor {
                index,
                distance: d.sqrt(),
            })
            .collect()
    }
}

/// Exact search by scanning every indexed descriptor
#[derive(Debug, Clone)]
pub struct BruteForceIndex {
    points: Vec<Descriptor>,
}

impl BruteForceIndex {
    pub fn new(points: &[Descriptor]) -> Self {
        Self { points: points.to_vec() }
    }
}

impl NeighborSearch for BruteForceIndex {
    fn len(&self) -> usize {
        self.points.len()
    }

    fn knn(&self, query: &Descriptor, k: usize) -> Vec<Neighbor> {
        let mut result = KnnResult::new(k);
        for (i, p) in self.points.iter().enumerate() {
            result.insert(l2_squared(query, p), i);
        }
        result.into_neighbors()
    }
}

/// Points sampled per node when estimating split statistics
const SAMPLE_MEAN: usize = 100;
/// Split dimension is drawn among this many highest-variance dimensions
const RAND_DIM: usize = 5;
/// Maximum points per leaf
const LEAF_SIZE: usize = 4;

#[derive(Debug, Clone)]
enum KdNode {
    Leaf { start: usize, end: usize },
    Split { dim: usize, value: f32, left: usize, right: usize },
}

#[derive(Debug, Clone)]
struct KdTree {
    nodes: Vec<KdNode>,
    /// Point indices, each leaf owns a contiguous range
    order: Vec<usize>,
}

impl KdTree {
    fn build(points: &[Descriptor], rng: &mut ChaCha8Rng) -> Self {
        let mut order: Vec<usize> = (0..points.len()).collect();
        order.shuffle(rng);

        let mut nodes = vec![KdNode::Leaf { start: 0, end: points.len() }];
        let mut stack = vec![(0usize, 0usize, points.len())];

        while let Some((node, start, end)) = stack.pop() {
            if end - start <= LEAF_SIZE {
                nodes[node] = KdNode::Leaf { start, end };
                continue;
            }

            let (dim, value) = Self::choose_split(points, &order[start..end], rng);
            let mid = start + partition_in_place(&mut order[start..end], |&i| points[i][dim] < value);
            if mid == start || mid == end {
                nodes[node] = KdNode::Leaf { start, end };
                continue;
            }

            let left = nodes.len();
            let right = left + 1;
            nodes.push(KdNode::Leaf { start, end: mid });
            nodes.push(KdNode::Leaf { start: mid, end });
            nodes[node] = KdNode::Split { dim, value, left, right };
            stack.push((left, start, mid));
            stack.push((right, mid, end));
        }

        Self { nodes, order }
    }

    /// Mean split on a random dimension among the highest-variance ones
    fn choose_split(points: &[Descriptor], subset: &[usize], rng: &mut ChaCha8Rng) -> (usize, f32) {
        let sample = &subset[..subset.len().min(SAMPLE_MEAN)];
        let count = sample.len() as f32;

        let mut mean = [0.0f32; DESCRIPTOR_SIZE];
        for &i in sample {
            for (m, v) in mean.iter_mut().zip(points[i].iter()) {
                *m += v;
            }
        }
        mean.iter_mut().for_each(|m| *m /= count);

        let mut var = [0.0f32; DESCRIPTOR_SIZE];
        for &i in sample {
            for ((s, v), m) in var.iter_mut().zip(points[i].iter()).zip(mean.iter()) {
                *s += (v - m) * (v - m);
            }
        }

        let mut dims: Vec<usize> = (0..DESCRIPTOR_SIZE).collect();
        dims.sort_by(|&a, &b| var[b].total_cmp(&var[a]).then(a.cmp(&b)));
        let dim = dims[rng.random_range(0..RAND_DIM)];
        (dim, mean[dim])
    }
}

/// Moves elements satisfying `pred` to the front, returning how many did
fn partition_in_place<T>(items: &mut [T], pred: impl Fn(&T) -> bool) -> usize {
    let mut boundary = 0;
    for i in 0..items.len() {
        if pred(&items[i]) {
            items.swap(boundary, i);
            boundary += 1;
        }
    }
    boundary
}

/// Unexplored subtree ordered by its lower distance bound, nearest first
#[derive(Debug, Clone, Copy)]
struct Branch {
    dist: f32,
    tree: usize,
    node: usize,
}

impl Ord for Branch {
    fn cmp(&self, other: &Self) -> Ordering {
        other.dist.total_cmp(&self.dist) // Reverse for min-heap
    }
}

impl PartialOrd for Branch {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Branch {
    fn eq(&self, other: &Self) -> bool {
        self.dist == other.dist
    }
}

impl Eq for Branch {}

/// Per-query traversal state shared by all trees
struct SearchState {
    result: KnnResult,
    heap: BinaryHeap<Branch>,
    visited: Vec<u64>,
    checks: usize,
    max_checks: usize,
}

impl SearchState {
    fn mark_visited(&mut self, index: usize) -> bool {
        let (word, bit) = (index / 64, 1u64 << (index % 64));
        let seen = self.visited[word] & bit != 0;
        self.visited[word] |= bit;
        seen
    }

    fn exhausted(&self) -> bool {
        self.checks >= self.max_checks && self.result.is_full()
    }
}

/// Approximate search over several randomized kd-trees
#[derive(Debug, Clone)]
pub struct KdForestIndex {
    points: Vec<Descriptor>,
    trees: Vec<KdTree>,
    checks: usize,
}

impl KdForestIndex {
    /// Build `trees` randomized trees; `checks` bounds distance evaluations per query
    pub fn new(points: &[Descriptor], trees: usize, checks: usize, seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let trees = (0..trees.max(1)).map(|_| KdTree::build(points, &mut rng)).collect();
        Self {
            points: points.to_vec(),
            trees,
            checks: checks.max(1),
        }
    }

    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }

    fn descend(&self, tree_idx: usize, mut node: usize, mindist: f32, query: &Descriptor, state: &mut SearchState) {
        let tree = &self.trees[tree_idx];
        loop {
            if state.result.is_full() && mindist > state.result.worst() {
                return;
            }
            match tree.nodes[node] {
                KdNode::Leaf { start, end } => {
                    for &i in &tree.order[start..end] {
                        if state.mark_visited(i) {
                            continue;
                        }
                        if state.exhausted() {
                            return;
                        }
                        state.checks += 1;
                        state.result.insert(l2_squared(query, &self.points[i]), i);
                    }
                    return;
                }
                KdNode::Split { dim, value, left, right } => {
                    let diff = query[dim] - value;
                    let (best, other) = if diff < 0.0 { (left, right) } else { (right, left) };
                    let other_dist = mindist + diff * diff;
                    if !state.result.is_full() || other_dist < state.result.worst() {
                        state.heap.push(Branch {
                            dist: other_dist,
                            tree: tree_idx,
                            node: other,
                        });
                    }
                    node = best;
                }
            }
        }
    }
}

impl NeighborSearch for KdForestIndex {
    fn len(&self) -> usize {
        self.points.len()
    }

    fn knn(&self, query: &Descriptor, k: usize) -> Vec<Neighbor> {
        if self.points.is_empty() || k == 0 {
            return Vec::new();
        }

        let mut state = SearchState {
            result: KnnResult::new(k),
            heap: BinaryHeap::new(),
            visited: vec![0; self.points.len().div_ceil(64)],
            checks: 0,
            max_checks: self.checks,
        };

        for t in 0..self.trees.len() {
            self.descend(t, 0, 0.0, query, &mut state);
        }
        while let Some(branch) = state.heap.pop() {
            if state.exhausted() {
                break;
            }
            self.descend(branch.tree, branch.node, branch.dist, query, &mut state);
        }

        state.result.into_neighbors()
    }
}
