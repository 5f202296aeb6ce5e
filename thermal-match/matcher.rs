use log::debug;
use thermal_core::{Descriptor, Match};

use crate::error::{MatchError, MatchResult};
use crate::knn::{BruteForceIndex, KdForestIndex, Neighbor, NeighborSearch};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Nearest-neighbour structure used for matching
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", rename_all = "snake_case"))]
pub enum SearchBackend {
    /// Exact search
    BruteForce,
    /// Randomized kd-trees with a bounded number of distance evaluations
    KdForest { trees: usize, checks: usize },
}

impl Default for SearchBackend {
    fn default() -> Self {
        SearchBackend::KdForest { trees: 5, checks: 50 }
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct MatchConfig {
    /// Keep a match only when best < ratio * second best
    pub ratio: f32,
    pub backend: SearchBackend,
    /// Seed for the randomized index build
    pub seed: u64,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            ratio: 0.8,
            backend: SearchBackend::default(),
            seed: 0,
        }
    }
}

impl MatchConfig {
    pub fn validate(&self) -> MatchResult<()> {
        if !self.ratio.is_finite() || self.ratio <= 0.0 || self.ratio > 1.0 {
            return Err(MatchError::InvalidConfig(format!(
                "ratio must be in (0, 1], got {}",
                self.ratio
            )));
        }
        if let SearchBackend::KdForest { trees, checks } = self.backend {
            if trees == 0 || checks == 0 {
                return Err(MatchError::InvalidConfig(format!(
                    "kd forest needs at least one tree and one check, got trees={} checks={}",
                    trees, checks
                )));
            }
        }
        Ok(())
    }

    pub fn summary(&self) -> String {
        let backend = match self.backend {
            SearchBackend::BruteForce => "brute-force".to_string(),
            SearchBackend::KdForest { trees, checks } => format!("kd-forest(trees={}, checks={})", trees, checks),
        };
        format!("MatchConfig: ratio={}, backend={}, seed={}", self.ratio, backend, self.seed)
    }
}

/// Lowe's ratio test over per-query neighbour lists.
///
/// Query `q` survives when its closest neighbour is strictly closer than
/// `ratio` times the second closest. Queries with fewer than two neighbours are dropped.
pub fn ratio_test(neighbors: &[Vec<Neighbor>], ratio: f32) -> Vec<Match> {
    neighbors
        .iter()
        .enumerate()
        .filter_map(|(query_idx, nn)| match nn.as_slice() {
            [best, second, ..] if best.distance < ratio * second.distance => Some(Match {
                query_idx,
                train_idx: best.index,
                distance: best.distance,
            }),
            _ => None,
        })
        .collect()
}

/// Thermal-to-reference descriptor matcher
#[derive(Debug, Clone)]
pub struct DescriptorMatcher {
    config: MatchConfig,
}

impl DescriptorMatcher {
    pub fn new(config: MatchConfig) -> MatchResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    /// Index the train set with the configured backend
    pub fn build_index(&self, train: &[Descriptor]) -> Box<dyn NeighborSearch> {
        match self.config.backend {
            SearchBackend::BruteForce => Box::new(BruteForceIndex::new(train)),
            SearchBackend::KdForest { trees, checks } => {
                Box::new(KdForestIndex::new(train, trees, checks, self.config.seed))
            }
        }
    }

    /// Match thermal descriptors (queries) against reference descriptors (train)
    pub fn match_descriptors(&self, thermal: &[Descriptor], reference: &[Descriptor]) -> Vec<Match> {
        if thermal.is_empty() || reference.is_empty() {
            return Vec::new();
        }
        let index = self.build_index(reference);
        self.match_with_index(index.as_ref(), thermal)
    }

    /// Match against a prebuilt index
    pub fn match_with_index(&self, index: &dyn NeighborSearch, queries: &[Descriptor]) -> Vec<Match> {
        let neighbors = index.knn_batch(queries, 2);
        let matches = ratio_test(&neighbors, self.config.ratio);
        debug!(
            "ratio test kept {} of {} queries against {} indexed descriptors",
            matches.len(),
            queries.len(),
            index.len()
        );
        matches
    }
}
