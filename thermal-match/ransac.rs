use log::debug;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use thermal_core::Homography;

use crate::error::{MatchError, MatchResult};
use crate::homography::{dlt, first_non_finite, has_collinear_triple, orientation, reprojection_error, Point2};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Correspondences per minimal homography sample
pub const SAMPLE_SIZE: usize = 4;

/// Draws per hypothesis before giving up on finding a non-degenerate sample
const MAX_SAMPLE_ATTEMPTS: usize = 300;

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct RansacConfig {
    /// Maximum reprojection error in reference pixels for an inlier
    pub inlier_threshold: f64,
    pub max_iterations: usize,
    /// Probability of drawing at least one all-inlier sample
    pub confidence: f64,
    /// Fewest inliers accepted as consensus (never below four)
    pub min_inliers: usize,
    /// Fixed seed for reproducible runs; `None` seeds from the OS
    pub seed: Option<u64>,
    /// Re-fit on all inliers of the best hypothesis
    pub refine: bool,
}

impl Default for RansacConfig {
    fn default() -> Self {
        Self {
            inlier_threshold: 5.0,
            max_iterations: 2000,
            confidence: 0.995,
            min_inliers: 8,
            seed: Some(0),
            refine: true,
        }
    }
}

impl RansacConfig {
    pub fn validate(&self) -> MatchResult<()> {
        if !self.inlier_threshold.is_finite() || self.inlier_threshold <= 0.0 {
            return Err(MatchError::InvalidConfig(format!(
                "inlier_threshold must be positive, got {}",
                self.inlier_threshold
            )));
        }
        if self.max_iterations == 0 {
            return Err(MatchError::InvalidConfig("max_iterations must be at least 1".to_string()));
        }
        if !(self.confidence > 0.0 && self.confidence < 1.0) {
            return Err(MatchError::InvalidConfig(format!(
                "confidence must be in (0, 1), got {}",
                self.confidence
            )));
        }
        Ok(())
    }

    pub fn summary(&self) -> String {
        format!(
            "RansacConfig: threshold={}px, max_iterations={}, confidence={}, min_inliers={}, seed={}, refine={}",
            self.inlier_threshold,
            self.max_iterations,
            self.confidence,
            self.required_inliers(),
            self.seed.map_or_else(|| "os".to_string(), |s| s.to_string()),
            self.refine
        )
    }

    pub fn required_inliers(&self) -> usize {
        self.min_inliers.max(SAMPLE_SIZE)
    }
}

/// Winning model with the indices of the correspondences that support it
#[derive(Debug, Clone, PartialEq)]
pub struct RansacResult {
    pub homography: Homography,
    pub inliers: Vec<usize>,
    pub iterations: usize,
}

impl RansacResult {
    pub fn inlier_count(&self) -> usize {
        self.inliers.len()
    }
}

/// Robust estimation of a thermal-to-reference transform
pub trait GeometryEstimator: Send + Sync {
    fn estimate(&self, src: &[Point2], dst: &[Point2]) -> MatchResult<RansacResult>;
}

/// RANSAC homography estimator
#[derive(Debug, Clone)]
pub struct RansacEstimator {
    config: RansacConfig,
}

impl RansacEstimator {
    pub fn new(config: RansacConfig) -> MatchResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &RansacConfig {
        &self.config
    }

    fn rng(&self) -> ChaCha8Rng {
        match self.config.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_os_rng(),
        }
    }

    fn inliers_of(&self, h: &Homography, src: &[Point2], dst: &[Point2]) -> Vec<usize> {
        (0..src.len())
            .filter(|&i| reprojection_error(h, src[i], dst[i]) <= self.config.inlier_threshold)
            .collect()
    }

    /// Draw a minimal sample whose point configuration can define a homography
    fn draw_sample<R: Rng>(
        &self,
        rng: &mut R,
        src: &[Point2],
        dst: &[Point2],
        sample: &mut Vec<usize>,
    ) -> Option<([Point2; SAMPLE_SIZE], [Point2; SAMPLE_SIZE])> {
        for _ in 0..MAX_SAMPLE_ATTEMPTS {
            random_sample_into(rng, src.len(), SAMPLE_SIZE, sample);
            let s: [Point2; SAMPLE_SIZE] = std::array::from_fn(|i| src[sample[i]]);
            let d: [Point2; SAMPLE_SIZE] = std::array::from_fn(|i| dst[sample[i]]);
            if has_collinear_triple(&s) || has_collinear_triple(&d) {
                continue;
            }
            if !consistent_orientation(&s, &d) {
                continue;
            }
            return Some((s, d));
        }
        None
    }
}

impl Default for RansacEstimator {
    fn default() -> Self {
        Self {
            config: RansacConfig::default(),
        }
    }
}

impl GeometryEstimator for RansacEstimator {
    fn estimate(&self, src: &[Point2], dst: &[Point2]) -> MatchResult<RansacResult> {
        if src.len() != dst.len() {
            return Err(MatchError::MismatchedPoints {
                src: src.len(),
                dst: dst.len(),
            });
        }
        let n = src.len();
        if n < SAMPLE_SIZE {
            return Err(MatchError::InsufficientPoints {
                found: n,
                required: SAMPLE_SIZE,
            });
        }

        if let Some(index) = first_non_finite(src).or_else(|| first_non_finite(dst)) {
            return Err(MatchError::NonFinitePoint { index });
        }

        let required = self.config.required_inliers();
        let mut rng = self.rng();
        let mut sample = Vec::with_capacity(SAMPLE_SIZE);
        let mut best: Option<(Homography, Vec<usize>)> = None;
        let mut budget = self.config.max_iterations;
        let mut iterations = 0;

        while iterations < budget {
            iterations += 1;
            let Some((s, d)) = self.draw_sample(&mut rng, src, dst, &mut sample) else {
                break;
            };
            let Some(h) = dlt(&s, &d) else {
                continue;
            };
            let inliers = self.inliers_of(&h, src, dst);
            if best.as_ref().is_some_and(|(_, b)| b.len() >= inliers.len()) {
                continue;
            }
            let ratio = inliers.len() as f64 / n as f64;
            budget = budget.min(adaptive_iterations(ratio, SAMPLE_SIZE, self.config.confidence).max(1));
            best = Some((h, inliers));
        }

        let Some((mut homography, mut inliers)) = best else {
            return Err(MatchError::NoConsensus {
                best_inliers: 0,
                required,
            });
        };
        if inliers.len() < required {
            return Err(MatchError::NoConsensus {
                best_inliers: inliers.len(),
                required,
            });
        }

        if self.config.refine {
            let s: Vec<Point2> = inliers.iter().map(|&i| src[i]).collect();
            let d: Vec<Point2> = inliers.iter().map(|&i| dst[i]).collect();
            if let Some(refined) = dlt(&s, &d) {
                let refined_inliers = self.inliers_of(&refined, src, dst);
                if refined_inliers.len() >= inliers.len() {
                    homography = refined;
                    inliers = refined_inliers;
                }
            }
        }

        if !homography.is_well_conditioned() {
            return Err(MatchError::DegenerateModel(format!(
                "estimated homography is singular (det={:.3e})",
                homography.determinant()
            )));
        }

        debug!(
            "RANSAC: {} of {} correspondences are inliers after {} iterations",
            inliers.len(),
            n,
            iterations
        );
        Ok(RansacResult {
            homography,
            inliers,
            iterations,
        })
    }
}

/// A homography that keeps the plane's handedness preserves the turn direction of every triple
fn consistent_orientation(src: &[Point2; SAMPLE_SIZE], dst: &[Point2; SAMPLE_SIZE]) -> bool {
    const TRIPLES: [[usize; 3]; 4] = [[0, 1, 2], [1, 2, 3], [0, 1, 3], [0, 2, 3]];
    let signs: Vec<bool> = TRIPLES
        .iter()
        .map(|&[a, b, c]| {
            let src_turn = orientation(src[a], src[b], src[c]);
            let dst_turn = orientation(dst[a], dst[b], dst[c]);
            (src_turn > 0.0) == (dst_turn > 0.0)
        })
        .collect();
    signs.iter().all(|&s| s) || signs.iter().all(|&s| !s)
}

/// Randomly sample `k` unique indices from `0..n` into `buffer`
pub(crate) fn random_sample_into<R: Rng>(rng: &mut R, n: usize, k: usize, buffer: &mut Vec<usize>) {
    debug_assert!(k <= n, "Cannot sample {} indices from {}", k, n);
    buffer.clear();

    if k <= n / 2 {
        // Floyd's algorithm
        for j in (n - k)..n {
            let t = rng.random_range(0..=j);
            if buffer.contains(&t) {
                buffer.push(j);
            } else {
                buffer.push(t);
            }
        }
    } else {
        buffer.extend(0..n);
        buffer.shuffle(rng);
        buffer.truncate(k);
    }
}

/// Iterations needed to draw one all-inlier sample with probability `confidence`
pub fn adaptive_iterations(inlier_ratio: f64, sample_size: usize, confidence: f64) -> usize {
    if inlier_ratio <= 0.0 || inlier_ratio >= 1.0 {
        return 1;
    }
    let w_n = inlier_ratio.powi(sample_size as i32);
    let log_conf = (1.0 - confidence).ln();
    let log_outlier = (1.0 - w_n).ln();
    if log_outlier >= 0.0 {
        return usize::MAX;
    }
    (log_conf / log_outlier).ceil() as usize
}
