use log::debug;
use thermal_core::{Frame, Homography, ImageRole, Keypoint, Match};
use thermal_match::{DescriptorMatcher, GeometryEstimator, Point2, RansacEstimator};
use thermal_sift::{ImagePreprocessing, PreparedPair, SiftBuilder, SiftFeatures};

use crate::compose::compose;
use crate::debug::draw_matches;
use crate::settings::OverlayConfig;
use crate::warp::{PerspectiveWarper, Warper};
use crate::{OverlayError, PipelineResult};

/// Lifecycle of one thermal/reference pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    Discovered,
    Loaded,
    Preprocessed,
    FeaturesExtracted,
    Matched,
    HomographyEstimated,
    Warped,
    Composed,
    Saved,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Discovered => "discovered",
            Stage::Loaded => "loaded",
            Stage::Preprocessed => "preprocessed",
            Stage::FeaturesExtracted => "features extracted",
            Stage::Matched => "matched",
            Stage::HomographyEstimated => "homography estimated",
            Stage::Warped => "warped",
            Stage::Composed => "composed",
            Stage::Saved => "saved",
        };
        f.write_str(name)
    }
}

/// A pair that stopped before reaching `stage`
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineFailure {
    pub stage: Stage,
    pub error: OverlayError,
    /// Match visualization for pairs that fell short of the match minimum
    pub debug_matches: Option<Frame>,
}

impl PipelineFailure {
    pub fn new(stage: Stage, error: OverlayError) -> Self {
        Self {
            stage,
            error,
            debug_matches: None,
        }
    }
}

impl std::fmt::Display for PipelineFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "failed before {}: {}", self.stage, self.error)
    }
}

impl std::error::Error for PipelineFailure {}

/// Finished overlay with the registration that produced it
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayResult {
    /// RGB composite with the reference's dimensions
    pub composite: Frame,
    /// Maps resized thermal pixels to reference pixels
    pub homography: Homography,
    pub match_count: usize,
    pub inlier_count: usize,
}

/// Registers a thermal frame onto a reference frame and blends the two
pub struct OverlayPipeline<E = RansacEstimator, W = PerspectiveWarper> {
    config: OverlayConfig,
    matcher: DescriptorMatcher,
    estimator: E,
    warper: W,
}

impl OverlayPipeline {
    pub fn new(config: OverlayConfig) -> PipelineResult<Self> {
        let estimator = RansacEstimator::new(config.ransac.clone()).map_err(|e| OverlayError::Config(e.to_string()))?;
        Self::with_components(config, estimator, PerspectiveWarper)
    }
}

impl<E: GeometryEstimator, W: Warper> OverlayPipeline<E, W> {
    /// Pipeline with a custom estimator and warper
    pub fn with_components(config: OverlayConfig, estimator: E, warper: W) -> PipelineResult<Self> {
        config.validate()?;
        let matcher = DescriptorMatcher::new(config.matching.clone()).map_err(|e| OverlayError::Config(e.to_string()))?;
        Ok(Self {
            config,
            matcher,
            estimator,
            warper,
        })
    }

    pub fn config(&self) -> &OverlayConfig {
        &self.config
    }

    /// Run every stage from preprocessing to composition
    pub fn align(&self, pair_id: &str, reference: &Frame, thermal: &Frame) -> Result<OverlayResult, PipelineFailure> {
        let prepared = ImagePreprocessing::prepare_pair(reference, thermal, &self.config.clahe)
            .map_err(|e| PipelineFailure::new(Stage::Preprocessed, OverlayError::InvalidInput(e.to_string())))?;
        let (width, height) = (prepared.width, prepared.height);

        let (thermal_features, reference_features) = self.extract(&prepared)?;
        debug!(
            "[{}] {} thermal and {} reference features at {}x{}",
            pair_id,
            thermal_features.len(),
            reference_features.len(),
            width,
            height
        );

        let matches = self
            .matcher
            .match_descriptors(&thermal_features.descriptors, &reference_features.descriptors);
        debug!("[{}] {} good matches", pair_id, matches.len());
        if matches.len() < self.config.min_good_matches {
            let mut failure = PipelineFailure::new(
                Stage::Matched,
                OverlayError::InsufficientMatches {
                    found: matches.len(),
                    required: self.config.min_good_matches,
                },
            );
            if self.config.save_debug_matches {
                failure.debug_matches = draw_matches(
                    &prepared.thermal_resized,
                    &thermal_features.keypoints,
                    reference,
                    &reference_features.keypoints,
                    &matches,
                )
                .ok();
            }
            return Err(failure);
        }

        let (src, dst) = correspondences(&matches, &thermal_features.keypoints, &reference_features.keypoints);
        let estimate = self
            .estimator
            .estimate(&src, &dst)
            .map_err(|e| PipelineFailure::new(Stage::HomographyEstimated, OverlayError::HomographyFailed(e.to_string())))?;
        debug!(
            "[{}] homography with {} inliers: {:?}",
            pair_id,
            estimate.inliers.len(),
            estimate.homography.to_row_major()
        );

        let warped = self
            .warper
            .warp(&prepared.thermal_resized, &estimate.homography, width, height)
            .map_err(|e| PipelineFailure::new(Stage::Warped, e))?;
        if warped.dimensions() != reference.dimensions() || warped.as_raw().is_empty() {
            return Err(PipelineFailure::new(
                Stage::Warped,
                OverlayError::WarpDimensionMismatch {
                    expected: reference.dimensions(),
                    actual: warped.dimensions(),
                },
            ));
        }

        let composite =
            compose(&warped, reference, &self.config.blend).map_err(|e| PipelineFailure::new(Stage::Composed, e))?;

        Ok(OverlayResult {
            composite,
            homography: estimate.homography,
            match_count: matches.len(),
            inlier_count: estimate.inliers.len(),
        })
    }

    /// SIFT on both equalized images; an empty feature set is a failure for that role
    fn extract(&self, prepared: &PreparedPair) -> Result<(SiftFeatures, SiftFeatures), PipelineFailure> {
        let unavailable = |role: ImageRole, reason: String| {
            PipelineFailure::new(Stage::FeaturesExtracted, OverlayError::DescriptorUnavailable { role, reason })
        };
        // Both images share the reference's dimensions after preparation
        let builder = SiftBuilder::from_config(self.config.sift.clone(), prepared.width, prepared.height);
        debug!("{}", builder.summary());
        let detector = builder
            .build()
            .map_err(|e| unavailable(ImageRole::Reference, e.to_string()))?;

        let (thermal, reference) = rayon::join(
            || detector.detect_and_compute(&prepared.thermal_gray),
            || detector.detect_and_compute(&prepared.reference_gray),
        );
        let thermal = thermal.map_err(|e| unavailable(ImageRole::Thermal, e.to_string()))?;
        let reference = reference.map_err(|e| unavailable(ImageRole::Reference, e.to_string()))?;

        if thermal.is_empty() {
            return Err(unavailable(ImageRole::Thermal, "no keypoints detected".to_string()));
        }
        if reference.is_empty() {
            return Err(unavailable(ImageRole::Reference, "no keypoints detected".to_string()));
        }
        Ok((thermal, reference))
    }
}

/// Thermal (source) and reference (destination) coordinates of each match
pub fn correspondences(matches: &[Match], thermal: &[Keypoint], reference: &[Keypoint]) -> (Vec<Point2>, Vec<Point2>) {
    matches
        .iter()
        .filter_map(|m| {
            let t = thermal.get(m.query_idx)?;
            let r = reference.get(m.train_idx)?;
            Some(((t.x as f64, t.y as f64), (r.x as f64, r.y as f64)))
        })
        .unzip()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::BlendConfig;
    use crate::testing::{noise_frame, rotated_texture, texture_frame};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use thermal_match::{MatchError, MatchResult, RansacResult};

    fn create_test_config() -> OverlayConfig {
        let mut config = OverlayConfig::default();
        config.sift.max_features = Some(3000);
        config
    }

    /// Counts calls and always fails
    #[derive(Default)]
    struct CountingEstimator {
        calls: AtomicUsize,
    }

    impl GeometryEstimator for CountingEstimator {
        fn estimate(&self, src: &[Point2], _dst: &[Point2]) -> MatchResult<RansacResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(MatchError::NoConsensus {
                best_inliers: 0,
                required: src.len(),
            })
        }
    }

    /// Returns a canvas one column narrower than requested
    struct NarrowWarper;

    impl Warper for NarrowWarper {
        fn warp(&self, src: &Frame, h: &Homography, width: usize, height: usize) -> PipelineResult<Frame> {
            PerspectiveWarper.warp(src, h, width - 1, height)
        }
    }

    #[test]
    fn test_identical_images_register_to_identity() {
        let reference = texture_frame(320, 240, 0.0, 1.0, 11);
        let pipeline = OverlayPipeline::new(create_test_config()).unwrap();
        let result = pipeline.align("same", &reference, &reference).unwrap();

        assert!(result.match_count >= 10);
        assert!(result.inlier_count >= result.match_count * 9 / 10);
        assert!(result.homography.max_deviation_from_identity() < 0.01);

        // With an identity warp the composite is the reference blended with its own colorized copy
        let expected = compose(&reference, &reference, &BlendConfig::default()).unwrap();
        let (w, h) = reference.dimensions();
        for y in 1..h - 1 {
            for x in 1..w - 1 {
                for (a, b) in result.composite.pixel(x, y).iter().zip(expected.pixel(x, y)) {
                    assert!((*a as i16 - *b as i16).abs() <= 2, "pixel ({}, {}) differs", x, y);
                }
            }
        }
    }

    #[test]
    fn test_rotated_and_rescaled_pair_is_registered() {
        let thermal = texture_frame(640, 480, 0.0, 1.25, 5);
        let (reference, truth) = rotated_texture(800, 600, 5.0, 5);
        let pipeline = OverlayPipeline::new(create_test_config()).unwrap();
        let result = pipeline.align("rotated", &reference, &thermal).unwrap();

        let prepared = ImagePreprocessing::prepare_pair(&reference, &thermal, &pipeline.config().clahe).unwrap();
        let detector = SiftBuilder::from_config(pipeline.config().sift.clone(), prepared.width, prepared.height)
            .build()
            .unwrap();
        let thermal_features = detector.detect_and_compute(&prepared.thermal_gray).unwrap();
        let reference_features = detector.detect_and_compute(&prepared.reference_gray).unwrap();
        assert!(thermal_features.len() >= 50, "{} thermal keypoints", thermal_features.len());
        assert!(reference_features.len() >= 50, "{} reference keypoints", reference_features.len());

        assert!(result.match_count >= 10, "{} good matches", result.match_count);
        assert_eq!(result.composite.dimensions(), (800, 600));
        assert_eq!(result.composite.channels(), 3);
        assert!(result.inlier_count >= 10);
        for &(x, y) in &[(100.0, 100.0), (700.0, 100.0), (400.0, 300.0), (100.0, 500.0), (700.0, 500.0)] {
            let (ux, uy) = truth.apply(x, y).unwrap();
            let (ex, ey) = result.homography.apply(x, y).unwrap();
            assert!((ux - ex).hypot(uy - ey) < 3.0, "({}, {}) maps to ({}, {}), expected ({}, {})", x, y, ex, ey, ux, uy);
        }
    }

    #[test]
    fn test_too_few_matches_skips_estimation() {
        let thermal = noise_frame(200, 150, 1);
        let reference = noise_frame(200, 150, 2);
        let mut config = create_test_config();
        config.min_good_matches = 1000;
        let pipeline = OverlayPipeline::with_components(config, CountingEstimator::default(), PerspectiveWarper).unwrap();

        let failure = pipeline.align("noise", &reference, &thermal).unwrap_err();
        assert_eq!(failure.stage, Stage::Matched);
        assert!(matches!(
            failure.error,
            OverlayError::InsufficientMatches { required: 1000, .. }
        ));
        assert_eq!(pipeline.estimator.calls.load(Ordering::SeqCst), 0);
        let debug = failure.debug_matches.unwrap();
        assert_eq!(debug.dimensions(), (400, 150));
    }

    #[test]
    fn test_estimator_failure_is_reported() {
        let reference = texture_frame(320, 240, 0.0, 1.0, 3);
        let pipeline =
            OverlayPipeline::with_components(create_test_config(), CountingEstimator::default(), PerspectiveWarper).unwrap();
        let failure = pipeline.align("est", &reference, &reference).unwrap_err();
        assert_eq!(failure.stage, Stage::HomographyEstimated);
        assert!(matches!(failure.error, OverlayError::HomographyFailed(_)));
        assert!(failure.debug_matches.is_none());
        assert_eq!(pipeline.estimator.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_wrong_warp_size_stops_before_composition() {
        let reference = texture_frame(320, 240, 0.0, 1.0, 4);
        let pipeline =
            OverlayPipeline::with_components(create_test_config(), RansacEstimator::default(), NarrowWarper).unwrap();
        let failure = pipeline.align("narrow", &reference, &reference).unwrap_err();
        assert_eq!(failure.stage, Stage::Warped);
        assert_eq!(
            failure.error,
            OverlayError::WarpDimensionMismatch {
                expected: (320, 240),
                actual: (319, 240)
            }
        );
    }

    #[test]
    fn test_flat_image_has_no_descriptors() {
        let flat = Frame::gray(160, 120, vec![128; 160 * 120]).unwrap();
        let textured = texture_frame(160, 120, 0.0, 1.0, 9);
        let pipeline = OverlayPipeline::new(create_test_config()).unwrap();
        let failure = pipeline.align("flat", &textured, &flat).unwrap_err();
        assert_eq!(failure.stage, Stage::FeaturesExtracted);
        assert!(matches!(
            failure.error,
            OverlayError::DescriptorUnavailable {
                role: ImageRole::Thermal,
                ..
            }
        ));
    }

    #[test]
    fn test_correspondences_follow_match_indices() {
        let kp = |x: f32, y: f32| Keypoint {
            x,
            y,
            size: 2.0,
            angle: 0.0,
            response: 1.0,
            octave: 0,
        };
        let thermal = [kp(1.0, 2.0), kp(3.0, 4.0)];
        let reference = [kp(10.0, 20.0), kp(30.0, 40.0)];
        let matches = [
            Match { query_idx: 1, train_idx: 0, distance: 0.5 },
            Match { query_idx: 7, train_idx: 0, distance: 0.5 },
        ];
        let (src, dst) = correspondences(&matches, &thermal, &reference);
        assert_eq!(src, vec![(3.0, 4.0)]);
        assert_eq!(dst, vec![(10.0, 20.0)]);
    }
}
