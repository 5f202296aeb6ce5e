//! Descriptor matching and robust homography estimation.
//!
//! Thermal descriptors are matched against reference descriptors with a
//! two-nearest-neighbour ratio test, then a RANSAC loop over normalized DLT
//! fits finds the homography supported by the most correspondences.

pub mod error;
pub mod homography;
pub mod knn;
pub mod matcher;
pub mod ransac;

pub use error::{MatchError, MatchResult};
pub use homography::{dlt, first_non_finite, normalize_points, reprojection_error, Point2};
pub use knn::{BruteForceIndex, KdForestIndex, Neighbor, NeighborSearch};
pub use matcher::{ratio_test, DescriptorMatcher, MatchConfig, SearchBackend};
pub use ransac::{adaptive_iterations, GeometryEstimator, RansacConfig, RansacEstimator, RansacResult};
