//! Thermal/RGB overlay pipeline.
//!
//! Each `<ID>_T` thermal image is registered onto its `<ID>_Z` reference image
//! with SIFT features and a RANSAC homography, warped into the reference
//! frame, colorized with a jet colormap and alpha-blended over the reference.

pub mod args;
pub mod batch;
pub mod compose;
pub mod debug;
pub mod io;
pub mod logging;
pub mod pipeline;
pub mod settings;
pub mod warp;

#[cfg(test)]
mod testing;

use std::path::Path;

use thermal_core::{FrameError, ImageRole};

pub use batch::{discover_pairs, BatchDriver, BatchSummary, Discovery, ImagePair, NamingConfig};
pub use compose::{blend, compose, normalize_min_max, BlendConfig, Colormap};
pub use pipeline::{OverlayPipeline, OverlayResult, PipelineFailure, Stage};
pub use settings::OverlayConfig;
pub use warp::{PerspectiveWarper, Warper};

pub use thermal_core::{self, Frame, Homography, Keypoint, Match};
pub use thermal_match;
pub use thermal_sift;

/// Reasons a single thermal/reference pair can fail
#[derive(Debug, Clone, PartialEq)]
pub enum OverlayError {
    DescriptorUnavailable { role: ImageRole, reason: String },
    InsufficientMatches { found: usize, required: usize },
    HomographyFailed(String),
    WarpDimensionMismatch { expected: (usize, usize), actual: (usize, usize) },
    Io { path: String, message: String },
    InvalidInput(String),
    Config(String),
}

impl OverlayError {
    pub fn io(path: &Path, err: impl std::fmt::Display) -> Self {
        OverlayError::Io {
            path: path.display().to_string(),
            message: err.to_string(),
        }
    }
}

impl std::fmt::Display for OverlayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OverlayError::DescriptorUnavailable { role, reason } => {
                write!(f, "No descriptors for the {} image: {}", role, reason)
            }
            OverlayError::InsufficientMatches { found, required } => {
                write!(f, "Only {} good matches (need {})", found, required)
            }
            OverlayError::HomographyFailed(reason) => write!(f, "Homography estimation failed: {}", reason),
            OverlayError::WarpDimensionMismatch { expected, actual } => write!(
                f,
                "Warped image is {}x{}, expected {}x{}",
                actual.0, actual.1, expected.0, expected.1
            ),
            OverlayError::Io { path, message } => write!(f, "I/O error on {}: {}", path, message),
            OverlayError::InvalidInput(reason) => write!(f, "Invalid input: {}", reason),
            OverlayError::Config(reason) => write!(f, "Configuration error: {}", reason),
        }
    }
}

impl std::error::Error for OverlayError {}

impl From<FrameError> for OverlayError {
    fn from(err: FrameError) -> Self {
        OverlayError::InvalidInput(err.to_string())
    }
}

impl From<rayon::ThreadPoolBuildError> for OverlayError {
    fn from(err: rayon::ThreadPoolBuildError) -> Self {
        OverlayError::Config(format!("thread pool: {}", err))
    }
}

pub type PipelineResult<T> = Result<T, OverlayError>;
