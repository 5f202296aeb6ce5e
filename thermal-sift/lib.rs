//! Contrast equalization and SIFT feature extraction.
//!
//! Grayscale images are equalized with CLAHE, then a Gaussian scale space is
//! searched for difference-of-Gaussian extrema which are refined, oriented and
//! described with 128-element gradient histograms.

pub mod builder;
pub mod config;
pub mod descriptor;
pub mod detector;
pub mod error;
pub mod preprocessing;
pub mod pyramid;
mod refinement;
pub mod types;

pub use builder::SiftBuilder;
pub use config::{ClaheConfig, SiftConfig};
pub use detector::SiftDetector;
pub use error::{SiftError, SiftResult};
pub use preprocessing::{Clahe, ImagePreprocessing, PreparedPair};
pub use types::{OctaveLevel, Plane, SiftFeatures};
