use crate::config::SiftConfig;
use crate::detector::SiftDetector;
use crate::error::SiftResult;

/// Builder for creating a validated `SiftDetector`
#[derive(Debug, Clone)]
pub struct SiftBuilder {
    config: SiftConfig,
    width: usize,
    height: usize,
}

impl SiftBuilder {
    /// Create a new builder with default settings
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            config: SiftConfig::default(),
            width,
            height,
        }
    }

    /// Create a builder from an existing configuration
    pub fn from_config(config: SiftConfig, width: usize, height: usize) -> Self {
        Self { config, width, height }
    }

    /// Set the number of sampled scales per octave
    pub fn octave_layers(mut self, layers: usize) -> Self {
        self.config.octave_layers = layers;
        self
    }

    /// Set the low-contrast rejection threshold
    pub fn contrast_threshold(mut self, threshold: f32) -> Self {
        self.config.contrast_threshold = threshold;
        self
    }

    /// Set the principal curvature ratio for edge rejection
    pub fn edge_threshold(mut self, threshold: f32) -> Self {
        self.config.edge_threshold = threshold;
        self
    }

    /// Set the base blur
    pub fn sigma(mut self, sigma: f32) -> Self {
        self.config.sigma = sigma;
        self
    }

    /// Enable or disable the 2x upsampled base image
    pub fn double_base(mut self, enable: bool) -> Self {
        self.config.double_base = enable;
        self
    }

    /// Keep at most `n` keypoints, strongest first
    pub fn max_features(mut self, n: usize) -> Self {
        self.config.max_features = Some(n);
        self
    }

    /// Apply the fast preset
    pub fn preset_fast(mut self) -> Self {
        self.config = SiftConfig::fast_preset();
        self
    }

    /// Apply the precise preset
    pub fn preset_precise(mut self) -> Self {
        self.config = SiftConfig::precise_preset();
        self
    }

    /// Build the detector
    pub fn build(self) -> SiftResult<SiftDetector> {
        SiftDetector::new(self.config, self.width, self.height)
    }

    /// Generate a summary of the builder's configuration
    pub fn summary(&self) -> String {
        format!("{} @ {}x{}", self.config.summary(), self.width, self.height)
    }

    /// Convert the builder into a `SiftConfig`
    pub fn to_config(self) -> SiftConfig {
        self.config
    }
}
