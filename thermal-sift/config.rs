use crate::error::{SiftError, SiftResult};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Contrast-limited adaptive histogram equalization settings
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ClaheConfig {
    /// Clip limit relative to the mean histogram bin height
    pub clip_limit: f32,
    /// Number of tile columns
    pub tiles_x: usize,
    /// Number of tile rows
    pub tiles_y: usize,
}

impl Default for ClaheConfig {
    fn default() -> Self {
        Self {
            clip_limit: 2.0,
            tiles_x: 8,
            tiles_y: 8,
        }
    }
}

impl ClaheConfig {
    pub fn validate(&self) -> SiftResult<()> {
        if !self.clip_limit.is_finite() || self.clip_limit <= 0.0 {
            return Err(SiftError::InvalidConfig(format!(
                "CLAHE clip limit must be positive, got {}",
                self.clip_limit
            )));
        }
        if self.tiles_x == 0 || self.tiles_y == 0 {
            return Err(SiftError::InvalidConfig(format!(
                "CLAHE tile grid must be non-empty, got {}x{}",
                self.tiles_x, self.tiles_y
            )));
        }
        Ok(())
    }

    pub fn summary(&self) -> String {
        format!(
            "ClaheConfig: clip_limit={}, tiles={}x{}",
            self.clip_limit, self.tiles_x, self.tiles_y
        )
    }
}

/// Scale-space detector configuration
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SiftConfig {
    /// Scales sampled per octave
    pub octave_layers: usize,
    /// Minimum |DoG| contrast, divided by `octave_layers` at test time
    pub contrast_threshold: f32,
    /// Principal curvature ratio above which edge responses are dropped
    pub edge_threshold: f32,
    /// Blur of the octave base image
    pub sigma: f32,
    /// Upsample the input 2x before building the pyramid
    pub double_base: bool,
    /// Keep only the strongest responses
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub max_features: Option<usize>,
}

impl Default for SiftConfig {
    fn default() -> Self {
        Self {
            octave_layers: 3,
            contrast_threshold: 0.04,
            edge_threshold: 10.0,
            sigma: 1.6,
            double_base: false,
            max_features: None,
        }
    }
}

impl SiftConfig {
    /// Fewer features, cheaper pyramid
    pub fn fast_preset() -> Self {
        Self {
            contrast_threshold: 0.06,
            max_features: Some(2000),
            ..Self::default()
        }
    }

    /// Doubled base image and lower contrast threshold for small or soft imagery
    pub fn precise_preset() -> Self {
        Self {
            contrast_threshold: 0.03,
            double_base: true,
            ..Self::default()
        }
    }

    /// Generate human-readable summary
    pub fn summary(&self) -> String {
        format!(
            "SiftConfig: layers={}, contrast={}, edge={}, sigma={}, double_base={}, max_features={}",
            self.octave_layers,
            self.contrast_threshold,
            self.edge_threshold,
            self.sigma,
            self.double_base,
            self.max_features
                .map(|n| n.to_string())
                .unwrap_or_else(|| "all".to_string())
        )
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> SiftResult<()> {
        if self.octave_layers == 0 {
            return Err(SiftError::InvalidConfig("octave_layers must be at least 1".to_string()));
        }
        if !self.contrast_threshold.is_finite() || self.contrast_threshold < 0.0 {
            return Err(SiftError::InvalidConfig(format!(
                "contrast_threshold must be non-negative, got {}",
                self.contrast_threshold
            )));
        }
        if !self.edge_threshold.is_finite() || self.edge_threshold <= 0.0 {
            return Err(SiftError::InvalidConfig(format!(
                "edge_threshold must be positive, got {}",
                self.edge_threshold
            )));
        }
        if !self.sigma.is_finite() || self.sigma <= 0.0 {
            return Err(SiftError::InvalidConfig(format!("sigma must be positive, got {}", self.sigma)));
        }
        if self.max_features == Some(0) {
            return Err(SiftError::InvalidConfig("max_features must be at least 1".to_string()));
        }
        Ok(())
    }
}
