use std::path::Path;

use serde::{Deserialize, Serialize};
use thermal_match::{MatchConfig, RansacConfig};
use thermal_sift::{ClaheConfig, SiftConfig};

use crate::batch::NamingConfig;
use crate::compose::BlendConfig;
use crate::{OverlayError, PipelineResult};

/// Every tunable of a batch run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    /// Fewest ratio-test survivors before a homography is attempted
    pub min_good_matches: usize,
    /// Worker threads; `None` uses every core
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threads: Option<usize>,
    /// Process pairs concurrently
    pub parallel: bool,
    /// Write a match visualization for pairs with too few matches
    pub save_debug_matches: bool,
    pub clahe: ClaheConfig,
    pub sift: SiftConfig,
    pub matching: MatchConfig,
    pub ransac: RansacConfig,
    pub blend: BlendConfig,
    pub naming: NamingConfig,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            min_good_matches: 10,
            threads: None,
            parallel: true,
            save_debug_matches: true,
            clahe: ClaheConfig::default(),
            sift: SiftConfig::default(),
            matching: MatchConfig::default(),
            ransac: RansacConfig::default(),
            blend: BlendConfig::default(),
            naming: NamingConfig::default(),
        }
    }
}

impl OverlayConfig {
    /// Validate configuration parameters
    pub fn validate(&self) -> PipelineResult<()> {
        if self.min_good_matches < 4 {
            return Err(OverlayError::Config(format!(
                "min_good_matches must be at least 4, got {}",
                self.min_good_matches
            )));
        }
        if self.threads == Some(0) {
            return Err(OverlayError::Config("threads must be at least 1".to_string()));
        }
        let config_err = |e: &dyn std::fmt::Display| OverlayError::Config(e.to_string());
        self.clahe.validate().map_err(|e| config_err(&e))?;
        self.sift.validate().map_err(|e| config_err(&e))?;
        self.matching.validate().map_err(|e| config_err(&e))?;
        self.ransac.validate().map_err(|e| config_err(&e))?;
        self.blend.validate()?;
        self.naming.validate()?;
        Ok(())
    }

    /// Worker thread count after defaulting
    pub fn thread_count(&self) -> usize {
        self.threads.unwrap_or_else(thermal_core::default_threads)
    }

    pub fn summary(&self) -> String {
        [
            format!(
                "OverlayConfig: min_good_matches={}, threads={}, parallel={}, debug_matches={}",
                self.min_good_matches,
                self.thread_count(),
                self.parallel,
                self.save_debug_matches
            ),
            format!("  {}", self.clahe.summary()),
            format!("  {}", self.sift.summary()),
            format!("  {}", self.matching.summary()),
            format!("  {}", self.ransac.summary()),
            format!("  {}", self.blend.summary()),
            format!("  {}", self.naming.summary()),
        ]
        .join("\n")
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> PipelineResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| OverlayError::Config(e.to_string()))
    }

    /// Deserialize from JSON string
    pub fn from_json(json: &str) -> PipelineResult<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| OverlayError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to TOML string
    pub fn to_toml(&self) -> PipelineResult<String> {
        toml::to_string_pretty(self).map_err(|e| OverlayError::Config(e.to_string()))
    }

    /// Deserialize from TOML string
    pub fn from_toml(toml_str: &str) -> PipelineResult<Self> {
        let config: Self = toml::from_str(toml_str).map_err(|e| OverlayError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a `.json` or `.toml` file
    pub fn load<P: AsRef<Path>>(path: P) -> PipelineResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| OverlayError::io(path, e))?;
        match SettingsFormat::from_path(path)? {
            SettingsFormat::Json => Self::from_json(&content),
            SettingsFormat::Toml => Self::from_toml(&content),
        }
    }

    /// Save as JSON or TOML depending on the file extension
    pub fn save<P: AsRef<Path>>(&self, path: P) -> PipelineResult<()> {
        let path = path.as_ref();
        let content = match SettingsFormat::from_path(path)? {
            SettingsFormat::Json => self.to_json()?,
            SettingsFormat::Toml => self.to_toml()?,
        };
        std::fs::write(path, content).map_err(|e| OverlayError::io(path, e))
    }
}

enum SettingsFormat {
    Json,
    Toml,
}

impl SettingsFormat {
    fn from_path(path: &Path) -> PipelineResult<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("json") => Ok(SettingsFormat::Json),
            Some("toml") => Ok(SettingsFormat::Toml),
            _ => Err(OverlayError::Config(format!(
                "unsupported settings file {} (expected .json or .toml)",
                path.display()
            ))),
        }
    }
}
