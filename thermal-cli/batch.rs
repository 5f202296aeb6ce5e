use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use log::{debug, info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thermal_core::ImageRole;

use crate::io::{load_frame, save_frame};
use crate::pipeline::{OverlayPipeline, Stage};
use crate::settings::OverlayConfig;
use crate::{OverlayError, PipelineResult};

/// File naming convention: `<ID>_<suffix>.<ext>`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NamingConfig {
    pub thermal_suffix: String,
    pub reference_suffix: String,
    /// Accepted input extensions, compared case-insensitively
    pub extensions: Vec<String>,
    pub overlay_suffix: String,
    pub debug_suffix: String,
    pub output_extension: String,
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            thermal_suffix: "T".to_string(),
            reference_suffix: "Z".to_string(),
            extensions: vec!["jpg".to_string(), "jpeg".to_string(), "png".to_string()],
            overlay_suffix: "_overlay".to_string(),
            debug_suffix: "_debug_matches".to_string(),
            output_extension: "jpg".to_string(),
        }
    }
}

impl NamingConfig {
    pub fn validate(&self) -> PipelineResult<()> {
        if self.thermal_suffix.is_empty() || self.reference_suffix.is_empty() {
            return Err(OverlayError::Config("role suffixes must not be empty".to_string()));
        }
        if self.thermal_suffix.eq_ignore_ascii_case(&self.reference_suffix) {
            return Err(OverlayError::Config(format!(
                "thermal and reference suffixes must differ, both are {:?}",
                self.thermal_suffix
            )));
        }
        if self.extensions.is_empty() {
            return Err(OverlayError::Config("at least one input extension is required".to_string()));
        }
        if self.output_extension.is_empty() || self.overlay_suffix == self.debug_suffix {
            return Err(OverlayError::Config(
                "output extension must be set and overlay/debug suffixes must differ".to_string(),
            ));
        }
        Ok(())
    }

    pub fn summary(&self) -> String {
        format!(
            "NamingConfig: <ID>_{} + <ID>_{} [{}] -> <ID>{}.{}",
            self.thermal_suffix,
            self.reference_suffix,
            self.extensions.join(", "),
            self.overlay_suffix,
            self.output_extension
        )
    }

    /// Split a file name into its pair ID and role
    pub fn parse(&self, file_name: &str) -> Option<(String, ImageRole)> {
        let (stem, ext) = file_name.rsplit_once('.')?;
        if !self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)) {
            return None;
        }
        let (id, suffix) = stem.rsplit_once('_')?;
        if id.is_empty() {
            return None;
        }
        if suffix.eq_ignore_ascii_case(&self.thermal_suffix) {
            Some((id.to_string(), ImageRole::Thermal))
        } else if suffix.eq_ignore_ascii_case(&self.reference_suffix) {
            Some((id.to_string(), ImageRole::Reference))
        } else {
            None
        }
    }

    pub fn overlay_name(&self, id: &str) -> String {
        format!("{}{}.{}", id, self.overlay_suffix, self.output_extension)
    }

    pub fn debug_name(&self, id: &str) -> String {
        format!("{}{}.{}", id, self.debug_suffix, self.output_extension)
    }
}

/// Thermal and reference files sharing one ID
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePair {
    pub id: String,
    pub thermal: PathBuf,
    pub reference: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedPair {
    pub id: String,
    pub reason: String,
}

/// Outcome of scanning an input directory
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Discovery {
    /// Complete pairs in ID order
    pub pairs: Vec<ImagePair>,
    /// IDs with only one of the two images
    pub skipped: Vec<SkippedPair>,
}

/// Group `<ID>_T` / `<ID>_Z` files in `dir` by ID.
///
/// Files that do not follow the naming convention are ignored. When a role
/// appears twice for one ID (e.g. `A_T.jpg` and `A_T.png`) the first file in
/// name order wins.
pub fn discover_pairs(dir: &Path, naming: &NamingConfig) -> PipelineResult<Discovery> {
    let mut names: Vec<(String, PathBuf)> = std::fs::read_dir(dir)
        .map_err(|e| OverlayError::io(dir, e))?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter_map(|entry| {
            let name = entry.file_name().to_str()?.to_string();
            Some((name, entry.path()))
        })
        .collect();
    names.sort();

    let mut grouped: BTreeMap<String, (Option<PathBuf>, Option<PathBuf>)> = BTreeMap::new();
    for (name, path) in names {
        let Some((id, role)) = naming.parse(&name) else {
            debug!("ignoring {}", name);
            continue;
        };
        let slots = grouped.entry(id.clone()).or_default();
        let slot = match role {
            ImageRole::Thermal => &mut slots.0,
            ImageRole::Reference => &mut slots.1,
        };
        if let Some(existing) = slot.as_ref() {
            warn!(
                "[{}] duplicate {} image {}, keeping {}",
                id,
                role,
                name,
                existing.display()
            );
            continue;
        }
        *slot = Some(path);
    }

    let mut discovery = Discovery::default();
    for (id, slots) in grouped {
        match slots {
            (Some(thermal), Some(reference)) => discovery.pairs.push(ImagePair { id, thermal, reference }),
            (Some(_), None) => discovery.skipped.push(SkippedPair {
                id,
                reason: "missing reference image".to_string(),
            }),
            (None, Some(_)) => discovery.skipped.push(SkippedPair {
                id,
                reason: "missing thermal image".to_string(),
            }),
            (None, None) => {}
        }
    }
    Ok(discovery)
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedPair {
    pub id: String,
    pub output: PathBuf,
    pub match_count: usize,
    pub inlier_count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FailedPair {
    pub id: String,
    /// Stage the pair did not reach
    pub stage: Stage,
    pub error: OverlayError,
    /// Match visualization written for this pair, if any
    pub debug_output: Option<PathBuf>,
}

/// Per-pair results of a batch run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchSummary {
    pub processed: Vec<ProcessedPair>,
    pub skipped: Vec<SkippedPair>,
    pub failed: Vec<FailedPair>,
}

impl BatchSummary {
    pub fn total(&self) -> usize {
        self.processed.len() + self.skipped.len() + self.failed.len()
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

impl std::fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "{} pairs: {} processed, {} skipped, {} failed",
            self.total(),
            self.processed.len(),
            self.skipped.len(),
            self.failed.len()
        )?;
        for p in &self.processed {
            writeln!(
                f,
                "  [ok]   {} -> {} ({} matches, {} inliers)",
                p.id,
                p.output.display(),
                p.match_count,
                p.inlier_count
            )?;
        }
        for s in &self.skipped {
            writeln!(f, "  [skip] {}: {}", s.id, s.reason)?;
        }
        for fail in &self.failed {
            writeln!(f, "  [fail] {} before {}: {}", fail.id, fail.stage, fail.error)?;
        }
        Ok(())
    }
}

enum PairOutcome {
    Processed(ProcessedPair),
    Failed(FailedPair),
}

/// Runs the overlay pipeline over every pair in an input directory
pub struct BatchDriver {
    pipeline: OverlayPipeline,
    input_dir: PathBuf,
    output_dir: PathBuf,
}

impl BatchDriver {
    /// Validates the configuration and creates `output_dir` if needed
    pub fn new(config: OverlayConfig, input_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> PipelineResult<Self> {
        let pipeline = OverlayPipeline::new(config)?;
        let output_dir = output_dir.into();
        std::fs::create_dir_all(&output_dir).map_err(|e| OverlayError::io(&output_dir, e))?;
        Ok(Self {
            pipeline,
            input_dir: input_dir.into(),
            output_dir,
        })
    }

    pub fn config(&self) -> &OverlayConfig {
        self.pipeline.config()
    }

    pub fn input_dir(&self) -> &Path {
        &self.input_dir
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Process every complete pair once. Only a failure to list the input
    /// directory is an error; per-pair failures land in the summary.
    pub fn run(&self) -> PipelineResult<BatchSummary> {
        let discovery = discover_pairs(&self.input_dir, &self.config().naming)?;
        info!(
            "found {} pairs in {} ({} incomplete)",
            discovery.pairs.len(),
            self.input_dir.display(),
            discovery.skipped.len()
        );
        for s in &discovery.skipped {
            warn!("[{}] skipped: {}", s.id, s.reason);
        }

        let outcomes: Vec<PairOutcome> = if self.config().parallel {
            discovery.pairs.par_iter().map(|pair| self.process_pair(pair)).collect()
        } else {
            discovery.pairs.iter().map(|pair| self.process_pair(pair)).collect()
        };

        let mut summary = BatchSummary {
            skipped: discovery.skipped,
            ..BatchSummary::default()
        };
        for outcome in outcomes {
            match outcome {
                PairOutcome::Processed(p) => summary.processed.push(p),
                PairOutcome::Failed(f) => summary.failed.push(f),
            }
        }
        info!(
            "batch finished: {} processed, {} skipped, {} failed",
            summary.processed.len(),
            summary.skipped.len(),
            summary.failed.len()
        );
        Ok(summary)
    }

    fn process_pair(&self, pair: &ImagePair) -> PairOutcome {
        let start = Instant::now();
        debug!("[{}] {}", pair.id, Stage::Discovered);
        let outcome = self.align_and_save(pair);
        match &outcome {
            PairOutcome::Processed(p) => info!(
                "[{}] saved {} ({} matches, {} inliers) in {:.2?}",
                p.id,
                p.output.display(),
                p.match_count,
                p.inlier_count,
                start.elapsed()
            ),
            PairOutcome::Failed(f) => warn!("[{}] failed before {}: {}", f.id, f.stage, f.error),
        }
        outcome
    }

    fn align_and_save(&self, pair: &ImagePair) -> PairOutcome {
        let failed = |stage: Stage, error: OverlayError, debug_output: Option<PathBuf>| {
            PairOutcome::Failed(FailedPair {
                id: pair.id.clone(),
                stage,
                error,
                debug_output,
            })
        };

        let frames = load_frame(&pair.thermal).and_then(|t| load_frame(&pair.reference).map(|r| (t, r)));
        let (thermal, reference) = match frames {
            Ok(frames) => frames,
            Err(e) => return failed(Stage::Loaded, e, None),
        };
        debug!(
            "[{}] {}: thermal {}x{}, reference {}x{}",
            pair.id,
            Stage::Loaded,
            thermal.width(),
            thermal.height(),
            reference.width(),
            reference.height()
        );

        let naming = &self.config().naming;
        let result = match self.pipeline.align(&pair.id, &reference, &thermal) {
            Ok(result) => result,
            Err(failure) => {
                let debug_output = failure.debug_matches.as_ref().and_then(|img| {
                    let path = self.output_dir.join(naming.debug_name(&pair.id));
                    match save_frame(&path, img) {
                        Ok(()) => {
                            info!("[{}] wrote match visualization {}", pair.id, path.display());
                            Some(path)
                        }
                        Err(e) => {
                            warn!("[{}] could not write match visualization: {}", pair.id, e);
                            None
                        }
                    }
                });
                return failed(failure.stage, failure.error, debug_output);
            }
        };

        let output = self.output_dir.join(naming.overlay_name(&pair.id));
        if let Err(e) = save_frame(&output, &result.composite) {
            return failed(Stage::Saved, e, None);
        }
        PairOutcome::Processed(ProcessedPair {
            id: pair.id.clone(),
            output,
            match_count: result.match_count,
            inlier_count: result.inlier_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::load_frame;
    use crate::testing::{noise_frame, texture_frame};

    fn create_test_config() -> OverlayConfig {
        let mut config = OverlayConfig::default();
        config.sift.max_features = Some(2000);
        config
    }

    fn touch(dir: &Path, name: &str) {
        std::fs::write(dir.join(name), b"").unwrap();
    }

    #[test]
    fn test_parse_file_names() {
        let naming = NamingConfig::default();
        assert_eq!(naming.parse("0012_T.JPG"), Some(("0012".to_string(), ImageRole::Thermal)));
        assert_eq!(naming.parse("0012_z.jpeg"), Some(("0012".to_string(), ImageRole::Reference)));
        assert_eq!(
            naming.parse("site_a_17_T.png"),
            Some(("site_a_17".to_string(), ImageRole::Thermal))
        );
        assert_eq!(naming.parse("0012_X.jpg"), None);
        assert_eq!(naming.parse("0012_T.tiff"), None);
        assert_eq!(naming.parse("_T.jpg"), None);
        assert_eq!(naming.parse("notes.txt"), None);
        assert_eq!(naming.parse("0012T.jpg"), None);
    }

    #[test]
    fn test_discovery_groups_and_skips() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["A_T.jpg", "A_Z.JPG", "B_T.jpg", "C_Z.png", "D_T.png", "D_T.jpg", "D_Z.jpg", "readme.md"] {
            touch(dir.path(), name);
        }
        let discovery = discover_pairs(dir.path(), &NamingConfig::default()).unwrap();

        let ids: Vec<&str> = discovery.pairs.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["A", "D"]);
        assert!(discovery.pairs[0].reference.ends_with("A_Z.JPG"));
        // Duplicate role: first in name order wins
        assert!(discovery.pairs[1].thermal.ends_with("D_T.jpg"));

        assert_eq!(
            discovery.skipped,
            vec![
                SkippedPair {
                    id: "B".to_string(),
                    reason: "missing reference image".to_string()
                },
                SkippedPair {
                    id: "C".to_string(),
                    reason: "missing thermal image".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_missing_input_dir_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(
            discover_pairs(&missing, &NamingConfig::default()),
            Err(OverlayError::Io { .. })
        ));
    }

    #[test]
    fn test_naming_validation() {
        assert!(NamingConfig::default().validate().is_ok());
        let clash = NamingConfig {
            reference_suffix: "t".to_string(),
            ..NamingConfig::default()
        };
        assert!(matches!(clash.validate(), Err(OverlayError::Config(_))));
        assert_eq!(NamingConfig::default().overlay_name("0042"), "0042_overlay.jpg");
        assert_eq!(NamingConfig::default().debug_name("0042"), "0042_debug_matches.jpg");
    }

    #[test]
    fn test_batch_processes_complete_pairs_only() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        let out_dir = output.path().join("nested").join("out");

        save_frame(&input.path().join("A_T.png"), &texture_frame(320, 240, 0.0, 1.25, 21)).unwrap();
        save_frame(&input.path().join("A_Z.png"), &texture_frame(400, 300, 0.0, 1.0, 21)).unwrap();
        save_frame(&input.path().join("B_T.png"), &texture_frame(320, 240, 0.0, 1.0, 22)).unwrap();

        let driver = BatchDriver::new(create_test_config(), input.path(), &out_dir).unwrap();
        assert!(out_dir.is_dir());
        let summary = driver.run().unwrap();

        assert_eq!(summary.total(), 2);
        assert!(summary.is_success(), "{}", summary);
        assert_eq!(summary.processed.len(), 1);
        assert_eq!(summary.processed[0].id, "A");
        assert_eq!(summary.skipped[0].id, "B");

        let overlay = load_frame(&out_dir.join("A_overlay.jpg")).unwrap();
        assert_eq!(overlay.dimensions(), (400, 300));
        assert_eq!(overlay.channels(), 3);
        assert!(!out_dir.join("B_overlay.jpg").exists());
        assert!(summary.to_string().contains("1 processed, 1 skipped, 0 failed"));
    }

    #[test]
    fn test_noise_pair_fails_without_composite() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        save_frame(&input.path().join("N_T.png"), &noise_frame(240, 180, 7)).unwrap();
        save_frame(&input.path().join("N_Z.png"), &noise_frame(240, 180, 8)).unwrap();

        let mut config = create_test_config();
        config.parallel = false;
        let summary = BatchDriver::new(config, input.path(), output.path()).unwrap().run().unwrap();

        assert!(summary.processed.is_empty());
        assert_eq!(summary.failed.len(), 1);
        let failure = &summary.failed[0];
        assert!(
            matches!(
                failure.error,
                OverlayError::InsufficientMatches { .. } | OverlayError::HomographyFailed(_)
            ),
            "unexpected failure {:?}",
            failure.error
        );
        assert!(!output.path().join("N_overlay.jpg").exists());
        if let Some(debug) = &failure.debug_output {
            assert!(debug.ends_with("N_debug_matches.jpg"));
            assert!(debug.exists());
        }
    }

    #[test]
    fn test_unreadable_image_fails_at_load() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        touch(input.path(), "X_T.jpg");
        touch(input.path(), "X_Z.jpg");

        let summary = BatchDriver::new(create_test_config(), input.path(), output.path())
            .unwrap()
            .run()
            .unwrap();
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].stage, Stage::Loaded);
        assert!(matches!(summary.failed[0].error, OverlayError::Io { .. }));
    }
}
