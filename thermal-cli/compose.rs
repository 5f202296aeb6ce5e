use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thermal_core::{Frame, Image};
use thermal_sift::ImagePreprocessing;

use crate::{OverlayError, PipelineResult};

/// Weights of the final alpha blend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlendConfig {
    pub reference_weight: f32,
    pub overlay_weight: f32,
}

impl Default for BlendConfig {
    fn default() -> Self {
        Self {
            reference_weight: 0.6,
            overlay_weight: 0.4,
        }
    }
}

impl BlendConfig {
    pub fn validate(&self) -> PipelineResult<()> {
        for (name, w) in [("reference_weight", self.reference_weight), ("overlay_weight", self.overlay_weight)] {
            if !w.is_finite() || w < 0.0 {
                return Err(OverlayError::Config(format!("{} must be a non-negative number, got {}", name, w)));
            }
        }
        Ok(())
    }

    pub fn summary(&self) -> String {
        format!(
            "BlendConfig: reference x{} + overlay x{}",
            self.reference_weight, self.overlay_weight
        )
    }
}

/// Linear stretch so the darkest pixel becomes 0 and the brightest 255.
/// A constant image maps to all zeros.
pub fn normalize_min_max(img: &[u8]) -> Image {
    let (min, max) = img
        .iter()
        .fold((u8::MAX, u8::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    if img.is_empty() || min == max {
        return vec![0; img.len()];
    }
    let scale = 255.0 / (max - min) as f32;
    img.iter()
        .map(|&v| ((v - min) as f32 * scale).round() as u8)
        .collect()
}

/// Intensity-to-color lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Colormap {
    /// Blue through cyan and yellow to red
    #[default]
    Jet,
}

impl Colormap {
    /// RGB entry for every intensity
    pub fn lut(&self) -> [[u8; 3]; 256] {
        match self {
            Colormap::Jet => {
                let mut lut = [[0u8; 3]; 256];
                for (i, entry) in lut.iter_mut().enumerate() {
                    let t = i as f32 / 255.0;
                    let channel = |centre: f32| ((1.5 - (4.0 * t - centre).abs()).clamp(0.0, 1.0) * 255.0).round() as u8;
                    *entry = [channel(3.0), channel(2.0), channel(1.0)];
                }
                lut
            }
        }
    }

    /// Map a grayscale buffer to interleaved RGB
    pub fn apply(&self, gray: &[u8]) -> Vec<u8> {
        let lut = self.lut();
        gray.iter().flat_map(|&v| lut[v as usize]).collect()
    }
}

/// Per-channel weighted sum of two equally sized buffers, rounded and saturated
pub fn blend(reference: &[u8], overlay: &[u8], reference_weight: f32, overlay_weight: f32) -> PipelineResult<Vec<u8>> {
    if reference.len() != overlay.len() {
        return Err(OverlayError::InvalidInput(format!(
            "blend inputs differ in size: {} vs {} bytes",
            reference.len(),
            overlay.len()
        )));
    }
    Ok(reference
        .par_iter()
        .zip(overlay.par_iter())
        .map(|(&r, &o)| (r as f32 * reference_weight + o as f32 * overlay_weight).round().clamp(0.0, 255.0) as u8)
        .collect())
}

/// Interleaved RGB bytes of a frame, replicating luma for single-channel frames
pub fn rgb_bytes(frame: &Frame) -> Vec<u8> {
    match frame.channels() {
        3 => frame.as_raw().to_vec(),
        _ => frame.as_raw().iter().flat_map(|&v| [v, v, v]).collect(),
    }
}

/// Colorize the warped thermal frame and blend it over the reference.
///
/// Both frames must share the reference's dimensions; the result is RGB.
pub fn compose(warped: &Frame, reference: &Frame, config: &BlendConfig) -> PipelineResult<Frame> {
    if warped.dimensions() != reference.dimensions() {
        return Err(OverlayError::WarpDimensionMismatch {
            expected: reference.dimensions(),
            actual: warped.dimensions(),
        });
    }
    let gray = ImagePreprocessing::to_grayscale(warped).map_err(|e| OverlayError::InvalidInput(e.to_string()))?;
    let colorized = Colormap::Jet.apply(&normalize_min_max(gray.as_raw()));
    let blended = blend(
        &rgb_bytes(reference),
        &colorized,
        config.reference_weight,
        config.overlay_weight,
    )?;
    Ok(Frame::rgb(reference.width(), reference.height(), blended)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_normalize_stretches_range() {
        assert_eq!(normalize_min_max(&[10, 95, 180]), vec![0, 128, 255]);
        assert_eq!(normalize_min_max(&[7, 7, 7]), vec![0, 0, 0]);
        assert!(normalize_min_max(&[]).is_empty());
    }

    #[test]
    fn test_jet_endpoints() {
        let lut = Colormap::Jet.lut();
        // Dark blue, green-ish middle, dark red
        assert_eq!(lut[0], [0, 0, 128]);
        assert_eq!(lut[255], [128, 0, 0]);
        let mid = lut[128];
        assert!(mid[1] == 255 && mid[0] > 100 && mid[2] > 100);
        // Blue dominates the low end, red the high end
        assert!(lut[40][2] > lut[40][0]);
        assert!(lut[215][0] > lut[215][2]);
    }

    #[test]
    fn test_blend_weights_and_rounding() {
        let out = blend(&[100, 0, 255], &[200, 255, 255], 0.6, 0.4).unwrap();
        assert_eq!(out, vec![140, 102, 255]);
        assert!(matches!(blend(&[1, 2], &[1], 0.6, 0.4), Err(OverlayError::InvalidInput(_))));
        // Overweighted blends saturate
        assert_eq!(blend(&[200], &[200], 1.0, 1.0).unwrap(), vec![255]);
    }

    #[test]
    fn test_compose_self_blend() {
        let (w, h) = (16, 8);
        let data: Vec<u8> = (0..w * h).map(|i| (i * 2) as u8).collect();
        let reference = Frame::gray(w, h, data.clone()).unwrap();
        let out = compose(&reference, &reference, &BlendConfig::default()).unwrap();
        assert_eq!(out.dimensions(), (w, h));
        assert_eq!(out.channels(), 3);

        let lut = Colormap::Jet.lut();
        let norm = normalize_min_max(&data);
        for (i, px) in out.as_raw().chunks_exact(3).enumerate() {
            for c in 0..3 {
                let expected = (data[i] as f32 * 0.6 + lut[norm[i] as usize][c] as f32 * 0.4).round() as u8;
                assert_eq!(px[c], expected);
            }
        }
    }

    #[test]
    fn test_compose_rejects_mismatched_sizes() {
        let a = Frame::gray(10, 10, vec![0; 100]).unwrap();
        let b = Frame::gray(12, 10, vec![0; 120]).unwrap();
        assert_eq!(
            compose(&a, &b, &BlendConfig::default()),
            Err(OverlayError::WarpDimensionMismatch {
                expected: (12, 10),
                actual: (10, 10)
            })
        );
    }

    #[test]
    fn test_blend_config_validation() {
        assert!(BlendConfig::default().validate().is_ok());
        let bad = BlendConfig {
            overlay_weight: f32::NAN,
            ..BlendConfig::default()
        };
        assert!(matches!(bad.validate(), Err(OverlayError::Config(_))));
    }

    proptest! {
        #[test]
        fn prop_normalize_spans_full_range(data in prop::collection::vec(any::<u8>(), 2..200)) {
            let out = normalize_min_max(&data);
            prop_assert_eq!(out.len(), data.len());
            let (lo, hi) = (data.iter().min().unwrap(), data.iter().max().unwrap());
            if lo != hi {
                prop_assert_eq!(*out.iter().min().unwrap(), 0);
                prop_assert_eq!(*out.iter().max().unwrap(), 255);
            } else {
                prop_assert!(out.iter().all(|&v| v == 0));
            }
        }
    }
}
