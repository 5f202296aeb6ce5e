use rayon::prelude::*;
use thermal_core::{Descriptor, Image, Keypoint};

use crate::config::SiftConfig;
use crate::descriptor::compute_descriptor;
use crate::error::{SiftError, SiftResult};
use crate::pyramid::{ImagePyramid, Octave, ScaleSpace, IMAGE_BORDER};
use crate::refinement::{
    dominant_orientations, interpolate_extremum, is_local_extremum, orientation_histogram, ORI_RADIUS,
    ORI_SIG_FCTR,
};
use crate::types::{OctaveKeypoint, SiftFeatures};

/// Scale-invariant keypoint detector and descriptor extractor
#[derive(Debug, Clone)]
pub struct SiftDetector {
    cfg: SiftConfig,
    w: usize,
    h: usize,
}

impl SiftDetector {
    /// Smallest image with a searchable interior in the first octave
    pub const MIN_SIZE: usize = 2 * IMAGE_BORDER + 6;

    /// Creates a new detector with validation
    pub fn new(cfg: SiftConfig, width: usize, height: usize) -> SiftResult<Self> {
        if width == 0 || height == 0 {
            return Err(SiftError::InvalidImageSize { width, height });
        }
        if width < Self::MIN_SIZE || height < Self::MIN_SIZE {
            return Err(SiftError::ImageTooSmall {
                width,
                height,
                min_size: Self::MIN_SIZE,
            });
        }
        cfg.validate()?;

        Ok(Self {
            cfg,
            w: width,
            h: height,
        })
    }

    /// Validates image data before processing
    fn validate_image(&self, img: &Image) -> SiftResult<()> {
        let expected_len = self.w * self.h;
        if img.len() != expected_len {
            return Err(SiftError::InvalidImageData {
                expected_len,
                actual_len: img.len(),
            });
        }
        Ok(())
    }

    /// Keypoints only
    pub fn detect(&self, img: &Image) -> SiftResult<Vec<Keypoint>> {
        self.validate_image(img)?;
        let space = ImagePyramid::build(img, self.w, self.h, &self.cfg);
        let found = self.retain_best(self.find_scale_space_extrema(&space));
        Ok(found.iter().map(|kp| self.to_image_keypoint(&space, kp)).collect())
    }

    /// Keypoints with index-aligned descriptors. The count is data dependent and may be zero.
    pub fn detect_and_compute(&self, img: &Image) -> SiftResult<SiftFeatures> {
        self.validate_image(img)?;
        let space = ImagePyramid::build(img, self.w, self.h, &self.cfg);
        let found = self.retain_best(self.find_scale_space_extrema(&space));

        let descriptors: Vec<Descriptor> = found
            .par_iter()
            .map(|kp| {
                let gaussian = &space.octaves[kp.octave].gaussians[kp.layer];
                compute_descriptor(gaussian, kp.x, kp.y, kp.angle, kp.scale)
            })
            .collect();
        let keypoints = found.iter().map(|kp| self.to_image_keypoint(&space, kp)).collect();

        Ok(SiftFeatures { keypoints, descriptors })
    }

    fn find_scale_space_extrema(&self, space: &ScaleSpace) -> Vec<OctaveKeypoint> {
        space
            .octaves
            .par_iter()
            .flat_map_iter(|octave| self.octave_extrema(octave))
            .collect()
    }

    fn octave_extrema(&self, octave: &Octave) -> Vec<OctaveKeypoint> {
        let s = self.cfg.octave_layers;
        let threshold = 0.5 * self.cfg.contrast_threshold / s as f32;
        let (w, h) = (octave.level.width, octave.level.height);
        if w <= 2 * IMAGE_BORDER || h <= 2 * IMAGE_BORDER {
            return Vec::new();
        }

        (1..=s)
            .flat_map(|layer| (IMAGE_BORDER..h - IMAGE_BORDER).map(move |y| (layer, y)))
            .collect::<Vec<_>>()
            .into_par_iter()
            .flat_map_iter(|(layer, y)| {
                let (prev, curr, next) = (&octave.dogs[layer - 1], &octave.dogs[layer], &octave.dogs[layer + 1]);
                let mut found = Vec::new();
                for x in IMAGE_BORDER..w - IMAGE_BORDER {
                    if !is_local_extremum(prev, curr, next, x, y, threshold) {
                        continue;
                    }
                    let Some(ext) = interpolate_extremum(&octave.dogs, layer, x, y, &self.cfg) else {
                        continue;
                    };

                    let scale = self.cfg.sigma * 2f32.powf((ext.layer as f32 + ext.offset[2]) / s as f32);
                    let gaussian = &octave.gaussians[ext.layer];
                    let radius = (ORI_RADIUS * scale).round() as usize;
                    let hist = orientation_histogram(gaussian, ext.x, ext.y, radius, ORI_SIG_FCTR * scale);

                    for angle in dominant_orientations(&hist) {
                        found.push(OctaveKeypoint {
                            octave: octave.level.octave,
                            layer: ext.layer,
                            x: ext.x as f32 + ext.offset[0],
                            y: ext.y as f32 + ext.offset[1],
                            scale,
                            angle,
                            response: ext.contrast.abs(),
                        });
                    }
                }
                found
            })
            .collect()
    }

    /// Keep the `max_features` strongest responses, ties resolved by detection order
    fn retain_best(&self, mut keypoints: Vec<OctaveKeypoint>) -> Vec<OctaveKeypoint> {
        if let Some(limit) = self.cfg.max_features {
            if keypoints.len() > limit {
                keypoints.sort_by(|a, b| b.response.partial_cmp(&a.response).unwrap_or(std::cmp::Ordering::Equal));
                keypoints.truncate(limit);
            }
        }
        keypoints
    }

    fn to_image_keypoint(&self, space: &ScaleSpace, kp: &OctaveKeypoint) -> Keypoint {
        let scale = space.octaves[kp.octave].level.scale;
        Keypoint {
            x: kp.x * scale,
            y: kp.y * scale,
            size: kp.scale * 2.0 * scale,
            angle: kp.angle,
            response: kp.response,
            octave: kp.octave,
        }
    }

    /// Get detector configuration
    pub fn config(&self) -> &SiftConfig {
        &self.cfg
    }

    /// Get image dimensions
    pub fn dimensions(&self) -> (usize, usize) {
        (self.w, self.h)
    }
}
