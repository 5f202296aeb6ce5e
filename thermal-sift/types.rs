use thermal_core::{Descriptor, Image, Keypoint};

/// Single-channel floating point plane, intensities scaled to [0, 1]
#[derive(Debug, Clone, PartialEq)]
pub struct Plane {
    pub width: usize,
    pub height: usize,
    pub data: Vec<f32>,
}

impl Plane {
    pub fn zeros(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![0.0; width * height],
        }
    }

    pub fn from_image(img: &Image, width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: img.iter().map(|&v| v as f32 / 255.0).collect(),
        }
    }

    #[inline]
    pub fn at(&self, x: usize, y: usize) -> f32 {
        self.data[y * self.width + x]
    }

    /// Every second pixel in both directions
    pub fn subsample_half(&self) -> Self {
        let width = (self.width / 2).max(1);
        let height = (self.height / 2).max(1);
        let mut data = Vec::with_capacity(width * height);
        for y in 0..height {
            let row = &self.data[(y * 2) * self.width..(y * 2 + 1) * self.width];
            data.extend((0..width).map(|x| row[x * 2]));
        }
        Self { width, height, data }
    }

    /// Bilinear 2x enlargement used for the optional doubled base image
    pub fn upsample_double(&self) -> Self {
        let width = self.width * 2;
        let height = self.height * 2;
        let mut data = Vec::with_capacity(width * height);
        for y in 0..height {
            let sy = ((y as f32 + 0.5) * 0.5 - 0.5).max(0.0);
            let y0 = (sy as usize).min(self.height - 1);
            let y1 = (y0 + 1).min(self.height - 1);
            let fy = sy - y0 as f32;
            for x in 0..width {
                let sx = ((x as f32 + 0.5) * 0.5 - 0.5).max(0.0);
                let x0 = (sx as usize).min(self.width - 1);
                let x1 = (x0 + 1).min(self.width - 1);
                let fx = sx - x0 as f32;
                let top = self.at(x0, y0) * (1.0 - fx) + self.at(x1, y0) * fx;
                let bottom = self.at(x0, y1) * (1.0 - fx) + self.at(x1, y1) * fx;
                data.push(top * (1.0 - fy) + bottom * fy);
            }
        }
        Self { width, height, data }
    }
}

/// Scale information for one octave of the pyramid
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OctaveLevel {
    pub octave: usize,
    pub width: usize,
    pub height: usize,
    /// Size of one octave pixel measured in input pixels
    pub scale: f32,
}

/// Refined extremum in octave coordinates, before conversion to image space
#[derive(Debug, Clone, Copy)]
pub(crate) struct OctaveKeypoint {
    pub octave: usize,
    pub layer: usize,
    pub x: f32,
    pub y: f32,
    /// Blur relative to the octave base, in octave pixels
    pub scale: f32,
    pub angle: f32,
    pub response: f32,
}

/// Keypoints and their descriptors, index-aligned
#[derive(Debug, Clone, Default)]
pub struct SiftFeatures {
    pub keypoints: Vec<Keypoint>,
    pub descriptors: Vec<Descriptor>,
}

impl SiftFeatures {
    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }
}
