use rayon::prelude::*;
use thermal_core::Image;

use crate::config::SiftConfig;
use crate::preprocessing::reflect_101;
use crate::types::{OctaveLevel, Plane};

/// Blur already present in a camera image
const INITIAL_SIGMA: f32 = 0.5;

/// Pixels excluded from extremum search at every octave edge
pub(crate) const IMAGE_BORDER: usize = 5;

/// Octaves narrower than this have no searchable interior
const MIN_OCTAVE_DIM: usize = 2 * IMAGE_BORDER + 3;

/// Gaussian and difference-of-Gaussian stacks of one octave
#[derive(Debug, Clone)]
pub struct Octave {
    pub level: OctaveLevel,
    /// `octave_layers + 3` progressively blurred images
    pub gaussians: Vec<Plane>,
    /// `octave_layers + 2` adjacent differences
    pub dogs: Vec<Plane>,
}

#[derive(Debug, Clone)]
pub struct ScaleSpace {
    pub octaves: Vec<Octave>,
}

/// Gaussian scale-space construction for multi-scale extremum detection
pub struct ImagePyramid;

impl ImagePyramid {
    /// Number of octaves for a base image of the given size
    pub fn octave_count(width: usize, height: usize, double_base: bool) -> usize {
        let factor = if double_base { 2 } else { 1 };
        let min_dim = (width.min(height) * factor).max(1) as f32;
        let count = (min_dim.log2() - 2.0).round().max(1.0) as usize;

        // Drop trailing octaves whose interior is empty
        let mut usable = 0;
        let (mut w, mut h) = (width * factor, height * factor);
        while usable < count && w >= MIN_OCTAVE_DIM && h >= MIN_OCTAVE_DIM {
            usable += 1;
            w /= 2;
            h /= 2;
        }
        usable.max(1)
    }

    /// Incremental blur applied to reach each layer from the previous one
    pub fn layer_sigmas(sigma: f32, octave_layers: usize) -> Vec<f32> {
        let k = 2f32.powf(1.0 / octave_layers as f32);
        let mut sigmas = Vec::with_capacity(octave_layers + 3);
        sigmas.push(sigma);
        for i in 1..octave_layers + 3 {
            let prev = k.powi(i as i32 - 1) * sigma;
            let total = prev * k;
            sigmas.push((total * total - prev * prev).sqrt());
        }
        sigmas
    }

    /// Base image blurred to `sigma`, optionally upsampled 2x first
    pub fn base_image(img: &Image, width: usize, height: usize, cfg: &SiftConfig) -> Plane {
        let plane = Plane::from_image(img, width, height);
        if cfg.double_base {
            let doubled = plane.upsample_double();
            let diff = (cfg.sigma * cfg.sigma - 4.0 * INITIAL_SIGMA * INITIAL_SIGMA).max(0.01).sqrt();
            gaussian_blur(&doubled, diff)
        } else {
            let diff = (cfg.sigma * cfg.sigma - INITIAL_SIGMA * INITIAL_SIGMA).max(0.01).sqrt();
            gaussian_blur(&plane, diff)
        }
    }

    /// Build Gaussian and DoG stacks for every octave
    pub fn build(img: &Image, width: usize, height: usize, cfg: &SiftConfig) -> ScaleSpace {
        let base = Self::base_image(img, width, height, cfg);
        let n_octaves = Self::octave_count(width, height, cfg.double_base);
        let sigmas = Self::layer_sigmas(cfg.sigma, cfg.octave_layers);
        let base_scale = if cfg.double_base { 0.5 } else { 1.0 };
        let s = cfg.octave_layers;

        let mut octaves: Vec<Octave> = Vec::with_capacity(n_octaves);
        for o in 0..n_octaves {
            let first = match octaves.last() {
                None => base.clone(),
                Some(prev) => prev.gaussians[s].subsample_half(),
            };

            let mut gaussians = Vec::with_capacity(s + 3);
            gaussians.push(first);
            for &sig in &sigmas[1..] {
                let next = gaussian_blur(&gaussians[gaussians.len() - 1], sig);
                gaussians.push(next);
            }

            let dogs: Vec<Plane> = gaussians
                .par_windows(2)
                .map(|pair| difference(&pair[1], &pair[0]))
                .collect();

            let level = OctaveLevel {
                octave: o,
                width: gaussians[0].width,
                height: gaussians[0].height,
                scale: base_scale * (1u32 << o) as f32,
            };
            octaves.push(Octave { level, gaussians, dogs });
        }

        ScaleSpace { octaves }
    }
}

/// Normalized 1-D Gaussian kernel covering about four standard deviations
pub fn gaussian_kernel(sigma: f32) -> Vec<f32> {
    let size = ((sigma * 8.0 + 1.0).round() as usize) | 1;
    let radius = (size / 2).max(1);
    let denom = -0.5 / (sigma * sigma);
    let mut kernel: Vec<f32> = (0..=2 * radius)
        .map(|i| {
            let d = i as f32 - radius as f32;
            (d * d * denom).exp()
        })
        .collect();
    let sum: f32 = kernel.iter().sum();
    kernel.iter_mut().for_each(|v| *v /= sum);
    kernel
}

/// Separable Gaussian blur with mirrored borders, rows processed in parallel
pub fn gaussian_blur(src: &Plane, sigma: f32) -> Plane {
    let kernel = gaussian_kernel(sigma);
    let radius = kernel.len() / 2;
    let (w, h) = (src.width, src.height);

    let mut tmp = vec![0.0f32; w * h];
    tmp.par_chunks_mut(w).enumerate().for_each(|(y, row)| {
        let src_row = &src.data[y * w..(y + 1) * w];
        for (x, out) in row.iter_mut().enumerate() {
            let mut acc = 0.0;
            if x >= radius && x + radius < w {
                let window = &src_row[x - radius..=x + radius];
                for (wk, v) in kernel.iter().zip(window) {
                    acc += wk * v;
                }
            } else {
                for (k, wk) in kernel.iter().enumerate() {
                    let xx = reflect_101(x as isize + k as isize - radius as isize, w);
                    acc += wk * src_row[xx];
                }
            }
            *out = acc;
        }
    });

    let mut data = vec![0.0f32; w * h];
    data.par_chunks_mut(w).enumerate().for_each(|(y, row)| {
        for (k, wk) in kernel.iter().enumerate() {
            let yy = reflect_101(y as isize + k as isize - radius as isize, h);
            let tmp_row = &tmp[yy * w..(yy + 1) * w];
            for (out, v) in row.iter_mut().zip(tmp_row) {
                *out += wk * v;
            }
        }
    });

    Plane { width: w, height: h, data }
}

fn difference(upper: &Plane, lower: &Plane) -> Plane {
    Plane {
        width: upper.width,
        height: upper.height,
        data: upper.data.iter().zip(&lower.data).map(|(a, b)| a - b).collect(),
    }
}
