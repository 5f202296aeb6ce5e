use rayon::prelude::*;
use thermal_core::{Frame, Homography};

use crate::{OverlayError, PipelineResult};

/// Resamples a source frame into a destination canvas through a homography
pub trait Warper: Send + Sync {
    /// `h` maps source pixel coordinates to destination pixel coordinates
    fn warp(&self, src: &Frame, h: &Homography, width: usize, height: usize) -> PipelineResult<Frame>;
}

/// Perspective warp with bilinear sampling and a constant zero border
#[derive(Debug, Clone, Copy, Default)]
pub struct PerspectiveWarper;

impl Warper for PerspectiveWarper {
    fn warp(&self, src: &Frame, h: &Homography, width: usize, height: usize) -> PipelineResult<Frame> {
        let inv = h
            .inverse()
            .ok_or_else(|| OverlayError::HomographyFailed("homography is not invertible".to_string()))?;
        let channels = src.channels();
        let mut out = vec![0u8; width * height * channels];
        if out.is_empty() {
            return Err(OverlayError::WarpDimensionMismatch {
                expected: (width, height),
                actual: (0, 0),
            });
        }

        out.par_chunks_mut(width * channels).enumerate().for_each(|(y, row)| {
            for x in 0..width {
                if let Some((sx, sy)) = inv.apply(x as f64, y as f64) {
                    sample_bilinear(src, sx, sy, &mut row[x * channels..(x + 1) * channels]);
                }
            }
        });

        Ok(Frame::new(width, height, channels, out)?)
    }
}

/// Bilinear sample at `(sx, sy)`; taps outside the source read as zero
fn sample_bilinear(src: &Frame, sx: f64, sy: f64, dst: &mut [u8]) {
    let (w, h) = (src.width() as f64, src.height() as f64);
    if !(sx > -1.0 && sy > -1.0 && sx < w && sy < h) {
        return;
    }
    let x0 = sx.floor();
    let y0 = sy.floor();
    let fx = sx - x0;
    let fy = sy - y0;
    let taps = [
        (x0, y0, (1.0 - fx) * (1.0 - fy)),
        (x0 + 1.0, y0, fx * (1.0 - fy)),
        (x0, y0 + 1.0, (1.0 - fx) * fy),
        (x0 + 1.0, y0 + 1.0, fx * fy),
    ];

    for (c, out) in dst.iter_mut().enumerate() {
        let mut acc = 0.0;
        for &(tx, ty, weight) in &taps {
            if tx >= 0.0 && ty >= 0.0 && tx < w && ty < h {
                acc += weight * src.pixel(tx as usize, ty as usize)[c] as f64;
            }
        }
        *out = acc.round().clamp(0.0, 255.0) as u8;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient_frame(w: usize, h: usize) -> Frame {
        let data = (0..w * h).map(|i| ((i % w) * 4 + (i / w) * 2) as u8).collect();
        Frame::gray(w, h, data).unwrap()
    }

    #[test]
    fn test_identity_warp_reproduces_source() {
        let src = gradient_frame(40, 30);
        let out = PerspectiveWarper.warp(&src, &Homography::identity(), 40, 30).unwrap();
        assert_eq!(out, src);
    }

    #[test]
    fn test_translation_shifts_and_zero_fills() {
        let src = gradient_frame(40, 30);
        let shift = Homography::from_row_major([1.0, 0.0, 5.0, 0.0, 1.0, 3.0, 0.0, 0.0, 1.0]);
        let out = PerspectiveWarper.warp(&src, &shift, 40, 30).unwrap();
        assert_eq!(out.pixel(10, 10), src.pixel(5, 7));
        assert_eq!(out.pixel(39, 29), src.pixel(34, 26));
        // Uncovered border stays black
        assert_eq!(out.pixel(2, 10)[0], 0);
        assert_eq!(out.pixel(10, 1)[0], 0);
    }

    #[test]
    fn test_half_pixel_translation_interpolates() {
        let src = Frame::gray(4, 1, vec![0, 100, 200, 250]).unwrap();
        let shift = Homography::from_row_major([1.0, 0.0, -0.5, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0]);
        let out = PerspectiveWarper.warp(&src, &shift, 3, 1).unwrap();
        assert_eq!(out.as_raw(), &[50, 150, 225]);
    }

    #[test]
    fn test_output_takes_requested_canvas_and_channels() {
        let src = Frame::rgb(20, 10, vec![90; 600]).unwrap();
        let scale = Homography::from_row_major([2.0, 0.0, 0.0, 0.0, 2.0, 0.0, 0.0, 0.0, 1.0]);
        let out = PerspectiveWarper.warp(&src, &scale, 40, 20).unwrap();
        assert_eq!(out.dimensions(), (40, 20));
        assert_eq!(out.channels(), 3);
        assert_eq!(out.pixel(20, 10), &[90, 90, 90]);
    }

    #[test]
    fn test_singular_homography_is_rejected() {
        let src = gradient_frame(8, 8);
        let singular = Homography {
            m: [[1.0, 2.0, 0.0], [2.0, 4.0, 0.0], [0.0, 0.0, 1.0]],
        };
        assert!(matches!(
            PerspectiveWarper.warp(&src, &singular, 8, 8),
            Err(OverlayError::HomographyFailed(_))
        ));
    }
}
