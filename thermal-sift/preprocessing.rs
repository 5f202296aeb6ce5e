use rayon::prelude::*;
use thermal_core::{Frame, Image};

use crate::config::ClaheConfig;
use crate::error::{SiftError, SiftResult};

/// Grayscale images ready for feature extraction, plus the thermal frame at reference size
#[derive(Debug, Clone)]
pub struct PreparedPair {
    pub width: usize,
    pub height: usize,
    pub reference_gray: Image,
    pub thermal_gray: Image,
    pub thermal_resized: Frame,
}

/// Image preprocessing algorithms (resize, luma conversion, CLAHE)
pub struct ImagePreprocessing;

impl ImagePreprocessing {
    /// Bilinear resize with half-pixel centre alignment. Same-size input is returned as is.
    pub fn resize_bilinear(frame: &Frame, width: usize, height: usize) -> SiftResult<Frame> {
        if width == 0 || height == 0 {
            return Err(SiftError::InvalidImageSize { width, height });
        }
        if frame.dimensions() == (width, height) {
            return Ok(frame.clone());
        }

        let (src_w, src_h) = frame.dimensions();
        let channels = frame.channels();
        let src = frame.as_raw();
        let scale_x = src_w as f32 / width as f32;
        let scale_y = src_h as f32 / height as f32;

        let x_taps: Vec<(usize, usize, f32)> = (0..width)
            .map(|x| Self::linear_tap(x, scale_x, src_w))
            .collect();

        let mut out = vec![0u8; width * height * channels];
        out.par_chunks_mut(width * channels)
            .enumerate()
            .for_each(|(y, row)| {
                let (y0, y1, fy) = Self::linear_tap(y, scale_y, src_h);
                let top = &src[y0 * src_w * channels..(y0 + 1) * src_w * channels];
                let bottom = &src[y1 * src_w * channels..(y1 + 1) * src_w * channels];
                for (x, &(x0, x1, fx)) in x_taps.iter().enumerate() {
                    for c in 0..channels {
                        let t = top[x0 * channels + c] as f32 * (1.0 - fx) + top[x1 * channels + c] as f32 * fx;
                        let b = bottom[x0 * channels + c] as f32 * (1.0 - fx)
                            + bottom[x1 * channels + c] as f32 * fx;
                        let v = t * (1.0 - fy) + b * fy;
                        row[x * channels + c] = v.round().clamp(0.0, 255.0) as u8;
                    }
                }
            });

        Ok(Frame::new(width, height, channels, out)?)
    }

    /// Source indices and weight of the second tap for destination index `dst`
    fn linear_tap(dst: usize, scale: f32, src_len: usize) -> (usize, usize, f32) {
        let s = (dst as f32 + 0.5) * scale - 0.5;
        let mut i0 = s.floor();
        let mut frac = s - i0;
        if i0 < 0.0 {
            i0 = 0.0;
            frac = 0.0;
        }
        let last = (src_len - 1) as f32;
        if i0 >= last {
            i0 = last;
            frac = 0.0;
        }
        let i0 = i0 as usize;
        (i0, (i0 + 1).min(src_len - 1), frac)
    }

    /// BT.601 luma in 14-bit fixed point, single-channel frames pass through
    pub fn to_grayscale(frame: &Frame) -> SiftResult<Frame> {
        if frame.channels() == 1 {
            return Ok(frame.clone());
        }
        const R: u32 = 4899;
        const G: u32 = 9617;
        const B: u32 = 1868;
        const SHIFT: u32 = 14;

        let luma: Vec<u8> = frame
            .as_raw()
            .par_chunks(3)
            .map(|px| {
                let v = px[0] as u32 * R + px[1] as u32 * G + px[2] as u32 * B + (1 << (SHIFT - 1));
                (v >> SHIFT).min(255) as u8
            })
            .collect();

        Ok(Frame::gray(frame.width(), frame.height(), luma)?)
    }

    /// Resize the thermal frame to the reference size, convert both to luma and equalize
    pub fn prepare_pair(reference: &Frame, thermal: &Frame, clahe: &ClaheConfig) -> SiftResult<PreparedPair> {
        let (width, height) = reference.dimensions();
        let thermal_resized = Self::resize_bilinear(thermal, width, height)?;
        let equalizer = Clahe::new(clahe.clone())?;

        let equalize = |frame: &Frame| -> SiftResult<Image> {
            let gray = Self::to_grayscale(frame)?;
            equalizer.apply(gray.as_raw(), width, height)
        };
        let (reference_gray, thermal_gray) = rayon::join(|| equalize(reference), || equalize(&thermal_resized));

        Ok(PreparedPair {
            width,
            height,
            reference_gray: reference_gray?,
            thermal_gray: thermal_gray?,
            thermal_resized,
        })
    }
}

/// Contrast Limited Adaptive Histogram Equalization over a fixed tile grid
#[derive(Debug, Clone)]
pub struct Clahe {
    config: ClaheConfig,
}

impl Clahe {
    pub fn new(config: ClaheConfig) -> SiftResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ClaheConfig {
        &self.config
    }

    pub fn apply(&self, img: &[u8], width: usize, height: usize) -> SiftResult<Image> {
        if width == 0 || height == 0 {
            return Err(SiftError::InvalidImageSize { width, height });
        }
        if img.len() != width * height {
            return Err(SiftError::InvalidImageData {
                expected_len: width * height,
                actual_len: img.len(),
            });
        }

        let tiles_x = self.config.tiles_x.min(width);
        let tiles_y = self.config.tiles_y.min(height);
        let tile_w = width.div_ceil(tiles_x);
        let tile_h = height.div_ceil(tiles_y);
        let tile_area = tile_w * tile_h;

        let clip = ((self.config.clip_limit * tile_area as f32 / 256.0) as u32).max(1);

        let luts: Vec<[u8; 256]> = (0..tiles_x * tiles_y)
            .into_par_iter()
            .map(|t| {
                let mut hist = Self::tile_histogram(img, width, height, t % tiles_x, t / tiles_x, tile_w, tile_h);
                Self::clip_histogram(&mut hist, clip);
                Self::histogram_lut(&hist, tile_area)
            })
            .collect();

        Ok(Self::interpolate(img, width, height, &luts, tiles_x, tiles_y, tile_w, tile_h))
    }

    /// Histogram of one tile; tiles overhanging the image read mirrored pixels
    fn tile_histogram(
        img: &[u8],
        width: usize,
        height: usize,
        tile_x: usize,
        tile_y: usize,
        tile_w: usize,
        tile_h: usize,
    ) -> [u32; 256] {
        let mut hist = [0u32; 256];
        for y in tile_y * tile_h..(tile_y + 1) * tile_h {
            let yy = reflect_101(y as isize, height);
            let row = &img[yy * width..(yy + 1) * width];
            for x in tile_x * tile_w..(tile_x + 1) * tile_w {
                hist[row[reflect_101(x as isize, width)] as usize] += 1;
            }
        }
        hist
    }

    /// Clip bins at `limit` and hand the excess back uniformly
    fn clip_histogram(hist: &mut [u32; 256], limit: u32) {
        let mut excess = 0u32;
        for count in hist.iter_mut() {
            if *count > limit {
                excess += *count - limit;
                *count = limit;
            }
        }

        let batch = excess / 256;
        let mut residual = excess - batch * 256;
        for count in hist.iter_mut() {
            *count += batch;
        }

        if residual > 0 {
            let step = (256 / residual as usize).max(1);
            let mut i = 0;
            while i < 256 && residual > 0 {
                hist[i] += 1;
                residual -= 1;
                i += step;
            }
        }
    }

    fn histogram_lut(hist: &[u32; 256], tile_area: usize) -> [u8; 256] {
        let scale = 255.0 / tile_area as f32;
        let mut lut = [0u8; 256];
        let mut sum = 0u32;
        for (entry, &count) in lut.iter_mut().zip(hist.iter()) {
            sum += count;
            *entry = (sum as f32 * scale).round().clamp(0.0, 255.0) as u8;
        }
        lut
    }

    /// Blend the four surrounding tile mappings for every pixel
    #[allow(clippy::too_many_arguments)]
    fn interpolate(
        img: &[u8],
        width: usize,
        height: usize,
        luts: &[[u8; 256]],
        tiles_x: usize,
        tiles_y: usize,
        tile_w: usize,
        tile_h: usize,
    ) -> Image {
        let inv_tw = 1.0 / tile_w as f32;
        let inv_th = 1.0 / tile_h as f32;

        let x_taps: Vec<(usize, usize, f32)> = (0..width)
            .map(|x| Self::tile_tap(x as f32 * inv_tw - 0.5, tiles_x))
            .collect();

        let mut out = vec![0u8; width * height];
        out.par_chunks_mut(width).enumerate().for_each(|(y, row)| {
            let (ty1, ty2, ya) = Self::tile_tap(y as f32 * inv_th - 0.5, tiles_y);
            let src = &img[y * width..(y + 1) * width];
            for (x, &(tx1, tx2, xa)) in x_taps.iter().enumerate() {
                let v = src[x] as usize;
                let top = luts[ty1 * tiles_x + tx1][v] as f32 * (1.0 - xa) + luts[ty1 * tiles_x + tx2][v] as f32 * xa;
                let bottom =
                    luts[ty2 * tiles_x + tx1][v] as f32 * (1.0 - xa) + luts[ty2 * tiles_x + tx2][v] as f32 * xa;
                row[x] = (top * (1.0 - ya) + bottom * ya).round().clamp(0.0, 255.0) as u8;
            }
        });
        out
    }

    fn tile_tap(pos: f32, tiles: usize) -> (usize, usize, f32) {
        let t1 = pos.floor();
        let frac = pos - t1;
        let t2 = t1 as isize + 1;
        let t1 = (t1 as isize).max(0) as usize;
        let t2 = (t2.max(0) as usize).min(tiles - 1);
        (t1.min(tiles - 1), t2, frac)
    }
}

/// Mirror an index into `0..n` without repeating the edge sample
pub(crate) fn reflect_101(i: isize, n: usize) -> usize {
    if n == 1 {
        return 0;
    }
    let period = 2 * (n as isize - 1);
    let mut i = i.rem_euclid(period);
    if i >= n as isize {
        i = period - i;
    }
    i as usize
}
