use thermal_core::{Descriptor, DESCRIPTOR_SIZE};

use crate::types::Plane;

/// Spatial cells per side of the descriptor window
const DESCR_WIDTH: usize = 4;
/// Orientation bins per cell
const DESCR_HIST_BINS: usize = 8;
/// Cell width in units of keypoint scale
const DESCR_SCL_FCTR: f32 = 3.0;
/// Cap on any single element relative to the vector norm
const DESCR_MAG_THR: f32 = 0.2;
/// Final scaling into the byte range
const DESCR_INT_FCTR: f32 = 512.0;

/// Gradient histogram descriptor of the patch around (x, y) in octave coordinates.
///
/// `angle` uses the keypoint convention (clockwise degrees), `scale` is the keypoint
/// blur in octave pixels. Samples are trilinearly distributed over 4x4 cells and
/// 8 orientation bins, the vector is clipped at 0.2 of its norm, renormalized and
/// scaled into 0..=255.
pub fn compute_descriptor(img: &Plane, x: f32, y: f32, angle: f32, scale: f32) -> Descriptor {
    let d = DESCR_WIDTH;
    let n = DESCR_HIST_BINS;

    let mut ori = 360.0 - angle;
    if (ori - 360.0).abs() < f32::EPSILON {
        ori = 0.0;
    }

    let (px, py) = (x.round() as isize, y.round() as isize);
    let (cos_t, sin_t) = (ori.to_radians().cos(), ori.to_radians().sin());
    let bins_per_deg = n as f32 / 360.0;
    let exp_scale = -1.0 / (d as f32 * d as f32 * 0.5);
    let hist_width = DESCR_SCL_FCTR * scale;
    let rows = img.height as isize;
    let cols = img.width as isize;

    let radius = (hist_width * std::f32::consts::SQRT_2 * (d as f32 + 1.0) * 0.5).round() as isize;
    let radius = radius.min(((rows * rows + cols * cols) as f32).sqrt() as isize);
    let (cos_t, sin_t) = (cos_t / hist_width, sin_t / hist_width);

    // Padded so that the +1 neighbours of edge cells need no bounds checks
    let mut hist = vec![0.0f32; (d + 2) * (d + 2) * (n + 2)];

    for i in -radius..=radius {
        for j in -radius..=radius {
            let c_rot = j as f32 * cos_t - i as f32 * sin_t;
            let r_rot = j as f32 * sin_t + i as f32 * cos_t;
            let rbin = r_rot + d as f32 / 2.0 - 0.5;
            let cbin = c_rot + d as f32 / 2.0 - 0.5;
            let r = py + i;
            let c = px + j;

            if rbin <= -1.0 || rbin >= d as f32 || cbin <= -1.0 || cbin >= d as f32 {
                continue;
            }
            if r <= 0 || r >= rows - 1 || c <= 0 || c >= cols - 1 {
                continue;
            }

            let (ru, cu) = (r as usize, c as usize);
            let dx = img.at(cu + 1, ru) - img.at(cu - 1, ru);
            let dy = img.at(cu, ru - 1) - img.at(cu, ru + 1);
            let weight = ((c_rot * c_rot + r_rot * r_rot) * exp_scale).exp();
            let mag = (dx * dx + dy * dy).sqrt() * weight;
            let mut grad_ori = dy.atan2(dx).to_degrees();
            if grad_ori < 0.0 {
                grad_ori += 360.0;
            }
            let obin = (grad_ori - ori) * bins_per_deg;

            let r0 = rbin.floor();
            let c0 = cbin.floor();
            let o0 = obin.floor();
            let (rf, cf, of) = (rbin - r0, cbin - c0, obin - o0);
            let mut o0 = o0 as isize;
            if o0 < 0 {
                o0 += n as isize;
            }
            if o0 >= n as isize {
                o0 -= n as isize;
            }

            let v_r1 = mag * rf;
            let v_r0 = mag - v_r1;
            let v_rc11 = v_r1 * cf;
            let v_rc10 = v_r1 - v_rc11;
            let v_rc01 = v_r0 * cf;
            let v_rc00 = v_r0 - v_rc01;
            let v_rco111 = v_rc11 * of;
            let v_rco110 = v_rc11 - v_rco111;
            let v_rco101 = v_rc10 * of;
            let v_rco100 = v_rc10 - v_rco101;
            let v_rco011 = v_rc01 * of;
            let v_rco010 = v_rc01 - v_rco011;
            let v_rco001 = v_rc00 * of;
            let v_rco000 = v_rc00 - v_rco001;

            let idx = (((r0 as isize + 1) as usize * (d + 2) + (c0 as isize + 1) as usize) * (n + 2)) + o0 as usize;
            let row_stride = (d + 2) * (n + 2);
            let col_stride = n + 2;
            hist[idx] += v_rco000;
            hist[idx + 1] += v_rco001;
            hist[idx + col_stride] += v_rco010;
            hist[idx + col_stride + 1] += v_rco011;
            hist[idx + row_stride] += v_rco100;
            hist[idx + row_stride + 1] += v_rco101;
            hist[idx + row_stride + col_stride] += v_rco110;
            hist[idx + row_stride + col_stride + 1] += v_rco111;
        }
    }

    // Fold the wrap-around orientation bins and drop the padding
    let mut dst = [0.0f32; DESCRIPTOR_SIZE];
    for i in 0..d {
        for j in 0..d {
            let idx = ((i + 1) * (d + 2) + (j + 1)) * (n + 2);
            hist[idx] += hist[idx + n];
            hist[idx + 1] += hist[idx + n + 1];
            for k in 0..n {
                dst[(i * d + j) * n + k] = hist[idx + k];
            }
        }
    }

    let norm = dst.iter().map(|v| v * v).sum::<f32>().sqrt();
    let threshold = norm * DESCR_MAG_THR;
    for v in dst.iter_mut() {
        *v = v.min(threshold);
    }
    let norm = dst.iter().map(|v| v * v).sum::<f32>().sqrt();
    let factor = DESCR_INT_FCTR / norm.max(f32::EPSILON);
    for v in dst.iter_mut() {
        *v = (*v * factor).round().clamp(0.0, 255.0);
    }
    dst
}

#[cfg(test)]
mod tests {
    use super::*;

    fn textured_plane(size: usize, seed: u32) -> Plane {
        let mut state = seed.wrapping_mul(2654435761).wrapping_add(1);
        let mut data = Vec::with_capacity(size * size);
        for y in 0..size {
            for x in 0..size {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                let noise = (state % 1000) as f32 / 1000.0;
                let pattern = ((x as f32 * 0.4).sin() * (y as f32 * 0.3).cos() + 1.0) * 0.5;
                data.push(0.7 * pattern + 0.3 * noise);
            }
        }
        Plane { width: size, height: size, data }
    }

    fn distance(a: &Descriptor, b: &Descriptor) -> f32 {
        a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum::<f32>().sqrt()
    }

    #[test]
    fn test_descriptor_range_and_norm() {
        let plane = textured_plane(64, 7);
        let desc = compute_descriptor(&plane, 32.0, 32.0, 45.0, 2.5);
        assert!(desc.iter().all(|&v| (0.0..=255.0).contains(&v) && v.fract() == 0.0));
        let norm = desc.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 512.0).abs() < 20.0, "norm = {}", norm);
    }

    #[test]
    fn test_flat_patch_gives_zero_descriptor() {
        let plane = Plane {
            width: 40,
            height: 40,
            data: vec![0.5; 1600],
        };
        let desc = compute_descriptor(&plane, 20.0, 20.0, 0.0, 2.0);
        assert!(desc.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_descriptor_distinguishes_locations() {
        let plane = textured_plane(96, 3);
        let a = compute_descriptor(&plane, 30.0, 30.0, 0.0, 2.0);
        let a_again = compute_descriptor(&plane, 30.0, 30.0, 0.0, 2.0);
        let b = compute_descriptor(&plane, 64.0, 60.0, 0.0, 2.0);
        assert_eq!(distance(&a, &a_again), 0.0);
        assert!(distance(&a, &b) > 50.0);
    }

    #[test]
    fn test_rotation_invariance() {
        // Rotate the patch 90 degrees about its centre and compensate through the angle
        let size = 65;
        let plane = textured_plane(size, 11);
        let mut rotated = Plane::zeros(size, size);
        for y in 0..size {
            for x in 0..size {
                // new(x, y) = old(y, size-1-x): image rotated 90 degrees counter-clockwise
                rotated.data[y * size + x] = plane.at(size - 1 - y, x);
            }
        }
        let c = (size / 2) as f32;
        let original = compute_descriptor(&plane, c, c, 0.0, 2.0);
        let other = compute_descriptor(&plane, 10.0, 50.0, 0.0, 2.0);

        let mut best = f32::MAX;
        for angle in [90.0f32, 270.0] {
            best = best.min(distance(&original, &compute_descriptor(&rotated, c, c, angle, 2.0)));
        }
        assert!(best < distance(&original, &other) * 0.5, "best = {}", best);
    }
}
