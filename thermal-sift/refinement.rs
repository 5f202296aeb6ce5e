use crate::config::SiftConfig;
use crate::pyramid::IMAGE_BORDER;
use crate::types::Plane;

/// Upper bound on quadratic fit iterations per extremum
pub(crate) const MAX_INTERP_STEPS: usize = 5;

pub(crate) const ORI_HIST_BINS: usize = 36;
pub(crate) const ORI_SIG_FCTR: f32 = 1.5;
pub(crate) const ORI_RADIUS: f32 = 3.0 * ORI_SIG_FCTR;
pub(crate) const ORI_PEAK_RATIO: f32 = 0.8;

/// Extremum location after sub-pixel and sub-scale refinement
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Extremum {
    pub layer: usize,
    pub x: usize,
    pub y: usize,
    /// Offset (x, y, scale) from the integer location, each in [-0.5, 0.5]
    pub offset: [f32; 3],
    pub contrast: f32,
}

/// Strict 26-neighbour maximum above `threshold` or minimum below `-threshold`
pub(crate) fn is_local_extremum(prev: &Plane, curr: &Plane, next: &Plane, x: usize, y: usize, threshold: f32) -> bool {
    let val = curr.at(x, y);
    if val.abs() <= threshold {
        return false;
    }

    if val > 0.0 {
        all_neighbours(curr, x, y, false, |v| val >= v)
            && all_neighbours(prev, x, y, true, |v| val >= v)
            && all_neighbours(next, x, y, true, |v| val >= v)
    } else {
        all_neighbours(curr, x, y, false, |v| val <= v)
            && all_neighbours(prev, x, y, true, |v| val <= v)
            && all_neighbours(next, x, y, true, |v| val <= v)
    }
}

fn all_neighbours(plane: &Plane, x: usize, y: usize, include_centre: bool, pred: impl Fn(f32) -> bool) -> bool {
    for yy in y - 1..=y + 1 {
        for xx in x - 1..=x + 1 {
            if !include_centre && xx == x && yy == y {
                continue;
            }
            if !pred(plane.at(xx, yy)) {
                return false;
            }
        }
    }
    true
}

/// Fit a 3-D quadratic around a DoG extremum, moving to the neighbouring sample
/// while the offset exceeds half a pixel. Rejects low contrast and edge responses.
pub(crate) fn interpolate_extremum(
    dogs: &[Plane],
    layer: usize,
    x: usize,
    y: usize,
    cfg: &SiftConfig,
) -> Option<Extremum> {
    let s = cfg.octave_layers as isize;
    let (w, h) = (dogs[0].width as isize, dogs[0].height as isize);
    let border = IMAGE_BORDER as isize;
    let (mut layer, mut x, mut y) = (layer as isize, x as isize, y as isize);

    let mut step = 0;
    let (offset, gradient, hessian) = loop {
        if step >= MAX_INTERP_STEPS {
            return None;
        }
        let (grad, hess) = derivatives(dogs, layer as usize, x as usize, y as usize);
        let solution = solve_3x3(&hess, &grad)?;
        let offset = [-solution[0], -solution[1], -solution[2]];

        if offset.iter().all(|o| o.abs() < 0.5) {
            break (offset, grad, hess);
        }
        if offset.iter().any(|o| o.abs() > (i32::MAX / 3) as f64) {
            return None;
        }

        x += offset[0].round() as isize;
        y += offset[1].round() as isize;
        layer += offset[2].round() as isize;

        if layer < 1 || layer > s || x < border || x >= w - border || y < border || y >= h - border {
            return None;
        }
        step += 1;
    };

    let (lu, xu, yu) = (layer as usize, x as usize, y as usize);
    let t: f64 = (0..3).map(|i| gradient[i] * offset[i]).sum();
    let contrast = dogs[lu].at(xu, yu) as f64 + t * 0.5;
    if contrast.abs() * (cfg.octave_layers as f64) < cfg.contrast_threshold as f64 {
        return None;
    }

    // Ratio of principal curvatures from the spatial Hessian
    let (dxx, dyy, dxy) = (hessian[0][0], hessian[1][1], hessian[0][1]);
    let tr = dxx + dyy;
    let det = dxx * dyy - dxy * dxy;
    let edge = cfg.edge_threshold as f64;
    if det <= 0.0 || tr * tr * edge >= (edge + 1.0) * (edge + 1.0) * det {
        return None;
    }

    Some(Extremum {
        layer: lu,
        x: xu,
        y: yu,
        offset: [offset[0] as f32, offset[1] as f32, offset[2] as f32],
        contrast: contrast as f32,
    })
}

/// Central-difference gradient and Hessian of the DoG stack at (x, y, layer)
fn derivatives(dogs: &[Plane], layer: usize, x: usize, y: usize) -> ([f64; 3], [[f64; 3]; 3]) {
    let (prev, curr, next) = (&dogs[layer - 1], &dogs[layer], &dogs[layer + 1]);
    let c = |p: &Plane, xx: usize, yy: usize| p.at(xx, yy) as f64;

    let grad = [
        (c(curr, x + 1, y) - c(curr, x - 1, y)) * 0.5,
        (c(curr, x, y + 1) - c(curr, x, y - 1)) * 0.5,
        (c(next, x, y) - c(prev, x, y)) * 0.5,
    ];

    let v2 = c(curr, x, y) * 2.0;
    let dxx = c(curr, x + 1, y) + c(curr, x - 1, y) - v2;
    let dyy = c(curr, x, y + 1) + c(curr, x, y - 1) - v2;
    let dss = c(next, x, y) + c(prev, x, y) - v2;
    let dxy = (c(curr, x + 1, y + 1) - c(curr, x - 1, y + 1) - c(curr, x + 1, y - 1) + c(curr, x - 1, y - 1)) * 0.25;
    let dxs = (c(next, x + 1, y) - c(next, x - 1, y) - c(prev, x + 1, y) + c(prev, x - 1, y)) * 0.25;
    let dys = (c(next, x, y + 1) - c(next, x, y - 1) - c(prev, x, y + 1) + c(prev, x, y - 1)) * 0.25;

    (grad, [[dxx, dxy, dxs], [dxy, dyy, dys], [dxs, dys, dss]])
}

/// Cramer's rule; `None` for a singular system
fn solve_3x3(a: &[[f64; 3]; 3], b: &[f64; 3]) -> Option<[f64; 3]> {
    let det3 = |m: &[[f64; 3]; 3]| {
        m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1]) - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
            + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
    };
    let det = det3(a);
    if !det.is_finite() || det.abs() < 1e-18 {
        return None;
    }
    let mut out = [0.0; 3];
    for (col, slot) in out.iter_mut().enumerate() {
        let mut m = *a;
        for row in 0..3 {
            m[row][col] = b[row];
        }
        *slot = det3(&m) / det;
    }
    Some(out)
}

/// Smoothed histogram of gradient directions around (x, y), Gaussian weighted
pub(crate) fn orientation_histogram(img: &Plane, x: usize, y: usize, radius: usize, sigma: f32) -> [f32; ORI_HIST_BINS] {
    let n = ORI_HIST_BINS as f32;
    let exp_scale = -1.0 / (2.0 * sigma * sigma);
    let mut raw = [0.0f32; ORI_HIST_BINS];
    let r = radius as isize;
    let (w, h) = (img.width as isize, img.height as isize);

    for i in -r..=r {
        let yy = y as isize + i;
        if yy <= 0 || yy >= h - 1 {
            continue;
        }
        for j in -r..=r {
            let xx = x as isize + j;
            if xx <= 0 || xx >= w - 1 {
                continue;
            }
            let (xu, yu) = (xx as usize, yy as usize);
            let dx = img.at(xu + 1, yu) - img.at(xu - 1, yu);
            let dy = img.at(xu, yu - 1) - img.at(xu, yu + 1);
            let weight = (((i * i + j * j) as f32) * exp_scale).exp();
            let mag = (dx * dx + dy * dy).sqrt();
            let mut ori = dy.atan2(dx).to_degrees();
            if ori < 0.0 {
                ori += 360.0;
            }
            let mut bin = (ori * n / 360.0).round() as isize;
            if bin >= ORI_HIST_BINS as isize {
                bin -= ORI_HIST_BINS as isize;
            }
            if bin < 0 {
                bin += ORI_HIST_BINS as isize;
            }
            raw[bin as usize] += weight * mag;
        }
    }

    let at = |i: isize| raw[i.rem_euclid(ORI_HIST_BINS as isize) as usize];
    let mut hist = [0.0f32; ORI_HIST_BINS];
    for (i, slot) in hist.iter_mut().enumerate() {
        let i = i as isize;
        *slot = (at(i - 2) + at(i + 2)) * (1.0 / 16.0) + (at(i - 1) + at(i + 1)) * (4.0 / 16.0) + at(i) * (6.0 / 16.0);
    }
    hist
}

/// Keypoint angles for every histogram peak within `ORI_PEAK_RATIO` of the maximum
pub(crate) fn dominant_orientations(hist: &[f32; ORI_HIST_BINS]) -> Vec<f32> {
    let n = ORI_HIST_BINS;
    let max = hist.iter().cloned().fold(0.0f32, f32::max);
    let threshold = max * ORI_PEAK_RATIO;
    let mut angles = Vec::new();

    for j in 0..n {
        let l = if j > 0 { j - 1 } else { n - 1 };
        let r = if j < n - 1 { j + 1 } else { 0 };
        if hist[j] > hist[l] && hist[j] > hist[r] && hist[j] >= threshold {
            let mut bin = j as f32 + 0.5 * (hist[l] - hist[r]) / (hist[l] - 2.0 * hist[j] + hist[r]);
            if bin < 0.0 {
                bin += n as f32;
            } else if bin >= n as f32 {
                bin -= n as f32;
            }
            let mut angle = 360.0 - (360.0 / n as f32) * bin;
            if (angle - 360.0).abs() < f32::EPSILON {
                angle = 0.0;
            }
            angles.push(angle);
        }
    }
    angles
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blob_stack(size: usize, centre: (f32, f32), sigmas: [f32; 3], amplitude: f32) -> Vec<Plane> {
        sigmas
            .iter()
            .map(|&s| {
                let mut p = Plane::zeros(size, size);
                for y in 0..size {
                    for x in 0..size {
                        let dx = x as f32 - centre.0;
                        let dy = y as f32 - centre.1;
                        p.data[y * size + x] = amplitude * (-(dx * dx + dy * dy) / (2.0 * s * s)).exp();
                    }
                }
                p
            })
            .collect()
    }

    #[test]
    fn test_local_extremum_detection() {
        let stack = blob_stack(21, (10.0, 10.0), [2.0, 2.0, 2.0], 0.2);
        // Same blob on every layer: the centre ties its neighbours across scale
        assert!(is_local_extremum(&stack[0], &stack[1], &stack[2], 10, 10, 0.01));
        assert!(!is_local_extremum(&stack[0], &stack[1], &stack[2], 11, 10, 0.01));
        assert!(!is_local_extremum(&stack[0], &stack[1], &stack[2], 10, 10, 0.5));
    }

    #[test]
    fn test_interpolation_recovers_subpixel_centre() {
        let mut stack = blob_stack(31, (15.3, 14.8), [2.0, 2.2, 2.0], 0.3);
        // Peak in scale at the middle layer
        for v in stack[1].data.iter_mut() {
            *v *= 1.2;
        }
        let cfg = SiftConfig::default();
        let ext = interpolate_extremum(&stack, 1, 15, 15, &cfg).expect("blob centre is a stable extremum");
        let x = ext.x as f32 + ext.offset[0];
        let y = ext.y as f32 + ext.offset[1];
        assert!((x - 15.3).abs() < 0.15, "x = {}", x);
        assert!((y - 14.8).abs() < 0.15, "y = {}", y);
        assert!(ext.contrast > 0.3);
    }

    #[test]
    fn test_interpolation_rejects_low_contrast() {
        let mut stack = blob_stack(31, (15.0, 15.0), [2.0, 2.2, 2.0], 0.005);
        for v in stack[1].data.iter_mut() {
            *v *= 1.2;
        }
        assert!(interpolate_extremum(&stack, 1, 15, 15, &SiftConfig::default()).is_none());
    }

    #[test]
    fn test_interpolation_rejects_edges() {
        // Ridge along y: strong curvature in x only
        let size = 31;
        let stack: Vec<Plane> = [1.0f32, 1.2, 1.0]
            .iter()
            .map(|&gain| {
                let mut p = Plane::zeros(size, size);
                for y in 0..size {
                    for x in 0..size {
                        let dx = x as f32 - 15.0;
                        let dy = y as f32 - 15.0;
                        p.data[y * size + x] = gain * 0.3 * (-(dx * dx) / 8.0 - (dy * dy) / 2000.0).exp();
                    }
                }
                p
            })
            .collect();
        assert!(interpolate_extremum(&stack, 1, 15, 15, &SiftConfig::default()).is_none());
    }

    #[test]
    fn test_orientation_of_horizontal_ramp() {
        // Intensity increasing to the right: gradient points along +x
        let size = 41;
        let mut p = Plane::zeros(size, size);
        for y in 0..size {
            for x in 0..size {
                p.data[y * size + x] = x as f32 / size as f32;
            }
        }
        let hist = orientation_histogram(&p, 20, 20, 8, 3.0);
        let angles = dominant_orientations(&hist);
        assert_eq!(angles.len(), 1);
        assert!(angles[0].abs() < 1e-3 || (angles[0] - 360.0).abs() < 1e-3);
    }

    #[test]
    fn test_orientation_of_vertical_ramp() {
        // Intensity increasing downwards: image-up gradient is negative, 270 degrees,
        // reported with the clockwise keypoint convention as 90
        let size = 41;
        let mut p = Plane::zeros(size, size);
        for y in 0..size {
            for x in 0..size {
                p.data[y * size + x] = y as f32 / size as f32;
            }
        }
        let hist = orientation_histogram(&p, 20, 20, 8, 3.0);
        let angles = dominant_orientations(&hist);
        assert_eq!(angles.len(), 1);
        assert!((angles[0] - 90.0).abs() < 1e-3, "angle = {}", angles[0]);
    }

    #[test]
    fn test_solve_singular() {
        let a = [[1.0, 2.0, 3.0], [2.0, 4.0, 6.0], [1.0, 0.0, 1.0]];
        assert!(solve_3x3(&a, &[1.0, 2.0, 3.0]).is_none());
        let id = [[2.0, 0.0, 0.0], [0.0, 4.0, 0.0], [0.0, 0.0, 1.0]];
        assert_eq!(solve_3x3(&id, &[2.0, 2.0, 3.0]), Some([1.0, 0.5, 3.0]));
    }
}
