use nalgebra::{DMatrix, Matrix3, SVD};
use thermal_core::Homography;

/// Pixel coordinate pair
pub type Point2 = (f64, f64);

const SVD_MAX_ITERATIONS: usize = 1000;

/// Index of the first point with a NaN or infinite coordinate
pub fn first_non_finite(points: &[Point2]) -> Option<usize> {
    points.iter().position(|&(x, y)| !x.is_finite() || !y.is_finite())
}

fn all_finite(points: &[Point2]) -> bool {
    first_non_finite(points).is_none()
}

/// Similarity normalization: centroid to the origin, mean distance sqrt(2).
///
/// Returns `None` when every point coincides or a coordinate is not finite.
pub fn normalize_points(points: &[Point2]) -> Option<(Vec<Point2>, Matrix3<f64>)> {
    if points.is_empty() || !all_finite(points) {
        return None;
    }
    let n = points.len() as f64;
    let (sx, sy) = points.iter().fold((0.0, 0.0), |(sx, sy), &(x, y)| (sx + x, sy + y));
    let (cx, cy) = (sx / n, sy / n);

    let avg_dist = points.iter().map(|&(x, y)| (x - cx).hypot(y - cy)).sum::<f64>() / n;
    if !avg_dist.is_finite() || avg_dist < 1e-10 {
        return None;
    }

    let scale = std::f64::consts::SQRT_2 / avg_dist;
    let normalized = points
        .iter()
        .map(|&(x, y)| ((x - cx) * scale, (y - cy) * scale))
        .collect();
    #[rustfmt::skip]
    let t = Matrix3::new(
        scale, 0.0, -cx * scale,
        0.0, scale, -cy * scale,
        0.0, 0.0, 1.0,
    );
    Some((normalized, t))
}

/// Least-squares homography from four or more correspondences (normalized DLT).
///
/// Returns `None` for fewer than four points, mismatched lengths, non-finite or
/// coincident points, or a solution that is not invertible.
pub fn dlt(src: &[Point2], dst: &[Point2]) -> Option<Homography> {
    if src.len() < 4 || src.len() != dst.len() {
        return None;
    }
    let (src_n, src_t) = normalize_points(src)?;
    let (dst_n, dst_t) = normalize_points(dst)?;

    let mut ata = [[0.0f64; 9]; 9];
    for (&(x, y), &(xp, yp)) in src_n.iter().zip(&dst_n) {
        let row1 = [-x, -y, -1.0, 0.0, 0.0, 0.0, x * xp, y * xp, xp];
        let row2 = [0.0, 0.0, 0.0, -x, -y, -1.0, x * yp, y * yp, yp];
        for j in 0..9 {
            for k in 0..9 {
                ata[j][k] += row1[j] * row1[k] + row2[j] * row2[k];
            }
        }
    }

    let h = null_vector(&ata)?;
    let h_norm = Matrix3::from_row_slice(&h);
    let h_full = dst_t.try_inverse()? * h_norm * src_t;

    let scale = h_full[(2, 2)];
    if !scale.is_finite() || scale.abs() < 1e-10 {
        return None;
    }
    let mut row_major = [0.0; 9];
    for r in 0..3 {
        for c in 0..3 {
            row_major[r * 3 + c] = h_full[(r, c)];
        }
    }
    let homography = Homography::from_row_major(row_major);
    homography.is_well_conditioned().then_some(homography)
}

/// Right singular vector of the smallest singular value
fn null_vector(ata: &[[f64; 9]; 9]) -> Option<[f64; 9]> {
    let data: Vec<f64> = ata.iter().flatten().copied().collect();
    let svd = SVD::try_new(
        DMatrix::from_row_slice(9, 9, &data),
        false,
        true,
        f64::EPSILON,
        SVD_MAX_ITERATIONS,
    )?;
    let smallest = svd.singular_values.imin();
    let v_t = svd.v_t?;

    let mut out = [0.0; 9];
    for (o, &v) in out.iter_mut().zip(v_t.row(smallest).iter()) {
        *o = v;
    }
    out.iter().all(|v| v.is_finite()).then_some(out)
}

/// Reprojection error of `src` mapped through `h`, measured against `dst`
pub fn reprojection_error(h: &Homography, src: Point2, dst: Point2) -> f64 {
    match h.apply(src.0, src.1) {
        Some((u, v)) => (u - dst.0).hypot(v - dst.1),
        None => f64::INFINITY,
    }
}

/// True when any three of the points are (nearly) on one line
pub fn has_collinear_triple(points: &[Point2]) -> bool {
    let n = points.len();
    for i in 0..n {
        for j in (i + 1)..n {
            for k in (j + 1)..n {
                if nearly_collinear(points[i], points[j], points[k]) {
                    return true;
                }
            }
        }
    }
    false
}

fn nearly_collinear(a: Point2, b: Point2, c: Point2) -> bool {
    let (abx, aby) = (b.0 - a.0, b.1 - a.1);
    let (acx, acy) = (c.0 - a.0, c.1 - a.1);
    let lab = abx.hypot(aby);
    let lac = acx.hypot(acy);
    if lab < 1e-9 || lac < 1e-9 {
        return true;
    }
    // |sin| of the angle at `a`
    (abx * acy - aby * acx).abs() / (lab * lac) < 1e-3
}

/// Signed doubled area of a triangle
pub(crate) fn orientation(a: Point2, b: Point2, c: Point2) -> f64 {
    (b.0 - a.0) * (c.1 - a.1) - (b.1 - a.1) * (c.0 - a.0)
}
