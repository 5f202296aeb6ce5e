//! Synthetic frames for pipeline tests.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use thermal_core::{Frame, Homography};

const CELL: f64 = 24.0;
const BLOB_CELL: f64 = 70.0;

fn hash(cx: i64, cy: i64, seed: u64) -> u64 {
    let mut z = (cx as u64)
        .wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ (cy as u64).wrapping_mul(0xC2B2_AE3D_27D4_EB4F)
        ^ seed.wrapping_mul(0x1656_67B1_9E37_79F9);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

fn unit(cx: i64, cy: i64, seed: u64) -> f64 {
    (hash(cx, cy, seed) >> 11) as f64 / (1u64 << 53) as f64
}

/// Checkerboard whose cells carry random brightness, over a smooth random field
fn world_intensity(u: f64, v: f64, seed: u64) -> u8 {
    let (cx, cy) = ((u / CELL).floor() as i64, (v / CELL).floor() as i64);
    let parity = if (cx + cy).rem_euclid(2) == 0 { 70.0 } else { 170.0 };
    let cell = parity + (unit(cx, cy, seed) - 0.5) * 90.0;

    let (bu, bv) = (u / BLOB_CELL, v / BLOB_CELL);
    let (bx, by) = (bu.floor(), bv.floor());
    let (fx, fy) = (bu - bx, bv - by);
    let (bx, by) = (bx as i64, by as i64);
    let corner = |dx: i64, dy: i64| unit(bx + dx, by + dy, seed ^ 0xABCD);
    let smooth = corner(0, 0) * (1.0 - fx) * (1.0 - fy)
        + corner(1, 0) * fx * (1.0 - fy)
        + corner(0, 1) * (1.0 - fx) * fy
        + corner(1, 1) * fx * fy;

    (cell * 0.75 + smooth * 60.0).round().clamp(0.0, 255.0) as u8
}

/// Texture seen through `world = ((x + 0.5) * scale - 0.5, ...)`, rotated by
/// `angle_deg` about the image centre. Matches the half-pixel convention of
/// the bilinear resize, so a `scale`x smaller frame resized up lines up with scale 1.
pub fn texture_frame(width: usize, height: usize, angle_deg: f64, scale: f64, seed: u64) -> Frame {
    let (sin, cos) = angle_deg.to_radians().sin_cos();
    let (cx, cy) = (width as f64 * scale / 2.0, height as f64 * scale / 2.0);
    let mut data = Vec::with_capacity(width * height * 3);
    for y in 0..height {
        for x in 0..width {
            let (px, py) = ((x as f64 + 0.5) * scale - 0.5, (y as f64 + 0.5) * scale - 0.5);
            let (dx, dy) = (px - cx, py - cy);
            let (u, v) = (cx + cos * dx - sin * dy, cy + sin * dx + cos * dy);
            let value = world_intensity(u, v, seed);
            // Slight tint so the frame exercises the RGB path
            data.extend_from_slice(&[value, value.saturating_sub(6), value / 2 + 60]);
        }
    }
    Frame::rgb(width, height, data).expect("texture dimensions are valid")
}

/// Reference frame rotated by `angle_deg`, with the homography mapping
/// unrotated pixel coordinates onto it
pub fn rotated_texture(width: usize, height: usize, angle_deg: f64, seed: u64) -> (Frame, Homography) {
    let frame = texture_frame(width, height, angle_deg, 1.0, seed);
    let (sin, cos) = (-angle_deg).to_radians().sin_cos();
    let (cx, cy) = (width as f64 / 2.0, height as f64 / 2.0);
    let truth = Homography::from_row_major([
        cos,
        -sin,
        cx - cos * cx + sin * cy,
        sin,
        cos,
        cy - sin * cx - cos * cy,
        0.0,
        0.0,
        1.0,
    ]);
    (frame, truth)
}

/// Independent per-pixel noise
pub fn noise_frame(width: usize, height: usize, seed: u64) -> Frame {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let data = (0..width * height).map(|_| rng.random::<u8>()).collect();
    Frame::gray(width, height, data).expect("noise dimensions are valid")
}
