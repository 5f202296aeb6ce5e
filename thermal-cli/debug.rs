use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_circle_mut, draw_line_segment_mut};
use thermal_core::{Frame, Keypoint, Match};

use crate::io::to_rgb_image;
use crate::PipelineResult;

const PALETTE: [[u8; 3]; 6] = [
    [255, 64, 64],
    [64, 255, 64],
    [64, 128, 255],
    [255, 220, 0],
    [255, 0, 255],
    [0, 255, 255],
];

/// Side-by-side rendering of matched keypoints: thermal on the left,
/// reference on the right, one line per match. Unmatched keypoints are not drawn.
pub fn draw_matches(
    thermal: &Frame,
    thermal_keypoints: &[Keypoint],
    reference: &Frame,
    reference_keypoints: &[Keypoint],
    matches: &[Match],
) -> PipelineResult<Frame> {
    let left = to_rgb_image(thermal)?;
    let right = to_rgb_image(reference)?;
    let offset = left.width();
    let mut canvas = RgbImage::new(left.width() + right.width(), left.height().max(right.height()));
    image::imageops::replace(&mut canvas, &left, 0, 0);
    image::imageops::replace(&mut canvas, &right, offset as i64, 0);

    for (i, m) in matches.iter().enumerate() {
        let (Some(a), Some(b)) = (thermal_keypoints.get(m.query_idx), reference_keypoints.get(m.train_idx)) else {
            continue;
        };
        let color = Rgb(PALETTE[i % PALETTE.len()]);
        let start = (a.x, a.y);
        let end = (b.x + offset as f32, b.y);
        draw_hollow_circle_mut(&mut canvas, (start.0.round() as i32, start.1.round() as i32), 4, color);
        draw_hollow_circle_mut(&mut canvas, (end.0.round() as i32, end.1.round() as i32), 4, color);
        draw_line_segment_mut(&mut canvas, start, end, color);
    }

    let (w, h) = canvas.dimensions();
    Ok(Frame::rgb(w as usize, h as usize, canvas.into_raw())?)
}
