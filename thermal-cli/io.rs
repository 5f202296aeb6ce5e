use std::path::Path;

use image::{ColorType, GrayImage, ImageReader, RgbImage};
use thermal_core::Frame;

use crate::{OverlayError, PipelineResult};

/// Decode an image file into a gray or RGB frame.
///
/// Single-channel sources stay single-channel; everything else becomes RGB.
pub fn load_frame(path: &Path) -> PipelineResult<Frame> {
    let decoded = ImageReader::open(path)
        .map_err(|e| OverlayError::io(path, e))?
        .with_guessed_format()
        .map_err(|e| OverlayError::io(path, e))?
        .decode()
        .map_err(|e| OverlayError::io(path, e))?;

    match decoded.color() {
        ColorType::L8 | ColorType::L16 => {
            let gray = decoded.to_luma8();
            let (w, h) = gray.dimensions();
            Ok(Frame::gray(w as usize, h as usize, gray.into_raw())?)
        }
        _ => {
            let rgb = decoded.to_rgb8();
            let (w, h) = rgb.dimensions();
            Ok(Frame::rgb(w as usize, h as usize, rgb.into_raw())?)
        }
    }
}

/// RGB copy of a frame for drawing
pub fn to_rgb_image(frame: &Frame) -> PipelineResult<RgbImage> {
    RgbImage::from_raw(
        frame.width() as u32,
        frame.height() as u32,
        crate::compose::rgb_bytes(frame),
    )
    .ok_or_else(|| OverlayError::InvalidInput("frame buffer does not match its dimensions".to_string()))
}

/// Encode a frame; the format follows the file extension
pub fn save_frame(path: &Path, frame: &Frame) -> PipelineResult<()> {
    let (w, h) = (frame.width() as u32, frame.height() as u32);
    let result = match frame.channels() {
        1 => GrayImage::from_raw(w, h, frame.as_raw().to_vec()).map(|img| img.save(path)),
        _ => RgbImage::from_raw(w, h, frame.as_raw().to_vec()).map(|img| img.save(path)),
    };
    match result {
        Some(saved) => saved.map_err(|e| OverlayError::io(path, e)),
        None => Err(OverlayError::InvalidInput(format!(
            "frame buffer does not match {}x{}x{}",
            w,
            h,
            frame.channels()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_png_round_trip_keeps_channels() {
        let dir = tempfile::tempdir().unwrap();
        let rgb = Frame::rgb(4, 2, (0..24).map(|v| v * 10).collect()).unwrap();
        let gray = Frame::gray(3, 3, (0..9).map(|v| v * 20).collect()).unwrap();

        let rgb_path = dir.path().join("color.png");
        let gray_path = dir.path().join("gray.png");
        save_frame(&rgb_path, &rgb).unwrap();
        save_frame(&gray_path, &gray).unwrap();

        assert_eq!(load_frame(&rgb_path).unwrap(), rgb);
        assert_eq!(load_frame(&gray_path).unwrap(), gray);
    }

    #[test]
    fn test_missing_and_corrupt_files_are_io_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope_T.jpg");
        assert!(matches!(load_frame(&missing), Err(OverlayError::Io { .. })));

        let corrupt = dir.path().join("bad_Z.png");
        std::fs::write(&corrupt, b"definitely not a png").unwrap();
        match load_frame(&corrupt) {
            Err(OverlayError::Io { path, .. }) => assert!(path.ends_with("bad_Z.png")),
            other => panic!("expected Io error, got {:?}", other),
        }
    }

    #[test]
    fn test_gray_frames_expand_for_drawing() {
        let gray = Frame::gray(2, 1, vec![7, 200]).unwrap();
        let img = to_rgb_image(&gray).unwrap();
        assert_eq!(img.as_raw(), &vec![7, 7, 7, 200, 200, 200]);
    }
}
