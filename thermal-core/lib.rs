#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Row-major 8-bit grayscale image
pub type Image = Vec<u8>;

/// Length of a SIFT descriptor: 4x4 spatial cells x 8 orientation bins
pub const DESCRIPTOR_SIZE: usize = 128;

/// Floating point local descriptor, one per keypoint
pub type Descriptor = [f32; DESCRIPTOR_SIZE];

/// Which sensor an image came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ImageRole {
    Thermal,
    Reference,
}

impl std::fmt::Display for ImageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImageRole::Thermal => write!(f, "thermal"),
            ImageRole::Reference => write!(f, "reference"),
        }
    }
}

/// Scale-space keypoint in image coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Keypoint {
    pub x: f32,        // Subpixel x coordinate
    pub y: f32,        // Subpixel y coordinate
    pub size: f32,     // Diameter of the described neighbourhood
    pub angle: f32,    // Degrees, [0, 360)
    pub response: f32, // Absolute interpolated DoG contrast
    pub octave: usize,
}

/// Thermal keypoint `query_idx` matched to reference keypoint `train_idx`
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Match {
    pub query_idx: usize,
    pub train_idx: usize,
    pub distance: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FrameError {
    InvalidImageSize { width: usize, height: usize },
    InvalidChannels(usize),
    InvalidImageData { expected_len: usize, actual_len: usize },
}

impl std::fmt::Display for FrameError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FrameError::InvalidImageSize { width, height } => {
                write!(f, "Invalid frame dimensions: {}x{} (must be > 0)", width, height)
            }
            FrameError::InvalidChannels(c) => {
                write!(f, "Unsupported channel count: {} (expected 1 or 3)", c)
            }
            FrameError::InvalidImageData { expected_len, actual_len } => {
                write!(f, "Frame data length mismatch: expected {}, got {}", expected_len, actual_len)
            }
        }
    }
}

impl std::error::Error for FrameError {}

/// Interleaved 8-bit image with one (luma) or three (RGB) channels.
///
/// Frames are immutable once built; every transformation produces a new one.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    width: usize,
    height: usize,
    channels: usize,
    data: Vec<u8>,
}

impl Frame {
    pub fn new(width: usize, height: usize, channels: usize, data: Vec<u8>) -> Result<Self, FrameError> {
        if width == 0 || height == 0 {
            return Err(FrameError::InvalidImageSize { width, height });
        }
        if channels != 1 && channels != 3 {
            return Err(FrameError::InvalidChannels(channels));
        }
        let expected_len = width * height * channels;
        if data.len() != expected_len {
            return Err(FrameError::InvalidImageData {
                expected_len,
                actual_len: data.len(),
            });
        }
        Ok(Self { width, height, channels, data })
    }

    pub fn gray(width: usize, height: usize, data: Vec<u8>) -> Result<Self, FrameError> {
        Self::new(width, height, 1, data)
    }

    pub fn rgb(width: usize, height: usize, data: Vec<u8>) -> Result<Self, FrameError> {
        Self::new(width, height, 3, data)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    pub fn as_raw(&self) -> &[u8] {
        &self.data
    }

    pub fn into_raw(self) -> Vec<u8> {
        self.data
    }

    /// Channel values of the pixel at (x, y)
    pub fn pixel(&self, x: usize, y: usize) -> &[u8] {
        let start = (y * self.width + x) * self.channels;
        &self.data[start..start + self.channels]
    }
}

/// Planar projective transform, row-major, mapping thermal to reference pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Homography {
    pub m: [[f64; 3]; 3],
}

/// Below this |det| a normalized homography is treated as singular
const SINGULAR_DET: f64 = 1e-8;

impl Homography {
    pub fn identity() -> Self {
        Self {
            m: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
        }
    }

    /// Build from a row-major array, scaling so that h22 == 1 when possible
    pub fn from_row_major(h: [f64; 9]) -> Self {
        let mut m = [[h[0], h[1], h[2]], [h[3], h[4], h[5]], [h[6], h[7], h[8]]];
        let scale = m[2][2];
        if scale.abs() > f64::EPSILON {
            for row in m.iter_mut() {
                for v in row.iter_mut() {
                    *v /= scale;
                }
            }
        }
        Self { m }
    }

    pub fn to_row_major(&self) -> [f64; 9] {
        let m = &self.m;
        [
            m[0][0], m[0][1], m[0][2], m[1][0], m[1][1], m[1][2], m[2][0], m[2][1], m[2][2],
        ]
    }

    /// Map a point, returning `None` when it lands on the line at infinity
    pub fn apply(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        let m = &self.m;
        let w = m[2][0] * x + m[2][1] * y + m[2][2];
        if w.abs() < 1e-12 {
            return None;
        }
        let u = (m[0][0] * x + m[0][1] * y + m[0][2]) / w;
        let v = (m[1][0] * x + m[1][1] * y + m[1][2]) / w;
        Some((u, v))
    }

    pub fn determinant(&self) -> f64 {
        let m = &self.m;
        m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
            - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
            + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
    }

    /// Inverse via the adjugate, `None` for singular matrices
    pub fn inverse(&self) -> Option<Self> {
        let det = self.determinant();
        if !det.is_finite() || det.abs() < SINGULAR_DET {
            return None;
        }
        let m = &self.m;
        let inv_det = 1.0 / det;
        let adj = [
            m[1][1] * m[2][2] - m[1][2] * m[2][1],
            m[0][2] * m[2][1] - m[0][1] * m[2][2],
            m[0][1] * m[1][2] - m[0][2] * m[1][1],
            m[1][2] * m[2][0] - m[1][0] * m[2][2],
            m[0][0] * m[2][2] - m[0][2] * m[2][0],
            m[0][2] * m[1][0] - m[0][0] * m[1][2],
            m[1][0] * m[2][1] - m[1][1] * m[2][0],
            m[0][1] * m[2][0] - m[0][0] * m[2][1],
            m[0][0] * m[1][1] - m[0][1] * m[1][0],
        ];
        let inv = Self::from_row_major(adj.map(|v| v * inv_det));
        if inv.m.iter().flatten().all(|v| v.is_finite()) {
            Some(inv)
        } else {
            None
        }
    }

    /// Finite, invertible and not collapsing the plane onto a line
    pub fn is_well_conditioned(&self) -> bool {
        if !self.m.iter().flatten().all(|v| v.is_finite()) {
            return false;
        }
        if self.m[2][2].abs() < f64::EPSILON {
            return false;
        }
        let normalized = Self::from_row_major(self.to_row_major());
        normalized.determinant().abs() >= SINGULAR_DET && normalized.inverse().is_some()
    }

    /// Largest elementwise deviation from the identity after normalization
    pub fn max_deviation_from_identity(&self) -> f64 {
        let normalized = Self::from_row_major(self.to_row_major());
        let id = Self::identity();
        normalized
            .m
            .iter()
            .flatten()
            .zip(id.m.iter().flatten())
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f64::max)
    }
}

impl Default for Homography {
    fn default() -> Self {
        Self::identity()
    }
}

/// Initialize Rayon thread pool with the specified number of threads
pub fn init_thread_pool(n_threads: usize) -> Result<(), rayon::ThreadPoolBuildError> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(n_threads)
        .build_global()
}

/// Worker count used when the configuration does not pin one
pub fn default_threads() -> usize {
    num_cpus::get().max(1)
}
