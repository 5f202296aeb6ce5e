use thermal_core::FrameError;

#[derive(Debug, Clone, PartialEq)]
pub enum SiftError {
    InvalidImageSize { width: usize, height: usize },
    InvalidImageData { expected_len: usize, actual_len: usize },
    InvalidChannels(usize),
    ImageTooSmall { width: usize, height: usize, min_size: usize },
    InvalidConfig(String),
}

impl std::fmt::Display for SiftError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SiftError::InvalidImageSize { width, height } => {
                write!(f, "Invalid image dimensions: {}x{} (must be > 0)", width, height)
            }
            SiftError::InvalidImageData { expected_len, actual_len } => {
                write!(f, "Image data length mismatch: expected {}, got {}", expected_len, actual_len)
            }
            SiftError::InvalidChannels(c) => {
                write!(f, "Unsupported channel count: {}", c)
            }
            SiftError::ImageTooSmall { width, height, min_size } => {
                write!(f, "Image {}x{} too small (minimum {}x{})", width, height, min_size, min_size)
            }
            SiftError::InvalidConfig(reason) => {
                write!(f, "Invalid configuration: {}", reason)
            }
        }
    }
}

impl std::error::Error for SiftError {}

impl From<FrameError> for SiftError {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::InvalidImageSize { width, height } => SiftError::InvalidImageSize { width, height },
            FrameError::InvalidChannels(c) => SiftError::InvalidChannels(c),
            FrameError::InvalidImageData { expected_len, actual_len } => {
                SiftError::InvalidImageData { expected_len, actual_len }
            }
        }
    }
}

pub type SiftResult<T> = Result<T, SiftError>;
