#[derive(Debug, Clone, PartialEq)]
pub enum MatchError {
    InsufficientPoints { found: usize, required: usize },
    MismatchedPoints { src: usize, dst: usize },
    NoConsensus { best_inliers: usize, required: usize },
    NonFinitePoint { index: usize },
    DegenerateModel(String),
    InvalidConfig(String),
}

impl std::fmt::Display for MatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchError::InsufficientPoints { found, required } => {
                write!(f, "Insufficient correspondences: {} (need at least {})", found, required)
            }
            MatchError::MismatchedPoints { src, dst } => {
                write!(f, "Point set sizes differ: {} source vs {} destination", src, dst)
            }
            MatchError::NoConsensus { best_inliers, required } => {
                write!(f, "No consensus: best model has {} inliers (need {})", best_inliers, required)
            }
            MatchError::NonFinitePoint { index } => {
                write!(f, "Correspondence {} has a non-finite coordinate", index)
            }
            MatchError::DegenerateModel(reason) => {
                write!(f, "Degenerate model: {}", reason)
            }
            MatchError::InvalidConfig(reason) => {
                write!(f, "Invalid configuration: {}", reason)
            }
        }
    }
}

impl std::error::Error for MatchError {}

pub type MatchResult<T> = Result<T, MatchError>;
