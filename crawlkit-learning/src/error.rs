use thiserror::Error;

#[derive(Debug, Error)]
pub enum LearningError {
    #[error("vector dimension mismatch: store expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("unknown record id: {0}")]
    UnknownId(String),

    #[error(transparent)]
    Core(#[from] crawlkit_core::CoreError),
}

pub type LearningResult<T> = std::result::Result<T, LearningError>;
