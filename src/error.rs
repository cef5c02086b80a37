use thiserror::Error;

/// Fatal pipeline errors. Value-level problems (unparseable numbers, bad
/// timestamps, missing fields) never reach this enum: they are coerced to
/// missing at the point of extraction.
#[derive(Debug, Error)]
pub enum ChurnError {
    #[error("empty input: {0}")]
    EmptyInput(&'static str),

    #[error("pipeline is not fitted - call fit before transform/predict")]
    NotFitted,

    #[error("artifact error: {0}")]
    Artifact(String),
}

pub type Result<T> = std::result::Result<T, ChurnError>;
