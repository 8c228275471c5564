use thiserror::Error;

#[derive(Error, Debug)]
pub enum CtfError {
    #[error("Invalid dimensions: xsize={xsize}, ysize={ysize}, num_ctf={num_ctf} (all must be > 0)")]
    InvalidDimensions {
        xsize: usize,
        ysize: usize,
        num_ctf: usize,
    },

    #[error("Shape mismatch for {what}: expected {expected}, got {actual}")]
    ShapeMismatch {
        what: &'static str,
        expected: String,
        actual: String,
    },

    #[error("Configuration error: {0}")]
    InvalidConfig(String),

    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("GPU error: {0}")]
    Gpu(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CtfError>;

impl CtfError {
    pub(crate) fn length(what: &'static str, expected: usize, actual: usize) -> Self {
        CtfError::ShapeMismatch {
            what,
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }
}
