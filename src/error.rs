use thiserror::Error;

/// Error kinds recognized by the pipeline (spec.md §7). Each variant maps to
/// a specific non-zero exit code in `main`.
#[derive(Error, Debug)]
pub enum TrimError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("input format error: {0}")]
    InputFormat(String),

    #[error("pipeline stall in stage '{stage}': {detail}")]
    Stall { stage: String, detail: String },

    #[error("worker error: {0}")]
    Worker(String),
}

impl TrimError {
    /// Exit code contract from spec.md §6: 0 success, non-zero otherwise.
    /// Distinct small integers let callers distinguish failure classes
    /// without parsing the message.
    pub fn exit_code(&self) -> i32 {
        match self {
            TrimError::Io(_) => 2,
            TrimError::Config(_) => 2,
            TrimError::InputFormat(_) => 3,
            TrimError::Stall { .. } => 4,
            TrimError::Worker(_) => 5,
        }
    }
}

pub type Result<T> = std::result::Result<T, TrimError>;
