//! Error types shared across Longshot crates.

use std::path::PathBuf;

/// Top-level error type for Longshot operations.
///
/// The first group of variants is the job failure taxonomy: any of them
/// ends a conversion job and is recorded verbatim as its `error_message`.
#[derive(Debug, thiserror::Error)]
pub enum LongshotError {
    #[error("Decode error: {message}")]
    Decode { message: String },

    #[error("No frames could be decoded from the input video")]
    NoFrames,

    #[error(
        "None of the {pairs} consecutive frame pairs could be aligned; \
         the alignment tolerance (approx_diff) may be too strict"
    )]
    AllFramesUnmatched { pairs: usize },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("Invalid source file: {message}")]
    InvalidSource { message: String },

    #[error("Task not found: {task_id}")]
    TaskNotFound { task_id: String },

    #[error("Task {task_id} is not completed yet (current status: {status})")]
    TaskNotReady { task_id: String, status: String },

    #[error("Task {task_id} is being processed and cannot be deleted")]
    TaskBusy { task_id: String },

    #[error("Result file not found: {path}")]
    ResultMissing { path: PathBuf },

    #[error("Conversion cancelled")]
    Cancelled,

    #[error("Unsupported operation: {message}")]
    Unsupported { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using LongshotError.
pub type LongshotResult<T> = Result<T, LongshotError>;

impl LongshotError {
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage {
            message: msg.into(),
        }
    }

    pub fn invalid_source(msg: impl Into<String>) -> Self {
        Self::InvalidSource {
            message: msg.into(),
        }
    }

    pub fn not_found(task_id: impl Into<String>) -> Self {
        Self::TaskNotFound {
            task_id: task_id.into(),
        }
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported {
            message: msg.into(),
        }
    }

    /// Whether the error means the addressed task or file does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::TaskNotFound { .. } | Self::ResultMissing { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unmatched_message_mentions_tolerance() {
        let err = LongshotError::AllFramesUnmatched { pairs: 12 };
        let msg = err.to_string();
        assert!(msg.contains("12"));
        assert!(msg.contains("approx_diff"));
    }

    #[test]
    fn test_not_found_classification() {
        assert!(LongshotError::not_found("abc").is_not_found());
        assert!(LongshotError::ResultMissing {
            path: PathBuf::from("/tmp/x.jpg")
        }
        .is_not_found());
        assert!(!LongshotError::NoFrames.is_not_found());
    }
}
