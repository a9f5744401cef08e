use std::path::PathBuf;

use thiserror::Error;

/// Every way an optimize request can fail. Cleanup failures are deliberately
/// absent: they are logged where they happen and never reach the caller.
#[derive(Error, Debug)]
pub enum OptimizeError {
    #[error("Invalid value for '{field}': {reason}")]
    InvalidInput { field: &'static str, reason: String },

    #[error("Encoder binary not found (searched: {})", format_searched(.searched))]
    BinaryNotFound { searched: Vec<PathBuf> },

    #[error("Encoder binary {path:?} is not executable: {reason}")]
    BinaryNotExecutable { path: PathBuf, reason: String },

    #[error("Encoder failed: {details}")]
    TranscodeFailed { details: String },

    #[error("Encoder did not finish within {seconds}s and was terminated")]
    TranscodeTimedOut { seconds: u64 },

    #[error("Encoder exited successfully but produced no output at {path:?}")]
    OutputMissing { path: PathBuf },

    #[error("Worker is shutting down")]
    ShuttingDown,

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

pub type OptimizeResult<T> = std::result::Result<T, OptimizeError>;

impl OptimizeError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        OptimizeError::InvalidInput {
            field,
            reason: reason.into(),
        }
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        OptimizeError::Io {
            context: context.into(),
            source,
        }
    }

    /// Stable identifier used in error payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            OptimizeError::InvalidInput { .. } => "invalid_input",
            OptimizeError::BinaryNotFound { .. } => "binary_not_found",
            OptimizeError::BinaryNotExecutable { .. } => "binary_not_executable",
            OptimizeError::TranscodeFailed { .. } => "transcode_failed",
            OptimizeError::TranscodeTimedOut { .. } => "transcode_timed_out",
            OptimizeError::OutputMissing { .. } => "output_missing",
            OptimizeError::ShuttingDown => "shutting_down",
            OptimizeError::Io { .. } => "io",
        }
    }
}

fn format_searched(searched: &[PathBuf]) -> String {
    if searched.is_empty() {
        return "no candidates".to_string();
    }
    searched
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_input_names_the_field() {
        let err = OptimizeError::invalid("codec", "unsupported codec 'h264; rm -rf /'");
        assert_eq!(err.kind(), "invalid_input");
        assert!(err.to_string().contains("'codec'"));
    }

    #[test]
    fn binary_not_found_lists_candidates() {
        let err = OptimizeError::BinaryNotFound {
            searched: vec![PathBuf::from("/usr/bin/ffmpeg"), PathBuf::from("/opt/ffmpeg")],
        };
        assert_eq!(
            err.to_string(),
            "Encoder binary not found (searched: /usr/bin/ffmpeg, /opt/ffmpeg)"
        );
    }
}
