//! Error types for hallucination detection.
//!
//! Malformed model output is never an error: unparsable code is treated as
//! "no code found". Everything here is fatal for a batch run.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using hallulib's error type.
pub type Result<T> = std::result::Result<T, HalluError>;

/// Errors raised by the ground-truth loaders and the checker.
#[derive(Error, Debug)]
pub enum HalluError {
    /// A ground-truth file could not be read.
    #[error("failed to load ground truth from {path}: {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A ground-truth file was read but is not in the expected shape.
    #[error("malformed ground truth in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Member or version checks were requested for an undocumented library.
    #[error("library not documented: {0}")]
    NotDocumented(String),

    /// A detection level string did not name a known level.
    #[error("invalid hallucination level {value:?}, must be one of: {options}")]
    InvalidLevel { value: String, options: String },

    /// Member-level checks need a target library.
    #[error("member-level checks require a target library")]
    MissingLibrary,

    /// Fetching the package index failed.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Writing a refreshed registry failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl HalluError {
    /// Build a load error for the given path.
    pub fn load(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Load {
            path: path.into(),
            source,
        }
    }

    /// Build a parse error for the given path.
    pub fn parse(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Parse {
            path: path.into(),
            source,
        }
    }

    /// Whether this error signals a caller bug rather than bad data.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            HalluError::NotDocumented(_)
                | HalluError::InvalidLevel { .. }
                | HalluError::MissingLibrary
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_documented_message() {
        let err = HalluError::NotDocumented("numpy".to_string());
        assert_eq!(err.to_string(), "library not documented: numpy");
        assert!(err.is_configuration());
    }

    #[test]
    fn test_load_error_is_not_configuration() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err = HalluError::load("data/missing.json", io);
        assert!(err.to_string().contains("data/missing.json"));
        assert!(!err.is_configuration());
    }
}
