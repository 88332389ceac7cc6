//! Error types for pakrat

use std::path::PathBuf;
use thiserror::Error;

/// Pakrat result type
pub type Result<T> = std::result::Result<T, PakratError>;

/// Broad error category, used by callers that only need to branch on the
/// class of failure rather than the specific condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Network,
    Validation,
    Process,
    Unknown,
}

/// Main error type for pakrat operations
#[derive(Error, Debug)]
pub enum PakratError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("The remote file either doesn't exist, is unauthorized, or is forbidden for url '{url}'.\n  {message}")]
    Network { url: String, message: String },

    #[error("Checksum for '{}' did not meet '{expected}' for checksum type '{algorithm}', actual was '{actual}'. The file may have been tampered with; the source was '{url}'.", .path.display())]
    ChecksumMismatch {
        path: PathBuf,
        url: String,
        algorithm: String,
        expected: String,
        actual: String,
    },

    #[error("A checksum was not provided for the file downloaded from '{url}'. Remote sources require checksum verification unless empty checksums are explicitly allowed.")]
    MissingChecksum { url: String },

    #[error("Expected the file at '{}' to be of length '{expected}' but the length was '{actual}'.", .path.display())]
    LengthMismatch {
        path: PathBuf,
        expected: u64,
        actual: u64,
    },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Running [{command}] was not successful. Exit code was '{exit_code}'. {reason}")]
    Process {
        command: String,
        exit_code: i32,
        reason: String,
    },

    #[error("Failed to start process '{executable}': {message}")]
    ProcessStart { executable: String, message: String },

    #[error("The operation was cancelled before the process completed")]
    Cancelled,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl PakratError {
    /// The broad category this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            PakratError::Configuration(_) => ErrorKind::Configuration,
            PakratError::Network { .. } | PakratError::Http(_) => ErrorKind::Network,
            PakratError::ChecksumMismatch { .. }
            | PakratError::MissingChecksum { .. }
            | PakratError::LengthMismatch { .. }
            | PakratError::Validation(_) => ErrorKind::Validation,
            PakratError::Process { .. }
            | PakratError::ProcessStart { .. }
            | PakratError::Cancelled => ErrorKind::Process,
            PakratError::Io(_) | PakratError::Unknown(_) => ErrorKind::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_maps_variants_to_taxonomy() {
        assert_eq!(
            PakratError::Configuration("x".into()).kind(),
            ErrorKind::Configuration
        );
        assert_eq!(
            PakratError::Network {
                url: "http://example".into(),
                message: "timed out".into()
            }
            .kind(),
            ErrorKind::Network
        );
        assert_eq!(
            PakratError::MissingChecksum {
                url: "http://example".into()
            }
            .kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            PakratError::Process {
                command: "[\"setup.exe\" /S]".into(),
                exit_code: 1603,
                reason: String::new()
            }
            .kind(),
            ErrorKind::Process
        );
        assert_eq!(PakratError::Cancelled.kind(), ErrorKind::Process);
    }

    #[test]
    fn checksum_mismatch_names_expected_and_actual() {
        let err = PakratError::ChecksumMismatch {
            path: PathBuf::from("/tmp/pkg.exe"),
            url: "https://example/pkg.exe".into(),
            algorithm: "sha256".into(),
            expected: "aaaa".into(),
            actual: "bbbb".into(),
        };
        let text = err.to_string();
        assert!(text.contains("aaaa"));
        assert!(text.contains("bbbb"));
        assert!(text.contains("sha256"));
        assert!(text.contains("https://example/pkg.exe"));
    }
}
