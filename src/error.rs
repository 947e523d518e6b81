//! Error types for log ingestion.
//!
//! Every stage of the pipeline reports recoverable failures through [`LogError`].
//! Variants carry structured context so callers can decide whether a retry makes
//! sense without string matching.
//!
//! ## Error Categories
//!
//! - **Transport Errors**: HEAD/GET failures, unexpected HTTP status codes,
//!   servers that ignore the requested byte range
//! - **Corruption Errors**: a codec reported an error or stopped making progress
//! - **Parse Errors**: wire framing or schema violations in a message
//! - **File Errors**: local reads, cache writes and destination files
//! - **Config Errors**: invalid replay configuration
//! - **Aborted**: the caller's cancellation token fired
//!
//! ## Recovery and Retry
//!
//! ```rust
//! use drivelog::LogError;
//!
//! let error = LogError::transport("https://example.com/rlog.zst", "connection reset");
//! if error.is_retryable() {
//!     for suggestion in error.recovery_suggestions() {
//!         println!("  - {}", suggestion);
//!     }
//! }
//! ```
//!
//! Arena exhaustion is deliberately absent: an allocation that cannot be
//! satisfied aborts the process like any other Rust allocation failure.

use std::path::PathBuf;
use thiserror::Error;

use crate::decompress::Codec;

/// Result type alias for log operations.
pub type Result<T, E = LogError> = std::result::Result<T, E>;

/// Main error type for log ingestion.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum LogError {
    #[error("Transport failure for {url}: {reason}")]
    Transport {
        url: String,
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("HTTP status {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Server sent more than the requested range {start}-{end} for {url}")]
    RangeOverflow { url: String, start: u64, end: u64 },

    #[error("{codec} stream is corrupt: {details}")]
    Corrupt { codec: Codec, details: String },

    #[error("Parse error in {context}: {details}")]
    Parse { context: String, details: String },

    #[error("No events could be parsed from {source_name}")]
    NoEvents { source_name: String },

    #[error("Operation aborted")]
    Aborted,

    #[error("File error: {path}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration: {reason}")]
    Config { reason: String },
}

impl LogError {
    /// Returns whether this error is potentially recoverable through retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            LogError::Transport { .. } => true,
            LogError::HttpStatus { status, .. } => *status >= 500 || *status == 429,
            LogError::RangeOverflow { .. } => true,
            LogError::Corrupt { .. } => false,
            LogError::Parse { .. } => false,
            LogError::NoEvents { .. } => false,
            LogError::Aborted => false,
            LogError::File { .. } => false,
            LogError::Config { .. } => false,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            LogError::Transport { .. } => vec![
                "Check network connectivity",
                "Verify the log URL has not expired",
                "Retry the download",
            ],
            LogError::HttpStatus { .. } => vec![
                "Verify the log URL and its access token",
                "Check that the server supports byte-range requests",
            ],
            LogError::RangeOverflow { .. } => vec![
                "Retry with a single part (larger chunk size)",
                "Check that the server honors Range headers",
            ],
            LogError::Corrupt { .. } => vec![
                "Delete any cached copy and download the log again",
                "Verify the file extension matches the compression format",
            ],
            LogError::Parse { .. } => vec![
                "Check that the log was produced by a compatible logger",
                "Verify source data integrity",
            ],
            LogError::NoEvents { .. } => vec![
                "Check the allow-list and block-list service names",
                "Verify the log is not empty",
            ],
            LogError::Aborted => vec!["Restart the operation once cancellation is cleared"],
            LogError::File { .. } => vec![
                "Check file exists and is readable",
                "Ensure sufficient disk space",
                "Check file permissions",
            ],
            LogError::Config { .. } => vec![
                "Review the replay configuration file",
                "Check flag names and numeric ranges",
            ],
        }
    }

    /// Helper constructor for transport errors.
    pub fn transport(url: impl Into<String>, reason: impl Into<String>) -> Self {
        LogError::Transport { url: url.into(), reason: reason.into(), source: None }
    }

    /// Helper constructor for transport errors with source.
    pub fn transport_with_source(
        url: impl Into<String>,
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        LogError::Transport { url: url.into(), reason: reason.into(), source: Some(source) }
    }

    /// Helper constructor for file errors with path context.
    pub fn file_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        LogError::File { path: path.into(), source }
    }

    /// Helper constructor for corrupt codec streams.
    pub fn corrupt(codec: Codec, details: impl Into<String>) -> Self {
        LogError::Corrupt { codec, details: details.into() }
    }

    /// Helper constructor for parse errors.
    pub fn parse(context: impl Into<String>, details: impl Into<String>) -> Self {
        LogError::Parse { context: context.into(), details: details.into() }
    }

    /// Helper constructor for configuration errors.
    pub fn config(reason: impl Into<String>) -> Self {
        LogError::Config { reason: reason.into() }
    }
}

impl From<std::io::Error> for LogError {
    fn from(err: std::io::Error) -> Self {
        LogError::File { path: PathBuf::from("<unknown>"), source: err }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
          #[test]
          fn error_messages_carry_their_context(
            url in "https?://[a-z]{1,12}\\.com/[a-z0-9]{1,8}",
            reason in ".*",
            status in 100u16..600u16,
            start in 0u64..1_000_000u64,
            len in 1u64..1_000_000u64,
          ) {
            let transport = LogError::transport(url.clone(), reason.clone());
            let msg = transport.to_string();
            prop_assert!(msg.contains(&url));
            prop_assert!(msg.contains(&reason));

            let http = LogError::HttpStatus { url: url.clone(), status };
            prop_assert!(http.to_string().contains(&status.to_string()));

            let overflow = LogError::RangeOverflow { url, start, end: start + len };
            let overflow_msg = overflow.to_string();
            prop_assert!(overflow_msg.contains(&start.to_string()));
            prop_assert!(overflow_msg.contains(&(start + len).to_string()));
          }

          #[test]
          fn source_chain_is_preserved(base_message in ".*") {
            let inner: Box<dyn std::error::Error + Send + Sync> =
              Box::new(std::io::Error::other(base_message.clone()));
            let err = LogError::transport_with_source("http://x", "top", inner);

            let source = std::error::Error::source(&err);
            prop_assert!(source.is_some());
            prop_assert_eq!(source.map(|s| s.to_string()), Some(base_message));
          }
        }
    }

    #[test]
    fn error_traits_validation() {
        fn assert_send_sync_static<T: Send + Sync + 'static>() {}
        assert_send_sync_static::<LogError>();

        let error = LogError::Aborted;
        let _: &dyn std::error::Error = &error;
    }

    #[test]
    fn retry_classification() {
        assert!(LogError::transport("u", "reset").is_retryable());
        assert!(LogError::HttpStatus { url: "u".into(), status: 503 }.is_retryable());
        assert!(!LogError::HttpStatus { url: "u".into(), status: 404 }.is_retryable());
        assert!(!LogError::corrupt(Codec::Bzip2, "crc").is_retryable());
        assert!(!LogError::Aborted.is_retryable());

        for err in [
            LogError::transport("u", "r"),
            LogError::corrupt(Codec::Zstd, "bad"),
            LogError::parse("ctx", "details"),
            LogError::config("bad flag"),
        ] {
            let suggestions = err.recovery_suggestions();
            assert!(!suggestions.is_empty());
            assert!(suggestions.iter().all(|s| s.len() > 5));
        }
    }

    #[test]
    fn from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing log");
        match LogError::from(io_err) {
            LogError::File { source, .. } => assert_eq!(source.to_string(), "missing log"),
            other => panic!("Expected File error variant, got {:?}", other),
        }
    }
}
