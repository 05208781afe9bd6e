//! Error types for ratingscan.
//!
//! Epistemic taxonomy:
//! - B_i falsified: configuration or checkpoint assumptions proven wrong
//! - I^B materialized: remote source, network or disk failures
//! - Fatal: the run cannot start or must not continue (config mismatch, no club list)
//! - K_i violated: internal invariant broken (bugs)

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for ratingscan.
#[derive(Debug, Error)]
pub enum ScanError {
    // ═══════════════════════════════════════════════════════════════════
    // B_i FALSIFIED: configuration proven wrong
    // ═══════════════════════════════════════════════════════════════════
    #[error("Configuration error: {0}")]
    Config(#[from] super::ConfigError),

    // ═══════════════════════════════════════════════════════════════════
    // I^B MATERIALIZED: remote source or disk went bad
    // ═══════════════════════════════════════════════════════════════════
    #[error("Remote source error: {0}")]
    Source(#[from] SourceError),

    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Checkpoint not found: {0}")]
    CheckpointNotFound(PathBuf),

    #[error("Checkpoint {path} is corrupt: {reason}")]
    CheckpointCorrupt { path: PathBuf, reason: String },

    // ═══════════════════════════════════════════════════════════════════
    // Fatal run errors
    // ═══════════════════════════════════════════════════════════════════
    #[error(
        "Checkpoint was written by a different run: {field} is '{checkpoint}' in the checkpoint but '{current}' now"
    )]
    ConfigMismatch {
        field: &'static str,
        checkpoint: String,
        current: String,
    },

    #[error("Could not list clubs: {0}")]
    ClubListUnavailable(#[source] SourceError),

    // ═══════════════════════════════════════════════════════════════════
    // K_i VIOLATED: bugs
    // ═══════════════════════════════════════════════════════════════════
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Errors reported by a remote rating source.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Authentication failed: check the source API token")]
    AuthenticationFailed,

    #[error("Rate limited: retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: f64 },

    #[error("Request timeout after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Request failed after {attempts} attempts: {last_error}")]
    MaxRetriesExceeded { attempts: u32, last_error: String },

    /// Failure raised by non-HTTP sources (in-memory, fixtures).
    #[error("{0}")]
    Other(String),
}

impl ScanError {
    /// Create an IO error with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Whether this error ends the run rather than a single item.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ConfigMismatch { .. } | Self::ClubListUnavailable(_) | Self::Config(_)
        )
    }
}

impl SourceError {
    /// Check if this error is worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::RateLimited { .. } | Self::Network(_) => true,
            Self::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Get retry delay hint in seconds, if applicable.
    pub fn retry_after(&self) -> Option<f64> {
        match self {
            Self::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Result type alias for ratingscan.
pub type Result<T> = std::result::Result<T, ScanError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(SourceError::Timeout(std::time::Duration::from_secs(1)).is_retryable());
        assert!(
            SourceError::Api {
                status: 503,
                message: "unavailable".to_string()
            }
            .is_retryable()
        );
        assert!(
            !SourceError::Api {
                status: 400,
                message: "bad request".to_string()
            }
            .is_retryable()
        );
        assert!(!SourceError::NotFound("player 7".to_string()).is_retryable());
        assert_eq!(
            SourceError::RateLimited {
                retry_after_secs: 2.5
            }
            .retry_after(),
            Some(2.5)
        );
    }

    #[test]
    fn test_fatal_classification() {
        let mismatch = ScanError::ConfigMismatch {
            field: "filter_prefix",
            checkpoint: "A".to_string(),
            current: "B".to_string(),
        };
        assert!(mismatch.is_fatal());
        assert!(ScanError::ClubListUnavailable(SourceError::Other("down".into())).is_fatal());
        assert!(!ScanError::Internal("x".to_string()).is_fatal());
    }
}
