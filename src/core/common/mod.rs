// src/core/common/mod.rs

//! Shared error type and result alias.

use thiserror::Error;

/// Main error type for retrieval-engine operations.
///
/// Each variant is one failure category. Which failures abort a batch and
/// which are recorded and skipped is decided at the call sites, not here:
/// ingestion returns a per-document breakdown while retrieval fails wholly.
#[derive(Debug, Error)]
pub enum RagError {
    /// Graph store unreachable after the configured number of attempts.
    #[error("connection failed after {attempts} attempt(s): {message}")]
    Connection {
        /// Number of connection attempts made before giving up.
        attempts: u32,
        /// Description of the last underlying failure.
        message: String,
    },

    /// A single graph-store operation failed. Not retried automatically;
    /// the caller decides on retry policy.
    #[error("query failed: {0}")]
    Query(String),

    /// Reasoner output failed schema validation for one chunk.
    #[error("extraction failed: {0}")]
    Extraction(String),

    /// Unknown retrieval mode, or a mode whose precondition is unmet.
    #[error("mode not supported: {0}")]
    ModeNotSupported(String),

    /// A required vector index has not been built.
    #[error("vector index missing: {name}")]
    IndexMissing {
        /// Name of the absent index.
        name: String,
    },

    /// Vector arithmetic attempted over mismatched dimensionalities.
    #[error("vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimensionality the operation expected.
        expected: usize,
        /// Dimensionality actually supplied.
        actual: usize,
    },

    /// Cosine similarity is undefined for a zero-magnitude vector.
    #[error("vector magnitude is zero")]
    ZeroMagnitude,

    /// Invalid configuration value.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Reasoner output that could not be parsed at all.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Transport failure from a model client.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Filesystem failure, e.g. while loading a configuration file.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A referenced record does not exist.
    #[error("not found: {0}")]
    NotFound(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, RagError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let err = RagError::Connection { attempts: 3, message: "refused".to_string() };
        assert_eq!(err.to_string(), "connection failed after 3 attempt(s): refused");

        let err = RagError::IndexMissing { name: "entity_embeddings".to_string() };
        assert_eq!(err.to_string(), "vector index missing: entity_embeddings");

        let err = RagError::DimensionMismatch { expected: 384, actual: 768 };
        assert_eq!(err.to_string(), "vector dimension mismatch: expected 384, got 768");
    }

    #[test]
    fn test_io_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: RagError = io_err.into();
        assert!(matches!(err, RagError::Io(_)));
    }
}
