//! Error types for usenet-post
//!
//! One crate-wide error enum. Posting is a run-to-completion batch job, so
//! every fatal condition propagates up to the single top-level run function
//! and terminates the process there; nothing is retried.

use thiserror::Error;

/// Result type alias for usenet-post operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for usenet-post
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "article_size")
        key: Option<String>,
    },

    /// Invalid input arguments (missing path, directory-mode misuse)
    #[error("invalid input: {0}")]
    Input(String),

    /// I/O error (open, mmap, walk, NZB write)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file parse error
    #[error("configuration parse error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// NNTP protocol or connection error
    #[error("NNTP error: {0}")]
    Nntp(String),

    /// TLS setup or handshake error
    #[error("TLS error: {0}")]
    Tls(#[from] native_tls::Error),

    /// A worker task panicked or was aborted
    #[error("task failure: {0}")]
    Task(String),
}

impl Error {
    /// Shorthand for a [`Error::Config`] without a key
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: None,
        }
    }

    /// Shorthand for a [`Error::Config`] tied to a specific key
    pub fn config_key(message: impl Into<String>, key: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_displays_message() {
        let err = Error::config_key("article_size must be greater than zero", "article_size");
        assert_eq!(
            err.to_string(),
            "configuration error: article_size must be greater than zero"
        );
    }

    #[test]
    fn io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
