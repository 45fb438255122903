//! Error types for tallyocr.
//!
//! All fallible operations return [`TallyError`]. The taxonomy mirrors how callers
//! need to react, not where the failure happened:
//!
//! - `Io` - file system errors. These always bubble up unchanged.
//! - `Transport` - network / HTTP failures talking to a recognition service. Only the
//!   [`TransportKind::Connection`] and [`TransportKind::HttpStatus`] kinds are
//!   transient and eligible for retry by the batch processor.
//! - `Backend` - a backend failed in a way that is not a transport fault (subprocess
//!   crashed, task panicked).
//! - `Validation` / `Configuration` - bad input or bad configuration.
//! - `ImageProcessing` / `Serialization` - decoding and encoding problems.
//! - `MissingDependency` - a binary or model a backend needs is not installed.
//!
//! A backend *declining* to produce a result (unavailable, malformed model output,
//! nothing parseable on the page) is not an error at all: it is `Ok(None)`.
//!
//! # Example
//!
//! ```rust
//! use tallyocr::{TallyError, TransportKind};
//!
//! let err = TallyError::transport(TransportKind::HttpStatus(503), "openrouter", "service unavailable");
//! assert!(err.is_transient());
//!
//! let err = TallyError::validation("workers must be > 0");
//! assert!(!err.is_transient());
//! ```
use thiserror::Error;

/// Result type alias using `TallyError`.
pub type Result<T> = std::result::Result<T, TallyError>;

/// Classification of a transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// Could not establish or keep a connection.
    Connection,
    /// The service answered with a non-success HTTP status.
    HttpStatus(u16),
    /// The request exceeded its timeout after connecting.
    Timeout,
    /// Anything else on the wire (body decode, redirect loops, TLS).
    Protocol,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportKind::Connection => write!(f, "connection"),
            TransportKind::HttpStatus(code) => write!(f, "http {}", code),
            TransportKind::Timeout => write!(f, "timeout"),
            TransportKind::Protocol => write!(f, "protocol"),
        }
    }
}

/// Main error type for all tallyocr operations.
#[derive(Debug, Error)]
pub enum TallyError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Transport error ({kind}) in '{backend}': {message}")]
    Transport {
        kind: TransportKind,
        backend: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Backend error in '{backend}': {message}")]
    Backend { message: String, backend: String },

    #[error("Validation error: {message}")]
    Validation {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Image processing error: {message}")]
    ImageProcessing {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Serialization error: {message}")]
    Serialization {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Missing dependency: {0}")]
    MissingDependency(String),

    #[error("{0}")]
    Other(String),
}

macro_rules! error_constructor {
    ($name:ident, $variant:ident) => {
        pastey::paste! {
            #[doc = "Create a " $variant " error"]
            pub fn $name<S: Into<String>>(message: S) -> Self {
                Self::$variant {
                    message: message.into(),
                    source: None,
                }
            }

            #[doc = "Create a " $variant " error with source"]
            pub fn [<$name _with_source>]<S: Into<String>, E: std::error::Error + Send + Sync + 'static>(
                message: S,
                source: E,
            ) -> Self {
                Self::$variant {
                    message: message.into(),
                    source: Some(Box::new(source)),
                }
            }
        }
    };
}

impl TallyError {
    error_constructor!(validation, Validation);
    error_constructor!(configuration, Configuration);
    error_constructor!(image_processing, ImageProcessing);
    error_constructor!(serialization, Serialization);

    /// Create a transport error without an underlying source.
    pub fn transport<B: Into<String>, S: Into<String>>(kind: TransportKind, backend: B, message: S) -> Self {
        Self::Transport {
            kind,
            backend: backend.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Create a backend error.
    pub fn backend<B: Into<String>, S: Into<String>>(backend: B, message: S) -> Self {
        Self::Backend {
            message: message.into(),
            backend: backend.into(),
        }
    }

    /// Classify a `reqwest` failure raised while talking to `backend`.
    #[cfg(feature = "cloud")]
    pub fn from_reqwest(backend: &str, err: reqwest::Error) -> Self {
        let kind = if err.is_connect() {
            TransportKind::Connection
        } else if let Some(status) = err.status() {
            TransportKind::HttpStatus(status.as_u16())
        } else if err.is_timeout() {
            TransportKind::Timeout
        } else {
            TransportKind::Protocol
        };

        Self::Transport {
            kind,
            backend: backend.to_string(),
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }

    /// Whether the batch processor may retry the failed call.
    ///
    /// Only connection failures and HTTP error statuses qualify. Timeouts, protocol
    /// errors and everything non-transport are surfaced immediately.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TallyError::Transport {
                kind: TransportKind::Connection | TransportKind::HttpStatus(_),
                ..
            }
        )
    }
}

impl From<serde_json::Error> for TallyError {
    fn from(err: serde_json::Error) -> Self {
        TallyError::Serialization {
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }
}

impl From<image::ImageError> for TallyError {
    fn from(err: image::ImageError) -> Self {
        match err {
            image::ImageError::IoError(io) => TallyError::Io(io),
            other => TallyError::ImageProcessing {
                message: other.to_string(),
                source: Some(Box::new(other)),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_from() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: TallyError = io_err.into();
        assert!(matches!(err, TallyError::Io(_)));
        assert!(err.to_string().contains("IO error"));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_validation_error() {
        let err = TallyError::validation("invalid input");
        assert_eq!(err.to_string(), "Validation error: invalid input");
    }

    #[test]
    fn test_validation_error_with_source() {
        let source = std::io::Error::new(std::io::ErrorKind::InvalidInput, "bad param");
        let err = TallyError::validation_with_source("invalid input", source);
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_transport_connection_is_transient() {
        let err = TallyError::transport(TransportKind::Connection, "nim", "connection refused");
        assert!(err.is_transient());
        assert_eq!(
            err.to_string(),
            "Transport error (connection) in 'nim': connection refused"
        );
    }

    #[test]
    fn test_transport_http_status_is_transient() {
        let err = TallyError::transport(TransportKind::HttpStatus(429), "openrouter", "rate limited");
        assert!(err.is_transient());
        assert!(err.to_string().contains("http 429"));
    }

    #[test]
    fn test_timeout_and_protocol_are_not_transient() {
        assert!(!TallyError::transport(TransportKind::Timeout, "anthropic", "slow").is_transient());
        assert!(!TallyError::transport(TransportKind::Protocol, "anthropic", "bad body").is_transient());
    }

    #[test]
    fn test_backend_error_not_transient() {
        let err = TallyError::backend("tesseract", "process exited with 1");
        assert!(!err.is_transient());
        assert_eq!(err.to_string(), "Backend error in 'tesseract': process exited with 1");
    }

    #[test]
    fn test_serde_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: TallyError = json_err.into();
        assert!(matches!(err, TallyError::Serialization { .. }));
    }

    #[test]
    fn test_missing_dependency_error() {
        let err = TallyError::MissingDependency("tesseract not found".to_string());
        assert_eq!(err.to_string(), "Missing dependency: tesseract not found");
    }
}
