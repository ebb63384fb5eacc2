//! Custom error types for sparkpost-relay.

use std::fmt;
use std::io;

/// Main error type for relay operations.
#[derive(Debug)]
pub enum Error {
    /// Missing or invalid start-up configuration
    Config(String),
    /// The message cannot be translated or the template was rejected
    Validation(ValidationError),
    /// The vendor answered with a non-success status and no usable error body
    Vendor { status: u16, message: String },
    /// HTTP client errors (connect, timeout, body read)
    Http(reqwest::Error),
    /// JSON encoding/decoding errors
    Json(serde_json::Error),
    /// I/O errors (listener binding, file reads)
    Io(io::Error),
    /// Any failure during a send, wrapped uniformly
    Transport {
        message: String,
        source: Option<Box<Error>>,
    },
}

/// Errors detected before any network call is made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The vendor requires a subject
    MissingSubject,
    /// An address could not be parsed
    InvalidAddress(String),
    /// Two tokens normalize to the same substitution variable
    AmbiguousToken {
        first: String,
        second: String,
        variable: String,
    },
    /// A token has no alphanumeric characters to build a variable from
    EmptyTokenName(String),
    /// The vendor preview rejected the template
    TemplateInvalid(String),
}

impl Error {
    /// Wrap any error into the uniform transport error, keeping it as the source.
    #[must_use]
    pub fn transport(cause: Self) -> Self {
        match cause {
            already @ Self::Transport { .. } => already,
            other => Self::Transport {
                message: other.to_string(),
                source: Some(Box::new(other)),
            },
        }
    }

    /// The validation error behind this error, looking through transport wrapping.
    #[must_use]
    pub fn validation(&self) -> Option<&ValidationError> {
        match self {
            Self::Validation(v) => Some(v),
            Self::Transport {
                source: Some(inner),
                ..
            } => inner.validation(),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration error: {msg}"),
            Self::Validation(e) => write!(f, "{e}"),
            Self::Vendor { status, message } => write!(f, "vendor error (HTTP {status}): {message}"),
            Self::Http(e) => write!(f, "HTTP error: {e}"),
            Self::Json(e) => write!(f, "JSON error: {e}"),
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Transport { message, .. } => write!(f, "{message}"),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingSubject => write!(f, "a subject is required"),
            Self::InvalidAddress(addr) => write!(f, "invalid address: {addr}"),
            Self::AmbiguousToken {
                first,
                second,
                variable,
            } => write!(
                f,
                "tokens {first} and {second} both map to substitution variable {variable}"
            ),
            Self::EmptyTokenName(token) => {
                write!(f, "token {token} has no characters usable as a variable name")
            }
            Self::TemplateInvalid(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Validation(e) => Some(e),
            Self::Http(e) => Some(e),
            Self::Json(e) => Some(e),
            Self::Io(e) => Some(e),
            Self::Transport {
                source: Some(inner),
                ..
            } => Some(inner.as_ref()),
            _ => None,
        }
    }
}

impl std::error::Error for ValidationError {}

impl From<ValidationError> for Error {
    fn from(e: ValidationError) -> Self {
        Self::Validation(e)
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Self::Http(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<Error> for io::Error {
    fn from(e: Error) -> Self {
        match e {
            Error::Io(io_err) => io_err,
            other => Self::other(other.to_string()),
        }
    }
}

/// Result type alias for relay operations.
pub type Result<T> = std::result::Result<T, Error>;
