//! Error types for Strand runtime operations.

use std::fmt;

/// Coarse classification of an [`AiError`].
///
/// Retry decisions and caller-side matching work on the kind rather than on
/// the full error value, so an exhausted retry loop still reports the kind of
/// the failure that ended it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Authentication,
    Request,
    Api,
    Response,
    Unsupported,
    Cancelled,
    Configuration,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Authentication => "authentication",
            ErrorKind::Request => "request",
            ErrorKind::Api => "api",
            ErrorKind::Response => "response",
            ErrorKind::Unsupported => "unsupported",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Configuration => "configuration",
        };
        f.write_str(name)
    }
}

/// The main error type for generation operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AiError {
    /// Missing or rejected credentials
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Failed to build or send a request, including timeouts
    #[error("Request error: {0}")]
    Request(String),

    /// Non-success status from the remote endpoint
    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// Malformed or unparsable response body
    #[error("Response error: {0}")]
    Response(String),

    /// Feature not offered by the provider
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// Caller-initiated cancellation
    #[error("Operation cancelled")]
    Cancelled,

    /// Invalid construction-time configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Final failure of a retry loop
    #[error("{kind} error after {attempts} attempt(s): {source}")]
    Exhausted {
        kind: ErrorKind,
        attempts: u32,
        #[source]
        source: Box<AiError>,
    },
}

impl AiError {
    /// Create an authentication error
    pub fn authentication(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    /// Create a request error
    pub fn request(msg: impl Into<String>) -> Self {
        Self::Request(msg.into())
    }

    /// Create an API status error
    pub fn api(status: u16, msg: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: msg.into(),
        }
    }

    /// Create a response error
    pub fn response(msg: impl Into<String>) -> Self {
        Self::Response(msg.into())
    }

    /// Create an unsupported operation error
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }

    /// Create a configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Wrap a final error with the number of attempts that were made.
    ///
    /// Wrapping an already exhausted error replaces its attempt count rather
    /// than nesting.
    pub fn exhausted(error: AiError, attempts: u32) -> Self {
        let source = match error {
            AiError::Exhausted { source, .. } => source,
            other => Box::new(other),
        };
        Self::Exhausted {
            kind: source.kind(),
            attempts,
            source,
        }
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            AiError::Authentication(_) => ErrorKind::Authentication,
            AiError::Request(_) => ErrorKind::Request,
            AiError::Api { .. } => ErrorKind::Api,
            AiError::Response(_) => ErrorKind::Response,
            AiError::Unsupported(_) => ErrorKind::Unsupported,
            AiError::Cancelled => ErrorKind::Cancelled,
            AiError::Configuration(_) => ErrorKind::Configuration,
            AiError::Exhausted { kind, .. } => *kind,
        }
    }

    /// Number of attempts recorded on an exhausted error
    pub fn attempts(&self) -> Option<u32> {
        match self {
            AiError::Exhausted { attempts, .. } => Some(*attempts),
            _ => None,
        }
    }

    /// Check if this is a retryable error
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Request | ErrorKind::Api | ErrorKind::Response
        )
    }

    /// Check if this error is a cancellation, directly or wrapped
    pub fn is_cancelled(&self) -> bool {
        self.kind() == ErrorKind::Cancelled
    }
}

impl From<reqwest::Error> for AiError {
    fn from(err: reqwest::Error) -> Self {
        Self::Request(err.to_string())
    }
}

impl From<serde_json::Error> for AiError {
    fn from(err: serde_json::Error) -> Self {
        Self::Response(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_kinds_follow_taxonomy() {
        assert!(AiError::request("connection reset").is_retryable());
        assert!(AiError::api(503, "unavailable").is_retryable());
        assert!(AiError::response("truncated body").is_retryable());

        assert!(!AiError::authentication("empty api key").is_retryable());
        assert!(!AiError::unsupported("streaming").is_retryable());
        assert!(!AiError::Cancelled.is_retryable());
        assert!(!AiError::configuration("no encoder").is_retryable());
    }

    #[test]
    fn exhausted_reports_kind_and_attempts() {
        let err = AiError::exhausted(AiError::api(500, "boom"), 4);

        assert_eq!(err.kind(), ErrorKind::Api);
        assert_eq!(err.attempts(), Some(4));
        let text = err.to_string();
        assert!(text.contains("api error after 4 attempt(s)"), "{text}");
        assert!(text.contains("boom"), "{text}");
    }

    #[test]
    fn exhausted_does_not_nest() {
        let inner = AiError::exhausted(AiError::request("reset"), 2);
        let outer = AiError::exhausted(inner, 3);

        match outer {
            AiError::Exhausted {
                attempts, source, ..
            } => {
                assert_eq!(attempts, 3);
                assert!(matches!(*source, AiError::Request(_)));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn cancellation_survives_wrapping() {
        let err = AiError::exhausted(AiError::Cancelled, 1);
        assert!(err.is_cancelled());
        assert!(!err.is_retryable());
    }
}
