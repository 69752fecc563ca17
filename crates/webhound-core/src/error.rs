//! Error types for the webhound request layer
//!
//! This module defines the network error taxonomy consumed by the retry
//! policy, using thiserror for ergonomic error definitions and anyhow for
//! flexible error contexts.

use std::time::Duration;
use thiserror::Error;

/// Main error type for request execution
#[derive(Error, Debug)]
pub enum Error {
    /// Generic transport-level failure
    #[error("network error for {url}: {message}")]
    Network {
        url: String,
        status_code: Option<u16>,
        message: String,
    },

    /// Failure to establish a connection to the target
    #[error("connection error for {url}: {message}")]
    Connection { url: String, message: String },

    /// The per-attempt timeout elapsed before a response arrived
    #[error("request to {url} timed out after {timeout:?}")]
    Timeout { url: String, timeout: Duration },

    /// A configured egress endpoint failed to carry the request
    #[error("egress endpoint {endpoint} failed for {url}: {message}")]
    Proxy {
        url: String,
        endpoint: String,
        message: String,
    },

    /// The request could not be constructed (invalid URL, bad header)
    #[error("invalid request: {message}")]
    InvalidRequest { message: String },

    /// TLS verification failed
    #[error("TLS error for {url}: {message}")]
    Tls { url: String, message: String },

    /// Configuration rejected at construction time
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// IO errors
    #[error("IO error: {message}")]
    Io {
        message: String,
        #[source]
        source: std::io::Error,
    },

    /// JSON parsing and serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: serde_json::Error,
    },

    /// Generic internal error with context
    #[error("internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Convenience type alias for Results using our Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// The target URL the failure relates to, if the variant carries one
    pub fn url(&self) -> Option<&str> {
        match self {
            Error::Network { url, .. }
            | Error::Connection { url, .. }
            | Error::Timeout { url, .. }
            | Error::Proxy { url, .. }
            | Error::Tls { url, .. } => Some(url),
            _ => None,
        }
    }

    /// HTTP status code associated with the failure, if any
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Error::Network { status_code, .. } => *status_code,
            _ => None,
        }
    }
}

// Conversion implementations
impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json {
            message: err.to_string(),
            source: err,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io {
            message: err.to_string(),
            source: err,
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Internal {
            message: err.to_string(),
            source: err,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Connection {
            url: "http://example.com".to_string(),
            message: "refused".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "connection error for http://example.com: refused"
        );
    }

    #[test]
    fn test_timeout_carries_value() {
        let err = Error::Timeout {
            url: "http://example.com".to_string(),
            timeout: Duration::from_secs(10),
        };
        assert!(err.to_string().contains("10s"));
    }

    #[test]
    fn test_url_accessor() {
        let err = Error::Proxy {
            url: "http://example.com".to_string(),
            endpoint: "http://proxy:8080".to_string(),
            message: "unreachable".to_string(),
        };
        assert_eq!(err.url(), Some("http://example.com"));

        let err = Error::Configuration {
            message: "bad".to_string(),
        };
        assert_eq!(err.url(), None);
    }

    #[test]
    fn test_status_code_accessor() {
        let err = Error::Network {
            url: "http://example.com".to_string(),
            status_code: Some(502),
            message: "bad gateway".to_string(),
        };
        assert_eq!(err.status_code(), Some(502));
    }
}
