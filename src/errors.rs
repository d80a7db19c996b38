//! Error types and categorization for the load test.
//!
//! Failures fall into two families with very different blast radii:
//! [`ConfigError`] is fatal and aborts the run before any load is generated,
//! while [`RequestError`] covers a single request and is always recovered at
//! the executor boundary so one bad response cannot stop a running test.
//! [`ErrorCategory`] buckets per-request failures for the final report.

use std::fmt;
use std::net::SocketAddr;

use thiserror::Error;

/// Fatal configuration errors. The only error family that is allowed to
/// terminate the process, and only before dispatch starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} environment variable must be set")]
    MissingVar(&'static str),

    #[error("invalid value for {var}: '{value}': {reason}")]
    InvalidValue {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("could not parse URL '{0}': expected scheme://host[:port][/path]")]
    MalformedUrl(String),

    #[error("unsupported scheme '{0}': only http and https are supported")]
    UnsupportedScheme(String),

    #[error("exactly one of REQUEST_COUNT or TEST_DURATION must be set")]
    AmbiguousRunMode,

    #[error("TLS_VERSIONS must enable at least one of '1.2', '1.3'")]
    NoTlsVersions,

    #[error("POST_DATA is not valid JSON: {0}")]
    InvalidPostData(#[from] serde_json::Error),
}

/// Per-request transport and protocol errors. Caught at the request
/// executor, logged, and degraded to a partial result.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("DNS resolution failed for '{host}': {source}")]
    Dns {
        host: String,
        source: std::io::Error,
    },

    #[error("could not connect to {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        source: std::io::Error,
    },

    #[error("'{host}' is not a valid TLS server name")]
    ServerName { host: String },

    #[error("TLS configuration error: {0}")]
    TlsConfig(String),

    #[error("TLS handshake failed: {0}")]
    Handshake(std::io::Error),

    #[error("request write failed: {0}")]
    Write(std::io::Error),
}

/// Categories of per-request failures, used for report aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// DNS, connection and socket write errors
    NetworkError,

    /// TLS configuration, server name and handshake errors
    TlsError,

    /// Anything that does not fit the other buckets
    OtherError,
}

impl ErrorCategory {
    pub(crate) const COUNT: usize = 3;

    /// Categorize a request error.
    pub fn from_request_error(error: &RequestError) -> Self {
        match error {
            RequestError::Dns { .. } | RequestError::Connect { .. } | RequestError::Write(_) => {
                ErrorCategory::NetworkError
            }
            RequestError::ServerName { .. }
            | RequestError::TlsConfig(_)
            | RequestError::Handshake(_) => ErrorCategory::TlsError,
        }
    }

    /// Get the stable label for this error category.
    pub fn label(&self) -> &'static str {
        match self {
            ErrorCategory::NetworkError => "network_error",
            ErrorCategory::TlsError => "tls_error",
            ErrorCategory::OtherError => "other_error",
        }
    }

    /// Get a human-readable description of this error category.
    pub fn description(&self) -> &'static str {
        match self {
            ErrorCategory::NetworkError => "Network/Connection Errors",
            ErrorCategory::TlsError => "TLS/Certificate Errors",
            ErrorCategory::OtherError => "Other/Unknown Errors",
        }
    }

    /// Get all error categories in a consistent order.
    pub fn all() -> Vec<ErrorCategory> {
        vec![
            ErrorCategory::NetworkError,
            ErrorCategory::TlsError,
            ErrorCategory::OtherError,
        ]
    }

    pub(crate) fn index(self) -> usize {
        match self {
            ErrorCategory::NetworkError => 0,
            ErrorCategory::TlsError => 1,
            ErrorCategory::OtherError => 2,
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}
