//! Error types for the forwarding pipeline.
//!
//! Configuration errors are fatal and surface from constructors. Every other
//! variant is a per-request failure that the proxy turns into the configured
//! error response.

use std::time::Duration;

use thiserror::Error;

/// Boxed error used for body streams flowing through the proxy.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum ProxyError {
    /// The upstream list or proxy settings are unusable.
    #[error("invalid configuration: {message}")]
    Configuration { message: String },

    /// The round trip to the upstream failed.
    #[error("forwarding to {upstream} failed: {source}")]
    Forwarding {
        upstream: String,
        #[source]
        source: BoxError,
    },

    /// The request deadline expired before the upstream answered.
    #[error("request to {upstream} timed out after {timeout:?}")]
    Timeout { upstream: String, timeout: Duration },

    /// The single follow-up request to a redirect target failed.
    #[error("failed to follow redirect to {location}: {source}")]
    Redirect {
        location: String,
        #[source]
        source: BoxError,
    },
}

impl ProxyError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn forwarding(upstream: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Forwarding {
            upstream: upstream.into(),
            source: source.into(),
        }
    }

    pub fn redirect(location: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Redirect {
            location: location.into(),
            source: source.into(),
        }
    }

    /// Whether this error is handled at the request boundary rather than at startup.
    pub fn is_per_request(&self) -> bool {
        !matches!(self, Self::Configuration { .. })
    }
}

pub type Result<T> = std::result::Result<T, ProxyError>;
