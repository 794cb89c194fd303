//! Per-process proxy settings consumed by the forwarding pipeline.

use std::time::Duration;

use http::StatusCode;
use hyper::body::Bytes;

use crate::error::{ProxyError, Result};

/// Immutable settings shared by every request.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Follow a single 3xx hop internally instead of returning it.
    pub follow_redirects: bool,
    /// Round-trip deadline; `None` disables it.
    pub timeout: Option<Duration>,
    /// Status written when forwarding fails.
    pub error_status: StatusCode,
    /// Body written when forwarding fails; empty means no body.
    pub error_body: Bytes,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            follow_redirects: false,
            timeout: None,
            error_status: StatusCode::BAD_GATEWAY,
            error_body: Bytes::new(),
        }
    }
}

impl ProxyConfig {
    pub fn with_follow_redirects(mut self, follow: bool) -> Self {
        self.follow_redirects = follow;
        self
    }

    /// Sets the deadline. A zero duration disables it.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = (!timeout.is_zero()).then_some(timeout);
        self
    }

    /// Sets the failure status from a raw code.
    pub fn with_error_status(mut self, code: u16) -> Result<Self> {
        self.error_status = StatusCode::from_u16(code)
            .map_err(|e| ProxyError::configuration(format!("invalid error status {code}: {e}")))?;
        Ok(self)
    }

    pub fn with_error_body(mut self, body: impl Into<Bytes>) -> Self {
        self.error_body = body.into();
        self
    }
}
