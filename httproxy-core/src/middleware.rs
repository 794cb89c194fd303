//! Optional layers around the forwarding pipeline.
//!
//! The proxy core never depends on these; `ProxyService` runs them before
//! and after handing a request to `ReverseProxy`.

use std::{fmt::Write as _, net::SocketAddr, time::Instant};

use http::{Method, StatusCode, request};
use http_body_util::BodyExt as _;
use hyper::body::Bytes;
use tracing::{error, info};

use crate::body::{self, ProxyBody};

/// Request dumping and access logging switches.
#[derive(Debug, Clone, Copy, Default)]
pub struct Middleware {
    /// Log every inbound request in full before forwarding it.
    pub dump: bool,
    /// Log one access line per request.
    pub verbose: bool,
}

/// What the access log needs to remember about a request.
#[derive(Debug, Clone)]
pub struct RequestSummary {
    pub method: Method,
    pub path: String,
    pub remote: String,
    pub started: Instant,
}

impl Middleware {
    pub fn new(dump: bool, verbose: bool) -> Self {
        Self { dump, verbose }
    }

    /// Runs incoming processing. With dumping enabled the body is buffered,
    /// logged, and forwarded unchanged.
    pub async fn process_incoming(
        &self,
        from: Option<SocketAddr>,
        req: http::Request<ProxyBody>,
    ) -> (http::Request<ProxyBody>, RequestSummary) {
        let summary = RequestSummary {
            method: req.method().clone(),
            path: req
                .uri()
                .path_and_query()
                .map(|pq| pq.as_str().to_string())
                .unwrap_or_else(|| "/".to_string()),
            remote: remote_address(req.headers(), from),
            started: Instant::now(),
        };

        if !self.dump {
            return (req, summary);
        }

        let (parts, incoming) = req.into_parts();
        let bytes = match incoming.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                error!("Failed to dump request: {}", e);
                Bytes::new()
            }
        };
        info!("{}", dump_request(&parts, &bytes));

        (http::Request::from_parts(parts, body::full(bytes)), summary)
    }

    /// Runs outgoing processing once the response status is known.
    pub fn process_outgoing(&self, summary: &RequestSummary, status: StatusCode) {
        if !self.verbose {
            return;
        }
        info!(
            remote = %summary.remote,
            method = %summary.method,
            path = %summary.path,
            status = status.as_u16(),
            elapsed_ms = summary.started.elapsed().as_millis() as u64,
            "{} {} {}",
            summary.method,
            summary.path,
            status
        );
    }
}

/// Client address for logs: first `X-Forwarded-For` entry, else the peer.
fn remote_address(headers: &http::HeaderMap, from: Option<SocketAddr>) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(|ip| ip.trim().to_string())
        .filter(|ip| !ip.is_empty())
        .or_else(|| from.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "-".to_string())
}

/// Wire-like rendering of a request: request line, headers, blank line, body.
pub fn dump_request(parts: &request::Parts, body: &[u8]) -> String {
    let target = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let mut out = String::new();
    let _ = write!(out, "{} {} {:?}\r\n", parts.method, target, parts.version);
    if let Some(host) = parts.uri.authority() {
        if !parts.headers.contains_key(http::header::HOST) {
            let _ = write!(out, "Host: {}\r\n", host);
        }
    }
    for (name, value) in &parts.headers {
        let _ = write!(out, "{}: {}\r\n", name, String::from_utf8_lossy(value.as_bytes()));
    }
    out.push_str("\r\n");
    out.push_str(&String::from_utf8_lossy(body));
    out
}
