//! Upstream targets and the immutable set they live in.

use std::fmt;

use http::uri::{Authority, Scheme};
use percent_encoding::percent_decode_str;
use tracing::debug;
use url::Url;

use crate::error::{ProxyError, Result};

/// Username and password embedded in an upstream URL.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// A backend target the proxy forwards to.
#[derive(Debug, Clone)]
pub struct Upstream {
    pub scheme: Scheme,
    /// `host[:port]` without any user info.
    pub authority: Authority,
    pub base_path: String,
    pub credentials: Option<Credentials>,
}

impl Upstream {
    /// Parses an absolute `http` or `https` URL, optionally carrying `user:password@`.
    pub fn parse(raw: &str) -> Result<Self> {
        let url = Url::parse(raw)
            .map_err(|e| ProxyError::configuration(format!("invalid upstream URL {raw:?}: {e}")))?;

        let scheme = match url.scheme() {
            "http" => Scheme::HTTP,
            "https" => Scheme::HTTPS,
            other => {
                return Err(ProxyError::configuration(format!(
                    "unsupported scheme {other:?} in upstream URL {raw:?}"
                )));
            }
        };

        let host = url
            .host_str()
            .filter(|host| !host.is_empty())
            .ok_or_else(|| ProxyError::configuration(format!("upstream URL {raw:?} has no host")))?;
        let authority = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };
        let authority = Authority::try_from(authority.as_str()).map_err(|e| {
            ProxyError::configuration(format!("invalid host in upstream URL {raw:?}: {e}"))
        })?;

        let credentials = match url.password() {
            Some(password) => Some(Credentials {
                username: decode(url.username()),
                password: decode(password),
            }),
            _ => None,
        };

        Ok(Self {
            scheme,
            authority,
            base_path: url.path().to_string(),
            credentials,
        })
    }
}

fn decode(component: &str) -> String {
    percent_decode_str(component).decode_utf8_lossy().into_owned()
}

impl fmt::Display for Upstream {
    /// Renders the target without credentials so it is safe to log.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}{}", self.scheme, self.authority, self.base_path)
    }
}

/// Ordered, non-empty collection of upstreams, fixed at startup.
#[derive(Debug, Clone)]
pub struct UpstreamSet {
    upstreams: Vec<Upstream>,
}

impl UpstreamSet {
    /// Builds the set from endpoint strings.
    ///
    /// Fails if the sequence is empty or any entry is not an absolute
    /// `http`/`https` URL with a host.
    pub fn new<I, S>(urls: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let upstreams = urls
            .into_iter()
            .map(|raw| Upstream::parse(raw.as_ref()))
            .collect::<Result<Vec<_>>>()?;

        if upstreams.is_empty() {
            return Err(ProxyError::configuration(
                "at least one upstream URL has to be specified",
            ));
        }

        debug!("Configured {} upstream(s)", upstreams.len());
        Ok(Self { upstreams })
    }

    pub fn len(&self) -> usize {
        self.upstreams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.upstreams.is_empty()
    }

    pub fn as_slice(&self) -> &[Upstream] {
        &self.upstreams
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Upstream> {
        self.upstreams.iter()
    }
}

impl fmt::Display for UpstreamSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, upstream) in self.upstreams.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{upstream}")?;
        }
        Ok(())
    }
}
