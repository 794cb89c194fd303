//! Single-hop redirect following.
//!
//! When enabled, a 3xx response carrying `Location` is replaced by the
//! response of one GET to that location. Only the fields a caller observes
//! about the payload are taken over: status, reason, body and the
//! content headers. Everything else stays from the original response.

use http::{HeaderMap, Response, Uri, header, response::Parts};
use hyper::ext::ReasonPhrase;
use tracing::debug;
use url::Url;

use crate::utils::basic_auth;

/// Headers copied from the followed response, or removed when it lacks them.
const MERGED_HEADERS: [header::HeaderName; 3] = [
    header::CONTENT_LENGTH,
    header::CONTENT_ENCODING,
    header::CONTENT_TYPE,
];

/// Resolves the redirect target of `parts`, relative to the request URI `base`.
///
/// Returns `None` when the status is not a redirect or the `Location`
/// header is missing or unusable; in that case there is nothing to follow.
pub fn location(parts: &Parts, base: &Uri) -> Option<Url> {
    if !parts.status.is_redirection() {
        return None;
    }
    let raw = parts.headers.get(header::LOCATION)?.to_str().ok()?;
    match Url::parse(raw) {
        Ok(url) => Some(url),
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            let base = Url::parse(&base.to_string()).ok()?;
            base.join(raw).ok()
        }
        Err(e) => {
            debug!("Ignoring unparseable Location {:?}: {}", raw, e);
            None
        }
    }
}

/// Splits a resolved location into a request URI and optional basic auth.
pub fn follow_up_target(
    location: &Url,
) -> Result<(Uri, Option<http::HeaderValue>), http::uri::InvalidUri> {
    let auth = location
        .password()
        .filter(|_| !location.username().is_empty())
        .map(|password| basic_auth(location.username(), password));

    let mut stripped = location.clone();
    // Only fails for URLs that cannot carry credentials, which then have none.
    let _ = stripped.set_username("");
    let _ = stripped.set_password(None);
    let uri = stripped.as_str().parse::<Uri>()?;
    Ok((uri, auth))
}

/// Overwrites `original` with the payload of the `followed` response.
pub fn merge_followed<B>(original: &mut Response<B>, followed: Response<B>) {
    let (mut followed_parts, followed_body) = followed.into_parts();

    *original.status_mut() = followed_parts.status;
    original.extensions_mut().remove::<ReasonPhrase>();
    if let Some(reason) = followed_parts.extensions.remove::<ReasonPhrase>() {
        original.extensions_mut().insert(reason);
    }
    *original.body_mut() = followed_body;

    replace_headers(original.headers_mut(), &followed_parts.headers);
    original.headers_mut().remove(header::LOCATION);
}

fn replace_headers(to: &mut HeaderMap, from: &HeaderMap) {
    for name in MERGED_HEADERS {
        match from.get(&name) {
            Some(value) if !value.is_empty() => {
                to.insert(name, value.clone());
            }
            _ => {
                to.remove(&name);
            }
        }
    }
}
