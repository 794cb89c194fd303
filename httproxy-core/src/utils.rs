use base64::{Engine as _, engine::general_purpose::STANDARD};
use http::{HeaderMap, HeaderValue, header};

/// Joins an upstream base path with an inbound request path.
///
/// Exactly one slash ends up between the two halves: a doubled slash is
/// collapsed and a missing one is inserted. Two empty inputs give `"/"`.
///
/// # Examples
///
/// ```
/// use httproxy_core::utils::join_paths;
///
/// assert_eq!(join_paths("/api/v1/", "/users"), "/api/v1/users");
/// assert_eq!(join_paths("/api", "users"), "/api/users");
/// assert_eq!(join_paths("", ""), "/");
/// ```
pub fn join_paths(base: &str, path: &str) -> String {
    let base_slash = base.ends_with('/');
    let path_slash = path.starts_with('/');
    match (base_slash, path_slash) {
        (true, true) => format!("{}{}", base, &path[1..]),
        (false, false) => format!("{}/{}", base, path),
        _ => format!("{}{}", base, path),
    }
}

/// Headers that only describe a single connection leg.
const HOP_BY_HOP_HEADERS: [&str; 9] = [
    "connection",
    "proxy-connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

pub fn is_hop_by_hop_header(name: &str) -> bool {
    HOP_BY_HOP_HEADERS
        .iter()
        .any(|hop| hop.eq_ignore_ascii_case(name))
}

/// Strips hop-by-hop headers, including any listed in `Connection`.
pub fn remove_hop_by_hop_headers(headers: &mut HeaderMap) {
    let listed: Vec<String> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(|name| name.trim().to_ascii_lowercase())
        .filter(|name| !name.is_empty())
        .collect();

    for name in listed {
        headers.remove(name.as_str());
    }
    for name in HOP_BY_HOP_HEADERS {
        headers.remove(name);
    }
}

/// Whether a `TE` header lists `trailers`, the one value kept on the upstream leg.
pub fn accepts_trailers(headers: &HeaderMap) -> bool {
    headers
        .get_all(header::TE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|token| token.split(';').next())
        .any(|token| token.trim().eq_ignore_ascii_case("trailers"))
}

/// Builds an `Authorization: Basic ...` header value.
pub fn basic_auth(username: &str, password: &str) -> HeaderValue {
    let encoded = STANDARD.encode(format!("{username}:{password}"));
    let mut value = HeaderValue::try_from(format!("Basic {encoded}"))
        .unwrap_or_else(|_| HeaderValue::from_static("Basic"));
    value.set_sensitive(true);
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_paths_table() {
        let cases = [
            ("/a/", "/b", "/a/b"),
            ("/a", "b", "/a/b"),
            ("/a/", "b", "/a/b"),
            ("/a", "/b", "/a/b"),
            ("", "", "/"),
            ("", "/b", "/b"),
            ("/a", "", "/a/"),
            ("/", "/", "/"),
        ];
        for (base, path, expected) in cases {
            assert_eq!(join_paths(base, path), expected, "join({base:?}, {path:?})");
        }
    }

    #[test]
    fn test_join_paths_api_prefix() {
        assert_eq!(join_paths("/api/v1/", "/users"), "/api/v1/users");
        assert_eq!(join_paths("/api/v1/", "/"), "/api/v1/");
    }

    #[test]
    fn test_join_paths_handles_multibyte_input() {
        assert_eq!(join_paths("/é/", "/ü"), "/é/ü");
        assert_eq!(join_paths("é", "ü"), "é/ü");
    }

    #[test]
    fn test_hop_by_hop_headers() {
        assert!(is_hop_by_hop_header("connection"));
        assert!(is_hop_by_hop_header("Keep-Alive"));
        assert!(is_hop_by_hop_header("transfer-encoding"));
        assert!(!is_hop_by_hop_header("content-type"));
        assert!(!is_hop_by_hop_header("authorization"));
    }

    #[test]
    fn test_remove_hop_by_hop_headers_honors_connection_list() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive, X-Custom-Hop"));
        headers.insert("x-custom-hop", HeaderValue::from_static("1"));
        headers.insert(header::UPGRADE, HeaderValue::from_static("websocket"));
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));

        remove_hop_by_hop_headers(&mut headers);

        assert!(headers.get(header::CONNECTION).is_none());
        assert!(headers.get("x-custom-hop").is_none());
        assert!(headers.get(header::UPGRADE).is_none());
        assert_eq!(headers.get(header::CONTENT_TYPE).unwrap(), "text/plain");
    }

    #[test]
    fn test_accepts_trailers() {
        let mut headers = HeaderMap::new();
        assert!(!accepts_trailers(&headers));
        headers.insert(header::TE, HeaderValue::from_static("gzip, trailers"));
        assert!(accepts_trailers(&headers));
        headers.insert(header::TE, HeaderValue::from_static("deflate;q=0.5"));
        assert!(!accepts_trailers(&headers));
    }

    #[test]
    fn test_basic_auth() {
        let value = basic_auth("user", "pass");
        assert_eq!(value, "Basic dXNlcjpwYXNz");
        assert!(value.is_sensitive());
    }
}
