//! HTTP request types.
//!
//! [`RequestHeader`] wraps `http::Request<()>` and is what the codec
//! produces when a header block has been parsed. [`Request`] is the full
//! request handed to the framework: the header plus an ingested body
//! (in memory or spooled to disk) and the peer's address.

use bytes::Bytes;
use http::header::{CONNECTION, UPGRADE};
use http::request::Parts;
use http::{HeaderMap, Method, Request as HttpRequest, Uri, Version};

use crate::spool::SpoolPath;

/// The header portion of an HTTP request.
#[derive(Debug)]
pub struct RequestHeader {
    inner: HttpRequest<()>,
}

impl AsRef<HttpRequest<()>> for RequestHeader {
    fn as_ref(&self) -> &HttpRequest<()> {
        &self.inner
    }
}

impl RequestHeader {
    pub fn into_inner(self) -> HttpRequest<()> {
        self.inner
    }

    pub fn method(&self) -> &Method {
        self.inner.method()
    }

    pub fn uri(&self) -> &Uri {
        self.inner.uri()
    }

    pub fn version(&self) -> Version {
        self.inner.version()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    /// Whether the request method is one that can carry a body.
    ///
    /// GET, HEAD, DELETE, OPTIONS and CONNECT requests are treated as
    /// bodyless regardless of their headers.
    pub fn need_body(&self) -> bool {
        !matches!(self.method(), &Method::GET | &Method::HEAD | &Method::DELETE | &Method::OPTIONS | &Method::CONNECT)
    }

    /// Whether the client asked to keep the connection open.
    ///
    /// True when the `Connection` header is absent or equals `keep-alive`
    /// case-insensitively; anything else requests a close.
    pub fn keep_alive(&self) -> bool {
        match self.headers().get(CONNECTION) {
            None => true,
            Some(value) => value.to_str().map(|v| v.eq_ignore_ascii_case("keep-alive")).unwrap_or(false),
        }
    }

    /// Detects a WebSocket upgrade request.
    ///
    /// Upgrades are detected but not handled; the connection loop closes
    /// such connections without dispatching.
    pub fn is_upgrade(&self) -> bool {
        let connection_has_upgrade = self
            .headers()
            .get(CONNECTION)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(',').any(|token| token.trim().eq_ignore_ascii_case("upgrade")))
            .unwrap_or(false);

        let upgrade_is_websocket = self
            .headers()
            .get(UPGRADE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.eq_ignore_ascii_case("websocket"))
            .unwrap_or(false);

        connection_has_upgrade && upgrade_is_websocket
    }
}

impl From<Parts> for RequestHeader {
    #[inline]
    fn from(parts: Parts) -> Self {
        Self { inner: HttpRequest::from_parts(parts, ()) }
    }
}

impl From<HttpRequest<()>> for RequestHeader {
    #[inline]
    fn from(inner: HttpRequest<()>) -> Self {
        Self { inner }
    }
}

/// The ingested request body.
///
/// `Full` and `Spooled` are mutually exclusive: a body is spooled exactly
/// when it is a multipart upload whose declared length pushed it to disk,
/// otherwise it lives in memory.
#[derive(Debug)]
pub enum ReqBody {
    Empty,
    Full(Bytes),
    Spooled(SpoolPath),
}

impl ReqBody {
    /// The in-memory bytes, empty for spooled or absent bodies.
    pub fn bytes(&self) -> &[u8] {
        match self {
            ReqBody::Full(bytes) => bytes,
            _ => &[],
        }
    }

    /// The spool file path, if the body went to disk.
    pub fn spool_path(&self) -> Option<&SpoolPath> {
        match self {
            ReqBody::Spooled(path) => Some(path),
            _ => None,
        }
    }

    pub fn is_spooled(&self) -> bool {
        matches!(self, ReqBody::Spooled(_))
    }
}

/// Remote peer metadata captured at accept time.
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    remote_addr: String,
    remote_port: u16,
}

impl ClientInfo {
    pub fn new(remote_addr: impl Into<String>, remote_port: u16) -> Self {
        Self { remote_addr: remote_addr.into(), remote_port }
    }

    pub fn remote_addr(&self) -> &str {
        &self.remote_addr
    }

    pub fn remote_port(&self) -> u16 {
        self.remote_port
    }
}

impl From<std::net::SocketAddr> for ClientInfo {
    fn from(addr: std::net::SocketAddr) -> Self {
        Self::new(addr.ip().to_string(), addr.port())
    }
}

/// A complete request: parsed header, ingested body, peer info.
#[derive(Debug)]
pub struct Request {
    header: RequestHeader,
    body: ReqBody,
    client: ClientInfo,
}

impl Request {
    pub fn new(header: RequestHeader, body: ReqBody, client: ClientInfo) -> Self {
        Self { header, body, client }
    }

    pub fn header(&self) -> &RequestHeader {
        &self.header
    }

    pub fn method(&self) -> &Method {
        self.header.method()
    }

    pub fn uri(&self) -> &Uri {
        self.header.uri()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.header.headers()
    }

    pub fn body(&self) -> &ReqBody {
        &self.body
    }

    pub fn body_mut(&mut self) -> &mut ReqBody {
        &mut self.body
    }

    pub fn client(&self) -> &ClientInfo {
        &self.client
    }

    pub fn keep_alive(&self) -> bool {
        self.header.keep_alive()
    }

    /// Looks up a named cookie in the `Cookie` request header.
    ///
    /// The header is parsed as `name=value` pairs separated by semicolons,
    /// with surrounding whitespace trimmed.
    pub fn cookie(&self, name: &str) -> Option<&str> {
        let header_value = self.headers().get(http::header::COOKIE)?.to_str().ok()?;

        for pair in header_value.split(';') {
            let mut split = pair.splitn(2, '=');
            let cookie_name = split.next()?.trim();
            if cookie_name == name {
                return Some(split.next().unwrap_or("").trim());
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_with(pairs: &[(&str, &str)]) -> RequestHeader {
        let mut builder = HttpRequest::builder().method(Method::GET).uri("/");
        for (name, value) in pairs {
            builder = builder.header(*name, *value);
        }
        RequestHeader::from(builder.body(()).unwrap())
    }

    fn request_with(pairs: &[(&str, &str)]) -> Request {
        Request::new(header_with(pairs), ReqBody::Empty, ClientInfo::default())
    }

    #[test]
    fn keep_alive_defaults_to_true() {
        assert!(header_with(&[]).keep_alive());
    }

    #[test]
    fn keep_alive_is_case_insensitive() {
        assert!(header_with(&[("Connection", "Keep-Alive")]).keep_alive());
        assert!(header_with(&[("Connection", "keep-alive")]).keep_alive());
        assert!(!header_with(&[("Connection", "close")]).keep_alive());
    }

    #[test]
    fn upgrade_detection() {
        assert!(header_with(&[("Connection", "Upgrade"), ("Upgrade", "websocket")]).is_upgrade());
        assert!(header_with(&[("Connection", "keep-alive, Upgrade"), ("Upgrade", "WebSocket")]).is_upgrade());
        assert!(!header_with(&[("Connection", "Upgrade"), ("Upgrade", "h2c")]).is_upgrade());
        assert!(!header_with(&[("Upgrade", "websocket")]).is_upgrade());
    }

    #[test]
    fn cookie_lookup() {
        let req = request_with(&[("Cookie", "a=1; session = abc ; b=2")]);
        assert_eq!(req.cookie("a"), Some("1"));
        assert_eq!(req.cookie("session"), Some("abc"));
        assert_eq!(req.cookie("b"), Some("2"));
        assert_eq!(req.cookie("missing"), None);
    }

    #[test]
    fn need_body_by_method() {
        let mut builder = HttpRequest::builder().method(Method::POST).uri("/");
        builder = builder.header("Content-Length", "3");
        let header = RequestHeader::from(builder.body(()).unwrap());
        assert!(header.need_body());

        assert!(!header_with(&[]).need_body());
    }
}
