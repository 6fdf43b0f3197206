//! HTTP response types.
//!
//! One concrete [`Response`] type serves the whole framework. The body is
//! either buffered ([`ResponseBody::Full`]) or produced lazily by a byte
//! stream ([`ResponseBody::Stream`]); a stream never carries buffered bytes
//! and is polled only after the header block has been flushed, each item
//! leaving the connection as one chunked-transfer frame.

use std::io;

use bytes::Bytes;
use futures::stream::BoxStream;
use http::{HeaderMap, HeaderValue, Response as HttpResponse, StatusCode};
use serde_json::json;

/// The header portion of an HTTP response.
pub type ResponseHead = HttpResponse<()>;

/// Shape of framework-synthesized error and 404 bodies.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum ResponseClass {
    #[default]
    Plain,
    Json,
}

/// The response payload.
pub enum ResponseBody {
    Empty,
    Full(Bytes),
    Stream(BoxStream<'static, io::Result<Bytes>>),
}

impl ResponseBody {
    pub fn is_stream(&self) -> bool {
        matches!(self, ResponseBody::Stream(_))
    }

    pub fn len(&self) -> usize {
        match self {
            ResponseBody::Full(bytes) => bytes.len(),
            _ => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, ResponseBody::Empty) || matches!(self, ResponseBody::Full(b) if b.is_empty())
    }
}

/// A complete HTTP response: status, headers, ordered Set-Cookie values
/// and a body.
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    cookies: Vec<String>,
    body: ResponseBody,
}

impl Response {
    /// An empty 200 response.
    pub fn new() -> Self {
        Self { status: StatusCode::OK, headers: HeaderMap::new(), cookies: Vec::new(), body: ResponseBody::Empty }
    }

    /// A buffered plain-text response.
    ///
    /// `Content-Type: text/plain` is set unless the caller overrides it
    /// afterwards.
    pub fn text(body: impl Into<Bytes>) -> Self {
        let mut response = Self::new();
        response.headers.insert(http::header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        response.body = ResponseBody::Full(body.into());
        response
    }

    /// A buffered response with an explicit body and no implied content type.
    pub fn with_body(body: impl Into<Bytes>) -> Self {
        let mut response = Self::new();
        response.body = ResponseBody::Full(body.into());
        response
    }

    /// A response whose body is produced by `stream`, written chunked.
    pub fn from_stream(stream: BoxStream<'static, io::Result<Bytes>>) -> Self {
        let mut response = Self::new();
        response.body = ResponseBody::Stream(stream);
        response
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) -> &mut Self {
        self.status = status;
        self
    }

    /// Builder-style status override.
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Appends a fully serialized `Set-Cookie` value.
    ///
    /// Cookies keep their insertion order on the wire.
    pub fn add_cookie(&mut self, cookie: impl Into<String>) -> &mut Self {
        self.cookies.push(cookie.into());
        self
    }

    pub fn cookies(&self) -> &[String] {
        &self.cookies
    }

    pub fn body(&self) -> &ResponseBody {
        &self.body
    }

    pub fn is_stream(&self) -> bool {
        self.body.is_stream()
    }

    /// Splits the response into its header-side parts and the body, for the
    /// connection's write phase.
    pub fn into_parts(self) -> (StatusCode, HeaderMap, Vec<String>, ResponseBody) {
        (self.status, self.headers, self.cookies, self.body)
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds the canned body for a framework-synthesized response.
///
/// Plain class produces `text/plain` bodies (`"Bad request"`, `"Not found"`,
/// `"Internal server error"`); Json class produces `{"message": ...}`.
/// Nothing else about the failure is leaked to the wire.
pub fn canned_response(status: StatusCode, class: ResponseClass) -> Response {
    let message = match status {
        StatusCode::BAD_REQUEST => "Bad request",
        StatusCode::NOT_FOUND => "Not found",
        _ => "Internal server error",
    };

    let mut response = match class {
        ResponseClass::Plain => Response::text(message),
        ResponseClass::Json => {
            let mut response = Response::with_body(json!({ "message": message }).to_string());
            response.headers_mut().insert(http::header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
            response
        }
    };

    response.set_status(status);
    response
}
