//! Response constructors beyond plain text.
//!
//! These build on the protocol-layer [`Response`] type: JSON bodies,
//! chunked streams, disk files and redirects. File responses precompute
//! `Content-Length` and an `ETag` from the file metadata and stream the
//! content from disk; redirects coerce non-redirect status codes to
//! `302 Found`.

use std::io;
use std::path::Path;
use std::time::UNIX_EPOCH;

use bytes::Bytes;
use futures::Stream;
use futures::StreamExt;
use http::{HeaderValue, StatusCode};
use oxapi_http::protocol::Response;
use tokio_util::io::ReaderStream;
use tracing::warn;

use crate::mime;

const FILE_STREAM_CHUNK: usize = 8 * 1024;

/// A buffered JSON response serialized from `value`.
pub fn json(value: &serde_json::Value, status: StatusCode) -> Response {
    let mut response = Response::with_body(value.to_string()).with_status(status);
    response.headers_mut().insert(http::header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

/// A chunked stream response fed by `stream`.
///
/// Sets `Cache-Control: no-cache`; `content_type` defaults to
/// `application/octet-stream` via [`mime::DEFAULT_MIME_TYPE`] at call
/// sites that have nothing better.
pub fn stream<S>(stream: S, content_type: &str) -> Response
where
    S: Stream<Item = io::Result<Bytes>> + Send + 'static,
{
    let mut response = Response::from_stream(stream.boxed());
    response.headers_mut().insert(http::header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    match HeaderValue::from_str(content_type) {
        Ok(value) => {
            response.headers_mut().insert(http::header::CONTENT_TYPE, value);
        }
        Err(_) => {
            response
                .headers_mut()
                .insert(http::header::CONTENT_TYPE, HeaderValue::from_static(mime::DEFAULT_MIME_TYPE));
        }
    }
    response
}

/// Streams a file from disk.
///
/// A missing file answers a buffered 404, a non-regular file a 400. The
/// media type comes from the extension table, `Content-Length` from the
/// file size, and `ETag` is `"<mtime>-<size>"`.
pub async fn file(path: impl AsRef<Path>) -> Response {
    let path = path.as_ref();

    let metadata = match tokio::fs::metadata(path).await {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Response::text("File not found").with_status(StatusCode::NOT_FOUND);
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to stat file");
            return Response::text("Internal server error").with_status(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };

    if !metadata.is_file() {
        return Response::text("Bad request").with_status(StatusCode::BAD_REQUEST);
    }

    let file = match tokio::fs::File::open(path).await {
        Ok(file) => file,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to open file");
            return Response::text("Internal server error").with_status(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };

    let file_size = metadata.len();
    let mtime = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
        .unwrap_or(0);

    let mut response = stream(ReaderStream::with_capacity(file, FILE_STREAM_CHUNK), mime::from_path(path));
    response.headers_mut().remove(http::header::CACHE_CONTROL);
    response.headers_mut().insert(http::header::CONTENT_LENGTH, HeaderValue::from(file_size));

    let etag = format!("\"{mtime}-{file_size}\"");
    if let Ok(value) = HeaderValue::from_str(&etag) {
        response.headers_mut().insert(http::header::ETAG, value);
    }

    response
}

const REDIRECT_STATUSES: [StatusCode; 5] = [
    StatusCode::MOVED_PERMANENTLY,
    StatusCode::FOUND,
    StatusCode::SEE_OTHER,
    StatusCode::TEMPORARY_REDIRECT,
    StatusCode::PERMANENT_REDIRECT,
];

/// An empty-bodied redirect to `location`.
///
/// Any status outside {301, 302, 303, 307, 308} is coerced to 302.
pub fn redirect(location: &str, status: StatusCode) -> Response {
    let status = if REDIRECT_STATUSES.contains(&status) { status } else { StatusCode::FOUND };

    let mut response = Response::new().with_status(status);
    if let Ok(value) = HeaderValue::from_str(location) {
        response.headers_mut().insert(http::header::LOCATION, value);
    }
    response.headers_mut().insert(http::header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
    response
}
