//! Request context handed to route handlers.
//!
//! Binding a parsed request to its route parameters triggers body parsing:
//! a multipart request has its file map materialized here, through the
//! spool-mode parser when the body went to disk and the in-memory parser
//! otherwise. A successfully parsed request-side spool file is removed
//! immediately rather than waiting for the request to drop.

use std::io;
use std::sync::Arc;

use oxapi_http::protocol::{ReqBody, Request};
use tracing::warn;

use crate::multipart::{self, stream_parser, Files, MultipartLimits};
use crate::router::PathParams;

pub struct HttpContext {
    request: Arc<Request>,
    params: PathParams,
    files: Files,
}

impl HttpContext {
    /// Builds the context, parsing multipart content when present.
    ///
    /// A multipart Content-Type without a usable boundary yields an empty
    /// file map; I/O failures during parsing propagate to the caller.
    pub async fn create(request: Arc<Request>, params: PathParams, limits: &MultipartLimits) -> io::Result<Self> {
        let mut files = Files::new();

        let boundary = request
            .headers()
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .filter(|ct| ct.len() >= 19 && ct[..19].eq_ignore_ascii_case("multipart/form-data"))
            .and_then(multipart::extract_boundary);

        if let Some(boundary) = boundary {
            match request.body() {
                ReqBody::Spooled(spool) => {
                    files = stream_parser::parse_spooled(spool.path(), &boundary, limits).await?;

                    // the spool served its purpose, drop it early
                    if let Err(e) = tokio::fs::remove_file(spool.path()).await {
                        if e.kind() != io::ErrorKind::NotFound {
                            warn!(path = %spool.path().display(), error = %e, "failed to delete request spool file");
                        }
                    }
                }
                ReqBody::Full(bytes) => {
                    files = multipart::parse(bytes, &boundary, limits).await?;
                }
                ReqBody::Empty => {}
            }
        }

        Ok(Self { request, params, files })
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn params(&self) -> &PathParams {
        &self.params
    }

    /// The value bound to a dynamic path segment.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name)
    }

    /// Borrows an uploaded file by its form field name.
    pub fn file(&self, name: &str) -> Option<&crate::multipart::FilePart> {
        self.files.get(name)
    }

    pub fn files(&self) -> &Files {
        &self.files
    }

    #[cfg(test)]
    pub(crate) fn for_tests() -> Self {
        use http::{Method, Request as HttpRequest};
        use oxapi_http::protocol::{ClientInfo, RequestHeader};

        let header = RequestHeader::from(HttpRequest::builder().method(Method::GET).uri("/").body(()).unwrap());
        Self {
            request: Arc::new(Request::new(header, ReqBody::Empty, ClientInfo::default())),
            params: PathParams::empty(),
            files: Files::new(),
        }
    }
}
