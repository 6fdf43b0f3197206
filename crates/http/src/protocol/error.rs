//! Error types for the protocol layer.
//!
//! [`HttpError`] is the top-level error at the connection boundary and wraps
//! either a [`ParseError`] (request side) or a [`SendError`] (response
//! side). The connection loop maps these onto the wire: client-caused parse
//! failures become a canned 400, everything else a canned 500, and plain
//! connection teardown (EOF, reset, abort) is not an error at all.

use std::io;
use thiserror::Error;

/// The top-level error type for HTTP connection processing.
#[derive(Debug, Error)]
pub enum HttpError {
    /// Errors that occur while reading and parsing a request
    #[error("request error: {source}")]
    RequestError {
        #[from]
        source: ParseError,
    },

    /// Errors that occur while encoding and sending a response
    #[error("response error: {source}")]
    ResponseError {
        #[from]
        source: SendError,
    },
}

impl HttpError {
    /// Whether this error warrants a `400 Bad Request` rather than a 500.
    pub fn is_client_error(&self) -> bool {
        match self {
            HttpError::RequestError { source } => source.is_client_error(),
            HttpError::ResponseError { .. } => false,
        }
    }

    /// Whether the peer simply went away and no response should be written.
    pub fn is_disconnect(&self) -> bool {
        let io_err = match self {
            HttpError::RequestError { source: ParseError::Io { source } } => source,
            HttpError::ResponseError { source: SendError::Io { source } } => source,
            _ => return false,
        };

        matches!(
            io_err.kind(),
            io::ErrorKind::UnexpectedEof
                | io::ErrorKind::ConnectionReset
                | io::ErrorKind::ConnectionAborted
                | io::ErrorKind::BrokenPipe
        )
    }
}

/// Errors that occur during HTTP request parsing and body ingestion.
#[derive(Error, Debug)]
pub enum ParseError {
    /// Header block exceeds the maximum allowed size
    #[error("header size too large, current: {current_size} exceed the limit {max_size}")]
    TooLargeHeader { current_size: usize, max_size: usize },

    /// Number of headers exceeds the maximum allowed
    #[error("header number exceed the limit {max_num}")]
    TooManyHeaders { max_num: usize },

    /// Invalid header format or content
    #[error("invalid header: {reason}")]
    InvalidHeader { reason: String },

    /// Unsupported HTTP version
    #[error("invalid http version: {0:?}")]
    InvalidVersion(Option<u8>),

    /// Invalid or unsupported HTTP method
    #[error("invalid http method")]
    InvalidMethod,

    /// Invalid URI format
    #[error("invalid http uri")]
    InvalidUri,

    /// Invalid Content-Length header
    #[error("invalid content-length header: {reason}")]
    InvalidContentLength { reason: String },

    /// The body claims or reaches a size above the configured limit
    #[error("body size {claimed} exceeds the limit {max_size}")]
    BodyTooLarge { claimed: u64, max_size: u64 },

    /// Multipart requests must carry a Content-Length so the body can be spooled
    #[error("missing content-length header for multipart body")]
    MissingContentLength,

    /// Invalid request body
    #[error("invalid body: {reason}")]
    InvalidBody { reason: String },

    /// I/O error during parsing
    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl ParseError {
    pub fn too_large_header(current_size: usize, max_size: usize) -> Self {
        Self::TooLargeHeader { current_size, max_size }
    }

    pub fn too_many_headers(max_num: usize) -> Self {
        Self::TooManyHeaders { max_num }
    }

    pub fn invalid_header<S: ToString>(str: S) -> Self {
        Self::InvalidHeader { reason: str.to_string() }
    }

    pub fn invalid_body<S: ToString>(str: S) -> Self {
        Self::InvalidBody { reason: str.to_string() }
    }

    pub fn invalid_content_length<S: ToString>(str: S) -> Self {
        Self::InvalidContentLength { reason: str.to_string() }
    }

    pub fn body_too_large(claimed: u64, max_size: u64) -> Self {
        Self::BodyTooLarge { claimed, max_size }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }

    fn is_client_error(&self) -> bool {
        !matches!(self, ParseError::Io { .. })
    }
}

/// Errors that occur during HTTP response encoding and sending.
#[derive(Error, Debug)]
pub enum SendError {
    /// Invalid response body
    #[error("invalid body: {reason}")]
    InvalidBody { reason: String },

    /// I/O error during sending
    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl SendError {
    pub fn invalid_body<S: ToString>(str: S) -> Self {
        Self::InvalidBody { reason: str.to_string() }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }
}
