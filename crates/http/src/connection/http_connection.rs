//! The per-connection worker.
//!
//! [`HttpConnection`] owns both halves of an accepted socket and runs the
//! request lifecycle: read and decode a head, ingest the body (in memory,
//! or spooled straight to disk for multipart uploads), dispatch through the
//! installed [`Handler`], write the response, then loop for keep-alive or
//! shut the write half down.
//!
//! Error mapping at this layer: peer disconnects (EOF, reset, abort) close
//! silently; client-caused parse failures answer a canned 400 and close;
//! anything else answers a canned 500 and closes. The canned response is
//! written at most once per request.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures::{SinkExt, StreamExt};
use http::header::{CONTENT_TYPE, EXPECT};
use http::{HeaderValue, StatusCode};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, error, info};

use crate::codec::{RequestDecoder, ResponseEncoder};
use crate::handler::Handler;
use crate::protocol::{
    canned_response, ClientInfo, HttpError, Message, ParseError, PayloadItem, PayloadSize, ReqBody, Request,
    RequestHeader, Response, ResponseBody, ResponseClass, ResponseHead, SendError,
};
use crate::spool::{create_spool_file, unique_upload_path, SpoolPath};

/// Per-connection tuning, derived from the server configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Upper bound on the claimed or accumulated body size
    pub max_request_size: u64,
    /// Read granularity for socket-to-disk streaming
    pub max_chunk_size: usize,
    /// Directory for request spool files
    pub tmp_dir: PathBuf,
    /// Advertised in the Keep-Alive response header
    pub keep_alive_timeout: Duration,
    /// Shape of canned error bodies
    pub response_class: ResponseClass,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            max_request_size: 100 * 1024 * 1024,
            max_chunk_size: 128 * 1024,
            tmp_dir: std::env::temp_dir(),
            keep_alive_timeout: Duration::from_secs(30),
            response_class: ResponseClass::Plain,
        }
    }
}

/// An HTTP connection bound to a reader/writer pair.
pub struct HttpConnection<R, W> {
    framed_read: FramedRead<R, RequestDecoder>,
    framed_write: FramedWrite<W, ResponseEncoder>,
    config: ConnectionConfig,
    client: ClientInfo,
}

impl<R, W> HttpConnection<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W, config: ConnectionConfig, client: ClientInfo) -> Self {
        let read_capacity = config.max_chunk_size.max(8 * 1024);
        Self {
            framed_read: FramedRead::with_capacity(reader, RequestDecoder::new(), read_capacity),
            framed_write: FramedWrite::new(writer, ResponseEncoder::new()),
            config,
            client,
        }
    }

    /// Runs the connection until close, processing requests strictly in
    /// sequence. Each request is dispatched to the handler exactly once.
    pub async fn process<H>(mut self, handler: Arc<H>) -> Result<(), HttpError>
    where
        H: Handler,
    {
        loop {
            let (header, payload_size) = match self.framed_read.next().await {
                Some(Ok(Message::Header(header_and_size))) => header_and_size,

                Some(Ok(Message::Payload(_))) => {
                    error!("received body bytes while expecting a request head");
                    self.write_canned(StatusCode::BAD_REQUEST).await?;
                    return Err(ParseError::invalid_body("need header while receive body").into());
                }

                Some(Err(e)) => {
                    let http_error: HttpError = e.into();
                    if http_error.is_disconnect() {
                        debug!("peer went away mid-request");
                        return Ok(());
                    }
                    error!("can't read next request, cause {}", http_error);
                    self.write_canned(StatusCode::BAD_REQUEST).await?;
                    return Err(http_error);
                }

                None => {
                    debug!("no more requests, closing connection");
                    return Ok(());
                }
            };

            // upgrades are detected but not served
            if header.is_upgrade() {
                info!("websocket upgrade requested, closing connection");
                return Ok(());
            }

            self.handle_expect_continue(&header).await?;

            let keep_alive = header.keep_alive();

            let body = match self.read_body(&header, payload_size).await {
                Ok(body) => body,
                Err(e) => {
                    let http_error: HttpError = e.into();
                    if http_error.is_disconnect() {
                        debug!("peer went away while sending body");
                        return Ok(());
                    }
                    error!("failed to ingest request body, cause {}", http_error);
                    let status = if http_error.is_client_error() {
                        StatusCode::BAD_REQUEST
                    } else {
                        StatusCode::INTERNAL_SERVER_ERROR
                    };
                    self.write_canned(status).await?;
                    return Err(http_error);
                }
            };

            let request = Request::new(header, body, self.client.clone());

            // a handler failure forces the connection closed after the
            // canned 500, whatever the client asked for
            let (response, close_after) = match handler.call(request).await {
                Ok(response) => (response, !keep_alive),
                Err(e) => {
                    error!("handler error, answering canned 500, cause {}", e);
                    (canned_response(StatusCode::INTERNAL_SERVER_ERROR, self.config.response_class), true)
                }
            };

            self.write_response(response, !close_after).await?;

            if close_after {
                self.shutdown().await;
                return Ok(());
            }
        }
    }

    /// Answers `Expect: 100-continue` with the interim response before the
    /// body is read.
    async fn handle_expect_continue(&mut self, header: &RequestHeader) -> Result<(), HttpError> {
        if let Some(value) = header.headers().get(EXPECT) {
            let slice = value.as_bytes();
            if slice.len() >= 4 && &slice[0..4] == b"100-" {
                let writer = self.framed_write.get_mut();
                writer.write_all(b"HTTP/1.1 100 Continue\r\n\r\n").await.map_err(SendError::io)?;
                writer.flush().await.map_err(SendError::io)?;
                debug!("sent 100 Continue interim response");
            }
        }
        Ok(())
    }

    /// Ingests the request body according to its classification.
    ///
    /// Multipart bodies with a boundary are streamed straight from the
    /// socket into a spool file, chunk by chunk; everything else
    /// accumulates in memory. Both paths are bounded by
    /// `max_request_size`.
    async fn read_body(&mut self, header: &RequestHeader, payload_size: PayloadSize) -> Result<ReqBody, ParseError> {
        if is_multipart(header) {
            let claimed = match payload_size {
                PayloadSize::Length(n) => n,
                // chunked or absent framing gives no spoolable length
                _ => return Err(ParseError::MissingContentLength),
            };

            if claimed > self.config.max_request_size {
                return Err(ParseError::body_too_large(claimed, self.config.max_request_size));
            }

            return self.spool_body().await;
        }

        if let PayloadSize::Length(claimed) = payload_size {
            if claimed > self.config.max_request_size {
                return Err(ParseError::body_too_large(claimed, self.config.max_request_size));
            }
        }

        if payload_size.is_empty() {
            return Ok(ReqBody::Empty);
        }

        let mut buffer = BytesMut::new();
        loop {
            match self.framed_read.next().await {
                Some(Ok(Message::Payload(PayloadItem::Chunk(bytes)))) => {
                    if buffer.len() as u64 + bytes.len() as u64 > self.config.max_request_size {
                        return Err(ParseError::body_too_large(
                            buffer.len() as u64 + bytes.len() as u64,
                            self.config.max_request_size,
                        ));
                    }
                    buffer.extend_from_slice(&bytes);
                }
                Some(Ok(Message::Payload(PayloadItem::Eof))) => break,
                Some(Ok(Message::Header(_))) => {
                    return Err(ParseError::invalid_body("received header while reading body"));
                }
                Some(Err(e)) => return Err(e),
                None => return Err(ParseError::io(std::io::Error::from(std::io::ErrorKind::UnexpectedEof))),
            }
        }

        if buffer.is_empty() {
            Ok(ReqBody::Empty)
        } else {
            Ok(ReqBody::Full(buffer.freeze()))
        }
    }

    /// Streams the body from the socket into a uniquely named spool file.
    ///
    /// The returned guard owns the file; dropping it anywhere downstream
    /// unlinks it.
    async fn spool_body(&mut self) -> Result<ReqBody, ParseError> {
        let path = unique_upload_path(&self.config.tmp_dir);
        let mut file = create_spool_file(&path).await?;
        let spool = SpoolPath::new(path);

        loop {
            match self.framed_read.next().await {
                Some(Ok(Message::Payload(PayloadItem::Chunk(bytes)))) => {
                    tokio::io::AsyncWriteExt::write_all(&mut file, &bytes).await?;
                }
                Some(Ok(Message::Payload(PayloadItem::Eof))) => break,
                Some(Ok(Message::Header(_))) => {
                    return Err(ParseError::invalid_body("received header while spooling body"));
                }
                Some(Err(e)) => return Err(e),
                None => return Err(ParseError::io(std::io::Error::from(std::io::ErrorKind::UnexpectedEof))),
            }
        }

        tokio::io::AsyncWriteExt::flush(&mut file).await?;
        debug!(path = %spool.path().display(), "spooled multipart request body");

        Ok(ReqBody::Spooled(spool))
    }

    /// Writes a framework response, appending Set-Cookie values and the
    /// connection disposition headers.
    async fn write_response(&mut self, response: Response, keep_alive: bool) -> Result<(), HttpError> {
        let (status, mut headers, cookies, body) = response.into_parts();

        for cookie in cookies {
            let value = HeaderValue::from_str(&cookie)
                .map_err(|_| SendError::invalid_body(format!("invalid set-cookie value: {cookie}")))?;
            headers.append(http::header::SET_COOKIE, value);
        }

        if keep_alive {
            headers.insert(http::header::CONNECTION, HeaderValue::from_static("keep-alive"));
            let timeout = format!("timeout={}", self.config.keep_alive_timeout.as_secs());
            headers.insert(
                http::HeaderName::from_static("keep-alive"),
                HeaderValue::from_str(&timeout).map_err(|_| SendError::invalid_body("invalid keep-alive value"))?,
            );
        } else {
            headers.insert(http::header::CONNECTION, HeaderValue::from_static("close"));
        }

        let mut head = ResponseHead::new(());
        *head.status_mut() = status;
        *head.headers_mut() = headers;

        match body {
            ResponseBody::Empty => {
                self.framed_write.send(Message::<(ResponseHead, PayloadSize), Bytes>::Header((head, PayloadSize::Empty))).await?;
            }

            ResponseBody::Full(bytes) => {
                let len = bytes.len() as u64;
                self.framed_write.feed(Message::<(ResponseHead, PayloadSize), Bytes>::Header((head, PayloadSize::Length(len)))).await?;
                self.framed_write.feed(Message::Payload(PayloadItem::Chunk(bytes))).await?;
                self.framed_write.send(Message::Payload(PayloadItem::<Bytes>::Eof)).await?;
            }

            ResponseBody::Stream(mut stream) => {
                // flush the head before the stream produces anything
                self.framed_write.send(Message::<(ResponseHead, PayloadSize), Bytes>::Header((head, PayloadSize::Chunked))).await?;

                let mut stream_error = None;
                while let Some(item) = stream.next().await {
                    match item {
                        Ok(bytes) => {
                            self.framed_write.send(Message::Payload(PayloadItem::Chunk(bytes))).await?;
                        }
                        Err(e) => {
                            error!("stream body failed mid-flight, terminating chunked body, cause {}", e);
                            stream_error = Some(e);
                            break;
                        }
                    }
                }

                self.framed_write.send(Message::Payload(PayloadItem::<Bytes>::Eof)).await?;

                if let Some(e) = stream_error {
                    self.shutdown().await;
                    return Err(SendError::io(e).into());
                }
            }
        }

        Ok(())
    }

    /// Writes the canned response for `status` and shuts the write half
    /// down. Used at most once per request.
    async fn write_canned(&mut self, status: StatusCode) -> Result<(), HttpError> {
        let response = canned_response(status, self.config.response_class);
        self.write_response(response, false).await?;
        self.shutdown().await;
        Ok(())
    }

    async fn shutdown(&mut self) {
        if let Err(e) = self.framed_write.get_mut().shutdown().await {
            debug!("error shutting down write half: {}", e);
        }
    }
}

/// A body is spooled when the request declares multipart/form-data with a
/// boundary attribute.
fn is_multipart(header: &RequestHeader) -> bool {
    header
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| {
            let lowered = ct.to_ascii_lowercase();
            lowered.starts_with("multipart/form-data") && lowered.contains("boundary=")
        })
        .unwrap_or(false)
}
