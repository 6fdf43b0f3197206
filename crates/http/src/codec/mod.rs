//! HTTP codec: streaming request decoding and response encoding.
//!
//! Both directions are two-phase state machines built on
//! `tokio_util::codec`: a header phase ([`header`]) followed by a payload
//! phase ([`body`]) selected from the parsed framing (`Content-Length`,
//! chunked, or no body).

mod body;
mod header;
mod request_decoder;
mod response_encoder;

pub use request_decoder::RequestDecoder;
pub use response_encoder::ResponseEncoder;
