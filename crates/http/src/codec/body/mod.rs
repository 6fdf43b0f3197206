//! Payload decoding and encoding strategies.
//!
//! Three framings are supported on both sides: fixed `Content-Length`
//! payloads, chunked transfer encoding, and bodyless messages. The
//! [`PayloadDecoder`]/[`PayloadEncoder`] front types pick the strategy from
//! the parsed or declared [`crate::protocol::PayloadSize`].

mod chunked_decoder;
mod chunked_encoder;
mod length_decoder;
mod length_encoder;
mod payload_decoder;
mod payload_encoder;

pub use payload_decoder::PayloadDecoder;
pub use payload_encoder::PayloadEncoder;
