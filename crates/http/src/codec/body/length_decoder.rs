//! Decoder for payloads framed by a `Content-Length` header
//! (RFC 7230 §3.3.2).

use std::cmp;

use crate::protocol::{ParseError, PayloadItem};
use bytes::BytesMut;
use tokio_util::codec::Decoder;

/// Tracks the remaining bytes of a fixed-length payload and hands out
/// whatever the framing buffer currently holds, up to that bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LengthDecoder {
    length: u64,
}

impl LengthDecoder {
    pub fn new(length: u64) -> Self {
        Self { length }
    }
}

impl Decoder for LengthDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if self.length == 0 {
            return Ok(Some(PayloadItem::Eof));
        }

        if src.is_empty() {
            return Ok(None);
        }

        let len = cmp::min(self.length, src.len() as u64);
        let bytes = src.split_to(len as usize).freeze();

        self.length -= bytes.len() as u64;
        Ok(Some(PayloadItem::Chunk(bytes)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_is_bounded_by_length() {
        let mut buffer = BytesMut::from(&b"1012345678rest-of-next-request"[..]);

        let mut length_decoder = LengthDecoder::new(10);
        let payload = length_decoder.decode(&mut buffer).unwrap().unwrap();

        assert!(payload.is_chunk());
        assert_eq!(&payload.as_bytes().unwrap()[..], b"1012345678");
        assert_eq!(&buffer[..], b"rest-of-next-request");

        let eof = length_decoder.decode(&mut buffer).unwrap().unwrap();
        assert!(eof.is_eof());
    }

    #[test]
    fn partial_input_yields_partial_chunks() {
        let mut decoder = LengthDecoder::new(6);

        let mut buffer = BytesMut::from(&b"abc"[..]);
        let first = decoder.decode(&mut buffer).unwrap().unwrap();
        assert_eq!(&first.as_bytes().unwrap()[..], b"abc");

        assert!(decoder.decode(&mut buffer).unwrap().is_none());

        buffer.extend_from_slice(b"def");
        let second = decoder.decode(&mut buffer).unwrap().unwrap();
        assert_eq!(&second.as_bytes().unwrap()[..], b"def");

        assert!(decoder.decode(&mut buffer).unwrap().unwrap().is_eof());
    }
}
