//! Streaming request decoder.
//!
//! Decodes a request in two phases: the head via [`HeaderDecoder`], then
//! the payload via [`PayloadDecoder`] until it reports end-of-body. The
//! phase is tracked by whether a payload decoder is installed.

use crate::codec::body::PayloadDecoder;
use crate::codec::header::HeaderDecoder;
use crate::protocol::{Message, ParseError, PayloadItem, PayloadSize, RequestHeader};
use bytes::BytesMut;
use tokio_util::codec::Decoder;

pub struct RequestDecoder {
    header_decoder: HeaderDecoder,
    payload_decoder: Option<PayloadDecoder>,
}

impl RequestDecoder {
    pub fn new() -> Self {
        Default::default()
    }
}

impl Default for RequestDecoder {
    fn default() -> Self {
        Self { header_decoder: HeaderDecoder, payload_decoder: None }
    }
}

impl Decoder for RequestDecoder {
    type Item = Message<(RequestHeader, PayloadSize)>;
    type Error = ParseError;

    /// Yields `Message::Header` once per request, then `Message::Payload`
    /// items until `PayloadItem::Eof`; `Ok(None)` means more input is
    /// needed.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(payload_decoder) = &mut self.payload_decoder {
            let message = match payload_decoder.decode(src)? {
                Some(item @ PayloadItem::Chunk(_)) => Some(Message::Payload(item)),
                Some(item @ PayloadItem::Eof) => {
                    // body finished, next decode starts a new request head
                    self.payload_decoder.take();
                    Some(Message::Payload(item))
                }
                None => None,
            };

            return Ok(message);
        }

        let message = match self.header_decoder.decode(src)? {
            Some((header, payload_size)) => {
                // bodyless requests go straight back to the header phase,
                // so an idle keep-alive socket never waits on body frames
                if !payload_size.is_empty() {
                    self.payload_decoder = Some(payload_size.into());
                }
                Some(Message::Header((header, payload_size)))
            }
            None => None,
        };

        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;
    use indoc::indoc;

    #[test]
    fn header_then_payload_then_next_request() {
        let wire = indoc! {r##"
        POST /a HTTP/1.1
        Content-Length: 5

        helloGET /b HTTP/1.1

        "##}
        .replace('\n', "\r\n");

        let mut decoder = RequestDecoder::new();
        let mut buf = BytesMut::from(wire.as_bytes());

        let first = decoder.decode(&mut buf).unwrap().unwrap();
        match first {
            Message::Header((header, size)) => {
                assert_eq!(header.method(), &Method::POST);
                assert_eq!(size, PayloadSize::Length(5));
            }
            _ => panic!("expected header"),
        }

        let chunk = decoder.decode(&mut buf).unwrap().unwrap().into_payload_item().unwrap();
        assert_eq!(&chunk.into_bytes().unwrap()[..], b"hello");

        let eof = decoder.decode(&mut buf).unwrap().unwrap().into_payload_item().unwrap();
        assert!(eof.is_eof());

        let second = decoder.decode(&mut buf).unwrap().unwrap();
        match second {
            Message::Header((header, size)) => {
                assert_eq!(header.method(), &Method::GET);
                assert!(size.is_empty());
            }
            _ => panic!("expected header"),
        }
    }
}
