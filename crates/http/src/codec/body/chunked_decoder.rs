//! Decoder for chunked transfer encoding (RFC 7230 §4.1).
//!
//! Each chunk is a hex size line, optional extensions, CRLF, the data, and
//! a trailing CRLF; a zero-size chunk followed by an optional trailer
//! section and a final CRLF ends the body.

use crate::protocol::{ParseError, PayloadItem};
use bytes::BytesMut;
use tokio_util::codec::Decoder;
use tracing::trace;

const MAX_SIZE_LINE_BYTES: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Expecting a chunk size line
    Size,
    /// Reading chunk data, `remaining` bytes left
    Data,
    /// Expecting the CRLF that terminates a data chunk
    DataCrlf,
    /// Expecting trailer lines after the zero chunk
    Trailer,
    /// Body complete
    End,
}

/// Incremental chunked-body decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkedDecoder {
    state: State,
    remaining: u64,
}

impl ChunkedDecoder {
    pub fn new() -> Self {
        Self { state: State::Size, remaining: 0 }
    }
}

impl Default for ChunkedDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Finds a CRLF-terminated line in `src` and consumes it, returning the
/// line without its terminator.
fn take_line(src: &mut BytesMut) -> Result<Option<BytesMut>, ParseError> {
    match src.windows(2).position(|w| w == b"\r\n") {
        Some(pos) => {
            let line = src.split_to(pos);
            let _ = src.split_to(2);
            Ok(Some(line))
        }
        None => {
            if src.len() > MAX_SIZE_LINE_BYTES {
                return Err(ParseError::invalid_body("chunk size line too long"));
            }
            Ok(None)
        }
    }
}

fn parse_size_line(line: &[u8]) -> Result<u64, ParseError> {
    // chunk extensions after ';' are tolerated and ignored
    let digits = match line.iter().position(|&b| b == b';') {
        Some(pos) => &line[..pos],
        None => line,
    };

    let text = std::str::from_utf8(digits)
        .map_err(|_| ParseError::invalid_body("chunk size is not ascii"))?
        .trim();

    u64::from_str_radix(text, 16).map_err(|_| ParseError::invalid_body(format!("invalid chunk size: {text}")))
}

impl Decoder for ChunkedDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match self.state {
                State::Size => {
                    let line = match take_line(src)? {
                        Some(line) => line,
                        None => return Ok(None),
                    };

                    let size = parse_size_line(&line)?;
                    trace!(size, "parsed chunk size");

                    if size == 0 {
                        self.state = State::Trailer;
                    } else {
                        self.remaining = size;
                        self.state = State::Data;
                    }
                }

                State::Data => {
                    if src.is_empty() {
                        return Ok(None);
                    }

                    let len = std::cmp::min(self.remaining, src.len() as u64) as usize;
                    let bytes = src.split_to(len).freeze();
                    self.remaining -= bytes.len() as u64;

                    if self.remaining == 0 {
                        self.state = State::DataCrlf;
                    }
                    return Ok(Some(PayloadItem::Chunk(bytes)));
                }

                State::DataCrlf => {
                    if src.len() < 2 {
                        return Ok(None);
                    }
                    if &src[..2] != b"\r\n" {
                        return Err(ParseError::invalid_body("chunk data not terminated by CRLF"));
                    }
                    let _ = src.split_to(2);
                    self.state = State::Size;
                }

                State::Trailer => {
                    let line = match take_line(src)? {
                        Some(line) => line,
                        None => return Ok(None),
                    };

                    // an empty line ends the trailer section
                    if line.is_empty() {
                        self.state = State::End;
                    }
                }

                State::End => return Ok(Some(PayloadItem::Eof)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(decoder: &mut ChunkedDecoder, src: &mut BytesMut) -> (Vec<Vec<u8>>, bool) {
        let mut chunks = Vec::new();
        let mut eof = false;
        while let Some(item) = decoder.decode(src).unwrap() {
            match item {
                PayloadItem::Chunk(bytes) => chunks.push(bytes.to_vec()),
                PayloadItem::Eof => {
                    eof = true;
                    break;
                }
            }
        }
        (chunks, eof)
    }

    #[test]
    fn decodes_simple_chunks() {
        let mut src = BytesMut::from(&b"4\r\nWiki\r\n5\r\npedia\r\n0\r\n\r\n"[..]);
        let mut decoder = ChunkedDecoder::new();

        let (chunks, eof) = collect(&mut decoder, &mut src);
        assert_eq!(chunks, vec![b"Wiki".to_vec(), b"pedia".to_vec()]);
        assert!(eof);
    }

    #[test]
    fn tolerates_extensions_and_split_input() {
        let mut decoder = ChunkedDecoder::new();
        let mut src = BytesMut::from(&b"3;name=value\r\nab"[..]);

        let first = decoder.decode(&mut src).unwrap().unwrap();
        assert_eq!(&first.as_bytes().unwrap()[..], b"ab");

        assert!(decoder.decode(&mut src).unwrap().is_none());

        src.extend_from_slice(b"c\r\n0\r\n\r\n");
        let (chunks, eof) = collect(&mut decoder, &mut src);
        assert_eq!(chunks, vec![b"c".to_vec()]);
        assert!(eof);
    }

    #[test]
    fn rejects_missing_data_crlf() {
        let mut decoder = ChunkedDecoder::new();
        let mut src = BytesMut::from(&b"2\r\nabXX"[..]);

        let _ = decoder.decode(&mut src).unwrap().unwrap();
        assert!(decoder.decode(&mut src).is_err());
    }

    #[test]
    fn rejects_non_hex_size() {
        let mut decoder = ChunkedDecoder::new();
        let mut src = BytesMut::from(&b"zz\r\n"[..]);
        assert!(decoder.decode(&mut src).is_err());
    }
}
