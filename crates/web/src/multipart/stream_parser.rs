//! Spool-mode multipart parsing.
//!
//! Reads a spooled body back from disk in chunks and scans for part
//! boundaries through a rolling search buffer of twice the longest
//! boundary marker, so a marker straddling a chunk edge is always found.
//! Part content accumulates in memory until a threshold is crossed, at
//! which point the accumulated bytes are flushed to a fresh spool file and
//! ingestion continues on disk.

use std::io;
use std::path::Path;

use bytes::BytesMut;
use oxapi_http::spool::{create_spool_file, unique_upload_path, SpoolPath};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tracing::debug;

use super::{find, parse_part_headers, FilePart, Files, MultipartLimits};

/// Parses a multipart body that was spooled to `path`.
pub async fn parse_spooled(path: &Path, boundary: &str, limits: &MultipartLimits) -> io::Result<Files> {
    let file = tokio::fs::File::open(path).await?;
    parse_stream(file, boundary, limits).await
}

/// Parses a multipart body from any byte stream.
///
/// Framing failures fail closed with an empty map; only I/O errors
/// propagate.
pub async fn parse_stream<R>(reader: R, boundary: &str, limits: &MultipartLimits) -> io::Result<Files>
where
    R: AsyncRead + Unpin,
{
    if boundary.is_empty() || boundary.ends_with(char::is_whitespace) {
        return Ok(Files::new());
    }

    let dash_boundary = format!("--{boundary}").into_bytes();
    let full_boundary = format!("\r\n--{boundary}").into_bytes();
    let full_boundary_end = format!("\r\n--{boundary}--").into_bytes();

    // a marker can straddle one chunk edge, twice the longest marker
    // guarantees detection
    let keep_size = full_boundary_end.len() * 2;

    let mut scanner = Scanner::new(reader, limits.max_chunk_size.max(64));

    // preamble: discard until the initial boundary line
    loop {
        match scanner.read_line().await? {
            Some(line) => {
                if trim_crlf(&line) == dash_boundary.as_slice() {
                    break;
                }
            }
            None => return Ok(Files::new()),
        }
    }

    let mut files = Files::new();
    let mut in_memory_total: usize = 0;

    loop {
        // part headers run to the first empty line
        let mut headers_blob: Vec<u8> = Vec::new();
        loop {
            match scanner.read_line().await? {
                Some(line) => {
                    let line = trim_crlf(&line);
                    if line.is_empty() {
                        break;
                    }
                    headers_blob.extend_from_slice(line);
                    headers_blob.extend_from_slice(b"\r\n");
                }
                None => {
                    debug!("multipart headers truncated, discarding parse");
                    return Ok(Files::new());
                }
            }
        }

        let headers = parse_part_headers(&headers_blob);
        tokio::task::yield_now().await;

        let retain = !headers.name.is_empty() && !headers.filename.is_empty() && !files.contains_key(&headers.name);
        let mut sink = if retain { PartSink::memory() } else { PartSink::Discard };

        // content runs to the next boundary marker, which may arrive
        // split across reads
        let is_final_boundary = loop {
            let normal_pos = find(&scanner.buf, &full_boundary, 0);
            let end_pos = find(&scanner.buf, &full_boundary_end, 0);

            if let Some(boundary_pos) = normal_pos {
                // enough bytes must follow the match to tell the plain
                // marker from the closing one it prefixes
                if scanner.buf.len() < boundary_pos + full_boundary_end.len() && !scanner.eof {
                    let _ = scanner.fill().await?;
                    continue;
                }

                let is_final = end_pos == Some(boundary_pos);
                let marker_len = if is_final { full_boundary_end.len() } else { full_boundary.len() };

                let content = scanner.buf.split_to(boundary_pos);
                sink.push(&content, limits, in_memory_total).await?;
                let _ = scanner.buf.split_to(marker_len);

                break is_final;
            }

            if scanner.buf.len() > keep_size {
                let flush = scanner.buf.split_to(scanner.buf.len() - keep_size);
                sink.push(&flush, limits, in_memory_total).await?;
            }

            if scanner.fill().await? == 0 {
                debug!("closing boundary missing, discarding {} parsed part(s)", files.len());
                return Ok(Files::new());
            }
        };

        if let Some(part) = sink.finish(headers.filename, headers.content_type, &mut in_memory_total).await? {
            files.insert(headers.name, part);
        }

        if is_final_boundary {
            break;
        }

        scanner.skip_crlf().await?;
    }

    Ok(files)
}

fn trim_crlf(line: &[u8]) -> &[u8] {
    let mut line = line;
    if line.ends_with(b"\n") {
        line = &line[..line.len() - 1];
    }
    if line.ends_with(b"\r") {
        line = &line[..line.len() - 1];
    }
    line
}

/// Chunked reader with an in-place scan buffer.
struct Scanner<R> {
    reader: R,
    buf: BytesMut,
    chunk_size: usize,
    eof: bool,
}

impl<R: AsyncRead + Unpin> Scanner<R> {
    fn new(reader: R, chunk_size: usize) -> Self {
        Self { reader, buf: BytesMut::with_capacity(chunk_size), chunk_size, eof: false }
    }

    /// Reads up to one chunk into the buffer; 0 means end of input.
    async fn fill(&mut self) -> io::Result<usize> {
        if self.eof {
            return Ok(0);
        }

        let mut chunk = vec![0u8; self.chunk_size];
        let n = self.reader.read(&mut chunk).await?;
        if n == 0 {
            self.eof = true;
        } else {
            self.buf.extend_from_slice(&chunk[..n]);
        }
        Ok(n)
    }

    /// Consumes and returns one line including its terminator, capped at
    /// the chunk size. `None` means the input is exhausted.
    async fn read_line(&mut self) -> io::Result<Option<Vec<u8>>> {
        loop {
            if let Some(idx) = self.buf.iter().position(|&b| b == b'\n') {
                return Ok(Some(self.buf.split_to(idx + 1).to_vec()));
            }

            if self.buf.len() >= self.chunk_size {
                return Ok(Some(self.buf.split_to(self.buf.len()).to_vec()));
            }

            if self.fill().await? == 0 {
                if self.buf.is_empty() {
                    return Ok(None);
                }
                return Ok(Some(self.buf.split_to(self.buf.len()).to_vec()));
            }
        }
    }

    /// Consumes the CRLF that follows a part boundary.
    async fn skip_crlf(&mut self) -> io::Result<()> {
        while self.buf.len() < 2 {
            if self.fill().await? == 0 {
                break;
            }
        }
        if self.buf.starts_with(b"\r\n") {
            let _ = self.buf.split_to(2);
        }
        Ok(())
    }
}

/// Destination for one part's content.
enum PartSink {
    /// Part is not retained (no filename, or a duplicate field name);
    /// content is scanned past and dropped
    Discard,
    Memory(Vec<u8>),
    Disk { file: tokio::fs::File, spool: SpoolPath },
}

impl PartSink {
    fn memory() -> Self {
        PartSink::Memory(Vec::new())
    }

    async fn push(&mut self, bytes: &[u8], limits: &MultipartLimits, in_memory_total: usize) -> io::Result<()> {
        if bytes.is_empty() {
            return Ok(());
        }

        if let PartSink::Memory(data) = self {
            let projected = data.len() + bytes.len();
            if projected > limits.max_file_size_in_memory || in_memory_total + projected > limits.max_files_size_in_memory
            {
                // threshold crossed mid-part: flush what accumulated and
                // continue on disk
                let path = unique_upload_path(&limits.tmp_dir);
                let mut file = create_spool_file(&path).await?;
                let spool = SpoolPath::new(path);

                write_chunked(&mut file, data, limits).await?;
                *self = PartSink::Disk { file, spool };
            }
        }

        match self {
            PartSink::Discard => Ok(()),
            PartSink::Memory(data) => {
                data.extend_from_slice(bytes);
                if bytes.len() > super::YIELD_COPY_BYTES {
                    tokio::task::yield_now().await;
                }
                Ok(())
            }
            PartSink::Disk { file, .. } => write_chunked(file, bytes, limits).await,
        }
    }

    async fn finish(
        self,
        filename: String,
        content_type: String,
        in_memory_total: &mut usize,
    ) -> io::Result<Option<FilePart>> {
        match self {
            PartSink::Discard => Ok(None),
            PartSink::Memory(data) => {
                *in_memory_total += data.len();
                Ok(Some(FilePart::in_memory(filename, content_type, data)))
            }
            PartSink::Disk { mut file, spool } => {
                file.flush().await?;
                Ok(Some(FilePart::on_disk(filename, content_type, spool)))
            }
        }
    }
}

async fn write_chunked(file: &mut tokio::fs::File, bytes: &[u8], limits: &MultipartLimits) -> io::Result<()> {
    for chunk in bytes.chunks(limits.max_chunk_size_disk.max(1)) {
        file.write_all(chunk).await?;
        tokio::task::yield_now().await;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body_with(boundary: &str, parts: &[(&str, &str, &[u8])]) -> Vec<u8> {
        let mut body = Vec::new();
        for (field, filename, content) in parts {
            body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
            let mut disposition = format!("Content-Disposition: form-data; name=\"{field}\"");
            if !filename.is_empty() {
                disposition.push_str(&format!("; filename=\"{filename}\""));
            }
            body.extend_from_slice(disposition.as_bytes());
            body.extend_from_slice(b"\r\nContent-Type: application/octet-stream\r\n\r\n");
            body.extend_from_slice(content);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
        body
    }

    fn limits_in(dir: &tempfile::TempDir) -> MultipartLimits {
        MultipartLimits { tmp_dir: dir.path().to_path_buf(), ..Default::default() }
    }

    #[tokio::test]
    async fn small_part_stays_in_memory() {
        let dir = tempfile::tempdir().unwrap();
        let body = body_with("bnd123", &[("f", "hello.txt", b"hello world")]);

        let files = parse_stream(body.as_slice(), "bnd123", &limits_in(&dir)).await.unwrap();

        let part = files.get("f").unwrap();
        assert!(part.is_in_memory());
        assert_eq!(part.name(), "hello.txt");
        assert_eq!(part.data(), b"hello world");
    }

    #[tokio::test]
    async fn large_part_spills_mid_stream() {
        let dir = tempfile::tempdir().unwrap();
        let limits = MultipartLimits {
            max_file_size_in_memory: 32,
            max_chunk_size: 16,
            max_chunk_size_disk: 16,
            tmp_dir: dir.path().to_path_buf(),
            ..Default::default()
        };

        let payload: Vec<u8> = (0..500u32).map(|i| (i % 251) as u8).collect();
        let body = body_with("bnd", &[("big", "big.bin", &payload)]);

        let files = parse_stream(body.as_slice(), "bnd", &limits).await.unwrap();

        let part = files.get("big").unwrap();
        assert!(!part.is_in_memory());
        assert_eq!(part.size().unwrap(), payload.len() as u64);
        assert_eq!(std::fs::read(part.temp_path().unwrap()).unwrap(), payload);
    }

    #[tokio::test]
    async fn boundary_straddling_chunk_edges_is_found() {
        let dir = tempfile::tempdir().unwrap();
        let limits = MultipartLimits { max_chunk_size: 64, tmp_dir: dir.path().to_path_buf(), ..Default::default() };

        let body = body_with("edge-boundary", &[("a", "a.bin", &[b'x'; 200]), ("b", "b.bin", &[b'y'; 200])]);

        let files = parse_stream(body.as_slice(), "edge-boundary", &limits).await.unwrap();

        assert_eq!(files.len(), 2);
        assert_eq!(files.get("a").unwrap().data(), &[b'x'; 200]);
        assert_eq!(files.get("b").unwrap().data(), &[b'y'; 200]);
    }

    #[tokio::test]
    async fn missing_closing_boundary_discards_everything() {
        let dir = tempfile::tempdir().unwrap();
        let mut body = body_with("bnd", &[("f", "a.txt", b"data")]);
        let closing = find(&body, b"--bnd--", 0).unwrap();
        body.truncate(closing);

        let files = parse_stream(body.as_slice(), "bnd", &limits_in(&dir)).await.unwrap();
        assert!(files.is_empty());
    }

    #[tokio::test]
    async fn discarded_spill_files_are_unlinked() {
        let dir = tempfile::tempdir().unwrap();
        let limits = MultipartLimits {
            max_file_size_in_memory: 8,
            tmp_dir: dir.path().to_path_buf(),
            ..Default::default()
        };

        let mut body = body_with("bnd", &[("big", "big.bin", &[b'z'; 100])]);
        let closing = find(&body, b"--bnd--", 0).unwrap();
        body.truncate(closing);

        let files = parse_stream(body.as_slice(), "bnd", &limits).await.unwrap();
        assert!(files.is_empty());

        let leftovers: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn form_fields_are_scanned_past_but_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let body = body_with("bnd", &[("field", "", b"plain value"), ("f", "a.txt", b"kept")]);

        let files = parse_stream(body.as_slice(), "bnd", &limits_in(&dir)).await.unwrap();

        assert_eq!(files.len(), 1);
        assert_eq!(files.get("f").unwrap().data(), b"kept");
    }

    #[tokio::test]
    async fn duplicate_field_first_wins() {
        let dir = tempfile::tempdir().unwrap();
        let body = body_with("bnd", &[("f", "first.txt", b"one"), ("f", "second.txt", b"two")]);

        let files = parse_stream(body.as_slice(), "bnd", &limits_in(&dir)).await.unwrap();

        assert_eq!(files.len(), 1);
        assert_eq!(files.get("f").unwrap().name(), "first.txt");
    }

    #[tokio::test]
    async fn empty_boundary_fails_closed() {
        let dir = tempfile::tempdir().unwrap();
        let files = parse_stream(&b"anything"[..], "", &limits_in(&dir)).await.unwrap();
        assert!(files.is_empty());
    }
}
