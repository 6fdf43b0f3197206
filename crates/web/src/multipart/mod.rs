//! Streaming multipart/form-data parsing with bounded memory.
//!
//! Two ingest modes cover the two body shapes the connection produces: an
//! in-memory body is scanned by index ([`parse`]), a spooled body is read
//! back in chunks through a rolling search buffer
//! ([`stream_parser::parse_spooled`]). Both retain only parts carrying a
//! `filename` parameter, keep the first part per field name, and fail
//! closed: if the closing `--boundary--` never appears the result is an
//! empty map, never partial output.

mod file_part;
pub mod stream_parser;

pub use file_part::{FilePart, Files};

use std::path::PathBuf;

use oxapi_http::spool::{create_spool_file, unique_upload_path, SpoolPath};
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Copies above this size yield to the scheduler even when nothing hits
/// the disk.
const YIELD_COPY_BYTES: usize = 64 * 1024;

/// Memory/disk thresholds and chunk sizes for multipart parsing.
#[derive(Debug, Clone)]
pub struct MultipartLimits {
    /// Read granularity for spooled-body scanning
    pub max_chunk_size: usize,
    /// Write granularity for spilling part content to disk
    pub max_chunk_size_disk: usize,
    /// Largest single part kept in memory
    pub max_file_size_in_memory: usize,
    /// Largest total of in-memory parts per request
    pub max_files_size_in_memory: usize,
    /// Directory for spilled parts
    pub tmp_dir: PathBuf,
}

impl Default for MultipartLimits {
    fn default() -> Self {
        Self {
            max_chunk_size: 128 * 1024,
            max_chunk_size_disk: 512 * 1024,
            max_file_size_in_memory: 1024 * 1024,
            max_files_size_in_memory: 10 * 1024 * 1024,
            tmp_dir: std::env::temp_dir(),
        }
    }
}

/// Extracts the boundary token from a Content-Type header value.
///
/// Attributes are split on `;`, matched case-insensitively, and a value
/// wrapped in matching single or double quotes is unwrapped.
pub fn extract_boundary(content_type: &str) -> Option<String> {
    for part in content_type.split(';') {
        let part = part.trim();
        if part.len() >= 9 && part[..9].eq_ignore_ascii_case("boundary=") {
            let mut value = part[9..].trim();

            if value.len() >= 2 {
                let bytes = value.as_bytes();
                if (bytes[0] == b'"' && bytes[value.len() - 1] == b'"')
                    || (bytes[0] == b'\'' && bytes[value.len() - 1] == b'\'')
                {
                    value = &value[1..value.len() - 1];
                }
            }

            if value.is_empty() {
                return None;
            }
            return Some(value.to_string());
        }
    }

    None
}

/// Part header fields pulled from a `Content-Disposition` /
/// `Content-Type` block.
#[derive(Debug, Default)]
pub(crate) struct PartHeaders {
    pub name: String,
    pub filename: String,
    pub content_type: String,
}

/// Parses the CRLF-separated header lines of one part.
///
/// Header names match case-insensitively; `name` and `filename` are read
/// from their double-quoted attribute forms per RFC 7578.
pub(crate) fn parse_part_headers(headers: &[u8]) -> PartHeaders {
    let mut parsed = PartHeaders::default();

    let text = String::from_utf8_lossy(headers);
    for line in text.split("\r\n") {
        let lowered = line.to_ascii_lowercase();
        if lowered.starts_with("content-disposition") {
            parsed.name = extract_between(line, "name=\"", "\"").unwrap_or_default();
            parsed.filename = extract_between(line, "filename=\"", "\"").unwrap_or_default();
        } else if lowered.starts_with("content-type") {
            if let Some(pos) = line.find(':') {
                parsed.content_type = line[pos + 1..].trim().to_string();
            }
        }
    }

    parsed
}

fn extract_between(line: &str, start: &str, end: &str) -> Option<String> {
    let first = line.find(start)? + start.len();
    let last = line[first..].find(end)? + first;
    Some(line[first..last].to_string())
}

/// Parses an in-memory multipart body into a file map.
///
/// Scanning is index-based over the contiguous body. Per-part placement:
/// content at most `max_file_size_in_memory` bytes, while the running
/// in-memory total stays within `max_files_size_in_memory`, lives in
/// memory; anything larger streams to a spool file in
/// `max_chunk_size_disk` pieces, yielding to the scheduler per chunk.
pub async fn parse(body: &[u8], boundary: &str, limits: &MultipartLimits) -> std::io::Result<Files> {
    let mut files = Files::new();

    let dash_boundary = format!("--{boundary}").into_bytes();
    let part_boundary = format!("\r\n--{boundary}").into_bytes();

    let mut pos = match find(body, &dash_boundary, 0) {
        Some(idx) => idx,
        None => return Ok(files),
    };

    let mut in_memory_total: usize = 0;
    let mut saw_closing_boundary = false;

    loop {
        pos += dash_boundary.len();

        if body[pos..].starts_with(b"--") {
            saw_closing_boundary = true;
            break;
        }

        if body[pos..].starts_with(b"\r\n") {
            pos += 2;
        }

        let header_end = match find(body, b"\r\n\r\n", pos) {
            Some(idx) => idx,
            None => break,
        };

        let headers = parse_part_headers(&body[pos..header_end]);
        pos = header_end + 4;

        // content runs to the boundary of the next part
        let part_end = match find(body, &part_boundary, pos) {
            Some(idx) => idx,
            None => break,
        };

        let content = &body[pos..part_end];

        if !headers.name.is_empty() && !headers.filename.is_empty() && !files.contains_key(&headers.name) {
            if content.len() <= limits.max_file_size_in_memory
                && in_memory_total + content.len() <= limits.max_files_size_in_memory
            {
                let data = content.to_vec();
                in_memory_total += data.len();

                if data.len() > YIELD_COPY_BYTES {
                    tokio::task::yield_now().await;
                }

                files.insert(headers.name.clone(), FilePart::in_memory(headers.filename, headers.content_type, data));
            } else {
                let spool = spill_to_disk(content, limits).await?;
                files.insert(headers.name.clone(), FilePart::on_disk(headers.filename, headers.content_type, spool));
            }
        }

        // step onto the boundary marker just found
        pos = part_end + 2;

        match find(body, &dash_boundary, pos) {
            Some(idx) => pos = idx,
            None => break,
        }
    }

    if !saw_closing_boundary {
        debug!("closing boundary missing, discarding {} parsed part(s)", files.len());
        files.clear();
    }

    Ok(files)
}

/// Writes one oversized part to a fresh spool file, chunked and yielding.
async fn spill_to_disk(content: &[u8], limits: &MultipartLimits) -> std::io::Result<SpoolPath> {
    let path = unique_upload_path(&limits.tmp_dir);
    let mut file = create_spool_file(&path).await?;
    let spool = SpoolPath::new(path);

    for chunk in content.chunks(limits.max_chunk_size_disk.max(1)) {
        file.write_all(chunk).await?;
        tokio::task::yield_now().await;
    }
    file.flush().await?;

    Ok(spool)
}

pub(crate) fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from > haystack.len() || needle.is_empty() {
        return None;
    }
    haystack[from..].windows(needle.len()).position(|w| w == needle).map(|idx| idx + from)
}
