//! Uploaded file parts.
//!
//! A part lives either in memory or behind an exclusively owned temp file.
//! Dropping an on-disk part unlinks its file, so a failed parse that
//! discards collected parts also cleans up whatever already spilled.

use std::collections::HashMap;
use std::io;
use std::path::Path;

use oxapi_http::spool::SpoolPath;

/// Parsed multipart file uploads keyed by field name.
pub type Files = HashMap<String, FilePart>;

#[derive(Debug)]
enum Storage {
    InMemory(Vec<u8>),
    OnDisk(SpoolPath),
}

/// One uploaded file from a multipart body.
#[derive(Debug)]
pub struct FilePart {
    name: String,
    content_type: String,
    storage: Storage,
}

impl FilePart {
    pub fn in_memory(name: String, content_type: String, data: Vec<u8>) -> Self {
        Self { name, content_type, storage: Storage::InMemory(data) }
    }

    pub fn on_disk(name: String, content_type: String, spool: SpoolPath) -> Self {
        Self { name, content_type, storage: Storage::OnDisk(spool) }
    }

    /// The client-supplied file name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn is_in_memory(&self) -> bool {
        matches!(self.storage, Storage::InMemory(_))
    }

    /// The file bytes for in-memory parts; empty for on-disk parts.
    pub fn data(&self) -> &[u8] {
        match &self.storage {
            Storage::InMemory(data) => data,
            Storage::OnDisk(_) => &[],
        }
    }

    /// The temp file path for on-disk parts.
    pub fn temp_path(&self) -> Option<&Path> {
        match &self.storage {
            Storage::InMemory(_) => None,
            Storage::OnDisk(spool) => Some(spool.path()),
        }
    }

    /// The part size in bytes; for on-disk parts this stats the file.
    pub fn size(&self) -> io::Result<u64> {
        match &self.storage {
            Storage::InMemory(data) => Ok(data.len() as u64),
            Storage::OnDisk(spool) => Ok(std::fs::metadata(spool.path())?.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxapi_http::spool::unique_upload_path;

    #[test]
    fn in_memory_part() {
        let part = FilePart::in_memory("a.txt".into(), "text/plain".into(), b"hello".to_vec());
        assert!(part.is_in_memory());
        assert_eq!(part.size().unwrap(), 5);
        assert_eq!(part.data(), b"hello");
        assert!(part.temp_path().is_none());
    }

    #[test]
    fn on_disk_part_owns_its_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = unique_upload_path(dir.path());
        std::fs::write(&path, b"spilled").unwrap();

        let part = FilePart::on_disk("b.bin".into(), "application/octet-stream".into(), SpoolPath::new(path.clone()));
        assert!(!part.is_in_memory());
        assert_eq!(part.size().unwrap(), 7);
        assert_eq!(part.temp_path(), Some(path.as_path()));

        drop(part);
        assert!(!path.exists());
    }
}
