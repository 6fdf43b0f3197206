//! Extension to media-type lookup for file responses.

use std::collections::HashMap;
use std::path::Path;

use once_cell::sync::Lazy;

pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

static MIME_TABLE: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        (".html", "text/html"),
        (".htm", "text/html"),
        (".css", "text/css"),
        (".js", "application/javascript"),
        (".json", "application/json"),
        (".png", "image/png"),
        (".jpg", "image/jpeg"),
        (".jpeg", "image/jpeg"),
        (".gif", "image/gif"),
        (".svg", "image/svg+xml"),
        (".ico", "image/x-icon"),
        (".pdf", "application/pdf"),
        (".txt", "text/plain"),
        (".xml", "application/xml"),
        (".mp3", "audio/mpeg"),
        (".mp4", "video/mp4"),
        (".webm", "video/webm"),
        (".woff", "font/woff"),
        (".woff2", "font/woff2"),
        (".ttf", "font/ttf"),
        (".otf", "font/otf"),
        (".zip", "application/zip"),
        (".gz", "application/gzip"),
        (".tar", "application/x-tar"),
        (".csv", "text/csv"),
        (".doc", "application/msword"),
        (".docx", "application/vnd.openxmlformats-officedocument.wordprocessingml.document"),
        (".xls", "application/vnd.ms-excel"),
        (".xlsx", "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"),
        (".ppt", "application/vnd.ms-powerpoint"),
        (".pptx", "application/vnd.openxmlformats-officedocument.presentationml.presentation"),
        (".avi", "video/x-msvideo"),
        (".bmp", "image/bmp"),
        (".epub", "application/epub+zip"),
        (".flv", "video/x-flv"),
        (".m4a", "audio/mp4"),
        (".m4v", "video/mp4"),
        (".mkv", "video/x-matroska"),
        (".ogg", "audio/ogg"),
        (".ogv", "video/ogg"),
        (".oga", "audio/ogg"),
        (".opus", "audio/opus"),
        (".wav", "audio/wav"),
        (".webp", "image/webp"),
        (".tiff", "image/tiff"),
        (".tif", "image/tiff"),
        (".md", "text/markdown"),
        (".markdown", "text/markdown"),
        (".yaml", "application/yaml"),
        (".yml", "application/yaml"),
        (".rar", "application/vnd.rar"),
        (".7z", "application/x-7z-compressed"),
        (".apk", "application/vnd.android.package-archive"),
        (".exe", "application/x-msdownload"),
        (".dll", "application/x-msdownload"),
        (".swf", "application/x-shockwave-flash"),
        (".rtf", "application/rtf"),
        (".eot", "application/vnd.ms-fontobject"),
        (".ps", "application/postscript"),
        (".sqlite", "application/x-sqlite3"),
        (".db", "application/x-sqlite3"),
    ])
});

/// Media type for a file path, by extension, case-insensitive.
pub fn from_path(path: &Path) -> &'static str {
    let extension = match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!(".{}", ext.to_ascii_lowercase()),
        None => return DEFAULT_MIME_TYPE,
    };

    MIME_TABLE.get(extension.as_str()).copied().unwrap_or(DEFAULT_MIME_TYPE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_extensions() {
        assert_eq!(from_path(Path::new("index.html")), "text/html");
        assert_eq!(from_path(Path::new("photo.JPEG")), "image/jpeg");
        assert_eq!(from_path(Path::new("/var/data/report.pdf")), "application/pdf");
    }

    #[test]
    fn unknown_falls_back_to_octet_stream() {
        assert_eq!(from_path(Path::new("archive.xyz")), DEFAULT_MIME_TYPE);
        assert_eq!(from_path(Path::new("no_extension")), DEFAULT_MIME_TYPE);
    }
}
