//! Small string helpers shared by the fetch path and diagnostics.

use sha2::{Digest, Sha256};

/// Strip the query string from a URL.
pub fn url_without_query(url: &str) -> &str {
    url.split_once('?').map_or(url, |(path, _)| path)
}

/// Last path component of a URL or file path, without any query string.
pub fn extract_file_name(file: &str) -> &str {
    let path = url_without_query(file);
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

/// Human readable byte count, e.g. `"512 B"`, `"1.50 KB"`, `"12.25 MB"`.
pub fn formatted_data_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * 1024;

    if size < KB {
        format!("{} B", size)
    } else if size < MB {
        format!("{:.2} KB", size as f64 / KB as f64)
    } else {
        format!("{:.2} MB", size as f64 / MB as f64)
    }
}

/// Stable cache file name for a URL.
///
/// Signed URLs differ only in their query string, so the query is ignored.
pub fn cache_key(url: &str) -> String {
    hex::encode(Sha256::digest(url_without_query(url).as_bytes()))
}

/// Whether `url` should be fetched over HTTP rather than read from disk.
pub fn is_remote(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_query() {
        assert_eq!(url_without_query("https://h/a/rlog.bz2?sig=x&t=1"), "https://h/a/rlog.bz2");
        assert_eq!(url_without_query("/tmp/rlog"), "/tmp/rlog");
    }

    #[test]
    fn file_names() {
        assert_eq!(extract_file_name("https://h/route/0/rlog.zst?sig=abc"), "rlog.zst");
        assert_eq!(extract_file_name("C:\\logs\\qlog.bz2"), "qlog.bz2");
        assert_eq!(extract_file_name("rlog"), "rlog");
    }

    #[test]
    fn data_sizes() {
        assert_eq!(formatted_data_size(512), "512 B");
        assert_eq!(formatted_data_size(1536), "1.50 KB");
        assert_eq!(formatted_data_size(3 * 1024 * 1024 + 256 * 1024), "3.25 MB");
    }

    #[test]
    fn cache_key_ignores_query() {
        let a = cache_key("https://h/r/rlog.zst?sig=1");
        let b = cache_key("https://h/r/rlog.zst?sig=2");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, cache_key("https://h/r/qlog.zst"));
    }
}
