//! Splitting an object into byte ranges

/// Hard ceiling on concurrent range requests per download.
pub const MAX_DOWNLOAD_PARTS: usize = 15;

/// Chunk size used when the caller does not pick one.
pub const DEFAULT_CHUNK_SIZE: u64 = 20 * 1024 * 1024;

/// Objects smaller than this are always fetched with a single request.
pub const DEFAULT_MIN_SPLIT_SIZE: u64 = 10 * 1024 * 1024;

/// Tuning knobs for [`Downloader`](super::Downloader).
///
/// Progress throttling is set on the shared [`DownloadStats`](super::DownloadStats).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloaderConfig {
    /// Default bytes per range when a call passes no chunk size
    pub chunk_size: u64,
    /// Objects below this size are not split
    pub min_split_size: u64,
    /// Upper bound on the number of parts
    pub max_parts: usize,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            min_split_size: DEFAULT_MIN_SPLIT_SIZE,
            max_parts: MAX_DOWNLOAD_PARTS,
        }
    }
}

/// Half-open byte range `[start, end)` of the remote object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Value for the `Range` request header (inclusive end).
    pub fn header_value(&self) -> String {
        format!("bytes={}-{}", self.start, self.end.saturating_sub(1))
    }
}

/// Contiguous, non-overlapping ranges covering `[0, content_length)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadPlan {
    pub content_length: u64,
    pub ranges: Vec<ByteRange>,
}

impl DownloadPlan {
    /// Split `content_length` bytes into `parts` ranges of equal size, the last
    /// range absorbing the remainder.
    pub fn new(content_length: u64, parts: usize) -> Self {
        let parts = (parts.max(1) as u64).min(content_length.max(1));
        let chunk = content_length / parts;

        let ranges = (0..parts)
            .map(|i| {
                let start = i * chunk;
                let end = if i == parts - 1 { content_length } else { start + chunk };
                ByteRange { start, end }
            })
            .collect();

        Self { content_length, ranges }
    }

    pub fn part_count(&self) -> usize {
        self.ranges.len()
    }

    /// Whether `range` covers the entire object.
    pub fn is_whole(&self, range: &ByteRange) -> bool {
        range.start == 0 && range.end == self.content_length
    }
}

/// Number of parts for an object of `content_length` bytes.
///
/// `ceil(content_length / chunk_size)` clamped to `[1, max_parts]`, with a single
/// part for anything under the split threshold. A chunk size of `None` or zero
/// falls back to the configured default.
pub fn part_count(content_length: u64, chunk_size: Option<u64>, config: &DownloaderConfig) -> usize {
    if content_length < config.min_split_size {
        return 1;
    }

    let chunk = chunk_size.filter(|&c| c > 0).unwrap_or(config.chunk_size).max(1);
    let parts = content_length.div_ceil(chunk);
    parts.clamp(1, config.max_parts.max(1) as u64) as usize
}
