//! HTTP transport for remote logs.
//!
//! Objects are fetched with concurrent byte-range requests:
//!
//! 1. **Size** - a `HEAD` request reads `Content-Length`
//! 2. **Plan** - the object is split into at most [`MAX_DOWNLOAD_PARTS`] contiguous ranges
//! 3. **Fetch** - every range is requested at once and streamed into its own
//!    window of the destination, a buffer or a pre-sized file
//!
//! Progress from every download in the process is reported through a shared
//! [`DownloadStats`].

mod downloader;
mod plan;
mod stats;
pub(crate) mod writer;

pub use downloader::Downloader;
pub use plan::{
    ByteRange, DEFAULT_CHUNK_SIZE, DEFAULT_MIN_SPLIT_SIZE, DownloadPlan, DownloaderConfig, MAX_DOWNLOAD_PARTS,
    part_count,
};
pub use stats::{DEFAULT_PROGRESS_INTERVAL, DownloadStats, ProgressHandler};
