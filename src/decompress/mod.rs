//! Streaming decompression for recorded logs.
//!
//! Two codecs are supported, both backed by their reference C libraries:
//!
//! - [`Codec::Bzip2`] (`.bz2`) decoded block by block into a growing buffer
//! - [`Codec::Zstd`] (`.zst`) decoded frame by frame through a fixed output chunk
//!
//! Both entry points take a [`CancellationToken`] that is polled once per decode
//! iteration. Corruption and cancellation are reported as [`LogError::Corrupt`]
//! and [`LogError::Aborted`]; nothing in this module panics on bad input.
//!
//! [`LogError::Corrupt`]: crate::LogError::Corrupt
//! [`LogError::Aborted`]: crate::LogError::Aborted

mod bz2;
mod zst;

pub use bz2::decompress_bz2;
pub use zst::decompress_zstd;

use std::fmt;
use tokio_util::sync::CancellationToken;

use crate::Result;
use crate::util::url_without_query;

/// Magic prefix of a bzip2 stream compressed at block size 9.
pub const BZ2_MAGIC: &[u8] = b"BZh9";

/// Magic prefix of a zstd frame.
pub const ZSTD_MAGIC: &[u8] = &[0x28, 0xB5, 0x2F, 0xFD];

/// Compression formats understood by the loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Codec {
    /// bzip2 block codec
    Bzip2,
    /// Zstandard frame codec
    Zstd,
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Codec::Bzip2 => f.write_str("bzip2"),
            Codec::Zstd => f.write_str("zstd"),
        }
    }
}

impl Codec {
    /// Pick a codec from the URL extension, falling back to magic-byte sniffing.
    ///
    /// Returns `None` for data that should be parsed as-is.
    pub fn detect(url: &str, data: &[u8]) -> Option<Self> {
        Self::from_extension(url).or_else(|| Self::sniff(data))
    }

    /// Codec implied by the file extension of `url`, ignoring any query string.
    pub fn from_extension(url: &str) -> Option<Self> {
        let path = url_without_query(url);
        if path.ends_with(".bz2") {
            Some(Codec::Bzip2)
        } else if path.ends_with(".zst") {
            Some(Codec::Zstd)
        } else {
            None
        }
    }

    /// Codec implied by the leading bytes of `data`.
    pub fn sniff(data: &[u8]) -> Option<Self> {
        if data.starts_with(BZ2_MAGIC) {
            Some(Codec::Bzip2)
        } else if data.starts_with(ZSTD_MAGIC) {
            Some(Codec::Zstd)
        } else {
            None
        }
    }

    /// Decompress `input` with this codec.
    pub fn decompress(self, input: &[u8], cancel: &CancellationToken) -> Result<Vec<u8>> {
        match self {
            Codec::Bzip2 => decompress_bz2(input, cancel),
            Codec::Zstd => decompress_zstd(input, cancel),
        }
    }
}
