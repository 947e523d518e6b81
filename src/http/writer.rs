//! Bounded per-range writers

use std::io;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use super::plan::ByteRange;
use super::stats::DownloadStats;

/// Where a part's bytes end up.
pub(crate) enum PartSink<'a> {
    /// Disjoint window of the in-memory destination, exactly one range long
    Memory(&'a mut [u8]),
    /// Handle to the destination file, already positioned at the range start
    File(File),
}

/// Writes one range of a download and refuses anything beyond it.
pub(crate) struct PartWriter<'a> {
    sink: PartSink<'a>,
    range: ByteRange,
    written: u64,
    stats: &'a DownloadStats,
}

impl<'a> PartWriter<'a> {
    pub(crate) fn new(sink: PartSink<'a>, range: ByteRange, stats: &'a DownloadStats) -> Self {
        Self { sink, range, written: 0, stats }
    }

    pub(crate) fn range(&self) -> ByteRange {
        self.range
    }

    /// Bytes accepted so far.
    pub(crate) fn written(&self) -> u64 {
        self.written
    }

    /// Whether the whole range has been received.
    pub(crate) fn is_complete(&self) -> bool {
        self.written == self.range.len()
    }

    /// Accept `data` at the current position.
    ///
    /// Returns the number of bytes consumed: all of them, or zero when `data`
    /// would run past the end of the range.
    pub(crate) async fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let len = data.len() as u64;
        if self.written + len > self.range.len() {
            return Ok(0);
        }

        let offset = self.written as usize;
        match &mut self.sink {
            PartSink::Memory(window) => window[offset..offset + data.len()].copy_from_slice(data),
            PartSink::File(file) => file.write_all(data).await?,
        }

        self.written += len;
        self.stats.update(len, true, false);
        Ok(data.len())
    }

    /// Flush buffered file writes.
    pub(crate) async fn finish(&mut self) -> io::Result<()> {
        if let PartSink::File(file) = &mut self.sink {
            file.flush().await?;
        }
        Ok(())
    }
}
