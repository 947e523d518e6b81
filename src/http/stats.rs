//! Process-wide download progress accounting

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::trace;

/// Minimum time between two throttled progress notifications.
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_millis(500);

/// Receives `(completed_bytes, expected_bytes, success)` across all downloads.
pub type ProgressHandler = Box<dyn Fn(u64, u64, bool) + Send + Sync>;

const NEVER_NOTIFIED: u64 = u64::MAX;

/// Shared progress counters for every in-flight download.
///
/// Created once and handed to each [`Downloader`](super::Downloader) behind an
/// `Arc`. All state is atomic: downloads never block each other while updating
/// it, and throttling is best effort (a notification near the interval boundary
/// may occasionally be skipped or doubled).
pub struct DownloadStats {
    total_bytes: AtomicU64,
    downloaded_bytes: AtomicU64,
    /// Milliseconds since `epoch` of the last throttled notification
    last_notified_ms: AtomicU64,
    epoch: Instant,
    interval: Duration,
    handler: OnceLock<ProgressHandler>,
}

impl Default for DownloadStats {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DownloadStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadStats")
            .field("total_bytes", &self.total_bytes())
            .field("downloaded_bytes", &self.downloaded_bytes())
            .field("interval", &self.interval)
            .field("has_handler", &self.handler.get().is_some())
            .finish()
    }
}

impl DownloadStats {
    /// Create counters with the default 500ms notification interval.
    pub fn new() -> Self {
        Self::with_interval(DEFAULT_PROGRESS_INTERVAL)
    }

    /// Create counters with a custom notification interval.
    pub fn with_interval(interval: Duration) -> Self {
        Self {
            total_bytes: AtomicU64::new(0),
            downloaded_bytes: AtomicU64::new(0),
            last_notified_ms: AtomicU64::new(NEVER_NOTIFIED),
            epoch: Instant::now(),
            interval,
            handler: OnceLock::new(),
        }
    }

    /// Install the progress handler.
    ///
    /// Only the first installation takes effect; returns `false` if a handler was
    /// already present.
    pub fn install_handler<F>(&self, handler: F) -> bool
    where
        F: Fn(u64, u64, bool) + Send + Sync + 'static,
    {
        self.handler.set(Box::new(handler)).is_ok()
    }

    /// Bytes expected across all in-flight downloads.
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes.load(Ordering::Relaxed)
    }

    /// Bytes received so far across all in-flight downloads.
    pub fn downloaded_bytes(&self) -> u64 {
        self.downloaded_bytes.load(Ordering::Relaxed)
    }

    /// Register a new download of `size` bytes.
    pub fn add(&self, size: u64) {
        self.total_bytes.fetch_add(size, Ordering::Relaxed);
    }

    /// Credit `delta` received bytes and notify the handler if due.
    ///
    /// `final_call` bypasses throttling and is used once per finished download.
    pub fn update(&self, delta: u64, success: bool, final_call: bool) {
        let current = self.downloaded_bytes.fetch_add(delta, Ordering::Relaxed) + delta;
        let total = self.total_bytes.load(Ordering::Relaxed);

        let now = self.epoch.elapsed().as_millis() as u64;
        let prev = self.last_notified_ms.load(Ordering::Relaxed);
        let due = prev == NEVER_NOTIFIED
            || now.saturating_sub(prev) > self.interval.as_millis() as u64;

        if !final_call {
            if !due {
                return;
            }
            // Another download already notified in this window
            if self
                .last_notified_ms
                .compare_exchange(prev, now, Ordering::AcqRel, Ordering::Relaxed)
                .is_err()
            {
                return;
            }
        }

        trace!(current, total, success, final_call, "Download progress");
        if let Some(handler) = self.handler.get() {
            handler(current, total, success);
        }
    }

    /// Remove a failed download from the aggregate.
    pub fn remove(&self, file_total: u64, file_downloaded: u64) {
        self.total_bytes.fetch_sub(file_total, Ordering::Relaxed);
        self.downloaded_bytes.fetch_sub(file_downloaded, Ordering::Relaxed);
    }
}
