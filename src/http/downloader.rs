//! Parallel ranged downloads

use futures::future::join_all;
use reqwest::StatusCode;
use reqwest::header::{CONTENT_LENGTH, RANGE};
use std::io::SeekFrom;
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncSeekExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::plan::{DownloadPlan, DownloaderConfig, part_count};
use super::stats::DownloadStats;
use super::writer::{PartSink, PartWriter};
use crate::util::{formatted_data_size, url_without_query};
use crate::{LogError, Result};

/// Fetches remote objects as a set of concurrent byte-range requests.
///
/// All parts of one download are polled from the calling task; no task or
/// thread is spawned per range. Every suspension point races against the
/// cancellation token, so an abort returns as soon as the token fires.
///
/// ```rust,no_run
/// use drivelog::http::{DownloadStats, Downloader};
/// use std::sync::Arc;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> drivelog::Result<()> {
/// let downloader = Downloader::new(Arc::new(DownloadStats::new()));
/// let cancel = CancellationToken::new();
/// let bytes = downloader.http_get("https://example.com/rlog.zst", None, &cancel).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Downloader {
    client: reqwest::Client,
    stats: Arc<DownloadStats>,
    config: DownloaderConfig,
}

impl Downloader {
    /// Create a downloader with default tuning.
    pub fn new(stats: Arc<DownloadStats>) -> Self {
        Self::with_config(stats, DownloaderConfig::default())
    }

    pub fn with_config(stats: Arc<DownloadStats>, config: DownloaderConfig) -> Self {
        Self { client: reqwest::Client::new(), stats, config }
    }

    pub fn stats(&self) -> &Arc<DownloadStats> {
        &self.stats
    }

    pub fn config(&self) -> &DownloaderConfig {
        &self.config
    }

    /// Range layout for an object of `content_length` bytes.
    pub fn plan(&self, content_length: u64, chunk_size: Option<u64>) -> DownloadPlan {
        DownloadPlan::new(content_length, part_count(content_length, chunk_size, &self.config))
    }

    /// Declared size of the remote object, or 0 when unknown or on any failure.
    pub async fn remote_size(&self, url: &str, cancel: &CancellationToken) -> u64 {
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return 0,
            response = self.client.head(url).send() => response,
        };

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                warn!("HEAD {} failed: {}", url_without_query(url), e);
                return 0;
            }
        };

        if !response.status().is_success() {
            warn!("HEAD {} returned {}", url_without_query(url), response.status());
            return 0;
        }

        // HEAD responses carry no body, so the header is read directly
        response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<u64>().ok())
            .unwrap_or(0)
    }

    /// Download `url` into memory.
    pub async fn http_get(
        &self,
        url: &str,
        chunk_size: Option<u64>,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>> {
        let content_length = self.require_size(url, cancel).await?;
        let plan = self.plan(content_length, chunk_size);

        let mut buffer = vec![0u8; content_length as usize];
        let mut sinks = Vec::with_capacity(plan.part_count());
        let mut rest = buffer.as_mut_slice();
        for range in &plan.ranges {
            let (window, tail) = rest.split_at_mut(range.len() as usize);
            sinks.push(PartSink::Memory(window));
            rest = tail;
        }

        self.run(url, &plan, sinks, cancel).await?;
        Ok(buffer)
    }

    /// Download `url` into the file at `path`, creating or truncating it.
    ///
    /// The file is extended to the full object size before any part writes.
    pub async fn http_download(
        &self,
        url: &str,
        path: impl AsRef<Path>,
        chunk_size: Option<u64>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let path = path.as_ref();
        let content_length = self.require_size(url, cancel).await?;
        let plan = self.plan(content_length, chunk_size);

        let file = tokio::fs::File::create(path)
            .await
            .map_err(|e| LogError::file_error(path, e))?;
        file.set_len(content_length).await.map_err(|e| LogError::file_error(path, e))?;
        drop(file);

        let mut sinks = Vec::with_capacity(plan.part_count());
        for range in &plan.ranges {
            let mut handle = tokio::fs::OpenOptions::new()
                .write(true)
                .open(path)
                .await
                .map_err(|e| LogError::file_error(path, e))?;
            handle
                .seek(SeekFrom::Start(range.start))
                .await
                .map_err(|e| LogError::file_error(path, e))?;
            sinks.push(PartSink::File(handle));
        }

        self.run(url, &plan, sinks, cancel).await
    }

    async fn require_size(&self, url: &str, cancel: &CancellationToken) -> Result<u64> {
        match self.remote_size(url, cancel).await {
            _ if cancel.is_cancelled() => Err(LogError::Aborted),
            0 => Err(LogError::transport(url_without_query(url), "remote size unknown or zero")),
            size => Ok(size),
        }
    }

    /// Drive every part of `plan` to completion and settle the stats.
    async fn run(
        &self,
        url: &str,
        plan: &DownloadPlan,
        sinks: Vec<PartSink<'_>>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let display_url = url_without_query(url);
        debug!(
            "Downloading {} ({}) in {} part(s)",
            display_url,
            formatted_data_size(plan.content_length),
            plan.part_count()
        );

        self.stats.add(plan.content_length);
        let stats: &DownloadStats = &self.stats;
        let mut writers: Vec<PartWriter<'_>> = plan
            .ranges
            .iter()
            .zip(sinks)
            .map(|(range, sink)| PartWriter::new(sink, *range, stats))
            .collect();

        let outcomes =
            join_all(writers.iter_mut().map(|writer| self.fetch_part(url, plan, writer, cancel)))
                .await;

        let written: u64 = writers.iter().map(PartWriter::written).sum();
        let failure = if cancel.is_cancelled() {
            Some(LogError::Aborted)
        } else {
            outcomes.into_iter().find_map(|outcome| outcome.err())
        };
        let success = failure.is_none();

        if !success {
            self.stats.remove(plan.content_length, written);
        }
        self.stats.update(0, success, true);

        match failure {
            None => {
                info!("Downloaded {} ({})", display_url, formatted_data_size(written));
                Ok(())
            }
            Some(LogError::Aborted) => {
                debug!("Download of {} aborted", display_url);
                Err(LogError::Aborted)
            }
            Some(err) => {
                warn!("Download of {} failed: {}", display_url, err);
                Err(err)
            }
        }
    }

    async fn fetch_part(
        &self,
        url: &str,
        plan: &DownloadPlan,
        writer: &mut PartWriter<'_>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let range = writer.range();
        let request = self.client.get(url).header(RANGE, range.header_value());

        let mut response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(LogError::Aborted),
            response = request.send() => response.map_err(|e| {
                LogError::transport_with_source(url_without_query(url), "range request failed", Box::new(e))
            })?,
        };

        let status = response.status();
        let accepted = status == StatusCode::PARTIAL_CONTENT
            || (status == StatusCode::OK && plan.is_whole(&range));
        if !accepted {
            warn!("Download failed: http error code: {}", status.as_u16());
            return Err(LogError::HttpStatus {
                url: url_without_query(url).to_string(),
                status: status.as_u16(),
            });
        }

        loop {
            let chunk = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(LogError::Aborted),
                chunk = response.chunk() => chunk.map_err(|e| {
                    LogError::transport_with_source(url_without_query(url), "body read failed", Box::new(e))
                })?,
            };
            let Some(chunk) = chunk else { break };

            let consumed = writer.write(&chunk).await?;
            if consumed < chunk.len() {
                warn!("Server sent more than requested for {}", range.header_value());
                return Err(LogError::RangeOverflow {
                    url: url_without_query(url).to_string(),
                    start: range.start,
                    end: range.end,
                });
            }
        }

        writer.finish().await?;

        if !writer.is_complete() {
            return Err(LogError::transport(
                url_without_query(url),
                format!("short body: {} of {} bytes", writer.written(), range.len()),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::server::{RangeServer, pattern_bytes};
    use std::time::{Duration, Instant};

    fn downloader(min_split_size: u64) -> Downloader {
        let config = DownloaderConfig { min_split_size, ..Default::default() };
        Downloader::with_config(Arc::new(DownloadStats::new()), config)
    }

    #[tokio::test]
    async fn remote_size_reads_content_length() {
        let server = RangeServer::start(pattern_bytes(4321)).await;
        let d = downloader(0);
        assert_eq!(d.remote_size(&server.url(), &CancellationToken::new()).await, 4321);
    }

    #[tokio::test]
    async fn remote_size_is_zero_for_missing_object() {
        let server = RangeServer::start(pattern_bytes(10)).await;
        let d = downloader(0);
        let url = format!("{}/missing", server.base_url());
        assert_eq!(d.remote_size(&url, &CancellationToken::new()).await, 0);
    }

    #[tokio::test]
    async fn downloads_are_byte_identical_for_any_part_count() -> anyhow::Result<()> {
        let body = pattern_bytes(64 * 1024 + 7);
        let len = body.len() as u64;

        for parts in [1u64, 2, 8] {
            let server = RangeServer::start(body.clone()).await;
            let d = downloader(0);
            let chunk = len.div_ceil(parts);

            let bytes = d.http_get(&server.url(), Some(chunk), &CancellationToken::new()).await?;
            assert_eq!(bytes, body, "{} parts", parts);
            assert_eq!(server.range_requests().await, parts as usize);
            assert_eq!(d.stats().downloaded_bytes(), len);
            assert_eq!(d.stats().total_bytes(), len);
        }
        Ok(())
    }

    #[tokio::test]
    async fn below_split_threshold_uses_one_request() -> anyhow::Result<()> {
        let body = pattern_bytes(5000);
        let server = RangeServer::start(body.clone()).await;
        let d = downloader(10_000);

        let bytes = d.http_get(&server.url(), Some(100), &CancellationToken::new()).await?;
        assert_eq!(bytes, body);
        assert_eq!(server.range_requests().await, 1);
        Ok(())
    }

    #[tokio::test]
    async fn file_destination_matches_source() -> anyhow::Result<()> {
        let body = pattern_bytes(100_003);
        let server = RangeServer::start(body.clone()).await;
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("rlog");

        let d = downloader(0);
        d.http_download(&server.url(), &path, Some(30_000), &CancellationToken::new()).await?;

        assert_eq!(tokio::fs::read(&path).await?, body);
        assert_eq!(server.range_requests().await, 4);
        Ok(())
    }

    #[tokio::test]
    async fn ignored_range_header_fails_multi_part_download() {
        let body = pattern_bytes(4096);
        let server = RangeServer::start_ignoring_ranges(body).await;
        let d = downloader(0);

        let result = d.http_get(&server.url(), Some(1024), &CancellationToken::new()).await;
        assert!(matches!(result, Err(LogError::HttpStatus { status: 200, .. })));
        assert_eq!(d.stats().total_bytes(), 0);
        assert_eq!(d.stats().downloaded_bytes(), 0);
    }

    #[tokio::test]
    async fn whole_object_part_accepts_plain_ok() -> anyhow::Result<()> {
        let body = pattern_bytes(4096);
        let server = RangeServer::start_ignoring_ranges(body.clone()).await;
        let d = downloader(1 << 20);

        assert_eq!(d.http_get(&server.url(), None, &CancellationToken::new()).await?, body);
        Ok(())
    }

    #[tokio::test]
    async fn unknown_size_is_a_failure() {
        let server = RangeServer::start(pattern_bytes(10)).await;
        let d = downloader(0);
        let url = format!("{}/missing", server.base_url());

        let result = d.http_get(&url, None, &CancellationToken::new()).await;
        assert!(matches!(result, Err(LogError::Transport { .. })));
    }

    #[tokio::test]
    async fn abort_returns_promptly_and_uncredits_stats() {
        let body = pattern_bytes(8192);
        // Only the first range answers quickly
        let server = RangeServer::start_with_stall(body, Duration::from_secs(30)).await;
        let d = downloader(0);
        let final_calls = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = Arc::clone(&final_calls);
        d.stats().install_handler(move |cur, total, ok| sink.lock().unwrap().push((cur, total, ok)));

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let result = d.http_get(&server.url(), Some(4096), &cancel).await;

        assert!(matches!(result, Err(LogError::Aborted)));
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(d.stats().total_bytes(), 0);
        assert_eq!(d.stats().downloaded_bytes(), 0);

        let calls = final_calls.lock().unwrap();
        assert_eq!(calls.last().map(|c| c.2), Some(false));
    }

    #[tokio::test]
    async fn cancelled_before_start_is_aborted() {
        let server = RangeServer::start(pattern_bytes(100)).await;
        let d = downloader(0);
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert!(matches!(d.http_get(&server.url(), None, &cancel).await, Err(LogError::Aborted)));
    }
}
