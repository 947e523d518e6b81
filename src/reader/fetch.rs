//! Fetching raw log bytes: local paths, local cache, remote with retries

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::LoadOptions;
use crate::http::Downloader;
use crate::util::{cache_key, is_remote, url_without_query};
use crate::{LogError, Result};

/// Raw (possibly compressed) bytes of the log at `url`.
pub(super) async fn read_log(
    url: &str,
    options: &LoadOptions,
    downloader: &Downloader,
    cancel: &CancellationToken,
) -> Result<Vec<u8>> {
    if !is_remote(url) {
        return tokio::fs::read(url).await.map_err(|e| LogError::file_error(url, e));
    }

    let chunk_size = options.chunk_size;
    match cache_path(url, options) {
        Some(path) => {
            if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                debug!("Cache hit for {}: {}", url_without_query(url), path.display());
            } else {
                download_to_cache(url, &path, options, downloader, cancel).await?;
            }
            tokio::fs::read(&path).await.map_err(|e| LogError::file_error(&path, e))
        }
        None => {
            with_retries(options.retries, options.retry_delay, cancel, move || {
                downloader.http_get(url, chunk_size, cancel)
            })
            .await
        }
    }
}

/// Cache location for `url`, when local caching is enabled.
pub(crate) fn cache_path(url: &str, options: &LoadOptions) -> Option<PathBuf> {
    if !options.local_cache {
        return None;
    }
    options.data_dir.as_ref().map(|dir| dir.join(cache_key(url)))
}

async fn download_to_cache(
    url: &str,
    path: &Path,
    options: &LoadOptions,
    downloader: &Downloader,
    cancel: &CancellationToken,
) -> Result<()> {
    if let Some(dir) = path.parent() {
        tokio::fs::create_dir_all(dir).await.map_err(|e| LogError::file_error(dir, e))?;
    }

    // Written under a temporary name so an interrupted download is never a cache hit
    let partial = path.with_extension("partial");
    let partial_ref = partial.as_path();
    let chunk_size = options.chunk_size;

    let outcome = with_retries(options.retries, options.retry_delay, cancel, move || {
        downloader.http_download(url, partial_ref, chunk_size, cancel)
    })
    .await;

    if let Err(e) = outcome {
        let _ = tokio::fs::remove_file(&partial).await;
        return Err(e);
    }

    tokio::fs::rename(&partial, path).await.map_err(|e| LogError::file_error(path, e))?;
    debug!("Cached {} at {}", url_without_query(url), path.display());
    Ok(())
}

/// Run `attempt` up to `retries + 1` times while the error is retryable.
async fn with_retries<T, F, Fut>(
    retries: u32,
    delay: Duration,
    cancel: &CancellationToken,
    mut attempt: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut failures = 0;
    loop {
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(e) if failures < retries && e.is_retryable() && !cancel.is_cancelled() => {
                failures += 1;
                warn!("download failed, retrying {}/{}: {}", failures, retries, e);
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(LogError::Aborted),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retries_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let result = with_retries(3, Duration::ZERO, &CancellationToken::new(), move || {
            let counter = Arc::clone(&counter);
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(LogError::transport("u", "reset"))
                } else {
                    Ok(7)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_retry_budget() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let result: Result<()> = with_retries(2, Duration::ZERO, &CancellationToken::new(), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err(LogError::transport("u", "reset")) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_errors_fail_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let result: Result<()> = with_retries(5, Duration::ZERO, &CancellationToken::new(), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err(LogError::HttpStatus { url: "u".into(), status: 404 }) }
        })
        .await;

        assert!(matches!(result, Err(LogError::HttpStatus { status: 404, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancellation_interrupts_backoff() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let result: Result<()> = with_retries(5, Duration::from_secs(60), &cancel, || async {
            Err(LogError::transport("u", "reset"))
        })
        .await;
        assert!(matches!(result, Err(LogError::Aborted)));
    }

    #[test]
    fn cache_path_requires_flag_and_directory() {
        let url = "https://h/route/0/rlog.zst?sig=abc";
        let mut options = LoadOptions { local_cache: true, ..Default::default() };
        assert_eq!(cache_path(url, &options), None);

        options.data_dir = Some(PathBuf::from("/data"));
        let path = cache_path(url, &options).unwrap();
        assert_eq!(path, Path::new("/data").join(cache_key("https://h/route/0/rlog.zst")));

        options.local_cache = false;
        assert_eq!(cache_path(url, &options), None);
    }
}
