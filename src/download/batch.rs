//! Bounded-concurrency media download.
//!
//! Items are fanned out to at most `concurrency` workers; each item's
//! outcome is marshalled back to the coordinator so the aggregate
//! counters always equal the sum of per-item outcomes. The ledger is
//! written exactly once, after every worker has stopped, even when a
//! worker panicked.

use std::cmp::min;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::{Mutex, Semaphore};

use crate::fs::naming::{build_filename, sanitize};
use crate::job::events::{FailureDetail, MediaRef};
use crate::job::CancelFlag;
use crate::media::MediaItem;
use crate::timeutil::{backoff_ms, sleep_ms};

use super::ledger::{media_key, MediaLedger};

/// Base delay for the per-item retry backoff.
const RETRY_BASE_MS: u64 = 500;

/// Caller-tunable knobs for one batch.
#[derive(Debug, Clone)]
pub struct DownloadOptions {
    pub concurrency: usize,
    pub retry_count: u32,
    pub username: String,
    pub per_request_delay_ms: u64,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            concurrency: 4,
            retry_count: 2,
            username: "unknown".to_string(),
            per_request_delay_ms: 0,
        }
    }
}

/// Batch result. `downloaded + failed + skipped == total` and
/// `failure_details.len() == failed`.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub total: u64,
    pub downloaded: u64,
    pub failed: u64,
    pub skipped: u64,
    pub failure_details: Vec<FailureDetail>,
}

enum ItemOutcome {
    Downloaded,
    Skipped,
    Failed(FailureDetail),
}

/// One terminal or retryable download error.
#[derive(Debug)]
struct DownloadError {
    status: Option<u16>,
    message: String,
}

impl DownloadError {
    fn transport(err: &reqwest::Error) -> Self {
        let label = if err.is_timeout() { "timeout" } else { "network" };
        Self {
            status: None,
            message: format!("{} error fetching media: {}", label, err),
        }
    }

    /// Retry only transport-flavored errors without a status, or
    /// HTTP 429 / 5xx.
    fn is_retryable(&self) -> bool {
        match self.status {
            Some(status) => status == 429 || status >= 500,
            None => {
                let message = self.message.to_lowercase();
                message.contains("network")
                    || message.contains("timeout")
                    || message.contains("fetch")
            }
        }
    }

    fn code(&self) -> Option<String> {
        self.status.map(|s| format!("HTTP_{}", s))
    }
}

/// Download a batch of media items into
/// `<output_dir>/<sanitize(username)>/`, skipping what the ledger or
/// the filesystem already has.
pub async fn download_media_batch(
    client: &reqwest::Client,
    items: Vec<MediaItem>,
    output_dir: &Path,
    options: &DownloadOptions,
    cancel: &CancelFlag,
) -> BatchOutcome {
    let mut outcome = BatchOutcome {
        total: items.len() as u64,
        ..Default::default()
    };
    if items.is_empty() {
        return outcome;
    }

    let ledger = Arc::new(Mutex::new(MediaLedger::load(output_dir)));
    let user_dir = output_dir.join(sanitize(&options.username));

    let workers = min(options.concurrency.max(1), items.len());
    let semaphore = Arc::new(Semaphore::new(workers));

    let mut handles = Vec::with_capacity(items.len());
    for item in items {
        let media_ref = MediaRef {
            tweet_id: item.tweet_id.clone(),
            media_id: item.media_id().to_string(),
            url: item.url.clone(),
            target_path: None,
        };
        let semaphore = Arc::clone(&semaphore);
        let ledger = Arc::clone(&ledger);
        let client = client.clone();
        let user_dir = user_dir.clone();
        let options = options.clone();
        let cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
            process_item(&client, item, &user_dir, &ledger, &options, &cancel).await
        });
        handles.push((handle, media_ref));
    }

    for (handle, media_ref) in handles {
        match handle.await {
            Ok(ItemOutcome::Downloaded) => outcome.downloaded += 1,
            Ok(ItemOutcome::Skipped) => outcome.skipped += 1,
            Ok(ItemOutcome::Failed(detail)) => {
                outcome.failed += 1;
                outcome.failure_details.push(detail);
            }
            Err(join_error) => {
                outcome.failed += 1;
                outcome.failure_details.push(FailureDetail::media_scope(
                    &options.username,
                    media_ref,
                    format!("download worker panicked: {}", join_error),
                    None,
                    1,
                ));
            }
        }
    }

    if let Err(e) = ledger.lock().await.save() {
        tracing::warn!("failed to write download ledger: {}", e);
    }

    outcome
}

async fn process_item(
    client: &reqwest::Client,
    item: MediaItem,
    user_dir: &Path,
    ledger: &Arc<Mutex<MediaLedger>>,
    options: &DownloadOptions,
    cancel: &CancelFlag,
) -> ItemOutcome {
    if cancel.is_cancelled() {
        return ItemOutcome::Skipped;
    }

    let key = media_key(&options.username, &item);
    if ledger.lock().await.contains(&key) {
        tracing::debug!(id = %item.id, "in ledger, skipping");
        return ItemOutcome::Skipped;
    }

    if let Err(e) = tokio::fs::create_dir_all(user_dir).await {
        return ItemOutcome::Failed(failure(
            &item,
            options,
            None,
            1,
            None,
            format!("could not create output directory: {}", e),
        ));
    }

    let target = user_dir.join(build_filename(&item));
    if matches!(tokio::fs::try_exists(&target).await, Ok(true)) {
        tracing::debug!(path = %target.display(), "already on disk, skipping");
        ledger.lock().await.insert(key);
        return ItemOutcome::Skipped;
    }

    let max_attempts = options.retry_count + 1;
    for attempt in 0..max_attempts {
        if cancel.is_cancelled() {
            return ItemOutcome::Skipped;
        }

        sleep_ms(options.per_request_delay_ms).await;

        match fetch_to_file(client, &item.url, &target).await {
            Ok(()) => {
                tracing::info!(path = %target.display(), "downloaded");
                ledger.lock().await.insert(key);
                return ItemOutcome::Downloaded;
            }
            Err(error) => {
                let attempts_done = attempt + 1;
                if attempts_done < max_attempts && error.is_retryable() {
                    tracing::debug!(
                        id = %item.id,
                        attempt = attempts_done,
                        "retryable download failure: {}",
                        error.message
                    );
                    sleep_ms(backoff_ms(RETRY_BASE_MS, attempt)).await;
                    continue;
                }
                return ItemOutcome::Failed(failure(
                    &item,
                    options,
                    error.code(),
                    attempts_done,
                    Some(&target),
                    error.message,
                ));
            }
        }
    }

    // The loop always returns; keep the compiler satisfied.
    ItemOutcome::Skipped
}

async fn fetch_to_file(
    client: &reqwest::Client,
    url: &str,
    target: &Path,
) -> std::result::Result<(), DownloadError> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| DownloadError::transport(&e))?;

    let status = response.status();
    if !status.is_success() {
        return Err(DownloadError {
            status: Some(status.as_u16()),
            message: format!("HTTP {} fetching {}", status.as_u16(), url),
        });
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| DownloadError::transport(&e))?;
    tokio::fs::write(target, &bytes)
        .await
        .map_err(|e| DownloadError {
            status: None,
            message: format!("write failed for {}: {}", target.display(), e),
        })?;
    Ok(())
}

fn failure(
    item: &MediaItem,
    options: &DownloadOptions,
    code: Option<String>,
    attempts: u32,
    target: Option<&PathBuf>,
    message: String,
) -> FailureDetail {
    FailureDetail::media_scope(
        &options.username,
        MediaRef {
            tweet_id: item.tweet_id.clone(),
            media_id: item.media_id().to_string(),
            url: item.url.clone(),
            target_path: target.map(|p| p.display().to_string()),
        },
        message,
        code,
        attempts,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        let no_status_network = DownloadError {
            status: None,
            message: "network error fetching media: connection reset".into(),
        };
        assert!(no_status_network.is_retryable());

        let no_status_other = DownloadError {
            status: None,
            message: "write failed for /out/a.jpg: disk full".into(),
        };
        assert!(!no_status_other.is_retryable());

        let too_many = DownloadError {
            status: Some(429),
            message: "HTTP 429".into(),
        };
        assert!(too_many.is_retryable());

        let server = DownloadError {
            status: Some(503),
            message: "HTTP 503".into(),
        };
        assert!(server.is_retryable());

        let not_found = DownloadError {
            status: Some(404),
            message: "HTTP 404".into(),
        };
        assert!(!not_found.is_retryable());
        assert_eq!(not_found.code().as_deref(), Some("HTTP_404"));
    }
}
