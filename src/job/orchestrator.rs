//! Batch orchestrator.
//!
//! Sequences per-handle work on a spawned task, multiplexing a single
//! typed event feed to the consumer while accumulating the final
//! [`JobResult`]. Handles are processed in input order; downloads
//! within a handle run concurrently but events stay totally ordered.

use std::cmp::max;
use std::path::PathBuf;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::download::{download_media_batch, DownloadOptions};
use crate::error::{Error, Result};
use crate::media::MediaKind;
use crate::scraper::{create_scraper, Engine, FetchOptions, MediaScraper, DESKTOP_USER_AGENT};
use crate::session::{Session, SessionStore};
use crate::timeutil::{backoff_ms, sleep_ms};

use super::events::{FailureDetail, JobEvent, JobEventKind, JobResult};
use super::CancelFlag;

/// Base delay for the per-user retry backoff.
const USER_RETRY_BASE_MS: u64 = 500;

/// Options for one batch job.
#[derive(Debug, Clone)]
pub struct BatchJobOptions {
    pub users: Vec<String>,
    pub output_dir: PathBuf,
    pub media_kinds: Vec<MediaKind>,
    pub engine: Engine,
    pub max_tweets_per_user: usize,
    pub concurrency: usize,
    pub retry_count: u32,
    pub user_retry_count: u32,
    pub user_delay_ms: u64,
    pub per_request_delay_ms: u64,
}

impl Default for BatchJobOptions {
    fn default() -> Self {
        Self {
            users: Vec::new(),
            output_dir: PathBuf::from("."),
            media_kinds: MediaKind::all().to_vec(),
            engine: Engine::default(),
            max_tweets_per_user: 200,
            concurrency: 4,
            retry_count: 2,
            user_retry_count: 1,
            user_delay_ms: 0,
            per_request_delay_ms: 0,
        }
    }
}

/// Handle to a running job: the event feed, the result, and the
/// cancel flag.
pub struct JobHandle {
    events: mpsc::UnboundedReceiver<JobEvent>,
    result: JoinHandle<Result<JobResult>>,
    cancel: CancelFlag,
}

impl JobHandle {
    /// Next event; `None` once the feed has ended.
    pub async fn next_event(&mut self) -> Option<JobEvent> {
        self.events.recv().await
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Signal the job to stop. Pending work is abandoned; the feed
    /// ends without a terminal result.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the job's final result. Drain the event feed first
    /// (or concurrently); events buffer without back-pressure.
    pub async fn join(self) -> Result<JobResult> {
        match self.result.await {
            Ok(result) => result,
            Err(e) => Err(Error::Internal(format!("job task failed: {}", e))),
        }
    }
}

/// Start a batch job. The caller may inject a scraper (used by tests
/// and the controller); otherwise one is constructed per the engine.
pub fn run_batch_job(
    store: SessionStore,
    options: BatchJobOptions,
    scraper: Option<Box<dyn MediaScraper>>,
) -> JobHandle {
    let (tx, events) = mpsc::unbounded_channel();
    let cancel = CancelFlag::new();
    let flag = cancel.clone();
    let result = tokio::spawn(async move { run_job(store, options, scraper, tx, flag).await });
    JobHandle {
        events,
        result,
        cancel,
    }
}

async fn run_job(
    store: SessionStore,
    options: BatchJobOptions,
    injected: Option<Box<dyn MediaScraper>>,
    tx: mpsc::UnboundedSender<JobEvent>,
    cancel: CancelFlag,
) -> Result<JobResult> {
    let session = match store.load() {
        Ok(Some(session)) if !session.is_empty() => session,
        Ok(_) => {
            tracing::info!("no saved session, running anonymously");
            Session::anonymous()
        }
        Err(e) => {
            tracing::warn!("could not load session ({}), running anonymously", e);
            Session::anonymous()
        }
    };

    let mut scraper = match injected {
        Some(scraper) => scraper,
        None => create_scraper(options.engine)?,
    };

    let outcome = run_users(scraper.as_mut(), &session, &options, &tx, &cancel).await;
    scraper.close().await;
    outcome
}

async fn run_users(
    scraper: &mut dyn MediaScraper,
    session: &Session,
    options: &BatchJobOptions,
    tx: &mpsc::UnboundedSender<JobEvent>,
    cancel: &CancelFlag,
) -> Result<JobResult> {
    scraper.initialize(session).await?;

    let client = reqwest::Client::builder()
        .user_agent(DESKTOP_USER_AGENT)
        .build()
        .map_err(|e| Error::Internal(format!("failed to create HTTP client: {}", e)))?;

    let fetch_options = FetchOptions {
        max_tweets: options.max_tweets_per_user,
        kinds: options.media_kinds.clone(),
    };

    let mut result = JobResult {
        total_users: options.users.len() as u64,
        ..Default::default()
    };

    emit(
        tx,
        JobEvent::new(
            JobEventKind::JobStarted,
            format!("starting job for {} user(s)", options.users.len()),
        ),
    );

    for (index, raw_handle) in options.users.iter().enumerate() {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let username = raw_handle.trim().trim_start_matches('@').trim().to_string();
        if username.is_empty() {
            result.failed_users += 1;
            emit(
                tx,
                JobEvent::new(
                    JobEventKind::Warning,
                    format!("skipping empty username entry #{}", index + 1),
                ),
            );
            continue;
        }

        emit(
            tx,
            JobEvent::for_user(
                JobEventKind::UserStarted,
                format!("processing @{}", username),
                &username,
            ),
        );

        process_user(
            scraper,
            &client,
            &username,
            options,
            &fetch_options,
            &mut result,
            tx,
            cancel,
        )
        .await?;

        if options.user_delay_ms > 0 && index + 1 < options.users.len() {
            sleep_ms(options.user_delay_ms).await;
        }
    }

    emit(
        tx,
        JobEvent::new(
            JobEventKind::JobFinished,
            format!(
                "job finished: {} downloaded, {} skipped, {} failed",
                result.downloaded, result.skipped, result.failed
            ),
        )
        .with_progress(result.progress()),
    );

    Ok(result)
}

#[allow(clippy::too_many_arguments)]
async fn process_user(
    scraper: &mut dyn MediaScraper,
    client: &reqwest::Client,
    username: &str,
    options: &BatchJobOptions,
    fetch_options: &FetchOptions,
    result: &mut JobResult,
    tx: &mpsc::UnboundedSender<JobEvent>,
    cancel: &CancelFlag,
) -> Result<()> {
    let max_attempts = options.user_retry_count + 1;

    for attempt in 1..=max_attempts {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        match scraper.fetch_user_media(username, fetch_options).await {
            Ok(items) => {
                emit(
                    tx,
                    JobEvent::for_user(
                        JobEventKind::MediaFound,
                        format!("found {} media item(s) for @{}", items.len(), username),
                        username,
                    ),
                );

                let download_options = DownloadOptions {
                    concurrency: options.concurrency,
                    retry_count: options.retry_count,
                    username: username.to_string(),
                    per_request_delay_ms: options.per_request_delay_ms,
                };
                let outcome = download_media_batch(
                    client,
                    items,
                    &options.output_dir,
                    &download_options,
                    cancel,
                )
                .await;
                if cancel.is_cancelled() {
                    return Err(Error::Cancelled);
                }

                result.total_media += outcome.total;
                result.downloaded += outcome.downloaded;
                result.failed += outcome.failed;
                result.skipped += outcome.skipped;
                result.failure_details.extend(outcome.failure_details);
                result.succeeded_users += 1;

                emit(
                    tx,
                    JobEvent::for_user(
                        JobEventKind::DownloadProgress,
                        format!(
                            "@{}: {} downloaded, {} skipped, {} failed",
                            username, outcome.downloaded, outcome.skipped, outcome.failed
                        ),
                        username,
                    )
                    .with_progress(super::JobProgress {
                        total: outcome.total,
                        downloaded: outcome.downloaded,
                        failed: outcome.failed,
                        skipped: outcome.skipped,
                    }),
                );
                emit(
                    tx,
                    JobEvent::for_user(
                        JobEventKind::UserFinished,
                        format!("finished @{}", username),
                        username,
                    ),
                );
                return Ok(());
            }
            Err(error) => {
                result
                    .failure_details
                    .push(FailureDetail::user_scope(username, error.to_string(), attempt));

                if attempt < max_attempts {
                    emit(
                        tx,
                        JobEvent::for_user(
                            JobEventKind::Warning,
                            format!(
                                "attempt {}/{} failed for @{}: {}; retrying",
                                attempt, max_attempts, username, error
                            ),
                            username,
                        ),
                    );
                    sleep_ms(max(
                        USER_RETRY_BASE_MS,
                        backoff_ms(USER_RETRY_BASE_MS, attempt - 1),
                    ))
                    .await;
                } else {
                    result.failed_users += 1;
                    emit(
                        tx,
                        JobEvent::for_user(
                            JobEventKind::Error,
                            format!(
                                "giving up on @{} after {} attempt(s): {}",
                                username, attempt, error
                            ),
                            username,
                        ),
                    );
                }
            }
        }
    }

    Ok(())
}

fn emit(tx: &mpsc::UnboundedSender<JobEvent>, event: JobEvent) {
    // A dropped receiver only means nobody is watching; the job still
    // runs to completion for its result.
    let _ = tx.send(event);
}
