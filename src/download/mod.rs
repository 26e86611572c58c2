//! Download module.
//!
//! Provides the downloaded-media ledger and the bounded-concurrency
//! batch downloader.

pub mod batch;
pub mod ledger;

pub use batch::{download_media_batch, BatchOutcome, DownloadOptions};
pub use ledger::{media_key, MediaLedger};
