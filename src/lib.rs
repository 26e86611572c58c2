//! twmd - batch media downloader for X/Twitter
//!
//! This library discovers the media items originally authored by a set
//! of accounts and downloads them into a deterministic per-account
//! directory layout, skipping what is already present.
//!
//! # Features
//!
//! - Structured-API scraping with auth-triple rotation and runtime
//!   metadata discovery, plus a legacy timeline fallback
//! - Headless-browser fallback engine
//! - Bounded-concurrency downloads with retry and an on-disk ledger
//! - A streaming, typed event feed per job
//!
//! # Example
//!
//! ```no_run
//! use twmd::{run_batch_job, BatchJobOptions, SessionStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = SessionStore::new("twmd")?;
//!     let options = BatchJobOptions {
//!         users: vec!["alice".into()],
//!         output_dir: "./media".into(),
//!         ..Default::default()
//!     };
//!     let mut job = run_batch_job(store, options, None);
//!     while let Some(event) = job.next_event().await {
//!         println!("{}", event.message);
//!     }
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod download;
pub mod error;
pub mod fs;
pub mod job;
pub mod media;
pub mod output;
pub mod report;
pub mod scraper;
pub mod server;
pub mod session;
pub mod timeutil;

// Re-exports for convenience
pub use error::{Error, Result};
pub use job::{run_batch_job, BatchJobOptions, JobEvent, JobHandle, JobResult};
pub use media::{MediaItem, MediaKind};
pub use scraper::{Engine, FetchOptions, MediaScraper};
pub use session::{Session, SessionStore};
