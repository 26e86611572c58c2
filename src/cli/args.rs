//! Command-line argument definitions using clap.

use std::path::PathBuf;
use std::str::FromStr;

use clap::{Parser, Subcommand, ValueEnum};

use crate::media::MediaKind;
use crate::scraper::Engine;

/// X/Twitter batch media downloader CLI.
#[derive(Parser, Debug)]
#[command(
    name = "twmd",
    version,
    about = "Download media posted by X/Twitter accounts",
    long_about = "Downloads the images, videos, and animated gifs originally \
                  authored by a set of accounts into a per-account directory \
                  layout, skipping what is already present."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Suppress informational output.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Disable colored output.
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Output format for events and errors.
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    pub output_format: OutputFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Save a session from cookie text.
    Login(LoginArgs),

    /// Show the saved session's state.
    Whoami,

    /// Remove the saved session.
    Logout,

    /// Run a batch download job.
    Download(DownloadArgs),

    /// Start the local browser controller.
    Gui(GuiArgs),
}

#[derive(clap::Args, Debug)]
pub struct LoginArgs {
    /// File containing cookie text (header, line, or jar form).
    /// Reads standard input when omitted.
    #[arg(long)]
    pub cookies_file: Option<PathBuf>,

    /// Accept sessions missing the required auth cookies.
    #[arg(long)]
    pub no_strict: bool,
}

#[derive(clap::Args, Debug)]
pub struct DownloadArgs {
    /// Comma-separated account handles (with or without a leading @).
    #[arg(long, value_delimiter = ',', conflicts_with = "users_file")]
    pub users: Option<Vec<String>>,

    /// File with one handle per line; `#` lines are comments.
    #[arg(long)]
    pub users_file: Option<PathBuf>,

    /// Target directory for downloads.
    #[arg(long)]
    pub out: PathBuf,

    /// Media kinds to download.
    #[arg(long, value_delimiter = ',', value_parser = MediaKind::from_str,
          default_values_t = [MediaKind::Image, MediaKind::Video, MediaKind::Gif])]
    pub kinds: Vec<MediaKind>,

    /// Maximum timeline depth per account.
    #[arg(long, default_value_t = 200)]
    pub max_tweets: usize,

    /// Concurrent downloads per account.
    #[arg(long, default_value_t = 4)]
    pub concurrency: usize,

    /// Retries per media item.
    #[arg(long, default_value_t = 2)]
    pub retry: u32,

    /// Retries per account after a failed scrape.
    #[arg(long, default_value_t = 1)]
    pub user_retry: u32,

    /// Pause between accounts, in milliseconds.
    #[arg(long, default_value_t = 0)]
    pub user_delay_ms: u64,

    /// Pause before each media request, in milliseconds.
    #[arg(long, default_value_t = 0)]
    pub request_delay_ms: u64,

    /// Scraper engine.
    #[arg(long, value_parser = Engine::from_str, default_value_t = Engine::Graphql)]
    pub engine: Engine,

    /// Write a JSON report here after the job.
    #[arg(long)]
    pub json_report: Option<PathBuf>,

    /// Write a CSV report here after the job.
    #[arg(long)]
    pub csv_report: Option<PathBuf>,

    /// Write the failure list (JSON) here after the job.
    #[arg(long)]
    pub failures_report: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
pub struct GuiArgs {
    /// Port for the local controller.
    #[arg(long, default_value_t = 3000)]
    pub port: u16,
}
