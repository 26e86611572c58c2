//! Error types for the twmd application.

use thiserror::Error;

/// Main error type for the application.
#[derive(Error, Debug)]
pub enum Error {
    // Invocation errors
    #[error("Usage error: {0}")]
    Usage(String),

    // Credential errors
    #[error("Authentication failed: {0}")]
    Auth(String),

    // Scraping errors
    #[error("Scrape failed: {0}")]
    Scrape(String),

    #[error("Browser unavailable: {0}. Install Chrome or Chromium, or use --engine graphql.")]
    BrowserMissing(String),

    // Job lifecycle
    #[error("Job cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // HTTP errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    // URL parsing errors
    #[error("Invalid URL: {0}")]
    UrlParse(#[from] url::ParseError),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Process exit codes shared between the CLI and the controller.
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const PARTIAL: i32 = 4;
    pub const INTERNAL: i32 = 5;
}

impl Error {
    /// Stable error class name used in text and JSON error lines.
    ///
    /// Partial success is not an error: the driver derives exit code 4
    /// from `JobResult::has_final_failures` on a normally-returned
    /// result.
    pub fn class(&self) -> &'static str {
        match self {
            Error::Usage(_) | Error::BrowserMissing(_) => "usage",
            Error::Auth(_) => "auth",
            _ => "internal",
        }
    }

    /// Map this error to its process exit code.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Usage(_) | Error::BrowserMissing(_) => exit_codes::USAGE,
            Error::Auth(_) => exit_codes::AUTH,
            _ => exit_codes::INTERNAL,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_mapping() {
        assert_eq!(Error::Usage("bad flag".into()).exit_code(), 2);
        assert_eq!(Error::BrowserMissing("not found".into()).exit_code(), 2);
        assert_eq!(Error::Auth("missing ct0".into()).exit_code(), 3);
        assert_eq!(Error::Internal("boom".into()).exit_code(), 5);
        assert_eq!(Error::Cancelled.exit_code(), 5);
    }

    #[test]
    fn test_error_class() {
        assert_eq!(Error::Auth("x".into()).class(), "auth");
        assert_eq!(Error::Scrape("x".into()).class(), "internal");
    }
}
