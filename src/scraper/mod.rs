//! Scraper engines resolving an account handle to a media inventory.
//!
//! Two engines are available:
//! - `graphql`: the structured web API, with a legacy REST fallback
//! - `playwright`: a headless chromium rendering the media page
//!
//! Both implement [`MediaScraper`] and return the same de-duplicated
//! [`MediaItem`] inventory.

pub mod auth;
pub mod browser;
pub mod graphql;
pub mod metadata;
pub mod parse;

pub use browser::BrowserScraper;
pub use graphql::GraphqlScraper;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::media::{dedup_media, MediaItem, MediaKind};
use crate::session::Session;

/// Desktop user agent presented to the platform by every engine.
pub const DESKTOP_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";

/// Scraper engine selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    /// Structured web API (default).
    #[default]
    Graphql,
    /// Headless-browser engine. The name is historical; the
    /// implementation drives chromium over CDP.
    Playwright,
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Engine::Graphql => write!(f, "graphql"),
            Engine::Playwright => write!(f, "playwright"),
        }
    }
}

impl FromStr for Engine {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "graphql" => Ok(Engine::Graphql),
            "playwright" => Ok(Engine::Playwright),
            other => Err(format!("unknown engine: {}", other)),
        }
    }
}

/// Per-fetch options handed to a scraper.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Upper bound on timeline depth and on returned media items.
    pub max_tweets: usize,

    /// Media kinds the caller wants.
    pub kinds: Vec<MediaKind>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            max_tweets: 200,
            kinds: MediaKind::all().to_vec(),
        }
    }
}

impl FetchOptions {
    pub fn wants(&self, kind: MediaKind) -> bool {
        self.kinds.contains(&kind)
    }
}

/// A scraper turns a handle into a media inventory.
///
/// Instances are created per job, initialized with the session, and
/// closed on every exit path (the browser engine owns a process).
#[async_trait]
pub trait MediaScraper: Send {
    async fn initialize(&mut self, session: &Session) -> Result<()>;

    /// Fetch the de-duplicated media inventory for one handle,
    /// filtered to the requested kinds. Either returns a (possibly
    /// empty) list or fails; there is no partial success.
    async fn fetch_user_media(
        &mut self,
        username: &str,
        options: &FetchOptions,
    ) -> Result<Vec<MediaItem>>;

    /// Release any owned resources. Safe to call more than once.
    async fn close(&mut self);
}

/// Construct the scraper for the chosen engine.
pub fn create_scraper(engine: Engine) -> Result<Box<dyn MediaScraper>> {
    Ok(match engine {
        Engine::Graphql => Box::new(GraphqlScraper::new()?),
        Engine::Playwright => Box::new(BrowserScraper::new()),
    })
}

/// Apply the caller's kind filter, de-duplicate, and cap the list.
pub(crate) fn finalize_inventory(
    items: Vec<MediaItem>,
    options: &FetchOptions,
) -> Vec<MediaItem> {
    let mut out = dedup_media(
        items
            .into_iter()
            .filter(|item| options.wants(item.kind))
            .collect(),
    );
    out.truncate(options.max_tweets);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_parsing() {
        assert_eq!("graphql".parse::<Engine>().unwrap(), Engine::Graphql);
        assert_eq!("Playwright".parse::<Engine>().unwrap(), Engine::Playwright);
        assert!("selenium".parse::<Engine>().is_err());
        assert_eq!(Engine::default(), Engine::Graphql);
    }

    #[test]
    fn test_finalize_inventory_filters_and_caps() {
        let mk = |tweet: &str, kind: MediaKind, url: &str| MediaItem {
            id: format!("{}_1", tweet),
            tweet_id: tweet.to_string(),
            username: "alice".to_string(),
            kind,
            url: url.to_string(),
            created_at: None,
            filename_hint: None,
        };
        let items = vec![
            mk("t1", MediaKind::Image, "https://e.com/a.jpg"),
            mk("t1", MediaKind::Image, "https://e.com/a.jpg"),
            mk("t2", MediaKind::Video, "https://e.com/b.mp4"),
            mk("t3", MediaKind::Gif, "https://e.com/c.mp4"),
        ];
        let options = FetchOptions {
            max_tweets: 10,
            kinds: vec![MediaKind::Image, MediaKind::Video],
        };
        let out = finalize_inventory(items, &options);
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|i| i.kind != MediaKind::Gif));
    }
}
