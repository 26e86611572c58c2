//! Headless-browser scraper.
//!
//! Drives chromium over CDP: injects the session cookies against both
//! platform domains, renders the account's media page (falling back to
//! a media-filtered search), and scrapes tweet articles out of the DOM
//! while scrolling the timeline.

use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::CookieParam;
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
use chromiumoxide::Page;
use futures::StreamExt;
use serde::Deserialize;
use tokio::task::JoinHandle;

use crate::error::{Error, Result};
use crate::media::{MediaItem, MediaKind};
use crate::session::{cookies, Session};
use crate::timeutil::sleep_ms;

use super::{finalize_inventory, FetchOptions, MediaScraper, DESKTOP_USER_AGENT};

/// Default timeout applied to navigations and DOM operations.
const OPERATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Settle time after the initial navigation.
const INITIAL_SETTLE_MS: u64 = 1500;

/// Settle time after each scroll.
const SCROLL_SETTLE_MS: u64 = 900;

/// Maximum extract-and-scroll rounds per page.
const MAX_SCROLL_ROUNDS: usize = 14;

/// Stop after this many consecutive rounds without new items.
const STAGNANT_ROUND_LIMIT: usize = 3;

/// DOM extraction script. `__TARGET__` is replaced with the
/// JSON-encoded lowercase handle before evaluation.
const EXTRACT_SCRIPT: &str = r#"
(() => {
  const target = __TARGET__;
  const out = [];
  const isRepost = (article) => {
    const ctx = article.querySelector('[data-testid="socialContext"]');
    if (!ctx) return false;
    const text = (ctx.textContent || '').toLowerCase();
    return text.includes('retweeted') || text.includes('reposted')
      || text.includes('转推') || text.includes('リポスト');
  };
  for (const article of document.querySelectorAll('article[data-testid="tweet"]')) {
    if (isRepost(article)) continue;
    const statuses = [];
    for (const link of article.querySelectorAll('a[href*="/status/"]')) {
      const m = (link.getAttribute('href') || '').match(/^\/([^\/]+)\/status\/(\d+)/);
      if (m) statuses.push({ user: m[1].toLowerCase(), id: m[2] });
    }
    if (statuses.length === 0) continue;
    const primary = statuses[0];
    if (primary.user !== target) continue;
    if (statuses.some((s) => s.user !== primary.user)) continue;
    const time = article.querySelector('time');
    const createdAt = time ? time.getAttribute('datetime') : null;
    for (const img of article.querySelectorAll('img')) {
      const src = img.getAttribute('src') || '';
      if (!src.includes('pbs.twimg.com/media/')) continue;
      let url;
      try {
        const u = new URL(src);
        u.searchParams.set('name', 'orig');
        url = u.toString();
      } catch (e) { continue; }
      out.push({ tweetId: primary.id, username: primary.user, kind: 'image', url, createdAt });
    }
    for (const video of article.querySelectorAll('video')) {
      const sources = [video.getAttribute('src') || ''];
      for (const s of video.querySelectorAll('source')) sources.push(s.getAttribute('src') || '');
      for (const src of sources) {
        if (!src) continue;
        const isMedia = src.includes('video.twimg.com') || src.endsWith('.mp4') || src.endsWith('.m3u8');
        if (!isMedia) continue;
        const kind = (src.includes('/tweet_video/') || src.endsWith('.gif')) ? 'gif' : 'video';
        out.push({ tweetId: primary.id, username: primary.user, kind, url: src, createdAt });
      }
    }
  }
  return out;
})()
"#;

const SCROLL_SCRIPT: &str = "window.scrollBy(0, window.innerHeight * 2.5)";

/// One candidate produced by the extraction script.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DomCandidate {
    tweet_id: String,
    username: String,
    kind: String,
    url: String,
    created_at: Option<String>,
}

impl DomCandidate {
    fn into_media_item(self) -> Option<MediaItem> {
        let kind = match self.kind.as_str() {
            "image" => MediaKind::Image,
            "video" => MediaKind::Video,
            "gif" => MediaKind::Gif,
            _ => return None,
        };
        Some(MediaItem {
            id: format!("{}_{}", self.tweet_id, dom_media_id(&self.url)),
            tweet_id: self.tweet_id,
            username: self.username,
            kind,
            url: self.url,
            created_at: self.created_at,
            filename_hint: None,
        })
    }
}

/// Media id surrogate for DOM candidates: the last path segment's
/// stem, since the page does not expose numeric media ids.
fn dom_media_id(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let segment = path.rsplit('/').next().unwrap_or(path);
    let stem = segment.split('.').next().unwrap_or(segment);
    if stem.is_empty() {
        "media".to_string()
    } else {
        stem.to_string()
    }
}

/// Scraper rendering the platform's media pages in headless chromium.
pub struct BrowserScraper {
    browser: Option<Browser>,
    handler_task: Option<JoinHandle<()>>,
    cookie_params: Vec<CookieParam>,
}

impl Default for BrowserScraper {
    fn default() -> Self {
        Self::new()
    }
}

impl BrowserScraper {
    pub fn new() -> Self {
        Self {
            browser: None,
            handler_task: None,
            cookie_params: Vec::new(),
        }
    }

    async fn ensure_browser(&mut self) -> Result<()> {
        if self.browser.is_some() {
            return Ok(());
        }

        let config = BrowserConfig::builder()
            .no_sandbox()
            .window_size(1280, 900)
            .request_timeout(OPERATION_TIMEOUT)
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--mute-audio")
            .arg("--hide-scrollbars")
            .build()
            .map_err(|e| Error::Internal(format!("browser config: {}", e)))?;

        let (browser, mut handler) = Browser::launch(config).await.map_err(|e| {
            let message = e.to_string();
            if message.to_lowercase().contains("executable")
                || message.to_lowercase().contains("detect")
            {
                Error::BrowserMissing(message)
            } else {
                Error::Internal(format!("browser launch failed: {}", message))
            }
        })?;

        tracing::info!("headless browser launched");
        self.handler_task = Some(tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        }));
        self.browser = Some(browser);
        Ok(())
    }

    async fn prepare_page(&self, page: &Page) -> Result<()> {
        page.execute(SetUserAgentOverrideParams::new(
            DESKTOP_USER_AGENT.to_string(),
        ))
        .await
        .map_err(|e| Error::Internal(format!("set user agent: {}", e)))?;

        for cookie in &self.cookie_params {
            if let Err(e) = page.set_cookie(cookie.clone()).await {
                tracing::warn!(name = %cookie.name, "failed to set cookie: {}", e);
            }
        }
        Ok(())
    }

    /// Render one URL and run the extract/scroll loop.
    async fn scrape_page(
        &self,
        page: &Page,
        url: &str,
        handle: &str,
        cap: usize,
    ) -> Result<Vec<MediaItem>> {
        tokio::time::timeout(OPERATION_TIMEOUT, page.goto(url))
            .await
            .map_err(|_| Error::Scrape(format!("navigation timed out for {}", url)))?
            .map_err(|e| Error::Scrape(format!("navigation failed for {}: {}", url, e)))?;

        sleep_ms(INITIAL_SETTLE_MS).await;

        let target = handle.to_lowercase();
        let script = EXTRACT_SCRIPT.replace(
            "__TARGET__",
            &serde_json::to_string(&target).unwrap_or_else(|_| "\"\"".to_string()),
        );

        let mut collected: Vec<MediaItem> = Vec::new();
        let mut stagnant_rounds = 0usize;

        for _ in 0..MAX_SCROLL_ROUNDS {
            let candidates: Vec<DomCandidate> =
                match tokio::time::timeout(OPERATION_TIMEOUT, page.evaluate(script.clone())).await
                {
                    Ok(Ok(result)) => result.into_value().unwrap_or_default(),
                    Ok(Err(e)) => {
                        tracing::debug!(%url, "extraction script failed: {}", e);
                        Vec::new()
                    }
                    Err(_) => {
                        tracing::debug!(%url, "extraction script timed out");
                        Vec::new()
                    }
                };

            let before = collected.len();
            for candidate in candidates {
                if let Some(item) = candidate.into_media_item() {
                    if !collected.iter().any(|c| c.dedup_key() == item.dedup_key()) {
                        collected.push(item);
                    }
                }
            }

            if collected.len() >= cap {
                break;
            }
            if collected.len() == before {
                stagnant_rounds += 1;
                if stagnant_rounds >= STAGNANT_ROUND_LIMIT {
                    break;
                }
            } else {
                stagnant_rounds = 0;
            }

            if let Err(e) = page.evaluate(SCROLL_SCRIPT).await {
                tracing::debug!(%url, "scroll failed: {}", e);
                break;
            }
            sleep_ms(SCROLL_SETTLE_MS).await;
        }

        Ok(collected)
    }

    /// The candidate URLs for a handle: the media tab on both domains,
    /// then a media-filtered search on both domains.
    fn candidate_urls(handle: &str) -> [String; 4] {
        let query = urlencode_component(&format!("(from:{}) filter:media", handle));
        [
            format!("https://x.com/{}/media", handle),
            format!("https://twitter.com/{}/media", handle),
            format!("https://x.com/search?q={}&src=typed_query&f=live", query),
            format!("https://twitter.com/search?q={}&src=typed_query&f=live", query),
        ]
    }
}

fn urlencode_component(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

#[async_trait]
impl MediaScraper for BrowserScraper {
    async fn initialize(&mut self, session: &Session) -> Result<()> {
        // Session cookies are already materialized against both
        // platform domains by the normalizer.
        self.cookie_params = session
            .cookies
            .iter()
            .filter_map(|cookie| {
                let name = cookies::cookie_name(cookie);
                if name.is_empty() {
                    return None;
                }
                let domain = cookies::cookie_domain(cookie).unwrap_or_else(|| ".x.com".into());
                CookieParam::builder()
                    .name(name)
                    .value(cookies::cookie_value(cookie))
                    .domain(domain)
                    .path("/")
                    .secure(true)
                    .build()
                    .ok()
            })
            .collect();
        Ok(())
    }

    async fn fetch_user_media(
        &mut self,
        username: &str,
        options: &FetchOptions,
    ) -> Result<Vec<MediaItem>> {
        self.ensure_browser().await?;
        let browser = self
            .browser
            .as_ref()
            .ok_or_else(|| Error::Internal("browser not initialized".into()))?;

        let mut attempts = Vec::new();
        for url in Self::candidate_urls(username) {
            let page = match browser.new_page("about:blank").await {
                Ok(page) => page,
                Err(e) => {
                    attempts.push(format!("{}: page open failed: {}", url, e));
                    continue;
                }
            };

            let result = async {
                self.prepare_page(&page).await?;
                self.scrape_page(&page, &url, username, options.max_tweets)
                    .await
            }
            .await;
            let _ = page.close().await;

            match result {
                Ok(items) if !items.is_empty() => {
                    tracing::info!(username, %url, count = items.len(), "browser scrape succeeded");
                    return Ok(finalize_inventory(items, options));
                }
                Ok(_) => attempts.push(format!("{}: no media articles found", url)),
                Err(e) => attempts.push(format!("{}: {}", url, e)),
            }
        }

        Err(Error::Scrape(format!(
            "browser engine found no media for {}: {}",
            username,
            attempts.join("; ")
        )))
    }

    async fn close(&mut self) {
        if let Some(mut browser) = self.browser.take() {
            if let Err(e) = browser.close().await {
                tracing::debug!("browser close: {}", e);
            }
        }
        if let Some(task) = self.handler_task.take() {
            if tokio::time::timeout(Duration::from_secs(5), task).await.is_err() {
                tracing::debug!("browser handler did not stop in time");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidate_urls_order() {
        let urls = BrowserScraper::candidate_urls("alice");
        assert_eq!(urls[0], "https://x.com/alice/media");
        assert_eq!(urls[1], "https://twitter.com/alice/media");
        assert!(urls[2].starts_with("https://x.com/search?q="));
        assert!(urls[3].starts_with("https://twitter.com/search?q="));
    }

    #[test]
    fn test_dom_media_id() {
        assert_eq!(
            dom_media_id("https://pbs.twimg.com/media/GaXyZ123.jpg?name=orig"),
            "GaXyZ123"
        );
        assert_eq!(
            dom_media_id("https://video.twimg.com/tweet_video/Abc9.mp4"),
            "Abc9"
        );
        assert_eq!(dom_media_id("https://x.com/"), "media");
    }

    #[test]
    fn test_dom_candidate_kind_mapping() {
        let candidate = DomCandidate {
            tweet_id: "1".into(),
            username: "alice".into(),
            kind: "gif".into(),
            url: "https://video.twimg.com/tweet_video/a.mp4".into(),
            created_at: Some("2024-04-01T10:00:00.000Z".into()),
        };
        let item = candidate.into_media_item().unwrap();
        assert_eq!(item.kind, MediaKind::Gif);
        assert_eq!(item.id, "1_a");

        let unknown = DomCandidate {
            tweet_id: "1".into(),
            username: "alice".into(),
            kind: "audio".into(),
            url: "https://e.com/a".into(),
            created_at: None,
        };
        assert!(unknown.into_media_item().is_none());
    }
}
