//! Runtime discovery of bearer tokens and GraphQL operation ids.
//!
//! The platform's web client ships its credentials inside `main*.js`
//! bundles. When every configured credential fails, the home page is
//! fetched, its bundle URLs extracted, and each bundle scanned for
//! `Bearer` tokens and operation-name/query-id pairings.

use once_cell::sync::Lazy;
use regex::Regex;

static BUNDLE_URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"https://[A-Za-z0-9.-]+/[^\s"'<>]*main[^\s"'<>]*\.js"#).unwrap()
});

static BEARER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Bearer ([A-Za-z0-9%_-]{60,})").unwrap());

static BEARER_CONST_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"BEARER_TOKEN\s*[:=]\s*"([A-Za-z0-9%_-]{60,})""#).unwrap());

static SLASH_OP_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([A-Za-z0-9_-]{15,40})/(UserByScreenName|UserMedia|UserTweets)\b").unwrap()
});

static QUERY_ID_FIRST_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"queryId\s*:\s*"([A-Za-z0-9_-]+)"\s*,\s*operationName\s*:\s*"(UserByScreenName|UserMedia|UserTweets)""#,
    )
    .unwrap()
});

static OPERATION_NAME_FIRST_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"operationName\s*:\s*"(UserByScreenName|UserMedia|UserTweets)"\s*,\s*queryId\s*:\s*"([A-Za-z0-9_-]+)""#,
    )
    .unwrap()
});

/// Bearer tokens and operation ids pulled out of client bundles.
#[derive(Debug, Default)]
pub struct DiscoveredMetadata {
    pub bearer_tokens: Vec<String>,
    pub user_by_screen_name: Vec<String>,
    pub user_media: Vec<String>,
    pub user_tweets: Vec<String>,
}

impl DiscoveredMetadata {
    pub fn is_empty(&self) -> bool {
        self.bearer_tokens.is_empty()
            && self.user_by_screen_name.is_empty()
            && self.user_media.is_empty()
            && self.user_tweets.is_empty()
    }

    fn record_operation(&mut self, name: &str, id: &str) {
        let list = match name {
            "UserByScreenName" => &mut self.user_by_screen_name,
            "UserMedia" => &mut self.user_media,
            "UserTweets" => &mut self.user_tweets,
            _ => return,
        };
        let id = id.to_string();
        if !list.contains(&id) {
            list.push(id);
        }
    }
}

/// Extract `main*.js` bundle URLs from the home page HTML.
pub fn extract_bundle_urls(html: &str) -> Vec<String> {
    let mut urls = Vec::new();
    for m in BUNDLE_URL_RE.find_iter(html) {
        let url = m.as_str().to_string();
        if !urls.contains(&url) {
            urls.push(url);
        }
    }
    urls
}

/// Scan one bundle's source for bearer tokens and operation ids.
pub fn scan_bundle(js: &str, found: &mut DiscoveredMetadata) {
    for captures in BEARER_RE.captures_iter(js) {
        let token = captures[1].to_string();
        if !found.bearer_tokens.contains(&token) {
            found.bearer_tokens.push(token);
        }
    }
    for captures in BEARER_CONST_RE.captures_iter(js) {
        let token = captures[1].to_string();
        if !found.bearer_tokens.contains(&token) {
            found.bearer_tokens.push(token);
        }
    }

    for captures in SLASH_OP_RE.captures_iter(js) {
        let (id, name) = (&captures[1], captures[2].to_string());
        found.record_operation(&name, id);
    }
    for captures in QUERY_ID_FIRST_RE.captures_iter(js) {
        let (id, name) = (&captures[1], captures[2].to_string());
        found.record_operation(&name, id);
    }
    for captures in OPERATION_NAME_FIRST_RE.captures_iter(js) {
        let (name, id) = (captures[1].to_string(), &captures[2]);
        found.record_operation(&name, id);
    }
}

/// Pull `features cannot be null: a, b` flag names out of server
/// error messages.
pub fn collect_missing_features<'a>(messages: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut names = Vec::new();
    for message in messages {
        let Some(pos) = message.find("features cannot be null") else {
            continue;
        };
        let rest = &message[pos..];
        let Some(colon) = rest.find(':') else {
            continue;
        };
        for raw in rest[colon + 1..].split(',') {
            let name: String = raw
                .trim()
                .trim_matches(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .to_string();
            if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                // Went past the end of the flag list.
                break;
            }
            if !names.contains(&name) {
                names.push(name);
            }
        }
    }
    names
}
