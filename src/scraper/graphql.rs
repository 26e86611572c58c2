//! Structured-API scraper.
//!
//! Talks to the platform's GraphQL endpoints across four URL bases,
//! rotating auth triples and bearer tokens on authentication
//! failures, adapting feature flags the server complains about, and
//! discovering fresh credentials from the web client's JS bundles
//! when everything configured has gone stale. If every GraphQL path
//! fails, the legacy REST timeline is used as a last resort.

use async_trait::async_trait;
use reqwest::header;
use serde_json::{json, Value};

use crate::error::{Error, Result};
use crate::media::MediaItem;
use crate::session::{cookies, Session};

use super::auth::AuthState;
use super::metadata::{self, DiscoveredMetadata};
use super::parse;
use super::{finalize_inventory, FetchOptions, MediaScraper, DESKTOP_USER_AGENT};

/// The four URL bases tried, in order, for every endpoint.
const URL_BASES: [&str; 4] = [
    "https://x.com/i/api",
    "https://api.x.com",
    "https://twitter.com/i/api",
    "https://api.twitter.com",
];

/// Home pages used for ct0 refresh and metadata discovery.
const HOME_PAGES: [&str; 2] = ["https://x.com/", "https://twitter.com/"];

/// Hard cap on pagination rounds per handle.
const MAX_PAGINATION_ROUNDS: usize = 30;

/// Hard cap on feature-flag adaptation retries per request.
const MAX_FEATURE_ITERATIONS: usize = 4;

/// Page size cap of the legacy timeline endpoint.
const LEGACY_PAGE_SIZE: usize = 200;

/// Page size requested from the GraphQL timeline.
const GRAPHQL_PAGE_SIZE: usize = 100;

/// One failed attempt against one URL base.
#[derive(Debug)]
struct AttemptFailure {
    url: String,
    status: Option<u16>,
    body: String,
}

impl AttemptFailure {
    /// Whether this failure looks like stale credentials: 401 with
    /// error code 32 or an "authenticate" message, or a 404 whose
    /// body claims the resource does not exist.
    fn is_auth_shaped(&self) -> bool {
        let body = self.body.to_lowercase();
        match self.status {
            Some(401) => self.body.contains("\"code\":32") || body.contains("authenticate"),
            Some(404) => body.contains("not found") || body.contains("page does not exist"),
            _ => false,
        }
    }

    fn summary(&self) -> String {
        let status = self
            .status
            .map(|s| s.to_string())
            .unwrap_or_else(|| "transport".to_string());
        let mut body = self.body.replace(['\n', '\r'], " ");
        if body.len() > 120 {
            body.truncate(120);
            body.push('…');
        }
        format!("{} [{}] {}", self.url, status, body)
    }
}

/// Aggregated failure across all bases, carrying any feature names
/// the server demanded.
#[derive(Debug)]
struct RequestFailure {
    message: String,
    missing_features: Vec<String>,
}

fn aggregate_failures(path: &str, failures: &[AttemptFailure]) -> RequestFailure {
    let summaries: Vec<String> = failures.iter().map(AttemptFailure::summary).collect();
    let messages: Vec<String> = failures
        .iter()
        .flat_map(|f| error_messages(&f.body))
        .collect();
    let missing_features =
        metadata::collect_missing_features(messages.iter().map(String::as_str));
    RequestFailure {
        message: format!(
            "all bases failed for {}: {}",
            path.split('?').next().unwrap_or(path),
            summaries.join("; ")
        ),
        missing_features,
    }
}

/// Error messages from a response body: `errors[].message` when the
/// body parses as JSON, otherwise the raw text.
fn error_messages(body: &str) -> Vec<String> {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        if let Some(errors) = value.get("errors").and_then(Value::as_array) {
            return errors
                .iter()
                .filter_map(|e| e.get("message").and_then(Value::as_str))
                .map(str::to_string)
                .collect();
        }
    }
    vec![body.to_string()]
}

fn urlencode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

/// Scraper for the structured web API.
pub struct GraphqlScraper {
    client: reqwest::Client,
    auth: AuthState,
    /// First-pair form of the session cookies other than the rotating
    /// auth pair; appended to every request's `Cookie` header.
    cookie_rest: String,
}

impl GraphqlScraper {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(DESKTOP_USER_AGENT)
            .build()
            .map_err(|e| Error::Internal(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            auth: AuthState::from_session(&Session::anonymous()),
            cookie_rest: String::new(),
        })
    }

    /// One GET against one base. Succeeds on the first 2xx response
    /// carrying parseable `application/json`.
    async fn get_json(&self, url: &str) -> std::result::Result<Value, AttemptFailure> {
        let origin = if url.contains("twitter.com") {
            "https://twitter.com"
        } else {
            "https://x.com"
        };

        let mut request = self
            .client
            .get(url)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.auth.current_bearer()))
            .header("x-twitter-active-user", "yes")
            .header("x-twitter-client-language", "en")
            .header(header::REFERER, format!("{}/", origin))
            .header(header::ORIGIN, origin);

        if let Some(triple) = self.auth.current_triple() {
            request = request
                .header("x-csrf-token", &triple.ct0)
                .header("x-twitter-auth-type", "OAuth2Session");
            let mut cookie = format!("auth_token={}; ct0={}", triple.auth_token, triple.ct0);
            if !self.cookie_rest.is_empty() {
                cookie.push_str("; ");
                cookie.push_str(&self.cookie_rest);
            }
            request = request.header(header::COOKIE, cookie);
            if let Some(guest) = &triple.guest_token {
                request = request.header("x-guest-token", guest);
            }
        }

        let response = request.send().await.map_err(|e| AttemptFailure {
            url: url.to_string(),
            status: None,
            body: format!("network error: {}", e),
        })?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let body = response.text().await.map_err(|e| AttemptFailure {
            url: url.to_string(),
            status: Some(status.as_u16()),
            body: format!("network error reading body: {}", e),
        })?;

        if status.is_success() && content_type.contains("application/json") {
            return serde_json::from_str(&body).map_err(|e| AttemptFailure {
                url: url.to_string(),
                status: Some(status.as_u16()),
                body: format!("unparseable JSON: {}", e),
            });
        }

        Err(AttemptFailure {
            url: url.to_string(),
            status: Some(status.as_u16()),
            body,
        })
    }

    /// Try a path against every base, in order.
    async fn try_bases(&self, path: &str) -> std::result::Result<Value, Vec<AttemptFailure>> {
        let mut failures = Vec::new();
        for base in URL_BASES {
            let url = format!("{}{}", base, path);
            match self.get_json(&url).await {
                Ok(value) => {
                    tracing::debug!(%url, "request succeeded");
                    return Ok(value);
                }
                Err(failure) => {
                    tracing::debug!(%url, status = ?failure.status, "attempt failed");
                    failures.push(failure);
                }
            }
        }
        Err(failures)
    }

    /// GET a path with the full recovery ladder: rotate auth triples,
    /// refresh `ct0`, rotate bearer candidates, then (at most once per
    /// request) rediscover metadata from the client bundles.
    async fn authed_get(&mut self, path: &str) -> std::result::Result<Value, RequestFailure> {
        let mut refreshed_ct0 = false;
        let mut refreshed_metadata = false;

        loop {
            let failures = match self.try_bases(path).await {
                Ok(value) => return Ok(value),
                Err(failures) => failures,
            };

            if failures.iter().any(AttemptFailure::is_auth_shaped) {
                if self.auth.advance_triple() {
                    continue;
                }
                if !refreshed_ct0 {
                    refreshed_ct0 = true;
                    if self.refresh_ct0().await {
                        continue;
                    }
                }
                if self.auth.advance_bearer() {
                    continue;
                }
                if !refreshed_metadata {
                    refreshed_metadata = true;
                    if self.refresh_metadata().await {
                        continue;
                    }
                }
            }

            return Err(aggregate_failures(path, &failures));
        }
    }

    /// Fetch the home page with just the current `auth_token` and
    /// harvest a fresh `ct0` from `Set-Cookie`.
    async fn refresh_ct0(&mut self) -> bool {
        let Some(triple) = self.auth.current_triple().cloned() else {
            return false;
        };

        for home in HOME_PAGES {
            let response = self
                .client
                .get(home)
                .header(header::COOKIE, format!("auth_token={}", triple.auth_token))
                .send()
                .await;
            let Ok(response) = response else { continue };

            for set_cookie in response.headers().get_all(header::SET_COOKIE) {
                let Ok(raw) = set_cookie.to_str() else { continue };
                let Some(rest) = raw.trim_start().strip_prefix("ct0=") else {
                    continue;
                };
                let value = rest.split(';').next().unwrap_or("").trim();
                if !value.is_empty() {
                    tracing::debug!("refreshed ct0 from {}", home);
                    self.auth.set_current_ct0(value);
                    return true;
                }
            }
        }
        false
    }

    /// Metadata refresh pass: pull `main*.js` bundle URLs off the home
    /// page, scan each bundle for bearer tokens and operation ids, and
    /// fold whatever was found into the rotation state.
    async fn refresh_metadata(&mut self) -> bool {
        for home in HOME_PAGES {
            let Ok(response) = self.client.get(home).send().await else {
                continue;
            };
            let Ok(html) = response.text().await else { continue };

            let bundle_urls = metadata::extract_bundle_urls(&html);
            if bundle_urls.is_empty() {
                continue;
            }

            let mut found = DiscoveredMetadata::default();
            for bundle_url in &bundle_urls {
                let Ok(bundle) = self.client.get(bundle_url).send().await else {
                    continue;
                };
                if let Ok(js) = bundle.text().await {
                    metadata::scan_bundle(&js, &mut found);
                }
            }

            if found.is_empty() {
                continue;
            }
            tracing::info!(
                bearers = found.bearer_tokens.len(),
                bundles = bundle_urls.len(),
                "discovered fresh client metadata"
            );
            self.auth.absorb_metadata(found);
            return true;
        }
        false
    }

    fn graphql_path(&self, query_id: &str, operation: &str, variables: &Value) -> String {
        let variables = variables.to_string();
        let features = self.auth.features_json().to_string();
        format!(
            "/graphql/{}/{}?variables={}&features={}",
            query_id,
            operation,
            urlencode(&variables),
            urlencode(&features)
        )
    }

    /// One GraphQL call with the feature-flag adaptation loop: each
    /// `features cannot be null` complaint disables the named flags
    /// and retries, at most four iterations.
    async fn graphql_request(
        &mut self,
        query_id: &str,
        operation: &str,
        variables: &Value,
    ) -> Result<Value> {
        for _ in 0..MAX_FEATURE_ITERATIONS {
            let path = self.graphql_path(query_id, operation, variables);
            match self.authed_get(&path).await {
                Ok(value) => {
                    let messages: Vec<String> = value
                        .get("errors")
                        .and_then(Value::as_array)
                        .map(|errors| {
                            errors
                                .iter()
                                .filter_map(|e| e.get("message").and_then(Value::as_str))
                                .map(str::to_string)
                                .collect()
                        })
                        .unwrap_or_default();
                    let missing =
                        metadata::collect_missing_features(messages.iter().map(String::as_str));
                    if !missing.is_empty() {
                        tracing::debug!(?missing, operation, "disabling rejected feature flags");
                        self.auth.disable_features(&missing);
                        continue;
                    }
                    return Ok(value);
                }
                Err(failure) => {
                    if !failure.missing_features.is_empty() {
                        tracing::debug!(
                            missing = ?failure.missing_features,
                            operation,
                            "disabling rejected feature flags"
                        );
                        self.auth.disable_features(&failure.missing_features);
                        continue;
                    }
                    return Err(Error::Scrape(failure.message));
                }
            }
        }
        Err(Error::Scrape(format!(
            "feature negotiation did not converge for {}",
            operation
        )))
    }

    /// Resolve a handle to its numeric user id, trying each known
    /// query id until one response carries `rest_id`.
    async fn resolve_user_id(&mut self, username: &str) -> Result<String> {
        let query_ids = self.auth.op_ids.user_by_screen_name.clone();
        let variables = json!({
            "screen_name": username,
            "withSafetyModeUserFields": true,
        });

        let mut last_error = None;
        for query_id in query_ids {
            match self
                .graphql_request(&query_id, "UserByScreenName", &variables)
                .await
            {
                Ok(value) => {
                    if let Some(rest_id) = value
                        .pointer("/data/user/result/rest_id")
                        .and_then(Value::as_str)
                    {
                        tracing::debug!(username, rest_id, "resolved user id");
                        return Ok(rest_id.to_string());
                    }
                    last_error = Some(Error::Scrape(format!(
                        "UserByScreenName returned no rest_id for {}",
                        username
                    )));
                }
                Err(e) => last_error = Some(e),
            }
        }
        Err(last_error
            .unwrap_or_else(|| Error::Scrape(format!("could not resolve handle {}", username))))
    }

    /// Paginate one timeline operation until the cursor stalls, the
    /// requested depth is reached, or the round guard trips.
    async fn paginate_operation(
        &mut self,
        query_id: &str,
        operation: &str,
        user_id: &str,
        username: &str,
        max_tweets: usize,
    ) -> Result<Vec<MediaItem>> {
        let mut items = Vec::new();
        let mut tweets_seen = 0usize;
        let mut cursor: Option<String> = None;

        for _ in 0..MAX_PAGINATION_ROUNDS {
            let remaining = max_tweets.saturating_sub(tweets_seen);
            if remaining == 0 {
                break;
            }

            let mut variables = json!({
                "userId": user_id,
                "count": remaining.min(GRAPHQL_PAGE_SIZE),
                "includePromotedContent": false,
                "withClientEventToken": false,
                "withBirdwatchNotes": false,
                "withVoice": true,
                "withV2Timeline": true,
            });
            if let Some(c) = &cursor {
                variables["cursor"] = json!(c);
            }

            let value = self.graphql_request(query_id, operation, &variables).await?;
            let page = parse::parse_timeline_page(&value);

            tweets_seen += page.tweets.len();
            for tweet in &page.tweets {
                items.extend(parse::media_from_tweet_result(tweet, user_id, username));
            }

            match page.bottom_cursor {
                Some(next) if Some(&next) != cursor.as_ref() => cursor = Some(next),
                _ => break,
            }
        }

        Ok(items)
    }

    /// Try the timeline operations in order: every known `UserMedia`
    /// id, then every known `UserTweets` id.
    async fn fetch_graphql_timeline(
        &mut self,
        user_id: &str,
        username: &str,
        options: &FetchOptions,
    ) -> Result<Vec<MediaItem>> {
        let mut operations: Vec<(String, &'static str)> = Vec::new();
        for id in &self.auth.op_ids.user_media {
            operations.push((id.clone(), "UserMedia"));
        }
        for id in &self.auth.op_ids.user_tweets {
            operations.push((id.clone(), "UserTweets"));
        }

        let mut last_error = None;
        for (query_id, operation) in operations {
            match self
                .paginate_operation(&query_id, operation, user_id, username, options.max_tweets)
                .await
            {
                Ok(items) => return Ok(items),
                Err(e) => {
                    tracing::debug!(operation, %e, "timeline operation failed");
                    last_error = Some(e);
                }
            }
        }
        Err(last_error
            .unwrap_or_else(|| Error::Scrape(format!("no timeline operation for {}", username))))
    }

    /// Legacy `statuses/user_timeline.json` fallback, paginated by
    /// `max_id`.
    async fn fetch_legacy_timeline(
        &mut self,
        username: &str,
        user_id: &str,
        options: &FetchOptions,
    ) -> Result<Vec<MediaItem>> {
        let mut items = Vec::new();
        let mut tweets_seen = 0usize;
        let mut max_id: Option<u128> = None;

        for _ in 0..MAX_PAGINATION_ROUNDS {
            let remaining = options.max_tweets.saturating_sub(tweets_seen);
            if remaining == 0 {
                break;
            }

            let mut path = format!(
                "/1.1/statuses/user_timeline.json?screen_name={}&count={}\
                 &include_rts=false&exclude_replies=true&tweet_mode=extended\
                 &include_ext_alt_text=true",
                urlencode(username),
                remaining.min(LEGACY_PAGE_SIZE)
            );
            if let Some(id) = max_id {
                path.push_str(&format!("&max_id={}", id));
            }

            let value = self
                .authed_get(&path)
                .await
                .map_err(|failure| Error::Scrape(failure.message))?;
            let Some(tweets) = value.as_array() else {
                return Err(Error::Scrape(
                    "legacy timeline response was not an array".into(),
                ));
            };
            if tweets.is_empty() {
                break;
            }

            tweets_seen += tweets.len();
            for tweet in tweets {
                items.extend(parse::media_from_legacy_tweet(tweet, user_id, username));
            }

            let last_id = tweets
                .last()
                .and_then(|t| t.get("id_str"))
                .and_then(Value::as_str)
                .and_then(|s| s.parse::<u128>().ok());
            match last_id {
                Some(id) if id > 0 => max_id = Some(id - 1),
                _ => break,
            }
        }

        Ok(items)
    }
}

#[async_trait]
impl MediaScraper for GraphqlScraper {
    async fn initialize(&mut self, session: &Session) -> Result<()> {
        self.auth = AuthState::from_session(session);
        self.cookie_rest =
            cookies::cookie_header_excluding(&session.cookies, &["auth_token", "ct0"]);
        Ok(())
    }

    async fn fetch_user_media(
        &mut self,
        username: &str,
        options: &FetchOptions,
    ) -> Result<Vec<MediaItem>> {
        let graphql_result = match self.resolve_user_id(username).await {
            Ok(user_id) => {
                self.fetch_graphql_timeline(&user_id, username, options)
                    .await
            }
            Err(e) => Err(e),
        };

        let items = match graphql_result {
            Ok(items) => items,
            Err(graphql_error) => {
                tracing::warn!(username, %graphql_error, "GraphQL paths failed, using legacy timeline");
                self.fetch_legacy_timeline(username, "", options)
                    .await
                    .map_err(|legacy_error| {
                        Error::Scrape(format!(
                            "graphql: {}; legacy: {}",
                            graphql_error, legacy_error
                        ))
                    })?
            }
        };

        Ok(finalize_inventory(items, options))
    }

    async fn close(&mut self) {
        // Nothing owned beyond the HTTP client.
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_shaped_failures() {
        let unauthorized = AttemptFailure {
            url: "u".into(),
            status: Some(401),
            body: r#"{"errors":[{"code":32,"message":"Could not authenticate you"}]}"#.into(),
        };
        assert!(unauthorized.is_auth_shaped());

        let stale_op = AttemptFailure {
            url: "u".into(),
            status: Some(404),
            body: "Sorry, that page does not exist".into(),
        };
        assert!(stale_op.is_auth_shaped());

        let rate_limited = AttemptFailure {
            url: "u".into(),
            status: Some(429),
            body: "slow down".into(),
        };
        assert!(!rate_limited.is_auth_shaped());
    }

    #[test]
    fn test_aggregate_failures_lists_all_bases() {
        let failures: Vec<AttemptFailure> = URL_BASES
            .iter()
            .map(|base| AttemptFailure {
                url: format!("{}/graphql/x/UserMedia", base),
                status: Some(500),
                body: "oops".into(),
            })
            .collect();
        let failure = aggregate_failures("/graphql/x/UserMedia?variables=%7B%7D", &failures);
        for base in URL_BASES {
            assert!(failure.message.contains(base), "missing {}", base);
        }
        // query string stripped from the header line
        assert!(!failure.message.starts_with("all bases failed for /graphql/x/UserMedia?"));
    }

    #[test]
    fn test_aggregate_failures_extracts_feature_names() {
        let failures = vec![AttemptFailure {
            url: "u".into(),
            status: Some(400),
            body: r#"{"errors":[{"message":"The following features cannot be null: flag_a, flag_b"}]}"#
                .into(),
        }];
        let failure = aggregate_failures("/graphql/x/UserMedia", &failures);
        assert_eq!(failure.missing_features, vec!["flag_a", "flag_b"]);
    }

    #[test]
    fn test_graphql_path_is_percent_encoded() {
        let scraper = GraphqlScraper::new().unwrap();
        let path = scraper.graphql_path("qid", "UserMedia", &json!({"userId": "1"}));
        assert!(path.starts_with("/graphql/qid/UserMedia?variables="));
        assert!(!path.contains('{'));
        assert!(path.contains("features="));
    }
}
