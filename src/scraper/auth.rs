//! Credential material extracted from a session, with rotation state.
//!
//! The structured API is tried with a sequence of auth triples
//! (`auth_token`, `ct0`, optional guest token) and a sequence of
//! bearer-token candidates. Rotation happens in place on
//! [`AuthState`]; retries re-read the current values instead of
//! capturing them.

use std::collections::{BTreeMap, HashSet};

use serde_json::Value;

use crate::session::{cookies, Session};

use super::metadata::DiscoveredMetadata;

/// Built-in bearer token of the platform's web client.
const DEFAULT_BEARER_TOKEN: &str =
    "AAAAAAAAAAAAAAAAAAAAANRILgAAAAAAnNwIzUejRCOuH5E6I8xnZz4puTs%3D1Zv7ttfk8LF81IUq16cHjhLTvJu4FA33AGWWjCpTnA";

/// Environment override for the default bearer token.
pub const BEARER_TOKEN_ENV: &str = "TWMD_WEB_BEARER_TOKEN";

fn default_bearer() -> String {
    std::env::var(BEARER_TOKEN_ENV).unwrap_or_else(|_| DEFAULT_BEARER_TOKEN.to_string())
}

/// One credential combination presented to the structured API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthTriple {
    pub auth_token: String,
    pub ct0: String,
    pub guest_token: Option<String>,
}

/// Known query ids per GraphQL operation name, in trial order.
#[derive(Debug, Clone)]
pub struct OperationIds {
    pub user_by_screen_name: Vec<String>,
    pub user_media: Vec<String>,
    pub user_tweets: Vec<String>,
}

impl Default for OperationIds {
    fn default() -> Self {
        Self {
            user_by_screen_name: vec![
                "G3KGOASz96M-Qu0nwmGXNg".to_string(),
                "qW5u-DAuXpMEG0zA1F7UGQ".to_string(),
            ],
            user_media: vec![
                "YqiE3JL1KNgf9nSljYdxaA".to_string(),
                "dexO_2tohK86JDudXXG3Yw".to_string(),
            ],
            user_tweets: vec![
                "E3opETHurmVJflFsUBVuUQ".to_string(),
                "V7H0Ap3_Hh2FyS75OCDO3Q".to_string(),
            ],
        }
    }
}

fn merge_ids(into: &mut Vec<String>, found: &[String]) {
    // Discovered ids go first so stale defaults are tried last.
    let mut merged: Vec<String> = Vec::with_capacity(into.len() + found.len());
    for id in found.iter().chain(into.iter()) {
        if !merged.contains(id) {
            merged.push(id.clone());
        }
    }
    *into = merged;
}

/// Default GraphQL feature flags sent with every request. Flags the
/// server rejects get disabled at runtime; flags it demands get added
/// as `false`.
fn default_features() -> BTreeMap<String, bool> {
    let enabled = [
        "responsive_web_graphql_exclude_directive_enabled",
        "responsive_web_graphql_timeline_navigation_enabled",
        "creator_subscriptions_tweet_preview_api_enabled",
        "communities_web_enable_tweet_community_results_fetch",
        "c9s_tweet_anatomy_moderator_badge_enabled",
        "tweetypie_unmention_optimization_enabled",
        "responsive_web_edit_tweet_api_enabled",
        "graphql_is_translatable_rweb_tweet_is_translatable_enabled",
        "view_counts_everywhere_api_enabled",
        "longform_notetweets_consumption_enabled",
        "responsive_web_twitter_article_tweet_consumption_enabled",
        "freedom_of_speech_not_reach_fetch_enabled",
        "standardized_nudges_misinfo",
        "tweet_with_visibility_results_prefer_gql_limited_actions_policy_enabled",
        "rweb_video_timestamps_enabled",
        "longform_notetweets_rich_text_read_enabled",
        "longform_notetweets_inline_media_enabled",
        "rweb_tipjar_consumption_enabled",
        "articles_preview_enabled",
        "hidden_profile_subscriptions_enabled",
        "highlights_tweets_tab_ui_enabled",
        "responsive_web_twitter_article_notes_tab_enabled",
        "subscriptions_verification_info_is_identity_verified_enabled",
        "subscriptions_verification_info_verified_since_enabled",
    ];
    let disabled = [
        "verified_phone_label_enabled",
        "responsive_web_graphql_skip_user_profile_image_extensions_enabled",
        "tweet_awards_web_tipping_enabled",
        "responsive_web_enhance_cards_enabled",
        "creator_subscriptions_quote_tweet_preview_enabled",
        "premium_content_api_read_enabled",
        "profile_label_improvements_pcf_label_in_post_enabled",
    ];

    let mut features = BTreeMap::new();
    for name in enabled {
        features.insert(name.to_string(), true);
    }
    for name in disabled {
        features.insert(name.to_string(), false);
    }
    features
}

/// Enumerate auth triples from a session's cookies.
///
/// Domain-aligned `(auth_token, ct0)` pairs come first, then the full
/// cross-product of all distinct values, de-duplicated by
/// `auth_token|ct0`.
pub fn extract_auth_triples(session: &Session) -> Vec<AuthTriple> {
    let mut auth_by_domain: BTreeMap<String, String> = BTreeMap::new();
    let mut ct0_by_domain: BTreeMap<String, String> = BTreeMap::new();
    let mut all_auth: Vec<String> = Vec::new();
    let mut all_ct0: Vec<String> = Vec::new();

    for cookie in &session.cookies {
        let name = cookies::cookie_name(cookie).to_lowercase();
        let value = cookies::cookie_value(cookie).to_string();
        if value.is_empty() {
            continue;
        }
        let domain = cookies::cookie_domain(cookie).unwrap_or_default();
        match name.as_str() {
            "auth_token" => {
                auth_by_domain.entry(domain).or_insert_with(|| value.clone());
                if !all_auth.contains(&value) {
                    all_auth.push(value);
                }
            }
            "ct0" => {
                ct0_by_domain.entry(domain).or_insert_with(|| value.clone());
                if !all_ct0.contains(&value) {
                    all_ct0.push(value);
                }
            }
            _ => {}
        }
    }

    let guest_token = cookies::find_value(&session.cookies, "gt")
        .or_else(|| cookies::find_value(&session.cookies, "guest_id"))
        .map(str::to_string);

    let mut triples = Vec::new();
    let mut seen = HashSet::new();
    let mut push = |auth_token: &str, ct0: &str| {
        if seen.insert(format!("{}|{}", auth_token, ct0)) {
            triples.push(AuthTriple {
                auth_token: auth_token.to_string(),
                ct0: ct0.to_string(),
                guest_token: guest_token.clone(),
            });
        }
    };

    for (domain, auth_token) in &auth_by_domain {
        if let Some(ct0) = ct0_by_domain.get(domain) {
            push(auth_token, ct0);
        }
    }
    for auth_token in &all_auth {
        for ct0 in &all_ct0 {
            push(auth_token, ct0);
        }
    }

    triples
}

/// Rotating credential and metadata state owned by one scraper
/// instance.
#[derive(Debug)]
pub struct AuthState {
    triples: Vec<AuthTriple>,
    triple_idx: usize,
    bearers: Vec<String>,
    bearer_idx: usize,
    pub op_ids: OperationIds,
    features: BTreeMap<String, bool>,
}

impl AuthState {
    pub fn from_session(session: &Session) -> Self {
        Self {
            triples: extract_auth_triples(session),
            triple_idx: 0,
            bearers: vec![default_bearer()],
            bearer_idx: 0,
            op_ids: OperationIds::default(),
            features: default_features(),
        }
    }

    pub fn current_triple(&self) -> Option<&AuthTriple> {
        self.triples.get(self.triple_idx)
    }

    /// Move to the next triple; `false` once the list is exhausted.
    pub fn advance_triple(&mut self) -> bool {
        if self.triple_idx + 1 < self.triples.len() {
            self.triple_idx += 1;
            tracing::debug!(index = self.triple_idx, "rotated to next auth triple");
            true
        } else {
            false
        }
    }

    /// Replace the current triple's `ct0` with a freshly harvested one.
    pub fn set_current_ct0(&mut self, ct0: &str) {
        if let Some(triple) = self.triples.get_mut(self.triple_idx) {
            triple.ct0 = ct0.to_string();
        }
    }

    pub fn current_bearer(&self) -> &str {
        self.bearers
            .get(self.bearer_idx)
            .map(String::as_str)
            .unwrap_or(DEFAULT_BEARER_TOKEN)
    }

    /// Move to the next bearer candidate; `false` once exhausted.
    pub fn advance_bearer(&mut self) -> bool {
        if self.bearer_idx + 1 < self.bearers.len() {
            self.bearer_idx += 1;
            tracing::debug!(index = self.bearer_idx, "rotated to next bearer token");
            true
        } else {
            false
        }
    }

    /// Fold discovered metadata into the rotation state. Discovered
    /// bearer tokens replace the candidate list; discovered operation
    /// ids merge ahead of the known ones.
    pub fn absorb_metadata(&mut self, found: DiscoveredMetadata) {
        if !found.bearer_tokens.is_empty() {
            self.bearers = found.bearer_tokens;
            self.bearer_idx = 0;
        }
        merge_ids(&mut self.op_ids.user_by_screen_name, &found.user_by_screen_name);
        merge_ids(&mut self.op_ids.user_media, &found.user_media);
        merge_ids(&mut self.op_ids.user_tweets, &found.user_tweets);
    }

    /// The current feature-flag object for GraphQL requests.
    pub fn features_json(&self) -> Value {
        Value::Object(
            self.features
                .iter()
                .map(|(k, v)| (k.clone(), Value::Bool(*v)))
                .collect(),
        )
    }

    /// Force the named flags to `false` after the server reported them
    /// missing. New names persist for later calls on this instance.
    pub fn disable_features(&mut self, names: &[String]) {
        for name in names {
            self.features.insert(name.clone(), false);
        }
    }

    #[cfg(test)]
    pub fn triple_count(&self) -> usize {
        self.triples.len()
    }
}
