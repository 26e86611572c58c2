//! Interpreting timeline payloads into media items.
//!
//! The GraphQL timeline shape is undocumented and drifts between
//! deployments, so payloads are walked as loose JSON instead of being
//! deserialized into fixed structs.

use serde_json::Value;
use url::Url;

use crate::media::{MediaItem, MediaKind};

/// Tweets and the bottom cursor pulled out of one timeline response.
#[derive(Debug, Default)]
pub struct TimelinePage {
    pub tweets: Vec<Value>,
    pub bottom_cursor: Option<String>,
}

/// Walk a `timeline_v2`-shaped response: every instruction's entries
/// are interpreted; `cursor-bottom-*` entries contribute the next
/// cursor, tweet items contribute their result objects.
pub fn parse_timeline_page(root: &Value) -> TimelinePage {
    let mut page = TimelinePage::default();

    let Some(instructions) = find_instructions(root, 0) else {
        return page;
    };

    for instruction in instructions {
        let Some(entries) = instruction.get("entries").and_then(Value::as_array) else {
            continue;
        };
        for entry in entries {
            let entry_id = entry.get("entryId").and_then(Value::as_str).unwrap_or("");
            if entry_id.starts_with("cursor-bottom-") {
                if let Some(cursor) = cursor_value(entry) {
                    page.bottom_cursor = Some(cursor);
                }
                continue;
            }
            collect_tweet_results(entry, &mut page.tweets);
        }
    }

    page
}

/// Locate the first `instructions` array anywhere under the payload.
fn find_instructions(value: &Value, depth: usize) -> Option<&Vec<Value>> {
    if depth > 8 {
        return None;
    }
    match value {
        Value::Object(map) => {
            if let Some(instructions) = map.get("instructions").and_then(Value::as_array) {
                return Some(instructions);
            }
            map.values().find_map(|v| find_instructions(v, depth + 1))
        }
        Value::Array(items) => items.iter().find_map(|v| find_instructions(v, depth + 1)),
        _ => None,
    }
}

fn cursor_value(entry: &Value) -> Option<String> {
    for pointer in [
        "/content/value",
        "/content/itemContent/value",
        "/content/operation/cursor/value",
    ] {
        if let Some(value) = entry.pointer(pointer).and_then(Value::as_str) {
            return Some(value.to_string());
        }
    }
    None
}

/// Collect tweet result objects from a timeline entry: a plain item
/// or a module of items (the media grid uses the latter).
fn collect_tweet_results(entry: &Value, out: &mut Vec<Value>) {
    if let Some(result) = tweet_result(entry.pointer("/content/itemContent")) {
        out.push(result);
    }
    if let Some(items) = entry.pointer("/content/items").and_then(Value::as_array) {
        for item in items {
            if let Some(result) = tweet_result(item.pointer("/item/itemContent")) {
                out.push(result);
            }
        }
    }
}

fn tweet_result(item_content: Option<&Value>) -> Option<Value> {
    let result = item_content?.get("tweet_results")?.get("result")?;
    Some(result.clone())
}

/// Map one GraphQL tweet result to media items.
///
/// Drops retweets, tweets by a different author than `user_id`, and
/// tweets without media.
pub fn media_from_tweet_result(result: &Value, user_id: &str, username: &str) -> Vec<MediaItem> {
    // Visibility wrappers nest the real tweet one level deeper.
    let result = result.get("tweet").unwrap_or(result);
    if result.get("retweeted_status_result").is_some() {
        return Vec::new();
    }
    let Some(legacy) = result.get("legacy") else {
        return Vec::new();
    };
    media_from_legacy_tweet(legacy, user_id, username)
}

/// Map a legacy-shaped tweet object (shared by the GraphQL `legacy`
/// node and the legacy REST timeline) to media items.
pub fn media_from_legacy_tweet(legacy: &Value, user_id: &str, username: &str) -> Vec<MediaItem> {
    if legacy.get("retweeted_status_result").is_some()
        || legacy.get("retweeted_status").is_some()
    {
        return Vec::new();
    }

    if !user_id.is_empty() {
        if let Some(author) = legacy.get("user_id_str").and_then(Value::as_str) {
            if author != user_id {
                return Vec::new();
            }
        }
    }

    let tweet_id = legacy
        .get("id_str")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    if tweet_id.is_empty() {
        return Vec::new();
    }

    let media = legacy
        .pointer("/extended_entities/media")
        .or_else(|| legacy.pointer("/entities/media"))
        .and_then(Value::as_array);
    let Some(media) = media else {
        return Vec::new();
    };

    let created_at = legacy
        .get("created_at")
        .and_then(Value::as_str)
        .map(str::to_string);

    let mut items = Vec::new();
    for (index, entry) in media.iter().enumerate() {
        let media_id = entry
            .get("id_str")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| index.to_string());

        let Some((kind, url)) = resolve_media_url(entry) else {
            continue;
        };

        items.push(MediaItem {
            id: format!("{}_{}", tweet_id, media_id),
            tweet_id: tweet_id.clone(),
            username: username.to_string(),
            kind,
            url,
            created_at: created_at.clone(),
            filename_hint: None,
        });
    }
    items
}

/// Resolve one media entry to `(kind, url)`.
///
/// Photos use `media_url_https` forced to the original size; videos
/// and animated gifs pick the highest-bitrate variant, preferring
/// MP4 content types.
fn resolve_media_url(entry: &Value) -> Option<(MediaKind, String)> {
    let media_type = entry.get("type").and_then(Value::as_str)?;
    match media_type {
        "photo" => {
            let base = entry.get("media_url_https").and_then(Value::as_str)?;
            Some((MediaKind::Image, original_size_url(base)))
        }
        "video" | "animated_gif" => {
            let url = best_video_variant(entry.get("video_info")?)?;
            let kind = if media_type == "animated_gif" || url.contains("/tweet_video/") {
                MediaKind::Gif
            } else {
                MediaKind::Video
            };
            Some((kind, url))
        }
        _ => None,
    }
}

/// Force `name=orig` on a photo URL.
fn original_size_url(base: &str) -> String {
    match Url::parse(base) {
        Ok(mut url) => {
            url.set_query(Some("name=orig"));
            url.to_string()
        }
        Err(_) => format!("{}?name=orig", base),
    }
}

fn best_video_variant(video_info: &Value) -> Option<String> {
    let variants = video_info.get("variants").and_then(Value::as_array)?;
    variants
        .iter()
        .filter_map(|variant| {
            let url = variant.get("url").and_then(Value::as_str)?;
            let bitrate = variant.get("bitrate").and_then(Value::as_i64).unwrap_or(-1);
            let is_mp4 = variant
                .get("content_type")
                .and_then(Value::as_str)
                .map(|ct| ct.contains("mp4"))
                .unwrap_or(false);
            Some((is_mp4, bitrate, url))
        })
        .max_by_key(|(is_mp4, bitrate, _)| (*is_mp4, *bitrate))
        .map(|(_, _, url)| url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn photo_entry(id: &str, url: &str) -> Value {
        json!({"type": "photo", "id_str": id, "media_url_https": url})
    }

    fn legacy_tweet(id: &str, author: &str, media: Vec<Value>) -> Value {
        json!({
            "id_str": id,
            "user_id_str": author,
            "created_at": "Mon Apr 01 10:00:00 +0000 2024",
            "extended_entities": {"media": media},
        })
    }

    #[test]
    fn test_photo_mapping_forces_orig() {
        let tweet = legacy_tweet(
            "t1",
            "u1",
            vec![photo_entry("m1", "https://pbs.twimg.com/media/a.jpg")],
        );
        let items = media_from_legacy_tweet(&tweet, "u1", "alice");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].kind, MediaKind::Image);
        assert_eq!(items[0].url, "https://pbs.twimg.com/media/a.jpg?name=orig");
        assert_eq!(items[0].id, "t1_m1");
        assert!(items[0].created_at.is_some());
    }

    #[test]
    fn test_retweet_dropped() {
        let mut tweet = legacy_tweet("t1", "u1", vec![photo_entry("m1", "https://e.com/a.jpg")]);
        tweet["retweeted_status"] = json!({"id_str": "other"});
        assert!(media_from_legacy_tweet(&tweet, "u1", "alice").is_empty());
    }

    #[test]
    fn test_foreign_author_dropped() {
        let tweet = legacy_tweet("t1", "u2", vec![photo_entry("m1", "https://e.com/a.jpg")]);
        assert!(media_from_legacy_tweet(&tweet, "u1", "alice").is_empty());
        // without a resolved user id the check is skipped
        assert_eq!(media_from_legacy_tweet(&tweet, "", "alice").len(), 1);
    }

    #[test]
    fn test_video_picks_highest_bitrate_mp4() {
        let tweet = legacy_tweet(
            "t2",
            "u1",
            vec![json!({
                "type": "video",
                "id_str": "m9",
                "video_info": {"variants": [
                    {"url": "https://video.twimg.com/playlist.m3u8", "content_type": "application/x-mpegURL"},
                    {"url": "https://video.twimg.com/lo.mp4", "bitrate": 256000, "content_type": "video/mp4"},
                    {"url": "https://video.twimg.com/hi.mp4", "bitrate": 2048000, "content_type": "video/mp4"},
                ]},
            })],
        );
        let items = media_from_legacy_tweet(&tweet, "u1", "alice");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].kind, MediaKind::Video);
        assert_eq!(items[0].url, "https://video.twimg.com/hi.mp4");
    }

    #[test]
    fn test_animated_gif_and_tweet_video_classified_as_gif() {
        let tweet = legacy_tweet(
            "t3",
            "u1",
            vec![
                json!({
                    "type": "animated_gif",
                    "id_str": "g1",
                    "video_info": {"variants": [
                        {"url": "https://video.twimg.com/tweet_video/x.mp4", "bitrate": 0, "content_type": "video/mp4"},
                    ]},
                }),
                json!({
                    "type": "video",
                    "id_str": "g2",
                    "video_info": {"variants": [
                        {"url": "https://video.twimg.com/tweet_video/y.mp4", "bitrate": 0, "content_type": "video/mp4"},
                    ]},
                }),
            ],
        );
        let items = media_from_legacy_tweet(&tweet, "u1", "alice");
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|i| i.kind == MediaKind::Gif));
    }

    #[test]
    fn test_media_id_falls_back_to_index() {
        let tweet = legacy_tweet(
            "t4",
            "u1",
            vec![json!({"type": "photo", "media_url_https": "https://e.com/a.jpg"})],
        );
        let items = media_from_legacy_tweet(&tweet, "u1", "alice");
        assert_eq!(items[0].id, "t4_0");
    }

    #[test]
    fn test_parse_timeline_page() {
        let response = json!({
            "data": {"user": {"result": {"timeline_v2": {"timeline": {"instructions": [
                {"type": "TimelineAddEntries", "entries": [
                    {"entryId": "tweet-1", "content": {"itemContent": {"itemType": "TimelineTweet",
                        "tweet_results": {"result": {"legacy": {"id_str": "1"}}}}}},
                    {"entryId": "profile-grid-0", "content": {"items": [
                        {"item": {"itemContent": {"tweet_results": {"result": {"legacy": {"id_str": "2"}}}}}},
                    ]}},
                    {"entryId": "cursor-top-xyz", "content": {"value": "TOP"}},
                    {"entryId": "cursor-bottom-abc", "content": {"value": "NEXT_CURSOR"}},
                ]}
            ]}}}}}
        });
        let page = parse_timeline_page(&response);
        assert_eq!(page.tweets.len(), 2);
        assert_eq!(page.bottom_cursor.as_deref(), Some("NEXT_CURSOR"));
    }

    #[test]
    fn test_parse_timeline_page_empty() {
        let page = parse_timeline_page(&json!({"data": {}}));
        assert!(page.tweets.is_empty());
        assert!(page.bottom_cursor.is_none());
    }

    #[test]
    fn test_wrapped_tweet_result_unwrapped() {
        let result = json!({
            "tweet": {"legacy": legacy_tweet("t5", "u1", vec![photo_entry("m1", "https://e.com/a.jpg")])}
        });
        // legacy_tweet already is the legacy node here
        let items = media_from_tweet_result(&result, "u1", "alice");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].tweet_id, "t5");
    }
}
