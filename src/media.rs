//! Media inventory model.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Kind of media content, where `gif` is the platform's short
/// animated-clip format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
    Gif,
}

impl MediaKind {
    /// All kinds, in download-flag order.
    pub fn all() -> [MediaKind; 3] {
        [MediaKind::Image, MediaKind::Video, MediaKind::Gif]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
            MediaKind::Gif => "gif",
        }
    }

    /// Extension used when the URL does not reveal one.
    pub fn default_extension(&self) -> &'static str {
        match self {
            MediaKind::Image => "jpg",
            MediaKind::Video => "mp4",
            MediaKind::Gif => "gif",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "image" => Ok(MediaKind::Image),
            "video" => Ok(MediaKind::Video),
            "gif" => Ok(MediaKind::Gif),
            other => Err(format!("unknown media kind: {}", other)),
        }
    }
}

/// A single downloadable media item discovered on a user's timeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaItem {
    /// `<tweetId>_<mediaId>`; unique after `(tweetId, kind, url)` dedup.
    pub id: String,

    /// The tweet the media was attached to.
    pub tweet_id: String,

    /// Handle of the authoring account, without the leading `@`.
    pub username: String,

    pub kind: MediaKind,

    /// Absolute download URL.
    pub url: String,

    /// Creation timestamp as reported by the source, when available.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,

    /// Preferred filename stem, when the source suggests one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename_hint: Option<String>,
}

impl MediaItem {
    /// The media-id component of `id` (the part after `<tweetId>_`).
    pub fn media_id(&self) -> &str {
        self.id
            .strip_prefix(&format!("{}_", self.tweet_id))
            .unwrap_or(&self.id)
    }

    /// Identity used for in-memory de-duplication.
    pub fn dedup_key(&self) -> String {
        format!("{}|{}|{}", self.tweet_id, self.kind, self.url)
    }
}

/// De-duplicate by `(tweetId, kind, url)`, preserving first-seen order.
pub fn dedup_media(items: Vec<MediaItem>) -> Vec<MediaItem> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.dedup_key()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(tweet_id: &str, media_id: &str, kind: MediaKind, url: &str) -> MediaItem {
        MediaItem {
            id: format!("{}_{}", tweet_id, media_id),
            tweet_id: tweet_id.to_string(),
            username: "alice".to_string(),
            kind,
            url: url.to_string(),
            created_at: None,
            filename_hint: None,
        }
    }

    #[test]
    fn test_media_id_component() {
        let m = item("t1", "m1", MediaKind::Image, "https://example.com/a.jpg");
        assert_eq!(m.media_id(), "m1");
    }

    #[test]
    fn test_dedup_by_tweet_kind_url() {
        let items = vec![
            item("t1", "m1", MediaKind::Image, "https://e.com/a.jpg"),
            item("t1", "m1", MediaKind::Image, "https://e.com/a.jpg"),
            item("t1", "m1", MediaKind::Video, "https://e.com/a.mp4"),
            item("t2", "m2", MediaKind::Image, "https://e.com/a.jpg"),
        ];
        let deduped = dedup_media(items);
        assert_eq!(deduped.len(), 3);
        let keys: HashSet<String> = deduped.iter().map(|i| i.dedup_key()).collect();
        assert_eq!(keys.len(), 3);
    }

    #[test]
    fn test_kind_parsing() {
        assert_eq!("image".parse::<MediaKind>().unwrap(), MediaKind::Image);
        assert_eq!(" GIF ".parse::<MediaKind>().unwrap(), MediaKind::Gif);
        assert!("audio".parse::<MediaKind>().is_err());
    }
}
