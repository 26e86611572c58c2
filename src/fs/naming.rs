//! Filename generation and manipulation.

use url::Url;

use crate::media::MediaItem;

/// Sanitize a path component by replacing invalid characters.
///
/// Empty results (after trimming) fall back to `"unknown"`.
pub fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c if (c as u32) < 0x20 => '_',
            c => c,
        })
        .collect();

    let trimmed = cleaned.trim();
    if trimmed.is_empty() {
        "unknown".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Build the on-disk filename for a media item:
/// `<tweetId>_<mediaId>.<ext>`.
pub fn build_filename(item: &MediaItem) -> String {
    format!(
        "{}_{}.{}",
        sanitize(&item.tweet_id),
        sanitize(item.media_id()),
        media_extension(item)
    )
}

/// Resolve the file extension for a media item.
///
/// Prefers an explicit `?format=` query value, then the URL path
/// suffix, then a per-kind default.
pub fn media_extension(item: &MediaItem) -> String {
    if let Ok(parsed) = Url::parse(&item.url) {
        if let Some(fmt) = parsed
            .query_pairs()
            .find(|(k, _)| k == "format")
            .map(|(_, v)| v.to_string())
        {
            if !fmt.is_empty()
                && fmt
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
            {
                return fmt;
            }
        }

        if let Some(last) = parsed.path_segments().and_then(|mut s| s.next_back()) {
            if let Some((_, ext)) = last.rsplit_once('.') {
                if !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric())
                {
                    return ext.to_ascii_lowercase();
                }
            }
        }
    }

    item.kind.default_extension().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::MediaKind;

    fn item(kind: MediaKind, url: &str) -> MediaItem {
        MediaItem {
            id: "123_456".to_string(),
            tweet_id: "123".to_string(),
            username: "alice".to_string(),
            kind,
            url: url.to_string(),
            created_at: None,
            filename_hint: None,
        }
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("normal"), "normal");
        assert_eq!(sanitize("a/b\\c:d"), "a_b_c_d");
        assert_eq!(sanitize("a<b>c|d?e*f"), "a_b_c_d_e_f");
        assert_eq!(sanitize("  padded  "), "padded");
        assert_eq!(sanitize(""), "unknown");
        assert_eq!(sanitize("   "), "unknown");
    }

    #[test]
    fn test_sanitize_control_chars() {
        assert_eq!(sanitize("a\u{0001}b"), "a_b");
    }

    #[test]
    fn test_extension_from_format_query() {
        let m = item(
            MediaKind::Image,
            "https://pbs.twimg.com/media/abc?format=png&name=orig",
        );
        assert_eq!(media_extension(&m), "png");
    }

    #[test]
    fn test_extension_from_path() {
        let m = item(MediaKind::Video, "https://video.twimg.com/vid/720/clip.mp4?tag=1");
        assert_eq!(media_extension(&m), "mp4");
    }

    #[test]
    fn test_extension_default_by_kind() {
        assert_eq!(
            media_extension(&item(MediaKind::Image, "https://e.com/noext")),
            "jpg"
        );
        assert_eq!(
            media_extension(&item(MediaKind::Gif, "https://e.com/noext")),
            "gif"
        );
        assert_eq!(
            media_extension(&item(MediaKind::Video, "https://e.com/noext")),
            "mp4"
        );
    }

    #[test]
    fn test_build_filename_is_safe() {
        let mut m = item(MediaKind::Image, "https://e.com/pic.jpg");
        m.id = "12:3_45|6".to_string();
        m.tweet_id = "12:3".to_string();
        let name = build_filename(&m);
        assert_eq!(name, "12_3_45_6.jpg");
        assert!(!name.chars().any(|c| "<>:\"/\\|?*".contains(c)));
    }
}
