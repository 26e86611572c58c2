//! Downloaded-media ledger.
//!
//! A per-output-directory file recording the keys of media known to
//! exist on disk, so reruns skip them without issuing any HTTP calls.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::media::MediaItem;
use crate::timeutil::now_iso8601;

const LEDGER_DIR: &str = ".engine-cache";
const LEDGER_FILE: &str = "downloaded-media.json";
const LEDGER_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LedgerFile {
    version: u32,
    updated_at: String,
    #[serde(default)]
    media_keys: Vec<String>,
}

/// Ledger key: `lower(username)|tweetId|kind|url-without-query`.
pub fn media_key(username: &str, item: &MediaItem) -> String {
    format!(
        "{}|{}|{}|{}",
        username.to_lowercase(),
        item.tweet_id,
        item.kind,
        normalize_url_for_key(&item.url)
    )
}

/// Drop the query string and fragment so size variants of the same
/// asset share a key.
fn normalize_url_for_key(url: &str) -> &str {
    url.split(['?', '#']).next().unwrap_or(url)
}

/// In-memory view of the ledger file for one output directory.
#[derive(Debug)]
pub struct MediaLedger {
    path: PathBuf,
    keys: HashSet<String>,
}

impl MediaLedger {
    /// Load the ledger for an output directory. Missing or malformed
    /// files silently degrade to an empty ledger.
    pub fn load(output_dir: &Path) -> Self {
        let path = output_dir.join(LEDGER_DIR).join(LEDGER_FILE);
        let keys = match fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<LedgerFile>(&content) {
                Ok(file) => file.media_keys.into_iter().collect(),
                Err(e) => {
                    tracing::warn!(path = %path.display(), "ignoring malformed ledger: {}", e);
                    HashSet::new()
                }
            },
            Err(_) => HashSet::new(),
        };
        Self { path, keys }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    pub fn insert(&mut self, key: String) {
        self.keys.insert(key);
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Write the ledger atomically: temp file in place, then rename.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut media_keys: Vec<String> = self.keys.iter().cloned().collect();
        media_keys.sort();
        let file = LedgerFile {
            version: LEDGER_VERSION,
            updated_at: now_iso8601(),
            media_keys,
        };

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(&file)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::MediaKind;
    use tempfile::TempDir;

    fn item(url: &str) -> MediaItem {
        MediaItem {
            id: "t1_m1".into(),
            tweet_id: "t1".into(),
            username: "Alice".into(),
            kind: MediaKind::Image,
            url: url.into(),
            created_at: None,
            filename_hint: None,
        }
    }

    #[test]
    fn test_media_key_normalizes() {
        let key = media_key("Alice", &item("https://pbs.twimg.com/media/a.jpg?name=orig#frag"));
        assert_eq!(key, "alice|t1|image|https://pbs.twimg.com/media/a.jpg");
    }

    #[test]
    fn test_load_missing_is_empty() {
        let dir = TempDir::new().unwrap();
        let ledger = MediaLedger::load(dir.path());
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_load_malformed_is_empty() {
        let dir = TempDir::new().unwrap();
        let cache = dir.path().join(LEDGER_DIR);
        fs::create_dir_all(&cache).unwrap();
        fs::write(cache.join(LEDGER_FILE), "{broken").unwrap();
        assert!(MediaLedger::load(dir.path()).is_empty());
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let mut ledger = MediaLedger::load(dir.path());
        ledger.insert("alice|t1|image|https://e.com/a.jpg".into());
        ledger.insert("alice|t2|video|https://e.com/b.mp4".into());
        ledger.save().unwrap();

        let reloaded = MediaLedger::load(dir.path());
        assert_eq!(reloaded.len(), 2);
        assert!(reloaded.contains("alice|t1|image|https://e.com/a.jpg"));
        // no stray temp file left behind
        assert!(!dir
            .path()
            .join(LEDGER_DIR)
            .join("downloaded-media.json.tmp")
            .exists());
    }
}
