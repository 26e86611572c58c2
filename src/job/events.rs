//! Typed event, failure-detail, and result shapes.

use serde::{Deserialize, Serialize};

use crate::timeutil::now_iso8601;

/// Event kinds emitted over a job's event feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobEventKind {
    JobStarted,
    UserStarted,
    MediaFound,
    DownloadProgress,
    UserFinished,
    JobFinished,
    Warning,
    Error,
}

/// Aggregate download counters carried by progress-bearing events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobProgress {
    pub total: u64,
    pub downloaded: u64,
    pub failed: u64,
    pub skipped: u64,
}

/// One element of the ordered, finite, single-pass event feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobEvent {
    #[serde(rename = "type")]
    pub kind: JobEventKind,
    pub message: String,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<JobProgress>,
}

impl JobEvent {
    pub fn new(kind: JobEventKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            timestamp: now_iso8601(),
            username: None,
            progress: None,
        }
    }

    pub fn for_user(kind: JobEventKind, message: impl Into<String>, username: &str) -> Self {
        let mut event = Self::new(kind, message);
        event.username = Some(username.to_string());
        event
    }

    pub fn with_progress(mut self, progress: JobProgress) -> Self {
        self.progress = Some(progress);
        self
    }
}

/// Scope of a recorded failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureScope {
    User,
    Media,
}

/// The media item a media-scope failure refers to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaRef {
    pub tweet_id: String,
    pub media_id: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_path: Option<String>,
}

/// One recorded failure. A single user or media item may contribute
/// several entries across its retries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureDetail {
    pub scope: FailureScope,
    pub username: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media: Option<MediaRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempts: Option<u32>,
    pub timestamp: String,
}

impl FailureDetail {
    pub fn user_scope(username: &str, message: impl Into<String>, attempts: u32) -> Self {
        Self {
            scope: FailureScope::User,
            username: username.to_string(),
            message: message.into(),
            code: None,
            media: None,
            attempts: Some(attempts),
            timestamp: now_iso8601(),
        }
    }

    pub fn media_scope(
        username: &str,
        media: MediaRef,
        message: impl Into<String>,
        code: Option<String>,
        attempts: u32,
    ) -> Self {
        Self {
            scope: FailureScope::Media,
            username: username.to_string(),
            message: message.into(),
            code,
            media: Some(media),
            attempts: Some(attempts),
            timestamp: now_iso8601(),
        }
    }
}

/// Aggregate counters plus the failure list, returned when the event
/// feed terminates normally.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResult {
    pub total_users: u64,
    pub succeeded_users: u64,
    pub failed_users: u64,
    pub total_media: u64,
    pub downloaded: u64,
    pub failed: u64,
    pub skipped: u64,
    pub failure_details: Vec<FailureDetail>,
}

impl JobResult {
    /// Whether the job should map to the partial-success exit code.
    pub fn has_final_failures(&self) -> bool {
        self.failed_users > 0 || self.failed > 0
    }

    pub fn progress(&self) -> JobProgress {
        JobProgress {
            total: self.total_media,
            downloaded: self.downloaded,
            failed: self.failed,
            skipped: self.skipped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = JobEvent::for_user(JobEventKind::UserStarted, "processing alice", "alice")
            .with_progress(JobProgress::default());
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"user_started""#));
        assert!(json.contains(r#""username":"alice""#));
        assert!(json.contains(r#""progress""#));
    }

    #[test]
    fn test_optional_fields_omitted() {
        let event = JobEvent::new(JobEventKind::JobStarted, "go");
        let json = serde_json::to_string(&event).unwrap();
        assert!(!json.contains("username"));
        assert!(!json.contains("progress"));
    }

    #[test]
    fn test_has_final_failures() {
        let mut result = JobResult::default();
        assert!(!result.has_final_failures());
        result.failed = 1;
        assert!(result.has_final_failures());
        result.failed = 0;
        result.failed_users = 2;
        assert!(result.has_final_failures());
    }

    #[test]
    fn test_failure_detail_scope_serialization() {
        let detail = FailureDetail::media_scope(
            "alice",
            MediaRef {
                tweet_id: "t1".into(),
                media_id: "m1".into(),
                url: "https://e.com/a.jpg".into(),
                target_path: Some("/out/alice/t1_m1.jpg".into()),
            },
            "HTTP 404",
            Some("HTTP_404".into()),
            1,
        );
        let json = serde_json::to_string(&detail).unwrap();
        assert!(json.contains(r#""scope":"media""#));
        assert!(json.contains(r#""code":"HTTP_404""#));
        assert!(json.contains(r#""tweetId":"t1""#));
    }
}
