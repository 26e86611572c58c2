//! Job report writers (JSON, CSV, failures-only).

use std::fs;
use std::path::Path;

use serde::Serialize;

use crate::error::Result;
use crate::job::{FailureDetail, FailureScope, JobResult};
use crate::timeutil::now_iso8601;

const CSV_HEADER: [&str; 20] = [
    "record_type",
    "generated_at",
    "total_users",
    "succeeded_users",
    "failed_users",
    "total_media",
    "downloaded",
    "failed",
    "skipped",
    "failure_details_count",
    "scope",
    "username",
    "code",
    "attempts",
    "tweet_id",
    "media_id",
    "url",
    "target_path",
    "message",
    "timestamp",
];

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Summary {
    total_users: u64,
    succeeded_users: u64,
    failed_users: u64,
    total_media: u64,
    downloaded: u64,
    failed: u64,
    skipped: u64,
    failure_details_count: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JsonReport<'a> {
    generated_at: String,
    summary: Summary,
    failures: &'a [FailureDetail],
}

fn summary_of(result: &JobResult) -> Summary {
    Summary {
        total_users: result.total_users,
        succeeded_users: result.succeeded_users,
        failed_users: result.failed_users,
        total_media: result.total_media,
        downloaded: result.downloaded,
        failed: result.failed,
        skipped: result.skipped,
        failure_details_count: result.failure_details.len(),
    }
}

/// Write the full JSON report: `{generatedAt, summary, failures}`.
pub fn write_json_report(path: &Path, result: &JobResult) -> Result<()> {
    let report = JsonReport {
        generated_at: now_iso8601(),
        summary: summary_of(result),
        failures: &result.failure_details,
    };
    fs::write(path, serde_json::to_string_pretty(&report)?)?;
    Ok(())
}

/// Write just the failure list as pretty-printed JSON.
pub fn write_failures_report(path: &Path, result: &JobResult) -> Result<()> {
    fs::write(path, serde_json::to_string_pretty(&result.failure_details)?)?;
    Ok(())
}

/// Write the CSV report: one `summary` row, then one `failure` row
/// per detail.
pub fn write_csv_report(path: &Path, result: &JobResult) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    let generated_at = now_iso8601();

    writer.write_record(CSV_HEADER)?;

    let summary_row: Vec<String> = vec![
        "summary".to_string(),
        generated_at.clone(),
        result.total_users.to_string(),
        result.succeeded_users.to_string(),
        result.failed_users.to_string(),
        result.total_media.to_string(),
        result.downloaded.to_string(),
        result.failed.to_string(),
        result.skipped.to_string(),
        result.failure_details.len().to_string(),
        String::new(),
        String::new(),
        String::new(),
        String::new(),
        String::new(),
        String::new(),
        String::new(),
        String::new(),
        String::new(),
        String::new(),
    ];
    writer.write_record(&summary_row)?;

    for detail in &result.failure_details {
        let scope = match detail.scope {
            FailureScope::User => "user",
            FailureScope::Media => "media",
        };
        let (tweet_id, media_id, url, target_path) = match &detail.media {
            Some(media) => (
                media.tweet_id.clone(),
                media.media_id.clone(),
                media.url.clone(),
                media.target_path.clone().unwrap_or_default(),
            ),
            None => Default::default(),
        };
        let failure_row: Vec<String> = vec![
            "failure".to_string(),
            generated_at.clone(),
            String::new(),
            String::new(),
            String::new(),
            String::new(),
            String::new(),
            String::new(),
            String::new(),
            String::new(),
            scope.to_string(),
            detail.username.clone(),
            detail.code.clone().unwrap_or_default(),
            detail.attempts.map(|a| a.to_string()).unwrap_or_default(),
            tweet_id,
            media_id,
            url,
            target_path,
            detail.message.clone(),
            detail.timestamp.clone(),
        ];
        writer.write_record(&failure_row)?;
    }

    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::MediaRef;
    use tempfile::TempDir;

    fn sample_result() -> JobResult {
        JobResult {
            total_users: 2,
            succeeded_users: 1,
            failed_users: 1,
            total_media: 3,
            downloaded: 2,
            failed: 1,
            skipped: 0,
            failure_details: vec![
                FailureDetail::user_scope("bob", "timeout", 2),
                FailureDetail::media_scope(
                    "alice",
                    MediaRef {
                        tweet_id: "t1".into(),
                        media_id: "m1".into(),
                        url: "https://e.com/a.jpg".into(),
                        target_path: Some("/out/alice/t1_m1.jpg".into()),
                    },
                    "a message with, comma and \"quotes\"\nand newline",
                    Some("HTTP_404".into()),
                    1,
                ),
            ],
        }
    }

    #[test]
    fn test_json_report_shape() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("report.json");
        write_json_report(&path, &sample_result()).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["summary"]["totalUsers"], 2);
        assert_eq!(value["summary"]["failureDetailsCount"], 2);
        assert_eq!(value["failures"].as_array().unwrap().len(), 2);
        assert!(value["generatedAt"].is_string());
    }

    #[test]
    fn test_csv_report_round_trips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("report.csv");
        let result = sample_result();
        write_csv_report(&path, &result).unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        assert_eq!(
            reader.headers().unwrap().iter().collect::<Vec<_>>(),
            CSV_HEADER.to_vec()
        );
        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 3);
        assert_eq!(&rows[0][0], "summary");
        assert_eq!(&rows[0][2], "2");
        assert_eq!(&rows[1][0], "failure");
        assert_eq!(&rows[1][10], "user");
        // values containing commas, quotes, and newlines survive
        assert_eq!(
            &rows[2][18],
            "a message with, comma and \"quotes\"\nand newline"
        );
        assert_eq!(&rows[2][17], "/out/alice/t1_m1.jpg");
    }

    #[test]
    fn test_failures_report_is_bare_list() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("failures.json");
        write_failures_report(&path, &sample_result()).unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert!(value.is_array());
        assert_eq!(value.as_array().unwrap().len(), 2);
    }
}
