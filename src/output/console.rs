//! Rendering job events, summaries, and errors for the terminal.

use console::style;
use serde_json::json;

use crate::error::Error;
use crate::job::{JobEvent, JobEventKind, JobResult};

/// Render one event as a styled text line.
pub fn render_event_text(event: &JobEvent) -> String {
    let label = match event.kind {
        JobEventKind::JobStarted => style("START").cyan().bold(),
        JobEventKind::JobFinished => style("DONE").green().bold(),
        JobEventKind::UserStarted => style("USER").cyan(),
        JobEventKind::UserFinished => style("OK").green(),
        JobEventKind::MediaFound => style("FOUND").cyan(),
        JobEventKind::DownloadProgress => style("DL").magenta(),
        JobEventKind::Warning => style("WARN").yellow().bold(),
        JobEventKind::Error => style("ERROR").red().bold(),
    };
    format!("{} {}", label, event.message)
}

/// Render one event as a single JSON line.
pub fn render_event_json(event: &JobEvent) -> String {
    serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string())
}

/// Write the final error line and return nothing; the caller exits
/// with the error's code.
pub fn print_error_line(error: &Error, json_output: bool) {
    if json_output {
        let line = json!({
            "level": "error",
            "code": error.class(),
            "exit": error.exit_code(),
            "message": error.to_string(),
        });
        eprintln!("{}", line);
    } else {
        eprintln!(
            "Error [{}] (exit={}): {}",
            error.class(),
            error.exit_code(),
            error
        );
    }
}

/// Print the end-of-job summary block.
pub fn print_summary(result: &JobResult) {
    println!();
    println!("{}", style("Job summary:").bold());
    println!(
        "  Users:      {} total, {} succeeded, {} failed",
        result.total_users, result.succeeded_users, result.failed_users
    );
    println!("  Media:      {} discovered", result.total_media);
    println!("  Downloaded: {}", style(result.downloaded).green());
    println!("  Skipped:    {}", style(result.skipped).yellow());
    if result.failed > 0 {
        println!("  Failed:     {}", style(result.failed).red());
    } else {
        println!("  Failed:     0");
    }
    if !result.failure_details.is_empty() {
        println!("  Failure details: {}", result.failure_details.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_event_json_is_single_line() {
        let event = JobEvent::new(JobEventKind::Warning, "multi\nline");
        let line = render_event_json(&event);
        assert!(serde_json::from_str::<serde_json::Value>(&line).is_ok());
        assert!(!line.trim_end().contains('\n'));
    }

    #[test]
    fn test_render_event_text_contains_message() {
        let event = JobEvent::new(JobEventKind::MediaFound, "found 3 media item(s)");
        assert!(render_event_text(&event).contains("found 3 media item(s)"));
    }
}
