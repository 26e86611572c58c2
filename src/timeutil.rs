//! Time helpers.

use std::time::Duration;

use chrono::{SecondsFormat, Utc};

/// Sleep for the given number of milliseconds; no-op for zero.
pub async fn sleep_ms(ms: u64) {
    if ms > 0 {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
}

/// Current UTC time as an ISO-8601 string.
pub fn now_iso8601() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Exponential backoff delay: `base * 2^attempt`, capped to avoid overflow.
pub fn backoff_ms(base: u64, attempt: u32) -> u64 {
    base.saturating_mul(1u64 << attempt.min(16))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles() {
        assert_eq!(backoff_ms(500, 0), 500);
        assert_eq!(backoff_ms(500, 1), 1000);
        assert_eq!(backoff_ms(500, 2), 2000);
    }

    #[test]
    fn test_now_iso8601_shape() {
        let ts = now_iso8601();
        assert!(ts.ends_with('Z'));
        assert!(ts.contains('T'));
    }
}
