//! Sync windows: the time range a run extracts.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// The half-open time range `[since, until)` an extractor parameterizes its
/// requests with. Resolved by the orchestrator from the persisted
/// high-watermark, never hardcoded by an extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncWindow {
    pub since: DateTime<Utc>,
    pub until: DateTime<Utc>,
}

impl SyncWindow {
    pub fn new(since: DateTime<Utc>, until: DateTime<Utc>) -> Self {
        Self { since, until }
    }

    /// The window ending now and reaching `lookback` into the past. Used
    /// when no watermark exists yet for an integration.
    pub fn lookback(lookback: Duration, now: DateTime<Utc>) -> Self {
        Self {
            since: now - lookback,
            until: now,
        }
    }

    /// `since` formatted as `YYYY-MM-DD`, for APIs that take date params.
    pub fn since_date(&self) -> String {
        self.since.format("%Y-%m-%d").to_string()
    }

    /// `until` formatted as `YYYY-MM-DD`.
    pub fn until_date(&self) -> String {
        self.until.format("%Y-%m-%d").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_lookback_window() {
        let now = Utc.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap();
        let window = SyncWindow::lookback(Duration::days(30), now);

        assert_eq!(window.until, now);
        assert_eq!(window.since, now - Duration::days(30));
        assert_eq!(window.since_date(), "2024-02-14");
        assert_eq!(window.until_date(), "2024-03-15");
    }
}
