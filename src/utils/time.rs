//! Time utilities

use chrono::{DateTime, Utc};
use std::time::{SystemTime, UNIX_EPOCH};

/// Get current Unix timestamp as i64 (seconds)
pub fn current_timestamp_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

/// Current wall-clock time
pub fn now() -> DateTime<Utc> {
    Utc::now()
}
