//! Wall-clock helpers.
//!
//! All timestamps in the kernel are Unix milliseconds as i64. Expiry
//! comparisons take an explicit `now` so the checks stay testable.

use std::time::{SystemTime, UNIX_EPOCH};

/// Get current time in milliseconds.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time went backwards")
        .as_millis() as i64
}
