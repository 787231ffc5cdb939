//! contains small utility functions that have nowhere else to go

use std::time::{SystemTime, UNIX_EPOCH};

/// milliseconds since the unix epoch, 0 if the clock is set before it
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
