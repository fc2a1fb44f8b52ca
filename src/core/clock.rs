//! Wall-clock timestamps carried in events (Unix milliseconds).

use chrono::Utc;

/// Unix timestamp in milliseconds.
pub type Millis = i64;

/// Current wall-clock time.
pub fn now_millis() -> Millis {
    Utc::now().timestamp_millis()
}

/// Seconds elapsed between two timestamps, clamped at zero.
pub fn elapsed_secs(from: Millis, to: Millis) -> f64 {
    (to - from).max(0) as f64 / 1000.0
}
