//! Integer-seconds timestamp helpers. Every envelope and stored record
//! uses seconds-since-epoch rather than a structured datetime, matching
//! the wire format in spec.md §6.

use chrono::Utc;

pub fn now_s() -> i64 {
    Utc::now().timestamp()
}
