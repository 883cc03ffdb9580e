use std::time::SystemTime;

/// Returns the current unix timestamp (seconds elapsed since 1970-01-01).
#[inline]
pub fn timestamp_secs() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .expect("System clock is set before the unix epoch")
        .as_secs()
}

/// Returns the current unix timestamp in nanoseconds.
#[inline]
pub fn timestamp_nanos() -> i64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .expect("System clock is set before the unix epoch")
        .as_nanos() as i64
}
