// src/catalog/mod.rs
//
// Product discovery. The catalog owns the one piece of persistence in the
// system: a small on-disk snapshot with an expiry timestamp, so restarts
// don't hammer the products endpoint. The chain builder never sees it.

pub mod delta;

pub use delta::DeltaCatalog;

use std::sync::atomic::AtomicBool;
use std::time::{SystemTime, UNIX_EPOCH};

/// Default stale threshold for the option-product catalog (1 hour).
/// Options only list and expire; the set changes slowly.
pub const DEFAULT_STALE_THRESHOLD_SECS: u64 = 3600;

/// Current Unix time in seconds.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Check if a timestamp is stale relative to a threshold.
///
/// Uses saturating subtraction so `last_updated > now` (clock skew,
/// corrupted cache data) reads as fresh rather than underflowing.
pub fn is_stale(last_updated: u64, threshold_secs: u64) -> bool {
    unix_now().saturating_sub(last_updated) > threshold_secs
}

/// Format a Unix timestamp for logging.
pub fn format_timestamp(ts: u64) -> String {
    if ts == 0 {
        return "never".to_string();
    }
    chrono::DateTime::from_timestamp(ts as i64, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| format!("unix:{}", ts))
}

/// RAII guard that resets an `AtomicBool` flag to `false` on drop.
///
/// Keeps the auto-refresh flag from sticking if the refresh task panics.
pub struct AutoRefreshGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> AutoRefreshGuard<'a> {
    /// The flag should already be set to `true` before creating the guard.
    pub fn new(flag: &'a AtomicBool) -> Self {
        Self { flag }
    }
}

impl Drop for AutoRefreshGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, std::sync::atomic::Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_stale() {
        assert!(is_stale(0, 3600));
        assert!(!is_stale(unix_now(), 3600));
        // Future timestamp (clock skew) reads as fresh
        assert!(!is_stale(unix_now() + 10_000, 3600));
    }

    #[test]
    fn test_format_timestamp_never() {
        assert_eq!(format_timestamp(0), "never");
    }
}
