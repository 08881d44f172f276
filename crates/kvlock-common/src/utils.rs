//! Utility functions for kvlock
//!
//! Key formatting and the clock used to compute lock deadlines.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::KEY_SEPARATOR;

/// Build the store key for a lock name.
///
/// # Examples
///
/// ```
/// use kvlock_common::prefixed_key;
///
/// assert_eq!(prefixed_key("billing", "invoice-run"), "billing:invoice-run");
/// assert_eq!(prefixed_key("", "invoice-run"), "invoice-run");
/// ```
pub fn prefixed_key(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        return name.to_string();
    }
    format!("{}{}{}", prefix, KEY_SEPARATOR, name)
}

/// Current wall-clock time in nanoseconds since the Unix epoch
pub fn now_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_nanos()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

/// Absolute deadline `now + ttl` in nanoseconds, `None` on overflow
pub fn deadline_after(now: i64, ttl: Duration) -> Option<i64> {
    let ttl = i64::try_from(ttl.as_nanos()).ok()?;
    now.checked_add(ttl)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefixed_key() {
        assert_eq!(prefixed_key("app", "lock"), "app:lock");
        assert_eq!(prefixed_key("", "lock"), "lock");
        assert_eq!(prefixed_key("a:b", "c"), "a:b:c");
    }

    #[test]
    fn test_deadline_after() {
        assert_eq!(deadline_after(1_000, Duration::from_nanos(500)), Some(1_500));
        assert_eq!(
            deadline_after(0, Duration::from_millis(50)),
            Some(50_000_000)
        );
        assert_eq!(deadline_after(i64::MAX - 1, Duration::from_nanos(2)), None);
        assert_eq!(deadline_after(0, Duration::MAX), None);
    }

    #[test]
    fn test_now_nanos_is_monotonic_enough() {
        let first = now_nanos();
        std::thread::sleep(Duration::from_millis(2));
        let second = now_nanos();
        assert!(first > 0);
        assert!(second > first);
    }
}
