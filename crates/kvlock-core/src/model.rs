//! Lock state as observed from a stored deadline

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Computed state of one lock key at the moment it was read
///
/// Staleness is never stored: it is derived from the stored deadline and the
/// reader's clock, so two readers with skewed clocks may disagree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LockStatus {
    /// No record exists
    Free,
    /// Deadline has not passed yet
    Held {
        /// Deadline in nanoseconds since the Unix epoch
        expires_at: i64,
        #[serde(with = "duration_millis")]
        remaining: Duration,
    },
    /// A record exists but its deadline has passed; the next acquire steals it
    Expired {
        expires_at: i64,
        #[serde(with = "duration_millis")]
        overdue: Duration,
    },
}

impl LockStatus {
    /// Classify a stored deadline against `now` (both in epoch nanoseconds).
    pub fn from_deadline(deadline: Option<i64>, now: i64) -> Self {
        match deadline {
            None => LockStatus::Free,
            Some(expires_at) if expires_at >= now => LockStatus::Held {
                expires_at,
                remaining: nanos_between(now, expires_at),
            },
            Some(expires_at) => LockStatus::Expired {
                expires_at,
                overdue: nanos_between(expires_at, now),
            },
        }
    }

    pub fn is_held(&self) -> bool {
        matches!(self, LockStatus::Held { .. })
    }

    /// Whether the next acquire would find the lock available
    pub fn is_acquirable(&self) -> bool {
        !self.is_held()
    }

    pub fn expires_at(&self) -> Option<i64> {
        match self {
            LockStatus::Free => None,
            LockStatus::Held { expires_at, .. } | LockStatus::Expired { expires_at, .. } => {
                Some(*expires_at)
            }
        }
    }
}

fn nanos_between(earlier: i64, later: i64) -> Duration {
    let delta = i128::from(later) - i128::from(earlier);
    Duration::from_nanos(u64::try_from(delta).unwrap_or(u64::MAX))
}

mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_deadline() {
        assert_eq!(LockStatus::from_deadline(None, 100), LockStatus::Free);

        let held = LockStatus::from_deadline(Some(5_000_000), 1_000_000);
        assert_eq!(
            held,
            LockStatus::Held {
                expires_at: 5_000_000,
                remaining: Duration::from_millis(4),
            }
        );
        assert!(held.is_held());
        assert!(!held.is_acquirable());

        let expired = LockStatus::from_deadline(Some(1_000_000), 3_000_000);
        assert_eq!(
            expired,
            LockStatus::Expired {
                expires_at: 1_000_000,
                overdue: Duration::from_millis(2),
            }
        );
        assert!(expired.is_acquirable());
        assert_eq!(expired.expires_at(), Some(1_000_000));
    }

    #[test]
    fn test_deadline_equal_to_now_is_still_held() {
        assert!(LockStatus::from_deadline(Some(42), 42).is_held());
    }

    #[test]
    fn test_serialize_status() {
        let status = LockStatus::Held {
            expires_at: 9,
            remaining: Duration::from_millis(1500),
        };
        let json = serde_json::to_value(status).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"state": "held", "expires_at": 9, "remaining": 1500})
        );

        let json = serde_json::to_value(LockStatus::Free).unwrap();
        assert_eq!(json, serde_json::json!({"state": "free"}));
    }
}
