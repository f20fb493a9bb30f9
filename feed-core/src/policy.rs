//! Cache freshness policy.

use chrono::Duration;

use crate::Timestamp;

/// Maximum age of a cached feed before it is considered stale.
pub const DEFAULT_MAX_CACHE_AGE_DAYS: i64 = 7;

/// Decides whether a snapshot is still fresh.
///
/// Staleness has no stored representation; it is recomputed from the
/// snapshot timestamp and a reference instant on every read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedCachePolicy {
    max_age: Duration,
}

impl Default for FeedCachePolicy {
    fn default() -> Self {
        Self {
            max_age: Duration::days(DEFAULT_MAX_CACHE_AGE_DAYS),
        }
    }
}

impl FeedCachePolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the maximum age.
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    /// A snapshot written at `timestamp` is fresh iff `now < timestamp + max_age`.
    ///
    /// The boundary itself is stale.
    pub fn validate(&self, timestamp: Timestamp, now: Timestamp) -> bool {
        match timestamp.checked_add_signed(self.max_age) {
            Some(expiry) => now < expiry,
            // Overflowing the calendar means the snapshot can never expire.
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use proptest::prelude::*;

    fn fixed_now() -> Timestamp {
        Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0)
            .single()
            .expect("valid date")
    }

    #[test]
    fn test_default_max_age_is_seven_days() {
        assert_eq!(FeedCachePolicy::default().max_age(), Duration::days(7));
    }

    #[test]
    fn test_expiry_boundary() {
        let policy = FeedCachePolicy::default();
        let now = fixed_now();
        let expiry = now - Duration::days(7);

        assert!(policy.validate(expiry + Duration::seconds(1), now));
        assert!(!policy.validate(expiry, now));
        assert!(!policy.validate(expiry - Duration::seconds(1), now));
    }

    #[test]
    fn test_custom_max_age() {
        let policy = FeedCachePolicy::new().with_max_age(Duration::hours(1));
        let now = fixed_now();

        assert!(policy.validate(now - Duration::minutes(59), now));
        assert!(!policy.validate(now - Duration::hours(1), now));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        /// Freshness flips exactly at timestamp + max_age.
        #[test]
        fn prop_freshness_is_strictly_before_expiry(
            offset_secs in -30i64 * 86_400..30 * 86_400
        ) {
            let policy = FeedCachePolicy::default();
            let timestamp = fixed_now();
            let now = timestamp + Duration::seconds(offset_secs);

            let expected = offset_secs < 7 * 86_400;
            prop_assert_eq!(policy.validate(timestamp, now), expected);
        }
    }
}
