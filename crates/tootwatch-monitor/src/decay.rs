//! Re-notification policy.
//!
//! Release-lag notices decay: they fire when the age of the release (in
//! whole days) crosses the next power of two past the age at which the
//! previous notice went out, so reminders land on day 1, 2, 4, 8, 16 and so
//! on. Certificate notices use a flat one-day cooldown instead.

use chrono::{DateTime, Utc};

/// Whole days from `earlier` to `later`, truncated toward zero.
pub fn days_between(later: DateTime<Utc>, earlier: DateTime<Utc>) -> i64 {
    (later - earlier).num_days()
}

/// Doubling level for an age in days; non-positive ages sit below level 0.
fn level(days: i64) -> f64 {
    if days > 0 { (days as f64).log2() } else { -1.0 }
}

/// Decide whether a release-lag notice is due.
///
/// Never fires before the release is a day old, and never twice within one
/// day of the previous notice.
pub fn should_notify_release(
    last_notified: Option<DateTime<Utc>>,
    release_published_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> bool {
    let days_since_release = days_between(now, release_published_at);
    if days_since_release < 1 {
        return false;
    }

    let Some(last_notified) = last_notified else {
        return true;
    };

    if days_between(now, last_notified) < 1 {
        return false;
    }

    let days_since_notice = days_between(last_notified, release_published_at);
    level(days_since_release) - level(days_since_notice) >= 1.0
}

/// Decide whether a certificate-expiry notice is due.
pub fn should_notify_tls(last_tls_notified: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    match last_tls_notified {
        None => true,
        Some(last) => days_between(now, last) >= 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn published() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn day(n: i64) -> DateTime<Utc> {
        published() + Duration::days(n)
    }

    #[test]
    fn never_before_one_day() {
        for hours in [0, 1, 12, 23] {
            let now = published() + Duration::hours(hours);
            assert!(!should_notify_release(None, published(), now));
            assert!(!should_notify_release(Some(published()), published(), now));
        }
    }

    #[test]
    fn first_notice_after_one_day() {
        assert!(should_notify_release(None, published(), day(1)));
        assert!(should_notify_release(None, published(), day(30)));
    }

    #[test]
    fn ten_day_old_release_without_notice_fires() {
        assert!(should_notify_release(None, published(), day(10)));
    }

    #[test]
    fn immediate_recheck_after_notice_is_silent() {
        for n in [1, 2, 3, 10, 100] {
            assert!(should_notify_release(None, published(), day(n)));
            assert!(!should_notify_release(Some(day(n)), published(), day(n)));
        }
    }

    #[test]
    fn notices_follow_doubling_milestones() {
        let mut last = None;
        let mut fired = Vec::new();
        for n in 0..=40 {
            if should_notify_release(last, published(), day(n)) {
                fired.push(n);
                last = Some(day(n));
            }
        }
        assert_eq!(fired, vec![1, 2, 4, 8, 16, 32]);
    }

    #[test]
    fn hourly_checks_fire_once_per_milestone() {
        let mut last = None;
        let mut count = 0;
        for hour in 0..(9 * 24) {
            let now = published() + Duration::hours(hour);
            if should_notify_release(last, published(), now) {
                count += 1;
                last = Some(now);
            }
        }
        // Day 1, 2, 4 and 8.
        assert_eq!(count, 4);
    }

    #[test]
    fn notice_from_before_release_counts_as_none() {
        // Left over from an older release; the new one re-arms the ladder.
        let stale = published() - Duration::days(5);
        assert!(should_notify_release(Some(stale), published(), day(1)));
    }

    #[test]
    fn same_day_floor_blocks_refire_across_releases() {
        // Notified about the previous release an hour ago.
        let now = day(3);
        let stale = now - Duration::hours(1);
        let published_after = now - Duration::days(3);
        assert!(!should_notify_release(Some(stale), published_after, now));
    }

    #[test]
    fn tls_cooldown_is_one_day() {
        let now = day(0);
        assert!(should_notify_tls(None, now));
        assert!(!should_notify_tls(Some(now), now));
        assert!(!should_notify_tls(Some(now - Duration::hours(23)), now));
        assert!(should_notify_tls(Some(now - Duration::hours(24)), now));
    }

    #[test]
    fn days_between_truncates() {
        assert_eq!(days_between(day(1) + Duration::hours(23), published()), 1);
        assert_eq!(days_between(published() - Duration::hours(12), published()), 0);
        assert_eq!(days_between(published() - Duration::hours(36), published()), -1);
    }
}
