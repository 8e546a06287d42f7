//! Release tracker - keeps the stored upstream release current.

use std::cmp::Ordering;
use std::sync::Arc;

use tracing::{debug, info, warn};

use tootwatch_state::{ReleaseInfo, StateStore};

use crate::error::MonitorResult;
use crate::feed::ReleaseFeed;
use crate::version::{compare_labels, parse_version};

/// Outcome of one release check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseCheck {
    /// The release servers are measured against after this check.
    pub release: ReleaseInfo,
    /// Whether `release` was first observed by this check.
    pub is_new: bool,
}

/// Compares the feed against the stored release. Stored state only moves
/// forward in semantic-version order.
#[derive(Clone)]
pub struct ReleaseTracker {
    state: StateStore,
    feed: Arc<dyn ReleaseFeed>,
}

impl ReleaseTracker {
    pub fn new(state: StateStore, feed: Arc<dyn ReleaseFeed>) -> Self {
        Self { state, feed }
    }

    /// Fetch the latest release and record it if it is newer than the stored one.
    ///
    /// A feed failure leaves the stored release untouched.
    pub async fn check(&self) -> MonitorResult<ReleaseCheck> {
        let fetched = self.feed.latest().await?;
        let fetched = ReleaseInfo {
            label: fetched.label,
            published_at: fetched.published_at,
        };

        let stored = self.state.get_release()?;
        let replace = match &stored {
            None => true,
            Some(stored) => match compare_labels(&fetched.label, &stored.label) {
                Some(ordering) => ordering == Ordering::Greater,
                None if parse_version(&stored.label).is_none() => {
                    warn!(stored = %stored.label, fetched = %fetched.label, "stored release label unparseable, replacing");
                    true
                }
                None => {
                    warn!(label = %fetched.label, "ignoring unparseable release label from feed");
                    false
                }
            },
        };

        match stored {
            Some(stored) if !replace => {
                debug!(label = %stored.label, "no new release");
                Ok(ReleaseCheck {
                    release: stored,
                    is_new: false,
                })
            }
            _ => {
                self.state.put_release(&fetched)?;
                info!(label = %fetched.label, published_at = %fetched.published_at, "new release recorded");
                Ok(ReleaseCheck {
                    release: fetched,
                    is_new: true,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeFeed;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, 12, 0, 0).unwrap()
    }

    fn tracker(feed: &Arc<FakeFeed>) -> (StateStore, ReleaseTracker) {
        let state = StateStore::open_in_memory().unwrap();
        let tracker = ReleaseTracker::new(state.clone(), feed.clone());
        (state, tracker)
    }

    #[tokio::test]
    async fn first_fetch_is_new() {
        let feed = Arc::new(FakeFeed::new("v4.2.0", at(1)));
        let (state, tracker) = tracker(&feed);

        let check = tracker.check().await.unwrap();
        assert!(check.is_new);
        assert_eq!(check.release.label, "v4.2.0");
        assert_eq!(state.get_release().unwrap(), Some(check.release));
    }

    #[tokio::test]
    async fn same_label_is_not_new() {
        let feed = Arc::new(FakeFeed::new("v4.2.0", at(1)));
        let (_, tracker) = tracker(&feed);

        assert!(tracker.check().await.unwrap().is_new);
        assert!(!tracker.check().await.unwrap().is_new);
    }

    #[tokio::test]
    async fn newer_label_replaces_stored() {
        let feed = Arc::new(FakeFeed::new("v4.2.0", at(1)));
        let (state, tracker) = tracker(&feed);
        tracker.check().await.unwrap();

        feed.set("v4.10.0", at(5));
        let check = tracker.check().await.unwrap();
        assert!(check.is_new);
        assert_eq!(state.get_release().unwrap().unwrap().label, "v4.10.0");
    }

    #[tokio::test]
    async fn older_label_never_regresses() {
        let feed = Arc::new(FakeFeed::new("v4.2.1", at(5)));
        let (state, tracker) = tracker(&feed);
        tracker.check().await.unwrap();

        for older in ["v4.2.0", "v4.2.1-rc.1", "v4.2.1"] {
            feed.set(older, at(9));
            let check = tracker.check().await.unwrap();
            assert!(!check.is_new, "{older} reported as new");
            assert_eq!(check.release.label, "v4.2.1");
            assert_eq!(check.release.published_at, at(5));
        }
        assert_eq!(state.get_release().unwrap().unwrap().published_at, at(5));
    }

    #[tokio::test]
    async fn feed_failure_leaves_state_untouched() {
        let feed = Arc::new(FakeFeed::new("v4.2.0", at(1)));
        let (state, tracker) = tracker(&feed);
        tracker.check().await.unwrap();

        feed.fail();
        let err = tracker.check().await.unwrap_err();
        assert!(!err.is_fatal());
        assert_eq!(state.get_release().unwrap().unwrap().label, "v4.2.0");
    }

    #[tokio::test]
    async fn unparseable_stored_label_is_replaced() {
        let feed = Arc::new(FakeFeed::new("v4.2.0", at(2)));
        let (state, tracker) = tracker(&feed);
        state
            .put_release(&ReleaseInfo {
                label: "nightly".to_string(),
                published_at: at(1),
            })
            .unwrap();

        let check = tracker.check().await.unwrap();
        assert!(check.is_new);
        assert_eq!(check.release.label, "v4.2.0");
    }

    #[tokio::test]
    async fn unparseable_fetched_label_is_ignored() {
        let feed = Arc::new(FakeFeed::new("v4.2.0", at(1)));
        let (_, tracker) = tracker(&feed);
        tracker.check().await.unwrap();

        feed.set("nightly", at(3));
        let check = tracker.check().await.unwrap();
        assert!(!check.is_new);
        assert_eq!(check.release.label, "v4.2.0");
    }
}
