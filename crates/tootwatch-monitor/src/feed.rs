//! Upstream release feed.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::debug;

use crate::error::{MonitorError, MonitorResult};
use crate::http::HttpsClient;
use crate::BoxFuture;

const GITHUB_API_HOST: &str = "api.github.com";

/// The newest entry of the release feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedEntry {
    pub label: String,
    pub published_at: DateTime<Utc>,
}

/// Source of upstream release announcements.
pub trait ReleaseFeed: Send + Sync {
    /// Fetch the most recent release. Only the first feed entry is consulted.
    fn latest(&self) -> BoxFuture<'_, MonitorResult<FeedEntry>>;
}

#[derive(Debug, Deserialize)]
struct GitHubRelease {
    tag_name: String,
    #[serde(default)]
    name: Option<String>,
    created_at: DateTime<Utc>,
    #[serde(default)]
    published_at: Option<DateTime<Utc>>,
}

/// Release feed backed by the GitHub releases API (newest first).
#[derive(Clone)]
pub struct GitHubReleaseFeed {
    client: HttpsClient,
    repo: String,
}

impl GitHubReleaseFeed {
    /// `repo` is `owner/name`, e.g. `mastodon/mastodon`.
    pub fn new(client: HttpsClient, repo: impl Into<String>) -> Self {
        Self {
            client,
            repo: repo.into(),
        }
    }

    async fn fetch_latest(&self) -> MonitorResult<FeedEntry> {
        let path = format!("/repos/{}/releases?per_page=5", self.repo);
        let releases: Vec<GitHubRelease> = self
            .client
            .get(GITHUB_API_HOST, &path, None)
            .await?
            .error_for_status()?
            .json()?;
        let entry = first_entry(releases)?;
        debug!(repo = %self.repo, label = %entry.label, "release feed fetched");
        Ok(entry)
    }
}

impl ReleaseFeed for GitHubReleaseFeed {
    fn latest(&self) -> BoxFuture<'_, MonitorResult<FeedEntry>> {
        Box::pin(self.fetch_latest())
    }
}

fn first_entry(releases: Vec<GitHubRelease>) -> MonitorResult<FeedEntry> {
    let release = releases.into_iter().next().ok_or(MonitorError::EmptyFeed)?;
    let label = if release.tag_name.trim().is_empty() {
        release.name.unwrap_or_default()
    } else {
        release.tag_name
    };
    if label.trim().is_empty() {
        return Err(MonitorError::EmptyFeed);
    }
    Ok(FeedEntry {
        label,
        published_at: release.published_at.unwrap_or(release.created_at),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const SAMPLE: &str = r#"[
        {"tag_name":"v4.2.1","name":"v4.2.1","created_at":"2023-10-09T10:00:00Z","published_at":"2023-10-10T12:30:00Z","draft":false},
        {"tag_name":"v4.2.0","name":"v4.2.0","created_at":"2023-09-21T10:00:00Z","published_at":"2023-09-21T12:00:00Z","draft":false}
    ]"#;

    #[test]
    fn first_entry_is_latest() {
        let releases: Vec<GitHubRelease> = serde_json::from_str(SAMPLE).unwrap();
        let entry = first_entry(releases).unwrap();
        assert_eq!(entry.label, "v4.2.1");
        assert_eq!(
            entry.published_at,
            Utc.with_ymd_and_hms(2023, 10, 10, 12, 30, 0).unwrap()
        );
    }

    #[test]
    fn missing_published_at_falls_back_to_created_at() {
        let releases: Vec<GitHubRelease> = serde_json::from_str(
            r#"[{"tag_name":"v4.3.0-rc.1","created_at":"2024-01-02T03:04:05Z","published_at":null}]"#,
        )
        .unwrap();
        let entry = first_entry(releases).unwrap();
        assert_eq!(entry.published_at, Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap());
    }

    #[test]
    fn empty_feed_is_an_error() {
        assert!(matches!(first_entry(Vec::new()), Err(MonitorError::EmptyFeed)));
    }
}
