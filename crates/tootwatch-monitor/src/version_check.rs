//! Per-server version check.
//!
//! One unit of work: fetch the reported version, then in a single write
//! transaction re-arm, record, and decide on a lag notice. Notices go out
//! only after the transaction commits.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use tootwatch_state::{ReleaseInfo, ServerRecord};

use crate::context::CheckContext;
use crate::decay::should_notify_release;
use crate::error::{MonitorError, MonitorResult};
use crate::version::compare_labels;

/// What one version check changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VersionOutcome {
    /// The reported version differs from the stored one.
    pub changed: bool,
    /// The reported version is older than the release.
    pub lagging: bool,
    /// A lag notice is due (and `last_notified_at` was set).
    pub notify: bool,
}

/// Apply a freshly fetched version to a server record.
pub fn apply_version(
    record: &mut ServerRecord,
    fetched: &str,
    release: &ReleaseInfo,
    now: DateTime<Utc>,
) -> VersionOutcome {
    let changed = record.version.as_deref() != Some(fetched);
    if changed {
        record.last_notified_at = None;
    }
    record.version = Some(fetched.to_string());
    record.last_fetched_at = Some(now);

    let lagging = compare_labels(fetched, &release.label) == Some(Ordering::Less);
    let notify =
        lagging && should_notify_release(record.last_notified_at, release.published_at, now);
    if notify {
        record.last_notified_at = Some(now);
    }

    VersionOutcome {
        changed,
        lagging,
        notify,
    }
}

/// Check one server against `release`.
pub async fn check_server(
    ctx: &CheckContext,
    domain: &str,
    release: &ReleaseInfo,
) -> MonitorResult<VersionOutcome> {
    let server = ctx.server(domain)?;
    let fetched = ctx.probe.fetch_version(&server.web_domain).await?;
    let now = ctx.clock.now();

    let outcome = ctx
        .state
        .update_server(domain, |record| apply_version(record, &fetched, release, now))?
        .ok_or_else(|| MonitorError::ServerVanished(domain.to_string()))?;

    if outcome.changed {
        info!(%domain, version = %fetched, "server version changed");
    }
    if compare_labels(&fetched, &release.label).is_none() {
        warn!(%domain, version = %fetched, release = %release.label, "version not comparable");
    }

    if outcome.notify {
        let admins = ctx.state.list_admins_for_server(domain)?;
        let sent = ctx.dispatcher.release_lag(&admins, release, now).await;
        info!(%domain, version = %fetched, release = %release.label, sent, "release lag notice");
    } else {
        debug!(%domain, version = %fetched, lagging = outcome.lagging, "version checked");
    }

    Ok(outcome)
}
