//! Outbound notices.
//!
//! Notices are built as plain values by the `*_notices` functions and
//! handed to a [`NotificationSink`] by the [`Dispatcher`]. Delivery is
//! best-effort: failures are logged and never reach the caller.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use tootwatch_state::{AdminRecord, ReleaseInfo};

use crate::decay::days_between;
use crate::error::MonitorResult;
use crate::http::HttpsClient;
use crate::version::is_prerelease;
use crate::BoxFuture;

/// Release age after which lag notices leave direct messages.
pub const LAG_ESCALATION_DAYS: i64 = 7;

/// Days left below which certificate notices go public.
pub const TLS_ESCALATION_DAYS: i64 = 3;

/// Audience of a posted notice, narrowest last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Public,
    Unlisted,
    Private,
    Direct,
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Visibility::Public => "public",
            Visibility::Unlisted => "unlisted",
            Visibility::Private => "private",
            Visibility::Direct => "direct",
        })
    }
}

/// How pressing a notice is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Urgency {
    Info,
    Warning,
    Critical,
}

/// One message to deliver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    /// Admin account the notice is addressed to; `None` for broadcasts.
    pub recipient: Option<String>,
    pub text: String,
    pub visibility: Visibility,
    pub language: String,
    pub urgency: Urgency,
}

/// Outbound channel for notices.
pub trait NotificationSink: Send + Sync {
    fn deliver<'a>(&'a self, notice: &'a Notice) -> BoxFuture<'a, MonitorResult<()>>;
}

/// Link to the upstream release page for `label`.
pub fn release_url(repo: &str, label: &str) -> String {
    format!("https://github.com/{repo}/releases/tag/{label}")
}

/// Wording and addressing shared by every notice.
#[derive(Debug, Clone)]
pub struct NoticeStyle {
    pub language: String,
    /// Upstream repository (`owner/name`) used for release links.
    pub repo: String,
}

impl Default for NoticeStyle {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
            repo: "mastodon/mastodon".to_string(),
        }
    }
}

fn admin_notice(style: &NoticeStyle, admin: &AdminRecord, body: String, visibility: Visibility, urgency: Urgency) -> Notice {
    Notice {
        recipient: Some(admin.account.clone()),
        text: format!("@{}\n{body}", admin.account),
        visibility,
        language: style.language.clone(),
        urgency,
    }
}

/// Notices telling each admin of a lagging server how old the release is.
pub fn release_lag_notices(
    style: &NoticeStyle,
    admins: &[AdminRecord],
    release: &ReleaseInfo,
    now: DateTime<Utc>,
) -> Vec<Notice> {
    let prerelease = is_prerelease(&release.label);
    let days_passed = days_between(now, release.published_at);
    let (visibility, urgency) = if days_passed < LAG_ESCALATION_DAYS {
        (Visibility::Direct, Urgency::Info)
    } else {
        (Visibility::Unlisted, Urgency::Warning)
    };
    let url = release_url(&style.repo, &release.label);

    admins
        .iter()
        .filter(|admin| admin.update_type.accepts(prerelease))
        .map(|admin| {
            let body = format!(
                "{} was released {days_passed} days ago.\n{url}",
                release.label
            );
            admin_notice(style, admin, body, visibility, urgency)
        })
        .collect()
}

/// A public announcement followed by a direct notice per admin.
pub fn new_release_notices(
    style: &NoticeStyle,
    admins: &[AdminRecord],
    release: &ReleaseInfo,
) -> Vec<Notice> {
    let prerelease = is_prerelease(&release.label);
    let url = release_url(&style.repo, &release.label);

    let mut notices = vec![Notice {
        recipient: None,
        text: format!("Mastodon {} has been released!\n{url}", release.label),
        visibility: Visibility::Public,
        language: style.language.clone(),
        urgency: Urgency::Info,
    }];
    notices.extend(
        admins
            .iter()
            .filter(|admin| admin.update_type.accepts(prerelease))
            .map(|admin| {
                let body = format!("Mastodon {} has been released.\n{url}", release.label);
                admin_notice(style, admin, body, Visibility::Direct, Urgency::Info)
            }),
    );
    notices
}

/// Certificate-expiry notices for every admin of one server.
pub fn tls_expiry_notices(
    style: &NoticeStyle,
    admins: &[AdminRecord],
    domain: &str,
    days_left: i64,
) -> Vec<Notice> {
    let (visibility, urgency) = if days_left < TLS_ESCALATION_DAYS {
        (Visibility::Public, Urgency::Critical)
    } else {
        (Visibility::Private, Urgency::Warning)
    };
    let body = if days_left < 0 {
        format!("The TLS certificate of {domain} expired {} days ago.", -days_left)
    } else {
        format!("The TLS certificate of {domain} expires in {days_left} days.")
    };

    admins
        .iter()
        .map(|admin| admin_notice(style, admin, body.clone(), visibility, urgency))
        .collect()
}

/// Builds notices and hands them to the sink.
#[derive(Clone)]
pub struct Dispatcher {
    sink: Arc<dyn NotificationSink>,
    style: NoticeStyle,
}

impl Dispatcher {
    pub fn new(sink: Arc<dyn NotificationSink>, style: NoticeStyle) -> Self {
        Self { sink, style }
    }


    /// Deliver notices in order. Returns how many were delivered.
    pub async fn send_all(&self, notices: &[Notice]) -> usize {
        let mut delivered = 0;
        for notice in notices {
            match self.sink.deliver(notice).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    error!(
                        recipient = notice.recipient.as_deref().unwrap_or("<broadcast>"),
                        error = %e,
                        "notice delivery failed"
                    );
                }
            }
        }
        delivered
    }

    pub async fn release_lag(
        &self,
        admins: &[AdminRecord],
        release: &ReleaseInfo,
        now: DateTime<Utc>,
    ) -> usize {
        self.send_all(&release_lag_notices(&self.style, admins, release, now)).await
    }

    pub async fn new_release(&self, admins: &[AdminRecord], release: &ReleaseInfo) -> usize {
        self.send_all(&new_release_notices(&self.style, admins, release)).await
    }

    pub async fn tls_expiry(&self, admins: &[AdminRecord], domain: &str, days_left: i64) -> usize {
        self.send_all(&tls_expiry_notices(&self.style, admins, domain, days_left)).await
    }
}

// ── Sinks ─────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct StatusPayload<'a> {
    status: &'a str,
    visibility: Visibility,
    language: &'a str,
}

#[derive(Debug, Deserialize)]
struct VerifiedAccount {
    acct: String,
}

/// Posts notices as statuses of the bot's Mastodon account.
#[derive(Clone)]
pub struct MastodonSink {
    client: HttpsClient,
    host: String,
    token: String,
}

impl MastodonSink {
    pub fn new(client: HttpsClient, host: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client,
            host: host.into(),
            token: token.into(),
        }
    }

    /// Check the access token and return the bot's own account name.
    pub async fn verify_credentials(&self) -> MonitorResult<String> {
        let account: VerifiedAccount = self
            .client
            .get(&self.host, "/api/v1/accounts/verify_credentials", Some(&self.token))
            .await?
            .error_for_status()?
            .json()?;
        Ok(account.acct)
    }

    async fn post_status(&self, notice: &Notice) -> MonitorResult<()> {
        let payload = StatusPayload {
            status: &notice.text,
            visibility: notice.visibility,
            language: &notice.language,
        };
        self.client
            .post_json(&self.host, "/api/v1/statuses", Some(&self.token), &payload)
            .await?
            .error_for_status()?;
        Ok(())
    }
}

impl NotificationSink for MastodonSink {
    fn deliver<'a>(&'a self, notice: &'a Notice) -> BoxFuture<'a, MonitorResult<()>> {
        Box::pin(self.post_status(notice))
    }
}

/// Logs notices instead of posting them (debug mode).
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn deliver<'a>(&'a self, notice: &'a Notice) -> BoxFuture<'a, MonitorResult<()>> {
        Box::pin(async move {
            let recipient = notice.recipient.as_deref().unwrap_or("<broadcast>");
            if notice.urgency >= Urgency::Warning {
                warn!(%recipient, visibility = %notice.visibility, text = %notice.text, "notice");
            } else {
                info!(%recipient, visibility = %notice.visibility, text = %notice.text, "notice");
            }
            Ok(())
        })
    }
}
