//! Record types for the tootwatch registry.
//!
//! These types represent the persisted state of the upstream release,
//! tracked servers, and their admins. All types are serializable to/from
//! JSON for storage in redb tables.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fully-qualified admin account (`user@domain`).
pub type Account = String;

/// Server domain, the primary key of a tracked server.
pub type Domain = String;

// ── Release ───────────────────────────────────────────────────────

/// Latest known upstream release.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReleaseInfo {
    /// Release label as published upstream (e.g. `v4.2.0`).
    pub label: String,
    pub published_at: DateTime<Utc>,
}

// ── Server ────────────────────────────────────────────────────────

/// A monitored server instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerRecord {
    pub domain: Domain,
    /// Hostname actually dialed for HTTP and TLS checks.
    pub web_domain: String,
    /// Last version the server reported about itself.
    pub version: Option<String>,
    pub last_fetched_at: Option<DateTime<Utc>>,
    /// Last time a release-lag notice was sent for this server.
    pub last_notified_at: Option<DateTime<Utc>>,
    /// Last time a certificate-expiry notice was sent for this server.
    pub last_tls_notified_at: Option<DateTime<Utc>>,
}

impl ServerRecord {
    /// A freshly registered server that has never been checked.
    pub fn new(domain: impl Into<String>, web_domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            web_domain: web_domain.into(),
            version: None,
            last_fetched_at: None,
            last_notified_at: None,
            last_tls_notified_at: None,
        }
    }
}

// ── Admin ─────────────────────────────────────────────────────────

/// An operator receiving notices about one server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AdminRecord {
    pub account: Account,
    pub update_type: UpdateType,
    /// Domain of the server this admin operates.
    pub domain: Domain,
}

/// Which releases an admin wants to hear about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateType {
    /// Every release, including release candidates and betas.
    #[default]
    All,
    /// Stable releases only.
    Stable,
}

impl UpdateType {
    /// Whether an admin with this preference should hear about a release.
    pub fn accepts(self, prerelease: bool) -> bool {
        !(self == UpdateType::Stable && prerelease)
    }
}

impl fmt::Display for UpdateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateType::All => f.write_str("all"),
            UpdateType::Stable => f.write_str("stable"),
        }
    }
}

impl FromStr for UpdateType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(UpdateType::All),
            "stable" => Ok(UpdateType::Stable),
            other => Err(format!("unknown update type '{other}' (expected 'all' or 'stable')")),
        }
    }
}

/// Split a `user@domain` account into its domain part.
///
/// Returns `None` for accounts without a non-empty user and domain.
pub fn account_domain(account: &str) -> Option<&str> {
    let account = account.strip_prefix('@').unwrap_or(account);
    match account.split_once('@') {
        Some((user, domain)) if !user.is_empty() && !domain.is_empty() && !domain.contains('@') => {
            Some(domain)
        }
        _ => None,
    }
}
