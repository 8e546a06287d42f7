//! In-memory fakes for the network-facing traits.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};

use tootwatch_state::{StateStore, UpdateType};

use crate::clock::ManualClock;
use crate::context::CheckContext;
use crate::error::{MonitorError, MonitorResult};
use crate::feed::{FeedEntry, ReleaseFeed};
use crate::notify::{Dispatcher, Notice, NoticeStyle, NotificationSink};
use crate::probe::InstanceProbe;
use crate::BoxFuture;

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

// ── Feed ──────────────────────────────────────────────────────────

/// Serves one fixed entry, or fails.
pub struct FakeFeed {
    entry: Mutex<Option<FeedEntry>>,
}

impl FakeFeed {
    pub fn new(label: &str, published_at: DateTime<Utc>) -> Self {
        let feed = Self {
            entry: Mutex::new(None),
        };
        feed.set(label, published_at);
        feed
    }

    pub fn set(&self, label: &str, published_at: DateTime<Utc>) {
        *lock(&self.entry) = Some(FeedEntry {
            label: label.to_string(),
            published_at,
        });
    }

    pub fn fail(&self) {
        *lock(&self.entry) = None;
    }
}

impl ReleaseFeed for FakeFeed {
    fn latest(&self) -> BoxFuture<'_, MonitorResult<FeedEntry>> {
        let entry = lock(&self.entry).clone();
        Box::pin(async move {
            entry.ok_or_else(|| MonitorError::Connect {
                host: "api.github.com".to_string(),
                message: "connection refused".to_string(),
            })
        })
    }
}

// ── Probe ─────────────────────────────────────────────────────────

/// Per-host canned versions and certificate expiries. Unknown hosts fail
/// like an unreachable server.
#[derive(Default)]
pub struct FakeProbe {
    versions: Mutex<HashMap<String, String>>,
    expiries: Mutex<HashMap<String, DateTime<Utc>>>,
    panicking: Mutex<HashSet<String>>,
    delay: Mutex<Option<Duration>>,
    in_flight: Mutex<(usize, usize)>,
}

impl FakeProbe {
    pub fn set_version(&self, host: &str, version: &str) {
        lock(&self.versions).insert(host.to_string(), version.to_string());
    }

    pub fn set_expiry(&self, host: &str, expiry: DateTime<Utc>) {
        lock(&self.expiries).insert(host.to_string(), expiry);
    }

    pub fn fail_tls(&self, host: &str) {
        lock(&self.expiries).remove(host);
    }

    /// Make every probe of `host` panic.
    pub fn panic_on(&self, host: &str) {
        lock(&self.panicking).insert(host.to_string());
    }

    /// Hold every probe for `delay` before answering.
    pub fn set_delay(&self, delay: Duration) {
        *lock(&self.delay) = Some(delay);
    }

    /// Highest number of probes observed running at once.
    pub fn max_in_flight(&self) -> usize {
        lock(&self.in_flight).1
    }

    async fn answer<T>(&self, host: &str, value: Option<T>) -> MonitorResult<T> {
        if lock(&self.panicking).contains(host) {
            panic!("probe of {host} panicked");
        }
        {
            let mut in_flight = lock(&self.in_flight);
            in_flight.0 += 1;
            in_flight.1 = in_flight.1.max(in_flight.0);
        }
        let delay = *lock(&self.delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        lock(&self.in_flight).0 -= 1;

        value.ok_or_else(|| MonitorError::Connect {
            host: host.to_string(),
            message: "connection refused".to_string(),
        })
    }
}

impl InstanceProbe for FakeProbe {
    fn fetch_version<'a>(&'a self, web_domain: &'a str) -> BoxFuture<'a, MonitorResult<String>> {
        let version = lock(&self.versions).get(web_domain).cloned();
        Box::pin(self.answer(web_domain, version))
    }

    fn fetch_cert_expiry<'a>(
        &'a self,
        web_domain: &'a str,
    ) -> BoxFuture<'a, MonitorResult<DateTime<Utc>>> {
        let expiry = lock(&self.expiries).get(web_domain).copied();
        Box::pin(self.answer(web_domain, expiry))
    }
}

// ── Sink ──────────────────────────────────────────────────────────

/// Records delivered notices; fails delivery to selected recipients.
#[derive(Default)]
pub struct RecordingSink {
    delivered: Mutex<Vec<Notice>>,
    failing: HashSet<String>,
}

impl RecordingSink {
    pub fn failing_for(accounts: &[&str]) -> Self {
        Self {
            delivered: Mutex::new(Vec::new()),
            failing: accounts.iter().map(|a| a.to_string()).collect(),
        }
    }

    pub fn notices(&self) -> Vec<Notice> {
        lock(&self.delivered).clone()
    }

    pub fn recipients(&self) -> Vec<Option<String>> {
        self.notices().into_iter().map(|n| n.recipient).collect()
    }
}

impl NotificationSink for RecordingSink {
    fn deliver<'a>(&'a self, notice: &'a Notice) -> BoxFuture<'a, MonitorResult<()>> {
        Box::pin(async move {
            if let Some(recipient) = &notice.recipient {
                if self.failing.contains(recipient) {
                    return Err(MonitorError::Status {
                        url: "https://bot.example/api/v1/statuses".to_string(),
                        status: 503,
                    });
                }
            }
            lock(&self.delivered).push(notice.clone());
            Ok(())
        })
    }
}

// ── Fixture ───────────────────────────────────────────────────────

/// An in-memory store wired to fakes, with a manual clock.
pub struct Fixture {
    pub state: StateStore,
    pub probe: Arc<FakeProbe>,
    pub sink: Arc<RecordingSink>,
    pub clock: Arc<ManualClock>,
    pub ctx: CheckContext,
}

impl Fixture {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self::with_sink(now, RecordingSink::default())
    }

    pub fn with_failing_sink(now: DateTime<Utc>, accounts: &[&str]) -> Self {
        Self::with_sink(now, RecordingSink::failing_for(accounts))
    }

    fn with_sink(now: DateTime<Utc>, sink: RecordingSink) -> Self {
        let state = StateStore::open_in_memory().unwrap();
        let probe = Arc::new(FakeProbe::default());
        let sink = Arc::new(sink);
        let clock = Arc::new(ManualClock::new(now));
        let dispatcher = Dispatcher::new(sink.clone(), NoticeStyle::default());
        let ctx = CheckContext::new(state.clone(), probe.clone(), dispatcher, clock.clone());
        Self {
            state,
            probe,
            sink,
            clock,
            ctx,
        }
    }

    /// Register `admins` (all `user@domain`) for `domain`.
    pub fn add_server(&self, domain: &str, admins: &[(&str, UpdateType)]) {
        for (account, update_type) in admins {
            let (admin, _) = self.state.register_admin(account, None, *update_type).unwrap();
            assert_eq!(admin.domain, domain);
        }
    }
}
