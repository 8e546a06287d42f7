//! tootwatch-monitor - release and certificate monitoring for a Mastodon fleet.
//!
//! Tracks the latest upstream release, checks every registered server's
//! reported version and TLS certificate, and notifies the server's admins
//! through the bot's own account. Repeat notices are spaced out by a
//! decaying re-notification policy.
//!
//! # Architecture
//!
//! ```text
//! Scheduler (tick loop, job table)
//!   └── Monitor (JobRunner)
//!       ├── release job
//!       │   ├── ReleaseTracker → ReleaseFeed
//!       │   ├── new release → Dispatcher (broadcast + per-admin)
//!       │   └── otherwise FanOut → check_server() per server
//!       └── tls job
//!           └── FanOut → check_tls() per server
//!
//! check_server / check_tls
//!   ├── InstanceProbe (HTTPS version fetch, TLS handshake)
//!   ├── decay policy inside one StateStore write transaction
//!   └── Dispatcher → NotificationSink (after commit)
//! ```
//!
//! # Failure model
//!
//! Network and data failures are scoped to one server (or one job run)
//! and retried on the next tick. Notice delivery is best-effort and never
//! rolls back stored state. Only registry failures are fatal; they stop
//! the scheduler.

pub mod clock;
pub mod context;
pub mod decay;
pub mod error;
pub mod fanout;
pub mod feed;
pub mod http;
pub mod monitor;
pub mod notify;
pub mod probe;
pub mod release;
pub mod scheduler;
pub mod tls_check;
pub mod version;
pub mod version_check;

#[cfg(test)]
pub(crate) mod testing;

pub use clock::{Clock, ManualClock, SystemClock};
pub use context::CheckContext;
pub use error::{MonitorError, MonitorResult};
pub use fanout::{Check, FanOut, TickReport};
pub use feed::{FeedEntry, GitHubReleaseFeed, ReleaseFeed};
pub use http::HttpsClient;
pub use monitor::Monitor;
pub use notify::{Dispatcher, LogSink, MastodonSink, Notice, NoticeStyle, NotificationSink, Urgency, Visibility};
pub use probe::{HttpsProbe, InstanceProbe};
pub use release::{ReleaseCheck, ReleaseTracker};
pub use scheduler::{JobKind, JobRunner, Scheduler, SchedulerConfig, SchedulerHandle};

/// Boxed future returned by the object-safe async traits in this crate.
pub type BoxFuture<'a, T> = std::pin::Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;
