//! Fan-out coordinator - one task per server on a bounded pool.
//!
//! Every unit runs in its own tokio task and opens its own store
//! transaction. The coordinator waits for all of them and reports each
//! failure, including panics, without letting one unit affect another.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::{Id, JoinSet};
use tracing::{debug, warn};

use tootwatch_state::ReleaseInfo;

use crate::context::CheckContext;
use crate::error::{MonitorError, MonitorResult};
use crate::tls_check::check_tls;
use crate::version_check::check_server;

/// Default number of servers checked concurrently.
pub const DEFAULT_WORKERS: usize = 8;

/// What each unit checks.
#[derive(Debug, Clone)]
pub enum Check {
    /// Reported version against this release.
    Version(ReleaseInfo),
    /// Certificate expiry.
    Tls,
}

impl Check {
    fn name(&self) -> &'static str {
        match self {
            Check::Version(_) => "version",
            Check::Tls => "tls",
        }
    }
}

/// Per-unit results of one fan-out.
#[derive(Debug, Default)]
pub struct TickReport {
    /// Units that completed successfully.
    pub checked: usize,
    /// Units that sent at least one notice.
    pub notified: usize,
    pub failed: Vec<(String, MonitorError)>,
}

impl TickReport {
    /// The first failure that makes further work pointless, if any.
    pub fn fatal(&self) -> Option<&MonitorError> {
        self.failed.iter().map(|(_, e)| e).find(|e| e.is_fatal())
    }

    pub fn total(&self) -> usize {
        self.checked + self.failed.len()
    }
}

/// Runs one check across a set of servers.
#[derive(Debug, Clone)]
pub struct FanOut {
    workers: usize,
}

impl Default for FanOut {
    fn default() -> Self {
        Self::new(DEFAULT_WORKERS)
    }
}

impl FanOut {
    /// `workers` is clamped to at least one.
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Check every domain and wait for all units to finish.
    pub async fn run(&self, ctx: &CheckContext, check: &Check, domains: Vec<String>) -> TickReport {
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut set = JoinSet::new();
        let mut units: HashMap<Id, String> = HashMap::with_capacity(domains.len());

        for domain in domains {
            let ctx = ctx.clone();
            let check = check.clone();
            let semaphore = Arc::clone(&semaphore);
            let unit_domain = domain.clone();
            let handle = set.spawn(async move {
                let _permit = semaphore.acquire_owned().await.map_err(|e| {
                    MonitorError::Worker {
                        domain: unit_domain.clone(),
                        message: e.to_string(),
                    }
                })?;
                run_unit(&ctx, &check, &unit_domain).await
            });
            units.insert(handle.id(), domain);
        }

        let mut report = TickReport::default();
        while let Some(joined) = set.join_next_with_id().await {
            match joined {
                Ok((id, result)) => {
                    let domain = units.remove(&id).unwrap_or_default();
                    match result {
                        Ok(notified) => {
                            report.checked += 1;
                            if notified {
                                report.notified += 1;
                            }
                        }
                        Err(e) => {
                            warn!(%domain, check = check.name(), error = %e, "server check failed");
                            report.failed.push((domain, e));
                        }
                    }
                }
                Err(join_error) => {
                    let domain = units.remove(&join_error.id()).unwrap_or_default();
                    let message = if join_error.is_panic() {
                        "check panicked".to_string()
                    } else {
                        join_error.to_string()
                    };
                    warn!(%domain, check = check.name(), %message, "server check aborted");
                    report.failed.push((domain.clone(), MonitorError::Worker { domain, message }));
                }
            }
        }

        debug!(
            check = check.name(),
            checked = report.checked,
            failed = report.failed.len(),
            notified = report.notified,
            "fan-out complete"
        );
        report
    }
}

/// Returns whether the unit sent a notice.
async fn run_unit(ctx: &CheckContext, check: &Check, domain: &str) -> MonitorResult<bool> {
    match check {
        Check::Version(release) => Ok(check_server(ctx, domain, release).await?.notify),
        Check::Tls => Ok(check_tls(ctx, domain).await?.notified),
    }
}
