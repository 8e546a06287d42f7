//! Monitor - the two scheduled jobs over the whole fleet.

use tracing::{debug, info, warn};

use crate::context::CheckContext;
use crate::error::{MonitorError, MonitorResult};
use crate::fanout::{Check, FanOut, TickReport};
use crate::release::ReleaseTracker;
use crate::scheduler::{JobKind, JobRunner};
use crate::BoxFuture;

/// Wires the release tracker and both checkers to the fan-out pool.
#[derive(Clone)]
pub struct Monitor {
    ctx: CheckContext,
    tracker: ReleaseTracker,
    fanout: FanOut,
}

impl Monitor {
    pub fn new(ctx: CheckContext, tracker: ReleaseTracker, fanout: FanOut) -> Self {
        Self {
            ctx,
            tracker,
            fanout,
        }
    }

    fn domains(&self) -> MonitorResult<Vec<String>> {
        Ok(self
            .ctx
            .state
            .list_servers()?
            .into_iter()
            .map(|server| server.domain)
            .collect())
    }

    /// Refresh the release. A new release is announced to everyone and the
    /// per-server checks wait for the next run; otherwise every server's
    /// version is checked against the stored release.
    pub async fn release_job(&self) -> MonitorResult<TickReport> {
        let check = self.tracker.check().await?;

        if check.is_new {
            let admins = self.ctx.state.list_admins()?;
            let sent = self.ctx.dispatcher.new_release(&admins, &check.release).await;
            info!(label = %check.release.label, admins = admins.len(), sent, "new release announced");
            return Ok(TickReport::default());
        }

        let domains = self.domains()?;
        let report = self
            .fanout
            .run(&self.ctx, &Check::Version(check.release), domains)
            .await;
        log_report(JobKind::ReleaseCheck, &report);
        Ok(report)
    }

    /// Check every server's certificate.
    pub async fn tls_job(&self) -> MonitorResult<TickReport> {
        let domains = self.domains()?;
        let report = self.fanout.run(&self.ctx, &Check::Tls, domains).await;
        log_report(JobKind::TlsCheck, &report);
        Ok(report)
    }

    /// Run one job and surface a fatal unit failure as the job's error.
    pub async fn run(&self, kind: JobKind) -> MonitorResult<TickReport> {
        let mut report = match kind {
            JobKind::ReleaseCheck => self.release_job().await?,
            JobKind::TlsCheck => self.tls_job().await?,
        };
        match take_fatal(&mut report) {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }
}

impl JobRunner for Monitor {
    fn run_job(&self, kind: JobKind) -> BoxFuture<'_, MonitorResult<()>> {
        Box::pin(async move { self.run(kind).await.map(|_| ()) })
    }
}

fn take_fatal(report: &mut TickReport) -> Option<MonitorError> {
    let index = report.failed.iter().position(|(_, e)| e.is_fatal())?;
    Some(report.failed.swap_remove(index).1)
}

fn log_report(kind: JobKind, report: &TickReport) {
    if report.failed.is_empty() {
        debug!(job = %kind, checked = report.checked, notified = report.notified, "job complete");
    } else {
        warn!(
            job = %kind,
            checked = report.checked,
            failed = report.failed.len(),
            notified = report.notified,
            "job complete with failures"
        );
    }
}
