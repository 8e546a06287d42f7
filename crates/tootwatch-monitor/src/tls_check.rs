//! Per-server certificate expiry check.

use tracing::{debug, info};

use crate::context::CheckContext;
use crate::decay::{days_between, should_notify_tls};
use crate::error::{MonitorError, MonitorResult};

/// Certificates expiring within this many days trigger notices.
pub const TLS_WARNING_DAYS: i64 = 7;

/// What one certificate check observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TlsOutcome {
    /// Whole days until `notAfter`; negative once expired.
    pub days_left: i64,
    pub notified: bool,
}

/// Check the certificate of one server and notify its admins if it is
/// about to expire.
pub async fn check_tls(ctx: &CheckContext, domain: &str) -> MonitorResult<TlsOutcome> {
    let server = ctx.server(domain)?;
    let expiry = ctx.probe.fetch_cert_expiry(&server.web_domain).await?;
    let now = ctx.clock.now();
    let days_left = days_between(expiry, now);

    if days_left > TLS_WARNING_DAYS {
        debug!(%domain, days_left, "certificate ok");
        return Ok(TlsOutcome {
            days_left,
            notified: false,
        });
    }

    let notified = ctx
        .state
        .update_server(domain, |record| {
            let due = should_notify_tls(record.last_tls_notified_at, now);
            if due {
                record.last_tls_notified_at = Some(now);
            }
            due
        })?
        .ok_or_else(|| MonitorError::ServerVanished(domain.to_string()))?;

    if notified {
        let admins = ctx.state.list_admins_for_server(domain)?;
        let sent = ctx.dispatcher.tls_expiry(&admins, domain, days_left).await;
        info!(%domain, days_left, %expiry, sent, "certificate expiry notice");
    } else {
        debug!(%domain, days_left, "certificate expiry already notified today");
    }

    Ok(TlsOutcome {
        days_left,
        notified,
    })
}
