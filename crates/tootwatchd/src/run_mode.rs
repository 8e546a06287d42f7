//! Daemon and one-shot modes.

use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info, warn};

use tootwatch_monitor::{
    CheckContext, Dispatcher, FanOut, GitHubReleaseFeed, HttpsClient, HttpsProbe, JobKind,
    LogSink, MastodonSink, Monitor, NoticeStyle, NotificationSink, ReleaseTracker, Scheduler,
    SystemClock,
};

use crate::admin::open_state;
use crate::config::GlobalArgs;

/// Assemble the monitor from configuration.
///
/// Outside debug mode the bot's credentials are verified before anything
/// is scheduled.
async fn build_monitor(global: &GlobalArgs) -> anyhow::Result<Monitor> {
    let state = open_state(global)?;
    let client = HttpsClient::new(global.request_timeout)?;

    let sink: Arc<dyn NotificationSink> = if global.debug {
        if let Ok((host, token)) = global.credentials() {
            let mastodon = MastodonSink::new(client.clone(), host, token);
            match mastodon.verify_credentials().await {
                Ok(acct) => info!(%acct, "credentials verified; notices will only be logged"),
                Err(e) => warn!(error = %e, "credential check failed"),
            }
        }
        info!("debug mode: notices are logged, not posted");
        Arc::new(LogSink)
    } else {
        let (host, token) = global.credentials()?;
        let mastodon = MastodonSink::new(client.clone(), host, token);
        let acct = mastodon
            .verify_credentials()
            .await
            .with_context(|| format!("verifying credentials on {host}"))?;
        info!(%acct, %host, "credentials verified");
        Arc::new(mastodon)
    };

    let style = NoticeStyle {
        language: global.language.clone(),
        repo: global.release_repo.clone(),
    };
    let ctx = CheckContext::new(
        state.clone(),
        Arc::new(HttpsProbe::new(client.clone())),
        Dispatcher::new(sink, style),
        Arc::new(SystemClock),
    );
    let feed = GitHubReleaseFeed::new(client, global.release_repo.clone());
    let tracker = ReleaseTracker::new(state, Arc::new(feed));

    Ok(Monitor::new(ctx, tracker, FanOut::new(global.workers)))
}

/// Run the scheduler until Ctrl-C or a fatal error.
pub async fn run(global: &GlobalArgs, run_on_start: bool) -> anyhow::Result<()> {
    info!("tootwatch daemon starting");

    let monitor = build_monitor(global).await?;
    let config = global.scheduler_config(run_on_start);
    let handle = Scheduler::new(Arc::new(monitor), config).start();

    match handle.stop_on(tokio::signal::ctrl_c()).await? {
        Some(signal) => {
            signal.context("installing Ctrl-C handler")?;
            info!("stopped on shutdown signal");
        }
        None => error!("scheduler exited on its own"),
    }

    info!("tootwatch daemon stopped");
    Ok(())
}

/// Run both jobs once and report what happened.
pub async fn check_once(global: &GlobalArgs) -> anyhow::Result<()> {
    let monitor = build_monitor(global).await?;

    let mut failures = 0;
    for kind in [JobKind::ReleaseCheck, JobKind::TlsCheck] {
        let report = monitor.run(kind).await?;
        println!(
            "{kind}: {} checked, {} failed, {} notified",
            report.checked,
            report.failed.len(),
            report.notified
        );
        for (domain, e) in &report.failed {
            println!("  {domain}: {e}");
        }
        failures += report.failed.len();
    }

    if failures > 0 {
        anyhow::bail!("{failures} server checks failed");
    }
    Ok(())
}
