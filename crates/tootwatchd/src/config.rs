//! Process configuration: global CLI flags with environment fallbacks.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Args;

use tootwatch_monitor::SchedulerConfig;

/// Flags shared by every subcommand.
#[derive(Debug, Clone, Args)]
pub struct GlobalArgs {
    /// Directory holding the registry database.
    #[arg(long, global = true, env = "TOOTWATCH_DATA_DIR", default_value = "/var/lib/tootwatch")]
    pub data_dir: PathBuf,

    /// Mastodon host the bot account lives on.
    #[arg(long, global = true, env = "MASTODON_HOST")]
    pub host: Option<String>,

    /// Access token of the bot account.
    #[arg(long, global = true, env = "MASTODON_ACCESS_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Log notices instead of posting them, and check on short intervals.
    #[arg(long, global = true, env = "DEBUG")]
    pub debug: bool,

    /// Default log filter (overridden by RUST_LOG).
    #[arg(long, global = true, env = "LOGLEVEL")]
    pub log_level: Option<String>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Release check interval, e.g. "1h" or "90m".
    #[arg(long, global = true, value_parser = parse_duration)]
    pub release_interval: Option<Duration>,

    /// Certificate check interval.
    #[arg(long, global = true, value_parser = parse_duration)]
    pub tls_interval: Option<Duration>,

    /// Scheduler polling interval.
    #[arg(long, global = true, value_parser = parse_duration)]
    pub tick: Option<Duration>,

    /// Servers checked concurrently.
    #[arg(long, global = true, default_value_t = tootwatch_monitor::fanout::DEFAULT_WORKERS)]
    pub workers: usize,

    /// Bound on every outbound request and TLS handshake.
    #[arg(long, global = true, value_parser = parse_duration, default_value = "10s")]
    pub request_timeout: Duration,

    /// Language tag attached to posted statuses.
    #[arg(long, global = true, default_value = "en")]
    pub language: String,

    /// Upstream GitHub repository (`owner/name`) whose releases are tracked.
    #[arg(long, global = true, default_value = "mastodon/mastodon")]
    pub release_repo: String,
}

impl GlobalArgs {
    /// Path of the redb file inside the data directory.
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("tootwatch.redb")
    }

    /// Scheduler intervals: debug or production defaults, then overrides.
    pub fn scheduler_config(&self, run_on_start: bool) -> SchedulerConfig {
        let base = if self.debug {
            SchedulerConfig::debug()
        } else {
            SchedulerConfig::default()
        };
        SchedulerConfig {
            release_interval: self.release_interval.unwrap_or(base.release_interval),
            tls_interval: self.tls_interval.unwrap_or(base.tls_interval),
            tick: self.tick.unwrap_or(base.tick),
            run_on_start,
        }
    }

    /// Host and token of the bot account.
    pub fn credentials(&self) -> anyhow::Result<(&str, &str)> {
        let host = self
            .host
            .as_deref()
            .filter(|h| !h.is_empty())
            .context("MASTODON_HOST (or --host) is required")?;
        let token = self
            .token
            .as_deref()
            .filter(|t| !t.is_empty())
            .context("MASTODON_ACCESS_TOKEN (or --token) is required")?;
        Ok((host, token))
    }

    /// Default tracing filter when RUST_LOG is unset.
    pub fn default_log_filter(&self) -> String {
        match (&self.log_level, self.debug) {
            (Some(level), _) => level.to_ascii_lowercase(),
            (None, true) => "info,tootwatchd=debug,tootwatch_monitor=debug,tootwatch_state=debug".to_string(),
            (None, false) => "info".to_string(),
        }
    }
}

/// Parse a duration string like "5s", "500ms", "2m", "1h". A bare number
/// is seconds.
pub fn parse_duration(s: &str) -> anyhow::Result<Duration> {
    let s = s.trim();
    let (digits, unit_secs, millis) = if let Some(ms) = s.strip_suffix("ms") {
        (ms, 0, true)
    } else if let Some(secs) = s.strip_suffix('s') {
        (secs, 1, false)
    } else if let Some(mins) = s.strip_suffix('m') {
        (mins, 60, false)
    } else if let Some(hours) = s.strip_suffix('h') {
        (hours, 60 * 60, false)
    } else {
        (s, 1, false)
    };

    let value: u64 = digits
        .trim()
        .parse()
        .with_context(|| format!("invalid duration '{s}'"))?;
    let duration = if millis {
        Duration::from_millis(value)
    } else {
        let secs = value
            .checked_mul(unit_secs)
            .with_context(|| format!("duration out of range '{s}'"))?;
        Duration::from_secs(secs)
    };
    if duration.is_zero() {
        bail!("duration must be positive: '{s}'");
    }
    Ok(duration)
}
