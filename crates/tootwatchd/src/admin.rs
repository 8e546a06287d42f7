//! Registry maintenance subcommands.

use anyhow::{bail, Context};
use serde_json::json;
use tracing::info;

use tootwatch_state::{AdminRemoval, StateStore, UpdateType};

use crate::config::GlobalArgs;
use crate::OutputFormat;

/// Open (creating if needed) the registry under the data directory.
pub fn open_state(global: &GlobalArgs) -> anyhow::Result<StateStore> {
    std::fs::create_dir_all(&global.data_dir)
        .with_context(|| format!("creating data directory {}", global.data_dir.display()))?;
    let path = global.db_path();
    let state = StateStore::open(&path)?;
    info!(path = ?path, "state store opened");
    Ok(state)
}

pub fn add(
    state: &StateStore,
    account: &str,
    web_domain: Option<&str>,
    update_type: UpdateType,
) -> anyhow::Result<()> {
    let (admin, created) = state.register_admin(account, web_domain, update_type)?;
    if created {
        println!("registered {} ({}); now tracking {}", admin.account, admin.update_type, admin.domain);
    } else {
        println!("registered {} ({}) for {}", admin.account, admin.update_type, admin.domain);
    }
    Ok(())
}

pub fn remove(state: &StateStore, account: &str) -> anyhow::Result<()> {
    let account = account.trim_start_matches('@');
    let domain = state.get_admin(account)?.map(|admin| admin.domain);
    match state.remove_admin(account)? {
        AdminRemoval::NotFound => bail!("unknown admin: {account}"),
        AdminRemoval::Removed => println!("removed {account}"),
        AdminRemoval::RemovedWithServer => println!(
            "removed {account}; stopped tracking {}",
            domain.as_deref().unwrap_or("its server")
        ),
    }
    Ok(())
}

pub fn set_type(state: &StateStore, account: &str, update_type: UpdateType) -> anyhow::Result<()> {
    let account = account.trim_start_matches('@');
    if !state.set_update_type(account, update_type)? {
        bail!("unknown admin: {account}");
    }
    println!("{account} now receives {update_type} releases");
    Ok(())
}

pub fn list_admins(state: &StateStore, format: OutputFormat) -> anyhow::Result<()> {
    let admins = state.list_admins()?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&admins)?),
        OutputFormat::Text => {
            if admins.is_empty() {
                println!("no admins registered");
            }
            for admin in admins {
                println!("{:<40} {:<8} {}", admin.account, admin.update_type, admin.domain);
            }
        }
    }
    Ok(())
}

pub fn list_servers(state: &StateStore, format: OutputFormat) -> anyhow::Result<()> {
    let servers = state.list_servers()?;
    match format {
        OutputFormat::Json => {
            let mut rows = Vec::with_capacity(servers.len());
            for server in &servers {
                let admins = state.list_admins_for_server(&server.domain)?;
                rows.push(json!({
                    "server": server,
                    "admins": admins.iter().map(|a| a.account.as_str()).collect::<Vec<_>>(),
                }));
            }
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
        OutputFormat::Text => {
            if servers.is_empty() {
                println!("no servers tracked");
            }
            for server in servers {
                let fetched = server
                    .last_fetched_at
                    .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_else(|| "never".to_string());
                println!(
                    "{:<30} {:<12} checked {}",
                    server.domain,
                    server.version.as_deref().unwrap_or("-"),
                    fetched
                );
            }
        }
    }
    Ok(())
}
