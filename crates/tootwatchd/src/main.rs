//! tootwatchd - the tootwatch daemon.
//!
//! Single binary that runs the fleet monitor and manages its registry:
//! - `run`: scheduler with the release and certificate jobs
//! - `check`: one pass of both jobs, then exit
//! - `admin` / `server`: registry maintenance
//!
//! # Usage
//!
//! ```text
//! MASTODON_HOST=bot.example MASTODON_ACCESS_TOKEN=... tootwatchd run
//! tootwatchd admin add alice@a.example --update-type stable
//! ```

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use tootwatch_state::UpdateType;

mod admin;
mod config;
mod run_mode;

use config::GlobalArgs;

#[derive(Parser)]
#[command(
    name = "tootwatchd",
    about = "Mastodon fleet release and certificate monitor",
    version,
    propagate_version = true
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the monitor until interrupted.
    Run {
        /// Run both jobs immediately instead of one interval after start.
        #[arg(long)]
        run_on_start: bool,
    },
    /// Run the release and certificate jobs once, then exit.
    Check,
    /// Manage admins.
    Admin {
        #[command(subcommand)]
        action: AdminAction,
    },
    /// Inspect tracked servers.
    Server {
        #[command(subcommand)]
        action: ServerAction,
    },
}

#[derive(Subcommand)]
enum AdminAction {
    /// Register an admin, creating its server if needed.
    Add {
        /// Account in `user@domain` form.
        account: String,
        /// Host to dial when it differs from the account's domain.
        #[arg(long)]
        web_domain: Option<String>,
        /// Which releases to hear about: all or stable.
        #[arg(long, default_value = "all")]
        update_type: UpdateType,
    },
    /// Remove an admin; the server goes with its last admin.
    Remove { account: String },
    /// Change which releases an admin hears about.
    SetType {
        account: String,
        update_type: UpdateType,
    },
    /// List admins.
    List {
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
}

#[derive(Subcommand)]
enum ServerAction {
    /// List tracked servers and their last observed state.
    List {
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.global)?;

    match cli.command {
        Command::Run { run_on_start } => run_mode::run(&cli.global, run_on_start).await,
        Command::Check => run_mode::check_once(&cli.global).await,
        Command::Admin { action } => {
            let state = admin::open_state(&cli.global)?;
            match action {
                AdminAction::Add {
                    account,
                    web_domain,
                    update_type,
                } => admin::add(&state, &account, web_domain.as_deref(), update_type),
                AdminAction::Remove { account } => admin::remove(&state, &account),
                AdminAction::SetType {
                    account,
                    update_type,
                } => admin::set_type(&state, &account, update_type),
                AdminAction::List { format } => admin::list_admins(&state, format),
            }
        }
        Command::Server { action } => {
            let state = admin::open_state(&cli.global)?;
            match action {
                ServerAction::List { format } => admin::list_servers(&state, format),
            }
        }
    }
}

fn init_tracing(global: &GlobalArgs) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(global.default_log_filter())?,
    };
    if global.log_json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    Ok(())
}
