//! # rota
//!
//! Operator CLI for a running `rota-daemon`:
//! - `rota shifts` / `rota roster` / `rota generate`: inspect and seed the schedule
//! - `rota preview/apply/rollback/discard`: drive change-sets directly
//! - `rota requests list/show/preview/approve/reject`: review shift change requests
//! - `rota watch`: follow the sync channel, reconnecting with backoff

mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::Daemon;

/// Roster adjustment CLI.
#[derive(Parser)]
#[command(name = "rota", version, about)]
struct Cli {
    /// Base URL of the daemon.
    #[arg(long, default_value = "http://127.0.0.1:8080")]
    daemon: String,

    /// Print raw JSON responses instead of tables.
    #[arg(long, global = true)]
    json: bool,

    /// Role sent as `X-Role`; apply, rollback and approve need `admin`.
    #[arg(long, global = true, default_value = "admin")]
    role: String,

    /// Name sent as `X-Actor` and recorded in the audit trail.
    #[arg(long, global = true)]
    actor: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the current schedule.
    Shifts {
        /// Only the week (Monday..Sunday) containing this date.
        #[arg(long)]
        week_of: Option<chrono::NaiveDate>,
    },
    /// Show or replace the roster.
    Roster {
        #[command(subcommand)]
        command: commands::schedule::RosterCommands,
    },
    /// Ask the optimizer for a week and load it as the baseline.
    Generate {
        #[arg(long)]
        week_start: chrono::NaiveDate,
        #[arg(long)]
        week_end: chrono::NaiveDate,
    },
    /// Preview a rule, given as JSON or as free text for the parser.
    Preview {
        /// Rule JSON, e.g. '{"action":"absence","employee_id":3,"date":"2024-06-04"}'.
        #[arg(long, conflicts_with = "text")]
        rule: Option<String>,
        /// Free-text instruction.
        #[arg(long)]
        text: Option<String>,
    },
    /// Commit a previewed change-set.
    Apply { change_set_id: uuid::Uuid },
    /// Restore the schedule from before an applied change-set.
    Rollback { change_set_id: uuid::Uuid },
    /// Drop a previewed change-set.
    Discard { change_set_id: uuid::Uuid },
    /// List change-sets.
    ChangeSets {
        /// Filter by state (proposed, applied, void, rolled_back).
        #[arg(long)]
        state: Option<String>,
    },
    /// Review shift change requests.
    Requests {
        #[command(subcommand)]
        command: commands::requests::RequestCommands,
    },
    /// Follow schedule events until interrupted.
    Watch(commands::watch::WatchArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("rota_events=info".parse()?))
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let cli = Cli::parse();
    let daemon = Daemon::new(&cli.daemon, cli.json)?.with_identity(Some(cli.role), cli.actor);

    match cli.command {
        Commands::Shifts { week_of } => commands::schedule::shifts(&daemon, week_of).await,
        Commands::Roster { command } => commands::schedule::roster(&daemon, command).await,
        Commands::Generate {
            week_start,
            week_end,
        } => commands::schedule::generate(&daemon, week_start, week_end).await,
        Commands::Preview { rule, text } => {
            commands::adjust::preview(&daemon, rule.as_deref(), text.as_deref()).await
        }
        Commands::Apply { change_set_id } => commands::adjust::apply(&daemon, change_set_id).await,
        Commands::Rollback { change_set_id } => {
            commands::adjust::rollback(&daemon, change_set_id).await
        }
        Commands::Discard { change_set_id } => {
            commands::adjust::discard(&daemon, change_set_id).await
        }
        Commands::ChangeSets { state } => commands::adjust::list(&daemon, state.as_deref()).await,
        Commands::Requests { command } => commands::requests::execute(&daemon, command).await,
        Commands::Watch(args) => commands::watch::execute(&daemon, &cli.daemon, args).await,
    }
}
