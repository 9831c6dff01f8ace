use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use rota_daemon::{app, state, ws, AppState, DaemonConfig};

/// Roster adjustment service.
#[derive(Parser)]
#[command(name = "rota-daemon", about = "Roster adjustment service", version)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "rota.toml")]
    config: PathBuf,

    /// Address to listen on (overrides `bind` in the config file).
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// Data directory (overrides `data_dir` in the config file).
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::from_default_env()
        .add_directive("rota_daemon=info".parse()?)
        .add_directive("rota_changeset=info".parse()?)
        .add_directive("rota_session=info".parse()?)
        .add_directive("rota_approval=info".parse()?);
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if cli.log_json {
        builder.json().init();
    } else {
        builder.with_ansi(false).init();
    }

    let mut config = DaemonConfig::load_or_default(&cli.config)?;
    if let Some(bind) = cli.bind {
        config.bind = bind;
    }
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }
    let bind = config.bind;
    let heartbeat = Duration::from_secs(config.sync.heartbeat_secs.max(1));

    let state = AppState::from_config(config)?;
    let fanout = ws::start_fanout(&state.hub, state.connections.clone());
    let heartbeat = ws::start_heartbeat(state.connections.clone(), heartbeat);
    let pump = state::start_session_pump(&state);
    let sweep = state::start_retention_sweep(&state);

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("binding {}", bind))?;
    tracing::info!(%bind, "rota-daemon listening");

    axum::serve(listener, app(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown requested");
        })
        .await?;

    fanout.abort();
    heartbeat.abort();
    pump.abort();
    sweep.abort();
    tracing::info!("rota-daemon stopped");
    Ok(())
}
