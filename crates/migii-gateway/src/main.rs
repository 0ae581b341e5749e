use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use migii_core::{MigiiConfig, TokioScheduler};
use migii_gateway::{app, relay};
use migii_notifications::NotificationGateway;
use migii_store::{ChangeJournal, Store};
use tokio::sync::watch;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "migii-gateway", version, about = "MIGII realtime gateway")]
struct Cli {
    /// Path to migii.toml (falls back to MIGII_CONFIG).
    #[arg(long)]
    config: Option<String>,

    /// Override `server.port`.
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "migii_gateway=info,tower_http=debug".into()),
        )
        .init();

    let cli = Cli::parse();

    // load config: --config > MIGII_CONFIG env > defaults
    let config_path = cli.config.or_else(|| std::env::var("MIGII_CONFIG").ok());
    let mut config = MigiiConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        MigiiConfig::default()
    });
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    let db_path = config.database.path.clone();
    ensure_parent_dir(&db_path);
    info!(path = %db_path, "opening SQLite database");

    // one connection per subsystem, WAL so readers do not block the writer
    let store_conn = rusqlite::Connection::open(&db_path)?;
    store_conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    let store = Arc::new(Store::new(store_conn, ChangeJournal::new())?);
    let notifications = Arc::new(NotificationGateway::new(rusqlite::Connection::open(&db_path)?)?);
    info!("database schema ready");

    let addr: SocketAddr = config.listen_addr().parse()?;
    let state = Arc::new(app::AppState::new(config, store, notifications));
    let router = app::build_router(state.clone());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let tasks = relay::spawn_pipeline(&state, Arc::new(TokioScheduler), shutdown_rx);

    info!(
        git_sha = env!("MIGII_GIT_SHA"),
        change_streams = state.config.database.change_streams,
        "MIGII gateway listening on {}",
        addr
    );
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutdown requested");
    })
    .await?;

    // stop the change source and relays, then drop remaining sockets
    let _ = shutdown_tx.send(true);
    for task in tasks {
        let _ = task.await;
    }
    state.hub.clear();
    info!("MIGII gateway stopped");
    Ok(())
}

/// Ensure the parent directory for a file path exists.
fn ensure_parent_dir(path: &str) {
    if let Some(parent) = std::path::Path::new(path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
}
