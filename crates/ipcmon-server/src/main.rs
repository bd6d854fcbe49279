//! ipcmon Server
//!
//! HTTP and WebSocket server for IPC device provisioning and telemetry.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};

use ipcmon_core::config::{default_database_path, default_storage_root, load_config};
use ipcmon_core::tracing_init::init_tracing;
use ipcmon_core::{Cache, Clock, TokioClock};
use ipcmon_server::api::{AppState, build_router};
use ipcmon_server::files::FsObjectStore;
use ipcmon_server::mail::{EmailQueue, LogTransport, spawn_mail_worker};
use ipcmon_server::storage::ServerDatabase;

#[derive(Parser, Debug)]
#[command(name = "ipcmon-server")]
#[command(version, about = "ipcmon server - device provisioning and telemetry ingest")]
struct Args {
    /// Path to a JSON settings file.
    #[arg(long, env = "IPCMON_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on. Overrides the settings file.
    #[arg(long)]
    addr: Option<String>,

    /// Path to SQLite database file.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Root directory of the object store.
    #[arg(long)]
    storage_root: Option<PathBuf>,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing("ipcmon_server=info,tower_http=info", args.log_json);

    let mut config = load_config(args.config.as_deref())?;
    if let Some(addr) = args.addr {
        config.server.addr = addr;
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %config.server.addr,
        "Starting ipcmon-server"
    );

    let db_path = args
        .db_path
        .or_else(|| config.database.path.clone())
        .or_else(default_database_path)
        .ok_or_else(|| anyhow::anyhow!("Cannot determine database path"))?;
    info!(path = %db_path.display(), "Opening server database");
    let db = ServerDatabase::open(&db_path).await?;

    let storage_root = args
        .storage_root
        .or_else(|| config.storage.root.clone())
        .or_else(default_storage_root)
        .ok_or_else(|| anyhow::anyhow!("Cannot determine storage root"))?;
    info!(path = %storage_root.display(), "Using filesystem object store");
    let store = Arc::new(FsObjectStore::new(storage_root));

    let clock: Arc<dyn Clock> = Arc::new(TokioClock);
    let cache = Cache::new(Arc::clone(&clock));

    let (mail, outbox) = EmailQueue::new(config.mail.queue_capacity);
    let mail_worker = spawn_mail_worker(
        outbox,
        Arc::new(LogTransport),
        config.mail.sender.clone(),
        config.server.public_url.clone(),
    );

    // Spawn background task to drop expired cache entries (hourly)
    let cleanup_cache = cache.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(3600));
        interval.tick().await; // Skip first immediate tick
        loop {
            interval.tick().await;
            let removed = cleanup_cache.purge_expired().await;
            if removed > 0 {
                info!(removed, "Background cache cleanup completed");
            }
        }
    });

    let state = AppState::new(&config, db, cache, clock, store, mail);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.server.addr).await?;
    info!(addr = %listener.local_addr()?, "Server listening");

    tokio::select! {
        result = axum::serve(listener, app) => {
            if let Err(e) = result {
                warn!(error = %e, "Server error");
                return Err(e.into());
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
        }
    }

    mail_worker.abort();
    Ok(())
}
