//! # habitpush-server
//!
//! Habit reminder and streak-milestone push dispatcher.
//!
//! Usage:
//!   habitpush-server                      # serve HTTP + run the minute tick
//!   habitpush-server scan --at 06:55      # one scan pass, report printed as JSON

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use habitpush_core::{config::HabitPushConfig, TimeOfDay};
use habitpush_dispatch::{DispatchEngine, DispatchOptions, Dispatcher};
use habitpush_store::SqliteStore;

mod app;
mod http;

#[derive(Parser)]
#[command(
    name = "habitpush-server",
    version,
    about = "Sends habit reminders and streak milestones as push notifications"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Config file path (overrides HABITPUSH_CONFIG)
    #[arg(short, long, global = true)]
    config: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP API and run the dispatch engine (default)
    Serve,
    /// Run a single scan pass and print its report
    Scan {
        /// Wall-clock minute to evaluate, HH:MM (defaults to now)
        #[arg(long)]
        at: Option<TimeOfDay>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "habitpush_server=info,habitpush_dispatch=info,tower_http=debug".into()
            }),
        )
        .init();

    let cli = Cli::parse();

    // explicit flag > HABITPUSH_CONFIG env > ~/.habitpush/habitpush.toml
    let config_path = cli.config.or_else(|| std::env::var("HABITPUSH_CONFIG").ok());
    let config = HabitPushConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        warn!("Config load failed ({}), using defaults", e);
        HabitPushConfig::default()
    });

    let dispatcher = Arc::new(build_dispatcher(&config)?);

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config, dispatcher).await,
        Commands::Scan { at } => {
            let at = at.unwrap_or_else(|| config.dispatch.clock.now());
            let report = dispatcher.run_scan_pass(at).await;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
    }
}

fn build_dispatcher(config: &HabitPushConfig) -> Result<Dispatcher> {
    let db_path = &config.database.path;
    ensure_parent_dir(db_path);
    info!(path = %db_path, "opening SQLite database");
    let store = SqliteStore::open(db_path)?;

    let options = DispatchOptions::from(&config.dispatch);
    let gateway = habitpush_delivery::build_gateway(&config.delivery, options.delivery_timeout)?;
    info!(
        gateway = gateway.name(),
        max_in_flight = options.max_in_flight,
        "delivery gateway ready"
    );

    Ok(Dispatcher::new(Arc::new(store), gateway, options))
}

async fn serve(config: HabitPushConfig, dispatcher: Arc<Dispatcher>) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port).parse()?;
    let clock = config.dispatch.clock;

    // trigger handlers -> engine loop
    let (events_tx, events_rx) = tokio::sync::mpsc::channel(config.dispatch.event_queue);
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let engine = DispatchEngine::new(Arc::clone(&dispatcher), clock);
    let engine_task = tokio::spawn(async move { engine.run(events_rx, shutdown_rx).await });

    let state = Arc::new(app::AppState::new(config, dispatcher, events_tx));
    let router = app::build_router(state);

    info!("habitpush server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await?;

    // let an in-flight pass finish before exiting
    let _ = shutdown_tx.send(true);
    if tokio::time::timeout(Duration::from_secs(30), engine_task)
        .await
        .is_err()
    {
        warn!("dispatch engine did not stop within 30s");
    }
    Ok(())
}

/// Create the database file's directory. A failure is logged and left for
/// the store open to report.
fn ensure_parent_dir(path: &str) {
    if let Err(e) = create_parent_dir(path) {
        warn!(path, error = %e, "cannot create database directory");
    }
}

fn create_parent_dir(path: &str) -> std::io::Result<()> {
    match std::path::Path::new(path).parent() {
        Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent),
        _ => Ok(()),
    }
}
