//! voxcall server binary: the voice-call assistant's HTTP entry point.
//!
//! Starts an axum HTTP server with structured logging, database initialization,
//! and graceful shutdown on SIGTERM/SIGINT.

use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;
use voxcall_server::{app, config, AppState};

fn resolve_config_path() -> (Option<String>, &'static str) {
    if let Some(path) = std::env::args()
        .nth(1)
        .filter(|value| !value.trim().is_empty())
    {
        return (Some(path), "cli-arg");
    }

    if let Ok(path) = std::env::var("VOXCALL_CONFIG_PATH") {
        if !path.trim().is_empty() {
            return (Some(path), "env-var");
        }
    }

    (None, "default")
}

#[tokio::main]
async fn main() {
    let (resolved_config_path, config_source) = resolve_config_path();
    let selected_config_path = resolved_config_path.as_deref().or(Some("config.toml"));

    // Load configuration
    let config = config::load_config(selected_config_path)
        .expect("failed to load configuration; the server cannot start without valid config");

    // Initialize tracing
    let filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    if config.logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    tracing::info!(
        source = config_source,
        path = selected_config_path.unwrap_or("<none>"),
        "resolved startup configuration path"
    );

    if config.server.public_url.is_none() {
        tracing::warn!(
            "server.public_url is not set; webhook and audio URLs will be derived from the Host header"
        );
    }

    // Initialize database
    let pool = voxcall_db::create_pool(
        &config.database.path,
        voxcall_db::DbRuntimeSettings {
            busy_timeout_ms: config.database.busy_timeout_ms,
            pool_max_size: config.database.pool_max_size,
        },
    )
    .expect("failed to create database pool; check database.path in config");

    {
        let conn = pool
            .get()
            .expect("failed to get database connection for migrations");
        let applied =
            voxcall_db::run_migrations(&conn).expect("failed to run database migrations");
        if applied > 0 {
            tracing::info!(count = applied, "applied database migrations");
        }
    }

    std::fs::create_dir_all(&config.synthesis.audio_dir)
        .expect("failed to create audio directory; check synthesis.audio_dir in config");

    let addr = SocketAddr::new(config.server.host, config.server.port);
    let state = AppState::new(config, pool).expect("failed to build upstream clients");

    // Build application
    let app = app(state);

    tracing::info!(%addr, "starting voxcall server");

    let listener = TcpListener::bind(addr)
        .await
        .expect("failed to bind to address; is another process using this port?");

    // Serve with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    tracing::info!("voxcall server shut down");
}

/// Waits for a SIGINT (Ctrl+C) or SIGTERM signal for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { tracing::info!("received SIGINT, initiating graceful shutdown"); }
        () = terminate => { tracing::info!("received SIGTERM, initiating graceful shutdown"); }
    }
}
