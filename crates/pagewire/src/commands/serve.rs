//! HTTP server command implementation.

use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{info, warn};

use pagewire::app::AppCache;
use pagewire::config::Config;
use pagewire::demo;
use pagewire::dispatcher::Dispatcher;
use pagewire::server::{self, AppState};
use pagewire::session::SessionRegistry;

/// Values given on the command line; each overrides the config file.
#[derive(Debug, Default)]
pub struct ServeOverrides {
    pub host: Option<IpAddr>,
    pub port: Option<u16>,
    pub eviction_timeout_seconds: Option<u64>,
}

pub async fn run(config_path: &str, overrides: ServeOverrides) -> Result<()> {
    let mut config = Config::load(config_path)
        .await
        .with_context(|| format!("Failed to load config '{config_path}'"))?;

    if let Some(host) = overrides.host {
        config.server.host = host.to_string();
    }
    if let Some(port) = overrides.port {
        config.server.port = port;
    }
    if let Some(timeout) = overrides.eviction_timeout_seconds {
        config.sessions.eviction_timeout_seconds = timeout;
    }

    let apps = Arc::new(AppCache::new(demo::app_manager()));
    let registry = SessionRegistry::new();
    let dispatcher = Dispatcher::new(registry, apps.clone());

    let sweep = dispatcher.spawn_eviction_sweep(
        config.sessions.eviction_timeout(),
        config.sessions.sweep_interval(),
    );
    info!(
        eviction_timeout_seconds = config.sessions.eviction_timeout_seconds,
        sweep_interval_seconds = config.sessions.sweep_interval_seconds,
        "Session eviction enabled"
    );

    let state = AppState {
        dispatcher,
        apps,
        keep_alive_interval_seconds: config.server.keep_alive_interval_seconds,
        max_connections: config.server.max_connections,
    };
    let app = server::build_app(state.clone(), config.server.request_timeout_seconds);

    let ip: IpAddr = config
        .server
        .host
        .parse()
        .with_context(|| format!("Invalid listen host '{}'", config.server.host))?;
    let addr = SocketAddr::new(ip, config.server.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    info!(addr = %addr, version = pagewire::build_info::VERSION, "Starting server");
    axum::serve(listener, app)
        .with_graceful_shutdown(close_sessions_after(shutdown_signal(), state.clone()))
        .await?;

    // Sessions opened while connections drained are closed here, along with
    // the cached apps. Registry shutdown also stops the sweep.
    state.shutdown().await;
    if let Err(e) = sweep.await {
        warn!(error = %e, "Eviction sweep ended abnormally");
    }

    info!("Server stopped");
    Ok(())
}

/// Wait for `signal`, then close every session.
///
/// Graceful shutdown waits for open connections, and operation streams stay
/// open as long as their render does; closing sessions first ends them with
/// `End { cancelled: true }`.
async fn close_sessions_after(signal: impl Future<Output = ()>, state: AppState) {
    signal.await;
    state.dispatcher.shutdown().await;
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
        _ = terminate => info!("Received SIGTERM, shutting down..."),
    }
}
